//! Prometheus metrics
//!
//! Collected with the `metrics` crate and exported by
//! `metrics-exporter-prometheus` on a separate HTTP port.

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::ObservabilityConfig;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Keeps the metrics server task alive
pub struct MetricsHandle {
    _server_handle: tokio::task::JoinHandle<()>,
}

/// Install the Prometheus recorder and serve `/metrics`.
pub async fn init(config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROMETHEUS_HANDLE.set(handle.clone());

    describe_metrics(&config.service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle {
        _server_handle: server_handle,
    })
}

fn describe_metrics(service_name: &str) {
    metrics::describe_counter!(
        "charge_evaluations_total",
        "Charges evaluated, by outcome (ok or error)"
    );
    metrics::describe_histogram!(
        "charge_evaluation_duration_seconds",
        "Time to evaluate every rule against one charge"
    );

    metrics::describe_counter!("rule_evaluations_total", "Total number of rule evaluations");
    metrics::describe_histogram!(
        "rule_evaluation_duration_seconds",
        "Rule evaluation duration in seconds"
    );

    metrics::describe_counter!("insights_generated_total", "Insights generated, by severity");
    metrics::describe_gauge!("rule_store_rules", "Active rules in the current session");

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

pub fn get_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

/// Record one charge evaluation; `outcome` is `ok` or `error`
#[inline]
pub fn record_charge_evaluation(outcome: &str, duration_secs: f64) {
    metrics::counter!(
        "charge_evaluations_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);

    metrics::histogram!("charge_evaluation_duration_seconds").record(duration_secs);
}

#[inline]
pub fn record_rule_evaluation(matched: bool, duration_secs: f64) {
    metrics::counter!(
        "rule_evaluations_total",
        "matched" => matched.to_string()
    )
    .increment(1);

    metrics::histogram!("rule_evaluation_duration_seconds").record(duration_secs);
}

#[inline]
pub fn record_insight(severity: &str) {
    metrics::counter!(
        "insights_generated_total",
        "severity" => severity.to_string()
    )
    .increment(1);
}

#[inline]
pub fn set_rule_store_size(rules: usize) {
    metrics::gauge!("rule_store_rules").set(rules as f64);
}
