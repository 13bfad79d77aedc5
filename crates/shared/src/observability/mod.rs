//! Observability
//!
//! Single entry point for logging and metrics so every binary names and
//! filters them the same way.

pub mod metrics;
pub mod tracing;

use ::tracing::info;
use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Reported with every metric; filled in from the service at startup
    pub service_name: String,

    /// Filter directive used when `RUST_LOG` is unset
    pub log_level: String,

    /// `json` (structured) or `pretty` (human-readable)
    pub log_format: String,

    pub metrics_enabled: bool,

    /// Port for the Prometheus `/metrics` endpoint
    pub metrics_port: u16,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown-service".to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_port: 9090,
        }
    }
}

impl ObservabilityConfig {
    pub fn with_service_name(mut self, service_name: &str) -> Self {
        self.service_name = service_name.to_string();
        self
    }

    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}

/// Keeps the metrics endpoint alive for the lifetime of the process
pub struct ObservabilityGuard {
    _metrics_handle: Option<metrics::MetricsHandle>,
}

impl ObservabilityGuard {
    /// A guard holding nothing, for tests and disabled observability
    pub fn empty() -> Self {
        Self {
            _metrics_handle: None,
        }
    }
}

impl Drop for ObservabilityGuard {
    fn drop(&mut self) {
        if self._metrics_handle.is_some() {
            info!("Shutting down observability...");
        }
    }
}

/// Install the log subscriber, then the Prometheus recorder if enabled.
pub async fn init(config: &ObservabilityConfig) -> Result<ObservabilityGuard> {
    tracing::init(config)?;

    let metrics_handle = if config.metrics_enabled {
        Some(metrics::init(config).await?)
    } else {
        None
    };

    info!(
        service = %config.service_name,
        log_format = %config.log_format,
        metrics_enabled = config.metrics_enabled,
        "Observability initialized"
    );

    Ok(ObservabilityGuard {
        _metrics_handle: metrics_handle,
    })
}
