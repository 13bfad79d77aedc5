//! Charge insight command-line runner
//!
//! Loads a rule document, evaluates a file of charges against it and prints
//! one JSON line per insight (or per charge with `--report`).

use anyhow::{Context, Result, bail};
use clap::Parser;
use insight_engine::{
    BatchEvaluator, BatchReport, Charge, EngineError, EvaluationPipeline, JsonFileRuleSource,
};
use serde::Serialize;
use insight_shared::config::AppConfig;
use insight_shared::observability;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "insight-engine")]
#[command(version, about = "Evaluate healthcare charges against insight rules")]
struct Cli {
    /// Rule document; defaults to `rules.path` from configuration
    #[arg(short, long)]
    rules: Option<PathBuf>,

    /// JSON array of charges
    #[arg(short, long)]
    charges: PathBuf,

    /// Record the facts each rule read (visible with --report)
    #[arg(long)]
    trace: bool,

    /// Print one analysis per charge instead of one line per insight
    #[arg(long)]
    report: bool,

    /// Charges evaluated at once; defaults to `evaluation.concurrency`
    #[arg(long)]
    concurrency: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load("insight-engine").unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {e}");
        AppConfig::default()
    });
    if cli.trace {
        config.evaluation.trace = true;
    }

    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    let rules_path = cli
        .rules
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.rules.path));
    let source = JsonFileRuleSource::new(&rules_path);
    let pipeline = EvaluationPipeline::load(&source, &config.evaluation)
        .await
        .inspect_err(|e: &EngineError| {
            error!(code = e.code(), retryable = e.is_retryable(), error = %e, "Session not started");
        })
        .with_context(|| format!("loading rules from {}", rules_path.display()))?;

    let charges = read_charges(&cli.charges).await?;

    let concurrency = cli.concurrency.unwrap_or(config.evaluation.concurrency);
    let evaluator = BatchEvaluator::new(pipeline, concurrency);

    if cli.report {
        let report = evaluator.run_with_report(charges).await;
        print_report(&report, std::iter::once)
    } else {
        let report = evaluator.run(charges).await;
        print_report(&report, |insights| insights.iter())
    }
}

/// Print `lines(result)` of each successful charge as JSON, log the failed
/// ones and fail if there were any.
fn print_report<'a, T, I>(report: &'a BatchReport<T>, lines: impl Fn(&'a T) -> I) -> Result<()>
where
    I: IntoIterator,
    I::Item: Serialize,
{
    let mut stdout = std::io::stdout().lock();
    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(found) => {
                for line in lines(found) {
                    writeln!(stdout, "{}", serde_json::to_string(&line)?)?;
                }
            }
            Err(e) => {
                error!(charge_id = %outcome.charge_id, code = e.code(), error = %e, "Charge failed");
            }
        }
    }
    info!(summary = %serde_json::to_string(&report.summary)?, "Done");

    if report.has_failures() {
        bail!(
            "{} of {} charges could not be evaluated",
            report.summary.failed,
            report.summary.charges
        );
    }
    Ok(())
}

/// Read, normalise and validate charges; invalid records are skipped.
async fn read_charges(path: &Path) -> Result<Vec<Charge>> {
    let json = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading charges from {}", path.display()))?;
    let records: Vec<Charge> = serde_json::from_str(&json)
        .with_context(|| format!("parsing charges from {}", path.display()))?;

    let total = records.len();
    let charges: Vec<Charge> = records
        .into_iter()
        .map(Charge::normalized)
        .filter(|charge| match charge.validate() {
            Ok(()) => true,
            Err(problems) => {
                let problems: Vec<String> = problems.iter().map(ToString::to_string).collect();
                warn!(charge_id = %charge.id, ?problems, "Skipping invalid charge");
                false
            }
        })
        .collect();

    info!(read = total, valid = charges.len(), "Charges loaded");
    Ok(charges)
}
