//! Batch and backfill evaluation
//!
//! Evaluates many charges against one session on tokio's blocking pool.
//! Each charge goes through [`EvaluationPipeline::evaluate`] (or
//! [`EvaluationPipeline::evaluate_with_report`]) unchanged; the batch only
//! adds bounded concurrency and a summary.

use crate::error::{BatchError, ConditionError};
use crate::models::{Charge, ChargeAnalysis, Insight, Severity};
use crate::pipeline::EvaluationPipeline;
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::spawn_blocking;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Evaluation output the batch summary can total up
pub trait ChargeFindings {
    fn insights(&self) -> &[Insight];
}

impl ChargeFindings for Vec<Insight> {
    fn insights(&self) -> &[Insight] {
        self
    }
}

impl ChargeFindings for ChargeAnalysis {
    fn insights(&self) -> &[Insight] {
        &self.insights
    }
}

/// Result for one charge of the batch
#[derive(Debug, Clone)]
pub struct ChargeOutcome<T = Vec<Insight>> {
    pub charge_id: Uuid,
    pub result: Result<T, BatchError>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub charges: usize,
    pub failed: usize,
    pub insights: usize,
    pub revenue_at_risk_cents: i64,
    pub by_severity: BTreeMap<Severity, usize>,
}

impl BatchSummary {
    fn add<T: ChargeFindings>(&mut self, outcome: &ChargeOutcome<T>) {
        self.charges += 1;
        match &outcome.result {
            Ok(found) => {
                let insights = found.insights();
                self.insights += insights.len();
                for insight in insights {
                    self.revenue_at_risk_cents = self
                        .revenue_at_risk_cents
                        .saturating_add(insight.revenue_at_risk_cents);
                    *self.by_severity.entry(insight.severity).or_default() += 1;
                }
            }
            Err(_) => self.failed += 1,
        }
    }
}

/// Outcomes in input order, plus their summary
#[derive(Debug, Clone)]
pub struct BatchReport<T = Vec<Insight>> {
    pub outcomes: Vec<ChargeOutcome<T>>,
    pub summary: BatchSummary,
}

impl<T> BatchReport<T> {
    pub fn has_failures(&self) -> bool {
        self.summary.failed > 0
    }
}

type EvaluateFn<T> = fn(&EvaluationPipeline, &Charge) -> Result<T, ConditionError>;

pub struct BatchEvaluator {
    pipeline: EvaluationPipeline,
    concurrency: usize,
}

impl BatchEvaluator {
    /// `concurrency` of zero is treated as one.
    pub fn new(pipeline: EvaluationPipeline, concurrency: usize) -> Self {
        Self {
            pipeline,
            concurrency: concurrency.max(1),
        }
    }

    /// Insights per charge
    pub async fn run(&self, charges: Vec<Charge>) -> BatchReport {
        self.run_with(charges, EvaluationPipeline::evaluate).await
    }

    /// Full analysis per charge, including per-rule results and traces
    pub async fn run_with_report(&self, charges: Vec<Charge>) -> BatchReport<ChargeAnalysis> {
        self.run_with(charges, EvaluationPipeline::evaluate_with_report)
            .await
    }

    #[instrument(skip(self, charges, evaluate), fields(charges = charges.len(), concurrency = self.concurrency))]
    async fn run_with<T>(&self, charges: Vec<Charge>, evaluate: EvaluateFn<T>) -> BatchReport<T>
    where
        T: ChargeFindings + Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = Vec::with_capacity(charges.len());

        for charge in charges {
            // The semaphore is never closed, so acquiring only waits
            let permit = Arc::clone(&semaphore).acquire_owned().await.ok();
            let pipeline = self.pipeline.clone();
            let charge_id = charge.id;

            let task = spawn_blocking(move || {
                let _permit = permit;
                evaluate(&pipeline, &charge).map_err(BatchError::from)
            });
            tasks.push((charge_id, task));
        }

        let (ids, handles): (Vec<_>, Vec<_>) = tasks.into_iter().unzip();
        let results = join_all(handles).await;

        let mut report = BatchReport {
            outcomes: Vec::with_capacity(ids.len()),
            summary: BatchSummary::default(),
        };
        for (charge_id, joined) in ids.into_iter().zip(results) {
            let result = joined.unwrap_or_else(|e| {
                warn!(%charge_id, error = %e, "Evaluation task did not complete");
                Err(BatchError::Task(e.to_string()))
            });
            let outcome = ChargeOutcome { charge_id, result };
            report.summary.add(&outcome);
            report.outcomes.push(outcome);
        }

        info!(
            evaluated = report.summary.charges,
            failed = report.summary.failed,
            insights = report.summary.insights,
            revenue_at_risk_cents = report.summary.revenue_at_risk_cents,
            "Batch evaluated"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Department, Patient, PayerType, Rule, RuleType, Sex};
    use crate::store::RuleStore;
    use chrono::NaiveDate;

    fn charge(amount: i64) -> Charge {
        Charge::new(
            PayerType::Medicare,
            amount,
            NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            Patient {
                id: "P-1".into(),
                date_of_birth: NaiveDate::from_ymd_opt(1940, 1, 1).unwrap(),
                sex: Sex::Female,
            },
            Department {
                code: "LAB".into(),
                name: "Laboratory".into(),
            },
        )
        .with_procedure_codes(["80053"])
    }

    fn pipeline(rules: Vec<Rule>) -> EvaluationPipeline {
        EvaluationPipeline::new(RuleStore::from_rules(rules))
    }

    #[tokio::test]
    async fn test_outcomes_keep_input_order() {
        let evaluator = BatchEvaluator::new(
            pipeline(vec![Rule::new(
                "R-1",
                RuleType::Pricing,
                "charge_amount_cents > 1000",
                Severity::High,
                "over ten dollars",
            )]),
            3,
        );
        let charges: Vec<_> = (0..20).map(|i| charge(i * 100)).collect();
        let ids: Vec<_> = charges.iter().map(|c| c.id).collect();

        let report = evaluator.run(charges).await;

        let outcome_ids: Vec<_> = report.outcomes.iter().map(|o| o.charge_id).collect();
        assert_eq!(outcome_ids, ids);
        // 1100..=1900 cents match
        assert_eq!(report.summary.charges, 20);
        assert_eq!(report.summary.insights, 9);
        assert_eq!(report.summary.by_severity.get(&Severity::High), Some(&9));
        assert_eq!(
            report.summary.revenue_at_risk_cents,
            (11..=19).map(|i| i * 100).sum::<i64>()
        );
        assert!(!report.has_failures());
    }

    #[tokio::test]
    async fn test_failures_are_counted() {
        let evaluator = BatchEvaluator::new(
            pipeline(vec![Rule::new(
                "R-1",
                RuleType::Validation,
                "payer_type.startsWith(",
                Severity::Low,
                "broken",
            )]),
            0,
        );

        let report = evaluator.run(vec![charge(1), charge(2)]).await;

        assert!(report.has_failures());
        assert_eq!(report.summary.failed, 2);
        for outcome in &report.outcomes {
            let err = outcome.result.as_ref().unwrap_err();
            assert_eq!(err.code(), "CONDITION_SYNTAX_ERROR");
        }
    }

    #[tokio::test]
    async fn test_report_mode_uses_the_pool() {
        let evaluator = BatchEvaluator::new(
            pipeline(vec![
                Rule::new(
                    "R-1",
                    RuleType::Pricing,
                    "charge_amount_cents >= 500",
                    Severity::Medium,
                    "five dollars or more",
                ),
                Rule::new(
                    "R-2",
                    RuleType::Validation,
                    "procedure_base_codes.contains('80053')",
                    Severity::Low,
                    "metabolic panel",
                ),
            ]),
            2,
        );
        let charges: Vec<_> = (0..8).map(|i| charge(i * 100)).collect();
        let ids: Vec<_> = charges.iter().map(|c| c.id).collect();

        let report = evaluator.run_with_report(charges).await;

        let outcome_ids: Vec<_> = report.outcomes.iter().map(|o| o.charge_id).collect();
        assert_eq!(outcome_ids, ids);
        for (i, outcome) in report.outcomes.iter().enumerate() {
            let analysis = outcome.result.as_ref().unwrap();
            assert_eq!(analysis.charge_id, ids[i]);
            assert_eq!(analysis.results.len(), 2);
            assert_eq!(analysis.results[0].matched, i >= 5);
            assert!(analysis.results[1].matched);
        }
        // R-2 on all eight, R-1 on 500..=700 cents
        assert_eq!(report.summary.insights, 11);
        assert_eq!(report.summary.by_severity.get(&Severity::Medium), Some(&3));
        assert!(!report.has_failures());
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let report = BatchEvaluator::new(pipeline(vec![]), 4).run(vec![]).await;
        assert!(report.outcomes.is_empty());
        assert_eq!(report.summary, BatchSummary::default());
    }
}
