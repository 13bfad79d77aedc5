//! Evaluation pipeline
//!
//! Runs every rule of a session against one charge. The first rule whose
//! condition cannot be evaluated aborts the charge: no insights are returned
//! and the error names the rule to fix.

use crate::context::ContextBuilder;
use crate::error::{ConditionError, EngineError};
use crate::evaluator::OperandPolicy;
use crate::executor::RuleExecutor;
use crate::insight::InsightFactory;
use crate::models::{Charge, ChargeAnalysis, Insight, UnknownVariant};
use crate::source::RuleSource;
use crate::store::RuleStore;
use insight_shared::config::EvaluationConfig;
use insight_shared::observability::metrics::{
    record_charge_evaluation, record_insight, record_rule_evaluation,
};
use std::time::Instant;
use tracing::{debug, error, info, instrument};

#[derive(Debug, Clone)]
pub struct EvaluationPipeline {
    store: RuleStore,
    executor: RuleExecutor,
}

impl EvaluationPipeline {
    pub fn new(store: RuleStore) -> Self {
        Self {
            store,
            executor: RuleExecutor::new(),
        }
    }

    pub fn from_config(store: RuleStore, config: &EvaluationConfig) -> Result<Self, UnknownVariant> {
        let policy: OperandPolicy = config.operand_policy.parse()?;
        let mut executor = RuleExecutor::new().with_policy(policy);
        if config.trace {
            executor = executor.with_trace();
        }
        Ok(Self { store, executor })
    }

    /// Start a session: load the rule store from `source` and apply `config`.
    #[instrument(skip_all)]
    pub async fn load(
        source: &dyn RuleSource,
        config: &EvaluationConfig,
    ) -> crate::error::Result<Self> {
        let store = RuleStore::load(source).await?;
        let stats = store.stats();
        info!(
            rules = store.len(),
            invalid = stats.invalid_rules,
            trace = config.trace,
            "Session ready"
        );
        Self::from_config(store, config).map_err(EngineError::from)
    }

    pub fn with_executor(mut self, executor: RuleExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn store(&self) -> &RuleStore {
        &self.store
    }

    /// Insights for `charge`, in rule id order.
    #[instrument(skip(self, charge), fields(charge_id = %charge.id))]
    pub fn evaluate(&self, charge: &Charge) -> Result<Vec<Insight>, ConditionError> {
        self.run(charge).map(|analysis| analysis.insights)
    }

    /// Insights plus the per-rule results that produced them
    #[instrument(skip(self, charge), fields(charge_id = %charge.id))]
    pub fn evaluate_with_report(&self, charge: &Charge) -> Result<ChargeAnalysis, ConditionError> {
        self.run(charge)
    }

    fn run(&self, charge: &Charge) -> Result<ChargeAnalysis, ConditionError> {
        let start = Instant::now();
        let context = ContextBuilder::build(charge);

        let mut insights = Vec::new();
        let mut results = Vec::with_capacity(self.store.len());

        for rule in self.store.iter() {
            let result = match self.executor.execute(rule, &context) {
                Ok(result) => result,
                Err(e) => {
                    error!(
                        rule_id = %e.rule_id(),
                        rule_description = %e.rule_description(),
                        code = e.code(),
                        error = %e,
                        "Rule condition failed, charge not evaluated"
                    );
                    record_charge_evaluation("error", start.elapsed().as_secs_f64());
                    return Err(e);
                }
            };
            record_rule_evaluation(result.matched, result.evaluation_time_us as f64 / 1e6);

            if result.matched {
                let insight = InsightFactory::create(rule, &context, charge);
                debug!(
                    rule_id = %insight.rule_id,
                    severity = %insight.severity,
                    revenue_at_risk_cents = insight.revenue_at_risk_cents,
                    "Rule matched"
                );
                insights.push(insight);
            }
            results.push(result);
        }

        for insight in &insights {
            record_insight(insight.severity.as_str());
        }
        record_charge_evaluation("ok", start.elapsed().as_secs_f64());
        debug!(insights = insights.len(), "Charge evaluated");

        Ok(ChargeAnalysis {
            charge_id: charge.id,
            insights,
            results,
        })
    }
}
