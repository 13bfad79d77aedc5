//! Rule executor
//!
//! Evaluates one compiled rule against a context and records the outcome,
//! with an optional trace of the facts the condition read.

use crate::compiler::CompiledRule;
use crate::context::EvaluationContext;
use crate::error::ConditionError;
use crate::evaluator::{ExpressionEvaluator, OperandPolicy};
use crate::models::EvaluationResult;
use std::time::Instant;

#[derive(Debug, Clone, Copy, Default)]
pub struct RuleExecutor {
    /// Record the fields read and the outcome in `evaluation_trace`
    trace_enabled: bool,
    evaluator: ExpressionEvaluator,
}

impl RuleExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trace(mut self) -> Self {
        self.trace_enabled = true;
        self
    }

    pub fn with_policy(mut self, policy: OperandPolicy) -> Self {
        self.evaluator = ExpressionEvaluator::new(policy);
        self
    }

    pub fn trace_enabled(&self) -> bool {
        self.trace_enabled
    }

    pub fn execute(
        &self,
        rule: &CompiledRule,
        context: &EvaluationContext,
    ) -> Result<EvaluationResult, ConditionError> {
        let start = Instant::now();

        let mut result = EvaluationResult::new(rule.id().to_string(), rule.name().to_string());

        let expression = rule.expression()?;
        let matched = self
            .evaluator
            .evaluate(expression, context)
            .map_err(|e| ConditionError::type_error(rule.id(), &rule.rule.description, e))?;

        if self.trace_enabled {
            for field in &rule.required_fields {
                let value = context
                    .get_field(field)
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "<undefined>".to_string());
                result.evaluation_trace.push(format!("{field} = {value}"));
            }
            result.evaluation_trace.push(format!(
                "{} => {}",
                rule.rule.condition,
                if matched { "MATCHED" } else { "NOT_MATCHED" }
            ));
        }

        result.matched = matched;
        result.evaluation_time_us = start.elapsed().as_micros() as i64;

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::RuleCompiler;
    use crate::context::FactValue;
    use crate::models::{Rule, RuleType, Severity};

    fn create_test_context() -> EvaluationContext {
        EvaluationContext::from_facts([
            ("charge_amount_cents", FactValue::Int(250_000)),
            ("payer_type", FactValue::from("COMMERCIAL")),
        ])
    }

    fn compile_rule(condition: &str) -> CompiledRule {
        RuleCompiler::compile(
            Rule::new("R-100", RuleType::Pricing, condition, Severity::Medium, "msg")
                .with_name("High amount")
                .with_description("Commercial high amount"),
        )
    }

    #[test]
    fn test_condition_match() {
        let rule = compile_rule("charge_amount_cents > 100000 && payer_type == 'COMMERCIAL'");
        let result = RuleExecutor::new()
            .execute(&rule, &create_test_context())
            .unwrap();

        assert!(result.matched);
        assert_eq!(result.rule_id, "R-100");
        assert_eq!(result.rule_name, "High amount");
        assert!(result.evaluation_trace.is_empty());
        assert!(result.evaluation_time_us >= 0);
    }

    #[test]
    fn test_condition_not_match() {
        let rule = compile_rule("payer_type in ['MEDICARE', 'MEDICAID']");
        let result = RuleExecutor::new()
            .execute(&rule, &create_test_context())
            .unwrap();

        assert!(!result.matched);
    }

    #[test]
    fn test_trace_output() {
        let rule = compile_rule("charge_amount_cents > 100000 && modifier == '25'");
        let result = RuleExecutor::new()
            .with_trace()
            .execute(&rule, &create_test_context())
            .unwrap();

        assert_eq!(
            result.evaluation_trace,
            vec![
                "charge_amount_cents = 250000".to_string(),
                "modifier = <undefined>".to_string(),
                "charge_amount_cents > 100000 && modifier == '25' => NOT_MATCHED".to_string(),
            ]
        );
    }

    #[test]
    fn test_syntax_error_names_rule() {
        let rule = compile_rule("charge_amount_cents >");
        let err = RuleExecutor::new()
            .execute(&rule, &create_test_context())
            .unwrap_err();

        assert_eq!(err.rule_id(), "R-100");
        assert_eq!(err.rule_description(), "Commercial high amount");
        assert!(matches!(err, ConditionError::Syntax { .. }));
    }

    #[test]
    fn test_type_error_names_rule() {
        let rule = compile_rule("payer_type >= 3");
        let err = RuleExecutor::new()
            .execute(&rule, &create_test_context())
            .unwrap_err();

        match err {
            ConditionError::Type {
                rule_id,
                expression,
                ..
            } => {
                assert_eq!(rule_id, "R-100");
                assert_eq!(expression, "payer_type >= 3");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_policy_applies() {
        let rule = compile_rule("payer_type == 'MEDICARE' && payer_type > 1");
        let ctx = create_test_context();

        assert!(RuleExecutor::new().execute(&rule, &ctx).is_err());
        let result = RuleExecutor::new()
            .with_policy(OperandPolicy::ShortCircuit)
            .execute(&rule, &ctx)
            .unwrap();
        assert!(!result.matched);
    }
}
