//! Insight construction for matched rules

use crate::compiler::CompiledRule;
use crate::context::EvaluationContext;
use crate::models::{Charge, Insight};

pub struct InsightFactory;

impl InsightFactory {
    /// Build the finding for a rule that matched `charge`.
    ///
    /// Revenue at risk is read from the context field the rule names, when
    /// that field holds integer cents; otherwise the full charge amount is
    /// at risk.
    pub fn create(rule: &CompiledRule, context: &EvaluationContext, charge: &Charge) -> Insight {
        let revenue_at_risk_cents = rule
            .rule
            .revenue_at_risk_field
            .as_deref()
            .and_then(|field| context.get_field(field))
            .and_then(|value| value.as_cents())
            .unwrap_or(charge.charge_amount_cents);

        Insight {
            charge_id: charge.id,
            rule_id: rule.rule.id.clone(),
            rule_type: rule.rule.rule_type,
            severity: rule.rule.severity,
            message: rule.rule.message.clone(),
            revenue_at_risk_cents,
        }
    }
}
