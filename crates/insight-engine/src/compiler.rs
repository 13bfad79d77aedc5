//! Rule compiler
//!
//! Parses each rule's condition once per session and pre-extracts the
//! context fields it reads. A condition that fails to parse is kept with its
//! error, so the failure is reported when the rule is evaluated.

use crate::ast::Expression;
use crate::error::{ConditionError, ParseError};
use crate::models::Rule;
use crate::parser::parse_condition;
use std::collections::BTreeSet;

/// A rule together with its parsed condition
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: Rule,
    /// Parse outcome, cached for the whole session
    expression: Result<Expression, ParseError>,
    /// Context fields the condition reads; empty when it does not parse
    pub required_fields: BTreeSet<String>,
}

impl CompiledRule {
    pub fn id(&self) -> &str {
        &self.rule.id
    }

    pub fn name(&self) -> &str {
        &self.rule.name
    }

    pub fn is_valid(&self) -> bool {
        self.expression.is_ok()
    }

    /// The parsed condition, or the syntax error naming this rule
    pub fn expression(&self) -> Result<&Expression, ConditionError> {
        self.expression
            .as_ref()
            .map_err(|e| ConditionError::syntax(&self.rule.id, &self.rule.description, e))
    }
}

pub struct RuleCompiler;

impl RuleCompiler {
    pub fn compile(rule: Rule) -> CompiledRule {
        let expression = parse_condition(&rule.condition);
        let required_fields = expression
            .as_ref()
            .map(Expression::identifiers)
            .unwrap_or_default();

        CompiledRule {
            rule,
            expression,
            required_fields,
        }
    }
}
