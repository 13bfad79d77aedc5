//! Condition interpreter
//!
//! Walks a parsed [`Expression`] against an [`EvaluationContext`]. Missing
//! fields resolve to `Undefined`, which makes every comparison involving
//! them false rather than an error; genuinely ill-typed comparisons are
//! reported as [`TypeError`].

use crate::ast::{Expression, Literal};
use crate::context::{EvaluationContext, FactValue, FieldType};
use crate::error::TypeError;
use crate::models::UnknownVariant;
use crate::operators::{ComparisonOperator, LogicalOperator, Predicate};
use regex::Regex;
use serde::Deserialize;
use std::cmp::Ordering;
use std::str::FromStr;

/// How `&&` and `||` treat their right operand once the left one decides
/// the result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperandPolicy {
    /// Always evaluate both operands, so a type error on either side is
    /// reported regardless of the other side's value.
    #[default]
    Strict,
    /// Skip the right operand when the left one decides.
    ShortCircuit,
}

impl FromStr for OperandPolicy {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "strict" => Ok(Self::Strict),
            "short_circuit" => Ok(Self::ShortCircuit),
            _ => Err(UnknownVariant {
                kind: "operand policy",
                value: s.to_string(),
            }),
        }
    }
}

/// Runtime value of a sub-expression
#[derive(Debug, Clone, PartialEq)]
enum Value<'a> {
    Int(i64),
    Str(&'a str),
    Bool(bool),
    /// `element` is the declared item type, known even when the list is empty
    List {
        items: Vec<Value<'a>>,
        element: Option<&'static str>,
    },
    Null,
    /// An identifier the context does not define
    Undefined,
}

impl<'a> Value<'a> {
    fn from_fact(fact: &'a FactValue) -> Self {
        match fact {
            FactValue::Int(n) => Value::Int(*n),
            FactValue::Str(s) => Value::Str(s),
            FactValue::Bool(b) => Value::Bool(*b),
            FactValue::List(items) => Value::List {
                items: items.iter().map(Value::from_fact).collect(),
                element: match fact.field_type() {
                    Some(FieldType::StrList) => Some("string"),
                    _ => None,
                },
            },
        }
    }

    /// List literal; the first defined, non-null item sets the element type
    fn list(items: Vec<Value<'a>>) -> Self {
        let element = items
            .iter()
            .find(|item| !matches!(item, Value::Null | Value::Undefined))
            .map(Value::type_name);
        Value::List { items, element }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "integer",
            Value::Str(_) => "string",
            Value::Bool(_) => "boolean",
            Value::List { .. } => "list",
            Value::Null => "null",
            Value::Undefined => "undefined",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExpressionEvaluator {
    policy: OperandPolicy,
}

impl ExpressionEvaluator {
    pub fn new(policy: OperandPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> OperandPolicy {
        self.policy
    }

    /// Evaluate a whole condition to a boolean
    pub fn evaluate(&self, expr: &Expression, ctx: &EvaluationContext) -> Result<bool, TypeError> {
        let value = self.eval(expr, ctx)?;
        Self::truthy(&value, expr)
    }

    fn eval<'a>(
        &self,
        expr: &'a Expression,
        ctx: &'a EvaluationContext,
    ) -> Result<Value<'a>, TypeError> {
        match expr {
            Expression::Literal(lit) => Ok(match lit {
                Literal::Int(n) => Value::Int(*n),
                Literal::Str(s) => Value::Str(s),
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Null => Value::Null,
            }),
            Expression::Identifier(name) => Ok(ctx
                .get_field(name)
                .map(Value::from_fact)
                .unwrap_or(Value::Undefined)),
            Expression::List(items) => items
                .iter()
                .map(|item| self.eval(item, ctx))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::list),
            Expression::Not(inner) => {
                let value = self.eval(inner, ctx)?;
                Ok(Value::Bool(!Self::truthy(&value, inner)?))
            }
            Expression::Logical { operator, operands } => {
                self.logical(*operator, operands, ctx).map(Value::Bool)
            }
            Expression::Comparison {
                operator,
                left,
                right,
            } => {
                let l = self.eval(left, ctx)?;
                let r = self.eval(right, ctx)?;
                Self::compare(*operator, &l, &r, expr).map(Value::Bool)
            }
            Expression::Membership { needle, haystack } => {
                let n = self.eval(needle, ctx)?;
                let h = self.eval(haystack, ctx)?;
                Self::in_list(&n, &h, expr).map(Value::Bool)
            }
            Expression::Call {
                target,
                predicate,
                argument,
            } => {
                let t = self.eval(target, ctx)?;
                let a = self.eval(argument, ctx)?;
                Self::call(*predicate, &t, &a, expr).map(Value::Bool)
            }
        }
    }

    /// Operands are evaluated left to right. Under `Strict` every operand
    /// runs, so a type error anywhere in the chain is reported.
    fn logical(
        &self,
        operator: LogicalOperator,
        operands: &[Expression],
        ctx: &EvaluationContext,
    ) -> Result<bool, TypeError> {
        // `&&` is decided by a false operand, `||` by a true one
        let decisive = operator == LogicalOperator::Or;
        let mut decided = false;

        for operand in operands {
            let value = Self::truthy(&self.eval(operand, ctx)?, operand)?;
            if value == decisive {
                decided = true;
                if self.policy == OperandPolicy::ShortCircuit {
                    break;
                }
            }
        }

        Ok(if decided { decisive } else { !decisive })
    }

    /// Boolean position: `Undefined` reads as false, anything else non-boolean
    /// is an error.
    fn truthy(value: &Value<'_>, expr: &Expression) -> Result<bool, TypeError> {
        match value {
            Value::Bool(b) => Ok(*b),
            Value::Undefined => Ok(false),
            other => Err(TypeError::new(
                expr.to_string(),
                format!("expected a boolean, found {}", other.type_name()),
            )),
        }
    }

    fn compare(
        operator: ComparisonOperator,
        left: &Value<'_>,
        right: &Value<'_>,
        expr: &Expression,
    ) -> Result<bool, TypeError> {
        // Undefined only ever equals null
        if matches!(left, Value::Undefined) || matches!(right, Value::Undefined) {
            let other = if matches!(left, Value::Undefined) {
                right
            } else {
                left
            };
            return Ok(operator == ComparisonOperator::Eq && matches!(other, Value::Null));
        }

        if let Some(list) = [left, right].into_iter().find(|v| matches!(v, Value::List { .. })) {
            return Err(TypeError::new(
                expr.to_string(),
                format!(
                    "'{operator}' cannot be applied to a {}; use 'in' or 'contains'",
                    list.type_name()
                ),
            ));
        }

        if operator.is_equality() {
            let equal = Self::eq(left, right, expr)?;
            return Ok(if operator == ComparisonOperator::Eq {
                equal
            } else {
                !equal
            });
        }

        let ordering = match (left, right) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (l, r) => {
                return Err(TypeError::new(
                    expr.to_string(),
                    format!("cannot order {} against {}", l.type_name(), r.type_name()),
                ));
            }
        };

        Ok(match operator {
            ComparisonOperator::Lt => ordering == Ordering::Less,
            ComparisonOperator::Lte => ordering != Ordering::Greater,
            ComparisonOperator::Gt => ordering == Ordering::Greater,
            ComparisonOperator::Gte => ordering != Ordering::Less,
            ComparisonOperator::Eq | ComparisonOperator::Neq => unreachable!(),
        })
    }

    /// Equality of two defined scalars. Null equals only null; any other
    /// mismatch of types is an error.
    fn eq(left: &Value<'_>, right: &Value<'_>, expr: &Expression) -> Result<bool, TypeError> {
        match (left, right) {
            (Value::Int(a), Value::Int(b)) => Ok(a == b),
            (Value::Str(a), Value::Str(b)) => Ok(a == b),
            (Value::Bool(a), Value::Bool(b)) => Ok(a == b),
            (Value::Null, Value::Null) => Ok(true),
            (Value::Null, _) | (_, Value::Null) => Ok(false),
            (l, r) => Err(TypeError::new(
                expr.to_string(),
                format!("cannot compare {} with {}", l.type_name(), r.type_name()),
            )),
        }
    }

    fn in_list(
        needle: &Value<'_>,
        haystack: &Value<'_>,
        expr: &Expression,
    ) -> Result<bool, TypeError> {
        let (items, element) = match haystack {
            Value::Undefined => return Ok(false),
            Value::List { items, element } => (items, *element),
            other => {
                return Err(TypeError::new(
                    expr.to_string(),
                    format!("right side of 'in' must be a list, found {}", other.type_name()),
                ));
            }
        };

        match needle {
            Value::Undefined => Ok(items.iter().any(|item| matches!(item, Value::Null))),
            Value::List { .. } => Err(TypeError::new(
                expr.to_string(),
                "left side of 'in' must be a single value, found list",
            )),
            _ => Self::any_equal(needle, items, element, expr),
        }
    }

    /// Scans the whole list: an ill-typed item is an error wherever the
    /// match is, and an empty list still checks against its element type.
    fn any_equal(
        needle: &Value<'_>,
        items: &[Value<'_>],
        element: Option<&'static str>,
        expr: &Expression,
    ) -> Result<bool, TypeError> {
        let needle_type = needle.type_name();
        if let Some(element) = element.filter(|e| *e != needle_type && needle_type != "null") {
            return Err(TypeError::new(
                expr.to_string(),
                format!("cannot compare {needle_type} with {element}"),
            ));
        }

        let mut found = false;
        for item in items {
            match item {
                Value::List { .. } => {
                    return Err(TypeError::new(expr.to_string(), "lists cannot be nested"));
                }
                Value::Undefined => {}
                _ => found |= Self::eq(needle, item, expr)?,
            }
        }
        Ok(found)
    }

    fn call(
        predicate: Predicate,
        target: &Value<'_>,
        argument: &Value<'_>,
        expr: &Expression,
    ) -> Result<bool, TypeError> {
        if matches!(target, Value::Undefined) || matches!(argument, Value::Undefined) {
            return Ok(false);
        }

        match (predicate, target) {
            (Predicate::Contains, Value::List { items, element }) => match argument {
                Value::List { .. } => Err(TypeError::new(
                    expr.to_string(),
                    "contains() expects a single value, found list",
                )),
                _ => Self::any_equal(argument, items, *element, expr),
            },
            (_, Value::Str(s)) => {
                let Value::Str(arg) = argument else {
                    return Err(TypeError::new(
                        expr.to_string(),
                        format!(
                            "{predicate}() expects a string argument, found {}",
                            argument.type_name()
                        ),
                    ));
                };
                match predicate {
                    Predicate::StartsWith => Ok(s.starts_with(arg)),
                    Predicate::EndsWith => Ok(s.ends_with(arg)),
                    Predicate::Contains => Ok(s.contains(arg)),
                    Predicate::Matches => Self::regex_match(s, arg, expr),
                }
            }
            (_, other) => Err(TypeError::new(
                expr.to_string(),
                format!("{predicate}() cannot be called on {}", other.type_name()),
            )),
        }
    }

    fn regex_match(value: &str, pattern: &str, expr: &Expression) -> Result<bool, TypeError> {
        // Patterns are checked when the condition is parsed
        let re = Regex::new(pattern)
            .map_err(|e| TypeError::new(expr.to_string(), format!("invalid pattern: {e}")))?;
        Ok(re.is_match(value))
    }
}
