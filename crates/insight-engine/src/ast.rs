//! Condition syntax tree

use crate::operators::{ComparisonOperator, LogicalOperator, Predicate};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    Int(i64),
    Str(String),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    Literal(Literal),
    /// Bare name resolved against the context
    Identifier(String),
    /// `[a, b, c]`
    List(Vec<Expression>),
    Not(Box<Expression>),
    /// `a && b && c`, kept flat so long chains do not deepen the tree
    Logical {
        operator: LogicalOperator,
        operands: Vec<Expression>,
    },
    Comparison {
        operator: ComparisonOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    /// `needle in haystack`
    Membership {
        needle: Box<Expression>,
        haystack: Box<Expression>,
    },
    /// `target.predicate(argument)`
    Call {
        target: Box<Expression>,
        predicate: Predicate,
        argument: Box<Expression>,
    },
}

impl Expression {
    pub fn int(value: i64) -> Self {
        Self::Literal(Literal::Int(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::Literal(Literal::Str(value.into()))
    }

    pub fn bool(value: bool) -> Self {
        Self::Literal(Literal::Bool(value))
    }

    pub fn null() -> Self {
        Self::Literal(Literal::Null)
    }

    pub fn ident(name: impl Into<String>) -> Self {
        Self::Identifier(name.into())
    }

    pub fn not(inner: Expression) -> Self {
        Self::Not(Box::new(inner))
    }

    pub fn logical(left: Expression, operator: LogicalOperator, right: Expression) -> Self {
        Self::Logical {
            operator,
            operands: vec![left, right],
        }
    }

    pub fn compare(left: Expression, operator: ComparisonOperator, right: Expression) -> Self {
        Self::Comparison {
            operator,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn membership(needle: Expression, haystack: Expression) -> Self {
        Self::Membership {
            needle: Box::new(needle),
            haystack: Box::new(haystack),
        }
    }

    pub fn call(target: Expression, predicate: Predicate, argument: Expression) -> Self {
        Self::Call {
            target: Box::new(target),
            predicate,
            argument: Box::new(argument),
        }
    }

    /// Every context field the expression reads
    pub fn identifiers(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect_identifiers(&mut names);
        names
    }

    fn collect_identifiers(&self, names: &mut BTreeSet<String>) {
        match self {
            Self::Literal(_) => {}
            Self::Identifier(name) => {
                names.insert(name.clone());
            }
            Self::List(items)
            | Self::Logical {
                operands: items, ..
            } => {
                for item in items {
                    item.collect_identifiers(names);
                }
            }
            Self::Not(inner) => inner.collect_identifiers(names),
            Self::Comparison { left, right, .. } => {
                left.collect_identifiers(names);
                right.collect_identifiers(names);
            }
            Self::Membership { needle, haystack } => {
                needle.collect_identifiers(names);
                haystack.collect_identifiers(names);
            }
            Self::Call {
                target, argument, ..
            } => {
                target.collect_identifiers(names);
                argument.collect_identifiers(names);
            }
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Null => f.write_str("null"),
        }
    }
}

/// Renders fully parenthesised source, so error messages show how the
/// condition was grouped.
impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(lit) => write!(f, "{lit}"),
            Self::Identifier(name) => f.write_str(name),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Not(inner) => write!(f, "!{inner}"),
            Self::Logical { operator, operands } => {
                f.write_str("(")?;
                for (i, operand) in operands.iter().enumerate() {
                    if i > 0 {
                        write!(f, " {operator} ")?;
                    }
                    write!(f, "{operand}")?;
                }
                f.write_str(")")
            }
            Self::Comparison {
                operator,
                left,
                right,
            } => write!(f, "{left} {operator} {right}"),
            Self::Membership { needle, haystack } => write!(f, "{needle} in {haystack}"),
            Self::Call {
                target,
                predicate,
                argument,
            } => write!(f, "{target}.{predicate}({argument})"),
        }
    }
}
