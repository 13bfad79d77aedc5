//! Condition language operators

use std::fmt;

/// Scalar comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOperator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl ComparisonOperator {
    /// `==` and `!=` are defined for every scalar type; the rest only order
    /// integers and strings.
    pub fn is_equality(&self) -> bool {
        matches!(self, Self::Eq | Self::Neq)
    }
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Eq => "==",
            Self::Neq => "!=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        };
        f.write_str(s)
    }
}

/// Logical connective
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalOperator {
    And,
    Or,
}

impl fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And => f.write_str("&&"),
            Self::Or => f.write_str("||"),
        }
    }
}

/// String predicate called as a method, e.g. `procedure_code.startsWith("70")`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Predicate {
    StartsWith,
    EndsWith,
    /// Substring on strings, membership on lists
    Contains,
    /// Regular expression match
    Matches,
}

impl Predicate {
    pub const METHODS: [&'static str; 4] = ["startsWith", "endsWith", "contains", "matches"];

    pub fn from_method(name: &str) -> Option<Self> {
        match name {
            "startsWith" => Some(Self::StartsWith),
            "endsWith" => Some(Self::EndsWith),
            "contains" => Some(Self::Contains),
            "matches" => Some(Self::Matches),
            _ => None,
        }
    }

    pub fn method_name(&self) -> &'static str {
        match self {
            Self::StartsWith => "startsWith",
            Self::EndsWith => "endsWith",
            Self::Contains => "contains",
            Self::Matches => "matches",
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_names_round_trip() {
        for name in Predicate::METHODS {
            let predicate = Predicate::from_method(name).unwrap();
            assert_eq!(predicate.method_name(), name);
        }
        assert_eq!(Predicate::from_method("toUpperCase"), None);
    }

    #[test]
    fn test_comparison_display() {
        assert_eq!(ComparisonOperator::Gte.to_string(), ">=");
        assert!(ComparisonOperator::Neq.is_equality());
        assert!(!ComparisonOperator::Lt.is_equality());
    }
}
