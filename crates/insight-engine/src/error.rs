//! Rule engine error types
//!
//! `ConditionError` is an authoring defect in one rule and aborts the charge
//! being evaluated. `RuleStoreError` means the session could not be started.

use crate::models::UnknownVariant;
use thiserror::Error;

/// Failure while parsing a condition, before any rule id is attached.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at offset {position}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

/// Type failure raised by the interpreter, before any rule id is attached.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason} in `{expression}`")]
pub struct TypeError {
    /// Rendering of the offending sub-expression
    pub expression: String,
    pub reason: String,
}

impl TypeError {
    pub fn new(expression: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            reason: reason.into(),
        }
    }
}

/// A rule whose condition cannot be evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionError {
    #[error("rule {rule_id} ({rule_description}): condition does not parse: {reason}")]
    Syntax {
        rule_id: String,
        rule_description: String,
        reason: String,
    },

    #[error(
        "rule {rule_id} ({rule_description}): type error in `{expression}`: {reason}"
    )]
    Type {
        rule_id: String,
        rule_description: String,
        expression: String,
        reason: String,
    },
}

impl ConditionError {
    pub fn syntax(rule_id: &str, rule_description: &str, err: &ParseError) -> Self {
        Self::Syntax {
            rule_id: rule_id.to_string(),
            rule_description: rule_description.to_string(),
            reason: err.to_string(),
        }
    }

    pub fn type_error(rule_id: &str, rule_description: &str, err: TypeError) -> Self {
        Self::Type {
            rule_id: rule_id.to_string(),
            rule_description: rule_description.to_string(),
            expression: err.expression,
            reason: err.reason,
        }
    }

    /// Id of the rule that has to be fixed
    pub fn rule_id(&self) -> &str {
        match self {
            Self::Syntax { rule_id, .. } | Self::Type { rule_id, .. } => rule_id,
        }
    }

    pub fn rule_description(&self) -> &str {
        match self {
            Self::Syntax {
                rule_description, ..
            }
            | Self::Type {
                rule_description, ..
            } => rule_description,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Syntax { .. } => "CONDITION_SYNTAX_ERROR",
            Self::Type { .. } => "CONDITION_TYPE_ERROR",
        }
    }
}

/// The rule source could not be read.
#[derive(Debug, Error)]
pub enum RuleStoreError {
    #[error("rule source unavailable: {0}")]
    Unavailable(String),

    #[error("failed to read rule file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("rule document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl RuleStoreError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "RULE_STORE_UNAVAILABLE",
            Self::Io { .. } => "RULE_STORE_IO_ERROR",
            Self::Json(_) => "RULE_STORE_INVALID_DOCUMENT",
        }
    }
}

/// A charge record that fails shape checks before evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChargeValidationError {
    #[error("charge has no procedure codes")]
    NoProcedureCodes,

    #[error("invalid procedure code: {0}")]
    InvalidProcedureCode(String),

    #[error("invalid ICD-10 code: {0}")]
    InvalidDiagnosisCode(String),

    #[error("charge amount must not be negative: {0}")]
    NegativeAmount(i64),

    #[error("service date {service_date} precedes date of birth {date_of_birth}")]
    ServiceBeforeBirth {
        service_date: chrono::NaiveDate,
        date_of_birth: chrono::NaiveDate,
    },
}

/// Why one charge of a batch produced no insights.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    #[error(transparent)]
    Condition(#[from] ConditionError),

    #[error("evaluation task failed: {0}")]
    Task(String),
}

impl BatchError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Condition(e) => e.code(),
            Self::Task(_) => "EVALUATION_TASK_FAILED",
        }
    }
}

/// Umbrella error for callers driving a whole session.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Condition(#[from] ConditionError),

    #[error(transparent)]
    RuleStore(#[from] RuleStoreError),

    #[error("invalid evaluation settings: {0}")]
    Config(#[from] UnknownVariant),
}

impl EngineError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Condition(e) => e.code(),
            Self::RuleStore(e) => e.code(),
            Self::Config(_) => "INVALID_EVALUATION_CONFIG",
        }
    }

    /// Loading may succeed on a later attempt; a broken condition will not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RuleStore(_))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
