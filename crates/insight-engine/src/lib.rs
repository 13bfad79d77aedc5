//! Charge insight engine
//!
//! Evaluates healthcare charges against authored rules and produces
//! insights with severity and revenue at risk:
//! - a small condition language (lexer, parser, tree-walking interpreter)
//! - a fixed mapping from a charge to named facts
//! - per-session rule compilation and caching
//! - fail-fast evaluation of all rules against one charge
//! - bounded-concurrency batch evaluation

pub mod ast;
pub mod batch;
pub mod codes;
pub mod compiler;
pub mod context;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod insight;
pub mod lexer;
pub mod models;
pub mod operators;
pub mod parser;
pub mod pipeline;
pub mod source;
pub mod store;

pub use batch::{BatchEvaluator, BatchReport, BatchSummary, ChargeFindings, ChargeOutcome};
pub use compiler::{CompiledRule, RuleCompiler};
pub use context::{ContextBuilder, EvaluationContext, FactValue};
pub use error::{
    BatchError, ChargeValidationError, ConditionError, EngineError, ParseError, Result,
    RuleStoreError, TypeError,
};
pub use evaluator::{ExpressionEvaluator, OperandPolicy};
pub use executor::RuleExecutor;
pub use insight::InsightFactory;
pub use models::{
    Charge, ChargeAnalysis, Department, EvaluationResult, Insight, Patient, PayerType, Rule,
    RuleType, Severity, Sex,
};
pub use parser::parse_condition;
pub use pipeline::EvaluationPipeline;
pub use source::{JsonFileRuleSource, RuleSource, StaticRuleSource};
pub use store::{RuleStore, RuleStoreStats};
