//! Rule sources
//!
//! Where a session's rules come from. Persistence lives outside this crate;
//! the engine only needs something that can hand over the current rule set.

use crate::error::RuleStoreError;
use crate::models::Rule;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{info, instrument, warn};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RuleSource: Send + Sync {
    /// All rules, active or not
    async fn fetch_rules(&self) -> Result<Vec<Rule>, RuleStoreError>;
}

/// Rules held in memory
#[derive(Debug, Clone, Default)]
pub struct StaticRuleSource {
    rules: Vec<Rule>,
}

impl StaticRuleSource {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }
}

#[async_trait]
impl RuleSource for StaticRuleSource {
    async fn fetch_rules(&self) -> Result<Vec<Rule>, RuleStoreError> {
        Ok(self.rules.clone())
    }
}

/// Fields every import record must carry with a non-empty value
pub const REQUIRED_FIELDS: [&str; 7] = [
    "id",
    "name",
    "type",
    "description",
    "condition",
    "severity",
    "message",
];

/// A record that was skipped during import
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRecord {
    /// Position in the document
    pub index: usize,
    pub rule_id: Option<String>,
    pub reason: String,
}

/// Outcome of reading a rule document
#[derive(Debug, Clone, Default)]
pub struct RuleImport {
    pub rules: Vec<Rule>,
    pub rejected: Vec<RejectedRecord>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RuleDocument {
    Wrapped { rules: Vec<Value> },
    Bare(Vec<Value>),
}

/// Rules read from a JSON document, either `{ "rules": [...] }` or a bare
/// array. Each record is checked on its own and bad records are skipped.
#[derive(Debug, Clone)]
pub struct JsonFileRuleSource {
    path: PathBuf,
}

impl JsonFileRuleSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn read(&self) -> Result<RuleImport, RuleStoreError> {
        let json = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| RuleStoreError::Io {
                path: self.path.display().to_string(),
                source,
            })?;

        let import = Self::parse_document(&json)?;
        info!(
            imported = import.rules.len(),
            rejected = import.rejected.len(),
            "Rule document read"
        );
        Ok(import)
    }

    /// Parse a whole document. Only a malformed document is an error; bad
    /// records are collected in [`RuleImport::rejected`].
    pub fn parse_document(json: &str) -> Result<RuleImport, RuleStoreError> {
        let records = match serde_json::from_str::<RuleDocument>(json)? {
            RuleDocument::Wrapped { rules } | RuleDocument::Bare(rules) => rules,
        };

        let mut import = RuleImport::default();
        // A later record with the same id replaces the earlier one
        let mut positions: HashMap<String, usize> = HashMap::new();

        for (index, record) in records.into_iter().enumerate() {
            match Self::parse_record(&record) {
                Ok(rule) => {
                    if let Some(&at) = positions.get(&rule.id) {
                        warn!(rule_id = %rule.id, index, "Duplicate rule id, later record wins");
                        import.rules[at] = rule;
                    } else {
                        positions.insert(rule.id.clone(), import.rules.len());
                        import.rules.push(rule);
                    }
                }
                Err(reason) => {
                    let rule_id = record
                        .get("id")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    warn!(index, rule_id = ?rule_id, %reason, "Skipping rule record");
                    import.rejected.push(RejectedRecord {
                        index,
                        rule_id,
                        reason,
                    });
                }
            }
        }

        Ok(import)
    }

    fn parse_record(record: &Value) -> Result<Rule, String> {
        let Some(fields) = record.as_object() else {
            return Err("record is not an object".to_string());
        };

        for name in REQUIRED_FIELDS {
            match fields.get(name) {
                None | Some(Value::Null) => {
                    return Err(format!("missing required field '{name}'"));
                }
                Some(Value::String(s)) if s.trim().is_empty() => {
                    return Err(format!("required field '{name}' is empty"));
                }
                Some(_) => {}
            }
        }

        serde_json::from_value::<Rule>(record.clone()).map_err(|e| e.to_string())
    }
}

#[async_trait]
impl RuleSource for JsonFileRuleSource {
    async fn fetch_rules(&self) -> Result<Vec<Rule>, RuleStoreError> {
        Ok(self.read().await?.rules)
    }
}
