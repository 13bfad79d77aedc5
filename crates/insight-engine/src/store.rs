//! Rule store
//!
//! One evaluation session's rule set: loaded once, filtered to active rules,
//! compiled and sorted by id. The store is immutable afterwards, so clones
//! share the same compiled rules across threads without locking.

use crate::compiler::{CompiledRule, RuleCompiler};
use crate::error::RuleStoreError;
use crate::models::Rule;
use crate::source::RuleSource;
use insight_shared::observability::metrics::set_rule_store_size;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Summary of a loaded session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RuleStoreStats {
    pub total_rules: usize,
    /// Active rules whose condition does not parse
    pub invalid_rules: usize,
    pub referenced_fields: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub struct RuleStore {
    rules: Arc<[CompiledRule]>,
}

impl RuleStore {
    /// Fetch and compile the active rules of a source.
    #[instrument(skip(source))]
    pub async fn load(source: &dyn RuleSource) -> Result<Self, RuleStoreError> {
        let rules = source.fetch_rules().await.inspect_err(|e| {
            error!(code = e.code(), error = %e, "Failed to load rules");
        })?;

        let fetched = rules.len();
        let store = Self::from_rules(rules);
        info!(
            fetched,
            active = store.len(),
            "Rule session loaded"
        );
        Ok(store)
    }

    /// Build a session from rules already in memory
    pub fn from_rules(rules: Vec<Rule>) -> Self {
        let mut compiled: Vec<CompiledRule> = rules
            .into_iter()
            .filter(|rule| rule.active)
            .map(RuleCompiler::compile)
            .collect();
        // Stable, so rules sharing an id keep their source order
        compiled.sort_by(|a, b| a.id().cmp(b.id()));

        for rule in compiled.iter().filter(|r| !r.is_valid()) {
            if let Err(e) = rule.expression() {
                warn!(rule_id = %rule.id(), error = %e, "Rule condition does not parse");
            }
        }

        set_rule_store_size(compiled.len());

        Self {
            rules: compiled.into(),
        }
    }

    /// Compiled rules in evaluation order
    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompiledRule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, rule_id: &str) -> Option<&CompiledRule> {
        self.rules
            .binary_search_by(|r| r.id().cmp(rule_id))
            .ok()
            .map(|i| &self.rules[i])
    }

    pub fn stats(&self) -> RuleStoreStats {
        RuleStoreStats {
            total_rules: self.rules.len(),
            invalid_rules: self.rules.iter().filter(|r| !r.is_valid()).count(),
            referenced_fields: self
                .rules
                .iter()
                .flat_map(|r| r.required_fields.iter().cloned())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RuleType, Severity};
    use crate::source::MockRuleSource;

    fn rule(id: &str, condition: &str) -> Rule {
        Rule::new(id, RuleType::Validation, condition, Severity::Medium, "msg")
    }

    #[test]
    fn test_from_rules_filters_and_sorts() {
        let store = RuleStore::from_rules(vec![
            rule("R-010", "payer_type == 'MEDICARE'"),
            rule("R-002", "charge_amount_cents > 0"),
            rule("R-005", "true").inactive(),
            rule("R-001", "procedure_count > 1"),
        ]);

        let ids: Vec<_> = store.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["R-001", "R-002", "R-010"]);
        assert!(store.get("R-005").is_none());
        assert_eq!(store.get("R-002").unwrap().name(), "R-002");
    }

    #[test]
    fn test_ids_sort_by_bytes() {
        let store = RuleStore::from_rules(vec![
            rule("r-1", "true"),
            rule("R-10", "true"),
            rule("R-9", "true"),
        ]);

        let ids: Vec<_> = store.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["R-10", "R-9", "r-1"]);
    }

    #[test]
    fn test_invalid_rule_is_kept() {
        let store = RuleStore::from_rules(vec![
            rule("R-001", "charge_amount_cents >"),
            rule("R-002", "payer_type == 'MEDICAID' && procedure_count > 2"),
        ]);

        let stats = store.stats();
        assert_eq!(stats.total_rules, 2);
        assert_eq!(stats.invalid_rules, 1);
        assert_eq!(
            stats.referenced_fields.into_iter().collect::<Vec<_>>(),
            vec!["payer_type", "procedure_count"]
        );
    }

    #[test]
    fn test_clone_shares_rules() {
        let store = RuleStore::from_rules(vec![rule("R-001", "true")]);
        let clone = store.clone();
        assert!(std::ptr::eq(store.rules().as_ptr(), clone.rules().as_ptr()));
    }

    #[tokio::test]
    async fn test_load_from_source() {
        let mut source = MockRuleSource::new();
        source
            .expect_fetch_rules()
            .times(1)
            .returning(|| Ok(vec![rule("B", "true"), rule("A", "true").inactive()]));

        let store = RuleStore::load(&source).await.unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.rules()[0].id(), "B");
    }

    #[tokio::test]
    async fn test_load_source_failure() {
        let mut source = MockRuleSource::new();
        source
            .expect_fetch_rules()
            .returning(|| Err(RuleStoreError::Unavailable("connection refused".into())));

        let err = RuleStore::load(&source).await.unwrap_err();
        assert_eq!(err.code(), "RULE_STORE_UNAVAILABLE");
    }

    #[tokio::test]
    async fn test_load_empty_source() {
        let mut source = MockRuleSource::new();
        source.expect_fetch_rules().returning(|| Ok(vec![]));

        let store = RuleStore::load(&source).await.unwrap();
        assert!(store.is_empty());
        assert_eq!(store.stats(), RuleStoreStats::default());
    }
}
