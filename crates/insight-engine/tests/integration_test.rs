//! End-to-end tests: rule document on disk, store, pipeline and batch runner.

use chrono::NaiveDate;
use insight_engine::{
    BatchEvaluator, Charge, ConditionError, Department, EvaluationPipeline, JsonFileRuleSource,
    Patient, PayerType, Rule, RuleSource, RuleStore, RuleType, Severity, Sex, StaticRuleSource,
};
use std::path::PathBuf;

fn charge(amount: i64, payer: PayerType) -> Charge {
    Charge::new(
        payer,
        amount,
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
        Patient {
            id: "P-100".into(),
            date_of_birth: NaiveDate::from_ymd_opt(1955, 6, 20).unwrap(),
            sex: Sex::Female,
        },
        Department {
            code: "CARD".into(),
            name: "Cardiology".into(),
        },
    )
    .with_procedure_codes(["93000", "99214-25"])
    .with_diagnosis_codes(["I10", "E11.9"])
}

fn rule(id: &str, condition: &str, severity: Severity) -> Rule {
    Rule::new(id, RuleType::Pricing, condition, severity, format!("{id} flagged"))
}

async fn pipeline(rules: Vec<Rule>) -> EvaluationPipeline {
    let store = RuleStore::load(&StaticRuleSource::new(rules)).await.unwrap();
    EvaluationPipeline::new(store)
}

/// Rule document written to a unique temp file, removed on drop
struct TempDocument(PathBuf);

impl TempDocument {
    fn new(name: &str, contents: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "insight-engine-{}-{}.json",
            name,
            std::process::id()
        ));
        std::fs::write(&path, contents).unwrap();
        Self(path)
    }
}

impl Drop for TempDocument {
    fn drop(&mut self) {
        std::fs::remove_file(&self.0).ok();
    }
}

#[tokio::test]
async fn test_high_dollar_charge_produces_one_insight() {
    let pipeline = pipeline(vec![rule(
        "HIGH-DOLLAR",
        "charge_amount_cents > 100000",
        Severity::High,
    )])
    .await;

    let charge = charge(250_000, PayerType::Medicare);
    let insights = pipeline.evaluate(&charge).unwrap();

    assert_eq!(insights.len(), 1);
    let insight = &insights[0];
    assert_eq!(insight.charge_id, charge.id);
    assert_eq!(insight.rule_id, "HIGH-DOLLAR");
    assert_eq!(insight.severity, Severity::High);
    assert_eq!(insight.rule_type, RuleType::Pricing);
    assert_eq!(insight.revenue_at_risk_cents, 250_000);

    let at_threshold = pipeline.evaluate(&self::charge(100_000, PayerType::Medicare)).unwrap();
    assert!(at_threshold.is_empty());
}

#[tokio::test]
async fn test_payer_membership() {
    let pipeline = pipeline(vec![rule(
        "GOV-PAYER",
        "payer_type in ['MEDICARE', 'MEDICAID']",
        Severity::Medium,
    )])
    .await;

    assert_eq!(pipeline.evaluate(&charge(500, PayerType::Medicare)).unwrap().len(), 1);
    assert_eq!(pipeline.evaluate(&charge(500, PayerType::Medicaid)).unwrap().len(), 1);
    assert!(pipeline.evaluate(&charge(500, PayerType::Commercial)).unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_field_never_matches() {
    let pipeline = pipeline(vec![
        rule("U-1", "referring_provider == 'DR-1'", Severity::Low),
        rule("U-2", "prior_auth_number > 0", Severity::Low),
        rule("U-3", "referring_provider != 'DR-1'", Severity::Low),
    ])
    .await;

    let insights = pipeline.evaluate(&charge(500, PayerType::Commercial)).unwrap();
    assert!(insights.is_empty());
}

#[tokio::test]
async fn test_malformed_rule_is_a_syntax_error_naming_the_rule() {
    let pipeline = pipeline(vec![
        rule("A-OK", "charge_amount_cents > 0", Severity::Low),
        rule("B-BROKEN", "charge_amount_cents >", Severity::High)
            .with_description("Broken threshold"),
    ])
    .await;

    assert_eq!(pipeline.store().stats().invalid_rules, 1);

    let err = pipeline.evaluate(&charge(500, PayerType::Medicare)).unwrap_err();
    assert!(matches!(err, ConditionError::Syntax { .. }));
    assert_eq!(err.rule_id(), "B-BROKEN");
    assert_eq!(err.rule_description(), "Broken threshold");
    assert!(err.to_string().contains("B-BROKEN"));
}

#[tokio::test]
async fn test_oversized_condition_is_a_syntax_error() {
    let long_chain = vec!["payer_type == 'X'"; 20_000].join(" && ");
    let wide_but_allowed = vec!["payer_type == 'X'"; 500].join(" || ");
    let pipeline = pipeline(vec![
        rule("CHAIN-OK", &wide_but_allowed, Severity::Low),
        rule("CHAIN-TOO-LONG", &long_chain, Severity::Low),
    ])
    .await;

    assert_eq!(pipeline.store().stats().invalid_rules, 1);
    assert!(pipeline.store().get("CHAIN-OK").unwrap().is_valid());

    let err = pipeline.evaluate(&charge(500, PayerType::Medicare)).unwrap_err();
    assert!(matches!(err, ConditionError::Syntax { .. }));
    assert_eq!(err.rule_id(), "CHAIN-TOO-LONG");
}

#[tokio::test]
async fn test_evaluation_is_repeatable() {
    let pipeline = pipeline(vec![
        rule("R-1", "charge_amount_cents >= 1000", Severity::Low),
        rule("R-2", "'25' in procedure_modifiers", Severity::Medium),
        rule("R-3", "diagnosis_codes.contains('I10')", Severity::High),
    ])
    .await;
    let charge = charge(5_000, PayerType::Commercial);

    let first = pipeline.evaluate(&charge).unwrap();
    let second = pipeline.evaluate(&charge).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), 3);
}

#[tokio::test]
async fn test_revenue_field_and_rule_order() {
    let pipeline = pipeline(vec![
        rule("Z-LAST", "patient_age_years >= 65", Severity::Low),
        rule("A-FIRST", "procedure_code == '93000'", Severity::Critical)
            .with_revenue_field("charge_amount_cents"),
        rule("M-MIDDLE", "department_code.startsWith('CA')", Severity::Medium)
            .with_revenue_field("department_code"),
    ])
    .await;

    let insights = pipeline.evaluate(&charge(42_000, PayerType::Medicare)).unwrap();
    let ids: Vec<_> = insights.iter().map(|i| i.rule_id.as_str()).collect();
    assert_eq!(ids, vec!["A-FIRST", "M-MIDDLE", "Z-LAST"]);

    assert_eq!(insights[0].revenue_at_risk_cents, 42_000);
    // A non-numeric revenue field falls back to the charge amount
    assert_eq!(insights[1].revenue_at_risk_cents, 42_000);
}

#[tokio::test]
async fn test_inactive_rules_are_skipped() {
    let pipeline = pipeline(vec![
        rule("R-1", "charge_amount_cents > 0", Severity::Low).inactive(),
        rule("R-2", "charge_amount_cents > 0", Severity::Low),
    ])
    .await;

    assert_eq!(pipeline.store().len(), 1);
    let insights = pipeline.evaluate(&charge(1, PayerType::Medicare)).unwrap();
    assert_eq!(insights.len(), 1);
    assert_eq!(insights[0].rule_id, "R-2");
}

#[tokio::test]
async fn test_json_document_to_insights() {
    let document = TempDocument::new(
        "document",
        r#"{
            "rules": [
                {
                    "id": "PR-002",
                    "name": "Modifier 25 with E/M",
                    "type": "validation",
                    "description": "E/M visit billed with modifier 25",
                    "condition": "'25' in procedure_modifiers && procedure_base_codes.contains('99214')",
                    "severity": "medium",
                    "message": "Check documentation for a separately identifiable service"
                },
                {
                    "id": "PR-001",
                    "name": "High dollar Medicare",
                    "type": "pricing",
                    "description": "Medicare charge over $1,000",
                    "condition": "payer_type == \"MEDICARE\" && charge_amount_cents > 100000",
                    "severity": "high",
                    "message": "High dollar Medicare charge",
                    "revenue_at_risk_in_cents": "charge_amount_cents"
                },
                {
                    "id": "PR-003",
                    "name": "Missing message",
                    "type": "pricing",
                    "description": "Rejected on import",
                    "condition": "true",
                    "severity": "low"
                },
                {
                    "id": "PR-004",
                    "name": "Disabled",
                    "type": "eligibility",
                    "description": "Never evaluated",
                    "condition": "true",
                    "severity": "low",
                    "message": "disabled",
                    "enabled": false
                }
            ]
        }"#,
    );

    let source = JsonFileRuleSource::new(&document.0);
    let import = source.read().await.unwrap();
    assert_eq!(import.rules.len(), 3);
    assert_eq!(import.rejected.len(), 1);
    assert_eq!(import.rejected[0].rule_id.as_deref(), Some("PR-003"));

    let fetched = source.fetch_rules().await.unwrap();
    assert_eq!(fetched.len(), 3);

    let store = RuleStore::load(&source).await.unwrap();
    assert_eq!(store.len(), 2);
    assert_eq!(store.rules()[0].id(), "PR-001");

    let pipeline = EvaluationPipeline::new(store);
    let insights = pipeline.evaluate(&charge(180_000, PayerType::Medicare)).unwrap();
    let ids: Vec<_> = insights.iter().map(|i| i.rule_id.as_str()).collect();
    assert_eq!(ids, vec!["PR-001", "PR-002"]);
    assert_eq!(insights[0].revenue_at_risk_cents, 180_000);
    assert_eq!(insights[1].severity, Severity::Medium);
}

#[tokio::test]
async fn test_missing_document_fails_the_session() {
    let source = JsonFileRuleSource::new(std::env::temp_dir().join("insight-engine-absent.json"));
    let err = RuleStore::load(&source).await.unwrap_err();
    assert_eq!(err.code(), "RULE_STORE_IO_ERROR");
}

#[tokio::test]
async fn test_batch_matches_sequential_evaluation() {
    let pipeline = pipeline(vec![
        rule("R-1", "charge_amount_cents > 100000", Severity::High),
        rule("R-2", "payer_type != 'COMMERCIAL'", Severity::Low),
    ])
    .await;

    let charges: Vec<Charge> = (0..20)
        .map(|i| {
            let payer = if i % 2 == 0 {
                PayerType::Commercial
            } else {
                PayerType::Medicaid
            };
            charge(i * 20_000, payer)
        })
        .collect();

    let expected: Vec<_> = charges
        .iter()
        .map(|c| pipeline.evaluate(c).unwrap())
        .collect();

    let report = BatchEvaluator::new(pipeline, 4).run(charges.clone()).await;

    assert!(!report.has_failures());
    assert_eq!(report.outcomes.len(), charges.len());
    for ((outcome, charge), expected) in report.outcomes.iter().zip(&charges).zip(&expected) {
        assert_eq!(outcome.charge_id, charge.id);
        assert_eq!(outcome.result.as_ref().unwrap(), expected);
    }

    let total: usize = expected.iter().map(Vec::len).sum();
    assert_eq!(report.summary.charges, 20);
    assert_eq!(report.summary.insights, total);
}
