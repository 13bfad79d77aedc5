//! Domain models: charges, rules and insights

use crate::codes::{is_icd10_code, is_procedure_code, normalize_code};
use crate::error::ChargeValidationError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unrecognised enum text in a charge or rule record
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

fn normalize(value: &str) -> String {
    value.trim().to_uppercase()
}

/// Payer responsible for the charge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum PayerType {
    Medicare,
    Medicaid,
    Commercial,
}

impl PayerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Medicare => "MEDICARE",
            Self::Medicaid => "MEDICAID",
            Self::Commercial => "COMMERCIAL",
        }
    }
}

impl FromStr for PayerType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "MEDICARE" => Ok(Self::Medicare),
            "MEDICAID" => Ok(Self::Medicaid),
            "COMMERCIAL" => Ok(Self::Commercial),
            _ => Err(UnknownVariant {
                kind: "payer type",
                value: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for PayerType {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for PayerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Patient sex as recorded on the claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum Sex {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
    #[serde(rename = "O")]
    Other,
}

impl Sex {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "M",
            Self::Female => "F",
            Self::Other => "O",
        }
    }
}

impl FromStr for Sex {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "M" | "MALE" => Ok(Self::Male),
            "F" | "FEMALE" => Ok(Self::Female),
            "O" | "OTHER" => Ok(Self::Other),
            _ => Err(UnknownVariant {
                kind: "sex",
                value: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for Sex {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Category a rule belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum RuleType {
    Eligibility,
    Pricing,
    Validation,
    Authorization,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eligibility => "ELIGIBILITY",
            Self::Pricing => "PRICING",
            Self::Validation => "VALIDATION",
            Self::Authorization => "AUTHORIZATION",
        }
    }
}

impl FromStr for RuleType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "ELIGIBILITY" => Ok(Self::Eligibility),
            "PRICING" => Ok(Self::Pricing),
            "VALIDATION" => Ok(Self::Validation),
            "AUTHORIZATION" => Ok(Self::Authorization),
            _ => Err(UnknownVariant {
                kind: "rule type",
                value: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for RuleType {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Insight severity, ordered LOW < MEDIUM < HIGH < CRITICAL
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum Severity {
    /// Informational, no immediate financial or compliance risk
    Low,
    /// Needs review before it becomes a problem
    Medium,
    /// Likely financial or compliance impact
    High,
    /// Audit or regulatory exposure, act now
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    /// Numeric importance, LOW = 1 through CRITICAL = 4
    pub fn weight(&self) -> u8 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
            Self::Critical => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

impl FromStr for Severity {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "LOW" => Ok(Self::Low),
            "MEDIUM" => Ok(Self::Medium),
            "HIGH" => Ok(Self::High),
            "CRITICAL" => Ok(Self::Critical),
            _ => Err(UnknownVariant {
                kind: "severity",
                value: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for Severity {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    pub id: String,
    pub date_of_birth: NaiveDate,
    pub sex: Sex,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub code: String,
    pub name: String,
}

/// A billable healthcare event.
///
/// Built by request handling and never mutated afterwards; the engine only
/// reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Charge {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    /// Ordered set, first occurrence wins
    pub procedure_codes: Vec<String>,
    #[serde(default)]
    pub diagnosis_codes: BTreeSet<String>,
    pub charge_amount_cents: i64,
    pub payer_type: PayerType,
    pub service_date: NaiveDate,
    pub department: Department,
    pub patient: Patient,
}

impl Charge {
    pub fn new(
        payer_type: PayerType,
        charge_amount_cents: i64,
        service_date: NaiveDate,
        patient: Patient,
        department: Department,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            procedure_codes: Vec::new(),
            diagnosis_codes: BTreeSet::new(),
            charge_amount_cents,
            payer_type,
            service_date,
            department,
            patient,
        }
    }

    pub fn with_procedure_codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.procedure_codes = codes.into_iter().map(|c| c.as_ref().to_string()).collect();
        self.normalized()
    }

    pub fn with_diagnosis_codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.diagnosis_codes = codes.into_iter().map(|c| c.as_ref().to_string()).collect();
        self.normalized()
    }

    /// Upper-case and trim every code, dropping blanks and repeated
    /// procedure codes.
    pub fn normalized(mut self) -> Self {
        let mut seen = BTreeSet::new();
        self.procedure_codes = self
            .procedure_codes
            .iter()
            .map(|c| normalize_code(c))
            .filter(|c| !c.is_empty() && seen.insert(c.clone()))
            .collect();

        self.diagnosis_codes = self
            .diagnosis_codes
            .iter()
            .map(|c| normalize_code(c))
            .filter(|c| !c.is_empty())
            .collect();

        self
    }

    /// Shape checks a request handler runs before handing the charge over.
    /// Reports every problem, not just the first.
    pub fn validate(&self) -> Result<(), Vec<ChargeValidationError>> {
        let mut problems = Vec::new();

        if self.procedure_codes.is_empty() {
            problems.push(ChargeValidationError::NoProcedureCodes);
        }
        for code in &self.procedure_codes {
            if !is_procedure_code(code) {
                problems.push(ChargeValidationError::InvalidProcedureCode(code.clone()));
            }
        }
        for code in &self.diagnosis_codes {
            if !is_icd10_code(code) {
                problems.push(ChargeValidationError::InvalidDiagnosisCode(code.clone()));
            }
        }
        if self.charge_amount_cents < 0 {
            problems.push(ChargeValidationError::NegativeAmount(
                self.charge_amount_cents,
            ));
        }
        if self.service_date < self.patient.date_of_birth {
            problems.push(ChargeValidationError::ServiceBeforeBirth {
                service_date: self.service_date,
                date_of_birth: self.patient.date_of_birth,
            });
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }
}

fn default_active() -> bool {
    true
}

/// An authored rule.
///
/// Import records spell `active` as `enabled` and `revenue_at_risk_field` as
/// `revenue_at_risk_in_cents`; both spellings are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    pub description: String,
    pub condition: String,
    pub severity: Severity,
    pub message: String,
    #[serde(default, alias = "revenue_at_risk_in_cents")]
    pub revenue_at_risk_field: Option<String>,
    #[serde(default = "default_active", alias = "enabled")]
    pub active: bool,
}

impl Rule {
    pub fn new(
        id: impl Into<String>,
        rule_type: RuleType,
        condition: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            description: id.clone(),
            id,
            rule_type,
            condition: condition.into(),
            severity,
            message: message.into(),
            revenue_at_risk_field: None,
            active: true,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_revenue_field(mut self, field: impl Into<String>) -> Self {
        self.revenue_at_risk_field = Some(field.into());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

/// A finding produced when a charge matches a rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insight {
    pub charge_id: Uuid,
    pub rule_id: String,
    pub rule_type: RuleType,
    pub severity: Severity,
    pub message: String,
    pub revenue_at_risk_cents: i64,
}

/// Outcome of one rule against one charge
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationResult {
    pub matched: bool,
    pub rule_id: String,
    pub rule_name: String,
    pub evaluation_trace: Vec<String>,
    pub evaluation_time_us: i64,
}

impl EvaluationResult {
    pub fn new(rule_id: String, rule_name: String) -> Self {
        Self {
            matched: false,
            rule_id,
            rule_name,
            evaluation_trace: Vec::new(),
            evaluation_time_us: 0,
        }
    }
}

/// Everything one evaluation pass produced for a charge
#[derive(Debug, Clone, Serialize)]
pub struct ChargeAnalysis {
    pub charge_id: Uuid,
    pub insights: Vec<Insight>,
    pub results: Vec<EvaluationResult>,
}

impl ChargeAnalysis {
    pub fn has_insights(&self) -> bool {
        !self.insights.is_empty()
    }

    pub fn highest_severity(&self) -> Option<Severity> {
        self.insights.iter().map(|i| i.severity).max()
    }

    pub fn total_revenue_at_risk_cents(&self) -> i64 {
        self.insights
            .iter()
            .map(|i| i.revenue_at_risk_cents)
            .fold(0i64, i64::saturating_add)
    }
}
