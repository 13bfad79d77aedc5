//! Evaluation context
//!
//! A charge is flattened once into a map of named facts. Rule authors write
//! conditions against these names, so the catalog below is a versioned
//! contract: fields may be added, never removed or retyped.

use crate::codes::split_modifiers;
use crate::models::Charge;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Current version of the field catalog
pub const CONTEXT_SCHEMA_VERSION: u32 = 1;

/// Type of a context field as seen by rule authors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Int,
    Str,
    Bool,
    StrList,
}

/// Every field the builder may emit, with its type.
///
/// `procedure_code` is absent when a charge carries no procedure codes.
pub const CONTEXT_FIELDS: &[(&str, FieldType)] = &[
    ("procedure_codes", FieldType::StrList),
    ("procedure_base_codes", FieldType::StrList),
    ("procedure_modifiers", FieldType::StrList),
    ("procedure_code", FieldType::Str),
    ("procedure_count", FieldType::Int),
    ("diagnosis_codes", FieldType::StrList),
    ("diagnosis_count", FieldType::Int),
    ("charge_amount_cents", FieldType::Int),
    ("payer_type", FieldType::Str),
    ("service_date", FieldType::Str),
    ("service_year", FieldType::Int),
    ("patient_age_years", FieldType::Int),
    ("patient_sex", FieldType::Str),
    ("department_code", FieldType::Str),
    ("department_name", FieldType::Str),
];

/// A single fact
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FactValue {
    Int(i64),
    Str(String),
    Bool(bool),
    List(Vec<FactValue>),
}

impl FactValue {
    pub fn field_type(&self) -> Option<FieldType> {
        match self {
            Self::Int(_) => Some(FieldType::Int),
            Self::Str(_) => Some(FieldType::Str),
            Self::Bool(_) => Some(FieldType::Bool),
            Self::List(items) if items.iter().all(|i| matches!(i, Self::Str(_))) => {
                Some(FieldType::StrList)
            }
            Self::List(_) => None,
        }
    }

    /// Integer cents, if the fact is an integer or a string holding one
    pub fn as_cents(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl From<i64> for FactValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for FactValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for FactValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<bool> for FactValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl<T: Into<FactValue>> From<Vec<T>> for FactValue {
    fn from(value: Vec<T>) -> Self {
        Self::List(value.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for FactValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Bool(b) => write!(f, "{b}"),
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
        }
    }
}

/// Immutable fact map handed to every rule of one charge
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EvaluationContext {
    facts: BTreeMap<String, FactValue>,
}

impl EvaluationContext {
    /// Build from arbitrary facts. Used by tests and callers with their own
    /// fact sources; charges go through [`ContextBuilder`].
    pub fn from_facts<I, K, V>(facts: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FactValue>,
    {
        Self {
            facts: facts
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get_field(&self, name: &str) -> Option<&FactValue> {
        self.facts.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.facts.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FactValue)> {
        self.facts.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Flattens a charge into its evaluation context
pub struct ContextBuilder;

impl ContextBuilder {
    pub fn build(charge: &Charge) -> EvaluationContext {
        let mut facts: BTreeMap<String, FactValue> = BTreeMap::new();
        let mut put = |name: &str, value: FactValue| {
            facts.insert(name.to_string(), value);
        };

        let mut base_codes: Vec<String> = Vec::new();
        let mut modifiers: Vec<String> = Vec::new();
        for code in &charge.procedure_codes {
            let (base, mods) = split_modifiers(code);
            if !base_codes.iter().any(|b| b == base) {
                base_codes.push(base.to_string());
            }
            for m in mods {
                if !modifiers.iter().any(|x| x == m) {
                    modifiers.push(m.to_string());
                }
            }
        }

        put("procedure_codes", charge.procedure_codes.clone().into());
        put("procedure_base_codes", base_codes.into());
        put("procedure_modifiers", modifiers.into());
        if let Some(first) = charge.procedure_codes.first() {
            put("procedure_code", first.as_str().into());
        }
        put("procedure_count", (charge.procedure_codes.len() as i64).into());

        let diagnoses: Vec<String> = charge.diagnosis_codes.iter().cloned().collect();
        put("diagnosis_count", (diagnoses.len() as i64).into());
        put("diagnosis_codes", diagnoses.into());

        put("charge_amount_cents", charge.charge_amount_cents.into());
        put("payer_type", charge.payer_type.as_str().into());
        put(
            "service_date",
            charge.service_date.format("%Y-%m-%d").to_string().into(),
        );
        put(
            "service_year",
            i64::from(chrono::Datelike::year(&charge.service_date)).into(),
        );
        put(
            "patient_age_years",
            Self::age_in_years(charge).into(),
        );
        put("patient_sex", charge.patient.sex.as_str().into());
        put("department_code", charge.department.code.as_str().into());
        put("department_name", charge.department.name.as_str().into());

        EvaluationContext { facts }
    }

    /// Whole years between date of birth and service date; 0 when the
    /// service date comes first.
    fn age_in_years(charge: &Charge) -> i64 {
        charge
            .service_date
            .years_since(charge.patient.date_of_birth)
            .map(i64::from)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Department, Patient, PayerType, Sex};
    use chrono::NaiveDate;

    fn sample_charge() -> Charge {
        Charge::new(
            PayerType::Medicaid,
            48_000,
            NaiveDate::from_ymd_opt(2024, 5, 31).unwrap(),
            Patient {
                id: "P-77".into(),
                date_of_birth: NaiveDate::from_ymd_opt(1959, 6, 1).unwrap(),
                sex: Sex::Male,
            },
            Department {
                code: "CARD".into(),
                name: "Cardiology".into(),
            },
        )
        .with_procedure_codes(["93000-26", "93306", "93000-59"])
        .with_diagnosis_codes(["R00.2", "I10"])
    }

    #[test]
    fn test_build_core_fields() {
        let ctx = ContextBuilder::build(&sample_charge());

        assert_eq!(
            ctx.get_field("procedure_codes"),
            Some(&FactValue::from(vec!["93000-26", "93306", "93000-59"]))
        );
        assert_eq!(
            ctx.get_field("diagnosis_codes"),
            Some(&FactValue::from(vec!["I10", "R00.2"]))
        );
        assert_eq!(ctx.get_field("charge_amount_cents"), Some(&FactValue::Int(48_000)));
        assert_eq!(ctx.get_field("payer_type"), Some(&FactValue::from("MEDICAID")));
        assert_eq!(ctx.get_field("service_date"), Some(&FactValue::from("2024-05-31")));
        assert_eq!(ctx.get_field("department_code"), Some(&FactValue::from("CARD")));
    }

    #[test]
    fn test_build_derived_procedure_fields() {
        let ctx = ContextBuilder::build(&sample_charge());

        assert_eq!(
            ctx.get_field("procedure_base_codes"),
            Some(&FactValue::from(vec!["93000", "93306"]))
        );
        assert_eq!(
            ctx.get_field("procedure_modifiers"),
            Some(&FactValue::from(vec!["26", "59"]))
        );
        assert_eq!(ctx.get_field("procedure_code"), Some(&FactValue::from("93000-26")));
        assert_eq!(ctx.get_field("procedure_count"), Some(&FactValue::Int(3)));
        assert_eq!(ctx.get_field("diagnosis_count"), Some(&FactValue::Int(2)));
    }

    #[test]
    fn test_patient_age_day_before_birthday() {
        // Born 1959-06-01, seen 2024-05-31: still 64
        let ctx = ContextBuilder::build(&sample_charge());
        assert_eq!(ctx.get_field("patient_age_years"), Some(&FactValue::Int(64)));
    }

    #[test]
    fn test_patient_age_on_birthday() {
        let mut charge = sample_charge();
        charge.service_date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();

        let ctx = ContextBuilder::build(&charge);
        assert_eq!(ctx.get_field("patient_age_years"), Some(&FactValue::Int(65)));
    }

    #[test]
    fn test_patient_age_service_before_birth() {
        let mut charge = sample_charge();
        charge.service_date = NaiveDate::from_ymd_opt(1950, 1, 1).unwrap();

        let ctx = ContextBuilder::build(&charge);
        assert_eq!(ctx.get_field("patient_age_years"), Some(&FactValue::Int(0)));
    }

    #[test]
    fn test_no_procedure_codes_omits_primary() {
        let mut charge = sample_charge();
        charge.procedure_codes.clear();

        let ctx = ContextBuilder::build(&charge);
        assert!(!ctx.contains("procedure_code"));
        assert_eq!(ctx.get_field("procedure_codes"), Some(&FactValue::List(vec![])));
    }

    #[test]
    fn test_context_matches_catalog() {
        let ctx = ContextBuilder::build(&sample_charge());

        for (name, value) in ctx.iter() {
            let declared = CONTEXT_FIELDS
                .iter()
                .find(|(field, _)| *field == name)
                .map(|(_, ty)| *ty);
            assert!(declared.is_some(), "field {name} missing from catalog");
            assert_eq!(value.field_type(), declared, "field {name} has wrong type");
        }
        assert_eq!(ctx.len(), CONTEXT_FIELDS.len());
    }

    #[test]
    fn test_as_cents() {
        assert_eq!(FactValue::Int(250).as_cents(), Some(250));
        assert_eq!(FactValue::from(" 1200 ").as_cents(), Some(1200));
        assert_eq!(FactValue::from("12.50").as_cents(), None);
        assert_eq!(FactValue::Bool(true).as_cents(), None);
    }
}
