//! Billing code helpers
//!
//! Procedure codes are CPT (`99213`) or HCPCS level II (`J1100`) with any
//! number of two-character modifiers (`99213-25-59`). Diagnosis codes are
//! ICD-10-CM. Shape checks only; whether a code exists is a lookup concern.

use regex::Regex;
use std::sync::LazyLock;

static PROCEDURE_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{5}|[A-Z]\d{4})(-[A-Z0-9]{2})*$").expect("procedure code pattern")
});

static ICD10_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z]\d[0-9A-Z](\.?[0-9A-Z]{1,4})?$").expect("ICD-10 pattern")
});

/// Trim and upper-case a code.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Split `99213-25-59` into `("99213", ["25", "59"])`.
pub fn split_modifiers(code: &str) -> (&str, Vec<&str>) {
    let mut parts = code.split('-');
    let base = parts.next().unwrap_or_default();
    let modifiers = parts.filter(|m| !m.is_empty()).collect();
    (base, modifiers)
}

pub fn is_procedure_code(code: &str) -> bool {
    PROCEDURE_CODE.is_match(&normalize_code(code))
}

pub fn is_icd10_code(code: &str) -> bool {
    ICD10_CODE.is_match(&normalize_code(code))
}
