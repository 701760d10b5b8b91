//! `CUS-{YYYYMM}-{NNNN}` customer codes.
//!
//! The sequence restarts every month and is one above the highest sequence
//! already issued for that month. Callers must hold the month's generation
//! lock while reading the existing codes and inserting the new customer.

use chrono::{DateTime, Utc};

pub const CODE_PREFIX: &str = "CUS";
pub const MAX_CODE_LEN: usize = 50;

/// `YYYYMM` in UTC
pub fn month_key(now: DateTime<Utc>) -> String {
    now.format("%Y%m").to_string()
}

/// `CUS-YYYYMM-`, shared by every code issued in the month
pub fn month_prefix(month: &str) -> String {
    format!("{}-{}-", CODE_PREFIX, month)
}

pub fn format_code(month: &str, sequence: u32) -> String {
    format!("{}{:04}", month_prefix(month), sequence)
}

pub fn sequence_of(code: &str, month: &str) -> Option<u32> {
    let digits = code.strip_prefix(&month_prefix(month))?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// One above the month's highest sequence, `None` once the sequence space is used up
pub fn next_sequence<'a>(existing: impl IntoIterator<Item = &'a str>, month: &str) -> Option<u32> {
    existing
        .into_iter()
        .filter_map(|code| sequence_of(code, month))
        .max()
        .unwrap_or(0)
        .checked_add(1)
}

/// Shape check for a generated code
pub fn is_generated(code: &str) -> bool {
    let mut parts = code.splitn(3, '-');
    let prefix = parts.next();
    let month = parts.next();
    let sequence = parts.next();
    match (prefix, month, sequence) {
        (Some(CODE_PREFIX), Some(month), Some(sequence)) => {
            month.len() == 6
                && month.chars().all(|c| c.is_ascii_digit())
                && sequence.len() >= 4
                && sequence.chars().all(|c| c.is_ascii_digit())
        }
        _ => false,
    }
}

/// Normalise a caller supplied code. The generated `CUS-YYYYMM-N` shape is
/// reserved for the month sequence.
pub fn validate_supplied(code: &str) -> Result<String, String> {
    let code = code.trim();
    if code.is_empty() {
        return Err("Customer code must not be empty".to_string());
    }
    if code.len() > MAX_CODE_LEN {
        return Err(format!("Customer code must be at most {} characters", MAX_CODE_LEN));
    }
    if !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err("Customer code may only contain letters, digits, '-' and '_'".to_string());
    }
    if is_generated(code) {
        return Err(format!(
            "Codes of the form {}-YYYYMM-NNNN are assigned automatically",
            CODE_PREFIX
        ));
    }
    Ok(code.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn formats_with_zero_padded_sequence() {
        let now = Utc.with_ymd_and_hms(2026, 3, 31, 23, 59, 0).unwrap();
        let month = month_key(now);
        assert_eq!(month, "202603");
        assert_eq!(format_code(&month, 7), "CUS-202603-0007");
        assert!(is_generated(&format_code(&month, 7)));
        assert!(is_generated(&format_code(&month, 12345)));
    }

    #[test]
    fn next_sequence_ignores_other_months_and_manual_codes() {
        let codes = ["CUS-202603-0001", "CUS-202603-0009", "CUS-202602-0042", "ACME-1", "CUS-202603-x"];
        assert_eq!(next_sequence(codes, "202603"), Some(10));
        assert_eq!(next_sequence(codes, "202604"), Some(1));
        assert_eq!(next_sequence(std::iter::empty(), "202603"), Some(1));
    }

    #[test]
    fn exhausted_sequence_has_no_successor() {
        let top = format!("CUS-202603-{}", u32::MAX);
        assert_eq!(next_sequence([top.as_str()], "202603"), None);
    }

    #[test]
    fn supplied_codes_are_trimmed_and_checked() {
        assert_eq!(validate_supplied("  ACME-01 ").unwrap(), "ACME-01");
        assert!(validate_supplied("").is_err());
        assert!(validate_supplied("has space").is_err());
        assert!(validate_supplied(&"X".repeat(MAX_CODE_LEN + 1)).is_err());
        assert!(!is_generated("ACME-01"));
    }

    #[test]
    fn supplied_codes_cannot_take_the_generated_shape() {
        assert!(validate_supplied("CUS-202603-0001").is_err());
        assert!(validate_supplied(&format!("CUS-202603-{}", u32::MAX)).is_err());
        assert!(validate_supplied("CUS-ACME").is_ok());
    }
}
