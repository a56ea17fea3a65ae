//! Field validators and normalizers for applicant data.

use chrono::NaiveDate;
use regex::Regex;
use std::sync::LazyLock;

static NON_DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\D+").expect("static pattern"));
static MODALITY_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\(([^)]+)\)").expect("static pattern"));

/// Name particles kept in lower case by [`normalize_name`].
const LOWER_PARTICLES: [&str; 6] = ["da", "das", "de", "do", "dos", "e"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{label} must contain exactly {expected} digits (got {actual})")]
    DigitCount {
        label: String,
        expected: usize,
        actual: usize,
    },

    #[error("{label} is invalid: expected area code plus number (10 or 11 digits)")]
    Phone { label: String },

    #[error("{label} is invalid: expected dd/mm/yyyy")]
    Date { label: String },

    #[error("{label} is required")]
    Required { label: String },

    #[error("{0}")]
    Inconsistent(String),
}

pub fn only_digits(value: &str) -> String {
    NON_DIGITS.replace_all(value, "").into_owned()
}

pub fn validate_exact_digits(label: &str, value: &str, n: usize) -> Result<String, ValidationError> {
    let digits = only_digits(value);
    if digits.len() != n {
        return Err(ValidationError::DigitCount {
            label: label.to_string(),
            expected: n,
            actual: digits.len(),
        });
    }
    Ok(digits)
}

/// Brazilian phone: area code plus 8 or 9 digit number.
pub fn validate_phone(label: &str, value: &str) -> Result<String, ValidationError> {
    let digits = only_digits(value);
    if !matches!(digits.len(), 10 | 11) {
        return Err(ValidationError::Phone {
            label: label.to_string(),
        });
    }
    Ok(digits)
}

pub fn validate_date_ddmmyyyy(label: &str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    NaiveDate::parse_from_str(trimmed, "%d/%m/%Y").map_err(|_| ValidationError::Date {
        label: label.to_string(),
    })?;
    Ok(trimmed.to_string())
}

pub fn require(label: &str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Required {
            label: label.to_string(),
        });
    }
    Ok(trimmed.to_string())
}

/// Title-case each word, keeping Portuguese particles lower case.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .map(|part| {
            let lower = part.to_lowercase();
            if LOWER_PARTICLES.contains(&lower.as_str()) {
                return lower;
            }
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Build the canonical display name `"BASE - NAME - MOD"`.
///
/// `MOD` is the code in parentheses inside `modality` ("Agregado (AGR)" -> "AGR"),
/// or "—" when there is none. Returns `None` if base or name is blank.
pub fn make_canonical_name(base: &str, name: &str, modality: &str) -> Option<String> {
    let base = base.trim().to_uppercase();
    let name = name.trim().to_uppercase();
    if base.is_empty() || name.is_empty() {
        return None;
    }
    let code = MODALITY_CODE
        .captures(modality.trim())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_uppercase())
        .unwrap_or_else(|| "—".to_string());
    Some(format!("{base} - {name} - {code}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_non_digits() {
        assert_eq!(only_digits("123.456.789-01"), "12345678901");
        assert_eq!(only_digits(""), "");
    }

    #[test]
    fn exact_digits_reports_count() {
        assert_eq!(
            validate_exact_digits("CPF", "123.456.789-01", 11).unwrap(),
            "12345678901"
        );
        let err = validate_exact_digits("CEP", "0131-000", 8).unwrap_err();
        assert_eq!(
            err,
            ValidationError::DigitCount {
                label: "CEP".into(),
                expected: 8,
                actual: 7
            }
        );
    }

    #[test]
    fn phone_accepts_ten_or_eleven_digits() {
        assert_eq!(validate_phone("Celular", "(11) 98765-4321").unwrap(), "11987654321");
        assert_eq!(validate_phone("Telefone", "11 3456-7890").unwrap(), "1134567890");
        assert!(validate_phone("Celular", "98765-4321").is_err());
    }

    #[test]
    fn date_must_be_real_calendar_day() {
        assert!(validate_date_ddmmyyyy("Nascimento", "29/02/2000").is_ok());
        assert!(validate_date_ddmmyyyy("Nascimento", "30/02/2000").is_err());
        assert!(validate_date_ddmmyyyy("Nascimento", "2000-01-01").is_err());
    }

    #[test]
    fn names_keep_particles_lower() {
        assert_eq!(normalize_name("  MARIA DA  SILVA e souza "), "Maria da Silva e Souza");
        assert_eq!(normalize_name("joão DOS santos"), "João dos Santos");
        assert_eq!(normalize_name(""), "");
    }

    #[test]
    fn canonical_name_uses_modality_code() {
        assert_eq!(
            make_canonical_name("sao", "Maria da Silva", "Agregado (agr)").as_deref(),
            Some("SAO - MARIA DA SILVA - AGR")
        );
        assert_eq!(
            make_canonical_name("SAO", "Maria", "Agregado").as_deref(),
            Some("SAO - MARIA - —")
        );
        assert!(make_canonical_name("", "Maria", "X").is_none());
    }
}
