use lazy_static::lazy_static;
use regex::Regex;

use crate::utils::error::AppError;

lazy_static! {
    static ref EMAIL_RE: Regex =
        Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$").expect("valid email regex");
    static ref PHONE_RE: Regex = Regex::new(r"^\+?[0-9]{7,15}$").expect("valid phone regex");
    static ref COUNTRY_CODE_RE: Regex = Regex::new(r"^[A-Z]{2}$").expect("valid country regex");
}

pub const MIN_PASSWORD_LEN: usize = 8;

/// Collects field errors so a request reports every problem at once.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<(String, String)>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, ok: bool, field: &str, problem: &str) -> &mut Self {
        if !ok {
            self.errors.push((field.to_string(), problem.to_string()));
        }
        self
    }

    pub fn required(&mut self, value: &str, field: &str) -> &mut Self {
        self.check(!value.trim().is_empty(), field, "is required")
    }

    pub fn email(&mut self, value: &str, field: &str) -> &mut Self {
        self.check(is_valid_email(value), field, "must be a valid email address")
    }

    pub fn phone(&mut self, value: &str, field: &str) -> &mut Self {
        self.check(normalize_phone(value).is_ok(), field, "must be a valid phone number")
    }

    pub fn password(&mut self, value: &str, field: &str) -> &mut Self {
        self.check(
            value.chars().count() >= MIN_PASSWORD_LEN,
            field,
            "must be at least 8 characters",
        )
    }

    pub fn country_code(&mut self, value: &str, field: &str) -> &mut Self {
        self.check(
            COUNTRY_CODE_RE.is_match(value),
            field,
            "must be a two-letter country code",
        )
    }

    pub fn finish(&mut self) -> Result<(), AppError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(std::mem::take(&mut self.errors)))
        }
    }
}

pub fn is_valid_email(value: &str) -> bool {
    EMAIL_RE.is_match(value.trim())
}

/// Normaliza telefone: remove separadores e converte prefixo 00 em +
pub fn normalize_phone(raw: &str) -> Result<String, AppError> {
    let mut phone: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
        .collect();

    if let Some(rest) = phone.strip_prefix("00") {
        phone = format!("+{}", rest);
    }

    if PHONE_RE.is_match(&phone) {
        Ok(phone)
    } else {
        Err(AppError::validation("phone", "must be a valid phone number"))
    }
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub fn normalize_country_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_separators_are_stripped() {
        assert_eq!(normalize_phone("+1 (555) 010-2030").unwrap(), "+15550102030");
        assert_eq!(normalize_phone("0044 20.7946.0000").unwrap(), "+442079460000");
        assert_eq!(normalize_phone("5550102030").unwrap(), "5550102030");
    }

    #[test]
    fn bad_phones_are_rejected() {
        assert!(normalize_phone("12345").is_err());
        assert!(normalize_phone("+1 555 CALL NOW").is_err());
        assert!(normalize_phone("").is_err());
        assert!(normalize_phone("+1234567890123456").is_err());
    }

    #[test]
    fn emails() {
        assert!(is_valid_email("ops@courier.example"));
        assert!(is_valid_email("  first.last+tag@mail.co  "));
        assert!(!is_valid_email("no-at-sign.example"));
        assert!(!is_valid_email("a@b"));
        assert_eq!(normalize_email(" Ops@Courier.Example "), "ops@courier.example");
    }

    #[test]
    fn validator_collects_every_error() {
        let result = Validator::new()
            .required("", "name")
            .email("nope", "email")
            .password("short", "password")
            .country_code("usa", "country_code")
            .finish();

        match result {
            Err(AppError::Validation(errors)) => {
                let fields: Vec<_> = errors.iter().map(|(f, _)| f.as_str()).collect();
                assert_eq!(fields, vec!["name", "email", "password", "country_code"]);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn validator_passes_clean_input() {
        assert!(Validator::new()
            .required("Ada", "name")
            .email("ada@example.com", "email")
            .phone("+44 20 7946 0000", "phone")
            .password("correct horse", "password")
            .finish()
            .is_ok());
    }
}
