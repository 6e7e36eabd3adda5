use lazy_static::lazy_static;
use mongodb::bson::oid::ObjectId;
use regex::Regex;

use super::error::{AppError, FieldError};

lazy_static! {
    static ref EMAIL_RE: Regex =
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex is valid");
}

/// Pushes an error when a required string is missing or blank.
pub fn require(errors: &mut Vec<FieldError>, field: &str, value: Option<&str>, message: &str) {
    if value.map(str::trim).unwrap_or_default().is_empty() {
        errors.push(FieldError::new(field, message));
    }
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email.trim())
}

/// Blank strings are treated as absent.
pub fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub fn parse_object_id(id: &str, what: &str) -> Result<ObjectId, AppError> {
    ObjectId::parse_str(id).map_err(|_| AppError::BadRequest(format!("Invalid {} ID: {}", what, id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_flags_missing_and_blank() {
        let mut errors = Vec::new();
        require(&mut errors, "a", None, "a missing");
        require(&mut errors, "b", Some("   "), "b blank");
        require(&mut errors, "c", Some("ok"), "c fine");
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].field, "a");
        assert_eq!(errors[1].message, "b blank");
    }

    #[test]
    fn email_syntax() {
        assert!(is_valid_email("tsion@example.org"));
        assert!(is_valid_email(" padded@example.org "));
        assert!(!is_valid_email("no-at-sign.org"));
        assert!(!is_valid_email("two@@example.org"));
        assert!(!is_valid_email("missing@tld"));
    }

    #[test]
    fn non_blank_trims() {
        assert_eq!(non_blank(&Some("  Abebe ".into())), Some("Abebe".to_string()));
        assert_eq!(non_blank(&Some("   ".into())), None);
        assert_eq!(non_blank(&None), None);
    }

    #[test]
    fn object_id_parse_errors_are_bad_requests() {
        assert!(parse_object_id("65a1f0c2e4b0a1b2c3d4e5f6", "user").is_ok());
        let err = parse_object_id("not-an-id", "referral").unwrap_err();
        assert!(matches!(err, AppError::BadRequest(ref m) if m.contains("referral")));
    }
}
