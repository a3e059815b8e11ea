use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::core::time::format_offset;
use crate::repositories::schools::SchoolRecord;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct SchoolSignup {
    #[serde(alias = "schoolName")]
    #[validate(custom(function = "validate_not_blank", message = "All fields are required."))]
    pub(crate) school_name: String,
    #[serde(alias = "emisNumber")]
    #[validate(custom(function = "validate_emis_number"))]
    pub(crate) emis_number: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters long."))]
    pub(crate) password: String,
    #[serde(alias = "confirmPassword")]
    #[validate(must_match(other = "password", message = "Passwords do not match."))]
    pub(crate) confirm_password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct SchoolLogin {
    #[serde(alias = "emisNumber")]
    #[validate(custom(function = "validate_emis_number"))]
    pub(crate) emis_number: String,
    #[validate(length(min = 1, message = "All fields are required."))]
    pub(crate) password: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct SchoolResponse {
    pub(crate) id: String,
    pub(crate) school_name: String,
    pub(crate) emis_number: String,
    pub(crate) created_at: String,
}

impl SchoolResponse {
    pub(crate) fn from_record(record: &SchoolRecord) -> Self {
        Self {
            id: record.id.clone(),
            school_name: record.school_name.clone(),
            emis_number: record.emis_number.clone(),
            created_at: format_offset(record.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct TokenResponse {
    pub(crate) access_token: String,
    pub(crate) token_type: String,
    pub(crate) school: SchoolResponse,
}

fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

/// EMIS numbers are exactly nine digits; surrounding whitespace is tolerated.
pub(crate) fn validate_emis_number(value: &str) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    if trimmed.len() == 9 && trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Ok(());
    }

    let mut err = ValidationError::new("emis_number");
    err.message = Some("Invalid EMIS Number. It must be a 9-digit number.".into());
    Err(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signup(emis: &str, password: &str, confirm: &str) -> SchoolSignup {
        SchoolSignup {
            school_name: "Soweto High".to_string(),
            emis_number: emis.to_string(),
            password: password.to_string(),
            confirm_password: confirm.to_string(),
        }
    }

    #[test]
    fn accepts_valid_signup() {
        assert!(signup(" 123456789 ", "password1", "password1").validate().is_ok());
    }

    #[test]
    fn rejects_bad_emis_number() {
        assert!(signup("12345678", "password1", "password1").validate().is_err());
        assert!(signup("12345678a", "password1", "password1").validate().is_err());
    }

    #[test]
    fn rejects_short_or_mismatched_password() {
        assert!(signup("123456789", "short", "short").validate().is_err());
        assert!(signup("123456789", "password1", "password2").validate().is_err());
    }

    #[test]
    fn rejects_blank_school_name() {
        let mut payload = signup("123456789", "password1", "password1");
        payload.school_name = "   ".to_string();
        assert!(payload.validate().is_err());
    }
}
