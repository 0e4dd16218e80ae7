//! Request payload shapes for the authentication endpoint.

use serde::Deserialize;
use serde_json::Value;
use validator::Validate;

use crate::security::validation::validate_email_strict;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SignInPayload {
    #[validate(custom(function = validate_email_strict))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SignUpPayload {
    #[validate(custom(function = validate_email_strict))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    /// When present, must equal `password`. Checked in the dispatcher's
    /// validate phase because the comparison spans two fields.
    #[serde(default)]
    pub confirm_password: Option<String>,
    /// Opaque metadata forwarded to the provider at account creation.
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ResetPasswordPayload {
    #[validate(custom(function = validate_email_strict))]
    pub email: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdatePasswordPayload {
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signin_payload_rejects_short_password() {
        let payload = SignInPayload {
            email: "a@b.com".to_string(),
            password: "short".to_string(),
        };
        let errors = payload.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("password"));
    }

    #[test]
    fn signin_payload_rejects_bad_email() {
        let payload = SignInPayload {
            email: "not-an-email".to_string(),
            password: "long enough".to_string(),
        };
        let errors = payload.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("email"));
    }

    #[test]
    fn signup_payload_optional_fields_default() {
        let payload: SignUpPayload =
            serde_json::from_value(serde_json::json!({
                "email": "a@b.com",
                "password": "password1",
            }))
            .unwrap();
        assert!(payload.confirm_password.is_none());
        assert!(payload.metadata.is_none());
        assert!(payload.validate().is_ok());
    }
}
