use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use thiserror::Error;
use validator::ValidationErrors;

/// Request-level error taxonomy. Status mapping is fixed: validation 400,
/// authentication 401, throttling 429, everything unexpected 500.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Too many requests")]
    Throttled {
        retry_after_secs: u64,
        limit: u32,
        reset_at: DateTime<Utc>,
    },

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        ApiError::Validation(flatten_validation_errors(&errors))
    }
}

/// Collapse field errors into one deterministic message, fields sorted so
/// the wording does not depend on hash order.
fn flatten_validation_errors(errors: &ValidationErrors) -> String {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|(a, _), (b, _)| a.cmp(b));

    let parts: Vec<String> = fields
        .iter()
        .map(|(field, field_errors)| {
            let detail = field_errors
                .iter()
                .map(|e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("failed `{}` check", e.code))
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!("{field}: {detail}")
        })
        .collect();

    parts.join("; ")
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(message) => error_response(
                StatusCode::BAD_REQUEST,
                "validation_error",
                &message,
            ),
            ApiError::Authentication(message) => error_response(
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                &message,
            ),
            ApiError::Throttled {
                retry_after_secs,
                limit,
                reset_at,
            } => {
                let message = format!(
                    "Rate limit exceeded. Retry after {retry_after_secs} seconds"
                );
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(json!({
                        "error": "rate_limited",
                        "message": message,
                        "retry_after_seconds": retry_after_secs,
                    })),
                )
                    .into_response();

                let headers = response.headers_mut();
                if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                    headers.insert("Retry-After", value);
                }
                crate::security::stamp_rate_limit_headers(headers, limit, 0, reset_at);
                response
            }
            ApiError::Internal(detail) => {
                // Internal detail goes to the log, never to the caller.
                tracing::error!(detail, "internal error");
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An unexpected error occurred",
                )
            }
        }
    }
}

fn error_response(status: StatusCode, error: &str, message: &str) -> Response {
    (
        status,
        Json(json!({
            "error": error,
            "message": message,
        })),
    )
        .into_response()
}

pub type ApiResult<T> = Result<T, ApiError>;
