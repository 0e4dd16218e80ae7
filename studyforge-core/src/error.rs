use thiserror::Error;

/// Failures surfaced by the external credential/session provider.
///
/// `Rejected` covers the provider refusing an operation (bad credentials,
/// invalid session); `DuplicateEmail` is split out because sign-up maps it
/// to a distinct user-facing message; `Unavailable` is transport-level or
/// otherwise unexpected.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    #[error("Provider rejected the operation: {0}")]
    Rejected(String),

    #[error("Email already registered")]
    DuplicateEmail,

    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}
