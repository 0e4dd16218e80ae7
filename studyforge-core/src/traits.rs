use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::{NewAccount, SessionBundle, SessionTokens};
use crate::error::ProviderError;

/// The external credential/session provider.
///
/// Operations that can legitimately come back with "no error, but no data"
/// return `Ok(None)`; callers treat that the same as a rejection. Session
/// operations (`sign_out`, `refresh_session`, `update_password`) act on the
/// provider's ambient session for the current request context.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<SessionBundle>, ProviderError>;

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Option<Value>,
    ) -> Result<Option<NewAccount>, ProviderError>;

    async fn sign_out(&self) -> Result<(), ProviderError>;

    async fn refresh_session(&self) -> Result<Option<SessionTokens>, ProviderError>;

    async fn reset_password(&self, email: &str) -> Result<(), ProviderError>;

    async fn update_password(&self, password: &str) -> Result<Option<Uuid>, ProviderError>;
}
