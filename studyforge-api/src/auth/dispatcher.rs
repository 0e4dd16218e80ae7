//! Dispatch of authentication intents to the credential provider.
//!
//! Every flow runs the same three phases: validate the payload, invoke
//! exactly one provider operation, audit the attempt. Validation failures
//! short-circuit before the provider call and are not audited; every
//! attempt that reaches the provider produces exactly one audit event,
//! success or failure.

use std::sync::Arc;
use std::time::Instant;

use metrics::counter;
use serde_json::Value;
use uuid::Uuid;
use validator::Validate;

use studyforge_core::{
    AuthProvider, ClientIdentity, NewAccount, ProviderError, SessionBundle, SessionTokens,
};

use crate::dto::{ResetPasswordPayload, SignInPayload, SignUpPayload, UpdatePasswordPayload};
use crate::error::{ApiError, ApiResult};
use crate::security::audit::{AuditEvent, AuditLogger};
use crate::security::validation::looks_like_sql_injection;

/// Closed set of authentication intents. Adding or removing one is a
/// compiler-checked change; only the wire-tag parsing has a fallthrough,
/// and that rejects before any provider call.
#[derive(Debug, Clone)]
pub enum AuthAction {
    SignIn(SignInPayload),
    SignUp(SignUpPayload),
    SignOut,
    Refresh,
    ResetPassword(ResetPasswordPayload),
    UpdatePassword(UpdatePasswordPayload),
}

impl AuthAction {
    /// Parse `{action, ...payload}` request JSON into an action.
    pub fn parse(body: Value) -> ApiResult<Self> {
        let tag = body
            .get("action")
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::Validation("Invalid action specified".to_string()))?
            .to_string();

        match tag.as_str() {
            "signin" => Ok(Self::SignIn(parse_payload(&tag, body)?)),
            "signup" => Ok(Self::SignUp(parse_payload(&tag, body)?)),
            "signout" => Ok(Self::SignOut),
            "refresh" => Ok(Self::Refresh),
            "reset-password" => Ok(Self::ResetPassword(parse_payload(&tag, body)?)),
            "update-password" => Ok(Self::UpdatePassword(parse_payload(&tag, body)?)),
            _ => Err(ApiError::Validation("Invalid action specified".to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AuthAction::SignIn(_) => "signin",
            AuthAction::SignUp(_) => "signup",
            AuthAction::SignOut => "signout",
            AuthAction::Refresh => "refresh",
            AuthAction::ResetPassword(_) => "reset-password",
            AuthAction::UpdatePassword(_) => "update-password",
        }
    }
}

fn parse_payload<T: serde::de::DeserializeOwned>(tag: &str, body: Value) -> ApiResult<T> {
    serde_json::from_value(body)
        .map_err(|err| ApiError::Validation(format!("Malformed `{tag}` payload: {err}")))
}

/// Normalized result of a successfully dispatched action.
#[derive(Debug, Clone)]
pub enum AuthOutcome {
    SignedIn(SessionBundle),
    SignedUp(NewAccount),
    SignedOut,
    Refreshed(SessionTokens),
    ResetEmailSent,
    PasswordUpdated { user_id: Uuid },
}

/// Stateless router from validated intents to provider operations.
#[derive(Clone)]
pub struct AuthDispatcher {
    provider: Arc<dyn AuthProvider>,
    audit: AuditLogger,
}

impl AuthDispatcher {
    pub fn new(provider: Arc<dyn AuthProvider>, audit: AuditLogger) -> Self {
        Self { provider, audit }
    }

    /// Run one action through validate -> provider -> audit.
    pub async fn dispatch(
        &self,
        client: &ClientIdentity,
        action: AuthAction,
    ) -> ApiResult<AuthOutcome> {
        validate(&action)?;

        let name = action.name();
        let started = Instant::now();

        match action {
            AuthAction::SignIn(payload) => {
                let result = self.provider.sign_in(&payload.email, &payload.password).await;
                match result {
                    Ok(Some(bundle)) => {
                        self.record_success(client, name, started).await;
                        Ok(AuthOutcome::SignedIn(bundle))
                    }
                    Err(ProviderError::Unavailable(detail)) => {
                        self.record_system_failure(client, name, "invalid_credentials", &detail, started)
                            .await;
                        Err(ApiError::Authentication("Invalid credentials".to_string()))
                    }
                    Ok(None) | Err(_) => {
                        self.record_failure(client, name, "invalid_credentials", started)
                            .await;
                        Err(ApiError::Authentication("Invalid credentials".to_string()))
                    }
                }
            }

            AuthAction::SignUp(payload) => {
                let result = self
                    .provider
                    .sign_up(&payload.email, &payload.password, payload.metadata)
                    .await;
                match result {
                    Ok(Some(account)) => {
                        self.record_success(client, name, started).await;
                        Ok(AuthOutcome::SignedUp(account))
                    }
                    Ok(None) => {
                        self.record_failure(client, name, "signup_failed", started).await;
                        Err(ApiError::Validation("Registration failed".to_string()))
                    }
                    Err(ProviderError::DuplicateEmail) => {
                        self.record_failure(client, name, "signup_failed", started).await;
                        Err(ApiError::Validation("Email already registered".to_string()))
                    }
                    Err(ProviderError::Rejected(message)) => {
                        self.record_failure(client, name, "signup_failed", started).await;
                        Err(ApiError::Validation(message))
                    }
                    Err(ProviderError::Unavailable(message)) => {
                        self.record_system_failure(client, name, "signup_failed", &message, started)
                            .await;
                        Err(ApiError::Validation(message))
                    }
                }
            }

            AuthAction::SignOut => match self.provider.sign_out().await {
                Ok(()) => {
                    self.record_success(client, name, started).await;
                    Ok(AuthOutcome::SignedOut)
                }
                Err(ProviderError::Unavailable(detail)) => {
                    self.record_system_failure(client, name, "signout_failed", &detail, started)
                        .await;
                    Err(ApiError::Authentication("Signout failed".to_string()))
                }
                Err(_) => {
                    self.record_failure(client, name, "signout_failed", started).await;
                    Err(ApiError::Authentication("Signout failed".to_string()))
                }
            },

            AuthAction::Refresh => match self.provider.refresh_session().await {
                Ok(Some(tokens)) => {
                    self.record_success(client, name, started).await;
                    Ok(AuthOutcome::Refreshed(tokens))
                }
                Err(ProviderError::Unavailable(detail)) => {
                    self.record_system_failure(client, name, "refresh_failed", &detail, started)
                        .await;
                    Err(ApiError::Authentication(
                        "Session refresh failed".to_string(),
                    ))
                }
                Ok(None) | Err(_) => {
                    self.record_failure(client, name, "refresh_failed", started).await;
                    Err(ApiError::Authentication(
                        "Session refresh failed".to_string(),
                    ))
                }
            },

            AuthAction::ResetPassword(payload) => {
                match self.provider.reset_password(&payload.email).await {
                    Ok(()) => {
                        self.record_success(client, name, started).await;
                        Ok(AuthOutcome::ResetEmailSent)
                    }
                    Err(ProviderError::Unavailable(detail)) => {
                        self.record_system_failure(client, name, "reset_failed", &detail, started)
                            .await;
                        Err(ApiError::Validation("Password reset failed".to_string()))
                    }
                    Err(_) => {
                        self.record_failure(client, name, "reset_failed", started).await;
                        Err(ApiError::Validation("Password reset failed".to_string()))
                    }
                }
            }

            AuthAction::UpdatePassword(payload) => {
                match self.provider.update_password(&payload.password).await {
                    Ok(Some(user_id)) => {
                        self.record_success(client, name, started).await;
                        Ok(AuthOutcome::PasswordUpdated { user_id })
                    }
                    Err(ProviderError::Unavailable(detail)) => {
                        self.record_system_failure(client, name, "update_failed", &detail, started)
                            .await;
                        Err(ApiError::Authentication(
                            "Password update failed".to_string(),
                        ))
                    }
                    Ok(None) | Err(_) => {
                        self.record_failure(client, name, "update_failed", started).await;
                        Err(ApiError::Authentication(
                            "Password update failed".to_string(),
                        ))
                    }
                }
            }
        }
    }

    async fn record_success(&self, client: &ClientIdentity, action: &'static str, started: Instant) {
        counter!("auth_attempts_total", "action" => action, "outcome" => "success").increment(1);
        self.audit
            .record(AuditEvent::success(
                client.as_str(),
                action,
                elapsed_ms(started),
            ))
            .await;
    }

    async fn record_failure(
        &self,
        client: &ClientIdentity,
        action: &'static str,
        reason: &'static str,
        started: Instant,
    ) {
        counter!("auth_attempts_total", "action" => action, "outcome" => "failure").increment(1);
        self.audit
            .record(AuditEvent::failure(
                client.as_str(),
                action,
                reason,
                elapsed_ms(started),
            ))
            .await;
    }

    /// Provider-unavailable failures are the system's fault, not the
    /// caller's: the internal detail goes to the audit sink while the
    /// caller sees the same generic message as any other failure.
    async fn record_system_failure(
        &self,
        client: &ClientIdentity,
        action: &'static str,
        reason: &'static str,
        detail: &str,
        started: Instant,
    ) {
        counter!("auth_attempts_total", "action" => action, "outcome" => "failure").increment(1);
        self.audit
            .system_error(AuditEvent::system(
                client.as_str(),
                action,
                reason,
                detail,
                elapsed_ms(started),
            ))
            .await;
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Payload validation, before any provider call. Not audited.
fn validate(action: &AuthAction) -> ApiResult<()> {
    match action {
        AuthAction::SignIn(payload) => {
            payload.validate()?;
            guard_email(&payload.email)
        }
        AuthAction::SignUp(payload) => {
            payload.validate()?;
            guard_email(&payload.email)?;
            if let Some(confirm) = &payload.confirm_password {
                if confirm != &payload.password {
                    return Err(ApiError::Validation(
                        "Password confirmation does not match".to_string(),
                    ));
                }
            }
            Ok(())
        }
        AuthAction::SignOut | AuthAction::Refresh => Ok(()),
        AuthAction::ResetPassword(payload) => {
            payload.validate()?;
            guard_email(&payload.email)
        }
        AuthAction::UpdatePassword(payload) => {
            payload.validate()?;
            Ok(())
        }
    }
}

/// Emails pass the structural check first; this catches the delimiter and
/// keyword patterns that survive it.
fn guard_email(email: &str) -> ApiResult<()> {
    if looks_like_sql_injection(email) {
        return Err(ApiError::Validation(
            "Email contains disallowed characters".to_string(),
        ));
    }
    Ok(())
}
