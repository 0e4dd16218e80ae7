//! Admission-control pipeline for the StudyForge API.
//!
//! Every inbound request is throttled by the gatekeeper, auth-sensitive
//! requests are routed through the action dispatcher, and all user-supplied
//! strings pass the input guard before reaching business logic.

use std::sync::Arc;

use axum::{middleware, routing::post, Router};

use studyforge_core::AuthProvider;

pub mod auth;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod security;

pub use error::{ApiError, ApiResult};

use auth::AuthDispatcher;
use security::audit::AuditLogger;
use security::gatekeeper::{gatekeeper_middleware, QuotaRegistry};
use security::headers::security_headers_middleware;

/// Shared per-process state. The quota registry is constructed explicitly
/// at startup and passed by handle; nothing here is a hidden global.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: AuthDispatcher,
    pub quotas: Arc<QuotaRegistry>,
}

impl AppState {
    pub fn new(
        provider: Arc<dyn AuthProvider>,
        audit: AuditLogger,
        quotas: Arc<QuotaRegistry>,
    ) -> Self {
        Self {
            dispatcher: AuthDispatcher::new(provider, audit),
            quotas,
        }
    }
}

/// Build the API router with the full admission pipeline layered on.
///
/// Security headers sit outside the gatekeeper so quota rejections carry
/// them too.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/auth", post(handlers::auth::auth_action))
        .layer(middleware::from_fn_with_state(
            state.quotas.clone(),
            gatekeeper_middleware,
        ))
        .layer(middleware::from_fn(security_headers_middleware))
        .with_state(state)
}
