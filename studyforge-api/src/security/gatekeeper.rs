//! Admission-control middleware: identify, classify, admit or reject.
//!
//! Every inbound request is bucketed by (route class, client identity) and
//! charged one quota unit before any handler runs. Rejections are terminal:
//! the handler never executes and the client gets a structured 429 with a
//! retry hint. The middleware does no I/O of its own; the only suspension
//! point is running the inner service.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};

use studyforge_core::ClientIdentity;

use crate::error::ApiError;
use crate::security::quota::{ConsumeOutcome, QuotaConfig, QuotaLimiter};

/// Coarse endpoint category selecting the quota parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteClass {
    Auth,
    Admin,
    Api,
    General,
}

impl RouteClass {
    /// Match a request path against class prefixes in priority order
    /// auth > admin > api > general. First match wins, so `/api/auth/x`
    /// is `Auth` even though `/api` also matches. Prefixes bind on segment
    /// boundaries only: `/api/authors` is `Api`, not `Auth`.
    pub fn classify(path: &str) -> Self {
        if path_within(path, "/api/auth") {
            RouteClass::Auth
        } else if path_within(path, "/api/admin") || path_within(path, "/admin") {
            RouteClass::Admin
        } else if path_within(path, "/api") {
            RouteClass::Api
        } else {
            RouteClass::General
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RouteClass::Auth => "auth",
            RouteClass::Admin => "admin",
            RouteClass::Api => "api",
            RouteClass::General => "general",
        }
    }
}

/// Prefix match on a path-segment boundary: the prefix itself, or the
/// prefix followed by `/`.
fn path_within(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Quota parameters for one route class.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RouteQuota {
    pub points: u32,
    pub duration_seconds: u64,
}

impl RouteQuota {
    fn to_config(self, prefix: &str) -> QuotaConfig {
        QuotaConfig::new(
            self.points,
            Duration::from_secs(self.duration_seconds),
            prefix,
        )
    }
}

/// Per-class quota parameters, overridable through configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitSettings {
    pub auth: RouteQuota,
    pub admin: RouteQuota,
    pub api: RouteQuota,
    pub general: RouteQuota,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            auth: RouteQuota {
                points: 5,
                duration_seconds: 900,
            },
            admin: RouteQuota {
                points: 10,
                duration_seconds: 60,
            },
            api: RouteQuota {
                points: 50,
                duration_seconds: 60,
            },
            general: RouteQuota {
                points: 100,
                duration_seconds: 60,
            },
        }
    }
}

/// Explicitly constructed set of limiters, one per route class.
///
/// Owned by server startup and passed by handle into the middleware, so
/// there is no hidden global state and tests get isolated instances.
pub struct QuotaRegistry {
    auth: QuotaLimiter,
    admin: QuotaLimiter,
    api: QuotaLimiter,
    general: QuotaLimiter,
}

impl QuotaRegistry {
    pub fn new(settings: RateLimitSettings) -> Self {
        Self {
            auth: QuotaLimiter::new(settings.auth.to_config("auth")),
            admin: QuotaLimiter::new(settings.admin.to_config("admin")),
            api: QuotaLimiter::new(settings.api.to_config("api")),
            general: QuotaLimiter::new(settings.general.to_config("general")),
        }
    }

    pub fn limiter_for(&self, class: RouteClass) -> &QuotaLimiter {
        match class {
            RouteClass::Auth => &self.auth,
            RouteClass::Admin => &self.admin,
            RouteClass::Api => &self.api,
            RouteClass::General => &self.general,
        }
    }

    /// Start eviction tasks for all four limiters.
    pub fn spawn_eviction(&self, every: Duration, grace: Duration) {
        for class in [
            RouteClass::Auth,
            RouteClass::Admin,
            RouteClass::Api,
            RouteClass::General,
        ] {
            self.limiter_for(class).spawn_eviction(every, grace);
        }
    }
}

/// Derive the quota key from proxy headers.
///
/// The identity is untrusted and only ever selects a bucket; spoofing it
/// buys a client nothing except a different bucket.
pub fn client_identity(headers: &HeaderMap) -> ClientIdentity {
    let forwarded_for = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok());
    let real_ip = headers.get("x-real-ip").and_then(|v| v.to_str().ok());
    ClientIdentity::from_forwarded(forwarded_for, real_ip)
}

/// Admission middleware. Layered with `from_fn_with_state` over the whole
/// router; the registry handle comes from `AppState`.
pub async fn gatekeeper_middleware(
    State(registry): State<Arc<QuotaRegistry>>,
    mut request: Request,
    next: Next,
) -> Response {
    let identity = client_identity(request.headers());
    let class = RouteClass::classify(request.uri().path());
    let limiter = registry.limiter_for(class);

    match limiter.consume(identity.as_str()) {
        ConsumeOutcome::Rejected {
            ms_before_next,
            reset_at,
        } => {
            tracing::warn!(
                client = %identity,
                class = class.as_str(),
                ms_before_next,
                "request rejected by quota"
            );
            counter!("gatekeeper_rejected_total", "class" => class.as_str()).increment(1);

            ApiError::Throttled {
                retry_after_secs: ms_before_next.div_ceil(1000).max(1),
                limit: limiter.points(),
                reset_at,
            }
            .into_response()
        }
        ConsumeOutcome::Admitted {
            remaining,
            reset_at,
        } => {
            counter!("gatekeeper_admitted_total", "class" => class.as_str()).increment(1);

            // Downstream handlers (the auth dispatcher in particular) reuse
            // the derived identity for audit events.
            request.extensions_mut().insert(identity);

            let mut response = next.run(request).await;
            stamp_rate_limit_headers(
                response.headers_mut(),
                limiter.points(),
                remaining,
                reset_at,
            );
            response
        }
    }
}

/// Add `X-RateLimit-*` telemetry to a response.
pub fn stamp_rate_limit_headers(
    headers: &mut HeaderMap,
    limit: u32,
    remaining: u32,
    reset_at: DateTime<Utc>,
) {
    if let Ok(value) = HeaderValue::from_str(&limit.to_string()) {
        headers.insert("X-RateLimit-Limit", value);
    }
    if let Ok(value) = HeaderValue::from_str(&remaining.to_string()) {
        headers.insert("X-RateLimit-Remaining", value);
    }
    if let Ok(value) = HeaderValue::from_str(&reset_at.timestamp().to_string()) {
        headers.insert("X-RateLimit-Reset", value);
    }
}
