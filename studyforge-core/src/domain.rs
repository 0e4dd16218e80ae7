//! Domain types shared across the gatekeeper pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An authenticated account as returned by the credential provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserAccount {
    pub id: Uuid,
    pub email: String,
    pub role: String,
}

/// A freshly registered account. Email confirmation may still be pending.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewAccount {
    pub id: Uuid,
    pub email: String,
    pub email_confirmed: bool,
}

/// Token pair issued by the provider for an active session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Successful credential exchange: the account plus its session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionBundle {
    pub user: UserAccount,
    pub session: SessionTokens,
}

/// Sentinel identity used when no client address can be derived.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Derived key identifying the caller for quota bucketing.
///
/// Extracted from proxy headers, so it is *not* authenticated — it is only
/// ever used to pick a rate-limit bucket. Recomputed per request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    /// Derive an identity from forwarded-for / real-ip header values.
    ///
    /// A forwarded-for value may carry a comma-separated proxy chain; the
    /// left-most entry is the original client. Empty values fall through to
    /// the next source, ending at the `"unknown"` sentinel.
    pub fn from_forwarded(forwarded_for: Option<&str>, real_ip: Option<&str>) -> Self {
        if let Some(forwarded) = forwarded_for {
            if let Some(first) = forwarded.split(',').next() {
                let first = first.trim();
                if !first.is_empty() {
                    return Self(first.to_string());
                }
            }
        }
        if let Some(ip) = real_ip {
            let ip = ip.trim();
            if !ip.is_empty() {
                return Self(ip.to_string());
            }
        }
        Self(UNKNOWN_CLIENT.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == UNKNOWN_CLIENT
    }
}

impl std::fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
