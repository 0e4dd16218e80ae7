//! The request admission pipeline: quota enforcement, client
//! identification, security headers, audit logging, and input guarding.

pub mod audit;
pub mod gatekeeper;
pub mod headers;
pub mod quota;
pub mod validation;

pub use audit::{
    AuditError, AuditEvent, AuditLogger, AuditResult, AuditWriter, FileAuditWriter,
    TracingAuditWriter,
};
pub use gatekeeper::{
    client_identity, gatekeeper_middleware, stamp_rate_limit_headers, QuotaRegistry,
    RateLimitSettings, RouteClass, RouteQuota,
};
pub use headers::{
    apply_security_headers, security_headers_middleware, SecurityHeadersConfig,
};
pub use quota::{ConsumeOutcome, QuotaConfig, QuotaLimiter, WindowSnapshot};
pub use validation::{
    escape_for_display, is_valid_email, is_valid_url, looks_like_sql_injection, sanitize,
    score_password_strength, validate_upload, PasswordStrength, UploadError, UploadPolicy,
    UploadedFile,
};
