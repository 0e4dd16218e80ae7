//! Fixed security headers applied to every response.
//!
//! Layered outside the gatekeeper so early quota rejections carry the same
//! hardening headers as admitted responses.

use axum::{
    extract::Request,
    http::{header, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

/// Configuration for the hardening headers.
#[derive(Debug, Clone)]
pub struct SecurityHeadersConfig {
    /// HSTS max age in seconds (default: 1 year).
    pub hsts_max_age: u64,
    /// Include subdomains in HSTS.
    pub hsts_include_subdomains: bool,
    /// `X-Frame-Options: DENY`.
    pub deny_framing: bool,
    /// `X-Content-Type-Options: nosniff`.
    pub content_type_nosniff: bool,
    /// `X-XSS-Protection` (legacy, but still a useful hint for old browsers).
    pub xss_protection: bool,
    /// `Referrer-Policy: strict-origin-when-cross-origin`.
    pub strict_referrer: bool,
    /// `Permissions-Policy` value; camera, microphone, and geolocation
    /// disabled by default.
    pub permissions_policy: Option<String>,
}

impl Default for SecurityHeadersConfig {
    fn default() -> Self {
        Self {
            hsts_max_age: 31_536_000,
            hsts_include_subdomains: true,
            deny_framing: true,
            content_type_nosniff: true,
            xss_protection: true,
            strict_referrer: true,
            permissions_policy: Some("camera=(), microphone=(), geolocation=()".to_string()),
        }
    }
}

impl SecurityHeadersConfig {
    fn hsts_value(&self) -> String {
        let mut value = format!("max-age={}", self.hsts_max_age);
        if self.hsts_include_subdomains {
            value.push_str("; includeSubDomains");
        }
        value
    }
}

/// Security headers middleware with the default configuration.
pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let config = SecurityHeadersConfig::default();
    apply_security_headers(next.run(request).await, &config)
}

/// Stamp hardening headers onto a response.
pub fn apply_security_headers(mut response: Response, config: &SecurityHeadersConfig) -> Response {
    let headers = response.headers_mut();

    if let Ok(value) = HeaderValue::from_str(&config.hsts_value()) {
        headers.insert(header::STRICT_TRANSPORT_SECURITY, value);
    }

    if config.deny_framing {
        headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    }

    if config.content_type_nosniff {
        headers.insert(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        );
    }

    if config.xss_protection {
        headers.insert(
            HeaderName::from_static("x-xss-protection"),
            HeaderValue::from_static("1; mode=block"),
        );
    }

    if config.strict_referrer {
        headers.insert(
            HeaderName::from_static("referrer-policy"),
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        );
    }

    if let Some(ref policy) = config.permissions_policy {
        if let Ok(value) = HeaderValue::from_str(policy) {
            headers.insert(HeaderName::from_static("permissions-policy"), value);
        }
    }

    response
}
