//! Input sanitization and classification for untrusted strings.
//!
//! Everything here is a total function: malformed input produces a value
//! describing the problem, never a panic or an error the caller has to
//! unwind past. Callers translate failed checks into an `ApiError` at the
//! boundary.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use validator::ValidationError;

static JS_URI_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)javascript:").unwrap());
static EVENT_HANDLER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bon\w+\s*=").unwrap());

static SQL_KEYWORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(SELECT|INSERT|UPDATE|DELETE|DROP|CREATE|ALTER|EXEC|UNION|SCRIPT)\b")
        .unwrap()
});
static SQL_TAUTOLOGY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(OR|AND)\b\s+\S+\s*=\s*\S+").unwrap());

/// Neutralize markup and script-bearing fragments in untrusted input.
///
/// Strips angle brackets, NUL bytes, `javascript:` URI prefixes, and inline
/// event-handler patterns (`onclick=`, `onerror =`, ...), then trims. Runs
/// to a fixpoint: stripping one pattern can splice the surrounding text into
/// a new match (`oonclick=nclick=` collapses to `onclick=`), so a single
/// pass is not enough to make the result stable.
pub fn sanitize(input: &str) -> String {
    let mut current = input.to_string();
    loop {
        let next = sanitize_pass(&current);
        if next == current {
            return next;
        }
        current = next;
    }
}

fn sanitize_pass(input: &str) -> String {
    let stripped: String = input
        .chars()
        .filter(|c| *c != '<' && *c != '>' && *c != '\0')
        .collect();
    let stripped = JS_URI_RE.replace_all(&stripped, "");
    let stripped = EVENT_HANDLER_RE.replace_all(&stripped, "");
    stripped.trim().to_string()
}

/// Encode untrusted text for embedding in HTML output.
///
/// Output-encoding counterpart to [`sanitize`]; the two are never applied to
/// the same value for the same purpose. Ampersand goes first so already
/// produced entities are not double-escaped into garbage.
pub fn escape_for_display(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
        .replace('/', "&#x2F;")
}

/// Structural email check: single `@`, non-empty local and domain parts,
/// dotted domain, no surrounding whitespace.
pub fn is_valid_email(value: &str) -> bool {
    if value.is_empty() || value != value.trim() {
        return false;
    }
    if value.matches('@').count() != 1 {
        return false;
    }
    match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && domain.contains('.'),
        None => false,
    }
}

/// Absolute http/https URL check. Malformed strings are simply `false`.
pub fn is_valid_url(value: &str) -> bool {
    match url::Url::parse(value) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

/// Heuristic SQL-injection classifier.
///
/// Matches word-bounded SQL keywords, `OR`/`AND ... = ...` tautologies, and
/// quote/semicolon/comment delimiter characters. False positives are
/// expected; a `true` result means "reject and ask the user to revise",
/// never a security proof. Real protection is parameterized queries in the
/// data-store collaborator.
pub fn looks_like_sql_injection(value: &str) -> bool {
    if SQL_KEYWORD_RE.is_match(value) || SQL_TAUTOLOGY_RE.is_match(value) {
        return true;
    }
    value.contains('\'')
        || value.contains('"')
        || value.contains(';')
        || value.contains("--")
        || value.contains('*')
}

/// Result of scoring a candidate password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordStrength {
    pub is_valid: bool,
    pub score: u8,
    pub feedback: Vec<String>,
}

/// Score a password one point per criterion: length >= 8, lowercase,
/// uppercase, digit, special character. Valid from 4 points up. Feedback
/// messages are deterministic and ordered by criterion.
pub fn score_password_strength(password: &str) -> PasswordStrength {
    let criteria: [(bool, &str); 5] = [
        (
            password.chars().count() >= 8,
            "Use at least 8 characters",
        ),
        (
            password.chars().any(|c| c.is_ascii_lowercase()),
            "Add a lowercase letter",
        ),
        (
            password.chars().any(|c| c.is_ascii_uppercase()),
            "Add an uppercase letter",
        ),
        (
            password.chars().any(|c| c.is_ascii_digit()),
            "Add a digit",
        ),
        (
            password
                .chars()
                .any(|c| !c.is_alphanumeric() && !c.is_whitespace()),
            "Add a special character",
        ),
    ];

    let mut score = 0u8;
    let mut feedback = Vec::new();
    for (met, message) in criteria {
        if met {
            score += 1;
        } else {
            feedback.push(message.to_string());
        }
    }

    PasswordStrength {
        is_valid: score >= 4,
        score,
        feedback,
    }
}

/// Metadata of a candidate upload. Only metadata is inspected here; content
/// scanning is not this layer's job.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub size_bytes: u64,
    pub mime_type: String,
}

/// Constraints applied to uploads. Empty allow-lists skip that check.
#[derive(Debug, Clone, Default)]
pub struct UploadPolicy {
    pub max_size_bytes: u64,
    pub allowed_mime_types: Vec<String>,
    pub allowed_extensions: Vec<String>,
}

/// A rejected upload, naming the violated constraint and its limit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("File is {actual} bytes, exceeding the maximum of {max} bytes")]
    TooLarge { actual: u64, max: u64 },

    #[error("MIME type `{mime}` is not allowed (allowed: {allowed})")]
    MimeNotAllowed { mime: String, allowed: String },

    #[error("File extension `{extension}` is not allowed (allowed: {allowed})")]
    ExtensionNotAllowed { extension: String, allowed: String },
}

/// Check an upload against a policy: size, then MIME type, then extension.
/// The first violated constraint short-circuits.
pub fn validate_upload(file: &UploadedFile, policy: &UploadPolicy) -> Result<(), UploadError> {
    if file.size_bytes > policy.max_size_bytes {
        return Err(UploadError::TooLarge {
            actual: file.size_bytes,
            max: policy.max_size_bytes,
        });
    }

    if !policy.allowed_mime_types.is_empty()
        && !policy
            .allowed_mime_types
            .iter()
            .any(|m| m == &file.mime_type)
    {
        return Err(UploadError::MimeNotAllowed {
            mime: file.mime_type.clone(),
            allowed: policy.allowed_mime_types.join(", "),
        });
    }

    if !policy.allowed_extensions.is_empty() {
        let extension = file
            .name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        if !policy
            .allowed_extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(&extension))
        {
            return Err(UploadError::ExtensionNotAllowed {
                extension,
                allowed: policy.allowed_extensions.join(", "),
            });
        }
    }

    Ok(())
}

// Custom validators for use with the validator derive on payload structs.

/// Strict email validation for `#[validate(custom(...))]` fields.
pub fn validate_email_strict(value: &str) -> Result<(), ValidationError> {
    if is_valid_email(value) {
        Ok(())
    } else {
        let mut err = ValidationError::new("email");
        err.message = Some("A valid email address is required".into());
        Err(err)
    }
}
