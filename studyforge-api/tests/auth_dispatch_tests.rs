use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use studyforge_api::auth::{AuthAction, AuthDispatcher};
use studyforge_api::error::ApiError;
use studyforge_api::security::{
    AuditEvent, AuditLogger, AuditResult, AuditWriter, QuotaRegistry, RateLimitSettings,
    RouteQuota,
};
use studyforge_api::AppState;
use studyforge_core::{
    AuthProvider, ClientIdentity, NewAccount, ProviderError, SessionBundle, SessionTokens,
    UserAccount,
};

// ===== Test Helper Functions =====

/// How the mock provider responds to every operation.
#[derive(Clone, Copy, Debug)]
enum Behavior {
    Succeed,
    /// `Ok` with no data, the provider's "no error but empty result" case.
    Empty,
    Error,
    DuplicateEmail,
}

struct MockProvider {
    behavior: Behavior,
    calls: AtomicUsize,
}

impl MockProvider {
    fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn sample_bundle(email: &str) -> SessionBundle {
        SessionBundle {
            user: UserAccount {
                id: Uuid::new_v4(),
                email: email.to_string(),
                role: "student".to_string(),
            },
            session: Self::sample_tokens(),
        }
    }

    fn sample_tokens() -> SessionTokens {
        SessionTokens {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        }
    }
}

#[async_trait]
impl AuthProvider for MockProvider {
    async fn sign_in(
        &self,
        email: &str,
        _password: &str,
    ) -> Result<Option<SessionBundle>, ProviderError> {
        self.bump();
        match self.behavior {
            Behavior::Succeed => Ok(Some(Self::sample_bundle(email))),
            Behavior::Empty => Ok(None),
            _ => Err(ProviderError::Rejected("invalid".to_string())),
        }
    }

    async fn sign_up(
        &self,
        email: &str,
        _password: &str,
        _metadata: Option<Value>,
    ) -> Result<Option<NewAccount>, ProviderError> {
        self.bump();
        match self.behavior {
            Behavior::Succeed => Ok(Some(NewAccount {
                id: Uuid::new_v4(),
                email: email.to_string(),
                email_confirmed: false,
            })),
            Behavior::Empty => Ok(None),
            Behavior::DuplicateEmail => Err(ProviderError::DuplicateEmail),
            Behavior::Error => Err(ProviderError::Rejected("upstream exploded".to_string())),
        }
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        self.bump();
        match self.behavior {
            Behavior::Succeed => Ok(()),
            _ => Err(ProviderError::Rejected("no session".to_string())),
        }
    }

    async fn refresh_session(&self) -> Result<Option<SessionTokens>, ProviderError> {
        self.bump();
        match self.behavior {
            Behavior::Succeed => Ok(Some(Self::sample_tokens())),
            Behavior::Empty => Ok(None),
            _ => Err(ProviderError::Rejected("no session".to_string())),
        }
    }

    async fn reset_password(&self, _email: &str) -> Result<(), ProviderError> {
        self.bump();
        match self.behavior {
            Behavior::Succeed => Ok(()),
            _ => Err(ProviderError::Unavailable("mailer down".to_string())),
        }
    }

    async fn update_password(&self, _password: &str) -> Result<Option<Uuid>, ProviderError> {
        self.bump();
        match self.behavior {
            Behavior::Succeed => Ok(Some(Uuid::new_v4())),
            Behavior::Empty => Ok(None),
            _ => Err(ProviderError::Rejected("no session".to_string())),
        }
    }
}

/// Captures audit events for assertions.
#[derive(Default)]
struct MemoryAuditWriter {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditWriter {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditWriter for MemoryAuditWriter {
    async fn write(&self, event: &AuditEvent) -> AuditResult<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

fn dispatcher(provider: Arc<MockProvider>, audit: Arc<MemoryAuditWriter>) -> AuthDispatcher {
    AuthDispatcher::new(provider, AuditLogger::new(audit))
}

fn client() -> ClientIdentity {
    ClientIdentity::from_forwarded(Some("203.0.113.1"), None)
}

fn action(body: Value) -> AuthAction {
    AuthAction::parse(body).expect("parseable action")
}

// ===== Dispatch Completeness: Provider Errors =====

#[tokio::test]
async fn signin_provider_error_maps_to_invalid_credentials() {
    let provider = MockProvider::new(Behavior::Error);
    let audit = MemoryAuditWriter::new();
    let dispatcher = dispatcher(provider.clone(), audit.clone());

    let err = dispatcher
        .dispatch(
            &client(),
            action(json!({"action": "signin", "email": "a@b.com", "password": "password1"})),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Authentication(m) if m == "Invalid credentials"));
    assert_eq!(provider.calls(), 1);

    let events = audit.events();
    assert_eq!(events.len(), 1);
    assert!(!events[0].success);
    assert_eq!(events[0].reason.as_deref(), Some("invalid_credentials"));
    assert_eq!(events[0].action, "signin");
    assert_eq!(events[0].client, "203.0.113.1");
}

#[tokio::test]
async fn signin_empty_result_is_also_invalid_credentials() {
    let provider = MockProvider::new(Behavior::Empty);
    let audit = MemoryAuditWriter::new();
    let dispatcher = dispatcher(provider, audit.clone());

    let err = dispatcher
        .dispatch(
            &client(),
            action(json!({"action": "signin", "email": "a@b.com", "password": "password1"})),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Authentication(m) if m == "Invalid credentials"));
    assert_eq!(audit.events().len(), 1);
}

#[tokio::test]
async fn signup_duplicate_email_message() {
    let provider = MockProvider::new(Behavior::DuplicateEmail);
    let audit = MemoryAuditWriter::new();
    let dispatcher = dispatcher(provider, audit.clone());

    let err = dispatcher
        .dispatch(
            &client(),
            action(json!({"action": "signup", "email": "a@b.com", "password": "password1"})),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Validation(m) if m == "Email already registered"));
    assert_eq!(audit.events()[0].reason.as_deref(), Some("signup_failed"));
}

#[tokio::test]
async fn signup_other_provider_error_passes_message_through() {
    let provider = MockProvider::new(Behavior::Error);
    let audit = MemoryAuditWriter::new();
    let dispatcher = dispatcher(provider, audit.clone());

    let err = dispatcher
        .dispatch(
            &client(),
            action(json!({"action": "signup", "email": "a@b.com", "password": "password1"})),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Validation(m) if m == "upstream exploded"));
}

#[tokio::test]
async fn signout_refresh_reset_update_error_messages() {
    let cases = [
        (json!({"action": "signout"}), "Signout failed", true),
        (json!({"action": "refresh"}), "Session refresh failed", true),
        (
            json!({"action": "reset-password", "email": "a@b.com"}),
            "Password reset failed",
            false,
        ),
        (
            json!({"action": "update-password", "password": "password1"}),
            "Password update failed",
            true,
        ),
    ];

    for (body, expected_message, is_authentication) in cases {
        let provider = MockProvider::new(Behavior::Error);
        let audit = MemoryAuditWriter::new();
        let dispatcher = dispatcher(provider.clone(), audit.clone());

        let err = dispatcher
            .dispatch(&client(), action(body.clone()))
            .await
            .unwrap_err();

        match (&err, is_authentication) {
            (ApiError::Authentication(m), true) => assert_eq!(m.as_str(), expected_message),
            (ApiError::Validation(m), false) => assert_eq!(m.as_str(), expected_message),
            other => panic!("unexpected mapping for {body}: {other:?}"),
        }
        assert_eq!(provider.calls(), 1);
        assert_eq!(audit.events().len(), 1, "exactly one audit event for {body}");
    }
}

#[tokio::test]
async fn unavailable_provider_detail_reaches_the_audit_sink() {
    // reset_password fails with a transport-level error carrying detail.
    let provider = MockProvider::new(Behavior::Error);
    let audit = MemoryAuditWriter::new();
    let dispatcher = dispatcher(provider.clone(), audit.clone());

    let err = dispatcher
        .dispatch(
            &client(),
            action(json!({"action": "reset-password", "email": "a@b.com"})),
        )
        .await
        .unwrap_err();

    // The caller still gets the generic message.
    assert!(matches!(err, ApiError::Validation(m) if m == "Password reset failed"));

    // Exactly one event, with the internal detail attached for the sink.
    let events = audit.events();
    assert_eq!(events.len(), 1);
    assert!(!events[0].success);
    assert_eq!(events[0].reason.as_deref(), Some("reset_failed"));
    assert_eq!(events[0].detail.as_deref(), Some("mailer down"));
}

// ===== Success Paths =====

#[tokio::test]
async fn every_action_succeeds_with_cooperative_provider() {
    let bodies = [
        json!({"action": "signin", "email": "a@b.com", "password": "password1"}),
        json!({"action": "signup", "email": "a@b.com", "password": "password1"}),
        json!({"action": "signout"}),
        json!({"action": "refresh"}),
        json!({"action": "reset-password", "email": "a@b.com"}),
        json!({"action": "update-password", "password": "password1"}),
    ];

    for body in bodies {
        let provider = MockProvider::new(Behavior::Succeed);
        let audit = MemoryAuditWriter::new();
        let dispatcher = dispatcher(provider.clone(), audit.clone());

        dispatcher
            .dispatch(&client(), action(body.clone()))
            .await
            .unwrap_or_else(|e| panic!("{body} failed: {e:?}"));

        assert_eq!(provider.calls(), 1);
        let events = audit.events();
        assert_eq!(events.len(), 1);
        assert!(events[0].success);
        assert!(events[0].reason.is_none());
    }
}

#[tokio::test]
async fn signup_confirmation_must_match() {
    let provider = MockProvider::new(Behavior::Succeed);
    let audit = MemoryAuditWriter::new();
    let dispatcher = dispatcher(provider.clone(), audit.clone());

    let err = dispatcher
        .dispatch(
            &client(),
            action(json!({
                "action": "signup",
                "email": "a@b.com",
                "password": "password1",
                "confirm_password": "password2",
            })),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Validation(_)));
    assert_eq!(provider.calls(), 0);
    assert!(audit.events().is_empty());
}

// ===== End-to-End Through the Router =====

fn generous_settings() -> RateLimitSettings {
    let quota = RouteQuota {
        points: 1000,
        duration_seconds: 60,
    };
    RateLimitSettings {
        auth: quota,
        admin: quota,
        api: quota,
        general: quota,
    }
}

fn test_state(provider: Arc<MockProvider>, audit: Arc<MemoryAuditWriter>) -> AppState {
    AppState::new(
        provider,
        AuditLogger::new(audit),
        Arc::new(QuotaRegistry::new(generous_settings())),
    )
}

fn post_auth(body: Value) -> Request<Body> {
    Request::builder()
        .uri("/api/auth")
        .method("POST")
        .header("content-type", "application/json")
        .header("x-forwarded-for", "203.0.113.9")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn short_password_is_rejected_before_the_provider() {
    let provider = MockProvider::new(Behavior::Succeed);
    let audit = MemoryAuditWriter::new();
    let app = studyforge_api::routes(test_state(provider.clone(), audit.clone()));

    let response = app
        .oneshot(post_auth(
            json!({"action": "signin", "email": "a@b.com", "password": "short"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "validation_error");
    assert!(
        body["message"].as_str().unwrap().contains("at least 8"),
        "message cites password length: {body}"
    );

    // Validation failures short-circuit: no provider call, no audit event.
    assert_eq!(provider.calls(), 0);
    assert!(audit.events().is_empty());
}

#[tokio::test]
async fn rejected_credentials_yield_401_and_one_audit_event() {
    let provider = MockProvider::new(Behavior::Error);
    let audit = MemoryAuditWriter::new();
    let app = studyforge_api::routes(test_state(provider.clone(), audit.clone()));

    let response = app
        .oneshot(post_auth(
            json!({"action": "signin", "email": "a@b.com", "password": "password1"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "authentication_error");
    assert_eq!(body["message"], "Invalid credentials");

    assert_eq!(provider.calls(), 1);
    let events = audit.events();
    assert_eq!(events.len(), 1);
    assert!(!events[0].success);
    // The identity derived by the gatekeeper flows into the audit event.
    assert_eq!(events[0].client, "203.0.113.9");
}

#[tokio::test]
async fn signup_returns_201_with_account_body() {
    let provider = MockProvider::new(Behavior::Succeed);
    let audit = MemoryAuditWriter::new();
    let app = studyforge_api::routes(test_state(provider, audit));

    let response = app
        .oneshot(post_auth(
            json!({"action": "signup", "email": "new@b.com", "password": "password1"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["user"]["email"], "new@b.com");
    assert_eq!(body["user"]["email_confirmed"], false);
}

#[tokio::test]
async fn unknown_action_is_a_validation_error() {
    let provider = MockProvider::new(Behavior::Succeed);
    let audit = MemoryAuditWriter::new();
    let app = studyforge_api::routes(test_state(provider.clone(), audit.clone()));

    let response = app
        .oneshot(post_auth(json!({"action": "teleport"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["message"], "Invalid action specified");
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn signin_success_returns_user_and_session() {
    let provider = MockProvider::new(Behavior::Succeed);
    let audit = MemoryAuditWriter::new();
    let app = studyforge_api::routes(test_state(provider, audit.clone()));

    let response = app
        .oneshot(post_auth(
            json!({"action": "signin", "email": "a@b.com", "password": "password1"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["user"]["email"], "a@b.com");
    assert!(body["session"]["access_token"].is_string());
    assert!(body["session"]["refresh_token"].is_string());

    let events = audit.events();
    assert_eq!(events.len(), 1);
    assert!(events[0].success);
}
