//! HTTP surface for authentication actions.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde_json::{json, Value};

use studyforge_core::ClientIdentity;

use crate::auth::{AuthAction, AuthOutcome};
use crate::error::ApiResult;
use crate::security::gatekeeper::client_identity;
use crate::AppState;

/// `POST /api/auth` with body `{action, ...payload}`.
///
/// The gatekeeper normally stashes the derived client identity in request
/// extensions; when the route is exercised without it (unit setups), the
/// identity is re-derived from headers.
pub async fn auth_action(
    State(state): State<AppState>,
    identity: Option<Extension<ClientIdentity>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> ApiResult<Response> {
    let identity = identity
        .map(|Extension(identity)| identity)
        .unwrap_or_else(|| client_identity(&headers));

    let action = AuthAction::parse(body)?;
    let outcome = state.dispatcher.dispatch(&identity, action).await?;
    Ok(outcome_response(outcome))
}

fn outcome_response(outcome: AuthOutcome) -> Response {
    match outcome {
        AuthOutcome::SignedIn(bundle) => (
            StatusCode::OK,
            Json(json!({ "user": bundle.user, "session": bundle.session })),
        )
            .into_response(),
        AuthOutcome::SignedUp(account) => {
            (StatusCode::CREATED, Json(json!({ "user": account }))).into_response()
        }
        AuthOutcome::SignedOut => {
            (StatusCode::OK, Json(json!({ "success": true }))).into_response()
        }
        AuthOutcome::Refreshed(session) => {
            (StatusCode::OK, Json(json!({ "session": session }))).into_response()
        }
        AuthOutcome::ResetEmailSent => {
            (StatusCode::OK, Json(json!({ "success": true }))).into_response()
        }
        AuthOutcome::PasswordUpdated { user_id } => (
            StatusCode::OK,
            Json(json!({ "success": true, "user_id": user_id })),
        )
            .into_response(),
    }
}
