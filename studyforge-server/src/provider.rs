//! In-memory credential provider for local development.
//!
//! The production deployment points the dispatcher at the hosted identity
//! service; this stand-in keeps accounts and a single ambient session in
//! process so the pipeline can be exercised end to end without it.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use studyforge_core::{
    AuthProvider, NewAccount, ProviderError, SessionBundle, SessionTokens, UserAccount,
};

#[derive(Clone)]
struct StoredAccount {
    id: Uuid,
    password: String,
}

#[derive(Clone)]
struct ActiveSession {
    user_id: Uuid,
    email: String,
}

#[derive(Default)]
pub struct InMemoryAuthProvider {
    accounts: RwLock<HashMap<String, StoredAccount>>,
    session: RwLock<Option<ActiveSession>>,
}

impl InMemoryAuthProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn issue_tokens() -> SessionTokens {
        SessionTokens {
            access_token: Uuid::new_v4().simple().to_string(),
            refresh_token: Uuid::new_v4().simple().to_string(),
            expires_at: Utc::now() + Duration::hours(1),
        }
    }
}

#[async_trait]
impl AuthProvider for InMemoryAuthProvider {
    async fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<SessionBundle>, ProviderError> {
        let accounts = self.accounts.read().await;
        let Some(account) = accounts.get(email) else {
            return Ok(None);
        };
        if account.password != password {
            return Ok(None);
        }

        let user = UserAccount {
            id: account.id,
            email: email.to_string(),
            role: "student".to_string(),
        };
        drop(accounts);

        *self.session.write().await = Some(ActiveSession {
            user_id: user.id,
            email: user.email.clone(),
        });

        Ok(Some(SessionBundle {
            user,
            session: Self::issue_tokens(),
        }))
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        _metadata: Option<serde_json::Value>,
    ) -> Result<Option<NewAccount>, ProviderError> {
        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(email) {
            return Err(ProviderError::DuplicateEmail);
        }

        let id = Uuid::new_v4();
        accounts.insert(
            email.to_string(),
            StoredAccount {
                id,
                password: password.to_string(),
            },
        );

        Ok(Some(NewAccount {
            id,
            email: email.to_string(),
            email_confirmed: false,
        }))
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        let mut session = self.session.write().await;
        if session.take().is_none() {
            return Err(ProviderError::Rejected("No active session".to_string()));
        }
        Ok(())
    }

    async fn refresh_session(&self) -> Result<Option<SessionTokens>, ProviderError> {
        let session = self.session.read().await;
        Ok(session.as_ref().map(|_| Self::issue_tokens()))
    }

    async fn reset_password(&self, _email: &str) -> Result<(), ProviderError> {
        // Always succeeds so account existence cannot be probed.
        Ok(())
    }

    async fn update_password(&self, password: &str) -> Result<Option<Uuid>, ProviderError> {
        let session = self.session.read().await;
        let Some(active) = session.as_ref() else {
            return Ok(None);
        };

        let mut accounts = self.accounts.write().await;
        if let Some(account) = accounts.get_mut(&active.email) {
            account.password = password.to_string();
        }
        Ok(Some(active.user_id))
    }
}
