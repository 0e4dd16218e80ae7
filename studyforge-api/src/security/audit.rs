//! Security audit log for authentication attempts.
//!
//! Append-only, fire-and-forget: a writer failure is recorded via tracing
//! and never propagates back into the request path.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

pub type AuditResult<T> = Result<T, AuditError>;

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One authentication attempt's outcome. Write-once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    /// Derived client identity the attempt came from.
    pub client: String,
    /// Action name (`signin`, `signup`, ...).
    pub action: String,
    pub success: bool,
    /// Machine-readable failure reason; absent on success.
    pub reason: Option<String>,
    /// Internal failure detail. Present only on system events; never sent
    /// to the client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
}

impl AuditEvent {
    pub fn success(client: &str, action: &str, duration_ms: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            client: client.to_string(),
            action: action.to_string(),
            success: true,
            reason: None,
            detail: None,
            timestamp: Utc::now(),
            duration_ms,
        }
    }

    pub fn failure(client: &str, action: &str, reason: &str, duration_ms: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            client: client.to_string(),
            action: action.to_string(),
            success: false,
            reason: Some(reason.to_string()),
            detail: None,
            timestamp: Utc::now(),
            duration_ms,
        }
    }

    /// A failure caused by the system rather than the caller; carries the
    /// internal detail for the sink.
    pub fn system(client: &str, action: &str, reason: &str, detail: &str, duration_ms: u64) -> Self {
        Self {
            detail: Some(detail.to_string()),
            ..Self::failure(client, action, reason, duration_ms)
        }
    }
}

/// Sink for audit events.
#[async_trait]
pub trait AuditWriter: Send + Sync {
    async fn write(&self, event: &AuditEvent) -> AuditResult<()>;

    async fn flush(&self) -> AuditResult<()> {
        Ok(())
    }
}

/// Entry point the dispatcher talks to. Swallows writer failures.
pub struct AuditLogger {
    writer: Arc<dyn AuditWriter>,
}

impl AuditLogger {
    pub fn new(writer: Arc<dyn AuditWriter>) -> Self {
        Self { writer }
    }

    /// Record an attempt. Never fails toward the caller.
    pub async fn record(&self, event: AuditEvent) {
        if let Err(err) = self.writer.write(&event).await {
            error!(audit_id = %event.id, %err, "audit write failed");
        }
    }

    /// Record an unexpected internal failure. The caller keeps its generic
    /// user-facing message; the detail goes to the log and the configured
    /// sink, never to the client.
    pub async fn system_error(&self, event: AuditEvent) {
        error!(
            audit_id = %event.id,
            action = %event.action,
            detail = event.detail.as_deref().unwrap_or(""),
            "internal failure"
        );
        self.record(event).await;
    }

    pub async fn flush(&self) {
        if let Err(err) = self.writer.flush().await {
            error!(%err, "audit flush failed");
        }
    }
}

impl Clone for AuditLogger {
    fn clone(&self) -> Self {
        Self {
            writer: Arc::clone(&self.writer),
        }
    }
}

/// Emits audit events as structured tracing records.
#[derive(Default)]
pub struct TracingAuditWriter;

impl TracingAuditWriter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AuditWriter for TracingAuditWriter {
    async fn write(&self, event: &AuditEvent) -> AuditResult<()> {
        if event.success {
            info!(
                audit_id = %event.id,
                client = %event.client,
                action = %event.action,
                duration_ms = event.duration_ms,
                "auth attempt succeeded"
            );
        } else {
            warn!(
                audit_id = %event.id,
                client = %event.client,
                action = %event.action,
                reason = ?event.reason,
                duration_ms = event.duration_ms,
                "auth attempt failed"
            );
        }
        Ok(())
    }
}

/// Appends audit events as JSON lines to a file.
pub struct FileAuditWriter {
    path: PathBuf,
    file: Arc<RwLock<Option<File>>>,
}

impl FileAuditWriter {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            file: Arc::new(RwLock::new(None)),
        }
    }

    async fn ensure_open(&self) -> AuditResult<()> {
        let mut slot = self.file.write().await;
        if slot.is_none() {
            if let Some(parent) = self.path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            *slot = Some(file);
        }
        Ok(())
    }
}

#[async_trait]
impl AuditWriter for FileAuditWriter {
    async fn write(&self, event: &AuditEvent) -> AuditResult<()> {
        self.ensure_open().await?;

        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        let mut slot = self.file.write().await;
        if let Some(ref mut file) = *slot {
            file.write_all(line.as_bytes()).await?;
        }
        Ok(())
    }

    async fn flush(&self) -> AuditResult<()> {
        let mut slot = self.file.write().await;
        if let Some(ref mut file) = *slot {
            file.flush().await?;
        }
        Ok(())
    }
}
