use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use studyforge_api::security::{
    AuditLogger, AuditWriter, FileAuditWriter, QuotaRegistry, TracingAuditWriter,
};
use studyforge_api::AppState;

mod config;
mod provider;

/// Eviction cadence for expired quota windows.
const EVICTION_INTERVAL: Duration = Duration::from_secs(300);
/// How long past its reset a window may linger before eviction.
const EVICTION_GRACE: Duration = Duration::from_secs(3600);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "studyforge_server=debug,studyforge_api=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting StudyForge server");

    let config = config::Config::load()?;
    tracing::info!("Configuration loaded");

    let audit_writer: Arc<dyn AuditWriter> = match &config.audit_log_path {
        Some(path) => Arc::new(FileAuditWriter::new(PathBuf::from(path))),
        None => Arc::new(TracingAuditWriter::new()),
    };
    let audit = AuditLogger::new(audit_writer);

    // The quota registry is owned here and handed into the middleware by
    // reference; no module-level limiter state anywhere.
    let quotas = Arc::new(QuotaRegistry::new(config.rate_limits));
    quotas.spawn_eviction(EVICTION_INTERVAL, EVICTION_GRACE);
    tracing::info!("Quota registry initialized");

    let provider = Arc::new(provider::InMemoryAuthProvider::new());

    let state = AppState::new(provider, audit, quotas);

    let app = Router::new()
        .route("/health", get(health_check))
        .merge(studyforge_api::routes(state))
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}
