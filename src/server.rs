use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::api::{self, AppState};
use crate::config::ServerConfig;
use crate::db::{DbHandle, WorkflowDb};
use crate::events;
use crate::phases;
use crate::service::AdvanceService;

/// Number of workflow events the broadcast channel buffers before slow
/// subscribers start missing messages.
const EVENT_CHANNEL_CAPACITY: usize = 256;

pub fn build_state(db: WorkflowDb) -> Arc<AppState> {
    let (events, _) = events::channel(EVENT_CHANNEL_CAPACITY);
    let service = AdvanceService::new(DbHandle::new(db), events.clone());
    Arc::new(AppState { service, events })
}

pub fn build_router(state: Arc<AppState>, dev_mode: bool) -> Router {
    let router = api::api_router(state);
    if dev_mode {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

pub async fn start_server(config: ServerConfig) -> Result<()> {
    phases::assert_role_phase_injective();

    if let Some(parent) = config.db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    let db = WorkflowDb::new(&config.db_path)
        .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?;
    let state = build_state(db);
    let app = build_router(state, config.dev_mode);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(
        addr = %addr,
        db = %config.db_path.display(),
        dev_mode = config.dev_mode,
        "permitflow listening"
    );
    println!("permitflow running at http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install ctrl-c handler: {}", e);
        return;
    }
    tracing::info!("Shutdown signal received");
}
