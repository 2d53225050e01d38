use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;

use crate::authorize::{StageSnapshot, require_phase_owner};
use crate::errors::WorkflowError;
use crate::events::EventSender;
use crate::models::{Actor, AdvancePayload, CreateApplicationRequest};
use crate::phases::Role;
use crate::service::AdvanceService;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub service: AdvanceService,
    pub events: EventSender,
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ListQuery {
    pub role: String,
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Forbidden(String),
    Conflict(String),
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        match &err {
            WorkflowError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            WorkflowError::Forbidden(_) => ApiError::Forbidden(err.to_string()),
            WorkflowError::BadState(_) => ApiError::Conflict(err.to_string()),
            WorkflowError::Storage(_) => {
                tracing::error!("storage failure: {:#}", err);
                ApiError::Internal("Storage failure".into())
            }
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router(state: SharedState) -> Router {
    Router::new()
        .route(
            "/api/applications",
            get(list_applications).post(create_application),
        )
        .route("/api/applications/{id}", get(get_application))
        .route(
            "/api/applications/{id}/advance",
            post(advance_application)
                .route_layer(middleware::from_fn_with_state(
                    state.clone(),
                    require_phase_owner,
                )),
        )
        .route("/health", get(health_check))
        .with_state(state)
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn create_application(
    State(state): State<SharedState>,
    Json(req): Json<CreateApplicationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.title.trim().is_empty() {
        return Err(ApiError::BadRequest("Title is required".into()));
    }
    let application = state.service.create(req).await?;
    Ok((StatusCode::CREATED, Json(application)))
}

async fn get_application(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    match state.service.get(id.clone()).await? {
        Some(application) => Ok(Json(application)),
        None => Err(ApiError::NotFound(format!("Application {} not found", id))),
    }
}

/// Dashboard listing: applications sitting at the phase the given role owns.
async fn list_applications(
    State(state): State<SharedState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let role = Role::from_str(&query.role).map_err(ApiError::BadRequest)?;
    let applications = state.service.list_for_role(role).await?;
    Ok(Json(applications))
}

/// The single mutating endpoint. `require_phase_owner` has already verified
/// the actor and inserted it; the service re-reads the application inside
/// its own transaction, so the gate's snapshot is never the write basis.
async fn advance_application(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Extension(actor): Extension<Actor>,
    Extension(snapshot): Extension<StageSnapshot>,
    Json(payload): Json<AdvancePayload>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::debug!(
        id = %id,
        actor_id = %actor.id,
        phase = %snapshot.0.status,
        version = snapshot.0.version,
        "advance requested"
    );
    let application = state.service.advance(id, actor, payload).await?;
    Ok(Json(application))
}

// ── Tests ─────────────────────────────────────────────────────────────
