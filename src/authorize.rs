use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Path, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};

use crate::api::{ApiError, SharedState};
use crate::errors::{ForbiddenReason, WorkflowError};
use crate::models::{Actor, Application};
use crate::phases::Role;

/// Read-only view of the application taken by the gate, left in request
/// extensions for handlers that want it. Purely advisory: the service
/// re-reads inside its transaction before writing.
#[derive(Clone)]
pub struct StageSnapshot(pub Arc<Application>);

/// Pulls the acting identity out of the `x-actor-id` / `x-actor-role`
/// headers set by the auth proxy in front of this service.
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get("x-actor-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .trim()
            .to_string();
        if id.is_empty() {
            return Err(WorkflowError::Forbidden(ForbiddenReason::MissingActor).into());
        }

        let role = parts
            .headers
            .get("x-actor-role")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(WorkflowError::Forbidden(ForbiddenReason::MissingRole))?;
        let role = Role::from_str(role)
            .map_err(|_| WorkflowError::Forbidden(ForbiddenReason::UnknownRole(role.to_string())))?;

        Ok(Actor { id, role })
    }
}

/// Gate for mutating routes: the actor's role must own the phase the
/// application currently sits at. Rejections carry both phases so the
/// caller can tell a stale dashboard from a misrouted request.
pub async fn require_phase_owner(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    actor: Actor,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let application = state
        .service
        .get(id.clone())
        .await?
        .ok_or_else(|| WorkflowError::NotFound { id: id.clone() })?;

    let required = actor.role.phase();
    if application.status != required {
        return Err(WorkflowError::wrong_stage(application.status, required).into());
    }

    tracing::debug!(
        application_id = %id,
        actor_id = %actor.id,
        role = %actor.role,
        phase = %application.status,
        "phase gate passed"
    );

    request
        .extensions_mut()
        .insert(StageSnapshot(Arc::new(application)));
    request.extensions_mut().insert(actor);
    Ok(next.run(request).await)
}
