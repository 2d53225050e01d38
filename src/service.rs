//! The advance service: the single write path for applications.
//!
//! Every mutation goes through [`AdvanceService::advance`], which delegates
//! the transactional work to the store and emits the post-commit
//! notification. Handlers never touch the store's write methods directly.

use crate::db::DbHandle;
use crate::errors::WorkflowError;
use crate::events::{EventSender, WorkflowEvent, publish};
use crate::models::{Actor, AdvancePayload, Application, CreateApplicationRequest};
use crate::phases::Role;

#[derive(Clone)]
pub struct AdvanceService {
    db: DbHandle,
    events: EventSender,
}

impl AdvanceService {
    pub fn new(db: DbHandle, events: EventSender) -> Self {
        Self { db, events }
    }

    /// Intake: create a new application at the entry phase.
    pub async fn create(
        &self,
        req: CreateApplicationRequest,
    ) -> Result<Application, WorkflowError> {
        let title = req.title;
        let data = req.data.unwrap_or_else(|| serde_json::json!({}));
        let documents = req.documents.unwrap_or_default();
        let application = self
            .db
            .call(move |db| db.create_application(&title, data, documents))
            .await?;

        tracing::info!(id = %application.id, "application created");
        publish(
            &self.events,
            WorkflowEvent::ApplicationCreated {
                application_id: application.id.clone(),
                status: application.status,
            },
        );
        Ok(application)
    }

    /// Execute a single phase transition.
    ///
    /// The store re-reads the application inside its transaction, validates
    /// the actor against the current phase, applies the payload, and commits
    /// atomically. Only after the commit does the `application.advanced`
    /// event go out; emission failure never affects the committed change.
    pub async fn advance(
        &self,
        id: String,
        actor: Actor,
        payload: AdvancePayload,
    ) -> Result<Application, WorkflowError> {
        let event_actor = actor.id.clone();
        let application = self
            .db
            .call(move |db| db.advance_application(&id, &actor, &payload))
            .await?;

        tracing::info!(
            id = %application.id,
            to = %application.status,
            version = application.version,
            "application advanced"
        );
        publish(
            &self.events,
            WorkflowEvent::ApplicationAdvanced {
                application_id: application.id.clone(),
                by: event_actor,
                to: application.status,
            },
        );
        Ok(application)
    }

    pub async fn get(&self, id: String) -> Result<Option<Application>, WorkflowError> {
        self.db.call(move |db| db.get_application(&id)).await
    }

    /// Applications waiting at the given role's phase, newest updated first.
    pub async fn list_for_role(&self, role: Role) -> Result<Vec<Application>, WorkflowError> {
        self.db.call(move |db| db.list_for_role(role)).await
    }
}
