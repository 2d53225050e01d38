use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use rusqlite::{Connection, params};
use uuid::Uuid;

use crate::errors::{BadStateReason, WorkflowError};
use crate::models::{Actor, AdvancePayload, Application, DocumentRef, HistoryEntry};
use crate::phases::{Phase, Role, next_status};

type Result<T> = std::result::Result<T, WorkflowError>;

/// Async-safe handle to the application store.
///
/// Wraps `WorkflowDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, preventing synchronous SQLite
/// I/O from tying up async worker threads. The mutex is also the
/// single-writer lock: advances on the same application serialize, and the
/// loser of a race observes the already-updated status on its own fresh
/// read.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<WorkflowDb>>,
}

impl DbHandle {
    pub fn new(db: WorkflowDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the store on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&WorkflowDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|e| WorkflowError::Storage(anyhow::anyhow!("DB lock poisoned: {}", e)))?;
            f(&guard)
        })
        .await
        .map_err(|e| WorkflowError::Storage(anyhow::anyhow!("DB task panicked: {}", e)))?
    }
}

pub struct WorkflowDb {
    conn: Connection,
}

impl WorkflowDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(anyhow::Error::new)
            .context("Failed to open SQLite database")
            .map_err(WorkflowError::Storage)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(anyhow::Error::new)
            .context("Failed to open in-memory SQLite database")
            .map_err(WorkflowError::Storage)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS applications (
                    id TEXT PRIMARY KEY,
                    title TEXT NOT NULL,
                    data TEXT NOT NULL DEFAULT '{}',
                    status TEXT NOT NULL,
                    history TEXT NOT NULL DEFAULT '[]',
                    documents TEXT NOT NULL DEFAULT '[]',
                    sections TEXT NOT NULL DEFAULT '{}',
                    version INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_applications_status
                    ON applications(status, updated_at);
                ",
            )
            .map_err(anyhow::Error::new)
            .context("Failed to run migrations")
            .map_err(WorkflowError::Storage)?;
        Ok(())
    }

    // ── Intake ────────────────────────────────────────────────────────

    /// Create a new application at the entry phase with version 0 and an
    /// empty history.
    pub fn create_application(
        &self,
        title: &str,
        data: serde_json::Value,
        documents: Vec<DocumentRef>,
    ) -> Result<Application> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let status = Phase::entry();

        self.conn
            .execute(
                "INSERT INTO applications (id, title, data, status, history, documents, sections, version, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, '[]', ?5, '{}', 0, ?6, ?6)",
                params![
                    id,
                    title,
                    data.to_string(),
                    status.as_str(),
                    serde_json::to_string(&documents)
                        .map_err(anyhow::Error::new)
                        .map_err(WorkflowError::Storage)?,
                    now,
                ],
            )
            .map_err(WorkflowError::from)?;

        Ok(Application {
            id,
            title: title.to_string(),
            data,
            status,
            history: Vec::new(),
            documents,
            sections: BTreeMap::new(),
            version: 0,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    // ── Reads ─────────────────────────────────────────────────────────

    pub fn get_application(&self, id: &str) -> Result<Option<Application>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, data, status, history, documents, sections, version, created_at, updated_at
             FROM applications WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(params![id], ApplicationRow::from_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?.into_application()?)),
            None => Ok(None),
        }
    }

    /// Applications currently sitting at the given role's phase, newest
    /// updated first.
    pub fn list_for_role(&self, role: Role) -> Result<Vec<Application>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, data, status, history, documents, sections, version, created_at, updated_at
             FROM applications WHERE status = ?1 ORDER BY updated_at DESC, id",
        )?;
        let rows = stmt.query_map(params![role.phase().as_str()], ApplicationRow::from_row)?;
        let mut applications = Vec::new();
        for row in rows {
            applications.push(row?.into_application()?);
        }
        Ok(applications)
    }

    // ── The transactional advance ─────────────────────────────────────

    /// Execute a single phase transition atomically.
    ///
    /// The application is re-read inside the transaction (never a caller's
    /// pre-fetched snapshot), every validation runs before any mutation,
    /// and a failure at any point rolls the whole transaction back — no
    /// partial section merges or history appends ever persist.
    pub fn advance_application(
        &self,
        id: &str,
        actor: &Actor,
        payload: &AdvancePayload,
    ) -> Result<Application> {
        // Safety: DbHandle's mutex already guarantees single-threaded access.
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(WorkflowError::from)?;

        let row = {
            let mut stmt = tx.prepare(
                "SELECT id, title, data, status, history, documents, sections, version, created_at, updated_at
                 FROM applications WHERE id = ?1",
            )?;
            let mut rows = stmt.query_map(params![id], ApplicationRow::from_row)?;
            match rows.next() {
                Some(row) => row?,
                None => return Err(WorkflowError::NotFound { id: id.to_string() }),
            }
        };
        let mut application = row.into_application()?;
        let current = application.status;

        let required = actor.role.phase();
        if required != current {
            return Err(WorkflowError::wrong_stage(current, required));
        }
        // The wrong-stage check above passed, so next_status is None only
        // at the terminal phase.
        let next = match next_status(Some(current), actor.role) {
            Some(next) => next,
            None => return Err(WorkflowError::BadState(BadStateReason::AlreadyFinal)),
        };

        // Shallow merge into the acting role's section only; other roles'
        // sections are never touched.
        if let Some(additions) = &payload.additions {
            let section = application.sections.entry(actor.role).or_default();
            for (key, value) in additions {
                section.insert(key.clone(), value.clone());
            }
        }

        if let Some(documents) = &payload.documents {
            application.documents.extend(documents.iter().cloned());
        }

        let now = Utc::now().to_rfc3339();
        application.history.push(HistoryEntry {
            by: actor.id.clone(),
            role: actor.role,
            from: current,
            to: next,
            comment: payload.comment.clone().unwrap_or_default(),
            at: now.clone(),
        });
        application.status = next;
        application.version += 1;
        application.updated_at = now;

        tx.execute(
            "UPDATE applications
             SET status = ?1, history = ?2, documents = ?3, sections = ?4, version = ?5, updated_at = ?6
             WHERE id = ?7",
            params![
                application.status.as_str(),
                json_column(&application.history)?,
                json_column(&application.documents)?,
                json_column(&application.sections)?,
                application.version,
                application.updated_at,
                application.id,
            ],
        )?;
        tx.commit().map_err(WorkflowError::from)?;

        Ok(application)
    }
}

fn json_column<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(anyhow::Error::new)
        .map_err(WorkflowError::Storage)
}

// ── Internal row helpers ──────────────────────────────────────────────

/// Intermediate row struct for reading applications from SQLite before
/// converting the status token and JSON columns into typed values.
struct ApplicationRow {
    id: String,
    title: String,
    data: String,
    status: String,
    history: String,
    documents: String,
    sections: String,
    version: i64,
    created_at: String,
    updated_at: String,
}

impl ApplicationRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            data: row.get(2)?,
            status: row.get(3)?,
            history: row.get(4)?,
            documents: row.get(5)?,
            sections: row.get(6)?,
            version: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn into_application(self) -> Result<Application> {
        // A status token outside the phase table is data corruption, never
        // silently reset to the entry phase.
        let status = Phase::from_str(&self.status)
            .map_err(|_| WorkflowError::BadState(BadStateReason::UnknownStatus(self.status.clone())))?;
        let data: serde_json::Value = serde_json::from_str(&self.data)
            .map_err(|e| WorkflowError::Storage(anyhow::anyhow!("corrupt data JSON: {}", e)))?;
        let history: Vec<HistoryEntry> = serde_json::from_str(&self.history)
            .map_err(|e| WorkflowError::Storage(anyhow::anyhow!("corrupt history JSON: {}", e)))?;
        let documents: Vec<DocumentRef> = serde_json::from_str(&self.documents)
            .map_err(|e| WorkflowError::Storage(anyhow::anyhow!("corrupt documents JSON: {}", e)))?;
        let sections: BTreeMap<Role, serde_json::Map<String, serde_json::Value>> =
            serde_json::from_str(&self.sections)
                .map_err(|e| WorkflowError::Storage(anyhow::anyhow!("corrupt sections JSON: {}", e)))?;

        Ok(Application {
            id: self.id,
            title: self.title,
            data,
            status,
            history,
            documents,
            sections,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ForbiddenReason;

    fn actor(role: Role) -> Actor {
        Actor {
            id: format!("{}-officer", role),
            role,
        }
    }

    fn seed(db: &WorkflowDb) -> Application {
        db.create_application(
            "Dealer licence for Acme Arms",
            serde_json::json!({"dealer": "Acme Arms", "region": "north"}),
            vec![],
        )
        .unwrap()
    }

    #[test]
    fn test_create_application_defaults() {
        let db = WorkflowDb::new_in_memory().unwrap();
        let app = seed(&db);

        assert_eq!(app.status, Phase::entry());
        assert_eq!(app.version, 0);
        assert!(app.history.is_empty());
        assert!(app.documents.is_empty());
        assert!(app.sections.is_empty());

        let fetched = db.get_application(&app.id).unwrap().expect("stored");
        assert_eq!(fetched.title, "Dealer licence for Acme Arms");
        assert_eq!(fetched.status, Phase::MojReview);
        assert_eq!(fetched.data["dealer"], "Acme Arms");
    }

    #[test]
    fn test_get_application_missing_is_none() {
        let db = WorkflowDb::new_in_memory().unwrap();
        assert!(db.get_application("nope").unwrap().is_none());
    }

    #[test]
    fn test_advance_moves_one_phase_and_bumps_version() {
        let db = WorkflowDb::new_in_memory().unwrap();
        let app = seed(&db);

        let updated = db
            .advance_application(
                &app.id,
                &actor(Role::Moj),
                &AdvancePayload {
                    comment: Some("ok".into()),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(updated.status, Phase::ClubReview);
        assert_eq!(updated.version, 1);
        assert_eq!(updated.history.len(), 1);
        assert_eq!(updated.history[0].from, Phase::MojReview);
        assert_eq!(updated.history[0].to, Phase::ClubReview);
        assert_eq!(updated.history[0].comment, "ok");
        assert_eq!(updated.history[0].by, "moj-officer");
    }

    #[test]
    fn test_advance_unknown_application_is_not_found() {
        let db = WorkflowDb::new_in_memory().unwrap();
        let err = db
            .advance_application("missing", &actor(Role::Moj), &AdvancePayload::default())
            .unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound { .. }));
    }

    #[test]
    fn test_advance_wrong_role_is_forbidden_and_leaves_no_trace() {
        let db = WorkflowDb::new_in_memory().unwrap();
        let app = seed(&db);

        let err = db
            .advance_application(
                &app.id,
                &actor(Role::Police),
                &AdvancePayload {
                    additions: Some(
                        serde_json::json!({"sneaky": true}).as_object().unwrap().clone(),
                    ),
                    ..Default::default()
                },
            )
            .unwrap_err();

        match err {
            WorkflowError::Forbidden(ForbiddenReason::WrongStage { current, required }) => {
                assert_eq!(current, Phase::MojReview);
                assert_eq!(required, Phase::PoliceReview);
            }
            other => panic!("Expected WrongStage, got {:?}", other),
        }

        // No partial writes survive the aborted transaction.
        let fetched = db.get_application(&app.id).unwrap().unwrap();
        assert_eq!(fetched.status, Phase::MojReview);
        assert_eq!(fetched.version, 0);
        assert!(fetched.history.is_empty());
        assert!(fetched.sections.is_empty());
    }

    #[test]
    fn test_full_chain_reaches_terminal_then_locks() {
        let db = WorkflowDb::new_in_memory().unwrap();
        let app = seed(&db);

        // Everyone except the operator advances; the chain ends at the
        // operator's phase.
        for role in [
            Role::Moj,
            Role::Club,
            Role::Police,
            Role::Province,
            Role::Intelligence,
            Role::Cfr,
        ] {
            db.advance_application(&app.id, &actor(role), &AdvancePayload::default())
                .unwrap();
        }

        let final_app = db.get_application(&app.id).unwrap().unwrap();
        assert_eq!(final_app.status, Phase::OperatorReview);
        assert_eq!(final_app.version, 6);
        assert_eq!(final_app.history.len(), 6);

        // History links: each entry's `from` equals the prior entry's `to`.
        for pair in final_app.history.windows(2) {
            assert_eq!(pair[0].to, pair[1].from);
        }
        assert_eq!(final_app.history[0].from, Phase::entry());

        // Terminal lock: every actor is now rejected.
        for role in Role::ALL {
            let err = db
                .advance_application(&app.id, &actor(role), &AdvancePayload::default())
                .unwrap_err();
            if role == Role::Operator {
                assert!(matches!(
                    err,
                    WorkflowError::BadState(BadStateReason::AlreadyFinal)
                ));
            } else {
                assert!(matches!(err, WorkflowError::Forbidden(_)));
            }
        }
    }

    #[test]
    fn test_sections_merge_is_scoped_per_role() {
        let db = WorkflowDb::new_in_memory().unwrap();
        let app = seed(&db);

        db.advance_application(
            &app.id,
            &actor(Role::Moj),
            &AdvancePayload {
                additions: Some(
                    serde_json::json!({"note": "x", "grade": "A"})
                        .as_object()
                        .unwrap()
                        .clone(),
                ),
                ..Default::default()
            },
        )
        .unwrap();

        let updated = db
            .advance_application(
                &app.id,
                &actor(Role::Club),
                &AdvancePayload {
                    additions: Some(
                        serde_json::json!({"membership": "verified"})
                            .as_object()
                            .unwrap()
                            .clone(),
                    ),
                    ..Default::default()
                },
            )
            .unwrap();

        let moj = updated.sections.get(&Role::Moj).expect("moj section");
        assert_eq!(moj.get("note"), Some(&serde_json::json!("x")));
        assert_eq!(moj.get("grade"), Some(&serde_json::json!("A")));
        let club = updated.sections.get(&Role::Club).expect("club section");
        assert_eq!(club.get("membership"), Some(&serde_json::json!("verified")));
        // Club's merge never touched the MOJ section.
        assert_eq!(moj.len(), 2);
    }

    #[test]
    fn test_documents_append_in_order() {
        let db = WorkflowDb::new_in_memory().unwrap();
        let app = seed(&db);

        db.advance_application(
            &app.id,
            &actor(Role::Moj),
            &AdvancePayload {
                documents: Some(vec![DocumentRef {
                    name: "a".into(),
                    url: None,
                    uploaded_by: None,
                }]),
                ..Default::default()
            },
        )
        .unwrap();
        let updated = db
            .advance_application(
                &app.id,
                &actor(Role::Club),
                &AdvancePayload {
                    documents: Some(vec![DocumentRef {
                        name: "b".into(),
                        url: None,
                        uploaded_by: None,
                    }]),
                    ..Default::default()
                },
            )
            .unwrap();

        let names: Vec<&str> = updated.documents.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_corrupt_status_is_bad_state() {
        let db = WorkflowDb::new_in_memory().unwrap();
        let app = seed(&db);
        db.conn
            .execute(
                "UPDATE applications SET status = 'granted' WHERE id = ?1",
                params![app.id],
            )
            .unwrap();

        let err = db
            .advance_application(&app.id, &actor(Role::Moj), &AdvancePayload::default())
            .unwrap_err();
        match err {
            WorkflowError::BadState(BadStateReason::UnknownStatus(s)) => assert_eq!(s, "granted"),
            other => panic!("Expected UnknownStatus, got {:?}", other),
        }
    }

    #[test]
    fn test_list_for_role_filters_by_phase_newest_first() {
        let db = WorkflowDb::new_in_memory().unwrap();
        let a = seed(&db);
        let b = db
            .create_application("Second application", serde_json::json!({}), vec![])
            .unwrap();

        // Move `a` to the club's desk; `b` stays with MOJ.
        db.advance_application(&a.id, &actor(Role::Moj), &AdvancePayload::default())
            .unwrap();

        let moj_desk = db.list_for_role(Role::Moj).unwrap();
        assert_eq!(moj_desk.len(), 1);
        assert_eq!(moj_desk[0].id, b.id);

        let club_desk = db.list_for_role(Role::Club).unwrap();
        assert_eq!(club_desk.len(), 1);
        assert_eq!(club_desk[0].id, a.id);

        assert!(db.list_for_role(Role::Police).unwrap().is_empty());
    }
}
