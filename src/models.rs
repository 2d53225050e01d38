use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::phases::{Phase, Role};

/// A licensing application, the sole entity this service mutates.
///
/// Mutated exclusively through the advance operation: status moves forward
/// one phase at a time, `history` and `documents` are append-only, and
/// `sections` accumulates role-contributed data. Never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: String,
    pub title: String,
    /// Open data bag captured at intake (applicant details, dealer info).
    pub data: serde_json::Value,
    pub status: Phase,
    pub history: Vec<HistoryEntry>,
    pub documents: Vec<DocumentRef>,
    /// Role-scoped data bags, shallow-merged per role on each advance.
    pub sections: BTreeMap<Role, serde_json::Map<String, serde_json::Value>>,
    /// Incremented exactly once per successful advance.
    pub version: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// One transition record. Each entry's `from` equals the previous entry's
/// `to` (or the entry phase for the first record).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub by: String,
    pub role: Role,
    pub from: Phase,
    pub to: Phase,
    #[serde(default)]
    pub comment: String,
    pub at: String,
}

/// Opaque reference to a document held by the external file store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_by: Option<String>,
}

/// The authenticated entity performing an action. Attached by the external
/// auth collaborator at the HTTP boundary and passed by value into the core;
/// the service never reads ambient request state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

/// Body of an advance request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdvancePayload {
    #[serde(default)]
    pub comment: Option<String>,
    /// Shallow-merged into the acting role's section.
    #[serde(default)]
    pub additions: Option<serde_json::Map<String, serde_json::Value>>,
    /// Appended, in order, to the application's document list.
    #[serde(default)]
    pub documents: Option<Vec<DocumentRef>>,
}

/// Body of an intake request.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateApplicationRequest {
    pub title: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub documents: Option<Vec<DocumentRef>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_application_serialization_roundtrip() {
        let app = Application {
            id: "a-1".into(),
            title: "Dealer licence".into(),
            data: serde_json::json!({"dealer": "Acme Arms"}),
            status: Phase::ClubReview,
            history: vec![HistoryEntry {
                by: "u-7".into(),
                role: Role::Moj,
                from: Phase::MojReview,
                to: Phase::ClubReview,
                comment: "ok".into(),
                at: "2026-01-01T00:00:00Z".into(),
            }],
            documents: vec![DocumentRef {
                name: "permit.pdf".into(),
                url: None,
                uploaded_by: Some("u-7".into()),
            }],
            sections: BTreeMap::new(),
            version: 1,
            created_at: "2026-01-01T00:00:00Z".into(),
            updated_at: "2026-01-01T00:00:00Z".into(),
        };

        let json = serde_json::to_string(&app).unwrap();
        let parsed: Application = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.status, Phase::ClubReview);
        assert_eq!(parsed.history.len(), 1);
        assert_eq!(parsed.history[0].from, Phase::MojReview);
        assert_eq!(parsed.version, 1);
    }

    #[test]
    fn test_advance_payload_all_fields_optional() {
        let payload: AdvancePayload = serde_json::from_str("{}").unwrap();
        assert!(payload.comment.is_none());
        assert!(payload.additions.is_none());
        assert!(payload.documents.is_none());
    }

    #[test]
    fn test_advance_payload_parses_additions() {
        let payload: AdvancePayload = serde_json::from_str(
            r#"{"comment": "approved", "additions": {"note": "x"}, "documents": [{"name": "a"}]}"#,
        )
        .unwrap();
        assert_eq!(payload.comment.as_deref(), Some("approved"));
        assert_eq!(
            payload.additions.unwrap().get("note"),
            Some(&serde_json::json!("x"))
        );
        assert_eq!(payload.documents.unwrap()[0].name, "a");
    }

    #[test]
    fn test_history_entry_role_token() {
        let entry = HistoryEntry {
            by: "u-1".into(),
            role: Role::from_str("police").unwrap(),
            from: Phase::PoliceReview,
            to: Phase::ProvinceReview,
            comment: String::new(),
            at: "2026-01-01T00:00:00Z".into(),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["role"], "police");
        assert_eq!(json["from"], "police_review");
    }
}
