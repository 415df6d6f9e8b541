//! Rename a user id by copying every record filed under it.
//!
//! The old records are left in place; removing them is a separate step.

use futures::TryStreamExt;
use serde::Serialize;

use crate::gateway::{records_for_user, RecordStore};
use crate::routines::StatusResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RenameStatus {
    Completed,
    NotFound,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenameReport {
    pub user_id: String,
    pub new_user_id: String,
    /// Records found under the old id.
    pub found: usize,
    /// Copies written under the new id before finishing or failing.
    pub created: usize,
    pub status: RenameStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RenameReport {
    pub fn into_response(self) -> StatusResponse {
        match self.status {
            RenameStatus::Completed => {
                StatusResponse::with_report(200, "Records updated and created successfully", &self)
            }
            RenameStatus::NotFound => StatusResponse::with_report(404, "No records found", &self),
            RenameStatus::Failed => {
                let message = format!("Error: {}", self.error.as_deref().unwrap_or("unknown"));
                StatusResponse::with_report(500, &message, &self)
            }
        }
    }
}

/// Copy every record of `user_id` under `new_user_id`.
///
/// All records are read before the first write, so the copies never show
/// up in the scan. A failure stops the copy; `created` says how far it got.
pub async fn rename_user_id(records: &dyn RecordStore, user_id: &str, new_user_id: &str) -> RenameReport {
    let mut report = RenameReport {
        user_id: user_id.to_string(),
        new_user_id: new_user_id.to_string(),
        found: 0,
        created: 0,
        status: RenameStatus::Completed,
        error: None,
    };

    let found: Vec<_> = match records_for_user(records, user_id).try_collect().await {
        Ok(found) => found,
        Err(err) => {
            tracing::error!(user_id, error = %err, "failed to query records");
            report.status = RenameStatus::Failed;
            report.error = Some(err.to_string());
            return report;
        }
    };

    report.found = found.len();
    if found.is_empty() {
        tracing::info!(user_id, "no records found");
        report.status = RenameStatus::NotFound;
        return report;
    }

    tracing::info!(user_id, new_user_id, records = found.len(), "copying records");
    for record in &found {
        let copy = record.retarget(new_user_id);
        if let Err(err) = records.put_indexed_record(&copy).await {
            tracing::error!(
                user_id,
                new_user_id,
                face_id = ?record.face_id(),
                created = report.created,
                error = %err,
                "copy failed"
            );
            report.status = RenameStatus::Failed;
            report.error = Some(err.to_string());
            return report;
        }
        report.created += 1;
    }

    tracing::info!(user_id, new_user_id, created = report.created, "rename complete");
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRecordStore;
    use crate::record::{IndexedRecord, ATTR_FACE_ID, ATTR_FOLDER_NAME, ATTR_USER_ID};
    use crate::types::{AttrValue, Document};

    fn record(user: &str, face: &str) -> IndexedRecord {
        let mut doc = Document::new();
        doc.insert(ATTR_USER_ID.into(), AttrValue::S(user.into()));
        doc.insert(ATTR_FACE_ID.into(), AttrValue::S(face.into()));
        doc.insert(ATTR_FOLDER_NAME.into(), AttrValue::S("Wedding_2023".into()));
        doc.insert("Confidence".into(), AttrValue::N("99.1".into()));
        IndexedRecord::new(doc)
    }

    fn body(response: &StatusResponse) -> serde_json::Value {
        serde_json::from_str(&response.body).unwrap()
    }

    #[tokio::test]
    async fn test_copies_every_record() {
        let store = MemoryRecordStore::with_records(vec![
            record("old", "f1"),
            record("old", "f2"),
            record("old", "f3"),
            record("other", "f4"),
        ]);

        let report = rename_user_id(&store, "old", "new").await;
        assert_eq!(report.status, RenameStatus::Completed);
        assert_eq!((report.found, report.created), (3, 3));

        let copies = store.records_of("new");
        assert_eq!(copies.len(), 3);
        for (copy, face) in copies.iter().zip(["f1", "f2", "f3"]) {
            assert_eq!(copy.document(), record("new", face).document());
        }
        // originals untouched
        assert_eq!(store.records_of("old").len(), 3);

        let response = report.into_response();
        assert_eq!(response.status_code, 200);
        assert_eq!(body(&response)["message"], "Records updated and created successfully");
        assert_eq!(body(&response)["created"], 3);
    }

    #[tokio::test]
    async fn test_unknown_user_is_not_found() {
        let store = MemoryRecordStore::with_records(vec![record("someone", "f1")]);
        let report = rename_user_id(&store, "ghost", "new").await;
        assert_eq!(report.status, RenameStatus::NotFound);
        assert_eq!(store.records().len(), 1);
        assert_eq!(report.into_response().status_code, 404);
    }

    #[tokio::test]
    async fn test_write_failure_reports_partial_progress() {
        let store = MemoryRecordStore::with_records(vec![
            record("old", "f1"),
            record("old", "f2"),
            record("old", "f3"),
        ]);
        store.fail_record_writes_after(1);

        let report = rename_user_id(&store, "old", "new").await;
        assert_eq!(report.status, RenameStatus::Failed);
        assert_eq!((report.found, report.created), (3, 1));

        let response = report.into_response();
        assert_eq!(response.status_code, 500);
        assert!(body(&response)["message"].as_str().unwrap().starts_with("Error: "));
    }

    #[tokio::test]
    async fn test_query_failure_is_500() {
        let store = MemoryRecordStore::with_records(vec![record("old", "f1")]);
        store.fail_user("old");
        let report = rename_user_id(&store, "old", "new").await;
        assert_eq!(report.status, RenameStatus::Failed);
        assert_eq!(report.created, 0);
        assert_eq!(report.into_response().status_code, 500);
    }
}
