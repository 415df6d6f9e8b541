//! Batch maintenance routines and their shared payload/status plumbing.
//!
//! Each routine walks its user list sequentially. Failures are recorded
//! per user and never abort the batch.

pub mod backfill;
pub mod purge;
pub mod rename;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::gateway::{FaceCollection, ObjectStore, RecordStore};
use crate::settings::Settings;

pub use backfill::{BackfillOutcome, BackfillReport, ThumbnailBackfill};
pub use purge::{FaceSource, PurgeMode, PurgeReport, UserPurge, UserPurgeReport};
pub use rename::{rename_user_id, RenameReport, RenameStatus};

/// The maintenance operations a deployment can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routine {
    BackfillThumbnails,
    RenameUserId,
    PurgeCollectionUsers,
    PurgeIndexedUsers,
    PurgeFolderFaces,
}

impl Routine {
    pub const ALL: [Routine; 5] = [
        Routine::BackfillThumbnails,
        Routine::RenameUserId,
        Routine::PurgeCollectionUsers,
        Routine::PurgeIndexedUsers,
        Routine::PurgeFolderFaces,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Routine::BackfillThumbnails => "backfill-thumbnails",
            Routine::RenameUserId => "rename-user-id",
            Routine::PurgeCollectionUsers => "purge-collection-users",
            Routine::PurgeIndexedUsers => "purge-indexed-users",
            Routine::PurgeFolderFaces => "purge-folder-faces",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Routine::BackfillThumbnails => "crop a face thumbnail and write a summary record per user",
            Routine::RenameUserId => "copy every indexed record of one user id under a new id",
            Routine::PurgeCollectionUsers => {
                "disassociate the user's collection faces, then delete the user"
            }
            Routine::PurgeIndexedUsers => "disassociate the user's indexed faces, then delete the user",
            Routine::PurgeFolderFaces => "disassociate and delete the user's faces from one folder",
        }
    }
}

impl fmt::Display for Routine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Error, Debug)]
#[error("unknown routine `{0}`")]
pub struct UnknownRoutine(pub String);

impl FromStr for Routine {
    type Err = UnknownRoutine;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Routine::ALL
            .into_iter()
            .find(|r| r.name() == s)
            .ok_or_else(|| UnknownRoutine(s.to_string()))
    }
}

#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("invalid payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no folder_name in payload and no default folder configured")]
    MissingFolder,
    #[error("{0}")]
    Invalid(String),
}

/// `{"user_ids": [...]}`, optionally with a folder label.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct UserBatch {
    #[serde(default)]
    pub user_ids: Vec<String>,
    #[serde(default)]
    pub folder_name: Option<String>,
}

impl UserBatch {
    /// Payload folder, else the configured default.
    pub fn folder<'a>(&'a self, settings: &'a Settings) -> Result<&'a str, PayloadError> {
        let non_empty = |f: &&str| !f.is_empty();
        self.folder_name
            .as_deref()
            .filter(non_empty)
            .or_else(|| settings.default_folder.as_deref().filter(non_empty))
            .ok_or(PayloadError::MissingFolder)
    }
}

/// `{"user_id": "...", "new_user_id": "..."}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RenameRequest {
    pub user_id: String,
    pub new_user_id: String,
}

impl RenameRequest {
    pub fn validate(&self) -> Result<(), PayloadError> {
        if self.user_id.is_empty() || self.new_user_id.is_empty() {
            return Err(PayloadError::Invalid("user_id and new_user_id must be non-empty".into()));
        }
        if self.user_id == self.new_user_id {
            return Err(PayloadError::Invalid("user_id and new_user_id are identical".into()));
        }
        Ok(())
    }
}

/// Invocation result: an HTTP-style code and a JSON body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: String,
}

impl StatusResponse {
    /// `report`'s fields with a `message` field added.
    pub fn with_report<T: Serialize>(status_code: u16, message: &str, report: &T) -> Self {
        let mut body = match serde_json::to_value(report) {
            Ok(serde_json::Value::Object(map)) => map,
            Ok(other) => {
                let mut map = serde_json::Map::new();
                map.insert("report".into(), other);
                map
            }
            Err(err) => {
                let mut map = serde_json::Map::new();
                map.insert("report_error".into(), err.to_string().into());
                map
            }
        };
        body.insert("message".into(), message.into());
        Self {
            status_code,
            body: serde_json::Value::Object(body).to_string(),
        }
    }

    pub fn message(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code,
            body: serde_json::json!({ "message": message.into() }).to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

impl From<PayloadError> for StatusResponse {
    fn from(err: PayloadError) -> Self {
        StatusResponse::message(400, err.to_string())
    }
}

/// The external services, built once per process and shared by every routine.
#[derive(Clone)]
pub struct Gateways {
    pub records: Arc<dyn RecordStore>,
    pub collection: Arc<dyn FaceCollection>,
    pub objects: Arc<dyn ObjectStore>,
}

/// Parse `payload` for `routine` and run it to completion.
pub async fn run(
    routine: Routine,
    payload: serde_json::Value,
    gateways: &Gateways,
    settings: &Settings,
) -> StatusResponse {
    tracing::info!(%routine, "routine starting");
    let response = match dispatch(routine, payload, gateways, settings).await {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(%routine, error = %err, "rejected payload");
            err.into()
        }
    };
    tracing::info!(%routine, status = response.status_code, "routine finished");
    response
}

async fn dispatch(
    routine: Routine,
    payload: serde_json::Value,
    gateways: &Gateways,
    settings: &Settings,
) -> Result<StatusResponse, PayloadError> {
    match routine {
        Routine::BackfillThumbnails => {
            let batch: UserBatch = serde_json::from_value(payload)?;
            let folder = batch.folder(settings)?;
            let backfill = ThumbnailBackfill::new(
                gateways.records.as_ref(),
                gateways.objects.as_ref(),
                folder,
                &settings.thumbnail_bucket,
            );
            let report = backfill.run(&batch.user_ids).await;
            Ok(StatusResponse::with_report(200, "Processing completed successfully.", &report))
        }
        Routine::RenameUserId => {
            let request: RenameRequest = serde_json::from_value(payload)?;
            request.validate()?;
            let report =
                rename_user_id(gateways.records.as_ref(), &request.user_id, &request.new_user_id).await;
            Ok(report.into_response())
        }
        Routine::PurgeCollectionUsers => {
            let batch: UserBatch = serde_json::from_value(payload)?;
            let purge = UserPurge::new(
                gateways.records.as_ref(),
                gateways.collection.as_ref(),
                FaceSource::Collection,
                PurgeMode::DeleteUser,
            );
            let report = purge.run(&batch.user_ids).await;
            Ok(StatusResponse::with_report(200, "Disassociated faces and deleted users", &report))
        }
        Routine::PurgeIndexedUsers => {
            let batch: UserBatch = serde_json::from_value(payload)?;
            let purge = UserPurge::new(
                gateways.records.as_ref(),
                gateways.collection.as_ref(),
                FaceSource::IndexedRecords { folder: None },
                PurgeMode::DeleteUser,
            );
            let report = purge.run(&batch.user_ids).await;
            Ok(StatusResponse::with_report(200, "Disassociated faces and deleted users", &report))
        }
        Routine::PurgeFolderFaces => {
            let batch: UserBatch = serde_json::from_value(payload)?;
            let folder = batch.folder(settings)?.to_string();
            let purge = UserPurge::new(
                gateways.records.as_ref(),
                gateways.collection.as_ref(),
                FaceSource::IndexedRecords { folder: Some(folder) },
                PurgeMode::DeleteFaces,
            );
            let report = purge.run(&batch.user_ids).await;
            Ok(StatusResponse::with_report(200, "Deleted face IDs successfully", &report))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryCollection, MemoryObjectStore, MemoryRecordStore};
    use serde_json::json;

    fn gateways() -> (Gateways, Arc<MemoryCollection>) {
        let collection = Arc::new(MemoryCollection::with_faces(&[
            ("f1", Some("u1")),
            ("f2", Some("u1")),
            ("f3", Some("u2")),
        ]));
        let gateways = Gateways {
            records: Arc::new(MemoryRecordStore::default()),
            collection: collection.clone(),
            objects: Arc::new(MemoryObjectStore::default()),
        };
        (gateways, collection)
    }

    fn body(response: &StatusResponse) -> serde_json::Value {
        serde_json::from_str(&response.body).unwrap()
    }

    #[test]
    fn test_routine_names_round_trip() {
        for routine in Routine::ALL {
            assert_eq!(routine.name().parse::<Routine>().unwrap(), routine);
        }
        assert!("delete-everything".parse::<Routine>().is_err());
    }

    #[test]
    fn test_user_batch_defaults_to_empty() {
        let batch: UserBatch = serde_json::from_value(json!({})).unwrap();
        assert!(batch.user_ids.is_empty());
        let batch: UserBatch =
            serde_json::from_value(json!({"user_ids": ["a", "b"], "extra": 1})).unwrap();
        assert_eq!(batch.user_ids, vec!["a", "b"]);
    }

    #[test]
    fn test_folder_resolution() {
        let mut settings = Settings::default();
        let batch = UserBatch::default();
        assert!(matches!(batch.folder(&settings), Err(PayloadError::MissingFolder)));

        settings.default_folder = Some("Default_Folder".into());
        assert_eq!(batch.folder(&settings).unwrap(), "Default_Folder");

        let batch = UserBatch { folder_name: Some("Payload_Folder".into()), ..Default::default() };
        assert_eq!(batch.folder(&settings).unwrap(), "Payload_Folder");

        // a blank payload folder falls back to the default
        let batch = UserBatch { folder_name: Some(String::new()), ..Default::default() };
        assert_eq!(batch.folder(&settings).unwrap(), "Default_Folder");

        settings.default_folder = Some(String::new());
        assert!(matches!(batch.folder(&settings), Err(PayloadError::MissingFolder)));
    }

    #[test]
    fn test_rename_request_validation() {
        let same = RenameRequest { user_id: "a".into(), new_user_id: "a".into() };
        assert!(same.validate().is_err());
        let empty = RenameRequest { user_id: "".into(), new_user_id: "b".into() };
        assert!(empty.validate().is_err());
        let ok = RenameRequest { user_id: "a".into(), new_user_id: "b".into() };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_status_response_wire_shape() {
        let response = StatusResponse::message(404, "No records found");
        let wire = serde_json::to_value(&response).unwrap();
        assert_eq!(wire["statusCode"], 404);
        assert_eq!(body(&response)["message"], "No records found");
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn test_run_rejects_bad_payload() {
        let (gateways, _) = gateways();
        let settings = Settings::default();
        let response = run(Routine::RenameUserId, json!({"user_id": "a"}), &gateways, &settings).await;
        assert_eq!(response.status_code, 400);

        let response = run(Routine::BackfillThumbnails, json!({"user_ids": ["u1"]}), &gateways, &settings).await;
        assert_eq!(response.status_code, 400);
        assert!(body(&response)["message"].as_str().unwrap().contains("folder_name"));
    }

    #[tokio::test]
    async fn test_run_rename_not_found() {
        let (gateways, _) = gateways();
        let response = run(
            Routine::RenameUserId,
            json!({"user_id": "ghost", "new_user_id": "someone"}),
            &gateways,
            &Settings::default(),
        )
        .await;
        assert_eq!(response.status_code, 404);
        assert_eq!(body(&response)["message"], "No records found");
    }

    #[tokio::test]
    async fn test_run_purge_collection_users() {
        let (gateways, collection) = gateways();
        let response = run(
            Routine::PurgeCollectionUsers,
            json!({"user_ids": ["u1"]}),
            &gateways,
            &Settings::default(),
        )
        .await;
        assert_eq!(response.status_code, 200);
        assert!(!collection.has_user("u1"));
        assert!(collection.has_user("u2"));
        let body = body(&response);
        assert_eq!(body["users"][0]["faces_disassociated"], 2);
        assert_eq!(body["users"][0]["user_deleted"], true);
    }
}
