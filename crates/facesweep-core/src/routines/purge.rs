//! Disassociate a user's faces from the collection, then delete the user
//! entity or the faces themselves.

use futures::TryStreamExt;
use serde::Serialize;
use std::collections::HashSet;

use crate::gateway::{all_faces, records_for_user, FaceCollection, GatewayError, RecordStore};

/// Where a user's face ids come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaceSource {
    /// Scan the whole collection for faces associated with the user.
    Collection,
    /// Read `face_id` from the user's indexed records, optionally only
    /// those filed under one folder.
    IndexedRecords { folder: Option<String> },
}

/// What happens once the faces are disassociated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeMode {
    DeleteUser,
    DeleteFaces,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UserPurgeReport {
    pub user_id: String,
    pub faces_found: usize,
    pub faces_disassociated: usize,
    pub faces_deleted: usize,
    pub user_deleted: bool,
    /// First error hit for this user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UserPurgeReport {
    fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            ..Default::default()
        }
    }

    fn record_error(&mut self, err: &GatewayError) {
        if self.error.is_none() {
            self.error = Some(err.to_string());
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PurgeReport {
    pub users: Vec<UserPurgeReport>,
}

impl PurgeReport {
    pub fn user(&self, user_id: &str) -> Option<&UserPurgeReport> {
        self.users.iter().find(|u| u.user_id == user_id)
    }

    pub fn failed(&self) -> usize {
        self.users.iter().filter(|u| u.is_failed()).count()
    }
}

pub struct UserPurge<'a> {
    records: &'a dyn RecordStore,
    collection: &'a dyn FaceCollection,
    source: FaceSource,
    mode: PurgeMode,
}

impl<'a> UserPurge<'a> {
    pub fn new(
        records: &'a dyn RecordStore,
        collection: &'a dyn FaceCollection,
        source: FaceSource,
        mode: PurgeMode,
    ) -> Self {
        Self {
            records,
            collection,
            source,
            mode,
        }
    }

    pub async fn run(&self, user_ids: &[String]) -> PurgeReport {
        let mut report = PurgeReport::default();
        for user_id in user_ids {
            report.users.push(self.purge_user(user_id).await);
        }
        tracing::info!(
            users = report.users.len(),
            failed = report.failed(),
            mode = ?self.mode,
            "purge complete"
        );
        report
    }

    async fn purge_user(&self, user_id: &str) -> UserPurgeReport {
        let mut report = UserPurgeReport::new(user_id);

        let face_ids = match self.face_ids(user_id).await {
            Ok(ids) => ids,
            Err(err) => {
                tracing::error!(user_id, error = %err, "failed to list faces, skipping user");
                report.record_error(&err);
                return report;
            }
        };
        report.faces_found = face_ids.len();
        tracing::info!(user_id, faces = face_ids.len(), source = ?self.source, "faces to disassociate");

        for face_id in &face_ids {
            match self.collection.disassociate_face(user_id, face_id).await {
                Ok(()) => {
                    tracing::debug!(user_id, face_id = %face_id, "disassociated face");
                    report.faces_disassociated += 1;
                }
                Err(err) => {
                    tracing::error!(user_id, face_id = %face_id, error = %err, "disassociation failed");
                    report.record_error(&err);
                    break;
                }
            }
        }

        match self.mode {
            PurgeMode::DeleteUser => match self.collection.delete_user(user_id).await {
                Ok(()) => {
                    tracing::info!(user_id, "deleted user");
                    report.user_deleted = true;
                }
                Err(err) => {
                    tracing::error!(user_id, error = %err, "failed to delete user");
                    report.record_error(&err);
                }
            },
            PurgeMode::DeleteFaces if face_ids.is_empty() => {
                tracing::info!(user_id, "no faces to delete");
            }
            PurgeMode::DeleteFaces => match self.collection.delete_faces(&face_ids).await {
                Ok(deleted) => {
                    tracing::info!(user_id, deleted = deleted.len(), "deleted faces");
                    report.faces_deleted = deleted.len();
                }
                Err(err) => {
                    tracing::error!(user_id, error = %err, "failed to delete faces");
                    report.record_error(&err);
                }
            },
        }

        report
    }

    /// The user's face ids, de-duplicated in first-seen order.
    async fn face_ids(&self, user_id: &str) -> Result<Vec<String>, GatewayError> {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        let mut keep = |id: &str| {
            if seen.insert(id.to_string()) {
                ids.push(id.to_string());
            }
        };

        match &self.source {
            FaceSource::Collection => {
                let mut faces = all_faces(self.collection);
                while let Some(face) = faces.try_next().await? {
                    if face.user_id.as_deref() == Some(user_id) {
                        keep(&face.face_id);
                    }
                }
            }
            FaceSource::IndexedRecords { folder } => {
                let mut records = records_for_user(self.records, user_id);
                while let Some(record) = records.try_next().await? {
                    if folder.is_some() && record.folder_name() != folder.as_deref() {
                        continue;
                    }
                    match record.face_id() {
                        Some(face_id) => keep(face_id),
                        None => tracing::warn!(user_id, "indexed record without face_id"),
                    }
                }
            }
        }

        Ok(ids)
    }
}
