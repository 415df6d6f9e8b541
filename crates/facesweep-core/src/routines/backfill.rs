//! Thumbnail backfill: give every listed user a face thumbnail and a summary record.

use futures::TryStreamExt;
use serde::Serialize;
use thiserror::Error;

use crate::crop::{self, CropError, ThumbnailLimits, THUMBNAIL_CONTENT_TYPE};
use crate::eligibility::FaceThresholds;
use crate::gateway::{records_for_user_in_folder, GatewayError, ObjectStore, RecordStore};
use crate::record::{IndexedRecord, RecordError};
use crate::types::{ObjectLocation, UserSummary};

const THUMBNAIL_PREFIX: &str = "thumbnails";

#[derive(Error, Debug)]
enum BackfillError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("unusable record: {0}")]
    Record(#[from] RecordError),
    #[error(transparent)]
    Crop(#[from] CropError),
}

/// What happened for one user.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BackfillOutcome {
    Created { face_url: String },
    /// A summary record already exists; nothing was written.
    AlreadyPresent,
    NoEligibleFace,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserBackfill {
    pub user_id: String,
    #[serde(flatten)]
    pub outcome: BackfillOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BackfillReport {
    pub users: Vec<UserBackfill>,
}

impl BackfillReport {
    pub fn count(&self, pred: impl Fn(&BackfillOutcome) -> bool) -> usize {
        self.users.iter().filter(|u| pred(&u.outcome)).count()
    }

    pub fn created(&self) -> usize {
        self.count(|o| matches!(o, BackfillOutcome::Created { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, BackfillOutcome::Failed { .. }))
    }

    pub fn outcome(&self, user_id: &str) -> Option<&BackfillOutcome> {
        self.users.iter().find(|u| u.user_id == user_id).map(|u| &u.outcome)
    }
}

/// Picks the first eligible face of each user within one folder, crops it,
/// stores the thumbnail and records the summary.
pub struct ThumbnailBackfill<'a> {
    records: &'a dyn RecordStore,
    objects: &'a dyn ObjectStore,
    folder: &'a str,
    thumbnail_bucket: &'a str,
    thresholds: FaceThresholds,
    limits: ThumbnailLimits,
}

impl<'a> ThumbnailBackfill<'a> {
    pub fn new(
        records: &'a dyn RecordStore,
        objects: &'a dyn ObjectStore,
        folder: &'a str,
        thumbnail_bucket: &'a str,
    ) -> Self {
        Self {
            records,
            objects,
            folder,
            thumbnail_bucket,
            thresholds: FaceThresholds::default(),
            limits: ThumbnailLimits::default(),
        }
    }

    pub fn with_thresholds(mut self, thresholds: FaceThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_limits(mut self, limits: ThumbnailLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Process every user in order. Never fails as a whole.
    pub async fn run(&self, user_ids: &[String]) -> BackfillReport {
        let mut report = BackfillReport::default();

        for user_id in user_ids {
            tracing::info!(user_id = %user_id, folder = self.folder, "processing user");

            let outcome = match self.process_user(user_id).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::warn!(user_id = %user_id, error = %err, "backfill failed for user");
                    BackfillOutcome::Failed {
                        reason: err.to_string(),
                    }
                }
            };

            match &outcome {
                BackfillOutcome::Created { face_url } => {
                    tracing::info!(user_id = %user_id, face_url = %face_url, "stored user summary")
                }
                BackfillOutcome::AlreadyPresent => {
                    tracing::info!(user_id = %user_id, "summary already present, skipping")
                }
                BackfillOutcome::NoEligibleFace => {
                    tracing::info!(user_id = %user_id, "no eligible face found")
                }
                BackfillOutcome::Failed { .. } => {}
            }

            report.users.push(UserBackfill {
                user_id: user_id.clone(),
                outcome,
            });
        }

        tracing::info!(
            users = report.users.len(),
            created = report.created(),
            failed = report.failed(),
            "backfill complete"
        );
        report
    }

    async fn process_user(&self, user_id: &str) -> Result<BackfillOutcome, BackfillError> {
        if self.records.get_user_summary(user_id).await?.is_some() {
            return Ok(BackfillOutcome::AlreadyPresent);
        }

        let Some(record) = self.first_eligible(user_id).await? else {
            return Ok(BackfillOutcome::NoEligibleFace);
        };

        let face_url = self.store_thumbnail(user_id, &record).await?;
        self.records
            .put_user_summary(&UserSummary::now(user_id, face_url.clone()))
            .await?;

        Ok(BackfillOutcome::Created { face_url })
    }

    /// Scan the user's records in query order and stop at the first eligible one.
    async fn first_eligible(&self, user_id: &str) -> Result<Option<IndexedRecord>, GatewayError> {
        let mut candidates = records_for_user_in_folder(self.records, user_id, self.folder);
        while let Some(record) = candidates.try_next().await? {
            if self.thresholds.is_eligible(&record) {
                tracing::info!(user_id, face_id = ?record.face_id(), "found eligible face");
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    async fn store_thumbnail(&self, user_id: &str, record: &IndexedRecord) -> Result<String, BackfillError> {
        let source = record.image_location()?;
        let bbox = record.bounding_box()?;

        tracing::info!(user_id, source = %source, "fetching source image");
        let image = self.objects.get_object(&source).await?;
        let thumbnail = crop::crop_face_with(&image, &bbox, &self.limits)?;

        let target = ObjectLocation::new(self.thumbnail_bucket, format!("{THUMBNAIL_PREFIX}/{user_id}.jpg"));
        tracing::debug!(user_id, target = %target, bytes = thumbnail.len(), "uploading thumbnail");
        self.objects
            .put_object(&target, thumbnail, THUMBNAIL_CONTENT_TYPE)
            .await?;

        Ok(self.objects.object_url(&target))
    }
}
