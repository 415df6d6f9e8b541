//! Thumbnail eligibility: is this detected face good enough to represent a user?
//!
//! A face qualifies only when it is unoccluded, eyes open, confidently
//! detected, bright and sharp enough, and close to frontal.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::{
    IndexedRecord, RecordError, ATTR_CONFIDENCE, ATTR_EYES_OPEN, ATTR_EYES_OPEN_CONFIDENCE,
    ATTR_OCCLUDED, ATTR_POSE, ATTR_QUALITY,
};

// --- Default thresholds (percent scale for confidences, degrees for pose) ---
const MIN_CONFIDENCE: f64 = 98.0;
const MIN_EYES_OPEN_CONFIDENCE: f64 = 95.0;
const MIN_BRIGHTNESS: f64 = 40.0;
const MIN_SHARPNESS: f64 = 18.0;
const MAX_ROLL: f64 = 20.0;
const MAX_YAW: f64 = 15.0;
const MAX_PITCH: f64 = 15.0;

/// Head pose in degrees, stored as a JSON string on the record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Pose {
    pub roll: f64,
    pub yaw: f64,
    pub pitch: f64,
}

/// Image quality metrics, stored as a JSON string on the record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Quality {
    pub brightness: f64,
    pub sharpness: f64,
}

/// Detector metadata relevant to eligibility, extracted from a record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceDetail {
    pub occluded: Option<bool>,
    pub confidence: f64,
    pub eyes_open: Option<bool>,
    pub eyes_open_confidence: f64,
    pub pose: Pose,
    pub quality: Quality,
}

impl FaceDetail {
    /// Read detector fields from a record. Absent numbers read as 0 and an
    /// absent pose as frontal; present-but-unparsable fields are errors.
    pub fn from_record(record: &IndexedRecord) -> Result<Self, RecordError> {
        Ok(Self {
            occluded: record.flag(ATTR_OCCLUDED)?,
            confidence: record.number_or(ATTR_CONFIDENCE, 0.0)?,
            eyes_open: record.flag(ATTR_EYES_OPEN)?,
            eyes_open_confidence: record.number_or(ATTR_EYES_OPEN_CONFIDENCE, 0.0)?,
            pose: record.json_or_default(ATTR_POSE)?,
            quality: record.json_or_default(ATTR_QUALITY)?,
        })
    }
}

/// Why a face was turned down.
#[derive(Error, Debug)]
pub enum Rejection {
    #[error("occlusion not reported")]
    OcclusionUnknown,
    #[error("face is occluded")]
    Occluded,
    #[error("eyes-open state not reported")]
    EyesOpenUnknown,
    #[error("eyes are closed")]
    EyesClosed,
    #[error("detector confidence {0} too low")]
    LowConfidence(f64),
    #[error("eyes-open confidence {0} too low")]
    LowEyesOpenConfidence(f64),
    #[error("brightness {0} too low")]
    TooDark(f64),
    #[error("sharpness {0} too low")]
    TooBlurry(f64),
    #[error("head roll {0}° out of range")]
    Roll(f64),
    #[error("head yaw {0}° out of range")]
    Yaw(f64),
    #[error("head pitch {0}° out of range")]
    Pitch(f64),
    #[error("cannot assess record: {0}")]
    Malformed(#[from] RecordError),
}

/// Acceptance limits. Minimums are exclusive, pose ranges inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceThresholds {
    pub min_confidence: f64,
    pub min_eyes_open_confidence: f64,
    pub min_brightness: f64,
    pub min_sharpness: f64,
    pub max_roll: f64,
    pub max_yaw: f64,
    pub max_pitch: f64,
}

impl Default for FaceThresholds {
    fn default() -> Self {
        Self {
            min_confidence: MIN_CONFIDENCE,
            min_eyes_open_confidence: MIN_EYES_OPEN_CONFIDENCE,
            min_brightness: MIN_BRIGHTNESS,
            min_sharpness: MIN_SHARPNESS,
            max_roll: MAX_ROLL,
            max_yaw: MAX_YAW,
            max_pitch: MAX_PITCH,
        }
    }
}

impl FaceThresholds {
    /// Check every limit, returning the first one violated.
    ///
    /// Comparisons are written so that NaN fails them.
    #[allow(clippy::neg_cmp_op_on_partial_ord)]
    pub fn check(&self, face: &FaceDetail) -> Result<(), Rejection> {
        match face.occluded {
            None => return Err(Rejection::OcclusionUnknown),
            Some(true) => return Err(Rejection::Occluded),
            Some(false) => {}
        }
        match face.eyes_open {
            None => return Err(Rejection::EyesOpenUnknown),
            Some(false) => return Err(Rejection::EyesClosed),
            Some(true) => {}
        }
        if !(face.confidence > self.min_confidence) {
            return Err(Rejection::LowConfidence(face.confidence));
        }
        if !(face.eyes_open_confidence > self.min_eyes_open_confidence) {
            return Err(Rejection::LowEyesOpenConfidence(face.eyes_open_confidence));
        }
        if !(face.quality.brightness > self.min_brightness) {
            return Err(Rejection::TooDark(face.quality.brightness));
        }
        if !(face.quality.sharpness > self.min_sharpness) {
            return Err(Rejection::TooBlurry(face.quality.sharpness));
        }
        if !within(face.pose.roll, self.max_roll) {
            return Err(Rejection::Roll(face.pose.roll));
        }
        if !within(face.pose.yaw, self.max_yaw) {
            return Err(Rejection::Yaw(face.pose.yaw));
        }
        if !within(face.pose.pitch, self.max_pitch) {
            return Err(Rejection::Pitch(face.pose.pitch));
        }
        Ok(())
    }

    /// Parse a record and check it.
    pub fn assess(&self, record: &IndexedRecord) -> Result<FaceDetail, Rejection> {
        let face = FaceDetail::from_record(record)?;
        self.check(&face)?;
        Ok(face)
    }

    /// `true` if the record may serve as the user's thumbnail.
    ///
    /// Malformed records are logged and treated as ineligible.
    pub fn is_eligible(&self, record: &IndexedRecord) -> bool {
        match self.assess(record) {
            Ok(face) => {
                tracing::debug!(face_id = ?record.face_id(), ?face, "face eligible");
                true
            }
            Err(Rejection::Malformed(err)) => {
                tracing::warn!(face_id = ?record.face_id(), error = %err, "skipping malformed record");
                false
            }
            Err(reason) => {
                tracing::debug!(face_id = ?record.face_id(), %reason, "face rejected");
                false
            }
        }
    }
}

fn within(angle: f64, limit: f64) -> bool {
    (-limit..=limit).contains(&angle)
}

/// Eligibility under the default thresholds.
pub fn is_eligible(record: &IndexedRecord) -> bool {
    FaceThresholds::default().is_eligible(record)
}
