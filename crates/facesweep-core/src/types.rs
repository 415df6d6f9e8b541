use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::record::RecordError;

/// A typed attribute value, shaped like DynamoDB's JSON wire format
/// (`{"S": "..."}`, `{"N": "42"}`, `{"BOOL": true}`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    #[serde(rename = "S")]
    S(String),
    /// Numbers travel as their decimal string to avoid precision loss.
    #[serde(rename = "N")]
    N(String),
    #[serde(rename = "B")]
    B(Vec<u8>),
    #[serde(rename = "BOOL")]
    Bool(bool),
    #[serde(rename = "NULL")]
    Null(bool),
    #[serde(rename = "L")]
    L(Vec<AttrValue>),
    #[serde(rename = "M")]
    M(BTreeMap<String, AttrValue>),
    #[serde(rename = "SS")]
    Ss(Vec<String>),
    #[serde(rename = "NS")]
    Ns(Vec<String>),
    #[serde(rename = "BS")]
    Bs(Vec<Vec<u8>>),
}

impl AttrValue {
    /// Short type tag used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            AttrValue::S(_) => "S",
            AttrValue::N(_) => "N",
            AttrValue::B(_) => "B",
            AttrValue::Bool(_) => "BOOL",
            AttrValue::Null(_) => "NULL",
            AttrValue::L(_) => "L",
            AttrValue::M(_) => "M",
            AttrValue::Ss(_) => "SS",
            AttrValue::Ns(_) => "NS",
            AttrValue::Bs(_) => "BS",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::S(s) => Some(s),
            _ => None,
        }
    }
}

/// A schemaless stored item: attribute name to typed value.
pub type Document = BTreeMap<String, AttrValue>;

/// Face bounding box relative to the source image.
///
/// Each field is a fraction of the image width (`left`, `width`) or
/// height (`top`, `height`). Detector output may stray slightly outside
/// [0, 1]; the cropper clamps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RelativeBox {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// Per-user completion marker written once a thumbnail is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub user_id: String,
    pub face_url: String,
    /// UTC, formatted `%Y-%m-%d %H:%M:%S`.
    pub recorded_at: String,
}

const SUMMARY_USER_ID: &str = "user_id";
const SUMMARY_FACE_URL: &str = "face_url";
const SUMMARY_RECORDED_AT: &str = "recorded_timestamp(UTC)";

impl UserSummary {
    /// Build a summary stamped with the current UTC time.
    pub fn now(user_id: impl Into<String>, face_url: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            face_url: face_url.into(),
            recorded_at: chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        doc.insert(SUMMARY_USER_ID.into(), AttrValue::S(self.user_id.clone()));
        doc.insert(SUMMARY_FACE_URL.into(), AttrValue::S(self.face_url.clone()));
        doc.insert(SUMMARY_RECORDED_AT.into(), AttrValue::S(self.recorded_at.clone()));
        doc
    }

    /// Read a summary back. Older rows may lack the URL or timestamp;
    /// only `user_id` is required for the row to count as present.
    pub fn from_document(doc: &Document) -> Result<Self, RecordError> {
        let text = |name: &'static str| -> Result<Option<String>, RecordError> {
            match doc.get(name) {
                None | Some(AttrValue::Null(_)) => Ok(None),
                Some(AttrValue::S(s)) => Ok(Some(s.clone())),
                Some(other) => Err(RecordError::WrongType {
                    name: name.to_string(),
                    expected: "S",
                    found: other.type_name(),
                }),
            }
        };

        Ok(Self {
            user_id: text(SUMMARY_USER_ID)?
                .ok_or(RecordError::Missing(SUMMARY_USER_ID.to_string()))?,
            face_url: text(SUMMARY_FACE_URL)?.unwrap_or_default(),
            recorded_at: text(SUMMARY_RECORDED_AT)?.unwrap_or_default(),
        })
    }
}

/// A face entry as listed from the recognition collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionFace {
    pub face_id: String,
    /// The user this face is associated with, if any.
    pub user_id: Option<String>,
}

/// Bucket + key address of an object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Parse a stored image URL.
    ///
    /// Accepts virtual-hosted URLs (`https://<bucket>.s3.<region>.amazonaws.com/<key>`,
    /// the bucket being the first host label) and `s3://<bucket>/<key>`.
    pub fn from_url(url: &str) -> Result<Self, RecordError> {
        let invalid = || RecordError::InvalidUrl(url.to_string());

        let (scheme, rest) = url.split_once("://").ok_or_else(invalid)?;
        let (host, path) = rest.split_once('/').ok_or_else(invalid)?;
        let bucket = if scheme.eq_ignore_ascii_case("s3") {
            host
        } else {
            host.split('.').next().unwrap_or_default()
        };
        // query string and fragment are not part of the key
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let key = path.trim_start_matches('/');

        if bucket.is_empty() || key.is_empty() {
            return Err(invalid());
        }
        Ok(Self::new(bucket, key))
    }
}

impl std::fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}
