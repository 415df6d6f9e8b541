//! Indexed face records and typed access to their attributes.

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::types::{AttrValue, Document, ObjectLocation, RelativeBox};

pub const ATTR_USER_ID: &str = "user_id";
pub const ATTR_FACE_ID: &str = "face_id";
pub const ATTR_FOLDER_NAME: &str = "folder_name";
pub const ATTR_IMAGE_URL: &str = "s3_url";
pub const ATTR_BOUNDING_BOX: &str = "bounding_box";
pub const ATTR_OCCLUDED: &str = "FaceOccluded_Value";
pub const ATTR_CONFIDENCE: &str = "Confidence";
pub const ATTR_EYES_OPEN: &str = "EyesOpen_Value";
pub const ATTR_EYES_OPEN_CONFIDENCE: &str = "EyesOpen_Confidence";
pub const ATTR_POSE: &str = "Pose";
pub const ATTR_QUALITY: &str = "Quality";

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("missing attribute `{0}`")]
    Missing(String),
    #[error("attribute `{name}` is {found}, expected {expected}")]
    WrongType {
        name: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("attribute `{name}` is not a number: {value:?}")]
    NotANumber { name: String, value: String },
    #[error("attribute `{name}` holds malformed JSON: {source}")]
    Json {
        name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid object URL `{0}`")]
    InvalidUrl(String),
}

/// One detected face occurrence, as written by the upstream indexer.
///
/// The full document is kept so that copies carry every attribute,
/// including ones this crate never reads.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedRecord {
    document: Document,
}

impl IndexedRecord {
    pub fn new(document: Document) -> Self {
        Self { document }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn into_document(self) -> Document {
        self.document
    }

    pub fn user_id(&self) -> Option<&str> {
        self.text(ATTR_USER_ID)
    }

    pub fn face_id(&self) -> Option<&str> {
        self.text(ATTR_FACE_ID)
    }

    pub fn folder_name(&self) -> Option<&str> {
        self.text(ATTR_FOLDER_NAME)
    }

    /// Where the source photo lives.
    pub fn image_location(&self) -> Result<ObjectLocation, RecordError> {
        let url = self
            .text(ATTR_IMAGE_URL)
            .ok_or_else(|| RecordError::Missing(ATTR_IMAGE_URL.to_string()))?;
        ObjectLocation::from_url(url)
    }

    /// The face's relative bounding box, stored as a map of numbers.
    pub fn bounding_box(&self) -> Result<RelativeBox, RecordError> {
        let map = match self.document.get(ATTR_BOUNDING_BOX) {
            Some(AttrValue::M(map)) => map,
            Some(other) => {
                return Err(RecordError::WrongType {
                    name: ATTR_BOUNDING_BOX.to_string(),
                    expected: "M",
                    found: other.type_name(),
                })
            }
            None => return Err(RecordError::Missing(ATTR_BOUNDING_BOX.to_string())),
        };

        let field = |key: &str| -> Result<f64, RecordError> {
            let name = format!("{ATTR_BOUNDING_BOX}.{key}");
            match map.get(key) {
                Some(value) => parse_number(&name, value),
                None => Err(RecordError::Missing(name)),
            }
        };

        Ok(RelativeBox {
            left: field("Left")?,
            top: field("Top")?,
            width: field("Width")?,
            height: field("Height")?,
        })
    }

    /// A copy of this record filed under another user id. Every other
    /// attribute is carried over verbatim.
    pub fn retarget(&self, new_user_id: &str) -> IndexedRecord {
        let mut document = self.document.clone();
        document.insert(ATTR_USER_ID.to_string(), AttrValue::S(new_user_id.to_string()));
        IndexedRecord { document }
    }

    /// String attribute, `None` when absent or not a string.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.document.get(name).and_then(AttrValue::as_str)
    }

    /// Boolean attribute; absent and `NULL` both read as `None`.
    pub fn flag(&self, name: &str) -> Result<Option<bool>, RecordError> {
        match self.document.get(name) {
            None | Some(AttrValue::Null(_)) => Ok(None),
            Some(AttrValue::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(RecordError::WrongType {
                name: name.to_string(),
                expected: "BOOL",
                found: other.type_name(),
            }),
        }
    }

    /// Numeric attribute, `default` when absent.
    pub fn number_or(&self, name: &str, default: f64) -> Result<f64, RecordError> {
        match self.document.get(name) {
            None | Some(AttrValue::Null(_)) => Ok(default),
            Some(value) => parse_number(name, value),
        }
    }

    /// A string attribute holding a JSON object; absent reads as `T::default()`.
    pub fn json_or_default<T: DeserializeOwned + Default>(&self, name: &str) -> Result<T, RecordError> {
        match self.document.get(name) {
            None | Some(AttrValue::Null(_)) => Ok(T::default()),
            Some(AttrValue::S(raw)) => serde_json::from_str(raw).map_err(|source| RecordError::Json {
                name: name.to_string(),
                source,
            }),
            Some(other) => Err(RecordError::WrongType {
                name: name.to_string(),
                expected: "S",
                found: other.type_name(),
            }),
        }
    }
}

impl From<Document> for IndexedRecord {
    fn from(document: Document) -> Self {
        Self::new(document)
    }
}

/// Numbers are normally `N`, but some writers stored them as strings.
fn parse_number(name: &str, value: &AttrValue) -> Result<f64, RecordError> {
    match value {
        AttrValue::N(raw) | AttrValue::S(raw) => {
            raw.trim().parse().map_err(|_| RecordError::NotANumber {
                name: name.to_string(),
                value: raw.clone(),
            })
        }
        other => Err(RecordError::WrongType {
            name: name.to_string(),
            expected: "N",
            found: other.type_name(),
        }),
    }
}
