//! facesweep-core: face-collection maintenance routines.
//!
//! Thumbnail backfill, user-id rename and collection purges, written
//! against the gateway traits so any storage backend can drive them.

pub mod crop;
pub mod eligibility;
pub mod gateway;
pub mod record;
pub mod routines;
pub mod settings;
pub mod types;

#[cfg(test)]
mod memory;

pub use gateway::{FaceCollection, GatewayError, ObjectStore, Page, PageToken, RecordStore};
pub use record::{IndexedRecord, RecordError};
pub use routines::{Gateways, Routine, StatusResponse};
pub use settings::{Settings, SettingsError};
pub use types::{AttrValue, CollectionFace, Document, ObjectLocation, RelativeBox, UserSummary};
