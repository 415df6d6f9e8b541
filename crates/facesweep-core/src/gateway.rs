//! Seams to the external services: record store, face collection, object store.
//!
//! Every call returns an explicit `Result`; paginated calls take and return
//! an opaque [`PageToken`], and [`paginate`] turns them into lazy streams.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::fmt::Display;
use std::future::Future;
use thiserror::Error;

use crate::record::IndexedRecord;
use crate::types::{CollectionFace, ObjectLocation, UserSummary};

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("{operation} failed: {message}")]
    Service {
        operation: &'static str,
        message: String,
    },
    #[error("malformed {operation} response: {message}")]
    Malformed {
        operation: &'static str,
        message: String,
    },
    #[error("invalid page token: {0}")]
    InvalidPageToken(String),
}

impl GatewayError {
    pub fn service(operation: &'static str, err: impl Display) -> Self {
        Self::Service {
            operation,
            message: err.to_string(),
        }
    }

    pub fn malformed(operation: &'static str, err: impl Display) -> Self {
        Self::Malformed {
            operation,
            message: err.to_string(),
        }
    }
}

/// Continuation token handed back by a paginated call. Opaque to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageToken(String);

impl PageToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// One page of results plus the token for the next, if any.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<PageToken>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self { items, next: None }
    }
}

/// Indexed records and per-user summary records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_user_summary(&self, user_id: &str) -> Result<Option<UserSummary>, GatewayError>;

    async fn put_user_summary(&self, summary: &UserSummary) -> Result<(), GatewayError>;

    /// One page of the records filed under `user_id`.
    async fn query_by_user(
        &self,
        user_id: &str,
        cursor: Option<PageToken>,
    ) -> Result<Page<IndexedRecord>, GatewayError>;

    /// One page of the records filed under `user_id` within one folder.
    async fn query_by_user_in_folder(
        &self,
        user_id: &str,
        folder: &str,
        cursor: Option<PageToken>,
    ) -> Result<Page<IndexedRecord>, GatewayError>;

    /// Write (or overwrite) an indexed record.
    async fn put_indexed_record(&self, record: &IndexedRecord) -> Result<(), GatewayError>;
}

/// The managed face collection.
#[async_trait]
pub trait FaceCollection: Send + Sync {
    /// One page of every face in the collection.
    async fn list_faces(&self, cursor: Option<PageToken>) -> Result<Page<CollectionFace>, GatewayError>;

    async fn disassociate_face(&self, user_id: &str, face_id: &str) -> Result<(), GatewayError>;

    /// Delete faces by id. Returns the ids the service reports as deleted.
    async fn delete_faces(&self, face_ids: &[String]) -> Result<Vec<String>, GatewayError>;

    async fn delete_user(&self, user_id: &str) -> Result<(), GatewayError>;
}

/// Object storage for source photos and thumbnails.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_object(&self, location: &ObjectLocation) -> Result<Vec<u8>, GatewayError>;

    async fn put_object(
        &self,
        location: &ObjectLocation,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), GatewayError>;

    /// Public URL under which `location` is served.
    fn object_url(&self, location: &ObjectLocation) -> String;
}

/// Drive a page-fetching function to exhaustion as a lazy stream of items.
///
/// `fetch` is called with `None` first, then with each returned token;
/// no page is requested until the stream is polled past the previous one.
/// Calling `paginate` again starts over from the first page.
pub fn paginate<'a, T, F, Fut>(mut fetch: F) -> BoxStream<'a, Result<T, GatewayError>>
where
    T: Send + 'a,
    F: FnMut(Option<PageToken>) -> Fut + Send + 'a,
    Fut: Future<Output = Result<Page<T>, GatewayError>> + Send + 'a,
{
    // State: `Some(cursor)` while pages remain, `None` once exhausted.
    stream::try_unfold(Some(None), move |state: Option<Option<PageToken>>| {
        let request = state.map(&mut fetch);
        async move {
            let Some(request) = request else {
                return Ok::<_, GatewayError>(None);
            };
            let page = request.await?;
            let items = stream::iter(page.items.into_iter().map(Ok::<T, GatewayError>));
            Ok(Some((items, page.next.map(Some))))
        }
    })
    .try_flatten()
    .boxed()
}

/// Every record filed under `user_id`.
pub fn records_for_user<'a>(
    store: &'a dyn RecordStore,
    user_id: &'a str,
) -> BoxStream<'a, Result<IndexedRecord, GatewayError>> {
    paginate(move |cursor| store.query_by_user(user_id, cursor))
}

/// Every record filed under `user_id` in `folder`.
pub fn records_for_user_in_folder<'a>(
    store: &'a dyn RecordStore,
    user_id: &'a str,
    folder: &'a str,
) -> BoxStream<'a, Result<IndexedRecord, GatewayError>> {
    paginate(move |cursor| store.query_by_user_in_folder(user_id, folder, cursor))
}

/// Every face in the collection.
pub fn all_faces(collection: &dyn FaceCollection) -> BoxStream<'_, Result<CollectionFace, GatewayError>> {
    paginate(move |cursor| collection.list_faces(cursor))
}
