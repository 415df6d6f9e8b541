//! In-memory gateways for orchestrator tests.
//!
//! Each fake serves results in small pages so pagination is exercised,
//! counts writes, and can be told to fail specific calls.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::gateway::{FaceCollection, GatewayError, ObjectStore, Page, PageToken, RecordStore};
use crate::record::IndexedRecord;
use crate::types::{CollectionFace, ObjectLocation, UserSummary};

fn page_of<T: Clone>(all: &[T], cursor: Option<PageToken>, size: usize) -> Result<Page<T>, GatewayError> {
    let start = match cursor {
        Some(token) => token
            .as_str()
            .parse::<usize>()
            .map_err(|_| GatewayError::InvalidPageToken(token.into_inner()))?,
        None => 0,
    };
    let end = (start + size).min(all.len());
    let items = all.get(start..end).map(<[T]>::to_vec).unwrap_or_default();
    let next = (end < all.len()).then(|| PageToken::new(end.to_string()));
    Ok(Page { items, next })
}

#[derive(Default)]
pub struct MemoryRecordStore {
    records: Mutex<Vec<IndexedRecord>>,
    summaries: Mutex<BTreeMap<String, UserSummary>>,
    failing_users: Mutex<HashSet<String>>,
    fail_record_writes_after: Mutex<Option<usize>>,
    folder_pages_before_failure: Mutex<HashMap<String, usize>>,
    pub queries: AtomicUsize,
    pub writes: AtomicUsize,
}

impl MemoryRecordStore {
    const PAGE_SIZE: usize = 2;

    pub fn with_records(records: Vec<IndexedRecord>) -> Self {
        let store = Self::default();
        *store.records.lock().unwrap() = records;
        store
    }

    pub fn insert_summary(&self, summary: UserSummary) {
        self.summaries.lock().unwrap().insert(summary.user_id.clone(), summary);
    }

    pub fn summary(&self, user_id: &str) -> Option<UserSummary> {
        self.summaries.lock().unwrap().get(user_id).cloned()
    }

    pub fn summary_count(&self) -> usize {
        self.summaries.lock().unwrap().len()
    }

    pub fn records(&self) -> Vec<IndexedRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn records_of(&self, user_id: &str) -> Vec<IndexedRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.user_id() == Some(user_id))
            .collect()
    }

    /// Make every call touching `user_id` fail.
    pub fn fail_user(&self, user_id: &str) {
        self.failing_users.lock().unwrap().insert(user_id.to_string());
    }

    /// Let `count` record writes succeed, then fail the rest.
    pub fn fail_record_writes_after(&self, count: usize) {
        *self.fail_record_writes_after.lock().unwrap() = Some(count);
    }

    /// Serve `pages` folder-query pages for `user_id`, then fail. Other
    /// calls for the user keep working.
    pub fn fail_folder_query_after(&self, user_id: &str, pages: usize) {
        self.folder_pages_before_failure
            .lock()
            .unwrap()
            .insert(user_id.to_string(), pages);
    }

    fn check_user(&self, operation: &'static str, user_id: &str) -> Result<(), GatewayError> {
        if self.failing_users.lock().unwrap().contains(user_id) {
            return Err(GatewayError::service(operation, "injected failure"));
        }
        Ok(())
    }

    fn matching(&self, filter: impl Fn(&IndexedRecord) -> bool) -> Vec<IndexedRecord> {
        self.records.lock().unwrap().iter().filter(|r| filter(r)).cloned().collect()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get_user_summary(&self, user_id: &str) -> Result<Option<UserSummary>, GatewayError> {
        self.check_user("get_user_summary", user_id)?;
        Ok(self.summary(user_id))
    }

    async fn put_user_summary(&self, summary: &UserSummary) -> Result<(), GatewayError> {
        self.check_user("put_user_summary", &summary.user_id)?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.insert_summary(summary.clone());
        Ok(())
    }

    async fn query_by_user(
        &self,
        user_id: &str,
        cursor: Option<PageToken>,
    ) -> Result<Page<IndexedRecord>, GatewayError> {
        self.check_user("query_by_user", user_id)?;
        self.queries.fetch_add(1, Ordering::SeqCst);
        let all = self.matching(|r| r.user_id() == Some(user_id));
        page_of(&all, cursor, Self::PAGE_SIZE)
    }

    async fn query_by_user_in_folder(
        &self,
        user_id: &str,
        folder: &str,
        cursor: Option<PageToken>,
    ) -> Result<Page<IndexedRecord>, GatewayError> {
        self.check_user("query_by_user_in_folder", user_id)?;
        if let Some(remaining) = self.folder_pages_before_failure.lock().unwrap().get_mut(user_id) {
            if *remaining == 0 {
                return Err(GatewayError::service("query_by_user_in_folder", "injected failure"));
            }
            *remaining -= 1;
        }
        self.queries.fetch_add(1, Ordering::SeqCst);
        let all = self.matching(|r| r.user_id() == Some(user_id) && r.folder_name() == Some(folder));
        page_of(&all, cursor, Self::PAGE_SIZE)
    }

    async fn put_indexed_record(&self, record: &IndexedRecord) -> Result<(), GatewayError> {
        if let Some(remaining) = self.fail_record_writes_after.lock().unwrap().as_mut() {
            if *remaining == 0 {
                return Err(GatewayError::service("put_indexed_record", "injected failure"));
            }
            *remaining -= 1;
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryCollection {
    faces: Mutex<Vec<CollectionFace>>,
    users: Mutex<HashSet<String>>,
    disassociated: Mutex<Vec<(String, String)>>,
    failing_faces: Mutex<HashSet<String>>,
    fail_delete_user: Mutex<bool>,
    pub list_calls: AtomicUsize,
}

impl MemoryCollection {
    const PAGE_SIZE: usize = 3;

    /// `(face_id, user_id)` pairs; every named user is created too.
    pub fn with_faces(faces: &[(&str, Option<&str>)]) -> Self {
        let collection = Self::default();
        {
            let mut stored = collection.faces.lock().unwrap();
            let mut users = collection.users.lock().unwrap();
            for (face_id, user_id) in faces {
                stored.push(CollectionFace {
                    face_id: face_id.to_string(),
                    user_id: user_id.map(str::to_string),
                });
                if let Some(user) = user_id {
                    users.insert(user.to_string());
                }
            }
        }
        collection
    }

    pub fn add_user(&self, user_id: &str) {
        self.users.lock().unwrap().insert(user_id.to_string());
    }

    pub fn has_user(&self, user_id: &str) -> bool {
        self.users.lock().unwrap().contains(user_id)
    }

    pub fn has_face(&self, face_id: &str) -> bool {
        self.faces.lock().unwrap().iter().any(|f| f.face_id == face_id)
    }

    pub fn face(&self, face_id: &str) -> Option<CollectionFace> {
        self.faces.lock().unwrap().iter().find(|f| f.face_id == face_id).cloned()
    }

    pub fn disassociated(&self) -> Vec<(String, String)> {
        self.disassociated.lock().unwrap().clone()
    }

    pub fn fail_face(&self, face_id: &str) {
        self.failing_faces.lock().unwrap().insert(face_id.to_string());
    }

    pub fn fail_delete_user(&self) {
        *self.fail_delete_user.lock().unwrap() = true;
    }
}

#[async_trait]
impl FaceCollection for MemoryCollection {
    async fn list_faces(&self, cursor: Option<PageToken>) -> Result<Page<CollectionFace>, GatewayError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let all = self.faces.lock().unwrap().clone();
        page_of(&all, cursor, Self::PAGE_SIZE)
    }

    async fn disassociate_face(&self, user_id: &str, face_id: &str) -> Result<(), GatewayError> {
        if self.failing_faces.lock().unwrap().contains(face_id) {
            return Err(GatewayError::service("disassociate_faces", "injected failure"));
        }
        let mut faces = self.faces.lock().unwrap();
        if let Some(face) = faces.iter_mut().find(|f| f.face_id == face_id) {
            if face.user_id.as_deref() == Some(user_id) {
                face.user_id = None;
            }
        }
        self.disassociated
            .lock()
            .unwrap()
            .push((user_id.to_string(), face_id.to_string()));
        Ok(())
    }

    async fn delete_faces(&self, face_ids: &[String]) -> Result<Vec<String>, GatewayError> {
        let mut faces = self.faces.lock().unwrap();
        let mut deleted = Vec::new();
        faces.retain(|f| {
            if face_ids.contains(&f.face_id) {
                deleted.push(f.face_id.clone());
                false
            } else {
                true
            }
        });
        Ok(deleted)
    }

    async fn delete_user(&self, user_id: &str) -> Result<(), GatewayError> {
        if *self.fail_delete_user.lock().unwrap() {
            return Err(GatewayError::service("delete_user", "injected failure"));
        }
        if !self.users.lock().unwrap().remove(user_id) {
            return Err(GatewayError::service("delete_user", format!("user {user_id} not found")));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<ObjectLocation, (Vec<u8>, String)>>,
}

impl MemoryObjectStore {
    pub fn insert(&self, location: ObjectLocation, body: Vec<u8>) {
        self.objects
            .lock()
            .unwrap()
            .insert(location, (body, "application/octet-stream".to_string()));
    }

    pub fn get(&self, location: &ObjectLocation) -> Option<(Vec<u8>, String)> {
        self.objects.lock().unwrap().get(location).cloned()
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get_object(&self, location: &ObjectLocation) -> Result<Vec<u8>, GatewayError> {
        self.get(location)
            .map(|(body, _)| body)
            .ok_or_else(|| GatewayError::service("get_object", format!("NoSuchKey: {location}")))
    }

    async fn put_object(
        &self,
        location: &ObjectLocation,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), GatewayError> {
        self.objects
            .lock()
            .unwrap()
            .insert(location.clone(), (body, content_type.to_string()));
        Ok(())
    }

    fn object_url(&self, location: &ObjectLocation) -> String {
        format!("https://{}.s3.amazonaws.com/{}", location.bucket, location.key)
    }
}
