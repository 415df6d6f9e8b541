//! Rekognition face collection.

use async_trait::async_trait;
use aws_sdk_rekognition::error::DisplayErrorContext;
use aws_sdk_rekognition::Client;

use facesweep_core::{CollectionFace, FaceCollection, GatewayError, Page, PageToken, Settings};

pub struct RekognitionCollection {
    client: Client,
    collection_id: String,
    page_size: i32,
}

impl RekognitionCollection {
    pub fn new(client: Client, settings: &Settings) -> Self {
        Self {
            client,
            collection_id: settings.collection_id.clone(),
            page_size: i32::try_from(settings.list_faces_page_size).unwrap_or(i32::MAX),
        }
    }
}

/// A blank continuation token means the listing is finished.
fn next_token(token: Option<String>) -> Option<PageToken> {
    token.filter(|t| !t.is_empty()).map(PageToken::new)
}

#[async_trait]
impl FaceCollection for RekognitionCollection {
    async fn list_faces(&self, cursor: Option<PageToken>) -> Result<Page<CollectionFace>, GatewayError> {
        let output = self
            .client
            .list_faces()
            .collection_id(&self.collection_id)
            .max_results(self.page_size)
            .set_next_token(cursor.map(PageToken::into_inner))
            .send()
            .await
            .map_err(|err| GatewayError::service("list_faces", DisplayErrorContext(&err)))?;

        let items = output
            .faces
            .unwrap_or_default()
            .into_iter()
            .filter_map(|face| match face.face_id {
                Some(face_id) => Some(CollectionFace {
                    face_id,
                    user_id: face.user_id,
                }),
                None => {
                    tracing::warn!("listed face without an id");
                    None
                }
            })
            .collect::<Vec<_>>();

        tracing::debug!(collection = %self.collection_id, faces = items.len(), "list_faces page");
        Ok(Page {
            items,
            next: next_token(output.next_token),
        })
    }

    async fn disassociate_face(&self, user_id: &str, face_id: &str) -> Result<(), GatewayError> {
        let output = self
            .client
            .disassociate_faces()
            .collection_id(&self.collection_id)
            .user_id(user_id)
            .face_ids(face_id)
            .send()
            .await
            .map_err(|err| GatewayError::service("disassociate_faces", DisplayErrorContext(&err)))?;

        // Per-face rejections are reported in the body, not as an error.
        if let Some(rejected) = output.unsuccessful_face_disassociations.filter(|r| !r.is_empty()) {
            tracing::warn!(user_id, face_id, ?rejected, "face not disassociated");
        }
        Ok(())
    }

    async fn delete_faces(&self, face_ids: &[String]) -> Result<Vec<String>, GatewayError> {
        let output = self
            .client
            .delete_faces()
            .collection_id(&self.collection_id)
            .set_face_ids(Some(face_ids.to_vec()))
            .send()
            .await
            .map_err(|err| GatewayError::service("delete_faces", DisplayErrorContext(&err)))?;
        Ok(output.deleted_faces.unwrap_or_default())
    }

    async fn delete_user(&self, user_id: &str) -> Result<(), GatewayError> {
        self.client
            .delete_user()
            .collection_id(&self.collection_id)
            .user_id(user_id)
            .send()
            .await
            .map_err(|err| GatewayError::service("delete_user", DisplayErrorContext(&err)))?;
        Ok(())
    }
}
