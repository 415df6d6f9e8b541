//! S3 object store for source photos and thumbnails.

use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;

use facesweep_core::{GatewayError, ObjectLocation, ObjectStore};

pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Global virtual-hosted URL; S3 redirects to the bucket's region.
pub fn public_url(location: &ObjectLocation) -> String {
    format!("https://{}.s3.amazonaws.com/{}", location.bucket, location.key)
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get_object(&self, location: &ObjectLocation) -> Result<Vec<u8>, GatewayError> {
        let response = self
            .client
            .get_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
            .map_err(|err| GatewayError::service("get_object", DisplayErrorContext(&err)))?;

        let body = response
            .body
            .collect()
            .await
            .map_err(|err| GatewayError::service("get_object", err))?;
        Ok(body.into_bytes().to_vec())
    }

    async fn put_object(
        &self,
        location: &ObjectLocation,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), GatewayError> {
        self.client
            .put_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| GatewayError::service("put_object", DisplayErrorContext(&err)))?;
        Ok(())
    }

    fn object_url(&self, location: &ObjectLocation) -> String {
        public_url(location)
    }
}
