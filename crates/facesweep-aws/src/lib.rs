//! facesweep-aws: AWS-backed gateways.
//!
//! DynamoDB holds indexed and summary records, Rekognition the face
//! collection, S3 the source photos and thumbnails.

pub mod dynamo;
pub mod rekognition;
pub mod s3;

use aws_config::BehaviorVersion;
use std::sync::Arc;

use facesweep_core::{Gateways, Settings};

pub use dynamo::DynamoRecordStore;
pub use rekognition::RekognitionCollection;
pub use s3::S3ObjectStore;

/// Load the shared AWS config once and build every gateway from it.
pub async fn connect(settings: &Settings) -> Gateways {
    let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    tracing::info!(
        region = ?config.region(),
        indexed_table = %settings.indexed_table,
        collection = %settings.collection_id,
        "aws clients configured"
    );

    Gateways {
        records: Arc::new(DynamoRecordStore::new(
            aws_sdk_dynamodb::Client::new(&config),
            settings,
        )),
        collection: Arc::new(RekognitionCollection::new(
            aws_sdk_rekognition::Client::new(&config),
            settings,
        )),
        objects: Arc::new(S3ObjectStore::new(aws_sdk_s3::Client::new(&config))),
    }
}
