//! DynamoDB record store.

use async_trait::async_trait;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use std::collections::HashMap;
use thiserror::Error;

use facesweep_core::record::{ATTR_FOLDER_NAME, ATTR_USER_ID};
use facesweep_core::{
    AttrValue, Document, GatewayError, IndexedRecord, Page, PageToken, RecordStore, Settings,
    UserSummary,
};

type Item = HashMap<String, AttributeValue>;

#[derive(Error, Debug)]
#[error("unsupported attribute type at `{0}`")]
pub struct UnsupportedAttribute(String);

/// Convert an SDK attribute into the crate's value type.
pub fn from_attribute(path: &str, value: AttributeValue) -> Result<AttrValue, UnsupportedAttribute> {
    Ok(match value {
        AttributeValue::S(s) => AttrValue::S(s),
        AttributeValue::N(n) => AttrValue::N(n),
        AttributeValue::B(b) => AttrValue::B(b.into_inner()),
        AttributeValue::Bool(b) => AttrValue::Bool(b),
        AttributeValue::Null(n) => AttrValue::Null(n),
        AttributeValue::Ss(v) => AttrValue::Ss(v),
        AttributeValue::Ns(v) => AttrValue::Ns(v),
        AttributeValue::Bs(v) => AttrValue::Bs(v.into_iter().map(Blob::into_inner).collect()),
        AttributeValue::L(items) => AttrValue::L(
            items
                .into_iter()
                .enumerate()
                .map(|(i, v)| from_attribute(&format!("{path}[{i}]"), v))
                .collect::<Result<_, _>>()?,
        ),
        AttributeValue::M(map) => AttrValue::M(
            map.into_iter()
                .map(|(k, v)| -> Result<_, UnsupportedAttribute> {
                    let value = from_attribute(&format!("{path}.{k}"), v)?;
                    Ok((k, value))
                })
                .collect::<Result<_, _>>()?,
        ),
        _ => return Err(UnsupportedAttribute(path.to_string())),
    })
}

pub fn to_attribute(value: AttrValue) -> AttributeValue {
    match value {
        AttrValue::S(s) => AttributeValue::S(s),
        AttrValue::N(n) => AttributeValue::N(n),
        AttrValue::B(b) => AttributeValue::B(Blob::new(b)),
        AttrValue::Bool(b) => AttributeValue::Bool(b),
        AttrValue::Null(n) => AttributeValue::Null(n),
        AttrValue::Ss(v) => AttributeValue::Ss(v),
        AttrValue::Ns(v) => AttributeValue::Ns(v),
        AttrValue::Bs(v) => AttributeValue::Bs(v.into_iter().map(Blob::new).collect()),
        AttrValue::L(items) => AttributeValue::L(items.into_iter().map(to_attribute).collect()),
        AttrValue::M(map) => AttributeValue::M(map.into_iter().map(|(k, v)| (k, to_attribute(v))).collect()),
    }
}

pub fn item_to_document(item: Item) -> Result<Document, UnsupportedAttribute> {
    item.into_iter()
        .map(|(k, v)| -> Result<_, UnsupportedAttribute> {
            let value = from_attribute(&k, v)?;
            Ok((k, value))
        })
        .collect()
}

pub fn document_to_item(document: Document) -> Item {
    document.into_iter().map(|(k, v)| (k, to_attribute(v))).collect()
}

/// `LastEvaluatedKey` as an opaque token: the key rendered as typed JSON.
pub fn encode_page_token(key: Item) -> Result<PageToken, GatewayError> {
    let document = item_to_document(key).map_err(|err| GatewayError::malformed("query", err))?;
    let json = serde_json::to_string(&document).map_err(|err| GatewayError::malformed("query", err))?;
    Ok(PageToken::new(json))
}

pub fn decode_page_token(token: &PageToken) -> Result<Item, GatewayError> {
    let document: Document = serde_json::from_str(token.as_str())
        .map_err(|_| GatewayError::InvalidPageToken(token.as_str().to_string()))?;
    Ok(document_to_item(document))
}

pub struct DynamoRecordStore {
    client: Client,
    indexed_table: String,
    users_table: String,
    user_index: String,
    folder_user_index: String,
}

impl DynamoRecordStore {
    pub fn new(client: Client, settings: &Settings) -> Self {
        Self {
            client,
            indexed_table: settings.indexed_table.clone(),
            users_table: settings.users_table.clone(),
            user_index: settings.user_index.clone(),
            folder_user_index: settings.folder_user_index.clone(),
        }
    }

    async fn query_page(
        &self,
        index: &str,
        key_condition: &str,
        values: Vec<(&str, &str, &str)>,
        cursor: Option<PageToken>,
    ) -> Result<Page<IndexedRecord>, GatewayError> {
        let start_key = cursor.as_ref().map(decode_page_token).transpose()?;

        let mut request = self
            .client
            .query()
            .table_name(&self.indexed_table)
            .index_name(index)
            .key_condition_expression(key_condition)
            .set_exclusive_start_key(start_key);
        for (name_ref, attr, value) in values {
            request = request
                .expression_attribute_names(format!("#{name_ref}"), attr)
                .expression_attribute_values(format!(":{name_ref}"), AttributeValue::S(value.to_string()));
        }

        let output = request
            .send()
            .await
            .map_err(|err| GatewayError::service("query", DisplayErrorContext(&err)))?;

        let items = output
            .items
            .unwrap_or_default()
            .into_iter()
            .map(|item| item_to_document(item).map(IndexedRecord::new))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| GatewayError::malformed("query", err))?;

        let next = match output.last_evaluated_key {
            Some(key) if !key.is_empty() => Some(encode_page_token(key)?),
            _ => None,
        };

        tracing::debug!(index, items = items.len(), more = next.is_some(), "query page");
        Ok(Page { items, next })
    }
}

#[async_trait]
impl RecordStore for DynamoRecordStore {
    async fn get_user_summary(&self, user_id: &str) -> Result<Option<UserSummary>, GatewayError> {
        let output = self
            .client
            .get_item()
            .table_name(&self.users_table)
            .key(ATTR_USER_ID, AttributeValue::S(user_id.to_string()))
            .send()
            .await
            .map_err(|err| GatewayError::service("get_item", DisplayErrorContext(&err)))?;

        let Some(item) = output.item else {
            return Ok(None);
        };
        let document = item_to_document(item).map_err(|err| GatewayError::malformed("get_item", err))?;
        UserSummary::from_document(&document)
            .map(Some)
            .map_err(|err| GatewayError::malformed("get_item", err))
    }

    async fn put_user_summary(&self, summary: &UserSummary) -> Result<(), GatewayError> {
        self.client
            .put_item()
            .table_name(&self.users_table)
            .set_item(Some(document_to_item(summary.to_document())))
            .send()
            .await
            .map_err(|err| GatewayError::service("put_item", DisplayErrorContext(&err)))?;
        Ok(())
    }

    async fn query_by_user(
        &self,
        user_id: &str,
        cursor: Option<PageToken>,
    ) -> Result<Page<IndexedRecord>, GatewayError> {
        self.query_page(
            &self.user_index,
            "#user_id = :user_id",
            vec![("user_id", ATTR_USER_ID, user_id)],
            cursor,
        )
        .await
    }

    async fn query_by_user_in_folder(
        &self,
        user_id: &str,
        folder: &str,
        cursor: Option<PageToken>,
    ) -> Result<Page<IndexedRecord>, GatewayError> {
        self.query_page(
            &self.folder_user_index,
            "#folder_name = :folder_name AND #user_id = :user_id",
            vec![
                ("folder_name", ATTR_FOLDER_NAME, folder),
                ("user_id", ATTR_USER_ID, user_id),
            ],
            cursor,
        )
        .await
    }

    async fn put_indexed_record(&self, record: &IndexedRecord) -> Result<(), GatewayError> {
        self.client
            .put_item()
            .table_name(&self.indexed_table)
            .set_item(Some(document_to_item(record.document().clone())))
            .send()
            .await
            .map_err(|err| GatewayError::service("put_item", DisplayErrorContext(&err)))?;
        Ok(())
    }
}
