//! MongoDB storage implementation.
//!
//! [`MongoAdapter`] binds a driver [`Client`] to one collection of one database. Entities are
//! native BSON [`Document`]s; JSON crosses the boundary through serde in both directions.

use async_trait::async_trait;
use futures::TryStreamExt;
use bson::{Bson, Document, doc, oid::ObjectId};
use mongodb::{
    Client, Collection as MongoCollection,
    options::{ClientOptions, FindOptions, ReturnDocument},
};
use serde_json::{Map, Value};
use tracing::{debug, trace};
use uuid::Uuid;

use datalayer_core::{
    adapter::{Adapter, AdapterBuilder, Patch},
    error::{DataLayerError, DataLayerResult},
    filter::FilterDescriptor,
    settings::DEFAULT_ID_FIELD,
};

use crate::query::{to_bson, to_document, translate_filter, translate_predicate, translate_sort};


#[derive(Debug, Clone)]
pub struct MongoAdapter {
    client: Client,
    database: String,
    collection: String,
}

impl MongoAdapter {
    pub fn new(client: Client, database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            client,
            database: database.into(),
            collection: collection.into(),
        }
    }

    pub fn builder(dsn: &str, database: &str, collection: &str) -> MongoAdapterBuilder {
        MongoAdapterBuilder::new(dsn, database, collection)
    }

    fn get_collection(&self) -> MongoCollection<Document> {
        self.client
            .database(&self.database)
            .collection(&self.collection)
    }

    /// Prepares an entity for insertion, generating a UUID string id when it has none.
    fn prepare_document(&self, entity: &Value) -> DataLayerResult<Document> {
        let mut document = to_document(entity)?;

        if matches!(document.get(DEFAULT_ID_FIELD), None | Some(Bson::Null)) {
            document.insert(DEFAULT_ID_FIELD, Uuid::new_v4().to_string());
        }

        Ok(document)
    }

    fn update_document(patch: &Patch) -> DataLayerResult<Document> {
        Ok(doc! { "$set": to_document(&Value::Object(patch.set.clone()))? })
    }
}

/// Filter selecting one id. Strings that parse as an `ObjectId` match either representation.
fn id_filter(id: &Value) -> DataLayerResult<Document> {
    let id = to_bson(id)?;

    if let Bson::String(text) = &id {
        if let Ok(oid) = ObjectId::parse_str(text) {
            return Ok(doc! { DEFAULT_ID_FIELD: { "$in": [oid, text.as_str()] } });
        }
    }

    Ok(doc! { DEFAULT_ID_FIELD: id })
}

fn ids_filter(ids: &[Value]) -> DataLayerResult<Document> {
    let mut candidates = Vec::with_capacity(ids.len());

    for id in ids {
        let id = to_bson(id)?;
        if let Bson::String(text) = &id {
            if let Ok(oid) = ObjectId::parse_str(text) {
                candidates.push(Bson::ObjectId(oid));
            }
        }
        candidates.push(id);
    }

    Ok(doc! { DEFAULT_ID_FIELD: { "$in": candidates } })
}

/// Row window and ordering for a find. Limits beyond `i64::MAX` are clamped; the driver
/// reads a negative limit as a single-batch request.
fn find_options(filter: &FilterDescriptor) -> FindOptions {
    let mut options = FindOptions::default();

    options.limit = filter
        .limit
        .map(|limit| i64::try_from(limit).unwrap_or(i64::MAX));
    options.skip = filter.offset.map(|skip| skip as u64);
    options.sort = translate_sort(&filter.sort_fields());

    options
}

fn backend_error(e: mongodb::error::Error) -> DataLayerError {
    DataLayerError::Adapter(e.to_string())
}

#[async_trait]
impl Adapter for MongoAdapter {
    type Entity = Document;

    async fn connect(&self) -> DataLayerResult<()> {
        debug!(database = %self.database, collection = %self.collection, "pinging mongodb");

        self.client
            .database(&self.database)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| DataLayerError::Initialization(e.to_string()))?;

        Ok(())
    }

    async fn disconnect(&self) -> DataLayerResult<()> {
        self.client.clone().shutdown().await;

        Ok(())
    }

    async fn find(&self, filter: &FilterDescriptor) -> DataLayerResult<Vec<Document>> {
        let options = find_options(filter);
        let query = translate_filter(filter)?;
        trace!(collection = %self.collection, query = %query, "mongodb find");

        self.get_collection()
            .find(query)
            .with_options(options)
            .await
            .map_err(backend_error)?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(backend_error)
    }

    async fn find_one(&self, predicate: &Map<String, Value>) -> DataLayerResult<Option<Document>> {
        self.get_collection()
            .find_one(translate_predicate(predicate)?)
            .await
            .map_err(backend_error)
    }

    async fn find_by_id(&self, id: &Value) -> DataLayerResult<Option<Document>> {
        self.get_collection()
            .find_one(id_filter(id)?)
            .await
            .map_err(backend_error)
    }

    async fn find_by_ids(&self, ids: &[Value]) -> DataLayerResult<Vec<Document>> {
        self.get_collection()
            .find(ids_filter(ids)?)
            .await
            .map_err(backend_error)?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(backend_error)
    }

    async fn count(&self, filter: &FilterDescriptor) -> DataLayerResult<usize> {
        Ok(
            self.get_collection()
                .count_documents(translate_filter(filter)?)
                .await
                .map_err(backend_error)? as usize
        )
    }

    async fn insert(&self, entity: Value) -> DataLayerResult<Document> {
        let document = self.prepare_document(&entity)?;

        self.get_collection()
            .insert_one(&document)
            .await
            .map_err(backend_error)?;

        Ok(document)
    }

    async fn insert_many(&self, entities: Vec<Value>) -> DataLayerResult<Vec<Document>> {
        if entities.is_empty() {
            return Ok(Vec::new());
        }

        let documents = entities
            .iter()
            .map(|entity| self.prepare_document(entity))
            .collect::<DataLayerResult<Vec<Document>>>()?;

        self.get_collection()
            .insert_many(documents.clone())
            .await
            .map_err(backend_error)?;

        Ok(documents)
    }

    async fn update_by_id(&self, id: &Value, patch: &Patch) -> DataLayerResult<Option<Document>> {
        if patch.is_empty() {
            return self.find_by_id(id).await;
        }

        self.get_collection()
            .find_one_and_update(id_filter(id)?, Self::update_document(patch)?)
            .return_document(ReturnDocument::After)
            .await
            .map_err(backend_error)
    }

    async fn update_many(&self, predicate: &Map<String, Value>, patch: &Patch) -> DataLayerResult<usize> {
        if patch.is_empty() {
            return Ok(0);
        }

        Ok(
            self.get_collection()
                .update_many(translate_predicate(predicate)?, Self::update_document(patch)?)
                .await
                .map_err(backend_error)?
                .matched_count as usize
        )
    }

    async fn remove_by_id(&self, id: &Value) -> DataLayerResult<Option<Document>> {
        self.get_collection()
            .find_one_and_delete(id_filter(id)?)
            .await
            .map_err(backend_error)
    }

    async fn remove_many(&self, predicate: &Map<String, Value>) -> DataLayerResult<usize> {
        Ok(
            self.get_collection()
                .delete_many(translate_predicate(predicate)?)
                .await
                .map_err(backend_error)?
                .deleted_count as usize
        )
    }

    async fn clear(&self) -> DataLayerResult<usize> {
        Ok(
            self.get_collection()
                .delete_many(doc! {})
                .await
                .map_err(backend_error)?
                .deleted_count as usize
        )
    }

    /// Converts to relaxed JSON; an `ObjectId` primary key becomes its hex string.
    fn entity_to_object(&self, entity: &Document) -> DataLayerResult<Value> {
        let mut document = entity.clone();

        if let Some(Bson::ObjectId(oid)) = document.get(DEFAULT_ID_FIELD) {
            let hex = oid.to_hex();
            document.insert(DEFAULT_ID_FIELD, hex);
        }

        Ok(serde_json::to_value(&document)?)
    }
}

pub struct MongoAdapterBuilder {
    dsn: String,
    database: String,
    collection: String,
}

impl MongoAdapterBuilder {
    pub fn new(dsn: &str, database: &str, collection: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
            collection: collection.to_string(),
        }
    }
}

#[async_trait]
impl AdapterBuilder for MongoAdapterBuilder {
    type Adapter = MongoAdapter;

    async fn build(self) -> DataLayerResult<Self::Adapter> {
        Ok(MongoAdapter::new(
            Client::with_options(
                ClientOptions::parse(&self.dsn)
                    .await
                    .map_err(|e| DataLayerError::Initialization(e.to_string()))?,
            )
            .map_err(|e| DataLayerError::Initialization(e.to_string()))?,
            self.database,
            self.collection,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_id_strings_match_both_representations() {
        let hex = "65a1b2c3d4e5f60718293a4b";
        let oid = ObjectId::parse_str(hex).unwrap();

        assert_eq!(
            id_filter(&json!(hex)).unwrap(),
            doc! { "_id": { "$in": [oid, hex] } }
        );
        assert_eq!(id_filter(&json!("plain")).unwrap(), doc! { "_id": "plain" });
        assert_eq!(
            ids_filter(&[json!(hex), json!("plain")]).unwrap(),
            doc! { "_id": { "$in": [oid, hex, "plain"] } }
        );
    }

    #[test]
    fn oversized_limits_stay_positive() {
        let filter = FilterDescriptor::builder()
            .limit(usize::MAX)
            .offset(20)
            .sort(["-votes"])
            .build();
        let options = find_options(&filter);

        assert_eq!(options.limit, Some(i64::MAX));
        assert_eq!(options.skip, Some(20));
        assert_eq!(options.sort, Some(doc! { "votes": -1 }));

        let bounded = find_options(&FilterDescriptor::builder().limit(25).build());
        assert_eq!(bounded.limit, Some(25));
        assert_eq!(bounded.skip, None);
        assert_eq!(bounded.sort, None);
    }

    #[test]
    fn patches_become_set_documents() {
        let patch = Patch::new(json!({ "meta.views": "3" }).as_object().unwrap().clone());

        assert_eq!(
            MongoAdapter::update_document(&patch).unwrap(),
            doc! { "$set": { "meta.views": "3" } }
        );
    }
}
