//! Storage adapter abstraction.
//!
//! This module defines the contract every storage backend implements so the request pipeline
//! can run unchanged over an in-memory map, a document database or anything else that can
//! answer the same questions.
//!
//! # Traits
//!
//! - [`Adapter`]: The core trait for storage backends
//! - [`AdapterBuilder`]: Factory trait for creating adapter instances
//!
//! # Examples
//!
//! ```ignore
//! use datalayer::adapter::Adapter;
//! use datalayer::filter::FilterDescriptor;
//! use serde_json::json;
//!
//! let adapter = MyAdapterImpl::new();
//! adapter.connect().await?;
//!
//! adapter.insert(json!({ "_id": "a", "title": "Hello" })).await?;
//! let rows = adapter.find(&FilterDescriptor::builder().limit(10).build()).await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::Debug;

use crate::{
    error::DataLayerResult,
    filter::FilterDescriptor,
    path,
    settings::DEFAULT_ID_FIELD,
};

/// Field assignments applied by `update_by_id` and `update_many`.
///
/// Keys are dotted paths; each value replaces whatever is stored at that path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub set: Map<String, Value>,
}

impl Patch {
    pub fn new(set: Map<String, Value>) -> Self {
        Self { set }
    }

    /// Builds a patch from client-supplied changes, flattening nested objects into dotted keys
    /// when `dot_notation` is set.
    pub fn from_changes(changes: Map<String, Value>, dot_notation: bool) -> Self {
        if dot_notation {
            Self { set: path::flatten(&changes) }
        } else {
            Self { set: changes }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Applies every assignment to `document`.
    pub fn apply(&self, document: &mut Value) {
        for (field, value) in &self.set {
            path::set(document, field, value.clone());
        }
    }
}

/// Abstract interface for storage backends.
///
/// An adapter is bound to exactly one collection. Entities are whatever the backend natively
/// returns ([`Adapter::Entity`]); the pipeline only ever looks at them through
/// [`Adapter::entity_to_object`]. Entities handed *to* the adapter are plain JSON objects.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`. The pipeline holds no locks, so an adapter whose
/// backend needs serialized writes is responsible for that itself.
///
/// # Identity
///
/// The backend may name its primary key differently from the collection's configured id
/// field. [`Adapter::before_save_transform_id`] and [`Adapter::after_retrieve_transform_id`]
/// translate between the two; the defaults rename the id field to and from
/// [`Adapter::native_id_field`].
///
/// # Errors
///
/// Backend failures are reported as [`DataLayerError::Adapter`](crate::error::DataLayerError)
/// and are propagated to the caller unchanged.
#[async_trait]
pub trait Adapter: Send + Sync + Debug {
    /// The backend's native entity representation.
    type Entity: Send + Sync;

    /// Name of the backend's own primary-key field.
    fn native_id_field(&self) -> &str {
        DEFAULT_ID_FIELD
    }

    /// Opens connections or prepares storage.
    async fn connect(&self) -> DataLayerResult<()>;

    /// Releases connections.
    async fn disconnect(&self) -> DataLayerResult<()>;

    /// Returns the entities matching `filter`, honoring its search, sort and window.
    async fn find(&self, filter: &FilterDescriptor) -> DataLayerResult<Vec<Self::Entity>>;

    /// Returns the first entity matching `predicate`.
    async fn find_one(
        &self,
        predicate: &Map<String, Value>,
    ) -> DataLayerResult<Option<Self::Entity>>;

    /// Returns the entity stored under the native id `id`.
    async fn find_by_id(&self, id: &Value) -> DataLayerResult<Option<Self::Entity>>;

    /// Returns the entities stored under any of `ids`. Unknown ids are skipped; the order of
    /// the result is unspecified.
    async fn find_by_ids(&self, ids: &[Value]) -> DataLayerResult<Vec<Self::Entity>>;

    /// Counts the entities matching `filter`. Any window on the filter is ignored.
    async fn count(&self, filter: &FilterDescriptor) -> DataLayerResult<usize>;

    /// Stores one entity and returns it as stored (with a generated id when it had none).
    async fn insert(&self, entity: Value) -> DataLayerResult<Self::Entity>;

    /// Stores several entities.
    async fn insert_many(&self, entities: Vec<Value>) -> DataLayerResult<Vec<Self::Entity>>;

    /// Applies `patch` to one entity and returns the updated entity, or `None` if it does not
    /// exist.
    async fn update_by_id(
        &self,
        id: &Value,
        patch: &Patch,
    ) -> DataLayerResult<Option<Self::Entity>>;

    /// Applies `patch` to every entity matching `predicate` and returns how many changed.
    async fn update_many(
        &self,
        predicate: &Map<String, Value>,
        patch: &Patch,
    ) -> DataLayerResult<usize>;

    /// Removes one entity and returns it, or `None` if it does not exist.
    async fn remove_by_id(&self, id: &Value) -> DataLayerResult<Option<Self::Entity>>;

    /// Removes every entity matching `predicate` and returns how many were removed.
    async fn remove_many(&self, predicate: &Map<String, Value>) -> DataLayerResult<usize>;

    /// Removes every entity of the collection and returns how many were removed.
    async fn clear(&self) -> DataLayerResult<usize>;

    /// Converts a native entity into a plain JSON object.
    fn entity_to_object(&self, entity: &Self::Entity) -> DataLayerResult<Value>;

    /// Renames the configured id field to the native one before a write.
    fn before_save_transform_id(&self, entity: Value, id_field: &str) -> Value {
        rename_field(entity, id_field, self.native_id_field())
    }

    /// Renames the native id field to the configured one after a read.
    fn after_retrieve_transform_id(&self, entity: Value, id_field: &str) -> Value {
        rename_field(entity, self.native_id_field(), id_field)
    }
}

#[async_trait]
impl<A> Adapter for &A
where
    A: Adapter,
{
    type Entity = A::Entity;

    fn native_id_field(&self) -> &str {
        (*self).native_id_field()
    }

    async fn connect(&self) -> DataLayerResult<()> {
        (*self).connect().await
    }

    async fn disconnect(&self) -> DataLayerResult<()> {
        (*self).disconnect().await
    }

    async fn find(&self, filter: &FilterDescriptor) -> DataLayerResult<Vec<Self::Entity>> {
        (*self).find(filter).await
    }

    async fn find_one(
        &self,
        predicate: &Map<String, Value>,
    ) -> DataLayerResult<Option<Self::Entity>> {
        (*self).find_one(predicate).await
    }

    async fn find_by_id(&self, id: &Value) -> DataLayerResult<Option<Self::Entity>> {
        (*self).find_by_id(id).await
    }

    async fn find_by_ids(&self, ids: &[Value]) -> DataLayerResult<Vec<Self::Entity>> {
        (*self).find_by_ids(ids).await
    }

    async fn count(&self, filter: &FilterDescriptor) -> DataLayerResult<usize> {
        (*self).count(filter).await
    }

    async fn insert(&self, entity: Value) -> DataLayerResult<Self::Entity> {
        (*self).insert(entity).await
    }

    async fn insert_many(&self, entities: Vec<Value>) -> DataLayerResult<Vec<Self::Entity>> {
        (*self).insert_many(entities).await
    }

    async fn update_by_id(
        &self,
        id: &Value,
        patch: &Patch,
    ) -> DataLayerResult<Option<Self::Entity>> {
        (*self).update_by_id(id, patch).await
    }

    async fn update_many(
        &self,
        predicate: &Map<String, Value>,
        patch: &Patch,
    ) -> DataLayerResult<usize> {
        (*self)
            .update_many(predicate, patch)
            .await
    }

    async fn remove_by_id(&self, id: &Value) -> DataLayerResult<Option<Self::Entity>> {
        (*self).remove_by_id(id).await
    }

    async fn remove_many(&self, predicate: &Map<String, Value>) -> DataLayerResult<usize> {
        (*self).remove_many(predicate).await
    }

    async fn clear(&self) -> DataLayerResult<usize> {
        (*self).clear().await
    }

    fn entity_to_object(&self, entity: &Self::Entity) -> DataLayerResult<Value> {
        (*self).entity_to_object(entity)
    }

    fn before_save_transform_id(&self, entity: Value, id_field: &str) -> Value {
        (*self).before_save_transform_id(entity, id_field)
    }

    fn after_retrieve_transform_id(&self, entity: Value, id_field: &str) -> Value {
        (*self).after_retrieve_transform_id(entity, id_field)
    }
}

/// Factory trait for creating (and connecting) adapter instances.
#[async_trait]
pub trait AdapterBuilder {
    type Adapter: Adapter;

    async fn build(self) -> DataLayerResult<Self::Adapter>;
}

/// Moves the top-level `from` key of an object to `to`. Other values pass through.
pub fn rename_field(entity: Value, from: &str, to: &str) -> Value {
    if from == to {
        return entity;
    }

    match entity {
        Value::Object(mut map) => {
            if let Some(value) = map.remove(from) {
                map.insert(to.to_string(), value);
            }
            Value::Object(map)
        }
        other => other,
    }
}
