//! In-memory storage implementation.
//!
//! [`MemoryStore`] holds any number of named collections behind one async-aware read-write
//! lock. [`MemoryAdapter`] is a cheap handle binding a store to one collection; it is the type
//! that implements [`Adapter`]. Rows keep their insertion order.

use std::{collections::HashMap, sync::Arc};
use async_trait::async_trait;
use mea::rwlock::RwLock;
use serde_json::{Map, Value};
use tracing::trace;
use uuid::Uuid;

use datalayer_core::{
    adapter::{Adapter, AdapterBuilder, Patch},
    error::{DataLayerError, DataLayerResult},
    filter::FilterDescriptor,
    populate::id_key,
    query::Expr,
    settings::DEFAULT_ID_FIELD,
};

use crate::evaluator::{DocumentEvaluator, compare_documents, matches_search};

type CollectionRows = Vec<Value>;
type StoreMap = HashMap<String, CollectionRows>;


#[derive(Default, Clone, Debug)]
pub struct MemoryStore {
    store: Arc<RwLock<StoreMap>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
        }
    }

    /// Returns an adapter bound to `collection` in this store.
    pub fn adapter(&self, collection: impl Into<String>) -> MemoryAdapter {
        MemoryAdapter {
            store: self.clone(),
            collection: collection.into(),
        }
    }

    pub async fn list_collections(&self) -> Vec<String> {
        self.store
            .read()
            .await
            .keys()
            .cloned()
            .collect()
    }

    pub async fn drop_collection(&self, name: &str) -> DataLayerResult<()> {
        let mut store = self.store.write().await;

        if store.remove(name).is_none() {
            return Err(DataLayerError::Adapter(format!("collection {name} does not exist")));
        }

        Ok(())
    }
}


/// [`Adapter`] over one collection of a [`MemoryStore`].
///
/// The native primary key is `_id`; inserted entities without one get a UUID v4 string.
#[derive(Clone, Debug)]
pub struct MemoryAdapter {
    store: MemoryStore,
    collection: String,
}

impl MemoryAdapter {
    /// Creates an adapter over a fresh, private store.
    pub fn new(collection: impl Into<String>) -> Self {
        MemoryStore::new().adapter(collection)
    }

    pub fn builder(collection: impl Into<String>) -> MemoryAdapterBuilder {
        MemoryAdapterBuilder::new(collection)
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    fn select<'a>(
        &self,
        rows: &'a [Value],
        filter: &FilterDescriptor,
    ) -> DataLayerResult<Vec<&'a Value>> {
        let expr = match &filter.query {
            Some(predicate) => Expr::parse(predicate)?,
            None => Expr::all(),
        };

        let mut selected = DocumentEvaluator::filter_documents(rows, &expr)?;

        if let Some(term) = &filter.search {
            let fields = filter.search_fields.as_deref().unwrap_or_default();
            selected.retain(|doc| matches_search(doc, term, fields));
        }

        Ok(selected)
    }

    fn matching_positions(rows: &[Value], predicate: &Map<String, Value>) -> DataLayerResult<Vec<usize>> {
        let expr = Expr::parse(predicate)?;
        let mut positions = Vec::new();

        for (index, row) in rows.iter().enumerate() {
            if DocumentEvaluator::new(row).evaluate(&expr)? {
                positions.push(index);
            }
        }

        Ok(positions)
    }
}

fn same_id(row: &Value, id: &Value) -> bool {
    row.get(DEFAULT_ID_FIELD)
        .is_some_and(|stored| stored == id || id_key(stored) == id_key(id))
}


#[async_trait]
impl Adapter for MemoryAdapter {
    type Entity = Value;

    async fn connect(&self) -> DataLayerResult<()> {
        self.store
            .store
            .write()
            .await
            .entry(self.collection.clone())
            .or_default();

        Ok(())
    }

    async fn disconnect(&self) -> DataLayerResult<()> {
        Ok(())
    }

    async fn find(&self, filter: &FilterDescriptor) -> DataLayerResult<Vec<Value>> {
        let store = self.store.store.read().await;
        let rows = match store.get(&self.collection) {
            Some(rows) => rows,
            None => return Ok(vec![]),
        };

        let mut selected = self.select(rows, filter)?;

        let sort = filter.sort_fields();
        if !sort.is_empty() {
            selected.sort_by(|a, b| compare_documents(a, b, &sort));
        }

        trace!(collection = %self.collection, matched = selected.len(), "memory find");

        Ok(
            selected
                .into_iter()
                .skip(filter.offset.unwrap_or(0))
                .take(filter.limit.unwrap_or(usize::MAX))
                .cloned()
                .collect()
        )
    }

    async fn find_one(&self, predicate: &Map<String, Value>) -> DataLayerResult<Option<Value>> {
        let store = self.store.store.read().await;
        let rows = match store.get(&self.collection) {
            Some(rows) => rows,
            None => return Ok(None),
        };

        let expr = Expr::parse(predicate)?;
        for row in rows {
            if DocumentEvaluator::new(row).evaluate(&expr)? {
                return Ok(Some(row.clone()));
            }
        }

        Ok(None)
    }

    async fn find_by_id(&self, id: &Value) -> DataLayerResult<Option<Value>> {
        Ok(
            self.store
                .store
                .read()
                .await
                .get(&self.collection)
                .and_then(|rows| rows.iter().find(|row| same_id(row, id)))
                .cloned()
        )
    }

    async fn find_by_ids(&self, ids: &[Value]) -> DataLayerResult<Vec<Value>> {
        let store = self.store.store.read().await;
        let rows = match store.get(&self.collection) {
            Some(rows) => rows,
            None => return Ok(vec![]),
        };

        Ok(
            rows
                .iter()
                .filter(|row| ids.iter().any(|id| same_id(row, id)))
                .cloned()
                .collect()
        )
    }

    async fn count(&self, filter: &FilterDescriptor) -> DataLayerResult<usize> {
        let store = self.store.store.read().await;

        match store.get(&self.collection) {
            Some(rows) => Ok(self.select(rows, filter)?.len()),
            None => Ok(0),
        }
    }

    async fn insert(&self, entity: Value) -> DataLayerResult<Value> {
        let mut inserted = self.insert_many(vec![entity]).await?;

        inserted
            .pop()
            .ok_or_else(|| DataLayerError::Adapter("insert produced no entity".into()))
    }

    async fn insert_many(&self, entities: Vec<Value>) -> DataLayerResult<Vec<Value>> {
        let mut store = self.store.store.write().await;
        let rows = store
            .entry(self.collection.clone())
            .or_default();

        let mut prepared = Vec::with_capacity(entities.len());
        for entity in entities {
            let Value::Object(mut map) = entity else {
                return Err(DataLayerError::Serialization(format!(
                    "{} entities must be objects",
                    self.collection
                )));
            };

            let id = match map.get(DEFAULT_ID_FIELD) {
                Some(id) if !id.is_null() => id.clone(),
                _ => Value::String(Uuid::new_v4().to_string()),
            };

            let duplicate = rows.iter().chain(&prepared).any(|row| same_id(row, &id));
            if duplicate {
                return Err(DataLayerError::EntityAlreadyExists(id_key(&id), self.collection.clone()));
            }

            map.insert(DEFAULT_ID_FIELD.to_string(), id);
            prepared.push(Value::Object(map));
        }

        rows.extend(prepared.iter().cloned());

        Ok(prepared)
    }

    async fn update_by_id(&self, id: &Value, patch: &Patch) -> DataLayerResult<Option<Value>> {
        let mut store = self.store.store.write().await;
        let Some(row) = store
            .get_mut(&self.collection)
            .and_then(|rows| rows.iter_mut().find(|row| same_id(row, id)))
        else {
            return Ok(None);
        };

        patch.apply(row);

        Ok(Some(row.clone()))
    }

    async fn update_many(&self, predicate: &Map<String, Value>, patch: &Patch) -> DataLayerResult<usize> {
        let mut store = self.store.store.write().await;
        let rows = match store.get_mut(&self.collection) {
            Some(rows) => rows,
            None => return Ok(0),
        };

        let positions = Self::matching_positions(rows, predicate)?;
        for index in &positions {
            patch.apply(&mut rows[*index]);
        }

        Ok(positions.len())
    }

    async fn remove_by_id(&self, id: &Value) -> DataLayerResult<Option<Value>> {
        let mut store = self.store.store.write().await;
        let rows = match store.get_mut(&self.collection) {
            Some(rows) => rows,
            None => return Ok(None),
        };

        Ok(
            rows
                .iter()
                .position(|row| same_id(row, id))
                .map(|index| rows.remove(index))
        )
    }

    async fn remove_many(&self, predicate: &Map<String, Value>) -> DataLayerResult<usize> {
        let mut store = self.store.store.write().await;
        let rows = match store.get_mut(&self.collection) {
            Some(rows) => rows,
            None => return Ok(0),
        };

        let positions = Self::matching_positions(rows, predicate)?;
        for index in positions.iter().rev() {
            rows.remove(*index);
        }

        Ok(positions.len())
    }

    async fn clear(&self) -> DataLayerResult<usize> {
        let mut store = self.store.store.write().await;

        Ok(
            store
                .get_mut(&self.collection)
                .map(|rows| rows.drain(..).count())
                .unwrap_or(0)
        )
    }

    fn entity_to_object(&self, entity: &Value) -> DataLayerResult<Value> {
        Ok(entity.clone())
    }
}


/// Builder for [`MemoryAdapter`]s; connects the adapter on build.
#[derive(Debug)]
pub struct MemoryAdapterBuilder {
    store: Option<MemoryStore>,
    collection: String,
    seed: Vec<Value>,
}

impl MemoryAdapterBuilder {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            store: None,
            collection: collection.into(),
            seed: Vec::new(),
        }
    }

    /// Shares an existing store instead of creating a private one.
    pub fn store(mut self, store: MemoryStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Entities inserted when the adapter is built.
    pub fn seed(mut self, entities: impl IntoIterator<Item = Value>) -> Self {
        self.seed.extend(entities);
        self
    }
}

#[async_trait]
impl AdapterBuilder for MemoryAdapterBuilder {
    type Adapter = MemoryAdapter;

    async fn build(self) -> DataLayerResult<Self::Adapter> {
        let adapter = self
            .store
            .unwrap_or_default()
            .adapter(self.collection);

        adapter.connect().await?;
        if !self.seed.is_empty() {
            adapter.insert_many(self.seed).await?;
        }

        Ok(adapter)
    }
}
