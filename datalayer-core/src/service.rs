//! Request-facing data access operations.
//!
//! [`DataAccessService`] ties one [`Adapter`] to one collection's [`CollectionSettings`] and
//! exposes the operations a transport layer forwards raw request parameters to. Every read
//! runs through the same pipeline:
//!
//! ```text
//! raw params -> normalize -> adapter -> entity_to_object -> id rename -> encode -> populate
//!            -> project -> exclude -> (list) envelope
//! ```
//!
//! # Example
//!
//! ```ignore
//! use datalayer::prelude::*;
//!
//! let service = DataAccessService::builder(adapter, settings)
//!     .validator(|post: &Value| match post.get("title") {
//!         Some(Value::String(_)) => Ok(()),
//!         _ => Err(vec![FieldViolation::new("title", "is required")]),
//!     })
//!     .build();
//!
//! let page = service.list(&ctx, &json!({ "page": 2, "sort": "-createdAt" })).await?;
//! ```

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::{fmt, sync::Arc};
use tracing::debug;

use crate::{
    adapter::{Adapter, Patch},
    broker::ActionHandler,
    context::CallContext,
    error::{DataLayerError, DataLayerResult},
    filter::{normalize, FilterDescriptor, FilterMode},
    hooks::{EntityEvent, EntityListener, EntityValidator, IdCodec, PlainIds},
    page::ListEnvelope,
    populate::id_key,
    settings::CollectionSettings,
    transform::DocumentTransformer,
};

/// Data access for one collection.
pub struct DataAccessService<A> {
    adapter: A,
    settings: CollectionSettings,
    codec: Arc<dyn IdCodec>,
    validator: Option<Arc<dyn EntityValidator>>,
    listener: Option<Arc<dyn EntityListener>>,
}

impl<A> DataAccessService<A>
where
    A: Adapter,
{
    /// Creates a service with identity id encoding and no hooks.
    pub fn new(adapter: A, settings: CollectionSettings) -> Self {
        Self::builder(adapter, settings).build()
    }

    pub fn builder(adapter: A, settings: CollectionSettings) -> DataAccessServiceBuilder<A> {
        DataAccessServiceBuilder::new(adapter, settings)
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn settings(&self) -> &CollectionSettings {
        &self.settings
    }

    fn transformer(&self) -> DocumentTransformer<'_> {
        DocumentTransformer::new(&self.settings, self.codec.as_ref())
    }

    pub async fn connect(&self) -> DataLayerResult<()> {
        debug!(collection = %self.settings.name, "connecting adapter");
        self.adapter.connect().await
    }

    pub async fn disconnect(&self) -> DataLayerResult<()> {
        debug!(collection = %self.settings.name, "disconnecting adapter");
        self.adapter.disconnect().await
    }

    /// Returns the transformed entities matching `params`.
    pub async fn find(&self, ctx: &dyn CallContext, params: &Value) -> DataLayerResult<Vec<Value>> {
        let filter = normalize(params, &self.settings, FilterMode::Find)?;
        debug!(collection = %self.settings.name, filter = ?filter, "find");

        let entities = self.adapter.find(&filter).await?;
        self.transform_entities(ctx, &filter, entities).await
    }

    /// Counts the entities matching `params`, ignoring any row window.
    pub async fn count(&self, _ctx: &dyn CallContext, params: &Value) -> DataLayerResult<usize> {
        let filter = normalize(params, &self.settings, FilterMode::Find)?.without_window();
        debug!(collection = %self.settings.name, filter = ?filter, "count");

        self.adapter.count(&filter).await
    }

    /// Returns one page of transformed entities with paging metadata.
    pub async fn list(
        &self,
        ctx: &dyn CallContext,
        params: &Value,
    ) -> DataLayerResult<ListEnvelope> {
        let filter = normalize(params, &self.settings, FilterMode::Paginated)?;
        let count_filter = filter.without_window();
        debug!(collection = %self.settings.name, filter = ?filter, "list");

        let (entities, total) = futures::try_join!(
            self.adapter.find(&filter),
            self.adapter.count(&count_filter)
        )?;
        let rows = self
            .transform_entities(ctx, &filter, entities)
            .await?;

        let page = filter.page.unwrap_or(1);
        let page_size = filter.page_size.unwrap_or(self.settings.page_size);

        Ok(ListEnvelope::builder(rows)
            .with_total(total)
            .with_page(page, page_size)
            .build())
    }

    /// Validates and stores one entity, returning it as clients see it.
    pub async fn create(&self, ctx: &dyn CallContext, entity: Value) -> DataLayerResult<Value> {
        debug!(collection = %self.settings.name, "create");

        let entity = self.prepare_for_save(entity)?;
        let stored = self.adapter.insert(entity).await?;
        let created = self
            .transform_entities(ctx, &FilterDescriptor::default(), vec![stored])
            .await?
            .pop()
            .unwrap_or(Value::Null);

        self.notify(EntityEvent::Created, &created, ctx)
            .await?;
        Ok(created)
    }

    /// Stores `{ entity }` or `{ entities: [...] }`.
    ///
    /// The remaining parameters shape the returned documents like a `find` would.
    pub async fn insert(&self, ctx: &dyn CallContext, params: &Value) -> DataLayerResult<Value> {
        let filter = normalize(params, &self.settings, FilterMode::Find)?;

        if let Some(entities) = params.get("entities") {
            let Value::Array(entities) = entities else {
                return Err(DataLayerError::InvalidParameter("entities must be an array".into()));
            };
            debug!(collection = %self.settings.name, count = entities.len(), "insert many");

            let prepared = entities
                .iter()
                .cloned()
                .map(|entity| self.prepare_for_save(entity))
                .collect::<DataLayerResult<Vec<_>>>()?;
            let stored = self.adapter.insert_many(prepared).await?;
            let inserted = Value::Array(self.transform_entities(ctx, &filter, stored).await?);

            self.notify(EntityEvent::Created, &inserted, ctx)
                .await?;
            return Ok(inserted);
        }

        if let Some(entity) = params.get("entity") {
            debug!(collection = %self.settings.name, "insert");

            let prepared = self.prepare_for_save(entity.clone())?;
            let stored = self.adapter.insert(prepared).await?;
            let inserted = self
                .transform_entities(ctx, &filter, vec![stored])
                .await?
                .pop()
                .unwrap_or(Value::Null);

            self.notify(EntityEvent::Created, &inserted, ctx)
                .await?;
            return Ok(inserted);
        }

        Err(DataLayerError::InvalidParameter("insert needs `entity` or `entities`".into()))
    }

    /// Fetches entities by id.
    ///
    /// - A single id returns one document and fails with `EntityNotFound` when it is unknown.
    /// - An array of ids returns the found documents in requested order; unknown ids are
    ///   skipped.
    /// - With `mapping: true` the result is an object keyed by encoded id.
    pub async fn get(&self, ctx: &dyn CallContext, params: &Value) -> DataLayerResult<Value> {
        let id = params
            .get("id")
            .filter(|id| !id.is_null())
            .ok_or_else(|| DataLayerError::InvalidParameter("get needs an `id`".into()))?;
        let filter = normalize(params, &self.settings, FilterMode::Find)?;
        let mapping = matches!(params.get("mapping"), Some(Value::Bool(true)))
            || matches!(params.get("mapping"), Some(Value::String(flag)) if flag == "true");
        debug!(collection = %self.settings.name, id = %id, mapping, "get");

        let docs = match id {
            Value::Array(ids) => {
                let decoded = ids
                    .iter()
                    .map(|id| self.codec.decode(id))
                    .collect::<DataLayerResult<Vec<_>>>()?;
                let entities = self.adapter.find_by_ids(&decoded).await?;
                let objects = self.entities_to_objects(entities)?;
                in_requested_order(objects, &decoded, &self.settings.id_field)
            }
            single => {
                let decoded = self.codec.decode(single)?;
                let entity = self
                    .adapter
                    .find_by_id(&decoded)
                    .await?
                    .ok_or_else(|| DataLayerError::not_found(single.clone()))?;
                self.entities_to_objects(vec![entity])?
            }
        };

        let transformer = self.transformer();
        let docs = docs
            .into_iter()
            .map(|doc| transformer.encode_id(doc))
            .collect::<Vec<_>>();
        let keys = docs
            .iter()
            .map(|doc| doc.get(&self.settings.id_field).map(id_key))
            .collect::<Vec<_>>();

        // Ids are already encoded; the codec must not run twice.
        let shaped = DocumentTransformer::new(&self.settings, &PlainIds)
            .transform(ctx, &filter, docs)
            .await?;

        if mapping {
            let mut mapped = Map::new();
            for (key, doc) in keys.into_iter().zip(shaped) {
                if let Some(key) = key {
                    mapped.insert(key, doc);
                }
            }
            return Ok(Value::Object(mapped));
        }

        match id {
            Value::Array(_) => Ok(Value::Array(shaped)),
            _ => Ok(shaped.into_iter().next().unwrap_or(Value::Null)),
        }
    }

    /// Updates the entity named by `id` (or the configured id field) with every other parameter.
    pub async fn update(&self, ctx: &dyn CallContext, params: &Value) -> DataLayerResult<Value> {
        let Value::Object(params) = params else {
            return Err(DataLayerError::InvalidParameter("update parameters must be an object".into()));
        };

        let mut changes = params.clone();
        let id = changes
            .remove("id")
            .into_iter()
            .chain(changes.remove(&self.settings.id_field))
            .find(|id| !id.is_null())
            .ok_or_else(|| DataLayerError::InvalidParameter("update needs an `id`".into()))?;
        debug!(collection = %self.settings.name, id = %id, "update");

        let decoded = self.codec.decode(&id)?;
        let patch = Patch::from_changes(changes, self.settings.use_dot_notation);
        let entity = self
            .adapter
            .update_by_id(&decoded, &patch)
            .await?
            .ok_or_else(|| DataLayerError::not_found(id.clone()))?;

        let updated = self
            .transform_entities(ctx, &FilterDescriptor::default(), vec![entity])
            .await?
            .pop()
            .unwrap_or(Value::Null);

        self.notify(EntityEvent::Updated, &updated, ctx)
            .await?;
        Ok(updated)
    }

    /// Removes the entity named by `id` and returns it.
    pub async fn remove(&self, ctx: &dyn CallContext, params: &Value) -> DataLayerResult<Value> {
        let id = params
            .get("id")
            .filter(|id| !id.is_null())
            .ok_or_else(|| DataLayerError::InvalidParameter("remove needs an `id`".into()))?;
        debug!(collection = %self.settings.name, id = %id, "remove");

        let decoded = self.codec.decode(id)?;
        let entity = self
            .adapter
            .remove_by_id(&decoded)
            .await?
            .ok_or_else(|| DataLayerError::not_found(id.clone()))?;

        let removed = self
            .transform_entities(ctx, &FilterDescriptor::default(), vec![entity])
            .await?
            .pop()
            .unwrap_or(Value::Null);

        self.notify(EntityEvent::Removed, &removed, ctx)
            .await?;
        Ok(removed)
    }

    /// Removes every entity of the collection and returns how many were removed.
    pub async fn clear(&self, ctx: &dyn CallContext) -> DataLayerResult<usize> {
        debug!(collection = %self.settings.name, "clear");

        let removed = self.adapter.clear().await?;
        self.notify(EntityEvent::Removed, &Value::from(removed), ctx)
            .await?;
        Ok(removed)
    }

    /// Runs the whole read pipeline over native entities.
    pub async fn transform_entities(
        &self,
        ctx: &dyn CallContext,
        filter: &FilterDescriptor,
        entities: Vec<A::Entity>,
    ) -> DataLayerResult<Vec<Value>> {
        let objects = self.entities_to_objects(entities)?;
        self.transformer()
            .transform(ctx, filter, objects)
            .await
    }

    fn entities_to_objects(&self, entities: Vec<A::Entity>) -> DataLayerResult<Vec<Value>> {
        entities
            .iter()
            .map(|entity| {
                let object = self.adapter.entity_to_object(entity)?;
                Ok(self
                    .adapter
                    .after_retrieve_transform_id(object, &self.settings.id_field))
            })
            .collect()
    }

    fn prepare_for_save(&self, entity: Value) -> DataLayerResult<Value> {
        if !entity.is_object() {
            return Err(DataLayerError::InvalidParameter(format!(
                "entity must be an object, got {entity}"
            )));
        }

        if let Some(validator) = &self.validator {
            validator
                .validate(&entity)
                .map_err(DataLayerError::Validation)?;
        }

        Ok(self
            .adapter
            .before_save_transform_id(entity, &self.settings.id_field))
    }

    async fn notify(
        &self,
        event: EntityEvent,
        entity: &Value,
        ctx: &dyn CallContext,
    ) -> DataLayerResult<()> {
        match &self.listener {
            Some(listener) => listener.entity_changed(event, entity, ctx).await,
            None => Ok(()),
        }
    }
}

fn in_requested_order(objects: Vec<Value>, ids: &[Value], id_field: &str) -> Vec<Value> {
    let mut pending = objects.into_iter().map(Some).collect::<Vec<_>>();
    let mut ordered = Vec::with_capacity(pending.len());

    for id in ids {
        let key = id_key(id);
        let found = pending.iter_mut().find(|slot| {
            slot.as_ref()
                .and_then(|doc| doc.get(id_field))
                .is_some_and(|stored| id_key(stored) == key)
        });
        if let Some(doc) = found.and_then(Option::take) {
            ordered.push(doc);
        }
    }

    ordered
}

#[async_trait]
impl<A> ActionHandler for DataAccessService<A>
where
    A: Adapter,
{
    fn name(&self) -> &str {
        &self.settings.name
    }

    async fn dispatch(
        &self,
        ctx: &dyn CallContext,
        operation: &str,
        params: Value,
    ) -> DataLayerResult<Value> {
        match operation {
            "find" => Ok(Value::Array(self.find(ctx, &params).await?)),
            "count" => Ok(Value::from(self.count(ctx, &params).await?)),
            "list" => Ok(serde_json::to_value(self.list(ctx, &params).await?)?),
            "create" => self.create(ctx, params).await,
            "insert" => self.insert(ctx, &params).await,
            "get" => self.get(ctx, &params).await,
            "update" => self.update(ctx, &params).await,
            "remove" => self.remove(ctx, &params).await,
            "clear" => Ok(Value::from(self.clear(ctx).await?)),
            other => Err(DataLayerError::ActionNotFound(format!(
                "{}.{other}",
                self.settings.name
            ))),
        }
    }
}

impl<A: fmt::Debug> fmt::Debug for DataAccessService<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataAccessService")
            .field("adapter", &self.adapter)
            .field("settings", &self.settings)
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}

/// Builder for [`DataAccessService`].
pub struct DataAccessServiceBuilder<A> {
    adapter: A,
    settings: CollectionSettings,
    codec: Arc<dyn IdCodec>,
    validator: Option<Arc<dyn EntityValidator>>,
    listener: Option<Arc<dyn EntityListener>>,
}

impl<A> DataAccessServiceBuilder<A> {
    pub fn new(adapter: A, settings: CollectionSettings) -> Self {
        Self {
            adapter,
            settings,
            codec: Arc::new(PlainIds),
            validator: None,
            listener: None,
        }
    }

    pub fn id_codec(mut self, codec: impl IdCodec + 'static) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    pub fn validator(mut self, validator: impl EntityValidator + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn listener(mut self, listener: impl EntityListener + 'static) -> Self {
        self.listener = Some(Arc::new(listener));
        self
    }

    pub fn build(self) -> DataAccessService<A> {
        DataAccessService {
            adapter: self.adapter,
            settings: self.settings,
            codec: self.codec,
            validator: self.validator,
            listener: self.listener,
        }
    }
}
