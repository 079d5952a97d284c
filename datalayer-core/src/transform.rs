//! Client-facing document shaping.
//!
//! After an adapter has turned its entities into plain objects and restored the configured id
//! field, [`DocumentTransformer`] finishes the job for a batch:
//!
//! 1. the id value is encoded with the collection's [`IdCodec`],
//! 2. requested populate paths are resolved,
//! 3. the document is projected onto the authorized field list,
//! 4. request and collection exclusions are removed.

use serde_json::{Map, Value};
use tracing::trace;

use crate::{
    authorize::authorize,
    context::CallContext,
    error::DataLayerResult,
    filter::FilterDescriptor,
    hooks::IdCodec,
    path,
    populate::PopulationResolver,
    settings::CollectionSettings,
};

#[derive(Debug, Clone, Copy)]
pub struct DocumentTransformer<'a> {
    settings: &'a CollectionSettings,
    codec: &'a dyn IdCodec,
}

impl<'a> DocumentTransformer<'a> {
    pub fn new(settings: &'a CollectionSettings, codec: &'a dyn IdCodec) -> Self {
        Self { settings, codec }
    }

    /// Replaces the id value of `doc` with its encoded form.
    pub fn encode_id(&self, mut doc: Value) -> Value {
        if let Some(id) = doc
            .as_object_mut()
            .and_then(|map| map.get_mut(&self.settings.id_field))
        {
            *id = self.codec.encode(id);
        }
        doc
    }

    /// The field list documents are projected onto, or `None` for no projection.
    ///
    /// Requested fields are authorized against the allow-list; without a request the
    /// allow-list itself is used.
    pub fn projection(&self, filter: &FilterDescriptor) -> Option<Vec<String>> {
        match &filter.fields {
            Some(requested) => Some(authorize(requested, &self.settings.fields)),
            None if !self.settings.fields.is_empty() => Some(self.settings.fields.clone()),
            None => None,
        }
    }

    /// Builds a fresh document holding only `fields`.
    pub fn project(&self, doc: &Value, fields: &[String]) -> Value {
        let mut projected = Value::Object(Map::new());
        for field in fields {
            path::project(doc, field, &mut projected);
        }
        projected
    }

    /// Removes request exclusions and the collection's default exclusions.
    pub fn exclude(&self, mut doc: Value, filter: &FilterDescriptor) -> Value {
        let requested = filter.exclude_fields.iter().flatten();
        for field in requested.chain(&self.settings.exclude_fields) {
            path::unset(&mut doc, field);
        }
        doc
    }

    /// Runs encoding, population, projection and exclusion over a batch.
    pub async fn transform(
        &self,
        ctx: &dyn CallContext,
        filter: &FilterDescriptor,
        docs: Vec<Value>,
    ) -> DataLayerResult<Vec<Value>> {
        let mut docs = docs
            .into_iter()
            .map(|doc| self.encode_id(doc))
            .collect::<Vec<_>>();

        let paths = filter.populate_paths();
        if !paths.is_empty() && !self.settings.populates.is_empty() {
            trace!(collection = %self.settings.name, paths = ?paths, "populating batch");
            PopulationResolver::new(&self.settings.populates)
                .populate(ctx, &mut docs, paths)
                .await?;
        }

        let projection = self.projection(filter);
        trace!(collection = %self.settings.name, fields = ?projection, "shaping batch");

        Ok(docs
            .into_iter()
            .map(|doc| match &projection {
                Some(fields) => self.project(&doc, fields),
                None => doc,
            })
            .map(|doc| self.exclude(doc, filter))
            .collect())
    }

    /// Shape-preserving form of [`DocumentTransformer::transform`]: an array is transformed
    /// element-wise, an object as a batch of one, anything else is returned unchanged.
    pub async fn transform_value(
        &self,
        ctx: &dyn CallContext,
        filter: &FilterDescriptor,
        value: Value,
    ) -> DataLayerResult<Value> {
        match value {
            Value::Array(docs) => Ok(Value::Array(self.transform(ctx, filter, docs).await?)),
            doc @ Value::Object(_) => Ok(self
                .transform(ctx, filter, vec![doc])
                .await?
                .pop()
                .unwrap_or(Value::Null)),
            other => Ok(other),
        }
    }
}
