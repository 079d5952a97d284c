//! Pluggable per-service behaviour: ID encoding, entity validation and change notification.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Debug;

use crate::{
    context::CallContext,
    error::{DataLayerResult, FieldViolation},
};

/// Translates between internal storage ids and the ids exposed to clients.
///
/// `encode` is applied to every outgoing id; `decode` to every id a client sends to `get`,
/// `update` or `remove`. The default [`PlainIds`] passes ids through untouched.
pub trait IdCodec: Send + Sync + Debug {
    fn encode(&self, id: &Value) -> Value;

    fn decode(&self, id: &Value) -> DataLayerResult<Value>;
}

/// Identity [`IdCodec`].
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainIds;

impl IdCodec for PlainIds {
    fn encode(&self, id: &Value) -> Value {
        id.clone()
    }

    fn decode(&self, id: &Value) -> DataLayerResult<Value> {
        Ok(id.clone())
    }
}

/// Checks an entity before it is written.
///
/// Any `Fn(&Value) -> Result<(), Vec<FieldViolation>>` closure is a validator.
pub trait EntityValidator: Send + Sync {
    fn validate(&self, entity: &Value) -> Result<(), Vec<FieldViolation>>;
}

impl<F> EntityValidator for F
where
    F: Fn(&Value) -> Result<(), Vec<FieldViolation>> + Send + Sync,
{
    fn validate(&self, entity: &Value) -> Result<(), Vec<FieldViolation>> {
        self(entity)
    }
}

/// Kind of change reported to an [`EntityListener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityEvent {
    Created,
    Updated,
    Removed,
}

/// Receives every successful write, after the entity has been transformed for clients.
///
/// For bulk writes `entity` is an array; after `clear` it is the number of removed entities.
#[async_trait]
pub trait EntityListener: Send + Sync {
    async fn entity_changed(
        &self,
        event: EntityEvent,
        entity: &Value,
        ctx: &dyn CallContext,
    ) -> DataLayerResult<()>;
}
