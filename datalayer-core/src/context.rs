//! Request context used to reach other collections.
//!
//! Population never talks to another collection's storage directly. It issues a named action
//! call through the [`CallContext`] of the current request, which a transport layer (or the
//! in-process [`LocalBroker`](crate::broker::LocalBroker)) routes to the owning service.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::DataLayerResult;

/// Explicit per-request context passed through the whole pipeline.
///
/// # Remote call contract
///
/// Population calls `action` with `{ "id": [...], "mapping": true, "populate"?: [...], ...extra }`
/// and expects a JSON object mapping each found id (as a string key) to its resolved value.
/// Unknown ids must simply be absent from the mapping.
#[async_trait]
pub trait CallContext: Send + Sync {
    /// Invokes a named action with JSON parameters.
    async fn call(&self, action: &str, params: Value) -> DataLayerResult<Value>;
}

#[async_trait]
impl<C> CallContext for &C
where
    C: CallContext + ?Sized,
{
    async fn call(&self, action: &str, params: Value) -> DataLayerResult<Value> {
        (**self).call(action, params).await
    }
}

#[async_trait]
impl<C> CallContext for std::sync::Arc<C>
where
    C: CallContext + ?Sized,
{
    async fn call(&self, action: &str, params: Value) -> DataLayerResult<Value> {
        (**self).call(action, params).await
    }
}
