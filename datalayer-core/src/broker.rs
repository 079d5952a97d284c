//! In-process action routing.
//!
//! [`LocalBroker`] is a [`CallContext`] that resolves `"<collection>.<operation>"` action names
//! to services registered in the same process. It is what lets one collection populate from
//! another, and through it from a third, without any transport in between.
//!
//! ```ignore
//! let broker = LocalBroker::new()
//!     .with_handler(users_service)
//!     .with_handler(posts_service);
//!
//! let posts = broker.call("posts.find", json!({ "populate": ["author.group"] })).await?;
//! ```

use async_trait::async_trait;
use serde_json::Value;
use std::{collections::HashMap, fmt, sync::Arc};
use tracing::debug;

use crate::{
    context::CallContext,
    error::{DataLayerError, DataLayerResult},
};

/// A named target of broker calls.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Action prefix this handler answers to.
    fn name(&self) -> &str;

    /// Runs `operation` with raw `params`. `ctx` is the context further calls go through.
    async fn dispatch(
        &self,
        ctx: &dyn CallContext,
        operation: &str,
        params: Value,
    ) -> DataLayerResult<Value>;
}

#[derive(Default, Clone)]
pub struct LocalBroker {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl LocalBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under its name, replacing any previous handler of that name.
    pub fn register(&mut self, handler: impl ActionHandler + 'static) {
        self.register_shared(Arc::new(handler));
    }

    pub fn register_shared(&mut self, handler: Arc<dyn ActionHandler>) {
        self.handlers
            .insert(handler.name().to_string(), handler);
    }

    pub fn with_handler(mut self, handler: impl ActionHandler + 'static) -> Self {
        self.register(handler);
        self
    }

    pub fn handler(&self, name: &str) -> Option<&Arc<dyn ActionHandler>> {
        self.handlers.get(name)
    }
}

impl fmt::Debug for LocalBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalBroker")
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[async_trait]
impl CallContext for LocalBroker {
    async fn call(&self, action: &str, params: Value) -> DataLayerResult<Value> {
        let (name, operation) = action
            .rsplit_once('.')
            .ok_or_else(|| DataLayerError::ActionNotFound(action.to_string()))?;
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| DataLayerError::ActionNotFound(action.to_string()))?;

        debug!(action = %action, "dispatching local call");
        handler.dispatch(self, operation, params).await
    }
}
