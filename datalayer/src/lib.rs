//! Main datalayer crate providing uniform data access over pluggable storage adapters.
//!
//! This crate is the primary entry point for users of the datalayer framework.
//! It re-exports the core types and functionality from the sub-crates and provides
//! convenient access to the bundled storage adapters.
//!
//! # Features
//!
//! - **One contract, many backends** - In-memory and MongoDB adapters behind the same trait
//! - **Forgiving parameters** - Strings, lists and JSON text normalized into one descriptor
//! - **Safe projections** - Field allow-lists, `$` wildcard projections and exclusions
//! - **Population** - Cross-collection references resolved with one lookup per rule
//!
//! # Quick Start
//!
//! ```ignore
//! use datalayer::{prelude::*, memory::MemoryStore};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> DataLayerResult<()> {
//!     let store = MemoryStore::new();
//!
//!     let users = DataAccessService::new(
//!         store.adapter("users"),
//!         CollectionSettings::builder("users").fields(["_id", "name"]).build(),
//!     );
//!     let posts = DataAccessService::new(
//!         store.adapter("posts"),
//!         CollectionSettings::builder("posts")
//!             .populate("author", PopulationRule::action("users.get"))
//!             .build(),
//!     );
//!
//!     let broker = LocalBroker::new().with_handler(users).with_handler(posts);
//!
//!     let alice = broker.call("users.create", json!({ "name": "Alice" })).await?;
//!     broker.call("posts.create", json!({ "title": "Hello", "author": alice["_id"] })).await?;
//!
//!     let page = broker
//!         .call("posts.list", json!({ "populate": "author", "pageSize": 20 }))
//!         .await?;
//!
//!     println!("{page}");
//!     Ok(())
//! }
//! ```
//!
//! # Configuration
//!
//! Collection settings can be loaded from TOML:
//!
//! ```ignore
//! let config = CollectionConfig::from_file("config/posts.toml")?;
//! let settings = CollectionSettings::from_config(config)?;
//! ```
//!
//! # Adapters
//!
//! - [`memory`] - Fast in-memory storage for development and testing
//! - [`mongodb`] - Persistent MongoDB adapter (requires `mongodb` feature)

pub mod prelude;

pub use datalayer_core::{
    adapter, authorize, broker, context, error, filter, hooks, page, path, populate, query,
    service, settings, transform,
};

/// In-memory storage adapter.
pub mod memory {
    pub use datalayer_memory::{MemoryAdapter, MemoryAdapterBuilder, MemoryStore};
}

/// MongoDB storage adapter.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use datalayer_mongodb::{MongoAdapter, MongoAdapterBuilder};
}
