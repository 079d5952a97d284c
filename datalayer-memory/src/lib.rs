//! In-memory storage adapter for datalayer.
//!
//! This crate provides a thread-safe, in-memory implementation of the `Adapter` trait.
//! It uses async-aware read-write locks for concurrent access and is ideal for development,
//! testing, and small-scale deployments.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Shared stores** - Several collections, each behind its own adapter handle
//! - **Full query support** - Predicates, text search, multi-field sorting and windows
//!
//! # Quick Start
//!
//! ```ignore
//! use datalayer::prelude::*;
//! use datalayer::memory::MemoryStore;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MemoryStore::new();
//!     let users = DataAccessService::new(store.adapter("users"), CollectionSettings::builder("users").build());
//!     users.connect().await?;
//!
//!     users.create(&LocalBroker::new(), json!({ "name": "Alice" })).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod store;
mod evaluator;

pub use store::{MemoryAdapter, MemoryAdapterBuilder, MemoryStore};
