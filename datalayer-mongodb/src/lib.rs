//! MongoDB storage adapter for datalayer.
//!
//! This crate provides a MongoDB-based implementation of the `Adapter` trait, enabling
//! persistent storage with full query support using MongoDB's querying capabilities.
//!
//! To use this adapter, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! datalayer = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Features
//!
//! - **Persistent storage** - Data is persisted to MongoDB Atlas or self-hosted MongoDB
//! - **Native query execution** - Predicates, search and sorting run inside MongoDB
//! - **Async/await** - Fully asynchronous API built on MongoDB's async driver
//!
//! Text search without `searchFields` relies on a `$text` index on the collection.
//!
//! # Example
//!
//! ```ignore
//! use datalayer::{adapter::AdapterBuilder, mongodb::MongoAdapter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let posts = MongoAdapter::builder("mongodb://localhost:27017", "blog", "posts")
//!         .build()
//!         .await?;
//!     posts.connect().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod store;
mod query;

pub use store::{MongoAdapter, MongoAdapterBuilder};
