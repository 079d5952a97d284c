//! A uniform CRUD, query and population layer over pluggable JSON document backends.
//!
//! This crate is the core of the datalayer project and provides:
//!
//! - **Adapter abstraction** ([`adapter`]) - The contract every storage backend implements
//! - **Request normalization** ([`filter`]) - Loose request parameters to a canonical descriptor
//! - **Predicates** ([`query`]) - JSON predicates parsed into an expression tree and a visitor
//! - **Field authorization** ([`authorize`]) - Allow-list resolution for requested fields
//! - **Document shaping** ([`transform`]) - Id encoding, projection with `$` wildcards, exclusion
//! - **Population** ([`populate`]) - Batched cross-collection reference resolution
//! - **Pagination** ([`page`]) - The `list` envelope
//! - **Services** ([`service`]) - The request-facing operations tying it all together
//! - **Configuration** ([`settings`]) - Per-collection settings, loadable from TOML
//! - **Error handling** ([`error`]) - Error types and result types
//!
//! # Example
//!
//! ```ignore
//! use datalayer::prelude::*;
//! use serde_json::json;
//!
//! let settings = CollectionSettings::builder("posts")
//!     .id_field("id")
//!     .populate("author", PopulationRule::action("users.get"))
//!     .build();
//!
//! let posts = DataAccessService::new(adapter, settings);
//! let rows = posts.find(&ctx, &json!({ "populate": "author", "limit": 10 })).await?;
//! ```

pub mod adapter;
pub mod authorize;
pub mod broker;
pub mod context;
pub mod error;
pub mod filter;
pub mod hooks;
pub mod page;
pub mod path;
pub mod populate;
pub mod query;
pub mod service;
pub mod settings;
pub mod transform;
