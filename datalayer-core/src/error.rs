//! Error types and result types for data-access operations.
//!
//! This module provides the error taxonomy shared by the filter normalizer, the document
//! pipeline, the population resolver and every storage adapter.
//! Use [`DataLayerResult<T>`] as the return type for fallible operations.

use serde::Serialize;
use serde_json::{Error as SerdeJsonError, Value};
use thiserror::Error;
use toml::de::Error as TomlError;

/// A single field-level violation reported by an entity validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    /// Dotted path of the offending field.
    pub field: String,
    /// Human readable description of the violation.
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field: field.into(), message: message.into() }
    }
}

/// Represents all possible errors that can occur when interacting with a data-access service.
///
/// Client-facing variants (`InvalidParameter`, `EntityNotFound`, `Validation`) carry enough
/// information to be surfaced directly; storage-side variants are propagated unchanged from
/// the adapter.
#[derive(Error, Debug)]
pub enum DataLayerError {
    /// Malformed request parameters (bad JSON in `query`, non-numeric pagination values, ...).
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    /// The targeted entity does not exist.
    #[error("Entity not found: {id}")]
    EntityNotFound {
        /// The id that failed to resolve, as supplied by the caller.
        id: Value,
    },
    /// The entity was rejected by the collection's validator before any write happened.
    #[error("Entity validation failed with {} violation(s)", .0.len())]
    Validation(Vec<FieldViolation>),
    /// An entity with the given id already exists.
    /// The first argument is the entity id, the second is the collection name.
    #[error("Entity {0} already exists in collection {1}")]
    EntityAlreadyExists(String, String),
    /// A remote population action is not registered with the broker.
    #[error("Action not found: {0}")]
    ActionNotFound(String),
    /// Serialization/deserialization error when converting between entity formats.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Invalid or unreadable collection configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// Error during adapter initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// An error occurred in the underlying storage adapter.
    #[error("Adapter error: {0}")]
    Adapter(String),
}

impl DataLayerError {
    /// Shorthand for an [`DataLayerError::EntityNotFound`] carrying `id`.
    pub fn not_found(id: impl Into<Value>) -> Self {
        DataLayerError::EntityNotFound { id: id.into() }
    }

    /// HTTP-equivalent status code a transport layer should surface for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            DataLayerError::InvalidParameter(_) => 400,
            DataLayerError::EntityNotFound { .. } | DataLayerError::ActionNotFound(_) => 404,
            DataLayerError::EntityAlreadyExists(..) => 409,
            DataLayerError::Validation(_) => 422,
            _ => 500,
        }
    }
}

/// A specialized `Result` type for data-access operations.
pub type DataLayerResult<T> = Result<T, DataLayerError>;

impl From<SerdeJsonError> for DataLayerError {
    fn from(err: SerdeJsonError) -> Self {
        DataLayerError::Serialization(err.to_string())
    }
}

impl From<TomlError> for DataLayerError {
    fn from(err: TomlError) -> Self {
        DataLayerError::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_errors_map_to_status_codes() {
        assert_eq!(DataLayerError::InvalidParameter("limit".into()).status_code(), 400);
        assert_eq!(DataLayerError::not_found(json!(5)).status_code(), 404);
        assert_eq!(
            DataLayerError::Validation(vec![FieldViolation::new("name", "required")]).status_code(),
            422
        );
        assert_eq!(DataLayerError::Adapter("down".into()).status_code(), 500);
    }

    #[test]
    fn not_found_message_carries_id() {
        let err = DataLayerError::not_found(json!("abc"));
        assert_eq!(err.to_string(), "Entity not found: \"abc\"");
    }
}
