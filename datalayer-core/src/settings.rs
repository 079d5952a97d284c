//! Per-collection configuration.
//!
//! [`CollectionConfig`] is the serializable shape, loadable from TOML:
//!
//! ```toml
//! name = "posts"
//! id_field = "id"
//! fields = ["id", "title", "author", "tags"]
//! exclude_fields = ["internal"]
//! page_size = 20
//! max_page_size = 50
//! max_limit = 200
//!
//! [[populates]]
//! key = "author"
//! action = "users.get"
//! params = { fields = ["id", "name"] }
//! ```
//!
//! [`CollectionSettings`] is the resolved, read-only form handed to a service. Handler-based
//! population rules cannot be expressed in TOML and are attached through
//! [`CollectionSettingsBuilder::populate`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{collections::HashSet, path::Path};

use crate::{
    error::{DataLayerError, DataLayerResult},
    populate::{PopulationRule, PopulationRules},
};

pub const DEFAULT_ID_FIELD: &str = "_id";
pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const DEFAULT_MAX_PAGE_SIZE: usize = 100;

/// Serializable collection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    /// Collection name, also used as the action prefix by the local broker.
    pub name: String,
    /// Name of the primary-key field exposed to clients.
    pub id_field: String,
    /// Field allow-list. Empty means unrestricted.
    pub fields: Vec<String>,
    /// Paths always removed from outgoing documents.
    pub exclude_fields: Vec<String>,
    /// Default page size for `list`.
    pub page_size: usize,
    /// Upper bound for a requested page size.
    pub max_page_size: usize,
    /// Upper bound for `limit` on `find`; 0 disables the bound.
    pub max_limit: usize,
    /// Flatten nested update objects into dotted `$set` keys.
    pub use_dot_notation: bool,
    /// Action-based population rules, in resolution order.
    pub populates: Vec<PopulateConfig>,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            id_field: DEFAULT_ID_FIELD.to_string(),
            fields: Vec::new(),
            exclude_fields: Vec::new(),
            page_size: DEFAULT_PAGE_SIZE,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            max_limit: 0,
            use_dot_notation: false,
            populates: Vec::new(),
        }
    }
}

/// One `[[populates]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulateConfig {
    /// Target field the resolved value is written to.
    pub key: String,
    /// Remote action resolving ids to objects.
    pub action: String,
    /// Source field holding the id(s); defaults to `key`.
    #[serde(default)]
    pub field: Option<String>,
    /// Extra parameters merged into the remote call.
    #[serde(default)]
    pub params: Map<String, Value>,
    /// Child populate paths always forwarded to the remote call.
    #[serde(default)]
    pub populate: Vec<String>,
}

impl CollectionConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(source: &str) -> DataLayerResult<Self> {
        let config: CollectionConfig = toml::from_str(source)?;
        config.validate()?;

        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> DataLayerResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            DataLayerError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;

        Self::from_toml_str(&source)
    }

    /// Checks the invariants a service relies on.
    pub fn validate(&self) -> DataLayerResult<()> {
        if self.id_field.is_empty() {
            return Err(DataLayerError::Configuration("id_field must not be empty".into()));
        }
        if self.page_size == 0 || self.max_page_size == 0 {
            return Err(DataLayerError::Configuration(
                "page_size and max_page_size must be positive".into(),
            ));
        }

        let mut keys = HashSet::new();
        for rule in &self.populates {
            if rule.key.is_empty() || rule.action.is_empty() {
                return Err(DataLayerError::Configuration(
                    "populate rules need a key and an action".into(),
                ));
            }
            if !keys.insert(rule.key.as_str()) {
                return Err(DataLayerError::Configuration(format!(
                    "duplicate populate rule '{}'",
                    rule.key
                )));
            }
        }

        Ok(())
    }
}

/// Resolved, read-only collection settings shared by every request of a service.
#[derive(Debug, Clone)]
pub struct CollectionSettings {
    pub name: String,
    pub id_field: String,
    pub fields: Vec<String>,
    pub exclude_fields: Vec<String>,
    pub page_size: usize,
    pub max_page_size: usize,
    pub max_limit: usize,
    pub use_dot_notation: bool,
    pub populates: PopulationRules,
}

impl Default for CollectionSettings {
    fn default() -> Self {
        Self {
            name: String::new(),
            id_field: DEFAULT_ID_FIELD.to_string(),
            fields: Vec::new(),
            exclude_fields: Vec::new(),
            page_size: DEFAULT_PAGE_SIZE,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            max_limit: 0,
            use_dot_notation: false,
            populates: PopulationRules::default(),
        }
    }
}

impl CollectionSettings {
    /// Creates a builder for the named collection.
    pub fn builder(name: impl Into<String>) -> CollectionSettingsBuilder {
        CollectionSettingsBuilder::new(name)
    }

    /// Resolves a validated [`CollectionConfig`] into settings.
    pub fn from_config(config: CollectionConfig) -> DataLayerResult<Self> {
        config.validate()?;

        let mut populates = PopulationRules::default();
        for rule in config.populates {
            let mut resolved = PopulationRule::action(rule.action)
                .with_params(rule.params)
                .with_populate(rule.populate);
            if let Some(field) = rule.field {
                resolved = resolved.with_field(field);
            }
            populates.insert(rule.key, resolved);
        }

        Ok(Self {
            name: config.name,
            id_field: config.id_field,
            fields: config.fields,
            exclude_fields: config.exclude_fields,
            page_size: config.page_size,
            max_page_size: config.max_page_size,
            max_limit: config.max_limit,
            use_dot_notation: config.use_dot_notation,
            populates,
        })
    }
}

/// Builder for [`CollectionSettings`].
pub struct CollectionSettingsBuilder {
    settings: CollectionSettings,
}

impl CollectionSettingsBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            settings: CollectionSettings { name: name.into(), ..CollectionSettings::default() },
        }
    }

    pub fn id_field(mut self, id_field: impl Into<String>) -> Self {
        self.settings.id_field = id_field.into();
        self
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.settings.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn exclude_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.settings.exclude_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.settings.page_size = page_size;
        self
    }

    pub fn max_page_size(mut self, max_page_size: usize) -> Self {
        self.settings.max_page_size = max_page_size;
        self
    }

    pub fn max_limit(mut self, max_limit: usize) -> Self {
        self.settings.max_limit = max_limit;
        self
    }

    pub fn use_dot_notation(mut self, enabled: bool) -> Self {
        self.settings.use_dot_notation = enabled;
        self
    }

    /// Adds (or replaces) the population rule for `key`.
    pub fn populate(mut self, key: impl Into<String>, rule: PopulationRule) -> Self {
        self.settings.populates.insert(key, rule);
        self
    }

    pub fn build(self) -> CollectionSettings {
        self.settings
    }
}
