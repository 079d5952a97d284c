//! Request parameter normalization.
//!
//! Callers hand over loosely typed parameters (numbers as strings, lists as comma separated
//! strings, predicates as JSON text). [`normalize`] turns them into a canonical
//! [`FilterDescriptor`] every adapter can consume without further parsing.
//!
//! ```ignore
//! use datalayer::filter::{normalize, FilterMode};
//! use serde_json::json;
//!
//! let filter = normalize(
//!     &json!({ "page": "2", "pageSize": "10", "sort": "-createdAt,title" }),
//!     &settings,
//!     FilterMode::Paginated,
//! )?;
//!
//! assert_eq!(filter.limit, Some(10));
//! assert_eq!(filter.offset, Some(10));
//! ```

use serde::Serialize;
use serde_json::{Map, Value};

use crate::{
    error::{DataLayerError, DataLayerResult},
    settings::CollectionSettings,
};

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

/// One entry of a sort specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortField {
    /// The dotted field path to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

impl SortField {
    /// Parses `name` (ascending) or `-name` (descending).
    pub fn parse(spec: &str) -> Self {
        match spec.strip_prefix('-') {
            Some(field) => SortField { field: field.to_string(), direction: SortDirection::Desc },
            None => SortField { field: spec.to_string(), direction: SortDirection::Asc },
        }
    }
}

/// Which operation the parameters are normalized for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    /// `find`, `count`, `get` and friends: `limit` is bounded by `max_limit`.
    Find,
    /// `list`: page and page size are always resolved and drive `limit`/`offset`.
    Paginated,
}

/// Canonical query descriptor.
///
/// Serializes back to the parameter names it was normalized from, so a descriptor can be
/// forwarded as raw parameters and normalized again without change.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterDescriptor {
    /// Backend predicate. Opaque to the pipeline, interpreted by the adapter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<Map<String, Value>>,
    /// Text-search term.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    /// Fields the search term is matched against.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_fields: Option<Vec<String>>,
    /// Sort specification, `-` prefix for descending.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    /// Requested projection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
    /// Requested exclusions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude_fields: Option<Vec<String>>,
    /// Requested population paths.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub populate: Option<Vec<String>>,
    /// 1-based page number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<usize>,
}

impl FilterDescriptor {
    /// Creates a builder for programmatic construction.
    pub fn builder() -> FilterBuilder {
        FilterBuilder::default()
    }

    /// Parsed sort specification, empty when unsorted.
    pub fn sort_fields(&self) -> Vec<SortField> {
        self.sort
            .iter()
            .flatten()
            .map(|spec| SortField::parse(spec))
            .collect()
    }

    /// The same filter without any row window, as used for counting.
    pub fn without_window(&self) -> Self {
        FilterDescriptor { limit: None, offset: None, ..self.clone() }
    }

    /// Requested population paths, empty when none.
    pub fn populate_paths(&self) -> &[String] {
        self.populate.as_deref().unwrap_or_default()
    }

    /// Converts the descriptor back into raw parameters.
    pub fn to_params(&self) -> DataLayerResult<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Fluent builder for [`FilterDescriptor`].
#[derive(Debug, Clone, Default)]
pub struct FilterBuilder {
    filter: FilterDescriptor,
}

impl FilterBuilder {
    pub fn query(mut self, query: Map<String, Value>) -> Self {
        self.filter.query = Some(query);
        self
    }

    pub fn search(mut self, search: impl Into<String>, fields: Vec<String>) -> Self {
        self.filter.search = Some(search.into());
        self.filter.search_fields = (!fields.is_empty()).then_some(fields);
        self
    }

    pub fn sort(mut self, sort: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.filter.sort = Some(sort.into_iter().map(Into::into).collect());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.filter.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.filter.offset = Some(offset);
        self
    }

    pub fn fields(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.filter.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn exclude_fields(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.filter.exclude_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn populate(mut self, paths: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.filter.populate = Some(paths.into_iter().map(Into::into).collect());
        self
    }

    pub fn build(self) -> FilterDescriptor {
        self.filter
    }
}

/// Normalizes raw request parameters into a [`FilterDescriptor`].
///
/// `raw` must be a JSON object (or null for "no parameters"). Unknown keys are ignored.
///
/// # Errors
///
/// Returns [`DataLayerError::InvalidParameter`] for non-numeric or negative window values,
/// a zero page or page size, malformed or non-object `query` JSON, and list values that are
/// neither strings nor sequences of strings.
pub fn normalize(
    raw: &Value,
    settings: &CollectionSettings,
    mode: FilterMode,
) -> DataLayerResult<FilterDescriptor> {
    let empty = Map::new();
    let params = match raw {
        Value::Object(map) => map,
        Value::Null => &empty,
        other => {
            return Err(DataLayerError::InvalidParameter(format!(
                "parameters must be an object, got {other}"
            )));
        }
    };

    let mut filter = FilterDescriptor {
        query: parse_query(params.get("query"))?,
        search: parse_search(params.get("search"))?,
        search_fields: parse_list("searchFields", params.get("searchFields"))?,
        sort: parse_list("sort", params.get("sort"))?,
        limit: parse_count("limit", params.get("limit"))?,
        offset: parse_count("offset", params.get("offset"))?,
        fields: parse_list("fields", params.get("fields"))?,
        exclude_fields: parse_list("excludeFields", params.get("excludeFields"))?,
        populate: parse_list("populate", params.get("populate"))?,
        page: parse_count("page", params.get("page"))?,
        page_size: parse_count("pageSize", params.get("pageSize"))?,
    };

    if mode == FilterMode::Paginated || filter.page_size.is_some() {
        let page = filter.page.unwrap_or(1);
        let requested = filter.page_size.unwrap_or(settings.page_size);

        if page == 0 {
            return Err(DataLayerError::InvalidParameter("page must be at least 1".into()));
        }
        if requested == 0 {
            return Err(DataLayerError::InvalidParameter("pageSize must be at least 1".into()));
        }

        let page_size = match settings.max_page_size {
            0 => requested,
            max => requested.min(max),
        };

        let offset = (page - 1)
            .checked_mul(page_size)
            .ok_or_else(|| DataLayerError::InvalidParameter("page is out of range".into()))?;

        filter.page = Some(page);
        filter.page_size = Some(page_size);
        filter.limit = Some(page_size);
        filter.offset = Some(offset);
    }

    if mode == FilterMode::Find && settings.max_limit > 0 {
        filter.limit = filter.limit.map(|limit| limit.min(settings.max_limit));
    }

    Ok(filter)
}

fn parse_count(name: &str, value: Option<&Value>) -> DataLayerResult<Option<usize>> {
    let invalid = || {
        DataLayerError::InvalidParameter(format!("{name} must be a non-negative integer"))
    };

    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => match number.as_u64() {
            Some(n) => usize::try_from(n).map(Some).map_err(|_| invalid()),
            None => match number.as_f64() {
                Some(f) if f >= 0.0 && f.fract() == 0.0 && f <= usize::MAX as f64 => {
                    Ok(Some(f as usize))
                }
                _ => Err(invalid()),
            },
        },
        Some(Value::String(text)) => {
            let text = text.trim();
            if text.is_empty() {
                return Ok(None);
            }
            text.parse::<usize>().map(Some).map_err(|_| invalid())
        }
        Some(_) => Err(invalid()),
    }
}

fn parse_list(name: &str, value: Option<&Value>) -> DataLayerResult<Option<Vec<String>>> {
    let list = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(text)) => text
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(text) => Ok(text.clone()),
                other => Err(DataLayerError::InvalidParameter(format!(
                    "{name} entries must be strings, got {other}"
                ))),
            })
            .collect::<DataLayerResult<Vec<_>>>()?,
        Some(other) => {
            return Err(DataLayerError::InvalidParameter(format!(
                "{name} must be a string or a list of strings, got {other}"
            )));
        }
    };

    Ok((!list.is_empty()).then_some(list))
}

fn parse_search(value: Option<&Value>) -> DataLayerResult<Option<String>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) if text.is_empty() => Ok(None),
        Some(Value::String(text)) => Ok(Some(text.clone())),
        Some(Value::Number(number)) => Ok(Some(number.to_string())),
        Some(other) => Err(DataLayerError::InvalidParameter(format!(
            "search must be a string, got {other}"
        ))),
    }
}

fn parse_query(value: Option<&Value>) -> DataLayerResult<Option<Map<String, Value>>> {
    let parsed = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(text)) => serde_json::from_str::<Value>(text).map_err(|e| {
            DataLayerError::InvalidParameter(format!("query is not valid JSON: {e}"))
        })?,
        Some(other) => other.clone(),
    };

    match parsed {
        Value::Object(map) => Ok(Some(map)),
        Value::Null => Ok(None),
        other => Err(DataLayerError::InvalidParameter(format!(
            "query must be an object, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings() -> CollectionSettings {
        CollectionSettings::builder("posts")
            .page_size(10)
            .max_page_size(50)
            .max_limit(100)
            .build()
    }

    #[test]
    fn coerces_strings_and_splits_lists() {
        let filter = normalize(
            &json!({
                "limit": "5",
                "offset": 10,
                "sort": "-votes, title",
                "fields": "id title  author.name",
                "populate": ["author"],
                "searchFields": "title,content",
                "search": "rust",
                "query": "{\"status\":\"published\"}",
            }),
            &settings(),
            FilterMode::Find,
        )
        .unwrap();

        assert_eq!(filter.limit, Some(5));
        assert_eq!(filter.offset, Some(10));
        assert_eq!(filter.sort, Some(vec!["-votes".to_string(), "title".to_string()]));
        assert_eq!(
            filter.fields,
            Some(vec!["id".to_string(), "title".to_string(), "author.name".to_string()])
        );
        assert_eq!(filter.populate, Some(vec!["author".to_string()]));
        assert_eq!(filter.search.as_deref(), Some("rust"));
        assert_eq!(filter.query.unwrap().get("status"), Some(&json!("published")));
        assert_eq!(filter.page, None);
    }

    #[test]
    fn rejects_malformed_values() {
        let s = settings();

        for raw in [
            json!({ "limit": "ten" }),
            json!({ "offset": -1 }),
            json!({ "page": 1.5 }),
            json!({ "query": "{not json" }),
            json!({ "query": "[1,2]" }),
            json!({ "fields": [1, 2] }),
            json!({ "sort": true }),
            json!("nope"),
        ] {
            assert!(
                matches!(normalize(&raw, &s, FilterMode::Find), Err(DataLayerError::InvalidParameter(_))),
                "expected rejection of {raw}"
            );
        }
    }

    #[test]
    fn paginated_mode_derives_window() {
        let filter =
            normalize(&json!({ "page": "3", "pageSize": "20" }), &settings(), FilterMode::Paginated)
                .unwrap();

        assert_eq!(filter.page, Some(3));
        assert_eq!(filter.page_size, Some(20));
        assert_eq!(filter.limit, Some(20));
        assert_eq!(filter.offset, Some(40));
    }

    #[test]
    fn paginated_mode_applies_defaults_and_clamps() {
        let defaults = normalize(&Value::Null, &settings(), FilterMode::Paginated).unwrap();
        assert_eq!((defaults.page, defaults.page_size), (Some(1), Some(10)));
        assert_eq!((defaults.limit, defaults.offset), (Some(10), Some(0)));

        let clamped =
            normalize(&json!({ "pageSize": 500 }), &settings(), FilterMode::Paginated).unwrap();
        assert_eq!(clamped.page_size, Some(50));
        assert_eq!(clamped.limit, Some(50));

        assert!(normalize(&json!({ "page": 0 }), &settings(), FilterMode::Paginated).is_err());
        assert!(normalize(&json!({ "pageSize": 0 }), &settings(), FilterMode::Paginated).is_err());
    }

    #[test]
    fn find_mode_clamps_limit_to_max_limit() {
        let filter = normalize(&json!({ "limit": 1000 }), &settings(), FilterMode::Find).unwrap();
        assert_eq!(filter.limit, Some(100));

        let unbounded = CollectionSettings::default();
        let filter = normalize(&json!({ "limit": 1000 }), &unbounded, FilterMode::Find).unwrap();
        assert_eq!(filter.limit, Some(1000));
    }

    #[test]
    fn pages_past_the_addressable_range_are_rejected() {
        let error = normalize(
            &json!({ "page": usize::MAX.to_string(), "pageSize": 10 }),
            &CollectionSettings::default(),
            FilterMode::Paginated,
        )
        .unwrap_err();
        assert!(matches!(error, DataLayerError::InvalidParameter(message) if message == "page is out of range"));

        let last = normalize(
            &json!({ "page": (usize::MAX / 10 + 1).to_string(), "pageSize": 10 }),
            &CollectionSettings::default(),
            FilterMode::Paginated,
        )
        .unwrap();
        assert_eq!(last.offset, Some(usize::MAX / 10 * 10));
    }

    #[test]
    fn normalization_is_idempotent() {
        let s = settings();
        let inputs = [
            (json!({ "limit": "7", "sort": "a b", "query": "{\"x\":1}" }), FilterMode::Find),
            (json!({ "limit": 5000, "fields": "a,b.c" }), FilterMode::Find),
            (json!({ "page": "2", "pageSize": 999, "populate": "author" }), FilterMode::Paginated),
            (json!({ "search": "term", "searchFields": ["title"] }), FilterMode::Paginated),
        ];

        for (raw, mode) in inputs {
            let once = normalize(&raw, &s, mode).unwrap();
            let twice = normalize(&once.to_params().unwrap(), &s, mode).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn sort_fields_parse_direction_prefix() {
        let filter = FilterDescriptor::builder().sort(["-votes", "title"]).build();

        assert_eq!(
            filter.sort_fields(),
            vec![
                SortField { field: "votes".into(), direction: SortDirection::Desc },
                SortField { field: "title".into(), direction: SortDirection::Asc },
            ]
        );
    }

    #[test]
    fn empty_lists_normalize_to_absent() {
        let filter =
            normalize(&json!({ "fields": "", "populate": [] }), &settings(), FilterMode::Find)
                .unwrap();

        assert_eq!(filter.fields, None);
        assert_eq!(filter.populate, None);
    }
}
