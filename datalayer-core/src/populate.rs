//! Cross-collection population.
//!
//! A collection declares [`PopulationRule`]s keyed by the field that receives the resolved
//! value. When a request asks for `populate: ["author", "comments.author"]`, the
//! [`PopulationResolver`] groups the paths by rule, collects the referenced ids from every
//! document of the batch, issues one lookup per rule and splices the answers back.
//!
//! Paths below a rule key (`author.group` under `author`) are not resolved here. They are
//! forwarded, prefix stripped, as the `populate` parameter of the remote call so the owning
//! collection resolves them with its own rules.

use async_trait::async_trait;
use futures::future::try_join_all;
use serde_json::{Map, Value};
use std::{fmt, sync::Arc};
use tracing::{debug, warn};

use crate::{
    context::CallContext,
    error::{DataLayerError, DataLayerResult},
    path,
};

/// Custom population logic that does not go through a remote action.
///
/// The handler receives the deduplicated ids collected from the rule's source field and the
/// whole batch, and writes its results onto the documents itself.
#[async_trait]
pub trait PopulateHandler: Send + Sync {
    async fn populate(
        &self,
        ids: &[Value],
        docs: &mut [Value],
        rule: &PopulationRule,
        ctx: &dyn CallContext,
    ) -> DataLayerResult<()>;
}

/// How one target field is populated.
#[derive(Clone)]
pub enum PopulationRule {
    /// Resolve ids through a remote action returning an id → object mapping.
    Action {
        /// Source field holding an id or a list of ids.
        field: String,
        /// Action name, e.g. `users.get`.
        action: String,
        /// Extra parameters merged over the generated ones.
        params: Map<String, Value>,
        /// Child populate paths always forwarded to the action.
        populate: Vec<String>,
    },
    /// Resolve through custom code.
    Handler {
        /// Source field holding an id or a list of ids.
        field: String,
        handler: Arc<dyn PopulateHandler>,
    },
}

impl PopulationRule {
    /// Creates an action rule. The source field defaults to the rule key.
    pub fn action(action: impl Into<String>) -> Self {
        PopulationRule::Action {
            field: String::new(),
            action: action.into(),
            params: Map::new(),
            populate: Vec::new(),
        }
    }

    /// Creates a handler rule. The source field defaults to the rule key.
    pub fn handler(handler: impl PopulateHandler + 'static) -> Self {
        PopulationRule::Handler { field: String::new(), handler: Arc::new(handler) }
    }

    pub fn with_field(mut self, source: impl Into<String>) -> Self {
        match &mut self {
            PopulationRule::Action { field, .. } | PopulationRule::Handler { field, .. } => {
                *field = source.into();
            }
        }
        self
    }

    /// Sets extra call parameters. Ignored for handler rules.
    pub fn with_params(mut self, extra: Map<String, Value>) -> Self {
        if let PopulationRule::Action { params, .. } = &mut self {
            *params = extra;
        }
        self
    }

    /// Sets child populate paths always forwarded to the action. Ignored for handler rules.
    pub fn with_populate(mut self, paths: Vec<String>) -> Self {
        if let PopulationRule::Action { populate, .. } = &mut self {
            *populate = paths;
        }
        self
    }

    /// The source field holding the id(s).
    pub fn field(&self) -> &str {
        match self {
            PopulationRule::Action { field, .. } | PopulationRule::Handler { field, .. } => field,
        }
    }
}

impl fmt::Debug for PopulationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PopulationRule::Action { field, action, params, populate } => f
                .debug_struct("Action")
                .field("field", field)
                .field("action", action)
                .field("params", params)
                .field("populate", populate)
                .finish(),
            PopulationRule::Handler { field, .. } => {
                f.debug_struct("Handler").field("field", field).finish_non_exhaustive()
            }
        }
    }
}

/// Ordered set of population rules keyed by target field.
#[derive(Debug, Clone, Default)]
pub struct PopulationRules {
    rules: Vec<(String, PopulationRule)>,
}

impl PopulationRules {
    /// Adds a rule, replacing any rule with the same key in place. An empty source field is
    /// resolved to `key`.
    pub fn insert(&mut self, key: impl Into<String>, rule: PopulationRule) {
        let key = key.into();
        let rule = if rule.field().is_empty() { rule.with_field(key.clone()) } else { rule };

        match self.rules.iter_mut().find(|(existing, _)| *existing == key) {
            Some(slot) => slot.1 = rule,
            None => self.rules.push((key, rule)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&PopulationRule> {
        self.rules
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, rule)| rule)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PopulationRule)> {
        self.rules.iter().map(|(key, rule)| (key.as_str(), rule))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// A rule selected by the requested paths, with its child paths.
#[derive(Debug)]
struct Plan<'a> {
    key: &'a str,
    rule: &'a PopulationRule,
    children: Vec<String>,
    ids: Vec<Value>,
}

/// Resolves populate paths against a collection's rules.
#[derive(Debug, Clone, Copy)]
pub struct PopulationResolver<'a> {
    rules: &'a PopulationRules,
}

impl<'a> PopulationResolver<'a> {
    pub fn new(rules: &'a PopulationRules) -> Self {
        Self { rules }
    }

    /// Groups `paths` by the longest matching rule key, in rule order.
    ///
    /// Each entry carries the rule key and the child paths relative to it. Paths matching no
    /// rule are dropped.
    pub fn group(&self, paths: &[String]) -> Vec<(&'a str, Vec<String>)> {
        let mut groups: Vec<(&'a str, Vec<String>)> = Vec::new();

        for path in paths {
            let matched = self
                .rules
                .keys()
                .filter(|key| path == key || path.starts_with(&format!("{key}.")))
                .max_by_key(|key| key.len());

            let Some(key) = matched else {
                warn!(path = %path, "no population rule matches requested path");
                continue;
            };

            let child = path[key.len()..].trim_start_matches('.');
            let index = match groups.iter().position(|(existing, _)| *existing == key) {
                Some(index) => index,
                None => {
                    groups.push((key, Vec::new()));
                    groups.len() - 1
                }
            };

            if !child.is_empty() && !groups[index].1.iter().any(|c| c == child) {
                groups[index].1.push(child.to_string());
            }
        }

        let order = self.rules.keys().collect::<Vec<_>>();
        groups.sort_by_key(|(key, _)| order.iter().position(|k| k == key));
        groups
    }

    /// Populates `docs` in place.
    ///
    /// Lookups for different rules run concurrently; results are spliced in rule order. The
    /// first failing lookup or handler fails the whole call.
    pub async fn populate(
        &self,
        ctx: &dyn CallContext,
        docs: &mut [Value],
        paths: &[String],
    ) -> DataLayerResult<()> {
        if self.rules.is_empty() || paths.is_empty() || docs.is_empty() {
            return Ok(());
        }

        let plans = self
            .group(paths)
            .into_iter()
            .filter_map(|(key, children)| {
                let rule = self.rules.get(key)?;
                let ids = collect_ids(docs, rule.field());
                Some(Plan { key, rule, children, ids })
            })
            .collect::<Vec<_>>();

        let lookups = plans
            .iter()
            .enumerate()
            .filter_map(|(index, plan)| match plan.rule {
                PopulationRule::Action { action, params, populate, .. } if !plan.ids.is_empty() => {
                    let call_params = lookup_params(&plan.ids, &plan.children, populate, params);
                    Some(async move {
                        debug!(action = %action, ids = plan.ids.len(), key = plan.key, "population lookup");
                        let response = ctx.call(action, call_params).await?;
                        match response {
                            Value::Object(mapping) => Ok((index, mapping)),
                            other => Err(DataLayerError::Serialization(format!(
                                "action {action} returned a non-mapping response: {other}"
                            ))),
                        }
                    })
                }
                _ => None,
            });

        let mut responses = try_join_all(lookups).await?;

        for (index, plan) in plans.iter().enumerate() {
            match plan.rule {
                PopulationRule::Handler { handler, .. } => {
                    handler
                        .populate(&plan.ids, docs, plan.rule, ctx)
                        .await?;
                }
                PopulationRule::Action { field, .. } => {
                    if let Some(position) = responses.iter().position(|(i, _)| *i == index) {
                        let (_, mapping) = responses.swap_remove(position);
                        splice(docs, plan.key, field, &mapping);
                    }
                }
            }
        }

        Ok(())
    }

    /// Populates a single document or an array of documents; any other value is left as is.
    pub async fn populate_value(
        &self,
        ctx: &dyn CallContext,
        docs: &mut Value,
        paths: &[String],
    ) -> DataLayerResult<()> {
        match docs {
            Value::Array(items) => self.populate(ctx, items, paths).await,
            Value::Object(_) => {
                self.populate(ctx, std::slice::from_mut(docs), paths)
                    .await
            }
            _ => Ok(()),
        }
    }
}

/// String key under which `id` appears in a mapping response.
pub fn id_key(id: &Value) -> String {
    match id {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn collect_ids(docs: &[Value], field: &str) -> Vec<Value> {
    fn flatten_into(value: &Value, ids: &mut Vec<Value>) {
        match value {
            Value::Null => {}
            Value::Array(items) => items
                .iter()
                .for_each(|item| flatten_into(item, ids)),
            other => {
                if !ids.contains(other) {
                    ids.push(other.clone());
                }
            }
        }
    }

    let mut ids = Vec::new();
    for doc in docs {
        if let Some(value) = path::get(doc, field) {
            flatten_into(value, &mut ids);
        }
    }

    ids
}

fn lookup_params(
    ids: &[Value],
    children: &[String],
    rule_populate: &[String],
    extra: &Map<String, Value>,
) -> Value {
    let mut params = Map::new();
    params.insert("id".into(), Value::Array(ids.to_vec()));
    params.insert("mapping".into(), Value::Bool(true));

    let populate = children
        .iter()
        .chain(rule_populate)
        .map(|path| Value::String(path.clone()))
        .collect::<Vec<_>>();
    if !populate.is_empty() {
        params.insert("populate".into(), Value::Array(populate));
    }

    for (key, value) in extra {
        params.insert(key.clone(), value.clone());
    }

    Value::Object(params)
}

fn splice(docs: &mut [Value], key: &str, field: &str, mapping: &Map<String, Value>) {
    for doc in docs.iter_mut() {
        let resolved = match path::get(doc, field) {
            None => continue,
            Some(Value::Array(ids)) => Value::Array(
                ids.iter()
                    .filter_map(|id| mapping.get(&id_key(id)).cloned())
                    .collect(),
            ),
            Some(id) => match mapping.get(&id_key(id)) {
                Some(found) => found.clone(),
                None => {
                    // Unresolved single ids leave no key behind.
                    path::unset(doc, key);
                    continue;
                }
            },
        };

        path::set(doc, key, resolved);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::{collections::HashMap, sync::Mutex};

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(String, Value)>>,
        responses: HashMap<String, Value>,
    }

    impl Recorder {
        fn with(mut self, action: &str, response: Value) -> Self {
            self.responses.insert(action.to_string(), response);
            self
        }

        fn calls(&self) -> Vec<(String, Value)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CallContext for Recorder {
        async fn call(&self, action: &str, params: Value) -> DataLayerResult<Value> {
            self.calls
                .lock()
                .unwrap()
                .push((action.to_string(), params));
            self.responses
                .get(action)
                .cloned()
                .ok_or_else(|| DataLayerError::ActionNotFound(action.to_string()))
        }
    }

    fn paths(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn rules(entries: Vec<(&str, PopulationRule)>) -> PopulationRules {
        let mut rules = PopulationRules::default();
        for (key, rule) in entries {
            rules.insert(key, rule);
        }
        rules
    }

    #[tokio::test]
    async fn resolves_single_ids_with_one_call() {
        let rules = rules(vec![("author", PopulationRule::action("users.get"))]);
        let ctx = Recorder::default().with(
            "users.get",
            json!({ "3": { "name": "A" }, "5": { "name": "B" } }),
        );
        let mut docs = vec![json!({ "_id": 1, "author": 3 }), json!({ "_id": 2, "author": 5 })];

        PopulationResolver::new(&rules)
            .populate(&ctx, &mut docs, &paths(&["author"]))
            .await
            .unwrap();

        assert_eq!(
            docs,
            vec![
                json!({ "_id": 1, "author": { "name": "A" } }),
                json!({ "_id": 2, "author": { "name": "B" } }),
            ]
        );
        assert_eq!(
            ctx.calls(),
            vec![("users.get".to_string(), json!({ "id": [3, 5], "mapping": true }))]
        );
    }

    #[tokio::test]
    async fn deduplicates_ids_across_the_batch() {
        let rules = rules(vec![("author", PopulationRule::action("users.get"))]);
        let ctx = Recorder::default().with("users.get", json!({ "7": { "n": 7 } }));
        let mut docs = (0..10)
            .map(|i| json!({ "_id": i, "author": if i % 3 == 0 { json!(null) } else { json!(7) } }))
            .collect::<Vec<_>>();

        PopulationResolver::new(&rules)
            .populate(&ctx, &mut docs, &paths(&["author"]))
            .await
            .unwrap();

        let calls = ctx.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1["id"], json!([7]));
        assert_eq!(docs[1]["author"], json!({ "n": 7 }));
        assert_eq!(docs[0]["author"], Value::Null);
    }

    #[tokio::test]
    async fn id_lists_are_compacted_and_missing_single_ids_leave_no_key() {
        let rules = rules(vec![
            ("tags", PopulationRule::action("tags.get")),
            ("owner", PopulationRule::action("users.get").with_field("owner_id")),
        ]);
        let ctx = Recorder::default()
            .with("tags.get", json!({ "a": "A", "c": "C" }))
            .with("users.get", json!({}));
        let mut docs = vec![json!({ "tags": ["a", "b", "c"], "owner_id": 9 })];

        PopulationResolver::new(&rules)
            .populate(&ctx, &mut docs, &paths(&["tags", "owner"]))
            .await
            .unwrap();

        assert_eq!(docs[0], json!({ "tags": ["A", "C"], "owner_id": 9 }));
    }

    #[tokio::test]
    async fn unresolved_ids_drop_the_key_they_were_stored_under() {
        let rules = rules(vec![("author", PopulationRule::action("users.get"))]);
        let ctx = Recorder::default().with("users.get", json!({ "1": { "name": "x" } }));
        let mut docs = vec![json!({ "_id": 1, "author": 1 }), json!({ "_id": 2, "author": 2 })];

        PopulationResolver::new(&rules)
            .populate(&ctx, &mut docs, &paths(&["author"]))
            .await
            .unwrap();

        assert_eq!(docs, vec![json!({ "_id": 1, "author": { "name": "x" } }), json!({ "_id": 2 })]);
        assert_eq!(serde_json::to_string(&docs[1]).unwrap(), r#"{"_id":2}"#);
    }

    #[tokio::test]
    async fn child_paths_are_forwarded_with_prefix_stripped() {
        let mut extra = Map::new();
        extra.insert("fields".into(), json!(["name", "group"]));
        let rules = rules(vec![(
            "author",
            PopulationRule::action("users.get")
                .with_params(extra)
                .with_populate(paths(&["avatar"])),
        )]);
        let ctx = Recorder::default().with("users.get", json!({ "1": { "name": "x" } }));
        let mut docs = vec![json!({ "author": 1 })];

        PopulationResolver::new(&rules)
            .populate(&ctx, &mut docs, &paths(&["author.group", "author.group", "author"]))
            .await
            .unwrap();

        assert_eq!(
            ctx.calls()[0].1,
            json!({
                "id": [1],
                "mapping": true,
                "populate": ["group", "avatar"],
                "fields": ["name", "group"],
            })
        );
    }

    #[tokio::test]
    async fn unmatched_paths_and_empty_id_lists_issue_no_calls() {
        let rules = rules(vec![("author", PopulationRule::action("users.get"))]);
        let ctx = Recorder::default();
        let mut docs = vec![json!({ "title": "no author" })];

        PopulationResolver::new(&rules)
            .populate(&ctx, &mut docs, &paths(&["author", "editor", "auth"]))
            .await
            .unwrap();

        assert!(ctx.calls().is_empty());
        assert_eq!(docs[0], json!({ "title": "no author" }));
    }

    #[test]
    fn groups_by_longest_matching_key_in_rule_order() {
        let rules = rules(vec![
            ("author", PopulationRule::action("users.get")),
            ("author.profile", PopulationRule::action("profiles.get")),
            ("editor", PopulationRule::action("users.get")),
        ]);

        let groups = PopulationResolver::new(&rules)
            .group(&paths(&["editor", "author.profile.avatar", "author.group", "unknown"]));

        assert_eq!(
            groups,
            vec![
                ("author", paths(&["group"])),
                ("author.profile", paths(&["avatar"])),
                ("editor", vec![]),
            ]
        );
    }

    struct Counter;

    #[async_trait]
    impl PopulateHandler for Counter {
        async fn populate(
            &self,
            ids: &[Value],
            docs: &mut [Value],
            _rule: &PopulationRule,
            _ctx: &dyn CallContext,
        ) -> DataLayerResult<()> {
            for doc in docs.iter_mut() {
                path::set(doc, "likes", json!(ids.len()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn handler_rules_write_results_themselves() {
        let rules = rules(vec![("likes", PopulationRule::handler(Counter).with_field("liked_by"))]);
        let ctx = Recorder::default();
        let mut docs = vec![json!({ "liked_by": [1, 2] }), json!({ "liked_by": [2, 3] })];

        PopulationResolver::new(&rules)
            .populate(&ctx, &mut docs, &paths(&["likes"]))
            .await
            .unwrap();

        assert!(ctx.calls().is_empty());
        assert_eq!(docs[0]["likes"], json!(3));
        assert_eq!(docs[1]["likes"], json!(3));
    }

    #[tokio::test]
    async fn failed_lookup_fails_the_whole_population() {
        let rules = rules(vec![
            ("author", PopulationRule::action("users.get")),
            ("category", PopulationRule::action("categories.get")),
        ]);
        let ctx = Recorder::default().with("users.get", json!({ "1": {} }));
        let mut docs = vec![json!({ "author": 1, "category": 2 })];

        let result = PopulationResolver::new(&rules)
            .populate(&ctx, &mut docs, &paths(&["author", "category"]))
            .await;

        assert!(matches!(result, Err(DataLayerError::ActionNotFound(action)) if action == "categories.get"));
        assert_eq!(docs[0], json!({ "author": 1, "category": 2 }));
    }

    #[tokio::test]
    async fn populate_value_preserves_shape() {
        let rules = rules(vec![("author", PopulationRule::action("users.get"))]);
        let ctx = Recorder::default().with("users.get", json!({ "1": "one" }));
        let resolver = PopulationResolver::new(&rules);

        let mut single = json!({ "author": 1 });
        resolver.populate_value(&ctx, &mut single, &paths(&["author"])).await.unwrap();
        assert_eq!(single, json!({ "author": "one" }));

        let mut scalar = json!(42);
        resolver.populate_value(&ctx, &mut scalar, &paths(&["author"])).await.unwrap();
        assert_eq!(scalar, json!(42));
    }
}
