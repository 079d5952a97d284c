use async_trait::async_trait;
use datalayer::{memory::MemoryAdapter, prelude::*};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

async fn seeded(collection: &str, rows: Vec<Value>) -> MemoryAdapter {
    MemoryAdapter::builder(collection)
        .seed(rows)
        .build()
        .await
        .unwrap()
}

#[tokio::test]
async fn list_returns_the_requested_page() {
    let adapter = seeded("rows", (1..=28).map(|i| json!({ "_id": i })).collect()).await;
    let service = DataAccessService::new(adapter, CollectionSettings::builder("rows").build());

    let page = service
        .list(&LocalBroker::new(), &json!({ "page": 2, "pageSize": "10", "sort": "_id" }))
        .await
        .unwrap();

    assert_eq!(page.page, 2);
    assert_eq!(page.page_size, 10);
    assert_eq!(page.total, 28);
    assert_eq!(page.total_pages, 3);
    assert_eq!(page.rows, (11..=20).map(|i| json!({ "_id": i })).collect::<Vec<_>>());
    assert!(page.has_next());
}

#[tokio::test]
async fn pages_past_the_data_are_empty() {
    let adapter = seeded("rows", (1..=28).map(|i| json!({ "_id": i })).collect()).await;
    let service = DataAccessService::new(adapter, CollectionSettings::builder("rows").build());
    let ctx = LocalBroker::new();

    let last = service
        .list(&ctx, &json!({ "page": 3, "pageSize": 10, "sort": "_id" }))
        .await
        .unwrap();
    assert_eq!(last.rows, (21..=28).map(|i| json!({ "_id": i })).collect::<Vec<_>>());
    assert!(!last.has_next());

    let beyond = service
        .list(&ctx, &json!({ "page": 4, "pageSize": 10 }))
        .await
        .unwrap();
    assert_eq!(beyond.rows, Vec::<Value>::new());
    assert_eq!(beyond.page, 4);
    assert_eq!(beyond.total, 28);
    assert_eq!(beyond.total_pages, 3);
}

#[tokio::test]
async fn list_envelope_serializes_in_camel_case() {
    let adapter = seeded("rows", (1..=3).map(|i| json!({ "_id": i })).collect()).await;
    let broker = LocalBroker::new().with_handler(DataAccessService::new(
        adapter,
        CollectionSettings::builder("rows").page_size(2).build(),
    ));

    let page = broker
        .call("rows.list", json!({ "page": 2, "sort": "-_id" }))
        .await
        .unwrap();

    assert_eq!(
        page,
        json!({ "rows": [{ "_id": 1 }], "total": 3, "page": 2, "pageSize": 2, "totalPages": 2 })
    );
}

#[tokio::test]
async fn find_and_count_share_the_predicate() {
    let adapter = seeded(
        "posts",
        (1..=6)
            .map(|i| json!({ "_id": i, "title": format!("Post {i}"), "votes": i * 10 }))
            .collect(),
    )
    .await;
    let service = DataAccessService::new(adapter, CollectionSettings::builder("posts").build());
    let ctx = LocalBroker::new();

    let params = json!({
        "query": "{\"votes\":{\"$gte\":30}}",
        "sort": "-votes",
        "limit": 2,
        "fields": "title",
    });

    let found = service.find(&ctx, &params).await.unwrap();
    assert_eq!(found, vec![json!({ "title": "Post 6" }), json!({ "title": "Post 5" })]);
    assert_eq!(service.count(&ctx, &params).await.unwrap(), 4);
}

#[tokio::test]
async fn wildcard_projection_reaches_every_array_element() {
    let wheels = |car: usize| {
        (1..=4)
            .map(|w| json!({ "placement": format!("c{car}w{w}"), "pressure": 2.2 }))
            .collect::<Vec<_>>()
    };
    let adapter = seeded(
        "garages",
        vec![json!({
            "_id": 1,
            "owner": "Ann",
            "cars": (1..=3).map(|c| json!({ "vin": c, "wheels": wheels(c) })).collect::<Vec<_>>(),
        })],
    )
    .await;
    let service = DataAccessService::new(
        adapter,
        CollectionSettings::builder("garages").fields(["_id", "owner", "cars"]).build(),
    );

    let found = service
        .find(&LocalBroker::new(), &json!({ "fields": ["cars.$.wheels.$.placement", "secret"] }))
        .await
        .unwrap();

    let expected_cars = (1..=3)
        .map(|c| {
            json!({
                "wheels": (1..=4)
                    .map(|w| json!({ "placement": format!("c{c}w{w}") }))
                    .collect::<Vec<_>>(),
            })
        })
        .collect::<Vec<_>>();
    assert_eq!(found, vec![json!({ "cars": expected_cars })]);
}

#[tokio::test]
async fn exclusions_apply_after_projection() {
    let adapter = seeded(
        "users",
        vec![json!({ "_id": 1, "name": "Ann", "password": "x", "profile": { "bio": "b", "phone": "p" } })],
    )
    .await;
    let service = DataAccessService::new(
        adapter,
        CollectionSettings::builder("users").exclude_fields(["password"]).build(),
    );

    let found = service
        .find(&LocalBroker::new(), &json!({ "excludeFields": "profile.phone" }))
        .await
        .unwrap();

    assert_eq!(found, vec![json!({ "_id": 1, "name": "Ann", "profile": { "bio": "b" } })]);
}

#[tokio::test]
async fn get_with_mapping_keys_every_found_id() {
    let adapter = seeded(
        "items",
        vec![
            json!({ "_id": 3, "name": "three" }),
            json!({ "_id": 8, "name": "eight" }),
            json!({ "_id": 5, "name": "five" }),
        ],
    )
    .await;
    let service = DataAccessService::new(adapter, CollectionSettings::builder("items").build());
    let ctx = LocalBroker::new();

    let mapped = service
        .get(&ctx, &json!({ "id": [5, 3, 8], "mapping": true, "fields": ["name"] }))
        .await
        .unwrap();
    assert_eq!(
        mapped,
        json!({ "5": { "name": "five" }, "3": { "name": "three" }, "8": { "name": "eight" } })
    );

    let ordered = service
        .get(&ctx, &json!({ "id": [5, 42, 3, 8] }))
        .await
        .unwrap();
    let ids = ordered
        .as_array()
        .unwrap()
        .iter()
        .map(|doc| doc["_id"].clone())
        .collect::<Vec<_>>();
    assert_eq!(ids, vec![json!(5), json!(3), json!(8)]);

    let single = service.get(&ctx, &json!({ "id": 8 })).await.unwrap();
    assert_eq!(single, json!({ "_id": 8, "name": "eight" }));
}

#[tokio::test]
async fn client_errors_are_reported_as_such() {
    let service = DataAccessService::new(
        seeded("items", vec![json!({ "_id": 1 })]).await,
        CollectionSettings::builder("items").build(),
    );
    let ctx = LocalBroker::new();

    let missing = service.get(&ctx, &json!({ "id": 2 })).await.unwrap_err();
    assert!(matches!(missing, DataLayerError::EntityNotFound { ref id } if *id == json!(2)));
    assert_eq!(missing.status_code(), 404);

    assert!(matches!(
        service.get(&ctx, &json!({})).await,
        Err(DataLayerError::InvalidParameter(_))
    ));
    assert!(matches!(
        service.update(&ctx, &json!({ "id": 2, "name": "x" })).await,
        Err(DataLayerError::EntityNotFound { .. })
    ));
    assert!(matches!(
        service.remove(&ctx, &json!({ "id": 2 })).await,
        Err(DataLayerError::EntityNotFound { .. })
    ));
    assert!(matches!(
        service.insert(&ctx, &json!({ "rows": [] })).await,
        Err(DataLayerError::InvalidParameter(_))
    ));
    assert!(matches!(
        service.list(&ctx, &json!({ "pageSize": 0 })).await,
        Err(DataLayerError::InvalidParameter(_))
    ));
    assert!(matches!(
        service.find(&ctx, &json!({ "limit": "-1" })).await,
        Err(DataLayerError::InvalidParameter(_))
    ));
    assert!(matches!(
        service.create(&ctx, json!({ "_id": 1 })).await,
        Err(DataLayerError::EntityAlreadyExists(..))
    ));

    let unknown = LocalBroker::new()
        .with_handler(service)
        .call("items.upsert", json!({}))
        .await
        .unwrap_err();
    assert!(matches!(unknown, DataLayerError::ActionNotFound(action) if action == "items.upsert"));
}

#[tokio::test]
async fn validators_reject_entities_before_storage() {
    let adapter = MemoryAdapter::new("posts");
    let service = DataAccessService::builder(adapter.clone(), CollectionSettings::builder("posts").build())
        .validator(|post: &Value| match post.get("title") {
            Some(Value::String(_)) => Ok(()),
            _ => Err(vec![FieldViolation::new("title", "is required")]),
        })
        .build();
    let ctx = LocalBroker::new();

    let error = service
        .create(&ctx, json!({ "body": "no title" }))
        .await
        .unwrap_err();
    assert!(matches!(&error, DataLayerError::Validation(violations) if violations.len() == 1));
    assert_eq!(error.status_code(), 422);

    let batch = service
        .insert(&ctx, &json!({ "entities": [{ "title": "ok" }, { "body": "bad" }] }))
        .await;
    assert!(matches!(batch, Err(DataLayerError::Validation(_))));
    assert_eq!(adapter.count(&FilterDescriptor::default()).await.unwrap(), 0);

    let created = service.create(&ctx, json!({ "title": "ok" })).await.unwrap();
    assert!(created["_id"].is_string());
    assert_eq!(created["title"], json!("ok"));
}

#[tokio::test]
async fn updates_merge_nested_objects_with_dot_notation() {
    let row = json!({ "_id": 1, "meta": { "views": 1, "likes": 2 } });

    let dotted = DataAccessService::new(
        seeded("posts", vec![row.clone()]).await,
        CollectionSettings::builder("posts").use_dot_notation(true).build(),
    );
    let replaced = DataAccessService::new(
        seeded("posts", vec![row]).await,
        CollectionSettings::builder("posts").build(),
    );
    let ctx = LocalBroker::new();
    let change = json!({ "id": 1, "meta": { "views": 3 } });

    assert_eq!(
        dotted.update(&ctx, &change).await.unwrap(),
        json!({ "_id": 1, "meta": { "views": 3, "likes": 2 } })
    );
    assert_eq!(
        replaced.update(&ctx, &change).await.unwrap(),
        json!({ "_id": 1, "meta": { "views": 3 } })
    );
}

#[tokio::test]
async fn custom_id_field_round_trips() {
    let adapter = MemoryAdapter::new("tags");
    let service = DataAccessService::new(
        adapter.clone(),
        CollectionSettings::builder("tags").id_field("id").build(),
    );
    let ctx = LocalBroker::new();

    let created = service
        .create(&ctx, json!({ "id": "rust", "label": "Rust" }))
        .await
        .unwrap();
    assert_eq!(created, json!({ "id": "rust", "label": "Rust" }));

    let stored = adapter.find_by_id(&json!("rust")).await.unwrap().unwrap();
    assert_eq!(stored, json!({ "_id": "rust", "label": "Rust" }));

    let updated = service
        .update(&ctx, &json!({ "id": "rust", "label": "Rust lang" }))
        .await
        .unwrap();
    assert_eq!(updated, json!({ "id": "rust", "label": "Rust lang" }));

    let removed = service.remove(&ctx, &json!({ "id": "rust" })).await.unwrap();
    assert_eq!(removed["id"], json!("rust"));
    assert_eq!(service.count(&ctx, &Value::Null).await.unwrap(), 0);
}

#[derive(Debug)]
struct Prefixed;

impl IdCodec for Prefixed {
    fn encode(&self, id: &Value) -> Value {
        Value::String(format!("item-{}", id))
    }

    fn decode(&self, id: &Value) -> DataLayerResult<Value> {
        id.as_str()
            .and_then(|text| text.strip_prefix("item-"))
            .and_then(|raw| raw.parse::<u64>().ok())
            .map(Value::from)
            .ok_or_else(|| DataLayerError::InvalidParameter(format!("malformed id {id}")))
    }
}

#[tokio::test]
async fn ids_are_encoded_once_and_decoded_on_the_way_in() {
    let service = DataAccessService::builder(
        seeded("items", vec![json!({ "_id": 1, "name": "one" }), json!({ "_id": 2, "name": "two" })]).await,
        CollectionSettings::builder("items").build(),
    )
    .id_codec(Prefixed)
    .build();
    let ctx = LocalBroker::new();

    let found = service.find(&ctx, &json!({ "sort": "_id" })).await.unwrap();
    assert_eq!(found[0]["_id"], json!("item-1"));

    let single = service.get(&ctx, &json!({ "id": "item-2" })).await.unwrap();
    assert_eq!(single, json!({ "_id": "item-2", "name": "two" }));

    let mapped = service
        .get(&ctx, &json!({ "id": ["item-1", "item-2"], "mapping": "true" }))
        .await
        .unwrap();
    assert_eq!(
        mapped,
        json!({
            "item-1": { "_id": "item-1", "name": "one" },
            "item-2": { "_id": "item-2", "name": "two" },
        })
    );

    assert!(matches!(
        service.get(&ctx, &json!({ "id": 2 })).await,
        Err(DataLayerError::InvalidParameter(_))
    ));
}

#[derive(Clone, Default)]
struct Journal {
    events: Arc<Mutex<Vec<(EntityEvent, Value)>>>,
}

#[async_trait]
impl EntityListener for Journal {
    async fn entity_changed(
        &self,
        event: EntityEvent,
        entity: &Value,
        _ctx: &dyn CallContext,
    ) -> DataLayerResult<()> {
        self.events.lock().unwrap().push((event, entity.clone()));
        Ok(())
    }
}

#[tokio::test]
async fn listeners_see_every_write() {
    let journal = Journal::default();
    let service = DataAccessService::builder(
        MemoryAdapter::new("notes"),
        CollectionSettings::builder("notes").build(),
    )
    .listener(journal.clone())
    .build();
    let ctx = LocalBroker::new();

    service.create(&ctx, json!({ "_id": 1, "text": "a" })).await.unwrap();
    service.update(&ctx, &json!({ "id": 1, "text": "b" })).await.unwrap();
    service.remove(&ctx, &json!({ "id": 1 })).await.unwrap();
    service.insert(&ctx, &json!({ "entities": [{ "_id": 2 }, { "_id": 3 }] })).await.unwrap();
    assert_eq!(service.clear(&ctx).await.unwrap(), 2);

    let events = journal.events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            (EntityEvent::Created, json!({ "_id": 1, "text": "a" })),
            (EntityEvent::Updated, json!({ "_id": 1, "text": "b" })),
            (EntityEvent::Removed, json!({ "_id": 1, "text": "b" })),
            (EntityEvent::Created, json!([{ "_id": 2 }, { "_id": 3 }])),
            (EntityEvent::Removed, json!(2)),
        ]
    );
}

#[tokio::test]
async fn services_can_borrow_their_adapter() {
    let adapter = MemoryAdapter::new("notes");
    adapter.connect().await.unwrap();

    {
        let service = DataAccessService::new(&adapter, CollectionSettings::builder("notes").build());
        service
            .create(&LocalBroker::new(), json!({ "text": "borrowed" }))
            .await
            .unwrap();
    }

    let rows = adapter.find(&FilterDescriptor::default()).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["text"], json!("borrowed"));
}
