//! End-to-end load/modify/remove/scan against the in-memory adapter.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use entitystore::{
    props, ConfigurationError, Entity, EntityConfig, EntityError, EntitySchema, InMemoryStorage,
    KeySpec, PropertyType, ScanOptions, SetupOptions, ValidationError, Value,
};
use uuid::Uuid;

fn queue_entity() -> Entity {
    let schema = EntitySchema::builder()
        .property("queue", PropertyType::String)
        .property("slot", PropertyType::Integer)
        .property("owner", PropertyType::Uuid)
        .property("claimed", PropertyType::Boolean)
        .property("expires", PropertyType::Date)
        .property("weight", PropertyType::Number)
        .property("meta", PropertyType::Json)
        .partition_key("queue")
        .row_key("slot")
        .build()
        .unwrap();
    let entity = Entity::new(schema);
    entity
        .setup(SetupOptions::new(
            "queue_slots",
            "queue",
            Arc::new(InMemoryStorage::new()),
        ))
        .unwrap();
    entity
}

fn slot(queue: &str, slot: i64) -> entitystore::Properties {
    props! {
        "queue" => queue,
        "slot" => slot,
        "owner" => Uuid::nil(),
        "claimed" => false,
        "expires" => Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
        "weight" => 0.5,
        "meta" => serde_json::json!({"tags": ["a", "b"]}),
    }
}

#[test]
fn test_load_round_trips_every_type() {
    let entity = queue_entity();
    let entry = slot("q1", 7);
    let created = entity.create(&entry, false).unwrap();

    let loaded = entity.load(&props! { "queue" => "q1", "slot" => 7 }).unwrap().unwrap();
    assert_eq!(loaded.value, entry);
    assert_eq!(loaded.etag, created.etag);
    assert_eq!(loaded.version, 1);
}

#[test]
fn test_modify_then_stale_modify() {
    let entity = queue_entity();
    let record = entity.create(&slot("q1", 1), false).unwrap();

    let claimed = entity
        .modify(&record, |v| {
            v.insert("claimed".to_string(), Value::Boolean(true));
        })
        .unwrap();
    assert_eq!(claimed.version, 2);
    assert_eq!(claimed.get("claimed"), Some(&Value::Boolean(true)));

    let err = entity
        .modify(&record, |v| {
            v.insert("weight".to_string(), Value::Number(1.0));
        })
        .unwrap_err();
    assert!(matches!(err, EntityError::Modified { .. }));
    assert!(!err.is_retryable());

    let current = entity.load(&slot("q1", 1)).unwrap().unwrap();
    assert_eq!(current, claimed);
}

#[test]
fn test_modify_validates_new_value() {
    let entity = queue_entity();
    let record = entity.create(&slot("q1", 1), false).unwrap();

    let err = entity
        .modify(&record, |v| {
            v.insert("weight".to_string(), Value::from("heavy"));
        })
        .unwrap_err();
    assert!(matches!(
        err,
        EntityError::Validation(ValidationError::TypeMismatch { .. })
    ));

    let err = entity
        .modify(&record, |v| {
            v.insert("slot".to_string(), Value::Integer(2));
        })
        .unwrap_err();
    assert!(matches!(
        err,
        EntityError::Validation(ValidationError::KeyChanged { .. })
    ));

    assert_eq!(entity.load(&slot("q1", 1)).unwrap().unwrap().version, 1);
}

#[test]
fn test_remove_and_recreate() {
    let entity = queue_entity();
    entity.create(&slot("q1", 1), false).unwrap();
    entity.create(&slot("q1", 1), true).unwrap();

    assert!(entity.remove(&slot("q1", 1), false).unwrap());
    assert!(entity.load(&slot("q1", 1)).unwrap().is_none());

    let err = entity.remove(&slot("q1", 1), false).unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.code(), Some("P0002"));

    let recreated = entity.create(&slot("q1", 1), false).unwrap();
    assert_eq!(recreated.version, 1);
}

#[test]
fn test_scan_partition_with_continuation() {
    let entity = queue_entity();
    for n in 0..7 {
        entity.create(&slot("q1", n), false).unwrap();
    }
    for n in 0..3 {
        entity.create(&slot("q10", n), false).unwrap();
    }

    let partition = props! { "queue" => "q1" };
    let mut seen = Vec::new();
    let mut options = ScanOptions::new().limit(3);
    loop {
        let page = entity.scan(Some(&partition), &options).unwrap();
        seen.extend(page.records.into_iter().map(|r| r.id));
        match page.continuation {
            Some(token) => options = options.continuation(Some(token)),
            None => break,
        }
    }

    assert_eq!(seen.len(), 7);
    assert!(seen.iter().all(|id| id.starts_with("q1_")));
    let mut sorted = seen.clone();
    sorted.sort();
    assert_eq!(seen, sorted);
}

#[test]
fn test_scan_partition_needs_partition_keys_only() {
    let entity = queue_entity();
    entity.create(&slot("q1", 1), false).unwrap();

    let err = entity
        .scan(Some(&props! { "slot" => 1 }), &ScanOptions::new())
        .unwrap_err();
    assert!(err.is_validation());
}

#[test]
fn test_unbound_entity_rejects_operations() {
    let entity = Entity::configure(
        EntityConfig::new("id", KeySpec::constant("row")).property("id", PropertyType::String),
    )
    .unwrap();

    let keys = props! { "id" => "x" };
    assert!(matches!(entity.create(&keys, false), Err(EntityError::NotBound)));
    assert!(matches!(entity.load(&keys), Err(EntityError::NotBound)));
    assert!(matches!(entity.remove(&keys, true), Err(EntityError::NotBound)));
}

#[test]
fn test_configure_rejects_undeclared_keys() {
    let err = Entity::configure(
        EntityConfig::new("missing", KeySpec::constant("row")).property("id", PropertyType::String),
    )
    .unwrap_err();
    assert_eq!(
        err,
        ConfigurationError::UnknownKeyProperty {
            name: "missing".to_string()
        }
    );
}

#[test]
fn test_create_rejects_undeclared_and_missing_properties() {
    let entity = queue_entity();

    let mut extra = slot("q1", 1);
    extra.insert("color".to_string(), Value::from("red"));
    let err = entity.create(&extra, false).unwrap_err();
    assert!(matches!(
        err,
        EntityError::Validation(ValidationError::UnknownProperty { .. })
    ));

    let mut missing = slot("q1", 1);
    missing.remove("owner");
    let err = entity.create(&missing, false).unwrap_err();
    assert!(matches!(
        err,
        EntityError::Validation(ValidationError::MissingProperty { .. })
    ));

    assert!(entity.scan(None, &ScanOptions::new()).unwrap().records.is_empty());
}
