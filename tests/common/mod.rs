#![allow(dead_code)]

use entityfold::changeset::diff;
use entityfold::{
    Changeset, CursorGenerator, Event, EventLog, EventType, MemoryEventLog, SqliteEventLog,
};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Unwrap a `json!({...})` literal into its field map.
pub fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

pub fn memory_log() -> Arc<dyn EventLog> {
    Arc::new(MemoryEventLog::new())
}

pub async fn sqlite_log() -> Arc<dyn EventLog> {
    Arc::new(SqliteEventLog::connect("sqlite::memory:", 1).await.unwrap())
}

/// One fresh log per backend, labelled for assertion messages.
pub async fn all_logs() -> Vec<(&'static str, Arc<dyn EventLog>)> {
    vec![("memory", memory_log()), ("sqlite", sqlite_log().await)]
}

/// Build an event stamped by `cursors`.
pub fn stamped(
    cursors: &CursorGenerator,
    entity_type: &str,
    entity_id: &str,
    event_type: EventType,
    changeset: Option<Changeset>,
) -> Event {
    let (cursor, date) = cursors.next();
    Event::new(
        uuid::Uuid::new_v4().to_string(),
        entity_type,
        entity_id,
        event_type,
        changeset,
        cursor,
        date,
    )
}

/// The CREATED event for an entity whose initial state is `data`.
pub fn created(cursors: &CursorGenerator, entity_type: &str, entity_id: &str, data: Value) -> Event {
    let changeset = diff(&Value::Null, &data);
    stamped(cursors, entity_type, entity_id, EventType::Created, Some(changeset))
}

/// The UPDATED event turning `old` into `new`.
pub fn updated(
    cursors: &CursorGenerator,
    entity_type: &str,
    entity_id: &str,
    old: &Value,
    new: &Value,
) -> Event {
    let changeset = diff(old, new);
    stamped(cursors, entity_type, entity_id, EventType::Updated, Some(changeset))
}

pub fn deleted(cursors: &CursorGenerator, entity_type: &str, entity_id: &str) -> Event {
    stamped(cursors, entity_type, entity_id, EventType::Deleted, None)
}

/// Append a created event for each of `ids` under `entity_type`.
pub async fn append_created(
    log: &dyn EventLog,
    cursors: &CursorGenerator,
    entity_type: &str,
    ids: &[&str],
) -> Vec<Event> {
    let mut events = Vec::new();
    for (i, id) in ids.iter().enumerate() {
        let event = created(cursors, entity_type, id, serde_json::json!({"n": i}));
        log.append(&event).await.unwrap();
        events.push(event);
    }
    events
}
