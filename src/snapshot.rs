//! Materialized entity state, derived by folding events.

use crate::changeset::apply_in_place;
use crate::cursor::Cursor;
use crate::event::{Event, EventType};
use chrono::{DateTime, Utc};
use log::warn;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

/// Replay the changesets of `events`, in the order given, from nothing.
///
/// Events without a changeset (deletions) leave the state untouched. The
/// fold starts from null, so an empty slice folds to null.
///
/// Folding is prefix-idempotent: folding `events[..k]` and then applying the
/// changeset of `events[k]` gives the same value as folding `events[..=k]`.
///
/// # Examples
///
/// ```
/// use entityfold::changeset::{apply, diff};
/// use entityfold::snapshot::fold;
/// use entityfold::{Cursor, Event, EventType};
/// use serde_json::json;
///
/// let v1 = json!({"name": "alice", "tags": ["a"]});
/// let v2 = json!({"name": "alice", "tags": ["a", "b"]});
/// let now = chrono::Utc::now();
/// let events = vec![
///     Event::new("e1", "User", "u1", EventType::Created, Some(diff(&json!(null), &v1)),
///                Cursor::from("c1"), now),
///     Event::new("e2", "User", "u1", EventType::Updated, Some(diff(&v1, &v2)),
///                Cursor::from("c2"), now),
/// ];
///
/// assert_eq!(fold(&events), v2);
/// assert_eq!(apply(events[1].changeset.as_ref().unwrap(), &fold(&events[..1])), v2);
/// ```
pub fn fold(events: &[Event]) -> Value {
    let mut state = Value::Null;
    for event in events {
        if let Some(changeset) = &event.changeset {
            apply_in_place(changeset, &mut state);
        }
    }
    state
}

/// The current state of one entity.
///
/// Holds the fields folded from the entity's changesets plus bookkeeping
/// derived from the events themselves. Serializes as one flat object: the
/// data fields followed by `id`, `createdAt`, `createdBy`, `updatedAt`,
/// `updatedBy`, `deletedAt` and `deletedBy`, the latter overriding any data
/// field with the same name.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub struct Snapshot {
    pub id: String,
    pub entity_type: String,
    pub data: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<String>,
    /// Cursor of the last event folded into this snapshot. Usable as a
    /// version token with [`EntityStore::update_entity_if`](crate::EntityStore::update_entity_if).
    pub cursor: Cursor,
}

impl Snapshot {
    /// Fold `events` (one entity, ascending cursor order) into a snapshot.
    ///
    /// Returns `None` for an empty slice. `created_at` comes from the first
    /// CREATED event (or the first event, if none is CREATED), `updated_at`
    /// from the latest UPDATED and `deleted_at` from the latest DELETED.
    pub fn from_events(events: &[Event]) -> Option<Snapshot> {
        let first = events.first()?;
        let last = events.last()?;

        let creation = events
            .iter()
            .find(|e| e.event_type == EventType::Created)
            .unwrap_or(first);
        let latest = |event_type: EventType| events.iter().rev().find(|e| e.event_type == event_type);
        let update = latest(EventType::Updated);
        let deletion = latest(EventType::Deleted);

        let data = match fold(events) {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                warn!(
                    "{}/{} folds to a non-object value ({}), exposing no fields",
                    first.entity_type,
                    first.entity_id,
                    kind(&other)
                );
                Map::new()
            }
        };

        Some(Snapshot {
            id: first.entity_id.clone(),
            entity_type: first.entity_type.clone(),
            data,
            created_at: creation.date,
            created_by: creation.principal_id.clone(),
            updated_at: update.map(|e| e.date),
            updated_by: update.and_then(|e| e.principal_id.clone()),
            deleted_at: deletion.map(|e| e.date),
            deleted_by: deletion.and_then(|e| e.principal_id.clone()),
            cursor: last.cursor.clone(),
        })
    }

    /// Value of a data field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// The flat JSON form of the snapshot.
    pub fn to_value(&self) -> Value {
        let mut out = self.data.clone();
        let date = |d: &DateTime<Utc>| Value::String(d.to_rfc3339());
        let text = |s: &Option<String>| s.clone().map_or(Value::Null, Value::String);

        out.insert("id".into(), Value::String(self.id.clone()));
        out.insert("createdAt".into(), date(&self.created_at));
        out.insert("createdBy".into(), text(&self.created_by));
        out.insert("updatedAt".into(), self.updated_at.as_ref().map_or(Value::Null, date));
        out.insert("updatedBy".into(), text(&self.updated_by));
        out.insert("deletedAt".into(), self.deleted_at.as_ref().map_or(Value::Null, date));
        out.insert("deletedBy".into(), text(&self.deleted_by));
        Value::Object(out)
    }
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
