//! Notification records derived from events.

use crate::changeset::{apply, ChangeOp};
use crate::event::Event;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;

/// An event enriched for notification consumers.
///
/// Serializes as the event's own fields plus `columns`, `oldValues` and
/// `newValues`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedEvent {
    #[serde(flatten)]
    pub event: Event,
    /// Top-level properties touched by the event, see [`changed_columns`].
    pub columns: Vec<String>,
    /// Value of each changed column before the event (null when absent).
    pub old_values: Map<String, Value>,
    /// Value of each changed column after the event (null when absent).
    pub new_values: Map<String, Value>,
}

impl AggregatedEvent {
    /// Aggregate `event` given the entity's state just before it.
    ///
    /// `before` is null for a freshly created entity. Deletions carry no
    /// changeset and aggregate to empty columns and value sets.
    pub fn new(event: Event, before: &Value) -> Self {
        let columns = changed_columns(&event);
        let after = match &event.changeset {
            Some(changeset) => apply(changeset, before),
            None => before.clone(),
        };
        let old_values = pick(before, &columns);
        let new_values = pick(&after, &columns);
        AggregatedEvent {
            event,
            columns,
            old_values,
            new_values,
        }
    }
}

fn pick(state: &Value, columns: &[String]) -> Map<String, Value> {
    columns
        .iter()
        .map(|column| {
            let value = state.get(column).cloned().unwrap_or(Value::Null);
            (column.clone(), value)
        })
        .collect()
}

/// Top-level property names touched by `event`'s changeset.
///
/// A put at the root contributes the keys of the value it writes, any other
/// operation the first segment of its path. Each name appears once, in order
/// of first occurrence. Deletions have no changeset and touch nothing.
///
/// # Examples
///
/// ```
/// use entityfold::changeset::diff;
/// use entityfold::{changed_columns, Cursor, Event, EventType};
/// use serde_json::json;
///
/// let old = json!({"name": "alice", "address": {"city": "Oslo", "zip": "0150"}});
/// let new = json!({"name": "bob", "address": {"city": "Bergen", "zip": "5003"}});
/// let event = Event::new("e", "User", "u", EventType::Updated, Some(diff(&old, &new)),
///                        Cursor::from("c"), chrono::Utc::now());
///
/// assert_eq!(changed_columns(&event), vec!["address", "name"]);
/// ```
pub fn changed_columns(event: &Event) -> Vec<String> {
    let Some(changeset) = &event.changeset else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut columns = Vec::new();
    let mut push = |column: &str| {
        if seen.insert(column.to_string()) {
            columns.push(column.to_string());
        }
    };

    for op in changeset {
        match (op, op.path().first()) {
            (ChangeOp::Put { value, .. }, None) => {
                if let Value::Object(map) = value {
                    map.keys().for_each(|key| push(key.as_str()));
                }
            }
            (_, Some(column)) => push(column.as_str()),
            (ChangeOp::Del { .. }, None) => {}
        }
    }
    columns
}
