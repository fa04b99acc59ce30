use crate::changeset::Changeset;
use crate::cursor::Cursor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// What happened to an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    Created,
    Updated,
    Deleted,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Created => "CREATED",
            EventType::Updated => "UPDATED",
            EventType::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(EventType::Created),
            "UPDATED" => Ok(EventType::Updated),
            "DELETED" => Ok(EventType::Deleted),
            other => Err(format!("unknown event type '{other}'")),
        }
    }
}

/// An immutable record of one change to one entity.
///
/// Events are created by the [`EntityStore`](crate::EntityStore) and never
/// modified once appended. The `changeset` turns the entity's previous state
/// into its new one and is `None` for deletions.
///
/// Serialized with camelCase keys, which is also the shape delivered to
/// notification sinks:
///
/// ```text
/// {"id":"…","entityType":"User","entityId":"…","type":"CREATED",
///  "changeset":[{"type":"put","key":[],"value":{"username":"john.doe"}}],
///  "cursor":"2024-05-01T10:00:00.000Z.000000","date":"2024-05-01T10:00:00Z",
///  "operationName":"createUser","principalId":"admin"}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct Event {
    /// Unique event identifier (UUID v4).
    pub id: String,

    pub entity_type: String,

    pub entity_id: String,

    /// Serialized as `"type"`.
    #[serde(rename = "type")]
    pub event_type: EventType,

    pub changeset: Option<Changeset>,

    /// Position of this event in the global order.
    pub cursor: Cursor,

    /// Emission time, millisecond resolution. Always the instant encoded in
    /// `cursor`.
    pub date: DateTime<Utc>,

    /// Name of the API operation that caused the change, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,

    /// Identity of the principal that caused the change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal_id: Option<String>,
}

impl Event {
    /// Assemble an event. The store is the usual caller; backends use this
    /// to rebuild events from persisted records.
    pub fn new(
        id: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        event_type: EventType,
        changeset: Option<Changeset>,
        cursor: Cursor,
        date: DateTime<Utc>,
    ) -> Self {
        Event {
            id: id.into(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            event_type,
            changeset,
            cursor,
            date,
            operation_name: None,
            principal_id: None,
        }
    }

    pub fn with_operation_name(mut self, operation_name: Option<String>) -> Self {
        self.operation_name = operation_name;
        self
    }

    pub fn with_principal(mut self, principal_id: Option<String>) -> Self {
        self.principal_id = principal_id;
        self
    }
}

/// Field an [`EventFilter`] sorts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    #[default]
    Cursor,
    Date,
    EntityType,
    EntityId,
    #[serde(rename = "type")]
    EventType,
}

impl SortField {
    /// Column holding this field in the relational backend.
    pub(crate) fn column(&self) -> &'static str {
        match self {
            SortField::Cursor => "cursor",
            SortField::Date => "date",
            SortField::EntityType => "entity_type",
            SortField::EntityId => "entity_id",
            SortField::EventType => "type",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

impl SortDir {
    pub(crate) fn keyword(&self) -> &'static str {
        match self {
            SortDir::Asc => "ASC",
            SortDir::Desc => "DESC",
        }
    }
}

/// Selects, orders and truncates events.
///
/// Every criterion is optional; the default filter matches every event in
/// ascending cursor order. Cursor bounds are exclusive unless
/// `include_boundary` is set, in which case both edges are inclusive.
///
/// # Examples
///
/// ```
/// use entityfold::{Cursor, EventFilter, SortDir, SortField};
///
/// let filter = EventFilter::new()
///     .entity_type("User")
///     .cursor_from(Cursor::from("2024-01-01T00:00:00.000Z.000000"))
///     .sort(SortField::Date, SortDir::Desc)
///     .limit(10);
/// assert_eq!(filter.entity_type.as_deref(), Some("User"));
/// assert_eq!(filter.limit, Some(10));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFilter {
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub cursor_from: Option<Cursor>,
    pub cursor_to: Option<Cursor>,
    #[serde(default)]
    pub include_boundary: bool,
    pub limit: Option<usize>,
    pub sort_field: Option<SortField>,
    pub sort_dir: Option<SortDir>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    pub fn entity_id(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn cursor_from(mut self, cursor: Cursor) -> Self {
        self.cursor_from = Some(cursor);
        self
    }

    pub fn cursor_to(mut self, cursor: Cursor) -> Self {
        self.cursor_to = Some(cursor);
        self
    }

    pub fn include_boundary(mut self, include: bool) -> Self {
        self.include_boundary = include;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn sort(mut self, field: SortField, dir: SortDir) -> Self {
        self.sort_field = Some(field);
        self.sort_dir = Some(dir);
        self
    }

    /// Whether `event` passes the entity and cursor criteria.
    pub fn matches(&self, event: &Event) -> bool {
        if self.entity_type.as_ref().is_some_and(|t| *t != event.entity_type) {
            return false;
        }
        if self.entity_id.as_ref().is_some_and(|id| *id != event.entity_id) {
            return false;
        }
        if let Some(from) = &self.cursor_from {
            let inside = if self.include_boundary {
                event.cursor >= *from
            } else {
                event.cursor > *from
            };
            if !inside {
                return false;
            }
        }
        if let Some(to) = &self.cursor_to {
            let inside = if self.include_boundary {
                event.cursor <= *to
            } else {
                event.cursor < *to
            };
            if !inside {
                return false;
            }
        }
        true
    }

    /// Order two events by the sort field, falling back to the cursor on
    /// ties. The direction applies to both.
    pub fn compare(&self, a: &Event, b: &Event) -> Ordering {
        let primary = match self.sort_field.unwrap_or_default() {
            SortField::Cursor => Ordering::Equal,
            SortField::Date => a.date.cmp(&b.date),
            SortField::EntityType => a.entity_type.cmp(&b.entity_type),
            SortField::EntityId => a.entity_id.cmp(&b.entity_id),
            SortField::EventType => a.event_type.as_str().cmp(b.event_type.as_str()),
        };
        let ordering = primary.then_with(|| a.cursor.cmp(&b.cursor));
        match self.sort_dir.unwrap_or_default() {
            SortDir::Asc => ordering,
            SortDir::Desc => ordering.reverse(),
        }
    }
}
