use crate::config::Backend;
use crate::cursor::Cursor;
use crate::error::{AppendError, StorageError};
use crate::event::{Event, EventFilter};
use crate::memory::MemoryEventLog;
use crate::sqlite::SqliteEventLog;
use async_trait::async_trait;
use std::sync::Arc;

/// Append-only storage for [`Event`]s.
///
/// Implementations own the events they hold: nothing is ever modified or
/// physically removed once appended. Each append is atomic, a reader never
/// observes a half-written event. Identical filters return identical results
/// on every backend.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Persist one event.
    async fn append(&self, event: &Event) -> Result<(), StorageError>;

    /// Persist one event only if the latest cursor recorded for the event's
    /// entity is `expected_last` (`None` meaning the entity has no events).
    ///
    /// The check and the write happen atomically. On mismatch nothing is
    /// written and [`AppendError::Conflict`] reports the cursor found.
    async fn append_if(
        &self,
        event: &Event,
        expected_last: Option<&Cursor>,
    ) -> Result<(), AppendError>;

    /// Return the events matching `filter`, sorted and truncated as it asks.
    async fn query(&self, filter: &EventFilter) -> Result<Vec<Event>, StorageError>;
}

/// Open the event log described by `backend`.
///
/// # Errors
///
/// Returns [`StorageError::Connect`] if a relational backend cannot be
/// reached or its schema cannot be created.
pub async fn open(backend: &Backend) -> Result<Arc<dyn EventLog>, StorageError> {
    match backend {
        Backend::Memory => Ok(Arc::new(MemoryEventLog::new())),
        Backend::Sqlite {
            url,
            max_connections,
        } => Ok(Arc::new(
            SqliteEventLog::connect(url, *max_connections).await?,
        )),
    }
}

pub(crate) fn conflict(
    event: &Event,
    expected: Option<&Cursor>,
    actual: Option<Cursor>,
) -> AppendError {
    AppendError::Conflict {
        entity_type: event.entity_type.clone(),
        entity_id: event.entity_id.clone(),
        expected: expected.cloned(),
        actual,
    }
}
