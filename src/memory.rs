use crate::cursor::Cursor;
use crate::error::{AppendError, StorageError};
use crate::event::{Event, EventFilter};
use crate::event_log::{conflict, EventLog};
use async_trait::async_trait;
use chrono::SubsecRound;
use log::debug;
use tokio::sync::RwLock;

/// An [`EventLog`] held in process memory.
///
/// The events live as long as this value; nothing is shared between
/// instances. Queries are a linear scan over everything appended so far.
#[derive(Debug, Default)]
pub struct MemoryEventLog {
    events: RwLock<Vec<Event>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events held.
    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }
}

/// The event as the relational backend would hand it back: dates keep
/// millisecond precision.
fn stored(event: &Event) -> Event {
    let mut event = event.clone();
    event.date = event.date.trunc_subsecs(3);
    event
}

fn last_cursor<'a>(events: &'a [Event], entity_type: &str, entity_id: &str) -> Option<&'a Cursor> {
    events
        .iter()
        .filter(|e| e.entity_type == entity_type && e.entity_id == entity_id)
        .map(|e| &e.cursor)
        .max()
}

#[async_trait]
impl EventLog for MemoryEventLog {
    async fn append(&self, event: &Event) -> Result<(), StorageError> {
        self.events.write().await.push(stored(event));
        debug!(
            "appended {} {}/{} at {}",
            event.event_type, event.entity_type, event.entity_id, event.cursor
        );
        Ok(())
    }

    async fn append_if(
        &self,
        event: &Event,
        expected_last: Option<&Cursor>,
    ) -> Result<(), AppendError> {
        let mut events = self.events.write().await;
        let actual = last_cursor(&events, &event.entity_type, &event.entity_id);
        if actual != expected_last {
            let actual = actual.cloned();
            return Err(conflict(event, expected_last, actual));
        }
        events.push(stored(event));
        debug!(
            "appended {} {}/{} at {} (expected last {:?})",
            event.event_type, event.entity_type, event.entity_id, event.cursor, expected_last
        );
        Ok(())
    }

    async fn query(&self, filter: &EventFilter) -> Result<Vec<Event>, StorageError> {
        let events = self.events.read().await;
        let mut matched: Vec<Event> = events.iter().filter(|e| filter.matches(e)).cloned().collect();
        drop(events);

        matched.sort_by(|a, b| filter.compare(a, b));
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        debug!("query {:?} matched {} events", filter, matched.len());
        Ok(matched)
    }
}
