use crate::aggregate::AggregatedEvent;
use crate::changeset::{diff, Changeset};
use crate::config::{Backend, StoreConfig};
use crate::cursor::{Cursor, CursorGenerator};
use crate::error::{AppendError, StorageError};
use crate::event::{Event, EventFilter, EventType};
use crate::event_log::{self, EventLog};
use crate::memory::MemoryEventLog;
use crate::notify::NotificationSink;
use crate::snapshot::{fold, Snapshot};
use log::{debug, warn};
use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

/// Input of [`EntityStore::create_entity`].
#[derive(Debug, Clone, PartialEq)]
pub struct CreateEntity {
    pub entity_type: String,
    pub data: Map<String, Value>,
    pub principal_id: Option<String>,
    pub operation_name: Option<String>,
}

impl CreateEntity {
    pub fn new(entity_type: impl Into<String>, data: Map<String, Value>) -> Self {
        CreateEntity {
            entity_type: entity_type.into(),
            data,
            principal_id: None,
            operation_name: None,
        }
    }

    pub fn with_principal(mut self, principal_id: impl Into<String>) -> Self {
        self.principal_id = Some(principal_id.into());
        self
    }

    pub fn with_operation_name(mut self, operation_name: impl Into<String>) -> Self {
        self.operation_name = Some(operation_name.into());
        self
    }
}

/// Input of [`EntityStore::update_entity`]. `data` is shallow-merged over
/// the entity's current fields.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateEntity {
    pub entity_type: String,
    pub entity_id: String,
    pub data: Map<String, Value>,
    pub principal_id: Option<String>,
    pub operation_name: Option<String>,
}

impl UpdateEntity {
    pub fn new(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        data: Map<String, Value>,
    ) -> Self {
        UpdateEntity {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            data,
            principal_id: None,
            operation_name: None,
        }
    }

    pub fn with_principal(mut self, principal_id: impl Into<String>) -> Self {
        self.principal_id = Some(principal_id.into());
        self
    }

    pub fn with_operation_name(mut self, operation_name: impl Into<String>) -> Self {
        self.operation_name = Some(operation_name.into());
        self
    }
}

/// Input of [`EntityStore::delete_entity`].
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteEntity {
    pub entity_type: String,
    pub entity_id: String,
    pub principal_id: Option<String>,
    pub operation_name: Option<String>,
}

impl DeleteEntity {
    pub fn new(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        DeleteEntity {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            principal_id: None,
            operation_name: None,
        }
    }

    pub fn with_principal(mut self, principal_id: impl Into<String>) -> Self {
        self.principal_id = Some(principal_id.into());
        self
    }

    pub fn with_operation_name(mut self, operation_name: impl Into<String>) -> Self {
        self.operation_name = Some(operation_name.into());
        self
    }
}

/// Entities whose state is a fold over their change events.
///
/// Every mutation appends one event to the [`EventLog`]; every read folds
/// the entity's events again. The store keeps no state of its own beyond the
/// log handle and its cursor generator.
///
/// Mutations of the same entity are not serialized. Two concurrent
/// [`update_entity`](Self::update_entity) calls both diff against the state
/// they read, both append, and the later append wins when folding. Callers
/// that need to detect this use [`update_entity_if`](Self::update_entity_if).
///
/// Cursors come from [`CursorGenerator::shared`], so stores sharing a log
/// in one process stamp strictly increasing cursors between them.
///
/// Deleted entities are not protected either: the store appends whatever it
/// is asked to. Rejecting mutations of an entity whose snapshot has
/// `deleted_at` set is the caller's job.
pub struct EntityStore {
    log: Arc<dyn EventLog>,
    cursors: &'static CursorGenerator,
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl EntityStore {
    pub fn new(log: Arc<dyn EventLog>) -> Self {
        EntityStore {
            log,
            cursors: CursorGenerator::shared(),
            sinks: Vec::new(),
        }
    }

    /// A store over a fresh in-memory log.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryEventLog::new()))
    }

    pub fn builder() -> EntityStoreBuilder {
        EntityStoreBuilder::default()
    }

    /// The log this store reads and writes.
    pub fn event_log(&self) -> &Arc<dyn EventLog> {
        &self.log
    }

    /// Current state of an entity, or its state as of `cursor_to`
    /// (inclusive) when given.
    ///
    /// Returns `None` if the entity has no events in range.
    pub async fn get_entity_data(
        &self,
        entity_type: &str,
        entity_id: &str,
        cursor_to: Option<&Cursor>,
    ) -> Result<Option<Snapshot>, StorageError> {
        let events = self
            .entity_events(entity_type, entity_id, cursor_to, true)
            .await?;
        Ok(Snapshot::from_events(&events))
    }

    /// Create an entity with a fresh id and append its CREATED event.
    pub async fn create_entity(&self, request: CreateEntity) -> Result<Event, StorageError> {
        let entity_id = Uuid::new_v4().to_string();
        let changeset = diff(&Value::Null, &Value::Object(request.data));
        let event = self.next_event(
            request.entity_type,
            entity_id,
            EventType::Created,
            Some(changeset),
            request.principal_id,
            request.operation_name,
        );

        self.log.append(&event).await?;
        debug!("created {}/{}", event.entity_type, event.entity_id);
        self.notify(&event, &Value::Null).await;
        Ok(event)
    }

    /// Merge `data` over an entity's current fields and append the
    /// difference as an UPDATED event.
    ///
    /// Returns `None`, appending nothing, when the entity has no events or
    /// the merge changes nothing.
    pub async fn update_entity(&self, request: UpdateEntity) -> Result<Option<Event>, StorageError> {
        let Some((event, before)) = self.prepare_update(request).await? else {
            return Ok(None);
        };
        self.log.append(&event).await?;
        debug!("updated {}/{}", event.entity_type, event.entity_id);
        self.notify(&event, &before).await;
        Ok(Some(event))
    }

    /// Like [`update_entity`](Self::update_entity), but only appends if the
    /// entity's latest event is still `expected` (typically
    /// [`Snapshot::cursor`] from an earlier read).
    ///
    /// # Errors
    ///
    /// Returns [`AppendError::Conflict`] if another event was appended for
    /// the entity since `expected`.
    pub async fn update_entity_if(
        &self,
        request: UpdateEntity,
        expected: &Cursor,
    ) -> Result<Option<Event>, AppendError> {
        let Some((event, before)) = self.prepare_update(request).await? else {
            return Ok(None);
        };
        self.log.append_if(&event, Some(expected)).await?;
        debug!(
            "updated {}/{} after {expected}",
            event.entity_type, event.entity_id
        );
        self.notify(&event, &before).await;
        Ok(Some(event))
    }

    /// Append a DELETED event. Always appends, even for an entity that is
    /// unknown or already deleted.
    pub async fn delete_entity(&self, request: DeleteEntity) -> Result<Event, StorageError> {
        let event = self.next_event(
            request.entity_type,
            request.entity_id,
            EventType::Deleted,
            None,
            request.principal_id,
            request.operation_name,
        );

        self.log.append(&event).await?;
        debug!("deleted {}/{}", event.entity_type, event.entity_id);
        self.notify(&event, &Value::Null).await;
        Ok(event)
    }

    /// Raw events, for audit and history.
    pub async fn get_events(&self, filter: &EventFilter) -> Result<Vec<Event>, StorageError> {
        self.log.query(filter).await
    }

    /// Build the notification record for an event already in the log.
    pub async fn aggregate(&self, event: &Event) -> Result<AggregatedEvent, StorageError> {
        let before = match event.event_type {
            EventType::Deleted => Value::Null,
            EventType::Created | EventType::Updated => {
                let events = self
                    .entity_events(
                        &event.entity_type,
                        &event.entity_id,
                        Some(&event.cursor),
                        false,
                    )
                    .await?;
                fold(&events)
            }
        };
        Ok(AggregatedEvent::new(event.clone(), &before))
    }

    async fn entity_events(
        &self,
        entity_type: &str,
        entity_id: &str,
        cursor_to: Option<&Cursor>,
        inclusive: bool,
    ) -> Result<Vec<Event>, StorageError> {
        let mut filter = EventFilter::new()
            .entity_type(entity_type)
            .entity_id(entity_id);
        if let Some(cursor) = cursor_to {
            filter = filter.cursor_to(cursor.clone()).include_boundary(inclusive);
        }
        self.log.query(&filter).await
    }

    /// Read, merge and diff. Returns the event to append together with the
    /// state it applies to.
    async fn prepare_update(
        &self,
        request: UpdateEntity,
    ) -> Result<Option<(Event, Value)>, StorageError> {
        let events = self
            .entity_events(&request.entity_type, &request.entity_id, None, true)
            .await?;
        if events.is_empty() {
            debug!(
                "update of unknown {}/{} ignored",
                request.entity_type, request.entity_id
            );
            return Ok(None);
        }

        let current = fold(&events);
        let mut merged = match &current {
            Value::Object(fields) => fields.clone(),
            _ => Map::new(),
        };
        merged.extend(request.data);

        let changeset = diff(&current, &Value::Object(merged));
        if changeset.is_empty() {
            debug!(
                "update of {}/{} changes nothing",
                request.entity_type, request.entity_id
            );
            return Ok(None);
        }

        let event = self.next_event(
            request.entity_type,
            request.entity_id,
            EventType::Updated,
            Some(changeset),
            request.principal_id,
            request.operation_name,
        );
        Ok(Some((event, current)))
    }

    fn next_event(
        &self,
        entity_type: String,
        entity_id: String,
        event_type: EventType,
        changeset: Option<Changeset>,
        principal_id: Option<String>,
        operation_name: Option<String>,
    ) -> Event {
        let (cursor, date) = self.cursors.next();
        Event::new(
            Uuid::new_v4().to_string(),
            entity_type,
            entity_id,
            event_type,
            changeset,
            cursor,
            date,
        )
        .with_principal(principal_id)
        .with_operation_name(operation_name)
    }

    async fn notify(&self, event: &Event, before: &Value) {
        if self.sinks.is_empty() {
            return;
        }
        let aggregated = AggregatedEvent::new(event.clone(), before);
        for sink in &self.sinks {
            if let Err(e) = sink.publish(&aggregated).await {
                warn!(
                    "notification for {} {}/{} failed: {e}",
                    event.event_type, event.entity_type, event.entity_id
                );
            }
        }
    }
}

/// Assembles an [`EntityStore`].
///
/// ```
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// use entityfold::config::Backend;
/// use entityfold::{BroadcastSink, EntityStore};
/// use std::sync::Arc;
///
/// let sink = BroadcastSink::new(16);
/// let store = EntityStore::builder()
///     .backend(Backend::Memory)
///     .sink(Arc::new(sink.clone()))
///     .open()
///     .await
///     .unwrap();
/// # let _ = store;
/// # });
/// ```
#[derive(Default)]
pub struct EntityStoreBuilder {
    backend: Backend,
    log: Option<Arc<dyn EventLog>>,
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl EntityStoreBuilder {
    /// Open a log for `backend`. Ignored if [`event_log`](Self::event_log)
    /// is also given.
    pub fn backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn config(self, config: &StoreConfig) -> Self {
        self.backend(config.backend.clone())
    }

    /// Use an already opened log.
    pub fn event_log(mut self, log: Arc<dyn EventLog>) -> Self {
        self.log = Some(log);
        self
    }

    /// Register a sink to receive every mutation.
    pub fn sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Build the store, connecting to the backend if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Connect`] if the backend cannot be opened.
    pub async fn open(self) -> Result<EntityStore, StorageError> {
        let log = match self.log {
            Some(log) => log,
            None => event_log::open(&self.backend).await?,
        };
        let mut store = EntityStore::new(log);
        store.sinks = self.sinks;
        Ok(store)
    }
}
