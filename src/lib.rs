//! Event-sourced entity storage.
//!
//! Every create, update and delete of an entity is recorded as an immutable
//! [`Event`] carrying a structural [`Changeset`]. Events live in an
//! append-only [`EventLog`] (in memory or SQLite), and an entity's current or
//! historical state is a [fold](snapshot::fold) over its events.

mod aggregate;
pub mod changeset;
pub mod config;
mod cursor;
mod error;
mod event;
mod event_log;
mod memory;
mod notify;
pub mod snapshot;
mod sqlite;
mod store;

pub use aggregate::{changed_columns, AggregatedEvent};
pub use changeset::{ChangeOp, Changeset};
pub use config::{Backend, StoreConfig};
pub use cursor::{Cursor, CursorGenerator};
pub use error::{AppendError, ConfigError, NotifyError, StorageError};
pub use event::{Event, EventFilter, EventType, SortDir, SortField};
pub use event_log::{open as open_event_log, EventLog};
pub use memory::MemoryEventLog;
pub use notify::{BroadcastSink, NotificationSink};
pub use snapshot::Snapshot;
pub use sqlite::{EventRow, SqliteEventLog};
pub use store::{CreateEntity, DeleteEntity, EntityStore, EntityStoreBuilder, UpdateEntity};
