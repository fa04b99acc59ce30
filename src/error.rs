//! Error types for the event log, the store and its collaborators.

use crate::cursor::Cursor;
use thiserror::Error;

/// A failure of the backend holding the event log.
///
/// Surfaced unchanged from every store operation. The crate never retries;
/// retry policy belongs to the caller.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Failed to connect to the backend.
    #[error("failed to connect to event log backend: {0}")]
    Connect(#[source] sqlx::Error),

    /// The backend failed while executing a read or write.
    #[error("event log backend unavailable: {0}")]
    Unavailable(#[source] sqlx::Error),

    /// A changeset could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A persisted record could not be turned back into an [`Event`](crate::Event).
    #[error("corrupt event record {id}: {reason}")]
    Corrupt { id: String, reason: String },
}

/// Error returned by [`EventLog::append_if`](crate::EventLog::append_if).
#[derive(Debug, Error)]
pub enum AppendError {
    /// The entity's latest cursor did not match the expected one. Another
    /// writer appended in between; nothing was written.
    #[error(
        "conflicting append to {entity_type}/{entity_id}: expected last cursor {}, found {}",
        display_cursor(.expected),
        display_cursor(.actual)
    )]
    Conflict {
        entity_type: String,
        entity_id: String,
        expected: Option<Cursor>,
        actual: Option<Cursor>,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

fn display_cursor(cursor: &Option<Cursor>) -> &str {
    cursor.as_ref().map_or("<none>", Cursor::as_str)
}

/// Invalid store configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unsupported database url scheme: {0} (expected memory or sqlite)")]
    UnsupportedScheme(String),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// A notification sink failed to deliver an aggregated event.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}
