//! SQLite-backed event log.
//!
//! One immutable row per event in the `_events` table, indexed by
//! `(entity_type, entity_id, cursor)`. Changesets are stored as JSON text and
//! dates in the fixed-width layout used by cursors, so text order is time
//! order.

use crate::changeset::Changeset;
use crate::cursor::{format_timestamp, Cursor};
use crate::error::{AppendError, StorageError};
use crate::event::{Event, EventFilter, EventType, SortField};
use crate::event_log::{conflict, EventLog};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use sqlx::query::Query;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{QueryBuilder, Row, Sqlite};
use std::str::FromStr;
use std::time::Duration;

const SCHEMA: [&str; 3] = [
    r#"
    CREATE TABLE IF NOT EXISTS _events (
        id TEXT PRIMARY KEY,
        entity_type TEXT NOT NULL,
        entity_id TEXT NOT NULL,
        cursor TEXT NOT NULL,
        type TEXT NOT NULL,
        changeset TEXT,
        operation_name TEXT,
        date TEXT NOT NULL,
        principal_id TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_events_entity_cursor ON _events (entity_type, entity_id, cursor)",
    "CREATE INDEX IF NOT EXISTS idx_events_cursor ON _events (cursor)",
];

const COLUMNS: &str =
    "id, entity_type, entity_id, cursor, type, changeset, operation_name, date, principal_id";

/// A row of the `_events` table.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRow {
    pub id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub cursor: String,
    pub event_type: String,
    pub changeset: Option<String>,
    pub operation_name: Option<String>,
    pub date: String,
    pub principal_id: Option<String>,
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for EventRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            entity_type: row.try_get("entity_type")?,
            entity_id: row.try_get("entity_id")?,
            cursor: row.try_get("cursor")?,
            event_type: row.try_get("type")?,
            changeset: row.try_get("changeset")?,
            operation_name: row.try_get("operation_name")?,
            date: row.try_get("date")?,
            principal_id: row.try_get("principal_id")?,
        })
    }
}

impl EventRow {
    /// Encode an event for storage.
    pub fn from_event(event: &Event) -> Result<Self, StorageError> {
        let changeset = event
            .changeset
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        Ok(EventRow {
            id: event.id.clone(),
            entity_type: event.entity_type.clone(),
            entity_id: event.entity_id.clone(),
            cursor: event.cursor.as_str().to_string(),
            event_type: event.event_type.as_str().to_string(),
            changeset,
            operation_name: event.operation_name.clone(),
            date: format_timestamp(&event.date),
            principal_id: event.principal_id.clone(),
        })
    }

    /// Decode a stored row.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Corrupt`] if the type, date or changeset
    /// column cannot be parsed.
    pub fn into_event(self) -> Result<Event, StorageError> {
        let corrupt = |reason: String| StorageError::Corrupt {
            id: self.id.clone(),
            reason,
        };

        let event_type = EventType::from_str(&self.event_type).map_err(&corrupt)?;
        let date = DateTime::parse_from_rfc3339(&self.date)
            .map_err(|e| corrupt(format!("invalid date '{}': {e}", self.date)))?
            .with_timezone(&Utc);
        let changeset = self
            .changeset
            .as_deref()
            .map(serde_json::from_str::<Option<Changeset>>)
            .transpose()
            .map_err(|e| corrupt(format!("invalid changeset: {e}")))?
            .flatten();

        Ok(Event::new(
            self.id.clone(),
            self.entity_type.clone(),
            self.entity_id.clone(),
            event_type,
            changeset,
            Cursor::from(self.cursor.clone()),
            date,
        )
        .with_operation_name(self.operation_name.clone())
        .with_principal(self.principal_id.clone()))
    }

    fn bind<'q>(
        &self,
        query: Query<'q, Sqlite, SqliteArguments<'q>>,
    ) -> Query<'q, Sqlite, SqliteArguments<'q>> {
        query
            .bind(self.id.clone())
            .bind(self.entity_type.clone())
            .bind(self.entity_id.clone())
            .bind(self.cursor.clone())
            .bind(self.event_type.clone())
            .bind(self.changeset.clone())
            .bind(self.operation_name.clone())
            .bind(self.date.clone())
            .bind(self.principal_id.clone())
    }
}

/// An [`EventLog`] persisted in SQLite.
///
/// The connection pool belongs to the log. An in-memory database
/// (`sqlite::memory:`) lives on a single connection that is never recycled,
/// so it survives as long as the log does.
#[derive(Debug, Clone)]
pub struct SqliteEventLog {
    pool: SqlitePool,
}

impl SqliteEventLog {
    /// Connect to `url`, creating the database file and schema if missing.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Connect`] if the URL is malformed, the
    /// database cannot be opened or the schema cannot be created.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(StorageError::Connect)?
            .create_if_missing(true);

        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(Option::<Duration>::None)
                .max_lifetime(Option::<Duration>::None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(StorageError::Connect)?;

        let log = Self::from_pool(pool).await?;
        info!("connected to sqlite event log at {url}");
        Ok(log)
    }

    /// Use an existing pool, creating the schema if missing.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StorageError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(StorageError::Connect)?;
        }
        debug!("event log schema initialized");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close every pooled connection. An in-memory database is gone afterwards.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn last_cursor(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Option<Cursor>, StorageError> {
        let cursor: Option<String> = sqlx::query_scalar(
            "SELECT MAX(cursor) FROM _events WHERE entity_type = ? AND entity_id = ?",
        )
        .bind(entity_type)
        .bind(entity_id)
        .fetch_one(&self.pool)
        .await
        .map_err(StorageError::Unavailable)?;
        Ok(cursor.map(Cursor::from))
    }
}

#[async_trait]
impl EventLog for SqliteEventLog {
    async fn append(&self, event: &Event) -> Result<(), StorageError> {
        let row = EventRow::from_event(event)?;
        let sql = format!("INSERT INTO _events ({COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)");
        row.bind(sqlx::query(&sql))
            .execute(&self.pool)
            .await
            .map_err(StorageError::Unavailable)?;
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
        let row = EventRow::from_event(event)?;
        // Check and insert in one statement so no other writer can interleave.
        let sql = format!(
            "INSERT INTO _events ({COLUMNS}) \
             SELECT ?, ?, ?, ?, ?, ?, ?, ?, ? \
             WHERE (SELECT MAX(cursor) FROM _events WHERE entity_type = ? AND entity_id = ?) IS ?"
        );
        let result = row
            .bind(sqlx::query(&sql))
            .bind(event.entity_type.clone())
            .bind(event.entity_id.clone())
            .bind(expected_last.map(|c| c.as_str().to_string()))
            .execute(&self.pool)
            .await
            .map_err(StorageError::Unavailable)?;

        if result.rows_affected() == 0 {
            let actual = self
                .last_cursor(&event.entity_type, &event.entity_id)
                .await?;
            return Err(conflict(event, expected_last, actual));
        }
        debug!(
            "appended {} {}/{} at {} (expected last {:?})",
            event.event_type, event.entity_type, event.entity_id, event.cursor, expected_last
        );
        Ok(())
    }

    async fn query(&self, filter: &EventFilter) -> Result<Vec<Event>, StorageError> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {COLUMNS} FROM _events WHERE 1 = 1"));

        if let Some(entity_type) = &filter.entity_type {
            builder.push(" AND entity_type = ").push_bind(entity_type.clone());
        }
        if let Some(entity_id) = &filter.entity_id {
            builder.push(" AND entity_id = ").push_bind(entity_id.clone());
        }
        let (lower, upper) = if filter.include_boundary {
            (">=", "<=")
        } else {
            (">", "<")
        };
        if let Some(from) = &filter.cursor_from {
            builder
                .push(format!(" AND cursor {lower} "))
                .push_bind(from.as_str().to_string());
        }
        if let Some(to) = &filter.cursor_to {
            builder
                .push(format!(" AND cursor {upper} "))
                .push_bind(to.as_str().to_string());
        }

        let dir = filter.sort_dir.unwrap_or_default().keyword();
        match filter.sort_field.unwrap_or_default() {
            SortField::Cursor => builder.push(format!(" ORDER BY cursor {dir}")),
            field => builder.push(format!(
                " ORDER BY {} {dir}, cursor {dir}",
                field.column()
            )),
        };

        if let Some(limit) = filter.limit {
            builder
                .push(" LIMIT ")
                .push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        let rows = builder
            .build_query_as::<EventRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::Unavailable)?;
        debug!("query {:?} matched {} events", filter, rows.len());

        rows.into_iter().map(EventRow::into_event).collect()
    }
}
