//! Lexicographically ordered event cursors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{LazyLock, Mutex, PoisonError};

/// Width of the zero-padded sub-tick counter.
const COUNTER_WIDTH: usize = 6;

/// Largest counter value that still fits in [`COUNTER_WIDTH`] digits.
const MAX_COUNTER: u32 = 999_999;

/// Millisecond timestamp layout. Fixed width for years 0000-9999.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// An opaque token that orders events.
///
/// All range and ordering semantics are plain string comparison: a cursor
/// emitted later by the same [`CursorGenerator`] always compares greater.
///
/// # Examples
///
/// ```
/// use entityfold::Cursor;
///
/// let a = Cursor::from("2024-01-01T00:00:00.000Z.000000");
/// let b = Cursor::from("2024-01-01T00:00:00.000Z.000001");
/// assert!(a < b);
/// assert_eq!(b.as_str(), "2024-01-01T00:00:00.000Z.000001");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Cursor {
    fn from(value: String) -> Self {
        Cursor(value)
    }
}

impl From<&str> for Cursor {
    fn from(value: &str) -> Self {
        Cursor(value.to_string())
    }
}

#[derive(Debug)]
struct Tick {
    millis: i64,
    counter: u32,
}

impl Default for Tick {
    fn default() -> Self {
        Tick {
            millis: i64::MIN,
            counter: 0,
        }
    }
}

/// Emits strictly increasing cursors.
///
/// A cursor is the emission millisecond followed by a six digit counter that
/// disambiguates emissions within the same millisecond. If the wall clock
/// steps backwards the generator keeps counting on its last millisecond, so
/// ordering never regresses within one generator.
///
/// Cursors from different generators are not ordered against each other.
/// Everything appending to the same log must share one generator, which is
/// what [`CursorGenerator::shared`] is for.
#[derive(Debug, Default)]
pub struct CursorGenerator {
    last: Mutex<Tick>,
}

static SHARED: LazyLock<CursorGenerator> = LazyLock::new(CursorGenerator::new);

impl CursorGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide generator used by every [`EntityStore`](crate::EntityStore).
    pub fn shared() -> &'static CursorGenerator {
        &SHARED
    }

    /// Emit the next cursor and the logical timestamp it encodes.
    pub fn next(&self) -> (Cursor, DateTime<Utc>) {
        self.next_at(Utc::now())
    }

    /// Emit the next cursor as if the wall clock read `now`.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::{TimeZone, Utc};
    /// use entityfold::CursorGenerator;
    ///
    /// let generator = CursorGenerator::new();
    /// let now = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
    ///
    /// let (first, _) = generator.next_at(now);
    /// let (second, _) = generator.next_at(now);
    /// assert_eq!(first.as_str(), "2023-11-14T22:13:20.000Z.000000");
    /// assert_eq!(second.as_str(), "2023-11-14T22:13:20.000Z.000001");
    /// ```
    pub fn next_at(&self, now: DateTime<Utc>) -> (Cursor, DateTime<Utc>) {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);

        let millis = now.timestamp_millis();
        if millis > last.millis {
            last.millis = millis;
            last.counter = 0;
        } else if last.counter < MAX_COUNTER {
            last.counter += 1;
        } else {
            last.millis += 1;
            last.counter = 0;
        }

        let date = DateTime::from_timestamp_millis(last.millis).unwrap_or(now);
        let cursor = format!(
            "{}.{:0width$}",
            date.format(TIMESTAMP_FORMAT),
            last.counter,
            width = COUNTER_WIDTH
        );
        (Cursor(cursor), date)
    }
}

/// Format a timestamp in the fixed-width layout used inside cursors.
pub(crate) fn format_timestamp(date: &DateTime<Utc>) -> String {
    date.format(TIMESTAMP_FORMAT).to_string()
}
