//! Backend selection.

use crate::error::ConfigError;

/// Environment variable holding the database URL.
pub const DATABASE_URL: &str = "DATABASE_URL";

/// Environment variable bounding the relational connection pool.
pub const DATABASE_MAX_CONNECTIONS: &str = "DATABASE_MAX_CONNECTIONS";

const DEFAULT_URL: &str = "memory";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Where the event log lives.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Backend {
    /// Events held in process memory, released with the store.
    #[default]
    Memory,
    /// Events persisted to SQLite.
    Sqlite { url: String, max_connections: u32 },
}

impl Backend {
    /// SQLite backend for `url` with the default pool size.
    pub fn sqlite(url: impl Into<String>) -> Self {
        Backend::Sqlite {
            url: url.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

/// Store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StoreConfig {
    pub backend: Backend,
}

impl StoreConfig {
    /// Select a backend from a database URL.
    ///
    /// `memory`, `memory:` and `memory://` select the in-memory backend;
    /// `sqlite:` URLs (`sqlite::memory:`, `sqlite://events.db`) select SQLite.
    ///
    /// # Examples
    ///
    /// ```
    /// use entityfold::config::{Backend, StoreConfig};
    ///
    /// let config = StoreConfig::from_url("memory").unwrap();
    /// assert_eq!(config.backend, Backend::Memory);
    ///
    /// let config = StoreConfig::from_url("sqlite://events.db").unwrap();
    /// assert_eq!(config.backend, Backend::sqlite("sqlite://events.db"));
    ///
    /// assert!(StoreConfig::from_url("postgres://localhost/app").is_err());
    /// ```
    pub fn from_url(url: &str) -> Result<Self, ConfigError> {
        let url = url.trim();
        let backend = match url {
            "memory" | "memory:" | "memory://" => Backend::Memory,
            _ if url.starts_with("sqlite:") => Backend::sqlite(url),
            _ => {
                let scheme = url.split(':').next().unwrap_or(url);
                return Err(ConfigError::UnsupportedScheme(scheme.to_string()));
            }
        };
        Ok(StoreConfig { backend })
    }

    /// Read the configuration from `DATABASE_URL` (default `memory`) and
    /// `DATABASE_MAX_CONNECTIONS` (default 5).
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = std::env::var(DATABASE_URL).unwrap_or_else(|_| DEFAULT_URL.to_string());
        let max = std::env::var(DATABASE_MAX_CONNECTIONS).ok();
        Self::from_parts(&url, max.as_deref())
    }

    fn from_parts(url: &str, max_connections: Option<&str>) -> Result<Self, ConfigError> {
        let mut config = Self::from_url(url)?;
        if let (Backend::Sqlite { max_connections: max, .. }, Some(raw)) =
            (&mut config.backend, max_connections)
        {
            *max = raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| ConfigError::InvalidValue {
                    key: DATABASE_MAX_CONNECTIONS.to_string(),
                    value: raw.to_string(),
                })?;
        }
        Ok(config)
    }
}
