//! Connection management
//!
//! One connection per provider instance, shared by every adapter and
//! receiver through [`ConnectionManager::database_handle`].

use crate::error::StoreError;
use crate::memory::MemoryStreamLog;
use crate::repository::StreamLog;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};
use tracing::info;

/// Scheme selecting the in-process backend
pub const MEMORY_SCHEME: &str = "memory://";

/// Which backend a connection string selected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// In-process [`MemoryStreamLog`]
    Memory,
    /// Redis server
    Redis,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Memory => write!(f, "memory"),
            Backend::Redis => write!(f, "redis"),
        }
    }
}

/// Process-wide named in-memory logs, one per (name, database)
fn memory_instances() -> &'static Mutex<HashMap<(String, i64), Arc<MemoryStreamLog>>> {
    static INSTANCES: OnceLock<Mutex<HashMap<(String, i64), Arc<MemoryStreamLog>>>> = OnceLock::new();
    INSTANCES.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Owns the store connection and the selected database
#[derive(Clone)]
pub struct ConnectionManager {
    handle: Arc<dyn StreamLog>,
    backend: Backend,
    database: i64,
}

impl ConnectionManager {
    /// Connect using `connection_string`, selecting `database`.
    ///
    /// - `memory://<name>`: shared in-process log for `<name>` and `database`
    /// - `redis://…` / `rediss://…`: Redis server (feature `redis`)
    ///
    /// # Errors
    /// `StoreError::Config` for an empty or unsupported connection string;
    /// connection failures are returned as-is.
    pub async fn connect(connection_string: &str, database: i64) -> Result<Self, StoreError> {
        let connection_string = connection_string.trim();
        if connection_string.is_empty() {
            return Err(StoreError::Config("connection string is empty".to_string()));
        }

        if let Some(name) = connection_string.strip_prefix(MEMORY_SCHEME) {
            let handle = Self::memory_instance(name, database)?;
            info!(name, database, "Using in-memory stream log");
            return Ok(Self {
                handle,
                backend: Backend::Memory,
                database,
            });
        }

        if connection_string.starts_with("redis://") || connection_string.starts_with("rediss://") {
            return Self::connect_redis(connection_string, database).await;
        }

        Err(StoreError::Config(format!(
            "Unsupported connection string scheme: {}",
            connection_string.split("://").next().unwrap_or(connection_string)
        )))
    }

    /// Wrap an existing log (tests, embedding)
    pub fn from_log(handle: Arc<dyn StreamLog>, backend: Backend, database: i64) -> Self {
        Self {
            handle,
            backend,
            database,
        }
    }

    /// Ready-to-use handle to the selected database
    pub fn database_handle(&self) -> Arc<dyn StreamLog> {
        Arc::clone(&self.handle)
    }

    /// Backend in use
    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Selected database index
    pub fn database(&self) -> i64 {
        self.database
    }

    fn memory_instance(name: &str, database: i64) -> Result<Arc<dyn StreamLog>, StoreError> {
        let mut instances = memory_instances()
            .lock()
            .map_err(|_| StoreError::Connection("in-memory log registry poisoned".to_string()))?;
        let log = instances
            .entry((name.to_string(), database))
            .or_insert_with(|| Arc::new(MemoryStreamLog::new()));
        Ok(Arc::clone(log) as Arc<dyn StreamLog>)
    }

    #[cfg(feature = "redis")]
    async fn connect_redis(connection_string: &str, database: i64) -> Result<Self, StoreError> {
        let log = crate::redis_log::RedisStreamLog::connect(connection_string, database).await?;
        info!(database, "Connected to Redis stream log");
        Ok(Self {
            handle: Arc::new(log),
            backend: Backend::Redis,
            database,
        })
    }

    #[cfg(not(feature = "redis"))]
    async fn connect_redis(_connection_string: &str, _database: i64) -> Result<Self, StoreError> {
        Err(StoreError::Config(
            "Redis connection string given but the `redis` feature is not enabled".to_string(),
        ))
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("backend", &self.backend)
            .field("database", &self.database)
            .finish()
    }
}
