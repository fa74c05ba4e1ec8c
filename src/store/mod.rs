//! Persistent specification store
//!
//! One store directory per specification: an SQLite database holding the
//! relational tables and the FTS5 mirror. Single writer, pooled readers.
//! Open handles are cached process-wide and torn down on shutdown.

pub mod db;
pub mod ingest;
pub mod pool;
pub mod repo;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use once_cell::sync::Lazy;
use rusqlite::Connection;
use serde::Serialize;
use tracing::debug;

use crate::config::Config;
use crate::errors::{Result, SpecdexError};
pub use ingest::IngestReport;
use pool::ReadPool;

/// Process-wide cache of open store handles, keyed by canonical directory.
static OPEN_STORES: Lazy<DashMap<PathBuf, Arc<Store>>> = Lazy::new(DashMap::new);

/// Handle to one specification store.
#[derive(Debug)]
pub struct Store {
    dir: PathBuf,
    writer: Mutex<Connection>,
    readers: ReadPool,
}

/// What `status` reports about a store.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub name: String,
    pub title: String,
    pub version: String,
    pub digest: String,
    pub created_at: String,
    pub endpoints: i64,
    pub schemas: i64,
    pub categories: i64,
    pub schema_version: i64,
    pub db_size_bytes: u64,
}

impl Store {
    /// Create the store directory (if needed) and initialize the database.
    pub fn create(dir: &Path, config: &Config) -> Result<Arc<Self>> {
        std::fs::create_dir_all(dir)?;
        Self::open_inner(dir, config)
    }

    /// Open an existing store. Migrations are applied idempotently.
    pub fn open(dir: &Path, config: &Config) -> Result<Arc<Self>> {
        if !dir.join(db::DB_FILE).exists() {
            return Err(SpecdexError::NotFound(format!(
                "no store at {}",
                dir.display()
            )));
        }
        Self::open_inner(dir, config)
    }

    fn open_inner(dir: &Path, config: &Config) -> Result<Arc<Self>> {
        let writer = db::open_writer(dir)?;
        debug!(dir = %dir.display(), "opened store");
        Ok(Arc::new(Self {
            dir: dir.to_path_buf(),
            writer: Mutex::new(writer),
            readers: ReadPool::new(dir.to_path_buf(), config.read_pool_size),
        }))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Ingest a specification byte stream. Serialized with any concurrent
    /// ingest by the writer lock; one transaction end to end.
    pub fn ingest_sync<R: Read>(
        &self,
        name: &str,
        reader: R,
        overwrite: bool,
    ) -> Result<IngestReport> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| SpecdexError::StoreUnavailable("writer lock poisoned".to_string()))?;
        ingest::ingest_reader(&mut writer, name, reader, overwrite)
    }

    /// Async ingest from an already-loaded byte buffer, run on the blocking
    /// pool so the retrieval plane keeps serving.
    pub async fn ingest_bytes(
        self: &Arc<Self>,
        name: String,
        bytes: Vec<u8>,
        overwrite: bool,
    ) -> Result<IngestReport> {
        let store = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            store.ingest_sync(&name, std::io::Cursor::new(bytes), overwrite)
        })
        .await
        .map_err(|_| SpecdexError::StoreUnavailable("ingest worker panicked".to_string()))?
    }

    /// Run a read-only closure on a pooled connection.
    pub async fn with_read<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: Fn(&Connection) -> Result<T> + Send + 'static,
    {
        self.readers.run(f).await
    }

    /// Synchronous status snapshot, used by the CLI.
    pub fn status_sync(&self) -> Result<StatusReport> {
        let conn = db::open_reader(&self.dir)?;
        let api = repo::active_api(&conn)?;
        let (endpoints, schemas, categories) = repo::entity_counts(&conn, api.id)?;
        let schema_version = db::schema_version(&conn)?;
        let db_size_bytes = std::fs::metadata(self.dir.join(db::DB_FILE))
            .map(|m| m.len())
            .unwrap_or(0);

        Ok(StatusReport {
            name: api.name,
            title: api.title,
            version: api.version,
            digest: api.digest,
            created_at: api.created_at,
            endpoints,
            schemas,
            categories,
            schema_version,
            db_size_bytes,
        })
    }
}

/// Open a store through the process-wide cache. Handles are created lazily on
/// first use and shared after that; configuration is fixed at first open.
pub fn open_cached(dir: &Path, config: &Config) -> Result<Arc<Store>> {
    let key = dir
        .canonicalize()
        .unwrap_or_else(|_| dir.to_path_buf());

    if let Some(store) = OPEN_STORES.get(&key) {
        return Ok(Arc::clone(&store));
    }
    let store = Store::open(dir, config)?;
    OPEN_STORES.insert(key, Arc::clone(&store));
    Ok(store)
}

/// Drop every cached handle. Called on graceful shutdown.
pub fn shutdown() {
    OPEN_STORES.clear();
}
