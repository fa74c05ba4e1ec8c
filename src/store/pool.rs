//! Read connection pool
//!
//! Retrieval operations borrow pooled read-only connections; ingest owns the
//! single writer connection held by the store. Admission is bounded by a
//! semaphore, the actual query runs on the blocking pool (rusqlite is
//! synchronous), and transient lock errors are retried a bounded number of
//! times before surfacing as `StoreUnavailable`.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::Connection;
use tokio::sync::Semaphore;
use tracing::warn;

use crate::errors::{Result, SpecdexError};
use crate::store::db;

/// Attempts per operation when the database reports it is locked.
const LOCK_RETRY_ATTEMPTS: u32 = 3;

#[derive(Clone, Debug)]
pub struct ReadPool {
    inner: Arc<PoolInner>,
}

#[derive(Debug)]
struct PoolInner {
    dir: PathBuf,
    slots: Arc<Semaphore>,
    idle: Mutex<Vec<Connection>>,
}

impl ReadPool {
    pub fn new(dir: PathBuf, capacity: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                dir,
                slots: Arc::new(Semaphore::new(capacity.max(1))),
                idle: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Run a read-only closure against a pooled connection. Waits for a pool
    /// slot (the caller bounds the wait with its operation timeout), runs the
    /// query on the blocking pool, and returns the connection to the pool.
    pub async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: Fn(&Connection) -> Result<T> + Send + 'static,
    {
        let permit = self
            .inner
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| SpecdexError::StoreUnavailable("connection pool closed".to_string()))?;

        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let conn = inner.checkout()?;
            let result = run_with_retry(&conn, f);
            inner.checkin(conn);
            result
        })
        .await
        .map_err(|_| SpecdexError::StoreUnavailable("read worker panicked".to_string()))?
    }
}

impl PoolInner {
    fn checkout(&self) -> Result<Connection> {
        let pooled = self
            .idle
            .lock()
            .map_err(|_| SpecdexError::StoreUnavailable("connection pool poisoned".to_string()))?
            .pop();
        match pooled {
            Some(conn) => Ok(conn),
            None => db::open_reader(&self.dir),
        }
    }

    fn checkin(&self, conn: Connection) {
        if let Ok(mut idle) = self.idle.lock() {
            idle.push(conn);
        }
    }
}

/// Retry `f` on SQLITE_BUSY / SQLITE_LOCKED with a short backoff, then give
/// up with a transient error the transport layer may retry.
fn run_with_retry<T>(conn: &Connection, f: impl Fn(&Connection) -> Result<T>) -> Result<T> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match f(conn) {
            Err(SpecdexError::Sqlite(err)) if is_lock_error(&err) => {
                if attempt >= LOCK_RETRY_ATTEMPTS {
                    return Err(SpecdexError::StoreUnavailable(format!(
                        "database locked after {} attempts: {}",
                        attempt, err
                    )));
                }
                warn!(attempt, "database locked, retrying read");
                std::thread::sleep(Duration::from_millis(50 * attempt as u64));
            }
            other => return other,
        }
    }
}

fn is_lock_error(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked)
    )
}
