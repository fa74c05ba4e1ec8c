//! Database schema and migrations
//!
//! One SQLite file per specification store. The relational tables and the
//! FTS5 mirror live in the same file so a single transaction commits both.
//! The schema version is tracked in `api_metadata`; `migrate` applies any
//! missing steps idempotently and is called on every open.

use std::path::Path;

use rusqlite::{Connection, OpenFlags, OptionalExtension};

use crate::errors::{Result, SpecdexError};

/// Database file name inside a store directory.
pub const DB_FILE: &str = "specdex.db";

/// Current schema version. Bump when appending to `MIGRATIONS`.
pub const SCHEMA_VERSION: i64 = 1;

/// Each entry migrates from version (index) to (index + 1).
const MIGRATIONS: &[&str] = &[V1_BASE];

const V1_BASE: &str = r#"
CREATE TABLE IF NOT EXISTS apis (
    id          INTEGER PRIMARY KEY,
    name        TEXT NOT NULL UNIQUE,
    title       TEXT NOT NULL,
    version     TEXT NOT NULL,
    digest      TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS endpoints (
    id                    INTEGER PRIMARY KEY,
    api_id                INTEGER NOT NULL REFERENCES apis(id) ON DELETE CASCADE,
    path                  TEXT NOT NULL,
    method                TEXT NOT NULL,
    summary               TEXT,
    description           TEXT,
    operation_id          TEXT,
    deprecated            INTEGER NOT NULL DEFAULT 0,
    category              TEXT NOT NULL,
    category_group        TEXT,
    category_display_name TEXT,
    tags_json             TEXT NOT NULL DEFAULT '[]',
    parameters_json       TEXT NOT NULL DEFAULT '[]',
    request_body_json     TEXT,
    responses_json        TEXT NOT NULL DEFAULT '{}',
    UNIQUE (api_id, path, method)
);

CREATE INDEX IF NOT EXISTS idx_endpoints_category
    ON endpoints (api_id, category COLLATE NOCASE);
CREATE INDEX IF NOT EXISTS idx_endpoints_path_method
    ON endpoints (api_id, path, method);

CREATE TABLE IF NOT EXISTS schemas (
    id              INTEGER PRIMARY KEY,
    api_id          INTEGER NOT NULL REFERENCES apis(id) ON DELETE CASCADE,
    name            TEXT NOT NULL,
    body_json       TEXT NOT NULL,
    references_json TEXT NOT NULL DEFAULT '[]',
    UNIQUE (api_id, name)
);

CREATE TABLE IF NOT EXISTS endpoint_categories (
    id             INTEGER PRIMARY KEY,
    api_id         INTEGER NOT NULL REFERENCES apis(id) ON DELETE CASCADE,
    name           TEXT NOT NULL,
    display_name   TEXT,
    description    TEXT,
    category_group TEXT,
    endpoint_count INTEGER NOT NULL,
    methods_json   TEXT NOT NULL DEFAULT '[]',
    UNIQUE (api_id, name)
);

CREATE TABLE IF NOT EXISTS security_schemes (
    id          INTEGER PRIMARY KEY,
    api_id      INTEGER NOT NULL REFERENCES apis(id) ON DELETE CASCADE,
    name        TEXT NOT NULL,
    scheme_type TEXT NOT NULL,
    scheme      TEXT,
    location    TEXT,
    key_name    TEXT,
    UNIQUE (api_id, name)
);

CREATE VIRTUAL TABLE IF NOT EXISTS endpoints_fts USING fts5(
    path, summary, description, operation_id, tags, category,
    tokenize = 'porter unicode61'
);
"#;

/// Open (or create) the writer connection for a store directory.
pub fn open_writer(dir: &Path) -> Result<Connection> {
    let conn = Connection::open(dir.join(DB_FILE))?;
    configure(&conn)?;
    migrate(&conn)?;
    Ok(conn)
}

/// Open a read-only connection. The database must already exist.
pub fn open_reader(dir: &Path) -> Result<Connection> {
    let path = dir.join(DB_FILE);
    if !path.exists() {
        return Err(SpecdexError::NotFound(format!(
            "no store database at {}",
            path.display()
        )));
    }
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.busy_timeout(std::time::Duration::from_millis(5_000))?;
    Ok(conn)
}

/// Writer pragmas. WAL keeps readers on the prior committed snapshot while an
/// ingest transaction is open; the busy timeout makes lock waits block
/// instead of failing immediately.
fn configure(conn: &Connection) -> Result<()> {
    // journal_mode returns the resulting mode as a row.
    let _mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(std::time::Duration::from_millis(5_000))?;
    Ok(())
}

/// Apply any missing migration steps. Safe to call repeatedly and from every
/// open; each step runs in the surrounding transaction so a failed migration
/// leaves the prior version intact.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch("BEGIN IMMEDIATE;")?;
    let result = apply_migrations(conn);
    match result {
        Ok(()) => {
            conn.execute_batch("COMMIT;")?;
            Ok(())
        }
        Err(err) => {
            let _ = conn.execute_batch("ROLLBACK;");
            Err(err)
        }
    }
}

fn apply_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS api_metadata (key TEXT PRIMARY KEY, value TEXT NOT NULL);",
    )?;

    let current = schema_version(conn)?;
    if current > SCHEMA_VERSION {
        return Err(SpecdexError::StoreIntegrity(format!(
            "store schema version {} is newer than supported version {}",
            current, SCHEMA_VERSION
        )));
    }

    for (index, step) in MIGRATIONS.iter().enumerate() {
        let target = index as i64 + 1;
        if target > current {
            conn.execute_batch(step)?;
        }
    }

    conn.execute(
        "INSERT INTO api_metadata (key, value) VALUES ('schema_version', ?1)
         ON CONFLICT (key) DO UPDATE SET value = excluded.value",
        [SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}

/// Read the stored schema version; 0 when the store is brand new.
pub fn schema_version(conn: &Connection) -> Result<i64> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM api_metadata WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;

    match value {
        Some(v) => v.parse().map_err(|_| {
            SpecdexError::StoreIntegrity(format!("unreadable schema_version '{}'", v))
        }),
        None => Ok(0),
    }
}
