//! Read-only row mappers
//!
//! Everything the retrieval plane reads comes through these helpers; none of
//! them write. JSON columns are decoded back into the parser's record types
//! so parse -> persist -> read back round-trips.

use rusqlite::{Connection, OptionalExtension, Row};
use serde_json::Value;

use crate::errors::{Result, SpecdexError};
use crate::openapi::{Endpoint, SecurityScheme};

/// Column list matching `map_endpoint`'s indices.
pub const ENDPOINT_COLUMNS: &str = "id, path, method, summary, description, operation_id, \
     deprecated, category, category_group, category_display_name, \
     tags_json, parameters_json, request_body_json, responses_json";

/// One `apis` row.
#[derive(Debug, Clone)]
pub struct ApiRow {
    pub id: i64,
    pub name: String,
    pub title: String,
    pub version: String,
    pub digest: String,
    pub created_at: String,
}

/// A persisted endpoint together with its surrogate key and category fields.
#[derive(Debug, Clone)]
pub struct StoredEndpoint {
    pub id: i64,
    pub category: String,
    pub category_group: Option<String>,
    pub category_display_name: Option<String>,
    pub record: Endpoint,
}

/// A persisted schema with its outgoing reference list.
#[derive(Debug, Clone)]
pub struct SchemaRow {
    pub name: String,
    pub body: Value,
    pub references: Vec<String>,
}

/// The API this store serves. A store holds one specification; after a
/// re-ingest the replacement row is the newest, so order by id.
pub fn active_api(conn: &Connection) -> Result<ApiRow> {
    conn.query_row(
        "SELECT id, name, title, version, digest, created_at
         FROM apis ORDER BY id DESC LIMIT 1",
        [],
        |row| {
            Ok(ApiRow {
                id: row.get(0)?,
                name: row.get(1)?,
                title: row.get(2)?,
                version: row.get(3)?,
                digest: row.get(4)?,
                created_at: row.get(5)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| SpecdexError::NotFound("store contains no ingested API".to_string()))
}

/// Decode one `endpoints` row selected with [`ENDPOINT_COLUMNS`].
pub fn map_endpoint(row: &Row) -> rusqlite::Result<StoredEndpoint> {
    let tags_json: String = row.get(10)?;
    let parameters_json: String = row.get(11)?;
    let request_body_json: Option<String> = row.get(12)?;
    let responses_json: String = row.get(13)?;

    let record = Endpoint {
        path: row.get(1)?,
        method: row.get(2)?,
        summary: row.get(3)?,
        description: row.get(4)?,
        operation_id: row.get(5)?,
        tags: decode_json(10, &tags_json)?,
        deprecated: row.get(6)?,
        parameters: decode_json(11, &parameters_json)?,
        request_body: match request_body_json {
            Some(json) => Some(decode_json(12, &json)?),
            None => None,
        },
        responses: decode_json(13, &responses_json)?,
    };

    Ok(StoredEndpoint {
        id: row.get(0)?,
        category: row.get(7)?,
        category_group: row.get(8)?,
        category_display_name: row.get(9)?,
        record,
    })
}

/// Surface malformed stored JSON as a column-level error instead of panicking.
fn decode_json<T: serde::de::DeserializeOwned>(column: usize, json: &str) -> rusqlite::Result<T> {
    serde_json::from_str(json).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            rusqlite::types::Type::Text,
            Box::new(err),
        )
    })
}

pub fn endpoint_by_id(conn: &Connection, api_id: i64, id: i64) -> Result<Option<StoredEndpoint>> {
    let sql = format!(
        "SELECT {} FROM endpoints WHERE api_id = ?1 AND id = ?2",
        ENDPOINT_COLUMNS
    );
    conn.query_row(&sql, rusqlite::params![api_id, id], |row| map_endpoint(row))
        .optional()
        .map_err(Into::into)
}

/// Resolve an endpoint by its canonical path template. A path with several
/// methods resolves to the lexically first method so the result is stable.
pub fn endpoint_by_path(
    conn: &Connection,
    api_id: i64,
    path: &str,
) -> Result<Option<StoredEndpoint>> {
    let sql = format!(
        "SELECT {} FROM endpoints WHERE api_id = ?1 AND path = ?2 ORDER BY method LIMIT 1",
        ENDPOINT_COLUMNS
    );
    conn.query_row(&sql, rusqlite::params![api_id, path], |row| map_endpoint(row))
        .optional()
        .map_err(Into::into)
}

pub fn schema_by_name(conn: &Connection, api_id: i64, name: &str) -> Result<Option<SchemaRow>> {
    conn.query_row(
        "SELECT name, body_json, references_json FROM schemas WHERE api_id = ?1 AND name = ?2",
        rusqlite::params![api_id, name],
        |row| {
            let body_json: String = row.get(1)?;
            let references_json: String = row.get(2)?;
            Ok(SchemaRow {
                name: row.get(0)?,
                body: decode_json(1, &body_json)?,
                references: decode_json(2, &references_json)?,
            })
        },
    )
    .optional()
    .map_err(Into::into)
}

pub fn security_schemes(conn: &Connection, api_id: i64) -> Result<Vec<SecurityScheme>> {
    let mut stmt = conn.prepare(
        "SELECT name, scheme_type, scheme, location, key_name
         FROM security_schemes WHERE api_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map([api_id], |row| {
        Ok(SecurityScheme {
            name: row.get(0)?,
            scheme_type: row.get(1)?,
            scheme: row.get(2)?,
            location: row.get(3)?,
            key_name: row.get(4)?,
        })
    })?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
}

/// Row counts for one API, used by the status report.
pub fn entity_counts(conn: &Connection, api_id: i64) -> Result<(i64, i64, i64)> {
    let endpoints: i64 = conn.query_row(
        "SELECT count(*) FROM endpoints WHERE api_id = ?1",
        [api_id],
        |r| r.get(0),
    )?;
    let schemas: i64 = conn.query_row(
        "SELECT count(*) FROM schemas WHERE api_id = ?1",
        [api_id],
        |r| r.get(0),
    )?;
    let categories: i64 = conn.query_row(
        "SELECT count(*) FROM endpoint_categories WHERE api_id = ?1",
        [api_id],
        |r| r.get(0),
    )?;
    Ok((endpoints, schemas, categories))
}
