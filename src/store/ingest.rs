//! Specification ingest
//!
//! An ingest is one writer transaction: parse the byte stream, categorize,
//! replace any prior rows for the same API name, bulk-insert the normalized
//! records, rebuild the full-text mirror from the inserted rows, verify the
//! category invariants, commit. A failure at any point rolls back and leaves
//! the prior contents intact.

use std::io::Read;
use std::time::Instant;

use indexmap::IndexMap;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::categorize::{CategoryRollup, Categorizer};
use crate::errors::{Result, SpecdexError};
use crate::openapi::{
    parse_stream, ApiInfo, Endpoint, ParsedRecord, RecordSink, SchemaRecord, SecurityScheme,
    SpecWarning,
};

/// Outcome of one ingest, returned to the collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub api_id: i64,
    pub api_name: String,
    pub title: String,
    pub version: String,
    pub digest: String,
    pub endpoints: usize,
    pub schemas: usize,
    pub categories: usize,
    pub warnings: Vec<SpecWarning>,
    pub bytes_read: u64,
    pub elapsed_ms: u64,
    /// Whether a prior API with the same name was replaced.
    pub replaced: bool,
}

/// Accumulates parser records into normalized form. Endpoints are keyed by
/// (path, method) so a duplicate pair replaces the earlier one and records
/// a warning, per the later-wins rule.
#[derive(Default)]
struct SpecAccumulator {
    info: Option<ApiInfo>,
    categorizer: Categorizer,
    endpoints: IndexMap<(String, String), Endpoint>,
    schemas: Vec<SchemaRecord>,
    security: Vec<SecurityScheme>,
    duplicate_warnings: Vec<SpecWarning>,
}

impl RecordSink for SpecAccumulator {
    fn record(&mut self, record: ParsedRecord) -> Result<()> {
        match record {
            ParsedRecord::Api(info) => self.info = Some(info),
            ParsedRecord::Tag(tag) => self.categorizer.add_tag(tag),
            ParsedRecord::TagGroup(group) => self.categorizer.add_group(group),
            ParsedRecord::Endpoint(endpoint) => {
                let key = (endpoint.path.clone(), endpoint.method.clone());
                if self.endpoints.insert(key.clone(), endpoint).is_some() {
                    self.duplicate_warnings.push(SpecWarning::DuplicateEndpoint {
                        path: key.0,
                        method: key.1,
                    });
                }
            }
            ParsedRecord::Schema(schema) => self.schemas.push(schema),
            ParsedRecord::Security(scheme) => self.security.push(scheme),
        }
        Ok(())
    }
}

/// Ingest a specification from `reader` under the API name `name`.
///
/// `overwrite` controls what happens when the name is already present:
/// replace wholesale (true) or fail without touching the store (false).
pub fn ingest_reader<R: Read>(
    conn: &mut Connection,
    name: &str,
    reader: R,
    overwrite: bool,
) -> Result<IngestReport> {
    let started = Instant::now();

    let mut digesting = DigestReader::new(reader);
    let mut accumulator = SpecAccumulator::default();
    let parse_report = parse_stream(&mut digesting, &mut accumulator)?;
    let digest = digesting.finish();

    let info = accumulator.info.take().ok_or_else(|| {
        SpecdexError::InvalidSpecification {
            offset: parse_report.bytes_read,
            message: "specification carries no info object".to_string(),
        }
    })?;

    let tx = conn.transaction()?;

    let existing: Option<i64> = tx
        .query_row("SELECT id FROM apis WHERE name = ?1", [name], |row| row.get(0))
        .optional()?;
    if let Some(api_id) = existing {
        if !overwrite {
            return Err(SpecdexError::Argument(format!(
                "API '{}' already exists in this store; pass overwrite to replace it",
                name
            )));
        }
        delete_api_rows(&tx, api_id)?;
        debug!(api = %name, "replaced prior specification rows");
    }

    let created_at = chrono::Utc::now().to_rfc3339();
    tx.execute(
        "INSERT INTO apis (name, title, version, digest, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![name, info.title, info.version, digest, created_at],
    )?;
    let api_id = tx.last_insert_rowid();

    let mut rollup = CategoryRollup::new();
    {
        let mut insert_endpoint = tx.prepare(
            "INSERT INTO endpoints
               (api_id, path, method, summary, description, operation_id, deprecated,
                category, category_group, category_display_name,
                tags_json, parameters_json, request_body_json, responses_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        )?;

        for endpoint in accumulator.endpoints.values() {
            let assignment = accumulator.categorizer.categorize(endpoint);
            rollup.observe(&assignment, &endpoint.method);

            let request_body_json = endpoint
                .request_body
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;
            insert_endpoint.execute(params![
                api_id,
                endpoint.path,
                endpoint.method,
                endpoint.summary,
                endpoint.description,
                endpoint.operation_id,
                endpoint.deprecated,
                assignment.name,
                assignment.group,
                assignment.display_name,
                serde_json::to_string(&endpoint.tags)?,
                serde_json::to_string(&endpoint.parameters)?,
                request_body_json,
                serde_json::to_string(&endpoint.responses)?,
            ])?;
        }
    }

    {
        let mut insert_schema = tx.prepare(
            "INSERT INTO schemas (api_id, name, body_json, references_json)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for schema in &accumulator.schemas {
            insert_schema.execute(params![
                api_id,
                schema.name,
                serde_json::to_string(&schema.body)?,
                serde_json::to_string(&schema.references)?,
            ])?;
        }
    }

    let categories = rollup.finish();
    {
        let mut insert_category = tx.prepare(
            "INSERT INTO endpoint_categories
               (api_id, name, display_name, description, category_group,
                endpoint_count, methods_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for category in &categories {
            insert_category.execute(params![
                api_id,
                category.name,
                category.display_name,
                category.description,
                category.group,
                category.endpoint_count,
                serde_json::to_string(&category.methods)?,
            ])?;
        }
    }

    {
        let mut insert_scheme = tx.prepare(
            "INSERT INTO security_schemes (api_id, name, scheme_type, scheme, location, key_name)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for scheme in &accumulator.security {
            insert_scheme.execute(params![
                api_id,
                scheme.name,
                scheme.scheme_type,
                scheme.scheme,
                scheme.location,
                scheme.key_name,
            ])?;
        }
    }

    rebuild_fts(&tx, api_id)?;
    verify_category_invariants(&tx, api_id)?;

    tx.commit()?;

    let mut warnings = parse_report.warnings;
    warnings.extend(accumulator.duplicate_warnings);

    let report = IngestReport {
        api_id,
        api_name: name.to_string(),
        title: info.title,
        version: info.version,
        digest,
        endpoints: accumulator.endpoints.len(),
        schemas: accumulator.schemas.len(),
        categories: categories.len(),
        warnings,
        bytes_read: parse_report.bytes_read,
        elapsed_ms: started.elapsed().as_millis() as u64,
        replaced: existing.is_some(),
    };

    info!(
        api = %report.api_name,
        endpoints = report.endpoints,
        schemas = report.schemas,
        categories = report.categories,
        warnings = report.warnings.len(),
        elapsed_ms = report.elapsed_ms,
        "ingest complete"
    );
    Ok(report)
}

/// Remove every row belonging to an API. The FTS mirror has no foreign key,
/// so it is cleared explicitly before the cascade.
fn delete_api_rows(tx: &Transaction, api_id: i64) -> Result<()> {
    tx.execute(
        "DELETE FROM endpoints_fts WHERE rowid IN
           (SELECT id FROM endpoints WHERE api_id = ?1)",
        [api_id],
    )?;
    tx.execute("DELETE FROM apis WHERE id = ?1", [api_id])?;
    Ok(())
}

/// Populate the FTS mirror by reading back the endpoints just inserted.
/// rowid is the endpoint id, so a MATCH result joins straight back.
fn rebuild_fts(tx: &Transaction, api_id: i64) -> Result<()> {
    let mut read_back = tx.prepare(
        "SELECT id, path, summary, description, operation_id, tags_json, category
         FROM endpoints WHERE api_id = ?1",
    )?;
    let mut insert_fts = tx.prepare(
        "INSERT INTO endpoints_fts
           (rowid, path, summary, description, operation_id, tags, category)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;

    let mut rows = read_back.query([api_id])?;
    while let Some(row) = rows.next()? {
        let id: i64 = row.get(0)?;
        let path: String = row.get(1)?;
        let summary: Option<String> = row.get(2)?;
        let description: Option<String> = row.get(3)?;
        let operation_id: Option<String> = row.get(4)?;
        let tags_json: String = row.get(5)?;
        let category: String = row.get(6)?;

        let tags: Vec<String> = serde_json::from_str(&tags_json)?;
        insert_fts.execute(params![
            id,
            tokenize_path(&path),
            summary.unwrap_or_default(),
            description.unwrap_or_default(),
            operation_id.unwrap_or_default(),
            tags.join(" "),
            category,
        ])?;
    }
    Ok(())
}

/// Break a path template into searchable terms: `/client/statistics/{id}`
/// also indexes as `client statistics id`.
fn tokenize_path(path: &str) -> String {
    let words: Vec<&str> = path
        .split(|c: char| c == '/' || c == '{' || c == '}')
        .filter(|s| !s.is_empty())
        .collect();
    format!("{} {}", path, words.join(" "))
}

/// Every endpoint's category must have a summary row whose count matches.
/// Computed and verified in the same transaction; a mismatch rolls back.
fn verify_category_invariants(tx: &Transaction, api_id: i64) -> Result<()> {
    let mismatches: i64 = tx.query_row(
        "SELECT count(*) FROM (
             SELECT e.category, count(*) AS n
             FROM endpoints e WHERE e.api_id = ?1
             GROUP BY e.category
         ) actual
         LEFT JOIN endpoint_categories c
           ON c.api_id = ?1 AND c.name = actual.category
         WHERE c.endpoint_count IS NULL OR c.endpoint_count != actual.n",
        [api_id],
        |row| row.get(0),
    )?;

    if mismatches > 0 {
        return Err(SpecdexError::StoreIntegrity(format!(
            "{} categories disagree with their endpoint counts",
            mismatches
        )));
    }
    Ok(())
}

/// `io::Read` wrapper that hashes and counts the bytes as they stream by.
struct DigestReader<R> {
    inner: R,
    hasher: Sha256,
}

impl<R: Read> DigestReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

impl<R: Read> Read for DigestReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}
