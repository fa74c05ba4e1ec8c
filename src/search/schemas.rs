//! Schema retrieval
//!
//! Fetches a component schema and expands its outgoing references
//! breadth-first, bounded by a depth cap and a visited set so cyclic schema
//! graphs terminate. Also reports which endpoints use the root schema and at
//! which site (request body or response).

use std::collections::VecDeque;

use indexmap::{IndexMap, IndexSet};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;

use crate::errors::{Result, SpecdexError};
use crate::openapi::collect_references;
use crate::store::repo;

/// Depth bounds for reference expansion.
pub const MIN_DEPTH: u32 = 1;
pub const MAX_DEPTH: u32 = 10;
pub const DEFAULT_DEPTH: u32 = 5;

#[derive(Debug, Clone)]
pub struct SchemaRequest {
    pub component_name: String,
    pub max_depth: u32,
    pub include_examples: bool,
}

impl SchemaRequest {
    pub fn new(
        component_name: String,
        max_depth: Option<u32>,
        include_examples: Option<bool>,
    ) -> Result<Self> {
        let component_name = component_name.trim().to_string();
        if component_name.is_empty() {
            return Err(SpecdexError::Argument(
                "componentName must not be empty".to_string(),
            ));
        }

        let max_depth = max_depth.unwrap_or(DEFAULT_DEPTH);
        if !(MIN_DEPTH..=MAX_DEPTH).contains(&max_depth) {
            return Err(SpecdexError::Argument(format!(
                "maxDepth must be between {} and {}",
                MIN_DEPTH, MAX_DEPTH
            )));
        }

        Ok(Self {
            component_name,
            max_depth,
            include_examples: include_examples.unwrap_or(true),
        })
    }
}

/// An endpoint that references the requested schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointRef {
    pub path: String,
    pub method: String,
    /// "request" or "response".
    pub usage: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchemaResponse {
    pub component_name: String,
    pub schema: Value,
    /// Transitively referenced schemas, keyed by component name. Each key
    /// appears once regardless of how many paths reach it.
    pub referenced_schemas: IndexMap<String, Value>,
    pub used_by: Vec<EndpointRef>,
}

/// Fetch a schema and expand its reference graph.
pub fn get_schema(
    conn: &Connection,
    api_id: i64,
    request: &SchemaRequest,
) -> Result<SchemaResponse> {
    let root = repo::schema_by_name(conn, api_id, &request.component_name)?
        .ok_or_else(|| {
            SpecdexError::NotFound(format!(
                "schema '{}' does not exist in this API",
                request.component_name
            ))
        })?;

    let mut referenced_schemas = IndexMap::new();
    let mut visited: IndexSet<String> = IndexSet::new();
    visited.insert(root.name.clone());

    let mut queue: VecDeque<(String, u32)> = root
        .references
        .iter()
        .map(|name| (name.clone(), 1))
        .collect();

    while let Some((name, depth)) = queue.pop_front() {
        if depth > request.max_depth || !visited.insert(name.clone()) {
            continue;
        }
        // Unresolved references (external or missing) are skipped quietly;
        // they stay visible as `$ref` strings inside the returned bodies.
        let Some(row) = repo::schema_by_name(conn, api_id, &name)? else {
            continue;
        };
        for reference in &row.references {
            queue.push_back((reference.clone(), depth + 1));
        }
        referenced_schemas.insert(row.name, prepare_body(row.body, request.include_examples));
    }

    let used_by = endpoints_using(conn, api_id, &request.component_name)?;

    Ok(SchemaResponse {
        component_name: root.name,
        schema: prepare_body(root.body, request.include_examples),
        referenced_schemas,
        used_by,
    })
}

fn prepare_body(body: Value, include_examples: bool) -> Value {
    if include_examples {
        return body;
    }
    strip_examples(body)
}

fn strip_examples(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(key, _)| key != "example" && key != "examples")
                .map(|(key, child)| (key, strip_examples(child)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_examples).collect()),
        other => other,
    }
}

/// Find endpoints whose request body or responses reference `name`. An
/// `instr` prefilter narrows the scan; the JSON columns are then parsed to
/// rule out substring collisions.
fn endpoints_using(conn: &Connection, api_id: i64, name: &str) -> Result<Vec<EndpointRef>> {
    let needle = format!("#/components/schemas/{}\"", name);

    let mut stmt = conn.prepare(
        "SELECT path, method, request_body_json, responses_json
         FROM endpoints
         WHERE api_id = ?1
           AND instr(coalesce(request_body_json, '') || responses_json, ?2) > 0
         ORDER BY path, method",
    )?;

    let rows = stmt.query_map(rusqlite::params![api_id, needle], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, String>(3)?,
        ))
    })?;

    let mut used_by = Vec::new();
    for row in rows {
        let (path, method, request_body_json, responses_json) = row?;

        if let Some(json) = request_body_json {
            let body: Value = serde_json::from_str(&json)?;
            let schema = body.get("schema").cloned().unwrap_or(Value::Null);
            if collect_references(&schema).iter().any(|r| r == name) {
                used_by.push(EndpointRef {
                    path: path.clone(),
                    method: method.clone(),
                    usage: "request".to_string(),
                });
            }
        }

        let responses: Value = serde_json::from_str(&responses_json)?;
        if collect_references(&responses).iter().any(|r| r == name) {
            used_by.push(EndpointRef {
                path,
                method,
                usage: "response".to_string(),
            });
        }
    }
    Ok(used_by)
}
