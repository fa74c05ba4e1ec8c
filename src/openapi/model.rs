//! Parsed specification records
//!
//! The streaming parser emits these typed records in document order. They are
//! also the shapes persisted into the store's JSON columns, so everything here
//! derives Serialize/Deserialize.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// HTTP methods recognized inside a path item. Anything else is skipped with
/// a recoverable warning.
pub const KNOWN_METHODS: &[&str] = &["get", "post", "put", "patch", "delete", "head", "options"];

/// Fixed (non-operation) path item fields, skipped without a warning.
pub const PATH_ITEM_FIELDS: &[&str] = &["summary", "description", "servers", "parameters", "$ref"];

/// Top-level API metadata from the `info` object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiInfo {
    pub title: String,
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Value of the top-level `openapi` field, e.g. "3.0.3".
    #[serde(default)]
    pub openapi_version: Option<String>,
}

/// A declared tag from the top-level `tags` array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// `x-displayName` extension; may contain non-ASCII text.
    #[serde(default)]
    pub display_name: Option<String>,
}

/// A tag group from the `x-tagGroups` extension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagGroupDefinition {
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A single parameter declared on an operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterRecord {
    pub name: String,
    /// Location: "path", "query", "header" or "cookie".
    pub location: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub schema: Option<Value>,
    #[serde(default)]
    pub example: Option<Value>,
}

/// Request body reference captured from an operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestBodyRecord {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
    /// Preferred media type, JSON when available.
    pub content_type: String,
    #[serde(default)]
    pub schema: Option<Value>,
}

/// One response entry keyed by status string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseRecord {
    #[serde(default)]
    pub description: String,
    /// Schema of the JSON content, when declared.
    #[serde(default)]
    pub schema: Option<Value>,
}

/// A single (path, method) operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    /// Canonical path template with `{name}` placeholders.
    pub path: String,
    /// Uppercase HTTP method.
    pub method: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub operation_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default)]
    pub parameters: Vec<ParameterRecord>,
    #[serde(default)]
    pub request_body: Option<RequestBodyRecord>,
    #[serde(default)]
    pub responses: IndexMap<String, ResponseRecord>,
}

/// A named component schema with its outgoing reference list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaRecord {
    pub name: String,
    /// Structural body as written in the document.
    pub body: Value,
    /// Component names this schema references via `$ref`. External references
    /// are kept as the full reference string and thus never resolve.
    #[serde(default)]
    pub references: Vec<String>,
}

/// A security scheme from `components.securitySchemes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityScheme {
    pub name: String,
    /// "http", "apiKey", "oauth2" or "openIdConnect".
    pub scheme_type: String,
    /// For "http": "bearer" or "basic".
    #[serde(default)]
    pub scheme: Option<String>,
    /// For "apiKey": "header", "query" or "cookie".
    #[serde(default)]
    pub location: Option<String>,
    /// For "apiKey": the header/query parameter name.
    #[serde(default)]
    pub key_name: Option<String>,
}

/// A record emitted by the streaming parser, in document order.
#[derive(Debug, Clone)]
pub enum ParsedRecord {
    Api(ApiInfo),
    Tag(TagDefinition),
    TagGroup(TagGroupDefinition),
    Endpoint(Endpoint),
    Schema(SchemaRecord),
    Security(SecurityScheme),
}

/// A recoverable condition observed while parsing. Ingest collects these into
/// its report; none of them stop the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SpecWarning {
    /// A path item key outside the recognized method set.
    UnknownMethod { path: String, method: String },
    /// A later operation replaced an earlier one for the same (path, method).
    DuplicateEndpoint { path: String, method: String },
    /// The `openapi` version field is present but not 3.x.
    UnsupportedVersion { version: String },
}

impl std::fmt::Display for SpecWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpecWarning::UnknownMethod { path, method } => {
                write!(f, "skipped unknown method '{}' on {}", method, path)
            }
            SpecWarning::DuplicateEndpoint { path, method } => {
                write!(f, "duplicate operation {} {}, later definition wins", method, path)
            }
            SpecWarning::UnsupportedVersion { version } => {
                write!(f, "specification declares openapi '{}', expected 3.x", version)
            }
        }
    }
}

/// Summary of one parse run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ParseReport {
    pub endpoints: usize,
    pub schemas: usize,
    pub tags: usize,
    pub tag_groups: usize,
    pub security_schemes: usize,
    pub bytes_read: u64,
    pub warnings: Vec<SpecWarning>,
}

impl Endpoint {
    /// Parameters declared with `in: path`.
    pub fn path_parameters(&self) -> impl Iterator<Item = &ParameterRecord> {
        self.parameters.iter().filter(|p| p.location == "path")
    }

    /// Parameters declared with `in: query`.
    pub fn query_parameters(&self) -> impl Iterator<Item = &ParameterRecord> {
        self.parameters.iter().filter(|p| p.location == "query")
    }
}

/// Extract the component name from a local schema reference, e.g.
/// `#/components/schemas/Campaign` -> `Campaign`. Non-local references are
/// returned whole so they are visibly unresolved.
pub fn reference_target(reference: &str) -> String {
    match reference.strip_prefix("#/components/schemas/") {
        Some(name) => name.to_string(),
        None => reference.to_string(),
    }
}

/// Walk a schema body and collect every `$ref` target, in document order,
/// without duplicates.
pub fn collect_references(body: &Value) -> Vec<String> {
    let mut out = Vec::new();
    walk_refs(body, &mut out);
    out
}

fn walk_refs(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if key == "$ref" {
                    if let Some(target) = child.as_str() {
                        let name = reference_target(target);
                        if !out.contains(&name) {
                            out.push(name);
                        }
                    }
                } else {
                    walk_refs(child, out);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                walk_refs(item, out);
            }
        }
        _ => {}
    }
}
