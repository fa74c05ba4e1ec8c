//! Example rendering
//!
//! Turns a stored endpoint into a runnable request snippet in a requested
//! target language. Path parameters get deterministic placeholders, the
//! request body is synthesized from the referenced schema (bounded depth),
//! and the API's security scheme contributes an auth header placeholder.
//! Same inputs, same output.

mod body;

use std::fmt;
use std::str::FromStr;

use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;

use crate::errors::{Result, SpecdexError};
use crate::openapi::SecurityScheme;
use crate::store::repo::{self, StoredEndpoint};

pub use body::example_value;

/// Base URL used in rendered snippets. Specifications may declare several
/// servers; snippets stay neutral and let the caller substitute theirs.
const BASE_URL: &str = "https://api.example.com";

/// Target languages for rendered examples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Curl,
    Javascript,
    Typescript,
    Python,
}

impl Language {
    pub const SUPPORTED: &'static [&'static str] =
        &["curl", "javascript", "typescript", "python"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Curl => "curl",
            Language::Javascript => "javascript",
            Language::Typescript => "typescript",
            Language::Python => "python",
        }
    }

    /// Packages a consumer must install to run the snippet.
    fn dependencies(&self) -> Vec<String> {
        match self {
            Language::Python => vec!["requests".to_string()],
            _ => Vec::new(),
        }
    }
}

impl FromStr for Language {
    type Err = SpecdexError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "curl" => Ok(Language::Curl),
            "javascript" | "js" => Ok(Language::Javascript),
            "typescript" | "ts" => Ok(Language::Typescript),
            "python" | "py" => Ok(Language::Python),
            other => Err(SpecdexError::Argument(format!(
                "unsupported language '{}'; supported: {}",
                other,
                Language::SUPPORTED.join(", ")
            ))),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Endpoint identifier as accepted on the wire: the numeric surrogate key or
/// the canonical path template. A numeric string resolves as numeric first.
#[derive(Debug, Clone, PartialEq)]
pub enum EndpointId {
    Numeric(i64),
    Path(String),
}

impl EndpointId {
    /// Accept either JSON form without making callers pre-convert.
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .map(EndpointId::Numeric)
                .ok_or_else(|| SpecdexError::Argument("endpointId must be an integer".to_string())),
            Value::String(s) if !s.trim().is_empty() => Ok(EndpointId::Path(s.trim().to_string())),
            _ => Err(SpecdexError::Argument(
                "endpointId must be a number or a non-empty string".to_string(),
            )),
        }
    }

    fn resolve(&self, conn: &Connection, api_id: i64) -> Result<StoredEndpoint> {
        let found = match self {
            EndpointId::Numeric(id) => repo::endpoint_by_id(conn, api_id, *id)?,
            EndpointId::Path(text) => {
                let numeric = text
                    .parse::<i64>()
                    .ok()
                    .map(|id| repo::endpoint_by_id(conn, api_id, id))
                    .transpose()?
                    .flatten();
                match numeric {
                    Some(endpoint) => Some(endpoint),
                    None => repo::endpoint_by_path(conn, api_id, text)?,
                }
            }
        };
        found.ok_or_else(|| SpecdexError::NotFound(format!("endpoint '{}' not found", self)))
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointId::Numeric(id) => write!(f, "{}", id),
            EndpointId::Path(path) => f.write_str(path),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExampleMetadata {
    /// Name of the security scheme the snippet authenticates with.
    pub auth_scheme: Option<String>,
    pub dependencies: Vec<String>,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderedExample {
    pub endpoint_id: i64,
    pub path: String,
    pub method: String,
    pub language: String,
    pub code: String,
    pub metadata: ExampleMetadata,
}

/// Render a request example for an endpoint.
pub fn render_example(
    conn: &Connection,
    api_id: i64,
    id: &EndpointId,
    language: Language,
) -> Result<RenderedExample> {
    let stored = id.resolve(conn, api_id)?;
    let endpoint = &stored.record;

    let url = build_url(endpoint);
    let auth = auth_header(&repo::security_schemes(conn, api_id)?);
    let payload = request_payload(conn, api_id, endpoint)?;

    let mut headers: Vec<(String, String)> = Vec::new();
    let content_type = payload.as_ref().map(|_| "application/json".to_string());
    if let Some(ct) = &content_type {
        headers.push(("Content-Type".to_string(), ct.clone()));
    }
    if let Some((name, value, _)) = &auth {
        headers.push((name.clone(), value.clone()));
    }

    let code = match language {
        Language::Curl => render_curl(&endpoint.method, &url, &headers, payload.as_ref()),
        Language::Python => render_python(&endpoint.method, &url, &headers, payload.as_ref()),
        Language::Javascript => {
            render_fetch(&endpoint.method, &url, &headers, payload.as_ref(), false)
        }
        Language::Typescript => {
            render_fetch(&endpoint.method, &url, &headers, payload.as_ref(), true)
        }
    };

    Ok(RenderedExample {
        endpoint_id: stored.id,
        path: endpoint.path.clone(),
        method: endpoint.method.clone(),
        language: language.as_str().to_string(),
        code,
        metadata: ExampleMetadata {
            auth_scheme: auth.map(|(_, _, scheme)| scheme),
            dependencies: language.dependencies(),
            content_type,
        },
    })
}

/// Substitute path parameters and append required query parameters.
fn build_url(endpoint: &crate::openapi::Endpoint) -> String {
    let mut path = endpoint.path.clone();
    for param in endpoint.path_parameters() {
        let placeholder = format!("{{{}}}", param.name);
        let value = body::parameter_placeholder(param.schema.as_ref(), param.example.as_ref());
        path = path.replace(&placeholder, &value);
    }

    let query: Vec<String> = endpoint
        .query_parameters()
        .filter(|p| p.required)
        .map(|p| {
            let value = body::parameter_placeholder(p.schema.as_ref(), p.example.as_ref());
            format!("{}={}", p.name, value)
        })
        .collect();

    if query.is_empty() {
        format!("{}{}", BASE_URL, path)
    } else {
        format!("{}{}?{}", BASE_URL, path, query.join("&"))
    }
}

/// Header placeholder for the API's first declared security scheme:
/// (header name, header value, scheme name).
fn auth_header(schemes: &[SecurityScheme]) -> Option<(String, String, String)> {
    let scheme = schemes.first()?;
    match scheme.scheme_type.as_str() {
        "http" => match scheme.scheme.as_deref() {
            Some("basic") => Some((
                "Authorization".to_string(),
                "Basic YOUR_CREDENTIALS".to_string(),
                scheme.name.clone(),
            )),
            _ => Some((
                "Authorization".to_string(),
                "Bearer YOUR_TOKEN_HERE".to_string(),
                scheme.name.clone(),
            )),
        },
        "apiKey" if scheme.location.as_deref() == Some("header") => Some((
            scheme.key_name.clone().unwrap_or_else(|| "X-API-Key".to_string()),
            "YOUR_API_KEY".to_string(),
            scheme.name.clone(),
        )),
        "oauth2" | "openIdConnect" => Some((
            "Authorization".to_string(),
            "Bearer YOUR_TOKEN_HERE".to_string(),
            scheme.name.clone(),
        )),
        _ => None,
    }
}

/// Synthesize the request body literal, resolving schema references to a
/// bounded depth.
fn request_payload(
    conn: &Connection,
    api_id: i64,
    endpoint: &crate::openapi::Endpoint,
) -> Result<Option<Value>> {
    let Some(request_body) = &endpoint.request_body else {
        return Ok(None);
    };
    let Some(schema) = &request_body.schema else {
        return Ok(None);
    };

    let resolve = |name: &str| -> Option<Value> {
        repo::schema_by_name(conn, api_id, name)
            .ok()
            .flatten()
            .map(|row| row.body)
    };
    Ok(Some(body::example_value(schema, &resolve)))
}

fn render_curl(
    method: &str,
    url: &str,
    headers: &[(String, String)],
    payload: Option<&Value>,
) -> String {
    let mut lines = vec![format!("curl -X {} \"{}\"", method, url)];
    for (name, value) in headers {
        lines.push(format!("  -H \"{}: {}\"", name, value));
    }
    if let Some(payload) = payload {
        let json = serde_json::to_string_pretty(payload).unwrap_or_else(|_| "{}".to_string());
        lines.push(format!("  -d '{}'", json));
    }
    lines.join(" \\\n")
}

fn render_python(
    method: &str,
    url: &str,
    headers: &[(String, String)],
    payload: Option<&Value>,
) -> String {
    let mut code = String::from("import requests\n\n");
    code.push_str(&format!("url = \"{}\"\n", url));

    if !headers.is_empty() {
        code.push_str("headers = {\n");
        for (name, value) in headers {
            code.push_str(&format!("    \"{}\": \"{}\",\n", name, value));
        }
        code.push_str("}\n");
    }
    if let Some(payload) = payload {
        code.push_str(&format!("payload = {}\n", python_literal(payload, 0)));
    }

    code.push('\n');
    let mut args = vec!["url".to_string()];
    if !headers.is_empty() {
        args.push("headers=headers".to_string());
    }
    if payload.is_some() {
        args.push("json=payload".to_string());
    }
    code.push_str(&format!(
        "response = requests.{}({})\n",
        method.to_lowercase(),
        args.join(", ")
    ));
    code.push_str("response.raise_for_status()\n");
    code.push_str("print(response.json())\n");
    code
}

fn render_fetch(
    method: &str,
    url: &str,
    headers: &[(String, String)],
    payload: Option<&Value>,
    typescript: bool,
) -> String {
    let mut code = String::new();
    code.push_str(&format!("const url = \"{}\";\n", url));

    if let Some(payload) = payload {
        let json = serde_json::to_string_pretty(payload).unwrap_or_else(|_| "{}".to_string());
        code.push_str(&format!("const payload = {};\n", json));
    }
    code.push('\n');

    let response_decl = if typescript {
        "const response: Response"
    } else {
        "const response"
    };
    code.push_str(&format!("{} = await fetch(url, {{\n", response_decl));
    code.push_str(&format!("  method: \"{}\",\n", method));
    if !headers.is_empty() {
        code.push_str("  headers: {\n");
        for (name, value) in headers {
            code.push_str(&format!("    \"{}\": \"{}\",\n", name, value));
        }
        code.push_str("  },\n");
    }
    if payload.is_some() {
        code.push_str("  body: JSON.stringify(payload),\n");
    }
    code.push_str("});\n");
    code.push_str("const data = await response.json();\n");
    code.push_str("console.log(data);\n");
    code
}

/// Render a JSON value as a Python literal (True/False/None spelling).
fn python_literal(value: &Value, indent: usize) -> String {
    let pad = " ".repeat(indent);
    let inner_pad = " ".repeat(indent + 4);
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        Value::Array(items) => {
            if items.is_empty() {
                return "[]".to_string();
            }
            let rendered: Vec<String> = items
                .iter()
                .map(|item| format!("{}{}", inner_pad, python_literal(item, indent + 4)))
                .collect();
            format!("[\n{}\n{}]", rendered.join(",\n"), pad)
        }
        Value::Object(map) => {
            if map.is_empty() {
                return "{}".to_string();
            }
            let rendered: Vec<String> = map
                .iter()
                .map(|(key, child)| {
                    format!(
                        "{}\"{}\": {}",
                        inner_pad,
                        key,
                        python_literal(child, indent + 4)
                    )
                })
                .collect();
            format!("{{\n{}\n{}}}", rendered.join(",\n"), pad)
        }
    }
}
