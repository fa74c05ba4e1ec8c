//! JSON-RPC 2.0 method dispatch
//!
//! The retrieval protocol: four methods with stable names and parameter
//! shapes. Transport framing (newline-delimited stdio, sockets) is the
//! collaborator's job; this module maps one request string to one response
//! string. Errors always leave as structured JSON-RPC error objects, never
//! as panics.
//!
//! Code bands: -32700 parse error, -32600 invalid request, -32601 method
//! not found, -32602 invalid params, -32000 domain errors with a `subcode`
//! in the data payload (1 not-found, 2 store-unavailable, 3 cancelled,
//! 4 timeout).

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::{Result, SpecdexError};
use crate::render::{EndpointId, Language};
use crate::search::{CategoriesRequest, SchemaRequest, SearchRequest};
use crate::service::Service;

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const SERVER_ERROR: i64 = -32000;

pub const SUBCODE_NOT_FOUND: i64 = 1;
pub const SUBCODE_STORE_UNAVAILABLE: i64 = 2;
pub const SUBCODE_CANCELLED: i64 = 3;
pub const SUBCODE_TIMEOUT: i64 = 4;

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    jsonrpc: String,
    #[serde(default)]
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct SearchParams {
    keywords: String,
    http_methods: Vec<String>,
    category: Option<String>,
    category_group: Option<String>,
    page: Option<u32>,
    per_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SchemaParams {
    component_name: String,
    #[serde(default)]
    max_depth: Option<u32>,
    #[serde(default)]
    include_examples: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExampleParams {
    endpoint_id: Value,
    #[serde(default)]
    language: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct CategoriesParams {
    category_group: Option<String>,
    include_empty: Option<bool>,
    sort_by: Option<String>,
}

/// Handle one raw request string and produce the response string.
pub async fn dispatch(service: &Arc<Service>, raw: &str, cancel: &CancellationToken) -> String {
    let request: Request = match serde_json::from_str(raw) {
        Ok(request) => request,
        Err(err) => {
            return error_response(Value::Null, PARSE_ERROR, &format!("parse error: {}", err), None)
        }
    };
    let id = request.id.clone().unwrap_or(Value::Null);

    if request.jsonrpc != "2.0" {
        return error_response(id, INVALID_REQUEST, "jsonrpc must be \"2.0\"", None);
    }

    debug!(method = %request.method, "rpc request");
    match route(service, &request.method, request.params, cancel).await {
        Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}).to_string(),
        Err(MethodError::Unknown) => error_response(
            id,
            METHOD_NOT_FOUND,
            &format!("unknown method '{}'", request.method),
            None,
        ),
        Err(MethodError::Domain(err)) => {
            let (code, message, data) = error_parts(&err);
            error_response(id, code, &message, data)
        }
    }
}

enum MethodError {
    Unknown,
    Domain(SpecdexError),
}

impl From<SpecdexError> for MethodError {
    fn from(err: SpecdexError) -> Self {
        MethodError::Domain(err)
    }
}

async fn route(
    service: &Arc<Service>,
    method: &str,
    params: Value,
    cancel: &CancellationToken,
) -> std::result::Result<Value, MethodError> {
    match method {
        "searchEndpoints" => {
            let p: SearchParams = parse_params(params)?;
            let request = SearchRequest::new(
                &p.keywords,
                p.http_methods,
                p.category,
                p.category_group,
                p.page,
                p.per_page,
            )?;
            let response = service.search_endpoints(request, cancel).await?;
            Ok(serde_json::to_value(response).map_err(SpecdexError::from)?)
        }
        "getSchema" => {
            let p: SchemaParams = parse_params(params)?;
            let request = SchemaRequest::new(p.component_name, p.max_depth, p.include_examples)?;
            let response = service.get_schema(request, cancel).await?;
            Ok(json!({
                "componentName": response.component_name,
                "schema": response.schema,
                "referencedSchemas": response.referenced_schemas,
                "usedBy": response.used_by,
            }))
        }
        "getExample" => {
            let p: ExampleParams = parse_params(params)?;
            let id = EndpointId::from_value(&p.endpoint_id)?;
            let language: Language = p.language.as_deref().unwrap_or("curl").parse()?;
            let example = service.get_example(id, language, cancel).await?;
            Ok(json!({
                "endpointId": example.endpoint_id,
                "path": example.path,
                "method": example.method,
                "language": example.language,
                "code": example.code,
                "metadata": {
                    "authScheme": example.metadata.auth_scheme,
                    "dependencies": example.metadata.dependencies,
                    "contentType": example.metadata.content_type,
                },
            }))
        }
        "getEndpointCategories" => {
            let p: CategoriesParams = parse_params(params)?;
            let request = CategoriesRequest::new(p.category_group, p.include_empty, p.sort_by.as_deref())?;
            let response = service.get_categories(request, cancel).await?;
            Ok(json!({
                "categories": response.categories,
                "groups": response.groups,
                "metadata": {
                    "totalEndpoints": response.metadata.total_endpoints,
                    "totalCategories": response.metadata.total_categories,
                },
            }))
        }
        _ => Err(MethodError::Unknown),
    }
}

/// Decode by-name parameters; a missing params member means all-default.
fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T> {
    let params = if params.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        params
    };
    serde_json::from_value(params)
        .map_err(|err| SpecdexError::Argument(format!("invalid params: {}", err)))
}

/// Map a domain error onto the protocol's code bands.
fn error_parts(err: &SpecdexError) -> (i64, String, Option<Value>) {
    let message = err.to_string();
    match err {
        SpecdexError::Argument(_) => (INVALID_PARAMS, message, None),
        SpecdexError::NotFound(_) => (
            SERVER_ERROR,
            message,
            Some(json!({"subcode": SUBCODE_NOT_FOUND})),
        ),
        SpecdexError::Cancelled => (
            SERVER_ERROR,
            message,
            Some(json!({"subcode": SUBCODE_CANCELLED})),
        ),
        SpecdexError::Timeout(_) => (
            SERVER_ERROR,
            message,
            Some(json!({"subcode": SUBCODE_TIMEOUT})),
        ),
        SpecdexError::StoreUnavailable(_)
        | SpecdexError::StoreIntegrity(_)
        | SpecdexError::Sqlite(_)
        | SpecdexError::Io(_)
        | SpecdexError::Json(_) => (
            SERVER_ERROR,
            message,
            Some(json!({"subcode": SUBCODE_STORE_UNAVAILABLE})),
        ),
        SpecdexError::InvalidSpecification { .. } | SpecdexError::Config(_) => {
            (SERVER_ERROR, message, None)
        }
    }
}

fn error_response(id: Value, code: i64, message: &str, data: Option<Value>) -> String {
    let mut error = json!({"code": code, "message": message});
    if let Some(data) = data {
        error["data"] = data;
    }
    json!({"jsonrpc": "2.0", "id": id, "error": error}).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::Store;

    const SPEC: &str = r##"{
        "openapi": "3.0.0",
        "info": {"title": "Ads", "version": "1"},
        "tags": [{"name": "Campaign"}],
        "paths": {
            "/campaigns": {
                "get": {"tags": ["Campaign"], "summary": "List campaigns", "responses": {}},
                "post": {
                    "tags": ["Campaign"],
                    "requestBody": {"content": {"application/json": {
                        "schema": {"$ref": "#/components/schemas/Campaign"}}}},
                    "responses": {}
                }
            }
        },
        "components": {"schemas": {
            "Campaign": {"type": "object", "properties": {"name": {"type": "string"}}}
        }}
    }"##;

    async fn service() -> (tempfile::TempDir, Arc<Service>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::create(dir.path(), &Config::default()).unwrap();
        let service = Service::new(store, Config::default());
        service
            .ingest(
                "ads".to_string(),
                SPEC.as_bytes().to_vec(),
                false,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        (dir, service)
    }

    async fn call(service: &Arc<Service>, raw: &str) -> Value {
        let response = dispatch(service, raw, &CancellationToken::new()).await;
        serde_json::from_str(&response).unwrap()
    }

    #[tokio::test]
    async fn test_search_round_trip() {
        let (_dir, service) = service().await;
        let response = call(
            &service,
            r#"{"jsonrpc": "2.0", "id": 1, "method": "searchEndpoints", "params": {"keywords": "campaigns"}}"#,
        )
        .await;

        assert_eq!(response["id"], 1);
        assert_eq!(response["result"]["total"], 2);
        assert_eq!(
            response["result"]["pagination"]["per_page"],
            10
        );
    }

    #[tokio::test]
    async fn test_schema_result_shape() {
        let (_dir, service) = service().await;
        let response = call(
            &service,
            r#"{"jsonrpc": "2.0", "id": 2, "method": "getSchema", "params": {"componentName": "Campaign"}}"#,
        )
        .await;

        assert_eq!(response["result"]["componentName"], "Campaign");
        assert!(response["result"]["schema"].is_object());
        assert!(response["result"]["usedBy"].is_array());
    }

    #[tokio::test]
    async fn test_example_accepts_both_id_forms() {
        let (_dir, service) = service().await;
        let numeric = call(
            &service,
            r#"{"jsonrpc": "2.0", "id": 3, "method": "getExample", "params": {"endpointId": 1, "language": "python"}}"#,
        )
        .await;
        let stringy = call(
            &service,
            r#"{"jsonrpc": "2.0", "id": 4, "method": "getExample", "params": {"endpointId": "1", "language": "python"}}"#,
        )
        .await;

        assert_eq!(numeric["result"]["code"], stringy["result"]["code"]);
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let (_dir, service) = service().await;
        let response = call(
            &service,
            r#"{"jsonrpc": "2.0", "id": 5, "method": "dropTables"}"#,
        )
        .await;
        assert_eq!(response["error"]["code"], METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_exclusive_filters_are_invalid_params() {
        let (_dir, service) = service().await;
        let response = call(
            &service,
            r#"{"jsonrpc": "2.0", "id": 6, "method": "searchEndpoints",
                "params": {"category": "Campaign", "categoryGroup": "Core"}}"#,
        )
        .await;
        assert_eq!(response["error"]["code"], INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_missing_schema_maps_to_not_found_subcode() {
        let (_dir, service) = service().await;
        let response = call(
            &service,
            r#"{"jsonrpc": "2.0", "id": 7, "method": "getSchema", "params": {"componentName": "Nope"}}"#,
        )
        .await;
        assert_eq!(response["error"]["code"], SERVER_ERROR);
        assert_eq!(response["error"]["data"]["subcode"], SUBCODE_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_parse_error() {
        let (_dir, service) = service().await;
        let raw = dispatch(&service, "{not json", &CancellationToken::new()).await;
        let response: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(response["error"]["code"], PARSE_ERROR);
        assert_eq!(response["id"], Value::Null);
    }

    #[tokio::test]
    async fn test_wrong_jsonrpc_version() {
        let (_dir, service) = service().await;
        let response = call(
            &service,
            r#"{"jsonrpc": "1.0", "id": 8, "method": "searchEndpoints"}"#,
        )
        .await;
        assert_eq!(response["error"]["code"], INVALID_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_language_names_supported_set() {
        let (_dir, service) = service().await;
        let response = call(
            &service,
            r#"{"jsonrpc": "2.0", "id": 9, "method": "getExample", "params": {"endpointId": 1, "language": "ruby"}}"#,
        )
        .await;
        assert_eq!(response["error"]["code"], INVALID_PARAMS);
        assert!(response["error"]["message"]
            .as_str()
            .unwrap()
            .contains("typescript"));
    }
}
