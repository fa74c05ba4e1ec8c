//! Common test utilities for specdex integration tests
//!
//! Provides the shared advertising-API fixture (40 endpoints across six
//! tags), CLI invocation helpers, and service construction for in-process
//! protocol tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Map, Value};
use tempfile::TempDir;

use specdex::config::Config;
use specdex::service::Service;
use specdex::store::Store;

/// Tag name -> endpoint count for the fixture. Sums to 40.
pub const TAG_COUNTS: &[(&str, usize)] = &[
    ("Campaign", 4),
    ("Statistics", 13),
    ("Ad", 5),
    ("Product", 5),
    ("Search-Promo", 9),
    ("Vendor", 4),
];

/// Build the fixture specification: six declared tags, two tag groups, 40
/// endpoints, a cyclic schema graph, and a bearer security scheme.
///
/// Statistics endpoints 0..3 mention "video" in their summaries, and one
/// Campaign endpoint does too, so keyword+category tests can prove the
/// category filter keeps other categories out.
pub fn forty_endpoint_spec() -> Value {
    let mut paths = Map::new();

    for (tag, count) in TAG_COUNTS {
        let slug = tag.to_lowercase();
        for i in 0..*count {
            let method = if i % 2 == 0 { "get" } else { "post" };
            let summary = match (*tag, i) {
                ("Statistics", 0..=2) => format!("Video statistics report {}", i),
                ("Campaign", 0) => "Campaign video overview".to_string(),
                _ => format!("{} operation {}", tag, i),
            };

            let mut operation = json!({
                "operationId": format!("{}Op{}", slug.replace('-', "_"), i),
                "summary": summary,
                "tags": [tag],
                "responses": {"200": {"description": "ok"}}
            });
            // Give POST operations a request body referencing the tag's schema
            // when one exists, so usedBy and example tests have material.
            if method == "post" && (*tag == "Campaign" || *tag == "Ad") {
                operation["requestBody"] = json!({
                    "required": true,
                    "content": {"application/json": {
                        "schema": {"$ref": format!("#/components/schemas/{}", tag)}
                    }}
                });
            }

            paths.insert(
                format!("/client/{}/op{}", slug, i),
                json!({method: operation}),
            );
        }
    }

    json!({
        "openapi": "3.0.3",
        "info": {
            "title": "Advertising API",
            "version": "4.2.0",
            "description": "Campaign management and reporting"
        },
        "tags": [
            {"name": "Campaign", "description": "Campaign management", "x-displayName": "Кампании"},
            {"name": "Statistics", "description": "Reporting"},
            {"name": "Ad", "description": "Ad objects"},
            {"name": "Product", "description": "Product catalog"},
            {"name": "Search-Promo", "description": "Search promotion"},
            {"name": "Vendor", "description": "Vendor operations"}
        ],
        "x-tagGroups": [
            {"name": "Advertising", "tags": ["Campaign", "Ad", "Product"]},
            {"name": "Insights", "tags": ["Statistics", "Search-Promo", "Vendor"]}
        ],
        "paths": paths,
        "components": {
            "schemas": {
                "Campaign": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string", "example": "Summer sale"},
                        "budget": {"$ref": "#/components/schemas/Budget"},
                        "groups": {"type": "array", "items": {"$ref": "#/components/schemas/AdGroup"}}
                    }
                },
                "Budget": {
                    "type": "object",
                    "properties": {"money": {"$ref": "#/components/schemas/Money"}}
                },
                "Money": {
                    "type": "object",
                    "properties": {"amount": {"type": "number"}, "currency": {"type": "string"}}
                },
                "AdGroup": {
                    "type": "object",
                    "properties": {"ads": {"type": "array", "items": {"$ref": "#/components/schemas/Ad"}}}
                },
                "Ad": {
                    "type": "object",
                    "properties": {
                        "placement": {"$ref": "#/components/schemas/Placement"},
                        "campaign": {"$ref": "#/components/schemas/Campaign"}
                    }
                },
                "Placement": {
                    "type": "object",
                    "properties": {"page": {"type": "string"}}
                }
            },
            "securitySchemes": {
                "bearerAuth": {"type": "http", "scheme": "bearer"}
            }
        }
    })
}

/// Write the fixture spec into `dir` and return its path.
pub fn write_spec(dir: &Path) -> PathBuf {
    let path = dir.join("advertising.json");
    std::fs::write(&path, serde_json::to_vec_pretty(&forty_endpoint_spec()).unwrap()).unwrap();
    path
}

/// An in-process service over a freshly ingested fixture store.
pub async fn ingested_service() -> (TempDir, Arc<Service>) {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::create(dir.path(), &Config::default()).unwrap();
    let service = Service::new(store, Config::default());

    let bytes = serde_json::to_vec(&forty_endpoint_spec()).unwrap();
    service
        .ingest(
            "advertising".to_string(),
            bytes,
            false,
            &tokio_util::sync::CancellationToken::new(),
        )
        .await
        .unwrap();
    (dir, service)
}

/// The specdex binary under test.
pub fn specdex_cmd() -> assert_cmd::Command {
    assert_cmd::Command::cargo_bin("specdex").unwrap()
}
