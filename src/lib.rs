//! Specdex library interface
//!
//! Specdex transforms an OpenAPI specification into a queryable index: a
//! streaming parser feeds a categorizer and an SQLite store (relational
//! tables plus an FTS5 mirror), and a JSON-RPC retrieval plane answers
//! endpoint search, schema expansion, category catalog, and code-sample
//! requests against the persisted form.
//!
//! # Module Organization
//!
//! - [`openapi`] - Specification model and streaming extraction
//! - [`categorize`] - Category cascade and per-API roll-up
//! - [`store`] - Persistence: schema, migrations, ingest, pooled readers
//! - [`search`] - Endpoint search, schema retrieval, category catalog
//! - [`render`] - Request example rendering
//! - [`rpc`] - JSON-RPC method dispatch
//! - [`service`] - Retrieval facade with timeouts, cancellation, breaker

pub mod breaker;
pub mod categorize;
pub mod cli;
pub mod config;
pub mod errors;
pub mod openapi;
pub mod render;
pub mod rpc;
pub mod search;
pub mod service;
pub mod signals;
pub mod status;
pub mod store;
