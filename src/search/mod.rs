//! Search and retrieval
//!
//! The read-only query plane: filtered endpoint search over the FTS5 mirror,
//! schema retrieval with bounded reference expansion, and the category
//! catalog. Each operation validates its inputs, runs one query plan against
//! a read connection, and returns a structured result echoing its filters.

mod categories;
mod endpoints;
mod schemas;

pub use categories::{
    categories_catalog, CategoriesRequest, CategoriesResponse, CategoryEntry, CategorySort,
    GroupSummary,
};
pub use endpoints::{
    search_endpoints, EndpointSummary, Pagination, SearchFilters, SearchRequest, SearchResponse,
};
pub use schemas::{get_schema, EndpointRef, SchemaRequest, SchemaResponse};
