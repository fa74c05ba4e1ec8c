//! Retrieval facade
//!
//! Ties the store, search, and renderer together behind the four retrieval
//! operations the protocol exposes. Every operation is gated by the circuit
//! breaker, bounded by the configured timeout, and honors a cancellation
//! token; retrieval never writes and never retries beyond the store's
//! bounded lock retry.

use std::sync::Arc;

use rusqlite::Connection;
use tokio_util::sync::CancellationToken;

use crate::breaker::CircuitBreaker;
use crate::config::Config;
use crate::errors::{Result, SpecdexError};
use crate::render::{render_example, EndpointId, Language, RenderedExample};
use crate::search::{
    categories_catalog, get_schema, search_endpoints, CategoriesRequest, CategoriesResponse,
    SchemaRequest, SchemaResponse, SearchRequest, SearchResponse,
};
use crate::store::{IngestReport, StatusReport, Store};

pub struct Service {
    store: Arc<Store>,
    config: Config,
    breaker: CircuitBreaker,
}

impl Service {
    pub fn new(store: Arc<Store>, config: Config) -> Arc<Self> {
        let breaker = CircuitBreaker::new(config.breaker);
        Arc::new(Self {
            store,
            config,
            breaker,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn search_endpoints(
        &self,
        request: SearchRequest,
        cancel: &CancellationToken,
    ) -> Result<SearchResponse> {
        let weights = self.config.fts_weights;
        self.run_read("searchEndpoints", cancel, move |conn| {
            let api = crate::store::repo::active_api(conn)?;
            search_endpoints(conn, api.id, &weights, &request)
        })
        .await
    }

    pub async fn get_schema(
        &self,
        request: SchemaRequest,
        cancel: &CancellationToken,
    ) -> Result<SchemaResponse> {
        self.run_read("getSchema", cancel, move |conn| {
            let api = crate::store::repo::active_api(conn)?;
            get_schema(conn, api.id, &request)
        })
        .await
    }

    pub async fn get_example(
        &self,
        id: EndpointId,
        language: Language,
        cancel: &CancellationToken,
    ) -> Result<RenderedExample> {
        self.run_read("getExample", cancel, move |conn| {
            let api = crate::store::repo::active_api(conn)?;
            render_example(conn, api.id, &id, language)
        })
        .await
    }

    pub async fn get_categories(
        &self,
        request: CategoriesRequest,
        cancel: &CancellationToken,
    ) -> Result<CategoriesResponse> {
        self.run_read("getEndpointCategories", cancel, move |conn| {
            let api = crate::store::repo::active_api(conn)?;
            categories_catalog(conn, api.id, &request)
        })
        .await
    }

    /// Ingest under the (longer) ingest timeout. Serialized with concurrent
    /// ingests by the store's writer lock.
    pub async fn ingest(
        &self,
        name: String,
        bytes: Vec<u8>,
        overwrite: bool,
        cancel: &CancellationToken,
    ) -> Result<IngestReport> {
        let timeout = self.config.ingest_timeout();
        let work = self.store.ingest_bytes(name, bytes, overwrite);

        tokio::select! {
            _ = cancel.cancelled() => Err(SpecdexError::Cancelled),
            outcome = tokio::time::timeout(timeout, work) => match outcome {
                Ok(result) => result,
                Err(_) => Err(SpecdexError::Timeout(timeout.as_secs_f64())),
            },
        }
    }

    pub fn status(&self) -> Result<StatusReport> {
        self.store.status_sync()
    }

    async fn run_read<T, F>(
        &self,
        kind: &'static str,
        cancel: &CancellationToken,
        f: F,
    ) -> Result<T>
    where
        T: Send + 'static,
        F: Fn(&Connection) -> Result<T> + Send + 'static,
    {
        self.breaker.admit(kind)?;

        let timeout = self.config.retrieval_timeout();
        let work = self.store.with_read(f);

        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(SpecdexError::Cancelled),
            result = tokio::time::timeout(timeout, work) => match result {
                Ok(inner) => inner,
                Err(_) => Err(SpecdexError::Timeout(timeout.as_secs_f64())),
            },
        };

        self.breaker.record(kind, &outcome);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPEC: &str = r#"{
        "openapi": "3.0.0",
        "info": {"title": "Ads", "version": "1"},
        "tags": [{"name": "Campaign"}],
        "paths": {
            "/campaigns": {"get": {"tags": ["Campaign"], "summary": "List campaigns", "responses": {}}}
        },
        "components": {"schemas": {"Campaign": {"type": "object"}}}
    }"#;

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

    #[tokio::test]
    async fn test_search_through_facade() {
        let (_dir, service) = service().await;
        let request = SearchRequest::new("", vec![], None, None, None, None).unwrap();
        let response = service
            .search_endpoints(request, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.total, 1);
    }

    #[tokio::test]
    async fn test_cancelled_token_returns_cancelled() {
        let (_dir, service) = service().await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let request = SearchRequest::new("", vec![], None, None, None, None).unwrap();
        let err = service.search_endpoints(request, &cancel).await.unwrap_err();
        assert!(matches!(err, SpecdexError::Cancelled));
    }

    #[tokio::test]
    async fn test_schema_and_example_operations() {
        let (_dir, service) = service().await;
        let cancel = CancellationToken::new();

        let schema = service
            .get_schema(
                SchemaRequest::new("Campaign".to_string(), None, None).unwrap(),
                &cancel,
            )
            .await
            .unwrap();
        assert_eq!(schema.component_name, "Campaign");

        let example = service
            .get_example(EndpointId::Numeric(1), Language::Curl, &cancel)
            .await
            .unwrap();
        assert!(example.code.starts_with("curl -X GET"));
    }

    #[tokio::test]
    async fn test_categories_operation() {
        let (_dir, service) = service().await;
        let response = service
            .get_categories(CategoriesRequest::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.categories.len(), 1);
        assert_eq!(response.categories[0].name, "Campaign");
    }
}
