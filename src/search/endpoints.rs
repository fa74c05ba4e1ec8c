//! Endpoint search
//!
//! Keyword matches come from the FTS5 mirror ranked by weighted bm25; the
//! category filter applies the double condition (case-insensitive category
//! equality AND the transformed tag present in the endpoint's tag list) so
//! categories with overlapping substrings never contaminate each other. When
//! the tag transformation matches nothing for an otherwise existing category,
//! the filter falls back to plain equality.

use rusqlite::types::Value as SqlValue;
use rusqlite::Connection;
use serde::Serialize;

use crate::categorize::category_to_tag;
use crate::config::FtsWeights;
use crate::errors::{Result, SpecdexError};

/// Validated search inputs. Blank strings have already been normalized to
/// `None` by [`SearchRequest::new`].
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub keywords: Option<String>,
    pub methods: Vec<String>,
    pub category: Option<String>,
    pub category_group: Option<String>,
    pub page: u32,
    pub per_page: u32,
}

impl SearchRequest {
    /// Normalize and validate raw inputs.
    pub fn new(
        keywords: &str,
        methods: Vec<String>,
        category: Option<String>,
        category_group: Option<String>,
        page: Option<u32>,
        per_page: Option<u32>,
    ) -> Result<Self> {
        let keywords = non_blank(Some(keywords.to_string()));
        let category = non_blank(category);
        let category_group = non_blank(category_group);

        if category.is_some() && category_group.is_some() {
            return Err(SpecdexError::Argument(
                "category and categoryGroup are mutually exclusive".to_string(),
            ));
        }

        let page = page.unwrap_or(1);
        let per_page = per_page.unwrap_or(10);
        if page < 1 {
            return Err(SpecdexError::Argument("page must be >= 1".to_string()));
        }
        if per_page < 1 {
            return Err(SpecdexError::Argument("perPage must be >= 1".to_string()));
        }

        let methods = methods
            .into_iter()
            .filter(|m| !m.trim().is_empty())
            .map(|m| m.trim().to_uppercase())
            .collect();

        Ok(Self {
            keywords,
            methods,
            category,
            category_group,
            page,
            per_page,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// One search hit.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointSummary {
    pub endpoint_id: i64,
    pub path: String,
    pub method: String,
    pub summary: Option<String>,
    pub tags: Vec<String>,
    pub category: String,
    /// Relevance from the FTS ranker; absent for empty-keyword listings.
    pub score: Option<f64>,
}

/// Echo of the filters a search ran with.
#[derive(Debug, Clone, Serialize)]
pub struct SearchFilters {
    pub keywords: Option<String>,
    pub http_methods: Vec<String>,
    pub category: Option<String>,
    pub category_group: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub endpoints: Vec<EndpointSummary>,
    pub total: i64,
    pub filters: SearchFilters,
    pub pagination: Pagination,
}

/// Execute a search against one API.
pub fn search_endpoints(
    conn: &Connection,
    api_id: i64,
    weights: &FtsWeights,
    request: &SearchRequest,
) -> Result<SearchResponse> {
    // First pass applies the transformed-tag double check; if a requested
    // category matches nothing that way, retry on plain equality.
    let mut result = run_query(conn, api_id, weights, request, true)?;
    if result.1 == 0 && request.category.is_some() {
        result = run_query(conn, api_id, weights, request, false)?;
    }
    let (endpoints, total) = result;

    Ok(SearchResponse {
        endpoints,
        total,
        filters: SearchFilters {
            keywords: request.keywords.clone(),
            http_methods: request.methods.clone(),
            category: request.category.clone(),
            category_group: request.category_group.clone(),
        },
        pagination: Pagination {
            page: request.page,
            per_page: request.per_page,
        },
    })
}

fn run_query(
    conn: &Connection,
    api_id: i64,
    weights: &FtsWeights,
    request: &SearchRequest,
    tag_double_check: bool,
) -> Result<(Vec<EndpointSummary>, i64)> {
    let mut conditions = vec!["e.api_id = ?".to_string()];
    let mut params: Vec<SqlValue> = vec![SqlValue::Integer(api_id)];

    let fts_join = if let Some(keywords) = &request.keywords {
        // The MATCH placeholder precedes the WHERE clause in the SQL text.
        params.insert(0, SqlValue::Text(fts_query(keywords)));
        format!(
            "JOIN (SELECT rowid AS fts_id,
                          bm25(endpoints_fts, {p}, {s}, {d}, {o}, {t}, {c}) AS rank
                   FROM endpoints_fts WHERE endpoints_fts MATCH ?) f
               ON f.fts_id = e.id",
            p = weights.path,
            s = weights.summary,
            d = weights.description,
            o = weights.operation_id,
            t = weights.tags,
            c = weights.category,
        )
    } else {
        String::new()
    };

    if let Some(category) = &request.category {
        conditions.push("lower(e.category) = lower(?)".to_string());
        params.push(SqlValue::Text(category.clone()));
        if tag_double_check {
            conditions.push(
                "EXISTS (SELECT 1 FROM json_each(e.tags_json) j
                          WHERE lower(j.value) = lower(?))"
                    .to_string(),
            );
            params.push(SqlValue::Text(category_to_tag(category)));
        }
    }

    if let Some(group) = &request.category_group {
        conditions.push(
            "e.category_group IS NOT NULL AND lower(e.category_group) = lower(?)".to_string(),
        );
        params.push(SqlValue::Text(group.clone()));
    }

    if !request.methods.is_empty() {
        let placeholders = vec!["?"; request.methods.len()].join(", ");
        conditions.push(format!("e.method IN ({})", placeholders));
        for method in &request.methods {
            params.push(SqlValue::Text(method.clone()));
        }
    }

    let where_clause = conditions.join(" AND ");

    let total: i64 = conn.query_row(
        &format!(
            "SELECT count(*) FROM endpoints e {} WHERE {}",
            fts_join, where_clause
        ),
        rusqlite::params_from_iter(params.iter()),
        |row| row.get(0),
    )?;

    let order = if request.keywords.is_some() {
        "f.rank, e.path, e.method"
    } else {
        "e.path, e.method"
    };
    let score_column = if request.keywords.is_some() {
        "-f.rank"
    } else {
        "NULL"
    };

    let offset = (request.page as i64 - 1) * request.per_page as i64;
    let sql = format!(
        "SELECT e.id, e.path, e.method, e.summary, e.tags_json, e.category, {score}
         FROM endpoints e {join}
         WHERE {cond}
         ORDER BY {order}
         LIMIT ? OFFSET ?",
        score = score_column,
        join = fts_join,
        cond = where_clause,
        order = order,
    );
    params.push(SqlValue::Integer(request.per_page as i64));
    params.push(SqlValue::Integer(offset));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), |row| {
        let tags_json: String = row.get(4)?;
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<String>>(3)?,
            tags_json,
            row.get::<_, String>(5)?,
            row.get::<_, Option<f64>>(6)?,
        ))
    })?;

    let mut endpoints = Vec::new();
    for row in rows {
        let (endpoint_id, path, method, summary, tags_json, category, score) = row?;
        endpoints.push(EndpointSummary {
            endpoint_id,
            path,
            method,
            summary,
            tags: serde_json::from_str(&tags_json)?,
            category,
            score,
        });
    }

    Ok((endpoints, total))
}

/// Build an FTS5 MATCH expression from free-form keywords: each whitespace
/// token is quoted so user input can never hit the query syntax.
fn fts_query(keywords: &str) -> String {
    keywords
        .split_whitespace()
        .map(|token| format!("\"{}\"", token.replace('"', "")))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::{db, ingest};

    fn spec() -> String {
        // Two categories with overlapping vocabulary: a Campaign summary that
        // mentions "statistics" must not leak into the Statistics category.
        r#"{
            "openapi": "3.0.0",
            "info": {"title": "Ads", "version": "1"},
            "tags": [
                {"name": "Statistics"},
                {"name": "Campaign"}
            ],
            "paths": {
                "/client/statistics/video": {
                    "post": {"tags": ["Statistics"], "summary": "Video statistics", "responses": {}}
                },
                "/client/statistics/daily": {
                    "get": {"tags": ["Statistics"], "summary": "Daily report", "responses": {}}
                },
                "/client/campaigns": {
                    "get": {"tags": ["Campaign"], "summary": "Campaign list with statistics links", "responses": {}},
                    "post": {"tags": ["Campaign"], "summary": "Create campaign", "responses": {}}
                }
            }
        }"#
        .to_string()
    }

    fn ingested() -> (tempfile::TempDir, Connection, i64) {
        let dir = tempfile::tempdir().unwrap();
        let mut conn = db::open_writer(dir.path()).unwrap();
        let report = ingest::ingest_reader(&mut conn, "ads", spec().as_bytes(), false).unwrap();
        (dir, conn, report.api_id)
    }

    fn request(keywords: &str, category: Option<&str>, methods: &[&str]) -> SearchRequest {
        SearchRequest::new(
            keywords,
            methods.iter().map(|m| m.to_string()).collect(),
            category.map(String::from),
            None,
            None,
            Some(100),
        )
        .unwrap()
    }

    #[test]
    fn test_mutually_exclusive_filters_rejected() {
        let err = SearchRequest::new(
            "",
            vec![],
            Some("Statistics".to_string()),
            Some("Reporting".to_string()),
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, SpecdexError::Argument(_)));
    }

    #[test]
    fn test_blank_filters_normalize_to_unspecified() {
        let request =
            SearchRequest::new("  ", vec![], Some("  ".to_string()), Some("".to_string()), None, None)
                .unwrap();
        assert!(request.keywords.is_none());
        assert!(request.category.is_none());
        assert!(request.category_group.is_none());
    }

    #[test]
    fn test_empty_keywords_lists_category_in_stable_order() {
        let (_dir, conn, api_id) = ingested();
        let weights = Config::default().fts_weights;

        let response =
            search_endpoints(&conn, api_id, &weights, &request("", Some("Statistics"), &[]))
                .unwrap();
        assert_eq!(response.total, 2);
        let paths: Vec<_> = response.endpoints.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["/client/statistics/daily", "/client/statistics/video"]
        );
        assert!(response.endpoints.iter().all(|e| e.category == "Statistics"));
    }

    #[test]
    fn test_keyword_and_category_intersect() {
        let (_dir, conn, api_id) = ingested();
        let weights = Config::default().fts_weights;

        // "statistics" appears in a Campaign summary too; the category filter
        // must keep that endpoint out.
        let response = search_endpoints(
            &conn,
            api_id,
            &weights,
            &request("statistics", Some("Statistics"), &[]),
        )
        .unwrap();
        assert_eq!(response.total, 2);
        assert!(response.endpoints.iter().all(|e| e.category == "Statistics"));
        assert!(response.endpoints.iter().all(|e| e.score.is_some()));
    }

    #[test]
    fn test_method_filter() {
        let (_dir, conn, api_id) = ingested();
        let weights = Config::default().fts_weights;

        let response = search_endpoints(
            &conn,
            api_id,
            &weights,
            &request("", Some("Campaign"), &["post"]),
        )
        .unwrap();
        assert_eq!(response.total, 1);
        assert_eq!(response.endpoints[0].method, "POST");
    }

    #[test]
    fn test_nonexistent_category_returns_empty() {
        let (_dir, conn, api_id) = ingested();
        let weights = Config::default().fts_weights;

        let response =
            search_endpoints(&conn, api_id, &weights, &request("", Some("Nope"), &[])).unwrap();
        assert_eq!(response.total, 0);
        assert!(response.endpoints.is_empty());
    }

    #[test]
    fn test_case_insensitive_category() {
        let (_dir, conn, api_id) = ingested();
        let weights = Config::default().fts_weights;

        let response =
            search_endpoints(&conn, api_id, &weights, &request("", Some("statistics"), &[]))
                .unwrap();
        assert_eq!(response.total, 2);
    }

    #[test]
    fn test_pagination_windows() {
        let (_dir, conn, api_id) = ingested();
        let weights = Config::default().fts_weights;

        let page = SearchRequest::new("", vec![], None, None, Some(2), Some(3)).unwrap();
        let response = search_endpoints(&conn, api_id, &weights, &page).unwrap();
        assert_eq!(response.total, 4);
        assert_eq!(response.endpoints.len(), 1);
        assert_eq!(response.pagination.page, 2);
    }

    #[test]
    fn test_fts_query_quotes_tokens() {
        assert_eq!(fts_query("video stats"), "\"video\" \"stats\"");
        assert_eq!(fts_query("a\"b"), "\"ab\"");
    }
}
