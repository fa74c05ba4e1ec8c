//! Category catalog
//!
//! Lists the materialized category summaries for the active API, an
//! aggregated view of tag groups, and API-wide totals.

use std::str::FromStr;

use indexmap::IndexMap;
use rusqlite::types::Value as SqlValue;
use rusqlite::Connection;
use serde::Serialize;

use crate::errors::{Result, SpecdexError};

/// Sort keys accepted by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum CategorySort {
    #[default]
    Name,
    EndpointCount,
    Group,
}

impl FromStr for CategorySort {
    type Err = SpecdexError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "name" => Ok(CategorySort::Name),
            "endpointCount" => Ok(CategorySort::EndpointCount),
            "group" => Ok(CategorySort::Group),
            other => Err(SpecdexError::Argument(format!(
                "sortBy must be one of name, endpointCount, group; got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CategoriesRequest {
    pub category_group: Option<String>,
    pub include_empty: bool,
    pub sort_by: CategorySort,
}

impl CategoriesRequest {
    pub fn new(
        category_group: Option<String>,
        include_empty: Option<bool>,
        sort_by: Option<&str>,
    ) -> Result<Self> {
        let category_group = category_group
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty());
        let sort_by = match sort_by {
            Some(key) => key.parse()?,
            None => CategorySort::Name,
        };
        Ok(Self {
            category_group,
            include_empty: include_empty.unwrap_or(false),
            sort_by,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryEntry {
    pub name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub group: Option<String>,
    pub endpoint_count: i64,
    pub methods: Vec<String>,
}

/// One tag group and its member categories.
#[derive(Debug, Clone, Serialize)]
pub struct GroupSummary {
    pub name: String,
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogTotals {
    pub total_endpoints: i64,
    pub total_categories: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoriesResponse {
    pub categories: Vec<CategoryEntry>,
    pub groups: Vec<GroupSummary>,
    pub metadata: CatalogTotals,
}

/// List the category catalog for one API.
pub fn categories_catalog(
    conn: &Connection,
    api_id: i64,
    request: &CategoriesRequest,
) -> Result<CategoriesResponse> {
    let mut conditions = vec!["api_id = ?".to_string()];
    let mut params: Vec<SqlValue> = vec![SqlValue::Integer(api_id)];

    if let Some(group) = &request.category_group {
        conditions.push("category_group IS NOT NULL AND lower(category_group) = lower(?)".to_string());
        params.push(SqlValue::Text(group.clone()));
    }
    if !request.include_empty {
        conditions.push("endpoint_count > 0".to_string());
    }

    let order = match request.sort_by {
        CategorySort::Name => "name",
        CategorySort::EndpointCount => "endpoint_count DESC, name",
        CategorySort::Group => "category_group IS NULL, category_group, name",
    };

    let sql = format!(
        "SELECT name, display_name, description, category_group, endpoint_count, methods_json
         FROM endpoint_categories
         WHERE {}
         ORDER BY {}",
        conditions.join(" AND "),
        order
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), |row| {
        let methods_json: String = row.get(5)?;
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, Option<String>>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, Option<String>>(3)?,
            row.get::<_, i64>(4)?,
            methods_json,
        ))
    })?;

    let mut categories = Vec::new();
    let mut groups: IndexMap<String, Vec<String>> = IndexMap::new();
    for row in rows {
        let (name, display_name, description, group, endpoint_count, methods_json) = row?;
        if let Some(group_name) = &group {
            groups
                .entry(group_name.clone())
                .or_default()
                .push(name.clone());
        }
        categories.push(CategoryEntry {
            name,
            display_name,
            description,
            group,
            endpoint_count,
            methods: serde_json::from_str(&methods_json)?,
        });
    }

    let total_endpoints: i64 = conn.query_row(
        "SELECT count(*) FROM endpoints WHERE api_id = ?1",
        [api_id],
        |row| row.get(0),
    )?;
    let total_categories: i64 = conn.query_row(
        "SELECT count(*) FROM endpoint_categories WHERE api_id = ?1",
        [api_id],
        |row| row.get(0),
    )?;

    let groups = groups
        .into_iter()
        .map(|(name, mut members)| {
            members.sort();
            GroupSummary {
                name,
                categories: members,
            }
        })
        .collect();

    Ok(CategoriesResponse {
        categories,
        groups,
        metadata: CatalogTotals {
            total_endpoints,
            total_categories,
        },
    })
}
