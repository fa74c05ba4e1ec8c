//! Endpoint categorization
//!
//! Every endpoint gets exactly one category through a deterministic cascade:
//! first declared tag (enriched from the specification's tag tables),
//! else a path-derived segment, else the reserved "Uncategorized" sentinel.
//! After all endpoints are assigned, a roll-up produces one summary record
//! per distinct category with its endpoint count and observed methods.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::openapi::{Endpoint, TagDefinition, TagGroupDefinition};

/// Category name used when neither tags nor the path yield one.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Cached regex for the path fallback: `/<prefix>/<version>?/<segment>/...`.
/// The optional version segment (`v1`, `v2`, ...) is skipped.
static PATH_SEGMENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^/[^/]+/(?:[vV]\d+/)?([^/{}?]+)").expect("Invalid path segment regex")
});

/// The category assigned to a single endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryAssignment {
    pub name: String,
    pub group: Option<String>,
    pub display_name: Option<String>,
    pub description: Option<String>,
}

impl CategoryAssignment {
    fn uncategorized() -> Self {
        Self {
            name: UNCATEGORIZED.to_string(),
            group: None,
            display_name: None,
            description: None,
        }
    }
}

/// Materialized per-category summary, persisted alongside endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRecord {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    pub endpoint_count: i64,
    /// Distinct uppercase methods, sorted.
    pub methods: Vec<String>,
}

/// Categorizes endpoints against the specification's tag tables.
#[derive(Debug, Default)]
pub struct Categorizer {
    tags: IndexMap<String, TagDefinition>,
    /// tag name -> group name
    groups: IndexMap<String, String>,
}

impl Categorizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_tag(&mut self, tag: TagDefinition) {
        self.tags.insert(tag.name.clone(), tag);
    }

    pub fn add_group(&mut self, group: TagGroupDefinition) {
        for tag in &group.tags {
            self.groups.insert(tag.clone(), group.name.clone());
        }
    }

    /// Assign a category. Deterministic: same endpoint and tables, same result.
    pub fn categorize(&self, endpoint: &Endpoint) -> CategoryAssignment {
        if let Some(first_tag) = endpoint.tags.first() {
            let definition = self.tags.get(first_tag);
            return CategoryAssignment {
                name: first_tag.clone(),
                group: self.groups.get(first_tag).cloned(),
                display_name: definition.and_then(|d| d.display_name.clone()),
                description: definition.and_then(|d| d.description.clone()),
            };
        }

        if let Some(segment) = path_segment(&endpoint.path) {
            return CategoryAssignment {
                name: segment,
                group: None,
                display_name: None,
                description: None,
            };
        }

        CategoryAssignment::uncategorized()
    }
}

/// Second cascade step: derive a category from the path structure.
/// Lower-cased; underscores preserved.
fn path_segment(path: &str) -> Option<String> {
    let segment = PATH_SEGMENT_RE.captures(path)?.get(1)?.as_str();
    if segment.is_empty() {
        return None;
    }
    Some(segment.to_ascii_lowercase())
}

/// Accumulates per-category counts and method sets across one API's endpoints.
#[derive(Debug, Default)]
pub struct CategoryRollup {
    categories: IndexMap<String, RollupEntry>,
}

#[derive(Debug)]
struct RollupEntry {
    assignment: CategoryAssignment,
    endpoint_count: i64,
    methods: BTreeSet<String>,
}

impl CategoryRollup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, assignment: &CategoryAssignment, method: &str) {
        let entry = self
            .categories
            .entry(assignment.name.clone())
            .or_insert_with(|| RollupEntry {
                assignment: assignment.clone(),
                endpoint_count: 0,
                methods: BTreeSet::new(),
            });
        entry.endpoint_count += 1;
        entry.methods.insert(method.to_uppercase());
    }

    pub fn finish(self) -> Vec<CategoryRecord> {
        self.categories
            .into_values()
            .map(|entry| CategoryRecord {
                name: entry.assignment.name,
                display_name: entry.assignment.display_name,
                description: entry.assignment.description,
                group: entry.assignment.group,
                endpoint_count: entry.endpoint_count,
                methods: entry.methods.into_iter().collect(),
            })
            .collect()
    }
}

/// Transform a stored category name back into the tag form used by the
/// search filter's double check: first character uppercased, underscores
/// converted to hyphens. Best-effort for non-ASCII names; callers fall back
/// to plain case-insensitive equality when this yields no match.
pub fn category_to_tag(name: &str) -> String {
    let hyphenated = name.replace('_', "-");
    let mut chars = hyphenated.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().chain(chars).collect(),
    }
}
