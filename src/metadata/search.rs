//! Table resolution, ranked search and "did you mean" suggestions

use std::sync::Arc;

use super::{MetadataCache, TableIdentity};

/// Default page size for [`MetadataCache::search`]
pub const DEFAULT_SEARCH_LIMIT: usize = 25;

/// Default number of names offered by [`MetadataCache::suggest_similar`]
pub const DEFAULT_SUGGESTION_LIMIT: usize = 5;

/// Added to the prefix score when one name contains the other
const SUBSTRING_BONUS: usize = 2;

impl MetadataCache {
    /// Resolve a table name.
    ///
    /// With a schema this is an exact lookup. Without one, the default schema
    /// wins, then the first table with that bare name in catalog order.
    #[must_use]
    pub fn resolve(&self, name: &str, schema: Option<&str>) -> Option<&Arc<TableIdentity>> {
        if let Some(schema) = schema.filter(|s| !s.is_empty()) {
            return self.table(schema, name);
        }
        self.table(&self.default_schema, name)
            .or_else(|| self.by_name.get(name).and_then(|matches| matches.first()))
    }

    /// Exact `schema.name` lookup
    #[must_use]
    pub fn table(&self, schema: &str, name: &str) -> Option<&Arc<TableIdentity>> {
        self.tables.get(&format!("{schema}.{name}"))
    }

    /// Tables of one schema in catalog order
    #[must_use]
    pub fn tables_in_schema(&self, schema: &str) -> &[Arc<TableIdentity>] {
        self.by_schema.get(schema).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `(schema, table count)` sorted by schema name
    #[must_use]
    pub fn schemas(&self) -> Vec<(&str, usize)> {
        self.by_schema.iter().map(|(schema, tables)| (schema.as_str(), tables.len())).collect()
    }

    /// Case-insensitive name search: exact matches, then prefix matches, then
    /// substring matches, the latter two sorted by name.
    #[must_use]
    pub fn search(
        &self,
        query: &str,
        schema: Option<&str>,
        limit: usize,
    ) -> Vec<&Arc<TableIdentity>> {
        let needle = query.to_lowercase();
        let candidates = match schema.filter(|s| !s.is_empty()) {
            Some(schema) => self.tables_in_schema(schema),
            None => self.tables(),
        };

        let mut exact = Vec::new();
        let mut prefix = Vec::new();
        let mut contains = Vec::new();
        for table in candidates {
            let name = table.name.to_lowercase();
            if name == needle {
                exact.push(table);
            } else if name.starts_with(&needle) {
                prefix.push(table);
            } else if name.contains(&needle) {
                contains.push(table);
            }
        }
        prefix.sort_by(|a, b| a.name.cmp(&b.name));
        contains.sort_by(|a, b| a.name.cmp(&b.name));

        exact.into_iter().chain(prefix).chain(contains).take(limit).collect()
    }

    /// Full names of the tables that look most like `name`.
    ///
    /// Score is the case-insensitive shared prefix length plus a bonus when
    /// either name contains the other. Zero scores are dropped; ties keep
    /// catalog order.
    #[must_use]
    pub fn suggest_similar(&self, name: &str, limit: usize) -> Vec<String> {
        let needle = name.to_lowercase();

        let mut scored: Vec<(usize, &TableIdentity)> = self
            .order
            .iter()
            .map(|table| (similarity(&needle, &table.name.to_lowercase()), table.as_ref()))
            .filter(|(score, _)| *score > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        scored.into_iter().take(limit).map(|(_, table)| table.full().to_string()).collect()
    }
}

fn similarity(needle: &str, candidate: &str) -> usize {
    let shared = needle.chars().zip(candidate.chars()).take_while(|(a, b)| a == b).count();
    let bonus = if candidate.contains(needle) || needle.contains(candidate) {
        SUBSTRING_BONUS
    } else {
        0
    };
    shared + bonus
}
