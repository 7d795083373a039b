// Copyright 2025 Catalog Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Definition store: persists rendered definitions, keyed at
//! `(coordinates, tool="definition", toolVersion=<schemaVersion>)`.

use async_trait::async_trait;
use catalog_core::{Definition, EntityCoordinates, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A page of `find` results plus an opaque continuation token, present
/// only when more results remain.
#[derive(Debug, Clone, Default)]
pub struct FindPage {
    pub definitions: Vec<Definition>,
    pub continuation_token: Option<String>,
}

/// A find query over stored definitions. Intentionally minimal: concrete
/// backends own the rest of their query language; this is the subset
/// the pipeline itself issues.
#[derive(Debug, Clone, Default)]
pub struct FindQuery {
    pub component_type: Option<String>,
    pub provider: Option<String>,
    pub namespace: Option<String>,
    pub name: Option<String>,
    pub page_size: usize,
}

#[async_trait]
pub trait DefinitionStore: Send + Sync {
    async fn get(&self, coordinates: &EntityCoordinates, schema_version: &str) -> Result<Option<Definition>>;

    /// Canonical coordinate strings present under the prefix, preserving
    /// the case the store holds them in.
    async fn list(&self, coordinates_prefix: &EntityCoordinates) -> Result<Vec<String>>;

    async fn store(&self, coordinates: &EntityCoordinates, schema_version: &str, definition: &Definition) -> Result<()>;

    async fn delete(&self, coordinates: &EntityCoordinates, schema_version: &str) -> Result<()>;

    async fn find(&self, query: &FindQuery, continuation_token: Option<&str>) -> Result<FindPage>;
}

/// In-memory reference implementation.
#[derive(Default)]
pub struct InMemoryDefinitionStore {
    inner: Arc<parking_lot::RwLock<BTreeMap<String, Definition>>>,
}

impl InMemoryDefinitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(coordinates: &EntityCoordinates, schema_version: &str) -> String {
        // Exact-case storage key; lookups elsewhere fold name case separately.
        format!("{}/definition/{}", coordinates, schema_version)
    }
}

#[async_trait]
impl DefinitionStore for InMemoryDefinitionStore {
    async fn get(&self, coordinates: &EntityCoordinates, schema_version: &str) -> Result<Option<Definition>> {
        Ok(self.inner.read().get(&Self::key(coordinates, schema_version)).cloned())
    }

    async fn list(&self, coordinates_prefix: &EntityCoordinates) -> Result<Vec<String>> {
        let prefix = coordinates_prefix.to_string_without_revision();
        let map = self.inner.read();
        let mut keys: Vec<String> = map
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .map(|k| k.split("/definition/").next().unwrap_or(k).to_string())
            .collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn store(&self, coordinates: &EntityCoordinates, schema_version: &str, definition: &Definition) -> Result<()> {
        self.inner
            .write()
            .insert(Self::key(coordinates, schema_version), definition.clone());
        Ok(())
    }

    async fn delete(&self, coordinates: &EntityCoordinates, schema_version: &str) -> Result<()> {
        self.inner.write().remove(&Self::key(coordinates, schema_version));
        Ok(())
    }

    async fn find(&self, query: &FindQuery, continuation_token: Option<&str>) -> Result<FindPage> {
        let map = self.inner.read();
        let mut matches: Vec<&Definition> = map
            .values()
            .filter(|d| {
                let Some(c) = d.coordinates() else { return false };
                query.component_type.as_deref().map(|t| t.eq_ignore_ascii_case(&c.component_type)).unwrap_or(true)
                    && query.provider.as_deref().map(|p| p.eq_ignore_ascii_case(&c.provider)).unwrap_or(true)
                    && query
                        .namespace
                        .as_deref()
                        .map(|n| c.namespace.as_deref().map(|cn| cn.eq_ignore_ascii_case(n)).unwrap_or(false))
                        .unwrap_or(true)
                    && query.name.as_deref().map(|n| n.eq_ignore_ascii_case(&c.name)).unwrap_or(true)
            })
            .collect();
        matches.sort_by_key(|d| d.coordinates().map(|c| c.to_string()).unwrap_or_default());

        let start: usize = continuation_token.and_then(|t| t.parse().ok()).unwrap_or(0);
        let page_size = if query.page_size == 0 { matches.len().max(1) } else { query.page_size };
        let end = (start + page_size).min(matches.len());
        let definitions = matches.get(start..end).unwrap_or_default().iter().map(|d| (**d).clone()).collect();
        let continuation_token = if end < matches.len() { Some(end.to_string()) } else { None };
        Ok(FindPage { definitions, continuation_token })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn store_then_get_round_trips() {
        let store = InMemoryDefinitionStore::new();
        let coords = EntityCoordinates::parse("npm/npmjs/-/test/1.0.0").unwrap();
        let mut def = Definition::empty();
        def.set_coordinates(&coords);
        def.set_described_tools(vec!["scancode/3.2.2".to_string()]);
        store.store(&coords, "1.0.0", &def).await.unwrap();

        let fetched = store.get(&coords, "1.0.0").await.unwrap().unwrap();
        assert_eq!(fetched.described_tools(), vec!["scancode/3.2.2".to_string()]);
    }

    #[tokio::test]
    async fn find_filters_by_name_case_insensitively() {
        let store = InMemoryDefinitionStore::new();
        let coords = EntityCoordinates::parse("npm/npmjs/-/Test/1.0.0").unwrap();
        let mut def = Definition::from_value(json!({}));
        def.set_coordinates(&coords);
        store.store(&coords, "1.0.0", &def).await.unwrap();

        let page = store
            .find(
                &FindQuery {
                    name: Some("test".to_string()),
                    page_size: 10,
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(page.definitions.len(), 1);
    }
}
