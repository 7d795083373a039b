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

//! Search index abstraction used by `computeAndStore` (spec §4.9) and the
//! stats engine (spec §4.14, C15). Out of scope are concrete backends
//! (spec §1); this is the contract the pipeline depends on.

use async_trait::async_trait;
use catalog_core::{Definition, EntityCoordinates, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One bucket of a facet histogram: `value -> count`.
#[derive(Debug, Clone, Default)]
pub struct FacetBucket {
    pub value: i64,
    pub count: u64,
}

/// The facets the stats engine needs per stat key (spec §4.14).
#[derive(Debug, Clone, Default)]
pub struct FacetQueryResult {
    pub total: u64,
    pub described_score: Vec<FacetBucket>,
    pub licensed_score: Vec<FacetBucket>,
    pub declared_license: BTreeMap<String, u64>,
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn store(&self, coordinates: &EntityCoordinates, definition: &Definition) -> Result<()>;

    async fn delete(&self, coordinates: &EntityCoordinates) -> Result<()>;

    /// Count plus the described/licensed score and declared-license
    /// facets for one stat key (spec §4.14; `"total"` means every type).
    async fn facet_query(&self, stat_key: &str) -> Result<FacetQueryResult>;
}

/// In-memory reference implementation: recomputes facets from whatever
/// has been stored, suitable for tests and the CLI's local mode.
#[derive(Default)]
pub struct InMemorySearchIndex {
    inner: Arc<parking_lot::RwLock<BTreeMap<String, Definition>>>,
}

impl InMemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SearchIndex for InMemorySearchIndex {
    async fn store(&self, coordinates: &EntityCoordinates, definition: &Definition) -> Result<()> {
        self.inner.write().insert(coordinates.to_string(), definition.clone());
        Ok(())
    }

    async fn delete(&self, coordinates: &EntityCoordinates) -> Result<()> {
        self.inner.write().remove(&coordinates.to_string());
        Ok(())
    }

    async fn facet_query(&self, stat_key: &str) -> Result<FacetQueryResult> {
        let map = self.inner.read();
        let mut result = FacetQueryResult::default();
        let mut described_counts: BTreeMap<i64, u64> = BTreeMap::new();
        let mut licensed_counts: BTreeMap<i64, u64> = BTreeMap::new();

        for (key, def) in map.iter() {
            if stat_key != "total" {
                let Some(coords) = def.coordinates() else { continue };
                if !coords.component_type.eq_ignore_ascii_case(stat_key) {
                    continue;
                }
            }
            let _ = key;
            result.total += 1;
            if let Some(score) = def.get("described").and_then(|d| d.get("score")).and_then(|s| s.get("total")).and_then(|v| v.as_i64()) {
                *described_counts.entry(score).or_default() += 1;
            }
            if let Some(score) = def.get("licensed").and_then(|d| d.get("score")).and_then(|s| s.get("total")).and_then(|v| v.as_i64()) {
                *licensed_counts.entry(score).or_default() += 1;
            }
            if let Some(license) = def.declared_license() {
                *result.declared_license.entry(license.to_string()).or_default() += 1;
            }
        }
        result.described_score = described_counts.into_iter().map(|(value, count)| FacetBucket { value, count }).collect();
        result.licensed_score = licensed_counts.into_iter().map(|(value, count)| FacetBucket { value, count }).collect();
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_core::Definition;
    use serde_json::json;

    fn definition(coordinates: &str, component_type: &str, described_score: i64, license: &str) -> (EntityCoordinates, Definition) {
        let coords = EntityCoordinates::parse(coordinates).unwrap();
        let mut def = Definition::from_value(json!({
            "described": { "score": { "total": described_score } },
            "licensed": { "score": { "total": 80 }, "declared": license },
        }));
        def.set_coordinates(&coords);
        (coords, def)
    }

    #[tokio::test]
    async fn total_facet_counts_everything_regardless_of_type() {
        let index = InMemorySearchIndex::new();
        let (c1, d1) = definition("npm/npmjs/-/left-pad/1.3.0", "npm", 50, "MIT");
        let (c2, d2) = definition("maven/mavencentral/org.apache/commons/1.0", "maven", 50, "Apache-2.0");
        index.store(&c1, &d1).await.unwrap();
        index.store(&c2, &d2).await.unwrap();

        let result = index.facet_query("total").await.unwrap();
        assert_eq!(result.total, 2);
        assert_eq!(result.declared_license.get("MIT"), Some(&1));
        assert_eq!(result.declared_license.get("Apache-2.0"), Some(&1));
    }

    #[tokio::test]
    async fn type_scoped_facet_excludes_other_component_types() {
        let index = InMemorySearchIndex::new();
        let (c1, d1) = definition("npm/npmjs/-/left-pad/1.3.0", "npm", 50, "MIT");
        let (c2, d2) = definition("maven/mavencentral/org.apache/commons/1.0", "maven", 90, "Apache-2.0");
        index.store(&c1, &d1).await.unwrap();
        index.store(&c2, &d2).await.unwrap();

        let result = index.facet_query("npm").await.unwrap();
        assert_eq!(result.total, 1);
        assert_eq!(result.declared_license.get("Apache-2.0"), None);
    }

    #[tokio::test]
    async fn delete_removes_entry_from_future_facet_queries() {
        let index = InMemorySearchIndex::new();
        let (c1, d1) = definition("npm/npmjs/-/left-pad/1.3.0", "npm", 50, "MIT");
        index.store(&c1, &d1).await.unwrap();
        index.delete(&c1).await.unwrap();

        let result = index.facet_query("total").await.unwrap();
        assert_eq!(result.total, 0);
    }

    #[tokio::test]
    async fn described_score_buckets_group_by_score_value() {
        let index = InMemorySearchIndex::new();
        let (c1, d1) = definition("npm/npmjs/-/left-pad/1.3.0", "npm", 50, "MIT");
        let (c2, d2) = definition("npm/npmjs/-/right-pad/1.0.0", "npm", 50, "MIT");
        index.store(&c1, &d1).await.unwrap();
        index.store(&c2, &d2).await.unwrap();

        let result = index.facet_query("total").await.unwrap();
        assert_eq!(result.described_score.len(), 1);
        assert_eq!(result.described_score[0].count, 2);
    }
}
