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

//! Stats engine (spec §4.14, C15): caches per-stat-key facet queries and
//! computes medians of the described/licensed score facets.

use catalog_core::Result;
use catalog_storage::{FacetBucket, SearchIndex};
use moka::future::Cache;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// The closed set of stat keys the engine serves (spec §4.14).
pub const STAT_KEYS: &[&str] = &[
    "total", "crate", "gem", "git", "maven", "npm", "nuget", "pod", "composer", "pypi", "deb", "debsrc", "conda",
    "condasrc",
];

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatsResult {
    pub stat_key: String,
    pub total: u64,
    pub described_score_median: i64,
    pub licensed_score_median: i64,
    pub declared_license: std::collections::BTreeMap<String, u64>,
}

pub struct StatsEngine {
    search: Arc<dyn SearchIndex>,
    cache: Cache<String, StatsResult>,
}

impl StatsEngine {
    pub fn new(search: Arc<dyn SearchIndex>) -> Self {
        Self {
            search,
            cache: Cache::builder().time_to_live(Duration::from_secs(300)).build(),
        }
    }

    pub async fn get(&self, stat_key: &str) -> Result<Option<StatsResult>> {
        if !STAT_KEYS.contains(&stat_key) {
            return Ok(None);
        }
        if let Some(cached) = self.cache.get(stat_key).await {
            return Ok(Some(cached));
        }

        let facets = self.search.facet_query(stat_key).await?;
        let result = StatsResult {
            stat_key: stat_key.to_string(),
            total: facets.total,
            described_score_median: median(&facets.described_score, facets.total),
            licensed_score_median: median(&facets.licensed_score, facets.total),
            declared_license: facets.declared_license,
        };
        self.cache.insert(stat_key.to_string(), result.clone()).await;
        Ok(Some(result))
    }
}

/// `0` when `total` is `0`; otherwise the bucket `value` where the
/// cumulative count first reaches or exceeds `ceil(total / 2)`. Buckets
/// are assumed ordered ascending by `value`, as the search index's facet
/// query returns them.
pub fn median(buckets: &[FacetBucket], total: u64) -> i64 {
    if total == 0 {
        return 0;
    }
    let target = total.div_ceil(2);
    let mut cumulative = 0u64;
    for bucket in buckets {
        cumulative += bucket.count;
        if cumulative >= target {
            return bucket.value;
        }
    }
    buckets.last().map(|b| b.value).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket(value: i64, count: u64) -> FacetBucket {
        FacetBucket { value, count }
    }

    #[test]
    fn median_of_empty_total_is_zero() {
        assert_eq!(median(&[], 0), 0);
    }

    #[test]
    fn median_matches_worked_example() {
        let buckets = vec![
            bucket(0, 952),
            bucket(1, 354),
            bucket(2, 217),
            bucket(3, 196),
            bucket(4, 181),
            bucket(5, 90),
            bucket(6, 83),
            bucket(7, 79),
            bucket(8, 75),
            bucket(9, 22),
            bucket(10, 1039),
        ];
        assert_eq!(median(&buckets, 3288), 3);
    }
}
