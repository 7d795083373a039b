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

//! Definition service (spec §4.9, C10): orchestrates
//! harvest -> summarize -> aggregate -> curate -> score, owns the
//! compute lock, and persists through the dispatch store and search
//! index.
//!
//! ```text
//! REQUEST -> LOOKUP -hit-> RETURN
//!             |
//!             miss / force
//!             v
//!          ACQUIRE-LOCK -> COMPUTE -> [empty?] -yes-> RETURN (no store)
//!             |                 |
//!             |                 no
//!             |                 v
//!             |             STORE + INDEX + INVALIDATE-CDN
//!             |                 |
//!             +-----------------+-- RELEASE-LOCK -> RETURN
//! ```

use crate::aggregator;
use crate::clients::{CdnSink, CrawlerClient, Summarizer};
use crate::curator::Curator;
use crate::scorer;
use crate::versioning::{enqueue_upgrade, VersionChecker};
use catalog_core::{Definition, EntityCoordinates, Precedence, Result, SummarizedData};
use catalog_queue::{ComputeLock, Queue};
use catalog_storage::{DefinitionStore, FindPage, FindQuery, HarvestStore, SearchIndex};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, warn};

/// Bound on in-flight concurrent store reads for `list_all` (spec §9's
/// throat-style cap, recommended value 10).
const LIST_ALL_CONCURRENCY: usize = 10;

pub struct DefinitionService {
    harvest: Arc<dyn HarvestStore>,
    summarizer: Arc<dyn Summarizer>,
    precedence: Precedence,
    curator: Arc<Curator>,
    store: Arc<dyn DefinitionStore>,
    search: Arc<dyn SearchIndex>,
    crawler: Arc<dyn CrawlerClient>,
    cdn: Arc<dyn CdnSink>,
    compute_lock: Arc<ComputeLock>,
    schema_version: String,
    upgrade_queue: Arc<dyn Queue>,
    version_checker: VersionChecker,
}

impl DefinitionService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        harvest: Arc<dyn HarvestStore>,
        summarizer: Arc<dyn Summarizer>,
        precedence: Precedence,
        curator: Arc<Curator>,
        store: Arc<dyn DefinitionStore>,
        search: Arc<dyn SearchIndex>,
        crawler: Arc<dyn CrawlerClient>,
        cdn: Arc<dyn CdnSink>,
        compute_lock: Arc<ComputeLock>,
        schema_version: String,
        upgrade_queue: Arc<dyn Queue>,
    ) -> Self {
        let version_checker = VersionChecker::new(schema_version.clone());
        Self {
            harvest,
            summarizer,
            precedence,
            curator,
            store,
            search,
            crawler,
            cdn,
            compute_lock,
            schema_version,
            upgrade_queue,
            version_checker,
        }
    }

    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    /// The top-level read path. `pr` bypasses the store entirely and
    /// computes against the pull request's curation. `force` ignores a
    /// cache hit and recomputes.
    pub async fn get(&self, coordinates: &EntityCoordinates, pr: Option<u64>, force: bool) -> Result<Definition> {
        if pr.is_some() {
            return self.compute(coordinates, pr).await;
        }

        if !force {
            if let Some(stored) = self.store.get(coordinates, &self.schema_version).await? {
                if self.version_checker.is_stale(&stored) {
                    warn!(%coordinates, "stored definition is stale against the current schema version, recomputing");
                    if let Err(e) = enqueue_upgrade(&*self.upgrade_queue, coordinates, &stored).await {
                        warn!(%coordinates, error = %e, "failed to enqueue upgrade notification for a stale definition");
                    }
                } else {
                    if stored.described_tools().is_empty() {
                        if let Err(e) = self.crawler.request_harvest("clearlydefined", coordinates).await {
                            warn!(%coordinates, error = %e, "failed to request harvest for an empty stored definition");
                        }
                    }
                    return Ok(stored);
                }
            }
        }

        let guard = self.compute_lock.acquire(&coordinates.to_string()).await;
        let result = self.compute_and_store(coordinates).await;
        guard.release();
        result
    }

    /// Read-only cache lookup; never triggers a compute.
    pub async fn get_stored(&self, coordinates: &EntityCoordinates) -> Result<Option<Definition>> {
        self.store.get(coordinates, &self.schema_version).await
    }

    /// Harvest every tool's latest output, summarize, aggregate, apply
    /// curation, and score. Best-effort: missing tool outputs are simply
    /// absent from the merge, never an error.
    pub async fn compute(&self, coordinates: &EntityCoordinates, pr: Option<u64>) -> Result<Definition> {
        let raw_by_tool = self.harvest.get_all_latest(coordinates).await?;
        let summarized = self.summarize_all(raw_by_tool).await;

        let tool_definition = aggregator::aggregate(&summarized, &self.precedence, coordinates).unwrap_or_else(Definition::empty);

        let curation = self.curator.get_curation(coordinates, pr).await?;
        let mut curated = match &curation {
            Some(c) => self.curator.apply(coordinates, c, tool_definition.clone()),
            None => tool_definition.clone(),
        };

        scorer::apply_scores(&mut curated, &tool_definition);
        curated.set_coordinates(coordinates);
        curated.set_schema_version(&self.schema_version);
        Ok(curated)
    }

    async fn summarize_all(&self, raw_by_tool: catalog_storage::LatestByTool) -> SummarizedData {
        let mut out = SummarizedData::new();
        for (tool, (version, raw)) in raw_by_tool {
            match self.summarizer.summarize(&tool, &version, &raw).await {
                Ok(summary) => {
                    out.entry(tool).or_default().insert(version, summary);
                }
                Err(e) => warn!(tool, error = %e, "failed to summarize tool output, skipping"),
            }
        }
        out
    }

    /// Compute, and — unless the result is empty — persist through the
    /// dispatch store, index it for search, and emit a CDN invalidation
    /// tag. Errors during the store step are logged, not surfaced; the
    /// computed value is returned regardless (spec §4.9).
    pub async fn compute_and_store(&self, coordinates: &EntityCoordinates) -> Result<Definition> {
        let definition = self.compute(coordinates, None).await?;
        if definition.is_empty() {
            return Ok(definition);
        }

        if let Err(e) = self.store.store(coordinates, &self.schema_version, &definition).await {
            error!(%coordinates, error = %e, "failed to persist computed definition");
        }
        if let Err(e) = self.search.store(coordinates, &definition).await {
            error!(%coordinates, error = %e, "failed to index computed definition for search");
        }
        let tag = coordinates.tag_hash().to_string();
        if let Err(e) = self.cdn.invalidate(&tag).await {
            error!(%coordinates, error = %e, "failed to queue CDN invalidation");
        }

        Ok(definition)
    }

    /// Like [`Self::compute_and_store`], invoked after a curation merge:
    /// the curator has already updated its repository, so a plain
    /// recompute picks up the new patch.
    pub async fn compute_store_and_curate(&self, coordinates: &EntityCoordinates) -> Result<Definition> {
        self.compute_and_store(coordinates).await
    }

    /// Delete a single coordinate's stored definition, search entry, and
    /// issue a CDN invalidation.
    pub async fn invalidate(&self, coordinates: &EntityCoordinates) -> Result<()> {
        self.store.delete(coordinates, &self.schema_version).await?;
        self.search.delete(coordinates).await?;
        let tag = coordinates.tag_hash().to_string();
        self.cdn.invalidate(&tag).await
    }

    pub async fn invalidate_batch(&self, coordinates: &[EntityCoordinates]) -> Result<()> {
        for c in coordinates {
            self.invalidate(c).await?;
        }
        Ok(())
    }

    /// For each input coordinate, resolve through the store's `list`
    /// (case-insensitive on name) and return the union of coordinates
    /// that exist, preserving the case the store holds them in.
    /// In-flight store reads are capped (spec §9).
    pub async fn list_all(&self, coordinates_batch: &[EntityCoordinates]) -> Result<Vec<EntityCoordinates>> {
        let semaphore = Arc::new(Semaphore::new(LIST_ALL_CONCURRENCY));
        let mut tasks = Vec::with_capacity(coordinates_batch.len());
        for target in coordinates_batch {
            let store = self.store.clone();
            let target = target.clone();
            let semaphore = semaphore.clone();
            tasks.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
                let listed = store.list(&target).await.unwrap_or_default();
                listed
                    .into_iter()
                    .filter_map(|s| EntityCoordinates::parse(&s).ok())
                    .filter(|c| c.name_key() == target.name_key())
                    .collect::<Vec<_>>()
            }));
        }

        let mut out = Vec::new();
        for task in tasks {
            if let Ok(mut found) = task.await {
                out.append(&mut found);
            }
        }
        out.sort_by_key(|c| c.to_string());
        out.dedup_by_key(|c| c.to_string());
        Ok(out)
    }

    pub async fn find(&self, query: &FindQuery, continuation_token: Option<&str>) -> Result<FindPage> {
        self.store.find(query, continuation_token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{NoopCdnSink, NoopCrawlerClient, PassthroughSummarizer};
    use crate::curator::CurationRepository;
    use catalog_core::{CurationCoordinates, ToolSpec};
    use catalog_queue::InMemoryQueue;
    use catalog_storage::{InMemoryDefinitionStore, InMemoryHarvestStore, InMemorySearchIndex};
    use serde_json::json;
    use std::time::Duration;

    struct NoCurations;

    #[async_trait::async_trait]
    impl CurationRepository for NoCurations {
        async fn get_merged(&self, _c: &CurationCoordinates) -> Result<Option<String>> {
            Ok(None)
        }
        async fn get_pr_file(&self, _c: &CurationCoordinates, _pr: u64) -> Result<Option<String>> {
            Ok(None)
        }
        async fn put_merged(&self, _c: &CurationCoordinates, _yaml: &str) -> Result<()> {
            Ok(())
        }
    }

    fn precedence() -> Precedence {
        Precedence::new(vec![vec![ToolSpec::parse("scancode")], vec![ToolSpec::parse("licensee")]])
    }

    fn service() -> (DefinitionService, Arc<InMemoryHarvestStore>, Arc<InMemoryDefinitionStore>, Arc<InMemorySearchIndex>) {
        let harvest = Arc::new(InMemoryHarvestStore::new());
        let store = Arc::new(InMemoryDefinitionStore::new());
        let search = Arc::new(InMemorySearchIndex::new());
        let curator = Arc::new(Curator::new(Arc::new(NoCurations)));
        let service = DefinitionService::new(
            harvest.clone(),
            Arc::new(PassthroughSummarizer),
            precedence(),
            curator,
            store.clone(),
            search.clone(),
            Arc::new(NoopCrawlerClient),
            Arc::new(NoopCdnSink),
            Arc::new(ComputeLock::new()),
            "1.0.0".to_string(),
            Arc::new(InMemoryQueue::new(Duration::from_secs(30))),
        );
        (service, harvest, store, search)
    }

    #[tokio::test]
    async fn compute_with_no_harvest_data_returns_empty_definition() {
        let (service, _harvest, _store, _search) = service();
        let coords = EntityCoordinates::parse("npm/npmjs/-/left-pad/1.3.0").unwrap();
        let def = service.compute(&coords, None).await.unwrap();
        assert!(def.is_empty());
    }

    #[tokio::test]
    async fn compute_and_store_persists_a_nonempty_result_and_skips_an_empty_one() {
        let (service, harvest, store, search) = service();
        let coords = EntityCoordinates::parse("npm/npmjs/-/left-pad/1.3.0").unwrap();

        harvest
            .put(
                &catalog_core::ResultCoordinates::new(coords.clone(), "scancode", "3.2.2"),
                serde_json::to_vec(&json!({ "licensed": { "declared": "MIT" } })).unwrap(),
            )
            .await
            .unwrap();

        let result = service.compute_and_store(&coords).await.unwrap();
        assert!(!result.is_empty());
        assert_eq!(result.described_tools(), vec!["scancode/3.2.2".to_string()]);
        assert!(store.get(&coords, "1.0.0").await.unwrap().is_some());
        assert_eq!(search.facet_query("total").await.unwrap().total, 1);

        let empty_coords = EntityCoordinates::parse("npm/npmjs/-/nothing/1.0.0").unwrap();
        let empty_result = service.compute_and_store(&empty_coords).await.unwrap();
        assert!(empty_result.is_empty());
        assert!(store.get(&empty_coords, "1.0.0").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_returns_stored_value_without_recomputing_when_not_forced() {
        let (service, harvest, store, _search) = service();
        let coords = EntityCoordinates::parse("npm/npmjs/-/left-pad/1.3.0").unwrap();

        let mut stored = Definition::empty();
        stored.set_coordinates(&coords);
        stored.set_described_tools(vec!["scancode/9.9.9".to_string()]);
        stored.set_schema_version("1.0.0");
        store.store(&coords, "1.0.0", &stored).await.unwrap();

        harvest
            .put(
                &catalog_core::ResultCoordinates::new(coords.clone(), "scancode", "3.2.2"),
                serde_json::to_vec(&json!({ "licensed": { "declared": "MIT" } })).unwrap(),
            )
            .await
            .unwrap();

        let result = service.get(&coords, None, false).await.unwrap();
        assert_eq!(result.described_tools(), vec!["scancode/9.9.9".to_string()]);
    }

    #[tokio::test]
    async fn get_recomputes_and_enqueues_upgrade_when_stored_definition_is_stale() {
        let harvest = Arc::new(InMemoryHarvestStore::new());
        let store = Arc::new(InMemoryDefinitionStore::new());
        let search = Arc::new(InMemorySearchIndex::new());
        let curator = Arc::new(Curator::new(Arc::new(NoCurations)));
        let upgrade_queue = Arc::new(InMemoryQueue::new(Duration::from_secs(30)));
        let service = DefinitionService::new(
            harvest.clone(),
            Arc::new(PassthroughSummarizer),
            precedence(),
            curator,
            store.clone(),
            search.clone(),
            Arc::new(NoopCrawlerClient),
            Arc::new(NoopCdnSink),
            Arc::new(ComputeLock::new()),
            "2.0.0".to_string(),
            upgrade_queue.clone(),
        );
        let coords = EntityCoordinates::parse("npm/npmjs/-/left-pad/1.3.0").unwrap();

        let mut stale = Definition::empty();
        stale.set_coordinates(&coords);
        stale.set_described_tools(vec!["scancode/1.0.0".to_string()]);
        stale.set_schema_version("1.0.0");
        store.store(&coords, "2.0.0", &stale).await.unwrap();

        harvest
            .put(
                &catalog_core::ResultCoordinates::new(coords.clone(), "scancode", "3.2.2"),
                serde_json::to_vec(&json!({ "licensed": { "declared": "MIT" } })).unwrap(),
            )
            .await
            .unwrap();

        let result = service.get(&coords, None, false).await.unwrap();
        assert_eq!(result.described_tools(), vec!["scancode/3.2.2".to_string()]);
        assert_eq!(result.schema_version(), Some("2.0.0"));

        let enqueued = upgrade_queue.dequeue_multiple().await.unwrap();
        assert_eq!(enqueued.len(), 1);
        assert_eq!(enqueued[0].data["coordinates"], coords.to_string());
    }

    #[tokio::test]
    async fn invalidate_removes_from_store_and_search() {
        let (service, _harvest, store, search) = service();
        let coords = EntityCoordinates::parse("npm/npmjs/-/left-pad/1.3.0").unwrap();

        let mut def = Definition::empty();
        def.set_coordinates(&coords);
        store.store(&coords, "1.0.0", &def).await.unwrap();
        search.store(&coords, &def).await.unwrap();

        service.invalidate(&coords).await.unwrap();
        assert!(store.get(&coords, "1.0.0").await.unwrap().is_none());
        assert_eq!(search.facet_query("total").await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn list_all_filters_to_the_requested_name() {
        let (service, _harvest, store, _search) = service();
        let left = EntityCoordinates::parse("npm/npmjs/-/left-pad/1.3.0").unwrap();
        let mut def = Definition::empty();
        def.set_coordinates(&left);
        store.store(&left, "1.0.0", &def).await.unwrap();

        let found = service.list_all(std::slice::from_ref(&left)).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].to_string(), left.to_string());
    }
}
