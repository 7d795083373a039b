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

//! Upgrade processor (spec §4.11, C12): a queue consumer that recomputes
//! definitions still stamped with a schema version older than the
//! runtime's current one. The version comparison itself
//! ([`VersionChecker`]) and the enqueue helper the read path uses to
//! report a stale hit live in `catalog_pipeline::versioning`, shared
//! with [`catalog_pipeline::DefinitionService::get`] so both call sites
//! agree on what "stale" means.

use catalog_core::{CatalogError, EntityCoordinates, Result};
use catalog_pipeline::{DefinitionService, VersionChecker};
use catalog_queue::{ComputeLock, Queue};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, warn};

const EMPTY_BATCH_SLEEP: Duration = Duration::from_secs(10);

/// Consumes the upgrade queue with the same per-coordinate lock
/// discipline as the harvest-update processor: re-validate against the
/// current schema and only recompute if the definition is still stale.
pub struct QueueUpgrader {
    queue: Arc<dyn Queue>,
    lock: Arc<ComputeLock>,
    service: Arc<DefinitionService>,
    checker: VersionChecker,
}

impl QueueUpgrader {
    /// Errors if `current_schema` is empty (spec §4.11: "must throw at
    /// construction if `currentSchema` is not set").
    pub fn new(queue: Arc<dyn Queue>, lock: Arc<ComputeLock>, service: Arc<DefinitionService>, current_schema: String) -> Result<Self> {
        if current_schema.trim().is_empty() {
            return Err(CatalogError::Fatal("QueueUpgrader requires a non-empty current schema version".to_string()));
        }
        Ok(Self {
            queue,
            lock,
            service,
            checker: VersionChecker::new(current_schema),
        })
    }

    pub async fn run(&self, once: bool, mut shutdown: watch::Receiver<bool>) {
        loop {
            let messages = match self.queue.dequeue_multiple().await {
                Ok(messages) => messages,
                Err(e) => {
                    error!(error = %e, "upgrade queue dequeue failed");
                    Vec::new()
                }
            };

            if messages.is_empty() {
                if once {
                    return;
                }
                tokio::select! {
                    _ = tokio::time::sleep(EMPTY_BATCH_SLEEP) => {}
                    _ = shutdown.changed() => { if *shutdown.borrow() { return; } }
                }
                continue;
            }

            for message in messages {
                if let Err(e) = self.handle_one(&message.data, &message.handle).await {
                    warn!(error = %e, "upgrade message handling failed, leaving for redelivery");
                }
            }

            if once {
                return;
            }
        }
    }

    async fn handle_one(&self, data: &serde_json::Value, handle: &str) -> Result<()> {
        let Some(urn_or_coordinates) = data.get("coordinates").and_then(serde_json::Value::as_str) else {
            debug!("upgrade message missing coordinates, dropping without ack");
            return Ok(());
        };
        let coordinates = EntityCoordinates::parse(urn_or_coordinates)?;
        let lock_key = coordinates.to_string();

        let guard = self.lock.acquire(&lock_key).await;
        let outcome = self.recompute(&coordinates).await;
        guard.release();
        outcome.map_err(|e| CatalogError::Fatal(format!("{coordinates}: {e}")))?;

        self.queue.delete(handle).await
    }

    async fn recompute(&self, coordinates: &EntityCoordinates) -> Result<()> {
        let Some(stored) = self.service.get_stored(coordinates).await? else {
            return Ok(());
        };
        if !self.checker.is_stale(&stored) {
            debug!(%coordinates, "definition already up to date, skipping upgrade");
            return Ok(());
        }
        self.service.compute_store_and_curate(coordinates).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_core::{Definition, Precedence, ToolSpec};
    use catalog_pipeline::{enqueue_upgrade, CurationRepository, Curator, NoopCdnSink, NoopCrawlerClient, PassthroughSummarizer};
    use catalog_queue::InMemoryQueue;
    use catalog_storage::{DefinitionStore, InMemoryDefinitionStore, InMemoryHarvestStore, InMemorySearchIndex};

    struct NoopRepo;
    #[async_trait::async_trait]
    impl CurationRepository for NoopRepo {
        async fn get_merged(&self, _c: &catalog_core::CurationCoordinates) -> Result<Option<String>> {
            Ok(None)
        }
        async fn get_pr_file(&self, _c: &catalog_core::CurationCoordinates, _pr: u64) -> Result<Option<String>> {
            Ok(None)
        }
        async fn put_merged(&self, _c: &catalog_core::CurationCoordinates, _yaml: &str) -> Result<()> {
            Ok(())
        }
    }

    fn service_with_store(schema_version: &str) -> (Arc<DefinitionService>, Arc<InMemoryDefinitionStore>) {
        let def_store = Arc::new(InMemoryDefinitionStore::new());
        let service = Arc::new(DefinitionService::new(
            Arc::new(InMemoryHarvestStore::new()),
            Arc::new(PassthroughSummarizer),
            Precedence::new(vec![vec![ToolSpec::parse("clearlydefined")]]),
            Arc::new(Curator::new(Arc::new(NoopRepo))),
            def_store.clone(),
            Arc::new(InMemorySearchIndex::new()),
            Arc::new(NoopCrawlerClient),
            Arc::new(NoopCdnSink),
            Arc::new(ComputeLock::new()),
            schema_version.to_string(),
            Arc::new(InMemoryQueue::new(Duration::from_secs(30))),
        ));
        (service, def_store)
    }

    #[test]
    fn construction_rejects_empty_current_schema() {
        let queue: Arc<dyn Queue> = Arc::new(InMemoryQueue::new(Duration::from_secs(30)));
        let (service, _store) = service_with_store("1.0.0");
        let result = QueueUpgrader::new(queue, Arc::new(ComputeLock::new()), service, String::new());
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn skips_recompute_when_already_current() {
        let (service, def_store) = service_with_store("2.0.0");
        let coords = EntityCoordinates::parse("gem/rubygems/-/0mq/0.5.2").unwrap();
        let mut stored = Definition::empty();
        stored.set_coordinates(&coords);
        stored.set_described_tools(vec!["scancode/3.2.2".to_string()]);
        stored.set_schema_version("2.0.0");
        def_store.store(&coords, "2.0.0", &stored).await.unwrap();

        let queue: Arc<dyn Queue> = Arc::new(InMemoryQueue::new(Duration::from_secs(30)));
        enqueue_upgrade(&*queue, &coords, &stored).await.unwrap();

        let upgrader = QueueUpgrader::new(queue.clone(), Arc::new(ComputeLock::new()), service, "2.0.0".to_string()).unwrap();
        let (_tx, rx) = watch::channel(false);
        upgrader.run(true, rx).await;

        let still = def_store.get(&coords, "2.0.0").await.unwrap().unwrap();
        assert_eq!(still.described_tools(), vec!["scancode/3.2.2".to_string()]);
        assert!(queue.dequeue_multiple().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn recomputes_when_stale() {
        let (service, def_store) = service_with_store("2.0.0");
        let coords = EntityCoordinates::parse("gem/rubygems/-/0mq/0.5.2").unwrap();
        let mut stored = Definition::empty();
        stored.set_coordinates(&coords);
        stored.set_described_tools(vec!["scancode/3.2.2".to_string()]);
        stored.set_schema_version("1.0.0");
        def_store.store(&coords, "2.0.0", &stored).await.unwrap();

        let queue: Arc<dyn Queue> = Arc::new(InMemoryQueue::new(Duration::from_secs(30)));
        enqueue_upgrade(&*queue, &coords, &stored).await.unwrap();

        let upgrader = QueueUpgrader::new(queue.clone(), Arc::new(ComputeLock::new()), service, "2.0.0".to_string()).unwrap();
        let (_tx, rx) = watch::channel(false);
        upgrader.run(true, rx).await;

        // The harvest store is empty so the recompute yields an empty
        // definition, which compute_and_store refuses to persist -- the
        // stale entry is therefore gone, not replaced in place.
        assert!(def_store.get(&coords, "2.0.0").await.unwrap().is_none());
        assert!(queue.dequeue_multiple().await.unwrap().is_empty());
    }
}
