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

//! Harvest-update processor (spec §4.10, C11): consumes crawler
//! notifications from the harvest queue and triggers recompute.

use catalog_core::ResultCoordinates;
use catalog_pipeline::DefinitionService;
use catalog_queue::{ComputeLock, Queue};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, warn};

const EMPTY_BATCH_SLEEP: Duration = Duration::from_secs(10);

pub struct HarvestUpdateProcessor {
    queue: Arc<dyn Queue>,
    lock: Arc<ComputeLock>,
    service: Arc<DefinitionService>,
}

impl HarvestUpdateProcessor {
    pub fn new(queue: Arc<dyn Queue>, lock: Arc<ComputeLock>, service: Arc<DefinitionService>) -> Self {
        Self { queue, lock, service }
    }

    /// Run the consume loop. `once = true` performs exactly one batch and
    /// returns, for `--once` CLI/test use; otherwise loops until
    /// `shutdown` fires.
    pub async fn run(&self, once: bool, mut shutdown: watch::Receiver<bool>) {
        loop {
            let messages = match self.queue.dequeue_multiple().await {
                Ok(messages) => messages,
                Err(e) => {
                    error!(error = %e, "harvest queue dequeue failed");
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
                // Every message handled independently: one failure must
                // never fail its siblings (spec §5).
                if let Err(e) = self.handle_one(&message.data, &message.handle).await {
                    warn!(error = %e, "harvest-update message handling failed, leaving for redelivery");
                }
            }

            if once {
                return;
            }
        }
    }

    async fn handle_one(&self, data: &serde_json::Value, handle: &str) -> catalog_core::Result<()> {
        let Some(urn) = data
            .get("_metadata")
            .and_then(|m| m.get("links"))
            .and_then(|l| l.get("self"))
            .and_then(|s| s.get("href"))
            .and_then(serde_json::Value::as_str)
        else {
            debug!("harvest-update message missing _metadata.links.self.href, dropping without ack");
            return Ok(());
        };

        let result_coordinates = ResultCoordinates::from_urn(urn)?;
        let coordinates = &result_coordinates.entity;
        let lock_key = coordinates.to_string();

        let guard = self.lock.acquire(&lock_key).await;
        let outcome = self.recompute(&result_coordinates).await;
        guard.release();
        outcome?;

        self.queue.delete(handle).await
    }

    async fn recompute(&self, rc: &ResultCoordinates) -> catalog_core::Result<()> {
        if rc.tool.eq_ignore_ascii_case("clearlydefined") {
            self.service.compute_store_and_curate(&rc.entity).await?;
            return Ok(());
        }

        let incoming = format!("{}/{}", rc.tool, rc.tool_version);
        match self.service.get_stored(&rc.entity).await? {
            Some(stored) if stored.described_tools().contains(&incoming) => {
                debug!(tool = %incoming, "Skip definition computation as the tool result has already been processed");
                Ok(())
            }
            _ => {
                self.service.compute_and_store(&rc.entity).await?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_core::{Definition, EntityCoordinates, Precedence, ToolSpec};
    use catalog_pipeline::{CurationRepository, Curator, NoopCdnSink, NoopCrawlerClient, PassthroughSummarizer};
    use catalog_queue::InMemoryQueue;
    use catalog_storage::{DefinitionStore, InMemoryDefinitionStore, InMemoryHarvestStore, InMemorySearchIndex};
    use serde_json::json;

    struct NoopRepo;
    #[async_trait::async_trait]
    impl CurationRepository for NoopRepo {
        async fn get_merged(&self, _c: &catalog_core::CurationCoordinates) -> catalog_core::Result<Option<String>> {
            Ok(None)
        }
        async fn get_pr_file(&self, _c: &catalog_core::CurationCoordinates, _pr: u64) -> catalog_core::Result<Option<String>> {
            Ok(None)
        }
        async fn put_merged(&self, _c: &catalog_core::CurationCoordinates, _yaml: &str) -> catalog_core::Result<()> {
            Ok(())
        }
    }

    fn service_with_store() -> (Arc<DefinitionService>, Arc<InMemoryDefinitionStore>) {
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
            "1.0.0".to_string(),
            Arc::new(InMemoryQueue::new(Duration::from_secs(30))),
        ));
        (service, def_store)
    }

    #[tokio::test]
    async fn skips_recompute_when_tool_already_processed() {
        let (service, def_store) = service_with_store();
        let coords = EntityCoordinates::parse("gem/rubygems/-/0mq/0.5.2").unwrap();
        let mut stored = Definition::empty();
        stored.set_coordinates(&coords);
        stored.set_described_tools(vec!["scancode/3.2.2".to_string()]);
        def_store.store(&coords, "1.0.0", &stored).await.unwrap();

        let queue: Arc<dyn Queue> = Arc::new(InMemoryQueue::new(Duration::from_secs(30)));
        let (_tx, rx) = watch::channel(false);
        let processor = HarvestUpdateProcessor::new(queue.clone(), Arc::new(ComputeLock::new()), service.clone());

        let urn = "urn:gem:rubygems:-:0mq:revision:0.5.2:tool:scancode:3.2.2";
        queue
            .enqueue(&json!({"_metadata": {"links": {"self": {"href": urn}}}}).to_string())
            .await
            .unwrap();
        processor.run(true, rx).await;

        // Since the harvest store is empty, a wrongly-invoked recompute
        // would yield an empty definition but never overwrite the store
        // (compute_and_store refuses to persist empty results) -- so we
        // instead assert the queued message was acknowledged, which only
        // happens once handle_one's skip-or-recompute branch completes
        // without error.
        let remaining = queue.dequeue_multiple().await.unwrap();
        assert!(remaining.is_empty(), "message should have been deleted after the skip");

        let still_stored = def_store.get(&coords, "1.0.0").await.unwrap().unwrap();
        assert_eq!(still_stored.described_tools(), vec!["scancode/3.2.2".to_string()]);
    }

    #[tokio::test]
    async fn clearlydefined_tool_triggers_compute_store_and_curate() {
        let (service, def_store) = service_with_store();
        let coords = EntityCoordinates::parse("gem/rubygems/-/0mq/0.5.2").unwrap();

        let queue: Arc<dyn Queue> = Arc::new(InMemoryQueue::new(Duration::from_secs(30)));
        let (_tx, rx) = watch::channel(false);
        let processor = HarvestUpdateProcessor::new(queue.clone(), Arc::new(ComputeLock::new()), service);

        let urn = "urn:gem:rubygems:-:0mq:revision:0.5.2:tool:clearlydefined:1.3.3";
        queue
            .enqueue(&json!({"_metadata": {"links": {"self": {"href": urn}}}}).to_string())
            .await
            .unwrap();
        processor.run(true, rx).await;

        // No tool output was ever harvested, so the computed definition
        // is empty and nothing gets persisted -- but the call path still
        // must have gone through compute_store_and_curate without error.
        assert!(def_store.get(&coords, "1.0.0").await.unwrap().is_none());
    }
}
