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

//! Shared test fixture: an [`AppState`] wired entirely from in-memory and
//! no-op collaborators, reused by every integration test file the way
//! `agentreplay-server`'s `tests/` suite shares one harness module.

use catalog_pipeline::{Curator, DefinitionService, NoopCdnSink, NoopCrawlerClient, PassthroughSummarizer, StatsEngine, SuggestionEngine};
use catalog_queue::{ComputeLock, InMemoryQueue};
use catalog_server::clients::{NoopCurationRepository, NoopGitHubClient};
use catalog_server::state::AppState;
use catalog_server::throttle::HarvestThrottle;
use catalog_storage::{HarvestStore, InMemoryDefinitionStore, InMemoryHarvestStore, InMemorySearchIndex};
use catalog_workers::{CdnInvalidator, NoopCdnFlushClient};
use std::sync::Arc;
use std::time::Duration;

#[allow(dead_code)]
pub struct Fixture {
    pub state: AppState,
    pub harvest: Arc<InMemoryHarvestStore>,
    pub store: Arc<InMemoryDefinitionStore>,
}

#[allow(dead_code)]
pub async fn build() -> Fixture {
    build_with_secrets(None, None).await
}

#[allow(dead_code)]
pub async fn build_with_secrets(crawler_secret: Option<String>, github_webhook_secret: Option<String>) -> Fixture {
    let harvest = Arc::new(InMemoryHarvestStore::new());
    let store = Arc::new(InMemoryDefinitionStore::new());
    let search = Arc::new(InMemorySearchIndex::new());
    let curator = Arc::new(Curator::new(Arc::new(NoopCurationRepository)));
    let compute_lock = Arc::new(ComputeLock::new());
    let harvest_queue: Arc<dyn catalog_queue::Queue> = Arc::new(InMemoryQueue::new(Duration::from_secs(30)));
    let upgrade_queue: Arc<dyn catalog_queue::Queue> = Arc::new(InMemoryQueue::new(Duration::from_secs(30)));

    let definitions = Arc::new(DefinitionService::new(
        harvest.clone(),
        Arc::new(PassthroughSummarizer),
        catalog_core::Precedence::new(vec![vec![catalog_core::ToolSpec::parse("scancode")]]),
        curator.clone(),
        store.clone(),
        search.clone(),
        Arc::new(NoopCrawlerClient),
        Arc::new(NoopCdnSink),
        compute_lock.clone(),
        "1.0.0".to_string(),
        upgrade_queue.clone(),
    ));

    let cdn = Arc::new(CdnInvalidator::new(Arc::new(NoopCdnFlushClient), 2000));
    let stats = Arc::new(StatsEngine::new(search.clone()));
    let suggestions = Arc::new(SuggestionEngine::new(store.clone(), "1.0.0".to_string()));

    let state = AppState::new(
        definitions,
        curator,
        harvest.clone() as Arc<dyn HarvestStore>,
        Arc::new(PassthroughSummarizer),
        Arc::new(NoopCrawlerClient),
        harvest_queue,
        upgrade_queue,
        compute_lock,
        cdn,
        stats,
        suggestions,
        Arc::new(NoopGitHubClient),
        Arc::new(HarvestThrottle::new(100, Duration::from_secs(60))),
        crawler_secret,
        github_webhook_secret,
    );

    Fixture { state, harvest, store }
}
