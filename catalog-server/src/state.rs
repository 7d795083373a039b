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

//! Shared application state handed to every route handler, assembled
//! once at process startup (spec §9: "cross-service wiring is done once
//! at startup and passed by value or by a single dependency container").

use crate::clients::GitHubClient;
use crate::throttle::HarvestThrottle;
use catalog_pipeline::{Curator, CrawlerClient, DefinitionService, StatsEngine, Summarizer, SuggestionEngine};
use catalog_queue::{ComputeLock, Queue};
use catalog_storage::HarvestStore;
use catalog_workers::CdnInvalidator;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub definitions: Arc<DefinitionService>,
    pub curator: Arc<Curator>,
    pub harvest_store: Arc<dyn HarvestStore>,
    pub summarizer: Arc<dyn Summarizer>,
    pub crawler: Arc<dyn CrawlerClient>,
    pub harvest_queue: Arc<dyn Queue>,
    pub upgrade_queue: Arc<dyn Queue>,
    pub compute_lock: Arc<ComputeLock>,
    pub cdn: Arc<CdnInvalidator>,
    pub stats: Arc<StatsEngine>,
    pub suggestions: Arc<SuggestionEngine>,
    pub github: Arc<dyn GitHubClient>,
    pub harvest_throttle: Arc<HarvestThrottle>,
    pub crawler_secret: Option<String>,
    pub github_webhook_secret: Option<String>,
}

#[allow(clippy::too_many_arguments)]
impl AppState {
    pub fn new(
        definitions: Arc<DefinitionService>,
        curator: Arc<Curator>,
        harvest_store: Arc<dyn HarvestStore>,
        summarizer: Arc<dyn Summarizer>,
        crawler: Arc<dyn CrawlerClient>,
        harvest_queue: Arc<dyn Queue>,
        upgrade_queue: Arc<dyn Queue>,
        compute_lock: Arc<ComputeLock>,
        cdn: Arc<CdnInvalidator>,
        stats: Arc<StatsEngine>,
        suggestions: Arc<SuggestionEngine>,
        github: Arc<dyn GitHubClient>,
        harvest_throttle: Arc<HarvestThrottle>,
        crawler_secret: Option<String>,
        github_webhook_secret: Option<String>,
    ) -> Self {
        Self {
            definitions,
            curator,
            harvest_store,
            summarizer,
            crawler,
            harvest_queue,
            upgrade_queue,
            compute_lock,
            cdn,
            stats,
            suggestions,
            github,
            harvest_throttle,
            crawler_secret,
            github_webhook_secret,
        }
    }
}
