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

//! The core definition pipeline: aggregator (C7), curator (C8), scorer
//! (C9), definition service (C10), suggestion engine (C14), and stats
//! engine (C15).

pub mod aggregator;
pub mod clients;
pub mod curator;
pub mod definition_service;
pub mod merge;
pub mod scorer;
pub mod stats;
pub mod suggestion;
pub mod versioning;

pub use aggregator::aggregate;
pub use clients::{CdnSink, CrawlerClient, NoopCdnSink, NoopCrawlerClient, PassthroughSummarizer, Summarizer};
pub use curator::{CurationChange, CurationRepository, Curator};
pub use definition_service::DefinitionService;
pub use scorer::{apply_scores, described_score, licensed_score, ScoreBreakdown};
pub use stats::{StatsEngine, StatsResult};
pub use suggestion::{LicenseSuggestion, SuggestionEngine, Suggestions};
pub use versioning::{enqueue_upgrade, VersionChecker};
