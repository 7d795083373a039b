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

pub mod api;
pub mod clients;
pub mod config;
pub mod error;
pub mod metrics;
pub mod state;
pub mod throttle;

use anyhow::Result;
use axum::routing::{get, post};
use axum::Router;
use catalog_pipeline::{CdnSink, CrawlerClient, Curator, DefinitionService, NoopCdnSink, NoopCrawlerClient, StatsEngine, SuggestionEngine};
use catalog_queue::{ComputeLock, InMemoryQueue, Queue};
use catalog_storage::{DefinitionStore, DispatchStore, HarvestStore, InMemoryDefinitionStore, InMemoryHarvestStore, InMemorySearchIndex};
use catalog_workers::{CdnFlushClient, CdnInvalidator, HarvestUpdateProcessor, HttpCdnFlushClient, NoopCdnFlushClient, QueueUpgrader};
use clients::{GitHubClient, HttpCrawlerClient, HttpCurationRepository, HttpGitHubClient, NoopCurationRepository, NoopGitHubClient};
use config::ServerConfig;
use metrics::Metrics;
use state::AppState;
use std::sync::Arc;
use std::time::Duration;
use throttle::HarvestThrottle;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Default queue visibility timeout (spec §4.4's "time-bounded"
/// redelivery window), used for both the harvest-update and upgrade
/// queues until a deployment needs them tuned independently.
const QUEUE_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);

/// Harvest request throttle: tokens per tool, replenished over this
/// window (spec §6.1).
const HARVEST_THROTTLE_CAPACITY: u32 = 100;
const HARVEST_THROTTLE_WINDOW: Duration = Duration::from_secs(60);

/// How often the `/metrics` gauges/counters are re-sampled from their
/// sources.
const METRICS_SAMPLE_INTERVAL: Duration = Duration::from_secs(15);

pub async fn run_server(config: ServerConfig) -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "catalog_server=info,tower_http=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting catalog server");
    tracing::info!("configuration: {:#?}", config);

    config.validate()?;

    let definition_backend_count = config.catalog.storage.definition_stores.len().max(1);
    let definition_backends: Vec<Arc<dyn DefinitionStore>> =
        (0..definition_backend_count).map(|_| Arc::new(InMemoryDefinitionStore::new()) as Arc<dyn DefinitionStore>).collect();
    let definition_store = Arc::new(DispatchStore::new(definition_backends, config.catalog.storage.dispatch_concurrency));
    let harvest_store: Arc<dyn HarvestStore> = Arc::new(InMemoryHarvestStore::new());
    let search_index = Arc::new(InMemorySearchIndex::new());

    let harvest_queue: Arc<dyn Queue> = Arc::new(InMemoryQueue::new(QUEUE_VISIBILITY_TIMEOUT));
    let upgrade_queue: Arc<dyn Queue> = Arc::new(InMemoryQueue::new(QUEUE_VISIBILITY_TIMEOUT));
    let compute_lock = Arc::new(ComputeLock::new());

    let crawler: Arc<dyn CrawlerClient> = match &config.catalog.crawler.url {
        Some(url) => {
            tracing::info!(url, "wiring HTTP crawler client");
            Arc::new(HttpCrawlerClient::new(url.clone(), config.catalog.crawler.auth_token.clone()))
        }
        None => {
            tracing::warn!("no crawler URL configured, harvest requests will be dropped");
            Arc::new(NoopCrawlerClient)
        }
    };

    let github: Arc<dyn GitHubClient> = match (&config.catalog.github.owner, &config.catalog.github.repo) {
        (Some(owner), Some(repo)) => {
            tracing::info!(owner, repo, "wiring GitHub pull request client");
            Arc::new(HttpGitHubClient::new(owner.clone(), repo.clone(), config.catalog.github.token.clone()))
        }
        _ => {
            tracing::warn!("no GitHub repository configured, curation pull requests are unsupported");
            Arc::new(NoopGitHubClient)
        }
    };

    let curator = Arc::new(Curator::new(match (&config.catalog.github.owner, &config.catalog.github.repo) {
        (Some(owner), Some(repo)) => {
            let branch = config.catalog.github.branch.clone().unwrap_or_else(|| "main".to_string());
            Arc::new(HttpCurationRepository::new(owner.clone(), repo.clone(), branch, config.catalog.github.token.clone()))
        }
        _ => Arc::new(NoopCurationRepository),
    }));

    let cdn_flush_client: Arc<dyn CdnFlushClient> = match &config.catalog.cdn.flush_url {
        Some(url) => {
            tracing::info!(url, "wiring CDN flush client");
            Arc::new(HttpCdnFlushClient::new(url.clone(), config.catalog.cdn.auth_key.clone(), config.catalog.cdn.auth_email.clone()))
        }
        None => {
            tracing::warn!("no CDN flush URL configured, invalidations are no-ops");
            Arc::new(NoopCdnFlushClient)
        }
    };
    let cdn = Arc::new(CdnInvalidator::new(cdn_flush_client, config.catalog.cdn.watermark));
    let cdn_sink: Arc<dyn CdnSink> = if config.catalog.cdn.flush_url.is_some() {
        cdn.clone()
    } else {
        Arc::new(NoopCdnSink)
    };

    let precedence = config.catalog.precedence.to_precedence();
    let summarizer = Arc::new(catalog_pipeline::PassthroughSummarizer);

    let definitions = Arc::new(DefinitionService::new(
        harvest_store.clone(),
        summarizer.clone(),
        precedence,
        curator.clone(),
        definition_store.clone(),
        search_index.clone(),
        crawler.clone(),
        cdn_sink,
        compute_lock.clone(),
        config.catalog.schema.current_version.clone(),
        upgrade_queue.clone(),
    ));

    let stats = Arc::new(StatsEngine::new(search_index.clone()));
    let suggestions = Arc::new(SuggestionEngine::new(definition_store.clone(), config.catalog.schema.current_version.clone()));
    let harvest_throttle = Arc::new(HarvestThrottle::new(HARVEST_THROTTLE_CAPACITY, HARVEST_THROTTLE_WINDOW));

    let state = AppState::new(
        definitions.clone(),
        curator,
        harvest_store,
        summarizer,
        crawler,
        harvest_queue.clone(),
        upgrade_queue.clone(),
        compute_lock.clone(),
        cdn.clone(),
        stats,
        suggestions,
        github,
        harvest_throttle,
        config.catalog.crawler.webhook_secret.clone(),
        config.catalog.github.webhook_secret.clone(),
    );

    let mut background_tasks = Vec::new();

    if config.workers.run_harvest_update {
        let processor = HarvestUpdateProcessor::new(harvest_queue.clone(), compute_lock.clone(), definitions.clone());
        let (_tx, rx) = tokio::sync::watch::channel(false);
        tracing::info!("starting harvest-update queue processor");
        background_tasks.push(tokio::spawn(async move {
            processor.run(false, rx).await;
        }));
    }

    if config.workers.run_upgrade {
        let upgrader = QueueUpgrader::new(upgrade_queue.clone(), compute_lock.clone(), definitions.clone(), config.catalog.schema.current_version.clone())?;
        let (_tx, rx) = tokio::sync::watch::channel(false);
        tracing::info!("starting schema-upgrade queue processor");
        background_tasks.push(tokio::spawn(async move {
            upgrader.run(false, rx).await;
        }));
    }

    if config.workers.run_cdn_timer {
        tracing::info!(interval_secs = config.catalog.cdn.interval_secs, "starting periodic CDN flush timer");
        background_tasks.push(cdn.clone().spawn_periodic_flush(Duration::from_secs(config.catalog.cdn.interval_secs)));
    }

    let metrics = Arc::new(Metrics::new());
    background_tasks.push(metrics.clone().spawn_sampler(
        harvest_queue.clone(),
        upgrade_queue.clone(),
        compute_lock.clone(),
        cdn.clone(),
        METRICS_SAMPLE_INTERVAL,
    ));

    if config.http.cors_origins.is_empty() {
        tracing::warn!("CORS: allowing all origins (no cors_origins configured)");
    } else {
        tracing::info!(origins = ?config.http.cors_origins, "CORS: origin allowlist is not yet enforced, allowing all");
    }
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any).allow_origin(Any);

    let metrics_routes = Router::new().route("/metrics", get(metrics::get_metrics)).with_state(metrics);

    let app = Router::new()
        // Health
        .route("/health", get(api::health::health_check))
        // Definitions (spec §6.1)
        .route("/definitions", get(api::definitions::get_definition).post(api::definitions::list_definitions))
        // Harvest (spec §6.1)
        .route("/harvest", get(api::harvest::get_harvest).post(api::harvest::request_harvest))
        // Crawler/curation webhook (spec §6.2)
        .route("/webhook", post(api::webhook::handle_webhook))
        // Stats and license suggestions (spec §4.13/§4.14)
        .route("/stats/:stat_key", get(api::stats::get_stats))
        .route("/suggestions", get(api::stats::get_suggestions))
        .with_state(state)
        .merge(metrics_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.http.listen_addr).await?;
    tracing::info!(addr = %config.http.listen_addr, "listening");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    tokio::select! {
        _ = server_handle => {
            tracing::info!("HTTP server stopped");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    for task in background_tasks {
        task.abort();
    }
    if let Err(e) = cdn.uninitialize().await {
        tracing::warn!(error = %e, "final CDN flush failed during shutdown");
    }

    Ok(())
}
