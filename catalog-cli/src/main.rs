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

//! Operator CLI for ad-hoc definition lookups, cache invalidation, and
//! running a single queue-processor batch against the in-memory
//! reference stores (`catalog_storage::InMemory*`) -- the same stores
//! the server falls back to when no concrete backend is configured. It
//! does not attach to a running server process; each invocation starts
//! from an empty store, optionally seeded from local files, the way
//! `flowtrace`'s CLI operates directly on a database directory rather
//! than through the running server.

use anyhow::{Context, Result};
use catalog_core::{Definition, EntityCoordinates, Precedence, ResultCoordinates, ToolSpec};
use catalog_pipeline::{Curator, DefinitionService, NoopCdnSink, NoopCrawlerClient, PassthroughSummarizer};
use catalog_queue::{ComputeLock, InMemoryQueue, Queue};
use catalog_storage::{DefinitionStore, HarvestStore, InMemoryDefinitionStore, InMemoryHarvestStore, InMemorySearchIndex};
use catalog_workers::{HarvestUpdateProcessor, QueueUpgrader};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "catalog")]
#[command(about = "Operator CLI for the component metadata catalog", long_about = None)]
struct Cli {
    /// Verbose (debug-level) logging.
    #[arg(short, long)]
    verbose: bool,

    /// Print results as raw JSON instead of a human-readable summary.
    #[arg(long)]
    json: bool,

    /// Current schema version to compute against. Defaults to the same
    /// default the server config template ships with.
    #[arg(long, default_value = "1.0.0")]
    schema_version: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute a definition for one coordinate. Optionally seeds the
    /// harvest store first from a directory of raw tool output files
    /// named `<tool>/<toolVersion>.json`.
    Get {
        /// Coordinates in canonical or URN form, e.g. npm/npmjs/-/left-pad/1.3.0
        coordinates: String,

        /// Compute against an open pull request's curation instead of
        /// the merged one.
        #[arg(long)]
        pr: Option<u64>,

        /// Directory of `<tool>/<toolVersion>.json` raw harvest files to
        /// load before computing.
        #[arg(long)]
        harvest_dir: Option<PathBuf>,
    },

    /// Invalidate one or more stored definitions: deletes the store and
    /// search index entries and reports the CDN tag that would be
    /// flushed for each.
    Invalidate {
        /// One or more coordinates to invalidate.
        coordinates: Vec<String>,
    },

    /// Run a single batch (`--once` semantics) of the harvest-update
    /// queue processor against a local newline-delimited JSON queue
    /// file, one crawler notification payload per line.
    RunHarvestUpdate {
        /// Path to a file of newline-delimited JSON messages.
        queue_file: PathBuf,
    },

    /// Run a single batch of the schema-upgrade queue processor against
    /// a local newline-delimited JSON queue file of
    /// `{"coordinates": ..., "_meta": {...}}` upgrade notifications.
    RunUpgrade {
        /// Path to a file of newline-delimited JSON messages.
        queue_file: PathBuf,
    },
}

fn default_precedence() -> Precedence {
    Precedence::new(vec![
        vec![ToolSpec::parse("clearlydefined")],
        vec![ToolSpec::parse("reuse")],
        vec![ToolSpec::parse("licensee")],
        vec![ToolSpec::parse("cdsrc")],
        vec![ToolSpec::parse("scancode")],
        vec![ToolSpec::parse("fossology")],
    ])
}

struct Wiring {
    definitions: Arc<DefinitionService>,
    harvest: Arc<InMemoryHarvestStore>,
    store: Arc<InMemoryDefinitionStore>,
    harvest_queue: Arc<dyn Queue>,
    upgrade_queue: Arc<dyn Queue>,
    lock: Arc<ComputeLock>,
}

struct NoopRepository;

#[async_trait::async_trait]
impl catalog_pipeline::CurationRepository for NoopRepository {
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

fn wire(schema_version: &str) -> Wiring {
    let harvest = Arc::new(InMemoryHarvestStore::new());
    let store = Arc::new(InMemoryDefinitionStore::new());
    let search = Arc::new(InMemorySearchIndex::new());
    let lock = Arc::new(ComputeLock::new());
    let curator = Arc::new(Curator::new(Arc::new(NoopRepository)));
    let harvest_queue: Arc<dyn Queue> = Arc::new(InMemoryQueue::new(Duration::from_secs(30)));
    let upgrade_queue: Arc<dyn Queue> = Arc::new(InMemoryQueue::new(Duration::from_secs(30)));

    let definitions = Arc::new(DefinitionService::new(
        harvest.clone(),
        Arc::new(PassthroughSummarizer),
        default_precedence(),
        curator,
        store.clone(),
        search,
        Arc::new(NoopCrawlerClient),
        Arc::new(NoopCdnSink),
        lock.clone(),
        schema_version.to_string(),
        upgrade_queue.clone(),
    ));

    Wiring {
        definitions,
        harvest,
        store,
        harvest_queue,
        upgrade_queue,
        lock,
    }
}

async fn seed_harvest_dir(harvest: &InMemoryHarvestStore, coordinates: &EntityCoordinates, dir: &std::path::Path) -> Result<usize> {
    let mut count = 0;
    for tool_entry in std::fs::read_dir(dir).with_context(|| format!("reading harvest directory {}", dir.display()))? {
        let tool_entry = tool_entry?;
        if !tool_entry.file_type()?.is_dir() {
            continue;
        }
        let tool = tool_entry.file_name().to_string_lossy().into_owned();
        for version_entry in std::fs::read_dir(tool_entry.path())? {
            let version_entry = version_entry?;
            let path = version_entry.path();
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { continue };
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
            let rc = ResultCoordinates::new(coordinates.clone(), tool.clone(), stem.to_string());
            harvest.put(&rc, raw).await?;
            count += 1;
        }
    }
    Ok(count)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    match cli.command {
        Commands::Get { coordinates, pr, harvest_dir } => {
            let entity = EntityCoordinates::parse(&coordinates).with_context(|| format!("invalid coordinates: {coordinates}"))?;
            let wiring = wire(&cli.schema_version);

            if let Some(dir) = harvest_dir {
                let loaded = seed_harvest_dir(&wiring.harvest, &entity, &dir).await?;
                info!(loaded, "seeded harvest outputs from {}", dir.display());
            }

            let guard = wiring.lock.acquire(&entity.to_string()).await;
            let definition = wiring.definitions.compute(&entity, pr).await;
            guard.release();
            let definition = definition?;

            print_definition(&definition, cli.json);
        }

        Commands::Invalidate { coordinates } => {
            let wiring = wire(&cli.schema_version);
            for raw in coordinates {
                let entity = EntityCoordinates::parse(&raw).with_context(|| format!("invalid coordinates: {raw}"))?;
                wiring.store.delete(&entity, &cli.schema_version).await?;
                let tag = entity.tag_hash();
                if cli.json {
                    println!("{}", serde_json::json!({ "coordinates": entity.to_string(), "cdnTag": tag }));
                } else {
                    println!("invalidated {entity} (CDN tag {tag})");
                }
            }
        }

        Commands::RunHarvestUpdate { queue_file } => {
            let wiring = wire(&cli.schema_version);
            let loaded = load_queue_file(&wiring.harvest_queue, &queue_file).await?;
            info!(loaded, "loaded harvest-update queue messages from {}", queue_file.display());

            let processor = HarvestUpdateProcessor::new(wiring.harvest_queue, wiring.lock, wiring.definitions);
            let (_tx, rx) = tokio::sync::watch::channel(false);
            processor.run(true, rx).await;
            println!("processed one batch of {loaded} harvest-update message(s)");
        }

        Commands::RunUpgrade { queue_file } => {
            let wiring = wire(&cli.schema_version);
            let loaded = load_queue_file(&wiring.upgrade_queue, &queue_file).await?;
            info!(loaded, "loaded upgrade queue messages from {}", queue_file.display());

            let upgrader = QueueUpgrader::new(wiring.upgrade_queue, wiring.lock, wiring.definitions, cli.schema_version.clone())?;
            let (_tx, rx) = tokio::sync::watch::channel(false);
            upgrader.run(true, rx).await;
            println!("processed one batch of {loaded} upgrade message(s)");
        }
    }

    Ok(())
}

async fn load_queue_file(queue: &Arc<dyn Queue>, path: &std::path::Path) -> Result<usize> {
    let contents = std::fs::read_to_string(path).with_context(|| format!("reading queue file {}", path.display()))?;
    let mut count = 0;
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        queue.enqueue(line).await?;
        count += 1;
    }
    Ok(count)
}

fn print_definition(definition: &Definition, json: bool) {
    if json {
        println!("{}", serde_json::to_string_pretty(&definition.clone().into_value()).expect("Definition always serializes"));
        return;
    }
    if definition.is_empty() {
        println!("✗ no tool results found, definition is empty");
        return;
    }
    println!("✓ {}", definition.coordinates().map(|c| c.to_string()).unwrap_or_default());
    println!("  tools: {}", definition.described_tools().join(", "));
    if let Some(license) = definition.declared_license() {
        println!("  declared license: {license}");
    }
    if let Some(version) = definition.schema_version() {
        println!("  schema version: {version}");
    }
}
