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

//! Typed configuration. Loaded by `catalog-server`/`catalog-cli` via the
//! `config` crate, layering a TOML file under `CATALOG_*` env overrides.

use crate::precedence::{Precedence, ToolSpec};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogConfig {
    pub schema: SchemaConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub queues: QueueConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub cdn: CdnConfig,
    #[serde(default)]
    pub precedence: PrecedenceConfig,
}

/// Tool precedence groups for the aggregator (§4.6), highest-priority
/// group first; each group is a list of `name` or `name/version`
/// `toolSpec` strings. Defaults to the order ClearlyDefined itself ships
/// with, so a bare config still aggregates sensibly.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(transparent)]
pub struct PrecedenceConfig {
    pub groups: Vec<Vec<String>>,
}

impl Default for PrecedenceConfig {
    fn default() -> Self {
        Self {
            groups: vec![
                vec!["clearlydefined".to_string()],
                vec!["reuse".to_string()],
                vec!["licensee".to_string()],
                vec!["cdsrc".to_string()],
                vec!["scancode".to_string()],
                vec!["fossology".to_string()],
            ],
        }
    }
}

impl PrecedenceConfig {
    pub fn to_precedence(&self) -> Precedence {
        Precedence::new(
            self.groups
                .iter()
                .map(|group| group.iter().map(|spec| ToolSpec::parse(spec)).collect())
                .collect(),
        )
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchemaConfig {
    /// Current definition schema version, semver form. A stored
    /// definition older than this is stale and must be recomputed.
    pub current_version: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Backing definition/harvest/attachment store connection strings,
    /// one per configured backend, fanned out by the dispatch store.
    #[serde(default)]
    pub definition_stores: Vec<StoreBackendConfig>,
    #[serde(default)]
    pub harvest_store: Option<StoreBackendConfig>,
    /// Bound on concurrent in-flight reads/writes per dispatch fan-out.
    /// Default 10.
    #[serde(default = "default_dispatch_concurrency")]
    pub dispatch_concurrency: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            definition_stores: Vec::new(),
            harvest_store: None,
            dispatch_concurrency: default_dispatch_concurrency(),
        }
    }
}

fn default_dispatch_concurrency() -> usize {
    10
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreBackendConfig {
    pub name: String,
    pub connection_string: String,
    #[serde(default)]
    pub container: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct QueueConfig {
    #[serde(default = "default_harvest_queue")]
    pub harvest_queue_name: String,
    #[serde(default = "default_upgrade_queue")]
    pub upgrade_queue_name: String,
    #[serde(default)]
    pub connection_string: Option<String>,
}

fn default_harvest_queue() -> String {
    "harvest-update".to_string()
}

fn default_upgrade_queue() -> String {
    "definition-upgrade".to_string()
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CrawlerConfig {
    pub url: Option<String>,
    pub auth_token: Option<String>,
    /// Shared secret checked against the `X-Crawler` webhook header.
    pub webhook_secret: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GitHubConfig {
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub branch: Option<String>,
    pub token: Option<String>,
    /// HMAC-SHA1 secret checked against `X-Hub-Signature`.
    pub webhook_secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CdnConfig {
    pub flush_url: Option<String>,
    pub auth_key: Option<String>,
    pub auth_email: Option<String>,
    #[serde(default = "default_cdn_watermark")]
    pub watermark: usize,
    #[serde(default = "default_cdn_interval_secs")]
    pub interval_secs: u64,
}

impl Default for CdnConfig {
    fn default() -> Self {
        Self {
            flush_url: None,
            auth_key: None,
            auth_email: None,
            watermark: default_cdn_watermark(),
            interval_secs: default_cdn_interval_secs(),
        }
    }
}

fn default_cdn_watermark() -> usize {
    2000
}

fn default_cdn_interval_secs() -> u64 {
    5 * 60
}
