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

//! Server process configuration: the catalog pipeline's typed
//! [`CatalogConfig`] (spec §6.5) plus the HTTP-surface-only settings the
//! pipeline itself has no opinion about. Loaded by layering a TOML file
//! under `CATALOG_*` environment overrides, the way
//! `agentreplay-server::config::ServerConfig` loads.

use anyhow::Result;
use catalog_core::CatalogConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(flatten)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            cors_origins: Vec::new(),
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:4000".to_string()
}

/// Whether this process also runs the harvest-update/upgrade queue
/// consumers alongside the HTTP surface, matching a single deployable
/// binary the way `agentreplay-server`'s `main.rs` wires everything from
/// one config.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkersConfig {
    #[serde(default = "default_true")]
    pub run_harvest_update: bool,
    #[serde(default = "default_true")]
    pub run_upgrade: bool,
    #[serde(default = "default_true")]
    pub run_cdn_timer: bool,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            run_harvest_update: true,
            run_upgrade: true,
            run_cdn_timer: true,
        }
    }
}

fn default_true() -> bool {
    true
}

impl ServerConfig {
    /// Load a TOML file (if given) layered under `CATALOG_*` environment
    /// variable overrides, mirroring the teacher's
    /// `config`-crate-based layering.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = &path {
            builder = builder.add_source(config::File::from(path.as_path()));
        } else if Path::new("catalog.toml").exists() {
            builder = builder.add_source(config::File::with_name("catalog"));
        }
        builder = builder.add_source(config::Environment::with_prefix("CATALOG").separator("__"));
        let settings = builder.build()?;
        let config: Self = settings.try_deserialize()?;
        Ok(config)
    }

    /// Fail fast on wiring errors the process cannot recover from (spec
    /// §7 `Fatal`): an unset schema version is the one precondition the
    /// pipeline itself insists on (spec §4.11).
    pub fn validate(&self) -> Result<()> {
        if self.catalog.schema.current_version.trim().is_empty() {
            anyhow::bail!("schema.current_version must be set");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_core::config::{CatalogConfig, SchemaConfig};

    fn config_with_schema_version(version: &str) -> ServerConfig {
        ServerConfig {
            catalog: CatalogConfig {
                schema: SchemaConfig { current_version: version.to_string() },
                storage: Default::default(),
                queues: Default::default(),
                crawler: Default::default(),
                github: Default::default(),
                cdn: Default::default(),
                precedence: Default::default(),
            },
            http: HttpConfig::default(),
            workers: WorkersConfig::default(),
        }
    }

    #[test]
    fn validate_rejects_blank_schema_version() {
        let config = config_with_schema_version("  ");
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_accepts_a_set_schema_version() {
        let config = config_with_schema_version("1.0.0");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn http_config_defaults_to_localhost_with_no_cors_allowlist() {
        let http = HttpConfig::default();
        assert_eq!(http.listen_addr, "127.0.0.1:4000");
        assert!(http.cors_origins.is_empty());
    }

    #[test]
    fn workers_config_defaults_to_running_everything() {
        let workers = WorkersConfig::default();
        assert!(workers.run_harvest_update);
        assert!(workers.run_upgrade);
        assert!(workers.run_cdn_timer);
    }
}
