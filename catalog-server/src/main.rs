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

use anyhow::Result;
use catalog_server::{config::ServerConfig, run_server};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP listen address (overrides config file)
    #[arg(long, env = "CATALOG_HTTP_ADDR")]
    http_addr: Option<String>,

    /// Current definition schema version (overrides config file)
    #[arg(long, env = "CATALOG_SCHEMA_VERSION")]
    schema_version: Option<String>,

    /// Disable the harvest-update and schema-upgrade background
    /// workers, serving HTTP only.
    #[arg(long, env = "CATALOG_DISABLE_WORKERS")]
    disable_workers: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ServerConfig::load(args.config)?;

    if let Some(addr) = args.http_addr {
        config.http.listen_addr = addr;
    }
    if let Some(schema_version) = args.schema_version {
        config.catalog.schema.current_version = schema_version;
    }
    if args.disable_workers {
        config.workers.run_harvest_update = false;
        config.workers.run_upgrade = false;
        config.workers.run_cdn_timer = false;
    }

    run_server(config).await
}
