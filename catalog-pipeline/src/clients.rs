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

//! Contracts for the external collaborators the pipeline calls out to but
//! does not own the implementation of (spec §1 "out of scope", §6.5): the
//! crawler (harvest requests), the CDN (tag invalidation), and the
//! tool-specific summarizers. Concrete implementations — an HTTP crawler
//! client, the batching CDN invalidator — live in `catalog-workers` and
//! `catalog-server`; this crate only depends on the trait, so the
//! definition service and curator never need to know about HTTP.

use async_trait::async_trait;
use catalog_core::{EntityCoordinates, Result, Summary};

/// Requests that the crawler (re-)harvest a tool for a coordinate. Used by
/// [`crate::definition_service::DefinitionService::get`] when a stored
/// definition exists but carries no tool results.
#[async_trait]
pub trait CrawlerClient: Send + Sync {
    async fn request_harvest(&self, tool: &str, coordinates: &EntityCoordinates) -> Result<()>;
}

/// A crawler client that does nothing — the default when no crawler URL
/// is configured (local/dev/test runs).
pub struct NoopCrawlerClient;

#[async_trait]
impl CrawlerClient for NoopCrawlerClient {
    async fn request_harvest(&self, _tool: &str, _coordinates: &EntityCoordinates) -> Result<()> {
        Ok(())
    }
}

/// The write side of the CDN invalidator (C13), as seen by the definition
/// service: accept a tag derived from a coordinate hash. Batching,
/// watermark flushing, and the periodic drain timer are the concrete
/// invalidator's concern (`catalog-workers::cdn`).
#[async_trait]
pub trait CdnSink: Send + Sync {
    async fn invalidate(&self, tag: &str) -> Result<()>;

    async fn invalidate_batch(&self, tags: &[String]) -> Result<()> {
        for tag in tags {
            self.invalidate(tag).await?;
        }
        Ok(())
    }
}

/// A CDN sink that does nothing — the default when no CDN flush URL is
/// configured.
pub struct NoopCdnSink;

#[async_trait]
impl CdnSink for NoopCdnSink {
    async fn invalidate(&self, _tag: &str) -> Result<()> {
        Ok(())
    }
}

/// Turns raw harvested bytes from one tool into a normalized [`Summary`].
/// Tool-specific summarization behavior is opaque and out of scope (spec
/// §1); the pipeline only needs *some* implementation to hand it a
/// [`Summary`] shape to aggregate. The default implementation treats the
/// raw bytes as already being a JSON object in the normalized shape,
/// which is how `clearlydefined`'s own harvest normalizers behave.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, tool: &str, tool_version: &str, raw: &[u8]) -> Result<Summary>;
}

pub struct PassthroughSummarizer;

#[async_trait]
impl Summarizer for PassthroughSummarizer {
    async fn summarize(&self, tool: &str, tool_version: &str, raw: &[u8]) -> Result<Summary> {
        let value: serde_json::Value = serde_json::from_slice(raw).map_err(|e| {
            catalog_core::CatalogError::Validation(format!(
                "tool {tool}/{tool_version} produced non-JSON harvest output: {e}"
            ))
        })?;
        match value {
            serde_json::Value::Object(map) => Ok(map),
            _ => Ok(Summary::new()),
        }
    }
}
