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

//! Harvest store (spec §4.2, C2): append-only storage for raw tool output,
//! keyed by `(coordinates, tool, toolVersion)`.

use async_trait::async_trait;
use catalog_core::{EntityCoordinates, ResultCoordinates, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::io::AsyncWrite;

/// Raw bytes as written by a crawler/tool, opaque to the harvest store.
pub type RawOutput = Vec<u8>;

/// `tool -> toolVersion -> rawOutput` for one entity.
pub type HarvestByTool = BTreeMap<String, BTreeMap<String, RawOutput>>;

/// `tool -> (toolVersion, rawOutput)` for one entity, retaining the
/// resolved version of whichever output won the per-tool comparison.
pub type LatestByTool = BTreeMap<String, (String, RawOutput)>;

#[async_trait]
pub trait HarvestStore: Send + Sync {
    /// Canonical `ResultCoordinates` strings under the prefix, deduplicated
    /// and sorted. A missing prefix yields an empty sequence, never an
    /// error (spec §4.2 failure mode).
    async fn list(&self, coordinates_prefix: &EntityCoordinates) -> Result<Vec<String>>;

    async fn get(&self, coordinates: &ResultCoordinates) -> Result<Option<RawOutput>>;

    async fn get_all(&self, coordinates: &EntityCoordinates) -> Result<HarvestByTool>;

    /// Like [`HarvestStore::get_all`] but retaining only the highest
    /// semantic version per tool; ties are broken lexicographically,
    /// descending (spec §4.2). The resolved `toolVersion` is kept
    /// alongside the raw output, since callers (summarization, then
    /// `described.tools`) need the real version, not a placeholder.
    async fn get_all_latest(&self, coordinates: &EntityCoordinates) -> Result<LatestByTool> {
        let all = self.get_all(coordinates).await?;
        Ok(latest_per_tool(all))
    }

    async fn stream(&self, coordinates: &ResultCoordinates, sink: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<()>;

    async fn put(&self, coordinates: &ResultCoordinates, raw: RawOutput) -> Result<()>;
}

/// Pick the highest semver per tool from a `get_all`-shaped map, breaking
/// ties lexicographically descending on the version string. Retains the
/// winning version alongside its raw output.
pub fn latest_per_tool(all: HarvestByTool) -> LatestByTool {
    let mut result = BTreeMap::new();
    for (tool, versions) in all {
        let best = versions.into_iter().max_by(|(v1, _), (v2, _)| compare_versions(v1, v2));
        if let Some((version, raw)) = best {
            result.insert(tool, (version, raw));
        }
    }
    result
}

/// Compare two version strings by semver when both parse, otherwise fall
/// back to lexicographic order; lexicographic descending breaks ties.
pub fn compare_versions(a: &str, b: &str) -> std::cmp::Ordering {
    match (semver::Version::parse(a), semver::Version::parse(b)) {
        (Ok(va), Ok(vb)) => va.cmp(&vb).then_with(|| a.cmp(b)),
        _ => a.cmp(b),
    }
}

/// In-memory reference implementation, sufficient for tests, the CLI's
/// local mode, and as the first entry in a dispatch store.
#[derive(Default)]
pub struct InMemoryHarvestStore {
    inner: Arc<parking_lot::RwLock<BTreeMap<String, RawOutput>>>,
}

impl InMemoryHarvestStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HarvestStore for InMemoryHarvestStore {
    async fn list(&self, coordinates_prefix: &EntityCoordinates) -> Result<Vec<String>> {
        let prefix = coordinates_prefix.to_string_without_revision();
        let map = self.inner.read();
        let mut keys: Vec<String> = map
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .cloned()
            .collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn get(&self, coordinates: &ResultCoordinates) -> Result<Option<RawOutput>> {
        Ok(self.inner.read().get(&coordinates.to_string()).cloned())
    }

    async fn get_all(&self, coordinates: &EntityCoordinates) -> Result<HarvestByTool> {
        let prefix = format!("{}/", coordinates);
        let map = self.inner.read();
        let mut out = HarvestByTool::new();
        for (key, raw) in map.iter() {
            if let Some(rest) = key.strip_prefix(&prefix) {
                if let Some((tool, version)) = rest.split_once('/') {
                    out.entry(tool.to_string())
                        .or_default()
                        .insert(version.to_string(), raw.clone());
                }
            }
        }
        Ok(out)
    }

    async fn stream(&self, coordinates: &ResultCoordinates, sink: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<()> {
        use tokio::io::AsyncWriteExt;
        if let Some(raw) = self.get(coordinates).await? {
            sink.write_all(&raw).await?;
        }
        Ok(())
    }

    async fn put(&self, coordinates: &ResultCoordinates, raw: RawOutput) -> Result<()> {
        self.inner.write().insert(coordinates.to_string(), raw);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rc(entity: &str, tool: &str, version: &str) -> ResultCoordinates {
        ResultCoordinates::new(EntityCoordinates::parse(entity).unwrap(), tool, version)
    }

    #[tokio::test]
    async fn missing_prefix_returns_empty_not_error() {
        let store = InMemoryHarvestStore::new();
        let result = store.list(&EntityCoordinates::parse("npm/npmjs/-/nothing").unwrap()).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn get_all_latest_picks_highest_semver() {
        let store = InMemoryHarvestStore::new();
        let entity = "npm/npmjs/-/test/1.0.0";
        store.put(&rc(entity, "scancode", "3.2.2"), b"old".to_vec()).await.unwrap();
        store.put(&rc(entity, "scancode", "30.1.0"), b"new".to_vec()).await.unwrap();

        let latest = store
            .get_all_latest(&EntityCoordinates::parse(entity).unwrap())
            .await
            .unwrap();
        assert_eq!(latest.get("scancode"), Some(&("30.1.0".to_string(), b"new".to_vec())));
    }

    #[tokio::test]
    async fn get_all_latest_breaks_ties_lexicographically_descending() {
        assert_eq!(compare_versions("rc-a", "rc-b"), std::cmp::Ordering::Less);
    }
}
