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

//! Curator (spec §4.7, C8): applies community-submitted curation patches
//! and validates/tracks pull-request-scoped contributions.
//!
//! The curator and the definition service each need something from the
//! other — the curator needs to trigger a recompute on merge, the
//! definition service needs the curator's patch to apply it — which in
//! the source this was wired as a cyclic service reference. Here that
//! cycle is broken with a `tokio::broadcast` channel: the curator emits
//! `CurationChange` events on merge and never holds a reference to the
//! definition service; whoever wires the process subscribes and reacts
//! (see `catalog-workers`).

use crate::merge;
use async_trait::async_trait;
use catalog_core::{
    CatalogError, Contribution, Curation, CurationCoordinates, Definition, EntityCoordinates, Result,
};
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// The source-of-truth curation repository: one YAML file per component
/// at `curations/<type>/<provider>/[<namespace>/]<name>.yaml` (spec
/// §6.3). Concrete GitHub-backed storage is an external collaborator
/// (spec §1); this is the contract the curator depends on.
#[async_trait]
pub trait CurationRepository: Send + Sync {
    /// The merged (main-branch) curation file content for a component, if
    /// one exists.
    async fn get_merged(&self, coordinates: &CurationCoordinates) -> Result<Option<String>>;

    /// The curation file content as proposed by an open pull request,
    /// bypassing the merged file.
    async fn get_pr_file(&self, coordinates: &CurationCoordinates, pr_number: u64) -> Result<Option<String>>;

    /// Write the merged curation file content, invoked when a
    /// contribution is merged.
    async fn put_merged(&self, coordinates: &CurationCoordinates, yaml: &str) -> Result<()>;
}

/// A `(coordinates, revision)` pair whose curation changed, emitted when
/// a contribution is merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurationChange {
    pub coordinates: EntityCoordinates,
}

pub struct Curator {
    repository: std::sync::Arc<dyn CurationRepository>,
    /// `pr_number -> Contribution`, refined on open/synchronize, retired
    /// on merge.
    contributions: DashMap<u64, Contribution>,
    changes: broadcast::Sender<CurationChange>,
}

impl Curator {
    pub fn new(repository: std::sync::Arc<dyn CurationRepository>) -> Self {
        let (changes, _) = broadcast::channel(1024);
        Self {
            repository,
            contributions: DashMap::new(),
            changes,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CurationChange> {
        self.changes.subscribe()
    }

    /// The curation in effect for a coordinate: the PR-scoped patch when
    /// `pr` is given, otherwise the merged curation from the repository.
    pub async fn get_curation(&self, coordinates: &EntityCoordinates, pr: Option<u64>) -> Result<Option<Curation>> {
        let curation_coords = CurationCoordinates::from(coordinates);
        if let Some(pr_number) = pr {
            if let Some(contribution) = self.contributions.get(&pr_number) {
                let key = curation_file_path(&curation_coords);
                if let Some(curation) = contribution.patches.get(&key) {
                    return Ok(Some(curation.clone()));
                }
            }
            let raw = self.repository.get_pr_file(&curation_coords, pr_number).await?;
            return raw.map(|text| parse_curation(&text)).transpose();
        }
        let raw = self.repository.get_merged(&curation_coords).await?;
        raw.map(|text| parse_curation(&text)).transpose()
    }

    /// Deep-merge a curation's patch for `coordinates.revision` over the
    /// aggregated definition. The curation wins on scalar conflicts;
    /// file-level curations match by `path` (same rule as the
    /// aggregator's merge, spec §4.7/§4.6).
    pub fn apply(&self, coordinates: &EntityCoordinates, curation: &Curation, definition: Definition) -> Definition {
        let Some(revision) = &coordinates.revision else {
            return definition;
        };
        let Some(patch) = curation.revisions.get(revision) else {
            return definition;
        };
        let mut result = definition;
        merge::deep_merge(&mut result.0, patch);
        result
    }

    /// Fetch and validate a pull request's curation files, updating the
    /// in-memory contribution index. Invoked on PR `opened`, `reopened`,
    /// and `synchronize`.
    pub async fn update_contribution(
        &self,
        pr_number: u64,
        head_sha: &str,
        files: Vec<(String, String)>,
    ) -> Result<()> {
        let mut contribution = Contribution::new(pr_number, head_sha);
        for (path, content) in files {
            let curation = parse_curation(&content)?;
            validate_curation(&curation)?;
            contribution.patches.insert(path, curation);
        }
        debug!(pr_number, files = contribution.patches.len(), "updated contribution");
        self.contributions.insert(pr_number, contribution);
        Ok(())
    }

    /// Move a merged pull request's files into the curation repository,
    /// enumerate every `(coordinates, revision)` pair it touches, and
    /// broadcast a change so the definition service can invalidate and
    /// recompute each one. Invoked on PR `closed` with `merged = true`.
    pub async fn add_by_merged_curation(&self, pr_number: u64) -> Result<Vec<EntityCoordinates>> {
        let Some((_, contribution)) = self.contributions.remove(&pr_number) else {
            warn!(pr_number, "merge event for a contribution we never tracked");
            return Ok(Vec::new());
        };

        let mut affected = Vec::new();
        for curation in contribution.patches.values() {
            let path = curation_file_path(&curation.coordinates);
            let yaml = serde_yaml::to_string(curation)
                .map_err(|e| CatalogError::Validation(format!("failed to serialize merged curation: {e}")))?;
            self.repository.put_merged(&curation.coordinates, &yaml).await?;
            let _ = path;
        }
        for (coordinates, _revision) in contribution.affected_revisions() {
            affected.push(coordinates.clone());
            let _ = self.changes.send(CurationChange { coordinates });
        }
        Ok(affected)
    }
}

fn curation_file_path(coordinates: &CurationCoordinates) -> String {
    match &coordinates.namespace {
        Some(ns) => format!(
            "curations/{}/{}/{}/{}.yaml",
            coordinates.component_type, coordinates.provider, ns, coordinates.name
        ),
        None => format!(
            "curations/{}/{}/{}.yaml",
            coordinates.component_type, coordinates.provider, coordinates.name
        ),
    }
}

fn parse_curation(yaml: &str) -> Result<Curation> {
    serde_yaml::from_str(yaml).map_err(|e| CatalogError::Validation(format!("invalid curation YAML: {e}")))
}

/// Schema validation for a proposed curation file: every revision key
/// must be non-empty and every patch a JSON object (curation files allow
/// arbitrary partial-definition fields, so there is nothing further to
/// check generically).
fn validate_curation(curation: &Curation) -> Result<()> {
    if curation.coordinates.component_type.is_empty() || curation.coordinates.name.is_empty() {
        return Err(CatalogError::Validation(
            "curation coordinates must include type and name".to_string(),
        ));
    }
    for revision in curation.revisions.keys() {
        if revision.trim().is_empty() {
            return Err(CatalogError::Validation("curation revision key must not be empty".to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct FakeRepository {
        merged: Mutex<std::collections::HashMap<String, String>>,
    }

    #[async_trait]
    impl CurationRepository for FakeRepository {
        async fn get_merged(&self, coordinates: &CurationCoordinates) -> Result<Option<String>> {
            Ok(self.merged.lock().await.get(&curation_file_path(coordinates)).cloned())
        }

        async fn get_pr_file(&self, _coordinates: &CurationCoordinates, _pr_number: u64) -> Result<Option<String>> {
            Ok(None)
        }

        async fn put_merged(&self, coordinates: &CurationCoordinates, yaml: &str) -> Result<()> {
            self.merged
                .lock()
                .await
                .insert(curation_file_path(coordinates), yaml.to_string());
            Ok(())
        }
    }

    fn npm_coords() -> EntityCoordinates {
        EntityCoordinates::parse("npm/npmjs/-/test/1.0.0").unwrap()
    }

    #[tokio::test]
    async fn apply_merges_curation_patch_for_revision() {
        let curator = Curator::new(Arc::new(FakeRepository::default()));
        let mut curation = Curation {
            coordinates: CurationCoordinates::from(&npm_coords()),
            revisions: Default::default(),
        };
        curation
            .revisions
            .insert("1.0.0".to_string(), json!({"licensed": {"declared": "MIT"}}).as_object().unwrap().clone());

        let def = Definition::from_value(json!({"licensed": {"declared": "GPL-2.0"}}));
        let result = curator.apply(&npm_coords(), &curation, def);
        assert_eq!(result.declared_license(), Some("MIT"));
    }

    #[tokio::test]
    async fn update_contribution_rejects_invalid_curation() {
        let curator = Curator::new(Arc::new(FakeRepository::default()));
        let bad_yaml = "coordinates: {}\nrevisions: {}\n".to_string();
        let result = curator
            .update_contribution(42, "deadbeef", vec![("curations/npm/npmjs/test.yaml".to_string(), bad_yaml)])
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn merge_broadcasts_affected_coordinates() {
        let curator = Curator::new(Arc::new(FakeRepository::default()));
        let mut rx = curator.subscribe();

        let yaml = format!(
            "coordinates:\n  type: npm\n  provider: npmjs\n  name: test\nrevisions:\n  1.0.0:\n    licensed:\n      declared: MIT\n"
        );
        curator
            .update_contribution(7, "abc123", vec![("curations/npm/npmjs/test.yaml".to_string(), yaml)])
            .await
            .unwrap();

        let affected = curator.add_by_merged_curation(7).await.unwrap();
        assert_eq!(affected.len(), 1);
        assert_eq!(affected[0].to_string_without_revision(), "npm/npmjs/-/test");

        let change = rx.try_recv().unwrap();
        assert_eq!(change.coordinates.revision.as_deref(), Some("1.0.0"));
    }
}
