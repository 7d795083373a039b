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

//! The data model shared by every stage of the pipeline.
//!
//! A [`Summary`] is tool-specific and opaque by design, so it is kept as a
//! JSON object rather than a fixed struct; the aggregator and curator deep
//! merge these generically. [`Definition`] is the same shape with a
//! handful of typed accessors for the fields the rest of the pipeline
//! needs to reason about (tool list, schema version, scores).

use crate::coordinates::EntityCoordinates;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A tool-normalized view of one component revision, as produced by one
/// tool at one version. Deliberately untyped beyond "a JSON object", so
/// tool-specific fields never need a schema change to this crate.
pub type Summary = Map<String, Value>;

/// `toolName -> toolVersion -> Summary`, as read back from the harvest
/// store for a single entity.
pub type SummarizedData = BTreeMap<String, BTreeMap<String, Summary>>;

/// The canonical merged, curated, scored artifact served to clients.
///
/// Wraps a JSON object so that curation patches (themselves partial
/// definitions) and tool summaries can be deep-merged generically, while
/// still exposing the handful of fields the rest of the system needs to
/// branch on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Definition(pub Map<String, Value>);

impl Definition {
    pub fn empty() -> Self {
        Self(Map::new())
    }

    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self(Map::new()),
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// A definition is empty iff `described.tools` is absent or has zero
    /// length. Empty definitions must never be persisted.
    pub fn is_empty(&self) -> bool {
        self.described_tools().is_empty()
    }

    pub fn coordinates(&self) -> Option<EntityCoordinates> {
        self.0
            .get("coordinates")
            .and_then(Value::as_str)
            .and_then(|s| EntityCoordinates::parse(s).ok())
    }

    pub fn set_coordinates(&mut self, coordinates: &EntityCoordinates) {
        self.0.insert(
            "coordinates".to_string(),
            Value::String(coordinates.to_string()),
        );
    }

    pub fn described_tools(&self) -> Vec<String> {
        self.0
            .get("described")
            .and_then(|d| d.get("tools"))
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn set_described_tools(&mut self, tools: Vec<String>) {
        let described = self
            .0
            .entry("described".to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(map) = described {
            map.insert(
                "tools".to_string(),
                Value::Array(tools.into_iter().map(Value::String).collect()),
            );
        }
    }

    pub fn schema_version(&self) -> Option<&str> {
        self.0.get("_meta").and_then(|m| m.get("schemaVersion")).and_then(Value::as_str)
    }

    pub fn set_schema_version(&mut self, version: &str) {
        let meta = self
            .0
            .entry("_meta".to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(map) = meta {
            map.insert("schemaVersion".to_string(), Value::String(version.to_string()));
        }
    }

    pub fn declared_license(&self) -> Option<&str> {
        self.0
            .get("licensed")
            .and_then(|l| l.get("declared"))
            .and_then(Value::as_str)
            .filter(|s| *s != "NOASSERTION")
    }

    pub fn files(&self) -> Vec<&Map<String, Value>> {
        self.0
            .get("files")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(Value::as_object).collect())
            .unwrap_or_default()
    }

    pub fn get(&self, pointer: &str) -> Option<&Value> {
        self.0.get(pointer)
    }
}

/// A community-authored patch for one or more revisions of a component.
/// Stored as one YAML file per `(type, provider, namespace, name)` under
/// `curations/...`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Curation {
    pub coordinates: CurationCoordinates,
    /// `revision -> partial definition patch`.
    #[serde(default)]
    pub revisions: BTreeMap<String, Map<String, Value>>,
}

/// The subset of `EntityCoordinates` that identifies a curation file —
/// revision is excluded because one file covers every revision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurationCoordinates {
    #[serde(rename = "type")]
    pub component_type: String,
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
}

impl From<&EntityCoordinates> for CurationCoordinates {
    fn from(c: &EntityCoordinates) -> Self {
        Self {
            component_type: c.component_type.clone(),
            provider: c.provider.clone(),
            namespace: c.namespace.clone(),
            name: c.name.clone(),
        }
    }
}

/// A pull request proposing curation changes, transient until merged into
/// the curation repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub pr_number: u64,
    pub head_sha: String,
    /// path (within the curations repo) -> parsed curation file contents.
    pub patches: BTreeMap<String, Curation>,
}

impl Contribution {
    pub fn new(pr_number: u64, head_sha: impl Into<String>) -> Self {
        Self {
            pr_number,
            head_sha: head_sha.into(),
            patches: BTreeMap::new(),
        }
    }

    /// Every `(coordinates, revision)` pair this contribution touches,
    /// used to drive invalidation on merge.
    pub fn affected_revisions(&self) -> Vec<(EntityCoordinates, String)> {
        self.patches
            .values()
            .flat_map(|curation| {
                curation.revisions.keys().map(move |revision| {
                    let c = &curation.coordinates;
                    (
                        EntityCoordinates::new(
                            c.component_type.clone(),
                            c.provider.clone(),
                            c.namespace.clone(),
                            c.name.clone(),
                            Some(revision.clone()),
                        ),
                        revision.clone(),
                    )
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_definition_has_no_tools() {
        assert!(Definition::empty().is_empty());
    }

    #[test]
    fn non_empty_once_tools_present() {
        let mut d = Definition::empty();
        d.set_described_tools(vec!["scancode/3.2.2".to_string()]);
        assert!(!d.is_empty());
        assert_eq!(d.described_tools(), vec!["scancode/3.2.2".to_string()]);
    }

    #[test]
    fn declared_license_treats_noassertion_as_absent() {
        let d = Definition::from_value(json!({"licensed": {"declared": "NOASSERTION"}}));
        assert_eq!(d.declared_license(), None);
        let d = Definition::from_value(json!({"licensed": {"declared": "MIT"}}));
        assert_eq!(d.declared_license(), Some("MIT"));
    }
}
