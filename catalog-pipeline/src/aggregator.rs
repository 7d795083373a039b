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

//! Aggregator: merges per-tool summaries into a single definition,
//! honoring tool precedence.

use crate::merge;
use catalog_core::{Definition, EntityCoordinates, Precedence, Summary, SummarizedData, ToolSpec};
use serde_json::Value;
use tracing::warn;

/// Run the aggregation algorithm. Returns `None` when no tool in the
/// precedence list contributed data.
pub fn aggregate(data: &SummarizedData, precedence: &Precedence, coordinates: &EntityCoordinates) -> Option<Definition> {
    let working_list = precedence.flatten_lowest_first();
    let mut result = Definition::empty();
    let mut contributing_tools = Vec::new();

    for spec in &working_list {
        if let Some((version, summary)) = resolve_candidate(data, spec) {
            merge::deep_merge(&mut result.0, summary);
            contributing_tools.push(format!("{}/{}", spec.name(), version));
        }
    }

    if contributing_tools.is_empty() {
        return None;
    }

    result.set_described_tools(contributing_tools);
    apply_post_rules(&mut result, data, coordinates);
    Some(result)
}

/// Resolve a `toolSpec` to the candidate summary it selects: an exact
/// version when pinned, otherwise the highest semantic version present.
/// Elements with no data are skipped by returning `None`.
fn resolve_candidate<'a>(data: &'a SummarizedData, spec: &ToolSpec) -> Option<(String, &'a Summary)> {
    let versions = data.get(spec.name())?;
    match spec.version() {
        Some(pinned) => versions.get(pinned).map(|s| (pinned.to_string(), s)),
        None => {
            let best = versions.keys().max_by(|a, b| compare_versions(a, b))?;
            versions.get(best).map(|s| (best.clone(), s))
        }
    }
}

fn compare_versions(a: &str, b: &str) -> std::cmp::Ordering {
    match (semver::Version::parse(a), semver::Version::parse(b)) {
        (Ok(va), Ok(vb)) => va.cmp(&vb),
        _ => a.cmp(b),
    }
}

/// The crate-declared-license override and file-list normalization
/// against "clearlydefined"'s file list.
fn apply_post_rules(result: &mut Definition, data: &SummarizedData, coordinates: &EntityCoordinates) {
    override_crate_declared_license(result, data, coordinates);
    normalize_files_against_clearlydefined(result, data);
}

/// For a `crate` component, "clearlydefined"'s declared license (when not
/// `NOASSERTION`) overrides any aggregated declared license.
fn override_crate_declared_license(result: &mut Definition, data: &SummarizedData, coordinates: &EntityCoordinates) {
    if !coordinates.component_type.eq_ignore_ascii_case("crate") {
        return;
    }
    let Some((_, summary)) = resolve_candidate(data, &ToolSpec::Name("clearlydefined".to_string())) else {
        return;
    };
    let Some(declared) = summary.get("licensed").and_then(|l| l.get("declared")).and_then(Value::as_str) else {
        return;
    };
    if declared == "NOASSERTION" {
        return;
    }
    let licensed = result.0.entry("licensed".to_string()).or_insert_with(|| Value::Object(Default::default()));
    if let Value::Object(map) = licensed {
        map.insert("declared".to_string(), Value::String(declared.to_string()));
    }
}

/// When "clearlydefined" contributed files, the final file list is
/// intersected by path with that tool's file list; extraneous files from
/// other tools are dropped. Count mismatches are logged, never failed.
fn normalize_files_against_clearlydefined(result: &mut Definition, data: &SummarizedData) {
    let Some((_, summary)) = resolve_candidate(data, &ToolSpec::Name("clearlydefined".to_string())) else {
        return;
    };
    let Some(cd_files) = summary.get("files").and_then(Value::as_array) else {
        return;
    };
    let cd_paths: std::collections::HashSet<&str> =
        cd_files.iter().filter_map(|f| f.get("path")).filter_map(Value::as_str).collect();

    let Some(Value::Array(result_files)) = result.0.get_mut("files") else {
        return;
    };
    let before = result_files.len();
    result_files.retain(|f| f.get("path").and_then(Value::as_str).map(|p| cd_paths.contains(p)).unwrap_or(false));
    if before != result_files.len() {
        warn!(
            before,
            after = result_files.len(),
            "file count mismatch after intersecting against clearlydefined's file list"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_core::ToolSpec;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn summarized(entries: Vec<(&str, &str, Value)>) -> SummarizedData {
        let mut data = SummarizedData::new();
        for (tool, version, summary) in entries {
            data.entry(tool.to_string())
                .or_insert_with(BTreeMap::new)
                .insert(version.to_string(), summary.as_object().unwrap().clone());
        }
        data
    }

    #[test]
    fn highest_priority_tool_wins_scalar_conflict() {
        let data = summarized(vec![
            ("tool2", "1.0.0", json!({"files": [{"path": "foo.txt", "license": "MIT"}]})),
            ("tool2", "2.0.0", json!({"files": [{"path": "foo.txt", "license": "GPL-2.0"}]})),
            ("tool1", "3.0.0", json!({"files": [{"path": "foo.txt", "license": "BSD"}]})),
        ]);
        let precedence = Precedence::new(vec![vec![
            ToolSpec::parse("tool1"),
            ToolSpec::parse("tool2"),
            ToolSpec::parse("tool3"),
        ]]);
        let coordinates = EntityCoordinates::parse("npm/npmjs/-/test/1.0.0").unwrap();

        let result = aggregate(&data, &precedence, &coordinates).unwrap();
        let files = result.files();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0]["path"], "foo.txt");
        assert_eq!(files[0]["license"], "BSD");
        assert_eq!(result.described_tools(), vec!["tool2/2.0.0".to_string(), "tool1/3.0.0".to_string()]);
    }

    #[test]
    fn crate_override_ignores_noassertion() {
        let data = summarized(vec![
            ("tool1", "1.0.0", json!({"licensed": {"declared": "GPL-2.0"}})),
            ("clearlydefined", "1.0.0", json!({"licensed": {"declared": "NOASSERTION"}})),
        ]);
        let precedence = Precedence::new(vec![vec![ToolSpec::parse("tool1"), ToolSpec::parse("clearlydefined")]]);
        let coordinates = EntityCoordinates::parse("crate/cratesio/-/test/1.0.0").unwrap();
        let result = aggregate(&data, &precedence, &coordinates).unwrap();
        assert_eq!(result.declared_license(), Some("GPL-2.0"));
    }

    #[test]
    fn crate_override_applies_when_clearlydefined_asserts() {
        let data = summarized(vec![
            ("tool1", "1.0.0", json!({"licensed": {"declared": "GPL-2.0"}})),
            ("clearlydefined", "1.0.0", json!({"licensed": {"declared": "MIT"}})),
        ]);
        let precedence = Precedence::new(vec![vec![ToolSpec::parse("tool1"), ToolSpec::parse("clearlydefined")]]);
        let coordinates = EntityCoordinates::parse("crate/cratesio/-/test/1.0.0").unwrap();
        let result = aggregate(&data, &precedence, &coordinates).unwrap();
        assert_eq!(result.declared_license(), Some("MIT"));
    }

    #[test]
    fn no_contributing_tool_returns_none() {
        let data = SummarizedData::new();
        let precedence = Precedence::new(vec![vec![ToolSpec::parse("tool1")]]);
        let coordinates = EntityCoordinates::parse("npm/npmjs/-/test/1.0.0").unwrap();
        assert!(aggregate(&data, &precedence, &coordinates).is_none());
    }
}
