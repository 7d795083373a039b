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

//! The deep-merge rules shared by the aggregator and the curator:
//! mappings union key-wise with the right side winning on scalar
//! conflict; file-record arrays union by `path`, with `attributions`,
//! `licenseExpressions`, and `facets` unioned additively rather than
//! overwritten.

use serde_json::{Map, Value};

const ADDITIVE_FILE_FIELDS: [&str; 3] = ["attributions", "licenseExpressions", "facets"];

/// Merge `patch` on top of `base` in place. The right side (`patch`)
/// wins on any scalar conflict.
pub fn deep_merge(base: &mut Map<String, Value>, patch: &Map<String, Value>) {
    for (key, patch_value) in patch {
        if key == "files" {
            let base_files = base.entry("files".to_string()).or_insert_with(|| Value::Array(Vec::new()));
            if let (Value::Array(base_arr), Value::Array(patch_arr)) = (base_files, patch_value) {
                *base_arr = merge_files(base_arr, patch_arr);
            }
            continue;
        }
        match (base.get_mut(key), patch_value) {
            (Some(Value::Object(base_map)), Value::Object(patch_map)) => {
                deep_merge(base_map, patch_map);
            }
            _ => {
                base.insert(key.clone(), patch_value.clone());
            }
        }
    }
}

/// Union two file-record arrays by `path`. Order follows `base`'s
/// existing paths first, then any new paths `patch` introduces.
pub fn merge_files(base: &[Value], patch: &[Value]) -> Vec<Value> {
    let mut by_path: Vec<(String, Map<String, Value>)> = Vec::new();
    let mut index_of: std::collections::HashMap<String, usize> = std::collections::HashMap::new();

    for record in base.iter().filter_map(Value::as_object) {
        if let Some(path) = record.get("path").and_then(Value::as_str) {
            index_of.insert(path.to_string(), by_path.len());
            by_path.push((path.to_string(), record.clone()));
        }
    }
    for record in patch.iter().filter_map(Value::as_object) {
        let Some(path) = record.get("path").and_then(Value::as_str) else { continue };
        match index_of.get(path) {
            Some(&idx) => merge_file_record(&mut by_path[idx].1, record),
            None => {
                index_of.insert(path.to_string(), by_path.len());
                by_path.push((path.to_string(), record.clone()));
            }
        }
    }
    by_path.into_iter().map(|(_, record)| Value::Object(record)).collect()
}

fn merge_file_record(base: &mut Map<String, Value>, patch: &Map<String, Value>) {
    for (key, patch_value) in patch {
        if ADDITIVE_FILE_FIELDS.contains(&key.as_str()) {
            let existing = base.entry(key.clone()).or_insert_with(|| Value::Array(Vec::new()));
            if let (Value::Array(existing_arr), Value::Array(patch_arr)) = (existing, patch_value) {
                for item in patch_arr {
                    if !existing_arr.contains(item) {
                        existing_arr.push(item.clone());
                    }
                }
            }
            continue;
        }
        match (base.get_mut(key), patch_value) {
            (Some(Value::Object(base_map)), Value::Object(patch_map)) => deep_merge(base_map, patch_map),
            _ => {
                base.insert(key.clone(), patch_value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn right_wins_on_scalar_conflict() {
        let mut base = json!({"licensed": {"declared": "MIT"}}).as_object().unwrap().clone();
        let patch = json!({"licensed": {"declared": "GPL-2.0"}}).as_object().unwrap().clone();
        deep_merge(&mut base, &patch);
        assert_eq!(base["licensed"]["declared"], "GPL-2.0");
    }

    #[test]
    fn file_records_union_by_path_with_additive_attributions() {
        let mut base = json!({
            "files": [{"path": "foo.txt", "license": "MIT", "attributions": ["Alice"]}]
        })
        .as_object()
        .unwrap()
        .clone();
        let patch = json!({
            "files": [{"path": "foo.txt", "license": "BSD", "attributions": ["Bob"]}]
        })
        .as_object()
        .unwrap()
        .clone();
        deep_merge(&mut base, &patch);
        let files = base["files"].as_array().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0]["license"], "BSD");
        assert_eq!(files[0]["attributions"], json!(["Alice", "Bob"]));
    }
}
