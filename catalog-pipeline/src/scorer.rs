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

//! Scorer: derives described/licensed scores from a merged definition.
//! Pure and deterministic over the definition's fields — no I/O.

use catalog_core::Definition;
use serde_json::{json, Map, Value};

const CORE_FACET: &str = "core";

/// A 0-100 score broken into its named components.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreBreakdown {
    pub total: u32,
    pub components: Vec<(&'static str, u32)>,
}

impl ScoreBreakdown {
    fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert("total".to_string(), json!(self.total));
        for (name, value) in &self.components {
            map.insert((*name).to_string(), json!(value));
        }
        Value::Object(map)
    }
}

/// Described score: release date (30), source location (30),
/// projectWebsite (15), issueTracker (15), tools count >= 2 (10).
pub fn described_score(definition: &Definition) -> ScoreBreakdown {
    let described = definition.get("described");
    let mut breakdown = ScoreBreakdown::default();

    let has = |field: &str| is_present(described.and_then(|d| d.get(field)));

    add(&mut breakdown, "date", 30, has("releaseDate"));
    add(&mut breakdown, "source", 30, has("sourceLocation"));
    add(&mut breakdown, "projectWebsite", 15, has("projectWebsite"));
    add(&mut breakdown, "issueTracker", 15, has("issueTracker"));

    let tool_count = definition.described_tools().len();
    add(&mut breakdown, "tools", 10, tool_count >= 2);

    breakdown
}

/// Licensed score: declared license present and valid (30), discovered
/// consistency with declared (15), license texts found for the declared
/// license (15), attribution presence apportioned by core-facet file
/// fraction (25), spdx-valid declared (15).
pub fn licensed_score(definition: &Definition) -> ScoreBreakdown {
    let mut breakdown = ScoreBreakdown::default();
    let declared = definition.declared_license();

    add(&mut breakdown, "declared", 30, declared.is_some());

    let core_files: Vec<&Map<String, Value>> = definition
        .files()
        .into_iter()
        .filter(|f| file_in_core_facet(f))
        .collect();

    let discovered = discovered_licenses(&core_files);
    let consistent = match declared {
        Some(d) => discovered.is_empty() || discovered.iter().any(|l| l == d),
        None => false,
    };
    add(&mut breakdown, "discovered", 15, consistent);

    let texts_found = match declared {
        Some(d) => core_files.iter().any(|f| is_license_text_for(f, d)),
        None => false,
    };
    add(&mut breakdown, "texts", 15, texts_found);

    let attribution_fraction = if core_files.is_empty() {
        0.0
    } else {
        let with_both = core_files
            .iter()
            .filter(|f| has_license(f) && has_attribution(f))
            .count();
        with_both as f64 / core_files.len() as f64
    };
    let attribution_points = (attribution_fraction * 25.0).round() as u32;
    breakdown.components.push(("attributions", attribution_points));
    breakdown.total += attribution_points;

    add(&mut breakdown, "spdx", 15, declared.map(is_plausible_spdx_expression).unwrap_or(false));

    breakdown
}

/// A field "is present" when it exists, isn't null, and — for strings,
/// objects, and arrays — isn't empty. `described.sourceLocation` is an
/// object; `described.releaseDate` is a string; both count the same way.
fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Object(m)) => !m.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(_) => true,
    }
}

fn add(breakdown: &mut ScoreBreakdown, name: &'static str, points: u32, earned: bool) {
    let value = if earned { points } else { 0 };
    breakdown.components.push((name, value));
    breakdown.total += value;
}

fn file_in_core_facet(file: &Map<String, Value>) -> bool {
    match file.get("facets").and_then(Value::as_array) {
        None => true, // unfaceted files default to core.
        Some(facets) => facets.iter().filter_map(Value::as_str).any(|f| f == CORE_FACET),
    }
}

fn has_license(file: &Map<String, Value>) -> bool {
    file.get("license").and_then(Value::as_str).map(|s| !s.is_empty()).unwrap_or(false)
}

fn has_attribution(file: &Map<String, Value>) -> bool {
    file.get("attributions").and_then(Value::as_array).map(|a| !a.is_empty()).unwrap_or(false)
}

fn discovered_licenses(core_files: &[&Map<String, Value>]) -> Vec<String> {
    let mut out: Vec<String> = core_files
        .iter()
        .filter_map(|f| f.get("license").and_then(Value::as_str))
        .map(str::to_string)
        .collect();
    out.sort();
    out.dedup();
    out
}

fn is_license_text_for(file: &Map<String, Value>, declared: &str) -> bool {
    let is_license_nature = file
        .get("natures")
        .and_then(Value::as_array)
        .map(|n| n.iter().filter_map(Value::as_str).any(|s| s == "license"))
        .unwrap_or(false);
    let token_matches = file.get("token").and_then(Value::as_str).map(|t| t == declared).unwrap_or(false);
    is_license_nature && token_matches
}

/// A light syntactic check, not a full SPDX expression parser: rejects
/// empty strings and "NOASSERTION"/"UNKNOWN", and requires only
/// characters legal in an SPDX license expression.
fn is_plausible_spdx_expression(expr: &str) -> bool {
    if expr.is_empty() || expr.eq_ignore_ascii_case("NOASSERTION") || expr.eq_ignore_ascii_case("UNKNOWN") {
        return false;
    }
    expr.chars().all(|c| c.is_ascii_alphanumeric() || "+.-() ".contains(c))
}

/// Score both the curated definition and the pre-curation ("tool") view
/// of it, writing `described.score`/`described.toolScore` and
/// `licensed.score`/`licensed.toolScore` onto `definition`. A higher
/// total-vs-tool gap reflects curation value.
pub fn apply_scores(definition: &mut Definition, tool_definition: &Definition) {
    set_score(definition, "described", described_score(definition), described_score(tool_definition));
    set_score(definition, "licensed", licensed_score(definition), licensed_score(tool_definition));
}

fn set_score(definition: &mut Definition, section: &str, score: ScoreBreakdown, tool_score: ScoreBreakdown) {
    let entry = definition.0.entry(section.to_string()).or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(map) = entry {
        map.insert("score".to_string(), score.to_json());
        map.insert("toolScore".to_string(), tool_score.to_json());
    }
}
