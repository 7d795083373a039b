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

//! `/definitions` (spec §6.1): single lookup by query string, and
//! list-all by posted batch of coordinates.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::Json;
use catalog_core::EntityCoordinates;
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Deserialize)]
pub struct GetDefinitionQuery {
    pub coordinates: String,
    pub pr: Option<u64>,
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub expand: bool,
}

pub async fn get_definition(
    State(state): State<AppState>,
    Query(query): Query<GetDefinitionQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let coordinates = EntityCoordinates::parse(&query.coordinates).map_err(|e| ApiError::Validation(e.to_string()))?;
    let definition = state.definitions.get(&coordinates, query.pr, query.force).await?;
    let mut value = definition.into_value();
    if query.expand {
        expand_file_tokens(&mut value);
    }
    Ok(Json(value))
}

/// `expand=true` substitutes a content-lookup token for each file record
/// rather than inlining file bodies (spec §6.1: "includes file-content
/// tokens"); fetching the content itself is a storage-layer concern out
/// of scope here (spec §1).
fn expand_file_tokens(value: &mut serde_json::Value) {
    let Some(files) = value.get_mut("files").and_then(|f| f.as_array_mut()) else {
        return;
    };
    for file in files {
        let path = file.get("path").and_then(|p| p.as_str()).map(str::to_string);
        if let (Some(path), Some(obj)) = (path, file.as_object_mut()) {
            obj.insert("token".to_string(), serde_json::Value::String(format!("content:{path}")));
        }
    }
}

pub async fn list_definitions(
    State(state): State<AppState>,
    Json(coordinates): Json<Vec<String>>,
) -> Result<Json<BTreeMap<String, serde_json::Value>>, ApiError> {
    let mut parsed = Vec::with_capacity(coordinates.len());
    for raw in &coordinates {
        parsed.push(EntityCoordinates::parse(raw).map_err(|e| ApiError::Validation(e.to_string()))?);
    }

    let resolved = state.definitions.list_all(&parsed).await?;
    let mut out = BTreeMap::new();
    for c in resolved {
        if let Some(definition) = state.definitions.get_stored(&c).await? {
            out.insert(c.to_string(), definition.into_value());
        }
    }
    Ok(Json(out))
}
