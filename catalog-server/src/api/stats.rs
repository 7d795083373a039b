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

//! Routes for C15 (stats, §4.14) and C14 (license suggestions, §4.13).
//! Not named in spec §6.1's table but both components exist solely to be
//! served over HTTP, so they get the thinnest possible route glue here
//! rather than sitting unreachable.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::Json;
use catalog_core::EntityCoordinates;
use serde::Deserialize;

pub async fn get_stats(State(state): State<AppState>, Path(stat_key): Path<String>) -> Result<Json<serde_json::Value>, ApiError> {
    match state.stats.get(&stat_key).await? {
        Some(result) => Ok(Json(serde_json::to_value(result).expect("StatsResult always serializes"))),
        None => Err(ApiError::NotFound),
    }
}

#[derive(Deserialize)]
pub struct SuggestQuery {
    pub coordinates: String,
}

pub async fn get_suggestions(State(state): State<AppState>, Query(query): Query<SuggestQuery>) -> Result<Json<serde_json::Value>, ApiError> {
    let coordinates = EntityCoordinates::parse(&query.coordinates).map_err(|e| ApiError::Validation(e.to_string()))?;
    let current_stored = state.definitions.get_stored(&coordinates).await?;
    let current_declared = current_stored.as_ref().and_then(|d| d.declared_license());
    match state.suggestions.suggest(&coordinates, current_declared).await? {
        Some(suggestions) => Ok(Json(serde_json::to_value(suggestions).expect("Suggestions always serializes"))),
        None => Err(ApiError::NotFound),
    }
}
