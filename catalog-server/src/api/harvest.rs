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

//! `/harvest` (spec §6.1): read one tool's summarized output, or request
//! new harvests for a batch of `(tool, coordinates)` pairs.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use catalog_core::ResultCoordinates;
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
pub struct GetHarvestQuery {
    pub coordinates: String,
}

pub async fn get_harvest(
    State(state): State<AppState>,
    Query(query): Query<GetHarvestQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let coordinates =
        ResultCoordinates::parse(&query.coordinates).map_err(|e| ApiError::Validation(e.to_string()))?;
    let raw = state
        .harvest_store
        .get(&coordinates)
        .await?
        .ok_or(ApiError::NotFound)?;
    let summary = state
        .summarizer
        .summarize(&coordinates.tool, &coordinates.tool_version, &raw)
        .await?;
    Ok(Json(serde_json::Value::Object(summary)))
}

/// One entry of a harvest request batch. Deserialized from a
/// `serde_json::Value` rather than directly, so a malformed entry maps to
/// [`ApiError::Validation`] (400) instead of axum's rejection (422), which
/// spec §6.1 reserves for "the throttler rejects every entry".
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct HarvestRequestItem {
    tool: String,
    coordinates: String,
    #[serde(default)]
    policy: Option<String>,
}

#[derive(Serialize)]
struct HarvestRequestOutcome {
    tool: String,
    coordinates: String,
    accepted: bool,
}

pub async fn request_harvest(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<(StatusCode, Json<Vec<HarvestRequestOutcome>>), ApiError> {
    let entries: Vec<serde_json::Value> = match body {
        serde_json::Value::Array(entries) => entries,
        other => vec![other],
    };
    if entries.is_empty() {
        return Err(ApiError::Validation("harvest request batch must not be empty".to_string()));
    }

    let mut items = Vec::with_capacity(entries.len());
    for entry in entries {
        let item: HarvestRequestItem = serde_json::from_value(entry)
            .map_err(|e| ApiError::Validation(format!("invalid harvest request entry: {e}")))?;
        items.push(item);
    }

    let mut outcomes = Vec::with_capacity(items.len());
    let mut any_accepted = false;
    for item in items {
        let coordinates = catalog_core::EntityCoordinates::parse(&item.coordinates)
            .map_err(|e| ApiError::Validation(e.to_string()))?;
        let _ = item.policy;

        let accepted = state.harvest_throttle.try_acquire(&item.tool);
        if accepted {
            state.crawler.request_harvest(&item.tool, &coordinates).await?;
            any_accepted = true;
        }
        outcomes.push(HarvestRequestOutcome {
            tool: item.tool,
            coordinates: item.coordinates,
            accepted,
        });
    }

    if !any_accepted {
        return Err(ApiError::Throttled("harvest request throttled: try again later".to_string()));
    }
    Ok((StatusCode::CREATED, Json(outcomes)))
}
