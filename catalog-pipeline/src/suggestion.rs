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

//! Suggestion engine (spec §4.13, C14): for a component missing a
//! declared license, proposes values seen on neighboring revisions of
//! the same component.

use catalog_core::{EntityCoordinates, Result};
use catalog_storage::DefinitionStore;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LicenseSuggestion {
    pub value: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Suggestions {
    pub coordinates: String,
    #[serde(rename = "licensed.declared")]
    pub licensed_declared: Vec<LicenseSuggestion>,
}

pub struct SuggestionEngine {
    store: Arc<dyn DefinitionStore>,
    schema_version: String,
}

impl SuggestionEngine {
    pub fn new(store: Arc<dyn DefinitionStore>, schema_version: String) -> Self {
        Self { store, schema_version }
    }

    /// Returns `None` when the definition already has a declared license
    /// or no peer revision offers one.
    pub async fn suggest(&self, coordinates: &EntityCoordinates, current_declared: Option<&str>) -> Result<Option<Suggestions>> {
        if current_declared.is_some() {
            return Ok(None);
        }

        let peers = self.store.list(coordinates).await?;
        let mut candidates: Vec<(Option<String>, LicenseSuggestion)> = Vec::new();

        for peer in peers {
            let Ok(peer_coords) = EntityCoordinates::parse(&peer) else { continue };
            if peer_coords.revision == coordinates.revision {
                continue;
            }
            let Some(def) = self.store.get(&peer_coords, &self.schema_version).await? else { continue };
            let Some(declared) = def.declared_license() else { continue };
            let release_date = def
                .get("described")
                .and_then(|d| d.get("releaseDate"))
                .and_then(serde_json::Value::as_str)
                .map(str::to_string);
            candidates.push((
                release_date,
                LicenseSuggestion {
                    value: declared.to_string(),
                    version: peer_coords.revision.clone().unwrap_or_default(),
                },
            ));
        }

        if candidates.is_empty() {
            return Ok(None);
        }

        candidates.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(Some(Suggestions {
            coordinates: coordinates.to_string(),
            licensed_declared: candidates.into_iter().map(|(_, s)| s).collect(),
        }))
    }
}
