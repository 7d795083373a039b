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

//! Schema-version checking (spec §4.11, C12), shared between the
//! definition service's read path (which detects a stale stored
//! definition and enqueues an upgrade) and the upgrade queue consumer
//! (which re-validates before recomputing).

use catalog_core::{Definition, EntityCoordinates, Result};
use catalog_queue::Queue;
use serde_json::json;

/// Compares a stored definition's `_meta.schemaVersion` against the
/// runtime's current schema version. Neither field is assumed to be
/// valid semver; falls back to lexicographic comparison exactly as the
/// rest of the pipeline does for tool versions.
pub struct VersionChecker {
    current_schema: String,
}

impl VersionChecker {
    pub fn new(current_schema: String) -> Self {
        Self { current_schema }
    }

    /// `Some(definition)` when up to date, `None` when stale or the
    /// schema version is missing.
    pub fn validate<'a>(&self, definition: &'a Definition) -> Option<&'a Definition> {
        let stored = definition.schema_version()?;
        if compare(stored, &self.current_schema).is_ge() {
            Some(definition)
        } else {
            None
        }
    }

    pub fn is_stale(&self, definition: &Definition) -> bool {
        self.validate(definition).is_none()
    }
}

fn compare(a: &str, b: &str) -> std::cmp::Ordering {
    match (semver::Version::parse(a), semver::Version::parse(b)) {
        (Ok(va), Ok(vb)) => va.cmp(&vb),
        _ => a.cmp(b),
    }
}

/// Enqueue a `{coordinates, _meta}` upgrade notification onto `queue`,
/// for the read path to call when it observes a stale stored
/// definition. At-least-once: duplicate enqueues are harmless since the
/// consumer re-validates before recomputing.
pub async fn enqueue_upgrade(queue: &dyn Queue, coordinates: &EntityCoordinates, definition: &Definition) -> Result<()> {
    let payload = json!({
        "coordinates": coordinates.to_string(),
        "_meta": definition.get("_meta").cloned().unwrap_or(serde_json::Value::Null),
    });
    queue.enqueue(&payload.to_string()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_up_to_date_or_stale() {
        let checker = VersionChecker::new("2.0.0".to_string());
        let mut fresh = Definition::empty();
        fresh.set_schema_version("2.0.0");
        assert!(checker.validate(&fresh).is_some());

        let mut newer = Definition::empty();
        newer.set_schema_version("2.1.0");
        assert!(checker.validate(&newer).is_some());

        let mut stale = Definition::empty();
        stale.set_schema_version("1.0.0");
        assert!(checker.validate(&stale).is_none());

        assert!(checker.validate(&Definition::empty()).is_none());
    }
}
