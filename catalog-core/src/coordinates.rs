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

//! Entity and result coordinates.
//!
//! `EntityCoordinates` identifies a component at a revision; `ResultCoordinates`
//! extends that with the tool (and tool version) that produced a scan result.
//! Both round-trip through a canonical forward-slash string form and a `urn:`
//! form used on the wire by the crawler.

use crate::error::{CatalogError, Result};
use std::fmt;

const NAMESPACE_SENTINEL: &str = "-";

/// Identifies a software component at a specific revision.
///
/// Equality and hashing are case-insensitive on every part except `name`,
/// whose case is preserved on output and only folded when a caller
/// explicitly asks for a lookup comparison (see [`EntityCoordinates::name_key`]).
#[derive(Debug, Clone, Eq)]
pub struct EntityCoordinates {
    pub component_type: String,
    pub provider: String,
    pub namespace: Option<String>,
    pub name: String,
    pub revision: Option<String>,
}

impl EntityCoordinates {
    pub fn new(
        component_type: impl Into<String>,
        provider: impl Into<String>,
        namespace: Option<String>,
        name: impl Into<String>,
        revision: Option<String>,
    ) -> Self {
        Self {
            component_type: component_type.into().to_ascii_lowercase(),
            provider: provider.into().to_ascii_lowercase(),
            namespace: namespace.filter(|n| n != NAMESPACE_SENTINEL),
            name: name.into(),
            revision,
        }
    }

    /// Parse the canonical forward-slash form, with or without a revision:
    /// `type/provider/namespace/name` or `type/provider/namespace/name/revision`.
    /// `namespace` is `-` when absent.
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('/').collect();
        if parts.len() != 4 && parts.len() != 5 {
            return Err(CatalogError::Parse(format!(
                "expected 4 or 5 '/'-separated segments, got {}: {s}",
                parts.len()
            )));
        }
        let namespace = if parts[2] == NAMESPACE_SENTINEL {
            None
        } else {
            Some(parts[2].to_string())
        };
        let revision = parts.get(4).map(|r| r.to_string());
        Ok(Self::new(parts[0], parts[1], namespace, parts[3], revision))
    }

    /// Canonical string form without the revision.
    pub fn to_string_without_revision(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.component_type,
            self.provider,
            self.namespace.as_deref().unwrap_or(NAMESPACE_SENTINEL),
            self.name
        )
    }

    /// Lower-cased name, for case-folded lookup comparisons when listing.
    pub fn name_key(&self) -> String {
        self.name.to_ascii_lowercase()
    }

    /// Deterministic `int32` hash of `type|name|revision`, used to derive CDN
    /// invalidation tags.
    pub fn tag_hash(&self) -> i32 {
        use std::hash::Hasher;
        let key = format!(
            "{}|{}|{}",
            self.component_type,
            self.name,
            self.revision.as_deref().unwrap_or("")
        );
        let mut hasher = twox_hash::XxHash64::default();
        hasher.write(key.as_bytes());
        (hasher.finish() & 0xFFFF_FFFF) as u32 as i32
    }

    /// Parse a `urn:` form, returning the entity coordinates and, if present,
    /// the trailing `(tool, toolVersion)` pair. Fails when fewer than five
    /// segments follow the `urn` scheme prefix.
    pub fn parse_urn_parts(urn: &str) -> Result<(Self, Option<(String, String)>)> {
        let segments: Vec<&str> = urn.split(':').collect();
        if segments.first() != Some(&"urn") {
            return Err(CatalogError::Parse(format!("not a urn: {urn}")));
        }
        if segments.len() < 6 {
            return Err(CatalogError::Parse(format!(
                "urn has fewer than five segments after the scheme prefix: {urn}"
            )));
        }
        let component_type = segments[1];
        let provider = segments[2];
        let namespace = if segments[3] == NAMESPACE_SENTINEL {
            None
        } else {
            Some(segments[3].to_string())
        };
        let name = segments[4];
        // segments[5] is the literal "revision" keyword.
        let revision = segments.get(6).map(|r| r.to_string());
        let entity = Self::new(component_type, provider, namespace, name, revision);

        let tool = if segments.len() >= 9 && segments.get(7) == Some(&"tool") {
            Some((segments[8].to_string(), segments.get(9).unwrap_or(&"").to_string()))
        } else {
            None
        };
        Ok((entity, tool))
    }

    pub fn from_urn(urn: &str) -> Result<Self> {
        Self::parse_urn_parts(urn).map(|(entity, _)| entity)
    }
}

impl fmt::Display for EntityCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_without_revision())?;
        if let Some(rev) = &self.revision {
            write!(f, "/{rev}")?;
        }
        Ok(())
    }
}

impl PartialEq for EntityCoordinates {
    fn eq(&self, other: &Self) -> bool {
        self.component_type.eq_ignore_ascii_case(&other.component_type)
            && self.provider.eq_ignore_ascii_case(&other.provider)
            && namespace_eq(&self.namespace, &other.namespace)
            && self.name == other.name
            && option_str_eq_ignore_case(&self.revision, &other.revision)
    }
}

impl std::hash::Hash for EntityCoordinates {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.component_type.to_ascii_lowercase().hash(state);
        self.provider.to_ascii_lowercase().hash(state);
        self.namespace.as_ref().map(|n| n.to_ascii_lowercase()).hash(state);
        self.name.hash(state);
        self.revision.as_ref().map(|r| r.to_ascii_lowercase()).hash(state);
    }
}

fn namespace_eq(a: &Option<String>, b: &Option<String>) -> bool {
    option_str_eq_ignore_case(a, b)
}

fn option_str_eq_ignore_case(a: &Option<String>, b: &Option<String>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => false,
    }
}

/// `EntityCoordinates` extended with the tool and tool version that
/// produced a harvested scan result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResultCoordinates {
    pub entity: EntityCoordinates,
    pub tool: String,
    pub tool_version: String,
}

impl ResultCoordinates {
    pub fn new(entity: EntityCoordinates, tool: impl Into<String>, tool_version: impl Into<String>) -> Self {
        Self {
            entity,
            tool: tool.into(),
            tool_version: tool_version.into(),
        }
    }

    /// Parse the canonical forward-slash form
    /// `type/provider/namespace/name/revision/tool/toolVersion`.
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('/').collect();
        if parts.len() != 7 {
            return Err(CatalogError::Parse(format!(
                "expected 7 '/'-separated segments for a result coordinate, got {}: {s}",
                parts.len()
            )));
        }
        let entity = EntityCoordinates::parse(&parts[..5].join("/"))?;
        Ok(Self::new(entity, parts[5], parts[6]))
    }

    pub fn to_urn(&self) -> String {
        format!(
            "urn:{}:{}:{}:{}:revision:{}:tool:{}:{}",
            self.entity.component_type,
            self.entity.provider,
            self.entity.namespace.as_deref().unwrap_or(NAMESPACE_SENTINEL),
            self.entity.name,
            self.entity.revision.as_deref().unwrap_or(""),
            self.tool,
            self.tool_version
        )
    }

    pub fn from_urn(urn: &str) -> Result<Self> {
        let (entity, tool) = EntityCoordinates::parse_urn_parts(urn)?;
        let (tool, tool_version) = tool
            .ok_or_else(|| CatalogError::Parse(format!("urn is missing a tool segment: {urn}")))?;
        Ok(Self::new(entity, tool, tool_version))
    }
}

impl fmt::Display for ResultCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.entity, self.tool, self.tool_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_canonical_form_without_revision() {
        let c = EntityCoordinates::parse("npm/npmjs/-/test").unwrap();
        assert_eq!(c.to_string_without_revision(), "npm/npmjs/-/test");
        assert!(c.namespace.is_none());
    }

    #[test]
    fn round_trips_canonical_form_with_revision() {
        let c = EntityCoordinates::parse("npm/npmjs/-/test/1.0.0").unwrap();
        assert_eq!(c.to_string(), "npm/npmjs/-/test/1.0.0");
        assert_eq!(c.revision.as_deref(), Some("1.0.0"));
    }

    #[test]
    fn lowercases_type_and_provider_but_preserves_name() {
        let c = EntityCoordinates::new("NPM", "NPMJS", None, "Test", Some("1.0.0".into()));
        assert_eq!(c.component_type, "npm");
        assert_eq!(c.provider, "npmjs");
        assert_eq!(c.name, "Test");
    }

    #[test]
    fn equality_is_case_insensitive_except_name() {
        let a = EntityCoordinates::new("npm", "NPMJS", None, "Test", Some("1.0.0".into()));
        let b = EntityCoordinates::new("NPM", "npmjs", None, "Test", Some("1.0.0".into()));
        assert_eq!(a, b);

        let c = EntityCoordinates::new("npm", "npmjs", None, "test", Some("1.0.0".into()));
        assert_ne!(a, c, "name comparison must stay case-sensitive");
    }

    #[test]
    fn from_urn_requires_five_segments_after_scheme() {
        assert!(EntityCoordinates::from_urn("urn:npm:npmjs").is_err());
    }

    #[test]
    fn result_coordinates_urn_round_trip() {
        let entity = EntityCoordinates::parse("npm/npmjs/-/test/1.0.0").unwrap();
        let rc = ResultCoordinates::new(entity, "clearlydefined", "1.0.0");
        let urn = rc.to_urn();
        assert_eq!(urn, "urn:npm:npmjs:-:test:revision:1.0.0:tool:clearlydefined:1.0.0");
        let parsed = ResultCoordinates::from_urn(&urn).unwrap();
        assert_eq!(parsed, rc);
    }

    #[test]
    fn namespace_sentinel_round_trips() {
        let c = EntityCoordinates::new("git", "github", None, "foo", Some("deadbeef".into()));
        assert_eq!(c.to_string(), "git/github/-/foo/deadbeef");
        let parsed = EntityCoordinates::parse(&c.to_string()).unwrap();
        assert_eq!(parsed, c);
    }
}
