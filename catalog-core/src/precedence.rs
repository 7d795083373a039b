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

//! Tool precedence for the aggregator's merge order.
//!
//! A `Precedence` is a list of groups, highest-priority group first;
//! within a group, alternatives are mutually exclusive with the first
//! listed item preferred. Each element is a `toolSpec`: either `name` or
//! `name/version`.

/// One element of a precedence group: a bare tool name, or a tool pinned
/// to an exact version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolSpec {
    Name(String),
    NameVersion(String, String),
}

impl ToolSpec {
    pub fn parse(s: &str) -> Self {
        match s.split_once('/') {
            Some((name, version)) => ToolSpec::NameVersion(name.to_string(), version.to_string()),
            None => ToolSpec::Name(s.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ToolSpec::Name(n) => n,
            ToolSpec::NameVersion(n, _) => n,
        }
    }

    pub fn version(&self) -> Option<&str> {
        match self {
            ToolSpec::Name(_) => None,
            ToolSpec::NameVersion(_, v) => Some(v),
        }
    }

    pub fn to_spec_string(&self) -> String {
        match self {
            ToolSpec::Name(n) => n.clone(),
            ToolSpec::NameVersion(n, v) => format!("{n}/{v}"),
        }
    }
}

/// Ordered precedence groups, highest-priority group first.
#[derive(Debug, Clone, Default)]
pub struct Precedence {
    pub groups: Vec<Vec<ToolSpec>>,
}

impl Precedence {
    pub fn new(groups: Vec<Vec<ToolSpec>>) -> Self {
        Self { groups }
    }

    /// Flatten into a working list ordered lowest-priority first, as the
    /// aggregator's merge order requires.
    ///
    /// Priority runs highest-to-lowest in the order groups (and, within a
    /// group, alternatives) are listed; the working list is the reverse
    /// of that sequence, so the highest-priority element ends up last and
    /// is applied last by the merge. The flattened order is authoritative;
    /// no separate "same group" tie-break is modeled.
    pub fn flatten_lowest_first(&self) -> Vec<ToolSpec> {
        let mut high_to_low: Vec<ToolSpec> = self.groups.iter().flatten().cloned().collect();
        high_to_low.reverse();
        high_to_low
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattens_lowest_priority_first() {
        let p = Precedence::new(vec![vec![
            ToolSpec::parse("tool1"),
            ToolSpec::parse("tool2"),
            ToolSpec::parse("tool3"),
        ]]);
        let flattened: Vec<String> = p.flatten_lowest_first().iter().map(ToolSpec::to_spec_string).collect();
        assert_eq!(
            flattened,
            vec!["tool3".to_string(), "tool2".to_string(), "tool1".to_string()]
        );
    }

    #[test]
    fn higher_priority_group_ends_up_last() {
        let p = Precedence::new(vec![vec![ToolSpec::parse("high")], vec![ToolSpec::parse("low")]]);
        let flattened: Vec<String> = p.flatten_lowest_first().iter().map(ToolSpec::to_spec_string).collect();
        assert_eq!(flattened, vec!["low".to_string(), "high".to_string()]);
    }
}
