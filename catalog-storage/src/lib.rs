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

//! Storage abstractions for the catalog: the harvest store, the
//! definition store and its dispatch fan-out, and the search index used
//! by `computeAndStore` and the stats engine.

pub mod definition;
pub mod dispatch;
pub mod harvest;
pub mod search;

pub use definition::{DefinitionStore, FindPage, FindQuery, InMemoryDefinitionStore};
pub use dispatch::DispatchStore;
pub use harvest::{HarvestByTool, HarvestStore, InMemoryHarvestStore, LatestByTool, RawOutput};
pub use search::{FacetBucket, FacetQueryResult, InMemorySearchIndex, SearchIndex};
