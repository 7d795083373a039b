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

//! Shared coordinate model, data model, configuration, and error taxonomy
//! for the component metadata catalog pipeline.

pub mod config;
pub mod coordinates;
pub mod error;
pub mod model;
pub mod precedence;

pub use config::CatalogConfig;
pub use coordinates::{EntityCoordinates, ResultCoordinates};
pub use error::{CatalogError, Result};
pub use model::{Contribution, Curation, CurationCoordinates, Definition, Summary, SummarizedData};
pub use precedence::{Precedence, ToolSpec};
