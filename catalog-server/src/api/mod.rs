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

//! Route handlers (spec §6.1/§6.2). Thin glue: each handler parses and
//! validates its input, then delegates to `catalog-pipeline`/
//! `catalog-workers`.

pub mod definitions;
pub mod harvest;
pub mod health;
pub mod stats;
pub mod webhook;
