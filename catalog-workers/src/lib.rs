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

//! The two queue processors that keep stored definitions consistent
//! with the latest harvested tool output and the current schema
//! version (C11, C12), plus the CDN write-behind invalidator (C13).

pub mod cdn;
pub mod harvest_update;
pub mod upgrade;

pub use cdn::{CdnFlushClient, CdnInvalidator, HttpCdnFlushClient, NoopCdnFlushClient};
pub use harvest_update::HarvestUpdateProcessor;
pub use upgrade::{enqueue_upgrade, QueueUpgrader, VersionChecker};
