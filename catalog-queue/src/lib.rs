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

//! The queue abstraction consumed by the harvest-update and upgrade
//! processors, and the per-coordinate compute lock that serializes work
//! on the same entity within one process.

pub mod lock;
pub mod queue;

pub use lock::{ComputeLock, ComputeLockGuard};
pub use queue::{InMemoryQueue, Message, PayloadDecoder, Queue};
