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

//! Shared error taxonomy for the catalog pipeline.
//!
//! Every other crate in the workspace re-exports [`CatalogError`] as its
//! own `Error`/`Result` rather than inventing a parallel taxonomy, so that
//! callers can match on a single set of variants regardless of which
//! layer raised them.

use thiserror::Error;

/// Result type used across the catalog crates.
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Errors produced anywhere in the definition pipeline.
///
/// Recovery semantics are described per-variant below.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A store or harvest lookup produced no value. Callers treat this as
    /// a cache miss or an empty sequence; it is never propagated to HTTP.
    #[error("not found: {0}")]
    NotFound(String),

    /// Input failed schema validation. Surfaced as HTTP 400 with details.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A webhook signature or secret check failed. Surfaced as HTTP 400.
    #[error("authentication failed: {0}")]
    AuthFailure(String),

    /// A timeout or 5xx from a store, queue, or outbound HTTP call.
    /// Logged; message consumers leave the message un-acked for redelivery.
    #[error("upstream transient error: {0}")]
    UpstreamTransient(String),

    /// A non-404 4xx from an upstream. Surfaced to the caller.
    #[error("upstream rejected request: {0}")]
    UpstreamPermanent(String),

    /// A stored definition predates the current schema version. Recovered
    /// by recompute; never surfaced to a caller.
    #[error("stale schema version: {0}")]
    SchemaStale(String),

    /// Programmer/wiring error. Thrown eagerly at startup, never caught.
    #[error("fatal configuration error: {0}")]
    Fatal(String),

    /// Coordinate or URN parse failure.
    #[error("parse error: {0}")]
    Parse(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CatalogError {
    /// True for errors that a compute should absorb and continue past
    /// rather than abort on — compute is best-effort.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CatalogError::NotFound(_) | CatalogError::UpstreamTransient(_) | CatalogError::SchemaStale(_)
        )
    }
}
