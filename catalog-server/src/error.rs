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

//! HTTP-facing error mapping. Only [`catalog_core::CatalogError::Validation`]
//! and `UpstreamPermanent` are ever surfaced to a caller (spec §7); every
//! other variant either never reaches a route handler or is a
//! programmer error the process should not have started with.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use catalog_core::CatalogError;
use serde::Serialize;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found")]
    NotFound,
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("authentication failed: {0}")]
    AuthFailure(String),
    #[error("upstream rejected request: {0}")]
    UpstreamPermanent(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("throttled: {0}")]
    Throttled(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Vec<serde_json::Value>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::AuthFailure(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::UpstreamPermanent(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            ApiError::Throttled(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
        };
        let details = match &self {
            ApiError::Validation(msg) => Some(vec![json!({ "message": msg })]),
            _ => None,
        };
        (status, Json(ErrorBody { error: message, details })).into_response()
    }
}

impl From<CatalogError> for ApiError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::Validation(msg) => ApiError::Validation(msg),
            CatalogError::AuthFailure(msg) => ApiError::AuthFailure(msg),
            CatalogError::UpstreamPermanent(msg) => ApiError::UpstreamPermanent(msg),
            CatalogError::NotFound(_) => ApiError::NotFound,
            // SchemaStale/UpstreamTransient/Parse/Fatal/Serialization/Io never
            // reach a caller per spec §7's propagation policy; compute is
            // best-effort and swallows them internally. Surfacing here would
            // only happen on a genuine bug, so map conservatively to 500.
            other => ApiError::Internal(other.to_string()),
        }
    }
}
