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

//! `/webhook` (spec §6.2) end-to-end coverage: crawler-notification
//! dispatch and auth rejection paths.

mod common;

use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use catalog_core::EntityCoordinates;
use catalog_server::api::webhook::handle_webhook;
use catalog_storage::DefinitionStore;

fn crawler_payload(urn: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "_metadata": { "links": { "self": { "href": urn } } },
        "licensed": { "declared": "MIT" },
    }))
    .unwrap()
}

#[tokio::test]
async fn crawler_webhook_with_correct_secret_recomputes_and_stores() {
    let fixture = common::build_with_secrets(Some("topsecret".to_string()), None).await;
    let coords = EntityCoordinates::parse("npm/npmjs/-/left-pad/1.3.0").unwrap();
    let urn = "urn:npm:npmjs:-:left-pad:revision:1.3.0:tool:scancode:3.2.2";

    let mut headers = HeaderMap::new();
    headers.insert("x-crawler", HeaderValue::from_static("topsecret"));

    let status = handle_webhook(State(fixture.state.clone()), headers, crawler_payload(urn).into()).await.unwrap();
    assert_eq!(status, StatusCode::OK);

    assert!(fixture.store.get(&coords, "1.0.0").await.unwrap().is_some());
}

#[tokio::test]
async fn crawler_webhook_rejects_wrong_secret() {
    let fixture = common::build_with_secrets(Some("topsecret".to_string()), None).await;
    let mut headers = HeaderMap::new();
    headers.insert("x-crawler", HeaderValue::from_static("wrong"));

    let result = handle_webhook(
        State(fixture.state),
        headers,
        crawler_payload("urn:npm:npmjs:-:left-pad:revision:1.3.0:tool:scancode:3.2.2").into(),
    )
    .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn webhook_without_a_recognized_header_is_rejected() {
    let fixture = common::build().await;
    let result = handle_webhook(State(fixture.state), HeaderMap::new(), Vec::new().into()).await;
    assert!(result.is_err());
}
