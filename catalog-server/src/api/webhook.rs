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

//! `/webhook` (spec §6.2): two unrelated payload shapes land on the same
//! route, distinguished by which header is present.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use catalog_core::{EntityCoordinates, ResultCoordinates};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::time::Duration;
use tracing::{debug, error, warn};

/// GitHub waits this long before the handler actually processes an
/// event, to absorb eventual consistency in the PR-files API (spec
/// §6.2). The HTTP response itself does not wait on it: GitHub's own
/// delivery timeout is shorter than this, so the wait happens in a
/// detached task after the 200 is already on the wire.
const CONSISTENCY_DELAY: Duration = Duration::from_secs(10);

pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<StatusCode, ApiError> {
    if headers.contains_key("x-crawler") {
        return handle_crawler(&state, &headers, &body).await;
    }
    if headers.contains_key("x-github-event") {
        return handle_github(&state, &headers, &body).await;
    }
    Err(ApiError::Validation("unrecognized webhook payload: missing X-Crawler or X-GitHub-Event header".to_string()))
}

async fn handle_crawler(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<StatusCode, ApiError> {
    let provided = headers
        .get("x-crawler")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::AuthFailure("missing X-Crawler header".to_string()))?;
    let expected = state
        .crawler_secret
        .as_deref()
        .ok_or_else(|| ApiError::AuthFailure("crawler webhook is not configured".to_string()))?;
    if !constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
        return Err(ApiError::AuthFailure("X-Crawler header did not match the configured secret".to_string()));
    }

    let payload: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| ApiError::Validation(format!("invalid JSON body: {e}")))?;
    let urn = payload
        .get("_metadata")
        .and_then(|m| m.get("links"))
        .and_then(|l| l.get("self"))
        .and_then(|s| s.get("href"))
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| ApiError::Validation("body is missing _metadata.links.self.href".to_string()))?;

    let rc = ResultCoordinates::from_urn(urn).map_err(|e| ApiError::Validation(e.to_string()))?;
    if let Err(e) = recompute_for_result(state, &rc).await {
        error!(error = %e, coordinates = %rc, "crawler webhook recompute failed");
    }
    Ok(StatusCode::OK)
}

/// Shared with the harvest-update queue processor's dispatch rule (spec
/// §6.2/§4.10): "clearlydefined" always recomputes and recurates; any
/// other tool recomputes only if that exact tool/version is not already
/// described.
async fn recompute_for_result(state: &AppState, rc: &ResultCoordinates) -> catalog_core::Result<()> {
    let guard = state.compute_lock.acquire(&rc.entity.to_string()).await;
    let outcome = async {
        if rc.tool.eq_ignore_ascii_case("clearlydefined") {
            state.definitions.compute_store_and_curate(&rc.entity).await?;
            return Ok(());
        }
        let incoming = format!("{}/{}", rc.tool, rc.tool_version);
        match state.definitions.get_stored(&rc.entity).await? {
            Some(stored) if stored.described_tools().contains(&incoming) => {
                debug!(tool = %incoming, "tool result already processed, skipping recompute");
                Ok(())
            }
            _ => {
                state.definitions.compute_and_store(&rc.entity).await?;
                Ok(())
            }
        }
    }
    .await;
    guard.release();
    outcome
}

async fn handle_github(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<StatusCode, ApiError> {
    let event = headers
        .get("x-github-event")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::AuthFailure("missing X-GitHub-Event header".to_string()))?
        .to_string();
    let signature = headers
        .get("x-hub-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::AuthFailure("missing X-Hub-Signature header".to_string()))?;
    let secret = state
        .github_webhook_secret
        .as_deref()
        .ok_or_else(|| ApiError::AuthFailure("GitHub webhook is not configured".to_string()))?;
    verify_signature(secret, body, signature)?;

    let payload: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| ApiError::Validation(format!("invalid JSON body: {e}")))?;
    let action = payload.get("action").and_then(serde_json::Value::as_str).unwrap_or_default().to_string();
    let pr_number = payload
        .get("pull_request")
        .and_then(|pr| pr.get("number"))
        .and_then(serde_json::Value::as_u64);
    let merged = payload
        .get("pull_request")
        .and_then(|pr| pr.get("merged"))
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false);

    let Some(pr_number) = pr_number else {
        debug!(event, action, "github webhook payload missing pull_request.number, ignoring");
        return Ok(StatusCode::OK);
    };

    match action.as_str() {
        "opened" | "reopened" | "synchronize" => {
            spawn_after_delay(state.clone(), move |state| async move {
                if let Err(e) = process_pr_update(&state, pr_number).await {
                    warn!(error = %e, pr_number, "failed to process pull request update");
                }
            });
        }
        "closed" if merged => {
            spawn_after_delay(state.clone(), move |state| async move {
                if let Err(e) = process_pr_merge(&state, pr_number).await {
                    warn!(error = %e, pr_number, "failed to process merged pull request");
                }
            });
        }
        _ => {
            debug!(event, action, pr_number, "unhandled github webhook action, no-op");
        }
    }

    Ok(StatusCode::OK)
}

fn spawn_after_delay<F, Fut>(state: AppState, f: F)
where
    F: FnOnce(AppState) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        tokio::time::sleep(CONSISTENCY_DELAY).await;
        f(state).await;
    });
}

async fn process_pr_update(state: &AppState, pr_number: u64) -> catalog_core::Result<()> {
    let pr = state.github.fetch_pr_files(pr_number).await?;
    state.curator.update_contribution(pr_number, &pr.head_sha, pr.files).await
}

/// `updateContribution` first refreshes the in-memory index with the PR's
/// final file set, then `addByMergedCuration` retires that tracked
/// contribution and broadcasts the change (see `catalog_pipeline::curator`
/// — a merge event for an untracked PR is a no-op warning, so the index
/// must hold the contribution before it can be finalized).
async fn process_pr_merge(state: &AppState, pr_number: u64) -> catalog_core::Result<()> {
    let pr = state.github.fetch_pr_files(pr_number).await?;
    state.curator.update_contribution(pr_number, &pr.head_sha, pr.files).await?;
    let affected = state.curator.add_by_merged_curation(pr_number).await?;
    for coordinates in &affected {
        if let Err(e) = recompute_after_curation(state, coordinates).await {
            error!(error = %e, coordinates = %coordinates, "recompute after curation merge failed");
        }
    }
    Ok(())
}

async fn recompute_after_curation(state: &AppState, coordinates: &EntityCoordinates) -> catalog_core::Result<()> {
    let guard = state.compute_lock.acquire(&coordinates.to_string()).await;
    let outcome = state.definitions.compute_store_and_curate(coordinates).await;
    guard.release();
    outcome.map(|_| ())
}

type HmacSha1 = Hmac<Sha1>;

fn verify_signature(secret: &str, body: &[u8], header_value: &str) -> Result<(), ApiError> {
    let hex_digest = header_value
        .strip_prefix("sha1=")
        .ok_or_else(|| ApiError::AuthFailure("X-Hub-Signature must be in sha1=<hex> form".to_string()))?;
    let provided = hex::decode(hex_digest)
        .map_err(|_| ApiError::AuthFailure("X-Hub-Signature is not valid hex".to_string()))?;

    let mut mac = HmacSha1::new_from_slice(secret.as_bytes())
        .map_err(|_| ApiError::AuthFailure("invalid webhook secret".to_string()))?;
    mac.update(body);
    mac.verify_slice(&provided)
        .map_err(|_| ApiError::AuthFailure("X-Hub-Signature did not match the computed HMAC".to_string()))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_rejects_different_lengths() {
        assert!(!constant_time_eq(b"short", b"longer value"));
    }

    #[test]
    fn constant_time_eq_accepts_equal_slices() {
        assert!(constant_time_eq(b"matching", b"matching"));
    }

    #[test]
    fn verify_signature_rejects_missing_prefix() {
        let err = verify_signature("secret", b"payload", "deadbeef");
        assert!(err.is_err());
    }

    #[test]
    fn verify_signature_accepts_correct_hmac() {
        let mut mac = HmacSha1::new_from_slice(b"secret").unwrap();
        mac.update(b"payload");
        let digest = mac.finalize().into_bytes();
        let header = format!("sha1={}", hex::encode(digest));
        assert!(verify_signature("secret", b"payload", &header).is_ok());
    }
}
