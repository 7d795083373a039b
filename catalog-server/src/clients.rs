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

//! HTTP-backed implementations of the pipeline's external collaborator
//! traits (spec §1): the crawler client and a GitHub pull-request reader
//! for the curation webhook. Thin adapters, matching the teacher's
//! provider-client style (`catalog_workers::cdn::HttpCdnFlushClient`).

use async_trait::async_trait;
use base64::Engine;
use catalog_core::{CatalogError, CurationCoordinates, EntityCoordinates, Result};
use catalog_pipeline::{CrawlerClient, CurationRepository};
use serde_json::json;

pub struct HttpCrawlerClient {
    http: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpCrawlerClient {
    pub fn new(base_url: String, auth_token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            auth_token,
        }
    }
}

#[async_trait]
impl CrawlerClient for HttpCrawlerClient {
    async fn request_harvest(&self, tool: &str, coordinates: &EntityCoordinates) -> Result<()> {
        let mut request = self
            .http
            .post(format!("{}/requests", self.base_url.trim_end_matches('/')))
            .json(&json!({ "type": tool, "url": coordinates.to_string() }));
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| CatalogError::UpstreamTransient(format!("crawler harvest request failed: {e}")))?;
        if response.status().is_server_error() {
            return Err(CatalogError::UpstreamTransient(format!(
                "crawler returned {}",
                response.status()
            )));
        }
        if response.status().is_client_error() {
            return Err(CatalogError::UpstreamPermanent(format!(
                "crawler rejected harvest request: {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// The files a pull request proposes to the curations repository, plus
/// its head commit (spec §4.7/§6.2).
pub struct PullRequestFiles {
    pub head_sha: String,
    /// `(path, content)` pairs, limited to `curations/**/*.yaml`.
    pub files: Vec<(String, String)>,
}

/// What the curator needs from GitHub to process a pull-request webhook
/// event. Out of scope per spec §1 ("GitHub webhook signature checks and
/// OAuth shim are thin adapters"); this is the contract.
#[async_trait]
pub trait GitHubClient: Send + Sync {
    async fn fetch_pr_files(&self, pr_number: u64) -> Result<PullRequestFiles>;
}

/// The default when no GitHub repository is configured: every pull
/// request lookup fails permanently, since there is nothing to fetch
/// from. The webhook route itself already refuses to call this without a
/// configured secret (spec §6.2), so this only guards against a
/// misconfigured deployment.
pub struct NoopGitHubClient;

#[async_trait]
impl GitHubClient for NoopGitHubClient {
    async fn fetch_pr_files(&self, _pr_number: u64) -> Result<PullRequestFiles> {
        Err(CatalogError::UpstreamPermanent(
            "no GitHub repository is configured for this deployment".to_string(),
        ))
    }
}

pub struct HttpGitHubClient {
    http: reqwest::Client,
    owner: String,
    repo: String,
    token: Option<String>,
}

impl HttpGitHubClient {
    pub fn new(owner: String, repo: String, token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            owner,
            repo,
            token,
        }
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let mut request = self.http.get(url).header("User-Agent", "catalog-server").header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        request
    }
}

#[async_trait]
impl GitHubClient for HttpGitHubClient {
    async fn fetch_pr_files(&self, pr_number: u64) -> Result<PullRequestFiles> {
        let pr_url = format!("https://api.github.com/repos/{}/{}/pulls/{}", self.owner, self.repo, pr_number);
        let pr_response = self
            .request(&pr_url)
            .send()
            .await
            .map_err(|e| CatalogError::UpstreamTransient(format!("GitHub pull request lookup failed: {e}")))?;
        if pr_response.status().is_server_error() {
            return Err(CatalogError::UpstreamTransient(format!("GitHub returned {}", pr_response.status())));
        }
        if pr_response.status().is_client_error() {
            return Err(CatalogError::UpstreamPermanent(format!(
                "GitHub rejected pull request lookup: {}",
                pr_response.status()
            )));
        }
        let pr_body: serde_json::Value = pr_response
            .json()
            .await
            .map_err(|e| CatalogError::UpstreamTransient(format!("GitHub pull request response was not JSON: {e}")))?;
        let head_sha = pr_body
            .get("head")
            .and_then(|h| h.get("sha"))
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string();

        let files_url = format!(
            "https://api.github.com/repos/{}/{}/pulls/{}/files",
            self.owner, self.repo, pr_number
        );
        let files_response = self
            .request(&files_url)
            .send()
            .await
            .map_err(|e| CatalogError::UpstreamTransient(format!("GitHub pull request files lookup failed: {e}")))?;
        let entries: Vec<serde_json::Value> = files_response
            .json()
            .await
            .map_err(|e| CatalogError::UpstreamTransient(format!("GitHub pull request files response was not JSON: {e}")))?;

        let mut files = Vec::new();
        for entry in entries {
            let Some(path) = entry.get("filename").and_then(serde_json::Value::as_str) else { continue };
            if !path.starts_with("curations/") || !path.ends_with(".yaml") {
                continue;
            }
            let Some(raw_url) = entry.get("raw_url").and_then(serde_json::Value::as_str) else { continue };
            let content = self
                .request(raw_url)
                .send()
                .await
                .map_err(|e| CatalogError::UpstreamTransient(format!("GitHub raw content fetch failed: {e}")))?
                .text()
                .await
                .map_err(|e| CatalogError::UpstreamTransient(format!("GitHub raw content was not text: {e}")))?;
            files.push((path.to_string(), content));
        }

        Ok(PullRequestFiles { head_sha, files })
    }
}

/// The curations repository itself, read and written through GitHub's
/// contents API (spec §6.3: "one YAML file per component"). `put_merged`
/// is a write-through cache of what the PR merge already committed on
/// GitHub's side; it never opens a commit of its own on a *new* branch,
/// only updates the already-merged file.
pub struct HttpCurationRepository {
    http: reqwest::Client,
    owner: String,
    repo: String,
    branch: String,
    token: Option<String>,
}

impl HttpCurationRepository {
    pub fn new(owner: String, repo: String, branch: String, token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            owner,
            repo,
            branch,
            token,
        }
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let mut request = self
            .http
            .request(method, url)
            .header("User-Agent", "catalog-server")
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        request
    }

    async fn get_content(&self, path: &str, reference: &str) -> Result<Option<String>> {
        let url = format!(
            "https://api.github.com/repos/{}/{}/contents/{path}?ref={reference}",
            self.owner, self.repo
        );
        let response = self
            .request(reqwest::Method::GET, &url)
            .send()
            .await
            .map_err(|e| CatalogError::UpstreamTransient(format!("GitHub contents lookup failed: {e}")))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if response.status().is_server_error() {
            return Err(CatalogError::UpstreamTransient(format!("GitHub returned {}", response.status())));
        }
        if response.status().is_client_error() {
            return Err(CatalogError::UpstreamPermanent(format!(
                "GitHub rejected contents lookup: {}",
                response.status()
            )));
        }
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CatalogError::UpstreamTransient(format!("GitHub contents response was not JSON: {e}")))?;
        let encoded = body
            .get("content")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| CatalogError::UpstreamPermanent("GitHub contents response missing content field".to_string()))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.replace('\n', ""))
            .map_err(|e| CatalogError::UpstreamPermanent(format!("GitHub contents field was not valid base64: {e}")))?;
        String::from_utf8(bytes)
            .map(Some)
            .map_err(|e| CatalogError::UpstreamPermanent(format!("GitHub contents field was not valid utf-8: {e}")))
    }
}

/// The default when no curations repository is configured: no curation
/// is ever in effect, and merges are rejected. The curator is always
/// constructed (the definition service holds a reference to it
/// unconditionally), so this keeps that wiring valid without GitHub.
pub struct NoopCurationRepository;

#[async_trait]
impl CurationRepository for NoopCurationRepository {
    async fn get_merged(&self, _coordinates: &CurationCoordinates) -> Result<Option<String>> {
        Ok(None)
    }

    async fn get_pr_file(&self, _coordinates: &CurationCoordinates, _pr_number: u64) -> Result<Option<String>> {
        Ok(None)
    }

    async fn put_merged(&self, _coordinates: &CurationCoordinates, _yaml: &str) -> Result<()> {
        Err(CatalogError::UpstreamPermanent(
            "no curations repository is configured for this deployment".to_string(),
        ))
    }
}

fn curation_file_path(coordinates: &CurationCoordinates) -> String {
    match &coordinates.namespace {
        Some(ns) => format!(
            "curations/{}/{}/{}/{}.yaml",
            coordinates.component_type, coordinates.provider, ns, coordinates.name
        ),
        None => format!(
            "curations/{}/{}/{}.yaml",
            coordinates.component_type, coordinates.provider, coordinates.name
        ),
    }
}

#[async_trait]
impl CurationRepository for HttpCurationRepository {
    async fn get_merged(&self, coordinates: &CurationCoordinates) -> Result<Option<String>> {
        self.get_content(&curation_file_path(coordinates), &self.branch).await
    }

    async fn get_pr_file(&self, coordinates: &CurationCoordinates, pr_number: u64) -> Result<Option<String>> {
        let pr_url = format!("https://api.github.com/repos/{}/{}/pulls/{}", self.owner, self.repo, pr_number);
        let pr_response = self
            .request(reqwest::Method::GET, &pr_url)
            .send()
            .await
            .map_err(|e| CatalogError::UpstreamTransient(format!("GitHub pull request lookup failed: {e}")))?;
        let pr_body: serde_json::Value = pr_response
            .json()
            .await
            .map_err(|e| CatalogError::UpstreamTransient(format!("GitHub pull request response was not JSON: {e}")))?;
        let head_sha = pr_body
            .get("head")
            .and_then(|h| h.get("sha"))
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| CatalogError::UpstreamPermanent(format!("GitHub pull request {pr_number} has no head sha")))?;
        self.get_content(&curation_file_path(coordinates), head_sha).await
    }

    async fn put_merged(&self, coordinates: &CurationCoordinates, yaml: &str) -> Result<()> {
        let path = curation_file_path(coordinates);
        let url = format!("https://api.github.com/repos/{}/{}/contents/{path}", self.owner, self.repo);
        let existing_sha = {
            let lookup_url = format!("{url}?ref={}", self.branch);
            let response = self
                .request(reqwest::Method::GET, &lookup_url)
                .send()
                .await
                .map_err(|e| CatalogError::UpstreamTransient(format!("GitHub contents lookup failed: {e}")))?;
            if response.status().is_success() {
                let body: serde_json::Value = response
                    .json()
                    .await
                    .map_err(|e| CatalogError::UpstreamTransient(format!("GitHub contents response was not JSON: {e}")))?;
                body.get("sha").and_then(serde_json::Value::as_str).map(str::to_string)
            } else {
                None
            }
        };

        let mut payload = json!({
            "message": format!("Update curation for {path}"),
            "content": base64::engine::general_purpose::STANDARD.encode(yaml.as_bytes()),
            "branch": self.branch,
        });
        if let Some(sha) = existing_sha {
            payload["sha"] = json!(sha);
        }

        let response = self
            .request(reqwest::Method::PUT, &url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| CatalogError::UpstreamTransient(format!("GitHub contents write failed: {e}")))?;
        if response.status().is_server_error() {
            return Err(CatalogError::UpstreamTransient(format!("GitHub returned {}", response.status())));
        }
        if response.status().is_client_error() {
            return Err(CatalogError::UpstreamPermanent(format!(
                "GitHub rejected contents write: {}",
                response.status()
            )));
        }
        Ok(())
    }
}
