// src/clients/github.rs

//! Minimal GitHub REST client.
//!
//! Covers the two resources the watcher uses: repository issues (as the
//! subscriber registry) and repository contents (as the offer state store).

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::GitHubConfig;
use crate::utils::http::{api_error, create_api_client};

const SERVICE: &str = "GitHub";
const API_VERSION: &str = "2022-11-28";
const PER_PAGE: usize = 100;
const MAX_PAGES: usize = 50;

/// Issue fields the registry needs.
#[derive(Debug, Clone, Deserialize)]
pub struct Issue {
    pub number: u64,
    #[serde(default)]
    pub body: Option<String>,
    /// Present when the entry is a pull request
    #[serde(default)]
    pub pull_request: Option<serde_json::Value>,
}

/// A file returned by the contents API.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentFile {
    pub sha: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub encoding: String,
}

impl ContentFile {
    /// Decode the file body (base64, wrapped at 60 columns by GitHub).
    pub fn decode(&self) -> Result<Vec<u8>> {
        if self.encoding != "base64" {
            return Err(AppError::validation(format!(
                "unsupported content encoding '{}'",
                self.encoding
            )));
        }
        let compact: String = self
            .content
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        Ok(STANDARD.decode(compact)?)
    }
}

#[derive(Debug, Serialize)]
struct PutContentBody<'a> {
    message: &'a str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    branch: Option<&'a str>,
}

/// Client scoped to one repository.
#[derive(Clone)]
pub struct GitHubClient {
    http: Client,
    api_base: Url,
    owner: String,
    repo: String,
    token: String,
}

impl fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubClient")
            .field("api_base", &self.api_base.as_str())
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .finish_non_exhaustive()
    }
}

impl GitHubClient {
    pub fn new(
        http: Client,
        api_base: &str,
        owner: impl Into<String>,
        repo: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            http,
            api_base: Url::parse(api_base)?,
            owner: owner.into(),
            repo: repo.into(),
            token: token.into(),
        })
    }

    pub fn from_config(config: &GitHubConfig) -> Result<Self> {
        let (owner, repo) = config.owner_repo()?;
        if config.token.trim().is_empty() {
            log::warn!("GITHUB_TOKEN is not set; requests to {owner}/{repo} are unauthenticated");
        }
        let http = create_api_client(config.timeout_secs)?;
        Self::new(http, &config.api_base, owner, repo, config.token.clone())
    }

    /// `owner/repo` of the scoped repository.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// Build `{api_base}/repos/{owner}/{repo}/{segments..}`.
    fn repo_url<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::config("github.api_base cannot be a base URL"))?
            .pop_if_empty()
            .extend(["repos", self.owner.as_str(), self.repo.as_str()])
            .extend(segments);
        Ok(url)
    }

    fn contents_url(&self, path: &str) -> Result<Url> {
        let segments = std::iter::once("contents").chain(path.split('/').filter(|s| !s.is_empty()));
        self.repo_url(segments)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self
            .http
            .request(method, url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION);
        if self.token.is_empty() {
            builder
        } else {
            builder.bearer_auth(&self.token)
        }
    }

    /// List issues carrying `label` in `state`, following pagination.
    ///
    /// Pull requests returned by the issues endpoint are skipped.
    pub async fn list_issues(&self, label: &str, state: &str) -> Result<Vec<Issue>> {
        let url = self.repo_url(["issues"])?;
        let per_page = PER_PAGE.to_string();
        let mut issues = Vec::new();

        for page in 1..=MAX_PAGES {
            let page_str = page.to_string();
            let response = self
                .request(Method::GET, url.clone())
                .query(&[
                    ("labels", label),
                    ("state", state),
                    ("per_page", per_page.as_str()),
                    ("page", page_str.as_str()),
                ])
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(api_error(SERVICE, response).await);
            }

            let batch: Vec<Issue> = response.json().await?;
            let fetched = batch.len();
            issues.extend(batch.into_iter().filter(|i| i.pull_request.is_none()));

            if fetched < PER_PAGE {
                break;
            }
        }

        Ok(issues)
    }

    /// Fetch a file, or `None` if it does not exist.
    pub async fn get_content(&self, path: &str, branch: Option<&str>) -> Result<Option<ContentFile>> {
        let mut request = self.request(Method::GET, self.contents_url(path)?);
        if let Some(branch) = branch {
            request = request.query(&[("ref", branch)]);
        }
        let response = request.send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            _ => Err(api_error(SERVICE, response).await),
        }
    }

    /// Create or update a file. `sha` guards against overwriting a newer revision.
    pub async fn put_content(
        &self,
        path: &str,
        body: &[u8],
        message: &str,
        sha: Option<&str>,
        branch: Option<&str>,
    ) -> Result<()> {
        let payload = PutContentBody {
            message,
            content: STANDARD.encode(body),
            sha,
            branch,
        };
        let response = self
            .request(Method::PUT, self.contents_url(path)?)
            .json(&payload)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::CONFLICT
            | StatusCode::PRECONDITION_FAILED
            | StatusCode::UNPROCESSABLE_ENTITY => {
                let err = api_error(SERVICE, response).await;
                log::warn!("Guarded write to {} rejected: {}", path, err);
                Err(AppError::Conflict(format!("{}:{}", self.full_name(), path)))
            }
            _ => Err(api_error(SERVICE, response).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::MockServer;
    use serde_json::json;

    fn client(server: &MockServer) -> GitHubClient {
        GitHubClient::new(
            Client::new(),
            &server.base_url(),
            "octo",
            "offers",
            "ghp_test",
        )
        .unwrap()
    }

    #[test]
    fn test_contents_url_keeps_nested_path() {
        let client = GitHubClient::new(Client::new(), "https://api.github.com", "o", "r", "").unwrap();
        let url = client.contents_url("state/last offer.json").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/o/r/contents/state/last%20offer.json"
        );
    }

    #[test]
    fn test_decode_wrapped_base64() {
        let file = ContentFile {
            sha: "abc".into(),
            content: "eyJ0aXRsZSI6\nICJYIn0=\n".into(),
            encoding: "base64".into(),
        };
        assert_eq!(file.decode().unwrap(), br#"{"title": "X"}"#.to_vec());
    }

    #[tokio::test]
    async fn test_list_issues_filters_pull_requests() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method("GET")
                    .path("/repos/octo/offers/issues")
                    .query_param("labels", "device-token")
                    .query_param("state", "open")
                    .query_param("page", "1")
                    .header("authorization", "Bearer ghp_test");
                then.status(200).json_body(json!([
                    { "number": 1, "body": "tok1" },
                    { "number": 2, "body": null },
                    { "number": 3, "body": "pr", "pull_request": { "url": "x" } }
                ]));
            })
            .await;

        let issues = client(&server).list_issues("device-token", "open").await.unwrap();
        mock.assert_async().await;
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].body.as_deref(), Some("tok1"));
        assert!(issues[1].body.is_none());
    }

    #[tokio::test]
    async fn test_list_issues_follows_pages() {
        let server = MockServer::start_async().await;
        let full_page: Vec<_> = (0..PER_PAGE)
            .map(|i| json!({ "number": i, "body": format!("tok{i}") }))
            .collect();
        let first = server
            .mock_async(|when, then| {
                when.method("GET")
                    .path("/repos/octo/offers/issues")
                    .query_param("page", "1");
                then.status(200).json_body(json!(full_page));
            })
            .await;
        let second = server
            .mock_async(|when, then| {
                when.method("GET")
                    .path("/repos/octo/offers/issues")
                    .query_param("page", "2");
                then.status(200).json_body(json!([{ "number": 999, "body": "last" }]));
            })
            .await;

        let issues = client(&server).list_issues("device-token", "open").await.unwrap();
        first.assert_async().await;
        second.assert_async().await;
        assert_eq!(issues.len(), PER_PAGE + 1);
    }

    #[tokio::test]
    async fn test_list_issues_surfaces_api_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method("GET").path("/repos/octo/offers/issues");
                then.status(401).json_body(json!({ "message": "Bad credentials" }));
            })
            .await;

        let err = client(&server)
            .list_issues("device-token", "open")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Api { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_get_content_not_found() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method("GET").path("/repos/octo/offers/contents/last-offer.json");
                then.status(404).json_body(json!({ "message": "Not Found" }));
            })
            .await;

        let file = client(&server)
            .get_content("last-offer.json", None)
            .await
            .unwrap();
        assert!(file.is_none());
    }

    #[tokio::test]
    async fn test_put_content_sends_sha_and_base64() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method("PUT")
                    .path("/repos/octo/offers/contents/last-offer.json")
                    .json_body_includes(
                        r#"{"message":"Update last offer: X","content":"eyJ0aXRsZSI6IlgifQ==","sha":"abc123"}"#,
                    );
                then.status(200).json_body(json!({ "content": { "sha": "def456" } }));
            })
            .await;

        client(&server)
            .put_content(
                "last-offer.json",
                br#"{"title":"X"}"#,
                "Update last offer: X",
                Some("abc123"),
                None,
            )
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_put_content_conflict() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method("PUT").path("/repos/octo/offers/contents/last-offer.json");
                then.status(409)
                    .json_body(json!({ "message": "last-offer.json does not match abc" }));
            })
            .await;

        let err = client(&server)
            .put_content("last-offer.json", b"{}", "m", Some("abc"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_put_content_precondition_failed_is_conflict() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method("PUT").path("/repos/octo/offers/contents/last-offer.json");
                then.status(412).json_body(json!({ "message": "Precondition Failed" }));
            })
            .await;

        let err = client(&server)
            .put_content("last-offer.json", b"{}", "m", Some("abc"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }
}
