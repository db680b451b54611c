//! A very small GitHub Issues client.
//!
//! Covers exactly what the porter worker needs: list labelled issues,
//! comment on them, label them, close them.

#![allow(clippy::missing_docs_in_private_items)]

mod issue;

use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;

pub use issue::{Issue, User};

/// Public GitHub API endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";
/// REST API version sent with every request.
const API_VERSION: &str = "2022-11-28";

/// Result type for porter-github operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from the GitHub API.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Transport or decoding failure.
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("{url}: HTTP {status}: {body}")]
    Status {
        /// Request URL.
        url: String,
        /// Response status.
        status: StatusCode,
        /// Response body.
        body: String,
    },

    /// The token cannot be sent as a header.
    #[error("token contains characters not allowed in an HTTP header")]
    InvalidToken,

    /// An issue's repository URL does not end in `owner/repo`.
    #[error("cannot determine repository from `{0}`")]
    InvalidRepositoryUrl(String),
}

/// GitHub REST client.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    api_base: String,
    http: reqwest::Client,
}

impl GitHubClient {
    /// Creates a client for api.github.com.
    pub fn new(token: &str) -> Result<Self> {
        Self::with_api_base(token, DEFAULT_API_BASE)
    }

    /// Creates a client for a custom API base (GitHub Enterprise).
    pub fn with_api_base(token: &str, api_base: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("porter"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("X-GitHub-Api-Version", HeaderValue::from_static(API_VERSION));
        if !token.is_empty() {
            let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| Error::InvalidToken)?;
            auth.set_sensitive(true);
            headers.insert(AUTHORIZATION, auth);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;
        Ok(Self {
            api_base: api_base.trim_end_matches('/').to_owned(),
            http,
        })
    }

    /// Lists open issues carrying `label`, newest first, up to `per_page`.
    ///
    /// Pull requests are filtered out.
    pub async fn list_issues(
        &self,
        owner: &str,
        repo: &str,
        label: &str,
        per_page: u8,
    ) -> Result<Vec<Issue>> {
        let url = format!("{}/repos/{owner}/{repo}/issues", self.api_base);
        let per_page = per_page.to_string();
        let resp = self
            .http
            .get(&url)
            .query(&[
                ("state", "open"),
                ("labels", label),
                ("sort", "created"),
                ("direction", "desc"),
                ("page", "1"),
                ("per_page", per_page.as_str()),
            ])
            .send()
            .await?;
        let issues: Vec<Issue> = check(&url, resp).await?.json().await?;
        tracing::debug!(owner, repo, label, count = issues.len(), "listed issues");
        Ok(issues.into_iter().filter(|i| !i.is_pull_request()).collect())
    }

    /// Posts a comment on an issue.
    pub async fn comment(&self, issue: &Issue, body: &str) -> Result<()> {
        #[derive(Serialize)]
        struct Body<'a> {
            body: &'a str,
        }
        let url = self.issue_url(issue, "/comments")?;
        let resp = self.http.post(&url).json(&Body { body }).send().await?;
        check(&url, resp).await?;
        Ok(())
    }

    /// Adds labels to an issue.
    pub async fn add_labels(&self, issue: &Issue, labels: &[&str]) -> Result<()> {
        #[derive(Serialize)]
        struct Body<'a> {
            labels: &'a [&'a str],
        }
        let url = self.issue_url(issue, "/labels")?;
        let resp = self.http.post(&url).json(&Body { labels }).send().await?;
        check(&url, resp).await?;
        Ok(())
    }

    /// Closes an issue.
    pub async fn close(&self, issue: &Issue) -> Result<()> {
        let url = self.issue_url(issue, "")?;
        let resp = self
            .http
            .patch(&url)
            .json(&serde_json::json!({ "state": "closed" }))
            .send()
            .await?;
        check(&url, resp).await?;
        Ok(())
    }

    /// Builds `{api}/repos/{owner}/{repo}/issues/{number}{suffix}`.
    fn issue_url(&self, issue: &Issue, suffix: &str) -> Result<String> {
        let (owner, repo) = issue
            .repo()
            .ok_or_else(|| Error::InvalidRepositoryUrl(issue.repository_url.clone()))?;
        Ok(format!(
            "{}/repos/{owner}/{repo}/issues/{}{suffix}",
            self.api_base, issue.number
        ))
    }
}

/// Turns a non-success response into [`Error::Status`].
async fn check(url: &str, resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(Error::Status {
        url: url.to_owned(),
        status,
        body,
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn issue(repository_url: &str) -> Issue {
        serde_json::from_value(serde_json::json!({
            "number": 42,
            "title": "[PORTER] k8s.gcr.io/pause:3.2",
            "repository_url": repository_url,
            "html_url": "https://github.com/acme/porter/issues/42",
            "user": { "login": "octocat" },
        }))
        .unwrap()
    }

    #[test]
    fn issue_urls() {
        let client = GitHubClient::with_api_base("t0ken", "https://ghe.example.com/api/v3/").unwrap();
        let i = issue("https://ghe.example.com/api/v3/repos/acme/porter");
        assert_eq!(
            client.issue_url(&i, "/comments").unwrap(),
            "https://ghe.example.com/api/v3/repos/acme/porter/issues/42/comments"
        );
        assert_eq!(
            client.issue_url(&i, "").unwrap(),
            "https://ghe.example.com/api/v3/repos/acme/porter/issues/42"
        );
    }

    #[test]
    fn bad_repository_url() {
        let client = GitHubClient::new("").unwrap();
        let err = client.issue_url(&issue("porter"), "").unwrap_err();
        assert!(matches!(err, Error::InvalidRepositoryUrl(_)));
    }

    #[test]
    fn token_with_newline_is_rejected() {
        assert!(matches!(
            GitHubClient::new("abc\ndef"),
            Err(Error::InvalidToken)
        ));
    }
}
