//! GitHub API client for statuses, comments and report uploads.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use benchbot_core::{Error, JobState, JobSubmission, OriginKind, StatusSink};
use benchbot_config::GitHubConfig;

const API_ROOT: &str = "https://api.github.com";
const USER_AGENT: &str = "benchbot";
const STATUS_CONTEXT: &str = "benchbot";

/// The GitHub commit-status API rejects longer descriptions.
const MAX_STATUS_DESCRIPTION: usize = 140;

#[derive(Debug, thiserror::Error)]
pub enum GitHubError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("GitHub API error: {0}")]
    Api(String),
    #[error("could not parse response: {0}")]
    Parse(String),
}

/// Authenticated client for the subset of the GitHub API benchbot uses:
/// commit statuses, issue/commit comments, the contents API for report
/// uploads, and repository metadata lookups.
pub struct GitHubClient {
    client: reqwest::Client,
    token: String,
    /// `owner/repo` that receives report artifacts.
    reports_repo: String,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: config.token.clone(),
            reports_repo: config.reports_repo.clone(),
        }
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github+json")
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, GitHubError> {
        let response = builder
            .send()
            .await
            .map_err(|e| GitHubError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(GitHubError::Api(format!("{status}: {text}")));
        }
        Ok(response)
    }

    /// Post a commit status against `sha` in `repo`.
    pub async fn post_commit_status(
        &self,
        repo: &str,
        sha: &str,
        state: JobState,
        description: &str,
        target_url: Option<&str>,
    ) -> Result<(), GitHubError> {
        let url = format!("{API_ROOT}/repos/{repo}/statuses/{sha}");
        let mut body = json!({
            "state": state.as_str(),
            "description": truncate_description(description),
            "context": STATUS_CONTEXT,
        });
        if let Some(target) = target_url {
            body["target_url"] = json!(target);
        }

        debug!(%repo, %sha, state = %state, "Posting commit status");
        self.send(self.request(reqwest::Method::POST, &url).json(&body))
            .await?;
        Ok(())
    }

    /// Comment on a pull request (the issue-comments endpoint).
    pub async fn post_issue_comment(
        &self,
        repo: &str,
        number: u64,
        body: &str,
    ) -> Result<(), GitHubError> {
        let url = format!("{API_ROOT}/repos/{repo}/issues/{number}/comments");
        self.send(
            self.request(reqwest::Method::POST, &url)
                .json(&json!({ "body": body })),
        )
        .await?;
        Ok(())
    }

    /// Comment directly on a commit.
    pub async fn post_commit_comment(
        &self,
        repo: &str,
        sha: &str,
        body: &str,
    ) -> Result<(), GitHubError> {
        let url = format!("{API_ROOT}/repos/{repo}/commits/{sha}/comments");
        self.send(
            self.request(reqwest::Method::POST, &url)
                .json(&json!({ "body": body })),
        )
        .await?;
        Ok(())
    }

    /// Create or update a file in the reports repository via the contents
    /// API, returning the uploaded file's browser URL.
    pub async fn upload_file(
        &self,
        path: &str,
        content: &[u8],
        message: &str,
    ) -> Result<String, GitHubError> {
        let url = format!("{API_ROOT}/repos/{}/contents/{path}", self.reports_repo);
        let mut body = json!({
            "message": message,
            "content": BASE64.encode(content),
        });

        // Updating an existing path requires its current blob sha.
        if let Some(sha) = self.existing_file_sha(&url).await? {
            body["sha"] = json!(sha);
        }

        let response = self
            .send(self.request(reqwest::Method::PUT, &url).json(&body))
            .await?;
        let uploaded: ContentsResponse = response
            .json()
            .await
            .map_err(|e| GitHubError::Parse(e.to_string()))?;
        Ok(uploaded.content.html_url)
    }

    async fn existing_file_sha(&self, url: &str) -> Result<Option<String>, GitHubError> {
        let response = self
            .request(reqwest::Method::GET, url)
            .send()
            .await
            .map_err(|e| GitHubError::Request(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(GitHubError::Api(format!("{status}: {text}")));
        }

        let existing: ExistingContents = response
            .json()
            .await
            .map_err(|e| GitHubError::Parse(e.to_string()))?;
        Ok(Some(existing.sha))
    }

}

/// Repository metadata lookups the webhook handler needs before a job
/// exists. A trait seam so route handlers can be exercised without the
/// live API.
#[async_trait]
pub trait HostApi: Send + Sync {
    /// A repository's default branch name.
    async fn default_branch(&self, repo: &str) -> Result<String, GitHubError>;

    /// Head commit of an open pull request.
    async fn pr_head_sha(&self, repo: &str, number: u64) -> Result<String, GitHubError>;
}

#[async_trait]
impl HostApi for GitHubClient {
    async fn default_branch(&self, repo: &str) -> Result<String, GitHubError> {
        let url = format!("{API_ROOT}/repos/{repo}");
        let response = self.send(self.request(reqwest::Method::GET, &url)).await?;
        let repo: RepoResponse = response
            .json()
            .await
            .map_err(|e| GitHubError::Parse(e.to_string()))?;
        Ok(repo.default_branch)
    }

    async fn pr_head_sha(&self, repo: &str, number: u64) -> Result<String, GitHubError> {
        let url = format!("{API_ROOT}/repos/{repo}/pulls/{number}");
        let response = self.send(self.request(reqwest::Method::GET, &url)).await?;
        let pr: PullResponse = response
            .json()
            .await
            .map_err(|e| GitHubError::Parse(e.to_string()))?;
        Ok(pr.head.sha)
    }
}

#[async_trait]
impl StatusSink for GitHubClient {
    async fn post_status(
        &self,
        submission: &JobSubmission,
        state: JobState,
        description: &str,
        target_url: Option<&str>,
    ) -> benchbot_core::Result<()> {
        let primary = &submission.primary;
        self.post_commit_status(&primary.repo, &primary.sha, state, description, target_url)
            .await
            .map_err(|e| Error::Internal(format!("status delivery failed: {e}")))
    }

    async fn post_comment(&self, submission: &JobSubmission, body: &str) -> benchbot_core::Result<()> {
        let result = match submission.origin.kind {
            OriginKind::PullRequest { number } => {
                self.post_issue_comment(&submission.primary.repo, number, body)
                    .await
            }
            OriginKind::Commit => {
                self.post_commit_comment(&submission.primary.repo, &submission.primary.sha, body)
                    .await
            }
        };
        result.map_err(|e| Error::Internal(format!("comment delivery failed: {e}")))
    }

    async fn upload_report_file(
        &self,
        _submission: &JobSubmission,
        path: &str,
        content: &[u8],
        message: &str,
    ) -> benchbot_core::Result<String> {
        self.upload_file(path, content, message)
            .await
            .map_err(|e| Error::Upload(e.to_string()))
    }
}

fn truncate_description(description: &str) -> &str {
    match description.char_indices().nth(MAX_STATUS_DESCRIPTION) {
        Some((i, _)) => &description[..i],
        None => description,
    }
}

#[derive(Deserialize)]
struct ContentsResponse {
    content: ContentsFile,
}

#[derive(Deserialize)]
struct ContentsFile {
    html_url: String,
}

#[derive(Deserialize)]
struct ExistingContents {
    sha: String,
}

#[derive(Deserialize)]
struct RepoResponse {
    default_branch: String,
}

#[derive(Deserialize)]
struct PullResponse {
    head: PullHead,
}

#[derive(Deserialize)]
struct PullHead {
    sha: String,
}
