//! GitHub webhook endpoint.
//!
//! Classifies incoming events, extracts trigger phrases aimed at the bot
//! account and hands validated submissions to the scheduler. Response
//! codes: 400 for a structurally invalid trigger (or one no job kind
//! accepts), 204 for no-op events, 202 once at least one job kind
//! accepted the submission.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use tracing::{debug, info, warn};

use benchbot_core::{BuildRef, CompareTarget, JobSubmission, OriginKind, SubmissionOrigin};
use benchbot_scheduler::SubmitOutcome;

use crate::AppState;
use crate::error::ApiError;
use crate::trigger::parse_trigger;

pub fn router() -> Router<AppState> {
    Router::new().route("/github", post(github_webhook))
}

/// Handle GitHub webhook events.
async fn github_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let signature = headers
        .get("X-Hub-Signature-256")
        .and_then(|v| v.to_str().ok());
    if !verify_github_signature(&state.webhook_secret, &body, signature) {
        warn!("Invalid webhook signature");
        return Err(ApiError::Unauthorized("invalid webhook signature".into()));
    }

    let event_type = headers
        .get("X-GitHub-Event")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");

    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid JSON: {e}")))?;

    info!(event = %event_type, "Received GitHub webhook");

    let submission = match event_type {
        "issue_comment" => issue_comment_submission(&state, &payload).await?,
        "commit_comment" => commit_comment_submission(&state, &payload)?,
        "pull_request" => pull_request_submission(&state, &payload)?,
        "ping" => {
            info!("Ping event received, webhook is configured correctly");
            None
        }
        _ => {
            debug!(event = %event_type, "Unhandled event type");
            None
        }
    };

    let Some(submission) = submission else {
        return Ok(StatusCode::NO_CONTENT);
    };
    dispatch(&state, submission).await
}

/// Hand the submission to the scheduler and translate the outcome.
/// Every rejected submission gets a visible reply at its origin.
async fn dispatch(state: &AppState, submission: JobSubmission) -> Result<StatusCode, ApiError> {
    let default_branch = resolve_default_branch(state, &submission).await;
    match state
        .server
        .handle_submission(&submission, default_branch.as_deref())?
    {
        SubmitOutcome::Accepted(count) => {
            info!(jobs = count, origin = %submission.origin.url, "Submission accepted");
            Ok(StatusCode::ACCEPTED)
        }
        SubmitOutcome::Invalid(reason) => Err(reject(state, &submission, reason).await),
        SubmitOutcome::NoMatch => {
            let reason = format!(
                "no job kind accepts the command {:?}",
                submission.args.command
            );
            Err(reject(state, &submission, reason).await)
        }
    }
}

async fn reject(state: &AppState, submission: &JobSubmission, reason: String) -> ApiError {
    let reply = format!("Invalid submission: {reason}");
    if let Err(e) = state.sink.post_comment(submission, &reply).await {
        warn!(error = %e, "Could not deliver rejection reply");
    }
    ApiError::BadRequest(reason)
}

/// The bare `owner/repo` comparison form names no revision; resolve that
/// repository's default branch up front so job construction can pin it.
/// A failed lookup degrades to the remote `HEAD`.
async fn resolve_default_branch(state: &AppState, submission: &JobSubmission) -> Option<String> {
    let spec = submission.args.keyword.get("vs")?;
    let target = CompareTarget::parse(spec, &submission.primary.repo).ok()?;
    if !target.needs_default_branch() {
        return None;
    }
    match state.host.default_branch(&target.repo).await {
        Ok(branch) => Some(branch),
        Err(e) => {
            warn!(repo = %target.repo, error = %e,
                  "Default-branch lookup failed, falling back to remote HEAD");
            None
        }
    }
}

/// A comment on an issue or pull request. Triggers are only valid on pull
/// requests; the PR head commit is resolved through the host API since
/// the comment payload does not carry it.
async fn issue_comment_submission(
    state: &AppState,
    payload: &Value,
) -> Result<Option<JobSubmission>, ApiError> {
    if payload.get("action").and_then(Value::as_str) != Some("created") {
        return Ok(None);
    }
    let Some(args) = payload
        .get("comment")
        .and_then(|c| c.get("body"))
        .and_then(Value::as_str)
        .and_then(|body| parse_trigger(body, &state.bot_account))
    else {
        return Ok(None);
    };

    let issue = payload
        .get("issue")
        .ok_or_else(|| ApiError::BadRequest("malformed payload: no issue".into()))?;
    if issue.get("pull_request").is_none() {
        return Err(ApiError::BadRequest(
            "benchmark triggers are only valid on pull requests".into(),
        ));
    }

    let repo = repo_full_name(payload)?;
    let number = issue
        .get("number")
        .and_then(Value::as_u64)
        .ok_or_else(|| ApiError::BadRequest("malformed payload: no issue number".into()))?;
    let sha = state.host.pr_head_sha(repo, number).await?;
    let url = payload
        .get("comment")
        .and_then(|c| c.get("html_url"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Ok(Some(JobSubmission {
        args,
        primary: BuildRef::new(repo, sha),
        origin: SubmissionOrigin {
            url,
            kind: OriginKind::PullRequest { number },
        },
    }))
}

/// A comment directly on a commit; benchmarks that commit.
fn commit_comment_submission(
    state: &AppState,
    payload: &Value,
) -> Result<Option<JobSubmission>, ApiError> {
    if payload.get("action").and_then(Value::as_str) != Some("created") {
        return Ok(None);
    }
    let comment = payload
        .get("comment")
        .ok_or_else(|| ApiError::BadRequest("malformed payload: no comment".into()))?;
    let Some(args) = comment
        .get("body")
        .and_then(Value::as_str)
        .and_then(|body| parse_trigger(body, &state.bot_account))
    else {
        return Ok(None);
    };

    let repo = repo_full_name(payload)?;
    let sha = comment
        .get("commit_id")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::BadRequest("malformed payload: no commit id".into()))?;
    let url = comment
        .get("html_url")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Ok(Some(JobSubmission {
        args,
        primary: BuildRef::new(repo, sha),
        origin: SubmissionOrigin {
            url,
            kind: OriginKind::Commit,
        },
    }))
}

/// A trigger phrase embedded in the body of a newly opened pull request.
fn pull_request_submission(
    state: &AppState,
    payload: &Value,
) -> Result<Option<JobSubmission>, ApiError> {
    if payload.get("action").and_then(Value::as_str) != Some("opened") {
        return Ok(None);
    }
    let pr = payload
        .get("pull_request")
        .ok_or_else(|| ApiError::BadRequest("malformed payload: no pull request".into()))?;
    let Some(args) = pr
        .get("body")
        .and_then(Value::as_str)
        .and_then(|body| parse_trigger(body, &state.bot_account))
    else {
        return Ok(None);
    };

    let repo = repo_full_name(payload)?;
    let number = pr
        .get("number")
        .and_then(Value::as_u64)
        .ok_or_else(|| ApiError::BadRequest("malformed payload: no PR number".into()))?;
    let sha = pr
        .get("head")
        .and_then(|h| h.get("sha"))
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::BadRequest("malformed payload: no head sha".into()))?;
    let url = pr
        .get("html_url")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Ok(Some(JobSubmission {
        args,
        primary: BuildRef::new(repo, sha),
        origin: SubmissionOrigin {
            url,
            kind: OriginKind::PullRequest { number },
        },
    }))
}

fn repo_full_name(payload: &Value) -> Result<&str, ApiError> {
    payload
        .get("repository")
        .and_then(|r| r.get("full_name"))
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::BadRequest("malformed payload: no repository".into()))
}

/// Verify GitHub webhook signature.
fn verify_github_signature(secret: &str, body: &[u8], signature: Option<&str>) -> bool {
    let Some(signature) = signature else {
        return false;
    };

    // Signature format: "sha256=<hex>"
    let Some(sig_hex) = signature.strip_prefix("sha256=") else {
        return false;
    };

    let Ok(sig_bytes) = hex::decode(sig_hex) else {
        return false;
    };

    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC can take any size key");
    mac.update(body);

    mac.verify_slice(&sig_bytes).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use benchbot_core::{JobState, Result as CoreResult, StatusSink};
    use benchbot_scheduler::Server;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    use crate::github::{GitHubError, HostApi};

    struct MockHost;

    #[async_trait]
    impl HostApi for MockHost {
        async fn default_branch(&self, _repo: &str) -> std::result::Result<String, GitHubError> {
            Ok("main".to_string())
        }

        async fn pr_head_sha(
            &self,
            _repo: &str,
            _number: u64,
        ) -> std::result::Result<String, GitHubError> {
            Ok("feedface".to_string())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        comments: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl StatusSink for RecordingSink {
        async fn post_status(
            &self,
            _submission: &JobSubmission,
            _state: JobState,
            _description: &str,
            _target_url: Option<&str>,
        ) -> CoreResult<()> {
            Ok(())
        }

        async fn post_comment(&self, _submission: &JobSubmission, body: &str) -> CoreResult<()> {
            self.comments.lock().unwrap().push(body.to_string());
            Ok(())
        }

        async fn upload_report_file(
            &self,
            _submission: &JobSubmission,
            _path: &str,
            _content: &[u8],
            _message: &str,
        ) -> CoreResult<String> {
            Ok("https://example.test/report".to_string())
        }
    }

    const SECRET: &str = "hunter2";

    fn app_state(sink: Arc<RecordingSink>) -> AppState {
        AppState::new(
            Arc::new(Server::new()),
            sink,
            Arc::new(MockHost),
            SECRET,
            "benchbot",
        )
    }

    fn signed_headers(event: &str, body: &[u8]) -> HeaderMap {
        let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(body);
        let signature = format!("sha256={}", hex::encode(mac.finalize().into_bytes()));

        let mut headers = HeaderMap::new();
        headers.insert("X-GitHub-Event", event.parse().unwrap());
        headers.insert("X-Hub-Signature-256", signature.parse().unwrap());
        headers
    }

    fn pr_comment_payload(comment_body: &str, is_pr: bool) -> Vec<u8> {
        let mut issue = json!({ "number": 42 });
        if is_pr {
            issue["pull_request"] = json!({ "url": "https://api.example.test/pulls/42" });
        }
        serde_json::to_vec(&json!({
            "action": "created",
            "issue": issue,
            "comment": {
                "body": comment_body,
                "html_url": "https://example.test/acme/base/pull/42#issuecomment-1",
            },
            "repository": { "full_name": "acme/base" },
        }))
        .unwrap()
    }

    async fn post(state: AppState, event: &str, body: Vec<u8>) -> Result<StatusCode, ApiError> {
        let headers = signed_headers(event, &body);
        github_webhook(State(state), headers, Bytes::from(body)).await
    }

    #[tokio::test]
    async fn test_pr_comment_trigger_is_accepted() {
        let sink = Arc::new(RecordingSink::default());
        let state = app_state(sink);
        let server = state.server.clone();

        let body = pr_comment_payload("@benchbot runbenchmarks(ALL)", true);
        let status = post(state, "issue_comment", body).await.unwrap();

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(server.queue().len().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_trigger_on_plain_issue_is_rejected() {
        let state = app_state(Arc::new(RecordingSink::default()));
        let body = pr_comment_payload("@benchbot runbenchmarks(ALL)", false);
        let result = post(state, "issue_comment", body).await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_comment_without_trigger_is_a_noop() {
        let state = app_state(Arc::new(RecordingSink::default()));
        let server = state.server.clone();

        let body = pr_comment_payload("looks good to me", true);
        let status = post(state, "issue_comment", body).await.unwrap();

        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(server.queue().is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_edited_comment_is_a_noop() {
        let state = app_state(Arc::new(RecordingSink::default()));
        let body = serde_json::to_vec(&json!({
            "action": "edited",
            "issue": { "number": 1, "pull_request": {} },
            "comment": { "body": "@benchbot runbenchmarks(ALL)" },
            "repository": { "full_name": "acme/base" },
        }))
        .unwrap();
        let status = post(state, "issue_comment", body).await.unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_bad_signature_is_unauthorized() {
        let state = app_state(Arc::new(RecordingSink::default()));
        let body = pr_comment_payload("@benchbot runbenchmarks(ALL)", true);

        let mut headers = HeaderMap::new();
        headers.insert("X-GitHub-Event", "issue_comment".parse().unwrap());
        headers.insert("X-Hub-Signature-256", "sha256=deadbeef".parse().unwrap());

        let result = github_webhook(State(state), headers, Bytes::from(body)).await;
        assert!(matches!(result, Err(ApiError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_invalid_predicate_gets_a_rejection_reply() {
        let sink = Arc::new(RecordingSink::default());
        let state = app_state(sink.clone());
        let server = state.server.clone();

        let body = pr_comment_payload("@benchbot runbenchmarks(1 + 2)", true);
        let result = post(state, "issue_comment", body).await;

        assert!(matches!(result, Err(ApiError::BadRequest(_))));
        assert!(server.queue().is_empty().unwrap());
        let comments = sink.comments.lock().unwrap();
        assert_eq!(comments.len(), 1);
        assert!(comments[0].starts_with("Invalid submission:"));
    }

    #[tokio::test]
    async fn test_unrecognized_command_gets_a_rejection_reply() {
        let sink = Arc::new(RecordingSink::default());
        let state = app_state(sink.clone());
        let server = state.server.clone();

        let body = pr_comment_payload("@benchbot rundaily(ALL)", true);
        let result = post(state, "issue_comment", body).await;

        assert!(matches!(result, Err(ApiError::BadRequest(_))));
        assert!(server.queue().is_empty().unwrap());
        let comments = sink.comments.lock().unwrap();
        assert_eq!(comments.len(), 1);
        assert!(comments[0].starts_with("Invalid submission:"));
    }

    #[tokio::test]
    async fn test_bare_repo_comparison_resolves_default_branch() {
        let state = app_state(Arc::new(RecordingSink::default()));
        let server = state.server.clone();

        let body = pr_comment_payload(
            "@benchbot runbenchmarks(ALL, vs = \"acme/other\")",
            true,
        );
        let status = post(state, "issue_comment", body).await.unwrap();
        assert_eq!(status, StatusCode::ACCEPTED);

        // MockHost reports "main" as the default branch; the job's
        // comparison build is pinned to it rather than a HEAD fallback.
        let benchbot_core::Job::Benchmark(job) =
            server.queue().pop_front().unwrap().unwrap();
        let against = job.against.unwrap();
        assert_eq!(against.repo, "acme/other");
        assert_eq!(against.sha, "main");
    }

    #[tokio::test]
    async fn test_commit_comment_trigger_targets_the_commit() {
        let state = app_state(Arc::new(RecordingSink::default()));
        let server = state.server.clone();

        let body = serde_json::to_vec(&json!({
            "action": "created",
            "comment": {
                "body": "@benchbot runbenchmarks(\"linalg\")",
                "commit_id": "cafebabe",
                "html_url": "https://example.test/acme/base/commit/cafebabe#commitcomment-9",
            },
            "repository": { "full_name": "acme/base" },
        }))
        .unwrap();
        let status = post(state, "commit_comment", body).await.unwrap();

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(server.queue().len().unwrap(), 1);
    }
}
