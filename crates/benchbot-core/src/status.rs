//! Status and report delivery to the submission's origin.

use async_trait::async_trait;

use crate::submission::JobSubmission;
use crate::Result;

/// Terminal and intermediate job states surfaced to the origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Success,
    Failure,
    Error,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Success => "success",
            JobState::Failure => "failure",
            JobState::Error => "error",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery of statuses, comments and report artifacts to the hosting
/// service. All operations are best-effort from the caller's point of
/// view: workers log failures here and carry on.
///
/// Operations address the submission rather than a job so that rejection
/// replies can be delivered before any job exists.
#[async_trait]
pub trait StatusSink: Send + Sync {
    /// Post a state update against the submission's primary commit.
    async fn post_status(
        &self,
        submission: &JobSubmission,
        state: JobState,
        description: &str,
        target_url: Option<&str>,
    ) -> Result<()>;

    /// Post a Markdown comment to the submission's origin (PR or commit).
    async fn post_comment(&self, submission: &JobSubmission, body: &str) -> Result<()>;

    /// Upload a report artifact, returning its URL.
    async fn upload_report_file(
        &self,
        submission: &JobSubmission,
        path: &str,
        content: &[u8],
        message: &str,
    ) -> Result<String>;
}
