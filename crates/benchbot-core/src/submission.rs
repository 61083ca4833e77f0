//! Job submissions: validated, normalized inbound trigger events.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::BuildRef;

/// Where a submission came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OriginKind {
    /// Triggered from a pull request.
    PullRequest { number: u64 },
    /// Triggered directly against a commit.
    Commit,
}

/// Provenance of a submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionOrigin {
    /// Human-facing URL of the PR or commit the trigger came from.
    pub url: String,
    pub kind: OriginKind,
}

/// The trigger arguments extracted from the matched trigger phrase,
/// e.g. `runbenchmarks("linalg", vs = "acme/base@abc")`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerArgs {
    /// The matched trigger phrase (command name).
    pub command: String,
    /// Raw positional argument text, in order.
    pub positional: Vec<String>,
    /// Raw keyword argument text.
    pub keyword: HashMap<String, String>,
}

/// A validated inbound trigger event. Constructed once per event,
/// immutable, and consumed by exactly one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSubmission {
    pub args: TriggerArgs,
    /// The build under test.
    pub primary: BuildRef,
    pub origin: SubmissionOrigin,
}

impl JobSubmission {
    pub fn is_pull_request(&self) -> bool {
        matches!(self.origin.kind, OriginKind::PullRequest { .. })
    }

    pub fn pr_number(&self) -> Option<u64> {
        match self.origin.kind {
            OriginKind::PullRequest { number } => Some(number),
            OriginKind::Commit => None,
        }
    }
}
