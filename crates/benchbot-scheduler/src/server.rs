//! Submission dispatch and worker lifecycle.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

use benchbot_core::{Error, JOB_KINDS, JobSubmission, Node, Result, Runner, StatusSink};

use crate::queue::JobQueue;
use crate::worker::NodeWorker;

/// What became of a submission handed to the server.
#[derive(Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Jobs were enqueued; holds the count.
    Accepted(usize),
    /// A kind recognized the trigger but the submission was malformed.
    /// Holds the human-readable reason for the reply comment.
    Invalid(String),
    /// No job kind recognized the trigger command.
    NoMatch,
}

/// The scheduling core: accepts validated submissions, fans them out to
/// the job kinds, and owns the shared queue the workers drain.
pub struct Server {
    queue: Arc<JobQueue>,
}

impl Server {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(JobQueue::new()),
        }
    }

    pub fn queue(&self) -> Arc<JobQueue> {
        self.queue.clone()
    }

    /// Offer a submission to every job kind. All accepting kinds construct
    /// their job before anything is enqueued, so a malformed submission
    /// never enqueues a partial set. `default_branch` carries the resolved
    /// default branch for a bare `owner/repo` comparison target, when the
    /// caller looked it up.
    pub fn handle_submission(
        &self,
        submission: &JobSubmission,
        default_branch: Option<&str>,
    ) -> Result<SubmitOutcome> {
        let mut jobs = Vec::new();
        for kind in JOB_KINDS {
            if !kind.accepts(submission) {
                continue;
            }
            match kind.construct(submission, default_branch) {
                Ok(job) => jobs.push(job),
                Err(Error::InvalidSubmission(reason)) => {
                    return Ok(SubmitOutcome::Invalid(reason));
                }
                Err(other) => return Err(other),
            }
        }

        if jobs.is_empty() {
            return Ok(SubmitOutcome::NoMatch);
        }

        let count = jobs.len();
        for job in jobs {
            info!(job = %job.id(), summary = %job.summary(), "Enqueueing job");
            self.queue.push(job)?;
        }
        Ok(SubmitOutcome::Accepted(count))
    }

    /// Spawn one worker task per node, all draining the shared queue. A
    /// worker terminating on a loop fault takes down its task only.
    pub fn spawn_workers(
        &self,
        nodes: Vec<Arc<dyn Node>>,
        runner: Arc<dyn Runner>,
        sink: Arc<dyn StatusSink>,
        poll_interval: Duration,
        admin_mention: Option<String>,
    ) -> Vec<JoinHandle<Result<()>>> {
        nodes
            .into_iter()
            .map(|node| {
                let worker = NodeWorker::new(
                    node,
                    self.queue.clone(),
                    runner.clone(),
                    sink.clone(),
                    poll_interval,
                    admin_mention.clone(),
                );
                tokio::spawn(async move { worker.run().await })
            })
            .collect()
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use benchbot_core::{BuildRef, OriginKind, SubmissionOrigin, TriggerArgs};
    use std::collections::HashMap;

    fn submission(command: &str, predicate: Option<&str>) -> JobSubmission {
        JobSubmission {
            args: TriggerArgs {
                command: command.to_string(),
                positional: predicate.map(String::from).into_iter().collect(),
                keyword: HashMap::new(),
            },
            primary: BuildRef::new("acme/base", "abc123"),
            origin: SubmissionOrigin {
                url: "https://example.test/acme/base/pull/3".to_string(),
                kind: OriginKind::PullRequest { number: 3 },
            },
        }
    }

    #[test]
    fn test_accepted_submission_is_enqueued() {
        let server = Server::new();
        let outcome = server
            .handle_submission(&submission("runbenchmarks", None), None)
            .unwrap();
        assert_eq!(outcome, SubmitOutcome::Accepted(1));
        assert_eq!(server.queue().len().unwrap(), 1);
    }

    #[test]
    fn test_unknown_command_matches_nothing() {
        let server = Server::new();
        let outcome = server.handle_submission(&submission("deploy", None), None).unwrap();
        assert_eq!(outcome, SubmitOutcome::NoMatch);
        assert!(server.queue().is_empty().unwrap());
    }

    #[test]
    fn test_malformed_predicate_enqueues_nothing() {
        let server = Server::new();
        let outcome = server
            .handle_submission(&submission("runbenchmarks", Some("&&")), None)
            .unwrap();
        assert!(matches!(outcome, SubmitOutcome::Invalid(_)));
        assert!(server.queue().is_empty().unwrap());
    }
}
