//! Jobs and the closed set of job kinds.

use serde::{Deserialize, Serialize};

use crate::buildref::{BuildRef, CompareTarget};
use crate::id::JobId;
use crate::submission::JobSubmission;
use crate::tags::TagPredicate;
use crate::{Error, Result};

/// Trigger command accepted by the benchmark job kind.
pub const BENCHMARK_COMMAND: &str = "runbenchmarks";

/// A benchmark comparison job: runs one or two builds and, when a
/// comparison build is present, judges the two results against each other.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkJob {
    pub id: JobId,
    pub submission: JobSubmission,
    /// Selects which benchmark entries run.
    pub predicate: TagPredicate,
    /// Comparison baseline. `Some` activates the dual pipeline and the
    /// Judge; `None` runs single-build.
    pub against: Option<BuildRef>,
}

impl BenchmarkJob {
    /// Build a job from a validated submission. Fails with
    /// `InvalidSubmission` on a malformed predicate or comparison target;
    /// no job exists in that case.
    ///
    /// `default_branch` pins the revision for the bare `owner/repo`
    /// comparison form; callers with host-API access resolve it up front,
    /// and `None` falls back to the remote `HEAD`.
    pub fn from_submission(
        submission: &JobSubmission,
        default_branch: Option<&str>,
    ) -> Result<Self> {
        let source = submission
            .args
            .positional
            .first()
            .map(String::as_str)
            .unwrap_or("ALL");
        let predicate = TagPredicate::parse(source)?;

        let against = match submission.args.keyword.get("vs") {
            Some(spec) => {
                let target = CompareTarget::parse(spec, &submission.primary.repo)?;
                Some(target.into_build_ref(default_branch))
            }
            None => None,
        };

        Ok(Self {
            id: JobId::new(),
            submission: submission.clone(),
            predicate,
            against,
        })
    }

    /// One-line human description used in log lines and failure messages.
    pub fn summary(&self) -> String {
        match &self.against {
            Some(against) => format!(
                "benchmarks for {} vs {} (predicate: {})",
                self.submission.primary, against, self.predicate
            ),
            None => format!(
                "benchmarks for {} (predicate: {})",
                self.submission.primary, self.predicate
            ),
        }
    }

    pub fn is_comparison(&self) -> bool {
        self.against.is_some()
    }
}

/// A unit of work created from a validated submission. Closed set: the
/// server iterates `JOB_KINDS` rather than reflecting over types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Job {
    Benchmark(BenchmarkJob),
}

impl Job {
    pub fn id(&self) -> JobId {
        match self {
            Job::Benchmark(job) => job.id,
        }
    }

    pub fn submission(&self) -> &JobSubmission {
        match self {
            Job::Benchmark(job) => &job.submission,
        }
    }

    pub fn summary(&self) -> String {
        match self {
            Job::Benchmark(job) => job.summary(),
        }
    }
}

/// Descriptor of one job kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Benchmark,
}

/// Every job kind the server knows. Submission dispatch iterates this
/// fixed set; a submission may be accepted by more than one kind.
pub const JOB_KINDS: &[JobKind] = &[JobKind::Benchmark];

impl JobKind {
    pub fn name(&self) -> &'static str {
        match self {
            JobKind::Benchmark => "benchmark",
        }
    }

    /// Whether this kind recognizes the submission's trigger command.
    pub fn accepts(&self, submission: &JobSubmission) -> bool {
        match self {
            JobKind::Benchmark => submission.args.command == BENCHMARK_COMMAND,
        }
    }

    /// Construct the job for an accepted submission.
    pub fn construct(
        &self,
        submission: &JobSubmission,
        default_branch: Option<&str>,
    ) -> Result<Job> {
        if !self.accepts(submission) {
            return Err(Error::InvalidSubmission(format!(
                "command {:?} is not a {} trigger",
                submission.args.command,
                self.name()
            )));
        }
        match self {
            JobKind::Benchmark => Ok(Job::Benchmark(BenchmarkJob::from_submission(
                submission,
                default_branch,
            )?)),
        }
    }
}
