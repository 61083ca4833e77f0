//! Per-node worker loop.

use chrono::Utc;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

use benchbot_core::{
    BenchmarkJob, BuildRole, Error, Job, JobId, JobState, JobSubmission, Node, Result, Runner,
    StatusSink, judge, report,
};

use crate::queue::JobQueue;

/// Outcome of one worker-loop iteration. `Fatal` is the only variant that
/// stops the loop; job failures are absorbed.
#[derive(Debug)]
enum Iteration {
    Idle,
    Completed,
    JobFailed,
    Fatal(Error),
}

/// Drives one worker node through an unbounded sequence of jobs.
///
/// A job-scoped failure is caught, reported as a terminal `error` status
/// plus a comment, and the loop continues. A fault in the loop's own
/// control logic terminates this worker's task only; other nodes keep
/// servicing the queue.
pub struct NodeWorker {
    node: Arc<dyn Node>,
    queue: Arc<JobQueue>,
    runner: Arc<dyn Runner>,
    sink: Arc<dyn StatusSink>,
    poll_interval: Duration,
    admin_mention: Option<String>,
}

impl NodeWorker {
    pub fn new(
        node: Arc<dyn Node>,
        queue: Arc<JobQueue>,
        runner: Arc<dyn Runner>,
        sink: Arc<dyn StatusSink>,
        poll_interval: Duration,
        admin_mention: Option<String>,
    ) -> Self {
        Self {
            node,
            queue,
            runner,
            sink,
            poll_interval,
            admin_mention,
        }
    }

    /// Run the worker loop until a dispatch-loop fault occurs.
    pub async fn run(&self) -> Result<()> {
        info!(node = %self.node.name(), "Starting node worker");

        loop {
            match self.run_once().await {
                Iteration::Idle | Iteration::Completed | Iteration::JobFailed => {}
                Iteration::Fatal(e) => {
                    error!(node = %self.node.name(), error = %e,
                           "Worker loop fault, stopping this worker");
                    return Err(e);
                }
            }
            // Fixed cadence on every path bounds the idle-poll cost.
            sleep(self.poll_interval).await;
        }
    }

    async fn run_once(&self) -> Iteration {
        let job = match self.queue.pop_front() {
            Ok(Some(job)) => job,
            Ok(None) => return Iteration::Idle,
            Err(e) => return Iteration::Fatal(e),
        };

        info!(node = %self.node.name(), job = %job.id(), "Picked up job");
        self.try_status(
            job.id(),
            job.submission(),
            JobState::Pending,
            &format!("benchmarks running on {}", self.node.name()),
            None,
        )
        .await;

        match self.process(&job).await {
            Ok(()) => {
                info!(node = %self.node.name(), job = %job.id(), "Job complete");
                Iteration::Completed
            }
            Err(e) => {
                warn!(node = %self.node.name(), job = %job.id(), error = %e, "Job failed");
                self.report_failure(&job, &e).await;
                Iteration::JobFailed
            }
        }
    }

    async fn process(&self, job: &Job) -> Result<()> {
        self.node.ensure_workdir().await?;
        match job {
            Job::Benchmark(benchmark) => self.run_benchmark(benchmark.clone()).await,
        }
    }

    async fn run_benchmark(&self, mut job: BenchmarkJob) -> Result<()> {
        let primary = self
            .runner
            .run(self.node.as_ref(), &job, BuildRole::Primary)
            .await?;
        if let Some(version) = &primary.version {
            job.submission.primary.set_version(version);
        }

        if job.against.is_some() {
            let against = self
                .runner
                .run(self.node.as_ref(), &job, BuildRole::Against)
                .await?;
            if let (Some(version), Some(build)) = (&against.version, job.against.as_mut()) {
                build.set_version(version);
            }

            let judged = judge(&primary.result, &against.result);
            let data = report::comparison_data(&primary.result, &against.result, &judged)
                .map_err(|e| Error::Internal(format!("could not serialize results: {e}")))?;
            let markdown = report::comparison_report(&job, &judged);
            let url = self.upload_artifacts(&job, &data, &markdown).await;

            let (state, description) = if judged.has_regressions() {
                (JobState::Failure, "possible performance regressions were detected")
            } else {
                (JobState::Success, "no performance regressions were detected")
            };
            self.finish(&job, state, description, url).await;
        } else {
            let data = report::single_data(&primary.result)
                .map_err(|e| Error::Internal(format!("could not serialize results: {e}")))?;
            let markdown = report::single_report(&job, &primary.result);
            let url = self.upload_artifacts(&job, &data, &markdown).await;
            self.finish(&job, JobState::Success, "benchmarks complete", url)
                .await;
        }
        Ok(())
    }

    /// Upload the data and report artifacts; a failed upload degrades to
    /// "no URL" and never fails the job.
    async fn upload_artifacts(
        &self,
        job: &BenchmarkJob,
        data: &str,
        markdown: &str,
    ) -> Option<String> {
        let dir = artifact_dir(job.id);

        if let Err(e) = self
            .sink
            .upload_report_file(
                &job.submission,
                &format!("{dir}/data.json"),
                data.as_bytes(),
                "Add benchmark result data",
            )
            .await
        {
            warn!(job = %job.id, error = %e, "Data artifact upload failed");
        }

        match self
            .sink
            .upload_report_file(
                &job.submission,
                &format!("{dir}/report.md"),
                markdown.as_bytes(),
                "Add benchmark report",
            )
            .await
        {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(job = %job.id, error = %e, "Report upload failed");
                None
            }
        }
    }

    /// Emit the terminal state plus a comment pointing at the report (or
    /// noting its absence, so "completed with missing report" stays
    /// distinguishable from an execution failure).
    async fn finish(
        &self,
        job: &BenchmarkJob,
        state: JobState,
        description: &str,
        report_url: Option<String>,
    ) {
        self.try_status(job.id, &job.submission, state, description, report_url.as_deref())
            .await;

        let body = match &report_url {
            Some(url) => format!("Benchmark job complete: {description}.\n\nFull report: {url}"),
            None => format!(
                "Benchmark job complete: {description}.\n\nThe report could not be uploaded."
            ),
        };
        self.try_comment(job.id, &job.submission, &body).await;
    }

    /// Compose and deliver the terminal failure message: job + origin, the
    /// raw error, a logs URL or an explicit note, and the escalation tag.
    async fn report_failure(&self, job: &Job, error: &Error) {
        let mut message = format!(
            "{} (from {}) errored on node {}:\n\n```\n{error}\n```",
            job.summary(),
            job.submission().origin.url,
            self.node.name(),
        );

        // Prefer the harness output files left on the node over the
        // composite message, so the linked logs carry real diagnostics.
        let logs_body = match self.harness_logs(error).await {
            Some(output) => output,
            None => message.clone(),
        };
        let logs_url = self
            .sink
            .upload_report_file(
                job.submission(),
                &format!("{}/logs.txt", artifact_dir(job.id())),
                logs_body.as_bytes(),
                "Add failure logs",
            )
            .await
            .ok();

        match &logs_url {
            Some(url) => {
                let _ = write!(message, "\n\nLogs: {url}");
            }
            None => message.push_str("\n\nLogs could not be uploaded."),
        }
        if let Some(mention) = &self.admin_mention {
            let _ = write!(message, "\n\ncc {mention}");
        }

        self.try_status(
            job.id(),
            job.submission(),
            JobState::Error,
            "benchmark job errored",
            logs_url.as_deref(),
        )
        .await;
        self.try_comment(job.id(), job.submission(), &message).await;
    }

    /// Read the harness output files an execution error points at.
    /// Unreadable files are skipped; `None` when nothing could be read.
    async fn harness_logs(&self, error: &Error) -> Option<String> {
        let Error::Execution { logs, .. } = error else {
            return None;
        };

        let mut combined = String::new();
        for path in logs {
            match self.node.read_file(path).await {
                Ok(bytes) => {
                    let _ = writeln!(combined, "==> {} <==", path.display());
                    combined.push_str(&String::from_utf8_lossy(&bytes));
                    combined.push('\n');
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Could not read harness log")
                }
            }
        }
        (!combined.is_empty()).then_some(combined)
    }

    async fn try_status(
        &self,
        id: JobId,
        submission: &JobSubmission,
        state: JobState,
        description: &str,
        target_url: Option<&str>,
    ) {
        if let Err(e) = self
            .sink
            .post_status(submission, state, description, target_url)
            .await
        {
            warn!(job = %id, %state, error = %e, "Status update failed");
        }
    }

    async fn try_comment(&self, id: JobId, submission: &JobSubmission, body: &str) {
        if let Err(e) = self.sink.post_comment(submission, body).await {
            warn!(job = %id, error = %e, "Comment delivery failed");
        }
    }
}

/// Artifacts of one job share a dated directory in the reports repository.
fn artifact_dir(id: JobId) -> String {
    format!("by_date/{}/{}", Utc::now().format("%Y-%m"), id.short())
}
