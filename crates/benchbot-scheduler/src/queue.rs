//! The shared job queue.

use std::collections::VecDeque;
use std::sync::Mutex;

use benchbot_core::{Error, Job, Result};

/// An ordered, thread-safe FIFO of pending jobs shared by every producer
/// and every node worker.
///
/// In-memory only: pending jobs do not survive a restart. No priority, no
/// deduplication, no capacity bound. Each mutation is a single atomic
/// push or pop under the lock, which is never held across an await point,
/// so a producer never waits on job completion and no two workers can
/// observe the same queue slot.
#[derive(Debug, Default)]
pub struct JobQueue {
    inner: Mutex<VecDeque<Job>>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a job in arrival order.
    pub fn push(&self, job: Job) -> Result<()> {
        self.lock()?.push_back(job);
        Ok(())
    }

    /// Remove and return the earliest job, or `None` without blocking.
    pub fn pop_front(&self) -> Result<Option<Job>> {
        Ok(self.lock()?.pop_front())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.is_empty())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, VecDeque<Job>>> {
        // A poisoned lock means a producer or worker panicked mid-mutation;
        // that is a dispatch-loop fault, not a job failure.
        self.inner
            .lock()
            .map_err(|_| Error::Internal("job queue lock poisoned".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use benchbot_core::{
        BenchmarkJob, BuildRef, JobId, JobSubmission, OriginKind, SubmissionOrigin, TagPredicate,
        TriggerArgs,
    };
    use std::collections::HashMap;
    use std::sync::Arc;

    fn job() -> Job {
        Job::Benchmark(BenchmarkJob {
            id: JobId::new(),
            submission: JobSubmission {
                args: TriggerArgs {
                    command: "runbenchmarks".to_string(),
                    positional: vec!["ALL".to_string()],
                    keyword: HashMap::new(),
                },
                primary: BuildRef::new("acme/base", "abc123"),
                origin: SubmissionOrigin {
                    url: "https://example.test/acme/base/commit/abc123".to_string(),
                    kind: OriginKind::Commit,
                },
            },
            predicate: TagPredicate::parse("ALL").unwrap(),
            against: None,
        })
    }

    #[test]
    fn test_fifo_order() {
        let queue = JobQueue::new();
        let jobs: Vec<Job> = (0..3).map(|_| job()).collect();
        let ids: Vec<JobId> = jobs.iter().map(Job::id).collect();

        for j in jobs {
            queue.push(j).unwrap();
        }

        let popped: Vec<JobId> = std::iter::from_fn(|| queue.pop_front().unwrap())
            .map(|j| j.id())
            .collect();
        assert_eq!(popped, ids);
        assert!(queue.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_no_job_is_popped_twice() {
        let queue = Arc::new(JobQueue::new());
        let mut ids = Vec::new();
        for _ in 0..200 {
            let j = job();
            ids.push(j.id());
            queue.push(j).unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..8 {
            let queue = queue.clone();
            handles.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(j) = queue.pop_front().unwrap() {
                    seen.push(j.id());
                    tokio::task::yield_now().await;
                }
                seen
            }));
        }

        let mut counts: HashMap<JobId, usize> = HashMap::new();
        for handle in handles {
            for id in handle.await.unwrap() {
                *counts.entry(id).or_default() += 1;
            }
        }

        assert_eq!(counts.len(), ids.len());
        assert!(counts.values().all(|&n| n == 1));
    }
}
