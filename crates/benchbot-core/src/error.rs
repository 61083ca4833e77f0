//! Error types for benchbot.

use std::path::PathBuf;
use thiserror::Error;

/// Job-scoped and infrastructure errors.
///
/// `Build`, `Execution`, `NoBenchmarks` and `ResultRead` are fatal to the
/// job that raised them; `Upload` degrades reporting but never fails a job.
/// `InvalidSubmission` is rejected before a job exists.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid submission: {0}")]
    InvalidSubmission(String),

    #[error("build failed: {0}")]
    Build(String),

    #[error("execution failed: {message}")]
    Execution {
        message: String,
        /// Harness output files left on the node, when execution got far
        /// enough to produce them. Workers upload these as the job's logs.
        logs: Vec<PathBuf>,
    },

    #[error("no benchmarks were executed: {0}")]
    NoBenchmarks(String),

    #[error("could not read results: {0}")]
    ResultRead(String),

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
