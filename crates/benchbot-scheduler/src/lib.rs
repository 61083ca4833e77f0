//! Job scheduling for benchbot.
//!
//! Owns the shared FIFO job queue, the per-node worker loops and the
//! submission dispatch across the fixed set of job kinds.

pub mod queue;
pub mod server;
pub mod worker;

pub use queue::JobQueue;
pub use server::{Server, SubmitOutcome};
pub use worker::NodeWorker;
