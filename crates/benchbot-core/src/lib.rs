//! Core domain types and traits for the benchbot benchmark scheduler.
//!
//! This crate contains:
//! - Build references and comparison-target parsing
//! - Job submissions and the closed set of job kinds
//! - Tag predicates selecting benchmark entries
//! - Structured benchmark results and the Judge
//! - Report-row generation
//! - The `Node`, `Runner` and `StatusSink` seam traits

pub mod buildref;
pub mod error;
pub mod id;
pub mod job;
pub mod judge;
pub mod node;
pub mod report;
pub mod results;
pub mod runner;
pub mod status;
pub mod submission;
pub mod tags;

pub use buildref::{BuildRef, CompareTarget, Rev};
pub use error::{Error, Result};
pub use id::JobId;
pub use job::{BenchmarkJob, JOB_KINDS, Job, JobKind};
pub use judge::{JudgedResult, Judgement, Verdict, judge};
pub use node::{CommandOutcome, CommandSpec, Node};
pub use results::{BenchKey, Measurement, StructuredResult};
pub use runner::{BuildRole, PipelineOutput, Runner};
pub use status::{JobState, StatusSink};
pub use submission::{JobSubmission, OriginKind, SubmissionOrigin, TriggerArgs};
pub use tags::{TagExpr, TagPredicate, is_valid_predicate};
