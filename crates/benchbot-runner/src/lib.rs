//! Node execution backend and build pipeline for benchbot.
//!
//! Implements the core `Node` and `Runner` traits: `LocalNode` runs
//! commands as local subprocesses with CPU pinning, and `BuildPipeline`
//! drives build, isolation, execution and collection for one job.

pub mod build;
pub mod local;
pub mod pipeline;
pub mod shield;

pub use local::LocalNode;
pub use pipeline::BuildPipeline;
pub use shield::CpuShield;
