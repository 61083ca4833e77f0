//! The pipeline seam between the scheduler and the execution backend.

use async_trait::async_trait;

use crate::job::BenchmarkJob;
use crate::node::Node;
use crate::results::StructuredResult;
use crate::Result;

/// Which build of a job a pipeline run is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildRole {
    /// The build under test.
    Primary,
    /// The comparison baseline.
    Against,
}

impl BuildRole {
    /// File-name suffix for logs and result files.
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildRole::Primary => "primary",
            BuildRole::Against => "against",
        }
    }
}

impl std::fmt::Display for BuildRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one pipeline run produces.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub result: StructuredResult,
    /// Version/environment description captured from the build; `None` when
    /// capture failed (non-fatal).
    pub version: Option<String>,
}

/// Drives one build of one job through build, isolation, execution and
/// collection on a node. Implemented by `benchbot_runner::BuildPipeline`;
/// worker tests substitute a mock.
#[async_trait]
pub trait Runner: Send + Sync {
    async fn run(
        &self,
        node: &dyn Node,
        job: &BenchmarkJob,
        role: BuildRole,
    ) -> Result<PipelineOutput>;
}
