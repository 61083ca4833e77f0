//! Worker-node abstraction.
//!
//! A `Node` is one machine of the fixed worker pool. Backends live in
//! `benchbot-runner`; the trait stays here so the scheduler and tests can
//! depend on it without pulling in process execution.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::Result;

/// Specification of one command to run on a node.
#[derive(Debug, Clone, Default)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    /// Working directory; defaults to the node workdir.
    pub cwd: Option<PathBuf>,
    /// Redirect stdout to this file instead of capturing it.
    pub stdout: Option<PathBuf>,
    /// Redirect stderr to this file instead of capturing it.
    pub stderr: Option<PathBuf>,
    /// Pin the process to this CPU for the duration of the run.
    pub pin_cpu: Option<u32>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn redirect(mut self, stdout: impl Into<PathBuf>, stderr: impl Into<PathBuf>) -> Self {
        self.stdout = Some(stdout.into());
        self.stderr = Some(stderr.into());
        self
    }

    pub fn pin_cpu(mut self, cpu: u32) -> Self {
        self.pin_cpu = Some(cpu);
        self
    }
}

/// Outcome of a completed command.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub exit_code: Option<i32>,
    /// Captured stdout; empty when redirected to a file.
    pub stdout: String,
    /// Captured stderr; empty when redirected to a file.
    pub stderr: String,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// One worker node of the fixed pool.
#[async_trait]
pub trait Node: Send + Sync {
    /// Name of this node, used in status descriptions and log lines.
    fn name(&self) -> &str;

    /// The CPU reserved for isolated benchmark execution on this node.
    fn cpu(&self) -> u32;

    /// Root of this node's working/state directory.
    fn workdir(&self) -> &Path;

    /// Create the working directory tree if missing. Idempotent; never
    /// resets existing state.
    async fn ensure_workdir(&self) -> Result<()>;

    /// Create a directory (and missing parents) on this node.
    async fn ensure_dir(&self, path: &Path) -> Result<()>;

    /// Run a command to completion on this node.
    async fn run(&self, spec: CommandSpec) -> Result<CommandOutcome>;

    /// Read a file from this node.
    async fn read_file(&self, path: &Path) -> Result<Vec<u8>>;

    /// Remove a file or directory tree on this node, if present.
    async fn remove_path(&self, path: &Path) -> Result<()>;
}
