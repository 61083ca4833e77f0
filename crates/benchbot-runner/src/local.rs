//! Local subprocess execution backend.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use tokio::process::Command;
use tracing::{debug, warn};

use benchbot_core::{CommandOutcome, CommandSpec, Node, Result};

/// A worker node backed by local subprocess execution.
///
/// CPU pinning uses `taskset`; when it is unavailable the command runs
/// unpinned with a warning, degrading isolation rather than failing jobs.
pub struct LocalNode {
    name: String,
    cpu: u32,
    workdir: PathBuf,
}

impl LocalNode {
    pub fn new(name: impl Into<String>, cpu: u32, workdir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            cpu,
            workdir: workdir.into(),
        }
    }

    fn taskset_available() -> bool {
        static AVAILABLE: OnceLock<bool> = OnceLock::new();
        *AVAILABLE.get_or_init(|| {
            std::process::Command::new("taskset")
                .arg("-V")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .map(|s| s.success())
                .unwrap_or(false)
        })
    }
}

#[async_trait]
impl Node for LocalNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn cpu(&self) -> u32 {
        self.cpu
    }

    fn workdir(&self) -> &Path {
        &self.workdir
    }

    async fn ensure_workdir(&self) -> Result<()> {
        for sub in ["logs", "results", "builds"] {
            tokio::fs::create_dir_all(self.workdir.join(sub)).await?;
        }
        Ok(())
    }

    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        Ok(tokio::fs::create_dir_all(path).await?)
    }

    async fn run(&self, spec: CommandSpec) -> Result<CommandOutcome> {
        let mut command = if let Some(cpu) = spec.pin_cpu {
            if Self::taskset_available() {
                let mut c = Command::new("taskset");
                c.arg("-c").arg(cpu.to_string()).arg(&spec.program);
                c
            } else {
                warn!(node = %self.name, cpu, program = %spec.program,
                      "taskset unavailable, running unpinned");
                Command::new(&spec.program)
            }
        } else {
            Command::new(&spec.program)
        };

        command.args(&spec.args);
        command.envs(&spec.env);
        command.current_dir(spec.cwd.as_deref().unwrap_or(&self.workdir));
        command.stdin(Stdio::null());

        let capture_out = spec.stdout.is_none();
        let capture_err = spec.stderr.is_none();
        match &spec.stdout {
            Some(path) => command.stdout(Stdio::from(std::fs::File::create(path)?)),
            None => command.stdout(Stdio::piped()),
        };
        match &spec.stderr {
            Some(path) => command.stderr(Stdio::from(std::fs::File::create(path)?)),
            None => command.stderr(Stdio::piped()),
        };

        debug!(node = %self.name, program = %spec.program, args = ?spec.args, "Running command");

        let child = command.spawn()?;
        let output = child.wait_with_output().await?;

        Ok(CommandOutcome {
            exit_code: output.status.code(),
            stdout: if capture_out {
                String::from_utf8_lossy(&output.stdout).into_owned()
            } else {
                String::new()
            },
            stderr: if capture_err {
                String::from_utf8_lossy(&output.stderr).into_owned()
            } else {
                String::new()
            },
        })
    }

    async fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(path).await?)
    }

    async fn remove_path(&self, path: &Path) -> Result<()> {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_dir() => Ok(tokio::fs::remove_dir_all(path).await?),
            Ok(_) => Ok(tokio::fs::remove_file(path).await?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(dir: &Path) -> LocalNode {
        LocalNode::new("test-node", 0, dir)
    }

    #[tokio::test]
    async fn test_ensure_workdir_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let node = node(dir.path());
        node.ensure_workdir().await.unwrap();
        node.ensure_workdir().await.unwrap();
        assert!(dir.path().join("logs").is_dir());
        assert!(dir.path().join("results").is_dir());
        assert!(dir.path().join("builds").is_dir());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_captures_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let node = node(dir.path());

        let outcome = node
            .run(CommandSpec::new("sh").args(["-c", "echo hello; echo oops >&2"]))
            .await
            .unwrap();
        assert!(outcome.success());
        assert_eq!(outcome.stdout.trim(), "hello");
        assert_eq!(outcome.stderr.trim(), "oops");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_redirects_to_files() {
        let dir = tempfile::tempdir().unwrap();
        let node = node(dir.path());
        let out = dir.path().join("cmd.out");
        let err = dir.path().join("cmd.err");

        let outcome = node
            .run(
                CommandSpec::new("sh")
                    .args(["-c", "echo out; echo err >&2"])
                    .redirect(&out, &err),
            )
            .await
            .unwrap();
        assert!(outcome.success());
        assert!(outcome.stdout.is_empty());
        assert_eq!(std::fs::read_to_string(out).unwrap().trim(), "out");
        assert_eq!(std::fs::read_to_string(err).unwrap().trim(), "err");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_reports_nonzero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let node = node(dir.path());

        let outcome = node
            .run(CommandSpec::new("sh").args(["-c", "exit 3"]))
            .await
            .unwrap();
        assert!(!outcome.success());
        assert_eq!(outcome.exit_code, Some(3));
    }

    #[tokio::test]
    async fn test_remove_path_tolerates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let node = node(dir.path());
        node.remove_path(&dir.path().join("nope")).await.unwrap();
    }

    #[tokio::test]
    async fn test_ensure_dir_creates_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        let node = node(dir.path());
        let nested = dir.path().join("builds").join("abc123_primary");
        node.ensure_dir(&nested).await.unwrap();
        assert!(nested.is_dir());
        node.ensure_dir(&nested).await.unwrap();
    }
}
