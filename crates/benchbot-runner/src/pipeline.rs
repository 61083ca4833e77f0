//! The build/execute/compare pipeline: one run produces one structured
//! result for one build role of one job.

use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{info, warn};

use benchbot_config::BuildConfig;
use benchbot_core::{
    BenchmarkJob, BuildRole, CommandSpec, Error, Node, PipelineOutput, Result, Runner,
    StructuredResult,
};

use crate::build::{BuildDir, acquire_build};
use crate::shield::CpuShield;

/// Drives acquire → shield → execute → collect on a node.
pub struct BuildPipeline {
    config: BuildConfig,
}

impl BuildPipeline {
    pub fn new(config: BuildConfig) -> Self {
        Self { config }
    }

    fn result_path(&self, node: &dyn Node, job: &BenchmarkJob, role: BuildRole) -> PathBuf {
        node.workdir()
            .join("results")
            .join(format!("{}_{}.json", job.id.short(), role.as_str()))
    }

    fn log_path(&self, node: &dyn Node, job: &BenchmarkJob, role: BuildRole, ext: &str) -> PathBuf {
        node.workdir()
            .join("logs")
            .join(format!("{}_{}.{ext}", job.id.short(), role.as_str()))
    }

    async fn execute(
        &self,
        node: &dyn Node,
        build: &BuildDir,
        job: &BenchmarkJob,
        role: BuildRole,
    ) -> Result<()> {
        let out = self.log_path(node, job, role, "out");
        let err = self.log_path(node, job, role, "err");
        let result_path = self.result_path(node, job, role);

        let spec = CommandSpec::new(build.root.join(&self.config.harness).display().to_string())
            .arg("--tags")
            .arg(job.predicate.source())
            .arg("--output")
            .arg(result_path.display().to_string())
            .cwd(&build.root)
            .redirect(&out, &err)
            .pin_cpu(node.cpu());

        let outcome = node.run(spec).await.map_err(|e| Error::Execution {
            message: format!("could not start harness: {e}"),
            logs: Vec::new(),
        })?;

        if !outcome.success() {
            return Err(Error::Execution {
                message: format!("harness exited with {:?}", outcome.exit_code),
                logs: vec![out, err],
            });
        }
        Ok(())
    }

    async fn collect(
        &self,
        node: &dyn Node,
        job: &BenchmarkJob,
        role: BuildRole,
    ) -> Result<StructuredResult> {
        let path = self.result_path(node, job, role);
        let bytes = node
            .read_file(&path)
            .await
            .map_err(|e| Error::ResultRead(format!("{}: {e}", path.display())))?;
        let result = StructuredResult::from_json(&bytes)
            .map_err(|e| Error::ResultRead(format!("{}: {e}", path.display())))?;

        if result.is_empty() {
            return Err(Error::NoBenchmarks(format!(
                "the predicate {} selected no benchmark entries; check it for a misspelled tag",
                job.predicate,
            )));
        }
        Ok(result)
    }

    /// Best-effort version/environment capture from the build.
    async fn capture_version(&self, node: &dyn Node, build: &BuildDir) -> Option<String> {
        let command = self.config.version_command.as_ref()?;
        let spec = CommandSpec::new("sh")
            .args(["-c", command.as_str()])
            .cwd(&build.root);
        match node.run(spec).await {
            Ok(outcome) if outcome.success() => {
                let version = outcome.stdout.trim().to_string();
                (!version.is_empty()).then_some(version)
            }
            Ok(outcome) => {
                warn!(node = %node.name(), exit = ?outcome.exit_code, "version capture failed");
                None
            }
            Err(e) => {
                warn!(node = %node.name(), error = %e, "version capture failed");
                None
            }
        }
    }
}

#[async_trait]
impl Runner for BuildPipeline {
    async fn run(
        &self,
        node: &dyn Node,
        job: &BenchmarkJob,
        role: BuildRole,
    ) -> Result<PipelineOutput> {
        let build_ref = match role {
            BuildRole::Primary => &job.submission.primary,
            BuildRole::Against => job.against.as_ref().ok_or_else(|| {
                Error::Internal("comparison run requested for a single-build job".into())
            })?,
        };

        let build = acquire_build(node, &self.config, job, role, build_ref).await?;

        // The shield is released on both paths before the outcome is
        // inspected.
        let shield = CpuShield::acquire(node).await?;
        let executed = self.execute(node, &build, job, role).await;
        shield.release(node).await;
        executed?;

        let result = self.collect(node, job, role).await?;
        let version = self.capture_version(node, &build).await;

        if build.from_source {
            if let Err(e) = node.remove_path(&build.root).await {
                warn!(node = %node.name(), error = %e, "could not remove build directory");
            }
        }

        info!(
            node = %node.name(),
            job = %job.id,
            role = %role,
            entries = result.len(),
            "Pipeline run complete"
        );

        Ok(PipelineOutput { result, version })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalNode;
    use benchbot_core::{BuildRef, JobId, TagPredicate};
    use benchbot_core::{JobSubmission, OriginKind, SubmissionOrigin, TriggerArgs};

    fn job(predicate: &str) -> BenchmarkJob {
        BenchmarkJob {
            id: JobId::new(),
            submission: JobSubmission {
                args: TriggerArgs {
                    command: "runbenchmarks".to_string(),
                    positional: vec![predicate.to_string()],
                    keyword: Default::default(),
                },
                primary: BuildRef::new("acme/base", "abc123"),
                origin: SubmissionOrigin {
                    url: "https://example.test/acme/base/commit/abc123".to_string(),
                    kind: OriginKind::Commit,
                },
            },
            predicate: TagPredicate::parse(predicate).unwrap(),
            against: None,
        }
    }

    /// A fake install whose harness script writes a canned result file.
    #[cfg(unix)]
    fn fake_install(dir: &std::path::Path, result_json: &str) -> BuildConfig {
        use std::os::unix::fs::PermissionsExt;

        let bin = dir.join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        let harness = bin.join("benchharness");
        let script = format!(
            "#!/bin/sh\nwhile [ $# -gt 0 ]; do\n  if [ \"$1\" = \"--output\" ]; then out=\"$2\"; fi\n  shift\ndone\ncat > \"$out\" <<'EOF'\n{result_json}\nEOF\n"
        );
        std::fs::write(&harness, script).unwrap();
        std::fs::set_permissions(&harness, std::fs::Permissions::from_mode(0o755)).unwrap();

        BuildConfig {
            from_source: false,
            command: "true".to_string(),
            harness: "bin/benchharness".to_string(),
            version_command: Some("echo fake-build 1.2.3".to_string()),
            install: Some(dir.to_path_buf()),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pipeline_collects_results_from_install() {
        let install = tempfile::tempdir().unwrap();
        let workdir = tempfile::tempdir().unwrap();

        let config = fake_install(
            install.path(),
            r#"[{"key": ["linalg", "mul"], "time": 120.0, "time_tolerance": 0.05,
                "memory": 64.0, "memory_tolerance": 0.01, "gctime": 0.0, "allocs": 2}]"#,
        );

        let node = LocalNode::new("test-node", 0, workdir.path());
        node.ensure_workdir().await.unwrap();

        let pipeline = BuildPipeline::new(config);
        let output = pipeline
            .run(&node, &job("ALL"), BuildRole::Primary)
            .await
            .unwrap();

        assert_eq!(output.result.len(), 1);
        assert_eq!(output.version.as_deref(), Some("fake-build 1.2.3"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pipeline_flags_empty_results() {
        let install = tempfile::tempdir().unwrap();
        let workdir = tempfile::tempdir().unwrap();

        let config = fake_install(install.path(), "[]");
        let node = LocalNode::new("test-node", 0, workdir.path());
        node.ensure_workdir().await.unwrap();

        let pipeline = BuildPipeline::new(config);
        let err = pipeline
            .run(&node, &job("\"nosuchtag\""), BuildRole::Primary)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoBenchmarks(_)));
        assert!(err.to_string().contains("misspelled"));
    }

    #[tokio::test]
    async fn test_against_role_requires_comparison_build() {
        let workdir = tempfile::tempdir().unwrap();
        let node = LocalNode::new("test-node", 0, workdir.path());
        let pipeline = BuildPipeline::new(BuildConfig {
            from_source: false,
            command: "true".to_string(),
            harness: "bin/benchharness".to_string(),
            version_command: None,
            install: Some(workdir.path().to_path_buf()),
        });

        let err = pipeline
            .run(&node, &job("ALL"), BuildRole::Against)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }
}
