//! Build acquisition: compile the requested revision or use a fixed
//! installation.

use std::path::PathBuf;
use tracing::info;

use benchbot_config::BuildConfig;
use benchbot_core::{BenchmarkJob, BuildRef, BuildRole, CommandSpec, Error, Node, Result};

/// An acquired build on a node.
#[derive(Debug, Clone)]
pub struct BuildDir {
    /// Root of the build: a checkout-and-compile directory, or the fixed
    /// installation.
    pub root: PathBuf,
    /// Whether the directory was built from source (and should be removed
    /// after collection).
    pub from_source: bool,
}

/// Obtain the build for one role of one job.
///
/// When building from source, clone + fetch + checkout into an isolated
/// per-job-per-role directory under the node's `builds/` tree and run the
/// configured build command there. Any failure is a `Build` error, fatal
/// to the job.
pub async fn acquire_build(
    node: &dyn Node,
    config: &BuildConfig,
    job: &BenchmarkJob,
    role: BuildRole,
    build_ref: &BuildRef,
) -> Result<BuildDir> {
    if !config.from_source {
        let install = config.install.clone().ok_or_else(|| {
            Error::Build("building from source is off but no installation is configured".into())
        })?;
        return Ok(BuildDir {
            root: install,
            from_source: false,
        });
    }

    let root = node
        .workdir()
        .join("builds")
        .join(format!("{}_{}", job.id.short(), role.as_str()));

    // A previous job that crashed mid-build may have left this directory.
    node.remove_path(&root).await?;

    let url = format!("https://github.com/{}.git", build_ref.repo);

    // Merge-result builds apply to exactly one combination: the primary
    // build of a pull-request-origin submission. Everything else builds
    // the raw revision.
    let rev = match (role, job.submission.pr_number()) {
        (BuildRole::Primary, Some(number)) => format!("pull/{number}/merge"),
        _ => build_ref.sha.clone(),
    };

    info!(node = %node.name(), repo = %build_ref.repo, %rev, role = %role, "Acquiring build");

    git(node, &root, ["clone", "--no-checkout", url.as_str(), "."]).await?;
    git(node, &root, ["fetch", "origin", rev.as_str()]).await?;
    git(node, &root, ["checkout", "--detach", "FETCH_HEAD"]).await?;

    let outcome = node
        .run(
            CommandSpec::new("sh")
                .args(["-c", config.command.as_str()])
                .cwd(&root),
        )
        .await
        .map_err(|e| Error::Build(format!("could not run build command: {e}")))?;
    if !outcome.success() {
        return Err(Error::Build(format!(
            "build command exited with {:?} for {}: {}",
            outcome.exit_code,
            build_ref,
            tail(&outcome.stderr),
        )));
    }

    Ok(BuildDir {
        root,
        from_source: true,
    })
}

async fn git<const N: usize>(node: &dyn Node, cwd: &std::path::Path, args: [&str; N]) -> Result<()> {
    if args[0] == "clone" {
        node.ensure_dir(cwd).await?;
    }
    let outcome = node
        .run(CommandSpec::new("git").args(args).cwd(cwd))
        .await
        .map_err(|e| Error::Build(format!("could not run git: {e}")))?;
    if !outcome.success() {
        return Err(Error::Build(format!(
            "git {} exited with {:?}: {}",
            args.join(" "),
            outcome.exit_code,
            tail(&outcome.stderr),
        )));
    }
    Ok(())
}

/// Last few lines of captured output, for error messages.
fn tail(text: &str) -> String {
    let lines: Vec<&str> = text.trim().lines().collect();
    let start = lines.len().saturating_sub(5);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_keeps_last_lines() {
        let text = "a\nb\nc\nd\ne\nf\ng";
        assert_eq!(tail(text), "c\nd\ne\nf\ng");
        assert_eq!(tail("one"), "one");
        assert_eq!(tail(""), "");
    }
}
