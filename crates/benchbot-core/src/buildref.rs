//! Build references and comparison-target parsing.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Identifies one buildable revision of the software under test.
///
/// Immutable after creation except `version`, which is populated once,
/// after execution, by the pipeline run that used this build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRef {
    /// Repository in `owner/name` form.
    pub repo: String,
    /// Revision to build: a commit SHA, a branch name, or `HEAD` for the
    /// remote default branch.
    pub sha: String,
    /// Version/environment description captured from the built artifact.
    pub version: Option<String>,
}

impl BuildRef {
    pub fn new(repo: impl Into<String>, sha: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            sha: sha.into(),
            version: None,
        }
    }

    /// Record the version string captured after execution. Only the first
    /// capture sticks.
    pub fn set_version(&mut self, version: impl Into<String>) {
        if self.version.is_none() {
            self.version = Some(version.into());
        }
    }
}

impl std::fmt::Display for BuildRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.repo, self.sha)
    }
}

/// Revision selector inside a comparison target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rev {
    /// An explicit commit SHA.
    Commit(String),
    /// A branch name, resolved by git at fetch time.
    Branch(String),
    /// The repository's default branch.
    DefaultBranch,
}

/// Parsed form of a `vs = "..."` comparison argument.
///
/// Accepted forms: `owner/repo@commit`, `owner/repo:branch`, `owner/repo`
/// (default branch) and a bare commit (same repository as the primary
/// build).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompareTarget {
    pub repo: String,
    pub rev: Rev,
}

impl CompareTarget {
    /// Parse a comparison argument. `primary_repo` supplies the repository
    /// for the bare-commit form.
    pub fn parse(arg: &str, primary_repo: &str) -> Result<Self> {
        let arg = arg.trim();
        if arg.is_empty() {
            return Err(Error::InvalidSubmission(
                "empty comparison target".to_string(),
            ));
        }
        if arg.chars().any(char::is_whitespace) {
            return Err(Error::InvalidSubmission(format!(
                "comparison target may not contain whitespace: {arg:?}"
            )));
        }

        if let Some((repo, sha)) = arg.split_once('@') {
            let repo = parse_repo(repo)?;
            if sha.is_empty() {
                return Err(Error::InvalidSubmission(format!(
                    "missing commit in comparison target {arg:?}"
                )));
            }
            return Ok(Self {
                repo,
                rev: Rev::Commit(sha.to_string()),
            });
        }

        if let Some((repo, branch)) = arg.split_once(':') {
            let repo = parse_repo(repo)?;
            if branch.is_empty() {
                return Err(Error::InvalidSubmission(format!(
                    "missing branch in comparison target {arg:?}"
                )));
            }
            return Ok(Self {
                repo,
                rev: Rev::Branch(branch.to_string()),
            });
        }

        if arg.contains('/') {
            return Ok(Self {
                repo: parse_repo(arg)?,
                rev: Rev::DefaultBranch,
            });
        }

        // Bare commit: same repository as the primary build.
        Ok(Self {
            repo: primary_repo.to_string(),
            rev: Rev::Commit(arg.to_string()),
        })
    }

    /// Whether resolving this target benefits from a default-branch lookup
    /// against the hosting API.
    pub fn needs_default_branch(&self) -> bool {
        self.rev == Rev::DefaultBranch
    }

    /// Turn the target into a concrete `BuildRef`. For the default-branch
    /// form, `default_branch` supplies the resolved name; when absent the
    /// revision falls back to the remote `HEAD`, which git resolves to the
    /// default branch at fetch time.
    pub fn into_build_ref(self, default_branch: Option<&str>) -> BuildRef {
        let sha = match self.rev {
            Rev::Commit(sha) => sha,
            Rev::Branch(branch) => branch,
            Rev::DefaultBranch => default_branch.unwrap_or("HEAD").to_string(),
        };
        BuildRef::new(self.repo, sha)
    }
}

fn parse_repo(s: &str) -> Result<String> {
    match s.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok(s.to_string())
        }
        _ => Err(Error::InvalidSubmission(format!(
            "repository must be in owner/name form: {s:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_repo_at_commit() {
        let t = CompareTarget::parse("acme/widgets@deadbeef", "acme/base").unwrap();
        assert_eq!(t.repo, "acme/widgets");
        assert_eq!(t.rev, Rev::Commit("deadbeef".to_string()));
    }

    #[test]
    fn test_parse_repo_colon_branch() {
        let t = CompareTarget::parse("acme/widgets:release-2", "acme/base").unwrap();
        assert_eq!(t.repo, "acme/widgets");
        assert_eq!(t.rev, Rev::Branch("release-2".to_string()));
    }

    #[test]
    fn test_parse_repo_only_defaults_branch() {
        let t = CompareTarget::parse("acme/widgets", "acme/base").unwrap();
        assert_eq!(t.repo, "acme/widgets");
        assert!(t.needs_default_branch());
        let r = t.clone().into_build_ref(Some("main"));
        assert_eq!(r.sha, "main");
        let r = t.into_build_ref(None);
        assert_eq!(r.sha, "HEAD");
    }

    #[test]
    fn test_parse_bare_commit_uses_primary_repo() {
        let t = CompareTarget::parse("0123abcd", "acme/base").unwrap();
        assert_eq!(t.repo, "acme/base");
        assert_eq!(t.rev, Rev::Commit("0123abcd".to_string()));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(CompareTarget::parse("", "acme/base").is_err());
        assert!(CompareTarget::parse("acme/widgets@", "acme/base").is_err());
        assert!(CompareTarget::parse("acme/widgets:", "acme/base").is_err());
        assert!(CompareTarget::parse("/widgets@abc", "acme/base").is_err());
        assert!(CompareTarget::parse("a b", "acme/base").is_err());
    }

    #[test]
    fn test_version_set_once() {
        let mut r = BuildRef::new("acme/base", "abc123");
        r.set_version("v1");
        r.set_version("v2");
        assert_eq!(r.version.as_deref(), Some("v1"));
    }
}
