//! Server configuration parsing.

use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// GitHub integration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// API token used for statuses, comments and uploads.
    pub token: String,
    /// Account name the bot listens for in trigger phrases.
    pub bot_account: String,
    /// Repository that receives uploaded report artifacts.
    pub reports_repo: String,
}

/// How builds of the software under test are obtained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Compile the requested revision from source; otherwise the fixed
    /// `install` path is used for every job.
    pub from_source: bool,
    /// Build command run inside the checkout.
    pub command: String,
    /// Benchmark harness entrypoint, relative to the build root. Invoked
    /// with `--tags <predicate> --output <result-file>`.
    pub harness: String,
    /// Command producing a version/environment description, run from the
    /// build directory. Capture failure is non-fatal.
    pub version_command: Option<String>,
    /// Pre-existing installation used when `from_source` is off.
    pub install: Option<PathBuf>,
}

/// One worker node of the fixed pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub name: String,
    /// CPU reserved for isolated benchmark execution.
    pub cpu: u32,
    /// Root of the node's working/state directory.
    pub workdir: PathBuf,
}

/// Process-wide configuration, passed explicitly into every component
/// constructor. No ambient lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Webhook listener port.
    pub port: u16,
    /// HMAC secret for webhook signature verification.
    pub webhook_secret: String,
    /// Mention appended to operator-escalation messages.
    pub admin_mention: Option<String>,
    pub github: GitHubConfig,
    pub build: BuildConfig,
    /// Worker idle-poll cadence.
    pub poll_interval: Duration,
    pub nodes: Vec<NodeConfig>,
}

impl ServerConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        parse_server_config(&text)
    }
}

/// Parse a server configuration from KDL text.
pub fn parse_server_config(kdl: &str) -> ConfigResult<ServerConfig> {
    let doc: KdlDocument = kdl.parse()?;

    let mut port = 4567u16;
    let mut webhook_secret = None;
    let mut admin_mention = None;
    let mut github = None;
    let mut build = None;
    let mut poll_interval = Duration::from_secs(10);
    let mut nodes = Vec::new();

    for node in doc.nodes() {
        match node.name().value() {
            "server" => {
                if let Some(p) = get_i64_prop(node, "port")? {
                    port = u16::try_from(p).map_err(|_| ConfigError::InvalidValue {
                        field: "server port".to_string(),
                        message: format!("{p} is not a valid port"),
                    })?;
                }
                webhook_secret = get_string_prop(node, "webhook-secret");
                admin_mention = get_string_prop(node, "admin-mention");
            }
            "github" => {
                github = Some(GitHubConfig {
                    token: get_string_prop(node, "token")
                        .ok_or_else(|| ConfigError::MissingField("github token".to_string()))?,
                    bot_account: get_string_prop(node, "bot-account").ok_or_else(|| {
                        ConfigError::MissingField("github bot-account".to_string())
                    })?,
                    reports_repo: get_string_prop(node, "reports-repo").ok_or_else(|| {
                        ConfigError::MissingField("github reports-repo".to_string())
                    })?,
                });
            }
            "build" => {
                build = Some(BuildConfig {
                    from_source: get_bool_prop(node, "from-source").unwrap_or(true),
                    command: get_string_prop(node, "command")
                        .unwrap_or_else(|| "make -j".to_string()),
                    harness: get_string_prop(node, "harness")
                        .unwrap_or_else(|| "bin/benchharness".to_string()),
                    version_command: get_string_prop(node, "version-command"),
                    install: get_string_prop(node, "install").map(PathBuf::from),
                });
            }
            "scheduler" => {
                if let Some(secs) = get_i64_prop(node, "poll-interval-secs")? {
                    if secs <= 0 {
                        return Err(ConfigError::InvalidValue {
                            field: "poll-interval-secs".to_string(),
                            message: "must be positive".to_string(),
                        });
                    }
                    poll_interval = Duration::from_secs(secs as u64);
                }
            }
            "node" => {
                nodes.push(parse_node(node)?);
            }
            _ => {} // Ignore unknown nodes
        }
    }

    let webhook_secret = webhook_secret
        .ok_or_else(|| ConfigError::MissingField("server webhook-secret".to_string()))?;
    let github = github.ok_or_else(|| ConfigError::MissingField("github".to_string()))?;
    let build = build.unwrap_or(BuildConfig {
        from_source: true,
        command: "make -j".to_string(),
        harness: "bin/benchharness".to_string(),
        version_command: None,
        install: None,
    });

    if nodes.is_empty() {
        return Err(ConfigError::MissingField("at least one node".to_string()));
    }
    if !build.from_source && build.install.is_none() {
        return Err(ConfigError::MissingField(
            "build install (required when from-source is off)".to_string(),
        ));
    }

    // Node names must be unique: they key log lines and workdirs.
    let mut seen = Vec::new();
    for node in &nodes {
        if seen.contains(&node.name.as_str()) {
            return Err(ConfigError::Duplicate(format!("node {:?}", node.name)));
        }
        seen.push(node.name.as_str());
    }

    Ok(ServerConfig {
        port,
        webhook_secret,
        admin_mention,
        github,
        build,
        poll_interval,
        nodes,
    })
}

fn parse_node(node: &KdlNode) -> ConfigResult<NodeConfig> {
    let name = get_first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField("node name".to_string()))?;

    let cpu = get_i64_prop(node, "cpu")?
        .ok_or_else(|| ConfigError::MissingField(format!("node {name:?} cpu")))?;
    let cpu = u32::try_from(cpu).map_err(|_| ConfigError::InvalidValue {
        field: format!("node {name:?} cpu"),
        message: format!("{cpu} is not a valid CPU index"),
    })?;

    let workdir = get_string_prop(node, "workdir")
        .ok_or_else(|| ConfigError::MissingField(format!("node {name:?} workdir")))?;

    Ok(NodeConfig {
        name,
        cpu,
        workdir: PathBuf::from(workdir),
    })
}

/// Get the first string argument of a node (e.g. `node "bench-1"`).
fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(String::from)
}

/// Get a named string property (e.g. `workdir="/var/lib"`).
fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().map(|n| n.value()) == Some(name))
        .and_then(|e| e.value().as_string())
        .map(String::from)
}

/// Get a named integer property. KDL integers are wider than i64, so an
/// out-of-range literal is an error rather than a silent wrap.
fn get_i64_prop(node: &KdlNode, name: &str) -> ConfigResult<Option<i64>> {
    let Some(value) = node
        .entries()
        .iter()
        .find(|e| e.name().map(|n| n.value()) == Some(name))
        .and_then(|e| e.value().as_integer())
    else {
        return Ok(None);
    };
    let value = i64::try_from(value).map_err(|_| ConfigError::InvalidValue {
        field: name.to_string(),
        message: format!("{value} is out of range"),
    })?;
    Ok(Some(value))
}

/// Get a named boolean property.
fn get_bool_prop(node: &KdlNode, name: &str) -> Option<bool> {
    node.entries()
        .iter()
        .find(|e| e.name().map(|n| n.value()) == Some(name))
        .and_then(|e| e.value().as_bool())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
        server port=8080 webhook-secret="s3cret" admin-mention="@acme/perf-admins"

        github token="ghp_test" bot-account="benchbot" reports-repo="acme/benchbot-reports"

        build from-source=#true command="make -j8" version-command="bin/version"

        scheduler poll-interval-secs=5

        node "bench-1" cpu=2 workdir="/var/lib/benchbot/bench-1"
        node "bench-2" cpu=3 workdir="/var/lib/benchbot/bench-2"
    "#;

    #[test]
    fn test_parse_full_config() {
        let config = parse_server_config(FULL).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.webhook_secret, "s3cret");
        assert_eq!(config.admin_mention.as_deref(), Some("@acme/perf-admins"));
        assert_eq!(config.github.bot_account, "benchbot");
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.nodes.len(), 2);
        assert_eq!(config.nodes[0].name, "bench-1");
        assert_eq!(config.nodes[0].cpu, 2);
        assert!(config.build.from_source);
        assert_eq!(config.build.harness, "bin/benchharness");
    }

    #[test]
    fn test_defaults() {
        let kdl = r#"
            server webhook-secret="x"
            github token="t" bot-account="b" reports-repo="o/r"
            node "bench-1" cpu=1 workdir="/tmp/b1"
        "#;
        let config = parse_server_config(kdl).unwrap();
        assert_eq!(config.port, 4567);
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert!(config.build.from_source);
        assert_eq!(config.build.command, "make -j");
    }

    #[test]
    fn test_missing_nodes_rejected() {
        let kdl = r#"
            server webhook-secret="x"
            github token="t" bot-account="b" reports-repo="o/r"
        "#;
        assert!(matches!(
            parse_server_config(kdl),
            Err(ConfigError::MissingField(_))
        ));
    }

    #[test]
    fn test_duplicate_node_names_rejected() {
        let kdl = r#"
            server webhook-secret="x"
            github token="t" bot-account="b" reports-repo="o/r"
            node "bench-1" cpu=1 workdir="/tmp/a"
            node "bench-1" cpu=2 workdir="/tmp/b"
        "#;
        assert!(matches!(
            parse_server_config(kdl),
            Err(ConfigError::Duplicate(_))
        ));
    }

    #[test]
    fn test_out_of_range_integer_rejected() {
        // KDL integers can exceed i64; this must error, not wrap around.
        let kdl = r#"
            server webhook-secret="x"
            github token="t" bot-account="b" reports-repo="o/r"
            scheduler poll-interval-secs=99999999999999999999999999999999
            node "bench-1" cpu=1 workdir="/tmp/a"
        "#;
        assert!(matches!(
            parse_server_config(kdl),
            Err(ConfigError::InvalidValue { field, .. }) if field == "poll-interval-secs"
        ));
    }

    #[test]
    fn test_prebuilt_install_required() {
        let kdl = r#"
            server webhook-secret="x"
            github token="t" bot-account="b" reports-repo="o/r"
            build from-source=#false
            node "bench-1" cpu=1 workdir="/tmp/a"
        "#;
        assert!(parse_server_config(kdl).is_err());

        let kdl = r#"
            server webhook-secret="x"
            github token="t" bot-account="b" reports-repo="o/r"
            build from-source=#false install="/opt/acme/current"
            node "bench-1" cpu=1 workdir="/tmp/a"
        "#;
        let config = parse_server_config(kdl).unwrap();
        assert!(!config.build.from_source);
        assert_eq!(
            config.build.install.as_deref(),
            Some(Path::new("/opt/acme/current"))
        );
    }
}
