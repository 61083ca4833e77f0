//! KDL configuration parsing for the benchbot benchmark scheduler.
//!
//! A single `benchbot.kdl` file configures the webhook listener, the
//! GitHub integration, the build procedure and the fixed worker-node pool.

pub mod error;
pub mod server;

pub use error::{ConfigError, ConfigResult};
pub use server::{BuildConfig, GitHubConfig, NodeConfig, ServerConfig, parse_server_config};
