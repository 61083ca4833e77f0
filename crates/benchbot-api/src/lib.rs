//! HTTP surface for benchbot.
//!
//! Hosts the GitHub webhook listener, the trigger-phrase parser and the
//! GitHub client that delivers statuses, comments and report uploads.

pub mod error;
pub mod github;
pub mod routes;
pub mod state;
pub mod trigger;

pub use github::{GitHubClient, HostApi};
pub use state::AppState;
