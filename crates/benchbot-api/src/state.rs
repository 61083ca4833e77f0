//! Application state.

use std::sync::Arc;

use benchbot_core::StatusSink;
use benchbot_scheduler::Server;

use crate::github::HostApi;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub server: Arc<Server>,
    pub sink: Arc<dyn StatusSink>,
    pub host: Arc<dyn HostApi>,
    pub webhook_secret: String,
    /// Account name whose mention triggers a submission.
    pub bot_account: String,
}

impl AppState {
    pub fn new(
        server: Arc<Server>,
        sink: Arc<dyn StatusSink>,
        host: Arc<dyn HostApi>,
        webhook_secret: impl Into<String>,
        bot_account: impl Into<String>,
    ) -> Self {
        Self {
            server,
            sink,
            host,
            webhook_secret: webhook_secret.into(),
            bot_account: bot_account.into(),
        }
    }
}
