//! Benchbot server.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use benchbot_api::{AppState, GitHubClient, routes};
use benchbot_config::ServerConfig;
use benchbot_core::Node;
use benchbot_runner::{BuildPipeline, LocalNode};
use benchbot_scheduler::Server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("benchbot.kdl"));
    info!(path = %config_path.display(), "Loading configuration");
    let config = ServerConfig::from_file(&config_path)?;

    let github = Arc::new(GitHubClient::new(&config.github));
    let server = Arc::new(Server::new());

    let nodes: Vec<Arc<dyn Node>> = config
        .nodes
        .iter()
        .map(|n| Arc::new(LocalNode::new(&n.name, n.cpu, &n.workdir)) as Arc<dyn Node>)
        .collect();
    info!(nodes = nodes.len(), "Starting workers");

    let handles = server.spawn_workers(
        nodes,
        Arc::new(BuildPipeline::new(config.build.clone())),
        github.clone(),
        config.poll_interval,
        config.admin_mention.clone(),
    );
    // Handles are detached; a worker terminating on a loop fault logs its
    // own reason and leaves the remaining workers running.
    drop(handles);

    let state = AppState::new(
        server,
        github.clone(),
        github,
        config.webhook_secret.clone(),
        config.github.bot_account.clone(),
    );

    let app = routes::router(state).layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Starting server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
