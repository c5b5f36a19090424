#![allow(missing_docs)]

//! eroom server binary: wire the components together and serve HTTP.
//!
//! All collaborators are built once at startup and threaded through by
//! `Arc`; there is no module-level mutable state. Startup failures (config
//! bundle, socket bind) exit with code 1; per-job failures never terminate
//! the process.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use eroom::config::{self, Secrets, ServerConfig};
use eroom::llm::anthropic::AnthropicProvider;
use eroom::llm::{LlmGateway, TextCompletion};
use eroom::mesh::{MeshGateway, MeshSubmitter};
use eroom::pipeline::{JobRunner, Pipeline};
use eroom::queue::QueueManager;
use eroom::server::{self, AppState};
use eroom::store::ResultStore;

/// Escape-room scenario generation server.
#[derive(Debug, Parser)]
#[command(name = "eroom", version, about)]
struct Cli {
    /// Listening port.
    #[arg(default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _logging_guard = eroom::logging::init(Path::new("logs"))?;

    info!("eroom server starting");

    let config = Arc::new(ServerConfig::load()?);
    let secrets = Secrets::from_env();

    let store = Arc::new(ResultStore::new());
    let provider: Arc<dyn TextCompletion> = Arc::new(AnthropicProvider::new());
    let llm = Arc::new(LlmGateway::new(provider, config.model.clone()));
    let mesh: Arc<dyn MeshSubmitter> = Arc::new(
        MeshGateway::new(secrets.meshy_keys.clone()).context("failed to build mesh client")?,
    );
    let pipeline: Arc<dyn JobRunner> = Arc::new(Pipeline::new(
        Arc::clone(&config),
        llm,
        mesh,
        Arc::clone(&store),
    ));

    let workers = config::worker_count();
    let queue = Arc::new(QueueManager::start(workers, pipeline, Arc::clone(&store)));

    let state = AppState {
        store,
        queue: Arc::clone(&queue),
        api_token: secrets.api_token.clone(),
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(port = cli.port, workers, "eroom server ready");

    server::serve(listener, state, shutdown_signal())
        .await
        .context("http server error")?;

    queue.shutdown().await;
    info!("eroom server stopped");
    Ok(())
}

/// Resolve when the process receives ctrl-c.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
