use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use loki_mcp::client::LokiClient;
use loki_mcp::config::Config;
use loki_mcp::http::serve_http;
use loki_mcp::mcp::run_stdio;
use loki_mcp::tools::ToolRegistry;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout belongs to the stdio transport
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cfg_path = env::args().nth(1).map(PathBuf::from);
    let config = Config::load(cfg_path.as_deref()).map_err(|e| {
        error!("{e}");
        e
    })?;
    info!(
        loki_url = %config.loki.url,
        mode = ?config.server.mode,
        port = config.server.http_port,
        "loki-mcp {} starting",
        env!("CARGO_PKG_VERSION")
    );

    let client = LokiClient::new(&config.loki)?;
    let registry = Arc::new(ToolRegistry::new(client));

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    let mode = config.server.mode;
    let stdio_task = mode.serves_stdio().then(|| {
        let registry = registry.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { run_stdio(registry, shutdown).await })
    });

    if mode.serves_http() {
        if let Err(e) = serve_http(&config.server, registry, shutdown.clone()).await {
            error!("{e}");
            return Err(e).context("HTTP transport failed");
        }
        shutdown.cancel();
    }

    if let Some(task) = stdio_task {
        task.await.context("stdio task panicked")??;
    }

    info!("shut down cleanly");
    Ok(())
}

async fn wait_for_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("cannot listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("cannot listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
    shutdown.cancel();
}
