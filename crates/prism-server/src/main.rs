use anyhow::{Context, Result};
use clap::Parser;
use prism::{AttachmentStore, FanOutOrchestrator};
use prism_server::settings::{self, Cli};
use prism_server::{logging, router, sweeper, AppState};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = settings::load(&cli)?;
    let _log_guard = logging::init(&config.logging)?;
    config.validate().context("invalid configuration")?;

    let store = Arc::new(
        AttachmentStore::open(config.store.clone())
            .await
            .context("failed to open attachment store")?,
    );
    let orchestrator = Arc::new(FanOutOrchestrator::from_config(&config, store.clone())?);

    let shutdown = CancellationToken::new();
    let sweeper = sweeper::spawn(store.clone(), &config.retention, shutdown.clone());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let app = router(AppState::new(orchestrator, store, config));
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(%addr, "prismd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    shutdown.cancel();
    if let Some(handle) = sweeper {
        let _ = handle.await;
    }
    info!("prismd stopped");
    Ok(())
}
