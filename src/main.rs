use std::sync::Arc;

use anyhow::{Context, Result};
use cardfile::{AppState, Config, PhotoManager, Store};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("cardfile=info".parse()?))
        .init();

    let config = Config::parse();

    let store = Store::open(&config.db)
        .with_context(|| format!("opening database {}", config.db.display()))?;

    if config.seed {
        let seeded = store.seed_if_empty()?;
        if seeded == 0 {
            info!("database already has cards; skipping seed");
        }
    }

    tokio::fs::create_dir_all(&config.uploads_dir)
        .await
        .with_context(|| format!("creating uploads dir {}", config.uploads_dir.display()))?;

    let photos = PhotoManager::new(&config.uploads_dir, store.clone());
    photos
        .sweep_staging()
        .await
        .with_context(|| format!("sweeping staging files in {}", config.uploads_dir.display()))?;
    let state = Arc::new(AppState { store, photos });
    let app = cardfile::router(state, config.max_body_bytes);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("cardfile listening on http://localhost:{}", config.port);

    let shutdown = CancellationToken::new();
    let serve = axum::serve(listener, app).with_graceful_shutdown(shutdown.clone().cancelled_owned());
    let mut server = tokio::spawn(async move { serve.await });

    tokio::select! {
        finished = &mut server => {
            // The server stopped on its own, before any signal.
            return Ok(finished??);
        }
        _ = shutdown_signal() => {}
    }

    info!(grace = ?config.shutdown_grace(), "shutting down, draining in-flight requests");
    shutdown.cancel();
    match tokio::time::timeout(config.shutdown_grace(), server).await {
        Ok(finished) => finished??,
        Err(_) => warn!("grace period elapsed; abandoning unfinished requests"),
    }
    info!("cardfile stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
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
}
