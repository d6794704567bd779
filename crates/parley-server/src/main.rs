mod config;

use std::sync::Arc;

use tracing::{info, warn};

use parley_api::state::{AppState, AppStateInner};
use parley_gateway::dispatcher::Dispatcher;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "parley=debug,parley_api=debug,parley_gateway=debug,tower_http=debug".into()
            }),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = parley_db::Database::open(&config.db_path)?;
    info!("Database ready at {}", config.db_path.display());

    // Shared state
    let dispatcher = Dispatcher::new(config.broadcast_capacity);
    let state: AppState = Arc::new(AppStateInner {
        db: Arc::new(db),
        jwt_secret: config.jwt_secret.clone(),
        dispatcher: dispatcher.clone(),
    });

    let app = parley_api::router(state);

    info!("Parley server listening on {}", config.addr);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let stats = dispatcher.stats().await;
    if stats.events_lagged > 0 {
        warn!("{} events were dropped for slow clients", stats.events_lagged);
    }
    info!("Shut down after sending {} events", stats.events_sent);

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
