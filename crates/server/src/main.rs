mod bootstrap;
mod health;
mod routes;

use std::future::IntoFuture;
use std::pin::pin;
use std::time::Duration;

use anyhow::Result;
use tenderflow_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use tenderflow_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    // Now bootstrap using the same config we already loaded
    let app = bootstrap::bootstrap_with_config(config).await?;

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    let router = routes::router(routes::AppState {
        runtime: app.runtime.clone(),
        sessions: app.sessions.clone(),
    })
    .merge(health::router(app.db_pool.clone()))
    .layer(tower_http::trace::TraceLayer::new_for_http());

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        session_id = "unknown",
        bind_address = %address,
        "tenderflow-server started"
    );

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    let (drain_tx, drain_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = drain_tx.send(());
    });
    let mut server = pin!(server.into_future());

    tokio::select! {
        result = &mut server => result?,
        _ = drain_rx => {
            tracing::info!(
                event_name = "system.server.stopping",
                correlation_id = "shutdown",
                session_id = "unknown",
                "draining in-flight requests"
            );
            match tokio::time::timeout(grace, &mut server).await {
                Ok(result) => result?,
                Err(_) => tracing::warn!(
                    event_name = "system.server.drain_timeout",
                    correlation_id = "shutdown",
                    session_id = "unknown",
                    "graceful shutdown window elapsed before all requests drained"
                ),
            }
        }
    }

    tracing::info!(
        event_name = "system.server.stopped",
        correlation_id = "shutdown",
        session_id = "unknown",
        "tenderflow-server stopped"
    );

    Ok(())
}
