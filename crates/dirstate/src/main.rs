//! dirstate daemon
//!
//! Serves idempotent LDAP entry reconciliation and hostgroup inventories over
//! HTTP, backed by a kameo `DirectoryActor`.

use std::sync::Arc;

use color_eyre::Result;
use dirstate_api::events::DirectoryEvent;
use dirstate_core::DirectoryActor;
use kameo::actor::Spawn;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod factory;
mod router;
mod state;

use config::Config;
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let config = Config::load_default()?;
    init_tracing(&config);

    let directory = factory::create_directory(&config)?;
    let (event_tx, event_rx) = broadcast::channel(config.daemon.event_capacity);
    let args = factory::create_actor_args(&config, &directory, event_tx)?;

    let actor_ref = DirectoryActor::spawn(args);
    tokio::spawn(log_events(event_rx));

    let bind = config.daemon.bind.clone();
    let app = router::create_router(Arc::new(AppState::new(actor_ref.clone(), config)));

    let listener = TcpListener::bind(&bind).await?;
    info!(bind = %bind, "dirstate daemon listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    actor_ref.stop_gracefully().await.ok();
    info!("dirstate daemon stopped");
    Ok(())
}

/// Install the tracing subscriber; `RUST_LOG` overrides the configured level
fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.daemon.log_level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.daemon.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Audit log of directory changes
async fn log_events(mut rx: broadcast::Receiver<DirectoryEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(line) => info!(target: "dirstate::audit", event = %line, "directory event"),
                Err(e) => warn!(error = %e, "unserializable event"),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "audit log lagged behind directory events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}
