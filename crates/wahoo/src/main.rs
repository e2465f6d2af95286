use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::{Context, Result, eyre};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use wahoo::api::{self, AppState};
use wahoo::config::{Cli, Config};
use wahoo::{banner, browser, pairing};
use wahoo_db::Store;
use wahoo_ipc::{BridgeConfig, BridgeProcess};
use wahoo_worker::{SessionManager, Supervisor, SyncBridge};

const TASK_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .from_env_lossy()
                .add_directive("wahoo=info".parse()?)
                .add_directive("wahoo_worker=info".parse()?)
                .add_directive("wahoo_ipc=info".parse()?)
                .add_directive("wahoo_db=info".parse()?),
        )
        .init();

    let config = Config::from_cli(Cli::parse());
    banner::print_banner(&config.store_dir, &config.url());

    let store = Store::open(&config.store_dir)
        .await
        .wrap_err("Failed to open store")?;

    let bridge_config = BridgeConfig::from_command_line(
        config.bridge_dir.clone(),
        &config.bridge_cmd,
        config.store_dir.clone(),
    )
    .wrap_err("Invalid bridge command")?;
    let bridge = BridgeProcess::new(bridge_config).wrap_err("Failed to create session bridge")?;

    let listener = tokio::net::TcpListener::bind(&config.addr)
        .await
        .wrap_err_with(|| format!("Failed to bind {}", config.addr))?;

    let session = Arc::new(SessionManager::new(bridge));
    let events = session
        .take_event_receiver()
        .ok_or_else(|| eyre!("Failed to get session event receiver"))?;

    let cancel = CancellationToken::new();
    let sync_task = tokio::spawn(SyncBridge::new(store.clone()).run(events, cancel.clone()));
    let supervisor = Supervisor::new(session.clone(), config.reconnect_policy(), cancel.clone());
    let supervisor_task = tokio::spawn(supervisor.run());
    let pairing_task = tokio::spawn(pairing::print_pairing_codes(
        session.pairing_codes(),
        cancel.clone(),
    ));

    if config.open_browser {
        browser::open_later(config.url());
    }

    let app = api::build_app(AppState::new(store.clone(), session.clone()));

    info!(addr = %config.addr, "Starting server");
    let shutdown = cancel.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown.cancel();
        })
        .await;

    cancel.cancel();
    let tasks = [
        ("sync", sync_task),
        ("supervisor", supervisor_task),
        ("pairing", pairing_task),
    ];
    for (name, task) in tasks {
        match tokio::time::timeout(TASK_JOIN_TIMEOUT, task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(task = name, error = %e, "Background task failed"),
            Err(_) => warn!(task = name, "Background task did not stop in time"),
        }
    }

    session.disconnect().await;
    store.close().await;

    served.wrap_err("Server error")?;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
