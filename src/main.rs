//! stratagem-daemon: numpad stratagem macros
//!
//! Watches the numpad through a global keyboard hook and plays the bound
//! stratagem's direction sequence as synthetic key presses.
//!
//! The daemon provides:
//! - Hotkey listener with an exit chord (Ctrl+Shift+Q)
//! - Macro player on a dedicated thread
//! - Template store and saved profiles
//! - IPC server for a UI to drive it and follow the activity log

mod config;
mod events;
mod hotkey;
mod ipc;
mod lifecycle;
mod player;
mod profile;
mod state;
mod stratagem;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::events::{ActivityEvent, StopReason};
use crate::hotkey::HotkeyListener;
use crate::ipc::Server;
use crate::lifecycle::ShutdownSignal;
use crate::profile::ProfileStore;
use crate::state::{AppState, Controller};
use crate::stratagem::TemplateStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "stratagem-daemon starting");

    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(data_dir = ?config.data_dir, "configuration loaded");

    let shutdown = ShutdownSignal::new();

    // Listener, player and controller -> IPC subscribers and the log
    let (event_tx, _) = broadcast::channel::<ActivityEvent>(256);
    let mut log_rx = event_tx.subscribe();

    let (source, injector) = hotkey::backend();
    let templates = TemplateStore::load(&config.templates_path)?;
    if templates.is_empty() {
        warn!(path = ?config.templates_path, "no stratagem templates available");
    }
    let state = Arc::new(AppState::new(templates));
    let listener = HotkeyListener::new(source, injector, Arc::clone(&state), event_tx.clone())?;
    let controller = Arc::new(Controller::new(
        state,
        listener,
        ProfileStore::new(&config.saves_dir),
        config.templates_path.clone(),
        event_tx,
    ));

    if let Some(missing) = controller.load_last_profile() {
        if !missing.is_empty() {
            warn!(?missing, "last profile references unknown macros");
        }
    }

    let server = Server::new(&config.socket_path, Arc::clone(&controller), shutdown.clone())?;

    info!("daemon initialized, entering main loop");

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Mirror activity events to the log
        _ = async {
            loop {
                match log_rx.recv().await {
                    Ok(event) => info!(target: "activity", "{}", event),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "activity log lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        } => {
            info!("activity log closed");
        }

        result = shutdown.wait() => {
            match result {
                Ok(()) => info!("shutdown signal received"),
                Err(e) => error!(?e, "failed to install signal handlers"),
            }
        }
    }

    info!("shutting down...");

    controller.stop_listening(StopReason::Shutdown);
    server.shutdown().await;

    info!("stratagem-daemon stopped");

    Ok(())
}
