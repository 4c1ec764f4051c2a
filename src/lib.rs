pub mod api; // Error mapping + session auth middleware
pub mod config;
pub mod core_state; // Shared state: record store + session manager
pub mod db;
pub mod diagnostics; // Line-oriented diagnostics console
pub mod models;
pub mod pharmacy; // Registration, prescription workflow, notifications
pub mod session_manager;

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::MissedTickBehavior;
use tracing_subscriber::EnvFilter;

use crate::core_state::CoreState;
use crate::diagnostics::Command;

/// Start the core: logging, state, then the event loop until ctrl-c.
pub async fn run() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("Pharmassist starting v{}", config::APP_VERSION);

    let settings = config::Settings::from_env();
    let core = Arc::new(CoreState::boot(settings));
    event_loop(core).await;
}

/// Drive the periodic session sweep and the stdin console.
///
/// Everything runs on this one task; a console command completes before the
/// next sweep tick is handled.
pub async fn event_loop(core: Arc<CoreState>) {
    let period = core.settings.sweep_interval.max(std::time::Duration::from_secs(1));
    let mut sweep = tokio::time::interval(period);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    sweep.tick().await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut console_open = true;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    println!("Type 'help' for diagnostics commands.");

    loop {
        tokio::select! {
            _ = sweep.tick() => {
                if let Err(e) = core.sweep_expired() {
                    tracing::warn!(error = %e, "Session sweep failed");
                }
            }
            line = lines.next_line(), if console_open => match line {
                Ok(Some(line)) => handle_console_line(&core, &line),
                Ok(None) => {
                    tracing::debug!("Console input closed");
                    console_open = false;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Console read failed; disabling console");
                    console_open = false;
                }
            },
            _ = &mut shutdown => {
                tracing::info!("Shutdown requested");
                break;
            }
        }
    }

    match core.write_store() {
        Ok(mut store) if !store.is_synced() => {
            if !store.save_all() {
                tracing::warn!(unsynced = ?store.unsynced(), "Exiting with unsaved collections");
            }
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "Could not flush store on shutdown"),
    }
    tracing::info!("Pharmassist stopped");
}

fn handle_console_line(core: &CoreState, line: &str) {
    if line.trim().is_empty() {
        return;
    }
    match line.parse::<Command>() {
        Ok(command) => match diagnostics::run(core, &command) {
            Ok(report) => println!("{report}"),
            Err(e) => println!("Command failed: {e}"),
        },
        Err(hint) => println!("{hint}"),
    }
}
