//! Interactive terminal client for the password manager
//!
//! Signs in to the server, unlocks the vault with the master password and then
//! reads commands from stdin. The vault locks itself after inactivity and any
//! password copied to the clipboard is cleared when it does.

mod clipboard;
mod command;
mod shell;
mod strength;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vault_core::{
    ClipboardBackend, ClipboardGuard, MemoryClipboard, SessionController, SettingsManager,
    TransitionReason,
};
use vault_http::HttpVaultApi;

use crate::clipboard::SystemClipboard;
use crate::shell::Shell;

/// Zero-knowledge password manager client
#[derive(Parser, Debug)]
#[command(name = "vault")]
#[command(version)]
#[command(about = "Zero-knowledge password manager client")]
struct Args {
    /// Server base URL (overrides settings and VAULT_API_URL)
    #[arg(long)]
    api_url: Option<String>,

    /// Account email
    #[arg(long)]
    email: Option<String>,

    /// Lock the vault after this many seconds without activity
    #[arg(long, value_name = "SECS")]
    auto_lock: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Warnings only by default so log lines do not interleave with prompts
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings = SettingsManager::open_default().context("Failed to load settings")?;

    // Environment and flags apply to this run only and are never saved
    let mut effective = settings.get().clone();
    effective.apply_env_overrides();
    if let Some(url) = args.api_url {
        effective.api_base_url = url;
    }
    if let Some(secs) = args.auto_lock {
        effective.auto_lock_timeout_secs = secs;
    }

    let api = HttpVaultApi::new(&effective.api_base_url, effective.api_timeout())
        .context("Failed to create server client")?;
    let session = SessionController::new(Arc::new(api), effective.session_config());
    info!(
        "Auto-lock after {}s of inactivity",
        session.config().auto_lock_timeout.as_secs()
    );

    let backend: Arc<dyn ClipboardBackend> = match SystemClipboard::new() {
        Ok(clipboard) => Arc::new(clipboard),
        Err(e) => {
            warn!("System clipboard unavailable, copies stay in this process: {}", e);
            Arc::new(MemoryClipboard::new())
        }
    };
    let clipboard = ClipboardGuard::new(backend, &session);

    spawn_notifier(&session);

    let mut shell = Shell::new(
        session,
        clipboard,
        settings,
        effective.clipboard_ttl(),
        args.email,
    );
    shell.run().await
}

/// Tell the user about locks and expiries they did not ask for
fn spawn_notifier(session: &SessionController) {
    let mut changes = session.subscribe();
    tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(change) => {
                    let unrequested = matches!(
                        change.reason,
                        TransitionReason::Inactivity | TransitionReason::TokenExpired
                    );
                    if unrequested {
                        eprintln!("\n[vault {}: {}]", change.to, change.reason);
                    }
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });
}
