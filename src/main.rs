//! pinwatch binary entrypoint.
//!
//! Wires configuration, the HTTP session backend, the notifier mux, and
//! the orchestrator, then runs until SIGINT. See `README.md` for setup.

use std::sync::Arc;

use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pinwatch::config::Config;
use pinwatch::history::HistoryStore;
use pinwatch::notify::NotifierMux;
use pinwatch::orchestrator::Orchestrator;
use pinwatch::session::HttpSessionBackend;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pinwatch=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = Config::load_default()?;
    let history = Arc::new(HistoryStore::load(&cfg.history_path));
    let backend = Arc::new(HttpSessionBackend::new(&cfg));
    let mux = NotifierMux::from_env();

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for shutdown signal");
            return;
        }
        tracing::info!("termination signal received");
        let _ = stop_tx.send(true);
    });

    let mut orchestrator = Orchestrator::new(cfg, backend, mux, history, stop_rx);
    orchestrator.run().await
}
