use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use peerdrop::backend::{AdvertiseBackend, BrowseBackend, BrowseEvent, ServiceRecord};
use peerdrop::config::{Config, FileConfig};
use peerdrop::prelude::*;
use peerdrop::Application;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Level;

/// A minimal peer-to-peer file share daemon. Discovery/advertisement are
/// pluggable (see `peerdrop::backend`); this binary wires up a backend that
/// does nothing, since choosing and depending on a concrete mDNS
/// implementation is left to the consumer of this crate.
#[derive(Parser, Debug)]
#[command(name = "peerdrop")]
struct Cli {
    /// Path to an optional TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides the configured/advertised display name.
    #[arg(long)]
    name: Option<String>,

    /// Overrides the configured TCP port.
    #[arg(long)]
    port: Option<u16>,

    /// Overrides the configured save directory.
    #[arg(long)]
    save_dir: Option<PathBuf>,
}

/// A backend that advertises nothing and never discovers a peer. Stands in
/// for a real mDNS implementation (e.g. `mdns-sd`) until the embedding
/// application supplies one.
struct NullBackend;

impl BrowseBackend for NullBackend {
    fn browse(&self, _service_type: &str, _shutdown: CancellationToken) -> mpsc::Receiver<BrowseEvent> {
        let (_tx, rx) = mpsc::channel(1);
        rx
    }
}

impl AdvertiseBackend for NullBackend {
    async fn register(
        &self,
        _service_type: &str,
        _record: ServiceRecord,
        shutdown: CancellationToken,
    ) -> anyhow::Result<()> {
        shutdown.cancelled().await;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let file_config = match &cli.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let mut config = Config::resolve(file_config);

    if let Some(name) = cli.name {
        config.display_name = name;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(save_dir) = cli.save_dir {
        config.save_dir = save_dir;
    }

    std::fs::create_dir_all(&config.save_dir)?;
    info!(name = %config.display_name, port = config.port, save_dir = %config.save_dir.display(), "starting peerdrop");

    let backend = Arc::new(NullBackend);
    let mut app = Application::new(
        backend.clone(),
        backend,
        config.display_name,
        config.port,
        config.save_dir,
    );

    let (peer_updates_tx, mut peer_updates_rx) = mpsc::channel(16);
    let (transfer_requests_tx, mut transfer_requests_rx) = mpsc::channel(16);

    let shutdown = app.shutdown_token();

    tokio::spawn(async move {
        while let Some(update) = peer_updates_rx.recv().await {
            info!(status = ?update.status, name = %update.peer.name, "peer update");
        }
    });

    tokio::spawn(async move {
        while let Some(request) = transfer_requests_rx.recv().await {
            warn!(
                sender = %request.sender.name,
                file_count = request.previews.len(),
                "no presentation layer wired up, auto-rejecting transfer request"
            );
            let _ = request.accept_tx.send(false);
        }
    });

    // `start` runs until `shutdown` fires and every subsystem task has
    // wound down, so it is driven on its own task while this one waits for
    // ctrl-c and fires the shared token.
    let run_handle = tokio::spawn(async move { app.start(peer_updates_tx, transfer_requests_tx).await });

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutting down");
            shutdown.cancel();
        }
    });

    run_handle.await??;
    Ok(())
}
