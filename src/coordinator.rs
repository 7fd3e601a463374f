use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::advertiser::Advertiser;
use crate::backend::{AdvertiseBackend, BrowseBackend};
use crate::discovery::{self, DiscoveryAdapter};
use crate::error::TransferError;
use crate::events::{PeerUpdate, TransferRequest};
use crate::peer::PeerCoordinates;
use crate::prelude::*;
use crate::registry::PeerRegistry;
use crate::sender::{self, Outbound};

/// Default TCP port the receive server listens on and the sender dials,
/// matching the original implementation's default.
pub const DEFAULT_PORT: u16 = 8085;

/// Wires the discovery adapter, advertiser, and receive server together into
/// a single running application, the way the teacher's `main.rs` wires its
/// tracker/peer-connection tasks with a `JoinSet`.
pub struct Application<B: BrowseBackend, A: AdvertiseBackend> {
    browse_backend: Arc<B>,
    advertise_backend: Arc<A>,
    registry: Arc<PeerRegistry>,
    local_name: String,
    port: u16,
    save_dir: PathBuf,
    shutdown: CancellationToken,
    tasks: JoinSet<anyhow::Result<()>>,
}

impl<B: BrowseBackend, A: AdvertiseBackend> Application<B, A> {
    pub fn new(
        browse_backend: Arc<B>,
        advertise_backend: Arc<A>,
        local_name: String,
        port: u16,
        save_dir: PathBuf,
    ) -> Self {
        Self {
            browse_backend,
            advertise_backend,
            registry: Arc::new(PeerRegistry::new()),
            local_name,
            port,
            save_dir,
            shutdown: CancellationToken::new(),
            tasks: JoinSet::new(),
        }
    }

    /// Starts discovery, advertisement, and the receive server as three
    /// concurrent tasks, then waits for all three to complete, returning the
    /// first error encountered (and cancelling the others) as fatal. Under
    /// normal operation this only returns once `shutdown` has been fired
    /// from elsewhere (see [`Self::shutdown_token`]) and every task has
    /// wound down; per-connection receive errors are logged by the receive
    /// server itself and never reach this method.
    #[instrument(skip(self, peer_updates, transfer_requests))]
    pub async fn start(
        &mut self,
        peer_updates: mpsc::Sender<PeerUpdate>,
        transfer_requests: mpsc::Sender<TransferRequest>,
    ) -> anyhow::Result<()> {
        let discovery = DiscoveryAdapter::new(
            self.browse_backend.clone(),
            self.registry.clone(),
            self.local_name.clone(),
        );
        let discovery_shutdown = self.shutdown.clone();
        self.tasks.spawn(async move {
            discovery.run(peer_updates, discovery_shutdown).await;
            Ok(())
        });

        let advertiser = Advertiser::new(self.advertise_backend.clone());
        let advertiser_shutdown = self.shutdown.clone();
        let name = self.local_name.clone();
        let port = self.port;
        self.tasks
            .spawn(async move { advertiser.run(name, std::net::Ipv4Addr::UNSPECIFIED, port, advertiser_shutdown).await });

        let receiver = crate::receiver::ReceiveServer::new(self.save_dir.clone());
        let receiver_shutdown = self.shutdown.clone();
        let port = self.port;
        self.tasks.spawn(async move {
            receiver.run(port, transfer_requests, receiver_shutdown).await
        });

        info!(port = self.port, name = %self.local_name, "application started");

        while let Some(result) = self.tasks.join_next().await {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    error!(%err, "subsystem task failed, shutting down the rest");
                    self.shutdown.cancel();
                    return Err(err);
                }
                Err(join_err) => {
                    error!(%join_err, "subsystem task panicked, shutting down the rest");
                    self.shutdown.cancel();
                    return Err(join_err.into());
                }
            }
        }

        Ok(())
    }

    /// A clone of the internal cancellation token, so a caller running
    /// `start` in a spawned task can trigger shutdown from elsewhere (e.g. a
    /// signal handler) without needing `&mut self`.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Looks up `peer_name` in the registry and sends `files` to it.
    pub async fn send_files(
        &self,
        peer_name: &str,
        files: &[Outbound],
        progress: mpsc::Sender<u64>,
    ) -> Result<(), TransferError> {
        let record = self
            .registry
            .get_by_service_name(peer_name)
            .ok_or_else(|| TransferError::Unexpected(anyhow::anyhow!("unknown peer {peer_name}")))?;

        let target = PeerCoordinates {
            addr: record.coordinates.addr,
            port: record.coordinates.port,
        };

        sender::send_files(target, files, progress, self.shutdown.child_token()).await
    }

    /// Signals every running task to stop and waits for them to finish. If
    /// `start` is already awaiting the same tasks in another call, prefer
    /// cancelling a cloned [`Self::shutdown_token`] instead; this method is
    /// for callers holding `Application` directly once `start` has returned.
    pub async fn stop(&mut self) {
        self.shutdown.cancel();
        while let Some(result) = self.tasks.join_next().await {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(err)) => error!(%err, "task exited with an error"),
                Err(err) => error!(%err, "task panicked"),
            }
        }
    }

    pub fn registry(&self) -> Arc<PeerRegistry> {
        self.registry.clone()
    }
}

pub fn default_local_name() -> String {
    discovery::local_instance_name()
}
