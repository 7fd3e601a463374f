use std::net::Ipv4Addr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::backend::{BrowseBackend, BrowseEvent};
use crate::events::{PeerStatus, PeerUpdate};
use crate::peer::{Origin, PeerCoordinates, PeerRecord};
use crate::prelude::*;
use crate::registry::PeerRegistry;

const SERVICE_TYPE: &str = "_shair._tcp.local.";

/// Turns raw mDNS browse events into [`PeerUpdate`]s, keeping `registry` in
/// sync and suppressing updates for this host's own advertisement.
pub struct DiscoveryAdapter<B: BrowseBackend> {
    backend: Arc<B>,
    registry: Arc<PeerRegistry>,
    local_name: String,
}

impl<B: BrowseBackend> DiscoveryAdapter<B> {
    pub fn new(backend: Arc<B>, registry: Arc<PeerRegistry>, local_name: String) -> Self {
        Self {
            backend,
            registry,
            local_name,
        }
    }

    /// Runs the browse loop until `shutdown` fires, publishing a
    /// [`PeerUpdate`] on `updates` for every non-self peer add/remove.
    #[instrument(skip_all, fields(local_name = %self.local_name))]
    pub async fn run(&self, updates: mpsc::Sender<PeerUpdate>, shutdown: CancellationToken) {
        let mut events = self.backend.browse(SERVICE_TYPE, shutdown.clone());

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("discovery shutting down");
                    break;
                }
                event = events.recv() => {
                    match event {
                        Some(event) => self.handle_event(event, &updates).await,
                        None => {
                            debug!("browse backend closed its event channel");
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn handle_event(&self, event: BrowseEvent, updates: &mpsc::Sender<PeerUpdate>) {
        match event {
            BrowseEvent::Added(entry) => {
                if entry.name == self.local_name {
                    trace!(name = %entry.name, "suppressing self-advertisement");
                    return;
                }

                let record = Arc::new(PeerRecord {
                    name: entry.name.clone(),
                    origin: Origin::LocalNetwork,
                    coordinates: PeerCoordinates {
                        addr: entry.addr,
                        port: entry.port,
                    },
                });

                info!(name = %entry.name, addr = %entry.addr, port = entry.port, "peer discovered");

                // Publish before inserting: a consumer reading the registry
                // on receipt of this event may still find the peer absent.
                let update = PeerUpdate {
                    peer: record.clone(),
                    status: PeerStatus::Discovered,
                };
                if updates.send(update).await.is_err() {
                    warn!("peer update receiver dropped");
                }

                self.registry.insert(&entry.name, record);
            }
            BrowseEvent::Removed { name } => {
                if name == self.local_name {
                    return;
                }

                let Some(record) = self.registry.get_by_service_name(&name) else {
                    debug!(%name, "removal for unknown peer, ignoring");
                    return;
                };

                info!(%name, "peer removed");

                // Publish before removing, same ordering as the add path.
                let update = PeerUpdate {
                    peer: record,
                    status: PeerStatus::Removed,
                };
                if updates.send(update).await.is_err() {
                    warn!("peer update receiver dropped");
                }

                self.registry.remove_by_service_name(&name);
            }
        }
    }
}

/// Derives the local instance name advertised over mDNS: the machine's
/// hostname, falling back to a fixed name when it can't be determined.
pub fn local_instance_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "peerdrop-host".to_owned())
}
