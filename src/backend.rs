use std::net::Ipv4Addr;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A service record as advertised or observed on the local network. The
/// `name` is the mDNS instance name; `port` is the TCP port the receive
/// server is listening on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    pub name: String,
    pub addr: Ipv4Addr,
    pub port: u16,
}

/// One entry of a live mDNS browse, as the backend resolves it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowseEntry {
    pub name: String,
    pub addr: Ipv4Addr,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowseEvent {
    Added(BrowseEntry),
    Removed { name: String },
}

/// A source of mDNS browse events, generic rather than boxed so the
/// discovery adapter monomorphizes over whichever backend it's built with:
/// the real one, or a test double.
pub trait BrowseBackend: Send + Sync + 'static {
    /// Starts browsing for `service_type` and returns a channel of events.
    /// The browse stops, and the channel closes, once `shutdown` fires.
    fn browse(&self, service_type: &str, shutdown: CancellationToken) -> mpsc::Receiver<BrowseEvent>;
}

/// A sink for advertising this host's own service record over mDNS.
pub trait AdvertiseBackend: Send + Sync + 'static {
    /// Registers `record` under `service_type` and keeps it registered until
    /// `shutdown` fires.
    async fn register(
        &self,
        service_type: &str,
        record: ServiceRecord,
        shutdown: CancellationToken,
    ) -> anyhow::Result<()>;
}
