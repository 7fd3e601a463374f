use std::net::Ipv4Addr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::backend::{AdvertiseBackend, ServiceRecord};
use crate::prelude::*;

const SERVICE_TYPE: &str = "_shair._tcp.local.";

/// Publishes this host's own receive-server endpoint over mDNS for the
/// lifetime of the application.
pub struct Advertiser<A: AdvertiseBackend> {
    backend: Arc<A>,
}

impl<A: AdvertiseBackend> Advertiser<A> {
    pub fn new(backend: Arc<A>) -> Self {
        Self { backend }
    }

    /// Registers this host's record and runs until `shutdown` fires.
    /// A registration failure is fatal and is returned to the caller, per
    /// spec: advertiser initialization errors terminate the application.
    #[instrument(skip(self))]
    pub async fn run(
        &self,
        name: String,
        addr: Ipv4Addr,
        port: u16,
        shutdown: CancellationToken,
    ) -> anyhow::Result<()> {
        let record = ServiceRecord { name, addr, port };

        info!(name = %record.name, port, "advertising local service");
        self.backend.register(SERVICE_TYPE, record, shutdown).await
    }
}
