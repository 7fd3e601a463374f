use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::peer::PeerRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerStatus {
    Discovered,
    Removed,
}

/// Published by the discovery adapter whenever a peer is discovered or
/// removed. `peer` is a read-only reference to a record the registry
/// otherwise exclusively owns.
#[derive(Debug, Clone)]
pub struct PeerUpdate {
    pub peer: Arc<PeerRecord>,
    pub status: PeerStatus,
}

/// One entry of a manifest as surfaced to the presentation layer before the
/// user accepts or rejects the transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePreview {
    pub name: String,
    pub size: u64,
}

/// Published by the receive server once it has decoded an inbound manifest.
/// `accept_tx` is single-shot by construction: the presentation layer sends
/// exactly one verdict and the sender is consumed.
#[derive(Debug)]
pub struct TransferRequest {
    pub sender: PeerRecord,
    pub previews: Vec<FilePreview>,
    pub accept_tx: oneshot::Sender<bool>,
    pub progress_rx: mpsc::Receiver<u64>,
}
