use std::path::PathBuf;

/// Error kinds surfaced across the transfer subsystem. The presentation
/// layer is expected to recognize [`TransferError::TransferRejected`]
/// specifically; every other variant is rendered as opaque error text.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("cannot open or stat {path}")]
    StatFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed sending {path}")]
    SendFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("connection dropped by peer")]
    ConnectionDropped(#[source] std::io::Error),

    #[error("peer rejected the transfer")]
    TransferRejected,

    #[error("transfer cancelled")]
    Cancelled,

    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl From<crate::manifest::ManifestError> for TransferError {
    fn from(err: crate::manifest::ManifestError) -> Self {
        TransferError::Unexpected(err.into())
    }
}
