use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::error::TransferError;

/// Wraps a byte stream so every read/write races against a
/// [`CancellationToken`], turning an external shutdown signal into a prompt
/// error instead of a wait on a peer that may never answer.
///
/// Mirrors the cancellation plumbing the download workers use, but at the
/// transport layer rather than around a whole worker task: a single I/O call
/// is raced against the token, never a retry loop, so a caller that needs to
/// push a large payload through in chunks is expected to call `write` (or
/// `write_all`) repeatedly and re-check cancellation on each iteration.
pub struct CancellableConn<T> {
    inner: T,
    shutdown: CancellationToken,
}

impl<T> CancellableConn<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(inner: T, shutdown: CancellationToken) -> Self {
        Self { inner, shutdown }
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransferError> {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(TransferError::Cancelled),
            result = self.inner.read(buf) => {
                result.map_err(TransferError::ConnectionDropped)
            }
        }
    }

    pub async fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), TransferError> {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(TransferError::Cancelled),
            result = self.inner.read_exact(buf) => {
                result.map(|_| ()).map_err(TransferError::ConnectionDropped)
            }
        }
    }

    pub async fn write(&mut self, buf: &[u8]) -> Result<usize, TransferError> {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(TransferError::Cancelled),
            result = self.inner.write(buf) => {
                result.map_err(TransferError::ConnectionDropped)
            }
        }
    }

    pub async fn write_all(&mut self, buf: &[u8]) -> Result<(), TransferError> {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(TransferError::Cancelled),
            result = self.inner.write_all(buf) => {
                result.map_err(TransferError::ConnectionDropped)
            }
        }
    }
}
