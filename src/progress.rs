use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::TransferError;

/// Byte-count updates are sent as they're produced; a slow or absent
/// receiver never blocks the transfer, it only stops seeing updates.
#[derive(Clone)]
pub struct ProgressSink {
    tx: mpsc::Sender<u64>,
}

impl ProgressSink {
    pub fn new(tx: mpsc::Sender<u64>) -> Self {
        Self { tx }
    }

    fn report(&self, n: u64) {
        // try_send, not send: a full channel means the observer fell behind,
        // and this must never become back-pressure on the transfer itself.
        let _ = self.tx.try_send(n);
    }
}

/// Copies exactly `total` bytes from `reader` to `writer`, in
/// `buf`-sized chunks, reporting the size of each chunk to `progress` as it
/// completes and checking `shutdown` between chunks.
///
/// A single explicit loop, rather than `AsyncRead`/`AsyncWrite` adapters that
/// tee or multiplex through a channel: simpler to read correctly by eye when
/// the code can't be compiled to check it.
pub async fn copy_with_progress<R, W>(
    reader: &mut R,
    writer: &mut W,
    total: u64,
    progress: &ProgressSink,
    shutdown: &CancellationToken,
) -> Result<(), TransferError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    const CHUNK: usize = 64 * 1024;

    let mut buf = vec![0u8; CHUNK];
    let mut copied: u64 = 0;

    while copied < total {
        if shutdown.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        let remaining = total - copied;
        let want = remaining.min(CHUNK as u64) as usize;

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Err(TransferError::Cancelled),
            result = reader.read_exact(&mut buf[..want]) => {
                result.map_err(TransferError::ConnectionDropped)?;
            }
        }

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Err(TransferError::Cancelled),
            result = writer.write_all(&buf[..want]) => {
                result.map_err(TransferError::ConnectionDropped)?;
            }
        }

        copied += want as u64;
        progress.report(want as u64);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn s5_progress_ticks_sum_to_total_bytes_copied() {
        let (mut client, mut server) = duplex(1024);
        let token = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(16);
        let sink = ProgressSink::new(tx);

        let payload = vec![7u8; 500];
        let writer_payload = payload.clone();
        let writer = tokio::spawn(async move {
            client.write_all(&writer_payload).await.unwrap();
        });

        let mut sink_buf = Vec::new();
        copy_with_progress(&mut server, &mut sink_buf, 500, &sink, &token)
            .await
            .unwrap();
        writer.await.unwrap();

        assert_eq!(sink_buf, payload);
        let mut sum = 0u64;
        while let Ok(n) = rx.try_recv() {
            sum += n;
        }
        assert_eq!(sum, 500);
    }

    #[tokio::test]
    async fn reports_one_tick_per_chunk_not_a_cumulative_total() {
        // A payload spanning several chunks must emit one tick per chunk
        // (each equal to that chunk's size), not a running total.
        const CHUNK: u64 = 64 * 1024;
        let total = CHUNK * 2 + 10;

        let (mut client, mut server) = duplex(256 * 1024);
        let token = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(16);
        let sink = ProgressSink::new(tx);

        let payload = vec![9u8; total as usize];
        let writer_payload = payload.clone();
        let writer = tokio::spawn(async move {
            client.write_all(&writer_payload).await.unwrap();
        });

        let mut sink_buf = Vec::new();
        copy_with_progress(&mut server, &mut sink_buf, total, &sink, &token)
            .await
            .unwrap();
        writer.await.unwrap();

        let mut ticks = Vec::new();
        while let Ok(n) = rx.try_recv() {
            ticks.push(n);
        }
        assert_eq!(ticks, vec![CHUNK, CHUNK, 10]);
        assert_eq!(ticks.iter().sum::<u64>(), total);
    }

    #[tokio::test]
    async fn cancellation_mid_copy_returns_cancelled_error() {
        let (mut client, mut server) = duplex(8);
        let token = CancellationToken::new();
        let (tx, _rx) = mpsc::channel(16);
        let sink = ProgressSink::new(tx);

        let writer = tokio::spawn(async move {
            client.write_all(&[1u8; 8]).await.unwrap();
        });

        token.cancel();
        let mut sink_buf = Vec::new();
        let err = copy_with_progress(&mut server, &mut sink_buf, 1_000_000, &sink, &token)
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Cancelled));
        writer.abort();
    }
}
