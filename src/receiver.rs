use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs::File;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::conduit::CancellableConn;
use crate::error::TransferError;
use crate::events::{FilePreview, TransferRequest};
use crate::manifest;
use crate::peer::PeerRecord;
use crate::prelude::*;
use crate::progress::{copy_with_progress, ProgressSink};

const ACCEPT: u8 = 1;
const REJECT: u8 = 0;

/// Accepts inbound connections and runs the receive side of the handshake
/// on each: read manifest, publish a [`TransferRequest`] for the
/// presentation layer, await a verdict, then either stream the declared
/// files to `save_dir` or write the reject byte and close.
pub struct ReceiveServer {
    save_dir: PathBuf,
}

impl ReceiveServer {
    pub fn new(save_dir: PathBuf) -> Self {
        Self { save_dir }
    }

    #[instrument(skip(self, requests, shutdown))]
    pub async fn run(
        &self,
        port: u16,
        requests: mpsc::Sender<TransferRequest>,
        shutdown: CancellationToken,
    ) -> anyhow::Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        info!(port, "receive server listening");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("receive server shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    let (stream, peer_addr) = match accepted {
                        Ok(pair) => pair,
                        Err(err) => {
                            warn!(%err, "failed to accept connection");
                            continue;
                        }
                    };

                    let save_dir = self.save_dir.clone();
                    let requests = requests.clone();
                    let shutdown = shutdown.clone();

                    tokio::spawn(async move {
                        let addr = match peer_addr.ip() {
                            std::net::IpAddr::V4(v4) => v4,
                            std::net::IpAddr::V6(_) => Ipv4Addr::UNSPECIFIED,
                        };
                        if let Err(err) =
                            handle_connection(stream, addr, &save_dir, requests, shutdown).await
                        {
                            warn!(%err, "receive connection ended with an error");
                        }
                    });
                }
            }
        }
    }
}

#[instrument(skip(stream, requests, shutdown), fields(%peer_addr))]
async fn handle_connection(
    stream: TcpStream,
    peer_addr: Ipv4Addr,
    save_dir: &Path,
    requests: mpsc::Sender<TransferRequest>,
    shutdown: CancellationToken,
) -> Result<(), TransferError> {
    let mut conn = CancellableConn::new(stream, shutdown.clone());

    let manifest = read_manifest(&mut conn).await?;
    debug!(file_count = manifest.entries.len(), "manifest decoded");

    let sender = resolve_sender(peer_addr);

    let previews: Vec<FilePreview> = manifest
        .entries
        .iter()
        .map(|entry| FilePreview {
            name: entry.name.clone(),
            size: entry.size,
        })
        .collect();

    let (accept_tx, accept_rx) = oneshot::channel();
    let (progress_tx, progress_rx) = mpsc::channel(64);

    let request = TransferRequest {
        sender: sender.clone(),
        previews,
        accept_tx,
        progress_rx,
    };

    if requests.send(request).await.is_err() {
        warn!("transfer request receiver dropped, rejecting by default");
        conn.write_all(&[REJECT]).await?;
        return Ok(());
    }

    let accepted = tokio::select! {
        biased;
        _ = shutdown.cancelled() => return Err(TransferError::Cancelled),
        verdict = accept_rx => verdict.unwrap_or(false),
    };

    if !accepted {
        info!(%sender.name, "transfer rejected by user");
        conn.write_all(&[REJECT]).await?;
        return Ok(());
    }

    info!(%sender.name, "transfer accepted, receiving files");
    conn.write_all(&[ACCEPT]).await?;

    // From here on, cancellation is checked per-chunk by `copy_with_progress`
    // itself, so the raw stream is used directly rather than through another
    // layer of per-call cancellation racing.
    let mut stream = conn.into_inner();
    let progress = ProgressSink::new(progress_tx);

    for entry in &manifest.entries {
        let dest = save_dir.join(&entry.name);
        let mut file = File::create(&dest)
            .await
            .map_err(|source| TransferError::StatFile {
                path: dest.clone(),
                source,
            })?;

        copy_with_progress(&mut stream, &mut file, entry.size, &progress, &shutdown).await?;
        debug!(name = %entry.name, size = entry.size, "file received");
    }

    info!(%sender.name, "transfer complete");
    Ok(())
}

async fn read_manifest(conn: &mut CancellableConn<TcpStream>) -> Result<manifest::Manifest, TransferError> {
    let mut prefix = [0u8; 4];
    conn.read_exact(&mut prefix).await?;

    let header_size = u16::from_be_bytes([prefix[0], prefix[1]]) as usize;
    if header_size < 4 {
        return Err(manifest::ManifestError::Truncated {
            expected: 4,
            actual: header_size,
        }
        .into());
    }

    let mut buf = vec![0u8; header_size];
    buf[..4].copy_from_slice(&prefix);
    conn.read_exact(&mut buf[4..]).await?;

    manifest::decode(&buf).map_err(TransferError::from)
}

/// Reverse-DNS resolution of the sender's identity is explicitly out of
/// scope for this crate (no name service client dependency is carried); the
/// peer is always surfaced under the `"unknown"` fallback name, matching
/// what the original implementation does whenever its reverse lookup fails.
fn resolve_sender(addr: Ipv4Addr) -> PeerRecord {
    let mut record = PeerRecord::unknown();
    record.coordinates.addr = addr;
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::io::AsyncWriteExt as _;

    #[tokio::test]
    async fn s2_accept_then_receive_full_payload() {
        let dir = tempdir().unwrap();
        let server = ReceiveServer::new(dir.path().to_owned());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let (requests_tx, mut requests_rx) = mpsc::channel(4);
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        let server_handle = tokio::spawn(async move {
            server.run(port, requests_tx, shutdown_clone).await
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let mut client = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let entries = vec![manifest::FileEntry::new("hello.txt", 5)];
        let encoded = manifest::encode(&entries).unwrap();
        client.write_all(&encoded).await.unwrap();

        let request = requests_rx.recv().await.expect("transfer request published");
        assert_eq!(request.previews.len(), 1);
        assert_eq!(request.previews[0].name, "hello.txt");
        request.accept_tx.send(true).unwrap();

        let mut verdict = [0u8; 1];
        tokio::io::AsyncReadExt::read_exact(&mut client, &mut verdict)
            .await
            .unwrap();
        assert_eq!(verdict[0], ACCEPT);

        client.write_all(b"world").await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let saved = dir.path().join("hello.txt");
        let contents = tokio::fs::read(saved).await.unwrap();
        assert_eq!(contents, b"world");

        shutdown.cancel();
        let _ = server_handle.await;
    }

    #[tokio::test]
    async fn s3_reject_writes_reject_byte_and_skips_files() {
        let dir = tempdir().unwrap();
        let server = ReceiveServer::new(dir.path().to_owned());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let (requests_tx, mut requests_rx) = mpsc::channel(4);
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        let server_handle = tokio::spawn(async move {
            server.run(port, requests_tx, shutdown_clone).await
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let mut client = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let entries = vec![manifest::FileEntry::new("nope.txt", 5)];
        let encoded = manifest::encode(&entries).unwrap();
        client.write_all(&encoded).await.unwrap();

        let request = requests_rx.recv().await.unwrap();
        request.accept_tx.send(false).unwrap();

        let mut verdict = [0u8; 1];
        tokio::io::AsyncReadExt::read_exact(&mut client, &mut verdict)
            .await
            .unwrap();
        assert_eq!(verdict[0], REJECT);
        assert!(!dir.path().join("nope.txt").exists());

        shutdown.cancel();
        let _ = server_handle.await;
    }
}
