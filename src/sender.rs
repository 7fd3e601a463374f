use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::conduit::CancellableConn;
use crate::error::TransferError;
use crate::manifest::{self, FileEntry};
use crate::peer::PeerCoordinates;
use crate::prelude::*;
use crate::progress::{copy_with_progress, ProgressSink};

const ACCEPT: u8 = 1;

/// One file queued for sending: the path on disk plus the name and size
/// that go into the manifest (the manifest name need not equal the file's
/// base name, though `send_files` below uses the base name).
pub struct Outbound {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
}

impl Outbound {
    /// Stats `path` on disk and derives the manifest name from its file
    /// name component.
    pub async fn from_path(path: impl Into<PathBuf>) -> Result<Self, TransferError> {
        let path = path.into();
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|source| TransferError::StatFile {
                path: path.clone(),
                source,
            })?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_owned());

        Ok(Self {
            path,
            name,
            size: metadata.len(),
        })
    }
}

/// Connects to a peer, sends the manifest for `files`, waits for the
/// accept/reject verdict, and on accept streams every file in manifest
/// order.
#[instrument(skip(files, progress, shutdown), fields(peer_addr = %target.addr, peer_port = target.port))]
pub async fn send_files(
    target: PeerCoordinates,
    files: &[Outbound],
    progress: mpsc::Sender<u64>,
    shutdown: CancellationToken,
) -> Result<(), TransferError> {
    let entries: Vec<FileEntry> = files
        .iter()
        .map(|f| FileEntry::new(f.name.clone(), f.size))
        .collect();
    let encoded = manifest::encode(&entries)?;

    let stream = TcpStream::connect((target.addr, target.port))
        .await
        .map_err(TransferError::ConnectionDropped)?;
    let mut conn = CancellableConn::new(stream, shutdown.clone());

    info!(file_count = files.len(), "sending manifest");
    conn.write_all(&encoded).await?;

    let mut verdict = [0u8; 1];
    conn.read_exact(&mut verdict).await?;

    if verdict[0] != ACCEPT {
        info!("peer rejected the transfer");
        return Err(TransferError::TransferRejected);
    }

    info!("transfer accepted, sending files");
    let mut stream = conn.into_inner();
    let sink = ProgressSink::new(progress);

    for outbound in files {
        send_one_file(&mut stream, &outbound.path, outbound.size, &sink, &shutdown).await?;
        debug!(name = %outbound.name, size = outbound.size, "file sent");
    }

    info!("transfer complete");
    Ok(())
}

async fn send_one_file(
    stream: &mut TcpStream,
    path: &Path,
    size: u64,
    progress: &ProgressSink,
    shutdown: &CancellationToken,
) -> Result<(), TransferError> {
    let mut file = File::open(path)
        .await
        .map_err(|source| TransferError::SendFile {
            path: path.to_owned(),
            source,
        })?;

    copy_with_progress(&mut file, stream, size, progress, shutdown).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::io::AsyncWriteExt as _;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn s4_sends_manifest_then_payload_in_order() {
        let dir = tempdir().unwrap();
        let file_a = dir.path().join("a.bin");
        let file_b = dir.path().join("b.bin");
        tokio::fs::write(&file_a, b"aaaa").await.unwrap();
        tokio::fs::write(&file_b, b"bb").await.unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();

            let mut prefix = [0u8; 4];
            stream.read_exact(&mut prefix).await.unwrap();
            let header_size = u16::from_be_bytes([prefix[0], prefix[1]]) as usize;
            let mut buf = vec![0u8; header_size];
            buf[..4].copy_from_slice(&prefix);
            stream.read_exact(&mut buf[4..]).await.unwrap();
            let manifest = manifest::decode(&buf).unwrap();

            stream.write_all(&[ACCEPT]).await.unwrap();

            let mut received = Vec::new();
            for entry in &manifest.entries {
                let mut payload = vec![0u8; entry.size as usize];
                stream.read_exact(&mut payload).await.unwrap();
                received.push((entry.name.clone(), payload));
            }
            received
        });

        let (progress_tx, _progress_rx) = mpsc::channel(16);
        let shutdown = CancellationToken::new();

        let files = vec![
            Outbound::from_path(&file_a).await.unwrap(),
            Outbound::from_path(&file_b).await.unwrap(),
        ];

        let target = PeerCoordinates {
            addr: match addr.ip() {
                std::net::IpAddr::V4(v4) => v4,
                _ => unreachable!(),
            },
            port: addr.port(),
        };

        send_files(target, &files, progress_tx, shutdown)
            .await
            .unwrap();

        let received = server.await.unwrap();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0], ("a.bin".to_string(), b"aaaa".to_vec()));
        assert_eq!(received[1], ("b.bin".to_string(), b"bb".to_vec()));
    }

    #[tokio::test]
    async fn s3_reject_surfaces_transfer_rejected() {
        let dir = tempdir().unwrap();
        let file_a = dir.path().join("a.bin");
        tokio::fs::write(&file_a, b"x").await.unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut prefix = [0u8; 4];
            stream.read_exact(&mut prefix).await.unwrap();
            let header_size = u16::from_be_bytes([prefix[0], prefix[1]]) as usize;
            let mut buf = vec![0u8; header_size];
            buf[..4].copy_from_slice(&prefix);
            stream.read_exact(&mut buf[4..]).await.unwrap();
            stream.write_all(&[0u8]).await.unwrap();
        });

        let (progress_tx, _progress_rx) = mpsc::channel(16);
        let shutdown = CancellationToken::new();
        let files = vec![Outbound::from_path(&file_a).await.unwrap()];
        let target = PeerCoordinates {
            addr: match addr.ip() {
                std::net::IpAddr::V4(v4) => v4,
                _ => unreachable!(),
            },
            port: addr.port(),
        };

        let err = send_files(target, &files, progress_tx, shutdown)
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::TransferRejected));
        server.await.unwrap();
    }
}
