//! Transfer Listener (C3, §4.3).
//!
//! The accept loop's shape — `TcpListener::accept` in a `tokio::select!`
//! against a `CancellationToken`, one task per connection — is grounded on
//! the teacher's `run_tcp_host` (`runtime/lan/peer.rs`). The metadata/
//! payload handover has no teacher equivalent (the teacher's protocol is
//! pure length-prefixed framing with no leftover-byte problem): it follows
//! the "explicit leftover buffer" strategy this spec calls for — read the
//! header byte-by-byte through a `BufReader`, then chain whatever the
//! `BufReader` had already buffered past the header with the raw socket
//! before attaching the file-writing copy loop, so no payload byte is
//! dropped or mistaken for metadata.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::time::Duration;

use log::Level;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::protocol::{TransferMetadata, MAX_METADATA_BYTES};
use super::registry::TransferRegistry;
use crate::event::{Event, LogEvent, TransferProgressStatus};
use crate::progress::ProgressThrottle;

const COPY_CHUNK_SIZE: usize = 64 * 1024;

/// Accept inbound transfer connections for the engine's lifetime. Bound
/// independently of discovery state (§4.2 "The TCP listener port (9001) is
/// bound for the entire lifetime of the engine").
pub async fn run_transfer_listener(
    listener: TcpListener,
    downloads_dir: PathBuf,
    registry: TransferRegistry,
    events: mpsc::Sender<Event>,
    cancel: CancellationToken,
) {
    log_line(&events, Level::Info, "transfer listener started".to_string()).await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer_addr)) => {
                        let downloads_dir = downloads_dir.clone();
                        let registry = registry.clone();
                        let events = events.clone();
                        let conn_cancel = cancel.child_token();
                        tokio::spawn(async move {
                            handle_connection(stream, downloads_dir, registry, events, conn_cancel).await;
                        });
                        let _ = peer_addr;
                    }
                    Err(e) => {
                        log_line(&events, Level::Warn, format!("transfer accept error: {e}")).await;
                    }
                }
            }
        }
    }

    log_line(&events, Level::Debug, "transfer listener stopped".to_string()).await;
}

async fn handle_connection(
    stream: TcpStream,
    downloads_dir: PathBuf,
    registry: TransferRegistry,
    events: mpsc::Sender<Event>,
    cancel: CancellationToken,
) {
    let provisional_id = Uuid::new_v4().to_string();

    let _ = events
        .send(Event::TransferProgress {
            transfer_id: provisional_id.clone(),
            status: TransferProgressStatus::Connecting,
            filename: String::new(),
            progress_pct: 0,
            bytes: 0,
            total: 0,
            speed_mb_s: 0.0,
        })
        .await;

    let mut reader = BufReader::new(stream);
    let metadata = match read_metadata_line(&mut reader).await {
        Ok(meta) => meta,
        Err(e) => {
            let _ = events
                .send(Event::TransferError {
                    transfer_id: provisional_id,
                    error: e,
                })
                .await;
            return;
        }
    };

    // The metadata may carry its own transfer id, which supersedes the
    // provisional one in every subsequent event; absent, the provisional id
    // generated on accept is kept (§4.3).
    let transfer_id = metadata
        .transfer_id
        .clone()
        .unwrap_or_else(|| provisional_id.clone());
    let handle = registry.register(transfer_id.clone());

    let leftover = reader.buffer().to_vec();
    let socket = reader.into_inner();
    let mut source = Cursor::new(leftover).chain(socket);

    let result = receive_payload(
        &mut source,
        &downloads_dir,
        &metadata,
        &handle,
        &transfer_id,
        &events,
    )
    .await;

    registry.remove(&transfer_id);

    match result {
        Ok(path) => {
            let _ = events
                .send(Event::TransferComplete {
                    transfer_id,
                    filename: metadata.name,
                    path: Some(path),
                })
                .await;
        }
        Err(e) => {
            let _ = events
                .send(Event::TransferError {
                    transfer_id,
                    error: e,
                })
                .await;
        }
    }
}

async fn read_metadata_line(
    reader: &mut BufReader<TcpStream>,
) -> Result<TransferMetadata, String> {
    let mut header = Vec::new();
    loop {
        let mut byte = [0u8; 1];
        reader
            .read_exact(&mut byte)
            .await
            .map_err(|e| format!("metadata read failed: {e}"))?;
        if byte[0] == b'\n' {
            break;
        }
        header.push(byte[0]);
        if header.len() > MAX_METADATA_BYTES {
            return Err("metadata exceeded 64 KiB without a terminator".to_string());
        }
    }
    TransferMetadata::decode(&header).ok_or_else(|| "malformed transfer metadata".to_string())
}

async fn receive_payload<R>(
    source: &mut R,
    downloads_dir: &Path,
    metadata: &TransferMetadata,
    handle: &super::registry::TransferHandle,
    transfer_id: &str,
    events: &mpsc::Sender<Event>,
) -> Result<PathBuf, String>
where
    R: tokio::io::AsyncRead + Unpin,
{
    tokio::fs::create_dir_all(downloads_dir)
        .await
        .map_err(|e| format!("failed to prepare downloads directory: {e}"))?;
    let basename = Path::new(&metadata.name)
        .file_name()
        .ok_or_else(|| "declared file name has no basename component".to_string())?;
    let dest_path = downloads_dir.join(basename);
    let mut file = File::create(&dest_path)
        .await
        .map_err(|e| format!("failed to create {}: {e}", dest_path.display()))?;

    let mut throttle = ProgressThrottle::new();
    let mut buf = vec![0u8; COPY_CHUNK_SIZE];
    let mut received: u64 = 0;
    let started = tokio::time::Instant::now();

    emit_receiving(events, transfer_id, &metadata.name, 0, metadata.size, 0.0);

    while received < metadata.size {
        if handle.cancel.is_cancelled() {
            return Err("cancelled".to_string());
        }
        while handle.is_paused() {
            tokio::time::sleep(Duration::from_millis(50)).await;
            if handle.cancel.is_cancelled() {
                return Err("cancelled".to_string());
            }
        }

        let remaining = (metadata.size - received) as usize;
        let to_read = remaining.min(buf.len());
        let n = source
            .read(&mut buf[..to_read])
            .await
            .map_err(|e| format!("read error: {e}"))?;
        if n == 0 {
            return Err("stream ended before declared size was received".to_string());
        }
        file.write_all(&buf[..n])
            .await
            .map_err(|e| format!("write error: {e}"))?;
        received += n as u64;

        if throttle.should_emit(received, false) {
            let pct = ((received as f64 / metadata.size.max(1) as f64) * 100.0) as u8;
            let speed = throttle.speed_mb_per_sec(received, started.elapsed());
            emit_receiving(events, transfer_id, &metadata.name, pct, metadata.size, speed);
        }
    }

    file.flush().await.map_err(|e| format!("flush error: {e}"))?;
    Ok(dest_path)
}

/// Non-blocking: progress delivery must never stall the data-plane copy
/// loop on a slow consumer (§5), so a full event channel simply drops this
/// sample rather than awaiting capacity.
fn emit_receiving(
    events: &mpsc::Sender<Event>,
    transfer_id: &str,
    filename: &str,
    pct: u8,
    total: u64,
    speed: f64,
) {
    let _ = events.try_send(Event::TransferProgress {
        transfer_id: transfer_id.to_string(),
        status: TransferProgressStatus::Receiving,
        filename: filename.to_string(),
        progress_pct: pct,
        bytes: (total as f64 * (pct as f64 / 100.0)) as u64,
        total,
        speed_mb_s: speed,
    });
}

async fn log_line(events: &mpsc::Sender<Event>, level: Level, message: String) {
    let _ = events.send(Event::Log(LogEvent::new(level, message))).await;
}
