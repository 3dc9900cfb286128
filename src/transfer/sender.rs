//! Transfer Sender (C4, §4.4).
//!
//! The connect-then-log shape is grounded on the teacher's `run_tcp_client`
//! (`runtime/lan/peer.rs`); unlike the teacher's session, which reconnects
//! indefinitely with back-off, a file send is a single attempt bounded by a
//! connect timeout (§4.4 "5 s") — there is no retry, since a failed
//! connection simply fails that transfer.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::Level;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use uuid::Uuid;

use super::protocol::{TransferMetadata, CONNECT_TIMEOUT_MS, INTER_FILE_PAUSE_MS, IO_IDLE_TIMEOUT_MS};
use super::registry::TransferRegistry;
use crate::event::{Event, LogEvent, TransferProgressStatus};
use crate::progress::ProgressThrottle;

const COPY_CHUNK_SIZE: usize = 64 * 1024;

/// Drive every (peer, file) pair in a batch: one task per peer, files
/// within a peer sent strictly in order with a pause between them (§4.4
/// "Batching" — "distinct peers are sent to in parallel ... files are sent
/// serially per peer").
pub async fn run_batch(
    batch_id: String,
    targets: Vec<(String, Vec<PathBuf>)>,
    transfer_port: u16,
    registry: TransferRegistry,
    events: mpsc::Sender<Event>,
) {
    let mut peer_tasks = Vec::new();
    for (peer_address, files) in targets {
        let batch_id = batch_id.clone();
        let registry = registry.clone();
        let events = events.clone();
        peer_tasks.push(tokio::spawn(async move {
            send_files_to_peer(batch_id, peer_address, files, transfer_port, registry, events)
                .await;
        }));
    }
    for task in peer_tasks {
        let _ = task.await;
    }
}

async fn send_files_to_peer(
    batch_id: String,
    peer_address: String,
    files: Vec<PathBuf>,
    transfer_port: u16,
    registry: TransferRegistry,
    events: mpsc::Sender<Event>,
) {
    for (index, file_path) in files.iter().enumerate() {
        let transfer_id = if files.len() == 1 {
            batch_id.clone()
        } else {
            format!("{batch_id}-{index}")
        };
        send_one_file(&transfer_id, &peer_address, file_path, transfer_port, &registry, &events)
            .await;

        if index + 1 < files.len() {
            tokio::time::sleep(Duration::from_millis(INTER_FILE_PAUSE_MS)).await;
        }
    }
}

async fn send_one_file(
    transfer_id: &str,
    peer_address: &str,
    file_path: &Path,
    transfer_port: u16,
    registry: &TransferRegistry,
    events: &mpsc::Sender<Event>,
) {
    let filename = file_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let metadata = match tokio::fs::metadata(file_path).await {
        Ok(meta) => meta,
        Err(e) => {
            let _ = events
                .send(Event::TransferError {
                    transfer_id: transfer_id.to_string(),
                    error: format!("{} not found: {e}", file_path.display()),
                })
                .await;
            return;
        }
    };

    let handle = registry.register(transfer_id.to_string());

    let _ = events
        .send(Event::TransferProgress {
            transfer_id: transfer_id.to_string(),
            status: TransferProgressStatus::Connecting,
            filename: filename.clone(),
            progress_pct: 0,
            bytes: 0,
            total: metadata.len(),
            speed_mb_s: 0.0,
        })
        .await;

    let dest = format!("{peer_address}:{transfer_port}");
    let connect_result = timeout(
        Duration::from_millis(CONNECT_TIMEOUT_MS),
        TcpStream::connect(&dest),
    )
    .await;

    let mut stream = match connect_result {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            registry.remove(transfer_id);
            emit_error(events, transfer_id, format!("connect to {dest} failed: {e}")).await;
            return;
        }
        Err(_) => {
            registry.remove(transfer_id);
            emit_error(events, transfer_id, format!("connect to {dest} timed out")).await;
            return;
        }
    };

    if handle.cancel.is_cancelled() {
        registry.remove(transfer_id);
        emit_error(events, transfer_id, "cancelled".to_string()).await;
        return;
    }

    let header = TransferMetadata::new(transfer_id, filename.clone(), metadata.len()).encode_line();
    // The flush must complete — and be observed — before any payload byte
    // is written, so a cancel arriving between write and flush can still
    // abort without having produced a parseable header on the wire (§4.4
    // "Why the flush matters").
    if let Err(e) = stream.write_all(&header).await {
        registry.remove(transfer_id);
        emit_error(events, transfer_id, format!("metadata write failed: {e}")).await;
        return;
    }
    if let Err(e) = stream.flush().await {
        registry.remove(transfer_id);
        emit_error(events, transfer_id, format!("metadata flush failed: {e}")).await;
        return;
    }
    if handle.cancel.is_cancelled() {
        registry.remove(transfer_id);
        emit_error(events, transfer_id, "cancelled".to_string()).await;
        return;
    }

    let result = stream_file(&mut stream, file_path, metadata.len(), &handle, transfer_id, &filename, events)
        .await;

    registry.remove(transfer_id);

    match result {
        Ok(()) => {
            let _ = stream.shutdown().await;
            let _ = events
                .send(Event::TransferComplete {
                    transfer_id: transfer_id.to_string(),
                    filename,
                    path: Some(file_path.to_path_buf()),
                })
                .await;
        }
        Err(e) => {
            emit_error(events, transfer_id, e).await;
        }
    }
}

async fn stream_file(
    stream: &mut TcpStream,
    file_path: &Path,
    total: u64,
    handle: &super::registry::TransferHandle,
    transfer_id: &str,
    filename: &str,
    events: &mpsc::Sender<Event>,
) -> Result<(), String> {
    let mut file = File::open(file_path)
        .await
        .map_err(|e| format!("failed to open {}: {e}", file_path.display()))?;

    let mut throttle = ProgressThrottle::new();
    let mut buf = vec![0u8; COPY_CHUNK_SIZE];
    let mut sent: u64 = 0;
    let started = tokio::time::Instant::now();

    emit_sending(events, transfer_id, filename, 0, 0, total, 0.0);

    loop {
        if handle.cancel.is_cancelled() {
            return Err("cancelled".to_string());
        }
        while handle.is_paused() {
            tokio::time::sleep(Duration::from_millis(50)).await;
            if handle.cancel.is_cancelled() {
                return Err("cancelled".to_string());
            }
        }

        let n = timeout(Duration::from_millis(IO_IDLE_TIMEOUT_MS), file.read(&mut buf))
            .await
            .map_err(|_| "read timed out".to_string())?
            .map_err(|e| format!("read error: {e}"))?;
        if n == 0 {
            break;
        }
        timeout(
            Duration::from_millis(IO_IDLE_TIMEOUT_MS),
            stream.write_all(&buf[..n]),
        )
        .await
        .map_err(|_| "write timed out".to_string())?
        .map_err(|e| format!("write error: {e}"))?;
        sent += n as u64;

        if throttle.should_emit(sent, false) {
            let pct = ((sent as f64 / total.max(1) as f64) * 100.0) as u8;
            let speed = throttle.speed_mb_per_sec(sent, started.elapsed());
            emit_sending(events, transfer_id, filename, pct, sent, total, speed);
        }
    }

    Ok(())
}

async fn emit_error(events: &mpsc::Sender<Event>, transfer_id: &str, error: String) {
    log_line(events, Level::Warn, format!("transfer {transfer_id} failed: {error}")).await;
    let _ = events
        .send(Event::TransferError {
            transfer_id: transfer_id.to_string(),
            error,
        })
        .await;
}

async fn log_line(events: &mpsc::Sender<Event>, level: Level, message: String) {
    let _ = events.send(Event::Log(LogEvent::new(level, message))).await;
}

/// Non-blocking: progress delivery must never stall the data-plane copy
/// loop on a slow consumer (§5), so a full event channel simply drops this
/// sample rather than awaiting capacity.
fn emit_sending(
    events: &mpsc::Sender<Event>,
    transfer_id: &str,
    filename: &str,
    pct: u8,
    bytes: u64,
    total: u64,
    speed: f64,
) {
    let _ = events.try_send(Event::TransferProgress {
        transfer_id: transfer_id.to_string(),
        status: TransferProgressStatus::Sending,
        filename: filename.to_string(),
        progress_pct: pct,
        bytes,
        total,
        speed_mb_s: speed,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn send_one_file_writes_metadata_and_payload() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let dir = tempdir().unwrap();
        let file_path = dir.path().join("data.bin");
        tokio::fs::write(&file_path, b"0123456789").await.unwrap();

        let registry = TransferRegistry::new();
        let (tx, mut rx) = mpsc::channel(64);

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut byte = [0u8; 1];
            loop {
                stream.read_exact(&mut byte).await.unwrap();
                if byte[0] == b'\n' {
                    break;
                }
                buf.push(byte[0]);
            }
            let meta = TransferMetadata::decode(&buf).unwrap();
            let mut payload = vec![0u8; meta.size as usize];
            stream.read_exact(&mut payload).await.unwrap();
            (meta, payload)
        });

        send_one_file(
            "t-1",
            &addr.ip().to_string(),
            &file_path,
            addr.port(),
            &registry,
            &tx,
        )
        .await;

        let (meta, payload) = server.await.unwrap();
        assert_eq!(meta.name, "data.bin");
        assert_eq!(payload, b"0123456789");

        let mut saw_complete = false;
        while let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
            if matches!(event, Event::TransferComplete { .. }) {
                saw_complete = true;
            }
        }
        assert!(saw_complete);
    }
}
