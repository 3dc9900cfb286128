//! Integration tests exercising the engine façade end-to-end across two
//! in-process engine instances bound to loopback/ephemeral ports, covering
//! the round-trip fidelity, progress, cancel, and batch-exclusivity
//! properties the design calls for. Discovery-over-broadcast itself isn't
//! exercised here (loopback interfaces are excluded from presence traffic
//! by design); these tests drive the transfer path directly, the way the
//! teacher's own tests exercise `runtime/lan/peer.rs` sessions over real
//! sockets rather than mocks.

use std::path::PathBuf;
use std::time::Duration;

use etherlink_core::event::{Event, SendBatchRequest, TransferProgressStatus};
use etherlink_core::{spawn_engine, EngineConfig};
use sha2::{Digest, Sha256};
use tempfile::tempdir;

async fn next_matching<F>(events: &mut tokio::sync::mpsc::Receiver<Event>, mut pred: F) -> Event
where
    F: FnMut(&Event) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        let event = tokio::time::timeout(remaining, events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed early");
        if pred(&event) {
            return event;
        }
    }
}

fn sha256_of(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[tokio::test]
async fn round_trip_small_file_preserves_bytes() {
    let receiver_dir = tempdir().unwrap();
    let receiver_config = EngineConfig::for_test(0, 19101, receiver_dir.path().to_path_buf());
    let (receiver_handle, mut receiver_events) = spawn_engine(receiver_config).await;

    let source_dir = tempdir().unwrap();
    let source_path = source_dir.path().join("note.txt");
    let payload = b"the quick brown fox jumps over the lazy dog".repeat(200);
    tokio::fs::write(&source_path, &payload).await.unwrap();

    let sender_dir = tempdir().unwrap();
    let sender_config = EngineConfig::for_test(0, 19102, sender_dir.path().to_path_buf());
    let (sender_handle, mut sender_events) = spawn_engine(sender_config).await;

    let request = SendBatchRequest {
        batch_id: Some("s1".to_string()),
        peer_addresses: vec!["127.0.0.1".to_string()],
        file_paths: vec![source_path.clone()],
    };
    // The sender connects to the receiver's transfer port, not its own.
    let batch_id = sender_handle.send_batch(request).await.unwrap();
    assert_eq!(batch_id, "s1");

    let complete = next_matching(&mut receiver_events, |e| {
        matches!(e, Event::TransferComplete { .. })
    })
    .await;
    let Event::TransferComplete { path, .. } = complete else {
        unreachable!()
    };
    let written = tokio::fs::read(path.unwrap()).await.unwrap();
    assert_eq!(sha256_of(&written), sha256_of(&payload));

    let _ = next_matching(&mut sender_events, |e| {
        matches!(e, Event::TransferComplete { .. })
    })
    .await;

    sender_handle.shutdown().await;
    receiver_handle.shutdown().await;
}

#[tokio::test]
async fn progress_events_are_monotone_and_reach_100_percent() {
    let receiver_dir = tempdir().unwrap();
    let receiver_config = EngineConfig::for_test(0, 19111, receiver_dir.path().to_path_buf());
    let (receiver_handle, mut receiver_events) = spawn_engine(receiver_config).await;

    let source_dir = tempdir().unwrap();
    let source_path = source_dir.path().join("big.bin");
    let payload = vec![7u8; 4 * 1024 * 1024];
    tokio::fs::write(&source_path, &payload).await.unwrap();

    let sender_dir = tempdir().unwrap();
    let sender_config = EngineConfig::for_test(0, 19112, sender_dir.path().to_path_buf());
    let (sender_handle, _sender_events) = spawn_engine(sender_config).await;

    let request = SendBatchRequest {
        batch_id: Some("s3".to_string()),
        peer_addresses: vec!["127.0.0.1".to_string()],
        file_paths: vec![source_path.clone()],
    };
    sender_handle.send_batch(request).await.unwrap();

    let mut last_pct = -1i32;
    loop {
        let event = next_matching(&mut receiver_events, |e| {
            matches!(
                e,
                Event::TransferProgress {
                    status: TransferProgressStatus::Receiving,
                    ..
                } | Event::TransferComplete { .. }
            )
        })
        .await;
        match event {
            Event::TransferProgress { progress_pct, .. } => {
                assert!(progress_pct as i32 >= last_pct);
                last_pct = progress_pct as i32;
            }
            Event::TransferComplete { .. } => break,
            _ => unreachable!(),
        }
    }

    sender_handle.shutdown().await;
    receiver_handle.shutdown().await;
}

#[tokio::test]
async fn cancel_mid_stream_is_idempotent_and_clears_registry() {
    let receiver_dir = tempdir().unwrap();
    let receiver_config = EngineConfig::for_test(0, 19121, receiver_dir.path().to_path_buf());
    let (receiver_handle, mut receiver_events) = spawn_engine(receiver_config).await;

    let source_dir = tempdir().unwrap();
    let source_path = source_dir.path().join("large.bin");
    let payload = vec![3u8; 16 * 1024 * 1024];
    tokio::fs::write(&source_path, &payload).await.unwrap();

    let sender_dir = tempdir().unwrap();
    let sender_config = EngineConfig::for_test(0, 19122, sender_dir.path().to_path_buf());
    let (sender_handle, _sender_events) = spawn_engine(sender_config).await;

    let request = SendBatchRequest {
        batch_id: Some("s4".to_string()),
        peer_addresses: vec!["127.0.0.1".to_string()],
        file_paths: vec![source_path.clone()],
    };
    let batch_id = sender_handle.send_batch(request).await.unwrap();

    let _ = next_matching(&mut receiver_events, |e| {
        matches!(e, Event::TransferProgress { .. })
    })
    .await;

    sender_handle.cancel_transfer(batch_id.clone()).await;
    sender_handle.cancel_transfer(batch_id.clone()).await;

    tokio::time::sleep(Duration::from_millis(200)).await;

    let second_request = SendBatchRequest {
        batch_id: Some("s4-again".to_string()),
        peer_addresses: vec!["127.0.0.1".to_string()],
        file_paths: vec![source_path],
    };
    let result = sender_handle.send_batch(second_request).await;
    assert!(result.is_ok(), "batchActive must be released after cancel");

    sender_handle.shutdown().await;
    receiver_handle.shutdown().await;
}

#[tokio::test]
async fn concurrent_send_batch_is_exclusive() {
    let receiver_dir = tempdir().unwrap();
    let receiver_config = EngineConfig::for_test(0, 19131, receiver_dir.path().to_path_buf());
    let (receiver_handle, _events) = spawn_engine(receiver_config).await;

    let source_dir = tempdir().unwrap();
    let source_path = source_dir.path().join("x.bin");
    tokio::fs::write(&source_path, vec![1u8; 2 * 1024 * 1024]).await.unwrap();

    let sender_dir = tempdir().unwrap();
    let sender_config = EngineConfig::for_test(0, 19132, sender_dir.path().to_path_buf());
    let (sender_handle, _sender_events) = spawn_engine(sender_config).await;

    let make_request = |id: &str| SendBatchRequest {
        batch_id: Some(id.to_string()),
        peer_addresses: vec!["127.0.0.1".to_string()],
        file_paths: vec![source_path.clone()],
    };

    let first = sender_handle.send_batch(make_request("batch-a")).await;
    let second = sender_handle.send_batch(make_request("batch-b")).await;

    assert!(first.is_ok());
    assert!(second.is_err());

    sender_handle.shutdown().await;
    receiver_handle.shutdown().await;
}

#[tokio::test]
async fn send_batch_fails_fast_for_missing_file() {
    let sender_dir = tempdir().unwrap();
    let sender_config = EngineConfig::for_test(0, 19141, sender_dir.path().to_path_buf());
    let (sender_handle, _events) = spawn_engine(sender_config).await;

    let request = SendBatchRequest {
        batch_id: None,
        peer_addresses: vec!["127.0.0.1".to_string()],
        file_paths: vec![PathBuf::from("/nonexistent/path/does-not-exist.bin")],
    };
    let result = sender_handle.send_batch(request).await;
    assert!(result.is_err());

    // The failed validation must not have left batchActive held.
    let retry = sender_handle
        .send_batch(SendBatchRequest {
            batch_id: None,
            peer_addresses: vec!["127.0.0.1".to_string()],
            file_paths: vec![PathBuf::from("/nonexistent/path/does-not-exist.bin")],
        })
        .await;
    assert!(retry.is_err());

    sender_handle.shutdown().await;
}

#[tokio::test]
async fn check_peer_reports_reachability() {
    let receiver_dir = tempdir().unwrap();
    let receiver_config = EngineConfig::for_test(0, 19151, receiver_dir.path().to_path_buf());
    let (receiver_handle, _events) = spawn_engine(receiver_config).await;

    let sender_dir = tempdir().unwrap();
    let sender_config = EngineConfig::for_test(0, 19152, sender_dir.path().to_path_buf());
    let (sender_handle, _sender_events) = spawn_engine(sender_config).await;

    assert!(sender_handle.check_peer("127.0.0.1".to_string()).await);

    sender_handle.shutdown().await;
    receiver_handle.shutdown().await;
}
