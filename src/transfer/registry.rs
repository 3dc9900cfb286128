//! Transfer Registry (C5, §4.4).
//!
//! A single `parking_lot::Mutex`-guarded table, in the same spirit as the
//! teacher's `AppState` (`src-tauri/src/state.rs`): plain state behind one
//! lock, accessed through small helper methods rather than exposed
//! directly. The `batchActive` exclusivity flag lives in the same lock
//! domain and is released via an RAII guard — the host language has real
//! destructors, so this is the natural (and stronger) replacement for the
//! "finally" idiom the distilled spec names (§4.4, §9).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;

/// Per-transfer control handles shared between the registry and the
/// sender/receiver task that owns the actual stream.
#[derive(Clone)]
pub struct TransferHandle {
    pub cancel: CancellationToken,
    pub paused: Arc<AtomicBool>,
}

impl TransferHandle {
    fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            paused: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }
}

struct Inner {
    transfers: HashMap<String, TransferHandle>,
    batch_active: bool,
}

/// Tracks every active transfer by id and enforces one-batch-at-a-time.
#[derive(Clone)]
pub struct TransferRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl TransferRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                transfers: HashMap::new(),
                batch_active: false,
            })),
        }
    }

    /// Register a new transfer id and return its control handle. A second
    /// registration under the same id replaces the first (ids are
    /// generated fresh per transfer, so callers should not reuse one).
    pub fn register(&self, id: String) -> TransferHandle {
        let handle = TransferHandle::new();
        self.inner.lock().transfers.insert(id, handle.clone());
        handle
    }

    /// Cancel the transfer if present. Idempotent: the second and later
    /// calls for the same id are no-ops and return `false`, matching the
    /// "at most one `transfer-error`" guarantee (§8 property 3).
    pub fn cancel(&self, id: &str) -> bool {
        let mut inner = self.inner.lock();
        match inner.transfers.remove(id) {
            Some(handle) => {
                handle.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn pause(&self, id: &str) {
        let inner = self.inner.lock();
        if let Some(handle) = inner.transfers.get(id) {
            handle.paused.store(true, Ordering::Release);
        }
    }

    pub fn resume(&self, id: &str) {
        let inner = self.inner.lock();
        if let Some(handle) = inner.transfers.get(id) {
            handle.paused.store(false, Ordering::Release);
        }
    }

    /// Drop the bookkeeping entry for a transfer that reached a terminal
    /// state (completed or failed) without going through `cancel`.
    pub fn remove(&self, id: &str) {
        self.inner.lock().transfers.remove(id);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.lock().transfers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().transfers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Attempt to begin a batch. Fails synchronously, with no side effects
    /// on the registry, if a batch is already in progress (§4.4, §8
    /// property 4). On success the returned guard clears `batchActive` on
    /// drop, however the batch's tasks exit (normal completion, error, or
    /// cancellation).
    pub fn try_begin_batch(&self) -> Result<BatchGuard, EngineError> {
        let mut inner = self.inner.lock();
        if inner.batch_active {
            return Err(EngineError::Concurrency(
                "a transfer batch is already active".to_string(),
            ));
        }
        inner.batch_active = true;
        Ok(BatchGuard {
            inner: self.inner.clone(),
        })
    }
}

impl Default for TransferRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard releasing `batchActive` when the batch ends by any path.
pub struct BatchGuard {
    inner: Arc<Mutex<Inner>>,
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        self.inner.lock().batch_active = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_idempotent() {
        let registry = TransferRegistry::new();
        registry.register("t1".to_string());
        assert!(registry.cancel("t1"));
        assert!(!registry.cancel("t1"));
        assert!(registry.is_empty());
    }

    #[test]
    fn batch_exclusivity_and_release() {
        let registry = TransferRegistry::new();
        let guard = registry.try_begin_batch().unwrap();
        assert!(registry.try_begin_batch().is_err());
        drop(guard);
        assert!(registry.try_begin_batch().is_ok());
    }

    #[test]
    fn pause_resume_round_trip() {
        let registry = TransferRegistry::new();
        let handle = registry.register("t1".to_string());
        assert!(!handle.is_paused());
        registry.pause("t1");
        assert!(handle.is_paused());
        registry.resume("t1");
        assert!(!handle.is_paused());
    }
}
