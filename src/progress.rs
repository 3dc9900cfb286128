//! Throttled progress emission shared by the transfer listener (C3) and
//! sender (C4).
//!
//! Per §3/§5: progress events for a given transfer are emitted no more than
//! once every 500ms, plus a guaranteed event at 0% and one at the terminal
//! transition. There's no teacher equivalent of this exact policy — the
//! closest idiom is the heartbeat `interval()` in `runtime/lan/peer.rs`, but
//! that's a fixed tick, whereas this needs last-emit gating around
//! data-driven events, so it's a small standalone guard.

use std::time::Duration;

use tokio::time::Instant;

pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

pub struct ProgressThrottle {
    last_emit: Option<Instant>,
    last_bytes: u64,
}

impl ProgressThrottle {
    pub fn new() -> Self {
        Self {
            last_emit: None,
            last_bytes: 0,
        }
    }

    /// Returns `true` when a progress event for `bytes` transferred should
    /// be emitted now. Always true for the very first call (the guaranteed
    /// 0%/start event) and for `force` (used for the terminal event).
    pub fn should_emit(&mut self, bytes: u64, force: bool) -> bool {
        let now = Instant::now();
        let due = match self.last_emit {
            None => true,
            Some(last) => now.duration_since(last) >= PROGRESS_INTERVAL,
        };
        if force || due {
            self.last_emit = Some(now);
            self.last_bytes = bytes;
            true
        } else {
            false
        }
    }

    /// Instantaneous transfer rate in MB/s since the last emitted sample.
    pub fn speed_mb_per_sec(&self, bytes: u64, elapsed: Duration) -> f64 {
        if elapsed.as_secs_f64() <= 0.0 {
            return 0.0;
        }
        let delta = bytes.saturating_sub(self.last_bytes) as f64;
        (delta / elapsed.as_secs_f64()) / (1024.0 * 1024.0)
    }
}

impl Default for ProgressThrottle {
    fn default() -> Self {
        Self::new()
    }
}
