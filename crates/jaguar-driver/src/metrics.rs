//! Receive-path health counters.
//!
//! Lock-free counters bumped by the receive thread and read from
//! anywhere. Framing and telemetry faults are recovered locally, so
//! these counters (plus the log) are the only place they surface.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters owned by the bridge.
#[derive(Debug, Default)]
pub struct BridgeMetrics {
    /// Well-formed messages decoded from the byte stream.
    pub frames_decoded: AtomicU64,
    /// Frames dropped to resynchronization (bad escape, bad length,
    /// interrupted frame).
    pub framing_faults: AtomicU64,
    /// Decoded messages with no pending token and no subscriber.
    pub unmatched_dropped: AtomicU64,
    /// Token fulfillments that replaced a value nobody had collected.
    pub token_overwrites: AtomicU64,
    /// Replies truncated to the registered destination length.
    pub payloads_clipped: AtomicU64,
}

impl BridgeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consistent-enough snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            framing_faults: self.framing_faults.load(Ordering::Relaxed),
            unmatched_dropped: self.unmatched_dropped.load(Ordering::Relaxed),
            token_overwrites: self.token_overwrites.load(Ordering::Relaxed),
            payloads_clipped: self.payloads_clipped.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of the counters at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub frames_decoded: u64,
    pub framing_faults: u64,
    pub unmatched_dropped: u64,
    pub token_overwrites: u64,
    pub payloads_clipped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let metrics = BridgeMetrics::new();
        metrics.frames_decoded.fetch_add(3, Ordering::Relaxed);
        metrics.framing_faults.fetch_add(1, Ordering::Relaxed);
        let snap = metrics.snapshot();
        assert_eq!(snap.frames_decoded, 3);
        assert_eq!(snap.framing_faults, 1);
        assert_eq!(snap.unmatched_dropped, 0);
    }
}
