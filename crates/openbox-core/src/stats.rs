//! Execution Statistics
//!
//! Lock-free counters shared between the worker that owns a graph and the
//! callers observing it.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-block counters (cache-line aligned)
#[repr(C, align(64))]
#[derive(Default)]
pub struct BlockStats {
    pub received: AtomicU64,
    pub forwarded: AtomicU64,
    pub dropped: AtomicU64,
}

impl BlockStats {
    #[inline(always)]
    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_forwarded(&self, n: u64) {
        self.forwarded.fetch_add(n, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> BlockStatsSnapshot {
        BlockStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BlockStatsSnapshot {
    pub received: u64,
    pub forwarded: u64,
    pub dropped: u64,
}

/// Engine-wide counters
#[derive(Default)]
pub struct EngineStats {
    /// Packets accepted at ingress
    pub injected: AtomicU64,
    /// Packets whose traversal finished
    pub completed: AtomicU64,
    /// Packets dropped at some block
    pub dropped: AtomicU64,
    /// Packets still queued when the drain timeout expired
    pub discarded: AtomicU64,
    /// Bytes accepted at ingress
    pub bytes: AtomicU64,
}

impl EngineStats {
    #[inline(always)]
    pub fn record_injected(&self, bytes: u64) {
        self.injected.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discarded(&self, n: u64) {
        self.discarded.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            injected: self.injected.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }
}

/// Stats snapshot (non-atomic)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStatsSnapshot {
    pub injected: u64,
    pub completed: u64,
    pub dropped: u64,
    pub discarded: u64,
    pub bytes: u64,
}

impl EngineStatsSnapshot {
    /// Packets accepted but not yet finished
    pub fn in_flight(&self) -> u64 {
        self.injected.saturating_sub(self.completed + self.discarded)
    }

    pub fn packet_rate_kpps(&self, elapsed_secs: f64) -> f64 {
        if elapsed_secs == 0.0 {
            return 0.0;
        }
        self.completed as f64 / (elapsed_secs * 1_000.0)
    }
}

/// Counters for every block of one graph, indexed like the graph
pub struct GraphStats {
    blocks: Vec<(String, BlockStats)>,
}

impl GraphStats {
    pub fn new<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            blocks: names.into_iter().map(|n| (n.to_string(), BlockStats::default())).collect(),
        }
    }

    #[inline(always)]
    pub fn block(&self, idx: usize) -> &BlockStats {
        &self.blocks[idx].1
    }

    pub fn snapshot(&self) -> Vec<(String, BlockStatsSnapshot)> {
        self.blocks.iter().map(|(n, s)| (n.clone(), s.snapshot())).collect()
    }

    pub fn get(&self, name: &str) -> Option<BlockStatsSnapshot> {
        self.blocks.iter().find(|(n, _)| n == name).map(|(_, s)| s.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_stats() {
        let stats = BlockStats::default();
        stats.record_received();
        stats.record_received();
        stats.record_forwarded(3);
        stats.record_drop();

        let snap = stats.snapshot();
        assert_eq!(snap.received, 2);
        assert_eq!(snap.forwarded, 3);
        assert_eq!(snap.dropped, 1);
    }

    #[test]
    fn test_engine_in_flight() {
        let stats = EngineStats::default();
        for _ in 0..5 {
            stats.record_injected(60);
        }
        stats.record_completed();
        stats.record_completed();
        stats.record_discarded(1);

        let snap = stats.snapshot();
        assert_eq!(snap.bytes, 300);
        assert_eq!(snap.in_flight(), 2);
        assert_eq!(snap.packet_rate_kpps(0.0), 0.0);
    }

    #[test]
    fn test_graph_stats_lookup() {
        let stats = GraphStats::new(["a", "b"]);
        stats.block(1).record_received();

        assert_eq!(stats.get("b").unwrap().received, 1);
        assert!(stats.get("c").is_none());
    }
}
