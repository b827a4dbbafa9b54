//! Lock-free buffer counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Running totals since the buffer was created. Every dropped event lands in
/// exactly one of the drop counters.
#[derive(Debug, Default)]
pub struct BufferMetrics {
    pub(crate) accepted: AtomicU64,
    pub(crate) overflow: AtomicU64,
    pub(crate) requeue_overflow: AtomicU64,
    pub(crate) unknown_user: AtomicU64,
    pub(crate) fatal_dropped: AtomicU64,
    pub(crate) lost_on_close: AtomicU64,
    pub(crate) flushes: AtomicU64,
    pub(crate) flush_failures: AtomicU64,
    pub(crate) flushed_events: AtomicU64,
}

/// Point-in-time copy of [`BufferMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferMetricsSnapshot {
    /// Events admitted into the buffer.
    pub accepted: u64,
    /// Events rejected because the buffer was full.
    pub overflow: u64,
    /// Events lost because the buffer filled up before a failed batch
    /// could be re-enqueued.
    pub requeue_overflow: u64,
    /// Events whose user has no member record.
    pub unknown_user: u64,
    /// Events dropped after exhausting their retry budget.
    pub fatal_dropped: u64,
    /// Events lost because the final flush on close failed.
    pub lost_on_close: u64,
    /// Successful non-empty flushes.
    pub flushes: u64,
    pub flush_failures: u64,
    /// Events counted into storage.
    pub flushed_events: u64,
}

impl BufferMetrics {
    pub(crate) fn add(counter: &AtomicU64, n: u64) -> u64 {
        counter.fetch_add(n, Ordering::Relaxed) + n
    }

    pub fn snapshot(&self) -> BufferMetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        BufferMetricsSnapshot {
            accepted: load(&self.accepted),
            overflow: load(&self.overflow),
            requeue_overflow: load(&self.requeue_overflow),
            unknown_user: load(&self.unknown_user),
            fatal_dropped: load(&self.fatal_dropped),
            lost_on_close: load(&self.lost_on_close),
            flushes: load(&self.flushes),
            flush_failures: load(&self.flush_failures),
            flushed_events: load(&self.flushed_events),
        }
    }
}

impl BufferMetricsSnapshot {
    /// Events dropped for any reason.
    pub fn dropped(&self) -> u64 {
        self.overflow
            + self.requeue_overflow
            + self.unknown_user
            + self.fatal_dropped
            + self.lost_on_close
    }
}
