//! Interop statistics
//!
//! Counters shared by every proxy and stub of one [`MarshalContext`](crate::MarshalContext).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct InteropStats {
    calls_sent: AtomicU64,
    calls_dispatched: AtomicU64,
    calls_failed: AtomicU64,
    marshaling_errors: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    proxies_created: AtomicU64,
    stubs_created: AtomicU64,
    start_time: Instant,
}

/// Point-in-time copy of [`InteropStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub calls_sent: u64,
    pub calls_dispatched: u64,
    pub calls_failed: u64,
    pub marshaling_errors: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub proxies_created: u64,
    pub stubs_created: u64,
    pub uptime: Duration,
}

impl InteropStats {
    pub fn new() -> Self {
        Self {
            calls_sent: AtomicU64::new(0),
            calls_dispatched: AtomicU64::new(0),
            calls_failed: AtomicU64::new(0),
            marshaling_errors: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            proxies_created: AtomicU64::new(0),
            stubs_created: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// A proxy put a request on the wire
    #[inline]
    pub fn record_sent(&self, request: usize, reply: usize) {
        self.calls_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(request as u64, Ordering::Relaxed);
        self.bytes_received.fetch_add(reply as u64, Ordering::Relaxed);
    }

    /// A stub invoked a real method
    #[inline]
    pub fn record_dispatched(&self) {
        self.calls_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    /// A proxy call ended in a transport failure
    #[inline]
    pub fn record_failed(&self) {
        self.calls_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// A value could not be encoded, decoded or resolved
    #[inline]
    pub fn record_marshaling_error(&self) {
        self.marshaling_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_proxy(&self) {
        self.proxies_created.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_stub(&self) {
        self.stubs_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            calls_sent: self.calls_sent.load(Ordering::Relaxed),
            calls_dispatched: self.calls_dispatched.load(Ordering::Relaxed),
            calls_failed: self.calls_failed.load(Ordering::Relaxed),
            marshaling_errors: self.marshaling_errors.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            proxies_created: self.proxies_created.load(Ordering::Relaxed),
            stubs_created: self.stubs_created.load(Ordering::Relaxed),
            uptime: self.start_time.elapsed(),
        }
    }
}

impl Default for InteropStats {
    fn default() -> Self {
        Self::new()
    }
}
