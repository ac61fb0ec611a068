//! Clock abstraction (§9).
//!
//! All time references inside the engine are obtained from an injected
//! clock so that scenarios are deterministic. A replay overrides the clock
//! with a logical clock driven by the timestamps of the points being
//! replayed rather than wall time.

use std::sync::atomic::{AtomicI64, Ordering};

use std::time::{SystemTime, UNIX_EPOCH};

/// Source of the current time, expressed as absolute nanoseconds.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now_nanos(&self) -> i64;
}

/// Wall-clock time via `SystemTime`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_nanos(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before unix epoch")
            .as_nanos() as i64
    }
}

/// Logical clock advanced explicitly by a replay driver, using the
/// timestamps of the points it re-injects rather than wall time.
#[derive(Debug, Default)]
pub struct LogicalClock {
    current: AtomicI64,
}

impl LogicalClock {
    pub fn new(start_nanos: i64) -> Self {
        Self {
            current: AtomicI64::new(start_nanos),
        }
    }

    /// Advance the logical clock to (at least) `timestamp`. Never moves
    /// backwards, matching the watermark semantics of the window node.
    pub fn advance_to(&self, timestamp: i64) {
        self.current.fetch_max(timestamp, Ordering::SeqCst);
    }
}

impl Clock for LogicalClock {
    fn now_nanos(&self) -> i64 {
        self.current.load(Ordering::SeqCst)
    }
}
