//! Hybrid logical clock.
//!
//! Timestamps pack wall-clock milliseconds into the upper 48 bits and a
//! logical counter into the lower 16. Every `tick()` is strictly greater
//! than anything the clock has produced or witnessed before.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

const LOGICAL_BITS: u32 = 16;

/// A lock-free hybrid logical clock.
#[derive(Debug, Default)]
pub struct HybridClock {
    last: AtomicU64,
}

impl HybridClock {
    /// Create a clock starting at zero.
    pub fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }

    /// Produce a new timestamp, strictly greater than every previous one.
    pub fn tick(&self) -> u64 {
        let physical = physical_now() << LOGICAL_BITS;
        let mut current = self.last.load(Ordering::Acquire);

        loop {
            let next = physical.max(current + 1);

            match self
                .last
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }

    /// Advance past a timestamp received from a peer.
    pub fn witness(&self, remote: u64) {
        self.last.fetch_max(remote, Ordering::AcqRel);
    }

    /// Most recent timestamp issued or witnessed.
    pub fn current(&self) -> u64 {
        self.last.load(Ordering::Acquire)
    }

    /// Wall-clock milliseconds encoded in a timestamp.
    pub fn physical_ms(timestamp: u64) -> u64 {
        timestamp >> LOGICAL_BITS
    }
}

fn physical_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
