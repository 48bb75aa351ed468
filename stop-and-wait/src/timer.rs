//! Clock sources and the retransmit timer.
//!
//! Time is read through the [`Clock`] trait as a monotonic offset from an
//! arbitrary epoch.  Production code uses [`SystemClock`]; tests use
//! [`MockClock`] and move time forward explicitly, which keeps every
//! retransmission decision deterministic.
//!
//! The retransmit timer has no backoff and no jitter: every retransmission
//! waits the same fixed interval.  Expiry is polled, never scheduled.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Retransmit interval used when none is configured.
pub const DEFAULT_RETRANSMIT_INTERVAL: Duration = Duration::from_secs(3);

/// Monotonic time source.
pub trait Clock: Send + Sync {
    /// Current offset from the clock's epoch.
    fn now(&self) -> Duration;
}

/// Wall-clock backed [`Clock`]; its epoch is the moment it was created.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Manually advanced [`Clock`] for deterministic tests.
///
/// Shared across threads through atomics; clone an `Arc<MockClock>` into
/// every endpoint that should observe the same time.
#[derive(Debug, Default)]
pub struct MockClock {
    offset_ns: AtomicU64,
}

impl MockClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        let by_ns = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.offset_ns.fetch_add(by_ns, Ordering::SeqCst);
    }

    pub fn set(&self, offset: Duration) {
        let ns = u64::try_from(offset.as_nanos()).unwrap_or(u64::MAX);
        self.offset_ns.store(ns, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.offset_ns.load(Ordering::SeqCst))
    }
}

/// A running retransmit timer.
///
/// A timer only exists while a packet is in flight: the sender stores it
/// next to that packet, so "stopped" is simply the absence of a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetransmitTimer {
    interval: Duration,
    started: Duration,
}

impl RetransmitTimer {
    /// Arm a timer at `now`.
    pub fn start(interval: Duration, now: Duration) -> Self {
        Self {
            interval,
            started: now,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn started(&self) -> Duration {
        self.started
    }

    /// `now - started`, saturating at zero if the clock was rewound.
    pub fn elapsed(&self, now: Duration) -> Duration {
        now.saturating_sub(self.started)
    }

    /// `true` once `elapsed >= interval`.
    pub fn is_expired(&self, now: Duration) -> bool {
        self.elapsed(now) >= self.interval
    }

    /// Re-arm with the same interval after a retransmission.
    pub fn restart(&mut self, now: Duration) {
        self.started = now;
    }
}
