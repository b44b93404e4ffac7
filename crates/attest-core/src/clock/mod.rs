//! Time sources and window arithmetic.
//!
//! Two distinct readings are exposed:
//!
//! - `now_wall_ns`: wall-clock nanoseconds since the Unix epoch. Used for
//!   log entry timestamps and bundle windows.
//! - `now_mono_ns`: monotonic nanoseconds where only differences are
//!   meaningful. Used by the rate limiter, which must never observe time
//!   moving backwards.
//!
//! `now_mono_ns` is non-decreasing within a process; a regression is a
//! programming fault in the clock implementation, not a runtime condition
//! callers defend against.
//!
//! The [`Clock`] trait is constructor-injected wherever time is read, so
//! tests drive time explicitly through [`ManualClock`] instead of sleeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

#[cfg(test)]
mod tests;

/// A source of wall-clock and monotonic readings.
pub trait Clock: Send + Sync {
    /// Wall-clock nanoseconds since the Unix epoch.
    fn now_wall_ns(&self) -> u64;

    /// Monotonic nanoseconds. Only differences are meaningful.
    fn now_mono_ns(&self) -> u64;
}

/// Production clock backed by `SystemTime` and `Instant`.
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    /// Creates a system clock whose monotonic origin is the moment of
    /// construction.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now_wall_ns(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }

    fn now_mono_ns(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}

/// Test clock advanced explicitly by the caller.
///
/// Both readings share one counter, which keeps wall and monotonic time in
/// lockstep for deterministic tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ns: AtomicU64,
}

impl ManualClock {
    /// Creates a manual clock starting at the given nanosecond reading.
    #[must_use]
    pub fn starting_at(now_ns: u64) -> Self {
        Self {
            now_ns: AtomicU64::new(now_ns),
        }
    }

    /// Advances the clock by `delta_ns` nanoseconds.
    pub fn advance(&self, delta_ns: u64) {
        self.now_ns.fetch_add(delta_ns, Ordering::SeqCst);
    }

    /// Sets the clock to an absolute reading.
    ///
    /// # Panics
    ///
    /// Panics if `now_ns` would move the clock backwards; monotonic
    /// regressions are a programming fault.
    pub fn set(&self, now_ns: u64) {
        let prev = self.now_ns.swap(now_ns, Ordering::SeqCst);
        assert!(prev <= now_ns, "manual clock moved backwards");
    }
}

impl Clock for ManualClock {
    fn now_wall_ns(&self) -> u64 {
        self.now_ns.load(Ordering::SeqCst)
    }

    fn now_mono_ns(&self) -> u64 {
        self.now_ns.load(Ordering::SeqCst)
    }
}

/// A closed wall-clock interval `[start_ns, end_ns]`.
///
/// Bundle windows are closed on both ends; the limiter's half-open
/// `(now - duration, now]` windows are handled inside the limiter itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Window {
    /// Inclusive start, wall-clock nanoseconds.
    pub start_ns: u64,
    /// Inclusive end, wall-clock nanoseconds.
    pub end_ns: u64,
}

impl Window {
    /// Creates a window, returning `None` when `end_ns < start_ns`.
    #[must_use]
    pub const fn new(start_ns: u64, end_ns: u64) -> Option<Self> {
        if end_ns < start_ns {
            None
        } else {
            Some(Self { start_ns, end_ns })
        }
    }

    /// Whether `ts_ns` lies inside the window.
    #[must_use]
    pub const fn contains(&self, ts_ns: u64) -> bool {
        self.start_ns <= ts_ns && ts_ns <= self.end_ns
    }

    /// Whether `[a, b]` intersects this window.
    #[must_use]
    pub const fn intersects(&self, a_ns: u64, b_ns: u64) -> bool {
        a_ns <= self.end_ns && self.start_ns <= b_ns
    }

    /// Window length in nanoseconds.
    ///
    /// Saturates to zero on a malformed (deserialized) window; validation
    /// rejects those explicitly.
    #[must_use]
    pub const fn duration_ns(&self) -> u64 {
        self.end_ns.saturating_sub(self.start_ns)
    }
}
