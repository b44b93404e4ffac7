//! Sliding-window rate limiter.
//!
//! Per key, the limiter keeps a deque of `(timestamp, cost)` events inside
//! the half-open window `(now - duration, now]` plus a cached running sum.
//! Admission drops stale events, then admits iff the refreshed sum plus the
//! request cost fits the capacity. Denied requests are never recorded, so a
//! burst of rejections cannot extend its own punishment.
//!
//! # Guarantees
//!
//! - **Zero false-negatives**: an `Allow` never lets the admitted total in
//!   any window of the configured duration exceed the capacity.
//! - **Determinism**: decisions are a function of the `(time, key, cost)`
//!   sequence alone.
//!
//! # Concurrency
//!
//! The key map is split across shards (default 64), each guarded by its own
//! mutex, so admissions for unrelated keys do not contend. A key's shard
//! lock is held only across the admit steps; no I/O happens under it. The
//! limiter reads only monotonic time and never blocks.
//!
//! # Eviction
//!
//! Keys idle for a full window are reclaimed lazily (every Nth admission
//! cleans the touched shard) and by [`SlidingWindowLimiter::sweep`], which
//! takes one shard lock at a time. Reclaiming a key is equivalent to its
//! window having drained, so removal never causes a transient allow-burst.
//!
//! # Composition
//!
//! Keys are opaque strings; multi-tenant callers compose them (for example
//! `tenant:resource`) without the limiter imposing any policy.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use sha2::{Digest as _, Sha256};

use crate::clock::Clock;
use crate::config::CoreConfig;


/// Outcome of an admission check.
///
/// `Deny` is a normal decision, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request fits the budget and was recorded.
    Allow,
    /// The request would exceed the budget and was not recorded.
    Deny,
}

impl Decision {
    /// Whether this decision admitted the request.
    #[must_use]
    pub const fn is_allow(self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Per-key window state: in-window events and their cached sum.
#[derive(Debug, Default)]
struct WindowState {
    events: VecDeque<(u64, u64)>,
    current_sum: u64,
}

impl WindowState {
    /// Drops events at or before the cutoff, keeping the cached sum exact.
    ///
    /// `None` means the window still reaches past time zero and nothing
    /// has aged out yet.
    fn expire(&mut self, cutoff_ns: Option<u64>) {
        let Some(cutoff_ns) = cutoff_ns else {
            return;
        };
        while let Some(&(ts, cost)) = self.events.front() {
            if ts > cutoff_ns {
                break;
            }
            self.events.pop_front();
            self.current_sum -= cost;
        }
    }
}

/// Counters over a limiter's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LimiterStats {
    /// Requests admitted.
    pub allowed: u64,
    /// Requests denied.
    pub denied: u64,
    /// Keys currently tracked across all shards.
    pub tracked_keys: usize,
}

/// How often lazy shard cleanup runs, in admissions.
const CLEANUP_INTERVAL: u64 = 1024;

/// Sharded sliding-window limiter.
pub struct SlidingWindowLimiter {
    shards: Vec<Mutex<HashMap<String, WindowState>>>,
    capacity: u64,
    duration_ns: u64,
    allowed: AtomicU64,
    denied: AtomicU64,
    admissions: AtomicU64,
    digest: Mutex<Sha256>,
}

impl SlidingWindowLimiter {
    /// Creates a limiter from the validated core configuration.
    #[must_use]
    pub fn new(config: &CoreConfig) -> Self {
        Self::with_parameters(
            config.window_capacity,
            config.window_duration_s.saturating_mul(1_000_000_000),
            config.shard_count,
        )
    }

    /// Creates a limiter with explicit parameters.
    ///
    /// # Panics
    ///
    /// Panics if `capacity`, `duration_ns`, or `shard_count` is zero;
    /// configuration validation rejects these before construction.
    #[must_use]
    pub fn with_parameters(capacity: u64, duration_ns: u64, shard_count: usize) -> Self {
        assert!(capacity > 0, "capacity must be positive");
        assert!(duration_ns > 0, "duration must be positive");
        assert!(shard_count > 0, "shard count must be positive");

        let shards = (0..shard_count)
            .map(|_| Mutex::new(HashMap::new()))
            .collect();
        Self {
            shards,
            capacity,
            duration_ns,
            allowed: AtomicU64::new(0),
            denied: AtomicU64::new(0),
            admissions: AtomicU64::new(0),
            digest: Mutex::new(Sha256::new()),
        }
    }

    /// Decides admission for `cost` units under `key` at monotonic `now_ns`.
    ///
    /// The key's shard lock is held only across the expire/check/record
    /// steps.
    pub fn admit(&self, key: &str, now_ns: u64, cost: u64) -> Decision {
        let cutoff_ns = now_ns.checked_sub(self.duration_ns);

        // Lazy eviction: every Nth admission reclaims the touched shard's
        // drained keys. The counter uses relaxed ordering; a missed or
        // doubled cleanup is harmless.
        let tick = self.admissions.fetch_add(1, Ordering::Relaxed);
        let cleanup = tick > 0 && tick % CLEANUP_INTERVAL == 0;

        let decision = {
            let mut shard = self
                .shard_for(key)
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);

            if cleanup {
                shard.retain(|_, state| {
                    state.expire(cutoff_ns);
                    !state.events.is_empty()
                });
            }

            let state = shard.entry(key.to_owned()).or_default();
            state.expire(cutoff_ns);

            if state.current_sum.saturating_add(cost) <= self.capacity {
                state.events.push_back((now_ns, cost));
                state.current_sum += cost;
                Decision::Allow
            } else {
                if state.events.is_empty() {
                    shard.remove(key);
                }
                Decision::Deny
            }
        };

        match decision {
            Decision::Allow => {
                self.allowed.fetch_add(1, Ordering::Relaxed);
            }
            Decision::Deny => {
                self.denied.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key, now_ns, cost, "admission denied");
            }
        }
        self.record_decision(key, now_ns, cost, decision);
        decision
    }

    /// Convenience wrapper reading monotonic time from `clock`.
    pub fn admit_now(&self, key: &str, clock: &dyn Clock, cost: u64) -> Decision {
        self.admit(key, clock.now_mono_ns(), cost)
    }

    /// Reclaims idle keys across all shards.
    ///
    /// Takes one shard lock at a time; concurrent admissions on other
    /// shards proceed untouched.
    pub fn sweep(&self, now_ns: u64) {
        let cutoff_ns = now_ns.checked_sub(self.duration_ns);
        let mut reclaimed = 0usize;
        for shard in &self.shards {
            let mut shard = shard
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            shard.retain(|_, state| {
                state.expire(cutoff_ns);
                let live = !state.events.is_empty();
                if !live {
                    reclaimed += 1;
                }
                live
            });
        }
        if reclaimed > 0 {
            tracing::debug!(reclaimed, "limiter sweep reclaimed idle keys");
        }
    }

    /// Returns lifetime counters and the current tracked-key count.
    #[must_use]
    pub fn stats(&self) -> LimiterStats {
        let tracked_keys = self
            .shards
            .iter()
            .map(|s| {
                s.lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .len()
            })
            .sum();
        LimiterStats {
            allowed: self.allowed.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
            tracked_keys,
        }
    }

    /// Returns the rolling SHA-256 digest over all decisions so far.
    ///
    /// The digest commits to the `(key, now, cost, verdict)` sequence and
    /// can be embedded in an incident bundle's metadata as a compact
    /// fingerprint of the limiter's behaviour during the window.
    #[must_use]
    pub fn decision_digest(&self) -> [u8; 32] {
        self.digest
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
            .finalize()
            .into()
    }

    fn record_decision(&self, key: &str, now_ns: u64, cost: u64, decision: Decision) {
        let mut digest = self
            .digest
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        digest.update((key.len() as u64).to_be_bytes());
        digest.update(key.as_bytes());
        digest.update(now_ns.to_be_bytes());
        digest.update(cost.to_be_bytes());
        digest.update([u8::from(decision.is_allow())]);
    }

    fn shard_for(&self, key: &str) -> &Mutex<HashMap<String, WindowState>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.shards.len();
        &self.shards[index]
    }
}
