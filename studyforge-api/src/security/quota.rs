//! Keyed fixed-window request quota store.
//!
//! Enforces "at most N consumptions per key within duration W" under
//! concurrent access. Windows are created lazily on first consumption and
//! superseded in place when they expire; a background eviction task bounds
//! memory by dropping long-expired entries. Per-key atomicity comes from
//! the DashMap entry API: the shard lock is held across the whole
//! read-modify-write, so two racing consumers can never both take the last
//! slot.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Parameters for one limiter instance.
#[derive(Debug, Clone)]
pub struct QuotaConfig {
    /// Maximum consumptions per window.
    pub points: u32,
    /// Window length.
    pub duration: Duration,
    /// Namespace so identical client keys across limiter instances never
    /// collide in logs or shared sinks.
    pub key_prefix: String,
}

impl QuotaConfig {
    pub fn new(points: u32, duration: Duration, key_prefix: impl Into<String>) -> Self {
        Self {
            points,
            duration,
            key_prefix: key_prefix.into(),
        }
    }
}

/// Per-key quota record. `opened` drives expiry arithmetic; `reset_at` is
/// the wall-clock instant reported to clients.
#[derive(Debug, Clone)]
struct QuotaWindow {
    count: u32,
    opened: Instant,
    reset_at: DateTime<Utc>,
}

impl QuotaWindow {
    fn open(now: Instant, duration: Duration) -> Self {
        Self {
            count: 1,
            opened: now,
            reset_at: Utc::now() + chrono::Duration::milliseconds(duration.as_millis() as i64),
        }
    }

    fn expired(&self, now: Instant, duration: Duration) -> bool {
        now.duration_since(self.opened) >= duration
    }
}

/// Outcome of a consume attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeOutcome {
    Admitted {
        /// Slots left in the window after this consumption.
        remaining: u32,
        reset_at: DateTime<Utc>,
    },
    Rejected {
        /// Milliseconds until the window resets, clamped to >= 1 so the
        /// retry hint is never zero or negative.
        ms_before_next: u64,
        reset_at: DateTime<Utc>,
    },
}

impl ConsumeOutcome {
    pub fn is_admitted(&self) -> bool {
        matches!(self, ConsumeOutcome::Admitted { .. })
    }
}

/// Read-only view of a window, for header reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSnapshot {
    pub count: u32,
    pub reset_at: DateTime<Utc>,
    /// An expired window counts as absent: zero consumptions carried over.
    pub expired: bool,
}

/// In-process fixed-window limiter for a single route class.
pub struct QuotaLimiter {
    config: QuotaConfig,
    windows: Arc<DashMap<String, QuotaWindow>>,
}

impl QuotaLimiter {
    pub fn new(config: QuotaConfig) -> Self {
        Self {
            config,
            windows: Arc::new(DashMap::new()),
        }
    }

    fn scoped_key(&self, key: &str) -> String {
        format!("{}:{}", self.config.key_prefix, key)
    }

    /// Consume one quota unit for `key`.
    ///
    /// Absent or expired windows open fresh with count 1. A full window
    /// rejects without mutation. Atomic per key.
    pub fn consume(&self, key: &str) -> ConsumeOutcome {
        let now = Instant::now();
        match self.windows.entry(self.scoped_key(key)) {
            Entry::Vacant(slot) => {
                let window = QuotaWindow::open(now, self.config.duration);
                let reset_at = window.reset_at;
                slot.insert(window);
                ConsumeOutcome::Admitted {
                    remaining: self.config.points.saturating_sub(1),
                    reset_at,
                }
            }
            Entry::Occupied(mut slot) => {
                let window = slot.get_mut();
                if window.expired(now, self.config.duration) {
                    *window = QuotaWindow::open(now, self.config.duration);
                    return ConsumeOutcome::Admitted {
                        remaining: self.config.points.saturating_sub(1),
                        reset_at: window.reset_at,
                    };
                }
                if window.count < self.config.points {
                    window.count += 1;
                    ConsumeOutcome::Admitted {
                        remaining: self.config.points - window.count,
                        reset_at: window.reset_at,
                    }
                } else {
                    let elapsed = now.duration_since(window.opened);
                    let left = self.config.duration.saturating_sub(elapsed);
                    ConsumeOutcome::Rejected {
                        ms_before_next: (left.as_millis() as u64).max(1),
                        reset_at: window.reset_at,
                    }
                }
            }
        }
    }

    /// Read a window without mutating it. Expired windows are reported
    /// as-is with the `expired` flag set; they are not reset here.
    pub fn peek(&self, key: &str) -> Option<WindowSnapshot> {
        let now = Instant::now();
        self.windows.get(&self.scoped_key(key)).map(|window| WindowSnapshot {
            count: window.count,
            reset_at: window.reset_at,
            expired: window.expired(now, self.config.duration),
        })
    }

    /// Drop windows whose reset instant is at least `grace` in the past.
    /// Correctness never requires this (stale windows self-correct on the
    /// next consume); it only bounds memory.
    pub fn evict_expired(&self, grace: Duration) {
        let now = Instant::now();
        let horizon = self.config.duration + grace;
        self.windows
            .retain(|_, window| now.duration_since(window.opened) < horizon);
    }

    /// Start the periodic eviction task. Called from server startup, not
    /// the constructor, so limiters can be built outside a runtime.
    pub fn spawn_eviction(&self, every: Duration, grace: Duration) {
        let windows = Arc::clone(&self.windows);
        let horizon = self.config.duration + grace;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let now = Instant::now();
                windows.retain(|_, window| now.duration_since(window.opened) < horizon);
                tracing::debug!(active = windows.len(), "quota eviction pass");
            }
        });
    }

    pub fn points(&self) -> u32 {
        self.config.points
    }

    pub fn config(&self) -> &QuotaConfig {
        &self.config
    }

    /// Number of live windows, for monitoring.
    pub fn active_windows(&self) -> usize {
        self.windows.len()
    }
}

impl Clone for QuotaLimiter {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            windows: Arc::clone(&self.windows),
        }
    }
}
