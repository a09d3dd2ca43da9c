//! Per-sender sliding-window admission control
//!
//! Each sender gets a trailing 60-second window of message timestamps.
//! Overflowing the ceiling arms a flat 60-second block; the block is
//! re-armed only by a fresh overflow after it expires. Uses
//! `tokio::time::Instant` throughout so tests can run on a paused clock.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

/// Trailing window length for counting messages.
const WINDOW: Duration = Duration::from_secs(60);
/// Flat cool-down applied on overflow.
const BLOCK: Duration = Duration::from_secs(60);
/// Entries idle longer than this are dropped by the sweep.
const IDLE: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Default)]
struct RateLimitEntry {
    timestamps: VecDeque<Instant>,
    blocked_until: Option<Instant>,
}

/// Aggregate limiter counters for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStats {
    /// Senders currently tracked
    pub tracked: usize,
    /// Senders currently inside a block window
    pub blocked: usize,
    /// Senders with at least one message inside the current window
    pub active: usize,
}

/// Sliding-window rate limiter keyed by sender identity.
#[derive(Clone)]
pub struct RateLimiter {
    entries: Arc<Mutex<HashMap<String, RateLimitEntry>>>,
    ceiling: usize,
}

impl RateLimiter {
    /// Create a limiter admitting up to `ceiling` messages per sender
    /// per minute.
    #[must_use]
    pub fn new(ceiling: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ceiling,
        }
    }

    /// Admit or reject a message from `sender`.
    ///
    /// Admission records the event; rejection never mutates the window,
    /// so a blocked sender cannot extend their own block by retrying.
    pub async fn admit(&self, sender: &str) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let entry = entries.entry(sender.to_string()).or_default();

        while entry
            .timestamps
            .front()
            .is_some_and(|&t| now.duration_since(t) >= WINDOW)
        {
            entry.timestamps.pop_front();
        }

        if let Some(until) = entry.blocked_until {
            if until > now {
                return false;
            }
            entry.blocked_until = None;
        }

        entry.timestamps.push_back(now);
        if entry.timestamps.len() > self.ceiling {
            entry.blocked_until = Some(now + BLOCK);
            info!(sender, "rate limit exceeded, blocking for {:?}", BLOCK);
            return false;
        }

        true
    }

    /// Remaining block time for a sender, zero when not blocked.
    pub async fn remaining_block(&self, sender: &str) -> Duration {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        entries
            .get(sender)
            .and_then(|e| e.blocked_until)
            .map_or(Duration::ZERO, |until| until.saturating_duration_since(now))
    }

    /// Forget a sender entirely (admin-style unblock).
    pub async fn reset(&self, sender: &str) {
        self.entries.lock().await.remove(sender);
    }

    /// Drop entries with no recent activity and no active block.
    pub async fn sweep(&self) {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| {
            let blocked = entry.blocked_until.is_some_and(|until| until > now);
            let recent = entry
                .timestamps
                .back()
                .is_some_and(|&t| now.duration_since(t) < IDLE);
            blocked || recent
        });
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, "rate limiter sweep");
        }
    }

    /// Current counters.
    pub async fn stats(&self) -> RateLimitStats {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        let blocked = entries
            .values()
            .filter(|e| e.blocked_until.is_some_and(|until| until > now))
            .count();
        let active = entries
            .values()
            .filter(|e| {
                e.timestamps
                    .back()
                    .is_some_and(|&t| now.duration_since(t) < WINDOW)
            })
            .count();
        RateLimitStats {
            tracked: entries.len(),
            blocked,
            active,
        }
    }
}
