use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

#[derive(Debug, Clone, Copy)]
struct Attempts {
    failures: u32,
    last_failure: Instant,
    locked_until: Option<Instant>,
}

impl Attempts {
    /// A lock that has run out, or unlocked failures older than `window`
    fn is_stale(&self, now: Instant, window: Duration) -> bool {
        match self.locked_until {
            Some(until) => until <= now,
            None => now.saturating_duration_since(self.last_failure) >= window,
        }
    }
}

/// Failed-login counter keyed by email. Process-local; a restart clears it.
/// Failures are forgotten once they are older than the lock duration.
#[derive(Clone)]
pub struct LoginThrottle {
    entries: Arc<DashMap<String, Attempts>>,
    max_attempts: u32,
    lock_for: Duration,
}

impl LoginThrottle {
    pub fn new(max_attempts: u32, lock_for: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            max_attempts: max_attempts.max(1),
            lock_for,
        }
    }

    pub fn is_locked(&self, email: &str) -> bool {
        self.is_locked_at(email, Instant::now())
    }

    pub fn is_locked_at(&self, email: &str, now: Instant) -> bool {
        let locked_until = self.entries.get(email).and_then(|a| a.locked_until);
        match locked_until {
            Some(until) if until > now => true,
            Some(_) => {
                // Lock expired: forget the entry so counting starts over
                self.entries.remove_if(email, |_, a| a.is_stale(now, self.lock_for));
                false
            }
            None => false,
        }
    }

    pub fn record_failure(&self, email: &str) {
        self.record_failure_at(email, Instant::now());
    }

    pub fn record_failure_at(&self, email: &str, now: Instant) {
        let mut attempts = self
            .entries
            .entry(email.to_string())
            .or_insert(Attempts { failures: 0, last_failure: now, locked_until: None });
        if attempts.is_stale(now, self.lock_for) {
            attempts.failures = 0;
            attempts.locked_until = None;
        }

        attempts.failures += 1;
        attempts.last_failure = now;
        if attempts.failures >= self.max_attempts {
            attempts.locked_until = Some(now + self.lock_for);
            tracing::warn!(email, failures = attempts.failures, "login locked after repeated failures");
        }
    }

    pub fn reset(&self, email: &str) {
        self.entries.remove(email);
    }

    /// Drop expired locks and stale failure counts, returning how many went
    pub fn evict_stale(&self) -> usize {
        self.evict_stale_at(Instant::now())
    }

    pub fn evict_stale_at(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, a| !a.is_stale(now, self.lock_for));
        before.saturating_sub(self.entries.len())
    }

    pub fn tracked(&self) -> usize {
        self.entries.len()
    }

    /// Minutes shown in the lockout message
    pub fn lock_minutes(&self) -> u64 {
        self.lock_for.as_secs().div_ceil(60)
    }
}
