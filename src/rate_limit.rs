//! In-memory sliding-window rate limiting.
//!
//! Each request is counted twice: once against a global per-key budget shared
//! by every service in the process, and once against the budget of the service
//! that handles it. Keys are caller identities (`type:id`) or client addresses.
//! Counters are process-local and reset on restart. Keys with no request
//! left in the window are dropped by `evict_idle`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::config::ApiConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Read,
    Create,
    Update,
    Delete,
    Auth,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Read => "read",
            Scope::Create => "create",
            Scope::Update => "update",
            Scope::Delete => "delete",
            Scope::Auth => "auth",
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub window: Duration,
    pub global: usize,
    pub read: usize,
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    pub auth: usize,
}

impl Limits {
    pub fn from_config(api: &ApiConfig) -> Self {
        Self {
            window: Duration::from_secs(api.rate_limit_window_secs),
            global: api.global_limit,
            read: api.read_limit,
            create: api.create_limit,
            update: api.update_limit,
            delete: api.delete_limit,
            auth: api.auth_limit,
        }
    }

    fn for_scope(&self, scope: Scope) -> usize {
        match scope {
            Scope::Read => self.read,
            Scope::Create => self.create,
            Scope::Update => self.update,
            Scope::Delete => self.delete,
            Scope::Auth => self.auth,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("global rate limit exceeded for {key} (max {limit} requests/{window_secs}s)")]
    GlobalExceeded { key: String, limit: usize, window_secs: u64 },

    #[error("{scope} rate limit exceeded for {key} (max {limit} requests/{window_secs}s)")]
    ScopeExceeded { scope: Scope, key: String, limit: usize, window_secs: u64 },
}

type Window = VecDeque<Instant>;

#[derive(Clone)]
pub struct RateLimiter {
    global: Arc<DashMap<String, Window>>,
    scoped: Arc<DashMap<(Scope, String), Window>>,
    limits: Limits,
}

impl RateLimiter {
    pub fn new(limits: Limits) -> Self {
        Self { global: Arc::new(DashMap::new()), scoped: Arc::new(DashMap::new()), limits }
    }

    /// Check both limits for `key`, then record the request.
    pub fn check_and_record(&self, scope: Scope, key: &str) -> Result<(), RateLimitError> {
        self.check_and_record_at(scope, key, Instant::now())
    }

    pub fn check_and_record_at(&self, scope: Scope, key: &str, now: Instant) -> Result<(), RateLimitError> {
        let window = self.limits.window;

        // The global entry stays locked until both checks are done, so requests
        // for one key are counted one at a time.
        let mut global = self.global.entry(key.to_string()).or_default();
        prune_window(&mut global, now, window);
        if global.len() >= self.limits.global {
            return Err(RateLimitError::GlobalExceeded {
                key: key.to_string(),
                limit: self.limits.global,
                window_secs: window.as_secs(),
            });
        }

        let limit = self.limits.for_scope(scope);
        let mut scoped = self.scoped.entry((scope, key.to_string())).or_default();
        prune_window(&mut scoped, now, window);
        if scoped.len() >= limit {
            return Err(RateLimitError::ScopeExceeded {
                scope,
                key: key.to_string(),
                limit,
                window_secs: window.as_secs(),
            });
        }

        // Record only after both checks pass
        scoped.push_back(now);
        global.push_back(now);
        Ok(())
    }

    /// Drop keys with no request inside the window, returning how many went
    pub fn evict_idle(&self) -> usize {
        self.evict_idle_at(Instant::now())
    }

    pub fn evict_idle_at(&self, now: Instant) -> usize {
        let window = self.limits.window;
        let before = self.global.len() + self.scoped.len();
        self.global.retain(|_, requests| {
            prune_window(requests, now, window);
            !requests.is_empty()
        });
        self.scoped.retain(|_, requests| {
            prune_window(requests, now, window);
            !requests.is_empty()
        });
        before.saturating_sub(self.global.len() + self.scoped.len())
    }

    /// Keys currently held, global and per scope
    pub fn tracked(&self) -> usize {
        self.global.len() + self.scoped.len()
    }
}

fn prune_window(deque: &mut Window, now: Instant, window: Duration) {
    while let Some(&front) = deque.front() {
        if now.duration_since(front) >= window {
            deque.pop_front();
        } else {
            break;
        }
    }
}
