use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::auth::LoginThrottle;
use crate::database::RecordStore;
use crate::rate_limit::RateLimiter;

/// What the periodic sweep cleans up. A service fills in the parts it owns.
#[derive(Clone, Default)]
pub struct Sweep {
    /// Store whose expired session tokens are purged
    pub tokens: Option<Arc<dyn RecordStore>>,
    pub login_throttle: Option<LoginThrottle>,
    pub limiter: Option<RateLimiter>,
}

impl Sweep {
    pub fn is_empty(&self) -> bool {
        self.tokens.is_none() && self.login_throttle.is_none() && self.limiter.is_none()
    }

    /// One pass. Storage errors are logged, never returned.
    pub async fn run_once(&self) {
        if let Some(store) = &self.tokens {
            match store.purge_expired_tokens(Utc::now()).await {
                Ok(0) => {}
                Ok(purged) => debug!(purged, "expired tokens removed"),
                Err(err) => warn!(error = %err, "token sweep failed"),
            }
        }
        if let Some(throttle) = &self.login_throttle {
            let evicted = throttle.evict_stale();
            if evicted > 0 {
                debug!(evicted, remaining = throttle.tracked(), "stale login attempts dropped");
            }
        }
        if let Some(limiter) = &self.limiter {
            let evicted = limiter.evict_idle();
            if evicted > 0 {
                debug!(evicted, remaining = limiter.tracked(), "idle rate-limit keys dropped");
            }
        }
    }
}

/// Run `sweep` every `every` until the task is aborted.
pub fn spawn_sweep(sweep: Sweep, every: Duration) -> JoinHandle<()> {
    info!(
        interval_secs = every.as_secs(),
        tokens = sweep.tokens.is_some(),
        login_throttle = sweep.login_throttle.is_some(),
        limiter = sweep.limiter.is_some(),
        "sweep configured"
    );
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            sweep.run_once().await;
        }
    })
}
