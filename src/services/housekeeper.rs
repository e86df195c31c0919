use std::sync::Arc;
use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, trace};

use crate::config::RateLimitConfig;
use crate::services::link_cache::LinkCache;
use crate::services::rate_limiter::RateLimiter;

/// Periodically sweeps expired cache entries and cooled-down rate limiter keys
pub struct Housekeeper {
    cache: Arc<LinkCache>,
    limiter: Arc<RateLimiter>,
    interval: Duration,
}

impl Housekeeper {
    pub fn new(cache: Arc<LinkCache>, limiter: Arc<RateLimiter>, interval: Duration) -> Self {
        Self {
            cache,
            limiter,
            interval,
        }
    }

    pub fn from_config(cache: Arc<LinkCache>, limiter: Arc<RateLimiter>, config: &RateLimitConfig) -> Self {
        Self::new(cache, limiter, config.cleanup_interval)
    }

    /// Run until the task is aborted
    pub async fn start(self) {
        let mut interval = interval(self.interval.max(Duration::from_secs(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Starting housekeeper with interval: {:?}", self.interval);

        loop {
            interval.tick().await;
            self.run_cleanup();
        }
    }

    /// One sweep; returns `(cache_entries_removed, cooldown_keys_removed)`
    pub fn run_cleanup(&self) -> (usize, usize) {
        let expired_links = self.cache.cleanup();
        let cooled_keys = self.limiter.prune();
        if expired_links + cooled_keys > 0 {
            debug!(
                "Housekeeper removed {} expired links and {} cooled-down keys",
                expired_links, cooled_keys
            );
        } else {
            trace!("Housekeeper found nothing to remove");
        }
        (expired_links, cooled_keys)
    }
}
