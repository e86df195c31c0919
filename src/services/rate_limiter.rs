//! Per portal+channel cooldown tracking

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
struct CooldownEntry {
    last_access: Instant,
    count: u64,
}

/// A key is hot until `cooldown` has elapsed since its last successful resolution
pub struct RateLimiter {
    cooldown: Duration,
    entries: Mutex<HashMap<String, CooldownEntry>>,
}

impl RateLimiter {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// `(allowed, remaining_seconds)`; `duration` overrides the configured cooldown.
    /// Read-only: checking never changes a later outcome.
    pub fn check_rate(&self, key: &str, duration: Option<Duration>) -> (bool, u64) {
        let cooldown = duration.unwrap_or(self.cooldown);
        let entries = self.lock();
        let Some(entry) = entries.get(key) else {
            return (true, 0);
        };
        let elapsed = entry.last_access.elapsed();
        if elapsed >= cooldown {
            (true, 0)
        } else {
            let remaining = cooldown - elapsed;
            (false, remaining.as_secs_f64().ceil() as u64)
        }
    }

    /// Record a successful access
    pub fn update_rate(&self, key: &str) {
        let mut entries = self.lock();
        let entry = entries.entry(key.to_string()).or_insert(CooldownEntry {
            last_access: Instant::now(),
            count: 0,
        });
        entry.last_access = Instant::now();
        entry.count += 1;
    }

    pub fn access_count(&self, key: &str) -> u64 {
        self.lock().get(key).map(|e| e.count).unwrap_or(0)
    }

    /// Forget keys whose cooldown has fully elapsed
    pub fn prune(&self) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.last_access.elapsed() < self.cooldown);
        before - entries.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CooldownEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
