//! Rate limiter for preventing brute force login attempts

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::info;

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Maximum number of failed attempts allowed inside the window
    pub max_attempts: u32,
    /// Time window in seconds
    pub window_seconds: u64,
    /// Ban duration in seconds
    pub ban_duration_seconds: u64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window_seconds: 300,        // 5 minutes
            ban_duration_seconds: 3600, // 1 hour
        }
    }
}

#[derive(Debug)]
struct RateLimiterEntry {
    failures: u32,
    last_failure: Instant,
    ban_expires: Option<Instant>,
}

/// Failed-attempt limiter keyed by an arbitrary string (the login email)
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    entries: Arc<Mutex<HashMap<String, RateLimiterEntry>>>,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Check whether `key` may attempt a login right now
    pub async fn is_allowed(&self, key: &str) -> bool {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        let ban_expires = match entries.get(key) {
            Some(entry) => entry.ban_expires,
            None => return true,
        };

        match ban_expires {
            Some(ban_expires) if now < ban_expires => false,
            Some(_) => {
                entries.remove(key);
                true
            }
            None => true,
        }
    }

    /// Record a failed attempt, banning `key` once the limit is reached
    ///
    /// Entries whose window and ban have both run out are evicted first.
    pub async fn record_failure(&self, key: &str) {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        entries.retain(|_, entry| !self.is_stale(entry, now));

        let entry = entries.entry(key.to_string()).or_insert(RateLimiterEntry {
            failures: 0,
            last_failure: now,
            ban_expires: None,
        });

        if self.window_elapsed(entry, now) {
            entry.failures = 0;
        }

        entry.failures += 1;
        entry.last_failure = now;

        if entry.failures >= self.config.max_attempts {
            entry.ban_expires = Some(now + Duration::from_secs(self.config.ban_duration_seconds));
            info!(
                "Banned key {} for {} seconds",
                key, self.config.ban_duration_seconds
            );
        }
    }

    fn window_elapsed(&self, entry: &RateLimiterEntry, now: Instant) -> bool {
        now.duration_since(entry.last_failure) >= Duration::from_secs(self.config.window_seconds)
    }

    fn is_stale(&self, entry: &RateLimiterEntry, now: Instant) -> bool {
        match entry.ban_expires {
            Some(ban_expires) => now >= ban_expires,
            None => self.window_elapsed(entry, now),
        }
    }

    /// Number of keys currently tracked
    pub async fn tracked_keys(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Forget the failure history of `key`
    pub async fn reset(&self, key: &str) {
        self.entries.lock().await.remove(key);
    }

    /// Get the rate limiter configuration
    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }
}
