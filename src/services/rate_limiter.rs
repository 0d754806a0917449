//! Rate limiting
//!
//! - [`LoginRateLimiter`]: in-process sliding windows against brute force
//!   (5 failed attempts per username per 15 minutes, 10 requests per IP per minute)
//! - [`CommentRateLimiter`]: one comment per user or IP per interval, tracked
//!   in the shared cache so it holds across instances with Redis

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::RwLock;

use crate::cache::{Cache, CacheLayer};

const USERNAME_WINDOW_MINUTES: i64 = 15;
const USERNAME_MAX_FAILURES: usize = 5;
const IP_WINDOW_MINUTES: i64 = 1;
const IP_MAX_REQUESTS: usize = 10;

/// Login rate limiter
pub struct LoginRateLimiter {
    /// Failed login attempts by lowercased username
    username_attempts: RwLock<HashMap<String, Vec<DateTime<Utc>>>>,
    /// Login requests by IP address
    ip_attempts: RwLock<HashMap<IpAddr, Vec<DateTime<Utc>>>>,
}

impl LoginRateLimiter {
    pub fn new() -> Self {
        Self {
            username_attempts: RwLock::new(HashMap::new()),
            ip_attempts: RwLock::new(HashMap::new()),
        }
    }

    pub async fn is_username_limited(&self, username: &str) -> bool {
        let cutoff = Utc::now() - Duration::minutes(USERNAME_WINDOW_MINUTES);
        let mut attempts = self.username_attempts.write().await;
        let entry = attempts.entry(username.to_lowercase()).or_default();
        entry.retain(|time| *time > cutoff);
        entry.len() >= USERNAME_MAX_FAILURES
    }

    pub async fn record_failed_attempt(&self, username: &str) {
        let mut attempts = self.username_attempts.write().await;
        attempts
            .entry(username.to_lowercase())
            .or_default()
            .push(Utc::now());
    }

    /// Forget failures after a successful login
    pub async fn clear_username_attempts(&self, username: &str) {
        self.username_attempts
            .write()
            .await
            .remove(&username.to_lowercase());
    }

    pub async fn is_ip_limited(&self, ip: IpAddr) -> bool {
        let cutoff = Utc::now() - Duration::minutes(IP_WINDOW_MINUTES);
        let mut attempts = self.ip_attempts.write().await;
        let entry = attempts.entry(ip).or_default();
        entry.retain(|time| *time > cutoff);
        entry.len() >= IP_MAX_REQUESTS
    }

    pub async fn record_ip_request(&self, ip: IpAddr) {
        self.ip_attempts
            .write()
            .await
            .entry(ip)
            .or_default()
            .push(Utc::now());
    }

    /// Drop expired windows; called from the hourly maintenance task
    pub async fn cleanup(&self) {
        let now = Utc::now();
        let username_cutoff = now - Duration::minutes(USERNAME_WINDOW_MINUTES);
        let ip_cutoff = now - Duration::minutes(IP_WINDOW_MINUTES);

        self.username_attempts.write().await.retain(|_, times| {
            times.retain(|time| *time > username_cutoff);
            !times.is_empty()
        });
        self.ip_attempts.write().await.retain(|_, times| {
            times.retain(|time| *time > ip_cutoff);
            !times.is_empty()
        });
    }

    /// Number of usernames and IPs currently tracked
    pub async fn tracked(&self) -> (usize, usize) {
        (
            self.username_attempts.read().await.len(),
            self.ip_attempts.read().await.len(),
        )
    }
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache-backed comment throttle keyed by user id or client IP
pub struct CommentRateLimiter {
    cache: Arc<Cache>,
    interval: StdDuration,
}

impl CommentRateLimiter {
    pub fn new(cache: Arc<Cache>, interval_secs: u64) -> Self {
        Self {
            cache,
            interval: StdDuration::from_secs(interval_secs),
        }
    }

    fn key(identity: &str) -> String {
        format!("comment_rate:{}", identity)
    }

    /// Seconds until `identity` may comment again, or `None` if allowed now
    pub async fn retry_after(&self, identity: &str) -> Option<u64> {
        if self.interval.is_zero() {
            return None;
        }
        let last: DateTime<Utc> = self.cache.get(&Self::key(identity)).await.ok().flatten()?;
        let elapsed = (Utc::now() - last).num_seconds().max(0) as u64;
        let interval = self.interval.as_secs();
        (elapsed < interval).then(|| interval - elapsed)
    }

    /// Start the window for `identity`
    pub async fn record(&self, identity: &str) {
        if self.interval.is_zero() {
            return;
        }
        if let Err(e) = self
            .cache
            .set(&Self::key(identity), &Utc::now(), self.interval)
            .await
        {
            tracing::warn!("Failed to record comment rate window: {}", e);
        }
    }
}
