//! Login rate limiter
//!
//! Sliding windows kept in memory: failed attempts per email (5 per 15
//! minutes), failed second-step codes per user (5 per 15 minutes) and
//! login requests per IP address (10 per minute).

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::RwLock;

const EMAIL_LIMIT: usize = 5;
const IP_LIMIT: usize = 10;
const TWO_FACTOR_LIMIT: usize = 5;

pub struct LoginRateLimiter {
    email_attempts: Arc<RwLock<HashMap<String, Vec<DateTime<Utc>>>>>,
    ip_attempts: Arc<RwLock<HashMap<IpAddr, Vec<DateTime<Utc>>>>>,
    two_factor_attempts: Arc<RwLock<HashMap<i64, Vec<DateTime<Utc>>>>>,
}

impl LoginRateLimiter {
    pub fn new() -> Self {
        Self {
            email_attempts: Arc::new(RwLock::new(HashMap::new())),
            ip_attempts: Arc::new(RwLock::new(HashMap::new())),
            two_factor_attempts: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn is_email_limited(&self, email: &str) -> bool {
        let mut attempts = self.email_attempts.write().await;
        let cutoff = Utc::now() - Duration::minutes(15);
        let entry = attempts.entry(email.to_lowercase()).or_default();
        entry.retain(|time| *time > cutoff);
        entry.len() >= EMAIL_LIMIT
    }

    pub async fn record_failed_attempt(&self, email: &str) {
        let mut attempts = self.email_attempts.write().await;
        attempts.entry(email.to_lowercase()).or_default().push(Utc::now());
    }

    /// Forget failures after a successful login
    pub async fn clear_email_attempts(&self, email: &str) {
        self.email_attempts.write().await.remove(&email.to_lowercase());
    }

    pub async fn is_ip_limited(&self, ip: IpAddr) -> bool {
        let mut attempts = self.ip_attempts.write().await;
        let cutoff = Utc::now() - Duration::minutes(1);
        let entry = attempts.entry(ip).or_default();
        entry.retain(|time| *time > cutoff);
        entry.len() >= IP_LIMIT
    }

    pub async fn record_ip_request(&self, ip: IpAddr) {
        self.ip_attempts.write().await.entry(ip).or_default().push(Utc::now());
    }

    pub async fn is_two_factor_limited(&self, user_id: i64) -> bool {
        let mut attempts = self.two_factor_attempts.write().await;
        let cutoff = Utc::now() - Duration::minutes(15);
        let entry = attempts.entry(user_id).or_default();
        entry.retain(|time| *time > cutoff);
        entry.len() >= TWO_FACTOR_LIMIT
    }

    pub async fn record_two_factor_failure(&self, user_id: i64) {
        self.two_factor_attempts.write().await.entry(user_id).or_default().push(Utc::now());
    }

    pub async fn clear_two_factor_attempts(&self, user_id: i64) {
        self.two_factor_attempts.write().await.remove(&user_id);
    }

    /// Drop expired entries. Run periodically from the cleanup task.
    pub async fn cleanup(&self) {
        let now = Utc::now();
        let email_cutoff = now - Duration::minutes(15);
        let ip_cutoff = now - Duration::minutes(1);

        self.email_attempts.write().await.retain(|_, times| {
            times.retain(|time| *time > email_cutoff);
            !times.is_empty()
        });
        self.ip_attempts.write().await.retain(|_, times| {
            times.retain(|time| *time > ip_cutoff);
            !times.is_empty()
        });
        self.two_factor_attempts.write().await.retain(|_, times| {
            times.retain(|time| *time > email_cutoff);
            !times.is_empty()
        });
    }
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
