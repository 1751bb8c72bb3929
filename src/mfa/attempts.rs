//! Attempt counters with short and daily windows.
//!
//! Counters are the brute-force backstop shared by every method. Reads
//! fail open so a degraded store does not lock everyone out; writes fail
//! closed so an attempt that cannot be counted is never allowed through.

use crate::config::MfaConfig;
use crate::errors::Result;
use crate::mfa::Method;
use crate::storage::KeyValueStorage;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Counter window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    Short,
    Daily,
}

impl Window {
    fn as_str(&self) -> &'static str {
        match self {
            Window::Short => "short",
            Window::Daily => "daily",
        }
    }
}

/// Per-user, per-method attempt tracking.
#[derive(Clone)]
pub struct AttemptTracker {
    storage: Arc<dyn KeyValueStorage>,
    config: Arc<MfaConfig>,
}

impl AttemptTracker {
    pub fn new(storage: Arc<dyn KeyValueStorage>, config: Arc<MfaConfig>) -> Self {
        Self { storage, config }
    }

    fn counter_key(uid: &str, method: Method, window: Window) -> String {
        format!("mfa:attempts:{uid}:{}:{}", method.as_str(), window.as_str())
    }

    fn window_ttl(&self, window: Window) -> Duration {
        match window {
            Window::Short => self.config.short_window_ttl,
            Window::Daily => self.config.daily_window_ttl,
        }
    }

    /// Record an attempt in the given window. The count bump and the TTL
    /// refresh are a single store operation; errors propagate.
    pub async fn increment(&self, uid: &str, method: Method, window: Window) -> Result<i64> {
        let key = Self::counter_key(uid, method, window);
        let count = self
            .storage
            .increment_with_ttl(&key, self.window_ttl(window))
            .await?;
        debug!(
            "Attempt {} for user '{}' method '{}' ({} window)",
            count,
            uid,
            method,
            window.as_str()
        );
        Ok(count)
    }

    /// Whether the user is over either limit for the method. Store read
    /// errors read as "not exceeded".
    pub async fn is_exceeded(&self, uid: &str, method: Method) -> bool {
        let short = self
            .read_count(&Self::counter_key(uid, method, Window::Short))
            .await;
        if short >= self.config.short_limit(method) {
            return true;
        }

        let daily = self
            .read_count(&Self::counter_key(uid, method, Window::Daily))
            .await;
        daily >= self.config.daily_limit(method)
    }

    /// Clear the short-window counter after a success. The daily counter
    /// keeps running to bound total daily volume.
    pub async fn reset(&self, uid: &str, method: Method) -> Result<()> {
        self.storage
            .delete(&Self::counter_key(uid, method, Window::Short))
            .await
    }

    async fn read_count(&self, key: &str) -> i64 {
        match self.storage.get(key).await {
            Ok(Some(data)) => std::str::from_utf8(&data)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            Ok(None) => 0,
            Err(e) => {
                warn!("Failed to read attempt counter '{}': {}", key, e);
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn tracker() -> AttemptTracker {
        AttemptTracker::new(
            Arc::new(MemoryStorage::new()),
            Arc::new(MfaConfig::default()),
        )
    }

    #[tokio::test]
    async fn test_short_window_limit() {
        let tracker = tracker();

        for _ in 0..3 {
            assert!(!tracker.is_exceeded("u1", Method::Totp).await);
            tracker
                .increment("u1", Method::Totp, Window::Short)
                .await
                .unwrap();
            tracker
                .increment("u1", Method::Totp, Window::Daily)
                .await
                .unwrap();
        }
        assert!(tracker.is_exceeded("u1", Method::Totp).await);
    }

    #[tokio::test]
    async fn test_reset_clears_short_but_not_daily() {
        let tracker = tracker();

        for _ in 0..3 {
            tracker
                .increment("u1", Method::Sms, Window::Short)
                .await
                .unwrap();
            tracker
                .increment("u1", Method::Sms, Window::Daily)
                .await
                .unwrap();
        }
        assert!(tracker.is_exceeded("u1", Method::Sms).await);

        tracker.reset("u1", Method::Sms).await.unwrap();
        assert!(!tracker.is_exceeded("u1", Method::Sms).await);

        // The daily window still carries the earlier attempts.
        for _ in 0..7 {
            tracker
                .increment("u1", Method::Sms, Window::Daily)
                .await
                .unwrap();
        }
        assert!(tracker.is_exceeded("u1", Method::Sms).await);
    }

    #[tokio::test]
    async fn test_backup_code_single_attempt_window() {
        let tracker = tracker();

        assert!(!tracker.is_exceeded("u1", Method::BackupCode).await);
        tracker
            .increment("u1", Method::BackupCode, Window::Short)
            .await
            .unwrap();
        assert!(tracker.is_exceeded("u1", Method::BackupCode).await);
    }

    #[tokio::test]
    async fn test_counters_are_user_scoped() {
        let tracker = tracker();

        for _ in 0..3 {
            tracker
                .increment("u1", Method::Totp, Window::Short)
                .await
                .unwrap();
        }
        assert!(tracker.is_exceeded("u1", Method::Totp).await);
        assert!(!tracker.is_exceeded("u2", Method::Totp).await);
    }
}
