//! In-memory storage implementation (for development/testing).
//!
//! Backed by `DashMap` so every per-key operation happens under that
//! key's shard lock. Expiry is checked lazily on read; `cleanup_expired`
//! drops stale entries eagerly.

use crate::errors::Result;
use crate::storage::core::KeyValueStorage;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
struct StoredValue {
    data: Vec<u8>,
    expires_at: Option<DateTime<Utc>>,
}

impl StoredValue {
    fn new(data: Vec<u8>, ttl: Option<Duration>) -> Self {
        let expires_at = ttl.map(|d| Utc::now() + chrono::Duration::from_std(d).unwrap());
        Self { data, expires_at }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.map(|exp| Utc::now() > exp).unwrap_or(false)
    }
}

/// In-memory key-value store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<DashMap<String, StoredValue>>,
}

impl MemoryStorage {
    /// Create a new in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired entries instead of waiting for the next read.
    pub fn cleanup_expired(&self) {
        self.entries.retain(|_, value| !value.is_expired());
    }

    fn glob_match(pattern: &str, key: &str) -> bool {
        let parts: Vec<&str> = pattern.split('*').collect();
        if parts.len() == 1 {
            return pattern == key;
        }
        let mut pos = 0;
        for (i, part) in parts.iter().enumerate() {
            if part.is_empty() {
                continue;
            }
            if i == 0 {
                if !key.starts_with(part) {
                    return false;
                }
                pos = part.len();
            } else if i == parts.len() - 1 {
                return key.len() >= pos && key[pos..].ends_with(part);
            } else {
                match key[pos..].find(part) {
                    Some(idx) => pos += idx + part.len(),
                    None => return false,
                }
            }
        }
        true
    }

    fn parse_count(data: &[u8]) -> i64 {
        std::str::from_utf8(data)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    }
}

#[async_trait]
impl KeyValueStorage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        // Extract the value and drop the map reference before any removal.
        let (data, expired) = match self.entries.get(key) {
            Some(entry) => (Some(entry.data.clone()), entry.is_expired()),
            None => (None, false),
        };

        if expired {
            self.entries.remove(key);
            return Ok(None);
        }
        Ok(data)
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries
            .insert(key.to_string(), StoredValue::new(value.to_vec(), None));
        Ok(())
    }

    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        self.entries
            .insert(key.to_string(), StoredValue::new(value.to_vec(), Some(ttl)));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn increment(&self, key: &str) -> Result<i64> {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| StoredValue::new(b"0".to_vec(), None));
        if entry.is_expired() {
            *entry = StoredValue::new(b"0".to_vec(), None);
        }
        let next = Self::parse_count(&entry.data) + 1;
        entry.data = next.to_string().into_bytes();
        Ok(next)
    }

    async fn increment_with_ttl(&self, key: &str, ttl: Duration) -> Result<i64> {
        // Bump and refresh under the entry lock so concurrent callers
        // cannot interleave between the two.
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| StoredValue::new(b"0".to_vec(), Some(ttl)));
        if entry.is_expired() {
            *entry = StoredValue::new(b"0".to_vec(), Some(ttl));
        }
        let next = Self::parse_count(&entry.data) + 1;
        entry.data = next.to_string().into_bytes();
        entry.expires_at = Some(Utc::now() + chrono::Duration::from_std(ttl).unwrap());
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.expires_at = Some(Utc::now() + chrono::Duration::from_std(ttl).unwrap());
        }
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        Ok(self
            .entries
            .iter()
            .filter(|entry| !entry.value().is_expired())
            .filter(|entry| Self::glob_match(pattern, entry.key()))
            .map(|entry| entry.key().clone())
            .collect())
    }

    async fn ttl(&self, key: &str) -> Result<i64> {
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => Ok(entry
                .expires_at
                .map(|exp| (exp - Utc::now()).num_seconds().max(0))
                .unwrap_or(-1)),
            _ => Ok(-1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_kv_roundtrip() {
        let storage = MemoryStorage::new();

        storage.set("key1", b"value1").await.unwrap();
        assert_eq!(storage.get("key1").await.unwrap().unwrap(), b"value1");

        storage.delete("key1").await.unwrap();
        assert!(storage.get("key1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let storage = MemoryStorage::new();

        storage
            .set_with_ttl("short", b"v", Duration::from_millis(10))
            .await
            .unwrap();
        assert!(storage.get("short").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(storage.get("short").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_increment_creates_at_one() {
        let storage = MemoryStorage::new();

        assert_eq!(storage.increment("counter").await.unwrap(), 1);
        assert_eq!(storage.increment("counter").await.unwrap(), 2);
        assert_eq!(storage.increment("counter").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_increment_with_ttl_refreshes_expiry() {
        let storage = MemoryStorage::new();

        storage
            .increment_with_ttl("counter", Duration::from_secs(60))
            .await
            .unwrap();
        let remaining = storage.ttl("counter").await.unwrap();
        assert!((55..=60).contains(&remaining));
    }

    #[tokio::test]
    async fn test_concurrent_increments_do_not_lose_updates() {
        let storage = MemoryStorage::new();

        let mut handles = Vec::new();
        for _ in 0..20 {
            let storage = storage.clone();
            handles.push(tokio::spawn(async move {
                storage
                    .increment_with_ttl("counter", Duration::from_secs(60))
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let data = storage.get("counter").await.unwrap().unwrap();
        assert_eq!(MemoryStorage::parse_count(&data), 20);
    }

    #[tokio::test]
    async fn test_keys_pattern() {
        let storage = MemoryStorage::new();

        storage.set("mfa:attempts:u1:totp:short", b"1").await.unwrap();
        storage.set("mfa:attempts:u1:totp:daily", b"1").await.unwrap();
        storage.set("mfa:attempts:u2:totp:short", b"1").await.unwrap();

        let mut keys = storage.keys("mfa:attempts:u1:*").await.unwrap();
        keys.sort();
        assert_eq!(
            keys,
            vec!["mfa:attempts:u1:totp:daily", "mfa:attempts:u1:totp:short"]
        );
    }

    #[tokio::test]
    async fn test_expire_attaches_ttl() {
        let storage = MemoryStorage::new();

        storage.set("key", b"v").await.unwrap();
        storage
            .expire("key", Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(storage.get("key").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ttl_of_persistent_key() {
        let storage = MemoryStorage::new();

        storage.set("forever", b"v").await.unwrap();
        assert_eq!(storage.ttl("forever").await.unwrap(), -1);
        assert_eq!(storage.ttl("absent").await.unwrap(), -1);
    }
}
