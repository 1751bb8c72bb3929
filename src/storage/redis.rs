//! Redis storage implementation.
//!
//! Counters use an atomic MULTI/EXEC pipeline so the INCR and EXPIRE land
//! together; everything else maps one-to-one onto Redis commands. Keys are
//! namespaced with a configurable prefix.

use crate::errors::{Result, StorageError};
use crate::storage::core::KeyValueStorage;
use async_trait::async_trait;
use std::time::Duration;

/// Redis-backed key-value store.
#[derive(Debug, Clone)]
pub struct RedisStorage {
    client: redis::Client,
    key_prefix: String,
}

impl RedisStorage {
    /// Create a new Redis storage.
    pub fn new(redis_url: &str, key_prefix: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(redis_url).map_err(|e| {
            StorageError::connection_failed(format!("Redis connection failed: {e}"))
        })?;

        Ok(Self {
            client,
            key_prefix: key_prefix.into(),
        })
    }

    /// Get a Redis connection.
    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| {
                StorageError::connection_failed(format!("Failed to get Redis connection: {e}"))
                    .into()
            })
    }

    /// Generate a key with the configured prefix.
    fn key(&self, suffix: &str) -> String {
        format!("{}{}", self.key_prefix, suffix)
    }
}

#[async_trait]
impl KeyValueStorage for RedisStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.get_connection().await?;

        let value: Option<Vec<u8>> = redis::cmd("GET")
            .arg(self.key(key))
            .query_async(&mut conn)
            .await
            .map_err(|e| StorageError::operation_failed(format!("Failed to get key: {e}")))?;

        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut conn = self.get_connection().await?;

        let _: () = redis::cmd("SET")
            .arg(self.key(key))
            .arg(value)
            .query_async(&mut conn)
            .await
            .map_err(|e| StorageError::operation_failed(format!("Failed to set key: {e}")))?;

        Ok(())
    }

    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let mut conn = self.get_connection().await?;

        let _: () = redis::cmd("SETEX")
            .arg(self.key(key))
            .arg(ttl.as_secs().max(1))
            .arg(value)
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                StorageError::operation_failed(format!("Failed to set key with TTL: {e}"))
            })?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.get_connection().await?;

        let _: () = redis::cmd("DEL")
            .arg(self.key(key))
            .query_async(&mut conn)
            .await
            .map_err(|e| StorageError::operation_failed(format!("Failed to delete key: {e}")))?;

        Ok(())
    }

    async fn increment(&self, key: &str) -> Result<i64> {
        let mut conn = self.get_connection().await?;

        let count: i64 = redis::cmd("INCR")
            .arg(self.key(key))
            .query_async(&mut conn)
            .await
            .map_err(|e| StorageError::operation_failed(format!("Failed to increment: {e}")))?;

        Ok(count)
    }

    async fn increment_with_ttl(&self, key: &str, ttl: Duration) -> Result<i64> {
        let mut conn = self.get_connection().await?;
        let storage_key = self.key(key);

        let (count,): (i64,) = redis::pipe()
            .atomic()
            .cmd("INCR")
            .arg(&storage_key)
            .cmd("EXPIRE")
            .arg(&storage_key)
            .arg(ttl.as_secs().max(1))
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                StorageError::operation_failed(format!("Failed to increment with TTL: {e}"))
            })?;

        Ok(count)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.get_connection().await?;

        let _: () = redis::cmd("EXPIRE")
            .arg(self.key(key))
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await
            .map_err(|e| StorageError::operation_failed(format!("Failed to set expiry: {e}")))?;

        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.get_connection().await?;

        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(self.key(pattern))
            .query_async(&mut conn)
            .await
            .map_err(|e| StorageError::operation_failed(format!("Failed to list keys: {e}")))?;

        Ok(keys
            .into_iter()
            .map(|k| {
                k.strip_prefix(&self.key_prefix)
                    .map(str::to_string)
                    .unwrap_or(k)
            })
            .collect())
    }

    async fn ttl(&self, key: &str) -> Result<i64> {
        let mut conn = self.get_connection().await?;

        let remaining: i64 = redis::cmd("TTL")
            .arg(self.key(key))
            .query_async(&mut conn)
            .await
            .map_err(|e| StorageError::operation_failed(format!("Failed to get TTL: {e}")))?;

        // Redis reports -2 for absent keys; callers only distinguish
        // "expiring in N seconds" from "no expiry".
        Ok(remaining.max(-1))
    }
}
