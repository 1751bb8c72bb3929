//! Core key-value storage contract.

use crate::errors::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Narrow key-value contract consumed by the MFA service.
///
/// Records are JSON-encoded bytes; counters are decimal integers. The
/// store is the single source of truth: callers never cache values across
/// requests, and concurrent safety rests entirely on the store's per-key
/// atomicity. `increment_with_ttl` is the one compound primitive: the
/// count bump and the TTL refresh must land as a single operation so two
/// concurrent verification attempts for the same key cannot race.
#[async_trait]
pub trait KeyValueStorage: Send + Sync {
    /// Retrieve a value, or `None` when the key is absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store a value without expiry.
    async fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Store a value that expires after `ttl`.
    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;

    /// Delete a key. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Increment a counter, creating it at 1 when absent. Returns the new
    /// count.
    async fn increment(&self, key: &str) -> Result<i64>;

    /// Increment a counter and refresh its TTL atomically. Returns the new
    /// count.
    async fn increment_with_ttl(&self, key: &str, ttl: Duration) -> Result<i64>;

    /// Set or refresh the expiry of an existing key.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<()>;

    /// List keys matching a glob-style pattern (`*` wildcard).
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// Remaining TTL in seconds, or -1 when the key is absent or has no
    /// expiry.
    async fn ttl(&self, key: &str) -> Result<i64>;
}
