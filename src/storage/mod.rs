//! Storage backends for MFA state.

pub mod core;
pub mod memory;

#[cfg(feature = "redis-storage")]
pub mod redis;

pub use core::KeyValueStorage;
pub use memory::MemoryStorage;

#[cfg(feature = "redis-storage")]
pub use redis::RedisStorage;
