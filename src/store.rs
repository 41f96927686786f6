use async_trait::async_trait;
use thiserror::Error;

mod memory;
mod redis;

pub use memory::MemoryStore;
pub use redis::RedisStore;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Error type for key-value store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store authentication failed: {0}")]
    Auth(String),
    #[error("key '{0}' not found")]
    NotFound(String),
    #[error("store rejected the operation due to rate limiting")]
    RateLimited,
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("stored document could not be encoded or decoded: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Abstract interface for key-value storage backends.
///
/// Values are opaque bytes. Each operation is atomic on its own, but nothing
/// ties two keys together. Callers own any blob/metadata pairing and must
/// tolerate finding one half without the other.
#[async_trait]
pub trait KvStore: Send + Sync + Clone + 'static {
    /// Writes a value under the given key, replacing any previous value.
    async fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Reads the value stored under the given key.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Lists all keys starting with the given prefix, in stable order.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Deletes the key. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}
