use super::{KvStore, Result, StoreError};
use async_trait::async_trait;
use redis::{AsyncCommands, ErrorKind, RedisError, aio::ConnectionManager};

/// A Redis-backed key-value store.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Creates a new Redis store from a connection manager.
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(key, value).await.map_err(map_redis_error)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let value = conn.get(key).await.map_err(map_redis_error)?;
        Ok(value)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        // SCAN, not KEYS: prefix listings must never block the server.
        let mut conn = self.conn.clone();
        let pattern = format!("{prefix}*");
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(map_redis_error)?;
            keys.extend(batch);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await.map_err(map_redis_error)?;
        Ok(())
    }
}

fn map_redis_error(error: RedisError) -> StoreError {
    match error.kind() {
        ErrorKind::AuthenticationFailed => StoreError::Auth(error.to_string()),
        ErrorKind::TryAgain | ErrorKind::BusyLoadingError => StoreError::RateLimited,
        _ => StoreError::Unavailable(error.to_string()),
    }
}
