//! Redis-backed [`CacheStore`].

use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};
use tracing::info;

use crate::cache::{CacheError, CacheStore};

#[derive(Clone)]
pub struct RedisCacheStore {
    connection: ConnectionManager,
}

impl RedisCacheStore {
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url).map_err(CacheError::backend)?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(CacheError::backend)?;
        info!(target = "roamly::cache::redis", "redis cache connected");
        Ok(Self { connection })
    }
}

/// Redis expiries are whole seconds; anything shorter still lives for one.
fn expiry_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection.clone();
        conn.get(key).await.map_err(CacheError::backend)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        conn.set_ex::<_, _, ()>(key, value, expiry_seconds(ttl))
            .await
            .map_err(CacheError::backend)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let mut conn = self.connection.clone();
        conn.keys(pattern).await.map_err(CacheError::backend)
    }

    async fn delete(&self, keys: &[String]) -> Result<usize, CacheError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connection.clone();
        conn.del(keys.to_vec()).await.map_err(CacheError::backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_rounds_down_to_whole_seconds() {
        assert_eq!(expiry_seconds(Duration::from_secs(900)), 900);
        assert_eq!(expiry_seconds(Duration::from_millis(1500)), 1);
        assert_eq!(expiry_seconds(Duration::from_millis(10)), 1);
    }
}
