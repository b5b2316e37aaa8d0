use redis::AsyncCommands;
use redis::Client;

use crate::error::{AppError, AppResult};
use crate::models::{AnalyticsKey, CacheEntry};
use crate::services::analytics_cache::AnalyticsStore;

/// Lifetime of an owner's key index; longer than any category TTL
const OWNER_INDEX_TTL: i64 = 60 * 60 * 24;

/// Creates a Redis client for caching
///
/// Establishes a connection to Redis for fast data caching.
/// Uses connection pooling via the connection-manager feature.
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

fn owner_index_key(owner: &str) -> String {
    format!("analytics-owner:{}", owner)
}

/// Analytics cache store backed by Redis
///
/// Entries are stored as JSON with `SET EX` so Redis evicts them on its own once the
/// TTL passes; freshness is still judged by the cache against its clock. Every key is
/// also recorded in a per-owner set so an owner's entries can be cleared together.
#[derive(Clone)]
pub struct RedisAnalyticsStore {
    redis_client: Client,
}

impl RedisAnalyticsStore {
    pub fn new(redis_client: Client) -> Self {
        Self { redis_client }
    }
}

#[async_trait::async_trait]
impl AnalyticsStore for RedisAnalyticsStore {
    async fn get(&self, key: &AnalyticsKey) -> AppResult<Option<CacheEntry>> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let cached: Option<String> = conn.get(key.to_string()).await?;

        match cached {
            Some(json) => {
                let entry = serde_json::from_str(&json).map_err(|e| {
                    AppError::Internal(format!("Cache deserialization error: {}", e))
                })?;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &AnalyticsKey, entry: &CacheEntry) -> AppResult<()> {
        let json = serde_json::to_string(entry)
            .map_err(|e| AppError::Internal(format!("Cache serialization error: {}", e)))?;
        let storage_key = key.to_string();
        let index_key = owner_index_key(&key.owner);

        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let _: () = redis::pipe()
            .atomic()
            .set_ex(&storage_key, json, entry.ttl_secs.max(1))
            .ignore()
            .sadd(&index_key, &storage_key)
            .ignore()
            .expire(&index_key, OWNER_INDEX_TTL)
            .ignore()
            .query_async(&mut conn)
            .await?;

        tracing::debug!(key = %storage_key, ttl = entry.ttl_secs, "Stored analytics value");
        Ok(())
    }

    async fn clear_owner(&self, owner: &str) -> AppResult<usize> {
        let index_key = owner_index_key(owner);
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;

        let members: Vec<String> = conn.smembers(&index_key).await?;
        let removed: usize = if members.is_empty() {
            0
        } else {
            conn.del(&members).await?
        };
        let _: () = conn.del(&index_key).await?;

        Ok(removed)
    }
}
