//! Redis broker module for the appointment service
//!
//! This module provides functionality for connecting to Redis and the
//! pub/sub primitives used to relay appointment updates between service
//! instances.

use anyhow::Result;
use futures::{StreamExt, stream::BoxStream};
use redis::{AsyncCommands, Client};
use tracing::{info, warn};

/// Configuration for Redis connection
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    pub url: String,
}

impl RedisConfig {
    /// Create a new RedisConfig from environment variables
    ///
    /// # Environment Variables
    /// - `REDIS_URL`: Redis connection URL (default: "redis://localhost:6379")
    pub fn from_env() -> Result<Self> {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());

        Ok(RedisConfig { url })
    }
}

/// Redis client shared by publishers and the pattern subscriber
///
/// Publishes go over a multiplexed connection, so a single client serves
/// every caller without a pool size to tune.
#[derive(Clone)]
pub struct RedisPool {
    client: Client,
}

impl RedisPool {
    /// Open the Redis client
    pub async fn new(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.clone())?;
        info!("Redis client initialized with URL: {}", config.url);
        Ok(RedisPool { client })
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        let conn = self.client.get_multiplexed_async_connection().await?;
        Ok(conn)
    }

    /// Publish a payload on a channel, returning the number of receiving clients
    pub async fn publish(&self, channel: &str, payload: &str) -> Result<u64> {
        let mut conn = self.get_connection().await?;
        let receivers: u64 = conn.publish(channel, payload).await?;
        Ok(receivers)
    }

    /// Subscribe to every channel matching `pattern`
    ///
    /// Yields `(channel, payload)` pairs. Messages whose payload is not a
    /// string are logged and skipped.
    pub async fn subscribe_pattern(
        &self,
        pattern: &str,
    ) -> Result<BoxStream<'static, (String, String)>> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.psubscribe(pattern).await?;
        info!("Subscribed to Redis channel pattern: {}", pattern);

        let stream = pubsub
            .into_on_message()
            .filter_map(|msg| async move {
                let channel = msg.get_channel_name().to_string();
                match msg.get_payload::<String>() {
                    Ok(payload) => Some((channel, payload)),
                    Err(e) => {
                        warn!("Dropping unreadable message on {}: {}", channel, e);
                        None
                    }
                }
            })
            .boxed();

        Ok(stream)
    }

    /// Check if Redis is reachable
    pub async fn health_check(&self) -> Result<bool> {
        let mut conn = self.get_connection().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(pong == "PONG")
    }
}
