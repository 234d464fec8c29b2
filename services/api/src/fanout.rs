//! Per-participant appointment feeds
//!
//! After every mutation each affected participant's complete, freshly
//! rendered list is published on that participant's channel. Subscribers
//! hold a broadcast receiver; a receiver that falls behind skips the lists
//! it missed.

use std::{collections::HashMap, sync::Arc};

use anyhow::{Context, Result};
use async_trait::async_trait;
use common::broker::RedisPool;
use futures::StreamExt;
use tokio::{
    sync::{RwLock, broadcast},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::models::AppointmentView;

/// A participant's full list, shared between subscribers
pub type AppointmentFeed = Arc<Vec<AppointmentView>>;

/// Redis channel prefix for relayed feeds
pub const FEED_CHANNEL_PREFIX: &str = "appointments_updated:";

/// Destination for recomputed appointment lists
#[async_trait]
pub trait FeedPublisher: Send + Sync {
    async fn publish(&self, email: &str, feed: AppointmentFeed) -> Result<()>;
}

/// In-process registry of per-email broadcast channels
#[derive(Clone)]
pub struct SubscriptionBus {
    channels: Arc<RwLock<HashMap<String, broadcast::Sender<AppointmentFeed>>>>,
    capacity: usize,
}

impl SubscriptionBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Open a receiver on `email`'s channel, creating it if needed
    ///
    /// Channels left without receivers by earlier disconnects are swept
    /// here, so an email that never sees another publish does not linger.
    pub async fn subscribe(&self, email: &str) -> broadcast::Receiver<AppointmentFeed> {
        let mut channels = self.channels.write().await;
        let before = channels.len();
        channels.retain(|_, sender| sender.receiver_count() > 0);
        if channels.len() < before {
            debug!("Swept {} idle feed channel(s)", before - channels.len());
        }

        channels
            .entry(email.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Deliver a feed to current subscribers, returning how many received it
    ///
    /// Channels whose subscribers are all gone are dropped.
    pub async fn send(&self, email: &str, feed: AppointmentFeed) -> usize {
        let mut channels = self.channels.write().await;
        let Some(sender) = channels.get(email) else {
            return 0;
        };

        match sender.send(feed) {
            Ok(receivers) => receivers,
            Err(_) => {
                channels.remove(email);
                debug!("Dropped idle feed channel for {}", email);
                0
            }
        }
    }

    pub async fn subscriber_count(&self, email: &str) -> usize {
        self.channels
            .read()
            .await
            .get(email)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl FeedPublisher for SubscriptionBus {
    async fn publish(&self, email: &str, feed: AppointmentFeed) -> Result<()> {
        let receivers = self.send(email, feed).await;
        debug!("Published feed for {} to {} subscriber(s)", email, receivers);
        Ok(())
    }
}

/// Publishes feeds through Redis so every service instance can deliver them
#[derive(Clone)]
pub struct RedisFeedRelay {
    redis: RedisPool,
}

impl RedisFeedRelay {
    pub fn new(redis: RedisPool) -> Self {
        Self { redis }
    }

    /// Forward relayed feeds into the local bus until the subscription ends
    pub async fn spawn_listener(&self, bus: SubscriptionBus) -> Result<JoinHandle<()>> {
        let pattern = format!("{}*", FEED_CHANNEL_PREFIX);
        let mut messages = self
            .redis
            .subscribe_pattern(&pattern)
            .await
            .context("Failed to subscribe to appointment feed channels")?;

        Ok(tokio::spawn(async move {
            while let Some((channel, payload)) = messages.next().await {
                let Some(email) = channel.strip_prefix(FEED_CHANNEL_PREFIX) else {
                    continue;
                };

                match serde_json::from_str::<Vec<AppointmentView>>(&payload) {
                    Ok(feed) => {
                        bus.send(email, Arc::new(feed)).await;
                    }
                    Err(e) => warn!("Ignoring malformed feed on {}: {}", channel, e),
                }
            }
            error!("Redis feed subscription closed");
        }))
    }
}

#[async_trait]
impl FeedPublisher for RedisFeedRelay {
    async fn publish(&self, email: &str, feed: AppointmentFeed) -> Result<()> {
        let payload = serde_json::to_string(feed.as_ref())?;
        let channel = format!("{}{}", FEED_CHANNEL_PREFIX, email);
        let receivers = self.redis.publish(&channel, &payload).await?;
        debug!("Relayed feed on {} to {} instance(s)", channel, receivers);
        Ok(())
    }
}

/// Publisher that fans out to an in-process bus, used on a single node
pub fn local_publisher(bus: &SubscriptionBus) -> Arc<dyn FeedPublisher> {
    info!("Appointment feeds delivered in-process");
    Arc::new(bus.clone())
}
