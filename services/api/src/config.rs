//! Service settings
//!
//! Read from `APPOINTMENTS_*` environment variables, e.g.
//! `APPOINTMENTS_BIND_ADDRESS=0.0.0.0:8080` or `APPOINTMENTS_STORAGE=memory`.
//! Connection settings for PostgreSQL, Redis and JWT keep their own
//! variables (`DATABASE_URL`, `REDIS_URL`, `JWT_SECRET`, ...).

use std::collections::HashMap;

use anyhow::{Context, Result};
use config::{Config, Environment};
use media::{S3StorageConfig, UploadOptions};
use serde::Deserialize;

use crate::notifier::MailRelayConfig;

pub const ENV_PREFIX: &str = "APPOINTMENTS";

/// Where appointments, users and attachments are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// PostgreSQL for records, S3 for attachments
    Postgres,
    /// Process memory, lost on restart
    Memory,
}

/// How appointment feeds reach subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedBackend {
    /// Delivered only to subscribers of this instance
    Local,
    /// Relayed through Redis pub/sub to every instance
    Redis,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub storage: StorageBackend,
    pub feed: FeedBackend,
    /// Lists buffered per feed channel before slow subscribers skip ahead
    pub feed_capacity: usize,
    pub max_upload_bytes: usize,
    pub mail_relay_url: Option<String>,
    pub mail_relay_api_key: Option<String>,
    pub mail_sender: String,
    pub attachment_bucket: String,
    pub attachment_folder: String,
    pub attachment_public_base_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3001".to_string(),
            storage: StorageBackend::Postgres,
            feed: FeedBackend::Local,
            feed_capacity: 16,
            max_upload_bytes: 10 * 1024 * 1024,
            mail_relay_url: None,
            mail_relay_api_key: None,
            mail_sender: "Appointments Team <noreply@appointments.local>".to_string(),
            attachment_bucket: "appointment-attachments".to_string(),
            attachment_folder: "appointments".to_string(),
            attachment_public_base_url: None,
        }
    }
}

impl ServerConfig {
    /// Load settings from the process environment
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Load settings from an explicit variable map instead of the environment
    pub fn from_map(vars: HashMap<String, String>) -> Result<Self> {
        Self::load(Some(vars))
    }

    fn load(vars: Option<HashMap<String, String>>) -> Result<Self> {
        let settings = Config::builder()
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .source(vars),
            )
            .build()
            .context("Failed to read service settings")?;

        let config: ServerConfig = settings
            .try_deserialize()
            .context("Invalid service settings")?;

        if config.feed_capacity == 0 {
            anyhow::bail!("{}_FEED_CAPACITY must be at least 1", ENV_PREFIX);
        }

        Ok(config)
    }

    /// Mail relay settings, when a relay is configured
    pub fn mail_relay(&self) -> Option<MailRelayConfig> {
        self.mail_relay_url.as_ref().map(|url| MailRelayConfig {
            url: url.clone(),
            api_key: self.mail_relay_api_key.clone(),
            sender: self.mail_sender.clone(),
        })
    }

    pub fn s3_storage(&self) -> S3StorageConfig {
        S3StorageConfig::new(
            self.attachment_bucket.clone(),
            self.attachment_public_base_url.clone(),
        )
    }

    pub fn upload_options(&self) -> UploadOptions {
        UploadOptions {
            folder: self.attachment_folder.clone(),
        }
    }
}
