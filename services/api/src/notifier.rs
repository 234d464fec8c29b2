//! Best-effort email notifications for appointment changes
//!
//! Notifications are sent after the change is committed, on a detached
//! task. A failed send is logged and never affects the mutation result.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub const SUBJECT_CREATED: &str = "New Appointment Created";
pub const SUBJECT_UPDATED: &str = "Appointment Updated";
pub const SUBJECT_RESCHEDULED: &str = "Appointment Rescheduled";
pub const SUBJECT_CANCELED: &str = "Appointment Canceled";
pub const SUBJECT_DELETED: &str = "Appointment Deleted";

/// One email sent to every recipient at once
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub recipients: Vec<String>,
    pub subject: String,
    pub message: String,
}

impl Notification {
    pub fn new(recipients: Vec<String>, subject: &str, message: String) -> Self {
        Self {
            recipients,
            subject: subject.to_string(),
            message,
        }
    }

    pub fn created(recipients: Vec<String>, title: &str, date: &str, time: &str) -> Self {
        Self::new(
            recipients,
            SUBJECT_CREATED,
            format!("Your appointment \"{}\" is on {} at {}.", title, date, time),
        )
    }

    pub fn updated(recipients: Vec<String>, title: &str) -> Self {
        Self::new(
            recipients,
            SUBJECT_UPDATED,
            format!("Your appointment \"{}\" has been updated.", title),
        )
    }

    pub fn rescheduled(recipients: Vec<String>, title: &str, date: &str, time: &str) -> Self {
        Self::new(
            recipients,
            SUBJECT_RESCHEDULED,
            format!(
                "Your appointment \"{}\" has been rescheduled to {} at {}.",
                title, date, time
            ),
        )
    }

    pub fn canceled(recipients: Vec<String>, title: &str) -> Self {
        Self::new(
            recipients,
            SUBJECT_CANCELED,
            format!("Your appointment \"{}\" has been canceled.", title),
        )
    }

    pub fn deleted(recipients: Vec<String>, title: &str) -> Self {
        Self::new(
            recipients,
            SUBJECT_DELETED,
            format!("Your appointment \"{}\" has been deleted.", title),
        )
    }

    /// HTML body: subject heading, message and an automated-mail footer
    pub fn html(&self) -> String {
        format!(
            concat!(
                r#"<div style="font-family: Arial, sans-serif; padding: 20px; background-color: #f4f4f4;">"#,
                r#"<div style="max-width: 600px; margin: 0 auto; background: white; border-radius: 8px; padding: 30px;">"#,
                r#"<h2 style="color: #333; border-bottom: 1px solid #ddd; padding-bottom: 10px;">{}</h2>"#,
                r#"<p style="color: #555; font-size: 16px;">{}</p>"#,
                r#"<p style="margin-top: 40px; font-size: 14px; color: #999;">This is an automated email from your appointment system.</p>"#,
                r#"</div></div>"#
            ),
            escape_html(&self.subject),
            escape_html(&self.message)
        )
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Outbound notification channel
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Writes notifications to the log instead of sending them
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        info!(
            "Notification '{}' to {}: {}",
            notification.subject,
            notification.recipients.join(", "),
            notification.message
        );
        Ok(())
    }
}

/// Settings for an HTTP mail relay
#[derive(Debug, Clone)]
pub struct MailRelayConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub sender: String,
}

#[derive(Serialize)]
struct MailRequest<'a> {
    from: &'a str,
    to: &'a [String],
    subject: &'a str,
    text: &'a str,
    html: String,
}

/// Sends notifications as JSON to an HTTP mail relay
#[derive(Clone)]
pub struct HttpMailNotifier {
    client: reqwest::Client,
    config: MailRelayConfig,
}

impl HttpMailNotifier {
    pub fn new(config: MailRelayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("appointments-notifier")
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl Notifier for HttpMailNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        let body = MailRequest {
            from: &self.config.sender,
            to: &notification.recipients,
            subject: &notification.subject,
            text: &notification.message,
            html: notification.html(),
        };

        let mut request = self.client.post(&self.config.url).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.context("Mail relay unreachable")?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Mail relay returned status {}", status);
        }

        Ok(())
    }
}

/// Send a notification on a detached task
///
/// Returns `None` without spawning when there is nobody to notify.
pub fn dispatch(notifier: Arc<dyn Notifier>, notification: Notification) -> Option<JoinHandle<()>> {
    if notification.recipients.is_empty() {
        warn!("Skipping '{}' notification without recipients", notification.subject);
        return None;
    }

    Some(tokio::spawn(async move {
        match notifier.notify(&notification).await {
            Ok(()) => info!(
                "Sent '{}' notification to {} recipient(s)",
                notification.subject,
                notification.recipients.len()
            ),
            Err(e) => error!(
                "Failed to send '{}' notification: {:#}",
                notification.subject, e
            ),
        }
    }))
}
