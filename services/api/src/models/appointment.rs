//! Appointment model and request payloads

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use media::StoredAttachment;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::time::{DisplaySlot, to_display};

/// Message returned after a successful delete
pub const DELETED_MESSAGE: &str = "Appointment successfully deleted.";

/// Lifecycle state of an appointment
///
/// `Canceled` is terminal: the only operation allowed afterwards is delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppointmentStatus {
    Scheduled,
    Rescheduled,
    Canceled,
    Updated,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "Scheduled",
            AppointmentStatus::Rescheduled => "Rescheduled",
            AppointmentStatus::Canceled => "Canceled",
            AppointmentStatus::Updated => "Updated",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Scheduled" => Ok(AppointmentStatus::Scheduled),
            "Rescheduled" => Ok(AppointmentStatus::Rescheduled),
            "Canceled" => Ok(AppointmentStatus::Canceled),
            "Updated" => Ok(AppointmentStatus::Updated),
            other => Err(format!("Unknown appointment status: {}", other)),
        }
    }
}

/// Stored appointment
#[derive(Debug, Clone, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    /// Absolute start instant resolved in the owner's timezone
    pub starts_at: DateTime<Utc>,
    /// `HH:mm` clock string as the owner entered it
    pub local_time: String,
    pub participants: Vec<String>,
    pub owner: Uuid,
    pub status: AppointmentStatus,
    pub attachment: Option<StoredAttachment>,
    pub content_preview: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn is_canceled(&self) -> bool {
        self.status == AppointmentStatus::Canceled
    }

    pub fn has_participant(&self, email: &str) -> bool {
        self.participants.iter().any(|p| p == email)
    }
}

/// Appointment as presented to one viewer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentView {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub date: String,
    pub time: String,
    pub participants: Vec<String>,
    pub owner: Uuid,
    pub status: AppointmentStatus,
    pub attachment: Option<StoredAttachment>,
    pub content_preview: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AppointmentView {
    /// Render an appointment in the viewer's timezone
    pub fn render(appointment: &Appointment, viewer_timezone: Tz) -> Self {
        let DisplaySlot { date, time } = to_display(
            appointment.starts_at,
            &appointment.local_time,
            viewer_timezone,
        );

        Self {
            id: appointment.id,
            title: appointment.title.clone(),
            description: appointment.description.clone(),
            date,
            time,
            participants: appointment.participants.clone(),
            owner: appointment.owner,
            status: appointment.status,
            attachment: appointment.attachment.clone(),
            content_preview: appointment.content_preview.clone(),
            created_at: appointment.created_at,
            updated_at: appointment.updated_at,
        }
    }
}

/// Create payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAppointment {
    pub title: String,
    pub description: Option<String>,
    pub date: String,
    pub time: String,
    pub participants: Vec<String>,
}

/// Fields an owner may change with an update
///
/// Anything else, including `status`, `owner` and `id`, is rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppointmentPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub participants: Option<Vec<String>>,
}

impl AppointmentPatch {
    pub fn touches_schedule(&self) -> bool {
        self.date.is_some() || self.time.is_some()
    }
}

/// Reschedule payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleRequest {
    pub date: String,
    pub time: String,
}

/// Delete result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub message: String,
}

impl Default for DeleteResponse {
    fn default() -> Self {
        Self {
            message: DELETED_MESSAGE.to_string(),
        }
    }
}
