//! Appointment store for database operations

use std::{collections::HashMap, sync::Arc};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use media::StoredAttachment;
use sqlx::{PgPool, Row, postgres::PgRow};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::Appointment;

/// Persistence contract for appointments
///
/// `save` is an upsert keyed by id; the store is the only serialization
/// point between concurrent mutations and the last write wins.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// Find an appointment by ID
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Appointment>>;

    /// All appointments listing `email` as a participant, earliest first
    async fn find_by_participant(&self, email: &str) -> Result<Vec<Appointment>>;

    /// Insert or replace an appointment
    async fn save(&self, appointment: &Appointment) -> Result<Appointment>;

    /// Remove an appointment, returning whether it existed
    async fn delete(&self, id: Uuid) -> Result<bool>;
}

const APPOINTMENT_COLUMNS: &str = r#"
    id, title, description, starts_at, local_time, participants, owner_id, status,
    attachment_url, attachment_filename, attachment_mimetype, content_preview,
    created_at, updated_at
"#;

/// PostgreSQL-backed appointment store
#[derive(Clone)]
pub struct PgAppointmentStore {
    pool: PgPool,
}

impl PgAppointmentStore {
    /// Create a new appointment store
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn from_row(row: &PgRow) -> Result<Appointment> {
        let status: String = row.try_get("status")?;
        let attachment_url: Option<String> = row.try_get("attachment_url")?;
        let attachment_filename: Option<String> = row.try_get("attachment_filename")?;
        let attachment_mimetype: Option<String> = row.try_get("attachment_mimetype")?;

        let attachment = match (attachment_url, attachment_filename) {
            (Some(url), Some(filename)) => Some(StoredAttachment {
                url,
                filename,
                mimetype: attachment_mimetype.unwrap_or_default(),
            }),
            _ => None,
        };

        Ok(Appointment {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            starts_at: row.try_get("starts_at")?,
            local_time: row.try_get("local_time")?,
            participants: row.try_get("participants")?,
            owner: row.try_get("owner_id")?,
            status: status.parse().map_err(|e: String| anyhow!(e))?,
            attachment,
            content_preview: row.try_get("content_preview")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl AppointmentStore for PgAppointmentStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Appointment>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM appointments WHERE id = $1",
            APPOINTMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn find_by_participant(&self, email: &str) -> Result<Vec<Appointment>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM appointments WHERE $1 = ANY(participants) ORDER BY starts_at ASC, id ASC",
            APPOINTMENT_COLUMNS
        ))
        .bind(email)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::from_row).collect()
    }

    async fn save(&self, appointment: &Appointment) -> Result<Appointment> {
        let attachment = appointment.attachment.as_ref();

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO appointments ({columns})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (id) DO UPDATE SET
                title = EXCLUDED.title,
                description = EXCLUDED.description,
                starts_at = EXCLUDED.starts_at,
                local_time = EXCLUDED.local_time,
                participants = EXCLUDED.participants,
                status = EXCLUDED.status,
                attachment_url = EXCLUDED.attachment_url,
                attachment_filename = EXCLUDED.attachment_filename,
                attachment_mimetype = EXCLUDED.attachment_mimetype,
                content_preview = EXCLUDED.content_preview,
                updated_at = EXCLUDED.updated_at
            RETURNING {columns}
            "#,
            columns = APPOINTMENT_COLUMNS
        ))
        .bind(appointment.id)
        .bind(&appointment.title)
        .bind(&appointment.description)
        .bind(appointment.starts_at)
        .bind(&appointment.local_time)
        .bind(&appointment.participants)
        .bind(appointment.owner)
        .bind(appointment.status.as_str())
        .bind(attachment.map(|a| a.url.clone()))
        .bind(attachment.map(|a| a.filename.clone()))
        .bind(attachment.map(|a| a.mimetype.clone()))
        .bind(&appointment.content_preview)
        .bind(appointment.created_at)
        .bind(appointment.updated_at)
        .fetch_one(&self.pool)
        .await?;

        Self::from_row(&row)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM appointments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// In-memory appointment store for local runs and tests
#[derive(Clone, Default)]
pub struct InMemoryAppointmentStore {
    appointments: Arc<RwLock<HashMap<Uuid, Appointment>>>,
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Appointment>> {
        Ok(self.appointments.read().await.get(&id).cloned())
    }

    async fn find_by_participant(&self, email: &str) -> Result<Vec<Appointment>> {
        let mut found: Vec<Appointment> = self
            .appointments
            .read()
            .await
            .values()
            .filter(|a| a.has_participant(email))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.starts_at.cmp(&b.starts_at).then(a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn save(&self, appointment: &Appointment) -> Result<Appointment> {
        self.appointments
            .write()
            .await
            .insert(appointment.id, appointment.clone());
        Ok(appointment.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.appointments.write().await.remove(&id).is_some())
    }
}
