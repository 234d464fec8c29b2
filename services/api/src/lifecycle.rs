//! Appointment lifecycle: creation, edits, rescheduling, cancellation and removal
//!
//! Every mutation follows the same sequence. Inputs are validated and
//! ownership is checked, then the record is persisted. Once it is committed
//! the participants are notified on a detached task and each affected
//! participant's feed is recomputed and published.

use std::sync::Arc;

use auth::{AuthUser, UserDirectory, models::User, validation::normalize_email};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use futures::{StreamExt, stream::{self, BoxStream}};
use media::{AttachmentStore, UploadOptions, UploadedFile, content_preview, ensure_supported};
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    fanout::{AppointmentFeed, FeedPublisher, SubscriptionBus},
    models::{
        Appointment, AppointmentPatch, AppointmentStatus, AppointmentView, DeleteResponse,
        NewAppointment, RescheduleRequest,
    },
    notifier::{Notification, Notifier, dispatch},
    repositories::AppointmentStore,
    time::{local_parts, resolve_timezone, to_stored_instant},
    validation::{normalize_participants, validate_title},
};

/// Appointment operations on behalf of an authenticated caller
#[derive(Clone)]
pub struct AppointmentService {
    appointments: Arc<dyn AppointmentStore>,
    users: Arc<dyn UserDirectory>,
    attachments: Arc<dyn AttachmentStore>,
    notifier: Arc<dyn Notifier>,
    bus: SubscriptionBus,
    publisher: Arc<dyn FeedPublisher>,
    upload_options: UploadOptions,
}

impl AppointmentService {
    /// Create a service delivering feeds through `publisher`
    ///
    /// Subscribers always read from `bus`; the publisher decides how lists
    /// reach it (directly, or relayed through another instance).
    pub fn new(
        appointments: Arc<dyn AppointmentStore>,
        users: Arc<dyn UserDirectory>,
        attachments: Arc<dyn AttachmentStore>,
        notifier: Arc<dyn Notifier>,
        bus: SubscriptionBus,
        publisher: Arc<dyn FeedPublisher>,
    ) -> Self {
        Self {
            appointments,
            users,
            attachments,
            notifier,
            bus,
            publisher,
            upload_options: UploadOptions::default(),
        }
    }

    pub fn with_upload_options(mut self, upload_options: UploadOptions) -> Self {
        self.upload_options = upload_options;
        self
    }

    /// Every appointment `email` participates in, rendered in that user's timezone
    pub async fn list_for(&self, email: &str) -> ApiResult<Vec<AppointmentView>> {
        let email = normalize_email(email);
        let timezone = self.viewer_timezone(&email).await?;

        let appointments = self
            .appointments
            .find_by_participant(&email)
            .await
            .map_err(ApiError::internal("Failed to list appointments"))?;

        Ok(appointments
            .iter()
            .map(|a| AppointmentView::render(a, timezone))
            .collect())
    }

    /// The caller's own appointments
    pub async fn get_appointments(&self, caller: &AuthUser) -> ApiResult<Vec<AppointmentView>> {
        self.list_for(&caller.email).await
    }

    /// A single appointment, `None` when it does not exist
    pub async fn get_appointment(
        &self,
        caller: &AuthUser,
        id: Uuid,
    ) -> ApiResult<Option<AppointmentView>> {
        let Some(appointment) = self.find(id).await? else {
            return Ok(None);
        };

        let email = normalize_email(&caller.email);
        if !appointment.has_participant(&email) {
            return Err(ApiError::Unauthorized);
        }

        let timezone = self.viewer_timezone(&email).await?;
        Ok(Some(AppointmentView::render(&appointment, timezone)))
    }

    pub async fn create(
        &self,
        caller: &AuthUser,
        input: NewAppointment,
        file: Option<UploadedFile>,
    ) -> ApiResult<AppointmentView> {
        let owner = self.owner(caller).await?;
        let owner_timezone = resolve_timezone(&owner.timezone);

        validate_title(&input.title).map_err(ApiError::Validation)?;
        let participants =
            normalize_participants(&input.participants, &owner.email).map_err(ApiError::Validation)?;
        let time = input.time.trim().to_string();
        let starts_at = future_instant(input.date.trim(), &time, owner_timezone)?;

        let (attachment, preview) = match file {
            Some(file) => {
                ensure_supported(&file.filename)?;
                let stored = self.attachments.upload(&file, &self.upload_options).await?;
                (Some(stored), content_preview(&file.bytes))
            }
            None => (None, None),
        };

        let now = Utc::now();
        let appointment = Appointment {
            id: Uuid::new_v4(),
            title: input.title.trim().to_string(),
            description: clean_description(input.description),
            starts_at,
            local_time: time.clone(),
            participants,
            owner: owner.id,
            status: AppointmentStatus::Scheduled,
            attachment,
            content_preview: preview,
            created_at: now,
            updated_at: now,
        };

        let saved = self.persist(&appointment).await?;
        info!("Created appointment {} for {}", saved.id, owner.email);

        self.announce(
            Notification::created(
                saved.participants.clone(),
                &saved.title,
                input.date.trim(),
                &time,
            ),
            &saved.participants,
        )
        .await;

        Ok(AppointmentView::render(&saved, owner_timezone))
    }

    pub async fn update(
        &self,
        caller: &AuthUser,
        id: Uuid,
        patch: AppointmentPatch,
    ) -> ApiResult<AppointmentView> {
        let existing = self.owned(caller, id).await?;
        if existing.is_canceled() {
            return Err(ApiError::AlreadyCanceled);
        }

        let owner = self.owner(caller).await?;
        let owner_timezone = resolve_timezone(&owner.timezone);
        let mut updated = existing.clone();

        if let Some(title) = &patch.title {
            validate_title(title).map_err(ApiError::Validation)?;
            updated.title = title.trim().to_string();
        }

        if patch.description.is_some() {
            updated.description = clean_description(patch.description.clone());
        }

        if patch.touches_schedule() {
            let (current_date, current_time) = local_parts(existing.starts_at, owner_timezone);
            let date = patch
                .date
                .as_deref()
                .map(str::trim)
                .unwrap_or(current_date.as_str())
                .to_string();
            let time = patch
                .time
                .as_deref()
                .map(str::trim)
                .unwrap_or(current_time.as_str())
                .to_string();

            updated.starts_at = future_instant(&date, &time, owner_timezone)?;
            updated.local_time = time;
        }

        if let Some(submitted) = &patch.participants {
            updated.participants =
                normalize_participants(submitted, &owner.email).map_err(ApiError::Validation)?;
        }

        updated.status = AppointmentStatus::Updated;
        updated.updated_at = Utc::now();

        let saved = self.persist(&updated).await?;
        info!("Updated appointment {}", saved.id);

        let affected = union(&saved.participants, &existing.participants);
        self.announce(Notification::updated(affected.clone(), &saved.title), &affected)
            .await;

        Ok(AppointmentView::render(&saved, owner_timezone))
    }

    pub async fn reschedule(
        &self,
        caller: &AuthUser,
        id: Uuid,
        request: RescheduleRequest,
    ) -> ApiResult<AppointmentView> {
        let existing = self.owned(caller, id).await?;
        if existing.is_canceled() {
            return Err(ApiError::AlreadyCanceled);
        }

        let owner = self.owner(caller).await?;
        let owner_timezone = resolve_timezone(&owner.timezone);
        let date = request.date.trim();
        let time = request.time.trim();

        let mut rescheduled = existing;
        rescheduled.starts_at = future_instant(date, time, owner_timezone)?;
        rescheduled.local_time = time.to_string();
        rescheduled.status = AppointmentStatus::Rescheduled;
        rescheduled.updated_at = Utc::now();

        let saved = self.persist(&rescheduled).await?;
        info!("Rescheduled appointment {} to {} {}", saved.id, date, time);

        self.announce(
            Notification::rescheduled(saved.participants.clone(), &saved.title, date, time),
            &saved.participants,
        )
        .await;

        Ok(AppointmentView::render(&saved, owner_timezone))
    }

    pub async fn cancel(&self, caller: &AuthUser, id: Uuid) -> ApiResult<AppointmentView> {
        let mut appointment = self.owned(caller, id).await?;
        if appointment.is_canceled() {
            return Err(ApiError::AlreadyCanceled);
        }

        appointment.status = AppointmentStatus::Canceled;
        appointment.updated_at = Utc::now();

        let saved = self.persist(&appointment).await?;
        info!("Canceled appointment {}", saved.id);

        self.announce(
            Notification::canceled(saved.participants.clone(), &saved.title),
            &saved.participants,
        )
        .await;

        let timezone = self.viewer_timezone(&normalize_email(&caller.email)).await?;
        Ok(AppointmentView::render(&saved, timezone))
    }

    pub async fn delete(&self, caller: &AuthUser, id: Uuid) -> ApiResult<DeleteResponse> {
        let appointment = self.owned(caller, id).await?;
        let participants = appointment.participants.clone();

        let removed = self
            .appointments
            .delete(id)
            .await
            .map_err(ApiError::internal("Failed to delete appointment"))?;
        if !removed {
            return Err(ApiError::NotFound("Appointment".to_string()));
        }
        info!("Deleted appointment {}", id);

        self.announce(
            Notification::deleted(participants.clone(), &appointment.title),
            &participants,
        )
        .await;

        Ok(DeleteResponse::default())
    }

    /// Current list for `email` followed by every later publish on its channel
    ///
    /// Callers may only follow their own feed.
    pub async fn subscribe(
        &self,
        caller: &AuthUser,
        email: &str,
    ) -> ApiResult<BoxStream<'static, AppointmentFeed>> {
        let email = normalize_email(email);
        if email != normalize_email(&caller.email) {
            return Err(ApiError::Unauthorized);
        }

        // Receiver first so nothing published while the snapshot loads is lost
        let receiver = self.bus.subscribe(&email).await;
        let snapshot: AppointmentFeed = Arc::new(self.list_for(&email).await?);
        debug!("Feed subscription opened for {}", email);

        let live = BroadcastStream::new(receiver).filter_map(|message| async move { message.ok() });
        Ok(stream::once(async move { snapshot }).chain(live).boxed())
    }

    async fn find(&self, id: Uuid) -> ApiResult<Option<Appointment>> {
        self.appointments
            .find_by_id(id)
            .await
            .map_err(ApiError::internal("Failed to load appointment"))
    }

    /// Load an appointment the caller owns
    async fn owned(&self, caller: &AuthUser, id: Uuid) -> ApiResult<Appointment> {
        let appointment = self
            .find(id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Appointment".to_string()))?;

        if appointment.owner != caller.id {
            return Err(ApiError::Unauthorized);
        }

        Ok(appointment)
    }

    /// The caller's account; a token for a removed account is no longer valid
    async fn owner(&self, caller: &AuthUser) -> ApiResult<User> {
        self.users
            .find_by_id(caller.id)
            .await
            .map_err(ApiError::internal("Failed to look up user"))?
            .ok_or(ApiError::Unauthenticated)
    }

    /// Timezone of the account registered under `email`, UTC when there is none
    async fn viewer_timezone(&self, email: &str) -> ApiResult<Tz> {
        let user = self
            .users
            .find_by_email(email)
            .await
            .map_err(ApiError::internal("Failed to look up user"))?;

        Ok(user
            .map(|u| resolve_timezone(&u.timezone))
            .unwrap_or(Tz::UTC))
    }

    async fn persist(&self, appointment: &Appointment) -> ApiResult<Appointment> {
        self.appointments
            .save(appointment)
            .await
            .map_err(ApiError::internal("Failed to save appointment"))
    }

    /// Post-commit side effects: detached notification, then feed fan-out
    async fn announce(&self, notification: Notification, participants: &[String]) {
        dispatch(Arc::clone(&self.notifier), notification);
        self.fan_out(participants).await;
    }

    /// Publish each participant's recomputed list, in participant order
    async fn fan_out(&self, participants: &[String]) {
        for email in participants {
            let feed = match self.list_for(email).await {
                Ok(list) => Arc::new(list),
                Err(e) => {
                    error!("Failed to recompute feed for {}: {}", email, e);
                    continue;
                }
            };

            if let Err(e) = self.publisher.publish(email, feed).await {
                error!("Failed to publish feed for {}: {:#}", email, e);
            }
        }
    }
}

/// Resolve a local schedule and require it to lie strictly in the future
fn future_instant(date: &str, time: &str, timezone: Tz) -> ApiResult<DateTime<Utc>> {
    let starts_at = to_stored_instant(date, time, timezone)?;
    if starts_at <= Utc::now() {
        return Err(ApiError::PastDate);
    }
    Ok(starts_at)
}

fn clean_description(description: Option<String>) -> Option<String> {
    description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
}

/// `first` followed by the entries of `second` it lacks
fn union(first: &[String], second: &[String]) -> Vec<String> {
    let mut all = first.to_vec();
    for email in second {
        if !all.contains(email) {
            all.push(email.clone());
        }
    }
    all
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emails(list: &[&str]) -> Vec<String> {
        list.iter().map(|e| e.to_string()).collect()
    }

    #[test]
    fn union_keeps_current_order_then_removed() {
        assert_eq!(
            union(&emails(&["b@x.com", "a@x.com"]), &emails(&["a@x.com", "c@x.com"])),
            emails(&["b@x.com", "a@x.com", "c@x.com"])
        );
    }

    #[test]
    fn blank_descriptions_are_dropped() {
        assert_eq!(clean_description(Some("   ".to_string())), None);
        assert_eq!(
            clean_description(Some(" Bring slides ".to_string())),
            Some("Bring slides".to_string())
        );
        assert_eq!(clean_description(None), None);
    }

    #[test]
    fn past_instants_are_rejected() {
        assert!(matches!(
            future_instant("2020-01-01", "09:00", Tz::UTC),
            Err(ApiError::PastDate)
        ));
        assert!(future_instant("2999-01-01", "09:00", Tz::UTC).is_ok());
        assert!(matches!(
            future_instant("2999-13-01", "09:00", Tz::UTC),
            Err(ApiError::Validation(_))
        ));
    }
}
