//! Lifecycle scenarios against in-memory stores

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::Result;
use api::{
    ApiError, AppointmentService,
    fanout::{AppointmentFeed, FeedPublisher, SubscriptionBus},
    models::{Appointment, AppointmentPatch, AppointmentStatus, NewAppointment, RescheduleRequest},
    notifier::{Notification, Notifier},
    repositories::{AppointmentStore, InMemoryAppointmentStore},
};
use async_trait::async_trait;
use auth::{AuthUser, UserDirectory, models::UserRecord, repositories::InMemoryUserRepository};
use chrono::{Duration as ChronoDuration, Utc};
use futures::StreamExt;
use media::{
    AttachmentStore, InMemoryAttachmentStore, MediaError, MediaResult, StoredAttachment,
    UploadOptions, UploadedFile,
};
use tokio::{sync::mpsc, time::timeout};
use uuid::Uuid;

struct RecordingNotifier {
    sent: mpsc::UnboundedSender<Notification>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        let _ = self.sent.send(notification.clone());
        Ok(())
    }
}

/// Records every publish before handing it to the bus
#[derive(Clone)]
struct RecordingPublisher {
    bus: SubscriptionBus,
    published: Arc<Mutex<Vec<(String, usize)>>>,
}

#[async_trait]
impl FeedPublisher for RecordingPublisher {
    async fn publish(&self, email: &str, feed: AppointmentFeed) -> Result<()> {
        self.published
            .lock()
            .unwrap()
            .push((email.to_string(), feed.len()));
        self.bus.publish(email, feed).await
    }
}

struct BrokenAttachmentStore;

#[async_trait]
impl AttachmentStore for BrokenAttachmentStore {
    async fn upload(
        &self,
        file: &UploadedFile,
        _options: &UploadOptions,
    ) -> MediaResult<StoredAttachment> {
        Err(MediaError::UploadFailed(file.filename.clone()))
    }
}

struct Harness {
    service: AppointmentService,
    users: Arc<InMemoryUserRepository>,
    store: Arc<InMemoryAppointmentStore>,
    attachments: Arc<InMemoryAttachmentStore>,
    notifications: mpsc::UnboundedReceiver<Notification>,
    published: Arc<Mutex<Vec<(String, usize)>>>,
}

impl Harness {
    fn new() -> Self {
        Self::with_attachments(None)
    }

    fn with_attachments(attachments: Option<Arc<dyn AttachmentStore>>) -> Self {
        let users = Arc::new(InMemoryUserRepository::new());
        let store = Arc::new(InMemoryAppointmentStore::new());
        let memory_attachments = Arc::new(InMemoryAttachmentStore::new());
        let attachments: Arc<dyn AttachmentStore> =
            attachments.unwrap_or_else(|| memory_attachments.clone() as Arc<dyn AttachmentStore>);
        let (sent, notifications) = mpsc::unbounded_channel();
        let bus = SubscriptionBus::new(16);
        let published = Arc::new(Mutex::new(Vec::new()));

        let service = AppointmentService::new(
            store.clone(),
            users.clone(),
            attachments,
            Arc::new(RecordingNotifier { sent }),
            bus.clone(),
            Arc::new(RecordingPublisher {
                bus,
                published: published.clone(),
            }),
        );

        Self {
            service,
            users,
            store,
            attachments: memory_attachments,
            notifications,
            published,
        }
    }

    async fn register(&self, email: &str, timezone: &str) -> AuthUser {
        let user = self
            .users
            .create(&UserRecord {
                name: "Test User".to_string(),
                email: email.to_string(),
                timezone: timezone.to_string(),
                password_hash: "not-a-real-hash".to_string(),
            })
            .await
            .unwrap()
            .unwrap();

        AuthUser {
            id: user.id,
            email: user.email,
        }
    }

    async fn next_notification(&mut self) -> Notification {
        timeout(Duration::from_secs(2), self.notifications.recv())
            .await
            .expect("notification not sent in time")
            .expect("notifier channel closed")
    }

    /// Wait for pending notifications and forget recorded publishes
    async fn settle(&mut self) {
        tokio::time::sleep(Duration::from_millis(50)).await;
        while self.notifications.try_recv().is_ok() {}
        self.published.lock().unwrap().clear();
    }

    fn published(&self) -> Vec<(String, usize)> {
        self.published.lock().unwrap().clone()
    }

    async fn stored_count(&self) -> usize {
        let mut ids = Vec::new();
        for user in ["owner@x.com", "a@x.com", "b@x.com", "tokyo@x.com"] {
            for appointment in self.store.find_by_participant(user).await.unwrap() {
                if !ids.contains(&appointment.id) {
                    ids.push(appointment.id);
                }
            }
        }
        ids.len()
    }
}

fn meeting(participants: &[&str]) -> NewAppointment {
    NewAppointment {
        title: "Quarterly review".to_string(),
        description: Some("Bring the numbers".to_string()),
        date: "2030-01-01".to_string(),
        time: "09:00".to_string(),
        participants: participants.iter().map(|p| p.to_string()).collect(),
    }
}

#[tokio::test]
async fn create_adds_owner_and_renders_per_viewer() {
    let mut h = Harness::new();
    let owner = h.register("owner@x.com", "America/New_York").await;
    h.register("tokyo@x.com", "Asia/Tokyo").await;

    let created = h
        .service
        .create(&owner, meeting(&["Tokyo@X.com"]), None)
        .await
        .unwrap();

    assert_eq!(created.status, AppointmentStatus::Scheduled);
    assert_eq!(created.owner, owner.id);
    assert_eq!(created.participants, vec!["tokyo@x.com", "owner@x.com"]);
    assert_eq!(created.date, "2030-01-01");
    assert_eq!(created.time, "09:00 AM");

    let tokyo_view = h.service.list_for("tokyo@x.com").await.unwrap();
    assert_eq!(tokyo_view.len(), 1);
    assert_eq!(tokyo_view[0].date, "2030-01-01");
    assert_eq!(tokyo_view[0].time, "11:00 PM");

    let notification = h.next_notification().await;
    assert_eq!(notification.subject, "New Appointment Created");
    assert_eq!(notification.recipients, vec!["tokyo@x.com", "owner@x.com"]);

    let published = h.published();
    assert_eq!(
        published,
        vec![("tokyo@x.com".to_string(), 1), ("owner@x.com".to_string(), 1)]
    );
}

#[tokio::test]
async fn past_date_is_rejected_without_side_effects() {
    let mut h = Harness::new();
    let owner = h.register("owner@x.com", "UTC").await;

    let mut input = meeting(&["a@x.com"]);
    input.date = "2020-06-01".to_string();

    let result = h.service.create(&owner, input, None).await;
    assert!(matches!(result, Err(ApiError::PastDate)));
    assert_eq!(h.stored_count().await, 0);
    assert!(h.published().is_empty());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.notifications.try_recv().is_err());
}

#[tokio::test]
async fn past_is_judged_in_owner_timezone() {
    let h = Harness::new();
    let owner = h.register("owner@x.com", "Pacific/Kiritimati").await;

    // An hour ago on a UTC+14 wall clock; read as UTC it would be 13 hours ahead
    let kiritimati_now = Utc::now().with_timezone(&chrono_tz::Pacific::Kiritimati);
    let an_hour_ago = kiritimati_now - ChronoDuration::hours(1);
    let mut input = meeting(&["a@x.com"]);
    input.date = an_hour_ago.format("%Y-%m-%d").to_string();
    input.time = an_hour_ago.format("%H:%M").to_string();

    let result = h.service.create(&owner, input, None).await;
    assert!(matches!(result, Err(ApiError::PastDate)));
}

#[tokio::test]
async fn empty_participant_list_is_rejected() {
    let h = Harness::new();
    let owner = h.register("owner@x.com", "UTC").await;

    let result = h.service.create(&owner, meeting(&[]), None).await;
    assert!(matches!(result, Err(ApiError::Validation(_))));
    assert_eq!(h.stored_count().await, 0);
}

#[tokio::test]
async fn invalid_inputs_are_validation_errors() {
    let h = Harness::new();
    let owner = h.register("owner@x.com", "UTC").await;

    let mut short_title = meeting(&["a@x.com"]);
    short_title.title = "Hi".to_string();
    assert!(matches!(
        h.service.create(&owner, short_title, None).await,
        Err(ApiError::Validation(_))
    ));

    let mut twelve_hour = meeting(&["a@x.com"]);
    twelve_hour.time = "9:00 AM".to_string();
    assert!(matches!(
        h.service.create(&owner, twelve_hour, None).await,
        Err(ApiError::Validation(_))
    ));

    let mut bad_email = meeting(&["not-an-email"]);
    bad_email.title = "Kickoff".to_string();
    assert!(matches!(
        h.service.create(&owner, bad_email, None).await,
        Err(ApiError::Validation(_))
    ));

    assert_eq!(h.stored_count().await, 0);
}

#[tokio::test]
async fn cancel_twice_fails_the_second_time() {
    let mut h = Harness::new();
    let owner = h.register("owner@x.com", "UTC").await;
    let created = h.service.create(&owner, meeting(&["a@x.com"]), None).await.unwrap();
    h.settle().await;

    let canceled = h.service.cancel(&owner, created.id).await.unwrap();
    assert_eq!(canceled.status, AppointmentStatus::Canceled);
    assert_eq!(h.next_notification().await.subject, "Appointment Canceled");

    let again = h.service.cancel(&owner, created.id).await;
    assert!(matches!(again, Err(ApiError::AlreadyCanceled)));

    let update = h
        .service
        .update(
            &owner,
            created.id,
            AppointmentPatch {
                title: Some("Revived".to_string()),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(update, Err(ApiError::AlreadyCanceled)));

    let reschedule = h
        .service
        .reschedule(
            &owner,
            created.id,
            RescheduleRequest {
                date: "2031-01-01".to_string(),
                time: "10:00".to_string(),
            },
        )
        .await;
    assert!(matches!(reschedule, Err(ApiError::AlreadyCanceled)));

    // Delete is still allowed
    assert!(h.service.delete(&owner, created.id).await.is_ok());
}

#[tokio::test]
async fn non_owner_cannot_mutate() {
    let h = Harness::new();
    let owner = h.register("owner@x.com", "UTC").await;
    let participant = h.register("a@x.com", "UTC").await;
    let created = h.service.create(&owner, meeting(&["a@x.com"]), None).await.unwrap();
    let before = h.store.find_by_id(created.id).await.unwrap().unwrap();

    let update = h
        .service
        .update(
            &participant,
            created.id,
            AppointmentPatch {
                title: Some("Hijacked".to_string()),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(update, Err(ApiError::Unauthorized)));

    let reschedule = h
        .service
        .reschedule(
            &participant,
            created.id,
            RescheduleRequest {
                date: "2031-01-01".to_string(),
                time: "10:00".to_string(),
            },
        )
        .await;
    assert!(matches!(reschedule, Err(ApiError::Unauthorized)));

    assert!(matches!(
        h.service.cancel(&participant, created.id).await,
        Err(ApiError::Unauthorized)
    ));
    assert!(matches!(
        h.service.delete(&participant, created.id).await,
        Err(ApiError::Unauthorized)
    ));

    let after = h.store.find_by_id(created.id).await.unwrap().unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn missing_appointment_is_not_found() {
    let h = Harness::new();
    let owner = h.register("owner@x.com", "UTC").await;
    let id = Uuid::new_v4();

    assert!(matches!(
        h.service.cancel(&owner, id).await,
        Err(ApiError::NotFound(_))
    ));
    assert!(matches!(
        h.service.delete(&owner, id).await,
        Err(ApiError::NotFound(_))
    ));
    assert!(h.service.get_appointment(&owner, id).await.unwrap().is_none());
}

#[tokio::test]
async fn delete_notifies_once_and_publishes_per_participant() {
    let mut h = Harness::new();
    let owner = h.register("a@x.com", "UTC").await;
    let created = h
        .service
        .create(&owner, meeting(&["a@x.com", "b@x.com"]), None)
        .await
        .unwrap();
    h.settle().await;

    let response = h.service.delete(&owner, created.id).await.unwrap();
    assert_eq!(response.message, "Appointment successfully deleted.");

    let notification = h.next_notification().await;
    assert_eq!(notification.subject, "Appointment Deleted");
    assert_eq!(notification.recipients, vec!["a@x.com", "b@x.com"]);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.notifications.try_recv().is_err());

    assert_eq!(
        h.published(),
        vec![("a@x.com".to_string(), 0), ("b@x.com".to_string(), 0)]
    );
    assert!(h.store.find_by_id(created.id).await.unwrap().is_none());
}

#[tokio::test]
async fn update_merges_partial_schedule_and_keeps_owner() {
    let mut h = Harness::new();
    let owner = h.register("owner@x.com", "Europe/Berlin").await;
    let created = h
        .service
        .create(&owner, meeting(&["a@x.com", "b@x.com"]), None)
        .await
        .unwrap();
    h.settle().await;

    let updated = h
        .service
        .update(
            &owner,
            created.id,
            AppointmentPatch {
                time: Some("14:30".to_string()),
                participants: Some(vec!["a@x.com".to_string()]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.status, AppointmentStatus::Updated);
    assert_eq!(updated.date, "2030-01-01");
    assert_eq!(updated.time, "02:30 PM");
    assert_eq!(updated.title, "Quarterly review");
    assert_eq!(updated.participants, vec!["a@x.com", "owner@x.com"]);

    let notification = h.next_notification().await;
    assert_eq!(notification.subject, "Appointment Updated");

    // The removed participant still receives their refreshed, now empty, list
    let published = h.published();
    assert_eq!(published.len(), 3);
    assert!(published.contains(&("b@x.com".to_string(), 0)));
    assert!(published.contains(&("a@x.com".to_string(), 1)));
    assert!(published.contains(&("owner@x.com".to_string(), 1)));
}

#[tokio::test]
async fn update_into_the_past_is_rejected() {
    let h = Harness::new();
    let owner = h.register("owner@x.com", "UTC").await;
    let created = h.service.create(&owner, meeting(&["a@x.com"]), None).await.unwrap();

    let result = h
        .service
        .update(
            &owner,
            created.id,
            AppointmentPatch {
                date: Some("2001-01-01".to_string()),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(result, Err(ApiError::PastDate)));

    let stored = h.store.find_by_id(created.id).await.unwrap().unwrap();
    assert_eq!(stored.status, AppointmentStatus::Scheduled);
}

#[tokio::test]
async fn reschedule_moves_the_appointment() {
    let mut h = Harness::new();
    let owner = h.register("owner@x.com", "Asia/Tokyo").await;
    let created = h.service.create(&owner, meeting(&["a@x.com"]), None).await.unwrap();
    h.settle().await;

    let rescheduled = h
        .service
        .reschedule(
            &owner,
            created.id,
            RescheduleRequest {
                date: "2030-02-15".to_string(),
                time: "18:45".to_string(),
            },
        )
        .await
        .unwrap();

    assert_eq!(rescheduled.status, AppointmentStatus::Rescheduled);
    assert_eq!(rescheduled.date, "2030-02-15");
    assert_eq!(rescheduled.time, "06:45 PM");
    assert_eq!(h.next_notification().await.subject, "Appointment Rescheduled");

    // a@x.com has no account and sees UTC
    let utc_view = h.service.list_for("a@x.com").await.unwrap();
    assert_eq!(utc_view[0].date, "2030-02-15");
    assert_eq!(utc_view[0].time, "09:45 AM");
}

#[tokio::test]
async fn get_appointment_requires_participation() {
    let h = Harness::new();
    let owner = h.register("owner@x.com", "UTC").await;
    let participant = h.register("a@x.com", "Asia/Tokyo").await;
    let outsider = h.register("b@x.com", "UTC").await;
    let created = h.service.create(&owner, meeting(&["a@x.com"]), None).await.unwrap();

    let seen = h
        .service
        .get_appointment(&participant, created.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(seen.time, "06:00 PM");

    assert!(matches!(
        h.service.get_appointment(&outsider, created.id).await,
        Err(ApiError::Unauthorized)
    ));
}

#[tokio::test]
async fn malformed_stored_time_only_affects_its_record() {
    let h = Harness::new();
    let owner = h.register("owner@x.com", "UTC").await;
    h.service.create(&owner, meeting(&["a@x.com"]), None).await.unwrap();

    let now = Utc::now();
    h.store
        .save(&Appointment {
            id: Uuid::new_v4(),
            title: "Imported".to_string(),
            description: None,
            starts_at: now + ChronoDuration::days(3650),
            local_time: "nine-ish".to_string(),
            participants: vec!["owner@x.com".to_string()],
            owner: owner.id,
            status: AppointmentStatus::Scheduled,
            attachment: None,
            content_preview: None,
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();

    let list = h.service.list_for("owner@x.com").await.unwrap();
    assert_eq!(list.len(), 2);

    let broken: Vec<_> = list.iter().filter(|a| a.title == "Imported").collect();
    assert_eq!(broken[0].date, "Invalid date");
    assert_eq!(broken[0].time, "Invalid time");

    let fine: Vec<_> = list.iter().filter(|a| a.title == "Quarterly review").collect();
    assert_eq!(fine[0].time, "09:00 AM");
}

#[tokio::test]
async fn subscription_starts_with_snapshot_then_follows_changes() {
    let h = Harness::new();
    let owner = h.register("owner@x.com", "UTC").await;
    h.service.create(&owner, meeting(&["a@x.com"]), None).await.unwrap();

    let mut feed = h.service.subscribe(&owner, "Owner@X.com").await.unwrap();
    let snapshot = feed.next().await.unwrap();
    assert_eq!(snapshot.len(), 1);

    let mut second = meeting(&["a@x.com"]);
    second.title = "Retrospective".to_string();
    second.date = "2030-01-02".to_string();
    h.service.create(&owner, second, None).await.unwrap();

    let update = timeout(Duration::from_secs(2), feed.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(update.len(), 2);
    assert_eq!(update[1].title, "Retrospective");

    let mut pending = tokio_test::task::spawn(feed);
    tokio_test::assert_pending!(pending.poll_next());
}

#[tokio::test]
async fn cannot_subscribe_to_someone_else() {
    let h = Harness::new();
    let owner = h.register("owner@x.com", "UTC").await;

    let result = h.service.subscribe(&owner, "a@x.com").await;
    assert!(matches!(result, Err(ApiError::Unauthorized)));
}

#[tokio::test]
async fn text_attachment_is_stored_with_preview() {
    let h = Harness::new();
    let owner = h.register("owner@x.com", "UTC").await;
    let notes = "Agenda\n".repeat(300);

    let created = h
        .service
        .create(
            &owner,
            meeting(&["a@x.com"]),
            Some(UploadedFile {
                filename: "Agenda.TXT".to_string(),
                content_type: Some("text/plain".to_string()),
                bytes: notes.clone().into_bytes(),
            }),
        )
        .await
        .unwrap();

    let attachment = created.attachment.unwrap();
    assert_eq!(attachment.filename, "Agenda.TXT");
    assert_eq!(
        h.attachments.get(&attachment.url).await.unwrap(),
        notes.as_bytes()
    );

    let preview = created.content_preview.unwrap();
    assert_eq!(preview.chars().count(), 1024);
    assert!(notes.starts_with(&preview));
}

#[tokio::test]
async fn unsupported_attachment_persists_nothing() {
    let h = Harness::new();
    let owner = h.register("owner@x.com", "UTC").await;

    let result = h
        .service
        .create(
            &owner,
            meeting(&["a@x.com"]),
            Some(UploadedFile {
                filename: "photo.png".to_string(),
                content_type: Some("image/png".to_string()),
                bytes: vec![0x89, 0x50, 0x4e, 0x47],
            }),
        )
        .await;

    assert!(matches!(result, Err(ApiError::UnsupportedFileType(_))));
    assert_eq!(h.stored_count().await, 0);
    assert_eq!(h.attachments.object_count().await, 0);
}

#[tokio::test]
async fn failed_upload_persists_nothing() {
    let h = Harness::with_attachments(Some(Arc::new(BrokenAttachmentStore)));
    let owner = h.register("owner@x.com", "UTC").await;

    let result = h
        .service
        .create(
            &owner,
            meeting(&["a@x.com"]),
            Some(UploadedFile {
                filename: "minutes.pdf".to_string(),
                content_type: None,
                bytes: b"%PDF-1.7".to_vec(),
            }),
        )
        .await;

    assert!(matches!(result, Err(ApiError::UploadFailed(_))));
    assert_eq!(h.stored_count().await, 0);
    assert!(h.published().is_empty());
}
