//! API service routes

use std::{convert::Infallible, time::Duration};

use auth::{AuthUser, require_auth};
use axum::{
    Extension, Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State, multipart::Field},
    http::StatusCode,
    middleware,
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use axum_extra::extract::WithRejection;
use futures::StreamExt;
use media::UploadedFile;
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::{
    error::ApiError,
    models::{AppointmentPatch, NewAppointment, RescheduleRequest},
    state::AppState,
};

/// SSE event name carrying a participant's appointment list
pub const FEED_EVENT: &str = "appointments";

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Create the router for the API service
pub fn create_router(state: AppState) -> Router {
    let account_routes =
        auth::routes::create_router(state.accounts.clone(), state.jwt_service.clone());

    let appointment_routes = Router::new()
        .route(
            "/appointments",
            get(list_appointments).post(create_appointment),
        )
        .route(
            "/appointments/upload",
            post(upload_appointment).layer(DefaultBodyLimit::max(state.max_upload_bytes)),
        )
        .route("/appointments/stream", get(stream_appointments))
        .route(
            "/appointments/:id",
            get(get_appointment)
                .patch(update_appointment)
                .delete(delete_appointment),
        )
        .route("/appointments/:id/reschedule", post(reschedule_appointment))
        .route("/appointments/:id/cancel", post(cancel_appointment))
        .route_layer(middleware::from_fn_with_state(
            state.jwt_service.clone(),
            require_auth,
        ));

    Router::new()
        .route("/health", get(health_check))
        .merge(appointment_routes)
        .with_state(state)
        .merge(account_routes)
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let (status, store) = match &state.db_pool {
        Some(pool) => match common::database::health_check(pool).await {
            Ok(true) => (StatusCode::OK, "ok"),
            _ => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
        },
        None => (StatusCode::OK, "memory"),
    };

    (
        status,
        Json(json!({
            "status": if status == StatusCode::OK { "ok" } else { "degraded" },
            "service": "appointments-api",
            "store": store,
        })),
    )
}

/// The caller's appointments in their own timezone
pub async fn list_appointments(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let appointments = state.appointments.get_appointments(&caller).await?;
    Ok(Json(appointments))
}

/// A single appointment, `null` when it does not exist
pub async fn get_appointment(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let appointment = state.appointments.get_appointment(&caller, id).await?;
    Ok(Json(appointment))
}

pub async fn create_appointment(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    WithRejection(Json(payload), _): WithRejection<Json<NewAppointment>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let appointment = state.appointments.create(&caller, payload, None).await?;
    Ok((StatusCode::CREATED, Json(appointment)))
}

/// Create an appointment from a multipart form with an optional `file` part
pub async fn upload_appointment(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let (payload, file) = read_appointment_form(multipart).await?;
    info!(
        "Multipart appointment from {} (attachment: {})",
        caller.email,
        file.is_some()
    );

    let appointment = state.appointments.create(&caller, payload, file).await?;
    Ok((StatusCode::CREATED, Json(appointment)))
}

pub async fn update_appointment(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    WithRejection(Json(patch), _): WithRejection<Json<AppointmentPatch>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let appointment = state.appointments.update(&caller, id, patch).await?;
    Ok(Json(appointment))
}

pub async fn reschedule_appointment(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    WithRejection(Json(request), _): WithRejection<Json<RescheduleRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let appointment = state.appointments.reschedule(&caller, id, request).await?;
    Ok(Json(appointment))
}

pub async fn cancel_appointment(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let appointment = state.appointments.cancel(&caller, id).await?;
    Ok(Json(appointment))
}

pub async fn delete_appointment(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let response = state.appointments.delete(&caller, id).await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    #[serde(rename = "userEmail")]
    pub user_email: Option<String>,
}

/// Server-sent events: the current list, then one event per change
pub async fn stream_appointments(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    Query(query): Query<StreamQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let email = query.user_email.unwrap_or_else(|| caller.email.clone());
    let feed = state.appointments.subscribe(&caller, &email).await?;

    let events = feed.map(|list| {
        let event = Event::default()
            .event(FEED_EVENT)
            .json_data(list.as_ref())
            .unwrap_or_else(|_| Event::default().event(FEED_EVENT).data("serialization_error"));
        Ok::<_, Infallible>(event)
    });

    Ok(Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(KEEPALIVE_INTERVAL)
            .text("keepalive"),
    ))
}

fn multipart_error(e: impl std::fmt::Display) -> ApiError {
    ApiError::Validation(format!("Invalid multipart body: {}", e))
}

async fn field_text(field: Field<'_>) -> Result<String, ApiError> {
    field.text().await.map_err(multipart_error)
}

/// Participants sent as a JSON array, a comma-separated list or repeated fields
fn parse_participants(raw: &str) -> Result<Vec<String>, ApiError> {
    let raw = raw.trim();
    if raw.starts_with('[') {
        return serde_json::from_str(raw)
            .map_err(|_| ApiError::Validation("Participants must be a list of emails".to_string()));
    }

    Ok(raw
        .split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_string)
        .collect())
}

async fn read_appointment_form(
    mut multipart: Multipart,
) -> Result<(NewAppointment, Option<UploadedFile>), ApiError> {
    let mut title = None;
    let mut description = None;
    let mut date = None;
    let mut time = None;
    let mut participants = Vec::new();
    let mut file = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "title" => title = Some(field_text(field).await?),
            "description" => description = Some(field_text(field).await?),
            "date" => date = Some(field_text(field).await?),
            "time" => time = Some(field_text(field).await?),
            "participants" | "participants[]" => {
                participants.extend(parse_participants(&field_text(field).await?)?)
            }
            "file" => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| ApiError::Validation("File name is required".to_string()))?;
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(multipart_error)?;
                file = Some(UploadedFile {
                    filename,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            _ => {}
        }
    }

    let required = |value: Option<String>, field: &str| {
        value.ok_or_else(|| ApiError::Validation(format!("{} is required", field)))
    };

    let payload = NewAppointment {
        title: required(title, "Title")?,
        description,
        date: required(date, "Date")?,
        time: required(time, "Time")?,
        participants,
    };

    Ok((payload, file))
}
