//! Account routes

use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, patch, post},
};
use axum_extra::extract::WithRejection;
use tracing::info;
use uuid::Uuid;

use crate::{
    accounts::AccountService,
    error::AuthError,
    jwt::JwtService,
    middleware::{AuthUser, require_auth},
    models::{LoginCredentials, NewUser, UpdateTimezone},
};

/// Create the router for registration, login and profile endpoints
pub fn create_router(accounts: AccountService, jwt_service: JwtService) -> Router {
    let protected_routes = Router::new()
        .route("/users/me", get(current_user))
        .route("/users/:id", get(get_user))
        .route("/users/:id/timezone", patch(update_timezone))
        .route_layer(middleware::from_fn_with_state(jwt_service, require_auth));

    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .merge(protected_routes)
        .with_state(accounts)
}

/// User registration endpoint
pub async fn register(
    State(accounts): State<AccountService>,
    WithRejection(Json(payload), _): WithRejection<Json<NewUser>, AuthError>,
) -> Result<impl IntoResponse, AuthError> {
    info!("Registration attempt for: {}", payload.email);
    let session = accounts.create_user(payload).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// User login endpoint
pub async fn login(
    State(accounts): State<AccountService>,
    WithRejection(Json(payload), _): WithRejection<Json<LoginCredentials>, AuthError>,
) -> Result<impl IntoResponse, AuthError> {
    info!("Login attempt for: {}", payload.email);
    let session = accounts.login(payload).await?;
    Ok(Json(session))
}

/// Profile of the authenticated caller
pub async fn current_user(
    State(accounts): State<AccountService>,
    Extension(caller): Extension<AuthUser>,
) -> Result<impl IntoResponse, AuthError> {
    let user = accounts.get_user(caller.id).await?;
    Ok(Json(user))
}

/// Get a user by ID
pub async fn get_user(
    State(accounts): State<AccountService>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AuthError> {
    let user = accounts.get_user(id).await?;
    Ok(Json(user))
}

/// Change the caller's timezone
pub async fn update_timezone(
    State(accounts): State<AccountService>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    WithRejection(Json(payload), _): WithRejection<Json<UpdateTimezone>, AuthError>,
) -> Result<impl IntoResponse, AuthError> {
    let user = accounts
        .update_user_timezone(&caller, id, &payload.timezone)
        .await?;
    Ok(Json(user))
}
