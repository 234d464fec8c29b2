//! Application state shared across handlers

use auth::{AccountService, JwtService};
use sqlx::PgPool;

use crate::lifecycle::AppointmentService;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Present when records live in PostgreSQL
    pub db_pool: Option<PgPool>,
    pub accounts: AccountService,
    pub appointments: AppointmentService,
    pub jwt_service: JwtService,
    pub max_upload_bytes: usize,
}
