//! User model and related functionality

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Timezone assigned to accounts that do not choose one
pub const DEFAULT_TIMEZONE: &str = "UTC";

/// User entity
///
/// The password hash is never serialized into responses.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub timezone: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Registration payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub timezone: Option<String>,
    pub password: String,
}

/// Validated account ready to be persisted
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub name: String,
    pub email: String,
    pub timezone: String,
    pub password_hash: String,
}

/// User login credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginCredentials {
    pub email: String,
    pub password: String,
}

/// Timezone update payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateTimezone {
    pub timezone: String,
}

/// A user together with a freshly issued bearer token
#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    pub user: User,
    pub token: String,
    pub token_type: String,
    pub expires_in: u64,
}
