//! User directory for account lookups and persistence

use std::{collections::HashMap, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::models::{User, UserRecord};

/// Lookup and persistence contract for user accounts
///
/// Emails are expected to be normalized (trimmed, lower-case) by the caller.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Find a user by ID
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;

    /// Find a user by email
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Insert a new account, returning `None` when the email is already taken
    async fn create(&self, record: &UserRecord) -> Result<Option<User>>;

    /// Change a user's timezone, returning `None` when the user does not exist
    async fn update_timezone(&self, id: Uuid, timezone: &str) -> Result<Option<User>>;
}

/// PostgreSQL-backed user directory
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, timezone, password_hash, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, timezone, password_hash, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn create(&self, record: &UserRecord) -> Result<Option<User>> {
        info!("Creating new user: {}", record.email);

        // ON CONFLICT keeps the duplicate check race-free under concurrent sign-ups.
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, name, email, timezone, password_hash)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (email) DO NOTHING
            RETURNING id, name, email, timezone, password_hash, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&record.name)
        .bind(&record.email)
        .bind(&record.timezone)
        .bind(&record.password_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn update_timezone(&self, id: Uuid, timezone: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET timezone = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, email, timezone, password_hash, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(timezone)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }
}

/// In-process user directory used for local development and tests
#[derive(Clone, Default)]
pub struct InMemoryUserRepository {
    users: Arc<RwLock<HashMap<Uuid, User>>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn create(&self, record: &UserRecord) -> Result<Option<User>> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == record.email) {
            return Ok(None);
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: record.name.clone(),
            email: record.email.clone(),
            timezone: record.timezone.clone(),
            password_hash: record.password_hash.clone(),
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());

        Ok(Some(user))
    }

    async fn update_timezone(&self, id: Uuid, timezone: &str) -> Result<Option<User>> {
        let mut users = self.users.write().await;
        Ok(users.get_mut(&id).map(|user| {
            user.timezone = timezone.to_string();
            user.updated_at = Utc::now();
            user.clone()
        }))
    }
}
