//! Account management: registration, login and profile updates

use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    error::{AuthError, AuthResult},
    jwt::JwtService,
    middleware::AuthUser,
    models::{AuthSession, DEFAULT_TIMEZONE, LoginCredentials, NewUser, User, UserRecord},
    password::{hash_password_blocking, verify_password_blocking},
    rate_limiter::RateLimiter,
    repositories::UserDirectory,
    validation::{
        normalize_email, validate_email, validate_name, validate_password, validate_timezone,
    },
};

/// Log an infrastructure failure and replace it with the generic error
fn internal(context: &'static str) -> impl FnOnce(anyhow::Error) -> AuthError {
    move |e| {
        error!("{}: {:#}", context, e);
        AuthError::InternalServerError
    }
}

/// Account operations backed by a user directory
#[derive(Clone)]
pub struct AccountService {
    users: Arc<dyn UserDirectory>,
    jwt_service: JwtService,
    rate_limiter: RateLimiter,
}

impl AccountService {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        jwt_service: JwtService,
        rate_limiter: RateLimiter,
    ) -> Self {
        Self {
            users,
            jwt_service,
            rate_limiter,
        }
    }

    /// The directory this service reads and writes
    pub fn directory(&self) -> Arc<dyn UserDirectory> {
        Arc::clone(&self.users)
    }

    /// Register a new account and issue its first session token
    pub async fn create_user(&self, new_user: NewUser) -> AuthResult<AuthSession> {
        let email = normalize_email(&new_user.email);
        let timezone = new_user
            .timezone
            .as_deref()
            .map(str::trim)
            .filter(|tz| !tz.is_empty())
            .unwrap_or(DEFAULT_TIMEZONE)
            .to_string();

        validate_name(&new_user.name).map_err(AuthError::Validation)?;
        validate_email(&email).map_err(AuthError::Validation)?;
        validate_password(&new_user.password).map_err(AuthError::Validation)?;
        validate_timezone(&timezone).map_err(|_| AuthError::InvalidTimezone(timezone.clone()))?;

        if self
            .users
            .find_by_email(&email)
            .await
            .map_err(internal("Failed to look up user"))?
            .is_some()
        {
            return Err(AuthError::DuplicateUser(email));
        }

        let record = UserRecord {
            name: new_user.name.trim().to_string(),
            email: email.clone(),
            timezone,
            password_hash: hash_password_blocking(&new_user.password)
                .await
                .map_err(internal("Failed to hash password"))?,
        };

        let user = self
            .users
            .create(&record)
            .await
            .map_err(internal("Failed to create user"))?
            .ok_or(AuthError::DuplicateUser(email))?;

        info!("Registered user {}", user.id);
        self.issue(user)
    }

    /// Verify credentials and issue a session token
    pub async fn login(&self, credentials: LoginCredentials) -> AuthResult<AuthSession> {
        let email = normalize_email(&credentials.email);

        if !self.rate_limiter.is_allowed(&email).await {
            warn!("Login throttled for {}", email);
            return Err(AuthError::TooManyAttempts);
        }

        let user = self
            .users
            .find_by_email(&email)
            .await
            .map_err(internal("Failed to look up user"))?
            .ok_or_else(|| AuthError::NotFound("User".to_string()))?;

        let verified = verify_password_blocking(&credentials.password, &user.password_hash)
            .await
            .map_err(internal("Failed to verify password"))?;

        if !verified {
            self.rate_limiter.record_failure(&email).await;
            return Err(AuthError::InvalidCredentials);
        }

        self.rate_limiter.reset(&email).await;
        info!("User {} logged in", user.id);
        self.issue(user)
    }

    /// Change the caller's own timezone
    pub async fn update_user_timezone(
        &self,
        caller: &AuthUser,
        id: Uuid,
        timezone: &str,
    ) -> AuthResult<User> {
        if caller.id != id {
            return Err(AuthError::Unauthorized);
        }

        let timezone = timezone.trim();
        validate_timezone(timezone).map_err(|_| AuthError::InvalidTimezone(timezone.to_string()))?;

        self.users
            .update_timezone(id, timezone)
            .await
            .map_err(internal("Failed to update timezone"))?
            .ok_or_else(|| AuthError::NotFound("User".to_string()))
    }

    /// Fetch a user profile by id
    pub async fn get_user(&self, id: Uuid) -> AuthResult<User> {
        self.users
            .find_by_id(id)
            .await
            .map_err(internal("Failed to look up user"))?
            .ok_or_else(|| AuthError::NotFound("User".to_string()))
    }

    fn issue(&self, user: User) -> AuthResult<AuthSession> {
        let token = self
            .jwt_service
            .sign(&user)
            .map_err(internal("Failed to sign token"))?;

        Ok(AuthSession {
            user,
            token,
            token_type: "Bearer".to_string(),
            expires_in: self.jwt_service.token_expiry(),
        })
    }
}
