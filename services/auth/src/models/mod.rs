//! Account models

pub mod user;

pub use user::{
    AuthSession, DEFAULT_TIMEZONE, LoginCredentials, NewUser, UpdateTimezone, User, UserRecord,
};
