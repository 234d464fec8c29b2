//! Repositories for account persistence

pub mod user;

pub use user::{InMemoryUserRepository, PgUserRepository, UserDirectory};
