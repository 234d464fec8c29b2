//! Common library for the appointment service
//!
//! This crate provides shared infrastructure used across the workspace:
//! PostgreSQL connectivity, the Redis broker used to relay appointment
//! updates between instances, and the associated error types.
//!
//! ```rust,no_run
//! use common::database::{DatabaseConfig, init_pool, health_check};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DatabaseConfig::from_env()?;
//!     let pool = init_pool(&config).await?;
//!     let is_healthy = health_check(&pool).await?;
//!     println!("Database health check: {}", is_healthy);
//!     Ok(())
//! }
//! ```

pub mod broker;
pub mod database;
pub mod error;
