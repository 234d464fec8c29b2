//! Account management for the appointment service
//!
//! Registration, login, profile and timezone updates, together with the
//! authentication primitives the rest of the workspace relies on: Argon2
//! password hashing, JWT session credentials and the bearer-token
//! middleware that resolves the caller's identity.

pub mod accounts;
pub mod error;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod password;
pub mod rate_limiter;
pub mod repositories;
pub mod routes;
pub mod validation;

pub use accounts::AccountService;
pub use error::{AuthError, AuthResult};
pub use jwt::{JwtConfig, JwtService};
pub use middleware::{AuthUser, require_auth};
pub use repositories::UserDirectory;
