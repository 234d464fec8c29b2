//! Appointment scheduling API
//!
//! Authenticated users create, edit, reschedule, cancel and delete
//! appointments shared with a set of participant emails. Every viewer sees
//! dates and times in their own timezone, and every change pushes the
//! affected participants' refreshed lists to their live feeds.

pub mod config;
pub mod error;
pub mod fanout;
pub mod lifecycle;
pub mod models;
pub mod notifier;
pub mod repositories;
pub mod routes;
pub mod state;
pub mod time;
pub mod validation;

pub use error::{ApiError, ApiResult};
pub use lifecycle::AppointmentService;
pub use state::AppState;
