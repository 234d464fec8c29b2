//! Repositories for appointment persistence

pub mod appointment;

pub use appointment::{AppointmentStore, InMemoryAppointmentStore, PgAppointmentStore};
