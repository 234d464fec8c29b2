//! Data models for the API service

pub mod appointment;

pub use appointment::{
    Appointment, AppointmentPatch, AppointmentStatus, AppointmentView, DeleteResponse,
    NewAppointment, RescheduleRequest,
};
