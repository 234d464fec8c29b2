//! Conversion between owner-entered local schedules and stored instants
//!
//! Appointments are persisted as an absolute UTC instant plus the `HH:mm`
//! clock string the owner typed. Reads project the instant into the
//! viewer's timezone; writes resolve the owner's wall-clock date and time
//! in the owner's timezone.

use chrono::{DateTime, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::validation::{validate_date, validate_time};

/// Display and storage date format
pub const DATE_FORMAT: &str = "%Y-%m-%d";
/// Wall-clock format accepted on input
pub const INPUT_TIME_FORMAT: &str = "%H:%M";
/// Twelve-hour format used for display
pub const DISPLAY_TIME_FORMAT: &str = "%I:%M %p";

pub const INVALID_DATE: &str = "Invalid date";
pub const INVALID_TIME: &str = "Invalid time";

#[derive(Error, Debug, PartialEq)]
pub enum TimeError {
    #[error("{0}")]
    InvalidDate(String),

    #[error("{0}")]
    InvalidTime(String),

    #[error("{date} {time} does not exist in {timezone}")]
    NonexistentLocalTime {
        date: String,
        time: String,
        timezone: String,
    },
}

/// Date and time as shown to one viewer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplaySlot {
    pub date: String,
    pub time: String,
}

impl DisplaySlot {
    pub fn invalid() -> Self {
        Self {
            date: INVALID_DATE.to_string(),
            time: INVALID_TIME.to_string(),
        }
    }

    pub fn is_invalid(&self) -> bool {
        self.date == INVALID_DATE && self.time == INVALID_TIME
    }
}

/// Resolve a stored timezone name, falling back to UTC when it is unknown
pub fn resolve_timezone(name: &str) -> Tz {
    name.parse::<Tz>().unwrap_or_else(|_| {
        warn!("Unknown timezone '{}', rendering in UTC", name);
        Tz::UTC
    })
}

/// Parse a `YYYY-MM-DD` calendar date
pub fn parse_local_date(date: &str) -> Result<NaiveDate, TimeError> {
    validate_date(date).map_err(TimeError::InvalidDate)?;
    NaiveDate::parse_from_str(date, DATE_FORMAT)
        .map_err(|_| TimeError::InvalidDate(format!("Invalid date: {}", date)))
}

/// Parse a 24-hour `HH:mm` clock time
pub fn parse_local_time(time: &str) -> Result<NaiveTime, TimeError> {
    validate_time(time).map_err(TimeError::InvalidTime)?;
    NaiveTime::parse_from_str(time, INPUT_TIME_FORMAT)
        .map_err(|_| TimeError::InvalidTime(format!("Invalid time: {}", time)))
}

/// Instant at which `date` `time` occurs on the wall clock of `timezone`
///
/// Times skipped by a DST transition are rejected. Times repeated by a DST
/// transition resolve to the earlier instant.
pub fn to_stored_instant(date: &str, time: &str, timezone: Tz) -> Result<DateTime<Utc>, TimeError> {
    let local = parse_local_date(date)?.and_time(parse_local_time(time)?);

    match timezone.from_local_datetime(&local) {
        LocalResult::Single(instant) => Ok(instant.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
        LocalResult::None => Err(TimeError::NonexistentLocalTime {
            date: date.to_string(),
            time: time.to_string(),
            timezone: timezone.name().to_string(),
        }),
    }
}

/// Render a stored instant for a viewer
///
/// `stored_time` is the clock string saved with the appointment; when it is
/// not a valid `HH:mm` value the record renders as the invalid sentinel.
pub fn to_display(instant: DateTime<Utc>, stored_time: &str, viewer_timezone: Tz) -> DisplaySlot {
    if parse_local_time(stored_time).is_err() {
        return DisplaySlot::invalid();
    }

    let local = instant.with_timezone(&viewer_timezone);
    DisplaySlot {
        date: local.format(DATE_FORMAT).to_string(),
        time: local.format(DISPLAY_TIME_FORMAT).to_string(),
    }
}

/// The `(YYYY-MM-DD, HH:mm)` pair an instant shows on the wall clock of `timezone`
pub fn local_parts(instant: DateTime<Utc>, timezone: Tz) -> (String, String) {
    let local = instant.with_timezone(&timezone);
    (
        local.format(DATE_FORMAT).to_string(),
        local.format(INPUT_TIME_FORMAT).to_string(),
    )
}
