//! Input validation for appointment payloads

use auth::validation::{normalize_email, validate_email};
use regex::Regex;
use std::sync::OnceLock;

/// Validate appointment title
pub fn validate_title(title: &str) -> Result<(), String> {
    let title = title.trim();

    if title.is_empty() {
        return Err("Title is required".to_string());
    }

    if title.chars().count() < 3 {
        return Err("Title must be at least 3 characters".to_string());
    }

    Ok(())
}

/// Validate a `YYYY-MM-DD` date string
pub fn validate_date(date: &str) -> Result<(), String> {
    static DATE_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = DATE_REGEX.get_or_init(|| {
        Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("Failed to compile date regex")
    });

    if !regex.is_match(date) {
        return Err(format!("Date must use the YYYY-MM-DD format: {}", date));
    }

    Ok(())
}

/// Validate a 24-hour `HH:mm` time string
pub fn validate_time(time: &str) -> Result<(), String> {
    static TIME_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = TIME_REGEX.get_or_init(|| {
        Regex::new(r"^([01]\d|2[0-3]):[0-5]\d$").expect("Failed to compile time regex")
    });

    if !regex.is_match(time) {
        return Err(format!("Time must use the 24-hour HH:mm format: {}", time));
    }

    Ok(())
}

/// Build the stored participant list
///
/// The submitted list must not be empty. Addresses are normalized and
/// de-duplicated keeping first occurrences, the owner is appended when
/// missing, and every resulting address must be valid.
pub fn normalize_participants(submitted: &[String], owner_email: &str) -> Result<Vec<String>, String> {
    if submitted.is_empty() {
        return Err("At least one participant is required".to_string());
    }

    let mut participants: Vec<String> = Vec::with_capacity(submitted.len() + 1);
    for email in submitted.iter().map(|e| normalize_email(e)) {
        if !participants.contains(&email) {
            participants.push(email);
        }
    }

    let owner_email = normalize_email(owner_email);
    if !participants.contains(&owner_email) {
        participants.push(owner_email);
    }

    for email in &participants {
        validate_email(email)?;
    }

    Ok(participants)
}
