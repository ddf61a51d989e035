//! Client-side, field-level validation. A failed check blocks submission;
//! nothing here reaches the network.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::error::ApiError;
use crate::task::Priority;

static NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z]+$").expect("static pattern"));
static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("static pattern")
});
static DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("static pattern"));

fn fail(message: &str) -> ApiError {
    ApiError::Validation(message.to_string())
}

pub fn name(field: &str, value: &str) -> Result<(), ApiError> {
    if value.is_empty() {
        return Err(fail(&format!("{field} is required")));
    }
    if !NAME.is_match(value) {
        return Err(fail(&format!("{field} must contain only letters")));
    }
    Ok(())
}

pub fn email(value: &str) -> Result<(), ApiError> {
    if value.is_empty() {
        return Err(fail("Email is required"));
    }
    if !EMAIL.is_match(value) {
        return Err(fail("Invalid email format"));
    }
    Ok(())
}

pub fn password(value: &str) -> Result<(), ApiError> {
    if value.is_empty() {
        return Err(fail("Password is required"));
    }
    if value.chars().count() < 6 {
        return Err(fail("Password must be at least 6 characters"));
    }
    let has_letter = value.chars().any(|c| c.is_ascii_alphabetic());
    let has_digit = value.chars().any(|c| c.is_ascii_digit());
    let has_special = value.chars().any(|c| !c.is_ascii_alphanumeric());
    if !(has_letter && has_digit && has_special) {
        return Err(fail(
            "Password must contain at least one letter, one number, and one special character",
        ));
    }
    Ok(())
}

pub fn title(value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(fail("Title is required"));
    }
    Ok(())
}

pub fn due_date(value: &str) -> Result<NaiveDate, ApiError> {
    if value.is_empty() {
        return Err(fail("Due date is required"));
    }
    if !DATE.is_match(value) {
        return Err(fail("Date must be in YYYY-MM-DD format"));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| fail(&format!("{value} is not a valid date")))
}

pub fn priority(value: &str) -> Result<Priority, ApiError> {
    value
        .parse::<Priority>()
        .map_err(|err| fail(&err.to_string()))
}
