//! Per-row validation and normalization
//!
//! Checks run in a fixed order: presence, email format, length bounds,
//! normalization, then the denylist. The first failing check decides the rejection.

use csv::StringRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use super::{ColumnMapping, Field};
use crate::models::Record;

/// Longest accepted email (RFC 5321 forward-path limit plus slack for display forms)
pub const MAX_EMAIL_LEN: usize = 320;
pub const MAX_NAME_LEN: usize = 255;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$",
    )
    .expect("email pattern is a valid regex")
});

// Values are bound as parameters, but one bad row must never reach the batched
// statement it would be folded into.
static DENYLIST_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(;|--|/\*|\*/|\bxp_|\b(?:select|insert|update|delete|drop|alter|truncate|union|exec|execute)\b)",
    )
    .expect("denylist pattern is a valid regex")
});

/// Why a field was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationReason {
    #[error("missing")]
    Missing,
    #[error("not a valid email address")]
    InvalidFormat,
    #[error("longer than {max} characters")]
    TooLong { max: usize },
    #[error("contains disallowed SQL content")]
    Unsafe,
}

/// Row rejection: the offending field and why
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    pub field: Field,
    pub reason: ValidationReason,
}

impl ValidationError {
    fn new(field: Field, reason: ValidationReason) -> Self {
        Self { field, reason }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn check_length(field: Field, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.chars().count() > max {
        return Err(ValidationError::new(field, ValidationReason::TooLong { max }));
    }
    Ok(())
}

fn check_denylist(field: Field, value: &str) -> Result<(), ValidationError> {
    if DENYLIST_RE.is_match(value) {
        return Err(ValidationError::new(field, ValidationReason::Unsafe));
    }
    Ok(())
}

/// Turn one raw row into a [`Record`] or say why not
pub fn validate_row(row: &StringRecord, mapping: &ColumnMapping) -> Result<Record, ValidationError> {
    let email = non_empty(row.get(mapping.email.index))
        .ok_or_else(|| ValidationError::new(Field::Email, ValidationReason::Missing))?;
    let first_name = non_empty(row.get(mapping.first_name.index))
        .ok_or_else(|| ValidationError::new(Field::FirstName, ValidationReason::Missing))?;
    let last_name = mapping
        .last_name
        .as_ref()
        .and_then(|column| non_empty(row.get(column.index)));

    if !EMAIL_RE.is_match(email) {
        return Err(ValidationError::new(Field::Email, ValidationReason::InvalidFormat));
    }

    check_length(Field::Email, email, MAX_EMAIL_LEN)?;
    check_length(Field::FirstName, first_name, MAX_NAME_LEN)?;
    if let Some(last_name) = last_name {
        check_length(Field::LastName, last_name, MAX_NAME_LEN)?;
    }

    let email = email.to_lowercase();

    check_denylist(Field::Email, &email)?;
    check_denylist(Field::FirstName, first_name)?;
    if let Some(last_name) = last_name {
        check_denylist(Field::LastName, last_name)?;
    }

    Ok(Record::new(
        email,
        first_name,
        last_name.map(str::to_string),
    ))
}
