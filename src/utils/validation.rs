use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use validator::ValidationError;

use crate::error::{Error, Result};

/// `end` must be strictly after `start`.
pub fn ensure_window(start: DateTime<Utc>, end: DateTime<Utc>, what: &str) -> Result<()> {
    if end <= start {
        return Err(Error::BadRequest(format!(
            "{} end ({}) must be after its start ({})",
            what, end, start
        )));
    }
    Ok(())
}

/// A schedule must run inside its exam's window.
pub fn ensure_schedule_within_exam(
    exam_start: DateTime<Utc>,
    exam_end: DateTime<Utc>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<()> {
    if start < exam_start || end > exam_end {
        return Err(Error::BadRequest(format!(
            "schedule window {} - {} must lie within the exam window {} - {}",
            start, end, exam_start, exam_end
        )));
    }
    Ok(())
}

pub fn ensure_deadline_before_start(
    deadline: Option<DateTime<Utc>>,
    start: DateTime<Utc>,
) -> Result<()> {
    match deadline {
        Some(d) if d >= start => Err(Error::BadRequest(format!(
            "registration deadline ({}) must precede the start ({})",
            d, start
        ))),
        _ => Ok(()),
    }
}

pub fn ensure_max_attempts(max_attempts: i32) -> Result<()> {
    if max_attempts < 1 {
        return Err(Error::BadRequest("max_attempts must be at least 1".into()));
    }
    Ok(())
}

/// Field validator for `#[validate(custom(function = ...))]` on weights.
pub fn percentage(value: &Decimal) -> std::result::Result<(), ValidationError> {
    if *value < Decimal::ZERO || *value > Decimal::ONE_HUNDRED {
        return Err(ValidationError::new("percentage_out_of_range"));
    }
    Ok(())
}

pub fn non_negative(value: &Decimal) -> std::result::Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ValidationError::new("negative_value"));
    }
    Ok(())
}
