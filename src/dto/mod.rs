pub mod attempt_dto;
pub mod exam_dto;
pub mod grading_dto;
pub mod question_dto;

use serde::{Deserialize, Serialize};

/// Result of a delete request that may fall back to a soft delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeleteOutcome {
    Deleted,
    Deactivated { reason: String },
    Cancelled { reason: String },
}

pub const REFERENTIAL_INTEGRITY_VIOLATION: &str = "referential_integrity_violation";
pub const ATTEMPTS_EXIST: &str = "attempts_exist";

// Trims strings and turns empty ones into None
pub(crate) fn trim_optional_string<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }))
}
