use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::trim_optional_string;
use crate::models::{
    exam::{ExamSettings, ExamType},
    exam_weight::ExamWeight,
};
use crate::repositories::WeightScope;
use crate::utils::validation::{non_negative, percentage};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateExamPayload {
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    #[serde(default, deserialize_with = "trim_optional_string")]
    pub description: Option<String>,
    pub exam_type: ExamType,
    pub subject_id: Option<Uuid>,
    pub class_id: Option<Uuid>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub registration_deadline: Option<DateTime<Utc>>,
    #[validate(range(min = 1, message = "Duration must be at least 1 minute"))]
    pub duration_minutes: Option<i32>,
    #[serde(default)]
    pub settings: ExamSettings,
    #[validate(range(min = 1, message = "Max attempts must be at least 1"))]
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,
    #[validate(custom(function = "non_negative"))]
    #[serde(default)]
    pub passing_score: Decimal,
}

fn default_max_attempts() -> i32 {
    1
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateExamPayload {
    #[serde(default, deserialize_with = "trim_optional_string")]
    #[validate(length(max = 255))]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "trim_optional_string")]
    pub description: Option<String>,
    pub exam_type: Option<ExamType>,
    pub subject_id: Option<Uuid>,
    pub class_id: Option<Uuid>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub registration_deadline: Option<DateTime<Utc>>,
    #[validate(range(min = 1, message = "Duration must be at least 1 minute"))]
    pub duration_minutes: Option<i32>,
    pub settings: Option<ExamSettings>,
    #[validate(range(min = 1, message = "Max attempts must be at least 1"))]
    pub max_attempts: Option<i32>,
    #[validate(custom(function = "non_negative"))]
    pub passing_score: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateSchedulePayload {
    pub class_id: Uuid,
    pub subject_id: Uuid,
    /// Defaults to the caller.
    pub teacher_id: Option<Uuid>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[validate(custom(function = "non_negative"))]
    pub passing_score: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddExamQuestionPayload {
    pub question_id: Uuid,
    pub order_index: Option<i32>,
    #[validate(range(min = 0, message = "Points override cannot be negative"))]
    pub points_override: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddFromBankPayload {
    pub bank_id: Uuid,
    #[validate(range(min = 1))]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpsertWeightPayload {
    pub subject_id: Uuid,
    pub class_id: Uuid,
    pub exam_type: ExamType,
    #[validate(custom(function = "percentage"))]
    pub weight: Decimal,
    #[validate(length(min = 1, max = 32))]
    pub semester: String,
    #[validate(length(min = 1, max = 32))]
    pub academic_year: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct WeightScopeQuery {
    pub subject_id: Uuid,
    pub class_id: Uuid,
    #[validate(length(min = 1))]
    pub semester: String,
    #[validate(length(min = 1))]
    pub academic_year: String,
}

impl From<WeightScopeQuery> for WeightScope {
    fn from(q: WeightScopeQuery) -> Self {
        WeightScope {
            subject_id: q.subject_id,
            class_id: q.class_id,
            semester: q.semester,
            academic_year: q.academic_year,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightValidation {
    pub total: Decimal,
    pub is_valid: bool,
    pub weights: Vec<ExamWeight>,
}
