use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "exam_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ExamType {
    Quiz,
    Midterm,
    Final,
    Assignment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "exam_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ExamStatus {
    Draft,
    Scheduled,
    Ongoing,
    Completed,
    Cancelled,
}

impl ExamStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExamStatus::Draft => "draft",
            ExamStatus::Scheduled => "scheduled",
            ExamStatus::Ongoing => "ongoing",
            ExamStatus::Completed => "completed",
            ExamStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_closed(self) -> bool {
        matches!(self, ExamStatus::Completed | ExamStatus::Cancelled)
    }
}

/// Grading and presentation toggles for an exam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExamSettings {
    pub allow_review: bool,
    pub show_correct_answers: bool,
    pub randomize_questions: bool,
    pub randomize_answers: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Exam {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub exam_type: ExamType,
    pub subject_id: Option<Uuid>,
    pub class_id: Option<Uuid>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub registration_deadline: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i32>,
    pub status: ExamStatus,
    #[sqlx(json)]
    pub settings: ExamSettings,
    pub max_attempts: i32,
    pub passing_score: Decimal,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A question placed into an exam's assembled question set.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExamQuestion {
    pub exam_id: Uuid,
    pub question_id: Uuid,
    pub tenant_id: Uuid,
    pub order_index: i32,
    pub points_override: Option<i32>,
}
