use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::question::AnswerValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "attempt_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Started,
    InProgress,
    Completed,
    Abandoned,
    Timeout,
}

impl AttemptStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttemptStatus::Started => "started",
            AttemptStatus::InProgress => "in_progress",
            AttemptStatus::Completed => "completed",
            AttemptStatus::Abandoned => "abandoned",
            AttemptStatus::Timeout => "timeout",
        }
    }

    pub fn is_active(self) -> bool {
        matches!(self, AttemptStatus::Started | AttemptStatus::InProgress)
    }

    /// Terminal states that carry a score.
    pub fn is_scored(self) -> bool {
        matches!(self, AttemptStatus::Completed | AttemptStatus::Timeout)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExamAttempt {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub exam_id: Uuid,
    pub schedule_id: Option<Uuid>,
    pub student_id: Uuid,
    pub attempt_number: i32,
    pub status: AttemptStatus,
    #[sqlx(json)]
    pub question_order: Vec<Uuid>,
    #[sqlx(json)]
    pub option_orders: BTreeMap<Uuid, Vec<String>>,
    #[sqlx(json)]
    pub answers: BTreeMap<Uuid, AnswerValue>,
    #[sqlx(json)]
    pub manual_scores: BTreeMap<Uuid, Decimal>,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub last_activity_at: DateTime<Utc>,
    pub time_spent_seconds: Option<i32>,
    pub score: Option<Decimal>,
    pub correct_answers: Option<i32>,
    pub pending_manual_score: Option<Decimal>,
    pub max_score: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExamAttempt {
    /// Automatic score plus any manually graded essay points.
    pub fn total_score(&self) -> Decimal {
        let manual: Decimal = self.manual_scores.values().copied().sum();
        self.score.unwrap_or_default() + manual
    }
}
