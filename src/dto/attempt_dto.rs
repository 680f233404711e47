use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{
    exam_attempt::{AttemptStatus, ExamAttempt},
    question::{AnswerValue, CorrectAnswer, QuestionOption, QuestionType},
};
use crate::services::scoring_service::ItemOutcome;
use crate::utils::validation::non_negative;

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct StartAttemptPayload {
    pub schedule_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RecordAnswerPayload {
    pub question_id: Uuid,
    pub answer: AnswerValue,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct GradeEssayPayload {
    pub question_id: Uuid,
    #[validate(custom(function = "non_negative"))]
    pub points: Decimal,
}

/// A question as presented inside an attempt, options already in the
/// attempt's stored order and without the answer key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptQuestionView {
    pub question_id: Uuid,
    pub question_type: QuestionType,
    pub content: String,
    pub options: Vec<QuestionOption>,
    pub points: i32,
    pub stimulus_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptView {
    #[serde(flatten)]
    pub attempt: ExamAttempt,
    pub questions: Vec<AttemptQuestionView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewItem {
    pub question_id: Uuid,
    pub question_type: QuestionType,
    pub content: String,
    pub answer: Option<AnswerValue>,
    pub outcome: ItemOutcome,
    pub points_awarded: Decimal,
    pub max_points: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<CorrectAnswer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptReview {
    pub attempt_id: Uuid,
    pub status: AttemptStatus,
    pub submitted_at: Option<DateTime<Utc>>,
    pub score: Option<Decimal>,
    pub pending_manual_score: Option<Decimal>,
    pub max_score: Option<Decimal>,
    pub total_score: Decimal,
    pub items: Vec<ReviewItem>,
}
