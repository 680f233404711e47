use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::trim_optional_string;
use crate::models::{
    question::{CorrectAnswer, QuestionOption, QuestionType},
    question_share::ShareType,
    stimulus::StimulusContentType,
};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateStimulusPayload {
    #[serde(default, deserialize_with = "trim_optional_string")]
    #[validate(length(max = 255))]
    pub title: Option<String>,
    pub content_type: StimulusContentType,
    #[serde(default, deserialize_with = "trim_optional_string")]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "trim_optional_string")]
    #[validate(url)]
    pub file_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateQuestionPayload {
    pub question_type: QuestionType,
    #[validate(length(min = 1))]
    pub content: String,
    #[serde(default)]
    pub options: Vec<QuestionOption>,
    pub correct_answer: Option<CorrectAnswer>,
    #[serde(default, deserialize_with = "trim_optional_string")]
    pub explanation: Option<String>,
    #[validate(range(min = 0, message = "Points cannot be negative"))]
    pub points: i32,
    #[validate(range(min = 1, max = 5, message = "Difficulty level must be between 1 and 5"))]
    #[serde(default = "default_difficulty")]
    pub difficulty_level: i16,
    pub stimulus_id: Option<Uuid>,
    pub subject_id: Option<Uuid>,
    /// Adds the new question to this bank right away.
    pub bank_id: Option<Uuid>,
}

fn default_difficulty() -> i16 {
    3
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateQuestionPayload {
    #[serde(default, deserialize_with = "trim_optional_string")]
    pub content: Option<String>,
    pub options: Option<Vec<QuestionOption>>,
    pub correct_answer: Option<CorrectAnswer>,
    #[serde(default, deserialize_with = "trim_optional_string")]
    pub explanation: Option<String>,
    #[validate(range(min = 0, message = "Points cannot be negative"))]
    pub points: Option<i32>,
    #[validate(range(min = 1, max = 5, message = "Difficulty level must be between 1 and 5"))]
    pub difficulty_level: Option<i16>,
    pub stimulus_id: Option<Uuid>,
    pub subject_id: Option<Uuid>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuestionsQuery {
    pub question_type: Option<QuestionType>,
    pub bank_id: Option<Uuid>,
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateBankPayload {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[serde(default, deserialize_with = "trim_optional_string")]
    pub description: Option<String>,
    pub subject_id: Option<Uuid>,
    pub class_id: Option<Uuid>,
    #[serde(default)]
    pub is_shared: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateBankPayload {
    #[serde(default, deserialize_with = "trim_optional_string")]
    #[validate(length(max = 255))]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "trim_optional_string")]
    pub description: Option<String>,
    pub subject_id: Option<Uuid>,
    pub class_id: Option<Uuid>,
    pub is_shared: Option<bool>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateSharePayload {
    pub question_id: Uuid,
    pub from_tenant_id: Uuid,
    pub to_tenant_id: Uuid,
    pub to_teacher_id: Uuid,
    pub share_type: ShareType,
    #[serde(default, deserialize_with = "trim_optional_string")]
    #[validate(length(max = 1000))]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankMembership {
    pub bank_id: Uuid,
    pub question_id: Uuid,
    pub changed: bool,
}
