use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "question_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    MultipleChoice,
    TrueFalse,
    Essay,
    FillBlank,
    Matching,
}

impl QuestionType {
    /// Types whose option picks are tallied in item analysis.
    pub fn has_option_statistics(self) -> bool {
        matches!(self, QuestionType::MultipleChoice | QuestionType::Matching)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub key: String,
    pub text: String,
    /// Right-hand side of a matching pair.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CorrectAnswer {
    Choice(String),
    Boolean(bool),
    /// Accepted spellings for a fill-in-the-blank answer.
    Text(Vec<String>),
    /// Left option key to right option key.
    Pairs(BTreeMap<String, String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AnswerValue {
    Choice(String),
    Boolean(bool),
    Text(String),
    Pairs(BTreeMap<String, String>),
}

impl AnswerValue {
    pub fn is_blank(&self) -> bool {
        match self {
            AnswerValue::Choice(key) => key.trim().is_empty(),
            AnswerValue::Boolean(_) => false,
            AnswerValue::Text(text) => text.trim().is_empty(),
            AnswerValue::Pairs(pairs) => pairs.is_empty(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Question {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub question_type: QuestionType,
    pub content: String,
    #[sqlx(json)]
    pub options: Vec<QuestionOption>,
    #[sqlx(json)]
    pub correct_answer: Option<CorrectAnswer>,
    pub explanation: Option<String>,
    pub points: i32,
    pub difficulty_level: i16,
    pub stimulus_id: Option<Uuid>,
    pub subject_id: Option<Uuid>,
    pub created_by: Uuid,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Question {
    pub fn option_keys(&self) -> Vec<String> {
        self.options.iter().map(|o| o.key.clone()).collect()
    }

    /// Checks that the answer key fits the question type and refers to real options.
    pub fn validate_answer_key(&self) -> Result<(), String> {
        let has_key = |k: &str| self.options.iter().any(|o| o.key == k);
        match (self.question_type, &self.correct_answer) {
            (QuestionType::Essay, None) => Ok(()),
            (QuestionType::Essay, Some(_)) => {
                Err("essay questions are graded manually and take no answer key".into())
            }
            (QuestionType::MultipleChoice, Some(CorrectAnswer::Choice(key))) => {
                if self.options.len() < 2 {
                    Err("multiple choice questions need at least two options".into())
                } else if !has_key(key) {
                    Err(format!("correct option '{}' is not among the options", key))
                } else {
                    Ok(())
                }
            }
            (QuestionType::TrueFalse, Some(CorrectAnswer::Boolean(_))) => Ok(()),
            (QuestionType::FillBlank, Some(CorrectAnswer::Text(accepted))) => {
                if accepted.iter().all(|a| a.trim().is_empty()) {
                    Err("fill-in-the-blank questions need an accepted answer".into())
                } else {
                    Ok(())
                }
            }
            (QuestionType::Matching, Some(CorrectAnswer::Pairs(pairs))) => {
                if pairs.is_empty() {
                    return Err("matching questions need at least one pair".into());
                }
                match pairs.iter().find(|(l, r)| !has_key(l) || !has_key(r)) {
                    Some((l, r)) => Err(format!("pair '{}' -> '{}' references unknown options", l, r)),
                    None => Ok(()),
                }
            }
            (qt, _) => Err(format!("answer key does not match question type {:?}", qt)),
        }
    }
}
