use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupStats {
    pub correct: i32,
    pub total: i32,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionStatistic {
    pub option_key: String,
    pub count: i32,
    pub percentage: f64,
    pub is_correct: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "item_quality", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ItemQuality {
    /// Weaker students outperform stronger ones.
    Miscalibrated,
    Poor,
    Marginal,
    Good,
    Excellent,
    Insufficient,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct QuestionItemAnalysis {
    pub tenant_id: Uuid,
    pub exam_id: Uuid,
    pub schedule_id: Option<Uuid>,
    pub question_id: Uuid,
    pub total_attempts: i32,
    pub correct_answers: i32,
    pub incorrect_answers: i32,
    pub blank_answers: i32,
    pub pending_answers: i32,
    pub difficulty_index: Option<f64>,
    pub discrimination_index: Option<f64>,
    #[sqlx(json)]
    pub option_statistics: Vec<OptionStatistic>,
    #[sqlx(json)]
    pub top_group_stats: GroupStats,
    #[sqlx(json)]
    pub bottom_group_stats: GroupStats,
    pub quality: ItemQuality,
    pub analyzed_at: DateTime<Utc>,
}
