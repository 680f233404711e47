use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "grade_scope", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum GradeScope {
    PerStudent,
    PerClass,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GradeConversion {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub exam_id: Uuid,
    pub subject_id: Option<Uuid>,
    pub class_id: Option<Uuid>,
    pub student_id: Option<Uuid>,
    pub scope: GradeScope,
    pub min_score: Decimal,
    pub max_score: Decimal,
    pub grade: String,
    pub created_at: DateTime<Utc>,
}

impl GradeConversion {
    pub fn contains(&self, score: Decimal) -> bool {
        self.min_score <= score && score <= self.max_score
    }

    /// Bands that only share an endpoint do not overlap.
    pub fn overlaps(&self, other: &GradeConversion) -> bool {
        self.min_score < other.max_score && other.min_score < self.max_score
            || self.min_score == other.min_score && self.max_score == other.max_score
    }
}
