use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::exam::ExamType;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExamWeight {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub subject_id: Uuid,
    pub class_id: Uuid,
    pub exam_type: ExamType,
    pub weight: Decimal,
    pub semester: String,
    pub academic_year: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
