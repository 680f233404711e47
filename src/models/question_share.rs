use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "share_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ShareType {
    Copy,
    Edit,
    View,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "share_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ShareStatus {
    Pending,
    Approved,
    Rejected,
}

impl ShareStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ShareStatus::Pending => "pending",
            ShareStatus::Approved => "approved",
            ShareStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QuestionShare {
    pub id: Uuid,
    pub question_id: Uuid,
    pub from_teacher_id: Uuid,
    pub to_teacher_id: Uuid,
    pub from_tenant_id: Uuid,
    pub to_tenant_id: Uuid,
    pub share_type: ShareType,
    pub status: ShareStatus,
    pub message: Option<String>,
    pub cloned_question_id: Option<Uuid>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
