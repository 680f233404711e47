use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "stimulus_content_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StimulusContentType {
    Text,
    Image,
    Pdf,
    Video,
    Audio,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Stimulus {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub title: Option<String>,
    pub content_type: StimulusContentType,
    pub content: Option<String>,
    pub file_url: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}
