use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{error::Result, middleware::auth::TenantContext, AppState};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ItemAnalysisQuery {
    pub schedule_id: Option<Uuid>,
}

pub async fn item_analysis(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(exam_id): Path<Uuid>,
    Query(query): Query<ItemAnalysisQuery>,
) -> Result<impl IntoResponse> {
    let rows = state
        .item_analysis_service
        .analyze_exam(&ctx, exam_id, query.schedule_id)
        .await?;
    Ok(Json(rows))
}
