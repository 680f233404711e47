use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::attempt_dto::{GradeEssayPayload, RecordAnswerPayload, StartAttemptPayload},
    error::Result,
    middleware::auth::TenantContext,
    AppState,
};

/// The body is optional; without one the open schedule is picked.
pub async fn start_attempt(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(exam_id): Path<Uuid>,
    payload: Option<Json<StartAttemptPayload>>,
) -> Result<impl IntoResponse> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    payload.validate()?;
    let view = state
        .attempt_service
        .start_attempt(&ctx, exam_id, payload.schedule_id)
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn get_attempt(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let view = state.attempt_service.get_attempt(&ctx, id).await?;
    Ok(Json(view))
}

#[axum::debug_handler]
pub async fn record_answer(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<RecordAnswerPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let attempt = state
        .attempt_service
        .record_answer(&ctx, id, payload)
        .await?;
    Ok(Json(attempt))
}

pub async fn submit_attempt(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let attempt = state.attempt_service.submit_attempt(&ctx, id).await?;
    Ok(Json(attempt))
}

pub async fn abandon_attempt(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let attempt = state.attempt_service.abandon_attempt(&ctx, id).await?;
    Ok(Json(attempt))
}

#[axum::debug_handler]
pub async fn grade_essay(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<GradeEssayPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let attempt = state.attempt_service.grade_essay(&ctx, id, payload).await?;
    Ok(Json(attempt))
}

pub async fn attempt_review(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let review = state.attempt_service.attempt_review(&ctx, id).await?;
    Ok(Json(review))
}
