use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::exam_dto::{
        AddExamQuestionPayload, AddFromBankPayload, CreateExamPayload, CreateSchedulePayload,
        UpdateExamPayload, UpsertWeightPayload, WeightScopeQuery,
    },
    error::Result,
    middleware::auth::TenantContext,
    repositories::WeightScope,
    AppState,
};

#[axum::debug_handler]
pub async fn create_exam(
    State(state): State<AppState>,
    ctx: TenantContext,
    Json(payload): Json<CreateExamPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let exam = state.exam_service.create_exam(&ctx, payload).await?;
    Ok((StatusCode::CREATED, Json(exam)))
}

pub async fn get_exam(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let exam = state.exam_service.get_exam(&ctx, id).await?;
    Ok(Json(exam))
}

#[axum::debug_handler]
pub async fn update_exam(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateExamPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let exam = state.exam_service.update_exam(&ctx, id, payload).await?;
    Ok(Json(exam))
}

pub async fn delete_exam(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let outcome = state.exam_service.delete_exam(&ctx, id).await?;
    Ok(Json(outcome))
}

pub async fn cancel_exam(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let exam = state.exam_service.cancel_exam(&ctx, id).await?;
    Ok(Json(exam))
}

#[axum::debug_handler]
pub async fn create_schedule(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(exam_id): Path<Uuid>,
    Json(payload): Json<CreateSchedulePayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let schedule = state
        .exam_service
        .create_schedule(&ctx, exam_id, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(schedule)))
}

pub async fn list_schedules(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(exam_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let schedules = state.exam_service.list_schedules(&ctx, exam_id).await?;
    Ok(Json(schedules))
}

pub async fn list_exam_questions(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(exam_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let items = state.exam_service.list_exam_questions(&ctx, exam_id).await?;
    Ok(Json(items))
}

#[axum::debug_handler]
pub async fn add_exam_question(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(exam_id): Path<Uuid>,
    Json(payload): Json<AddExamQuestionPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let item = state
        .exam_service
        .add_exam_question(&ctx, exam_id, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

#[axum::debug_handler]
pub async fn add_questions_from_bank(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(exam_id): Path<Uuid>,
    Json(payload): Json<AddFromBankPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let added = state
        .exam_service
        .add_questions_from_bank(&ctx, exam_id, payload)
        .await?;
    Ok(Json(json!({
        "added": added.len(),
        "items": added,
    })))
}

pub async fn remove_exam_question(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path((exam_id, question_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse> {
    state
        .exam_service
        .remove_exam_question(&ctx, exam_id, question_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
pub async fn upsert_weight(
    State(state): State<AppState>,
    ctx: TenantContext,
    Json(payload): Json<UpsertWeightPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let weight = state.exam_service.upsert_weight(&ctx, payload).await?;
    Ok(Json(weight))
}

pub async fn validate_weights(
    State(state): State<AppState>,
    ctx: TenantContext,
    Query(query): Query<WeightScopeQuery>,
) -> Result<impl IntoResponse> {
    query.validate()?;
    let scope = WeightScope::from(query);
    let validation = state.exam_service.validate_weights(&ctx, &scope).await?;
    Ok(Json(validation))
}
