use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::question_dto::{
        CreateBankPayload, CreateQuestionPayload, CreateSharePayload, CreateStimulusPayload,
        ListQuestionsQuery, UpdateBankPayload, UpdateQuestionPayload,
    },
    error::Result,
    middleware::auth::TenantContext,
    AppState,
};

#[axum::debug_handler]
pub async fn create_stimulus(
    State(state): State<AppState>,
    ctx: TenantContext,
    Json(payload): Json<CreateStimulusPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let stimulus = state.question_service.create_stimulus(&ctx, payload).await?;
    Ok((StatusCode::CREATED, Json(stimulus)))
}

pub async fn get_stimulus(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let stimulus = state.question_service.get_stimulus(&ctx, id).await?;
    Ok(Json(stimulus))
}

#[axum::debug_handler]
pub async fn create_question(
    State(state): State<AppState>,
    ctx: TenantContext,
    Json(payload): Json<CreateQuestionPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let question = state.question_service.create_question(&ctx, payload).await?;
    Ok((StatusCode::CREATED, Json(question)))
}

pub async fn list_questions(
    State(state): State<AppState>,
    ctx: TenantContext,
    Query(query): Query<ListQuestionsQuery>,
) -> Result<impl IntoResponse> {
    let questions = state.question_service.list_questions(&ctx, query).await?;
    Ok(Json(questions))
}

pub async fn get_question(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let question = state.question_service.get_question(&ctx, id).await?;
    Ok(Json(question))
}

#[axum::debug_handler]
pub async fn update_question(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateQuestionPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let question = state
        .question_service
        .update_question(&ctx, id, payload)
        .await?;
    Ok(Json(question))
}

pub async fn delete_question(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let outcome = state.question_service.delete_question(&ctx, id).await?;
    Ok(Json(outcome))
}

#[axum::debug_handler]
pub async fn create_bank(
    State(state): State<AppState>,
    ctx: TenantContext,
    Json(payload): Json<CreateBankPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let bank = state.question_service.create_bank(&ctx, payload).await?;
    Ok((StatusCode::CREATED, Json(bank)))
}

pub async fn get_bank(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let bank = state.question_service.get_bank(&ctx, id).await?;
    Ok(Json(bank))
}

#[axum::debug_handler]
pub async fn update_bank(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateBankPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let bank = state.question_service.update_bank(&ctx, id, payload).await?;
    Ok(Json(bank))
}

pub async fn delete_bank(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let outcome = state.question_service.delete_bank(&ctx, id).await?;
    Ok(Json(outcome))
}

pub async fn list_bank_questions(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let questions = state.question_service.list_bank_questions(&ctx, id).await?;
    Ok(Json(questions))
}

pub async fn attach_bank_question(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path((bank_id, question_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse> {
    let membership = state
        .question_service
        .attach_question(&ctx, bank_id, question_id)
        .await?;
    Ok(Json(membership))
}

pub async fn detach_bank_question(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path((bank_id, question_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse> {
    let membership = state
        .question_service
        .detach_question(&ctx, bank_id, question_id)
        .await?;
    Ok(Json(membership))
}

#[axum::debug_handler]
pub async fn request_share(
    State(state): State<AppState>,
    ctx: TenantContext,
    Json(payload): Json<CreateSharePayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let share = state.question_service.request_share(&ctx, payload).await?;
    Ok((StatusCode::CREATED, Json(share)))
}

pub async fn approve_share(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let share = state.question_service.approve_share(&ctx, id).await?;
    Ok(Json(share))
}

pub async fn reject_share(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let share = state.question_service.reject_share(&ctx, id).await?;
    Ok(Json(share))
}
