use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use validator::Validate;

use crate::{
    dto::grading_dto::{
        AggregatePayload, CreateGradeConversionPayload, DeriveCurvePayload, EvaluateGradeQuery,
    },
    error::Result,
    middleware::auth::TenantContext,
    AppState,
};

#[axum::debug_handler]
pub async fn create_conversion(
    State(state): State<AppState>,
    ctx: TenantContext,
    Json(payload): Json<CreateGradeConversionPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let conversion = state.grade_service.create_conversion(&ctx, payload).await?;
    Ok((StatusCode::CREATED, Json(conversion)))
}

pub async fn evaluate(
    State(state): State<AppState>,
    ctx: TenantContext,
    Query(query): Query<EvaluateGradeQuery>,
) -> Result<impl IntoResponse> {
    let evaluation = state.grade_service.evaluate(&ctx, query).await?;
    Ok(Json(evaluation))
}

#[axum::debug_handler]
pub async fn derive_curve(
    State(state): State<AppState>,
    ctx: TenantContext,
    Json(payload): Json<DeriveCurvePayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let result = state.grade_service.derive_class_curve(&ctx, payload).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

#[axum::debug_handler]
pub async fn aggregate_subject(
    State(state): State<AppState>,
    ctx: TenantContext,
    Json(payload): Json<AggregatePayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let aggregate = state.grade_service.aggregate_subject(&ctx, payload).await?;
    Ok(Json(aggregate))
}
