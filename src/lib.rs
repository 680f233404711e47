pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod utils;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, patch, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::repositories::Store;
use crate::services::{
    attempt_service::AttemptService, exam_service::ExamService, grade_service::GradeService,
    item_analysis_service::ItemAnalysisService, question_service::QuestionService,
    sweep_service::SweepService,
};
use crate::utils::time::Clock;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub clock: Arc<dyn Clock>,
    pub jwt_secret: Arc<str>,
    pub question_service: QuestionService,
    pub exam_service: ExamService,
    pub attempt_service: AttemptService,
    pub item_analysis_service: ItemAnalysisService,
    pub grade_service: GradeService,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, jwt_secret: &str) -> Self {
        let question_service = QuestionService::new(store.clone(), clock.clone());
        let exam_service = ExamService::new(store.clone(), clock.clone());
        let attempt_service =
            AttemptService::new(store.clone(), clock.clone(), exam_service.clone());
        let item_analysis_service =
            ItemAnalysisService::new(store.clone(), clock.clone(), exam_service.clone());
        let grade_service = GradeService::new(store.clone(), clock.clone(), exam_service.clone());

        Self {
            store,
            clock,
            jwt_secret: Arc::from(jwt_secret),
            question_service,
            exam_service,
            attempt_service,
            item_analysis_service,
            grade_service,
        }
    }

    pub fn sweep_service(&self, stale_after: chrono::Duration) -> SweepService {
        SweepService::new(
            self.exam_service.clone(),
            self.attempt_service.clone(),
            stale_after,
        )
    }
}

/// Full HTTP surface: `/health` plus the authenticated `/api` routes.
pub fn build_router(state: AppState, api_rps: u32) -> Router {
    let base_routes = Router::new().route("/health", get(routes::health::health));

    let question_api = Router::new()
        .route("/api/stimuli", post(routes::questions::create_stimulus))
        .route("/api/stimuli/:id", get(routes::questions::get_stimulus))
        .route(
            "/api/questions",
            get(routes::questions::list_questions).post(routes::questions::create_question),
        )
        .route(
            "/api/questions/:id",
            get(routes::questions::get_question)
                .put(routes::questions::update_question)
                .delete(routes::questions::delete_question),
        )
        .route("/api/question-banks", post(routes::questions::create_bank))
        .route(
            "/api/question-banks/:id",
            get(routes::questions::get_bank)
                .put(routes::questions::update_bank)
                .delete(routes::questions::delete_bank),
        )
        .route(
            "/api/question-banks/:id/questions",
            get(routes::questions::list_bank_questions),
        )
        .route(
            "/api/question-banks/:id/questions/:question_id",
            post(routes::questions::attach_bank_question)
                .delete(routes::questions::detach_bank_question),
        )
        .route("/api/question-shares", post(routes::questions::request_share))
        .route(
            "/api/question-shares/:id/approve",
            post(routes::questions::approve_share),
        )
        .route(
            "/api/question-shares/:id/reject",
            post(routes::questions::reject_share),
        );

    let exam_api = Router::new()
        .route("/api/exams", post(routes::exams::create_exam))
        .route(
            "/api/exams/:id",
            get(routes::exams::get_exam)
                .put(routes::exams::update_exam)
                .delete(routes::exams::delete_exam),
        )
        .route("/api/exams/:id/cancel", post(routes::exams::cancel_exam))
        .route(
            "/api/exams/:id/schedules",
            get(routes::exams::list_schedules).post(routes::exams::create_schedule),
        )
        .route(
            "/api/exams/:id/questions",
            get(routes::exams::list_exam_questions).post(routes::exams::add_exam_question),
        )
        .route(
            "/api/exams/:id/questions/from-bank",
            post(routes::exams::add_questions_from_bank),
        )
        .route(
            "/api/exams/:id/questions/:question_id",
            delete(routes::exams::remove_exam_question),
        )
        .route(
            "/api/exams/:id/item-analysis",
            get(routes::analysis::item_analysis),
        )
        .route("/api/exam-weights", post(routes::exams::upsert_weight))
        .route(
            "/api/exam-weights/validate",
            get(routes::exams::validate_weights),
        )
        .route(
            "/api/exam-weights/aggregate",
            post(routes::grading::aggregate_subject),
        );

    let attempt_api = Router::new()
        .route("/api/exams/:id/attempts", post(routes::attempts::start_attempt))
        .route("/api/attempts/:id", get(routes::attempts::get_attempt))
        .route(
            "/api/attempts/:id/answer",
            patch(routes::attempts::record_answer),
        )
        .route(
            "/api/attempts/:id/submit",
            post(routes::attempts::submit_attempt),
        )
        .route(
            "/api/attempts/:id/abandon",
            post(routes::attempts::abandon_attempt),
        )
        .route(
            "/api/attempts/:id/grade-essay",
            post(routes::attempts::grade_essay),
        )
        .route(
            "/api/attempts/:id/review",
            get(routes::attempts::attempt_review),
        );

    let grading_api = Router::new()
        .route(
            "/api/grade-conversions",
            post(routes::grading::create_conversion),
        )
        .route(
            "/api/grade-conversions/evaluate",
            get(routes::grading::evaluate),
        )
        .route(
            "/api/grade-conversions/curve",
            post(routes::grading::derive_curve),
        );

    // Layers run bottom-up: authenticate first, then rate limit per tenant.
    let api = question_api
        .merge(exam_api)
        .merge(attempt_api)
        .merge(grading_api)
        .layer(axum::middleware::from_fn_with_state(
            middleware::rate_limit::new_rps_state(api_rps),
            middleware::rate_limit::rps_middleware,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_bearer_auth,
        ));

    base_routes
        .merge(api)
        .with_state(state)
        .layer(middleware::cors::api_cors())
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(2 * 1024 * 1024))
}
