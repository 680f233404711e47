//! Persistence seams for the assessment engine.
//!
//! Services depend only on these traits. `PgStore` is the production backend;
//! `MemoryStore` backs tests and `STORAGE=memory` runs.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    exam::{Exam, ExamQuestion, ExamStatus},
    exam_attempt::ExamAttempt,
    exam_schedule::{ExamSchedule, ScheduleStatus},
    exam_weight::ExamWeight,
    grade_conversion::GradeConversion,
    item_analysis::QuestionItemAnalysis,
    question::{Question, QuestionType},
    question_bank::QuestionBank,
    question_share::QuestionShare,
    stimulus::Stimulus,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Clone, Default)]
pub struct QuestionFilter {
    pub question_type: Option<QuestionType>,
    pub bank_id: Option<Uuid>,
    pub include_inactive: bool,
}

/// Rows written into the destination tenant when a copy share is approved.
#[derive(Debug, Clone)]
pub struct ShareClone {
    pub stimulus: Option<Stimulus>,
    pub question: Question,
}

/// Key identifying one subject grade configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WeightScope {
    pub subject_id: Uuid,
    pub class_id: Uuid,
    pub semester: String,
    pub academic_year: String,
}

#[async_trait]
pub trait QuestionRepository: Send + Sync {
    async fn insert_stimulus(&self, stimulus: Stimulus) -> Result<Stimulus>;
    async fn find_stimulus(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<Stimulus>>;

    async fn insert_question(&self, question: Question) -> Result<Question>;
    async fn find_question(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<Question>>;
    async fn find_questions(&self, tenant_id: Uuid, ids: &[Uuid]) -> Result<Vec<Question>>;
    async fn list_questions(&self, tenant_id: Uuid, filter: &QuestionFilter)
        -> Result<Vec<Question>>;
    async fn update_question(&self, question: Question) -> Result<Question>;
    async fn delete_question(&self, tenant_id: Uuid, id: Uuid) -> Result<()>;
    /// Exam placements plus bank memberships pointing at the question.
    async fn count_question_references(&self, tenant_id: Uuid, id: Uuid) -> Result<i64>;

    async fn insert_bank(&self, bank: QuestionBank) -> Result<QuestionBank>;
    async fn find_bank(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<QuestionBank>>;
    async fn update_bank(&self, bank: QuestionBank) -> Result<QuestionBank>;
    async fn delete_bank(&self, tenant_id: Uuid, id: Uuid) -> Result<()>;
    async fn attach_question(&self, bank_id: Uuid, question_id: Uuid) -> Result<bool>;
    async fn detach_question(&self, bank_id: Uuid, question_id: Uuid) -> Result<bool>;
    async fn bank_question_ids(&self, bank_id: Uuid) -> Result<Vec<Uuid>>;

    async fn insert_share(&self, share: QuestionShare) -> Result<QuestionShare>;
    async fn find_share(&self, id: Uuid) -> Result<Option<QuestionShare>>;
    /// Persists a resolved share, and its clone if any, only while the stored
    /// share is still pending. Returns `Error::Conflict` otherwise.
    async fn resolve_share(
        &self,
        share: QuestionShare,
        clone: Option<ShareClone>,
    ) -> Result<QuestionShare>;
}

#[async_trait]
pub trait ExamRepository: Send + Sync {
    async fn insert_exam(&self, exam: Exam) -> Result<Exam>;
    async fn find_exam(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<Exam>>;
    async fn update_exam(&self, exam: Exam) -> Result<Exam>;
    async fn delete_exam(&self, tenant_id: Uuid, id: Uuid) -> Result<()>;
    /// Across all tenants; used by the status sweep.
    async fn list_exams_in_status(&self, statuses: &[ExamStatus]) -> Result<Vec<Exam>>;

    async fn insert_schedule(&self, schedule: ExamSchedule) -> Result<ExamSchedule>;
    async fn find_schedule(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<ExamSchedule>>;
    async fn list_schedules(&self, tenant_id: Uuid, exam_id: Uuid) -> Result<Vec<ExamSchedule>>;
    async fn update_schedule(&self, schedule: ExamSchedule) -> Result<ExamSchedule>;
    async fn list_schedules_in_status(
        &self,
        statuses: &[ScheduleStatus],
    ) -> Result<Vec<ExamSchedule>>;

    async fn list_exam_questions(&self, tenant_id: Uuid, exam_id: Uuid)
        -> Result<Vec<ExamQuestion>>;
    async fn insert_exam_question(&self, item: ExamQuestion) -> Result<ExamQuestion>;
    async fn delete_exam_question(
        &self,
        tenant_id: Uuid,
        exam_id: Uuid,
        question_id: Uuid,
    ) -> Result<bool>;

    async fn upsert_weight(&self, weight: ExamWeight) -> Result<ExamWeight>;
    async fn list_weights(&self, tenant_id: Uuid, scope: &WeightScope) -> Result<Vec<ExamWeight>>;
}

#[async_trait]
pub trait AttemptRepository: Send + Sync {
    /// Fails with `Error::Conflict` when the attempt number is already taken.
    async fn insert_attempt(&self, attempt: ExamAttempt) -> Result<ExamAttempt>;
    async fn find_attempt(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<ExamAttempt>>;
    async fn update_attempt(&self, attempt: ExamAttempt) -> Result<ExamAttempt>;
    async fn list_student_attempts(
        &self,
        tenant_id: Uuid,
        exam_id: Uuid,
        student_id: Uuid,
    ) -> Result<Vec<ExamAttempt>>;
    async fn list_exam_attempts(
        &self,
        tenant_id: Uuid,
        exam_id: Uuid,
        schedule_id: Option<Uuid>,
    ) -> Result<Vec<ExamAttempt>>;
    async fn count_exam_attempts(&self, tenant_id: Uuid, exam_id: Uuid) -> Result<i64>;
    /// Attempts on any exam whose question set contains the question.
    async fn count_question_attempts(&self, tenant_id: Uuid, question_id: Uuid) -> Result<i64>;
    /// Active attempts whose deadline is at or before `now`, across tenants.
    async fn list_attempts_due(&self, now: DateTime<Utc>) -> Result<Vec<ExamAttempt>>;
    /// Active attempts with no activity since `cutoff`, across tenants.
    async fn list_attempts_idle_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<ExamAttempt>>;
}

#[async_trait]
pub trait GradingRepository: Send + Sync {
    async fn insert_grade_conversion(&self, conversion: GradeConversion)
        -> Result<GradeConversion>;
    async fn list_grade_conversions(
        &self,
        tenant_id: Uuid,
        exam_id: Uuid,
    ) -> Result<Vec<GradeConversion>>;
    async fn replace_item_analyses(
        &self,
        tenant_id: Uuid,
        exam_id: Uuid,
        schedule_id: Option<Uuid>,
        rows: Vec<QuestionItemAnalysis>,
    ) -> Result<()>;
}

pub trait Store: QuestionRepository + ExamRepository + AttemptRepository + GradingRepository {}

impl<T> Store for T where
    T: QuestionRepository + ExamRepository + AttemptRepository + GradingRepository
{
}
