use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::dto::exam_dto::{
    AddExamQuestionPayload, AddFromBankPayload, CreateExamPayload, CreateSchedulePayload,
    UpdateExamPayload, UpsertWeightPayload, WeightValidation,
};
use crate::dto::{DeleteOutcome, ATTEMPTS_EXIST};
use crate::error::{Error, Result};
use crate::middleware::auth::TenantContext;
use crate::models::{
    exam::{Exam, ExamQuestion, ExamStatus},
    exam_attempt::AttemptStatus,
    exam_schedule::{ExamSchedule, ScheduleStatus},
    exam_weight::ExamWeight,
    question::Question,
};
use crate::repositories::{Store, WeightScope};
use crate::utils::time::Clock;
use crate::utils::validation::{
    ensure_deadline_before_start, ensure_max_attempts, ensure_schedule_within_exam, ensure_window,
};

/// An exam's assembled question set, in order, with the question rows.
#[derive(Debug, Clone)]
pub struct QuestionSet {
    pub items: Vec<ExamQuestion>,
    pub questions: HashMap<Uuid, Question>,
}

impl QuestionSet {
    pub fn points(&self, question_id: Uuid) -> Option<i32> {
        let item = self.items.iter().find(|i| i.question_id == question_id)?;
        let question = self.questions.get(&question_id)?;
        Some(item.points_override.unwrap_or(question.points))
    }

    pub fn total_points(&self) -> Decimal {
        self.items
            .iter()
            .filter_map(|i| self.points(i.question_id))
            .map(Decimal::from)
            .sum()
    }
}

#[derive(Clone)]
pub struct ExamService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl ExamService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn create_exam(&self, ctx: &TenantContext, payload: CreateExamPayload) -> Result<Exam> {
        ctx.require_staff()?;
        ensure_window(payload.start_date, payload.end_date, "Exam")?;
        ensure_deadline_before_start(payload.registration_deadline, payload.start_date)?;
        ensure_max_attempts(payload.max_attempts)?;

        let now = self.clock.now();
        let exam = Exam {
            id: Uuid::new_v4(),
            tenant_id: ctx.tenant_id,
            title: payload.title.trim().to_string(),
            description: payload.description,
            exam_type: payload.exam_type,
            subject_id: payload.subject_id,
            class_id: payload.class_id,
            start_date: payload.start_date,
            end_date: payload.end_date,
            registration_deadline: payload.registration_deadline,
            duration_minutes: payload.duration_minutes,
            status: ExamStatus::Draft,
            settings: payload.settings,
            max_attempts: payload.max_attempts,
            passing_score: payload.passing_score,
            created_by: ctx.actor_id,
            created_at: now,
            updated_at: now,
        };
        let exam = self.store.insert_exam(exam).await?;
        tracing::info!(exam_id = %exam.id, tenant_id = %ctx.tenant_id, "exam created");
        Ok(exam)
    }

    pub async fn get_exam(&self, ctx: &TenantContext, id: Uuid) -> Result<Exam> {
        self.find_exam(ctx.tenant_id, id).await
    }

    pub(crate) async fn find_exam(&self, tenant_id: Uuid, id: Uuid) -> Result<Exam> {
        self.store
            .find_exam(tenant_id, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Exam {} not found", id)))
    }

    pub async fn update_exam(
        &self,
        ctx: &TenantContext,
        id: Uuid,
        payload: UpdateExamPayload,
    ) -> Result<Exam> {
        ctx.require_staff()?;
        let mut exam = self.get_exam(ctx, id).await?;
        if exam.status.is_closed() {
            return Err(Error::InvalidStateTransition {
                entity: "exam",
                from: exam.status.as_str().to_string(),
                to: "updated".to_string(),
            });
        }

        if let Some(passing_score) = payload.passing_score {
            if passing_score != exam.passing_score
                && self.store.count_exam_attempts(ctx.tenant_id, id).await? > 0
            {
                return Err(Error::ImmutableAfterAttempts("passing_score".to_string()));
            }
            exam.passing_score = passing_score;
        }
        if let Some(max_attempts) = payload.max_attempts {
            ensure_max_attempts(max_attempts)?;
            if max_attempts < exam.max_attempts {
                let committed = self.highest_committed_attempts(ctx.tenant_id, id).await?;
                if i64::from(max_attempts) < committed {
                    return Err(Error::CapacityBelowCommitted {
                        requested: max_attempts,
                        committed,
                    });
                }
            }
            exam.max_attempts = max_attempts;
        }

        if let Some(title) = payload.title {
            exam.title = title;
        }
        if let Some(description) = payload.description {
            exam.description = Some(description);
        }
        if let Some(exam_type) = payload.exam_type {
            exam.exam_type = exam_type;
        }
        if let Some(subject_id) = payload.subject_id {
            exam.subject_id = Some(subject_id);
        }
        if let Some(class_id) = payload.class_id {
            exam.class_id = Some(class_id);
        }
        if let Some(start_date) = payload.start_date {
            exam.start_date = start_date;
        }
        if let Some(end_date) = payload.end_date {
            exam.end_date = end_date;
        }
        if let Some(deadline) = payload.registration_deadline {
            exam.registration_deadline = Some(deadline);
        }
        if let Some(duration) = payload.duration_minutes {
            exam.duration_minutes = Some(duration);
        }
        if let Some(settings) = payload.settings {
            exam.settings = settings;
        }

        ensure_window(exam.start_date, exam.end_date, "Exam")?;
        ensure_deadline_before_start(exam.registration_deadline, exam.start_date)?;
        if payload.start_date.is_some() || payload.end_date.is_some() {
            for schedule in self.store.list_schedules(ctx.tenant_id, id).await? {
                if schedule.status == ScheduleStatus::Cancelled {
                    continue;
                }
                ensure_schedule_within_exam(
                    exam.start_date,
                    exam.end_date,
                    schedule.start_time,
                    schedule.end_time,
                )?;
            }
        }
        exam.updated_at = self.clock.now();

        self.store.update_exam(exam).await
    }

    /// Highest number of non-abandoned attempts any one student holds.
    async fn highest_committed_attempts(&self, tenant_id: Uuid, exam_id: Uuid) -> Result<i64> {
        let attempts = self.store.list_exam_attempts(tenant_id, exam_id, None).await?;
        let mut per_student: HashMap<Uuid, i64> = HashMap::new();
        for attempt in attempts
            .iter()
            .filter(|a| a.status != AttemptStatus::Abandoned)
        {
            *per_student.entry(attempt.student_id).or_default() += 1;
        }
        Ok(per_student.values().copied().max().unwrap_or(0))
    }

    pub async fn cancel_exam(&self, ctx: &TenantContext, id: Uuid) -> Result<Exam> {
        ctx.require_staff()?;
        let exam = self.get_exam(ctx, id).await?;
        self.cancel(exam).await
    }

    async fn cancel(&self, mut exam: Exam) -> Result<Exam> {
        if exam.status.is_closed() {
            return Err(Error::InvalidStateTransition {
                entity: "exam",
                from: exam.status.as_str().to_string(),
                to: ExamStatus::Cancelled.as_str().to_string(),
            });
        }
        let now = self.clock.now();
        for mut schedule in self.store.list_schedules(exam.tenant_id, exam.id).await? {
            if schedule.status.is_closed() {
                continue;
            }
            schedule.status = ScheduleStatus::Cancelled;
            schedule.updated_at = now;
            self.store.update_schedule(schedule).await?;
        }
        exam.status = ExamStatus::Cancelled;
        exam.updated_at = now;
        let exam = self.store.update_exam(exam).await?;
        tracing::info!(exam_id = %exam.id, "exam cancelled");
        Ok(exam)
    }

    pub async fn delete_exam(&self, ctx: &TenantContext, id: Uuid) -> Result<DeleteOutcome> {
        ctx.require_staff()?;
        let exam = self.get_exam(ctx, id).await?;
        if self.store.count_exam_attempts(ctx.tenant_id, id).await? == 0 {
            self.store.delete_exam(ctx.tenant_id, id).await?;
            tracing::info!(exam_id = %id, "exam deleted");
            return Ok(DeleteOutcome::Deleted);
        }
        if exam.status != ExamStatus::Cancelled {
            self.cancel(exam).await?;
        }
        Ok(DeleteOutcome::Cancelled {
            reason: ATTEMPTS_EXIST.to_string(),
        })
    }

    pub async fn create_schedule(
        &self,
        ctx: &TenantContext,
        exam_id: Uuid,
        payload: CreateSchedulePayload,
    ) -> Result<ExamSchedule> {
        ctx.require_staff()?;
        let mut exam = self.get_exam(ctx, exam_id).await?;
        if exam.status.is_closed() {
            return Err(Error::InvalidStateTransition {
                entity: "exam",
                from: exam.status.as_str().to_string(),
                to: ExamStatus::Scheduled.as_str().to_string(),
            });
        }
        ensure_window(payload.start_time, payload.end_time, "Schedule")?;
        ensure_schedule_within_exam(
            exam.start_date,
            exam.end_date,
            payload.start_time,
            payload.end_time,
        )?;

        let set = self.question_set(ctx.tenant_id, exam_id).await?;
        let now = self.clock.now();
        let schedule = ExamSchedule {
            id: Uuid::new_v4(),
            tenant_id: ctx.tenant_id,
            exam_id,
            class_id: payload.class_id,
            subject_id: payload.subject_id,
            teacher_id: payload.teacher_id.unwrap_or(ctx.actor_id),
            start_time: payload.start_time,
            end_time: payload.end_time,
            total_questions: set.items.len() as i32,
            total_score: set.total_points(),
            passing_score: payload.passing_score.unwrap_or(exam.passing_score),
            status: ScheduleStatus::Scheduled,
            created_at: now,
            updated_at: now,
        };
        let schedule = self.store.insert_schedule(schedule).await?;

        if exam.status == ExamStatus::Draft {
            exam.status = ExamStatus::Scheduled;
            exam.updated_at = now;
            self.store.update_exam(exam).await?;
        }
        tracing::info!(schedule_id = %schedule.id, exam_id = %exam_id, "exam scheduled");
        Ok(schedule)
    }

    pub async fn list_schedules(&self, ctx: &TenantContext, exam_id: Uuid) -> Result<Vec<ExamSchedule>> {
        self.get_exam(ctx, exam_id).await?;
        self.store.list_schedules(ctx.tenant_id, exam_id).await
    }

    pub async fn question_set(&self, tenant_id: Uuid, exam_id: Uuid) -> Result<QuestionSet> {
        let items = self.store.list_exam_questions(tenant_id, exam_id).await?;
        let ids: Vec<Uuid> = items.iter().map(|i| i.question_id).collect();
        let questions = self
            .store
            .find_questions(tenant_id, &ids)
            .await?
            .into_iter()
            .map(|q| (q.id, q))
            .collect();
        Ok(QuestionSet { items, questions })
    }

    pub async fn list_exam_questions(
        &self,
        ctx: &TenantContext,
        exam_id: Uuid,
    ) -> Result<Vec<ExamQuestion>> {
        self.get_exam(ctx, exam_id).await?;
        self.store.list_exam_questions(ctx.tenant_id, exam_id).await
    }

    async fn ensure_question_set_mutable(&self, tenant_id: Uuid, exam: &Exam) -> Result<()> {
        if exam.status.is_closed() {
            return Err(Error::InvalidStateTransition {
                entity: "exam",
                from: exam.status.as_str().to_string(),
                to: "question_set_changed".to_string(),
            });
        }
        if self.store.count_exam_attempts(tenant_id, exam.id).await? > 0 {
            return Err(Error::ImmutableAfterAttempts("question set".to_string()));
        }
        Ok(())
    }

    pub async fn add_exam_question(
        &self,
        ctx: &TenantContext,
        exam_id: Uuid,
        payload: AddExamQuestionPayload,
    ) -> Result<ExamQuestion> {
        ctx.require_staff()?;
        let exam = self.get_exam(ctx, exam_id).await?;
        self.ensure_question_set_mutable(ctx.tenant_id, &exam).await?;

        let question = self
            .store
            .find_question(ctx.tenant_id, payload.question_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Question {} not found", payload.question_id)))?;
        if !question.is_active {
            return Err(Error::BadRequest(format!("Question {} is inactive", question.id)));
        }

        let existing = self.store.list_exam_questions(ctx.tenant_id, exam_id).await?;
        let order_index = payload
            .order_index
            .unwrap_or_else(|| next_order_index(&existing));
        let item = self
            .store
            .insert_exam_question(ExamQuestion {
                exam_id,
                question_id: question.id,
                tenant_id: ctx.tenant_id,
                order_index,
                points_override: payload.points_override,
            })
            .await?;
        self.sync_schedule_totals(ctx.tenant_id, exam_id).await?;
        Ok(item)
    }

    /// Appends active bank questions not yet in the exam, in bank order.
    pub async fn add_questions_from_bank(
        &self,
        ctx: &TenantContext,
        exam_id: Uuid,
        payload: AddFromBankPayload,
    ) -> Result<Vec<ExamQuestion>> {
        ctx.require_staff()?;
        let exam = self.get_exam(ctx, exam_id).await?;
        self.ensure_question_set_mutable(ctx.tenant_id, &exam).await?;
        self.store
            .find_bank(ctx.tenant_id, payload.bank_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Question bank {} not found", payload.bank_id)))?;

        let existing = self.store.list_exam_questions(ctx.tenant_id, exam_id).await?;
        let ids = self.store.bank_question_ids(payload.bank_id).await?;
        let mut by_id: HashMap<Uuid, Question> = self
            .store
            .find_questions(ctx.tenant_id, &ids)
            .await?
            .into_iter()
            .map(|q| (q.id, q))
            .collect();

        let limit = payload.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        let mut order_index = next_order_index(&existing);
        let mut added = Vec::new();
        for id in ids {
            if added.len() >= limit {
                break;
            }
            let Some(question) = by_id.remove(&id) else {
                continue;
            };
            if !question.is_active || existing.iter().any(|e| e.question_id == id) {
                continue;
            }
            let item = self
                .store
                .insert_exam_question(ExamQuestion {
                    exam_id,
                    question_id: id,
                    tenant_id: ctx.tenant_id,
                    order_index,
                    points_override: None,
                })
                .await?;
            order_index += 1;
            added.push(item);
        }
        self.sync_schedule_totals(ctx.tenant_id, exam_id).await?;
        tracing::info!(exam_id = %exam_id, bank_id = %payload.bank_id, added = added.len(), "questions added from bank");
        Ok(added)
    }

    pub async fn remove_exam_question(
        &self,
        ctx: &TenantContext,
        exam_id: Uuid,
        question_id: Uuid,
    ) -> Result<()> {
        ctx.require_staff()?;
        let exam = self.get_exam(ctx, exam_id).await?;
        self.ensure_question_set_mutable(ctx.tenant_id, &exam).await?;
        if !self
            .store
            .delete_exam_question(ctx.tenant_id, exam_id, question_id)
            .await?
        {
            return Err(Error::NotFound(format!(
                "Question {} is not part of exam {}",
                question_id, exam_id
            )));
        }
        self.sync_schedule_totals(ctx.tenant_id, exam_id).await
    }

    async fn sync_schedule_totals(&self, tenant_id: Uuid, exam_id: Uuid) -> Result<()> {
        let set = self.question_set(tenant_id, exam_id).await?;
        let total_questions = set.items.len() as i32;
        let total_score = set.total_points();
        let now = self.clock.now();
        for mut schedule in self.store.list_schedules(tenant_id, exam_id).await? {
            if schedule.status.is_closed() {
                continue;
            }
            schedule.total_questions = total_questions;
            schedule.total_score = total_score;
            schedule.updated_at = now;
            self.store.update_schedule(schedule).await?;
        }
        Ok(())
    }

    /// Moves schedules and exams along scheduled -> ongoing -> completed by
    /// wall clock. Returns how many rows changed.
    pub async fn refresh_statuses(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut changed = 0;

        let schedules = self
            .store
            .list_schedules_in_status(&[ScheduleStatus::Scheduled, ScheduleStatus::Ongoing])
            .await?;
        for mut schedule in schedules {
            let next = if now >= schedule.end_time {
                ScheduleStatus::Completed
            } else if now >= schedule.start_time {
                ScheduleStatus::Ongoing
            } else {
                continue;
            };
            if next == schedule.status {
                continue;
            }
            schedule.status = next;
            schedule.updated_at = now;
            self.store.update_schedule(schedule).await?;
            changed += 1;
        }

        let exams = self
            .store
            .list_exams_in_status(&[ExamStatus::Scheduled, ExamStatus::Ongoing])
            .await?;
        for mut exam in exams {
            let next = if now >= exam.end_date {
                ExamStatus::Completed
            } else if now >= exam.start_date {
                ExamStatus::Ongoing
            } else {
                continue;
            };
            if next == exam.status {
                continue;
            }
            tracing::info!(exam_id = %exam.id, from = exam.status.as_str(), to = next.as_str(), "exam status advanced");
            exam.status = next;
            exam.updated_at = now;
            self.store.update_exam(exam).await?;
            changed += 1;
        }

        Ok(changed)
    }

    pub async fn upsert_weight(
        &self,
        ctx: &TenantContext,
        payload: UpsertWeightPayload,
    ) -> Result<ExamWeight> {
        ctx.require_staff()?;
        if payload.weight < Decimal::ZERO || payload.weight > Decimal::ONE_HUNDRED {
            return Err(Error::BadRequest("weight must be between 0 and 100".to_string()));
        }
        let now = self.clock.now();
        self.store
            .upsert_weight(ExamWeight {
                id: Uuid::new_v4(),
                tenant_id: ctx.tenant_id,
                subject_id: payload.subject_id,
                class_id: payload.class_id,
                exam_type: payload.exam_type,
                weight: payload.weight,
                semester: payload.semester.trim().to_string(),
                academic_year: payload.academic_year.trim().to_string(),
                created_at: now,
                updated_at: now,
            })
            .await
    }

    pub async fn validate_weights(
        &self,
        ctx: &TenantContext,
        scope: &WeightScope,
    ) -> Result<WeightValidation> {
        let weights = self.store.list_weights(ctx.tenant_id, scope).await?;
        let total: Decimal = weights.iter().map(|w| w.weight).sum();
        Ok(WeightValidation {
            total,
            is_valid: total == Decimal::ONE_HUNDRED,
            weights,
        })
    }
}

fn next_order_index(existing: &[ExamQuestion]) -> i32 {
    existing
        .iter()
        .map(|e| e.order_index)
        .max()
        .map_or(0, |max| max + 1)
}
