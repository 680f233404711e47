use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::dto::attempt_dto::{
    AttemptQuestionView, AttemptReview, AttemptView, GradeEssayPayload, RecordAnswerPayload,
    ReviewItem,
};
use crate::error::{Error, Result};
use crate::middleware::auth::TenantContext;
use crate::models::{
    exam::{Exam, ExamStatus},
    exam_attempt::{AttemptStatus, ExamAttempt},
    exam_schedule::ExamSchedule,
    question::{Question, QuestionType},
};
use crate::repositories::Store;
use crate::services::exam_service::{ExamService, QuestionSet};
use crate::services::scoring_service::ScoringService;
use crate::utils::locks::KeyedLocks;
use crate::utils::shuffle::{attempt_seed, option_seed, seeded_shuffle};
use crate::utils::time::{seconds_between, Clock};

type StudentKey = (Uuid, Uuid, Uuid);

#[derive(Clone)]
pub struct AttemptService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    exams: ExamService,
    attempt_locks: Arc<KeyedLocks<Uuid>>,
    student_locks: Arc<KeyedLocks<StudentKey>>,
}

impl AttemptService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, exams: ExamService) -> Self {
        Self {
            store,
            clock,
            exams,
            attempt_locks: Arc::new(KeyedLocks::new()),
            student_locks: Arc::new(KeyedLocks::new()),
        }
    }

    pub async fn start_attempt(
        &self,
        ctx: &TenantContext,
        exam_id: Uuid,
        schedule_id: Option<Uuid>,
    ) -> Result<AttemptView> {
        let tenant_id = ctx.tenant_id;
        let student_id = ctx.actor_id;
        let now = self.clock.now();

        let exam = self.exams.find_exam(tenant_id, exam_id).await?;
        let schedule = self.resolve_schedule(&exam, schedule_id, now).await?;
        let (opens_at, closes_at) = schedule
            .as_ref()
            .map(|s| (s.start_time, s.end_time))
            .unwrap_or((exam.start_date, exam.end_date));

        if exam.status.is_closed() || exam.status == ExamStatus::Draft {
            return Err(Error::InvalidWindow {
                message: format!("Exam is {}", exam.status.as_str()),
                opens_at,
                closes_at,
            });
        }
        if now < opens_at {
            return Err(Error::InvalidWindow {
                message: "Exam window has not opened yet".to_string(),
                opens_at,
                closes_at,
            });
        }
        if now >= closes_at {
            return Err(Error::InvalidWindow {
                message: "Exam window has closed".to_string(),
                opens_at,
                closes_at,
            });
        }

        let set = self.exams.question_set(tenant_id, exam_id).await?;
        if set.items.is_empty() {
            return Err(Error::BadRequest("Exam has no questions".to_string()));
        }

        let _guard = self
            .student_locks
            .acquire((tenant_id, exam_id, student_id))
            .await;

        let previous = self
            .store
            .list_student_attempts(tenant_id, exam_id, student_id)
            .await?;
        let existing = previous
            .iter()
            .filter(|a| a.status != AttemptStatus::Abandoned)
            .count() as i64;
        if existing >= i64::from(exam.max_attempts) {
            return Err(Error::MaxAttemptsExceeded {
                max_attempts: exam.max_attempts,
                existing,
            });
        }
        let attempt_number = previous
            .iter()
            .map(|a| a.attempt_number)
            .max()
            .unwrap_or(0)
            + 1;

        let seed = attempt_seed(exam_id, student_id, attempt_number);
        let mut question_order: Vec<Uuid> = set.items.iter().map(|i| i.question_id).collect();
        if exam.settings.randomize_questions {
            seeded_shuffle(&mut question_order, seed);
        }
        let mut option_orders = BTreeMap::new();
        if exam.settings.randomize_answers {
            for id in &question_order {
                let Some(question) = set.questions.get(id) else {
                    continue;
                };
                if question.options.is_empty() {
                    continue;
                }
                let mut keys = question.option_keys();
                seeded_shuffle(&mut keys, option_seed(&seed, *id));
                option_orders.insert(*id, keys);
            }
        }

        let expires_at = match exam.duration_minutes {
            Some(minutes) => closes_at.min(now + Duration::minutes(i64::from(minutes))),
            None => closes_at,
        };

        let attempt = ExamAttempt {
            id: Uuid::new_v4(),
            tenant_id,
            exam_id,
            schedule_id: schedule.as_ref().map(|s| s.id),
            student_id,
            attempt_number,
            status: AttemptStatus::Started,
            question_order,
            option_orders,
            answers: BTreeMap::new(),
            manual_scores: BTreeMap::new(),
            started_at: now,
            expires_at,
            submitted_at: None,
            last_activity_at: now,
            time_spent_seconds: None,
            score: None,
            correct_answers: None,
            pending_manual_score: None,
            max_score: None,
            created_at: now,
            updated_at: now,
        };
        let attempt = self.store.insert_attempt(attempt).await?;
        tracing::info!(
            attempt_id = %attempt.id,
            exam_id = %exam_id,
            student_id = %student_id,
            attempt_number,
            "attempt started"
        );
        Ok(build_view(attempt, &set))
    }

    /// The given schedule, or the single open schedule containing `now`.
    async fn resolve_schedule(
        &self,
        exam: &Exam,
        schedule_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<Option<ExamSchedule>> {
        if let Some(schedule_id) = schedule_id {
            let schedule = self
                .store
                .find_schedule(exam.tenant_id, schedule_id)
                .await?
                .filter(|s| s.exam_id == exam.id)
                .ok_or_else(|| Error::NotFound(format!("Schedule {} not found", schedule_id)))?;
            if schedule.status.is_closed() {
                return Err(Error::InvalidWindow {
                    message: format!("Schedule is {}", schedule.status.as_str()),
                    opens_at: schedule.start_time,
                    closes_at: schedule.end_time,
                });
            }
            return Ok(Some(schedule));
        }

        let mut open: Vec<ExamSchedule> = self
            .store
            .list_schedules(exam.tenant_id, exam.id)
            .await?
            .into_iter()
            .filter(|s| !s.status.is_closed() && s.contains(now))
            .collect();
        match open.len() {
            0 => Ok(None),
            1 => Ok(open.pop()),
            n => Err(Error::BadRequest(format!(
                "schedule_id required: {} schedules of exam {} are open",
                n, exam.id
            ))),
        }
    }

    pub async fn get_attempt(&self, ctx: &TenantContext, attempt_id: Uuid) -> Result<AttemptView> {
        let attempt = self.load_visible(ctx, attempt_id).await?;
        let set = self.exams.question_set(attempt.tenant_id, attempt.exam_id).await?;
        Ok(build_view(attempt, &set))
    }

    async fn load(&self, tenant_id: Uuid, attempt_id: Uuid) -> Result<ExamAttempt> {
        self.store
            .find_attempt(tenant_id, attempt_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Attempt {} not found", attempt_id)))
    }

    async fn load_visible(&self, ctx: &TenantContext, attempt_id: Uuid) -> Result<ExamAttempt> {
        let attempt = self.load(ctx.tenant_id, attempt_id).await?;
        if !ctx.is_staff() && attempt.student_id != ctx.actor_id {
            return Err(Error::Forbidden(
                "Students may only access their own attempts".to_string(),
            ));
        }
        Ok(attempt)
    }

    pub async fn record_answer(
        &self,
        ctx: &TenantContext,
        attempt_id: Uuid,
        payload: RecordAnswerPayload,
    ) -> Result<ExamAttempt> {
        let _guard = self.attempt_locks.acquire(attempt_id).await;
        let mut attempt = self.load_visible(ctx, attempt_id).await?;
        if attempt.student_id != ctx.actor_id {
            return Err(Error::Forbidden(
                "Only the attempt owner may answer".to_string(),
            ));
        }
        if !attempt.status.is_active() {
            return Err(Error::InvalidStateTransition {
                entity: "attempt",
                from: attempt.status.as_str().to_string(),
                to: AttemptStatus::InProgress.as_str().to_string(),
            });
        }
        let now = self.clock.now();
        if now >= attempt.expires_at {
            self.finalize(attempt.clone(), AttemptStatus::Timeout, now).await?;
            return Err(expired_error(&attempt));
        }
        if !attempt.question_order.contains(&payload.question_id) {
            return Err(Error::BadRequest(format!(
                "Question {} is not part of this attempt",
                payload.question_id
            )));
        }

        attempt.answers.insert(payload.question_id, payload.answer);
        attempt.status = AttemptStatus::InProgress;
        attempt.last_activity_at = now;
        attempt.updated_at = now;
        self.store.update_attempt(attempt).await
    }

    pub async fn submit_attempt(&self, ctx: &TenantContext, attempt_id: Uuid) -> Result<ExamAttempt> {
        let _guard = self.attempt_locks.acquire(attempt_id).await;
        let attempt = self.load_visible(ctx, attempt_id).await?;
        if !attempt.status.is_active() {
            return Err(Error::AlreadySubmitted {
                attempt_id,
                status: attempt.status.as_str().to_string(),
                score: attempt.score,
            });
        }
        let now = self.clock.now();
        if now >= attempt.expires_at {
            self.finalize(attempt.clone(), AttemptStatus::Timeout, now).await?;
            return Err(expired_error(&attempt));
        }

        let attempt = self.finalize(attempt, AttemptStatus::Completed, now).await?;
        tracing::info!(
            attempt_id = %attempt.id,
            score = ?attempt.score,
            pending_manual_score = ?attempt.pending_manual_score,
            "attempt submitted"
        );
        Ok(attempt)
    }

    /// Scores and closes an active attempt. Caller holds the attempt lock.
    async fn finalize(
        &self,
        mut attempt: ExamAttempt,
        status: AttemptStatus,
        now: DateTime<Utc>,
    ) -> Result<ExamAttempt> {
        let set = self.exams.question_set(attempt.tenant_id, attempt.exam_id).await?;
        let items: Vec<(&Question, i32)> = attempt
            .question_order
            .iter()
            .filter_map(|id| Some((set.questions.get(id)?, set.points(*id)?)))
            .collect();
        let result = ScoringService::score_attempt(&items, &attempt.answers, &attempt.manual_scores);

        let submitted_at = if status == AttemptStatus::Timeout {
            now.min(attempt.expires_at)
        } else {
            now
        };
        attempt.status = status;
        attempt.score = Some(result.score);
        attempt.correct_answers = Some(result.correct_answers);
        attempt.pending_manual_score = Some(result.pending_manual_score);
        attempt.max_score = Some(result.max_score);
        attempt.submitted_at = Some(submitted_at);
        attempt.time_spent_seconds = Some(seconds_between(attempt.started_at, submitted_at));
        attempt.updated_at = now;

        let attempt = self.store.update_attempt(attempt).await?;
        if status == AttemptStatus::Timeout {
            tracing::info!(attempt_id = %attempt.id, score = ?attempt.score, "attempt timed out");
        }
        Ok(attempt)
    }

    /// Times out one attempt if its deadline has passed. Terminal attempts are
    /// returned unchanged.
    pub async fn expire_attempt(&self, tenant_id: Uuid, attempt_id: Uuid) -> Result<ExamAttempt> {
        let _guard = self.attempt_locks.acquire(attempt_id).await;
        let attempt = self.load(tenant_id, attempt_id).await?;
        if !attempt.status.is_active() {
            return Ok(attempt);
        }
        let now = self.clock.now();
        if now < attempt.expires_at {
            return Err(Error::InvalidStateTransition {
                entity: "attempt",
                from: attempt.status.as_str().to_string(),
                to: AttemptStatus::Timeout.as_str().to_string(),
            });
        }
        self.finalize(attempt, AttemptStatus::Timeout, now).await
    }

    pub async fn expire_due_attempts(&self, now: DateTime<Utc>) -> Result<usize> {
        let due = self.store.list_attempts_due(now).await?;
        let mut expired = 0;
        for attempt in due {
            match self.expire_attempt(attempt.tenant_id, attempt.id).await {
                Ok(a) if a.status == AttemptStatus::Timeout => expired += 1,
                Ok(_) => {}
                Err(e) => tracing::warn!(attempt_id = %attempt.id, error = %e, "could not expire attempt"),
            }
        }
        Ok(expired)
    }

    pub async fn abandon_attempt(&self, ctx: &TenantContext, attempt_id: Uuid) -> Result<ExamAttempt> {
        ctx.require_staff()?;
        let _guard = self.attempt_locks.acquire(attempt_id).await;
        let attempt = self.load(ctx.tenant_id, attempt_id).await?;
        self.abandon(attempt, "operator").await
    }

    async fn abandon(&self, mut attempt: ExamAttempt, reason: &str) -> Result<ExamAttempt> {
        if !attempt.status.is_active() {
            return Err(Error::InvalidStateTransition {
                entity: "attempt",
                from: attempt.status.as_str().to_string(),
                to: AttemptStatus::Abandoned.as_str().to_string(),
            });
        }
        let now = self.clock.now();
        attempt.status = AttemptStatus::Abandoned;
        attempt.updated_at = now;
        let attempt = self.store.update_attempt(attempt).await?;
        tracing::info!(attempt_id = %attempt.id, reason, "attempt abandoned");
        Ok(attempt)
    }

    /// Abandons active attempts idle for longer than `idle`. Attempts already
    /// past their deadline are left to `expire_due_attempts`.
    pub async fn abandon_stale_attempts(&self, now: DateTime<Utc>, idle: Duration) -> Result<usize> {
        let cutoff = now - idle;
        let stale = self.store.list_attempts_idle_since(cutoff).await?;
        let mut abandoned = 0;
        for candidate in stale {
            match self.abandon_if_stale(&candidate, cutoff, now).await {
                Ok(true) => abandoned += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(attempt_id = %candidate.id, error = %e, "could not abandon attempt"),
            }
        }
        Ok(abandoned)
    }

    async fn abandon_if_stale(
        &self,
        candidate: &ExamAttempt,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let _guard = self.attempt_locks.acquire(candidate.id).await;
        let attempt = self.load(candidate.tenant_id, candidate.id).await?;
        if !attempt.status.is_active()
            || attempt.last_activity_at >= cutoff
            || attempt.expires_at <= now
        {
            return Ok(false);
        }
        self.abandon(attempt, "stale").await?;
        Ok(true)
    }

    pub async fn grade_essay(
        &self,
        ctx: &TenantContext,
        attempt_id: Uuid,
        payload: GradeEssayPayload,
    ) -> Result<ExamAttempt> {
        ctx.require_staff()?;
        let _guard = self.attempt_locks.acquire(attempt_id).await;
        let mut attempt = self.load(ctx.tenant_id, attempt_id).await?;
        if !attempt.status.is_scored() {
            return Err(Error::InvalidStateTransition {
                entity: "attempt",
                from: attempt.status.as_str().to_string(),
                to: "graded".to_string(),
            });
        }
        if !attempt.question_order.contains(&payload.question_id) {
            return Err(Error::BadRequest(format!(
                "Question {} is not part of this attempt",
                payload.question_id
            )));
        }

        let set = self.exams.question_set(attempt.tenant_id, attempt.exam_id).await?;
        let question = set
            .questions
            .get(&payload.question_id)
            .ok_or_else(|| Error::NotFound(format!("Question {} not found", payload.question_id)))?;
        if question.question_type != QuestionType::Essay {
            return Err(Error::BadRequest(
                "Only essay questions are graded manually".to_string(),
            ));
        }
        let max_points = Decimal::from(set.points(question.id).unwrap_or(question.points));
        if payload.points < Decimal::ZERO || payload.points > max_points {
            return Err(Error::BadRequest(format!(
                "Points must be between 0 and {}",
                max_points
            )));
        }

        attempt.manual_scores.insert(question.id, payload.points);
        let items: Vec<(&Question, i32)> = attempt
            .question_order
            .iter()
            .filter_map(|id| Some((set.questions.get(id)?, set.points(*id)?)))
            .collect();
        let result = ScoringService::score_attempt(&items, &attempt.answers, &attempt.manual_scores);
        attempt.pending_manual_score = Some(result.pending_manual_score);
        attempt.updated_at = self.clock.now();

        let attempt = self.store.update_attempt(attempt).await?;
        tracing::info!(attempt_id = %attempt.id, question_id = %question.id, points = %payload.points, "essay graded");
        Ok(attempt)
    }

    pub async fn attempt_review(&self, ctx: &TenantContext, attempt_id: Uuid) -> Result<AttemptReview> {
        let attempt = self.load_visible(ctx, attempt_id).await?;
        let exam = self.exams.find_exam(attempt.tenant_id, attempt.exam_id).await?;
        if !ctx.is_staff() && !exam.settings.allow_review {
            return Err(Error::Forbidden("Review is disabled for this exam".to_string()));
        }
        if attempt.status.is_active() {
            return Err(Error::InvalidStateTransition {
                entity: "attempt",
                from: attempt.status.as_str().to_string(),
                to: "reviewed".to_string(),
            });
        }
        let reveal = ctx.is_staff() || exam.settings.show_correct_answers;

        let set = self.exams.question_set(attempt.tenant_id, attempt.exam_id).await?;
        let mut items = Vec::with_capacity(attempt.question_order.len());
        for id in &attempt.question_order {
            let (Some(question), Some(points)) = (set.questions.get(id), set.points(*id)) else {
                continue;
            };
            let answer = attempt.answers.get(id);
            let scored = ScoringService::score_item(question, points, answer);
            let points_awarded = attempt
                .manual_scores
                .get(id)
                .copied()
                .unwrap_or(scored.points_awarded);
            items.push(ReviewItem {
                question_id: *id,
                question_type: question.question_type,
                content: question.content.clone(),
                answer: answer.cloned(),
                outcome: scored.outcome,
                points_awarded,
                max_points: scored.max_points,
                correct_answer: reveal.then(|| question.correct_answer.clone()).flatten(),
                explanation: reveal.then(|| question.explanation.clone()).flatten(),
            });
        }

        Ok(AttemptReview {
            attempt_id: attempt.id,
            status: attempt.status,
            submitted_at: attempt.submitted_at,
            score: attempt.score,
            pending_manual_score: attempt.pending_manual_score,
            max_score: attempt.max_score,
            total_score: attempt.total_score(),
            items,
        })
    }
}

fn expired_error(attempt: &ExamAttempt) -> Error {
    Error::InvalidWindow {
        message: "Attempt time limit has passed".to_string(),
        opens_at: attempt.started_at,
        closes_at: attempt.expires_at,
    }
}

/// Presents the attempt's stored order; never re-derives it.
fn build_view(attempt: ExamAttempt, set: &QuestionSet) -> AttemptView {
    let questions = attempt
        .question_order
        .iter()
        .filter_map(|id| {
            let question = set.questions.get(id)?;
            let mut options = question.options.clone();
            if let Some(order) = attempt.option_orders.get(id) {
                options.sort_by_key(|o| order.iter().position(|k| *k == o.key));
            }
            Some(AttemptQuestionView {
                question_id: *id,
                question_type: question.question_type,
                content: question.content.clone(),
                options,
                points: set.points(*id)?,
                stimulus_id: question.stimulus_id,
            })
        })
        .collect();
    AttemptView { attempt, questions }
}
