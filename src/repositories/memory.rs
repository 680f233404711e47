use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    AttemptRepository, ExamRepository, GradingRepository, QuestionFilter, QuestionRepository,
    ShareClone, WeightScope,
};
use crate::error::{Error, Result};
use crate::models::{
    exam::{Exam, ExamQuestion, ExamStatus},
    exam_attempt::ExamAttempt,
    exam_schedule::{ExamSchedule, ScheduleStatus},
    exam_weight::ExamWeight,
    grade_conversion::GradeConversion,
    item_analysis::QuestionItemAnalysis,
    question::Question,
    question_bank::QuestionBank,
    question_share::{QuestionShare, ShareStatus},
    stimulus::Stimulus,
};

#[derive(Default)]
struct Tables {
    stimuli: HashMap<Uuid, Stimulus>,
    questions: HashMap<Uuid, Question>,
    banks: HashMap<Uuid, QuestionBank>,
    bank_items: BTreeSet<(Uuid, Uuid)>,
    shares: HashMap<Uuid, QuestionShare>,
    exams: HashMap<Uuid, Exam>,
    exam_questions: Vec<ExamQuestion>,
    schedules: HashMap<Uuid, ExamSchedule>,
    attempts: HashMap<Uuid, ExamAttempt>,
    weights: HashMap<Uuid, ExamWeight>,
    conversions: Vec<GradeConversion>,
    analyses: Vec<QuestionItemAnalysis>,
}

/// Process-local store with the same contract as the Postgres one.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest stored analysis snapshot, for inspection in tests.
    pub async fn stored_item_analyses(&self, exam_id: Uuid) -> Vec<QuestionItemAnalysis> {
        let tables = self.tables.read().await;
        tables
            .analyses
            .iter()
            .filter(|a| a.exam_id == exam_id)
            .cloned()
            .collect()
    }
}

fn not_found(what: &str, id: Uuid) -> Error {
    Error::NotFound(format!("{} {} not found", what, id))
}

#[async_trait]
impl QuestionRepository for MemoryStore {
    async fn insert_stimulus(&self, stimulus: Stimulus) -> Result<Stimulus> {
        let mut tables = self.tables.write().await;
        tables.stimuli.insert(stimulus.id, stimulus.clone());
        Ok(stimulus)
    }

    async fn find_stimulus(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<Stimulus>> {
        let tables = self.tables.read().await;
        Ok(tables
            .stimuli
            .get(&id)
            .filter(|s| s.tenant_id == tenant_id)
            .cloned())
    }

    async fn insert_question(&self, question: Question) -> Result<Question> {
        let mut tables = self.tables.write().await;
        if tables.questions.contains_key(&question.id) {
            return Err(Error::Conflict(format!("question {} already exists", question.id)));
        }
        tables.questions.insert(question.id, question.clone());
        Ok(question)
    }

    async fn find_question(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<Question>> {
        let tables = self.tables.read().await;
        Ok(tables
            .questions
            .get(&id)
            .filter(|q| q.tenant_id == tenant_id)
            .cloned())
    }

    async fn find_questions(&self, tenant_id: Uuid, ids: &[Uuid]) -> Result<Vec<Question>> {
        let tables = self.tables.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| tables.questions.get(id))
            .filter(|q| q.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn list_questions(
        &self,
        tenant_id: Uuid,
        filter: &QuestionFilter,
    ) -> Result<Vec<Question>> {
        let tables = self.tables.read().await;
        let mut items: Vec<Question> = tables
            .questions
            .values()
            .filter(|q| q.tenant_id == tenant_id)
            .filter(|q| filter.include_inactive || q.is_active)
            .filter(|q| filter.question_type.map_or(true, |t| q.question_type == t))
            .filter(|q| {
                filter
                    .bank_id
                    .map_or(true, |b| tables.bank_items.contains(&(b, q.id)))
            })
            .cloned()
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(items)
    }

    async fn update_question(&self, question: Question) -> Result<Question> {
        let mut tables = self.tables.write().await;
        match tables.questions.get_mut(&question.id) {
            Some(existing) if existing.tenant_id == question.tenant_id => {
                *existing = question.clone();
                Ok(question)
            }
            _ => Err(not_found("question", question.id)),
        }
    }

    async fn delete_question(&self, tenant_id: Uuid, id: Uuid) -> Result<()> {
        let mut tables = self.tables.write().await;
        match tables.questions.get(&id) {
            Some(q) if q.tenant_id == tenant_id => {
                tables.questions.remove(&id);
                Ok(())
            }
            _ => Err(not_found("question", id)),
        }
    }

    async fn count_question_references(&self, tenant_id: Uuid, id: Uuid) -> Result<i64> {
        let tables = self.tables.read().await;
        let placements = tables
            .exam_questions
            .iter()
            .filter(|eq| eq.tenant_id == tenant_id && eq.question_id == id)
            .count();
        let memberships = tables.bank_items.iter().filter(|(_, q)| *q == id).count();
        Ok((placements + memberships) as i64)
    }

    async fn insert_bank(&self, bank: QuestionBank) -> Result<QuestionBank> {
        let mut tables = self.tables.write().await;
        tables.banks.insert(bank.id, bank.clone());
        Ok(bank)
    }

    async fn find_bank(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<QuestionBank>> {
        let tables = self.tables.read().await;
        Ok(tables
            .banks
            .get(&id)
            .filter(|b| b.tenant_id == tenant_id)
            .cloned())
    }

    async fn update_bank(&self, bank: QuestionBank) -> Result<QuestionBank> {
        let mut tables = self.tables.write().await;
        match tables.banks.get_mut(&bank.id) {
            Some(existing) if existing.tenant_id == bank.tenant_id => {
                *existing = bank.clone();
                Ok(bank)
            }
            _ => Err(not_found("question bank", bank.id)),
        }
    }

    async fn delete_bank(&self, tenant_id: Uuid, id: Uuid) -> Result<()> {
        let mut tables = self.tables.write().await;
        match tables.banks.get(&id) {
            Some(b) if b.tenant_id == tenant_id => {
                tables.banks.remove(&id);
                tables.bank_items.retain(|(bank, _)| *bank != id);
                Ok(())
            }
            _ => Err(not_found("question bank", id)),
        }
    }

    async fn attach_question(&self, bank_id: Uuid, question_id: Uuid) -> Result<bool> {
        let mut tables = self.tables.write().await;
        Ok(tables.bank_items.insert((bank_id, question_id)))
    }

    async fn detach_question(&self, bank_id: Uuid, question_id: Uuid) -> Result<bool> {
        let mut tables = self.tables.write().await;
        Ok(tables.bank_items.remove(&(bank_id, question_id)))
    }

    async fn bank_question_ids(&self, bank_id: Uuid) -> Result<Vec<Uuid>> {
        let tables = self.tables.read().await;
        let mut ids: Vec<(chrono::DateTime<Utc>, Uuid)> = tables
            .bank_items
            .iter()
            .filter(|(b, _)| *b == bank_id)
            .filter_map(|(_, q)| tables.questions.get(q).map(|q| (q.created_at, q.id)))
            .collect();
        ids.sort();
        Ok(ids.into_iter().map(|(_, id)| id).collect())
    }

    async fn insert_share(&self, share: QuestionShare) -> Result<QuestionShare> {
        let mut tables = self.tables.write().await;
        tables.shares.insert(share.id, share.clone());
        Ok(share)
    }

    async fn find_share(&self, id: Uuid) -> Result<Option<QuestionShare>> {
        let tables = self.tables.read().await;
        Ok(tables.shares.get(&id).cloned())
    }

    async fn resolve_share(
        &self,
        share: QuestionShare,
        clone: Option<ShareClone>,
    ) -> Result<QuestionShare> {
        let mut tables = self.tables.write().await;
        match tables.shares.get(&share.id) {
            Some(stored) if stored.status == ShareStatus::Pending => {}
            Some(stored) => {
                return Err(Error::Conflict(format!(
                    "share {} is already {}",
                    share.id,
                    stored.status.as_str()
                )))
            }
            None => return Err(not_found("question share", share.id)),
        }
        if let Some(clone) = clone {
            if let Some(stimulus) = clone.stimulus {
                tables.stimuli.insert(stimulus.id, stimulus);
            }
            tables.questions.insert(clone.question.id, clone.question);
        }
        tables.shares.insert(share.id, share.clone());
        Ok(share)
    }
}

#[async_trait]
impl ExamRepository for MemoryStore {
    async fn insert_exam(&self, exam: Exam) -> Result<Exam> {
        let mut tables = self.tables.write().await;
        tables.exams.insert(exam.id, exam.clone());
        Ok(exam)
    }

    async fn find_exam(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<Exam>> {
        let tables = self.tables.read().await;
        Ok(tables
            .exams
            .get(&id)
            .filter(|e| e.tenant_id == tenant_id)
            .cloned())
    }

    async fn update_exam(&self, exam: Exam) -> Result<Exam> {
        let mut tables = self.tables.write().await;
        match tables.exams.get_mut(&exam.id) {
            Some(existing) if existing.tenant_id == exam.tenant_id => {
                *existing = exam.clone();
                Ok(exam)
            }
            _ => Err(not_found("exam", exam.id)),
        }
    }

    async fn delete_exam(&self, tenant_id: Uuid, id: Uuid) -> Result<()> {
        let mut tables = self.tables.write().await;
        match tables.exams.get(&id) {
            Some(e) if e.tenant_id == tenant_id => {
                tables.exams.remove(&id);
                tables.exam_questions.retain(|eq| eq.exam_id != id);
                tables.schedules.retain(|_, s| s.exam_id != id);
                tables.conversions.retain(|c| c.exam_id != id);
                tables.analyses.retain(|a| a.exam_id != id);
                Ok(())
            }
            _ => Err(not_found("exam", id)),
        }
    }

    async fn list_exams_in_status(&self, statuses: &[ExamStatus]) -> Result<Vec<Exam>> {
        let tables = self.tables.read().await;
        Ok(tables
            .exams
            .values()
            .filter(|e| statuses.contains(&e.status))
            .cloned()
            .collect())
    }

    async fn insert_schedule(&self, schedule: ExamSchedule) -> Result<ExamSchedule> {
        let mut tables = self.tables.write().await;
        tables.schedules.insert(schedule.id, schedule.clone());
        Ok(schedule)
    }

    async fn find_schedule(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<ExamSchedule>> {
        let tables = self.tables.read().await;
        Ok(tables
            .schedules
            .get(&id)
            .filter(|s| s.tenant_id == tenant_id)
            .cloned())
    }

    async fn list_schedules(&self, tenant_id: Uuid, exam_id: Uuid) -> Result<Vec<ExamSchedule>> {
        let tables = self.tables.read().await;
        let mut items: Vec<ExamSchedule> = tables
            .schedules
            .values()
            .filter(|s| s.tenant_id == tenant_id && s.exam_id == exam_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.start_time.cmp(&b.start_time).then(a.id.cmp(&b.id)));
        Ok(items)
    }

    async fn update_schedule(&self, schedule: ExamSchedule) -> Result<ExamSchedule> {
        let mut tables = self.tables.write().await;
        match tables.schedules.get_mut(&schedule.id) {
            Some(existing) if existing.tenant_id == schedule.tenant_id => {
                *existing = schedule.clone();
                Ok(schedule)
            }
            _ => Err(not_found("exam schedule", schedule.id)),
        }
    }

    async fn list_schedules_in_status(
        &self,
        statuses: &[ScheduleStatus],
    ) -> Result<Vec<ExamSchedule>> {
        let tables = self.tables.read().await;
        Ok(tables
            .schedules
            .values()
            .filter(|s| statuses.contains(&s.status))
            .cloned()
            .collect())
    }

    async fn list_exam_questions(
        &self,
        tenant_id: Uuid,
        exam_id: Uuid,
    ) -> Result<Vec<ExamQuestion>> {
        let tables = self.tables.read().await;
        let mut items: Vec<ExamQuestion> = tables
            .exam_questions
            .iter()
            .filter(|eq| eq.tenant_id == tenant_id && eq.exam_id == exam_id)
            .cloned()
            .collect();
        items.sort_by_key(|eq| (eq.order_index, eq.question_id));
        Ok(items)
    }

    async fn insert_exam_question(&self, item: ExamQuestion) -> Result<ExamQuestion> {
        let mut tables = self.tables.write().await;
        if tables
            .exam_questions
            .iter()
            .any(|eq| eq.exam_id == item.exam_id && eq.question_id == item.question_id)
        {
            return Err(Error::Conflict(format!(
                "question {} is already part of exam {}",
                item.question_id, item.exam_id
            )));
        }
        tables.exam_questions.push(item.clone());
        Ok(item)
    }

    async fn delete_exam_question(
        &self,
        tenant_id: Uuid,
        exam_id: Uuid,
        question_id: Uuid,
    ) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let before = tables.exam_questions.len();
        tables.exam_questions.retain(|eq| {
            !(eq.tenant_id == tenant_id && eq.exam_id == exam_id && eq.question_id == question_id)
        });
        Ok(tables.exam_questions.len() != before)
    }

    async fn upsert_weight(&self, weight: ExamWeight) -> Result<ExamWeight> {
        let mut tables = self.tables.write().await;
        let existing = tables.weights.values_mut().find(|w| {
            w.tenant_id == weight.tenant_id
                && w.subject_id == weight.subject_id
                && w.class_id == weight.class_id
                && w.exam_type == weight.exam_type
                && w.semester == weight.semester
                && w.academic_year == weight.academic_year
        });
        match existing {
            Some(w) => {
                w.weight = weight.weight;
                w.updated_at = weight.updated_at;
                Ok(w.clone())
            }
            None => {
                tables.weights.insert(weight.id, weight.clone());
                Ok(weight)
            }
        }
    }

    async fn list_weights(&self, tenant_id: Uuid, scope: &WeightScope) -> Result<Vec<ExamWeight>> {
        let tables = self.tables.read().await;
        let mut items: Vec<ExamWeight> = tables
            .weights
            .values()
            .filter(|w| {
                w.tenant_id == tenant_id
                    && w.subject_id == scope.subject_id
                    && w.class_id == scope.class_id
                    && w.semester == scope.semester
                    && w.academic_year == scope.academic_year
            })
            .cloned()
            .collect();
        items.sort_by_key(|w| w.exam_type);
        Ok(items)
    }
}

#[async_trait]
impl AttemptRepository for MemoryStore {
    async fn insert_attempt(&self, attempt: ExamAttempt) -> Result<ExamAttempt> {
        let mut tables = self.tables.write().await;
        let taken = tables.attempts.values().any(|a| {
            a.tenant_id == attempt.tenant_id
                && a.exam_id == attempt.exam_id
                && a.student_id == attempt.student_id
                && a.attempt_number == attempt.attempt_number
        });
        if taken {
            return Err(Error::Conflict(format!(
                "attempt number {} already exists for this student",
                attempt.attempt_number
            )));
        }
        tables.attempts.insert(attempt.id, attempt.clone());
        Ok(attempt)
    }

    async fn find_attempt(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<ExamAttempt>> {
        let tables = self.tables.read().await;
        Ok(tables
            .attempts
            .get(&id)
            .filter(|a| a.tenant_id == tenant_id)
            .cloned())
    }

    async fn update_attempt(&self, attempt: ExamAttempt) -> Result<ExamAttempt> {
        let mut tables = self.tables.write().await;
        match tables.attempts.get_mut(&attempt.id) {
            Some(existing) if existing.tenant_id == attempt.tenant_id => {
                *existing = attempt.clone();
                Ok(attempt)
            }
            _ => Err(not_found("attempt", attempt.id)),
        }
    }

    async fn list_student_attempts(
        &self,
        tenant_id: Uuid,
        exam_id: Uuid,
        student_id: Uuid,
    ) -> Result<Vec<ExamAttempt>> {
        let tables = self.tables.read().await;
        let mut items: Vec<ExamAttempt> = tables
            .attempts
            .values()
            .filter(|a| {
                a.tenant_id == tenant_id && a.exam_id == exam_id && a.student_id == student_id
            })
            .cloned()
            .collect();
        items.sort_by_key(|a| a.attempt_number);
        Ok(items)
    }

    async fn list_exam_attempts(
        &self,
        tenant_id: Uuid,
        exam_id: Uuid,
        schedule_id: Option<Uuid>,
    ) -> Result<Vec<ExamAttempt>> {
        let tables = self.tables.read().await;
        let mut items: Vec<ExamAttempt> = tables
            .attempts
            .values()
            .filter(|a| a.tenant_id == tenant_id && a.exam_id == exam_id)
            .filter(|a| schedule_id.map_or(true, |s| a.schedule_id == Some(s)))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.id.cmp(&b.id)));
        Ok(items)
    }

    async fn count_exam_attempts(&self, tenant_id: Uuid, exam_id: Uuid) -> Result<i64> {
        let tables = self.tables.read().await;
        Ok(tables
            .attempts
            .values()
            .filter(|a| a.tenant_id == tenant_id && a.exam_id == exam_id)
            .count() as i64)
    }

    async fn count_question_attempts(&self, tenant_id: Uuid, question_id: Uuid) -> Result<i64> {
        let tables = self.tables.read().await;
        let exams: BTreeSet<Uuid> = tables
            .exam_questions
            .iter()
            .filter(|eq| eq.tenant_id == tenant_id && eq.question_id == question_id)
            .map(|eq| eq.exam_id)
            .collect();
        Ok(tables
            .attempts
            .values()
            .filter(|a| a.tenant_id == tenant_id && exams.contains(&a.exam_id))
            .count() as i64)
    }

    async fn list_attempts_due(&self, now: DateTime<Utc>) -> Result<Vec<ExamAttempt>> {
        let tables = self.tables.read().await;
        Ok(tables
            .attempts
            .values()
            .filter(|a| a.status.is_active() && a.expires_at <= now)
            .cloned()
            .collect())
    }

    async fn list_attempts_idle_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<ExamAttempt>> {
        let tables = self.tables.read().await;
        Ok(tables
            .attempts
            .values()
            .filter(|a| a.status.is_active() && a.last_activity_at < cutoff)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl GradingRepository for MemoryStore {
    async fn insert_grade_conversion(
        &self,
        conversion: GradeConversion,
    ) -> Result<GradeConversion> {
        let mut tables = self.tables.write().await;
        tables.conversions.push(conversion.clone());
        Ok(conversion)
    }

    async fn list_grade_conversions(
        &self,
        tenant_id: Uuid,
        exam_id: Uuid,
    ) -> Result<Vec<GradeConversion>> {
        let tables = self.tables.read().await;
        let mut items: Vec<GradeConversion> = tables
            .conversions
            .iter()
            .filter(|c| c.tenant_id == tenant_id && c.exam_id == exam_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.min_score.cmp(&b.min_score).then(a.id.cmp(&b.id)));
        Ok(items)
    }

    async fn replace_item_analyses(
        &self,
        tenant_id: Uuid,
        exam_id: Uuid,
        schedule_id: Option<Uuid>,
        rows: Vec<QuestionItemAnalysis>,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.analyses.retain(|a| {
            !(a.tenant_id == tenant_id && a.exam_id == exam_id && a.schedule_id == schedule_id)
        });
        tables.analyses.extend(rows);
        Ok(())
    }
}
