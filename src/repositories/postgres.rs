use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::Json, PgPool};
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

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn not_found(what: &str, id: Uuid) -> Error {
    Error::NotFound(format!("{} {} not found", what, id))
}

const INSERT_STIMULUS: &str = r#"
    INSERT INTO stimuli (id, tenant_id, title, content_type, content, file_url, created_by, created_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
    RETURNING *
"#;

const INSERT_QUESTION: &str = r#"
    INSERT INTO questions (
        id, tenant_id, question_type, content, options, correct_answer, explanation,
        points, difficulty_level, stimulus_id, subject_id, created_by, is_active,
        created_at, updated_at
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
    RETURNING *
"#;

#[async_trait]
impl QuestionRepository for PgStore {
    async fn insert_stimulus(&self, stimulus: Stimulus) -> Result<Stimulus> {
        let row = sqlx::query_as::<_, Stimulus>(INSERT_STIMULUS)
            .bind(stimulus.id)
            .bind(stimulus.tenant_id)
            .bind(&stimulus.title)
            .bind(stimulus.content_type)
            .bind(&stimulus.content)
            .bind(&stimulus.file_url)
            .bind(stimulus.created_by)
            .bind(stimulus.created_at)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    async fn find_stimulus(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<Stimulus>> {
        let row = sqlx::query_as::<_, Stimulus>(
            r#"SELECT * FROM stimuli WHERE id = $1 AND tenant_id = $2"#,
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn insert_question(&self, question: Question) -> Result<Question> {
        let row = sqlx::query_as::<_, Question>(INSERT_QUESTION)
            .bind(question.id)
            .bind(question.tenant_id)
            .bind(question.question_type)
            .bind(&question.content)
            .bind(Json(&question.options))
            .bind(Json(&question.correct_answer))
            .bind(&question.explanation)
            .bind(question.points)
            .bind(question.difficulty_level)
            .bind(question.stimulus_id)
            .bind(question.subject_id)
            .bind(question.created_by)
            .bind(question.is_active)
            .bind(question.created_at)
            .bind(question.updated_at)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    async fn find_question(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<Question>> {
        let row = sqlx::query_as::<_, Question>(
            r#"SELECT * FROM questions WHERE id = $1 AND tenant_id = $2"#,
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_questions(&self, tenant_id: Uuid, ids: &[Uuid]) -> Result<Vec<Question>> {
        let rows = sqlx::query_as::<_, Question>(
            r#"SELECT * FROM questions WHERE tenant_id = $1 AND id = ANY($2)"#,
        )
        .bind(tenant_id)
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_questions(
        &self,
        tenant_id: Uuid,
        filter: &QuestionFilter,
    ) -> Result<Vec<Question>> {
        let rows = sqlx::query_as::<_, Question>(
            r#"
            SELECT q.* FROM questions q
            WHERE q.tenant_id = $1
              AND ($2 OR q.is_active)
              AND ($3::question_type IS NULL OR q.question_type = $3)
              AND ($4::uuid IS NULL OR EXISTS (
                    SELECT 1 FROM question_bank_items bi
                    WHERE bi.bank_id = $4 AND bi.question_id = q.id))
            ORDER BY q.created_at, q.id
            "#,
        )
        .bind(tenant_id)
        .bind(filter.include_inactive)
        .bind(filter.question_type)
        .bind(filter.bank_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn update_question(&self, question: Question) -> Result<Question> {
        sqlx::query_as::<_, Question>(
            r#"
            UPDATE questions SET
                content = $3, options = $4, correct_answer = $5, explanation = $6,
                points = $7, difficulty_level = $8, stimulus_id = $9, subject_id = $10,
                is_active = $11, updated_at = $12
            WHERE id = $1 AND tenant_id = $2
            RETURNING *
            "#,
        )
        .bind(question.id)
        .bind(question.tenant_id)
        .bind(&question.content)
        .bind(Json(&question.options))
        .bind(Json(&question.correct_answer))
        .bind(&question.explanation)
        .bind(question.points)
        .bind(question.difficulty_level)
        .bind(question.stimulus_id)
        .bind(question.subject_id)
        .bind(question.is_active)
        .bind(question.updated_at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| not_found("question", question.id))
    }

    async fn delete_question(&self, tenant_id: Uuid, id: Uuid) -> Result<()> {
        let result = sqlx::query(r#"DELETE FROM questions WHERE id = $1 AND tenant_id = $2"#)
            .bind(id)
            .bind(tenant_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(not_found("question", id));
        }
        Ok(())
    }

    async fn count_question_references(&self, tenant_id: Uuid, id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT
                (SELECT COUNT(*) FROM exam_questions WHERE tenant_id = $1 AND question_id = $2)
              + (SELECT COUNT(*) FROM question_bank_items WHERE question_id = $2)
            "#,
        )
        .bind(tenant_id)
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn insert_bank(&self, bank: QuestionBank) -> Result<QuestionBank> {
        let row = sqlx::query_as::<_, QuestionBank>(
            r#"
            INSERT INTO question_banks (
                id, tenant_id, name, description, subject_id, class_id, is_shared,
                created_by, is_active, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(bank.id)
        .bind(bank.tenant_id)
        .bind(&bank.name)
        .bind(&bank.description)
        .bind(bank.subject_id)
        .bind(bank.class_id)
        .bind(bank.is_shared)
        .bind(bank.created_by)
        .bind(bank.is_active)
        .bind(bank.created_at)
        .bind(bank.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_bank(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<QuestionBank>> {
        let row = sqlx::query_as::<_, QuestionBank>(
            r#"SELECT * FROM question_banks WHERE id = $1 AND tenant_id = $2"#,
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn update_bank(&self, bank: QuestionBank) -> Result<QuestionBank> {
        sqlx::query_as::<_, QuestionBank>(
            r#"
            UPDATE question_banks SET
                name = $3, description = $4, subject_id = $5, class_id = $6,
                is_shared = $7, is_active = $8, updated_at = $9
            WHERE id = $1 AND tenant_id = $2
            RETURNING *
            "#,
        )
        .bind(bank.id)
        .bind(bank.tenant_id)
        .bind(&bank.name)
        .bind(&bank.description)
        .bind(bank.subject_id)
        .bind(bank.class_id)
        .bind(bank.is_shared)
        .bind(bank.is_active)
        .bind(bank.updated_at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| not_found("question bank", bank.id))
    }

    async fn delete_bank(&self, tenant_id: Uuid, id: Uuid) -> Result<()> {
        let result =
            sqlx::query(r#"DELETE FROM question_banks WHERE id = $1 AND tenant_id = $2"#)
                .bind(id)
                .bind(tenant_id)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(not_found("question bank", id));
        }
        Ok(())
    }

    async fn attach_question(&self, bank_id: Uuid, question_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO question_bank_items (bank_id, question_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(bank_id)
        .bind(question_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn detach_question(&self, bank_id: Uuid, question_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"DELETE FROM question_bank_items WHERE bank_id = $1 AND question_id = $2"#,
        )
        .bind(bank_id)
        .bind(question_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn bank_question_ids(&self, bank_id: Uuid) -> Result<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT q.id FROM question_bank_items bi
            JOIN questions q ON q.id = bi.question_id
            WHERE bi.bank_id = $1
            ORDER BY q.created_at, q.id
            "#,
        )
        .bind(bank_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn insert_share(&self, share: QuestionShare) -> Result<QuestionShare> {
        let row = sqlx::query_as::<_, QuestionShare>(
            r#"
            INSERT INTO question_shares (
                id, question_id, from_teacher_id, to_teacher_id, from_tenant_id, to_tenant_id,
                share_type, status, message, cloned_question_id, resolved_at, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(share.id)
        .bind(share.question_id)
        .bind(share.from_teacher_id)
        .bind(share.to_teacher_id)
        .bind(share.from_tenant_id)
        .bind(share.to_tenant_id)
        .bind(share.share_type)
        .bind(share.status)
        .bind(&share.message)
        .bind(share.cloned_question_id)
        .bind(share.resolved_at)
        .bind(share.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_share(&self, id: Uuid) -> Result<Option<QuestionShare>> {
        let row = sqlx::query_as::<_, QuestionShare>(
            r#"SELECT * FROM question_shares WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn resolve_share(
        &self,
        share: QuestionShare,
        clone: Option<ShareClone>,
    ) -> Result<QuestionShare> {
        let mut tx = self.pool.begin().await?;

        let current: Option<ShareStatus> = sqlx::query_scalar(
            r#"SELECT status FROM question_shares WHERE id = $1 FOR UPDATE"#,
        )
        .bind(share.id)
        .fetch_optional(&mut *tx)
        .await?;
        match current {
            Some(ShareStatus::Pending) => {}
            Some(status) => {
                return Err(Error::Conflict(format!(
                    "share {} is already {}",
                    share.id,
                    status.as_str()
                )))
            }
            None => return Err(not_found("question share", share.id)),
        }

        if let Some(clone) = clone {
            if let Some(stimulus) = clone.stimulus {
                sqlx::query(INSERT_STIMULUS)
                    .bind(stimulus.id)
                    .bind(stimulus.tenant_id)
                    .bind(&stimulus.title)
                    .bind(stimulus.content_type)
                    .bind(&stimulus.content)
                    .bind(&stimulus.file_url)
                    .bind(stimulus.created_by)
                    .bind(stimulus.created_at)
                    .execute(&mut *tx)
                    .await?;
            }
            let question = clone.question;
            sqlx::query(INSERT_QUESTION)
                .bind(question.id)
                .bind(question.tenant_id)
                .bind(question.question_type)
                .bind(&question.content)
                .bind(Json(&question.options))
                .bind(Json(&question.correct_answer))
                .bind(&question.explanation)
                .bind(question.points)
                .bind(question.difficulty_level)
                .bind(question.stimulus_id)
                .bind(question.subject_id)
                .bind(question.created_by)
                .bind(question.is_active)
                .bind(question.created_at)
                .bind(question.updated_at)
                .execute(&mut *tx)
                .await?;
        }

        let row = sqlx::query_as::<_, QuestionShare>(
            r#"
            UPDATE question_shares
            SET status = $2, cloned_question_id = $3, resolved_at = $4
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(share.id)
        .bind(share.status)
        .bind(share.cloned_question_id)
        .bind(share.resolved_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row)
    }
}

#[async_trait]
impl ExamRepository for PgStore {
    async fn insert_exam(&self, exam: Exam) -> Result<Exam> {
        let row = sqlx::query_as::<_, Exam>(
            r#"
            INSERT INTO exams (
                id, tenant_id, title, description, exam_type, subject_id, class_id,
                start_date, end_date, registration_deadline, duration_minutes, status,
                settings, max_attempts, passing_score, created_by, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            RETURNING *
            "#,
        )
        .bind(exam.id)
        .bind(exam.tenant_id)
        .bind(&exam.title)
        .bind(&exam.description)
        .bind(exam.exam_type)
        .bind(exam.subject_id)
        .bind(exam.class_id)
        .bind(exam.start_date)
        .bind(exam.end_date)
        .bind(exam.registration_deadline)
        .bind(exam.duration_minutes)
        .bind(exam.status)
        .bind(Json(&exam.settings))
        .bind(exam.max_attempts)
        .bind(exam.passing_score)
        .bind(exam.created_by)
        .bind(exam.created_at)
        .bind(exam.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_exam(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<Exam>> {
        let row = sqlx::query_as::<_, Exam>(
            r#"SELECT * FROM exams WHERE id = $1 AND tenant_id = $2"#,
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn update_exam(&self, exam: Exam) -> Result<Exam> {
        sqlx::query_as::<_, Exam>(
            r#"
            UPDATE exams SET
                title = $3, description = $4, exam_type = $5, subject_id = $6, class_id = $7,
                start_date = $8, end_date = $9, registration_deadline = $10,
                duration_minutes = $11, status = $12, settings = $13, max_attempts = $14,
                passing_score = $15, updated_at = $16
            WHERE id = $1 AND tenant_id = $2
            RETURNING *
            "#,
        )
        .bind(exam.id)
        .bind(exam.tenant_id)
        .bind(&exam.title)
        .bind(&exam.description)
        .bind(exam.exam_type)
        .bind(exam.subject_id)
        .bind(exam.class_id)
        .bind(exam.start_date)
        .bind(exam.end_date)
        .bind(exam.registration_deadline)
        .bind(exam.duration_minutes)
        .bind(exam.status)
        .bind(Json(&exam.settings))
        .bind(exam.max_attempts)
        .bind(exam.passing_score)
        .bind(exam.updated_at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| not_found("exam", exam.id))
    }

    async fn delete_exam(&self, tenant_id: Uuid, id: Uuid) -> Result<()> {
        let result = sqlx::query(r#"DELETE FROM exams WHERE id = $1 AND tenant_id = $2"#)
            .bind(id)
            .bind(tenant_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(not_found("exam", id));
        }
        Ok(())
    }

    async fn list_exams_in_status(&self, statuses: &[ExamStatus]) -> Result<Vec<Exam>> {
        let names: Vec<&str> = statuses.iter().map(|s| s.as_str()).collect();
        let rows = sqlx::query_as::<_, Exam>(
            r#"SELECT * FROM exams WHERE status::text = ANY($1)"#,
        )
        .bind(&names)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn insert_schedule(&self, schedule: ExamSchedule) -> Result<ExamSchedule> {
        let row = sqlx::query_as::<_, ExamSchedule>(
            r#"
            INSERT INTO exam_schedules (
                id, tenant_id, exam_id, class_id, subject_id, teacher_id, start_time, end_time,
                total_questions, total_score, passing_score, status, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING *
            "#,
        )
        .bind(schedule.id)
        .bind(schedule.tenant_id)
        .bind(schedule.exam_id)
        .bind(schedule.class_id)
        .bind(schedule.subject_id)
        .bind(schedule.teacher_id)
        .bind(schedule.start_time)
        .bind(schedule.end_time)
        .bind(schedule.total_questions)
        .bind(schedule.total_score)
        .bind(schedule.passing_score)
        .bind(schedule.status)
        .bind(schedule.created_at)
        .bind(schedule.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_schedule(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<ExamSchedule>> {
        let row = sqlx::query_as::<_, ExamSchedule>(
            r#"SELECT * FROM exam_schedules WHERE id = $1 AND tenant_id = $2"#,
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_schedules(&self, tenant_id: Uuid, exam_id: Uuid) -> Result<Vec<ExamSchedule>> {
        let rows = sqlx::query_as::<_, ExamSchedule>(
            r#"
            SELECT * FROM exam_schedules
            WHERE tenant_id = $1 AND exam_id = $2
            ORDER BY start_time, id
            "#,
        )
        .bind(tenant_id)
        .bind(exam_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn update_schedule(&self, schedule: ExamSchedule) -> Result<ExamSchedule> {
        sqlx::query_as::<_, ExamSchedule>(
            r#"
            UPDATE exam_schedules SET
                start_time = $3, end_time = $4, total_questions = $5, total_score = $6,
                passing_score = $7, status = $8, updated_at = $9
            WHERE id = $1 AND tenant_id = $2
            RETURNING *
            "#,
        )
        .bind(schedule.id)
        .bind(schedule.tenant_id)
        .bind(schedule.start_time)
        .bind(schedule.end_time)
        .bind(schedule.total_questions)
        .bind(schedule.total_score)
        .bind(schedule.passing_score)
        .bind(schedule.status)
        .bind(schedule.updated_at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| not_found("exam schedule", schedule.id))
    }

    async fn list_schedules_in_status(
        &self,
        statuses: &[ScheduleStatus],
    ) -> Result<Vec<ExamSchedule>> {
        let names: Vec<&str> = statuses.iter().map(|s| s.as_str()).collect();
        let rows = sqlx::query_as::<_, ExamSchedule>(
            r#"SELECT * FROM exam_schedules WHERE status::text = ANY($1)"#,
        )
        .bind(&names)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_exam_questions(
        &self,
        tenant_id: Uuid,
        exam_id: Uuid,
    ) -> Result<Vec<ExamQuestion>> {
        let rows = sqlx::query_as::<_, ExamQuestion>(
            r#"
            SELECT * FROM exam_questions
            WHERE tenant_id = $1 AND exam_id = $2
            ORDER BY order_index, question_id
            "#,
        )
        .bind(tenant_id)
        .bind(exam_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn insert_exam_question(&self, item: ExamQuestion) -> Result<ExamQuestion> {
        let row = sqlx::query_as::<_, ExamQuestion>(
            r#"
            INSERT INTO exam_questions (exam_id, question_id, tenant_id, order_index, points_override)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(item.exam_id)
        .bind(item.question_id)
        .bind(item.tenant_id)
        .bind(item.order_index)
        .bind(item.points_override)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete_exam_question(
        &self,
        tenant_id: Uuid,
        exam_id: Uuid,
        question_id: Uuid,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"DELETE FROM exam_questions WHERE tenant_id = $1 AND exam_id = $2 AND question_id = $3"#,
        )
        .bind(tenant_id)
        .bind(exam_id)
        .bind(question_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn upsert_weight(&self, weight: ExamWeight) -> Result<ExamWeight> {
        let row = sqlx::query_as::<_, ExamWeight>(
            r#"
            INSERT INTO exam_weights (
                id, tenant_id, subject_id, class_id, exam_type, weight, semester,
                academic_year, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (tenant_id, subject_id, class_id, exam_type, semester, academic_year)
            DO UPDATE SET weight = EXCLUDED.weight, updated_at = EXCLUDED.updated_at
            RETURNING *
            "#,
        )
        .bind(weight.id)
        .bind(weight.tenant_id)
        .bind(weight.subject_id)
        .bind(weight.class_id)
        .bind(weight.exam_type)
        .bind(weight.weight)
        .bind(&weight.semester)
        .bind(&weight.academic_year)
        .bind(weight.created_at)
        .bind(weight.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_weights(&self, tenant_id: Uuid, scope: &WeightScope) -> Result<Vec<ExamWeight>> {
        let rows = sqlx::query_as::<_, ExamWeight>(
            r#"
            SELECT * FROM exam_weights
            WHERE tenant_id = $1 AND subject_id = $2 AND class_id = $3
              AND semester = $4 AND academic_year = $5
            ORDER BY exam_type
            "#,
        )
        .bind(tenant_id)
        .bind(scope.subject_id)
        .bind(scope.class_id)
        .bind(&scope.semester)
        .bind(&scope.academic_year)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl AttemptRepository for PgStore {
    async fn insert_attempt(&self, attempt: ExamAttempt) -> Result<ExamAttempt> {
        let row = sqlx::query_as::<_, ExamAttempt>(
            r#"
            INSERT INTO exam_attempts (
                id, tenant_id, exam_id, schedule_id, student_id, attempt_number, status,
                question_order, option_orders, answers, manual_scores, started_at, expires_at,
                submitted_at, last_activity_at, time_spent_seconds, score, correct_answers,
                pending_manual_score, max_score, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                $17, $18, $19, $20, $21, $22
            )
            RETURNING *
            "#,
        )
        .bind(attempt.id)
        .bind(attempt.tenant_id)
        .bind(attempt.exam_id)
        .bind(attempt.schedule_id)
        .bind(attempt.student_id)
        .bind(attempt.attempt_number)
        .bind(attempt.status)
        .bind(Json(&attempt.question_order))
        .bind(Json(&attempt.option_orders))
        .bind(Json(&attempt.answers))
        .bind(Json(&attempt.manual_scores))
        .bind(attempt.started_at)
        .bind(attempt.expires_at)
        .bind(attempt.submitted_at)
        .bind(attempt.last_activity_at)
        .bind(attempt.time_spent_seconds)
        .bind(attempt.score)
        .bind(attempt.correct_answers)
        .bind(attempt.pending_manual_score)
        .bind(attempt.max_score)
        .bind(attempt.created_at)
        .bind(attempt.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_attempt(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<ExamAttempt>> {
        let row = sqlx::query_as::<_, ExamAttempt>(
            r#"SELECT * FROM exam_attempts WHERE id = $1 AND tenant_id = $2"#,
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn update_attempt(&self, attempt: ExamAttempt) -> Result<ExamAttempt> {
        sqlx::query_as::<_, ExamAttempt>(
            r#"
            UPDATE exam_attempts SET
                status = $3, answers = $4, manual_scores = $5, submitted_at = $6,
                last_activity_at = $7, time_spent_seconds = $8, score = $9,
                correct_answers = $10, pending_manual_score = $11, max_score = $12,
                updated_at = $13
            WHERE id = $1 AND tenant_id = $2
            RETURNING *
            "#,
        )
        .bind(attempt.id)
        .bind(attempt.tenant_id)
        .bind(attempt.status)
        .bind(Json(&attempt.answers))
        .bind(Json(&attempt.manual_scores))
        .bind(attempt.submitted_at)
        .bind(attempt.last_activity_at)
        .bind(attempt.time_spent_seconds)
        .bind(attempt.score)
        .bind(attempt.correct_answers)
        .bind(attempt.pending_manual_score)
        .bind(attempt.max_score)
        .bind(attempt.updated_at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| not_found("attempt", attempt.id))
    }

    async fn list_student_attempts(
        &self,
        tenant_id: Uuid,
        exam_id: Uuid,
        student_id: Uuid,
    ) -> Result<Vec<ExamAttempt>> {
        let rows = sqlx::query_as::<_, ExamAttempt>(
            r#"
            SELECT * FROM exam_attempts
            WHERE tenant_id = $1 AND exam_id = $2 AND student_id = $3
            ORDER BY attempt_number
            "#,
        )
        .bind(tenant_id)
        .bind(exam_id)
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_exam_attempts(
        &self,
        tenant_id: Uuid,
        exam_id: Uuid,
        schedule_id: Option<Uuid>,
    ) -> Result<Vec<ExamAttempt>> {
        let rows = sqlx::query_as::<_, ExamAttempt>(
            r#"
            SELECT * FROM exam_attempts
            WHERE tenant_id = $1 AND exam_id = $2
              AND ($3::uuid IS NULL OR schedule_id = $3)
            ORDER BY started_at, id
            "#,
        )
        .bind(tenant_id)
        .bind(exam_id)
        .bind(schedule_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn count_exam_attempts(&self, tenant_id: Uuid, exam_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM exam_attempts WHERE tenant_id = $1 AND exam_id = $2"#,
        )
        .bind(tenant_id)
        .bind(exam_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn count_question_attempts(&self, tenant_id: Uuid, question_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM exam_attempts a
            JOIN exam_questions eq ON eq.exam_id = a.exam_id AND eq.tenant_id = a.tenant_id
            WHERE a.tenant_id = $1 AND eq.question_id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(question_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn list_attempts_due(&self, now: DateTime<Utc>) -> Result<Vec<ExamAttempt>> {
        let rows = sqlx::query_as::<_, ExamAttempt>(
            r#"
            SELECT * FROM exam_attempts
            WHERE status IN ('started', 'in_progress') AND expires_at <= $1
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_attempts_idle_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<ExamAttempt>> {
        let rows = sqlx::query_as::<_, ExamAttempt>(
            r#"
            SELECT * FROM exam_attempts
            WHERE status IN ('started', 'in_progress') AND last_activity_at < $1
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl GradingRepository for PgStore {
    async fn insert_grade_conversion(
        &self,
        conversion: GradeConversion,
    ) -> Result<GradeConversion> {
        let row = sqlx::query_as::<_, GradeConversion>(
            r#"
            INSERT INTO grade_conversions (
                id, tenant_id, exam_id, subject_id, class_id, student_id, scope,
                min_score, max_score, grade, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(conversion.id)
        .bind(conversion.tenant_id)
        .bind(conversion.exam_id)
        .bind(conversion.subject_id)
        .bind(conversion.class_id)
        .bind(conversion.student_id)
        .bind(conversion.scope)
        .bind(conversion.min_score)
        .bind(conversion.max_score)
        .bind(&conversion.grade)
        .bind(conversion.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_grade_conversions(
        &self,
        tenant_id: Uuid,
        exam_id: Uuid,
    ) -> Result<Vec<GradeConversion>> {
        let rows = sqlx::query_as::<_, GradeConversion>(
            r#"
            SELECT * FROM grade_conversions
            WHERE tenant_id = $1 AND exam_id = $2
            ORDER BY min_score, id
            "#,
        )
        .bind(tenant_id)
        .bind(exam_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn replace_item_analyses(
        &self,
        tenant_id: Uuid,
        exam_id: Uuid,
        schedule_id: Option<Uuid>,
        rows: Vec<QuestionItemAnalysis>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            DELETE FROM question_item_analyses
            WHERE tenant_id = $1 AND exam_id = $2 AND schedule_id IS NOT DISTINCT FROM $3
            "#,
        )
        .bind(tenant_id)
        .bind(exam_id)
        .bind(schedule_id)
        .execute(&mut *tx)
        .await?;

        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO question_item_analyses (
                    tenant_id, exam_id, schedule_id, question_id, total_attempts,
                    correct_answers, incorrect_answers, blank_answers, pending_answers,
                    difficulty_index, discrimination_index, option_statistics,
                    top_group_stats, bottom_group_stats, quality, analyzed_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
                "#,
            )
            .bind(row.tenant_id)
            .bind(row.exam_id)
            .bind(row.schedule_id)
            .bind(row.question_id)
            .bind(row.total_attempts)
            .bind(row.correct_answers)
            .bind(row.incorrect_answers)
            .bind(row.blank_answers)
            .bind(row.pending_answers)
            .bind(row.difficulty_index)
            .bind(row.discrimination_index)
            .bind(Json(&row.option_statistics))
            .bind(Json(&row.top_group_stats))
            .bind(Json(&row.bottom_group_stats))
            .bind(row.quality)
            .bind(row.analyzed_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
