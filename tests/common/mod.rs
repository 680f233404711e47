#![allow(dead_code)]

use std::sync::Arc;

use assessment_backend::{
    dto::{
        exam_dto::{AddExamQuestionPayload, CreateExamPayload, CreateSchedulePayload},
        question_dto::CreateQuestionPayload,
    },
    middleware::auth::{Role, TenantContext},
    models::{
        exam::{Exam, ExamSettings, ExamType},
        exam_schedule::ExamSchedule,
        question::{CorrectAnswer, Question, QuestionOption, QuestionType},
    },
    repositories::MemoryStore,
    utils::time::{Clock, ManualClock},
    AppState,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

pub const JWT_SECRET: &str = "test_secret_key";

pub struct Harness {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub clock: ManualClock,
    pub tenant_id: Uuid,
    pub teacher: TenantContext,
    pub class_id: Uuid,
    pub subject_id: Uuid,
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 9, 1, 8, 0, 0).unwrap()
}

pub fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let clock = ManualClock::new(start_time());
    let state = AppState::new(store.clone(), Arc::new(clock.clone()), JWT_SECRET);
    let tenant_id = Uuid::new_v4();
    Harness {
        state,
        store,
        clock,
        tenant_id,
        teacher: TenantContext::new(tenant_id, Uuid::new_v4(), Role::Teacher),
        class_id: Uuid::new_v4(),
        subject_id: Uuid::new_v4(),
    }
}

impl Harness {
    pub fn clock_now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn student(&self) -> TenantContext {
        TenantContext::new(self.tenant_id, Uuid::new_v4(), Role::Student)
    }

    pub async fn multiple_choice(&self, points: i32) -> Question {
        self.state
            .question_service
            .create_question(
                &self.teacher,
                question_payload(
                    QuestionType::MultipleChoice,
                    options(&["a", "b", "c", "d"]),
                    Some(CorrectAnswer::Choice("a".into())),
                    points,
                ),
            )
            .await
            .unwrap()
    }

    pub async fn true_false(&self, points: i32) -> Question {
        self.state
            .question_service
            .create_question(
                &self.teacher,
                question_payload(
                    QuestionType::TrueFalse,
                    Vec::new(),
                    Some(CorrectAnswer::Boolean(true)),
                    points,
                ),
            )
            .await
            .unwrap()
    }

    pub async fn essay(&self, points: i32) -> Question {
        self.state
            .question_service
            .create_question(
                &self.teacher,
                question_payload(QuestionType::Essay, Vec::new(), None, points),
            )
            .await
            .unwrap()
    }

    /// Exam open from one hour ago for four hours, with the given settings.
    pub async fn exam(&self, settings: ExamSettings, max_attempts: i32) -> Exam {
        let now = start_time();
        self.state
            .exam_service
            .create_exam(
                &self.teacher,
                CreateExamPayload {
                    title: "Unit test".into(),
                    description: None,
                    exam_type: ExamType::Quiz,
                    subject_id: Some(self.subject_id),
                    class_id: Some(self.class_id),
                    start_date: now - Duration::hours(1),
                    end_date: now + Duration::hours(3),
                    registration_deadline: None,
                    duration_minutes: Some(60),
                    settings,
                    max_attempts,
                    passing_score: Decimal::from(2),
                },
            )
            .await
            .unwrap()
    }

    pub async fn add(&self, exam: &Exam, question: &Question) {
        self.state
            .exam_service
            .add_exam_question(
                &self.teacher,
                exam.id,
                AddExamQuestionPayload {
                    question_id: question.id,
                    order_index: None,
                    points_override: None,
                },
            )
            .await
            .unwrap();
    }

    pub async fn schedule(&self, exam: &Exam) -> ExamSchedule {
        let now = start_time();
        self.state
            .exam_service
            .create_schedule(
                &self.teacher,
                exam.id,
                CreateSchedulePayload {
                    class_id: self.class_id,
                    subject_id: self.subject_id,
                    teacher_id: None,
                    start_time: now - Duration::minutes(30),
                    end_time: now + Duration::hours(2),
                    passing_score: None,
                },
            )
            .await
            .unwrap()
    }

    /// A scheduled exam with one multiple choice (2 pts), one true/false
    /// (1 pt) and one essay (5 pts) question.
    pub async fn ready_exam(&self, settings: ExamSettings, max_attempts: i32) -> ReadyExam {
        let mc = self.multiple_choice(2).await;
        let tf = self.true_false(1).await;
        let essay = self.essay(5).await;
        let exam = self.exam(settings, max_attempts).await;
        self.add(&exam, &mc).await;
        self.add(&exam, &tf).await;
        self.add(&exam, &essay).await;
        let schedule = self.schedule(&exam).await;
        ReadyExam {
            exam,
            schedule,
            mc,
            tf,
            essay,
        }
    }
}

pub struct ReadyExam {
    pub exam: Exam,
    pub schedule: ExamSchedule,
    pub mc: Question,
    pub tf: Question,
    pub essay: Question,
}

pub fn options(keys: &[&str]) -> Vec<QuestionOption> {
    keys.iter()
        .map(|k| QuestionOption {
            key: k.to_string(),
            text: format!("Option {}", k),
            match_text: None,
        })
        .collect()
}

pub fn question_payload(
    question_type: QuestionType,
    options: Vec<QuestionOption>,
    correct_answer: Option<CorrectAnswer>,
    points: i32,
) -> CreateQuestionPayload {
    CreateQuestionPayload {
        question_type,
        content: "What is the answer?".into(),
        options,
        correct_answer,
        explanation: Some("Because.".into()),
        points,
        difficulty_level: 3,
        stimulus_id: None,
        subject_id: None,
        bank_id: None,
    }
}
