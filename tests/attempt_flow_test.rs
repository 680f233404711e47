mod common;

use std::collections::HashSet;

use assessment_backend::{
    dto::{
        attempt_dto::{GradeEssayPayload, RecordAnswerPayload},
        exam_dto::{CreateSchedulePayload, UpdateExamPayload},
        question_dto::UpdateQuestionPayload,
    },
    error::Error,
    models::{
        exam::ExamSettings,
        exam_attempt::AttemptStatus,
        question::{AnswerValue, CorrectAnswer},
    },
};
use chrono::Duration;
use common::{harness, start_time};
use rust_decimal::Decimal;

fn answer(question_id: uuid::Uuid, answer: AnswerValue) -> RecordAnswerPayload {
    RecordAnswerPayload {
        question_id,
        answer,
    }
}

#[tokio::test]
async fn attempt_lifecycle_scores_and_reviews() {
    let h = harness();
    let settings = ExamSettings {
        allow_review: true,
        ..ExamSettings::default()
    };
    let r = h.ready_exam(settings, 2).await;
    let student = h.student();
    let attempts = &h.state.attempt_service;

    let view = attempts.start_attempt(&student, r.exam.id, None).await.unwrap();
    assert_eq!(view.attempt.status, AttemptStatus::Started);
    assert_eq!(view.attempt.schedule_id, Some(r.schedule.id));
    assert_eq!(view.attempt.attempt_number, 1);
    assert_eq!(view.attempt.expires_at, start_time() + Duration::minutes(60));
    assert_eq!(view.questions.len(), 3);
    let id = view.attempt.id;

    attempts
        .record_answer(&student, id, answer(r.mc.id, AnswerValue::Choice("a".into())))
        .await
        .unwrap();
    attempts
        .record_answer(&student, id, answer(r.tf.id, AnswerValue::Boolean(false)))
        .await
        .unwrap();
    let in_progress = attempts
        .record_answer(
            &student,
            id,
            answer(r.essay.id, AnswerValue::Text("A long answer".into())),
        )
        .await
        .unwrap();
    assert_eq!(in_progress.status, AttemptStatus::InProgress);

    h.clock.advance(Duration::minutes(10));
    let submitted = attempts.submit_attempt(&student, id).await.unwrap();
    assert_eq!(submitted.status, AttemptStatus::Completed);
    assert_eq!(submitted.score, Some(Decimal::from(2)));
    assert_eq!(submitted.correct_answers, Some(1));
    assert_eq!(submitted.pending_manual_score, Some(Decimal::from(5)));
    assert_eq!(submitted.max_score, Some(Decimal::from(8)));
    assert_eq!(submitted.time_spent_seconds, Some(600));

    match attempts.submit_attempt(&student, id).await {
        Err(Error::AlreadySubmitted { status, score, .. }) => {
            assert_eq!(status, "completed");
            assert_eq!(score, Some(Decimal::from(2)));
        }
        other => panic!("expected AlreadySubmitted, got {:?}", other.map(|a| a.status)),
    }

    let over = attempts
        .grade_essay(
            &h.teacher,
            id,
            GradeEssayPayload {
                question_id: r.essay.id,
                points: Decimal::from(6),
            },
        )
        .await;
    assert!(matches!(over, Err(Error::BadRequest(_))));

    let graded = attempts
        .grade_essay(
            &h.teacher,
            id,
            GradeEssayPayload {
                question_id: r.essay.id,
                points: Decimal::from(4),
            },
        )
        .await
        .unwrap();
    assert_eq!(graded.pending_manual_score, Some(Decimal::ZERO));
    assert_eq!(graded.score, Some(Decimal::from(2)));
    assert_eq!(graded.total_score(), Decimal::from(6));

    let review = attempts.attempt_review(&student, id).await.unwrap();
    assert_eq!(review.items.len(), 3);
    assert_eq!(review.total_score, Decimal::from(6));
    assert!(review.items.iter().all(|i| i.correct_answer.is_none()));
    let essay_item = review
        .items
        .iter()
        .find(|i| i.question_id == r.essay.id)
        .unwrap();
    assert_eq!(essay_item.points_awarded, Decimal::from(4));
}

#[tokio::test]
async fn students_only_see_their_own_attempts() {
    let h = harness();
    let r = h.ready_exam(ExamSettings::default(), 1).await;
    let owner = h.student();
    let other = h.student();

    let view = h
        .state
        .attempt_service
        .start_attempt(&owner, r.exam.id, None)
        .await
        .unwrap();
    let res = h.state.attempt_service.get_attempt(&other, view.attempt.id).await;
    assert!(matches!(res, Err(Error::Forbidden(_))));
    assert!(h
        .state
        .attempt_service
        .get_attempt(&h.teacher, view.attempt.id)
        .await
        .is_ok());
}

#[tokio::test]
async fn review_requires_allow_review_for_students() {
    let h = harness();
    let r = h.ready_exam(ExamSettings::default(), 1).await;
    let student = h.student();
    let attempts = &h.state.attempt_service;

    let id = attempts
        .start_attempt(&student, r.exam.id, None)
        .await
        .unwrap()
        .attempt
        .id;
    attempts.submit_attempt(&student, id).await.unwrap();

    assert!(matches!(
        attempts.attempt_review(&student, id).await,
        Err(Error::Forbidden(_))
    ));
    let staff_review = attempts.attempt_review(&h.teacher, id).await.unwrap();
    assert!(staff_review
        .items
        .iter()
        .any(|i| i.question_id == r.mc.id && i.correct_answer.is_some()));
}

#[tokio::test]
async fn concurrent_starts_respect_max_attempts() {
    let h = harness();
    let r = h.ready_exam(ExamSettings::default(), 1).await;
    let student = h.student();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = h.state.attempt_service.clone();
        let exam_id = r.exam.id;
        handles.push(tokio::spawn(async move {
            service.start_attempt(&student, exam_id, None).await
        }));
    }

    let mut started = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => started += 1,
            Err(Error::MaxAttemptsExceeded { max_attempts, existing }) => {
                assert_eq!(max_attempts, 1);
                assert_eq!(existing, 1);
                rejected += 1;
            }
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert_eq!(started, 1);
    assert_eq!(rejected, 7);
}

#[tokio::test]
async fn concurrent_submits_have_one_winner() {
    let h = harness();
    let r = h.ready_exam(ExamSettings::default(), 1).await;
    let student = h.student();
    let id = h
        .state
        .attempt_service
        .start_attempt(&student, r.exam.id, None)
        .await
        .unwrap()
        .attempt
        .id;

    let a = {
        let service = h.state.attempt_service.clone();
        tokio::spawn(async move { service.submit_attempt(&student, id).await })
    };
    let b = {
        let service = h.state.attempt_service.clone();
        tokio::spawn(async move { service.submit_attempt(&student, id).await })
    };
    let results = [a.await.unwrap(), b.await.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(Error::AlreadySubmitted { .. })))
            .count(),
        1
    );
}

#[tokio::test]
async fn randomized_order_is_stable_for_an_attempt() {
    let h = harness();
    let settings = ExamSettings {
        randomize_questions: true,
        randomize_answers: true,
        ..ExamSettings::default()
    };
    let mut questions = Vec::new();
    for _ in 0..6 {
        questions.push(h.multiple_choice(1).await);
    }
    let exam = h.exam(settings, 1).await;
    for q in &questions {
        h.add(&exam, q).await;
    }
    h.schedule(&exam).await;
    let student = h.student();

    let started = h
        .state
        .attempt_service
        .start_attempt(&student, exam.id, None)
        .await
        .unwrap();
    let order = started.attempt.question_order.clone();
    let ids: HashSet<_> = questions.iter().map(|q| q.id).collect();
    assert_eq!(order.iter().copied().collect::<HashSet<_>>(), ids);
    assert_eq!(started.attempt.option_orders.len(), 6);

    for _ in 0..3 {
        let again = h
            .state
            .attempt_service
            .get_attempt(&student, started.attempt.id)
            .await
            .unwrap();
        assert_eq!(again.attempt.question_order, order);
        let presented: Vec<_> = again.questions.iter().map(|q| q.question_id).collect();
        assert_eq!(presented, order);
        for view in &again.questions {
            let keys: Vec<String> = view.options.iter().map(|o| o.key.clone()).collect();
            assert_eq!(&keys, &again.attempt.option_orders[&view.question_id]);
        }
    }
}

#[tokio::test]
async fn window_is_enforced_by_clock() {
    let h = harness();
    let r = h.ready_exam(ExamSettings::default(), 3).await;
    let student = h.student();

    h.clock.set(start_time() - Duration::hours(2));
    let early = h
        .state
        .attempt_service
        .start_attempt(&student, r.exam.id, None)
        .await;
    assert!(matches!(early, Err(Error::InvalidWindow { .. })));

    h.clock.set(start_time() + Duration::hours(5));
    let late = h
        .state
        .attempt_service
        .start_attempt(&student, r.exam.id, None)
        .await;
    assert!(matches!(late, Err(Error::InvalidWindow { .. })));
}

#[tokio::test]
async fn draft_exams_cannot_be_started() {
    let h = harness();
    let q = h.multiple_choice(1).await;
    let exam = h.exam(ExamSettings::default(), 1).await;
    h.add(&exam, &q).await;

    let res = h
        .state
        .attempt_service
        .start_attempt(&h.student(), exam.id, None)
        .await;
    assert!(matches!(res, Err(Error::InvalidWindow { .. })));
}

#[tokio::test]
async fn expired_attempts_time_out_on_submit_and_sweep() {
    let h = harness();
    let r = h.ready_exam(ExamSettings::default(), 2).await;
    let attempts = &h.state.attempt_service;

    let late_student = h.student();
    let late = attempts
        .start_attempt(&late_student, r.exam.id, None)
        .await
        .unwrap()
        .attempt;
    let swept_student = h.student();
    let swept = attempts
        .start_attempt(&swept_student, r.exam.id, None)
        .await
        .unwrap()
        .attempt;
    attempts
        .record_answer(
            &swept_student,
            swept.id,
            answer(r.mc.id, AnswerValue::Choice("a".into())),
        )
        .await
        .unwrap();

    h.clock.advance(Duration::minutes(61));

    let res = attempts.submit_attempt(&late_student, late.id).await;
    assert!(matches!(res, Err(Error::InvalidWindow { .. })));
    match attempts.submit_attempt(&late_student, late.id).await {
        Err(Error::AlreadySubmitted { status, .. }) => assert_eq!(status, "timeout"),
        other => panic!("expected AlreadySubmitted, got {:?}", other.map(|a| a.status)),
    }

    let sweep = h.state.sweep_service(Duration::minutes(180));
    let report = sweep.run_once(h.clock_now()).await.unwrap();
    assert_eq!(report.attempts_timed_out, 1);
    assert!(report.statuses_changed >= 1);

    let view = attempts.get_attempt(&h.teacher, swept.id).await.unwrap();
    assert_eq!(view.attempt.status, AttemptStatus::Timeout);
    assert_eq!(view.attempt.submitted_at, Some(view.attempt.expires_at));
    assert_eq!(view.attempt.score, Some(Decimal::from(2)));

    let again = sweep.run_once(h.clock_now()).await.unwrap();
    assert_eq!(again.attempts_timed_out, 0);
}

#[tokio::test]
async fn abandoned_attempts_free_a_slot() {
    let h = harness();
    let r = h.ready_exam(ExamSettings::default(), 1).await;
    let student = h.student();
    let attempts = &h.state.attempt_service;

    let first = attempts
        .start_attempt(&student, r.exam.id, None)
        .await
        .unwrap()
        .attempt;
    assert!(matches!(
        attempts.abandon_attempt(&student, first.id).await,
        Err(Error::Forbidden(_))
    ));
    let abandoned = attempts.abandon_attempt(&h.teacher, first.id).await.unwrap();
    assert_eq!(abandoned.status, AttemptStatus::Abandoned);

    let second = attempts
        .start_attempt(&student, r.exam.id, None)
        .await
        .unwrap()
        .attempt;
    assert_eq!(second.attempt_number, 2);
}

#[tokio::test]
async fn idle_attempts_are_abandoned_by_sweep() {
    let h = harness();
    let r = h.ready_exam(ExamSettings::default(), 1).await;
    let student = h.student();
    let attempt = h
        .state
        .attempt_service
        .start_attempt(&student, r.exam.id, None)
        .await
        .unwrap()
        .attempt;

    h.clock.advance(Duration::minutes(15));
    let report = h
        .state
        .sweep_service(Duration::minutes(10))
        .run_once(h.clock_now())
        .await
        .unwrap();
    assert_eq!(report.attempts_abandoned, 1);
    assert_eq!(report.attempts_timed_out, 0);

    let view = h
        .state
        .attempt_service
        .get_attempt(&h.teacher, attempt.id)
        .await
        .unwrap();
    assert_eq!(view.attempt.status, AttemptStatus::Abandoned);
}

#[tokio::test]
async fn question_set_is_frozen_once_attempts_exist() {
    let h = harness();
    let r = h.ready_exam(ExamSettings::default(), 1).await;
    h.state
        .attempt_service
        .start_attempt(&h.student(), r.exam.id, None)
        .await
        .unwrap();

    let extra = h.multiple_choice(1).await;
    let res = h
        .state
        .exam_service
        .add_exam_question(
            &h.teacher,
            r.exam.id,
            assessment_backend::dto::exam_dto::AddExamQuestionPayload {
                question_id: extra.id,
                order_index: None,
                points_override: None,
            },
        )
        .await;
    assert!(matches!(res, Err(Error::ImmutableAfterAttempts(_))));

    let update = h
        .state
        .exam_service
        .update_exam(
            &h.teacher,
            r.exam.id,
            UpdateExamPayload {
                passing_score: Some(Decimal::from(7)),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(update, Err(Error::ImmutableAfterAttempts(_))));
}

#[tokio::test]
async fn sequential_attempts_stop_at_max_attempts() {
    let h = harness();
    let r = h.ready_exam(ExamSettings::default(), 2).await;
    let student = h.student();
    let attempts = &h.state.attempt_service;

    for number in 1..=2 {
        let view = attempts.start_attempt(&student, r.exam.id, None).await.unwrap();
        assert_eq!(view.attempt.attempt_number, number);
        attempts
            .record_answer(
                &student,
                view.attempt.id,
                answer(r.tf.id, AnswerValue::Boolean(true)),
            )
            .await
            .unwrap();
        let done = attempts.submit_attempt(&student, view.attempt.id).await.unwrap();
        assert_eq!(done.status, AttemptStatus::Completed);
        assert_eq!(done.score, Some(Decimal::from(1)));
    }

    match attempts.start_attempt(&student, r.exam.id, None).await {
        Err(Error::MaxAttemptsExceeded {
            max_attempts,
            existing,
        }) => assert_eq!((max_attempts, existing), (2, 2)),
        other => panic!("expected MaxAttemptsExceeded, got {:?}", other.map(|v| v.attempt.id)),
    }
}

#[tokio::test]
async fn start_before_window_opens_reports_the_window() {
    let h = harness();
    let r = h.ready_exam(ExamSettings::default(), 1).await;
    h.clock.set(r.exam.start_date - Duration::hours(1));

    match h
        .state
        .attempt_service
        .start_attempt(&h.student(), r.exam.id, None)
        .await
    {
        Err(Error::InvalidWindow {
            message, opens_at, ..
        }) => {
            assert_eq!(message, "Exam window has not opened yet");
            assert_eq!(opens_at, r.exam.start_date);
        }
        other => panic!("expected InvalidWindow, got {:?}", other.map(|v| v.attempt.id)),
    }
}

#[tokio::test]
async fn scoring_fields_are_locked_once_attempted() {
    let h = harness();
    let r = h.ready_exam(ExamSettings::default(), 1).await;
    let student = h.student();
    let attempts = &h.state.attempt_service;
    let questions = &h.state.question_service;

    let rekey = |key: &str| UpdateQuestionPayload {
        correct_answer: Some(CorrectAnswer::Choice(key.into())),
        ..Default::default()
    };
    questions
        .update_question(&h.teacher, r.mc.id, rekey("b"))
        .await
        .unwrap();
    questions
        .update_question(&h.teacher, r.mc.id, rekey("a"))
        .await
        .unwrap();

    let id = attempts
        .start_attempt(&student, r.exam.id, None)
        .await
        .unwrap()
        .attempt
        .id;
    attempts
        .record_answer(&student, id, answer(r.mc.id, AnswerValue::Choice("a".into())))
        .await
        .unwrap();
    attempts.submit_attempt(&student, id).await.unwrap();

    let res = questions.update_question(&h.teacher, r.mc.id, rekey("b")).await;
    assert!(matches!(res, Err(Error::ImmutableAfterAttempts(_))));
    let res = questions
        .update_question(
            &h.teacher,
            r.mc.id,
            UpdateQuestionPayload {
                points: Some(50),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(res, Err(Error::ImmutableAfterAttempts(_))));

    let reworded = questions
        .update_question(
            &h.teacher,
            r.mc.id,
            UpdateQuestionPayload {
                content: Some("Reworded prompt".into()),
                correct_answer: Some(CorrectAnswer::Choice("a".into())),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(reworded.content, "Reworded prompt");

    let rows = h
        .state
        .item_analysis_service
        .analyze_exam(&h.teacher, r.exam.id, None)
        .await
        .unwrap();
    assert_eq!(rows[0].correct_answers, 1);
}

#[tokio::test]
async fn schedules_must_fit_the_exam_window() {
    let h = harness();
    let r = h.ready_exam(ExamSettings::default(), 1).await;
    let exams = &h.state.exam_service;

    let outside = exams
        .create_schedule(
            &h.teacher,
            r.exam.id,
            CreateSchedulePayload {
                class_id: h.class_id,
                subject_id: h.subject_id,
                teacher_id: None,
                start_time: start_time() + Duration::hours(4),
                end_time: start_time() + Duration::hours(6),
                passing_score: None,
            },
        )
        .await;
    assert!(matches!(outside, Err(Error::BadRequest(_))));

    let shrink = exams
        .update_exam(
            &h.teacher,
            r.exam.id,
            UpdateExamPayload {
                end_date: Some(start_time() + Duration::hours(1)),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(shrink, Err(Error::BadRequest(_))));

    h.clock.advance(Duration::minutes(90));
    h.state
        .sweep_service(Duration::minutes(180))
        .run_once(h.clock_now())
        .await
        .unwrap();
    let view = h
        .state
        .attempt_service
        .start_attempt(&h.student(), r.exam.id, None)
        .await
        .unwrap();
    assert_eq!(view.attempt.schedule_id, Some(r.schedule.id));
}

#[tokio::test]
async fn overlapping_open_schedules_need_an_explicit_choice() {
    let h = harness();
    let r = h.ready_exam(ExamSettings::default(), 1).await;
    let second = h.schedule(&r.exam).await;
    let attempts = &h.state.attempt_service;

    let res = attempts.start_attempt(&h.student(), r.exam.id, None).await;
    assert!(matches!(res, Err(Error::BadRequest(_))));

    let view = attempts
        .start_attempt(&h.student(), r.exam.id, Some(second.id))
        .await
        .unwrap();
    assert_eq!(view.attempt.schedule_id, Some(second.id));
}

#[tokio::test]
async fn sweep_abandons_every_idle_attempt() {
    let h = harness();
    let r = h.ready_exam(ExamSettings::default(), 1).await;
    let mut ids = Vec::new();
    for _ in 0..3 {
        let view = h
            .state
            .attempt_service
            .start_attempt(&h.student(), r.exam.id, None)
            .await
            .unwrap();
        ids.push(view.attempt.id);
    }

    h.clock.advance(Duration::minutes(20));
    let report = h
        .state
        .sweep_service(Duration::minutes(10))
        .run_once(h.clock_now())
        .await
        .unwrap();
    assert_eq!(report.attempts_abandoned, 3);
    for id in ids {
        let view = h.state.attempt_service.get_attempt(&h.teacher, id).await.unwrap();
        assert_eq!(view.attempt.status, AttemptStatus::Abandoned);
    }
}
