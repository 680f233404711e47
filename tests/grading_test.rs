mod common;

use std::collections::BTreeMap;

use assessment_backend::{
    dto::{
        attempt_dto::RecordAnswerPayload,
        exam_dto::UpsertWeightPayload,
        grading_dto::{
            AggregatePayload, CreateGradeConversionPayload, CurveBand, DeriveCurvePayload,
            EvaluateGradeQuery,
        },
    },
    error::Error,
    models::{
        exam::{ExamSettings, ExamType},
        grade_conversion::GradeScope,
        item_analysis::ItemQuality,
        question::AnswerValue,
    },
    repositories::WeightScope,
};
use common::{harness, Harness, ReadyExam};
use rust_decimal::Decimal;
use uuid::Uuid;

fn weight(h: &Harness, exam_type: ExamType, value: i64) -> UpsertWeightPayload {
    UpsertWeightPayload {
        subject_id: h.subject_id,
        class_id: h.class_id,
        exam_type,
        weight: Decimal::from(value),
        semester: "1".into(),
        academic_year: "2026/2027".into(),
    }
}

fn conversion(
    exam_id: Uuid,
    scope: GradeScope,
    class_id: Option<Uuid>,
    student_id: Option<Uuid>,
    range: (i64, i64),
    grade: &str,
) -> CreateGradeConversionPayload {
    CreateGradeConversionPayload {
        exam_id,
        scope,
        subject_id: None,
        class_id,
        student_id,
        min_score: Decimal::from(range.0),
        max_score: Decimal::from(range.1),
        grade: grade.into(),
    }
}

/// Five students finish the exam with scores 0, 1, 2, 3 and 3.
async fn five_submissions(h: &Harness, r: &ReadyExam) {
    let plans: [(bool, bool); 5] = [
        (false, false),
        (false, true),
        (true, false),
        (true, true),
        (true, true),
    ];
    for (mc, tf) in plans {
        let student = h.student();
        let attempts = &h.state.attempt_service;
        let id = attempts
            .start_attempt(&student, r.exam.id, None)
            .await
            .unwrap()
            .attempt
            .id;
        if mc {
            attempts
                .record_answer(
                    &student,
                    id,
                    RecordAnswerPayload {
                        question_id: r.mc.id,
                        answer: AnswerValue::Choice("a".into()),
                    },
                )
                .await
                .unwrap();
        }
        if tf {
            attempts
                .record_answer(
                    &student,
                    id,
                    RecordAnswerPayload {
                        question_id: r.tf.id,
                        answer: AnswerValue::Boolean(true),
                    },
                )
                .await
                .unwrap();
        }
        attempts.submit_attempt(&student, id).await.unwrap();
    }
}

#[tokio::test]
async fn weighted_subject_score_is_exact() {
    let h = harness();
    let exams = &h.state.exam_service;
    exams.upsert_weight(&h.teacher, weight(&h, ExamType::Quiz, 20)).await.unwrap();
    exams.upsert_weight(&h.teacher, weight(&h, ExamType::Midterm, 30)).await.unwrap();
    exams.upsert_weight(&h.teacher, weight(&h, ExamType::Final, 40)).await.unwrap();

    let scope = WeightScope {
        subject_id: h.subject_id,
        class_id: h.class_id,
        semester: "1".into(),
        academic_year: "2026/2027".into(),
    };
    let check = exams.validate_weights(&h.teacher, &scope).await.unwrap();
    assert_eq!(check.total, Decimal::from(90));
    assert!(!check.is_valid);

    exams.upsert_weight(&h.teacher, weight(&h, ExamType::Quiz, 30)).await.unwrap();
    let check = exams.validate_weights(&h.teacher, &scope).await.unwrap();
    assert_eq!(check.weights.len(), 3);
    assert!(check.is_valid);

    let aggregate = h
        .state
        .grade_service
        .aggregate_subject(
            &h.teacher,
            AggregatePayload {
                subject_id: h.subject_id,
                class_id: h.class_id,
                semester: "1".into(),
                academic_year: "2026/2027".into(),
                scores: BTreeMap::from([
                    (ExamType::Quiz, Decimal::from(80)),
                    (ExamType::Midterm, Decimal::from(70)),
                    (ExamType::Final, Decimal::from(90)),
                ]),
            },
        )
        .await
        .unwrap();
    assert_eq!(aggregate.final_score, Decimal::from(81));
    assert!(!aggregate.weight_warning);
    assert!(aggregate.missing_exam_types.is_empty());
    assert_eq!(aggregate.contributions.len(), 3);
}

#[tokio::test]
async fn conversions_are_validated() {
    let h = harness();
    let exam = h.exam(ExamSettings::default(), 1).await;
    let grades = &h.state.grade_service;

    let inverted = grades
        .create_conversion(
            &h.teacher,
            conversion(exam.id, GradeScope::PerClass, Some(h.class_id), None, (90, 80), "A"),
        )
        .await;
    assert!(matches!(inverted, Err(Error::BadRequest(_))));

    let no_student = grades
        .create_conversion(
            &h.teacher,
            conversion(exam.id, GradeScope::PerStudent, Some(h.class_id), None, (0, 100), "A"),
        )
        .await;
    assert!(matches!(no_student, Err(Error::BadRequest(_))));

    let no_class = grades
        .create_conversion(
            &h.teacher,
            conversion(exam.id, GradeScope::PerClass, None, None, (0, 100), "A"),
        )
        .await;
    assert!(matches!(no_class, Err(Error::BadRequest(_))));

    let unknown_exam = grades
        .create_conversion(
            &h.teacher,
            conversion(Uuid::new_v4(), GradeScope::PerClass, Some(h.class_id), None, (0, 100), "A"),
        )
        .await;
    assert!(matches!(unknown_exam, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn evaluation_prefers_student_bands() {
    let h = harness();
    let exam = h.exam(ExamSettings::default(), 1).await;
    let grades = &h.state.grade_service;
    let special = Uuid::new_v4();

    for (range, grade) in [((85, 100), "A"), ((70, 84), "B"), ((0, 69), "C")] {
        grades
            .create_conversion(
                &h.teacher,
                conversion(exam.id, GradeScope::PerClass, Some(h.class_id), None, range, grade),
            )
            .await
            .unwrap();
    }
    grades
        .create_conversion(
            &h.teacher,
            conversion(exam.id, GradeScope::PerStudent, None, Some(special), (0, 100), "P"),
        )
        .await
        .unwrap();

    let query = |student_id: Option<Uuid>, class_id: Option<Uuid>, score: i64| EvaluateGradeQuery {
        exam_id: exam.id,
        score: Decimal::from(score),
        student_id,
        class_id,
    };

    let personal = grades
        .evaluate(&h.teacher, query(Some(special), Some(h.class_id), 90))
        .await
        .unwrap();
    assert_eq!(personal.grade, "P");
    assert_eq!(personal.scope, GradeScope::PerStudent);

    let class = grades
        .evaluate(&h.teacher, query(Some(Uuid::new_v4()), Some(h.class_id), 84))
        .await
        .unwrap();
    assert_eq!(class.grade, "B");
    assert_eq!(class.scope, GradeScope::PerClass);
    assert!(!class.overlap_warning);

    let missing = grades.evaluate(&h.teacher, query(None, None, 90)).await;
    assert!(matches!(missing, Err(Error::BadRequest(_))));

    let gap = grades
        .evaluate(&h.teacher, query(None, Some(h.class_id), 101))
        .await;
    assert!(matches!(gap, Err(Error::NoMatchingGradeRange { .. })));
}

#[tokio::test]
async fn overlapping_bands_are_flagged_and_ambiguous() {
    let h = harness();
    let exam = h.exam(ExamSettings::default(), 1).await;
    let grades = &h.state.grade_service;

    for (range, grade) in [((80, 100), "A"), ((70, 85), "B")] {
        grades
            .create_conversion(
                &h.teacher,
                conversion(exam.id, GradeScope::PerClass, Some(h.class_id), None, range, grade),
            )
            .await
            .unwrap();
    }

    let ambiguous = grades
        .evaluate(
            &h.teacher,
            EvaluateGradeQuery {
                exam_id: exam.id,
                score: Decimal::from(82),
                student_id: None,
                class_id: Some(h.class_id),
            },
        )
        .await;
    match ambiguous {
        Err(Error::AmbiguousGradeRange { matches, .. }) => assert_eq!(matches, 2),
        other => panic!("expected AmbiguousGradeRange, got {:?}", other.map(|e| e.grade)),
    }

    let flagged = grades
        .evaluate(
            &h.teacher,
            EvaluateGradeQuery {
                exam_id: exam.id,
                score: Decimal::from(95),
                student_id: None,
                class_id: Some(h.class_id),
            },
        )
        .await
        .unwrap();
    assert_eq!(flagged.grade, "A");
    assert!(flagged.overlap_warning);
}

#[tokio::test]
async fn class_curve_follows_score_distribution() {
    let h = harness();
    let r = h.ready_exam(ExamSettings::default(), 1).await;
    five_submissions(&h, &r).await;
    let grades = &h.state.grade_service;

    let payload = || DeriveCurvePayload {
        exam_id: r.exam.id,
        class_id: h.class_id,
        bands: vec![
            CurveBand {
                grade: "C".into(),
                min_percentile: Decimal::ZERO,
            },
            CurveBand {
                grade: "A".into(),
                min_percentile: Decimal::from(80),
            },
            CurveBand {
                grade: "B".into(),
                min_percentile: Decimal::from(40),
            },
        ],
    };
    let curve = grades.derive_class_curve(&h.teacher, payload()).await.unwrap();
    assert_eq!(curve.sample_size, 5);
    assert!(curve.skipped_grades.is_empty());
    let bands: Vec<(&str, Decimal, Decimal)> = curve
        .conversions
        .iter()
        .map(|c| (c.grade.as_str(), c.min_score, c.max_score))
        .collect();
    assert_eq!(
        bands,
        vec![
            ("A", Decimal::from(3), Decimal::from(8)),
            ("B", Decimal::from(1), Decimal::from(3)),
            ("C", Decimal::ZERO, Decimal::from(1)),
        ]
    );

    let graded = grades
        .evaluate(
            &h.teacher,
            EvaluateGradeQuery {
                exam_id: r.exam.id,
                score: Decimal::from(2),
                student_id: None,
                class_id: Some(h.class_id),
            },
        )
        .await
        .unwrap();
    assert_eq!(graded.grade, "B");

    for (score, grade) in [(Decimal::new(2995, 3), "B"), (Decimal::from(3), "A")] {
        let boundary = grades
            .evaluate(
                &h.teacher,
                EvaluateGradeQuery {
                    exam_id: r.exam.id,
                    score,
                    student_id: None,
                    class_id: Some(h.class_id),
                },
            )
            .await
            .unwrap();
        assert_eq!(boundary.grade, grade);
        assert!(!boundary.overlap_warning);
    }

    let again = grades.derive_class_curve(&h.teacher, payload()).await;
    assert!(matches!(again, Err(Error::Conflict(_))));
}

#[tokio::test]
async fn item_analysis_is_computed_and_stored() {
    let h = harness();
    let r = h.ready_exam(ExamSettings::default(), 1).await;
    five_submissions(&h, &r).await;
    let analysis = &h.state.item_analysis_service;

    assert!(matches!(
        analysis.analyze_exam(&h.student(), r.exam.id, None).await,
        Err(Error::Forbidden(_))
    ));

    let rows = analysis.analyze_exam(&h.teacher, r.exam.id, None).await.unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].question_id, r.mc.id);

    let mc = &rows[0];
    assert_eq!(mc.total_attempts, 5);
    assert_eq!((mc.correct_answers, mc.incorrect_answers, mc.blank_answers), (3, 0, 2));
    assert_eq!(mc.difficulty_index, Some(0.6));
    assert_eq!(mc.top_group_stats.total, 1);
    assert_eq!(mc.discrimination_index, Some(1.0));
    assert_eq!(mc.quality, ItemQuality::Excellent);
    assert_eq!(mc.option_statistics.len(), 4);
    assert!(mc.option_statistics[0].is_correct);
    assert_eq!(mc.option_statistics[0].count, 3);

    let tf = &rows[1];
    assert_eq!(tf.correct_answers, 3);
    assert!(tf.option_statistics.is_empty());

    let essay = &rows[2];
    assert_eq!(essay.blank_answers, 5);
    assert_eq!(essay.difficulty_index, Some(0.0));

    let stored = h.store.stored_item_analyses(r.exam.id).await;
    assert_eq!(stored.len(), 3);

    let repeat = analysis.analyze_exam(&h.teacher, r.exam.id, None).await.unwrap();
    assert_eq!(repeat.len(), 3);
    assert_eq!(h.store.stored_item_analyses(r.exam.id).await.len(), 3);
    assert_eq!(repeat[0].difficulty_index, rows[0].difficulty_index);
}
