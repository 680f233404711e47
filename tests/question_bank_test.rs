mod common;

use assessment_backend::{
    dto::{
        exam_dto::AddFromBankPayload,
        question_dto::{CreateBankPayload, CreateSharePayload, CreateStimulusPayload, ListQuestionsQuery},
        DeleteOutcome,
    },
    error::Error,
    middleware::auth::{Role, TenantContext},
    models::{
        exam::ExamSettings,
        question::{CorrectAnswer, QuestionType},
        question_share::{ShareStatus, ShareType},
        stimulus::StimulusContentType,
    },
};
use common::{harness, options, question_payload};
use uuid::Uuid;

fn bank_payload(name: &str) -> CreateBankPayload {
    CreateBankPayload {
        name: name.into(),
        description: None,
        subject_id: None,
        class_id: None,
        is_shared: false,
    }
}

#[tokio::test]
async fn rejects_answer_keys_that_do_not_fit() {
    let h = harness();
    let res = h
        .state
        .question_service
        .create_question(
            &h.teacher,
            question_payload(
                QuestionType::MultipleChoice,
                options(&["a", "b"]),
                Some(CorrectAnswer::Choice("z".into())),
                1,
            ),
        )
        .await;
    assert!(matches!(res, Err(Error::BadRequest(_))));

    let student_attempt = h
        .state
        .question_service
        .create_question(
            &h.student(),
            question_payload(QuestionType::Essay, Vec::new(), None, 1),
        )
        .await;
    assert!(matches!(student_attempt, Err(Error::Forbidden(_))));
}

#[tokio::test]
async fn referenced_questions_are_deactivated_not_deleted() {
    let h = harness();
    let questions = &h.state.question_service;

    let used = h.multiple_choice(1).await;
    let exam = h.exam(ExamSettings::default(), 1).await;
    h.add(&exam, &used).await;

    let outcome = questions.delete_question(&h.teacher, used.id).await.unwrap();
    assert_eq!(
        outcome,
        DeleteOutcome::Deactivated {
            reason: "referential_integrity_violation".into()
        }
    );
    assert!(!questions.get_question(&h.teacher, used.id).await.unwrap().is_active);

    let listed = questions
        .list_questions(&h.teacher, ListQuestionsQuery::default())
        .await
        .unwrap();
    assert!(listed.iter().all(|q| q.id != used.id));

    let unused = h.true_false(1).await;
    let outcome = questions.delete_question(&h.teacher, unused.id).await.unwrap();
    assert_eq!(outcome, DeleteOutcome::Deleted);
    assert!(matches!(
        questions.get_question(&h.teacher, unused.id).await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn banks_feed_exam_question_sets() {
    let h = harness();
    let questions = &h.state.question_service;
    let bank = questions
        .create_bank(&h.teacher, bank_payload("Algebra"))
        .await
        .unwrap();

    let first = h.multiple_choice(1).await;
    let second = h.true_false(2).await;
    let third = h.multiple_choice(3).await;
    for q in [&first, &second, &third] {
        let membership = questions
            .attach_question(&h.teacher, bank.id, q.id)
            .await
            .unwrap();
        assert!(membership.changed);
    }
    let again = questions
        .attach_question(&h.teacher, bank.id, first.id)
        .await
        .unwrap();
    assert!(!again.changed);
    assert_eq!(
        questions
            .list_bank_questions(&h.teacher, bank.id)
            .await
            .unwrap()
            .len(),
        3
    );

    let exam = h.exam(ExamSettings::default(), 1).await;
    h.add(&exam, &first).await;
    let added = h
        .state
        .exam_service
        .add_questions_from_bank(
            &h.teacher,
            exam.id,
            AddFromBankPayload {
                bank_id: bank.id,
                limit: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(added.len(), 2);
    let items = h
        .state
        .exam_service
        .list_exam_questions(&h.teacher, exam.id)
        .await
        .unwrap();
    let indices: Vec<i32> = items.iter().map(|i| i.order_index).collect();
    assert_eq!(indices, vec![0, 1, 2]);

    let outcome = questions.delete_bank(&h.teacher, bank.id).await.unwrap();
    assert!(matches!(outcome, DeleteOutcome::Deactivated { .. }));

    questions
        .detach_question(&h.teacher, bank.id, second.id)
        .await
        .unwrap();
    assert!(matches!(
        questions.detach_question(&h.teacher, bank.id, second.id).await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn copy_share_clones_into_receiving_tenant() {
    let h = harness();
    let questions = &h.state.question_service;

    let stimulus = questions
        .create_stimulus(
            &h.teacher,
            CreateStimulusPayload {
                title: Some("Passage".into()),
                content_type: StimulusContentType::Text,
                content: Some("Once upon a time".into()),
                file_url: None,
            },
        )
        .await
        .unwrap();
    let mut payload = question_payload(
        QuestionType::MultipleChoice,
        options(&["a", "b", "c"]),
        Some(CorrectAnswer::Choice("b".into())),
        2,
    );
    payload.stimulus_id = Some(stimulus.id);
    let source = questions.create_question(&h.teacher, payload).await.unwrap();

    let other_tenant = Uuid::new_v4();
    let receiver = TenantContext::new(other_tenant, Uuid::new_v4(), Role::Teacher);

    let share = questions
        .request_share(
            &h.teacher,
            CreateSharePayload {
                question_id: source.id,
                from_tenant_id: h.tenant_id,
                to_tenant_id: other_tenant,
                to_teacher_id: receiver.actor_id,
                share_type: ShareType::Copy,
                message: Some("Try this one".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(share.status, ShareStatus::Pending);

    let bystander = TenantContext::new(other_tenant, Uuid::new_v4(), Role::Teacher);
    assert!(matches!(
        questions.approve_share(&bystander, share.id).await,
        Err(Error::Forbidden(_))
    ));
    let outsider = TenantContext::new(Uuid::new_v4(), receiver.actor_id, Role::Teacher);
    assert!(matches!(
        questions.approve_share(&outsider, share.id).await,
        Err(Error::NotFound(_))
    ));

    let approved = questions.approve_share(&receiver, share.id).await.unwrap();
    assert_eq!(approved.status, ShareStatus::Approved);
    let clone_id = approved.cloned_question_id.expect("copy share clones");
    assert_ne!(clone_id, source.id);

    let clone = questions.get_question(&receiver, clone_id).await.unwrap();
    assert_eq!(clone.tenant_id, other_tenant);
    assert_eq!(clone.content, source.content);
    assert_eq!(clone.correct_answer, source.correct_answer);
    let cloned_stimulus = clone.stimulus_id.expect("stimulus is cloned too");
    assert_ne!(cloned_stimulus, stimulus.id);
    assert!(questions.get_stimulus(&receiver, cloned_stimulus).await.is_ok());

    assert!(matches!(
        questions.get_question(&h.teacher, clone_id).await,
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        questions.approve_share(&receiver, share.id).await,
        Err(Error::InvalidStateTransition { .. })
    ));
}

#[tokio::test]
async fn rejected_share_changes_nothing_else() {
    let h = harness();
    let questions = &h.state.question_service;
    let source = h.multiple_choice(1).await;
    let other_tenant = Uuid::new_v4();
    let receiver = TenantContext::new(other_tenant, Uuid::new_v4(), Role::Teacher);

    let spoofed = questions
        .request_share(
            &h.teacher,
            CreateSharePayload {
                question_id: source.id,
                from_tenant_id: other_tenant,
                to_tenant_id: h.tenant_id,
                to_teacher_id: h.teacher.actor_id,
                share_type: ShareType::View,
                message: None,
            },
        )
        .await;
    assert!(matches!(spoofed, Err(Error::Forbidden(_))));

    let share = questions
        .request_share(
            &h.teacher,
            CreateSharePayload {
                question_id: source.id,
                from_tenant_id: h.tenant_id,
                to_tenant_id: other_tenant,
                to_teacher_id: receiver.actor_id,
                share_type: ShareType::Copy,
                message: None,
            },
        )
        .await
        .unwrap();
    let rejected = questions.reject_share(&receiver, share.id).await.unwrap();
    assert_eq!(rejected.status, ShareStatus::Rejected);
    assert!(rejected.cloned_question_id.is_none());
    assert!(rejected.resolved_at.is_some());

    let theirs = questions
        .list_questions(&receiver, ListQuestionsQuery::default())
        .await
        .unwrap();
    assert!(theirs.is_empty());
    assert!(matches!(
        questions.approve_share(&receiver, share.id).await,
        Err(Error::InvalidStateTransition { .. })
    ));
}
