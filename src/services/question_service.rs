use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::dto::question_dto::{
    BankMembership, CreateBankPayload, CreateQuestionPayload, CreateSharePayload,
    CreateStimulusPayload, ListQuestionsQuery, UpdateBankPayload, UpdateQuestionPayload,
};
use crate::dto::{DeleteOutcome, REFERENTIAL_INTEGRITY_VIOLATION};
use crate::error::{Error, Result};
use crate::middleware::auth::TenantContext;
use crate::models::{
    question::Question,
    question_bank::QuestionBank,
    question_share::{QuestionShare, ShareStatus, ShareType},
    stimulus::Stimulus,
};
use crate::repositories::{QuestionFilter, ShareClone, Store};
use crate::utils::time::Clock;

#[derive(Clone)]
pub struct QuestionService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl QuestionService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn create_stimulus(
        &self,
        ctx: &TenantContext,
        payload: CreateStimulusPayload,
    ) -> Result<Stimulus> {
        ctx.require_staff()?;
        if payload.content.is_none() && payload.file_url.is_none() {
            return Err(Error::BadRequest(
                "A stimulus needs inline content or a file_url".to_string(),
            ));
        }
        let stimulus = Stimulus {
            id: Uuid::new_v4(),
            tenant_id: ctx.tenant_id,
            title: payload.title,
            content_type: payload.content_type,
            content: payload.content,
            file_url: payload.file_url,
            created_by: ctx.actor_id,
            created_at: self.clock.now(),
        };
        self.store.insert_stimulus(stimulus).await
    }

    pub async fn get_stimulus(&self, ctx: &TenantContext, id: Uuid) -> Result<Stimulus> {
        self.store
            .find_stimulus(ctx.tenant_id, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Stimulus {} not found", id)))
    }

    pub async fn create_question(
        &self,
        ctx: &TenantContext,
        payload: CreateQuestionPayload,
    ) -> Result<Question> {
        ctx.require_staff()?;
        if let Some(stimulus_id) = payload.stimulus_id {
            self.get_stimulus(ctx, stimulus_id).await?;
        }
        let bank = match payload.bank_id {
            Some(bank_id) => Some(self.get_bank(ctx, bank_id).await?),
            None => None,
        };

        let now = self.clock.now();
        let question = Question {
            id: Uuid::new_v4(),
            tenant_id: ctx.tenant_id,
            question_type: payload.question_type,
            content: payload.content.trim().to_string(),
            options: payload.options,
            correct_answer: payload.correct_answer,
            explanation: payload.explanation,
            points: payload.points,
            difficulty_level: payload.difficulty_level,
            stimulus_id: payload.stimulus_id,
            subject_id: payload.subject_id,
            created_by: ctx.actor_id,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        question.validate_answer_key().map_err(Error::BadRequest)?;

        let question = self.store.insert_question(question).await?;
        if let Some(bank) = bank {
            self.store.attach_question(bank.id, question.id).await?;
        }
        tracing::info!(question_id = %question.id, tenant_id = %ctx.tenant_id, "question created");
        Ok(question)
    }

    pub async fn get_question(&self, ctx: &TenantContext, id: Uuid) -> Result<Question> {
        self.store
            .find_question(ctx.tenant_id, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Question {} not found", id)))
    }

    pub async fn list_questions(
        &self,
        ctx: &TenantContext,
        query: ListQuestionsQuery,
    ) -> Result<Vec<Question>> {
        let filter = QuestionFilter {
            question_type: query.question_type,
            bank_id: query.bank_id,
            include_inactive: query.include_inactive,
        };
        self.store.list_questions(ctx.tenant_id, &filter).await
    }

    pub async fn update_question(
        &self,
        ctx: &TenantContext,
        id: Uuid,
        payload: UpdateQuestionPayload,
    ) -> Result<Question> {
        ctx.require_staff()?;
        let mut question = self.get_question(ctx, id).await?;

        let rescoring = payload.options.as_ref().is_some_and(|o| *o != question.options)
            || payload
                .correct_answer
                .as_ref()
                .is_some_and(|c| question.correct_answer.as_ref() != Some(c))
            || payload.points.is_some_and(|p| p != question.points);
        if rescoring && self.store.count_question_attempts(ctx.tenant_id, id).await? > 0 {
            return Err(Error::ImmutableAfterAttempts(
                "question options, answer key and points".to_string(),
            ));
        }

        if let Some(stimulus_id) = payload.stimulus_id {
            self.get_stimulus(ctx, stimulus_id).await?;
            question.stimulus_id = Some(stimulus_id);
        }
        if let Some(content) = payload.content {
            question.content = content;
        }
        if let Some(options) = payload.options {
            question.options = options;
        }
        if let Some(correct_answer) = payload.correct_answer {
            question.correct_answer = Some(correct_answer);
        }
        if let Some(explanation) = payload.explanation {
            question.explanation = Some(explanation);
        }
        if let Some(points) = payload.points {
            question.points = points;
        }
        if let Some(level) = payload.difficulty_level {
            question.difficulty_level = level;
        }
        if let Some(subject_id) = payload.subject_id {
            question.subject_id = Some(subject_id);
        }
        if let Some(is_active) = payload.is_active {
            question.is_active = is_active;
        }
        question.validate_answer_key().map_err(Error::BadRequest)?;
        question.updated_at = self.clock.now();

        self.store.update_question(question).await
    }

    /// Hard-deletes an unreferenced question; a referenced one is only
    /// deactivated.
    pub async fn delete_question(&self, ctx: &TenantContext, id: Uuid) -> Result<DeleteOutcome> {
        ctx.require_staff()?;
        let mut question = self.get_question(ctx, id).await?;

        let references = self.store.count_question_references(ctx.tenant_id, id).await?;
        if references > 0 {
            question.is_active = false;
            question.updated_at = self.clock.now();
            self.store.update_question(question).await?;
            tracing::info!(question_id = %id, references, "question deactivated instead of deleted");
            return Ok(DeleteOutcome::Deactivated {
                reason: REFERENTIAL_INTEGRITY_VIOLATION.to_string(),
            });
        }

        self.store.delete_question(ctx.tenant_id, id).await?;
        Ok(DeleteOutcome::Deleted)
    }

    pub async fn create_bank(
        &self,
        ctx: &TenantContext,
        payload: CreateBankPayload,
    ) -> Result<QuestionBank> {
        ctx.require_staff()?;
        let now = self.clock.now();
        let bank = QuestionBank {
            id: Uuid::new_v4(),
            tenant_id: ctx.tenant_id,
            name: payload.name.trim().to_string(),
            description: payload.description,
            subject_id: payload.subject_id,
            class_id: payload.class_id,
            is_shared: payload.is_shared,
            created_by: ctx.actor_id,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_bank(bank).await
    }

    pub async fn get_bank(&self, ctx: &TenantContext, id: Uuid) -> Result<QuestionBank> {
        self.store
            .find_bank(ctx.tenant_id, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Question bank {} not found", id)))
    }

    pub async fn update_bank(
        &self,
        ctx: &TenantContext,
        id: Uuid,
        payload: UpdateBankPayload,
    ) -> Result<QuestionBank> {
        ctx.require_staff()?;
        let mut bank = self.get_bank(ctx, id).await?;
        if let Some(name) = payload.name {
            bank.name = name;
        }
        if let Some(description) = payload.description {
            bank.description = Some(description);
        }
        if let Some(subject_id) = payload.subject_id {
            bank.subject_id = Some(subject_id);
        }
        if let Some(class_id) = payload.class_id {
            bank.class_id = Some(class_id);
        }
        if let Some(is_shared) = payload.is_shared {
            bank.is_shared = is_shared;
        }
        if let Some(is_active) = payload.is_active {
            bank.is_active = is_active;
        }
        bank.updated_at = self.clock.now();
        self.store.update_bank(bank).await
    }

    pub async fn delete_bank(&self, ctx: &TenantContext, id: Uuid) -> Result<DeleteOutcome> {
        ctx.require_staff()?;
        let mut bank = self.get_bank(ctx, id).await?;
        if !self.store.bank_question_ids(id).await?.is_empty() {
            bank.is_active = false;
            bank.updated_at = self.clock.now();
            self.store.update_bank(bank).await?;
            return Ok(DeleteOutcome::Deactivated {
                reason: REFERENTIAL_INTEGRITY_VIOLATION.to_string(),
            });
        }
        self.store.delete_bank(ctx.tenant_id, id).await?;
        Ok(DeleteOutcome::Deleted)
    }

    pub async fn attach_question(
        &self,
        ctx: &TenantContext,
        bank_id: Uuid,
        question_id: Uuid,
    ) -> Result<BankMembership> {
        ctx.require_staff()?;
        let bank = self.get_bank(ctx, bank_id).await?;
        let question = self.get_question(ctx, question_id).await?;
        if !question.is_active {
            return Err(Error::BadRequest(format!(
                "Question {} is inactive",
                question_id
            )));
        }
        let changed = self.store.attach_question(bank.id, question.id).await?;
        Ok(BankMembership {
            bank_id,
            question_id,
            changed,
        })
    }

    pub async fn detach_question(
        &self,
        ctx: &TenantContext,
        bank_id: Uuid,
        question_id: Uuid,
    ) -> Result<BankMembership> {
        ctx.require_staff()?;
        self.get_bank(ctx, bank_id).await?;
        let changed = self.store.detach_question(bank_id, question_id).await?;
        if !changed {
            return Err(Error::NotFound(format!(
                "Question {} is not in bank {}",
                question_id, bank_id
            )));
        }
        Ok(BankMembership {
            bank_id,
            question_id,
            changed,
        })
    }

    pub async fn list_bank_questions(
        &self,
        ctx: &TenantContext,
        bank_id: Uuid,
    ) -> Result<Vec<Question>> {
        self.get_bank(ctx, bank_id).await?;
        let ids = self.store.bank_question_ids(bank_id).await?;
        let mut questions = self.store.find_questions(ctx.tenant_id, &ids).await?;
        questions.sort_by_key(|q| ids.iter().position(|id| *id == q.id));
        Ok(questions)
    }

    pub async fn request_share(
        &self,
        ctx: &TenantContext,
        payload: CreateSharePayload,
    ) -> Result<QuestionShare> {
        ctx.require_staff()?;
        if payload.from_tenant_id != ctx.tenant_id {
            return Err(Error::Forbidden(
                "Shares can only be offered from the caller's own tenant".to_string(),
            ));
        }
        if payload.to_tenant_id == ctx.tenant_id && payload.to_teacher_id == ctx.actor_id {
            return Err(Error::BadRequest("Cannot share a question with yourself".to_string()));
        }
        let question = self.get_question(ctx, payload.question_id).await?;

        let share = QuestionShare {
            id: Uuid::new_v4(),
            question_id: question.id,
            from_teacher_id: ctx.actor_id,
            to_teacher_id: payload.to_teacher_id,
            from_tenant_id: payload.from_tenant_id,
            to_tenant_id: payload.to_tenant_id,
            share_type: payload.share_type,
            status: ShareStatus::Pending,
            message: payload.message,
            cloned_question_id: None,
            resolved_at: None,
            created_at: self.clock.now(),
        };
        let share = self.store.insert_share(share).await?;
        tracing::info!(
            share_id = %share.id,
            question_id = %share.question_id,
            to_tenant_id = %share.to_tenant_id,
            "question share requested"
        );
        Ok(share)
    }

    pub async fn approve_share(&self, ctx: &TenantContext, share_id: Uuid) -> Result<QuestionShare> {
        self.resolve_share(ctx, share_id, ShareStatus::Approved).await
    }

    pub async fn reject_share(&self, ctx: &TenantContext, share_id: Uuid) -> Result<QuestionShare> {
        self.resolve_share(ctx, share_id, ShareStatus::Rejected).await
    }

    async fn resolve_share(
        &self,
        ctx: &TenantContext,
        share_id: Uuid,
        target: ShareStatus,
    ) -> Result<QuestionShare> {
        let mut share = self.load_share_for_recipient(ctx, share_id).await?;
        if share.status != ShareStatus::Pending {
            return Err(share_transition_error(&share, target));
        }

        let now = self.clock.now();
        let clone = if target == ShareStatus::Approved && share.share_type == ShareType::Copy {
            Some(self.build_clone(&share, now).await?)
        } else {
            None
        };

        share.status = target;
        share.resolved_at = Some(now);
        share.cloned_question_id = clone.as_ref().map(|c| c.question.id);

        match self.store.resolve_share(share, clone).await {
            Ok(resolved) => {
                tracing::info!(
                    share_id = %resolved.id,
                    status = resolved.status.as_str(),
                    cloned_question_id = ?resolved.cloned_question_id,
                    "question share resolved"
                );
                Ok(resolved)
            }
            Err(Error::Conflict(_)) => {
                // Lost a race with another resolver.
                let current = self.load_share_for_recipient(ctx, share_id).await?;
                Err(share_transition_error(&current, target))
            }
            Err(err) => Err(err),
        }
    }

    async fn load_share_for_recipient(
        &self,
        ctx: &TenantContext,
        share_id: Uuid,
    ) -> Result<QuestionShare> {
        let share = self
            .store
            .find_share(share_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Question share {} not found", share_id)))?;
        if share.to_tenant_id != ctx.tenant_id {
            // Shares addressed to other tenants are invisible here.
            return Err(Error::NotFound(format!("Question share {} not found", share_id)));
        }
        if share.to_teacher_id != ctx.actor_id {
            return Err(Error::Forbidden(
                "Only the receiving teacher can resolve this share".to_string(),
            ));
        }
        Ok(share)
    }

    async fn build_clone(
        &self,
        share: &QuestionShare,
        now: DateTime<Utc>,
    ) -> Result<ShareClone> {
        let source = self
            .store
            .find_question(share.from_tenant_id, share.question_id)
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!("Shared question {} no longer exists", share.question_id))
            })?;

        let stimulus = match source.stimulus_id {
            Some(stimulus_id) => self
                .store
                .find_stimulus(share.from_tenant_id, stimulus_id)
                .await?
                .map(|s| Stimulus {
                    id: Uuid::new_v4(),
                    tenant_id: share.to_tenant_id,
                    created_by: share.to_teacher_id,
                    created_at: now,
                    ..s
                }),
            None => None,
        };

        let question = Question {
            id: Uuid::new_v4(),
            tenant_id: share.to_tenant_id,
            stimulus_id: stimulus.as_ref().map(|s| s.id),
            created_by: share.to_teacher_id,
            is_active: true,
            created_at: now,
            updated_at: now,
            ..source
        };

        Ok(ShareClone { stimulus, question })
    }
}

fn share_transition_error(share: &QuestionShare, target: ShareStatus) -> Error {
    Error::InvalidStateTransition {
        entity: "question_share",
        from: share.status.as_str().to_string(),
        to: target.as_str().to_string(),
    }
}
