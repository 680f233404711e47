use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::Result;
use crate::middleware::auth::TenantContext;
use crate::models::{
    exam_attempt::ExamAttempt,
    item_analysis::{GroupStats, ItemQuality, OptionStatistic, QuestionItemAnalysis},
    question::{Question, QuestionType},
};
use crate::repositories::Store;
use crate::services::exam_service::ExamService;
use crate::services::scoring_service::{ItemOutcome, ScoringService};
use crate::utils::time::Clock;

/// Share of ranked attempts in each of the top and bottom groups.
const GROUP_FRACTION: f64 = 0.27;

#[derive(Clone)]
pub struct ItemAnalysisService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    exams: ExamService,
}

impl ItemAnalysisService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, exams: ExamService) -> Self {
        Self {
            store,
            clock,
            exams,
        }
    }

    /// Recomputes the analysis for an exam (optionally one schedule) and
    /// stores it as the latest snapshot.
    pub async fn analyze_exam(
        &self,
        ctx: &TenantContext,
        exam_id: Uuid,
        schedule_id: Option<Uuid>,
    ) -> Result<Vec<QuestionItemAnalysis>> {
        ctx.require_staff()?;
        self.exams.find_exam(ctx.tenant_id, exam_id).await?;
        let set = self.exams.question_set(ctx.tenant_id, exam_id).await?;
        let questions: Vec<(Question, i32)> = set
            .items
            .iter()
            .filter_map(|i| {
                let question = set.questions.get(&i.question_id)?.clone();
                Some((question, set.points(i.question_id)?))
            })
            .collect();
        let attempts = self
            .store
            .list_exam_attempts(ctx.tenant_id, exam_id, schedule_id)
            .await?;

        let rows = analyze(
            ctx.tenant_id,
            exam_id,
            schedule_id,
            &questions,
            &attempts,
            self.clock.now(),
        );
        self.store
            .replace_item_analyses(ctx.tenant_id, exam_id, schedule_id, rows.clone())
            .await?;
        tracing::info!(exam_id = %exam_id, schedule_id = ?schedule_id, questions = rows.len(), "item analysis computed");
        Ok(rows)
    }
}

/// Item statistics over the scored attempts in `attempts`. Each question is
/// paired with its effective points in the exam. Pure: the same inputs
/// always produce the same output.
pub fn analyze(
    tenant_id: Uuid,
    exam_id: Uuid,
    schedule_id: Option<Uuid>,
    questions: &[(Question, i32)],
    attempts: &[ExamAttempt],
    analyzed_at: DateTime<Utc>,
) -> Vec<QuestionItemAnalysis> {
    let mut closed: Vec<&ExamAttempt> = attempts
        .iter()
        .filter(|a| a.status.is_scored())
        .filter(|a| schedule_id.map_or(true, |s| a.schedule_id == Some(s)))
        .collect();
    closed.sort_by(|a, b| {
        b.total_score()
            .cmp(&a.total_score())
            .then_with(|| a.id.cmp(&b.id))
    });

    let n = closed.len();
    let group_size = if n == 0 {
        0
    } else {
        ((GROUP_FRACTION * n as f64).round() as usize).max(1)
    };
    let top: HashSet<Uuid> = closed.iter().take(group_size).map(|a| a.id).collect();
    let bottom: HashSet<Uuid> = closed.iter().rev().take(group_size).map(|a| a.id).collect();

    questions
        .iter()
        .map(|(question, points)| {
            analyze_question(
                tenant_id,
                exam_id,
                schedule_id,
                question,
                *points,
                &closed,
                &top,
                &bottom,
                analyzed_at,
            )
        })
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn analyze_question(
    tenant_id: Uuid,
    exam_id: Uuid,
    schedule_id: Option<Uuid>,
    question: &Question,
    points: i32,
    ranked: &[&ExamAttempt],
    top: &HashSet<Uuid>,
    bottom: &HashSet<Uuid>,
    analyzed_at: DateTime<Utc>,
) -> QuestionItemAnalysis {
    let mut total = 0;
    let mut correct = 0;
    let mut incorrect = 0;
    let mut blank = 0;
    let mut pending = 0;
    let mut top_stats = (0, 0);
    let mut bottom_stats = (0, 0);
    let mut picks: BTreeMap<String, i32> = BTreeMap::new();

    for attempt in ranked
        .iter()
        .filter(|a| a.question_order.contains(&question.id))
    {
        total += 1;
        let answer = attempt.answers.get(&question.id);
        let is_correct = match ScoringService::outcome(question, answer) {
            ItemOutcome::Correct => {
                correct += 1;
                true
            }
            ItemOutcome::Incorrect => {
                incorrect += 1;
                false
            }
            ItemOutcome::Blank => {
                blank += 1;
                false
            }
            ItemOutcome::Pending => match attempt.manual_scores.get(&question.id) {
                // A graded essay counts as correct only with full marks.
                Some(awarded) if *awarded >= Decimal::from(points) => {
                    correct += 1;
                    true
                }
                Some(_) => {
                    incorrect += 1;
                    false
                }
                None => {
                    pending += 1;
                    false
                }
            },
        };

        if top.contains(&attempt.id) {
            top_stats.1 += 1;
            top_stats.0 += i32::from(is_correct);
        }
        if bottom.contains(&attempt.id) {
            bottom_stats.1 += 1;
            bottom_stats.0 += i32::from(is_correct);
        }

        if question.question_type.has_option_statistics() {
            for key in ScoringService::picked_options(question, answer) {
                *picks.entry(key).or_default() += 1;
            }
        }
    }

    let top_group_stats = group_stats(top_stats);
    let bottom_group_stats = group_stats(bottom_stats);
    let difficulty_index = (total > 0).then(|| f64::from(correct) / f64::from(total));
    let discrimination_index = (total > 0)
        .then(|| (top_group_stats.percentage - bottom_group_stats.percentage) / 100.0);

    let option_statistics = if question.question_type.has_option_statistics() {
        option_statistics(question, picks, total)
    } else {
        Vec::new()
    };

    QuestionItemAnalysis {
        tenant_id,
        exam_id,
        schedule_id,
        question_id: question.id,
        total_attempts: total,
        correct_answers: correct,
        incorrect_answers: incorrect,
        blank_answers: blank,
        pending_answers: pending,
        difficulty_index,
        discrimination_index,
        option_statistics,
        top_group_stats,
        bottom_group_stats,
        quality: classify(discrimination_index),
        analyzed_at,
    }
}

fn group_stats((correct, total): (i32, i32)) -> GroupStats {
    let percentage = if total == 0 {
        0.0
    } else {
        f64::from(correct) * 100.0 / f64::from(total)
    };
    GroupStats {
        correct,
        total,
        percentage,
    }
}

fn option_statistics(
    question: &Question,
    mut picks: BTreeMap<String, i32>,
    total: i32,
) -> Vec<OptionStatistic> {
    let correct: HashSet<String> = ScoringService::correct_options(question).into_iter().collect();
    // Every option of a multiple choice question is listed even when unpicked.
    if question.question_type == QuestionType::MultipleChoice {
        for key in question.option_keys() {
            picks.entry(key).or_default();
        }
    } else {
        for key in &correct {
            picks.entry(key.clone()).or_default();
        }
    }

    let mut stats: Vec<OptionStatistic> = picks
        .into_iter()
        .map(|(option_key, count)| OptionStatistic {
            percentage: if total == 0 {
                0.0
            } else {
                f64::from(count) * 100.0 / f64::from(total)
            },
            is_correct: correct.contains(&option_key),
            option_key,
            count,
        })
        .collect();

    // Keep the authored option order for multiple choice.
    let order = question.option_keys();
    stats.sort_by_key(|s| order.iter().position(|k| *k == s.option_key).unwrap_or(usize::MAX));
    stats
}

/// Conventional bands for the discrimination index.
pub fn classify(discrimination: Option<f64>) -> ItemQuality {
    match discrimination {
        None => ItemQuality::Insufficient,
        Some(d) if d < 0.0 => ItemQuality::Miscalibrated,
        Some(d) if d < 0.2 => ItemQuality::Poor,
        Some(d) if d < 0.3 => ItemQuality::Marginal,
        Some(d) if d < 0.4 => ItemQuality::Good,
        Some(_) => ItemQuality::Excellent,
    }
}
