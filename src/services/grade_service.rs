use std::collections::HashSet;
use std::sync::Arc;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::dto::grading_dto::{
    AggregatePayload, Contribution, CreateGradeConversionPayload, CurveBand, CurveResult,
    DeriveCurvePayload, EvaluateGradeQuery, GradeEvaluation, SubjectAggregate,
};
use crate::error::{Error, Result};
use crate::middleware::auth::TenantContext;
use crate::models::{
    exam::ExamType,
    exam_weight::ExamWeight,
    grade_conversion::{GradeConversion, GradeScope},
};
use crate::repositories::{Store, WeightScope};
use crate::services::exam_service::ExamService;
use crate::utils::time::Clock;

#[derive(Clone)]
pub struct GradeService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    exams: ExamService,
}

impl GradeService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, exams: ExamService) -> Self {
        Self {
            store,
            clock,
            exams,
        }
    }

    pub async fn create_conversion(
        &self,
        ctx: &TenantContext,
        payload: CreateGradeConversionPayload,
    ) -> Result<GradeConversion> {
        ctx.require_staff()?;
        if payload.min_score > payload.max_score {
            return Err(Error::BadRequest(
                "min_score must not exceed max_score".to_string(),
            ));
        }
        match payload.scope {
            GradeScope::PerStudent if payload.student_id.is_none() => {
                return Err(Error::BadRequest(
                    "per_student conversions require student_id".to_string(),
                ))
            }
            GradeScope::PerClass if payload.class_id.is_none() => {
                return Err(Error::BadRequest(
                    "per_class conversions require class_id".to_string(),
                ))
            }
            _ => {}
        }
        let exam = self.exams.find_exam(ctx.tenant_id, payload.exam_id).await?;

        let conversion = GradeConversion {
            id: Uuid::new_v4(),
            tenant_id: ctx.tenant_id,
            exam_id: exam.id,
            subject_id: payload.subject_id.or(exam.subject_id),
            class_id: payload.class_id,
            student_id: payload.student_id,
            scope: payload.scope,
            min_score: payload.min_score,
            max_score: payload.max_score,
            grade: payload.grade.trim().to_string(),
            created_at: self.clock.now(),
        };
        self.store.insert_grade_conversion(conversion).await
    }

    pub async fn evaluate(
        &self,
        ctx: &TenantContext,
        query: EvaluateGradeQuery,
    ) -> Result<GradeEvaluation> {
        self.exams.find_exam(ctx.tenant_id, query.exam_id).await?;
        let all = self
            .store
            .list_grade_conversions(ctx.tenant_id, query.exam_id)
            .await?;

        let student_bands: Vec<GradeConversion> = match query.student_id {
            Some(student_id) => all
                .iter()
                .filter(|c| c.scope == GradeScope::PerStudent && c.student_id == Some(student_id))
                .cloned()
                .collect(),
            None => Vec::new(),
        };

        let (scope, bands) = if !student_bands.is_empty() {
            (GradeScope::PerStudent, student_bands)
        } else {
            let class_id = query.class_id.ok_or_else(|| {
                Error::BadRequest(
                    "class_id is required when no per_student conversions apply".to_string(),
                )
            })?;
            let bands = all
                .into_iter()
                .filter(|c| c.scope == GradeScope::PerClass && c.class_id == Some(class_id))
                .collect();
            (GradeScope::PerClass, bands)
        };

        let band = select_band(&bands, query.score)?.clone();
        let overlap_warning = has_overlap(&bands);
        if overlap_warning {
            tracing::warn!(exam_id = %query.exam_id, scope = ?scope, "overlapping grade bands");
        }

        Ok(GradeEvaluation {
            grade: band.grade.clone(),
            scope,
            band,
            overlap_warning,
        })
    }

    /// Builds per_class bands from the score distribution of a class's
    /// completed attempts.
    pub async fn derive_class_curve(
        &self,
        ctx: &TenantContext,
        payload: DeriveCurvePayload,
    ) -> Result<CurveResult> {
        ctx.require_staff()?;
        let exam = self.exams.find_exam(ctx.tenant_id, payload.exam_id).await?;

        let existing = self
            .store
            .list_grade_conversions(ctx.tenant_id, exam.id)
            .await?;
        if existing
            .iter()
            .any(|c| c.scope == GradeScope::PerClass && c.class_id == Some(payload.class_id))
        {
            return Err(Error::Conflict(format!(
                "Class {} already has grade bands for exam {}",
                payload.class_id, exam.id
            )));
        }

        let schedules: HashSet<Uuid> = self
            .store
            .list_schedules(ctx.tenant_id, exam.id)
            .await?
            .into_iter()
            .filter(|s| s.class_id == payload.class_id)
            .map(|s| s.id)
            .collect();
        let mut scores: Vec<Decimal> = self
            .store
            .list_exam_attempts(ctx.tenant_id, exam.id, None)
            .await?
            .into_iter()
            .filter(|a| a.status.is_scored())
            .filter(|a| a.schedule_id.is_some_and(|s| schedules.contains(&s)))
            .map(|a| a.total_score())
            .collect();
        if scores.is_empty() {
            return Err(Error::BadRequest(
                "No completed attempts for this class".to_string(),
            ));
        }
        scores.sort();

        let ceiling = self
            .exams
            .question_set(ctx.tenant_id, exam.id)
            .await?
            .total_points()
            .max(scores[scores.len() - 1]);
        let (ranges, skipped_grades) = curve_ranges(&scores, &payload.bands, ceiling);

        let now = self.clock.now();
        let mut conversions = Vec::with_capacity(ranges.len());
        for (grade, min_score, max_score) in ranges {
            let conversion = GradeConversion {
                id: Uuid::new_v4(),
                tenant_id: ctx.tenant_id,
                exam_id: exam.id,
                subject_id: exam.subject_id,
                class_id: Some(payload.class_id),
                student_id: None,
                scope: GradeScope::PerClass,
                min_score,
                max_score,
                grade,
                created_at: now,
            };
            conversions.push(self.store.insert_grade_conversion(conversion).await?);
        }
        tracing::info!(
            exam_id = %exam.id,
            class_id = %payload.class_id,
            sample_size = scores.len(),
            bands = conversions.len(),
            "class curve derived"
        );

        Ok(CurveResult {
            sample_size: scores.len(),
            conversions,
            skipped_grades,
        })
    }

    pub async fn aggregate_subject(
        &self,
        ctx: &TenantContext,
        payload: AggregatePayload,
    ) -> Result<SubjectAggregate> {
        let scope = WeightScope {
            subject_id: payload.subject_id,
            class_id: payload.class_id,
            semester: payload.semester.clone(),
            academic_year: payload.academic_year.clone(),
        };
        let weights = self.store.list_weights(ctx.tenant_id, &scope).await?;
        if weights.is_empty() {
            return Err(Error::NotFound(format!(
                "No exam weights configured for subject {} in class {}",
                payload.subject_id, payload.class_id
            )));
        }
        let aggregate = aggregate(&weights, &payload.scores);
        if aggregate.weight_warning {
            tracing::warn!(
                subject_id = %payload.subject_id,
                class_id = %payload.class_id,
                total_weight = %aggregate.total_weight,
                "exam weights do not sum to 100"
            );
        }
        Ok(aggregate)
    }
}

/// The single band containing `score`.
pub fn select_band(bands: &[GradeConversion], score: Decimal) -> Result<&GradeConversion> {
    let containing: Vec<&GradeConversion> = bands.iter().filter(|b| b.contains(score)).collect();
    // A boundary shared by adjacent bands belongs to the higher one.
    let matches: Vec<&GradeConversion> = containing
        .iter()
        .copied()
        .filter(|b| {
            !(b.max_score == score
                && containing
                    .iter()
                    .any(|o| o.min_score == score && o.max_score > score))
        })
        .collect();
    match matches.as_slice() {
        [band] => Ok(band),
        [] => Err(Error::NoMatchingGradeRange { score }),
        many => Err(Error::AmbiguousGradeRange {
            score,
            matches: many.len(),
        }),
    }
}

pub fn has_overlap(bands: &[GradeConversion]) -> bool {
    bands
        .iter()
        .enumerate()
        .any(|(i, a)| bands[i + 1..].iter().any(|b| a.overlaps(b)))
}

/// Nearest-rank percentile over ascending `sorted` scores.
fn percentile(sorted: &[Decimal], pct: Decimal) -> Decimal {
    let n = Decimal::from(sorted.len());
    let rank = (pct / Decimal::ONE_HUNDRED * n).ceil();
    let index = rank.to_usize().unwrap_or(1).clamp(1, sorted.len());
    sorted[index - 1]
}

/// Turns percentile bands into contiguous `(grade, min, max)` score ranges,
/// highest grade first. Each band's max is the next band's min. Bands that
/// collapse onto a neighbour are returned separately.
fn curve_ranges(
    sorted: &[Decimal],
    bands: &[CurveBand],
    ceiling: Decimal,
) -> (Vec<(String, Decimal, Decimal)>, Vec<String>) {
    let mut ordered: Vec<&CurveBand> = bands.iter().collect();
    ordered.sort_by(|a, b| b.min_percentile.cmp(&a.min_percentile));

    let mut ranges = Vec::new();
    let mut skipped = Vec::new();
    let mut upper: Option<Decimal> = None;
    let last = ordered.len().saturating_sub(1);
    for (i, band) in ordered.into_iter().enumerate() {
        let min = if i == last {
            Decimal::ZERO
        } else {
            percentile(sorted, band.min_percentile)
        };
        let collapsed = match upper {
            None => min > ceiling,
            Some(upper) => min >= upper,
        };
        if collapsed {
            skipped.push(band.grade.clone());
            continue;
        }
        ranges.push((band.grade.clone(), min, upper.unwrap_or(ceiling)));
        upper = Some(min);
    }
    (ranges, skipped)
}

/// Weighted subject score from per-exam-type scores.
pub fn aggregate(
    weights: &[ExamWeight],
    scores: &std::collections::BTreeMap<ExamType, Decimal>,
) -> SubjectAggregate {
    let mut ordered: Vec<&ExamWeight> = weights.iter().collect();
    ordered.sort_by_key(|w| w.exam_type);

    let mut contributions = Vec::new();
    let mut missing_exam_types = Vec::new();
    for weight in &ordered {
        match scores.get(&weight.exam_type) {
            Some(score) => contributions.push(Contribution {
                exam_type: weight.exam_type,
                score: *score,
                weight: weight.weight,
                weighted: *score * weight.weight / Decimal::ONE_HUNDRED,
            }),
            None => missing_exam_types.push(weight.exam_type),
        }
    }

    let total_weight: Decimal = ordered.iter().map(|w| w.weight).sum();
    SubjectAggregate {
        final_score: contributions.iter().map(|c| c.weighted).sum(),
        total_weight,
        weight_warning: total_weight != Decimal::ONE_HUNDRED,
        missing_exam_types,
        contributions,
    }
}
