use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{
    exam::ExamType,
    grade_conversion::{GradeConversion, GradeScope},
};
use crate::utils::validation::{non_negative, percentage};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateGradeConversionPayload {
    pub exam_id: Uuid,
    pub scope: GradeScope,
    pub subject_id: Option<Uuid>,
    pub class_id: Option<Uuid>,
    pub student_id: Option<Uuid>,
    #[validate(custom(function = "non_negative"))]
    pub min_score: Decimal,
    #[validate(custom(function = "non_negative"))]
    pub max_score: Decimal,
    #[validate(length(min = 1, max = 16))]
    pub grade: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct EvaluateGradeQuery {
    pub exam_id: Uuid,
    pub score: Decimal,
    pub student_id: Option<Uuid>,
    pub class_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeEvaluation {
    pub grade: String,
    pub scope: GradeScope,
    pub band: GradeConversion,
    /// Another pair of bands in the same scope overlaps.
    pub overlap_warning: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CurveBand {
    #[validate(length(min = 1, max = 16))]
    pub grade: String,
    #[validate(custom(function = "percentage"))]
    pub min_percentile: Decimal,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DeriveCurvePayload {
    pub exam_id: Uuid,
    pub class_id: Uuid,
    #[validate(length(min = 1), nested)]
    pub bands: Vec<CurveBand>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurveResult {
    pub sample_size: usize,
    pub conversions: Vec<GradeConversion>,
    /// Grades whose band collapsed because neighbouring percentiles share a score.
    pub skipped_grades: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AggregatePayload {
    pub subject_id: Uuid,
    pub class_id: Uuid,
    #[validate(length(min = 1))]
    pub semester: String,
    #[validate(length(min = 1))]
    pub academic_year: String,
    pub scores: BTreeMap<ExamType, Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub exam_type: ExamType,
    pub score: Decimal,
    pub weight: Decimal,
    pub weighted: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectAggregate {
    pub final_score: Decimal,
    pub total_weight: Decimal,
    /// Configured weights do not sum to 100.
    pub weight_warning: bool,
    pub missing_exam_types: Vec<ExamType>,
    pub contributions: Vec<Contribution>,
}
