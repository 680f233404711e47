pub mod exam;
pub mod exam_attempt;
pub mod exam_schedule;
pub mod exam_weight;
pub mod grade_conversion;
pub mod item_analysis;
pub mod question;
pub mod question_bank;
pub mod question_share;
pub mod stimulus;
