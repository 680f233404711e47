pub mod attempt_service;
pub mod exam_service;
pub mod grade_service;
pub mod item_analysis_service;
pub mod question_service;
pub mod scoring_service;
pub mod sweep_service;
