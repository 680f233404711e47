pub mod analysis;
pub mod attempts;
pub mod exams;
pub mod grading;
pub mod health;
pub mod questions;
