use chrono::Duration;
use serde::Serialize;

use crate::error::Result;
use crate::services::{attempt_service::AttemptService, exam_service::ExamService};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub statuses_changed: usize,
    pub attempts_timed_out: usize,
    pub attempts_abandoned: usize,
}

/// Periodic housekeeping: exam and schedule status transitions, attempt
/// timeouts and stale attempt cleanup.
#[derive(Clone)]
pub struct SweepService {
    exams: ExamService,
    attempts: AttemptService,
    stale_after: Duration,
}

impl SweepService {
    pub fn new(exams: ExamService, attempts: AttemptService, stale_after: Duration) -> Self {
        Self {
            exams,
            attempts,
            stale_after,
        }
    }

    pub async fn run_once(&self, now: chrono::DateTime<chrono::Utc>) -> Result<SweepReport> {
        let statuses_changed = self.exams.refresh_statuses(now).await?;
        let attempts_timed_out = self.attempts.expire_due_attempts(now).await?;
        let attempts_abandoned = self
            .attempts
            .abandon_stale_attempts(now, self.stale_after)
            .await?;

        let report = SweepReport {
            statuses_changed,
            attempts_timed_out,
            attempts_abandoned,
        };
        if report != SweepReport::default() {
            tracing::info!(
                statuses_changed,
                attempts_timed_out,
                attempts_abandoned,
                "sweep applied changes"
            );
        }
        Ok(report)
    }
}
