//! Reconciliation Sweeper.
//!
//! Re-drives tasks nobody is polling (the user closed the page mid-run)
//! through the [`QueryCoordinator`] as a system caller.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;

use crate::coordinator::{Caller, QueryCoordinator};
use crate::error::PipelineError;
use crate::store::TaskStore;

/// Default per-run cap on tasks examined.
pub const DEFAULT_BATCH_LIMIT: i64 = 50;

/// Provider round-trips run concurrently within one sweep.
const SWEEP_CONCURRENCY: usize = 4;

/// Counters for one sweep run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Submitted tasks driven through the coordinator.
    pub examined: u32,
    /// Stored state changed.
    pub updated: u32,
    pub unchanged: u32,
    /// Another query for the task was running.
    pub skipped_in_progress: u32,
    /// Submission never completed. Counted, never examined.
    pub skipped_no_job_id: u32,
    pub failed: u32,
}

enum Outcome {
    Updated,
    Unchanged,
    InProgress,
    NoJobId,
    Failed,
}

pub struct ReconciliationSweeper {
    store: Arc<dyn TaskStore>,
    coordinator: QueryCoordinator,
    batch_limit: i64,
}

impl ReconciliationSweeper {
    pub fn new(store: Arc<dyn TaskStore>, coordinator: QueryCoordinator, batch_limit: i64) -> Self {
        Self {
            store,
            coordinator,
            batch_limit: batch_limit.max(1),
        }
    }

    /// Examine up to `batch_limit` submitted pending/processing tasks once.
    ///
    /// Tasks without an external job id are never re-driven; they are only
    /// counted. Every examined task is marked swept before its query runs,
    /// so consecutive runs rotate through the backlog. Only a failure to
    /// read the backlog is an error; per-task problems are counted in the
    /// report.
    pub async fn run_once(&self) -> Result<SweepReport, PipelineError> {
        let unsubmitted = self.store.count_unsubmitted_in_progress().await?;
        if unsubmitted > 0 {
            tracing::info!(count = unsubmitted, "Sweep: tasks without an external job id skipped");
        }

        let tasks = self.store.list_in_progress(self.batch_limit).await?;
        let ids: Vec<_> = tasks.iter().map(|t| t.id).collect();
        if let Err(e) = self.store.mark_swept(&ids).await {
            tracing::warn!(error = %e, "Sweep: failed to record swept tasks");
        }

        let mut report = SweepReport {
            examined: tasks.len() as u32,
            skipped_no_job_id: unsubmitted as u32,
            ..Default::default()
        };

        let outcomes: Vec<Outcome> = stream::iter(tasks)
            .map(|task| async move {
                match self.coordinator.query(task.id, Caller::System).await {
                    Ok(after) if after != task => Outcome::Updated,
                    Ok(_) => Outcome::Unchanged,
                    Err(PipelineError::QueryInProgress(_)) => {
                        tracing::debug!(task_id = task.id, "Sweep: query already in progress; skipping");
                        Outcome::InProgress
                    }
                    Err(PipelineError::NotTaskable(_)) => Outcome::NoJobId,
                    Err(e) => {
                        tracing::warn!(task_id = task.id, error = %e, "Sweep: task query failed");
                        Outcome::Failed
                    }
                }
            })
            .buffer_unordered(SWEEP_CONCURRENCY)
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                Outcome::Updated => report.updated += 1,
                Outcome::Unchanged => report.unchanged += 1,
                Outcome::InProgress => report.skipped_in_progress += 1,
                Outcome::NoJobId => report.skipped_no_job_id += 1,
                Outcome::Failed => report.failed += 1,
            }
        }

        tracing::info!(
            examined = report.examined,
            updated = report.updated,
            unchanged = report.unchanged,
            skipped_in_progress = report.skipped_in_progress,
            skipped_no_job_id = report.skipped_no_job_id,
            failed = report.failed,
            "Reconciliation sweep finished",
        );
        Ok(report)
    }
}
