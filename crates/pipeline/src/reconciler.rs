//! Result Reconciler: turns a provider answer into a task patch.
//!
//! Pure logic, no I/O. The coordinator decides what to do with the
//! returned [`Reconciliation`].

use genflow_core::generation::TaskStatus;
use genflow_core::payload::TaskResult;
use genflow_db::models::generation_task::{GenerationTask, GenerationTaskPatch};
use genflow_providers::ProviderQueryResponse;

/// What a provider answer means for a stored task.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    /// `None` when nothing observable changed.
    pub patch: Option<GenerationTaskPatch>,
    /// Status after applying the answer.
    pub status: TaskStatus,
    /// Stored media must be copied to owned storage once the patch lands.
    pub needs_migration: bool,
    /// The task enters `success` with this write.
    pub first_success: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResultReconciler;

impl ResultReconciler {
    pub fn reconcile(&self, task: &GenerationTask, response: ProviderQueryResponse) -> Reconciliation {
        let status = task.status.advance(response.status);

        let info = response.info.filter(|info| task.info() != Some(info));
        let result = response
            .result
            .map(normalize_migration_flag)
            .filter(|result| task.result() != Some(result));

        let status_changed = status != task.status;
        let patch = (status_changed || info.is_some() || result.is_some()).then(|| {
            GenerationTaskPatch {
                status: Some(status),
                task_info: info,
                task_result: result,
                ..Default::default()
            }
        });

        let stored_or_new = patch
            .as_ref()
            .and_then(|p| p.task_result.as_ref())
            .or(task.result());
        let needs_migration = status == TaskStatus::Success
            && stored_or_new.is_some_and(|r| r.pending_migration);

        Reconciliation {
            patch,
            status,
            needs_migration,
            first_success: status == TaskStatus::Success && task.status != TaskStatus::Success,
        }
    }
}

/// A result whose assets are all already on owned storage does not need
/// migrating, whatever the adapter flagged.
fn normalize_migration_flag(mut result: TaskResult) -> TaskResult {
    if result.pending_migration && result.unmigrated_assets().next().is_none() {
        result.pending_migration = false;
    }
    result
}
