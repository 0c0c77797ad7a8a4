//! Submission flow: price, charge, record, hand to the provider.

use std::sync::Arc;

use genflow_core::generation::{GenerationRequest, TaskStatus};
use genflow_core::payload::TaskInfo;
use genflow_core::types::DbId;
use genflow_db::models::credit::{ConsumeOutcome, CreditTransaction};
use genflow_db::models::generation_task::{
    CreateGenerationTask, GenerationTask, GenerationTaskPatch,
};
use genflow_providers::{ProviderError, ProviderRegistry, SubmitRequest};

use crate::error::PipelineError;
use crate::ledger::CreditLedger;
use crate::store::TaskStore;

/// `task_info.state` after the provider accepted the job.
pub const STATE_SUBMITTED: &str = "submitted";

/// `task_info.state` when the provider refused the job.
pub const STATE_SUBMIT_FAILED: &str = "submit_failed";

pub struct SubmissionService {
    store: Arc<dyn TaskStore>,
    ledger: Arc<dyn CreditLedger>,
    providers: ProviderRegistry,
}

impl SubmissionService {
    pub fn new(
        store: Arc<dyn TaskStore>,
        ledger: Arc<dyn CreditLedger>,
        providers: ProviderRegistry,
    ) -> Self {
        Self {
            store,
            ledger,
            providers,
        }
    }

    /// Create a task for `user_id` and submit it.
    ///
    /// Input is validated and priced before anything is written. If the
    /// provider does not accept the job, the credits are refunded, the
    /// task is marked `failed` and the provider error is returned. If the
    /// task cannot be recorded after charging, the charge is reversed.
    pub async fn submit(
        &self,
        user_id: DbId,
        request: &GenerationRequest,
    ) -> Result<GenerationTask, PipelineError> {
        let cost = request.validate_and_price()?;
        let adapter = self.providers.get(&request.provider)?;

        let available = self.ledger.balance(user_id).await?;
        if available < cost {
            return Err(PipelineError::InsufficientCredits {
                required: cost,
                available,
            });
        }

        let description = format!("{} {} ({})", request.media_kind, request.scene, request.model);
        let charge = match self.ledger.consume(user_id, cost, &description).await? {
            ConsumeOutcome::Consumed(tx) => tx,
            ConsumeOutcome::Insufficient { available } => {
                return Err(PipelineError::InsufficientCredits {
                    required: cost,
                    available,
                })
            }
        };

        let created = self
            .store
            .create(&CreateGenerationTask {
                user_id,
                media_kind: request.media_kind,
                provider: request.provider.clone(),
                model: request.model.clone(),
                scene: request.scene.clone(),
                prompt: request.prompt.clone(),
                options: request.options.clone(),
                cost_credits: cost,
                credit_transaction_id: Some(charge.id),
            })
            .await;
        let task = match created {
            Ok(task) => task,
            Err(e) => {
                self.reverse_charge(&charge, &e).await;
                return Err(e.into());
            }
        };

        let submit = SubmitRequest {
            media_kind: request.media_kind,
            model: request.model.clone(),
            scene: request.scene.clone(),
            prompt: request.prompt.clone(),
            options: request.options.clone(),
        };

        match adapter.submit(&submit).await {
            Ok(accepted) => {
                let patch = GenerationTaskPatch {
                    external_job_id: Some(accepted.external_job_id.clone()),
                    task_info: Some(TaskInfo {
                        state: STATE_SUBMITTED.into(),
                        raw: accepted.raw,
                        ..Default::default()
                    }),
                    ..Default::default()
                };
                let task = self
                    .store
                    .update_by_id(task.id, &patch)
                    .await?
                    .ok_or_else(|| PipelineError::task_not_found(task.id))?;

                tracing::info!(
                    task_id = task.id,
                    user_id,
                    provider = %task.provider,
                    external_job_id = %accepted.external_job_id,
                    cost,
                    "Generation task submitted",
                );
                Ok(task)
            }
            Err(e) => {
                self.fail_submission(&task, &e).await?;
                Err(e.into())
            }
        }
    }

    /// The task row was never written, so there is nothing to key a refund
    /// on; hand the charge back directly.
    async fn reverse_charge(&self, charge: &CreditTransaction, cause: &sqlx::Error) {
        tracing::error!(user_id = charge.user_id, charge_id = charge.id, error = %cause, "Task insert failed after charging");
        let description = format!("Reversal of charge {}: task was not recorded", charge.id);
        if let Err(e) = self.ledger.reverse(charge, &description).await {
            tracing::error!(
                user_id = charge.user_id,
                charge_id = charge.id,
                amount = -charge.amount,
                error = %e,
                "Failed to reverse charge; credits need manual return",
            );
        }
    }

    async fn fail_submission(&self, task: &GenerationTask, err: &ProviderError) -> Result<(), PipelineError> {
        tracing::error!(task_id = task.id, provider = %task.provider, error = %err, "Provider submit failed");

        let refund = self
            .ledger
            .refund(
                task.user_id,
                task.cost_credits,
                task.id,
                &format!("Refund for failed submission of task {}", task.id),
            )
            .await?;
        if refund.is_none() {
            tracing::warn!(task_id = task.id, "Task already refunded");
        }

        let patch = GenerationTaskPatch {
            status: Some(TaskStatus::Failed),
            task_info: Some(TaskInfo::error(STATE_SUBMIT_FAILED, err.to_string())),
            ..Default::default()
        };
        self.store.update_by_id(task.id, &patch).await?;
        Ok(())
    }
}
