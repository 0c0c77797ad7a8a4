//! Generation task pipeline.
//!
//! Submission creates a task and hands it to a provider. From then on the
//! [`QueryCoordinator`] is the only writer of provider state: user polls
//! and the [`ReconciliationSweeper`] both go through it, and at most one
//! provider round-trip per task is in flight at any time. Successful
//! results whose media lives on provider infrastructure are handed to the
//! [`AssetUploader`], which copies them into owned storage in the
//! background.

pub mod coordinator;
pub mod error;
pub mod ledger;
pub mod notifier;
pub mod pending;
pub mod reconciler;
pub mod store;
pub mod submission;
pub mod sweeper;
pub mod uploader;

pub use coordinator::{Caller, QueryCoordinator};
pub use error::PipelineError;
pub use ledger::{CreditLedger, PgCreditLedger};
pub use notifier::{NotificationSink, Notifier, PgNotificationSink};
pub use pending::{PendingQueries, PendingQueryGuard};
pub use reconciler::{Reconciliation, ResultReconciler};
pub use store::{PgTaskStore, TaskStore};
pub use submission::SubmissionService;
pub use sweeper::{ReconciliationSweeper, SweepReport};
pub use uploader::{AssetUploader, MigrationJob, UploaderConfig, UploaderReport};
