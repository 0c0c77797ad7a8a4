//! Periodic in-process reconciliation sweep.
//!
//! Enabled by `SWEEP_INTERVAL_SECS`. Runs the same
//! [`ReconciliationSweeper::run_once`] as the sweep endpoint, so an external
//! scheduler and this loop can coexist: whichever reaches a task second
//! sees it as in progress and skips it.

use std::sync::Arc;
use std::time::Duration;

use genflow_pipeline::ReconciliationSweeper;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Run the sweep loop until `cancel` is triggered.
///
/// The first sweep runs one full `interval` after startup.
pub async fn run(sweeper: Arc<ReconciliationSweeper>, interval: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = interval.as_secs(), "Reconciliation sweep started");

    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Reconciliation sweep stopping");
                break;
            }
            _ = ticker.tick() => {
                match sweeper.run_once().await {
                    Ok(report) if report.examined > 0 => {
                        tracing::info!(?report, "Reconciliation sweep finished");
                    }
                    Ok(_) => tracing::debug!("Reconciliation sweep: nothing to do"),
                    Err(e) => tracing::error!(error = %e, "Reconciliation sweep failed"),
                }
            }
        }
    }
}
