//! Credit ledger entries.

use genflow_core::types::{Credits, DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

pub const KIND_GRANT: &str = "grant";
pub const KIND_CONSUME: &str = "consume";
pub const KIND_REFUND: &str = "refund";

/// A row from the `credit_transactions` table.
///
/// `amount` is signed: grants and refunds are positive, consumptions
/// negative.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CreditTransaction {
    pub id: DbId,
    pub user_id: DbId,
    pub amount: Credits,
    pub kind: String,
    pub description: String,
    pub task_id: Option<DbId>,
    pub created_at: Timestamp,
}

/// Outcome of an attempted consumption.
#[derive(Debug, Clone)]
pub enum ConsumeOutcome {
    Consumed(CreditTransaction),
    Insufficient { available: Credits },
}
