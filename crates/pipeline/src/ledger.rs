//! Credit Ledger seam.

use async_trait::async_trait;
use genflow_core::types::{Credits, DbId};
use genflow_db::models::credit::{ConsumeOutcome, CreditTransaction};
use genflow_db::repositories::CreditRepo;
use sqlx::PgPool;

#[async_trait]
pub trait CreditLedger: Send + Sync {
    async fn balance(&self, user_id: DbId) -> Result<Credits, sqlx::Error>;

    /// Deduct `amount` atomically with the balance check.
    async fn consume(
        &self,
        user_id: DbId,
        amount: Credits,
        description: &str,
    ) -> Result<ConsumeOutcome, sqlx::Error>;

    /// Give back credits for a task. Returns `None` if that task was
    /// already refunded.
    async fn refund(
        &self,
        user_id: DbId,
        amount: Credits,
        task_id: DbId,
        description: &str,
    ) -> Result<Option<CreditTransaction>, sqlx::Error>;

    /// Undo a consumption that has no task to refund against.
    async fn reverse(
        &self,
        charge: &CreditTransaction,
        description: &str,
    ) -> Result<CreditTransaction, sqlx::Error>;
}

/// [`CreditLedger`] backed by the `credit_transactions` table.
#[derive(Clone)]
pub struct PgCreditLedger {
    pool: PgPool,
}

impl PgCreditLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CreditLedger for PgCreditLedger {
    async fn balance(&self, user_id: DbId) -> Result<Credits, sqlx::Error> {
        CreditRepo::balance(&self.pool, user_id).await
    }

    async fn consume(
        &self,
        user_id: DbId,
        amount: Credits,
        description: &str,
    ) -> Result<ConsumeOutcome, sqlx::Error> {
        CreditRepo::consume(&self.pool, user_id, amount, description).await
    }

    async fn refund(
        &self,
        user_id: DbId,
        amount: Credits,
        task_id: DbId,
        description: &str,
    ) -> Result<Option<CreditTransaction>, sqlx::Error> {
        CreditRepo::refund(&self.pool, user_id, amount, task_id, description).await
    }

    async fn reverse(
        &self,
        charge: &CreditTransaction,
        description: &str,
    ) -> Result<CreditTransaction, sqlx::Error> {
        CreditRepo::reverse(&self.pool, charge, description).await
    }
}
