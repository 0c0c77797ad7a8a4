//! Repository for the `credit_transactions` ledger.

use genflow_core::types::{Credits, DbId};
use sqlx::PgPool;

use crate::models::credit::{
    ConsumeOutcome, CreditTransaction, KIND_CONSUME, KIND_GRANT, KIND_REFUND,
};

/// Column list for `credit_transactions` queries.
const COLUMNS: &str = "id, user_id, amount, kind, description, task_id, created_at";

/// Provides ledger operations. Balances are derived, never stored.
pub struct CreditRepo;

impl CreditRepo {
    /// Current balance of a user (sum of all entries).
    pub async fn balance(pool: &PgPool, user_id: DbId) -> Result<Credits, sqlx::Error> {
        sqlx::query_scalar::<_, Credits>(
            "SELECT COALESCE(SUM(amount), 0)::INTEGER FROM credit_transactions WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await
    }

    /// Add credits to a user's balance.
    pub async fn grant(
        pool: &PgPool,
        user_id: DbId,
        amount: Credits,
        description: &str,
    ) -> Result<CreditTransaction, sqlx::Error> {
        let query = format!(
            "INSERT INTO credit_transactions (user_id, amount, kind, description) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, CreditTransaction>(&query)
            .bind(user_id)
            .bind(amount)
            .bind(KIND_GRANT)
            .bind(description)
            .fetch_one(pool)
            .await
    }

    /// Deduct `amount` if the balance covers it.
    ///
    /// Concurrent consumptions for the same user are serialised with a
    /// transaction-scoped advisory lock keyed by the user id, so two
    /// submissions cannot both pass the balance check.
    pub async fn consume(
        pool: &PgPool,
        user_id: DbId,
        amount: Credits,
        description: &str,
    ) -> Result<ConsumeOutcome, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let available = sqlx::query_scalar::<_, Credits>(
            "SELECT COALESCE(SUM(amount), 0)::INTEGER FROM credit_transactions WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        if available < amount {
            tx.rollback().await?;
            return Ok(ConsumeOutcome::Insufficient { available });
        }

        let query = format!(
            "INSERT INTO credit_transactions (user_id, amount, kind, description) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        let entry = sqlx::query_as::<_, CreditTransaction>(&query)
            .bind(user_id)
            .bind(-amount)
            .bind(KIND_CONSUME)
            .bind(description)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(ConsumeOutcome::Consumed(entry))
    }

    /// Return `amount` credits for a task whose submission failed.
    ///
    /// At most one refund exists per task; a repeated call returns `None`.
    pub async fn refund(
        pool: &PgPool,
        user_id: DbId,
        amount: Credits,
        task_id: DbId,
        description: &str,
    ) -> Result<Option<CreditTransaction>, sqlx::Error> {
        let query = format!(
            "INSERT INTO credit_transactions (user_id, amount, kind, description, task_id) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (task_id) WHERE kind = 'refund' DO NOTHING \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, CreditTransaction>(&query)
            .bind(user_id)
            .bind(amount)
            .bind(KIND_REFUND)
            .bind(description)
            .bind(task_id)
            .fetch_optional(pool)
            .await
    }

    /// Give back a consumption that never became a task.
    ///
    /// Written as a `refund` entry with no `task_id`, so it is outside the
    /// one-refund-per-task constraint.
    pub async fn reverse(
        pool: &PgPool,
        charge: &CreditTransaction,
        description: &str,
    ) -> Result<CreditTransaction, sqlx::Error> {
        let query = format!(
            "INSERT INTO credit_transactions (user_id, amount, kind, description) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, CreditTransaction>(&query)
            .bind(charge.user_id)
            .bind(-charge.amount)
            .bind(KIND_REFUND)
            .bind(description)
            .fetch_one(pool)
            .await
    }
}
