//! Monthly free-credit ledger implementation
//!
//! Credit rows are created lazily per account and month with the default
//! allowance; `consume_credits` upserts so the first consumption of a month
//! does not race row creation.

use reach_core::{
    models::MonthlyCredit,
    traits::CreditLedger,
    AppError, AppResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, error, instrument};
use uuid::Uuid;

/// PostgreSQL implementation of CreditLedger
pub struct PgCreditLedger {
    pool: PgPool,
    default_allowance: i32,
}

impl PgCreditLedger {
    /// Create a new credit ledger with the given monthly allowance
    pub fn new(pool: PgPool, default_allowance: i32) -> Self {
        Self {
            pool,
            default_allowance,
        }
    }
}

#[async_trait]
impl CreditLedger for PgCreditLedger {
    #[instrument(skip(self))]
    async fn remaining_credits(&self, account_id: Uuid, at: DateTime<Utc>) -> AppResult<i32> {
        let month = MonthlyCredit::month_key(at);

        let row: Option<(i32, i32)> = sqlx::query_as(
            r#"
            SELECT total_credits, used_credits
            FROM monthly_credits
            WHERE account_id = $1 AND year_month = $2
            "#,
        )
        .bind(account_id)
        .bind(&month)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error reading credits: {}", e);
            AppError::Database(format!("Failed to read credits: {}", e))
        })?;

        let remaining = match row {
            Some((total, used)) => (total - used).max(0),
            None => self.default_allowance,
        };

        debug!(
            "Account {} has {} credits remaining for {}",
            account_id, remaining, month
        );

        Ok(remaining)
    }

    #[instrument(skip(self))]
    async fn consume_credits(
        &self,
        account_id: Uuid,
        at: DateTime<Utc>,
        count: i32,
    ) -> AppResult<()> {
        if count <= 0 {
            return Ok(());
        }

        let month = MonthlyCredit::month_key(at);

        let result = sqlx::query(
            r#"
            INSERT INTO monthly_credits (account_id, year_month, total_credits, used_credits)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (account_id, year_month)
            DO UPDATE SET
                used_credits = monthly_credits.used_credits + $4,
                updated_at = NOW()
            WHERE monthly_credits.used_credits + $4 <= monthly_credits.total_credits
            "#,
        )
        .bind(account_id)
        .bind(&month)
        .bind(self.default_allowance)
        .bind(count)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error consuming credits: {}", e);
            AppError::Database(format!("Failed to consume credits: {}", e))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::InvalidInput(format!(
                "Not enough credits to consume {} for {}",
                count, month
            )));
        }

        debug!("Consumed {} credits for account {} in {}", count, account_id, month);

        Ok(())
    }
}
