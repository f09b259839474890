//! Test-send audit log implementation

use reach_core::{
    models::TestSend,
    traits::TestSendLog,
    AppError, AppResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, error, instrument};
use uuid::Uuid;

/// PostgreSQL implementation of TestSendLog
pub struct PgTestSendLog {
    pool: PgPool,
}

impl PgTestSendLog {
    /// Create a new test-send log
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TestSendLog for PgTestSendLog {
    #[instrument(skip(self))]
    async fn count_today(&self, account_id: Uuid, now: DateTime<Utc>) -> AppResult<i64> {
        let result: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM test_sends
            WHERE account_id = $1
              AND created_at >= date_trunc('day', $2::timestamptz)
              AND created_at < date_trunc('day', $2::timestamptz) + interval '1 day'
            "#,
        )
        .bind(account_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error counting test sends: {}", e);
            AppError::Database(format!("Failed to count test sends: {}", e))
        })?;

        debug!("Account {} has {} test sends today", account_id, result.0);

        Ok(result.0)
    }

    #[instrument(skip(self, entry))]
    async fn record(&self, entry: &TestSend) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO test_sends (
                id, account_id, phone, content, channel,
                has_media, succeeded, tracking_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.id)
        .bind(entry.account_id)
        .bind(&entry.phone)
        .bind(&entry.content)
        .bind(entry.channel.to_string())
        .bind(entry.has_media)
        .bind(entry.succeeded)
        .bind(&entry.tracking_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error recording test send: {}", e);
            AppError::Database(format!("Failed to record test send: {}", e))
        })?;

        Ok(())
    }
}
