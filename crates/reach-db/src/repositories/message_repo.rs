//! Outbound message repository implementation
//!
//! The `dedupe_key` column carries a unique constraint; inserting a second
//! row for the same campaign/customer pair fails with `AlreadyExists`, which
//! the dispatcher treats as an already-handled recipient.

use reach_core::{
    models::{MessageStatus, OutboundMessage},
    traits::MessageRepository,
    AppError, AppResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, error, instrument};
use uuid::Uuid;

const MESSAGE_COLUMNS: &str = r#"
    id, campaign_id, customer_id, phone, content, status, cost,
    tracking_id, fail_reason, dedupe_key, sent_at, created_at
"#;

/// PostgreSQL implementation of MessageRepository
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    /// Create a new message repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    #[instrument(skip(self, message))]
    async fn create(&self, message: &OutboundMessage) -> AppResult<OutboundMessage> {
        debug!("Recording message for campaign {}", message.campaign_id);

        let row = sqlx::query_as::<sqlx::Postgres, MessageRow>(&format!(
            r#"
            INSERT INTO outbound_messages (
                id, campaign_id, customer_id, phone, content, status,
                cost, tracking_id, fail_reason, dedupe_key, sent_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(message.id)
        .bind(message.campaign_id)
        .bind(message.customer_id)
        .bind(&message.phone)
        .bind(&message.content)
        .bind(message.status.to_string())
        .bind(message.cost)
        .bind(&message.tracking_id)
        .bind(&message.fail_reason)
        .bind(&message.dedupe_key)
        .bind(message.sent_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error recording message: {}", e);
            if e.to_string().contains("unique constraint") {
                AppError::AlreadyExists(format!(
                    "Message {} already recorded",
                    message.dedupe_key
                ))
            } else {
                AppError::Database(format!("Failed to record message: {}", e))
            }
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn list_by_campaign(
        &self,
        campaign_id: Uuid,
        limit: i64,
    ) -> AppResult<Vec<OutboundMessage>> {
        let rows = sqlx::query_as::<sqlx::Postgres, MessageRow>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM outbound_messages
            WHERE campaign_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#
        ))
        .bind(campaign_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing messages: {}", e);
            AppError::Database(format!("Failed to list messages: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn count_by_campaign(&self, campaign_id: Uuid) -> AppResult<i64> {
        let result: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM outbound_messages WHERE campaign_id = $1")
                .bind(campaign_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    error!("Database error counting messages: {}", e);
                    AppError::Database(format!("Failed to count messages: {}", e))
                })?;

        Ok(result.0)
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    id: Uuid,
    campaign_id: Uuid,
    customer_id: Uuid,
    phone: String,
    content: String,
    status: String,
    cost: Decimal,
    tracking_id: Option<String>,
    fail_reason: Option<String>,
    dedupe_key: String,
    sent_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<MessageRow> for OutboundMessage {
    fn from(row: MessageRow) -> Self {
        Self {
            id: row.id,
            campaign_id: row.campaign_id,
            customer_id: row.customer_id,
            phone: row.phone,
            content: row.content,
            status: MessageStatus::from_str(&row.status).unwrap_or(MessageStatus::Pending),
            cost: row.cost,
            tracking_id: row.tracking_id,
            fail_reason: row.fail_reason,
            dedupe_key: row.dedupe_key,
            sent_at: row.sent_at,
            created_at: row.created_at,
        }
    }
}
