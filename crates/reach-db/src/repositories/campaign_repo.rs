//! Campaign repository implementation

use reach_core::{
    models::{Campaign, CampaignStatus, Channel},
    traits::CampaignRepository,
    AppError, AppResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, error, instrument};
use uuid::Uuid;

const CAMPAIGN_COLUMNS: &str = r#"
    id, account_id, channel, title, content, filter_snapshot, media_ref,
    target_count, cost_per_message, total_cost, sent_count, failed_count,
    status, scheduled_at, completed_at, created_at
"#;

/// PostgreSQL implementation of CampaignRepository
pub struct PgCampaignRepository {
    pool: PgPool,
}

impl PgCampaignRepository {
    /// Create a new campaign repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CampaignRepository for PgCampaignRepository {
    #[instrument(skip(self, campaign))]
    async fn create(&self, campaign: &Campaign) -> AppResult<Campaign> {
        debug!("Creating campaign: {}", campaign.title);

        let row = sqlx::query_as::<sqlx::Postgres, CampaignRow>(&format!(
            r#"
            INSERT INTO campaigns (
                id, account_id, channel, title, content, filter_snapshot,
                media_ref, target_count, cost_per_message, total_cost,
                sent_count, failed_count, status, scheduled_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING {CAMPAIGN_COLUMNS}
            "#
        ))
        .bind(campaign.id)
        .bind(campaign.account_id)
        .bind(campaign.channel.to_string())
        .bind(&campaign.title)
        .bind(&campaign.content)
        .bind(&campaign.filter_snapshot)
        .bind(&campaign.media_ref)
        .bind(campaign.target_count)
        .bind(campaign.cost_per_message)
        .bind(campaign.total_cost)
        .bind(campaign.sent_count)
        .bind(campaign.failed_count)
        .bind(campaign.status.to_string())
        .bind(campaign.scheduled_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error creating campaign: {}", e);
            AppError::Database(format!("Failed to create campaign: {}", e))
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Campaign>> {
        let result = sqlx::query_as::<sqlx::Postgres, CampaignRow>(&format!(
            "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding campaign {}: {}", id, e);
            AppError::Database(format!("Failed to find campaign: {}", e))
        })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn mark_sending(&self, id: Uuid, target_count: i32) -> AppResult<()> {
        debug!("Marking campaign {} as sending", id);

        let result = sqlx::query(
            r#"
            UPDATE campaigns
            SET status = 'sending',
                target_count = $2
            WHERE id = $1 AND status = 'scheduled'
            "#,
        )
        .bind(id)
        .bind(target_count)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error marking campaign {} sending: {}", id, e);
            AppError::Database(format!("Failed to update campaign: {}", e))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::InvalidInput(format!(
                "Campaign {} is not in scheduled state",
                id
            )));
        }

        Ok(())
    }

    #[instrument(skip(self))]
    async fn update_status(&self, id: Uuid, status: CampaignStatus) -> AppResult<()> {
        let result = sqlx::query("UPDATE campaigns SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error updating campaign {} status: {}", id, e);
                AppError::Database(format!("Failed to update campaign status: {}", e))
            })?;

        if result.rows_affected() == 0 {
            return Err(AppError::CampaignNotFound(id.to_string()));
        }

        Ok(())
    }

    #[instrument(skip(self))]
    async fn finalize(
        &self,
        id: Uuid,
        status: CampaignStatus,
        sent_count: i32,
        failed_count: i32,
        total_cost: Decimal,
    ) -> AppResult<()> {
        debug!(
            "Finalizing campaign {}: {} sent, {} failed, cost {}",
            id, sent_count, failed_count, total_cost
        );

        let result = sqlx::query(
            r#"
            UPDATE campaigns
            SET status = $2,
                sent_count = $3,
                failed_count = $4,
                total_cost = $5,
                completed_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.to_string())
        .bind(sent_count)
        .bind(failed_count)
        .bind(total_cost)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finalizing campaign {}: {}", id, e);
            AppError::Database(format!("Failed to finalize campaign: {}", e))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::CampaignNotFound(id.to_string()));
        }

        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_by_account(
        &self,
        account_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Campaign>> {
        let rows = sqlx::query_as::<sqlx::Postgres, CampaignRow>(&format!(
            r#"
            SELECT {CAMPAIGN_COLUMNS}
            FROM campaigns
            WHERE account_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(account_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing campaigns: {}", e);
            AppError::Database(format!("Failed to list campaigns: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct CampaignRow {
    id: Uuid,
    account_id: Uuid,
    channel: String,
    title: String,
    content: String,
    filter_snapshot: serde_json::Value,
    media_ref: Option<String>,
    target_count: i32,
    cost_per_message: Decimal,
    total_cost: Decimal,
    sent_count: i32,
    failed_count: i32,
    status: String,
    scheduled_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<CampaignRow> for Campaign {
    fn from(row: CampaignRow) -> Self {
        Self {
            id: row.id,
            account_id: row.account_id,
            channel: Channel::from_str(&row.channel).unwrap_or(Channel::Sms),
            title: row.title,
            content: row.content,
            filter_snapshot: row.filter_snapshot,
            media_ref: row.media_ref,
            target_count: row.target_count,
            cost_per_message: row.cost_per_message,
            total_cost: row.total_cost,
            sent_count: row.sent_count,
            failed_count: row.failed_count,
            status: CampaignStatus::from_str(&row.status).unwrap_or(CampaignStatus::Failed),
            scheduled_at: row.scheduled_at,
            completed_at: row.completed_at,
            created_at: row.created_at,
        }
    }
}
