//! Wallet ledger service
//!
//! Atomic reserve-and-settle over the account wallet:
//! - `reserve` holds the quoted total before any send leaves the building
//! - `settle` consumes the actual cost and returns the remainder
//! - `release` returns the full hold when a scheduled campaign is cancelled
//!
//! Every mutation runs in one transaction with the wallet row locked
//! `FOR UPDATE`, so concurrent campaigns against one account serialize and
//! the balance can never go negative.

use reach_core::{
    models::{ReservationStatus, TransactionKind, WalletReservation},
    traits::BalanceLedger,
    AppError, AppResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// PostgreSQL-backed wallet ledger
pub struct PgWalletLedger {
    pool: Arc<PgPool>,
}

impl PgWalletLedger {
    /// Create a new wallet ledger
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    async fn begin(&self) -> AppResult<Transaction<'static, Postgres>> {
        self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })
    }

    async fn commit(tx: Transaction<'static, Postgres>) -> AppResult<()> {
        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })
    }

    /// Lock the wallet row and return its balance
    async fn lock_wallet(
        tx: &mut Transaction<'static, Postgres>,
        account_id: Uuid,
    ) -> AppResult<Decimal> {
        let row: Option<(Decimal,)> =
            sqlx::query_as("SELECT balance FROM wallets WHERE account_id = $1 FOR UPDATE")
                .bind(account_id)
                .fetch_optional(&mut **tx)
                .await
                .map_err(|e| {
                    error!("Failed to lock wallet: {}", e);
                    AppError::Database(format!("Failed to lock wallet: {}", e))
                })?;

        row.map(|(balance,)| balance)
            .ok_or_else(|| AppError::WalletNotFound(account_id.to_string()))
    }

    async fn apply_balance(
        tx: &mut Transaction<'static, Postgres>,
        account_id: Uuid,
        delta: Decimal,
    ) -> AppResult<Decimal> {
        let row: (Decimal,) = sqlx::query_as(
            r#"
            UPDATE wallets
            SET balance = balance + $2,
                updated_at = NOW()
            WHERE account_id = $1
            RETURNING balance
            "#,
        )
        .bind(account_id)
        .bind(delta)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| {
            error!("Failed to update wallet balance: {}", e);
            AppError::Database(format!("Failed to update balance: {}", e))
        })?;

        Ok(row.0)
    }

    async fn post_line(
        tx: &mut Transaction<'static, Postgres>,
        account_id: Uuid,
        amount: Decimal,
        balance_after: Decimal,
        kind: TransactionKind,
        memo: &str,
        campaign_id: Uuid,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO wallet_transactions (
                account_id, amount, balance_after, kind, memo, campaign_id
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(account_id)
        .bind(amount)
        .bind(balance_after)
        .bind(kind.to_string())
        .bind(memo)
        .bind(campaign_id)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            error!("Failed to post wallet transaction: {}", e);
            AppError::Database(format!("Failed to post transaction: {}", e))
        })?;

        Ok(())
    }

    /// Lock the reservation row for a campaign
    async fn lock_reservation(
        tx: &mut Transaction<'static, Postgres>,
        campaign_id: Uuid,
    ) -> AppResult<WalletReservation> {
        let row: Option<ReservationRow> = sqlx::query_as(
            r#"
            SELECT id, account_id, campaign_id, reserved_amount, consumed_amount,
                   released_amount, status, created_at, updated_at
            FROM wallet_reservations
            WHERE campaign_id = $1
            FOR UPDATE
            "#,
        )
        .bind(campaign_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| {
            error!("Failed to lock reservation: {}", e);
            AppError::Database(format!("Failed to lock reservation: {}", e))
        })?;

        row.map(Into::into)
            .ok_or_else(|| AppError::ReservationNotFound(campaign_id.to_string()))
    }

    async fn update_reservation(
        tx: &mut Transaction<'static, Postgres>,
        id: Uuid,
        status: ReservationStatus,
        consumed: Decimal,
        released: Decimal,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE wallet_reservations
            SET status = $2,
                consumed_amount = $3,
                released_amount = $4,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.to_string())
        .bind(consumed)
        .bind(released)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            error!("Failed to update reservation: {}", e);
            AppError::Database(format!("Failed to update reservation: {}", e))
        })?;

        Ok(())
    }
}

#[async_trait]
impl BalanceLedger for PgWalletLedger {
    #[instrument(skip(self))]
    async fn available_balance(&self, account_id: Uuid) -> AppResult<Decimal> {
        let row: Option<(Decimal,)> =
            sqlx::query_as("SELECT balance FROM wallets WHERE account_id = $1")
                .bind(account_id)
                .fetch_optional(&*self.pool)
                .await
                .map_err(|e| {
                    error!("Failed to read wallet balance: {}", e);
                    AppError::Database(format!("Failed to read balance: {}", e))
                })?;

        row.map(|(balance,)| balance)
            .ok_or_else(|| AppError::WalletNotFound(account_id.to_string()))
    }

    #[instrument(skip(self))]
    async fn reserve(
        &self,
        account_id: Uuid,
        campaign_id: Uuid,
        amount: Decimal,
    ) -> AppResult<WalletReservation> {
        info!(
            "Reserving {} for campaign {} on account {}",
            amount, campaign_id, account_id
        );

        let mut tx = self.begin().await?;

        let available = Self::lock_wallet(&mut tx, account_id).await?;
        if available < amount {
            warn!(
                "Insufficient balance for account {}: required {}, available {}",
                account_id, amount, available
            );
            return Err(AppError::InsufficientBalance {
                required: amount.to_string(),
                available: available.to_string(),
            });
        }

        let balance_after = Self::apply_balance(&mut tx, account_id, -amount).await?;

        let reservation = WalletReservation {
            id: Uuid::new_v4(),
            account_id,
            campaign_id,
            reserved_amount: amount,
            consumed_amount: Decimal::ZERO,
            released_amount: Decimal::ZERO,
            status: ReservationStatus::Holding,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO wallet_reservations (
                id, account_id, campaign_id, reserved_amount,
                consumed_amount, released_amount, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(reservation.id)
        .bind(reservation.account_id)
        .bind(reservation.campaign_id)
        .bind(reservation.reserved_amount)
        .bind(reservation.consumed_amount)
        .bind(reservation.released_amount)
        .bind(reservation.status.to_string())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!("Failed to create reservation: {}", e);
            if e.to_string().contains("unique constraint") {
                AppError::AlreadyExists(format!(
                    "Campaign {} already has a reservation",
                    campaign_id
                ))
            } else {
                AppError::Database(format!("Failed to create reservation: {}", e))
            }
        })?;

        Self::post_line(
            &mut tx,
            account_id,
            amount,
            balance_after,
            TransactionKind::Reserve,
            "campaign reservation",
            campaign_id,
        )
        .await?;

        Self::commit(tx).await?;

        info!(
            "Reserved {} for campaign {} (reservation {})",
            amount, campaign_id, reservation.id
        );

        Ok(reservation)
    }

    #[instrument(skip(self))]
    async fn settle(&self, campaign_id: Uuid, actual_cost: Decimal) -> AppResult<Decimal> {
        info!("Settling campaign {} for {}", campaign_id, actual_cost);

        let mut tx = self.begin().await?;

        let reservation = Self::lock_reservation(&mut tx, campaign_id).await?;
        if !reservation.status.is_holding() {
            return Err(AppError::ReservationFailed(format!(
                "Reservation {} is not holding (status: {})",
                reservation.id, reservation.status
            )));
        }

        // The quote bounds the actual cost; anything above the hold would
        // mean the price changed mid-flight. Clamp and flag it.
        let consumed = if actual_cost > reservation.reserved_amount {
            warn!(
                "Actual cost {} exceeds reservation {} for campaign {}",
                actual_cost, reservation.reserved_amount, campaign_id
            );
            reservation.reserved_amount
        } else {
            actual_cost
        };
        let released = reservation.reserved_amount - consumed;

        let balance_after = if released > Decimal::ZERO {
            Self::lock_wallet(&mut tx, reservation.account_id).await?;
            Self::apply_balance(&mut tx, reservation.account_id, released).await?
        } else {
            Self::lock_wallet(&mut tx, reservation.account_id).await?
        };

        Self::update_reservation(
            &mut tx,
            reservation.id,
            ReservationStatus::Settled,
            consumed,
            released,
        )
        .await?;

        Self::post_line(
            &mut tx,
            reservation.account_id,
            consumed,
            balance_after,
            TransactionKind::Consume,
            "campaign settlement",
            campaign_id,
        )
        .await?;

        if released > Decimal::ZERO {
            Self::post_line(
                &mut tx,
                reservation.account_id,
                released,
                balance_after,
                TransactionKind::Release,
                "unused reservation returned",
                campaign_id,
            )
            .await?;
        }

        Self::commit(tx).await?;

        info!(
            "Settled campaign {}: consumed={}, released={}",
            campaign_id, consumed, released
        );

        Ok(released)
    }

    #[instrument(skip(self))]
    async fn release(&self, campaign_id: Uuid) -> AppResult<Decimal> {
        info!("Releasing reservation for campaign {}", campaign_id);

        let mut tx = self.begin().await?;

        let reservation = Self::lock_reservation(&mut tx, campaign_id).await?;
        if !reservation.status.is_holding() {
            warn!(
                "Reservation {} is not holding, skipping release",
                reservation.id
            );
            return Ok(Decimal::ZERO);
        }

        let amount = reservation.remaining();

        let balance_after = if amount > Decimal::ZERO {
            Self::lock_wallet(&mut tx, reservation.account_id).await?;
            Self::apply_balance(&mut tx, reservation.account_id, amount).await?
        } else {
            Self::lock_wallet(&mut tx, reservation.account_id).await?
        };

        Self::update_reservation(
            &mut tx,
            reservation.id,
            ReservationStatus::Released,
            reservation.consumed_amount,
            reservation.released_amount + amount,
        )
        .await?;

        Self::post_line(
            &mut tx,
            reservation.account_id,
            amount,
            balance_after,
            TransactionKind::Release,
            "reservation released",
            campaign_id,
        )
        .await?;

        Self::commit(tx).await?;

        info!("Released {} for campaign {}", amount, campaign_id);

        Ok(amount)
    }
}

/// Helper struct for reservation row mapping
#[derive(Debug, sqlx::FromRow)]
struct ReservationRow {
    id: Uuid,
    account_id: Uuid,
    campaign_id: Uuid,
    reserved_amount: Decimal,
    consumed_amount: Decimal,
    released_amount: Decimal,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ReservationRow> for WalletReservation {
    fn from(row: ReservationRow) -> Self {
        Self {
            id: row.id,
            account_id: row.account_id,
            campaign_id: row.campaign_id,
            reserved_amount: row.reserved_amount,
            consumed_amount: row.consumed_amount,
            released_amount: row.released_amount,
            status: ReservationStatus::from_str(&row.status).unwrap_or(ReservationStatus::Holding),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
