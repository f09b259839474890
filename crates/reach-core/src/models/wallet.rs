//! Wallet, reservation and transaction models
//!
//! Campaign spending is reserve-and-settle: dispatch holds the quoted total
//! up front, then settles for the cost actually incurred and releases the
//! rest. The wallet balance is never driven below zero by this engine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Account wallet, one row per account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub account_id: Uuid,

    /// Spendable balance, net of active reservations
    pub balance: Decimal,

    pub updated_at: DateTime<Utc>,
}

/// Reservation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    /// Holding balance for a pending or in-flight campaign
    #[default]
    Holding,
    /// Settled for the actual cost, remainder returned
    Settled,
    /// Released in full without consumption
    Released,
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReservationStatus::Holding => write!(f, "holding"),
            ReservationStatus::Settled => write!(f, "settled"),
            ReservationStatus::Released => write!(f, "released"),
        }
    }
}

impl ReservationStatus {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "holding" => Some(ReservationStatus::Holding),
            "settled" => Some(ReservationStatus::Settled),
            "released" => Some(ReservationStatus::Released),
            _ => None,
        }
    }

    /// Check if the reservation is still holding balance
    pub fn is_holding(&self) -> bool {
        matches!(self, ReservationStatus::Holding)
    }
}

/// Balance hold for one campaign; `campaign_id` is unique so a retried
/// dispatch cannot double-reserve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletReservation {
    /// Unique identifier
    pub id: Uuid,

    pub account_id: Uuid,

    pub campaign_id: Uuid,

    /// Amount held at reserve time (the quoted total)
    pub reserved_amount: Decimal,

    /// Amount consumed at settlement
    pub consumed_amount: Decimal,

    /// Amount returned to the balance
    pub released_amount: Decimal,

    pub status: ReservationStatus,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl WalletReservation {
    /// Amount still held by this reservation
    #[inline]
    pub fn remaining(&self) -> Decimal {
        self.reserved_amount - self.consumed_amount - self.released_amount
    }
}

/// Ledger entry kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Balance held for a campaign
    Reserve,
    /// Hold consumed at settlement
    Consume,
    /// Unused hold returned
    Release,
    /// External top-up
    TopUp,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionKind::Reserve => write!(f, "reserve"),
            TransactionKind::Consume => write!(f, "consume"),
            TransactionKind::Release => write!(f, "release"),
            TransactionKind::TopUp => write!(f, "top_up"),
        }
    }
}

impl TransactionKind {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "reserve" => Some(TransactionKind::Reserve),
            "consume" => Some(TransactionKind::Consume),
            "release" => Some(TransactionKind::Release),
            "top_up" => Some(TransactionKind::TopUp),
            _ => None,
        }
    }
}

/// Immutable wallet audit line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletTransaction {
    /// Unique identifier
    pub id: i64,

    pub account_id: Uuid,

    /// Amount moved by this line; direction is given by `kind`
    pub amount: Decimal,

    /// Wallet balance after the operation that posted this line
    pub balance_after: Decimal,

    pub kind: TransactionKind,

    pub memo: Option<String>,

    /// Associated campaign, when the line came from dispatch
    pub campaign_id: Option<Uuid>,

    pub created_at: DateTime<Utc>,
}
