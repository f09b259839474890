//! Repository and gateway traits
//!
//! Every storage and network dependency of the dispatch engine sits behind a
//! trait here, so services stay generic and unit-testable with hand-written
//! mocks. Production implementations live in `reach-db` and `reach-gateway`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    Campaign, CampaignStatus, OutboundMessage, Predicate, Recipient, TestSend, WalletReservation,
};

// ==================== Storage traits ====================

/// Read-only access to the customer directory
#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    /// Find recipients in the given stores matching the predicate.
    ///
    /// Returns customers with a non-null phone, ordered by creation time.
    async fn find_recipients(
        &self,
        store_ids: &[Uuid],
        predicate: &Predicate,
    ) -> Result<Vec<Recipient>, AppError>;

    /// Count customers matching the predicate without materializing them
    async fn count_matching(
        &self,
        store_ids: &[Uuid],
        predicate: &Predicate,
    ) -> Result<i64, AppError>;
}

/// Campaign persistence
#[async_trait]
pub trait CampaignRepository: Send + Sync {
    async fn create(&self, campaign: &Campaign) -> Result<Campaign, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Campaign>, AppError>;

    /// Move a scheduled campaign into `Sending` and refresh its target count
    async fn mark_sending(&self, id: Uuid, target_count: i32) -> Result<(), AppError>;

    async fn update_status(&self, id: Uuid, status: CampaignStatus) -> Result<(), AppError>;

    /// Record the final aggregate after fan-out
    async fn finalize(
        &self,
        id: Uuid,
        status: CampaignStatus,
        sent_count: i32,
        failed_count: i32,
        total_cost: Decimal,
    ) -> Result<(), AppError>;

    async fn list_by_account(
        &self,
        account_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Campaign>, AppError>;
}

/// Outbound message persistence
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Insert a message row. A duplicate dedupe key fails with
    /// `AlreadyExists`, which the dispatcher treats as "already sent".
    async fn create(&self, message: &OutboundMessage) -> Result<OutboundMessage, AppError>;

    async fn list_by_campaign(
        &self,
        campaign_id: Uuid,
        limit: i64,
    ) -> Result<Vec<OutboundMessage>, AppError>;

    async fn count_by_campaign(&self, campaign_id: Uuid) -> Result<i64, AppError>;
}

/// Atomic wallet operations.
///
/// `reserve` holds the quoted total before any send; `settle` consumes the
/// actual cost and returns the remainder. Implementations must serialize
/// concurrent mutation of one wallet (row lock or equivalent).
#[async_trait]
pub trait BalanceLedger: Send + Sync {
    async fn available_balance(&self, account_id: Uuid) -> Result<Decimal, AppError>;

    /// Hold `amount` for a campaign. Fails `InsufficientBalance` without
    /// mutating anything when the wallet is short.
    async fn reserve(
        &self,
        account_id: Uuid,
        campaign_id: Uuid,
        amount: Decimal,
    ) -> Result<WalletReservation, AppError>;

    /// Consume `actual_cost` from the campaign's hold and release the rest.
    /// Returns the released remainder.
    async fn settle(&self, campaign_id: Uuid, actual_cost: Decimal) -> Result<Decimal, AppError>;

    /// Release the campaign's hold in full (cancellation path)
    async fn release(&self, campaign_id: Uuid) -> Result<Decimal, AppError>;
}

/// Monthly free-credit allowance
#[async_trait]
pub trait CreditLedger: Send + Sync {
    /// Credits remaining for the account in the month containing `at`.
    /// Accounts without a row for the month get the default allowance.
    async fn remaining_credits(&self, account_id: Uuid, at: DateTime<Utc>)
        -> Result<i32, AppError>;

    /// Consume `count` credits from the month containing `at`
    async fn consume_credits(
        &self,
        account_id: Uuid,
        at: DateTime<Utc>,
        count: i32,
    ) -> Result<(), AppError>;
}

/// Test-send audit log
#[async_trait]
pub trait TestSendLog: Send + Sync {
    /// Test sends recorded for the account during its current calendar day
    async fn count_today(&self, account_id: Uuid, now: DateTime<Utc>) -> Result<i64, AppError>;

    async fn record(&self, entry: &TestSend) -> Result<(), AppError>;
}

// ==================== Gateway ====================

/// Size hint for a single send, decides the provider message type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelHint {
    /// Text within the short byte limit
    Short,
    /// Text above the short byte limit
    Long,
    /// Text with a media attachment
    Media,
    /// Branded rich message
    Rich,
}

/// What an uploaded media blob will be attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaPurpose {
    Mms,
    RichImage,
}

/// Provider-side handle for uploaded media
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef(pub String);

/// One outbound send request
#[derive(Debug, Clone)]
pub struct GatewaySend {
    pub to: String,
    pub from: String,
    pub body: String,
    pub hint: ChannelHint,
    pub media_ref: Option<MediaRef>,
    /// Required for `ChannelHint::Rich`
    pub business_channel_id: Option<String>,
}

/// Acceptance response for a send.
///
/// A missing tracking id means delivery can never be confirmed; the
/// reconciler classifies such sends as failed immediately.
#[derive(Debug, Clone, Default)]
pub struct GatewayAccept {
    pub tracking_id: Option<String>,
    pub accepted_count: i32,
    pub rejected_count: i32,
}

/// Terminal or pending delivery state reported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Sent,
    Failed,
    Pending,
}

/// Delivery status for one tracked send
#[derive(Debug, Clone)]
pub struct DeliveryStatus {
    pub state: DeliveryState,
    pub fail_reason: Option<String>,
}

/// Outbound message provider.
///
/// Constructed once at composition time and injected; services never build
/// their own client.
#[async_trait]
pub trait MessageGateway: Send + Sync {
    /// Submit one message. `GatewayUnavailable` for transport problems,
    /// `InvalidRecipient` when the provider rejects the destination.
    async fn send(&self, request: &GatewaySend) -> Result<GatewayAccept, AppError>;

    /// Upload a media blob for later attachment
    async fn upload_media(&self, bytes: &[u8], purpose: MediaPurpose)
        -> Result<MediaRef, AppError>;

    /// Query delivery status for a tracked send
    async fn query_status(
        &self,
        tracking_id: &str,
        phone: &str,
    ) -> Result<DeliveryStatus, AppError>;
}
