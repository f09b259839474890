//! Outbound message model

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Per-message delivery status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Created but not yet reconciled
    #[default]
    Pending,
    Sent,
    Failed,
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageStatus::Pending => write!(f, "pending"),
            MessageStatus::Sent => write!(f, "sent"),
            MessageStatus::Failed => write!(f, "failed"),
        }
    }
}

impl MessageStatus {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(MessageStatus::Pending),
            "sent" => Some(MessageStatus::Sent),
            "failed" => Some(MessageStatus::Failed),
            _ => None,
        }
    }
}

/// One outbound message: a campaign crossed with a recipient.
///
/// The unique `dedupe_key` makes a retried dispatch idempotent per
/// recipient; a second insert for the same campaign/customer pair hits the
/// unique constraint instead of double-sending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Unique identifier
    pub id: Uuid,

    pub campaign_id: Uuid,

    pub customer_id: Uuid,

    /// Normalized recipient phone
    pub phone: String,

    /// Rendered content, placeholders substituted
    pub content: String,

    pub status: MessageStatus,

    /// Billed cost; zero for failed sends and free-credit sends
    pub cost: Decimal,

    /// Gateway tracking id, when the accept carried one
    pub tracking_id: Option<String>,

    pub fail_reason: Option<String>,

    /// Idempotency key, unique per campaign/customer pair
    pub dedupe_key: String,

    pub sent_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

impl OutboundMessage {
    /// Deterministic idempotency key for a campaign/customer pair
    pub fn dedupe_key_for(campaign_id: Uuid, customer_id: Uuid) -> String {
        format!("{}:{}", campaign_id, customer_id)
    }
}
