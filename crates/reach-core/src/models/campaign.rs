//! Campaign model
//!
//! A campaign is the unit of dispatch: one audience snapshot, one content
//! template, one ledger reservation. Rows are never deleted; cancellation
//! and failure are terminal statuses.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Delivery channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Plain text message (short/long/media tiers)
    Sms,
    /// Branded rich message via a registered business channel
    Brand,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Sms => write!(f, "sms"),
            Channel::Brand => write!(f, "brand"),
        }
    }
}

impl Channel {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sms" => Some(Channel::Sms),
            "brand" => Some(Channel::Brand),
            _ => None,
        }
    }
}

/// Campaign lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    /// Reserved and waiting for its scheduled run time
    Scheduled,
    /// Fan-out in progress
    Sending,
    /// Finished with at least one successful send
    Completed,
    /// Finished with zero successful sends
    Failed,
    /// Cancelled before the run started
    Cancelled,
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CampaignStatus::Scheduled => write!(f, "scheduled"),
            CampaignStatus::Sending => write!(f, "sending"),
            CampaignStatus::Completed => write!(f, "completed"),
            CampaignStatus::Failed => write!(f, "failed"),
            CampaignStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl CampaignStatus {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "scheduled" => Some(CampaignStatus::Scheduled),
            "sending" => Some(CampaignStatus::Sending),
            "completed" => Some(CampaignStatus::Completed),
            "failed" => Some(CampaignStatus::Failed),
            "cancelled" => Some(CampaignStatus::Cancelled),
            _ => None,
        }
    }

    /// Check if the campaign has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CampaignStatus::Completed | CampaignStatus::Failed | CampaignStatus::Cancelled
        )
    }

    /// Check whether `next` is a legal transition from this status.
    ///
    /// Scheduled may start sending or be cancelled; Sending may only
    /// finish. Terminal states never transition.
    pub fn can_transition_to(&self, next: CampaignStatus) -> bool {
        match self {
            CampaignStatus::Scheduled => {
                matches!(next, CampaignStatus::Sending | CampaignStatus::Cancelled)
            }
            CampaignStatus::Sending => {
                matches!(next, CampaignStatus::Completed | CampaignStatus::Failed)
            }
            _ => false,
        }
    }
}

/// Campaign entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    /// Unique identifier
    pub id: Uuid,

    /// Owning account
    pub account_id: Uuid,

    pub channel: Channel,

    pub title: String,

    /// Content template; `{name}` is substituted per recipient
    pub content: String,

    /// Audience filter snapshot (JSON), re-resolved by scheduled runs
    pub filter_snapshot: serde_json::Value,

    /// Attached media reference, if any
    pub media_ref: Option<String>,

    /// Resolved recipient count
    pub target_count: i32,

    /// Unit price at quote time
    pub cost_per_message: Decimal,

    /// Actual billed total after settlement
    pub total_cost: Decimal,

    pub sent_count: i32,

    pub failed_count: i32,

    pub status: CampaignStatus,

    /// Requested run time for scheduled campaigns
    pub scheduled_at: Option<DateTime<Utc>>,

    pub completed_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

impl Campaign {
    /// Check if the campaign can still be cancelled
    pub fn is_cancellable(&self) -> bool {
        self.status == CampaignStatus::Scheduled
    }
}
