//! Campaign DTOs
//!
//! Request and response types for campaign dispatch endpoints.

use chrono::{DateTime, Utc};
use reach_core::models::{AudienceFilter, Campaign, Channel, OutboundMessage};
use reach_services::{DispatchRequest, TestSendRequest};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Campaign dispatch / estimate request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CampaignCreateRequest {
    /// Campaign title, shown in listings only
    #[validate(length(min = 1, max = 200, message = "Title is required"))]
    pub title: String,

    /// Content template; `{name}` is substituted per recipient
    #[validate(length(min = 1, max = 2000, message = "Content is required"))]
    pub content: String,

    /// Message channel
    #[serde(default = "default_channel")]
    pub channel: Channel,

    /// Audience filter; defaults to every customer with a phone
    #[serde(default)]
    pub filter: AudienceFilter,

    /// Previously uploaded media reference
    pub media_ref: Option<String>,

    /// Member store ids for franchise-level callers; empty means the
    /// account's own store
    #[serde(default)]
    pub store_ids: Vec<Uuid>,
}

fn default_channel() -> Channel {
    Channel::Sms
}

impl CampaignCreateRequest {
    /// Convert to a dispatch request for the given account
    pub fn to_request(&self, account_id: Uuid) -> DispatchRequest {
        DispatchRequest {
            account_id,
            store_ids: self.store_ids.clone(),
            channel: self.channel,
            title: self.title.clone(),
            content: self.content.clone(),
            filter: self.filter.clone(),
            media_ref: self.media_ref.clone(),
        }
    }
}

/// Campaign scheduling request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ScheduleRequest {
    #[serde(flatten)]
    #[validate(nested)]
    pub campaign: CampaignCreateRequest,

    /// When to run the campaign; must be in the future
    pub scheduled_at: DateTime<Utc>,
}

/// Schedule response
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleResponse {
    pub campaign_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
}

/// Body of the scheduler's run call
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunRequest {
    /// Member store ids; empty means the account's own store
    #[serde(default)]
    pub store_ids: Vec<Uuid>,
}

/// Cancel response
#[derive(Debug, Clone, Serialize)]
pub struct CancelResponse {
    pub campaign_id: Uuid,
    pub released: Decimal,
}

/// Test send request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct TestSendCreateRequest {
    /// Destination phone number
    #[validate(length(min = 9, max = 20, message = "Phone number is required"))]
    pub phone: String,

    #[validate(length(min = 1, max = 2000, message = "Content is required"))]
    pub content: String,

    #[serde(default = "default_channel")]
    pub channel: Channel,

    pub media_ref: Option<String>,
}

impl TestSendCreateRequest {
    /// Convert to a test send request for the given account
    pub fn to_request(&self, account_id: Uuid) -> TestSendRequest {
        TestSendRequest {
            account_id,
            phone: self.phone.clone(),
            content: self.content.clone(),
            channel: self.channel,
            media_ref: self.media_ref.clone(),
        }
    }
}

/// Test send response
#[derive(Debug, Clone, Serialize)]
pub struct TestSendResponse {
    pub ok: bool,
    pub tracking_id: Option<String>,
}

/// Campaign response
#[derive(Debug, Clone, Serialize)]
pub struct CampaignResponse {
    pub id: Uuid,
    pub channel: Channel,
    pub title: String,
    pub target_count: i32,
    pub cost_per_message: Decimal,
    pub total_cost: Decimal,
    pub sent_count: i32,
    pub failed_count: i32,
    pub status: String,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Campaign> for CampaignResponse {
    fn from(campaign: Campaign) -> Self {
        Self {
            id: campaign.id,
            channel: campaign.channel,
            title: campaign.title,
            target_count: campaign.target_count,
            cost_per_message: campaign.cost_per_message,
            total_cost: campaign.total_cost,
            sent_count: campaign.sent_count,
            failed_count: campaign.failed_count,
            status: campaign.status.to_string(),
            scheduled_at: campaign.scheduled_at,
            completed_at: campaign.completed_at,
            created_at: campaign.created_at,
        }
    }
}

/// Per-message response, included in campaign detail
#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub phone: String,
    pub status: String,
    pub cost: Decimal,
    pub tracking_id: Option<String>,
    pub fail_reason: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl From<OutboundMessage> for MessageResponse {
    fn from(message: OutboundMessage) -> Self {
        Self {
            id: message.id,
            phone: message.phone,
            status: message.status.to_string(),
            cost: message.cost,
            tracking_id: message.tracking_id,
            fail_reason: message.fail_reason,
            sent_at: message.sent_at,
        }
    }
}

/// Campaign detail: aggregate plus recent messages
#[derive(Debug, Clone, Serialize)]
pub struct CampaignDetailResponse {
    #[serde(flatten)]
    pub campaign: CampaignResponse,
    pub messages: Vec<MessageResponse>,
}
