//! Campaign dispatcher
//!
//! The orchestrator behind every campaign operation: resolve the audience,
//! price it, reserve the wallet, fan out through the gateway with bounded
//! concurrency, reconcile each delivery, then finalize the campaign row and
//! settle the ledger for the cost actually incurred.
//!
//! Recipient failures are isolated: one bad number never aborts the
//! campaign, it just becomes a failed message row with zero cost.

use reach_core::{
    models::{
        normalize_phone, AudienceFilter, Campaign, CampaignStatus, Channel, MessageStatus,
        OutboundMessage, Recipient, TestSend,
    },
    traits::{
        BalanceLedger, CampaignRepository, ChannelHint, CreditLedger, CustomerDirectory,
        GatewaySend, MediaRef, MessageGateway, MessageRepository, TestSendLog,
    },
    AppError, AppResult,
};
use chrono::{DateTime, Utc};
use futures::{stream, StreamExt};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::audience::AudienceResolver;
use crate::pricing::Quote;
use crate::reconciler::{DeliveryReconciler, Reconciled};
use crate::send_window::SendWindow;
use crate::test_quota::TestSendQuota;

/// Static dispatch settings, fixed at composition time
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    /// Registered sender number, the "from" of every message
    pub sender_id: String,

    /// Business channel id for brand messages
    pub business_channel_id: Option<String>,

    /// Bound on concurrent in-flight sends per campaign
    pub max_in_flight: usize,
}

/// A campaign dispatch request
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub account_id: Uuid,

    /// Store scope; empty means the account's own store
    pub store_ids: Vec<Uuid>,

    pub channel: Channel,

    pub title: String,

    /// Content template; `{name}` is substituted per recipient
    pub content: String,

    pub filter: AudienceFilter,

    /// Previously uploaded media reference
    pub media_ref: Option<String>,
}

/// Final aggregate of a dispatched campaign
#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    pub campaign_id: Uuid,
    pub status: CampaignStatus,
    pub sent_count: i32,
    pub failed_count: i32,
    pub total_cost: Decimal,
}

/// Pre-dispatch estimate
#[derive(Debug, Clone, Serialize)]
pub struct Estimate {
    #[serde(flatten)]
    pub quote: Quote,
    pub balance: Decimal,
    pub can_send: bool,
}

/// A test send request
#[derive(Debug, Clone)]
pub struct TestSendRequest {
    pub account_id: Uuid,
    pub phone: String,
    pub content: String,
    pub channel: Channel,
    pub media_ref: Option<String>,
}

/// Test send result
#[derive(Debug, Clone, Serialize)]
pub struct TestSendOutcome {
    pub succeeded: bool,
    pub tracking_id: Option<String>,
}

enum SendResult {
    Sent(Decimal),
    Failed,
    /// Duplicate dedupe key: this recipient was already handled by an
    /// earlier run of the same campaign
    Skipped,
}

struct FanOutTotals {
    sent_count: i32,
    failed_count: i32,
    total_cost: Decimal,
    free_used: i32,
}

/// Campaign dispatcher service
pub struct CampaignDispatcher<C, R, M, B, K, L, G>
where
    C: CustomerDirectory,
    R: CampaignRepository,
    M: MessageRepository,
    B: BalanceLedger,
    K: CreditLedger,
    L: TestSendLog,
    G: MessageGateway,
{
    resolver: AudienceResolver<C>,
    campaigns: Arc<R>,
    messages: Arc<M>,
    ledger: Arc<B>,
    credits: Arc<K>,
    quota: TestSendQuota<L>,
    gateway: Arc<G>,
    reconciler: DeliveryReconciler,
    window: SendWindow,
    settings: DispatcherSettings,
}

impl<C, R, M, B, K, L, G> CampaignDispatcher<C, R, M, B, K, L, G>
where
    C: CustomerDirectory,
    R: CampaignRepository,
    M: MessageRepository,
    B: BalanceLedger,
    K: CreditLedger,
    L: TestSendLog,
    G: MessageGateway,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        resolver: AudienceResolver<C>,
        campaigns: Arc<R>,
        messages: Arc<M>,
        ledger: Arc<B>,
        credits: Arc<K>,
        quota: TestSendQuota<L>,
        gateway: Arc<G>,
        reconciler: DeliveryReconciler,
        window: SendWindow,
        settings: DispatcherSettings,
    ) -> Self {
        Self {
            resolver,
            campaigns,
            messages,
            ledger,
            credits,
            quota,
            gateway,
            reconciler,
            window,
            settings,
        }
    }

    fn scope(account_id: Uuid, store_ids: &[Uuid]) -> Vec<Uuid> {
        if store_ids.is_empty() {
            vec![account_id]
        } else {
            store_ids.to_vec()
        }
    }

    fn validate(&self, request: &DispatchRequest) -> AppResult<()> {
        if request.content.trim().is_empty() {
            return Err(AppError::Validation(
                "Message content must not be empty".to_string(),
            ));
        }
        if request.channel == Channel::Brand && self.settings.business_channel_id.is_none() {
            return Err(AppError::MissingField(
                "business channel id is not configured".to_string(),
            ));
        }
        Ok(())
    }

    async fn remaining_credits(&self, account_id: Uuid, channel: Channel) -> AppResult<i32> {
        if channel == Channel::Brand {
            self.credits.remaining_credits(account_id, Utc::now()).await
        } else {
            Ok(0)
        }
    }

    /// Price a campaign without sending anything
    #[instrument(skip(self, request))]
    pub async fn estimate(&self, request: &DispatchRequest) -> AppResult<Estimate> {
        self.validate(request)?;

        let scope = Self::scope(request.account_id, &request.store_ids);
        let recipients = self
            .resolver
            .resolve(&scope, &request.filter, Utc::now())
            .await?;

        let credits = self
            .remaining_credits(request.account_id, request.channel)
            .await?;
        let quote = Quote::calculate(
            request.channel,
            &request.content,
            request.media_ref.is_some(),
            recipients.len() as i32,
            credits,
        );

        let balance = self.ledger.available_balance(request.account_id).await?;
        let can_send = !recipients.is_empty() && balance >= quote.total_cost;

        Ok(Estimate {
            quote,
            balance,
            can_send,
        })
    }

    /// Dispatch a campaign immediately
    #[instrument(skip(self, request), fields(account = %request.account_id))]
    pub async fn dispatch_now(&self, request: &DispatchRequest) -> AppResult<DispatchOutcome> {
        self.validate(request)?;

        let now = Utc::now();
        if request.channel == Channel::Brand {
            self.window.check(now)?;
        }

        let scope = Self::scope(request.account_id, &request.store_ids);
        let recipients = self.resolver.resolve(&scope, &request.filter, now).await?;
        if recipients.is_empty() {
            return Err(AppError::NoEligibleRecipients);
        }

        let credits = self
            .remaining_credits(request.account_id, request.channel)
            .await?;
        let quote = Quote::calculate(
            request.channel,
            &request.content,
            request.media_ref.is_some(),
            recipients.len() as i32,
            credits,
        );

        let campaign_id = Uuid::new_v4();
        self.ledger
            .reserve(request.account_id, campaign_id, quote.total_cost)
            .await?;

        let campaign = match self
            .create_campaign(campaign_id, request, &quote, CampaignStatus::Sending, None)
            .await
        {
            Ok(campaign) => campaign,
            Err(e) => {
                // The hold must not outlive a campaign that never existed
                if let Err(release_err) = self.ledger.release(campaign_id).await {
                    error!(
                        "Failed to release reservation for aborted campaign {}: {}",
                        campaign_id, release_err
                    );
                }
                return Err(e);
            }
        };

        info!(
            "Dispatching campaign {} to {} recipients",
            campaign.id,
            recipients.len()
        );

        self.run_fan_out(&campaign, recipients, &quote).await
    }

    /// Schedule a campaign: reserve now, fan out later
    #[instrument(skip(self, request), fields(account = %request.account_id))]
    pub async fn schedule(
        &self,
        request: &DispatchRequest,
        scheduled_at: DateTime<Utc>,
    ) -> AppResult<Campaign> {
        self.validate(request)?;

        if scheduled_at <= Utc::now() {
            return Err(AppError::InvalidInput(
                "Scheduled time must be in the future".to_string(),
            ));
        }

        let scope = Self::scope(request.account_id, &request.store_ids);
        let recipients = self
            .resolver
            .resolve(&scope, &request.filter, Utc::now())
            .await?;
        if recipients.is_empty() {
            return Err(AppError::NoEligibleRecipients);
        }

        let credits = self
            .remaining_credits(request.account_id, request.channel)
            .await?;
        let quote = Quote::calculate(
            request.channel,
            &request.content,
            request.media_ref.is_some(),
            recipients.len() as i32,
            credits,
        );

        let campaign_id = Uuid::new_v4();
        self.ledger
            .reserve(request.account_id, campaign_id, quote.total_cost)
            .await?;

        match self
            .create_campaign(
                campaign_id,
                request,
                &quote,
                CampaignStatus::Scheduled,
                Some(scheduled_at),
            )
            .await
        {
            Ok(campaign) => {
                info!(
                    "Scheduled campaign {} for {} ({} recipients reserved)",
                    campaign.id, scheduled_at, quote.target_count
                );
                Ok(campaign)
            }
            Err(e) => {
                if let Err(release_err) = self.ledger.release(campaign_id).await {
                    error!(
                        "Failed to release reservation for aborted campaign {}: {}",
                        campaign_id, release_err
                    );
                }
                Err(e)
            }
        }
    }

    /// Execute a scheduled campaign. This is the scheduler's entry point;
    /// the audience is re-resolved from the stored filter snapshot.
    #[instrument(skip(self))]
    pub async fn run_scheduled(
        &self,
        account_id: Uuid,
        campaign_id: Uuid,
        store_ids: &[Uuid],
    ) -> AppResult<DispatchOutcome> {
        let campaign = self
            .campaigns
            .find_by_id(campaign_id)
            .await?
            .filter(|c| c.account_id == account_id)
            .ok_or_else(|| AppError::CampaignNotFound(campaign_id.to_string()))?;

        if campaign.status != CampaignStatus::Scheduled {
            return Err(AppError::InvalidInput(format!(
                "Campaign {} is not scheduled (status: {})",
                campaign_id, campaign.status
            )));
        }

        let now = Utc::now();
        if campaign.channel == Channel::Brand {
            self.window.check(now)?;
        }

        let filter: AudienceFilter = serde_json::from_value(campaign.filter_snapshot.clone())?;
        let scope = Self::scope(campaign.account_id, store_ids);
        let recipients = self.resolver.resolve(&scope, &filter, now).await?;

        if recipients.is_empty() {
            warn!(
                "Scheduled campaign {} has no remaining recipients",
                campaign_id
            );
            self.campaigns
                .finalize(
                    campaign_id,
                    CampaignStatus::Failed,
                    0,
                    0,
                    Decimal::ZERO,
                )
                .await?;
            self.ledger.release(campaign_id).await?;
            return Err(AppError::NoEligibleRecipients);
        }

        let credits = self
            .remaining_credits(campaign.account_id, campaign.channel)
            .await?;
        let quote = Quote::calculate(
            campaign.channel,
            &campaign.content,
            campaign.media_ref.is_some(),
            recipients.len() as i32,
            credits,
        );

        self.campaigns
            .mark_sending(campaign_id, quote.target_count)
            .await?;

        info!(
            "Running scheduled campaign {} with {} recipients",
            campaign_id, quote.target_count
        );

        self.run_fan_out(&campaign, recipients, &quote).await
    }

    /// Cancel a scheduled campaign and release its reservation. The campaign
    /// must belong to `account_id`; other accounts see it as not found.
    #[instrument(skip(self))]
    pub async fn cancel(&self, account_id: Uuid, campaign_id: Uuid) -> AppResult<Decimal> {
        let campaign = self
            .campaigns
            .find_by_id(campaign_id)
            .await?
            .filter(|c| c.account_id == account_id)
            .ok_or_else(|| AppError::CampaignNotFound(campaign_id.to_string()))?;

        if !campaign.is_cancellable() {
            return Err(AppError::NotCancellable(format!(
                "Campaign {} is {} and cannot be cancelled",
                campaign_id, campaign.status
            )));
        }

        self.campaigns
            .update_status(campaign_id, CampaignStatus::Cancelled)
            .await?;
        let released = self.ledger.release(campaign_id).await?;

        info!(
            "Cancelled campaign {}, released {}",
            campaign_id, released
        );

        Ok(released)
    }

    /// Send a single test message. Skips the ledger and the send window,
    /// counts against the daily quota, and is always persisted for audit.
    #[instrument(skip(self, request), fields(account = %request.account_id))]
    pub async fn test_send(&self, request: &TestSendRequest) -> AppResult<TestSendOutcome> {
        if request.content.trim().is_empty() {
            return Err(AppError::Validation(
                "Message content must not be empty".to_string(),
            ));
        }

        let now = Utc::now();
        self.quota.check(request.account_id, now).await?;

        let phone = normalize_phone(&request.phone);
        let quote = Quote::calculate(
            request.channel,
            &request.content,
            request.media_ref.is_some(),
            1,
            0,
        );

        let send = GatewaySend {
            to: phone.clone(),
            from: self.settings.sender_id.clone(),
            body: request.content.clone(),
            hint: quote.tier.hint(),
            media_ref: request.media_ref.clone().map(MediaRef),
            business_channel_id: self.business_channel_for(quote.tier.hint()),
        };

        let (reconciled, tracking_id) = match self.gateway.send(&send).await {
            Ok(accept) => {
                let tracking = accept.tracking_id.clone();
                let reconciled = self
                    .reconciler
                    .reconcile(self.gateway.as_ref(), &accept, &phone)
                    .await;
                (reconciled, tracking)
            }
            Err(e) => {
                self.record_test_send(request, &phone, false, None).await;
                return Err(e);
            }
        };

        self.record_test_send(request, &phone, reconciled.sent, tracking_id.clone())
            .await;

        Ok(TestSendOutcome {
            succeeded: reconciled.sent,
            tracking_id,
        })
    }

    async fn record_test_send(
        &self,
        request: &TestSendRequest,
        phone: &str,
        succeeded: bool,
        tracking_id: Option<String>,
    ) {
        let entry = TestSend {
            id: Uuid::new_v4(),
            account_id: request.account_id,
            phone: phone.to_string(),
            content: request.content.clone(),
            channel: request.channel,
            has_media: request.media_ref.is_some(),
            succeeded,
            tracking_id,
            created_at: Utc::now(),
        };

        // Audit must not mask the send outcome
        if let Err(e) = self.quota_log().record(&entry).await {
            error!("Failed to record test send: {}", e);
        }
    }

    fn quota_log(&self) -> &L {
        self.quota.log()
    }

    fn business_channel_for(&self, hint: ChannelHint) -> Option<String> {
        if hint == ChannelHint::Rich {
            self.settings.business_channel_id.clone()
        } else {
            None
        }
    }

    async fn create_campaign(
        &self,
        campaign_id: Uuid,
        request: &DispatchRequest,
        quote: &Quote,
        status: CampaignStatus,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> AppResult<Campaign> {
        let campaign = Campaign {
            id: campaign_id,
            account_id: request.account_id,
            channel: request.channel,
            title: request.title.clone(),
            content: request.content.clone(),
            filter_snapshot: serde_json::to_value(&request.filter)?,
            media_ref: request.media_ref.clone(),
            target_count: quote.target_count,
            cost_per_message: quote.cost_per_message,
            total_cost: Decimal::ZERO,
            sent_count: 0,
            failed_count: 0,
            status,
            scheduled_at,
            completed_at: None,
            created_at: Utc::now(),
        };

        self.campaigns.create(&campaign).await
    }

    /// Fan out, finalize the campaign row, consume credits and settle
    async fn run_fan_out(
        &self,
        campaign: &Campaign,
        recipients: Vec<Recipient>,
        quote: &Quote,
    ) -> AppResult<DispatchOutcome> {
        let totals = self.fan_out(campaign, recipients, quote).await;

        let status = if totals.sent_count > 0 {
            CampaignStatus::Completed
        } else {
            CampaignStatus::Failed
        };

        self.campaigns
            .finalize(
                campaign.id,
                status,
                totals.sent_count,
                totals.failed_count,
                totals.total_cost,
            )
            .await?;

        if totals.free_used > 0 {
            self.credits
                .consume_credits(campaign.account_id, Utc::now(), totals.free_used)
                .await?;
        }

        self.ledger.settle(campaign.id, totals.total_cost).await?;

        info!(
            "Campaign {} finished: {} sent, {} failed, cost {}",
            campaign.id, totals.sent_count, totals.failed_count, totals.total_cost
        );

        Ok(DispatchOutcome {
            campaign_id: campaign.id,
            status,
            sent_count: totals.sent_count,
            failed_count: totals.failed_count,
            total_cost: totals.total_cost,
        })
    }

    /// Bounded concurrent fan-out over the recipient set
    async fn fan_out(
        &self,
        campaign: &Campaign,
        recipients: Vec<Recipient>,
        quote: &Quote,
    ) -> FanOutTotals {
        let free_used = AtomicI32::new(0);
        let free_limit = quote.free_count;
        let unit_cost = quote.cost_per_message;
        let hint = quote.tier.hint();
        let business_channel_id = self.business_channel_for(hint);

        let results: Vec<SendResult> = stream::iter(recipients.into_iter().map(|recipient| {
            let business_channel_id = business_channel_id.clone();
            let free_used = &free_used;
            async move {
                self.send_one(
                    campaign,
                    recipient,
                    hint,
                    business_channel_id,
                    unit_cost,
                    free_limit,
                    free_used,
                )
                .await
            }
        }))
        .buffer_unordered(self.settings.max_in_flight.max(1))
        .collect()
        .await;

        let mut totals = FanOutTotals {
            sent_count: 0,
            failed_count: 0,
            total_cost: Decimal::ZERO,
            free_used: 0,
        };
        for result in results {
            match result {
                SendResult::Sent(cost) => {
                    totals.sent_count += 1;
                    totals.total_cost += cost;
                }
                SendResult::Failed => totals.failed_count += 1,
                SendResult::Skipped => {}
            }
        }
        totals.free_used = free_used.load(Ordering::SeqCst).min(free_limit).max(0);

        totals
    }

    /// Send, reconcile and persist one recipient's message
    #[allow(clippy::too_many_arguments)]
    async fn send_one(
        &self,
        campaign: &Campaign,
        recipient: Recipient,
        hint: ChannelHint,
        business_channel_id: Option<String>,
        unit_cost: Decimal,
        free_limit: i32,
        free_used: &AtomicI32,
    ) -> SendResult {
        let content = render_template(&campaign.content, recipient.name.as_deref());
        let send = GatewaySend {
            to: recipient.phone.clone(),
            from: self.settings.sender_id.clone(),
            body: content.clone(),
            hint,
            media_ref: campaign.media_ref.clone().map(MediaRef),
            business_channel_id,
        };

        let (reconciled, tracking_id) = match self.gateway.send(&send).await {
            Ok(accept) => {
                let tracking = accept.tracking_id.clone();
                let reconciled = self
                    .reconciler
                    .reconcile(self.gateway.as_ref(), &accept, &recipient.phone)
                    .await;
                (reconciled, tracking)
            }
            Err(e) => {
                debug!("Send failed for {}: {}", recipient.phone, e);
                (
                    Reconciled {
                        sent: false,
                        fail_reason: Some(e.to_string()),
                    },
                    None,
                )
            }
        };

        // Successful sends claim a free credit while the allowance lasts
        let claimed = reconciled.sent
            && free_used
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                    if used < free_limit {
                        Some(used + 1)
                    } else {
                        None
                    }
                })
                .is_ok();

        let cost = if reconciled.sent && !claimed {
            unit_cost
        } else {
            Decimal::ZERO
        };

        let message = OutboundMessage {
            id: Uuid::new_v4(),
            campaign_id: campaign.id,
            customer_id: recipient.customer_id,
            phone: recipient.phone.clone(),
            content,
            status: if reconciled.sent {
                MessageStatus::Sent
            } else {
                MessageStatus::Failed
            },
            cost,
            tracking_id,
            fail_reason: reconciled.fail_reason,
            dedupe_key: OutboundMessage::dedupe_key_for(campaign.id, recipient.customer_id),
            sent_at: reconciled.sent.then(Utc::now),
            created_at: Utc::now(),
        };

        match self.messages.create(&message).await {
            Ok(_) => {
                if reconciled.sent {
                    SendResult::Sent(cost)
                } else {
                    SendResult::Failed
                }
            }
            Err(AppError::AlreadyExists(_)) => {
                debug!(
                    "Recipient {} already handled for campaign {}",
                    recipient.customer_id, campaign.id
                );
                if claimed {
                    free_used.fetch_sub(1, Ordering::SeqCst);
                }
                SendResult::Skipped
            }
            Err(e) => {
                error!("Failed to persist message for {}: {}", recipient.phone, e);
                if claimed {
                    free_used.fetch_sub(1, Ordering::SeqCst);
                }
                SendResult::Failed
            }
        }
    }
}

/// Substitute the `{name}` placeholder
fn render_template(template: &str, name: Option<&str>) -> String {
    template.replace("{name}", name.unwrap_or(""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciler::AmbiguousPolicy;
    use reach_core::{
        models::{Predicate, TargetType},
        traits::{DeliveryState, DeliveryStatus, GatewayAccept, MediaPurpose},
    };
    use async_trait::async_trait;
    use chrono_tz::Tz;
    use rust_decimal_macros::dec;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Duration;

    // ==================== mocks ====================

    struct MockDirectory {
        recipients: Vec<Recipient>,
    }

    #[async_trait]
    impl CustomerDirectory for MockDirectory {
        async fn find_recipients(
            &self,
            _store_ids: &[Uuid],
            _predicate: &Predicate,
        ) -> AppResult<Vec<Recipient>> {
            Ok(self.recipients.clone())
        }

        async fn count_matching(
            &self,
            _store_ids: &[Uuid],
            _predicate: &Predicate,
        ) -> AppResult<i64> {
            Ok(self.recipients.len() as i64)
        }
    }

    #[derive(Default)]
    struct MockCampaigns {
        created: Mutex<Vec<Campaign>>,
        finalized: Mutex<Option<(CampaignStatus, i32, i32, Decimal)>>,
    }

    #[async_trait]
    impl CampaignRepository for MockCampaigns {
        async fn create(&self, campaign: &Campaign) -> AppResult<Campaign> {
            self.created.lock().unwrap().push(campaign.clone());
            Ok(campaign.clone())
        }

        async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Campaign>> {
            Ok(self
                .created
                .lock()
                .unwrap()
                .iter()
                .find(|c| c.id == id)
                .cloned())
        }

        async fn mark_sending(&self, _id: Uuid, _target_count: i32) -> AppResult<()> {
            Ok(())
        }

        async fn update_status(&self, id: Uuid, status: CampaignStatus) -> AppResult<()> {
            let mut created = self.created.lock().unwrap();
            let campaign = created
                .iter_mut()
                .find(|c| c.id == id)
                .ok_or_else(|| AppError::CampaignNotFound(id.to_string()))?;
            campaign.status = status;
            Ok(())
        }

        async fn finalize(
            &self,
            _id: Uuid,
            status: CampaignStatus,
            sent_count: i32,
            failed_count: i32,
            total_cost: Decimal,
        ) -> AppResult<()> {
            *self.finalized.lock().unwrap() = Some((status, sent_count, failed_count, total_cost));
            Ok(())
        }

        async fn list_by_account(
            &self,
            _account_id: Uuid,
            _limit: i64,
            _offset: i64,
        ) -> AppResult<Vec<Campaign>> {
            Ok(self.created.lock().unwrap().clone())
        }
    }

    #[derive(Default)]
    struct MockMessages {
        rows: Mutex<Vec<OutboundMessage>>,
    }

    #[async_trait]
    impl MessageRepository for MockMessages {
        async fn create(&self, message: &OutboundMessage) -> AppResult<OutboundMessage> {
            let mut rows = self.rows.lock().unwrap();
            if rows.iter().any(|m| m.dedupe_key == message.dedupe_key) {
                return Err(AppError::AlreadyExists(message.dedupe_key.clone()));
            }
            rows.push(message.clone());
            Ok(message.clone())
        }

        async fn list_by_campaign(
            &self,
            campaign_id: Uuid,
            _limit: i64,
        ) -> AppResult<Vec<OutboundMessage>> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|m| m.campaign_id == campaign_id)
                .cloned()
                .collect())
        }

        async fn count_by_campaign(&self, campaign_id: Uuid) -> AppResult<i64> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|m| m.campaign_id == campaign_id)
                .count() as i64)
        }
    }

    struct MockLedger {
        balance: Decimal,
        reserved: Mutex<Option<Decimal>>,
        settled: Mutex<Option<Decimal>>,
        released: Mutex<bool>,
    }

    impl MockLedger {
        fn with_balance(balance: Decimal) -> Self {
            Self {
                balance,
                reserved: Mutex::new(None),
                settled: Mutex::new(None),
                released: Mutex::new(false),
            }
        }
    }

    #[async_trait]
    impl BalanceLedger for MockLedger {
        async fn available_balance(&self, _account_id: Uuid) -> AppResult<Decimal> {
            Ok(self.balance)
        }

        async fn reserve(
            &self,
            account_id: Uuid,
            campaign_id: Uuid,
            amount: Decimal,
        ) -> AppResult<reach_core::models::WalletReservation> {
            if self.balance < amount {
                return Err(AppError::InsufficientBalance {
                    required: amount.to_string(),
                    available: self.balance.to_string(),
                });
            }
            *self.reserved.lock().unwrap() = Some(amount);
            Ok(reach_core::models::WalletReservation {
                id: Uuid::new_v4(),
                account_id,
                campaign_id,
                reserved_amount: amount,
                consumed_amount: Decimal::ZERO,
                released_amount: Decimal::ZERO,
                status: reach_core::models::ReservationStatus::Holding,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
        }

        async fn settle(&self, _campaign_id: Uuid, actual_cost: Decimal) -> AppResult<Decimal> {
            *self.settled.lock().unwrap() = Some(actual_cost);
            Ok(Decimal::ZERO)
        }

        async fn release(&self, _campaign_id: Uuid) -> AppResult<Decimal> {
            *self.released.lock().unwrap() = true;
            Ok(Decimal::ZERO)
        }
    }

    struct MockCredits {
        remaining: i32,
        consumed: Mutex<i32>,
    }

    #[async_trait]
    impl CreditLedger for MockCredits {
        async fn remaining_credits(
            &self,
            _account_id: Uuid,
            _at: DateTime<Utc>,
        ) -> AppResult<i32> {
            Ok(self.remaining)
        }

        async fn consume_credits(
            &self,
            _account_id: Uuid,
            _at: DateTime<Utc>,
            count: i32,
        ) -> AppResult<()> {
            *self.consumed.lock().unwrap() += count;
            Ok(())
        }
    }

    struct MockLog {
        used: i64,
        recorded: Mutex<Vec<TestSend>>,
    }

    #[async_trait]
    impl TestSendLog for MockLog {
        async fn count_today(&self, _account_id: Uuid, _now: DateTime<Utc>) -> AppResult<i64> {
            Ok(self.used)
        }

        async fn record(&self, entry: &TestSend) -> AppResult<()> {
            self.recorded.lock().unwrap().push(entry.clone());
            Ok(())
        }
    }

    /// Gateway where destinations listed in `invalid` are rejected
    struct MockGateway {
        invalid: Vec<String>,
        sends: AtomicUsize,
    }

    impl MockGateway {
        fn accepting() -> Self {
            Self {
                invalid: vec![],
                sends: AtomicUsize::new(0),
            }
        }

        fn rejecting(phones: &[&str]) -> Self {
            Self {
                invalid: phones.iter().map(|p| p.to_string()).collect(),
                sends: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MessageGateway for MockGateway {
        async fn send(&self, request: &GatewaySend) -> AppResult<GatewayAccept> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            if self.invalid.contains(&request.to) {
                return Err(AppError::InvalidRecipient(request.to.clone()));
            }
            Ok(GatewayAccept {
                tracking_id: Some(format!("g-{}", request.to)),
                accepted_count: 1,
                rejected_count: 0,
            })
        }

        async fn upload_media(
            &self,
            _bytes: &[u8],
            _purpose: MediaPurpose,
        ) -> AppResult<MediaRef> {
            Ok(MediaRef("file".to_string()))
        }

        async fn query_status(
            &self,
            _tracking_id: &str,
            _phone: &str,
        ) -> AppResult<DeliveryStatus> {
            Ok(DeliveryStatus {
                state: DeliveryState::Sent,
                fail_reason: None,
            })
        }
    }

    // ==================== fixtures ====================

    type TestDispatcher = CampaignDispatcher<
        MockDirectory,
        MockCampaigns,
        MockMessages,
        MockLedger,
        MockCredits,
        MockLog,
        MockGateway,
    >;

    struct Fixture {
        dispatcher: TestDispatcher,
        campaigns: Arc<MockCampaigns>,
        messages: Arc<MockMessages>,
        ledger: Arc<MockLedger>,
        credits: Arc<MockCredits>,
        log: Arc<MockLog>,
        gateway: Arc<MockGateway>,
    }

    fn fixture(
        recipients: Vec<Recipient>,
        gateway: MockGateway,
        balance: Decimal,
        credits_remaining: i32,
        test_sends_used: i64,
    ) -> Fixture {
        let campaigns = Arc::new(MockCampaigns::default());
        let messages = Arc::new(MockMessages::default());
        let ledger = Arc::new(MockLedger::with_balance(balance));
        let credits = Arc::new(MockCredits {
            remaining: credits_remaining,
            consumed: Mutex::new(0),
        });
        let log = Arc::new(MockLog {
            used: test_sends_used,
            recorded: Mutex::new(vec![]),
        });
        let gateway = Arc::new(gateway);

        let dispatcher = CampaignDispatcher::new(
            AudienceResolver::new(Arc::new(MockDirectory { recipients })),
            campaigns.clone(),
            messages.clone(),
            ledger.clone(),
            credits.clone(),
            TestSendQuota::new(log.clone(), 5),
            gateway.clone(),
            DeliveryReconciler::new(Duration::ZERO, AmbiguousPolicy::AssumeSent),
            open_window(),
            DispatcherSettings {
                sender_id: "0299990000".to_string(),
                business_channel_id: Some("channel-1".to_string()),
                max_in_flight: 4,
            },
        );

        Fixture {
            dispatcher,
            campaigns,
            messages,
            ledger,
            credits,
            log,
            gateway,
        }
    }

    /// A window that is open right now, whatever the wall clock says.
    /// The fixed-offset Etc zones span every hour of the day, so one of
    /// them always has a local time inside the window.
    fn open_window() -> SendWindow {
        let now = Utc::now();
        for offset in -12..=14i32 {
            let name = if offset <= 0 {
                format!("Etc/GMT+{}", -offset)
            } else {
                format!("Etc/GMT-{}", offset)
            };
            let tz: Tz = name.parse().unwrap();
            let window = SendWindow::new(tz);
            if window.is_open(now) {
                return window;
            }
        }
        unreachable!("no fixed-offset zone inside the send window");
    }

    fn recipient(phone: &str) -> Recipient {
        Recipient {
            customer_id: Uuid::new_v4(),
            phone: phone.to_string(),
            name: Some("Kim".to_string()),
        }
    }

    fn sms_request(account_id: Uuid) -> DispatchRequest {
        DispatchRequest {
            account_id,
            store_ids: vec![],
            channel: Channel::Sms,
            title: "August promo".to_string(),
            content: "Hello {name}, see this week's offers".to_string(),
            filter: AudienceFilter {
                target_type: TargetType::All,
                ..Default::default()
            },
            media_ref: None,
        }
    }

    // ==================== scenarios ====================

    #[tokio::test]
    async fn test_partial_failure_completes_with_counts() {
        let fx = fixture(
            vec![
                recipient("01011110001"),
                recipient("01011110002"),
                recipient("01011110003"),
            ],
            MockGateway::rejecting(&["01011110002"]),
            dec!(10000),
            0,
            0,
        );

        let outcome = fx
            .dispatcher
            .dispatch_now(&sms_request(Uuid::new_v4()))
            .await
            .unwrap();

        assert_eq!(outcome.status, CampaignStatus::Completed);
        assert_eq!(outcome.sent_count, 2);
        assert_eq!(outcome.failed_count, 1);
        assert_eq!(outcome.total_cost, dec!(100));

        // reservation covered all three, settlement only the two successes
        assert_eq!(*fx.ledger.reserved.lock().unwrap(), Some(dec!(150)));
        assert_eq!(*fx.ledger.settled.lock().unwrap(), Some(dec!(100)));

        // the failed message row exists with zero cost
        let rows = fx.messages.rows.lock().unwrap();
        assert_eq!(rows.len(), 3);
        let failed: Vec<_> = rows
            .iter()
            .filter(|m| m.status == MessageStatus::Failed)
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].cost, Decimal::ZERO);
        assert_eq!(failed[0].phone, "01011110002");
    }

    #[tokio::test]
    async fn test_insufficient_balance_creates_no_campaign() {
        let fx = fixture(
            vec![recipient("01011110001"), recipient("01011110002")],
            MockGateway::accepting(),
            dec!(30),
            0,
            0,
        );

        let result = fx.dispatcher.dispatch_now(&sms_request(Uuid::new_v4())).await;

        assert!(matches!(result, Err(AppError::InsufficientBalance { .. })));
        assert!(fx.campaigns.created.lock().unwrap().is_empty());
        assert_eq!(fx.gateway.sends.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_audience_rejected_before_ledger() {
        let fx = fixture(vec![], MockGateway::accepting(), dec!(10000), 0, 0);

        let result = fx.dispatcher.dispatch_now(&sms_request(Uuid::new_v4())).await;

        assert!(matches!(result, Err(AppError::NoEligibleRecipients)));
        assert!(fx.ledger.reserved.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_free_credits_zero_cost_messages() {
        let fx = fixture(
            vec![
                recipient("01011110001"),
                recipient("01011110002"),
                recipient("01011110003"),
            ],
            MockGateway::accepting(),
            dec!(10000),
            2,
            0,
        );

        let mut request = sms_request(Uuid::new_v4());
        request.channel = Channel::Brand;

        let outcome = fx.dispatcher.dispatch_now(&request).await.unwrap();

        // 2 credits cover 2 of 3 sends, one bills at the brand text price
        assert_eq!(outcome.sent_count, 3);
        assert_eq!(outcome.total_cost, dec!(200));
        assert_eq!(*fx.ledger.reserved.lock().unwrap(), Some(dec!(200)));
        assert_eq!(*fx.ledger.settled.lock().unwrap(), Some(dec!(200)));
        assert_eq!(*fx.credits.consumed.lock().unwrap(), 2);

        let rows = fx.messages.rows.lock().unwrap();
        let free = rows.iter().filter(|m| m.cost == Decimal::ZERO).count();
        assert_eq!(free, 2);
    }

    #[tokio::test]
    async fn test_total_cost_equals_message_cost_sum() {
        let fx = fixture(
            vec![
                recipient("01011110001"),
                recipient("01011110002"),
                recipient("01011110003"),
                recipient("01011110004"),
            ],
            MockGateway::rejecting(&["01011110004"]),
            dec!(10000),
            0,
            0,
        );

        let outcome = fx
            .dispatcher
            .dispatch_now(&sms_request(Uuid::new_v4()))
            .await
            .unwrap();

        let rows = fx.messages.rows.lock().unwrap();
        let sum: Decimal = rows.iter().map(|m| m.cost).sum();
        assert_eq!(sum, outcome.total_cost);
    }

    #[tokio::test]
    async fn test_all_failed_finalizes_failed() {
        let fx = fixture(
            vec![recipient("01011110001"), recipient("01011110002")],
            MockGateway::rejecting(&["01011110001", "01011110002"]),
            dec!(10000),
            0,
            0,
        );

        let outcome = fx
            .dispatcher
            .dispatch_now(&sms_request(Uuid::new_v4()))
            .await
            .unwrap();

        assert_eq!(outcome.status, CampaignStatus::Failed);
        assert_eq!(outcome.sent_count, 0);
        assert_eq!(outcome.total_cost, Decimal::ZERO);
        assert_eq!(*fx.ledger.settled.lock().unwrap(), Some(Decimal::ZERO));
    }

    #[tokio::test]
    async fn test_quota_rejects_sixth_test_send_without_gateway_call() {
        let fx = fixture(vec![], MockGateway::accepting(), dec!(10000), 0, 5);

        let result = fx
            .dispatcher
            .test_send(&TestSendRequest {
                account_id: Uuid::new_v4(),
                phone: "010-1234-5678".to_string(),
                content: "test".to_string(),
                channel: Channel::Sms,
                media_ref: None,
            })
            .await;

        assert!(matches!(
            result,
            Err(AppError::TestQuotaExceeded { limit: 5 })
        ));
        assert_eq!(fx.gateway.sends.load(Ordering::SeqCst), 0);
        assert!(fx.log.recorded.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_test_send_recorded_and_normalized() {
        let fx = fixture(vec![], MockGateway::accepting(), dec!(10000), 0, 2);

        let outcome = fx
            .dispatcher
            .test_send(&TestSendRequest {
                account_id: Uuid::new_v4(),
                phone: "+82 10-1234-5678".to_string(),
                content: "test".to_string(),
                channel: Channel::Sms,
                media_ref: None,
            })
            .await
            .unwrap();

        assert!(outcome.succeeded);
        assert!(outcome.tracking_id.is_some());

        let recorded = fx.log.recorded.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].phone, "01012345678");
        assert!(recorded[0].succeeded);
    }

    #[tokio::test]
    async fn test_cancel_releases_reservation() {
        let fx = fixture(
            vec![recipient("01011110001")],
            MockGateway::accepting(),
            dec!(10000),
            0,
            0,
        );

        let account_id = Uuid::new_v4();
        let campaign = fx
            .dispatcher
            .schedule(
                &sms_request(account_id),
                Utc::now() + chrono::Duration::hours(2),
            )
            .await
            .unwrap();
        assert_eq!(campaign.status, CampaignStatus::Scheduled);

        fx.dispatcher.cancel(account_id, campaign.id).await.unwrap();
        assert!(*fx.ledger.released.lock().unwrap());

        // a second cancel is rejected
        let again = fx.dispatcher.cancel(account_id, campaign.id).await;
        assert!(matches!(again, Err(AppError::NotCancellable(_))));
    }

    #[tokio::test]
    async fn test_foreign_account_cannot_cancel_or_run() {
        let fx = fixture(
            vec![recipient("01011110001")],
            MockGateway::accepting(),
            dec!(10000),
            0,
            0,
        );

        let owner = Uuid::new_v4();
        let campaign = fx
            .dispatcher
            .schedule(&sms_request(owner), Utc::now() + chrono::Duration::hours(2))
            .await
            .unwrap();

        // another account sees the campaign as not found
        let other = Uuid::new_v4();
        let cancelled = fx.dispatcher.cancel(other, campaign.id).await;
        assert!(matches!(cancelled, Err(AppError::CampaignNotFound(_))));
        assert!(!*fx.ledger.released.lock().unwrap());

        let ran = fx.dispatcher.run_scheduled(other, campaign.id, &[]).await;
        assert!(matches!(ran, Err(AppError::CampaignNotFound(_))));
        assert_eq!(fx.gateway.sends.load(Ordering::SeqCst), 0);

        // the owner still can
        fx.dispatcher.cancel(owner, campaign.id).await.unwrap();
        assert!(*fx.ledger.released.lock().unwrap());
    }

    #[tokio::test]
    async fn test_retried_campaign_skips_recorded_recipients() {
        let shared = recipient("01011110001");
        let fx = fixture(
            vec![shared.clone(), recipient("01011110002")],
            MockGateway::accepting(),
            dec!(10000),
            0,
            0,
        );

        let account_id = Uuid::new_v4();
        let campaign = fx
            .dispatcher
            .schedule(
                &sms_request(account_id),
                Utc::now() + chrono::Duration::hours(2),
            )
            .await
            .unwrap();

        // pretend the first run already recorded one recipient
        fx.messages
            .create(&OutboundMessage {
                id: Uuid::new_v4(),
                campaign_id: campaign.id,
                customer_id: shared.customer_id,
                phone: shared.phone.clone(),
                content: "Hello".to_string(),
                status: MessageStatus::Sent,
                cost: dec!(50),
                tracking_id: None,
                fail_reason: None,
                dedupe_key: OutboundMessage::dedupe_key_for(campaign.id, shared.customer_id),
                sent_at: Some(Utc::now()),
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let outcome = fx
            .dispatcher
            .run_scheduled(account_id, campaign.id, &[])
            .await
            .unwrap();

        // only the unhandled recipient was sent this run
        assert_eq!(outcome.sent_count, 1);
        assert_eq!(fx.messages.rows.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_render_template() {
        assert_eq!(render_template("Hi {name}!", Some("Kim")), "Hi Kim!");
        assert_eq!(render_template("Hi {name}!", None), "Hi !");
        assert_eq!(render_template("No placeholder", Some("Kim")), "No placeholder");
    }
}
