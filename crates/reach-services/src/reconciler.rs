//! Delivery reconciler
//!
//! Classifies each send into a terminal Sent/Failed after the gateway
//! accepts it. A send without a tracking id can never be confirmed and
//! fails immediately. Otherwise the reconciler waits a fixed delay, polls
//! status once, and falls back to the accept's aggregate counters when the
//! poll is inconclusive. When there is no signal at all the configured
//! `AmbiguousPolicy` decides.

use reach_core::traits::{DeliveryState, GatewayAccept, MessageGateway};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Resolution for sends with no delivery signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AmbiguousPolicy {
    /// Treat silence as success; matches providers that only report failures
    #[default]
    AssumeSent,
    /// Treat silence as failure
    AssumeFailed,
}

/// Terminal classification of one send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub sent: bool,
    pub fail_reason: Option<String>,
}

impl Reconciled {
    fn sent() -> Self {
        Self {
            sent: true,
            fail_reason: None,
        }
    }

    fn failed(reason: impl Into<String>) -> Self {
        Self {
            sent: false,
            fail_reason: Some(reason.into()),
        }
    }
}

/// Delivery reconciler service
pub struct DeliveryReconciler {
    poll_delay: Duration,
    policy: AmbiguousPolicy,
}

impl DeliveryReconciler {
    /// Create a reconciler with the given poll delay and ambiguity policy
    pub fn new(poll_delay: Duration, policy: AmbiguousPolicy) -> Self {
        Self { poll_delay, policy }
    }

    /// Reconcile one accepted send into a terminal state
    #[instrument(skip(self, gateway, accept), fields(to = %phone))]
    pub async fn reconcile<G: MessageGateway + ?Sized>(
        &self,
        gateway: &G,
        accept: &GatewayAccept,
        phone: &str,
    ) -> Reconciled {
        let Some(tracking_id) = accept.tracking_id.as_deref() else {
            return Reconciled::failed("no tracking id returned");
        };

        tokio::time::sleep(self.poll_delay).await;

        match gateway.query_status(tracking_id, phone).await {
            Ok(status) => match status.state {
                DeliveryState::Sent => Reconciled::sent(),
                DeliveryState::Failed => Reconciled::failed(
                    status
                        .fail_reason
                        .unwrap_or_else(|| "provider reported failure".to_string()),
                ),
                DeliveryState::Pending => {
                    debug!("Delivery still pending for {}, using accept counters", phone);
                    self.from_counters(accept)
                }
            },
            Err(e) => {
                warn!("Status query failed for {}: {}", tracking_id, e);
                self.from_counters(accept)
            }
        }
    }

    /// Fall back to the accept's aggregate counters
    fn from_counters(&self, accept: &GatewayAccept) -> Reconciled {
        if accept.accepted_count > 0 {
            return Reconciled::sent();
        }
        if accept.rejected_count > 0 {
            return Reconciled::failed("rejected by provider");
        }
        match self.policy {
            AmbiguousPolicy::AssumeSent => Reconciled::sent(),
            AmbiguousPolicy::AssumeFailed => Reconciled::failed("no delivery signal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reach_core::{
        traits::{DeliveryStatus, GatewaySend, MediaPurpose, MediaRef},
        AppError, AppResult,
    };
    use async_trait::async_trait;

    struct MockGateway {
        status: AppResult<DeliveryStatus>,
    }

    #[async_trait]
    impl MessageGateway for MockGateway {
        async fn send(&self, _request: &GatewaySend) -> AppResult<GatewayAccept> {
            Ok(GatewayAccept::default())
        }

        async fn upload_media(
            &self,
            _bytes: &[u8],
            _purpose: MediaPurpose,
        ) -> AppResult<MediaRef> {
            Ok(MediaRef("file".to_string()))
        }

        async fn query_status(&self, _tracking_id: &str, _phone: &str) -> AppResult<DeliveryStatus> {
            match &self.status {
                Ok(s) => Ok(s.clone()),
                Err(_) => Err(AppError::StatusUnavailable("down".to_string())),
            }
        }
    }

    fn reconciler(policy: AmbiguousPolicy) -> DeliveryReconciler {
        DeliveryReconciler::new(Duration::ZERO, policy)
    }

    fn accept(tracking: Option<&str>, accepted: i32, rejected: i32) -> GatewayAccept {
        GatewayAccept {
            tracking_id: tracking.map(String::from),
            accepted_count: accepted,
            rejected_count: rejected,
        }
    }

    #[tokio::test]
    async fn test_missing_tracking_id_fails_immediately() {
        let gateway = MockGateway {
            status: Ok(DeliveryStatus {
                state: DeliveryState::Sent,
                fail_reason: None,
            }),
        };
        let result = reconciler(AmbiguousPolicy::AssumeSent)
            .reconcile(&gateway, &accept(None, 1, 0), "01012345678")
            .await;

        assert!(!result.sent);
        assert_eq!(result.fail_reason.as_deref(), Some("no tracking id returned"));
    }

    #[tokio::test]
    async fn test_terminal_status_wins_over_counters() {
        let gateway = MockGateway {
            status: Ok(DeliveryStatus {
                state: DeliveryState::Failed,
                fail_reason: Some("unreachable".to_string()),
            }),
        };
        // counters say accepted, the terminal poll result still wins
        let result = reconciler(AmbiguousPolicy::AssumeSent)
            .reconcile(&gateway, &accept(Some("g1"), 1, 0), "01012345678")
            .await;

        assert!(!result.sent);
        assert_eq!(result.fail_reason.as_deref(), Some("unreachable"));
    }

    #[tokio::test]
    async fn test_pending_falls_back_to_counters() {
        let gateway = MockGateway {
            status: Ok(DeliveryStatus {
                state: DeliveryState::Pending,
                fail_reason: None,
            }),
        };

        let sent = reconciler(AmbiguousPolicy::AssumeFailed)
            .reconcile(&gateway, &accept(Some("g1"), 1, 0), "01012345678")
            .await;
        assert!(sent.sent);

        let rejected = reconciler(AmbiguousPolicy::AssumeSent)
            .reconcile(&gateway, &accept(Some("g1"), 0, 1), "01012345678")
            .await;
        assert!(!rejected.sent);
    }

    #[tokio::test]
    async fn test_no_signal_resolved_by_policy() {
        let gateway = MockGateway {
            status: Err(AppError::StatusUnavailable("down".to_string())),
        };

        let optimistic = reconciler(AmbiguousPolicy::AssumeSent)
            .reconcile(&gateway, &accept(Some("g1"), 0, 0), "01012345678")
            .await;
        assert!(optimistic.sent);

        let pessimistic = reconciler(AmbiguousPolicy::AssumeFailed)
            .reconcile(&gateway, &accept(Some("g1"), 0, 0), "01012345678")
            .await;
        assert!(!pessimistic.sent);
        assert_eq!(pessimistic.fail_reason.as_deref(), Some("no delivery signal"));
    }
}
