//! Business logic services for Reach
//!
//! This crate contains the services that orchestrate campaign dispatch:
//! audience resolution, pricing, the wallet ledger, delivery reconciliation,
//! the send-window guard, the test-send quota and the campaign dispatcher.
//!
//! # Architecture
//!
//! Services are designed to be composable and testable:
//! - Each service owns its dependencies behind trait bounds
//! - Services are wrapped in Arc for safe sharing across async tasks
//! - All operations are instrumented with tracing
//! - Comprehensive error handling with AppError

pub mod audience;
pub mod dispatcher;
pub mod ledger;
pub mod pricing;
pub mod reconciler;
pub mod send_window;
pub mod test_quota;

pub use audience::AudienceResolver;
pub use dispatcher::{
    CampaignDispatcher, DispatchOutcome, DispatchRequest, DispatcherSettings, Estimate,
    TestSendOutcome, TestSendRequest,
};
pub use ledger::PgWalletLedger;
pub use pricing::{CostTier, Quote};
pub use reconciler::{AmbiguousPolicy, DeliveryReconciler, Reconciled};
pub use send_window::SendWindow;
pub use test_quota::TestSendQuota;

/// Business logic constants
pub mod constants {
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    /// Short text price per message
    pub const SHORT_MESSAGE_PRICE: Decimal = dec!(50);

    /// Long text price per message
    pub const LONG_MESSAGE_PRICE: Decimal = dec!(50);

    /// Media message price per message
    pub const MEDIA_MESSAGE_PRICE: Decimal = dec!(120);

    /// Brand text message price per message
    pub const BRAND_TEXT_PRICE: Decimal = dec!(200);

    /// Brand image message price per message
    pub const BRAND_IMAGE_PRICE: Decimal = dec!(230);

    /// Byte length above which a text message is long rather than short
    pub const SHORT_BYTE_LIMIT: usize = 90;

    /// Free message credits granted per account per calendar month
    pub const FREE_MONTHLY_CREDITS: i32 = 30;

    /// Daily test send cap per account
    pub const TEST_SEND_DAILY_LIMIT: i32 = 5;

    /// Delay before the single delivery status poll, in seconds
    pub const STATUS_POLL_DELAY_SECS: u64 = 3;

    /// Default bound on concurrent in-flight sends per campaign
    pub const MAX_IN_FLIGHT: usize = 20;
}
