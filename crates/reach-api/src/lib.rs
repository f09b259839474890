//! API layer for Reach
//!
//! HTTP handlers for campaign dispatch, scheduling, estimates and test
//! sends, all scoped under an account id.

#![forbid(unsafe_code)]

pub mod dto;
pub mod handlers;

use reach_db::{
    PgCampaignRepository, PgCreditLedger, PgCustomerDirectory, PgMessageRepository, PgTestSendLog,
};
use reach_gateway::RestGateway;
use reach_services::{CampaignDispatcher, PgWalletLedger};

/// The fully wired dispatcher the handlers run against
pub type AppDispatcher = CampaignDispatcher<
    PgCustomerDirectory,
    PgCampaignRepository,
    PgMessageRepository,
    PgWalletLedger,
    PgCreditLedger,
    PgTestSendLog,
    RestGateway,
>;

pub use dto::{ApiResponse, PaginationParams};
pub use handlers::{configure_campaigns, configure_health, configure_test_sends};
