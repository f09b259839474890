//! Repository implementations

pub mod campaign_repo;
pub mod credit_repo;
pub mod customer_repo;
pub mod message_repo;
pub mod test_send_repo;

pub use campaign_repo::PgCampaignRepository;
pub use credit_repo::PgCreditLedger;
pub use customer_repo::PgCustomerDirectory;
pub use message_repo::PgMessageRepository;
pub use test_send_repo::PgTestSendLog;
