//! Domain models

pub mod campaign;
pub mod credit;
pub mod customer;
pub mod filter;
pub mod message;
pub mod wallet;

pub use campaign::{Campaign, CampaignStatus, Channel};
pub use credit::{MonthlyCredit, TestSend};
pub use customer::{normalize_phone, Customer, Gender, Recipient};
pub use filter::{AgeBracket, AudienceFilter, Predicate, RegionFilter, TargetType};
pub use message::{MessageStatus, OutboundMessage};
pub use wallet::{
    ReservationStatus, TransactionKind, Wallet, WalletReservation, WalletTransaction,
};
