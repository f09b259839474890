//! HTTP request handlers

pub mod campaign;
pub mod health;
pub mod test_send;

pub use campaign::configure as configure_campaigns;
pub use health::configure as configure_health;
pub use test_send::configure as configure_test_sends;
