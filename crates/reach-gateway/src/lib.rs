//! Reach Gateway Client
//!
//! reqwest-backed implementation of the `MessageGateway` trait: message
//! submission, media upload and delivery status queries against the
//! provider's REST API.

pub mod client;
pub mod types;

pub use client::{GatewayError, GatewaySettings, RestGateway};
