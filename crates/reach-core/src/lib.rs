//! Reach Core Library
//!
//! Foundational types for the Reach campaign dispatch engine:
//!
//! - Domain models (Customer, Campaign, OutboundMessage, Wallet, etc.)
//! - The typed audience filter AST interpreted by the resolver
//! - Repository and gateway traits for dependency injection
//! - Unified error handling with HTTP response mapping
//! - Application configuration

pub mod config;
pub mod error;
pub mod models;
pub mod traits;

pub use config::AppConfig;
pub use error::AppError;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
