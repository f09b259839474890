//! Reach Database Layer
//!
//! PostgreSQL access and repository implementations for the dispatch engine:
//!
//! - Connection pool management with sqlx
//! - Predicate-to-SQL interpretation for audience queries
//! - Repository implementations for campaigns, messages, wallets, credits
//!   and test-send audit rows
//! - Transaction support for atomic ledger operations

pub mod pool;
pub mod repositories;

pub use pool::create_pool;
pub use repositories::*;

// Re-export commonly used types
pub use reach_core::{AppError, AppResult};
pub use sqlx::{PgPool, Postgres, Transaction};
