//! Data Transfer Objects (DTOs) for API requests and responses

pub mod campaign;
pub mod common;

pub use campaign::*;
pub use common::*;
