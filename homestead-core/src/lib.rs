//! Core types shared across Homestead crates
//!
//! Identities are 20-byte account addresses, titles are identified by a
//! numeric `PropertyId`, and all funds are tracked in wei-denominated
//! `Amount`s with ether conversions for display and input.

pub mod address;
pub mod amount;
pub mod error;

pub use address::{Address, PropertyId};
pub use amount::{Amount, WEI_PER_ETHER};
pub use error::CoreError;

/// Result type alias for core parsing operations
pub type CoreResult<T> = Result<T, CoreError>;
