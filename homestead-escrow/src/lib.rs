//! Multi-party escrow for tokenized property sales
//!
//! This crate implements the escrow that sits between a seller, a buyer,
//! a lender and an inspector:
//! - Title custody through an external registry (two-phase approve/transfer)
//! - Earnest and financing deposits held per listing
//! - Inspection and approvals recorded in any order, checked at finalization
//! - Atomic funds/title swap on finalize, refunds on cancellation

pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod models;
pub mod registry;
pub mod vault;

pub use crate::config::EscrowConfig;
pub use engine::EscrowEngine;
pub use error::{EscrowError, Unmet};
pub use registry::{InMemoryTitleRegistry, TitleRegistry};

/// Result type alias for escrow operations
pub type EscrowResult<T> = Result<T, EscrowError>;
