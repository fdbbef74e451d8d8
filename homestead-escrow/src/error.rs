//! Error types for the escrow system
//!
//! Every engine operation fails synchronously with one of these kinds and
//! leaves listing, approval and fund state untouched.

use crate::models::{InspectionStatus, Role};
use homestead_core::{Address, Amount, PropertyId};
use std::fmt;
use thiserror::Error;

/// Main error type for escrow operations
#[derive(Error, Debug)]
pub enum EscrowError {
    /// Caller lacks the role required for the action on this listing
    #[error("Unauthorized: {caller} may not {action} on property {property_id}")]
    Authorization {
        caller: Address,
        action: String,
        property_id: PropertyId,
    },

    /// Operation is invalid for the listing's lifecycle stage
    #[error("Invalid state: {0}")]
    State(String),

    /// Finalize/cancel, a deposit or a withdrawal attempted without its
    /// conditions met
    #[error("Precondition not met{}: {unmet}", scope(.property_id))]
    Precondition {
        property_id: Option<PropertyId>,
        unmet: Unmet,
    },

    /// Internal bookkeeping would break an invariant
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Title registry rejected a call
    #[error("Registry error: {0}")]
    Registry(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

fn scope(property_id: &Option<PropertyId>) -> String {
    property_id
        .map(|id| format!(" on property {}", id))
        .unwrap_or_default()
}

/// The specific condition that blocked an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unmet {
    MissingApproval(Role),
    InspectionNotPassed(InspectionStatus),
    InsufficientBalance { balance: Amount, required: Amount },
    EarnestBelowMinimum { offered: Amount, required: Amount },
    ZeroDeposit,
    CancellationNotPermitted,
    NothingToWithdraw,
}

impl fmt::Display for Unmet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingApproval(role) => write!(f, "{} approval missing", role),
            Self::InspectionNotPassed(status) => {
                write!(f, "inspection not passed (status: {})", status)
            }
            Self::InsufficientBalance { balance, required } => write!(
                f,
                "insufficient balance: {} held, {} required",
                balance, required
            ),
            Self::EarnestBelowMinimum { offered, required } => write!(
                f,
                "earnest deposit {} below required {}",
                offered, required
            ),
            Self::ZeroDeposit => write!(f, "deposit amount must be greater than 0"),
            Self::CancellationNotPermitted => write!(
                f,
                "cancellation requires a failed inspection or an elapsed approval window"
            ),
            Self::NothingToWithdraw => write!(f, "no payable balance"),
        }
    }
}

impl EscrowError {
    /// Create an authorization error
    pub fn unauthorized<S: Into<String>>(caller: Address, action: S, property_id: PropertyId) -> Self {
        Self::Authorization {
            caller,
            action: action.into(),
            property_id,
        }
    }

    /// Create a lifecycle state error
    pub fn state<S: Into<String>>(msg: S) -> Self {
        Self::State(msg.into())
    }

    /// Create a precondition error
    pub fn precondition(property_id: PropertyId, unmet: Unmet) -> Self {
        Self::Precondition {
            property_id: Some(property_id),
            unmet,
        }
    }

    /// Create a precondition error not tied to a listing
    pub fn unscoped_precondition(unmet: Unmet) -> Self {
        Self::Precondition {
            property_id: None,
            unmet,
        }
    }

    /// Create an invariant violation
    pub fn invariant<S: Into<String>>(msg: S) -> Self {
        Self::InvariantViolation(msg.into())
    }

    /// Create a registry error
    pub fn registry<S: Into<String>>(msg: S) -> Self {
        Self::Registry(msg.into())
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// The unmet condition, when this is a precondition failure
    pub fn unmet(&self) -> Option<&Unmet> {
        match self {
            Self::Precondition { unmet, .. } => Some(unmet),
            _ => None,
        }
    }
}

impl From<config::ConfigError> for EscrowError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

