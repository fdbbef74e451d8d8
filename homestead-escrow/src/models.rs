//! Core data models for the escrow system
//!
//! Party roles, the tri-state inspection flag, listing lifecycle stages and
//! the audit event record.

use chrono::{DateTime, Utc};
use homestead_core::{Address, Amount, PropertyId};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Parties recognized by the escrow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Seller,
    Buyer,
    Lender,
    Inspector,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Seller => "seller",
            Self::Buyer => "buyer",
            Self::Lender => "lender",
            Self::Inspector => "inspector",
        };
        f.write_str(name)
    }
}

/// Inspection outcome; `Pending` blocks finalization just like `Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InspectionStatus {
    #[default]
    Pending,
    Passed,
    Failed,
}

impl InspectionStatus {
    pub fn from_passed(passed: bool) -> Self {
        if passed {
            Self::Passed
        } else {
            Self::Failed
        }
    }

    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }
}

impl fmt::Display for InspectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Passed => "passed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Stored lifecycle status of a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    /// Accepting deposits, inspection and approvals
    Active,
    /// Funds disbursed and title delivered to the buyer
    Finalized,
    /// Funds refunded and title returned to the seller
    Cancelled,
}

impl ListingStatus {
    /// Check if this is a terminal state (no further transitions possible)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finalized | Self::Cancelled)
    }
}

/// Observable progress of a listing.
///
/// Parties may act in any order, so the stage is derived from what has been
/// recorded rather than stored: the furthest milestone reached wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStage {
    /// Title in custody, nothing deposited yet
    Listed,
    /// Funds held, awaiting inspection and approvals
    EarnestPending,
    /// Inspector has recorded a result
    Inspected,
    /// Buyer, seller and lender have all approved
    Approved,
    Finalized,
    Cancelled,
}

impl ListingStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finalized | Self::Cancelled)
    }
}

/// Kinds of audit events emitted by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowEventKind {
    PropertyListed,
    EarnestDeposited,
    FinancingDeposited,
    InspectionUpdated,
    SaleApproved,
    SaleFinalized,
    SaleCancelled,
    FundsWithdrawn,
}

/// Escrow event for audit trail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowEvent {
    pub id: Uuid,
    pub kind: EscrowEventKind,
    pub property_id: Option<PropertyId>,
    pub actor: Address,
    pub amount: Option<Amount>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl EscrowEvent {
    pub fn new(kind: EscrowEventKind, property_id: Option<PropertyId>, actor: Address) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            property_id,
            actor,
            amount: None,
            metadata: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_amount(mut self, amount: Amount) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inspection_from_flag() {
        assert_eq!(InspectionStatus::from_passed(true), InspectionStatus::Passed);
        assert_eq!(InspectionStatus::from_passed(false), InspectionStatus::Failed);
        assert!(!InspectionStatus::default().is_passed());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!ListingStatus::Active.is_terminal());
        assert!(ListingStatus::Finalized.is_terminal());
        assert!(ListingStatus::Cancelled.is_terminal());
        assert!(ListingStage::Cancelled.is_terminal());
        assert!(!ListingStage::Approved.is_terminal());
    }

    #[test]
    fn test_event_serializes_snake_case() {
        let event = EscrowEvent::new(
            EscrowEventKind::EarnestDeposited,
            Some(PropertyId(1)),
            Address::from_low_u64(1),
        )
        .with_amount(Amount::ether(3));

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "earnest_deposited");
        assert_eq!(json["property_id"], 1);
    }
}
