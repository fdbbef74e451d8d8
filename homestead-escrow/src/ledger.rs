//! Escrow ledger and approval tracker
//!
//! Plain records keyed by property. Nothing here validates callers or
//! lifecycle; the engine is the only writer and enforces every invariant
//! before touching these structures.

use crate::models::{InspectionStatus, ListingStage, ListingStatus};
use chrono::{DateTime, Utc};
use homestead_core::{Address, Amount, PropertyId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-listing sign-offs, keyed by identity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approvals(HashMap<Address, bool>);

impl Approvals {
    /// Seed the tracker with `false` for every party expected to sign
    pub fn for_parties(parties: &[Address]) -> Self {
        Self(parties.iter().map(|party| (*party, false)).collect())
    }

    pub fn get(&self, identity: &Address) -> bool {
        self.0.get(identity).copied().unwrap_or(false)
    }

    pub fn set(&mut self, identity: Address) {
        self.0.insert(identity, true);
    }
}

/// One active or closed offer to sell a property
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub property_id: PropertyId,
    pub seller: Address,
    pub purchase_price: Amount,
    pub escrow_amount: Amount,
    pub designated_buyer: Address,
    pub lender: Address,
    pub is_listed: bool,
    pub inspection: InspectionStatus,
    pub balance: Amount,
    pub approvals: Approvals,
    /// Contribution per depositor; sums to `balance` while active
    pub deposits: HashMap<Address, Amount>,
    pub status: ListingStatus,
    pub listed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Listing {
    pub fn new(
        property_id: PropertyId,
        seller: Address,
        lender: Address,
        purchase_price: Amount,
        escrow_amount: Amount,
        designated_buyer: Address,
    ) -> Self {
        let now = Utc::now();
        Self {
            property_id,
            seller,
            purchase_price,
            escrow_amount,
            designated_buyer,
            lender,
            is_listed: true,
            inspection: InspectionStatus::Pending,
            balance: Amount::ZERO,
            approvals: Approvals::for_parties(&[designated_buyer, seller, lender]),
            deposits: HashMap::new(),
            status: ListingStatus::Active,
            listed_at: now,
            updated_at: now,
            closed_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ListingStatus::Active
    }

    pub fn deposited_by(&self, identity: &Address) -> Amount {
        self.deposits.get(identity).copied().unwrap_or(Amount::ZERO)
    }

    pub fn all_parties_approved(&self) -> bool {
        self.approvals.get(&self.designated_buyer)
            && self.approvals.get(&self.seller)
            && self.approvals.get(&self.lender)
    }

    /// Furthest milestone this listing has reached
    pub fn stage(&self) -> ListingStage {
        match self.status {
            ListingStatus::Finalized => ListingStage::Finalized,
            ListingStatus::Cancelled => ListingStage::Cancelled,
            ListingStatus::Active if self.all_parties_approved() => ListingStage::Approved,
            ListingStatus::Active if self.inspection != InspectionStatus::Pending => {
                ListingStage::Inspected
            }
            ListingStatus::Active if !self.balance.is_zero() => ListingStage::EarnestPending,
            ListingStatus::Active => ListingStage::Listed,
        }
    }

    pub(crate) fn close(&mut self, status: ListingStatus) {
        let now = Utc::now();
        self.status = status;
        self.is_listed = false;
        self.updated_at = now;
        self.closed_at = Some(now);
    }
}

/// All listings the engine has ever created, retained after closing for audit
#[derive(Debug, Default)]
pub struct Ledger {
    listings: HashMap<PropertyId, Listing>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, property_id: &PropertyId) -> Option<&Listing> {
        self.listings.get(property_id)
    }

    pub fn get_mut(&mut self, property_id: &PropertyId) -> Option<&mut Listing> {
        self.listings.get_mut(property_id)
    }

    /// Store a listing, replacing a closed record for the same property
    pub fn insert(&mut self, listing: Listing) -> Option<Listing> {
        self.listings.insert(listing.property_id, listing)
    }

    pub fn approval(&self, property_id: &PropertyId, identity: &Address) -> bool {
        self.listings
            .get(property_id)
            .map(|listing| listing.approvals.get(identity))
            .unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Listing> {
        self.listings.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_listing() -> Listing {
        Listing::new(
            PropertyId(1),
            Address::from_low_u64(2),
            Address::from_low_u64(3),
            Amount::ether(10),
            Amount::ether(3),
            Address::from_low_u64(1),
        )
    }

    #[test]
    fn test_new_listing_defaults() {
        let listing = sample_listing();

        assert!(listing.is_listed);
        assert!(listing.is_active());
        assert_eq!(listing.balance, Amount::ZERO);
        assert_eq!(listing.inspection, InspectionStatus::Pending);
        assert!(!listing.all_parties_approved());
        assert!(!listing.approvals.get(&listing.seller));
        assert_eq!(listing.stage(), ListingStage::Listed);
    }

    #[test]
    fn test_stage_tracks_furthest_milestone() {
        let mut listing = sample_listing();

        listing.balance = Amount::ether(3);
        assert_eq!(listing.stage(), ListingStage::EarnestPending);

        listing.inspection = InspectionStatus::Failed;
        assert_eq!(listing.stage(), ListingStage::Inspected);

        // approvals recorded before inspection still count
        listing.inspection = InspectionStatus::Pending;
        for party in [listing.designated_buyer, listing.seller, listing.lender] {
            listing.approvals.set(party);
        }
        assert_eq!(listing.stage(), ListingStage::Approved);

        listing.close(ListingStatus::Finalized);
        assert_eq!(listing.stage(), ListingStage::Finalized);
        assert!(!listing.is_listed);
        assert!(listing.closed_at.is_some());
    }

    #[test]
    fn test_approval_lookup() {
        let mut ledger = Ledger::new();
        let mut listing = sample_listing();
        listing.approvals.set(listing.seller);
        let seller = listing.seller;
        ledger.insert(listing);

        assert!(ledger.approval(&PropertyId(1), &seller));
        assert!(!ledger.approval(&PropertyId(1), &Address::from_low_u64(1)));
        assert!(!ledger.approval(&PropertyId(9), &seller));
    }

    #[test]
    fn test_insert_replaces_closed_record() {
        let mut ledger = Ledger::new();
        let mut first = sample_listing();
        first.close(ListingStatus::Cancelled);
        ledger.insert(first);

        let mut relisted = sample_listing();
        relisted.purchase_price = Amount::ether(12);
        let previous = ledger.insert(relisted).unwrap();

        assert_eq!(previous.status, ListingStatus::Cancelled);
        let current = ledger.get(&PropertyId(1)).unwrap();
        assert!(current.is_active());
        assert_eq!(current.purchase_price, Amount::ether(12));
        assert_eq!(ledger.iter().count(), 1);
    }
}
