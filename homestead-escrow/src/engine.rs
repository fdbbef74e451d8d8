//! Escrow Engine - the sale state machine
//!
//! Drives a listing from custody-taking through deposits, inspection and
//! approvals to either finalization (funds to seller, title to buyer) or
//! cancellation (refunds, title back to seller). It is the only component
//! that moves funds or asks the registry to transfer a title.
//!
//! Every mutating call takes the state write lock for its whole
//! validate / transfer / commit sequence, so calls against the same
//! listing are totally ordered and a rejected call changes nothing.

use crate::{
    config::EscrowConfig,
    error::{EscrowError, Unmet},
    ledger::{Ledger, Listing},
    models::{
        EscrowEvent, EscrowEventKind, InspectionStatus, ListingStage, ListingStatus, Role,
    },
    registry::TitleRegistry,
    vault::Vault,
    EscrowResult,
};
use chrono::Utc;
use homestead_core::{Address, Amount, PropertyId};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

#[derive(Debug, Default)]
struct EscrowState {
    ledger: Ledger,
    vault: Vault,
    events: Vec<EscrowEvent>,
}

/// Main escrow engine
pub struct EscrowEngine {
    config: EscrowConfig,
    registry: Arc<dyn TitleRegistry>,
    state: Arc<RwLock<EscrowState>>,
}

impl EscrowEngine {
    /// Create a new escrow engine bound to a title registry
    pub fn new(config: EscrowConfig, registry: Arc<dyn TitleRegistry>) -> EscrowResult<Self> {
        config.validate()?;

        info!(
            "Initializing escrow engine (seller: {}, inspector: {}, lender: {}, custody: {})",
            config.seller, config.inspector, config.lender, config.custody
        );

        Ok(Self {
            config,
            registry,
            state: Arc::new(RwLock::new(EscrowState::default())),
        })
    }

    /// List a property for sale and take custody of its title.
    ///
    /// The seller must own the title and have approved the custody address
    /// in the registry beforehand.
    pub async fn list_property(
        &self,
        caller: Address,
        property_id: PropertyId,
        purchase_price: Amount,
        escrow_amount: Amount,
        buyer: Address,
    ) -> EscrowResult<Listing> {
        if caller != self.config.seller {
            return Err(self.deny(caller, "list a property", property_id));
        }

        let mut guard = self.state.write().await;
        let EscrowState { ledger, events, .. } = &mut *guard;

        if let Some(existing) = ledger.get(&property_id) {
            match existing.status {
                ListingStatus::Active => {
                    return Err(EscrowError::state(format!(
                        "property {} is already listed",
                        property_id
                    )))
                }
                ListingStatus::Finalized => {
                    return Err(EscrowError::state(format!(
                        "property {} has already been sold",
                        property_id
                    )))
                }
                // a cancelled sale may be listed again
                ListingStatus::Cancelled => {}
            }
        }

        if purchase_price.is_zero() {
            return Err(EscrowError::state("purchase price must be greater than 0"));
        }
        if escrow_amount > purchase_price {
            return Err(EscrowError::state(format!(
                "escrow amount {} exceeds purchase price {}",
                escrow_amount, purchase_price
            )));
        }
        let reserved = [
            self.config.custody,
            caller,
            self.config.lender,
            self.config.inspector,
        ];
        if buyer.is_zero() || reserved.contains(&buyer) {
            return Err(EscrowError::state(format!(
                "{} cannot be the designated buyer",
                buyer
            )));
        }

        let owner = self.registry.owner_of(property_id).await?;
        if owner != caller {
            return Err(self.deny(caller, "list a property it does not own", property_id));
        }

        self.registry
            .transfer_from(self.config.custody, caller, self.config.custody, property_id)
            .await?;

        let listing = Listing::new(
            property_id,
            caller,
            self.config.lender,
            purchase_price,
            escrow_amount,
            buyer,
        );
        ledger.insert(listing.clone());

        events.push(
            EscrowEvent::new(EscrowEventKind::PropertyListed, Some(property_id), caller)
                .with_amount(purchase_price)
                .with_metadata(serde_json::json!({
                    "escrow_amount": escrow_amount,
                    "buyer": buyer,
                })),
        );

        info!(
            "Listed property {} for {} (earnest {}, buyer {})",
            property_id, purchase_price, escrow_amount, buyer
        );

        Ok(listing)
    }

    /// Buyer places earnest funds in escrow; returns the new listing balance
    pub async fn deposit_earnest(
        &self,
        caller: Address,
        property_id: PropertyId,
        amount: Amount,
    ) -> EscrowResult<Amount> {
        let mut guard = self.state.write().await;
        let EscrowState {
            ledger,
            vault,
            events,
        } = &mut *guard;
        let listing = active_listing_mut(ledger, property_id)?;

        if caller != listing.designated_buyer {
            return Err(self.deny(caller, "deposit earnest", property_id));
        }
        if amount.is_zero() {
            return Err(EscrowError::precondition(property_id, Unmet::ZeroDeposit));
        }
        if amount < listing.escrow_amount {
            return Err(EscrowError::precondition(
                property_id,
                Unmet::EarnestBelowMinimum {
                    offered: amount,
                    required: listing.escrow_amount,
                },
            ));
        }

        let balance = credit_deposit(listing, vault, caller, amount)?;

        events.push(
            EscrowEvent::new(EscrowEventKind::EarnestDeposited, Some(property_id), caller)
                .with_amount(amount),
        );

        info!(
            "Buyer deposited {} earnest on property {} (balance {})",
            amount, property_id, balance
        );

        Ok(balance)
    }

    /// Lender adds financing to the listing balance; returns the new balance
    pub async fn fund_financing(
        &self,
        caller: Address,
        property_id: PropertyId,
        amount: Amount,
    ) -> EscrowResult<Amount> {
        let mut guard = self.state.write().await;
        let EscrowState {
            ledger,
            vault,
            events,
        } = &mut *guard;
        let listing = active_listing_mut(ledger, property_id)?;

        if caller != listing.lender {
            return Err(self.deny(caller, "fund financing", property_id));
        }
        if amount.is_zero() {
            return Err(EscrowError::precondition(property_id, Unmet::ZeroDeposit));
        }

        let balance = credit_deposit(listing, vault, caller, amount)?;

        events.push(
            EscrowEvent::new(EscrowEventKind::FinancingDeposited, Some(property_id), caller)
                .with_amount(amount),
        );

        info!(
            "Lender funded {} on property {} (balance {})",
            amount, property_id, balance
        );

        Ok(balance)
    }

    /// Record the inspection result. May be corrected until the listing closes.
    pub async fn update_inspection_status(
        &self,
        caller: Address,
        property_id: PropertyId,
        passed: bool,
    ) -> EscrowResult<InspectionStatus> {
        let mut guard = self.state.write().await;
        let EscrowState { ledger, events, .. } = &mut *guard;
        let listing = active_listing_mut(ledger, property_id)?;

        if caller != self.config.inspector {
            return Err(self.deny(caller, "update inspection status", property_id));
        }

        let status = InspectionStatus::from_passed(passed);
        let previous = listing.inspection;
        listing.inspection = status;
        listing.updated_at = Utc::now();

        events.push(
            EscrowEvent::new(EscrowEventKind::InspectionUpdated, Some(property_id), caller)
                .with_metadata(serde_json::json!({
                    "previous": previous,
                    "status": status,
                })),
        );

        info!("Inspection for property {} marked {}", property_id, status);

        Ok(status)
    }

    /// Sign off on the sale as buyer, seller or lender. Repeat calls are no-ops.
    pub async fn approve_sale(&self, caller: Address, property_id: PropertyId) -> EscrowResult<()> {
        let mut guard = self.state.write().await;
        let EscrowState { ledger, events, .. } = &mut *guard;
        let listing = active_listing_mut(ledger, property_id)?;

        let role = if caller == listing.designated_buyer {
            Role::Buyer
        } else if caller == listing.seller {
            Role::Seller
        } else if caller == listing.lender {
            Role::Lender
        } else {
            return Err(self.deny(caller, "approve the sale", property_id));
        };

        if listing.approvals.get(&caller) {
            return Ok(());
        }

        listing.approvals.set(caller);
        listing.updated_at = Utc::now();

        events.push(
            EscrowEvent::new(EscrowEventKind::SaleApproved, Some(property_id), caller)
                .with_metadata(serde_json::json!({ "role": role })),
        );

        info!("{} approved sale of property {}", role, property_id);

        Ok(())
    }

    /// Disburse the purchase price to the seller and deliver title to the buyer.
    ///
    /// Requires all three approvals, a passed inspection and a balance
    /// covering the price. Any excess over the price stays on the listing
    /// and in `held_balance()`; nothing releases it afterwards.
    pub async fn finalize_sale(
        &self,
        caller: Address,
        property_id: PropertyId,
    ) -> EscrowResult<Listing> {
        let mut guard = self.state.write().await;
        let EscrowState {
            ledger,
            vault,
            events,
        } = &mut *guard;
        let listing = active_listing_mut(ledger, property_id)?;

        if caller != self.config.seller {
            return Err(self.deny(caller, "finalize the sale", property_id));
        }

        for (role, identity) in [
            (Role::Buyer, listing.designated_buyer),
            (Role::Seller, listing.seller),
            (Role::Lender, listing.lender),
        ] {
            if !listing.approvals.get(&identity) {
                return Err(EscrowError::precondition(
                    property_id,
                    Unmet::MissingApproval(role),
                ));
            }
        }

        if !listing.inspection.is_passed() {
            return Err(EscrowError::precondition(
                property_id,
                Unmet::InspectionNotPassed(listing.inspection),
            ));
        }

        let remaining = listing
            .balance
            .checked_sub(listing.purchase_price)
            .ok_or_else(|| {
                EscrowError::precondition(
                    property_id,
                    Unmet::InsufficientBalance {
                        balance: listing.balance,
                        required: listing.purchase_price,
                    },
                )
            })?;

        let credits = [(listing.seller, listing.purchase_price)];
        vault.check_release(&credits)?;

        self.registry
            .transfer_from(
                self.config.custody,
                self.config.custody,
                listing.designated_buyer,
                property_id,
            )
            .await?;

        vault.release(&credits)?;
        listing.balance = remaining;
        listing.close(ListingStatus::Finalized);

        events.push(
            EscrowEvent::new(EscrowEventKind::SaleFinalized, Some(property_id), caller)
                .with_amount(listing.purchase_price)
                .with_metadata(serde_json::json!({
                    "buyer": listing.designated_buyer,
                    "remaining_balance": remaining,
                })),
        );

        info!(
            "Finalized sale of property {}: {} to seller, title to {}",
            property_id, listing.purchase_price, listing.designated_buyer
        );

        Ok(listing.clone())
    }

    /// Back out of a sale: refund deposits and return title to the seller.
    ///
    /// Seller or buyer may cancel once the inspection has failed; seller,
    /// buyer or lender may cancel once the approval window has elapsed.
    pub async fn cancel_sale(
        &self,
        caller: Address,
        property_id: PropertyId,
    ) -> EscrowResult<Listing> {
        let mut guard = self.state.write().await;
        let EscrowState {
            ledger,
            vault,
            events,
        } = &mut *guard;
        let listing = active_listing_mut(ledger, property_id)?;

        let principal = caller == listing.seller || caller == listing.designated_buyer;
        if !principal && caller != listing.lender {
            return Err(self.deny(caller, "cancel the sale", property_id));
        }

        let inspection_failed = listing.inspection == InspectionStatus::Failed;
        let window_elapsed = self.window_elapsed(listing);

        if !window_elapsed {
            if inspection_failed && !principal {
                return Err(self.deny(caller, "cancel after a failed inspection", property_id));
            }
            if !inspection_failed {
                return Err(EscrowError::precondition(
                    property_id,
                    Unmet::CancellationNotPermitted,
                ));
            }
        }

        let reason = if inspection_failed {
            "inspection failed"
        } else {
            "approval window elapsed"
        };
        self.close_cancelled(listing, vault, events, caller, reason)
            .await?;

        Ok(listing.clone())
    }

    /// Cancel every active listing whose approval window has elapsed.
    ///
    /// Meant to be polled by an external keeper. Each listing is cancelled
    /// independently; one failure does not stop the sweep.
    pub async fn cancel_expired_listings(&self) -> EscrowResult<Vec<PropertyId>> {
        if self.config.approval_window().is_none() {
            return Ok(Vec::new());
        }

        let mut guard = self.state.write().await;
        let EscrowState {
            ledger,
            vault,
            events,
        } = &mut *guard;

        let mut expired: Vec<PropertyId> = ledger
            .iter()
            .filter(|listing| listing.is_active() && self.window_elapsed(listing))
            .map(|listing| listing.property_id)
            .collect();
        expired.sort();

        let mut cancelled = Vec::new();
        for property_id in expired {
            let Some(listing) = ledger.get_mut(&property_id) else {
                continue;
            };

            match self
                .close_cancelled(
                    listing,
                    vault,
                    events,
                    self.config.custody,
                    "approval window elapsed",
                )
                .await
            {
                Ok(()) => cancelled.push(property_id),
                Err(e) => error!("Failed to cancel expired listing {}: {}", property_id, e),
            }
        }

        if !cancelled.is_empty() {
            info!("Cancelled {} expired listings", cancelled.len());
        }

        Ok(cancelled)
    }

    /// Pay out the caller's whole payable balance
    pub async fn withdraw(&self, caller: Address) -> EscrowResult<Amount> {
        let mut guard = self.state.write().await;
        let EscrowState { vault, events, .. } = &mut *guard;

        let amount = vault
            .withdraw(&caller)
            .ok_or_else(|| EscrowError::unscoped_precondition(Unmet::NothingToWithdraw))?;

        events.push(EscrowEvent::new(EscrowEventKind::FundsWithdrawn, None, caller).with_amount(amount));

        info!("Paid out {} to {}", amount, caller);

        Ok(amount)
    }

    pub fn seller(&self) -> Address {
        self.config.seller
    }

    pub fn inspector(&self) -> Address {
        self.config.inspector
    }

    pub fn lender(&self) -> Address {
        self.config.lender
    }

    pub fn custody(&self) -> Address {
        self.config.custody
    }

    pub fn registry(&self) -> &Arc<dyn TitleRegistry> {
        &self.registry
    }

    /// Get a listing snapshot, including closed ones
    pub async fn listing(&self, property_id: PropertyId) -> EscrowResult<Listing> {
        self.state
            .read()
            .await
            .ledger
            .get(&property_id)
            .cloned()
            .ok_or_else(|| EscrowError::state(format!("property {} was never listed", property_id)))
    }

    pub async fn listings(&self) -> Vec<Listing> {
        let state = self.state.read().await;
        let mut listings: Vec<Listing> = state.ledger.iter().cloned().collect();
        listings.sort_by_key(|listing| listing.property_id);
        listings
    }

    pub async fn is_listed(&self, property_id: PropertyId) -> bool {
        self.state
            .read()
            .await
            .ledger
            .get(&property_id)
            .map(|listing| listing.is_listed)
            .unwrap_or(false)
    }

    pub async fn buyer(&self, property_id: PropertyId) -> EscrowResult<Address> {
        self.listing(property_id)
            .await
            .map(|listing| listing.designated_buyer)
    }

    pub async fn purchase_price(&self, property_id: PropertyId) -> EscrowResult<Amount> {
        self.listing(property_id)
            .await
            .map(|listing| listing.purchase_price)
    }

    pub async fn escrow_amount(&self, property_id: PropertyId) -> EscrowResult<Amount> {
        self.listing(property_id)
            .await
            .map(|listing| listing.escrow_amount)
    }

    pub async fn inspection_status(&self, property_id: PropertyId) -> EscrowResult<InspectionStatus> {
        self.listing(property_id).await.map(|listing| listing.inspection)
    }

    pub async fn stage(&self, property_id: PropertyId) -> EscrowResult<ListingStage> {
        self.listing(property_id).await.map(|listing| listing.stage())
    }

    pub async fn approval(&self, property_id: PropertyId, identity: Address) -> bool {
        self.state.read().await.ledger.approval(&property_id, &identity)
    }

    /// Funds recorded against one listing; zero if never listed
    pub async fn balance(&self, property_id: PropertyId) -> Amount {
        self.state
            .read()
            .await
            .ledger
            .get(&property_id)
            .map(|listing| listing.balance)
            .unwrap_or(Amount::ZERO)
    }

    /// Funds held by the escrow across all listings, including remainders
    /// left on finalized listings
    pub async fn held_balance(&self) -> Amount {
        self.state.read().await.vault.held()
    }

    pub async fn payable_balance(&self, identity: Address) -> Amount {
        self.state.read().await.vault.payable_of(&identity)
    }

    pub async fn events(&self) -> Vec<EscrowEvent> {
        self.state.read().await.events.clone()
    }

    pub async fn events_for(&self, property_id: PropertyId) -> Vec<EscrowEvent> {
        self.state
            .read()
            .await
            .events
            .iter()
            .filter(|event| event.property_id == Some(property_id))
            .cloned()
            .collect()
    }

    fn deny(&self, caller: Address, action: &str, property_id: PropertyId) -> EscrowError {
        warn!(
            "Rejected {} attempting to {} on property {}",
            caller, action, property_id
        );
        EscrowError::unauthorized(caller, action, property_id)
    }

    fn window_elapsed(&self, listing: &Listing) -> bool {
        self.config
            .approval_window()
            .and_then(|window| listing.listed_at.checked_add_signed(window))
            .map(|deadline| Utc::now() >= deadline)
            .unwrap_or(false)
    }

    /// Payouts owed when a listing is cancelled, one per depositor
    fn refund_credits(&self, listing: &Listing) -> EscrowResult<Vec<(Address, Amount)>> {
        let mut deposits: Vec<(Address, Amount)> = listing
            .deposits
            .iter()
            .map(|(depositor, amount)| (*depositor, *amount))
            .collect();
        deposits.sort();

        let total = deposits
            .iter()
            .try_fold(Amount::ZERO, |acc, (_, amount)| acc.checked_add(*amount))
            .ok_or_else(|| EscrowError::invariant("deposit total overflow"))?;
        if total != listing.balance {
            return Err(EscrowError::invariant(format!(
                "deposits {} do not match balance {} on property {}",
                total, listing.balance, listing.property_id
            )));
        }

        let forfeit = self.config.forfeit_earnest_after_inspection
            && listing.inspection == InspectionStatus::Passed;

        Ok(deposits
            .into_iter()
            .map(|(depositor, amount)| {
                if forfeit && depositor == listing.designated_buyer {
                    (listing.seller, amount)
                } else {
                    (depositor, amount)
                }
            })
            .collect())
    }

    async fn close_cancelled(
        &self,
        listing: &mut Listing,
        vault: &mut Vault,
        events: &mut Vec<EscrowEvent>,
        actor: Address,
        reason: &str,
    ) -> EscrowResult<()> {
        let property_id = listing.property_id;
        let credits = self.refund_credits(listing)?;
        vault.check_release(&credits)?;

        self.registry
            .transfer_from(
                self.config.custody,
                self.config.custody,
                listing.seller,
                property_id,
            )
            .await?;

        vault.release(&credits)?;
        let refunded = listing.balance;
        listing.balance = Amount::ZERO;
        listing.close(ListingStatus::Cancelled);

        let payouts: Vec<serde_json::Value> = credits
            .iter()
            .map(|(to, amount)| serde_json::json!({ "to": to, "amount": amount }))
            .collect();

        events.push(
            EscrowEvent::new(EscrowEventKind::SaleCancelled, Some(property_id), actor)
                .with_amount(refunded)
                .with_metadata(serde_json::json!({
                    "reason": reason,
                    "payouts": payouts,
                })),
        );

        warn!(
            "Cancelled sale of property {} ({}), {} returned to depositors",
            property_id, reason, refunded
        );

        Ok(())
    }
}

fn active_listing_mut(ledger: &mut Ledger, property_id: PropertyId) -> EscrowResult<&mut Listing> {
    let listing = ledger
        .get_mut(&property_id)
        .ok_or_else(|| EscrowError::state(format!("property {} is not listed", property_id)))?;

    if !listing.is_active() {
        return Err(EscrowError::state(format!(
            "property {} is {:?}; no further operations allowed",
            property_id, listing.status
        )));
    }

    Ok(listing)
}

fn credit_deposit(
    listing: &mut Listing,
    vault: &mut Vault,
    depositor: Address,
    amount: Amount,
) -> EscrowResult<Amount> {
    let balance = listing
        .balance
        .checked_add(amount)
        .ok_or_else(|| EscrowError::invariant("listing balance overflow"))?;
    let contributed = listing
        .deposited_by(&depositor)
        .checked_add(amount)
        .ok_or_else(|| EscrowError::invariant("deposit overflow"))?;

    vault.receive(amount)?;
    listing.balance = balance;
    listing.deposits.insert(depositor, contributed);
    listing.updated_at = Utc::now();

    Ok(balance)
}
