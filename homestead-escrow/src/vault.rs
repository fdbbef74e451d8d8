//! Funds held by the escrow
//!
//! Deposits land in `held`. Finalize and cancel move funds out of `held`
//! into per-identity payable balances, which parties then withdraw. Every
//! mutation validates first and applies second, so a rejected call leaves
//! the vault unchanged.

use crate::{error::EscrowError, EscrowResult};
use homestead_core::{Address, Amount};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct Vault {
    held: Amount,
    payable: HashMap<Address, Amount>,
}

impl Vault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Funds still held against listings
    pub fn held(&self) -> Amount {
        self.held
    }

    pub fn payable_of(&self, identity: &Address) -> Amount {
        self.payable.get(identity).copied().unwrap_or(Amount::ZERO)
    }

    pub fn receive(&mut self, amount: Amount) -> EscrowResult<()> {
        self.held = self
            .held
            .checked_add(amount)
            .ok_or_else(|| EscrowError::invariant("held funds overflow"))?;
        Ok(())
    }

    /// Verify that `credits` could be released without applying them
    pub fn check_release(&self, credits: &[(Address, Amount)]) -> EscrowResult<()> {
        self.compute_release(credits).map(|_| ())
    }

    /// Move funds from `held` into payable balances, all or nothing
    pub fn release(&mut self, credits: &[(Address, Amount)]) -> EscrowResult<()> {
        let (held, updated) = self.compute_release(credits)?;
        self.held = held;
        self.payable.extend(updated);
        Ok(())
    }

    /// Pay out an identity's whole payable balance
    pub fn withdraw(&mut self, identity: &Address) -> Option<Amount> {
        self.payable.remove(identity).filter(|a| !a.is_zero())
    }

    fn compute_release(
        &self,
        credits: &[(Address, Amount)],
    ) -> EscrowResult<(Amount, HashMap<Address, Amount>)> {
        let mut held = self.held;
        let mut updated: HashMap<Address, Amount> = HashMap::new();

        for (identity, amount) in credits {
            held = held.checked_sub(*amount).ok_or_else(|| {
                EscrowError::invariant(format!(
                    "release of {} exceeds held funds {}",
                    amount, self.held
                ))
            })?;

            let current = updated
                .get(identity)
                .copied()
                .unwrap_or_else(|| self.payable_of(identity));
            let credited = current
                .checked_add(*amount)
                .ok_or_else(|| EscrowError::invariant("payable balance overflow"))?;
            updated.insert(*identity, credited);
        }

        Ok((held, updated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receive_and_release() {
        let seller = Address::from_low_u64(2);
        let mut vault = Vault::new();
        vault.receive(Amount::ether(13)).unwrap();

        vault.release(&[(seller, Amount::ether(10))]).unwrap();

        assert_eq!(vault.held(), Amount::ether(3));
        assert_eq!(vault.payable_of(&seller), Amount::ether(10));
    }

    #[test]
    fn test_over_release_leaves_vault_unchanged() {
        let buyer = Address::from_low_u64(1);
        let lender = Address::from_low_u64(3);
        let mut vault = Vault::new();
        vault.receive(Amount::ether(5)).unwrap();

        let result = vault.release(&[(buyer, Amount::ether(3)), (lender, Amount::ether(3))]);

        assert!(matches!(result, Err(EscrowError::InvariantViolation(_))));
        assert_eq!(vault.held(), Amount::ether(5));
        assert_eq!(vault.payable_of(&buyer), Amount::ZERO);
    }

    #[test]
    fn test_repeated_credits_accumulate() {
        let seller = Address::from_low_u64(2);
        let mut vault = Vault::new();
        vault.receive(Amount::ether(6)).unwrap();

        vault
            .release(&[(seller, Amount::ether(2)), (seller, Amount::ether(4))])
            .unwrap();

        assert_eq!(vault.payable_of(&seller), Amount::ether(6));
        assert_eq!(vault.held(), Amount::ZERO);
    }

    #[test]
    fn test_withdraw_clears_payable() {
        let seller = Address::from_low_u64(2);
        let mut vault = Vault::new();
        vault.receive(Amount::ether(10)).unwrap();
        vault.release(&[(seller, Amount::ether(10))]).unwrap();

        assert_eq!(vault.withdraw(&seller), Some(Amount::ether(10)));
        assert_eq!(vault.withdraw(&seller), None);
        assert_eq!(vault.payable_of(&seller), Amount::ZERO);
    }
}
