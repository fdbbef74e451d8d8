//! Title Registry boundary
//!
//! The escrow never owns title records itself; it drives an external
//! registry through this trait. Custody is two-phase: the owner approves
//! the escrow's custody address, then the escrow exercises that approval
//! with `transfer_from`.

use crate::{error::EscrowError, EscrowResult};
use async_trait::async_trait;
use homestead_core::{Address, PropertyId};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::info;

/// Operations the escrow needs from a title registry
#[async_trait]
pub trait TitleRegistry: Send + Sync {
    /// Mint a new title to `owner`, returning its identifier
    async fn mint(&self, owner: Address, token_uri: &str) -> EscrowResult<PropertyId>;

    async fn owner_of(&self, property_id: PropertyId) -> EscrowResult<Address>;

    /// Owner pre-authorizes `custodian` to move one title
    async fn approve(
        &self,
        owner: Address,
        property_id: PropertyId,
        custodian: Address,
    ) -> EscrowResult<()>;

    async fn get_approved(&self, property_id: PropertyId) -> EscrowResult<Option<Address>>;

    /// Move a title; `operator` must be the owner or its approved custodian
    async fn transfer_from(
        &self,
        operator: Address,
        from: Address,
        to: Address,
        property_id: PropertyId,
    ) -> EscrowResult<()>;

    async fn token_uri(&self, property_id: PropertyId) -> EscrowResult<String>;

    async fn total_supply(&self) -> u64;
}

#[derive(Debug, Clone)]
struct TitleRecord {
    owner: Address,
    approved: Option<Address>,
    token_uri: String,
}

#[derive(Debug, Default)]
struct RegistryState {
    titles: HashMap<PropertyId, TitleRecord>,
    next_id: u64,
}

/// Registry kept in memory; identifiers start at 1 and increase by one per mint
#[derive(Debug, Default)]
pub struct InMemoryTitleRegistry {
    state: RwLock<RegistryState>,
}

impl InMemoryTitleRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TitleRegistry for InMemoryTitleRegistry {
    async fn mint(&self, owner: Address, token_uri: &str) -> EscrowResult<PropertyId> {
        if owner.is_zero() {
            return Err(EscrowError::registry("cannot mint to the zero address"));
        }

        let mut state = self.state.write().await;
        state.next_id += 1;
        let property_id = PropertyId(state.next_id);
        state.titles.insert(
            property_id,
            TitleRecord {
                owner,
                approved: None,
                token_uri: token_uri.to_string(),
            },
        );

        info!("Minted title {} to {}", property_id, owner);

        Ok(property_id)
    }

    async fn owner_of(&self, property_id: PropertyId) -> EscrowResult<Address> {
        self.state
            .read()
            .await
            .titles
            .get(&property_id)
            .map(|record| record.owner)
            .ok_or_else(|| EscrowError::registry(format!("title {} does not exist", property_id)))
    }

    async fn approve(
        &self,
        owner: Address,
        property_id: PropertyId,
        custodian: Address,
    ) -> EscrowResult<()> {
        let mut state = self.state.write().await;
        let record = state
            .titles
            .get_mut(&property_id)
            .ok_or_else(|| EscrowError::registry(format!("title {} does not exist", property_id)))?;

        if record.owner != owner {
            return Err(EscrowError::registry(format!(
                "{} is not the owner of title {}",
                owner, property_id
            )));
        }
        if custodian == owner {
            return Err(EscrowError::registry("approval to current owner"));
        }

        record.approved = Some(custodian);
        Ok(())
    }

    async fn get_approved(&self, property_id: PropertyId) -> EscrowResult<Option<Address>> {
        self.state
            .read()
            .await
            .titles
            .get(&property_id)
            .map(|record| record.approved)
            .ok_or_else(|| EscrowError::registry(format!("title {} does not exist", property_id)))
    }

    async fn transfer_from(
        &self,
        operator: Address,
        from: Address,
        to: Address,
        property_id: PropertyId,
    ) -> EscrowResult<()> {
        if to.is_zero() {
            return Err(EscrowError::registry("transfer to the zero address"));
        }

        let mut state = self.state.write().await;
        let record = state
            .titles
            .get_mut(&property_id)
            .ok_or_else(|| EscrowError::registry(format!("title {} does not exist", property_id)))?;

        if record.owner != from {
            return Err(EscrowError::registry(format!(
                "transfer of title {} from incorrect owner {}",
                property_id, from
            )));
        }
        if operator != record.owner && record.approved != Some(operator) {
            return Err(EscrowError::registry(format!(
                "{} is not owner nor approved for title {}",
                operator, property_id
            )));
        }

        record.owner = to;
        record.approved = None;

        info!("Transferred title {} from {} to {}", property_id, from, to);

        Ok(())
    }

    async fn token_uri(&self, property_id: PropertyId) -> EscrowResult<String> {
        self.state
            .read()
            .await
            .titles
            .get(&property_id)
            .map(|record| record.token_uri.clone())
            .ok_or_else(|| EscrowError::registry(format!("title {} does not exist", property_id)))
    }

    async fn total_supply(&self) -> u64 {
        self.state.read().await.next_id
    }
}
