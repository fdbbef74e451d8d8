//! Subcommand implementations

use anyhow::{bail, Context};
use homestead_core::{Address, Amount, PropertyId};
use homestead_escrow::{EscrowConfig, EscrowEngine, InMemoryTitleRegistry, TitleRegistry};
use std::sync::Arc;
use tracing::info;

const METADATA_BASE: &str = "https://ipfs.io/ipfs/QmQVcpsjrA6cr1iJjZAodYwmPekYgbnXGo4DFubJiLc2EB";

/// (price, earnest) in ether for the demo listings
const DEMO_TERMS: [(u64, u64); 3] = [(20, 10), (15, 3), (25, 7)];

/// Inputs for a single simulated sale
#[derive(Debug, Clone)]
pub struct SalePlan {
    pub price: Amount,
    pub earnest: Amount,
    pub financing: Amount,
    pub fail_inspection: bool,
    pub buyer: Address,
}

fn setup(config: EscrowConfig) -> anyhow::Result<(Arc<InMemoryTitleRegistry>, EscrowEngine)> {
    let registry = Arc::new(InMemoryTitleRegistry::new());
    let engine = EscrowEngine::new(config, registry.clone())
        .context("failed to start escrow engine")?;
    Ok((registry, engine))
}

/// Mint a title to the seller and approve the escrow's custody address
async fn mint_for_sale(
    registry: &InMemoryTitleRegistry,
    engine: &EscrowEngine,
    index: u64,
) -> anyhow::Result<PropertyId> {
    let uri = format!("{}/{}.json", METADATA_BASE, index);
    let id = registry.mint(engine.seller(), &uri).await?;
    registry.approve(engine.seller(), id, engine.custody()).await?;
    Ok(id)
}

pub async fn demo(config: EscrowConfig, buyer: Address) -> anyhow::Result<()> {
    let (registry, engine) = setup(config)?;

    info!("Minting {} properties", DEMO_TERMS.len());
    let mut ids = Vec::with_capacity(DEMO_TERMS.len());
    for index in 1..=DEMO_TERMS.len() as u64 {
        ids.push(mint_for_sale(&registry, &engine, index).await?);
    }

    for (id, (price, earnest)) in ids.iter().zip(DEMO_TERMS) {
        engine
            .list_property(
                engine.seller(),
                *id,
                Amount::ether(price),
                Amount::ether(earnest),
                buyer,
            )
            .await
            .with_context(|| format!("failed to list property {}", id))?;
    }

    info!("Finished listing properties");
    println!("{}", serde_json::to_string_pretty(&engine.listings().await)?);
    Ok(())
}

pub async fn simulate(config: EscrowConfig, plan: SalePlan) -> anyhow::Result<()> {
    let (registry, engine) = setup(config)?;
    let seller = engine.seller();
    let lender = engine.lender();

    let id = mint_for_sale(&registry, &engine, 1).await?;
    engine
        .list_property(seller, id, plan.price, plan.earnest, plan.buyer)
        .await?;
    engine.deposit_earnest(plan.buyer, id, plan.earnest).await?;
    engine
        .update_inspection_status(engine.inspector(), id, !plan.fail_inspection)
        .await?;

    for party in [plan.buyer, seller, lender] {
        engine.approve_sale(party, id).await?;
    }
    if !plan.financing.is_zero() {
        engine.fund_financing(lender, id, plan.financing).await?;
    }

    let listing = if plan.fail_inspection {
        engine.cancel_sale(plan.buyer, id).await?
    } else {
        engine
            .finalize_sale(seller, id)
            .await
            .context("sale could not be finalized")?
    };

    let owner = registry.owner_of(id).await?;
    let expected_owner = if plan.fail_inspection { seller } else { plan.buyer };
    if owner != expected_owner {
        bail!("title {} ended with {} instead of {}", id, owner, expected_owner);
    }

    let mut payouts = serde_json::Map::new();
    for party in [plan.buyer, seller, lender] {
        let payable = engine.payable_balance(party).await;
        if !payable.is_zero() {
            engine.withdraw(party).await?;
            payouts.insert(party.to_string(), serde_json::to_value(payable)?);
        }
    }

    let summary = serde_json::json!({
        "listing": listing,
        "title_owner": owner,
        "held_balance": engine.held_balance().await,
        "payouts": payouts,
        "events": engine.events().await,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
