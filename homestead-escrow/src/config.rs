//! Escrow configuration
//!
//! Role identities are fixed per engine instance and supplied here rather
//! than compiled in. Values load from defaults, an optional file, then
//! `HOMESTEAD_*` environment variables.

use crate::{error::EscrowError, EscrowResult};
use chrono::{Duration, Utc};
use homestead_core::Address;
use serde::{Deserialize, Serialize};

/// Configuration for the escrow engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EscrowConfig {
    /// Sole identity allowed to list, finalize and approve as seller
    pub seller: Address,
    /// Sole identity allowed to record inspection results
    pub inspector: Address,
    /// Financing party whose approval and funds are required
    pub lender: Address,
    /// Address the engine holds titles under while listed
    pub custody: Address,
    /// Seconds after listing before parties may cancel for lack of agreement
    pub approval_window_secs: Option<u64>,
    /// Credit the buyer's deposits to the seller when a sale is cancelled
    /// after a passed inspection
    pub forfeit_earnest_after_inspection: bool,
}

impl Default for EscrowConfig {
    fn default() -> Self {
        Self {
            seller: Address::from_low_u64(2),
            inspector: Address::from_low_u64(4),
            lender: Address::from_low_u64(3),
            custody: Address::from_low_u64(0xE5C0),
            approval_window_secs: Some(30 * 24 * 60 * 60), // 30 days
            forfeit_earnest_after_inspection: false,
        }
    }
}

impl EscrowConfig {
    /// Load configuration from an optional file and the environment
    pub fn load(path: Option<&str>) -> EscrowResult<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("HOMESTEAD")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let loaded: EscrowConfig = builder.build()?.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// The approval window, or `None` when disabled or not representable
    pub fn approval_window(&self) -> Option<Duration> {
        self.approval_window_secs
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(Duration::try_seconds)
    }

    pub fn validate(&self) -> EscrowResult<()> {
        for (name, address) in [
            ("seller", self.seller),
            ("inspector", self.inspector),
            ("lender", self.lender),
            ("custody", self.custody),
        ] {
            if address.is_zero() {
                return Err(EscrowError::config(format!("{} address must not be zero", name)));
            }
        }

        if [self.seller, self.inspector, self.lender].contains(&self.custody) {
            return Err(EscrowError::config(
                "custody address must differ from every role identity",
            ));
        }

        for (a, b, first, second) in [
            (self.seller, self.inspector, "seller", "inspector"),
            (self.seller, self.lender, "seller", "lender"),
            (self.inspector, self.lender, "inspector", "lender"),
        ] {
            if a == b {
                return Err(EscrowError::config(format!(
                    "{} and {} must be different identities",
                    first, second
                )));
            }
        }

        if let Some(secs) = self.approval_window_secs {
            // must stay addable to listing timestamps
            let representable = self
                .approval_window()
                .and_then(|window| Utc::now().checked_add_signed(window))
                .is_some();
            if !representable {
                return Err(EscrowError::config(format!(
                    "approval window of {} seconds is out of range",
                    secs
                )));
            }
        }

        Ok(())
    }
}
