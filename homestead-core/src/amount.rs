//! Wei-denominated fund amounts

use crate::{CoreError, CoreResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};

/// Number of wei in one ether
pub const WEI_PER_ETHER: u128 = 1_000_000_000_000_000_000;

const ETHER_DECIMALS: u32 = 18;

/// An amount of funds in wei
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Amount(u128);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_wei(wei: u128) -> Self {
        Self(wei)
    }

    /// Whole ether units
    pub const fn ether(units: u64) -> Self {
        Self(units as u128 * WEI_PER_ETHER)
    }

    pub const fn as_wei(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    /// Parse a decimal ether string such as `"2.5"` into wei
    pub fn parse_ether(input: &str) -> CoreResult<Self> {
        let value = Decimal::from_str(input.trim())
            .map_err(|e| CoreError::invalid_amount(format!("{}: {}", input, e)))?
            .normalize();

        if value.is_sign_negative() && !value.is_zero() {
            return Err(CoreError::invalid_amount(format!("{}: must not be negative", input)));
        }

        let scale = value.scale();
        if scale > ETHER_DECIMALS {
            return Err(CoreError::invalid_amount(format!(
                "{}: more than {} decimal places",
                input, ETHER_DECIMALS
            )));
        }

        let mantissa = value.mantissa().unsigned_abs();
        mantissa
            .checked_mul(10u128.pow(ETHER_DECIMALS - scale))
            .map(Amount)
            .ok_or_else(|| CoreError::invalid_amount(format!("{}: overflows wei", input)))
    }

    /// Render as a decimal ether string, falling back to wei when the value
    /// exceeds decimal precision
    pub fn to_ether_string(&self) -> String {
        i128::try_from(self.0)
            .ok()
            .and_then(|wei| Decimal::try_from_i128_with_scale(wei, ETHER_DECIMALS).ok())
            .map(|d| d.normalize().to_string())
            .unwrap_or_else(|| format!("{} wei", self.0))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ETH", self.to_ether_string())
    }
}

// Serialized as a decimal wei string; JSON numbers cannot carry u128 safely.
impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse::<u128>()
            .map(Amount)
            .map_err(|e| serde::de::Error::custom(format!("invalid wei amount {}: {}", raw, e)))
    }
}

impl FromStr for Amount {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_ether(s)
    }
}
