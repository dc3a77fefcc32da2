// 1.0: all the primitives live here. account ids, assets, front-end tags, callers, prices,
// timestamps. each is a newtype or enum so the compiler catches mixups.

use crate::math::{Fixed, MathError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(pub u64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// 1.1: the three fungible assets the engine moves around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Asset {
    /// The pegged stable asset, minted against troves.
    Stable,
    /// The collateral asset locked in troves.
    Collateral,
    /// The reward token issued to stability depositors.
    Reward,
}

impl Asset {
    pub fn symbol(&self) -> &'static str {
        match self {
            Asset::Stable => "STBL",
            Asset::Collateral => "COLL",
            Asset::Reward => "RWD",
        }
    }
}

// 1.2: how a stability deposit was made. a direct deposit has no referrer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FrontEndTag {
    #[default]
    Direct,
    ViaFrontEnd(AccountId),
}

impl FrontEndTag {
    pub fn front_end(&self) -> Option<AccountId> {
        match self {
            FrontEndTag::Direct => None,
            FrontEndTag::ViaFrontEnd(id) => Some(*id),
        }
    }
}

// 1.3: who is invoking a privileged operation. offsets and redistributions are
// reserved for the liquidation coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Caller {
    Account(AccountId),
    LiquidationCoordinator,
}

impl Caller {
    pub fn is_coordinator(&self) -> bool {
        matches!(self, Caller::LiquidationCoordinator)
    }
}

// 1.4: collateral price in stable units. must be positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Price(Fixed);

impl Price {
    #[must_use]
    pub fn new(value: Decimal) -> Option<Self> {
        match Fixed::new(value) {
            Ok(fixed) if !fixed.is_zero() => Some(Self(fixed)),
            _ => None,
        }
    }

    pub fn new_unchecked(value: Decimal) -> Self {
        debug_assert!(value > Decimal::ZERO);
        Self(Fixed::new_unchecked(value))
    }

    pub fn value(&self) -> Fixed {
        self.0
    }

    /// Stable value of `collateral` at this price.
    pub fn value_of(&self, collateral: Fixed) -> Result<Fixed, MathError> {
        collateral.checked_mul(self.0)
    }

    /// Collateral worth `stable` at this price.
    pub fn collateral_for(&self, stable: Fixed) -> Result<Fixed, MathError> {
        stable.checked_div(self.0)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// 1.5: millisecond timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp_millis())
    }

    pub fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    pub fn from_secs(secs: i64) -> Self {
        Self(secs * 1000)
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }

    /// Whole minutes elapsed since `earlier`, zero if `earlier` is in the future.
    pub fn minutes_since(&self, earlier: &Timestamp) -> u64 {
        let diff_ms = (self.0 - earlier.0).max(0);
        (diff_ms / 60_000) as u64
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match chrono::DateTime::from_timestamp_millis(self.0) {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S UTC")),
            None => write!(f, "{}ms", self.0),
        }
    }
}
