// 7.0 config.rs: all protocol settings in one place. ratios, gas compensation,
// fees, reward issuance and the price feed.
// 7.1 fee rates here are floors. the base rate on top of them lives in fees.rs.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::fees::FeeParams;
use crate::math::Fixed;
use crate::price_feed::PriceFeedConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolParams {
    // Minimum collateral ratio for an individual trove
    pub mcr: Decimal,
    // Critical system collateral ratio, no operation may push TCR below it
    pub ccr: Decimal,
    // Stable reserved from each trove to pay liquidators
    pub stable_gas_compensation: Decimal,
    // Smallest debt a trove may carry, not counting gas compensation
    pub min_net_debt: Decimal,
    // Liquidators receive collateral / divisor (200 = 0.5%)
    pub collateral_gas_divisor: Decimal,
    pub borrowing_fee_rate: Decimal,
    pub max_borrowing_fee_rate: Decimal,
    pub redemption_fee_rate: Decimal,
    // Per-minute decay of the base rate (half-life of 12 hours)
    pub minute_decay_factor: Decimal,
    // Divisor on the redeemed share of supply when raising the base rate
    pub redemption_beta: Decimal,
    // Total reward tokens the stability pool will ever issue
    pub reward_supply_cap: Decimal,
    // Per-minute decay of the unissued reward supply
    pub issuance_factor: Decimal,
    pub price_feed: PriceFeedConfig,
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self {
            mcr: dec!(1.1),
            ccr: dec!(1.5),
            stable_gas_compensation: dec!(200),
            min_net_debt: dec!(1800),
            collateral_gas_divisor: dec!(200),
            borrowing_fee_rate: dec!(0.005),
            max_borrowing_fee_rate: dec!(0.05),
            redemption_fee_rate: dec!(0.005),
            minute_decay_factor: dec!(0.999037758833783),
            redemption_beta: dec!(2),
            reward_supply_cap: dec!(32_000_000),
            issuance_factor: dec!(0.999998681227695),
            price_feed: PriceFeedConfig::default(),
        }
    }
}

impl ProtocolParams {
    // Low minimums and free borrowing for local runs
    pub fn development() -> Self {
        Self {
            stable_gas_compensation: dec!(10),
            min_net_debt: dec!(90),
            borrowing_fee_rate: Decimal::ZERO,
            max_borrowing_fee_rate: Decimal::ZERO,
            ..Self::default()
        }
    }

    pub fn testnet() -> Self {
        Self::default()
    }

    // Conservative oracle settings for production
    pub fn mainnet() -> Self {
        let mut params = Self::default();
        params.price_feed.min_sources = 2;
        params.price_feed.max_move_from_last = Some(dec!(0.5));
        params
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mcr <= Decimal::ONE {
            return Err(ConfigError::InvalidRatio {
                reason: "MCR must be above 100%".to_string(),
            });
        }
        if self.ccr < self.mcr {
            return Err(ConfigError::InvalidRatio {
                reason: "CCR must not be below MCR".to_string(),
            });
        }

        if self.stable_gas_compensation < Decimal::ZERO || self.min_net_debt <= Decimal::ZERO {
            return Err(ConfigError::InvalidDebtLimits {
                reason: "Net debt floor must be positive".to_string(),
            });
        }
        if self.collateral_gas_divisor < Decimal::ONE {
            return Err(ConfigError::InvalidDebtLimits {
                reason: "Collateral gas divisor must be at least 1".to_string(),
            });
        }

        for rate in [self.borrowing_fee_rate, self.max_borrowing_fee_rate, self.redemption_fee_rate] {
            if rate < Decimal::ZERO || rate >= Decimal::ONE {
                return Err(ConfigError::InvalidFees {
                    reason: format!("Fee rate {} must be in [0, 1)", rate),
                });
            }
        }
        if self.max_borrowing_fee_rate < self.borrowing_fee_rate {
            return Err(ConfigError::InvalidFees {
                reason: "Borrowing fee cap is below its floor".to_string(),
            });
        }
        if self.minute_decay_factor <= Decimal::ZERO || self.minute_decay_factor > Decimal::ONE {
            return Err(ConfigError::InvalidFees {
                reason: "Base rate decay factor must be in (0, 1]".to_string(),
            });
        }
        if self.redemption_beta <= Decimal::ZERO {
            return Err(ConfigError::InvalidFees {
                reason: "Redemption beta must be positive".to_string(),
            });
        }

        if self.reward_supply_cap < Decimal::ZERO
            || self.issuance_factor <= Decimal::ZERO
            || self.issuance_factor >= Decimal::ONE
        {
            return Err(ConfigError::InvalidIssuance {
                reason: "Issuance factor must be in (0, 1)".to_string(),
            });
        }

        if self.price_feed.min_sources == 0 {
            return Err(ConfigError::InvalidPriceFeed {
                reason: "Need at least 1 price source".to_string(),
            });
        }

        Ok(())
    }

    pub fn mcr(&self) -> Fixed {
        Fixed::new_unchecked(self.mcr)
    }

    pub fn ccr(&self) -> Fixed {
        Fixed::new_unchecked(self.ccr)
    }

    pub fn stable_gas_compensation(&self) -> Fixed {
        Fixed::new_unchecked(self.stable_gas_compensation)
    }

    pub fn min_net_debt(&self) -> Fixed {
        Fixed::new_unchecked(self.min_net_debt)
    }

    pub fn collateral_gas_divisor(&self) -> Fixed {
        Fixed::new_unchecked(self.collateral_gas_divisor)
    }

    pub fn borrowing_fee_rate(&self) -> Fixed {
        Fixed::new_unchecked(self.borrowing_fee_rate)
    }

    pub fn redemption_fee_rate(&self) -> Fixed {
        Fixed::new_unchecked(self.redemption_fee_rate)
    }

    pub fn fee_params(&self) -> FeeParams {
        FeeParams {
            borrowing_floor: self.borrowing_fee_rate(),
            max_borrowing_rate: Fixed::new_unchecked(self.max_borrowing_fee_rate),
            redemption_floor: self.redemption_fee_rate(),
            minute_decay_factor: Fixed::new_unchecked(self.minute_decay_factor),
            redemption_beta: Fixed::new_unchecked(self.redemption_beta),
        }
    }

    pub fn reward_supply_cap(&self) -> Fixed {
        Fixed::new_unchecked(self.reward_supply_cap)
    }

    pub fn issuance_factor(&self) -> Fixed {
        Fixed::new_unchecked(self.issuance_factor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid collateral ratio: {reason}")]
    InvalidRatio { reason: String },
    #[error("Invalid debt limits: {reason}")]
    InvalidDebtLimits { reason: String },
    #[error("Invalid fees: {reason}")]
    InvalidFees { reason: String },
    #[error("Invalid issuance: {reason}")]
    InvalidIssuance { reason: String },
    #[error("Invalid price feed: {reason}")]
    InvalidPriceFeed { reason: String },
}

// Environment presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Testnet,
    Mainnet,
}

impl Environment {
    pub fn params(&self) -> ProtocolParams {
        match self {
            Environment::Development => ProtocolParams::development(),
            Environment::Testnet => ProtocolParams::testnet(),
            Environment::Mainnet => ProtocolParams::mainnet(),
        }
    }
}
