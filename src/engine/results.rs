// 8.0.2: result types and errors for engine operations.

use crate::custody::TransferError;
use crate::liquidation::LiquidationSplit;
use crate::math::{Fixed, MathError};
use crate::price_feed::PriceFeedError;
use crate::stability_pool::PoolError;
use crate::trove::TroveError;
use crate::types::AccountId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TroveResult {
    pub owner: AccountId,
    pub collateral: Fixed,
    pub debt: Fixed,
    pub stake: Fixed,
    pub borrowing_fee: Fixed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseResult {
    pub owner: AccountId,
    pub collateral_returned: Fixed,
    pub debt_repaid: Fixed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationResult {
    pub owner: AccountId,
    pub icr: Fixed,
    pub split: LiquidationSplit,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchLiquidationResult {
    pub liquidated: Vec<LiquidationResult>,
    pub total_debt_offset: Fixed,
    pub total_debt_redistributed: Fixed,
    pub total_collateral_gas_compensation: Fixed,
    pub total_stable_gas_compensation: Fixed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionResult {
    pub attempted: Fixed,
    pub redeemed: Fixed,
    pub collateral_drawn: Fixed,
    pub fee: Fixed,
    pub troves_touched: Vec<AccountId>,
    pub troves_closed: Vec<AccountId>,
}

/// Where a failure falls in the protocol's error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidAmount,
    Unauthorized,
    InvalidFrontEnd,
    NoDeposit,
    NoPosition,
    PositionExists,
    BelowMinimumRatio,
    NotLiquidatable,
    LastTrove,
    ExternalTransferFailed,
    OracleUnavailable,
    Arithmetic,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("Amount must be non-zero")]
    ZeroAmount,

    #[error("Invalid trove adjustment: {0}")]
    InvalidAdjustment(&'static str),

    #[error("Net debt {net_debt} is below the minimum {minimum}")]
    NetDebtTooLow { net_debt: Fixed, minimum: Fixed },

    #[error("ICR {icr} is below the minimum {minimum}")]
    IcrBelowMinimum { icr: Fixed, minimum: Fixed },

    #[error("Operation would leave TCR at {tcr}, below {minimum}")]
    TcrBelowCritical { tcr: Fixed, minimum: Fixed },

    #[error("Redemptions are blocked while TCR {tcr} is below MCR")]
    TcrBelowMcr { tcr: Fixed },

    #[error("Pool withdrawals are blocked while a trove is below MCR")]
    UndercollateralizedTroves,

    #[error("Trove {0} is not liquidatable")]
    NotLiquidatable(AccountId),

    #[error("Nothing to liquidate")]
    NothingToLiquidate,

    #[error("The last open trove cannot be closed")]
    OnlyOneTrove,

    #[error("Unable to redeem any amount")]
    NothingRedeemed,

    #[error("Redemption fee {fee} would take all {drawn} collateral drawn")]
    FeeExceedsCollateral { fee: Fixed, drawn: Fixed },

    #[error("No collateral surplus to claim for {0}")]
    NoSurplus(AccountId),

    #[error("Trove error: {0}")]
    Trove(#[from] TroveError),

    #[error("Stability pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("Price feed error: {0}")]
    PriceFeed(#[from] PriceFeedError),

    #[error("Math error: {0}")]
    Math(#[from] MathError),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::ZeroAmount
            | EngineError::InvalidAdjustment(_)
            | EngineError::NetDebtTooLow { .. }
            | EngineError::NothingRedeemed
            | EngineError::FeeExceedsCollateral { .. }
            | EngineError::NoSurplus(_) => ErrorKind::InvalidAmount,

            EngineError::IcrBelowMinimum { .. }
            | EngineError::TcrBelowCritical { .. }
            | EngineError::TcrBelowMcr { .. }
            | EngineError::UndercollateralizedTroves => ErrorKind::BelowMinimumRatio,

            EngineError::NotLiquidatable(_) | EngineError::NothingToLiquidate => ErrorKind::NotLiquidatable,
            EngineError::OnlyOneTrove => ErrorKind::LastTrove,

            EngineError::Trove(err) => match err {
                TroveError::NoPosition(_) => ErrorKind::NoPosition,
                TroveError::PositionExists(_) => ErrorKind::PositionExists,
                TroveError::Unauthorized => ErrorKind::Unauthorized,
                TroveError::NoStakes | TroveError::Math(_) => ErrorKind::Arithmetic,
            },

            EngineError::Pool(err) => match err {
                PoolError::ZeroAmount | PoolError::NoCollateralGain(_) => ErrorKind::InvalidAmount,
                PoolError::NoDeposit(_) => ErrorKind::NoDeposit,
                PoolError::FrontEndNotRegistered(_)
                | PoolError::DepositorIsFrontEnd(_)
                | PoolError::AlreadyRegistered(_)
                | PoolError::HasDeposit(_)
                | PoolError::InvalidKickbackRate(_) => ErrorKind::InvalidFrontEnd,
                PoolError::Unauthorized => ErrorKind::Unauthorized,
                PoolError::Math(_) => ErrorKind::Arithmetic,
            },

            EngineError::Transfer(err) => match err {
                TransferError::InsufficientBalance { .. } | TransferError::InsufficientHeld { .. } => {
                    ErrorKind::InvalidAmount
                }
                TransferError::Rejected { .. } => ErrorKind::ExternalTransferFailed,
                TransferError::Math(_) => ErrorKind::Arithmetic,
            },

            EngineError::PriceFeed(_) => ErrorKind::OracleUnavailable,
            EngineError::Math(_) => ErrorKind::Arithmetic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Asset;

    #[test]
    fn component_errors_map_to_taxonomy() {
        let rejected: EngineError = TransferError::Rejected {
            account: AccountId(1),
            asset: Asset::Collateral,
        }
        .into();
        assert_eq!(rejected.kind(), ErrorKind::ExternalTransferFailed);

        let no_deposit: EngineError = PoolError::NoDeposit(AccountId(1)).into();
        assert_eq!(no_deposit.kind(), ErrorKind::NoDeposit);

        let unauthorized: EngineError = TroveError::Unauthorized.into();
        assert_eq!(unauthorized.kind(), ErrorKind::Unauthorized);

        let stale: EngineError = PriceFeedError::AllSourcesStale.into();
        assert_eq!(stale.kind(), ErrorKind::OracleUnavailable);

        assert_eq!(EngineError::UndercollateralizedTroves.kind(), ErrorKind::BelowMinimumRatio);
    }
}
