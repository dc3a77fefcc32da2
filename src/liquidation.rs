//! Liquidation conditions and the offset/redistribution split.
//!
//! A trove below the minimum collateral ratio is liquidated in fixed stages:
//! its debt is first cancelled against the stability pool as far as deposits
//! allow, the rest is redistributed over the remaining troves, and the trove is
//! closed. Collateral follows the debt pro rata, after the liquidator's gas
//! compensation has been taken off the top.

use crate::math::{Fixed, MathError};
use crate::trove::EntirePosition;
use crate::types::Price;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiquidationStatus {
    Safe { icr: Fixed },
    Liquidatable { icr: Fixed },
}

impl LiquidationStatus {
    pub fn is_liquidatable(&self) -> bool {
        matches!(self, LiquidationStatus::Liquidatable { .. })
    }

    pub fn icr(&self) -> Fixed {
        match self {
            LiquidationStatus::Safe { icr } | LiquidationStatus::Liquidatable { icr } => *icr,
        }
    }
}

pub fn evaluate_liquidation(
    position: &EntirePosition,
    price: Price,
    mcr: Fixed,
) -> Result<LiquidationStatus, MathError> {
    let icr = position.icr(price)?;
    if icr < mcr {
        Ok(LiquidationStatus::Liquidatable { icr })
    } else {
        Ok(LiquidationStatus::Safe { icr })
    }
}

/// What the liquidator is paid for the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GasCompensation {
    pub collateral: Fixed,
    pub stable: Fixed,
}

pub fn gas_compensation(
    collateral: Fixed,
    collateral_divisor: Fixed,
    stable: Fixed,
) -> Result<GasCompensation, MathError> {
    Ok(GasCompensation {
        collateral: collateral.checked_div(collateral_divisor)?,
        stable,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationSplit {
    pub entire_debt: Fixed,
    pub entire_collateral: Fixed,
    pub gas_compensation: GasCompensation,
    pub debt_to_offset: Fixed,
    pub collateral_to_pool: Fixed,
    pub debt_to_redistribute: Fixed,
    pub collateral_to_redistribute: Fixed,
}

/// Divide a trove's debt between the pool and redistribution.
pub fn split_liquidation(
    position: &EntirePosition,
    total_deposits: Fixed,
    gas: GasCompensation,
) -> Result<LiquidationSplit, MathError> {
    let debt = position.debt;
    let collateral_to_liquidate = position.collateral.checked_sub(gas.collateral)?;

    let (debt_to_offset, collateral_to_pool) = if total_deposits.is_zero() || debt.is_zero() {
        (Fixed::ZERO, Fixed::ZERO)
    } else {
        let offset = debt.min(total_deposits);
        (offset, collateral_to_liquidate.mul_div(offset, debt)?)
    };

    Ok(LiquidationSplit {
        entire_debt: debt,
        entire_collateral: position.collateral,
        gas_compensation: gas,
        debt_to_offset,
        collateral_to_pool,
        debt_to_redistribute: debt.checked_sub(debt_to_offset)?,
        collateral_to_redistribute: collateral_to_liquidate.checked_sub(collateral_to_pool)?,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiquidationStage {
    Evaluate,
    OffsetAgainstPool,
    RedistributeRemainder,
    ClosePosition,
    Done,
}

impl LiquidationStage {
    /// Stage after `self`. Offset and redistribution are skipped when they have no debt.
    pub fn next(self, split: &LiquidationSplit) -> LiquidationStage {
        match self {
            LiquidationStage::Evaluate if !split.debt_to_offset.is_zero() => LiquidationStage::OffsetAgainstPool,
            LiquidationStage::Evaluate | LiquidationStage::OffsetAgainstPool
                if !split.debt_to_redistribute.is_zero() =>
            {
                LiquidationStage::RedistributeRemainder
            }
            LiquidationStage::Evaluate
            | LiquidationStage::OffsetAgainstPool
            | LiquidationStage::RedistributeRemainder => LiquidationStage::ClosePosition,
            LiquidationStage::ClosePosition | LiquidationStage::Done => LiquidationStage::Done,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn position(collateral: u64, debt: u64) -> EntirePosition {
        EntirePosition {
            collateral: Fixed::from(collateral),
            debt: Fixed::from(debt),
            pending_collateral: Fixed::ZERO,
            pending_debt: Fixed::ZERO,
        }
    }

    fn gas(collateral: u64) -> GasCompensation {
        gas_compensation(Fixed::from(collateral), Fixed::from(200), Fixed::from(200)).unwrap()
    }

    #[test]
    fn evaluation_against_mcr() {
        let mcr = Fixed::new(dec!(1.1)).unwrap();
        let price = Price::new_unchecked(dec!(100));

        let safe = evaluate_liquidation(&position(12, 1_000), price, mcr).unwrap();
        assert!(!safe.is_liquidatable());
        assert_eq!(safe.icr(), Fixed::new(dec!(1.2)).unwrap());

        let under = evaluate_liquidation(&position(10, 1_000), price, mcr).unwrap();
        assert!(under.is_liquidatable());
    }

    #[test]
    fn gas_compensation_is_half_a_percent() {
        let comp = gas(10);
        assert_eq!(comp.collateral.value(), dec!(0.05));
        assert_eq!(comp.stable, Fixed::from(200));
    }

    #[test]
    fn full_offset_when_pool_is_deep() {
        let split = split_liquidation(&position(20, 2_000), Fixed::from(1_000_000), gas(20)).unwrap();
        assert_eq!(split.debt_to_offset, Fixed::from(2_000));
        assert_eq!(split.collateral_to_pool.value(), dec!(19.9));
        assert!(split.debt_to_redistribute.is_zero());
        assert!(split.collateral_to_redistribute.is_zero());
    }

    #[test]
    fn partial_offset_splits_collateral_pro_rata() {
        let split = split_liquidation(&position(20, 2_000), Fixed::from(500), gas(20)).unwrap();
        assert_eq!(split.debt_to_offset, Fixed::from(500));
        assert_eq!(split.debt_to_redistribute, Fixed::from(1_500));
        assert_eq!(split.collateral_to_pool.value(), dec!(4.975));
        assert_eq!(split.collateral_to_redistribute.value(), dec!(14.925));
    }

    #[test]
    fn empty_pool_redistributes_everything() {
        let split = split_liquidation(&position(20, 2_000), Fixed::ZERO, gas(20)).unwrap();
        assert!(split.debt_to_offset.is_zero());
        assert_eq!(split.debt_to_redistribute, Fixed::from(2_000));
        assert_eq!(split.collateral_to_redistribute.value(), dec!(19.9));
    }

    #[test]
    fn stages_skip_empty_steps() {
        let deep = split_liquidation(&position(20, 2_000), Fixed::from(1_000_000), gas(20)).unwrap();
        let mut stage = LiquidationStage::Evaluate;
        let mut seen = vec![stage];
        while stage != LiquidationStage::Done {
            stage = stage.next(&deep);
            seen.push(stage);
        }
        assert_eq!(
            seen,
            vec![
                LiquidationStage::Evaluate,
                LiquidationStage::OffsetAgainstPool,
                LiquidationStage::ClosePosition,
                LiquidationStage::Done,
            ]
        );

        let empty = split_liquidation(&position(20, 2_000), Fixed::ZERO, gas(20)).unwrap();
        assert_eq!(LiquidationStage::Evaluate.next(&empty), LiquidationStage::RedistributeRemainder);

        let partial = split_liquidation(&position(20, 2_000), Fixed::from(500), gas(20)).unwrap();
        assert_eq!(
            LiquidationStage::OffsetAgainstPool.next(&partial),
            LiquidationStage::RedistributeRemainder
        );
    }
}
