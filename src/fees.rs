// 5.2 fees.rs: the base rate behind borrowing and redemption fees.
// redemptions push the base rate up by the redeemed share of supply over beta, and it
// decays back towards zero once per minute. each fee is its floor plus the base rate.
// 5.2 has the params/state structs. 5.3 has the fee schedule seen by one operation.

use crate::math::{Fixed, MathError};
use crate::types::Timestamp;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeParams {
    pub borrowing_floor: Fixed,
    pub max_borrowing_rate: Fixed,
    pub redemption_floor: Fixed,
    pub minute_decay_factor: Fixed,
    pub redemption_beta: Fixed,
}

/** 5.2.1: stored base rate. only moves when a fee is charged */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseRate {
    rate: Fixed,
    last_fee_operation: Timestamp,
}

impl BaseRate {
    pub fn new(now: Timestamp) -> Self {
        Self {
            rate: Fixed::ZERO,
            last_fee_operation: now,
        }
    }

    /// Rate as last written, without decay.
    pub fn stored(&self) -> Fixed {
        self.rate
    }

    pub fn last_fee_operation(&self) -> Timestamp {
        self.last_fee_operation
    }

    /// Rate after decaying for every whole minute since the last fee operation.
    pub fn decayed(&self, now: Timestamp, decay_factor: Fixed) -> Result<Fixed, MathError> {
        let minutes = now.minutes_since(&self.last_fee_operation);
        self.rate.dec_mul(decay_factor.pow(minutes)?)
    }

    /// Write the decayed rate back ahead of a borrowing fee.
    pub fn decay(&mut self, now: Timestamp, decay_factor: Fixed) -> Result<Fixed, MathError> {
        let rate = self.decayed(now, decay_factor)?;
        self.rate = rate;
        self.stamp(now);
        Ok(rate)
    }

    /// Decay, then add `redeemed / supply / beta`. Capped at 100%.
    pub fn raise_by_redemption(
        &mut self,
        redeemed: Fixed,
        supply: Fixed,
        now: Timestamp,
        params: &FeeParams,
    ) -> Result<Fixed, MathError> {
        let decayed = self.decayed(now, params.minute_decay_factor)?;
        let fraction = redeemed.mul_div(Fixed::ONE, supply)?;
        let raised = decayed.checked_add(fraction.checked_div(params.redemption_beta)?)?;
        self.rate = raised.min(Fixed::ONE);
        self.stamp(now);
        Ok(self.rate)
    }

    // the clock only moves in whole minutes, so a burst of operations inside one
    // minute cannot hold decay back
    fn stamp(&mut self, now: Timestamp) {
        if now.minutes_since(&self.last_fee_operation) >= 1 {
            self.last_fee_operation = now;
        }
    }
}

/** 5.3: fee schedule at one point in time */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fees {
    pub base_rate: Fixed,
    /// Borrowing is free while TCR sits under CCR.
    pub recovery_mode: bool,
    pub params: FeeParams,
}

impl Fees {
    pub fn new(base_rate: &BaseRate, params: FeeParams, now: Timestamp, recovery_mode: bool) -> Result<Self, MathError> {
        Ok(Self {
            base_rate: base_rate.decayed(now, params.minute_decay_factor)?,
            recovery_mode,
            params,
        })
    }

    pub fn borrowing_rate(&self) -> Result<Fixed, MathError> {
        if self.recovery_mode {
            return Ok(Fixed::ZERO);
        }
        let rate = self.params.borrowing_floor.checked_add(self.base_rate)?;
        Ok(rate.min(self.params.max_borrowing_rate))
    }

    pub fn borrowing_fee(&self, amount: Fixed) -> Result<Fixed, MathError> {
        amount.checked_mul(self.borrowing_rate()?)
    }

    /// Rate a redemption of `redeemed` out of `supply` would pay, including its own bump.
    pub fn redemption_rate(&self, redeemed: Fixed, supply: Fixed) -> Result<Fixed, MathError> {
        let bump = redeemed.mul_div(Fixed::ONE, supply)?.checked_div(self.params.redemption_beta)?;
        let base = self.base_rate.checked_add(bump)?.min(Fixed::ONE);
        Ok(self.params.redemption_floor.checked_add(base)?.min(Fixed::ONE))
    }
}
