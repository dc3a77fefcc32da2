// 5.1 issuance.rs: time-based reward token issuance for the stability pool.
// cumulative issued = cap * (1 - factor^minutes). each trigger hands out the delta
// since the previous trigger, so issuance never depends on how often it is called.

use crate::math::{Fixed, MathError};
use crate::types::Timestamp;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunityIssuance {
    supply_cap: Fixed,
    issuance_factor: Fixed,
    deployed_at: Timestamp,
    total_issued: Fixed,
}

impl CommunityIssuance {
    pub fn new(supply_cap: Fixed, issuance_factor: Fixed, deployed_at: Timestamp) -> Self {
        Self {
            supply_cap,
            issuance_factor,
            deployed_at,
            total_issued: Fixed::ZERO,
        }
    }

    pub fn total_issued(&self) -> Fixed {
        self.total_issued
    }

    pub fn supply_cap(&self) -> Fixed {
        self.supply_cap
    }

    /// Fraction of the cap that should be out by `now`.
    pub fn cumulative_fraction(&self, now: Timestamp) -> Result<Fixed, MathError> {
        let minutes = now.minutes_since(&self.deployed_at);
        let remaining = self.issuance_factor.pow(minutes)?;
        Ok(Fixed::ONE.saturating_sub(remaining))
    }

    /// Issue everything owed up to `now` and return the newly issued amount.
    pub fn issue(&mut self, now: Timestamp) -> Result<Fixed, MathError> {
        let target = self.supply_cap.checked_mul(self.cumulative_fraction(now)?)?;
        let issued = target.saturating_sub(self.total_issued);
        if !issued.is_zero() {
            self.total_issued = target;
        }
        Ok(issued)
    }
}
