//! Scalable pro-rata accounting.
//!
//! Two accumulators let every participant's share of a jointly owned resource be
//! evaluated lazily, in O(1) per operation, no matter how many participants exist:
//!
//! - [`PoolAccumulator`] tracks a shrinking pool. A running product `P` records
//!   the fraction of any deposit that survives offsets, and per-slot sums `S`
//!   (collateral) and `G` (reward token) record what a unit of deposit earned.
//!   When `P` would drop under [`P_FLOOR`] it is multiplied by [`SCALE_FACTOR`]
//!   and the scale advances. When an offset empties the pool the epoch advances
//!   and `P` restarts at 1.
//! - [`RedistributionAccumulator`] tracks per-unit-of-stake collateral and debt
//!   redistributed to open troves. Stakes never shrink through it, so no product
//!   is needed.
//!
//! Participants keep a snapshot from their last touch. The projection functions
//! here are pure: the same call answers read-only queries and feeds mutations.

use crate::journal::{JournaledMap, Transactional};
use crate::math::{Fixed, MathError, PerUnit, P_FLOOR, SCALE_FACTOR};
use serde::{Deserialize, Serialize};

/// Accumulator state a stake was last synced against. Front ends only need this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeSnapshot {
    pub p: Fixed,
    pub g: PerUnit,
    pub scale: u64,
    pub epoch: u64,
}

/// Depositor snapshot: the stake snapshot plus the collateral sum `S`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositSnapshot {
    pub s: PerUnit,
    pub stake: StakeSnapshot,
}

/// What a pool-value-reducing event did to the accumulator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetUpdate {
    pub collateral_per_unit: Fixed,
    pub loss_per_unit: Fixed,
    /// `S` of the slot that received the gain.
    pub sum: PerUnit,
    pub p: Fixed,
    pub scale: u64,
    pub epoch: u64,
    pub scale_changed: bool,
    pub epoch_changed: bool,
}

/// `(amount + carried) / total` rounded down. Returns the remainder to carry.
fn per_unit_floor(amount: Fixed, carried: Fixed, total: Fixed) -> Result<(Fixed, Fixed), MathError> {
    let numerator = amount.checked_add(carried)?;
    let per_unit = numerator.checked_div(total)?;
    let remainder = numerator.saturating_sub(per_unit.checked_mul(total)?);
    Ok((per_unit, remainder))
}

/// `(amount - carried) / total` rounded up. Returns the overshoot to carry.
fn per_unit_ceil(amount: Fixed, carried: Fixed, total: Fixed) -> Result<(Fixed, Fixed), MathError> {
    let numerator = amount.saturating_sub(carried);
    let per_unit = numerator.mul_div_ceil(Fixed::ONE, total)?;
    let overshoot = per_unit.checked_mul(total)?.saturating_sub(numerator);
    Ok((per_unit, overshoot))
}

// 3.1: product-and-sum accumulator for the stability pool.
#[derive(Debug, Clone)]
pub struct PoolAccumulator {
    p: Fixed,
    current_scale: u64,
    current_epoch: u64,
    epoch_to_scale_to_sum: JournaledMap<(u64, u64), PerUnit>,
    epoch_to_scale_to_g: JournaledMap<(u64, u64), PerUnit>,
    last_collateral_error: Fixed,
    last_loss_error: Fixed,
    last_reward_error: Fixed,
}

#[derive(Debug, Clone)]
pub struct AccumulatorCheckpoint {
    sums: usize,
    gs: usize,
    p: Fixed,
    current_scale: u64,
    current_epoch: u64,
    errors: [Fixed; 3],
}

impl Default for PoolAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl PoolAccumulator {
    pub fn new() -> Self {
        Self {
            p: Fixed::ONE,
            current_scale: 0,
            current_epoch: 0,
            epoch_to_scale_to_sum: JournaledMap::new(),
            epoch_to_scale_to_g: JournaledMap::new(),
            last_collateral_error: Fixed::ZERO,
            last_loss_error: Fixed::ZERO,
            last_reward_error: Fixed::ZERO,
        }
    }

    pub fn p(&self) -> Fixed {
        self.p
    }

    pub fn current_scale(&self) -> u64 {
        self.current_scale
    }

    pub fn current_epoch(&self) -> u64 {
        self.current_epoch
    }

    pub fn sum_at(&self, epoch: u64, scale: u64) -> PerUnit {
        self.epoch_to_scale_to_sum
            .get(&(epoch, scale))
            .copied()
            .unwrap_or(PerUnit::ZERO)
    }

    pub fn g_at(&self, epoch: u64, scale: u64) -> PerUnit {
        self.epoch_to_scale_to_g
            .get(&(epoch, scale))
            .copied()
            .unwrap_or(PerUnit::ZERO)
    }

    pub fn stake_snapshot(&self) -> StakeSnapshot {
        StakeSnapshot {
            p: self.p,
            g: self.g_at(self.current_epoch, self.current_scale),
            scale: self.current_scale,
            epoch: self.current_epoch,
        }
    }

    pub fn deposit_snapshot(&self) -> DepositSnapshot {
        DepositSnapshot {
            s: self.sum_at(self.current_epoch, self.current_scale),
            stake: self.stake_snapshot(),
        }
    }

    /// `P * factor`, stepped up by [`SCALE_FACTOR`] as many times as it takes to
    /// get back over [`P_FLOOR`]. Returns the new product and the number of steps.
    fn next_product(&self, factor: Fixed) -> Result<(Fixed, u64), MathError> {
        let next = self.p.checked_mul(factor)?;
        if next.value() >= P_FLOOR {
            return Ok((next, 0));
        }

        // P >= 1e-9 and factor >= 1e-18, so the exact product stays above 1e-28
        let mut exact = self.p.value().checked_mul(factor.value()).ok_or(MathError::Overflow)?;
        if exact.is_zero() {
            return Err(MathError::ProductExhausted);
        }
        let mut steps = 0;
        while exact < P_FLOOR {
            exact = exact.checked_mul(SCALE_FACTOR).ok_or(MathError::Overflow)?;
            steps += 1;
        }

        let p = Fixed::new(exact)?;
        if p.is_zero() {
            return Err(MathError::ProductExhausted);
        }
        Ok((p, steps))
    }

    /// Absorb `debt_to_offset` of `total_deposits`, crediting `collateral_gain` pro rata.
    ///
    /// Returns `None` when there is nothing to attribute (empty pool or zero debt).
    /// A loss of the whole pool (or more) ends the epoch.
    pub fn apply_offset(
        &mut self,
        debt_to_offset: Fixed,
        collateral_gain: Fixed,
        total_deposits: Fixed,
    ) -> Result<Option<OffsetUpdate>, MathError> {
        if total_deposits.is_zero() || debt_to_offset.is_zero() {
            return Ok(None);
        }

        let (collateral_per_unit, collateral_error) =
            per_unit_floor(collateral_gain, self.last_collateral_error, total_deposits)?;

        let (loss_per_unit, loss_error) = if debt_to_offset >= total_deposits {
            (Fixed::ONE, Fixed::ZERO)
        } else {
            let (per_unit, overshoot) =
                per_unit_ceil(debt_to_offset, self.last_loss_error, total_deposits)?;
            (per_unit.min(Fixed::ONE), overshoot)
        };

        // the gain lands in the slot that was live while the loss happened
        let slot = (self.current_epoch, self.current_scale);
        let marginal = PerUnit::marginal(collateral_per_unit, self.p)?;
        let sum = self.sum_at(slot.0, slot.1).checked_add(marginal)?;

        let factor = Fixed::ONE.checked_sub(loss_per_unit)?;
        let (p, scale, epoch) = if factor.is_zero() {
            (Fixed::ONE, 0, self.current_epoch + 1)
        } else {
            let (p, steps) = self.next_product(factor)?;
            (p, self.current_scale + steps, self.current_epoch)
        };
        let scale_changed = scale != self.current_scale && epoch == self.current_epoch;
        let epoch_changed = epoch != self.current_epoch;

        self.epoch_to_scale_to_sum.insert(slot, sum);
        self.p = p;
        self.current_scale = scale;
        self.current_epoch = epoch;
        self.last_collateral_error = collateral_error;
        self.last_loss_error = loss_error;

        Ok(Some(OffsetUpdate {
            collateral_per_unit,
            loss_per_unit,
            sum,
            p: self.p,
            scale: self.current_scale,
            epoch: self.current_epoch,
            scale_changed,
            epoch_changed,
        }))
    }

    /// Spread `reward` over `total_deposits` in the live slot. Returns the new `G`.
    pub fn accrue_reward(&mut self, reward: Fixed, total_deposits: Fixed) -> Result<Option<PerUnit>, MathError> {
        if total_deposits.is_zero() || reward.is_zero() {
            return Ok(None);
        }

        let (per_unit, error) = per_unit_floor(reward, self.last_reward_error, total_deposits)?;
        let marginal = PerUnit::marginal(per_unit, self.p)?;

        let slot = (self.current_epoch, self.current_scale);
        let g = self.g_at(slot.0, slot.1).checked_add(marginal)?;
        self.epoch_to_scale_to_g.insert(slot, g);
        self.last_reward_error = error;

        Ok(Some(g))
    }

    /// Current value of a stake of `initial` taken at `snapshot`.
    ///
    /// Zero once the snapshot's epoch has ended, once two or more scale steps
    /// separate it from the live state, or once it is under a billionth of
    /// `initial`. The last two are the same condition seen from different sides.
    pub fn compounded(&self, initial: Fixed, snapshot: &StakeSnapshot) -> Result<Fixed, MathError> {
        if initial.is_zero() || snapshot.epoch < self.current_epoch {
            return Ok(Fixed::ZERO);
        }
        if snapshot.scale == self.current_scale && snapshot.p == self.p {
            return Ok(initial);
        }

        let compounded = match self.current_scale.saturating_sub(snapshot.scale) {
            0 => initial.mul_div(self.p, snapshot.p)?,
            1 => initial.mul_div(self.p, snapshot.p.scale_up()?)?,
            _ => Fixed::ZERO,
        };

        if compounded < initial.scale_down() {
            return Ok(Fixed::ZERO);
        }
        Ok(compounded.min(initial))
    }

    /// Collateral earned by a deposit of `initial` since `snapshot`.
    pub fn collateral_gain(&self, initial: Fixed, snapshot: &DepositSnapshot) -> Result<Fixed, MathError> {
        if initial.is_zero() {
            return Ok(Fixed::ZERO);
        }
        let stake = &snapshot.stake;
        let first = self.sum_at(stake.epoch, stake.scale).since(snapshot.s);
        let second = self.sum_at(stake.epoch, stake.scale + 1).scale_down();
        first.checked_add(second)?.gain_for(initial, stake.p)
    }

    /// Reward tokens earned by a stake of `initial` since `snapshot`.
    pub fn reward_gain(&self, initial: Fixed, snapshot: &StakeSnapshot) -> Result<Fixed, MathError> {
        if initial.is_zero() {
            return Ok(Fixed::ZERO);
        }
        let first = self.g_at(snapshot.epoch, snapshot.scale).since(snapshot.g);
        let second = self.g_at(snapshot.epoch, snapshot.scale + 1).scale_down();
        first.checked_add(second)?.gain_for(initial, snapshot.p)
    }
}

impl Transactional for PoolAccumulator {
    type Checkpoint = AccumulatorCheckpoint;

    fn begin(&mut self) -> AccumulatorCheckpoint {
        AccumulatorCheckpoint {
            sums: self.epoch_to_scale_to_sum.begin(),
            gs: self.epoch_to_scale_to_g.begin(),
            p: self.p,
            current_scale: self.current_scale,
            current_epoch: self.current_epoch,
            errors: [self.last_collateral_error, self.last_loss_error, self.last_reward_error],
        }
    }

    fn rollback(&mut self, checkpoint: AccumulatorCheckpoint) {
        self.epoch_to_scale_to_sum.rollback(checkpoint.sums);
        self.epoch_to_scale_to_g.rollback(checkpoint.gs);
        self.p = checkpoint.p;
        self.current_scale = checkpoint.current_scale;
        self.current_epoch = checkpoint.current_epoch;
        [self.last_collateral_error, self.last_loss_error, self.last_reward_error] = checkpoint.errors;
    }

    fn commit(&mut self) -> usize {
        self.epoch_to_scale_to_sum.commit() + self.epoch_to_scale_to_g.commit()
    }
}

// 3.2: per-unit-staked redistribution totals for the trove ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RewardSnapshot {
    pub collateral: Fixed,
    pub debt: Fixed,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedistributionAccumulator {
    l_collateral: Fixed,
    l_debt: Fixed,
    last_collateral_error: Fixed,
    last_debt_error: Fixed,
}

impl RedistributionAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn l_collateral(&self) -> Fixed {
        self.l_collateral
    }

    pub fn l_debt(&self) -> Fixed {
        self.l_debt
    }

    pub fn snapshot(&self) -> RewardSnapshot {
        RewardSnapshot {
            collateral: self.l_collateral,
            debt: self.l_debt,
        }
    }

    /// Spread `collateral` and `debt` over `total_stakes`. Nothing happens without debt.
    pub fn distribute(
        &mut self,
        collateral: Fixed,
        debt: Fixed,
        total_stakes: Fixed,
    ) -> Result<Option<RewardSnapshot>, MathError> {
        if debt.is_zero() {
            return Ok(None);
        }
        if total_stakes.is_zero() {
            return Err(MathError::DivisionByZero);
        }

        let (collateral_per_unit, collateral_error) =
            per_unit_floor(collateral, self.last_collateral_error, total_stakes)?;
        let (debt_per_unit, debt_error) = per_unit_floor(debt, self.last_debt_error, total_stakes)?;

        self.l_collateral = self.l_collateral.checked_add(collateral_per_unit)?;
        self.l_debt = self.l_debt.checked_add(debt_per_unit)?;
        self.last_collateral_error = collateral_error;
        self.last_debt_error = debt_error;

        Ok(Some(self.snapshot()))
    }

    /// Collateral and debt owed to `stake` since `snapshot`.
    pub fn pending(&self, stake: Fixed, snapshot: &RewardSnapshot) -> Result<(Fixed, Fixed), MathError> {
        let collateral = stake.checked_mul(self.l_collateral.saturating_sub(snapshot.collateral))?;
        let debt = stake.checked_mul(self.l_debt.saturating_sub(snapshot.debt))?;
        Ok((collateral, debt))
    }

    pub fn has_pending(&self, snapshot: &RewardSnapshot) -> bool {
        snapshot.collateral < self.l_collateral || snapshot.debt < self.l_debt
    }
}
