//! Trove (position) ledger.
//!
//! Owns every trove record plus the redistribution totals `L_collateral` and
//! `L_debt`. Redistributed collateral and debt are never pushed into troves
//! eagerly: a trove's true position is its stored values plus
//! `(L - snapshot) * stake`, realized the next time the trove is touched.
//!
//! The ledger also tracks where collateral and debt sit: `active` holds what is
//! recorded on troves, `pending` holds what has been redistributed but not yet
//! realized by any trove.
//!
//! Active troves are also kept sorted by nominal ratio so the riskiest one is
//! found without scanning.

use crate::accumulator::{RedistributionAccumulator, RewardSnapshot};
use crate::journal::{JournaledMap, JournaledSet, Transactional};
use crate::math::{compute_cr, Fixed, MathError};
use crate::types::{AccountId, Caller, Price};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TroveStatus {
    NonExistent,
    Active,
    ClosedByOwner,
    ClosedByLiquidation,
    ClosedByRedemption,
}

impl TroveStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TroveStatus::ClosedByOwner | TroveStatus::ClosedByLiquidation | TroveStatus::ClosedByRedemption
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trove {
    pub owner: AccountId,
    pub collateral: Fixed,
    pub debt: Fixed,
    pub stake: Fixed,
    pub status: TroveStatus,
    pub snapshot: RewardSnapshot,
}

/// A trove with its pending redistribution folded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntirePosition {
    pub collateral: Fixed,
    pub debt: Fixed,
    pub pending_collateral: Fixed,
    pub pending_debt: Fixed,
}

impl EntirePosition {
    pub fn icr(&self, price: Price) -> Result<Fixed, MathError> {
        compute_cr(self.collateral, self.debt, price.value())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PoolBalance {
    pub collateral: Fixed,
    pub debt: Fixed,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TroveError {
    #[error("No active trove for {0}")]
    NoPosition(AccountId),

    #[error("Trove already active for {0}")]
    PositionExists(AccountId),

    #[error("Only the liquidation coordinator may redistribute")]
    Unauthorized,

    #[error("No stakes to redistribute over")]
    NoStakes,

    #[error("Math error: {0}")]
    Math(#[from] MathError),
}

/// Place in the sorted list: nominal ratio (stored collateral over stored debt, no
/// price), then owner. Pending redistribution is not part of the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TroveKey {
    nicr: Fixed,
    owner: AccountId,
}

impl TroveKey {
    fn of(trove: &Trove) -> Result<Self, MathError> {
        Ok(Self {
            nicr: compute_cr(trove.collateral, trove.debt, Fixed::ONE)?,
            owner: trove.owner,
        })
    }
}

impl PartialOrd for TroveKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TroveKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.nicr.cmp(&other.nicr).then(self.owner.cmp(&other.owner))
    }
}

#[derive(Debug, Clone, Default)]
pub struct TroveLedger {
    troves: JournaledMap<AccountId, Trove>,
    sorted: JournaledSet<TroveKey>,
    rewards: RedistributionAccumulator,
    total_stakes: Fixed,
    total_stakes_snapshot: Fixed,
    total_collateral_snapshot: Fixed,
    active: PoolBalance,
    pending: PoolBalance,
    active_count: usize,
}

/// Journal marks plus the ledger's scalar totals.
#[derive(Debug, Clone)]
pub struct LedgerCheckpoint {
    troves: usize,
    sorted: usize,
    rewards: RedistributionAccumulator,
    total_stakes: Fixed,
    total_stakes_snapshot: Fixed,
    total_collateral_snapshot: Fixed,
    active: PoolBalance,
    pending: PoolBalance,
    active_count: usize,
}

impl TroveLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, owner: AccountId) -> Option<&Trove> {
        self.troves.get(&owner)
    }

    pub fn status(&self, owner: AccountId) -> TroveStatus {
        self.troves
            .get(&owner)
            .map(|t| t.status)
            .unwrap_or(TroveStatus::NonExistent)
    }

    pub fn is_active(&self, owner: AccountId) -> bool {
        self.status(owner) == TroveStatus::Active
    }

    pub fn active_count(&self) -> usize {
        self.active_count
    }

    /// Active troves, lowest nominal ratio first.
    pub fn active_owners(&self) -> impl Iterator<Item = AccountId> + '_ {
        self.sorted.iter().map(|key| key.owner)
    }

    /// The trove first in line for liquidation and redemption.
    pub fn lowest(&self) -> Option<AccountId> {
        self.sorted.first().map(|key| key.owner)
    }

    /// The trove after `owner` in the sorted list. Take it before changing `owner`.
    pub fn next_above(&self, owner: AccountId) -> Result<Option<AccountId>, TroveError> {
        let key = TroveKey::of(self.active_trove(owner)?)?;
        Ok(self.sorted.next_after(&key).map(|key| key.owner))
    }

    /// Lowest trove and its ICR with pending rewards included.
    pub fn lowest_icr(&self, price: Price) -> Result<Option<(AccountId, Fixed)>, TroveError> {
        match self.lowest() {
            Some(owner) => Ok(Some((owner, self.icr(owner, price)?))),
            None => Ok(None),
        }
    }

    pub fn rewards(&self) -> &RedistributionAccumulator {
        &self.rewards
    }

    pub fn total_stakes(&self) -> Fixed {
        self.total_stakes
    }

    pub fn total_stakes_snapshot(&self) -> Fixed {
        self.total_stakes_snapshot
    }

    pub fn total_collateral_snapshot(&self) -> Fixed {
        self.total_collateral_snapshot
    }

    pub fn active_balance(&self) -> PoolBalance {
        self.active
    }

    pub fn pending_balance(&self) -> PoolBalance {
        self.pending
    }

    pub fn total_collateral(&self) -> Result<Fixed, MathError> {
        self.active.collateral.checked_add(self.pending.collateral)
    }

    pub fn total_debt(&self) -> Result<Fixed, MathError> {
        self.active.debt.checked_add(self.pending.debt)
    }

    pub fn tcr(&self, price: Price) -> Result<Fixed, MathError> {
        compute_cr(self.total_collateral()?, self.total_debt()?, price.value())
    }

    fn active_trove(&self, owner: AccountId) -> Result<&Trove, TroveError> {
        self.troves
            .get(&owner)
            .filter(|t| t.status == TroveStatus::Active)
            .ok_or(TroveError::NoPosition(owner))
    }

    fn stored(&self, owner: AccountId) -> Result<Trove, TroveError> {
        self.troves.get(&owner).cloned().ok_or(TroveError::NoPosition(owner))
    }

    // write the trove back and move its place in the sorted list if its ratio changed
    fn store(&mut self, trove: Trove) -> Result<(), TroveError> {
        let old_key = match self.troves.get(&trove.owner) {
            Some(old) if old.status == TroveStatus::Active => Some(TroveKey::of(old)?),
            _ => None,
        };
        let new_key = match trove.status {
            TroveStatus::Active => Some(TroveKey::of(&trove)?),
            _ => None,
        };
        if old_key != new_key {
            if let Some(key) = old_key {
                self.sorted.remove(&key);
            }
            if let Some(key) = new_key {
                self.sorted.insert(key);
            }
        }
        self.troves.insert(trove.owner, trove);
        Ok(())
    }

    /// Redistributed collateral and debt not yet realized by `owner`.
    pub fn pending_rewards(&self, owner: AccountId) -> Result<(Fixed, Fixed), TroveError> {
        let trove = self.active_trove(owner)?;
        Ok(self.rewards.pending(trove.stake, &trove.snapshot)?)
    }

    pub fn entire_position(&self, owner: AccountId) -> Result<EntirePosition, TroveError> {
        let trove = self.active_trove(owner)?;
        let (pending_collateral, pending_debt) = self.rewards.pending(trove.stake, &trove.snapshot)?;
        Ok(EntirePosition {
            collateral: trove.collateral.checked_add(pending_collateral)?,
            debt: trove.debt.checked_add(pending_debt)?,
            pending_collateral,
            pending_debt,
        })
    }

    pub fn icr(&self, owner: AccountId, price: Price) -> Result<Fixed, TroveError> {
        Ok(self.entire_position(owner)?.icr(price)?)
    }

    /// Fold pending redistribution into the stored trove and move it from pending to active.
    pub fn apply_pending_rewards(&mut self, owner: AccountId) -> Result<EntirePosition, TroveError> {
        let position = self.entire_position(owner)?;
        let snapshot = self.rewards.snapshot();

        if !position.pending_collateral.is_zero() || !position.pending_debt.is_zero() {
            self.pending.collateral = self.pending.collateral.saturating_sub(position.pending_collateral);
            self.pending.debt = self.pending.debt.saturating_sub(position.pending_debt);
            self.active.collateral = self.active.collateral.checked_add(position.pending_collateral)?;
            self.active.debt = self.active.debt.checked_add(position.pending_debt)?;
        }

        let mut trove = self.stored(owner)?;
        trove.collateral = position.collateral;
        trove.debt = position.debt;
        trove.snapshot = snapshot;
        self.store(trove)?;

        Ok(position)
    }

    // stake is decoupled from raw collateral so that troves opened after
    // redistributions do not earn rewards owed to older troves
    fn compute_new_stake(&self, collateral: Fixed) -> Result<Fixed, MathError> {
        if self.total_collateral_snapshot.is_zero() {
            return Ok(collateral);
        }
        collateral.mul_div(self.total_stakes_snapshot, self.total_collateral_snapshot)
    }

    fn restake(&mut self, owner: AccountId, collateral: Fixed) -> Result<Fixed, TroveError> {
        let new_stake = self.compute_new_stake(collateral)?;
        let trove = self
            .troves
            .get_mut(&owner)
            .ok_or(TroveError::NoPosition(owner))?;
        let old_stake = trove.stake;
        trove.stake = new_stake;
        self.total_stakes = self.total_stakes.saturating_sub(old_stake).checked_add(new_stake)?;
        Ok(new_stake)
    }

    pub fn open(&mut self, owner: AccountId, collateral: Fixed, debt: Fixed) -> Result<Trove, TroveError> {
        if self.is_active(owner) {
            return Err(TroveError::PositionExists(owner));
        }

        self.store(Trove {
            owner,
            collateral,
            debt,
            stake: Fixed::ZERO,
            status: TroveStatus::Active,
            snapshot: self.rewards.snapshot(),
        })?;
        self.restake(owner, collateral)?;
        self.active.collateral = self.active.collateral.checked_add(collateral)?;
        self.active.debt = self.active.debt.checked_add(debt)?;
        self.active_count += 1;

        self.stored(owner)
    }

    /// Overwrite a trove's collateral and debt. Pending rewards must already be applied.
    pub fn set_position(&mut self, owner: AccountId, collateral: Fixed, debt: Fixed) -> Result<Trove, TroveError> {
        let trove = self.active_trove(owner)?;
        debug_assert!(!self.rewards.has_pending(&trove.snapshot));
        let (old_collateral, old_debt) = (trove.collateral, trove.debt);

        self.active.collateral = self
            .active
            .collateral
            .saturating_sub(old_collateral)
            .checked_add(collateral)?;
        self.active.debt = self.active.debt.saturating_sub(old_debt).checked_add(debt)?;

        let mut trove = self.stored(owner)?;
        trove.collateral = collateral;
        trove.debt = debt;
        trove.snapshot = self.rewards.snapshot();
        self.store(trove)?;
        self.restake(owner, collateral)?;

        self.stored(owner)
    }

    /// Drop a trove's stake so it takes no share of a redistribution it is the source of.
    pub fn remove_stake(&mut self, owner: AccountId) -> Result<Fixed, TroveError> {
        let stake = self.active_trove(owner)?.stake;
        self.total_stakes = self.total_stakes.saturating_sub(stake);
        if let Some(trove) = self.troves.get_mut(&owner) {
            trove.stake = Fixed::ZERO;
        }
        Ok(stake)
    }

    /// Close a trove. Pending rewards must already be applied. Returns the final
    /// collateral and debt, which leave the active balance.
    pub fn close(&mut self, owner: AccountId, status: TroveStatus) -> Result<EntirePosition, TroveError> {
        debug_assert!(status.is_terminal());
        let trove = self.active_trove(owner)?;
        let stake = trove.stake;
        let position = EntirePosition {
            collateral: trove.collateral,
            debt: trove.debt,
            pending_collateral: Fixed::ZERO,
            pending_debt: Fixed::ZERO,
        };

        self.total_stakes = self.total_stakes.saturating_sub(stake);
        self.active.collateral = self.active.collateral.saturating_sub(position.collateral);
        self.active.debt = self.active.debt.saturating_sub(position.debt);
        self.active_count -= 1;

        self.store(Trove {
            owner,
            collateral: Fixed::ZERO,
            debt: Fixed::ZERO,
            stake: Fixed::ZERO,
            status,
            snapshot: RewardSnapshot::default(),
        })?;

        Ok(position)
    }

    /// Spread a liquidated remainder over every open trove by stake.
    pub fn redistribute(
        &mut self,
        caller: Caller,
        debt: Fixed,
        collateral: Fixed,
    ) -> Result<Option<RewardSnapshot>, TroveError> {
        if !caller.is_coordinator() {
            return Err(TroveError::Unauthorized);
        }
        if debt.is_zero() {
            return Ok(None);
        }
        if self.total_stakes.is_zero() {
            return Err(TroveError::NoStakes);
        }

        let totals = self.rewards.distribute(collateral, debt, self.total_stakes)?;
        self.pending.collateral = self.pending.collateral.checked_add(collateral)?;
        self.pending.debt = self.pending.debt.checked_add(debt)?;
        Ok(totals)
    }

    /// Refresh the stake snapshots after a liquidation changed the collateral base.
    pub fn update_system_snapshots(&mut self) -> Result<(Fixed, Fixed), MathError> {
        self.total_stakes_snapshot = self.total_stakes;
        self.total_collateral_snapshot = self.total_collateral()?;
        Ok((self.total_stakes_snapshot, self.total_collateral_snapshot))
    }
}

impl Transactional for TroveLedger {
    type Checkpoint = LedgerCheckpoint;

    fn begin(&mut self) -> LedgerCheckpoint {
        LedgerCheckpoint {
            troves: self.troves.begin(),
            sorted: self.sorted.begin(),
            rewards: self.rewards.clone(),
            total_stakes: self.total_stakes,
            total_stakes_snapshot: self.total_stakes_snapshot,
            total_collateral_snapshot: self.total_collateral_snapshot,
            active: self.active,
            pending: self.pending,
            active_count: self.active_count,
        }
    }

    fn rollback(&mut self, checkpoint: LedgerCheckpoint) {
        self.troves.rollback(checkpoint.troves);
        self.sorted.rollback(checkpoint.sorted);
        self.rewards = checkpoint.rewards;
        self.total_stakes = checkpoint.total_stakes;
        self.total_stakes_snapshot = checkpoint.total_stakes_snapshot;
        self.total_collateral_snapshot = checkpoint.total_collateral_snapshot;
        self.active = checkpoint.active;
        self.pending = checkpoint.pending;
        self.active_count = checkpoint.active_count;
    }

    fn commit(&mut self) -> usize {
        self.troves.commit() + self.sorted.commit()
    }
}
