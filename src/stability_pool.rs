// 4.0 stability_pool.rs: depositor and front-end accounting for the stability pool.
// deposits shrink through offsets and earn collateral plus reward tokens. nothing here
// iterates over depositors; every value is projected from a snapshot on demand.
// 4.1 front ends take (1 - kickback) of the reward earned by deposits tagged to them.

use crate::accumulator::{AccumulatorCheckpoint, DepositSnapshot, OffsetUpdate, PoolAccumulator, StakeSnapshot};
use crate::issuance::CommunityIssuance;
use crate::journal::{JournaledMap, Transactional};
use crate::math::{Fixed, MathError};
use crate::types::{AccountId, Caller, FrontEndTag, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deposit {
    pub initial_value: Fixed,
    pub front_end: FrontEndTag,
    pub snapshot: DepositSnapshot,
}

/// A registered front end. Registration is permanent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontEnd {
    /// Share of reward gain passed through to the depositor.
    pub kickback_rate: Fixed,
    /// Sum of tagged deposits, compounding like a deposit.
    pub stake: Fixed,
    /// `None` while the stake is zero.
    pub snapshot: Option<StakeSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("Amount must be non-zero")]
    ZeroAmount,

    #[error("{0} has no stability deposit")]
    NoDeposit(AccountId),

    #[error("{0} has no collateral gain to move")]
    NoCollateralGain(AccountId),

    #[error("Front end {0} is not registered")]
    FrontEndNotRegistered(AccountId),

    #[error("{0} is a registered front end and cannot deposit")]
    DepositorIsFrontEnd(AccountId),

    #[error("{0} is already a registered front end")]
    AlreadyRegistered(AccountId),

    #[error("{0} holds a deposit and cannot register as a front end")]
    HasDeposit(AccountId),

    #[error("Kickback rate {0} is outside [0, 1]")]
    InvalidKickbackRate(Decimal),

    #[error("Only the liquidation coordinator may offset debt")]
    Unauthorized,

    #[error("Math error: {0}")]
    Math(#[from] MathError),
}

/// Gains realized on a touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Gains {
    pub collateral: Fixed,
    pub reward: Fixed,
    pub front_end: Option<(AccountId, Fixed)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositUpdate {
    pub depositor: AccountId,
    pub front_end: FrontEndTag,
    pub initial_before: Fixed,
    pub compounded_before: Fixed,
    pub new_deposit: Fixed,
    pub added: Fixed,
    pub withdrawn: Fixed,
    pub gains: Gains,
    /// Reward issued by the time trigger that preceded the touch.
    pub issued: Fixed,
    pub front_end_stake: Option<(AccountId, Fixed)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetOutcome {
    pub debt_absorbed: Fixed,
    pub collateral_added: Fixed,
    pub issued: Fixed,
    pub update: Option<OffsetUpdate>,
}

enum PrincipalChange {
    Add(Fixed),
    Remove(Fixed),
}

#[derive(Debug, Clone)]
pub struct StabilityPool {
    accumulator: PoolAccumulator,
    deposits: JournaledMap<AccountId, Deposit>,
    front_ends: JournaledMap<AccountId, FrontEnd>,
    total_deposits: Fixed,
    collateral: Fixed,
    issuance: CommunityIssuance,
}

#[derive(Debug, Clone)]
pub struct PoolCheckpoint {
    accumulator: AccumulatorCheckpoint,
    deposits: usize,
    front_ends: usize,
    total_deposits: Fixed,
    collateral: Fixed,
    issuance: CommunityIssuance,
}

impl StabilityPool {
    pub fn new(issuance: CommunityIssuance) -> Self {
        Self {
            accumulator: PoolAccumulator::new(),
            deposits: JournaledMap::new(),
            front_ends: JournaledMap::new(),
            total_deposits: Fixed::ZERO,
            collateral: Fixed::ZERO,
            issuance,
        }
    }

    pub fn accumulator(&self) -> &PoolAccumulator {
        &self.accumulator
    }

    pub fn issuance(&self) -> &CommunityIssuance {
        &self.issuance
    }

    pub fn total_deposits(&self) -> Fixed {
        self.total_deposits
    }

    /// Collateral held for depositors, not yet withdrawn.
    pub fn collateral_balance(&self) -> Fixed {
        self.collateral
    }

    pub fn deposit(&self, depositor: AccountId) -> Option<&Deposit> {
        self.deposits.get(&depositor)
    }

    pub fn depositors(&self) -> impl Iterator<Item = AccountId> + '_ {
        self.deposits.keys().copied()
    }

    pub fn front_end(&self, id: AccountId) -> Option<&FrontEnd> {
        self.front_ends.get(&id)
    }

    pub fn is_front_end(&self, id: AccountId) -> bool {
        self.front_ends.contains_key(&id)
    }

    // 4.2: read-only projections. the mutating paths call the same functions.

    pub fn compounded_deposit(&self, depositor: AccountId) -> Result<Fixed, PoolError> {
        match self.deposits.get(&depositor) {
            Some(deposit) => Ok(self.accumulator.compounded(deposit.initial_value, &deposit.snapshot.stake)?),
            None => Ok(Fixed::ZERO),
        }
    }

    pub fn collateral_gain(&self, depositor: AccountId) -> Result<Fixed, PoolError> {
        match self.deposits.get(&depositor) {
            Some(deposit) => Ok(self.accumulator.collateral_gain(deposit.initial_value, &deposit.snapshot)?),
            None => Ok(Fixed::ZERO),
        }
    }

    /// Reward owed to the depositor, after the front end's cut.
    pub fn reward_gain(&self, depositor: AccountId) -> Result<Fixed, PoolError> {
        match self.deposits.get(&depositor) {
            Some(deposit) => self.depositor_reward_gain(deposit),
            None => Ok(Fixed::ZERO),
        }
    }

    pub fn front_end_reward_gain(&self, id: AccountId) -> Result<Fixed, PoolError> {
        let Some(front_end) = self.front_ends.get(&id) else {
            return Ok(Fixed::ZERO);
        };
        let Some(snapshot) = front_end.snapshot else {
            return Ok(Fixed::ZERO);
        };
        let gain = self.accumulator.reward_gain(front_end.stake, &snapshot)?;
        let share = Fixed::ONE.checked_sub(front_end.kickback_rate)?;
        Ok(gain.checked_mul(share)?)
    }

    pub fn compounded_front_end_stake(&self, id: AccountId) -> Result<Fixed, PoolError> {
        match self.front_ends.get(&id) {
            Some(FrontEnd { stake, snapshot: Some(snapshot), .. }) => {
                Ok(self.accumulator.compounded(*stake, snapshot)?)
            }
            _ => Ok(Fixed::ZERO),
        }
    }

    fn kickback_rate(&self, tag: FrontEndTag) -> Fixed {
        tag.front_end()
            .and_then(|id| self.front_ends.get(&id))
            .map(|fe| fe.kickback_rate)
            .unwrap_or(Fixed::ONE)
    }

    fn depositor_reward_gain(&self, deposit: &Deposit) -> Result<Fixed, PoolError> {
        let gain = self
            .accumulator
            .reward_gain(deposit.initial_value, &deposit.snapshot.stake)?;
        Ok(gain.checked_mul(self.kickback_rate(deposit.front_end))?)
    }

    fn trigger_issuance(&mut self, now: Timestamp) -> Result<Fixed, PoolError> {
        let issued = self.issuance.issue(now)?;
        // with an empty pool there is nobody to credit and the issuance is lost
        self.accumulator.accrue_reward(issued, self.total_deposits)?;
        Ok(issued)
    }

    // 4.3: deposit and withdraw

    pub fn provide(
        &mut self,
        depositor: AccountId,
        amount: Fixed,
        tag: FrontEndTag,
        now: Timestamp,
    ) -> Result<DepositUpdate, PoolError> {
        if amount.is_zero() {
            return Err(PoolError::ZeroAmount);
        }
        if self.is_front_end(depositor) {
            return Err(PoolError::DepositorIsFrontEnd(depositor));
        }
        if let Some(id) = tag.front_end() {
            if !self.is_front_end(id) {
                return Err(PoolError::FrontEndNotRegistered(id));
            }
        }

        self.touch(depositor, PrincipalChange::Add(amount), tag, now)
    }

    /// Withdraw up to `amount`. Requests above the compounded deposit take all of it.
    pub fn withdraw(&mut self, depositor: AccountId, amount: Fixed, now: Timestamp) -> Result<DepositUpdate, PoolError> {
        if !self.deposits.contains_key(&depositor) {
            return Err(PoolError::NoDeposit(depositor));
        }
        self.touch(depositor, PrincipalChange::Remove(amount), FrontEndTag::Direct, now)
    }

    /// Realize gains without moving principal, for redirecting the collateral gain
    /// into the depositor's trove. Fails when there is no collateral gain.
    pub fn claim_gain_for_trove(&mut self, depositor: AccountId, now: Timestamp) -> Result<DepositUpdate, PoolError> {
        if !self.deposits.contains_key(&depositor) {
            return Err(PoolError::NoDeposit(depositor));
        }
        if self.collateral_gain(depositor)?.is_zero() {
            return Err(PoolError::NoCollateralGain(depositor));
        }
        self.touch(depositor, PrincipalChange::Remove(Fixed::ZERO), FrontEndTag::Direct, now)
    }

    fn touch(
        &mut self,
        depositor: AccountId,
        change: PrincipalChange,
        tag: FrontEndTag,
        now: Timestamp,
    ) -> Result<DepositUpdate, PoolError> {
        let issued = self.trigger_issuance(now)?;

        let existing = self.deposits.get(&depositor).cloned();
        // the tag only sticks on a first deposit
        let front_end = existing.as_ref().map(|d| d.front_end).unwrap_or(tag);

        let (compounded, collateral_gain, reward_gain) = match &existing {
            Some(deposit) => (
                self.accumulator.compounded(deposit.initial_value, &deposit.snapshot.stake)?,
                self.accumulator.collateral_gain(deposit.initial_value, &deposit.snapshot)?,
                self.depositor_reward_gain(deposit)?,
            ),
            None => (Fixed::ZERO, Fixed::ZERO, Fixed::ZERO),
        };

        let front_end_gain = match front_end.front_end() {
            Some(id) => Some((id, self.front_end_reward_gain(id)?)),
            None => None,
        };

        let (added, withdrawn) = match change {
            PrincipalChange::Add(amount) => (amount, Fixed::ZERO),
            PrincipalChange::Remove(amount) => (Fixed::ZERO, amount.min(compounded)),
        };
        let new_deposit = compounded.checked_add(added)?.checked_sub(withdrawn)?;

        let front_end_stake = match front_end.front_end() {
            Some(id) => {
                let stake = self
                    .compounded_front_end_stake(id)?
                    .checked_add(added)?
                    .saturating_sub(withdrawn);
                self.set_front_end_stake(id, stake);
                Some((id, stake))
            }
            None => None,
        };

        if new_deposit.is_zero() {
            self.deposits.remove(&depositor);
        } else {
            self.deposits.insert(
                depositor,
                Deposit {
                    initial_value: new_deposit,
                    front_end,
                    snapshot: self.accumulator.deposit_snapshot(),
                },
            );
        }

        self.total_deposits = self.total_deposits.checked_add(added)?.saturating_sub(withdrawn);
        self.collateral = self.collateral.saturating_sub(collateral_gain);

        Ok(DepositUpdate {
            depositor,
            front_end: if new_deposit.is_zero() { FrontEndTag::Direct } else { front_end },
            initial_before: existing.map(|d| d.initial_value).unwrap_or(Fixed::ZERO),
            compounded_before: compounded,
            new_deposit,
            added,
            withdrawn,
            gains: Gains {
                collateral: collateral_gain,
                reward: reward_gain,
                front_end: front_end_gain,
            },
            issued,
            front_end_stake,
        })
    }

    fn set_front_end_stake(&mut self, id: AccountId, stake: Fixed) {
        let snapshot = (!stake.is_zero()).then(|| self.accumulator.stake_snapshot());
        if let Some(front_end) = self.front_ends.get_mut(&id) {
            front_end.stake = stake;
            front_end.snapshot = snapshot;
        }
    }

    // 4.4: liquidation offset

    /// Cancel `debt` against pooled deposits and hand the depositors `collateral`.
    pub fn offset(
        &mut self,
        caller: Caller,
        debt: Fixed,
        collateral: Fixed,
        now: Timestamp,
    ) -> Result<OffsetOutcome, PoolError> {
        if !caller.is_coordinator() {
            return Err(PoolError::Unauthorized);
        }

        let issued = self.trigger_issuance(now)?;
        if self.total_deposits.is_zero() || debt.is_zero() {
            return Ok(OffsetOutcome {
                debt_absorbed: Fixed::ZERO,
                collateral_added: Fixed::ZERO,
                issued,
                update: None,
            });
        }

        let debt_absorbed = debt.min(self.total_deposits);
        let update = self
            .accumulator
            .apply_offset(debt_absorbed, collateral, self.total_deposits)?;
        self.total_deposits = self.total_deposits.checked_sub(debt_absorbed)?;
        self.collateral = self.collateral.checked_add(collateral)?;

        Ok(OffsetOutcome {
            debt_absorbed,
            collateral_added: collateral,
            issued,
            update,
        })
    }

    // 4.5: front end registration

    pub fn register_front_end(&mut self, id: AccountId, kickback_rate: Decimal) -> Result<Fixed, PoolError> {
        if kickback_rate < Decimal::ZERO || kickback_rate > Decimal::ONE {
            return Err(PoolError::InvalidKickbackRate(kickback_rate));
        }
        if self.is_front_end(id) {
            return Err(PoolError::AlreadyRegistered(id));
        }
        if self.deposits.contains_key(&id) {
            return Err(PoolError::HasDeposit(id));
        }

        let rate = Fixed::new(kickback_rate)?;
        self.front_ends.insert(
            id,
            FrontEnd {
                kickback_rate: rate,
                stake: Fixed::ZERO,
                snapshot: None,
            },
        );
        Ok(rate)
    }
}

impl Transactional for StabilityPool {
    type Checkpoint = PoolCheckpoint;

    fn begin(&mut self) -> PoolCheckpoint {
        PoolCheckpoint {
            accumulator: self.accumulator.begin(),
            deposits: self.deposits.begin(),
            front_ends: self.front_ends.begin(),
            total_deposits: self.total_deposits,
            collateral: self.collateral,
            issuance: self.issuance.clone(),
        }
    }

    fn rollback(&mut self, checkpoint: PoolCheckpoint) {
        self.accumulator.rollback(checkpoint.accumulator);
        self.deposits.rollback(checkpoint.deposits);
        self.front_ends.rollback(checkpoint.front_ends);
        self.total_deposits = checkpoint.total_deposits;
        self.collateral = checkpoint.collateral;
        self.issuance = checkpoint.issuance;
    }

    fn commit(&mut self) -> usize {
        self.accumulator.commit() + self.deposits.commit() + self.front_ends.commit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const ALICE: AccountId = AccountId(1);
    const BOB: AccountId = AccountId(2);
    const FRONT: AccountId = AccountId(9);

    fn t(secs: i64) -> Timestamp {
        Timestamp::from_secs(secs)
    }

    fn pool() -> StabilityPool {
        StabilityPool::new(CommunityIssuance::new(
            Fixed::from(32_000_000),
            Fixed::new(dec!(0.999998681227695)).unwrap(),
            t(0),
        ))
    }

    fn fx(value: Decimal) -> Fixed {
        Fixed::new(value).unwrap()
    }

    #[test]
    fn single_depositor_absorbs_offset() {
        let mut sp = pool();
        sp.provide(ALICE, Fixed::from(200_000), FrontEndTag::Direct, t(0)).unwrap();

        let outcome = sp
            .offset(Caller::LiquidationCoordinator, Fixed::from(170), fx(dec!(1.7)), t(0))
            .unwrap();
        assert_eq!(outcome.debt_absorbed, Fixed::from(170));

        assert_eq!(sp.compounded_deposit(ALICE).unwrap(), Fixed::from(199_830));
        assert_eq!(sp.collateral_gain(ALICE).unwrap(), fx(dec!(1.7)));
        assert_eq!(sp.total_deposits(), Fixed::from(199_830));
        assert_eq!(sp.collateral_balance(), fx(dec!(1.7)));
    }

    #[test]
    fn withdraw_more_than_held_takes_everything() {
        let mut sp = pool();
        sp.provide(ALICE, Fixed::from(1_000), FrontEndTag::Direct, t(0)).unwrap();
        sp.provide(BOB, Fixed::from(3_000), FrontEndTag::Direct, t(0)).unwrap();
        sp.offset(Caller::LiquidationCoordinator, Fixed::from(400), Fixed::from(2), t(0))
            .unwrap();

        let compounded = sp.compounded_deposit(ALICE).unwrap();
        let update = sp.withdraw(ALICE, Fixed::MAX, t(0)).unwrap();
        assert_eq!(update.withdrawn, compounded);
        assert_eq!(update.new_deposit, Fixed::ZERO);
        assert_eq!(update.gains.collateral, fx(dec!(0.5)));
        assert!(sp.deposit(ALICE).is_none());
        assert!(matches!(sp.withdraw(ALICE, Fixed::ONE, t(0)), Err(PoolError::NoDeposit(_))));
    }

    #[test]
    fn deposit_then_withdraw_is_a_no_op() {
        let mut sp = pool();
        sp.provide(BOB, Fixed::from(5_000), FrontEndTag::Direct, t(0)).unwrap();
        let p_before = sp.accumulator().p();

        let amount = fx(dec!(1234.567890123456789));
        sp.provide(ALICE, amount, FrontEndTag::Direct, t(0)).unwrap();
        let update = sp.withdraw(ALICE, amount, t(0)).unwrap();

        assert_eq!(update.withdrawn, amount);
        assert_eq!(update.gains, Gains::default());
        assert_eq!(sp.accumulator().p(), p_before);
        assert!(sp.accumulator().sum_at(0, 0).is_zero());
        assert_eq!(sp.total_deposits(), Fixed::from(5_000));
    }

    #[test]
    fn proportional_losses_and_gains() {
        let mut sp = pool();
        sp.provide(ALICE, Fixed::from(1_000), FrontEndTag::Direct, t(0)).unwrap();
        sp.provide(BOB, Fixed::from(3_000), FrontEndTag::Direct, t(0)).unwrap();
        sp.offset(Caller::LiquidationCoordinator, Fixed::from(800), Fixed::from(4), t(0))
            .unwrap();

        assert_eq!(sp.compounded_deposit(ALICE).unwrap(), Fixed::from(800));
        assert_eq!(sp.compounded_deposit(BOB).unwrap(), Fixed::from(2_400));
        assert_eq!(sp.collateral_gain(ALICE).unwrap(), Fixed::ONE);
        assert_eq!(sp.collateral_gain(BOB).unwrap(), Fixed::from(3));
    }

    #[test]
    fn full_wipe_resets_epoch_for_new_depositors() {
        let mut sp = pool();
        sp.provide(ALICE, Fixed::from(1_000), FrontEndTag::Direct, t(0)).unwrap();
        sp.offset(Caller::LiquidationCoordinator, Fixed::from(1_000), Fixed::from(6), t(0))
            .unwrap();
        assert_eq!(sp.accumulator().current_epoch(), 1);
        assert_eq!(sp.compounded_deposit(ALICE).unwrap(), Fixed::ZERO);

        sp.provide(BOB, Fixed::from(500), FrontEndTag::Direct, t(0)).unwrap();
        sp.offset(Caller::LiquidationCoordinator, Fixed::from(100), Fixed::ONE, t(0))
            .unwrap();

        assert_eq!(sp.compounded_deposit(BOB).unwrap(), Fixed::from(400));
        assert_eq!(sp.collateral_gain(BOB).unwrap(), Fixed::ONE);
        // alice keeps only what she earned before the wipe
        assert_eq!(sp.collateral_gain(ALICE).unwrap(), Fixed::from(6));

        let update = sp.withdraw(ALICE, Fixed::MAX, t(0)).unwrap();
        assert_eq!(update.withdrawn, Fixed::ZERO);
        assert_eq!(update.gains.collateral, Fixed::from(6));
        assert!(sp.deposit(ALICE).is_none());
    }

    #[test]
    fn pool_stays_usable_after_near_total_offsets() {
        let mut sp = pool();
        let carol = AccountId(3);
        sp.provide(ALICE, Fixed::ONE, FrontEndTag::Direct, t(0)).unwrap();
        sp.offset(Caller::LiquidationCoordinator, fx(dec!(0.999999999999999999)), Fixed::ONE, t(0))
            .unwrap();
        for _ in 0..2 {
            sp.provide(BOB, Fixed::ONE, FrontEndTag::Direct, t(0)).unwrap();
            sp.offset(Caller::LiquidationCoordinator, Fixed::ONE, Fixed::ONE, t(0))
                .unwrap();
        }
        assert!(sp.accumulator().p().value() >= crate::math::P_FLOOR);

        sp.provide(carol, Fixed::from(100), FrontEndTag::Direct, t(0)).unwrap();
        assert_eq!(sp.compounded_deposit(carol).unwrap(), Fixed::from(100));
        sp.offset(Caller::LiquidationCoordinator, Fixed::from(50), Fixed::ONE, t(0))
            .unwrap();

        let left = sp.compounded_deposit(carol).unwrap();
        assert!((left.value() - dec!(50)).abs() < dec!(0.000000001));
        assert!(!sp.collateral_gain(carol).unwrap().is_zero());
        let update = sp.withdraw(carol, Fixed::MAX, t(0)).unwrap();
        assert_eq!(update.withdrawn, left);
        // the early depositors are long gone but can still be touched
        sp.withdraw(ALICE, Fixed::MAX, t(0)).unwrap();
        sp.withdraw(BOB, Fixed::MAX, t(0)).unwrap();
    }

    #[test]
    fn offset_is_coordinator_only() {
        let mut sp = pool();
        sp.provide(ALICE, Fixed::from(1_000), FrontEndTag::Direct, t(0)).unwrap();
        let result = sp.offset(Caller::Account(ALICE), Fixed::ONE, Fixed::ONE, t(0));
        assert_eq!(result.unwrap_err(), PoolError::Unauthorized);
    }

    #[test]
    fn empty_pool_offset_changes_nothing() {
        let mut sp = pool();
        let outcome = sp
            .offset(Caller::LiquidationCoordinator, Fixed::from(10), Fixed::ONE, t(0))
            .unwrap();
        assert!(outcome.update.is_none());
        assert_eq!(outcome.debt_absorbed, Fixed::ZERO);
        assert_eq!(sp.collateral_balance(), Fixed::ZERO);
    }

    #[test]
    fn front_end_registration_rules() {
        let mut sp = pool();
        assert!(matches!(
            sp.register_front_end(FRONT, dec!(1.5)),
            Err(PoolError::InvalidKickbackRate(_))
        ));
        assert!(matches!(
            sp.register_front_end(FRONT, dec!(-0.1)),
            Err(PoolError::InvalidKickbackRate(_))
        ));
        sp.register_front_end(FRONT, dec!(0.8)).unwrap();
        assert_eq!(
            sp.register_front_end(FRONT, dec!(0.5)).unwrap_err(),
            PoolError::AlreadyRegistered(FRONT)
        );

        sp.provide(ALICE, Fixed::from(10), FrontEndTag::Direct, t(0)).unwrap();
        assert_eq!(sp.register_front_end(ALICE, dec!(0.5)).unwrap_err(), PoolError::HasDeposit(ALICE));

        // front ends cannot deposit, unknown tags are refused
        assert_eq!(
            sp.provide(FRONT, Fixed::ONE, FrontEndTag::Direct, t(0)).unwrap_err(),
            PoolError::DepositorIsFrontEnd(FRONT)
        );
        assert_eq!(
            sp.provide(BOB, Fixed::ONE, FrontEndTag::ViaFrontEnd(BOB), t(0)).unwrap_err(),
            PoolError::FrontEndNotRegistered(BOB)
        );
        assert_eq!(sp.provide(BOB, Fixed::ZERO, FrontEndTag::Direct, t(0)).unwrap_err(), PoolError::ZeroAmount);
    }

    #[test]
    fn tag_is_set_on_first_deposit_only() {
        let mut sp = pool();
        sp.register_front_end(FRONT, dec!(0.5)).unwrap();
        sp.register_front_end(AccountId(10), dec!(0.5)).unwrap();

        sp.provide(ALICE, Fixed::from(100), FrontEndTag::ViaFrontEnd(FRONT), t(0)).unwrap();
        let update = sp
            .provide(ALICE, Fixed::from(50), FrontEndTag::ViaFrontEnd(AccountId(10)), t(0))
            .unwrap();

        assert_eq!(update.front_end, FrontEndTag::ViaFrontEnd(FRONT));
        assert_eq!(sp.compounded_front_end_stake(FRONT).unwrap(), Fixed::from(150));
        assert_eq!(sp.compounded_front_end_stake(AccountId(10)).unwrap(), Fixed::ZERO);

        sp.withdraw(ALICE, Fixed::MAX, t(0)).unwrap();
        assert_eq!(sp.compounded_front_end_stake(FRONT).unwrap(), Fixed::ZERO);
        assert!(sp.front_end(FRONT).unwrap().snapshot.is_none());
    }

    #[test]
    fn front_end_takes_its_cut_of_rewards() {
        let mut sp = pool();
        sp.register_front_end(FRONT, dec!(0.25)).unwrap();
        sp.provide(ALICE, Fixed::from(1_000), FrontEndTag::ViaFrontEnd(FRONT), t(0)).unwrap();

        let update = sp.withdraw(ALICE, Fixed::ZERO, t(86_400)).unwrap();
        assert!(!update.issued.is_zero());

        let depositor = update.gains.reward;
        let (id, front_end) = update.gains.front_end.unwrap();
        assert_eq!(id, FRONT);

        let issued = update.issued.value();
        assert!((depositor.value() - issued * dec!(0.25)).abs() < dec!(0.000000001));
        assert!((front_end.value() - issued * dec!(0.75)).abs() < dec!(0.000000001));
        assert!(depositor.value() + front_end.value() <= issued);
    }

    #[test]
    fn claim_requires_collateral_gain() {
        let mut sp = pool();
        sp.provide(ALICE, Fixed::from(1_000), FrontEndTag::Direct, t(0)).unwrap();
        assert_eq!(
            sp.claim_gain_for_trove(ALICE, t(0)).unwrap_err(),
            PoolError::NoCollateralGain(ALICE)
        );

        sp.offset(Caller::LiquidationCoordinator, Fixed::from(100), Fixed::ONE, t(0))
            .unwrap();
        let update = sp.claim_gain_for_trove(ALICE, t(0)).unwrap();
        assert_eq!(update.gains.collateral, Fixed::ONE);
        assert_eq!(update.new_deposit, Fixed::from(900));
        assert!(sp.collateral_gain(ALICE).unwrap().is_zero());
    }
}
