// 8.6 engine/stability.rs: stability pool operations.
// the pool computes every gain; this file moves the matching balances and logs it.
// 8.6.1 settle_deposit() pays out whatever a touch realized.

use super::core::Engine;
use super::results::EngineError;
use crate::events::{
    CollateralGainMovedEvent, DepositUpdatedEvent, EventPayload, FrontEndRegisteredEvent, FrontEndStakeChangedEvent,
    GainsWithdrawnEvent, RewardIssuedEvent, RewardPaidEvent, TroveOperation,
};
use crate::math::Fixed;
use crate::stability_deposit::{DepositChange, StabilityDeposit};
use crate::stability_pool::{DepositUpdate, PoolError};
use crate::trove::TroveError;
use crate::types::{AccountId, Asset, FrontEndTag};
use rust_decimal::Decimal;

/// Where a realized collateral gain goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GainDestination {
    Depositor,
    Trove,
}

impl Engine {
    pub fn compounded_deposit(&self, depositor: AccountId) -> Result<Fixed, EngineError> {
        Ok(self.state.pool.compounded_deposit(depositor)?)
    }

    pub fn depositor_collateral_gain(&self, depositor: AccountId) -> Result<Fixed, EngineError> {
        Ok(self.state.pool.collateral_gain(depositor)?)
    }

    pub fn depositor_reward_gain(&self, depositor: AccountId) -> Result<Fixed, EngineError> {
        Ok(self.state.pool.reward_gain(depositor)?)
    }

    pub fn front_end_reward_gain(&self, front_end: AccountId) -> Result<Fixed, EngineError> {
        Ok(self.state.pool.front_end_reward_gain(front_end)?)
    }

    pub fn compounded_front_end_stake(&self, front_end: AccountId) -> Result<Fixed, EngineError> {
        Ok(self.state.pool.compounded_front_end_stake(front_end)?)
    }

    /// Everything a depositor would see for their position right now.
    pub fn deposit_view(&self, depositor: AccountId) -> Result<StabilityDeposit, EngineError> {
        let pool = &self.state.pool;
        let Some(deposit) = pool.deposit(depositor) else {
            return Ok(StabilityDeposit::default());
        };
        Ok(StabilityDeposit {
            initial: deposit.initial_value,
            current: pool.compounded_deposit(depositor)?,
            collateral_gain: pool.collateral_gain(depositor)?,
            reward_gain: pool.reward_gain(depositor)?,
            front_end: deposit.front_end,
        })
    }

    pub fn register_front_end(&mut self, front_end: AccountId, kickback_rate: Decimal) -> Result<Fixed, EngineError> {
        self.atomically(|engine| {
            let rate = engine.state.pool.register_front_end(front_end, kickback_rate)?;
            engine.emit_event(EventPayload::FrontEndRegistered(FrontEndRegisteredEvent {
                front_end,
                kickback_rate: rate,
            }));
            Ok(rate)
        })
    }

    /// Add `amount` stable to the pool. Pending gains are paid out first.
    pub fn provide_to_pool(
        &mut self,
        depositor: AccountId,
        amount: Fixed,
        tag: FrontEndTag,
    ) -> Result<DepositUpdate, EngineError> {
        self.atomically(|engine| {
            let now = engine.current_time;
            let update = engine.state.pool.provide(depositor, amount, tag, now)?;
            engine.state.custody.debit(depositor, Asset::Stable, amount)?;
            engine.settle_deposit(&update, GainDestination::Depositor)?;
            Ok(update)
        })
    }

    /// Withdraw up to `amount`. Zero only collects gains. Blocked while any trove is below MCR.
    pub fn withdraw_from_pool(&mut self, depositor: AccountId, amount: Fixed) -> Result<DepositUpdate, EngineError> {
        self.atomically(|engine| {
            if engine.state.pool.deposit(depositor).is_none() {
                return Err(PoolError::NoDeposit(depositor).into());
            }
            if !amount.is_zero() {
                engine.require_no_undercollateralized_troves()?;
            }

            let now = engine.current_time;
            let update = engine.state.pool.withdraw(depositor, amount, now)?;
            engine.state.custody.credit(depositor, Asset::Stable, update.withdrawn)?;
            engine.settle_deposit(&update, GainDestination::Depositor)?;
            Ok(update)
        })
    }

    /// Send the depositor's collateral gain into their trove instead of their wallet.
    pub fn withdraw_gain_to_trove(&mut self, depositor: AccountId) -> Result<DepositUpdate, EngineError> {
        self.atomically(|engine| {
            if engine.state.pool.deposit(depositor).is_none() {
                return Err(PoolError::NoDeposit(depositor).into());
            }
            if !engine.state.ledger.is_active(depositor) {
                return Err(TroveError::NoPosition(depositor).into());
            }

            let price = engine.fetch_price()?;
            let now = engine.current_time;
            let update = engine.state.pool.claim_gain_for_trove(depositor, now)?;
            let gain = update.gains.collateral;

            let position = engine.state.ledger.apply_pending_rewards(depositor)?;
            let collateral = position.collateral.checked_add(gain)?;
            engine.require_icr(collateral, position.debt, price)?;
            engine.require_tcr_after(gain, Fixed::ZERO, Fixed::ZERO, Fixed::ZERO, price)?;
            let trove = engine.state.ledger.set_position(depositor, collateral, position.debt)?;

            engine.settle_deposit(&update, GainDestination::Trove)?;
            engine.emit_event(EventPayload::CollateralGainMovedToTrove(CollateralGainMovedEvent {
                depositor,
                amount: gain,
            }));
            engine.emit_trove_updated(&trove, TroveOperation::MoveCollateralGain);
            Ok(update)
        })
    }

    /// Provide or withdraw whatever moves the compounded deposit to `target`.
    pub fn set_deposit_to(
        &mut self,
        depositor: AccountId,
        target: Fixed,
        tag: FrontEndTag,
    ) -> Result<Option<DepositUpdate>, EngineError> {
        let view = self.deposit_view(depositor)?;
        match view.what_changed(target) {
            Some(DepositChange::Deposit(amount)) => self.provide_to_pool(depositor, amount, tag).map(Some),
            Some(DepositChange::Withdraw(amount)) => self.withdraw_from_pool(depositor, amount).map(Some),
            None => Ok(None),
        }
    }

    fn require_no_undercollateralized_troves(&mut self) -> Result<(), EngineError> {
        let price = self.fetch_price()?;
        let mcr = self.config.params.mcr();
        match self.state.ledger.lowest_icr(price)? {
            Some((_, icr)) if icr < mcr => Err(EngineError::UndercollateralizedTroves),
            _ => Ok(()),
        }
    }

    fn settle_deposit(&mut self, update: &DepositUpdate, destination: GainDestination) -> Result<(), EngineError> {
        let depositor = update.depositor;

        if !update.issued.is_zero() {
            let total_issued = self.state.pool.issuance().total_issued();
            self.emit_event(EventPayload::RewardIssued(RewardIssuedEvent {
                amount: update.issued,
                total_issued,
            }));
        }

        let collateral = update.gains.collateral;
        let stable_loss = update.initial_before.saturating_sub(update.compounded_before);
        if destination == GainDestination::Depositor {
            self.state.custody.credit(depositor, Asset::Collateral, collateral)?;
        }
        if !collateral.is_zero() || !stable_loss.is_zero() {
            self.emit_event(EventPayload::GainsWithdrawn(GainsWithdrawnEvent {
                depositor,
                collateral,
                stable_loss,
            }));
        }

        if !update.gains.reward.is_zero() {
            self.state.custody.mint(depositor, Asset::Reward, update.gains.reward)?;
            self.emit_event(EventPayload::RewardPaid(RewardPaidEvent {
                recipient: depositor,
                amount: update.gains.reward,
                front_end: false,
            }));
        }
        if let Some((front_end, amount)) = update.gains.front_end {
            if !amount.is_zero() {
                self.state.custody.mint(front_end, Asset::Reward, amount)?;
                self.emit_event(EventPayload::RewardPaid(RewardPaidEvent {
                    recipient: front_end,
                    amount,
                    front_end: true,
                }));
            }
        }

        if let Some((front_end, stake)) = update.front_end_stake {
            self.emit_event(EventPayload::FrontEndStakeChanged(FrontEndStakeChangedEvent { front_end, stake }));
        }
        self.emit_event(EventPayload::DepositUpdated(DepositUpdatedEvent {
            depositor,
            deposit: update.new_deposit,
            front_end: update.front_end,
        }));
        Ok(())
    }
}
