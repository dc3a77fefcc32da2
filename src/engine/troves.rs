// 8.5 engine/troves.rs: borrowing. open, adjust and close troves.
// every path realizes pending redistribution first, then checks ICR against MCR
// and the resulting TCR against CCR before any balance moves.

use super::core::Engine;
use super::results::{CloseResult, EngineError, TroveResult};
use crate::events::{BorrowingFeePaidEvent, EventPayload, TroveOperation, TroveUpdatedEvent};
use crate::fees::Fees;
use crate::math::Fixed;
use crate::trove::{EntirePosition, Trove, TroveStatus};
use crate::types::{AccountId, Asset, Price};
use serde::{Deserialize, Serialize};

/// Requested change to a trove. Deposit and withdrawal are exclusive, as are borrow and repay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TroveAdjustment {
    pub deposit_collateral: Fixed,
    pub withdraw_collateral: Fixed,
    pub borrow: Fixed,
    pub repay: Fixed,
}

impl TroveAdjustment {
    pub fn deposit(amount: Fixed) -> Self {
        Self {
            deposit_collateral: amount,
            ..Self::default()
        }
    }

    pub fn withdraw(amount: Fixed) -> Self {
        Self {
            withdraw_collateral: amount,
            ..Self::default()
        }
    }

    pub fn borrow(amount: Fixed) -> Self {
        Self {
            borrow: amount,
            ..Self::default()
        }
    }

    pub fn repay(amount: Fixed) -> Self {
        Self {
            repay: amount,
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<(), EngineError> {
        if !self.deposit_collateral.is_zero() && !self.withdraw_collateral.is_zero() {
            return Err(EngineError::InvalidAdjustment("cannot deposit and withdraw collateral at once"));
        }
        if !self.borrow.is_zero() && !self.repay.is_zero() {
            return Err(EngineError::InvalidAdjustment("cannot borrow and repay at once"));
        }
        if *self == Self::default() {
            return Err(EngineError::InvalidAdjustment("no change requested"));
        }
        Ok(())
    }
}

impl Engine {
    pub fn entire_position(&self, owner: AccountId) -> Result<EntirePosition, EngineError> {
        Ok(self.state.ledger.entire_position(owner)?)
    }

    pub fn pending_trove_rewards(&self, owner: AccountId) -> Result<(Fixed, Fixed), EngineError> {
        Ok(self.state.ledger.pending_rewards(owner)?)
    }

    pub fn icr(&self, owner: AccountId) -> Result<Fixed, EngineError> {
        Ok(self.state.ledger.icr(owner, self.price()?)?)
    }

    // recovery mode waives the fee and leaves the base rate where it is
    fn borrowing_fee(&mut self, amount: Fixed, price: Price) -> Result<Fixed, EngineError> {
        if amount.is_zero() {
            return Ok(Fixed::ZERO);
        }
        if self.state.ledger.tcr(price)? < self.config.params.ccr() {
            return Ok(Fixed::ZERO);
        }

        let params = self.config.params.fee_params();
        let before = self.state.base_rate;
        self.state.base_rate.decay(self.current_time, params.minute_decay_factor)?;
        self.emit_base_rate_if_changed(before);
        let fees = Fees::new(&self.state.base_rate, params, self.current_time, false)?;
        Ok(fees.borrowing_fee(amount)?)
    }

    fn require_min_net_debt(&self, debt: Fixed) -> Result<(), EngineError> {
        let minimum = self.config.params.min_net_debt();
        let net_debt = debt.saturating_sub(self.config.params.stable_gas_compensation());
        if net_debt < minimum {
            return Err(EngineError::NetDebtTooLow { net_debt, minimum });
        }
        Ok(())
    }

    pub(super) fn emit_trove_updated(&mut self, trove: &Trove, operation: TroveOperation) {
        self.emit_event(EventPayload::TroveUpdated(TroveUpdatedEvent {
            owner: trove.owner,
            collateral: trove.collateral,
            debt: trove.debt,
            stake: trove.stake,
            operation,
        }));
    }

    /// Lock `collateral` and borrow `borrow` stable against it.
    pub fn open_trove(&mut self, owner: AccountId, collateral: Fixed, borrow: Fixed) -> Result<TroveResult, EngineError> {
        self.atomically(|engine| {
            if collateral.is_zero() || borrow.is_zero() {
                return Err(EngineError::ZeroAmount);
            }
            if engine.state.ledger.is_active(owner) {
                return Err(crate::trove::TroveError::PositionExists(owner).into());
            }

            let price = engine.fetch_price()?;
            let gas = engine.config.params.stable_gas_compensation();
            let fee = engine.borrowing_fee(borrow, price)?;
            let debt = borrow.checked_add(fee)?.checked_add(gas)?;

            engine.require_min_net_debt(debt)?;
            engine.require_icr(collateral, debt, price)?;
            engine.require_tcr_after(collateral, Fixed::ZERO, debt, Fixed::ZERO, price)?;

            engine.state.custody.debit(owner, Asset::Collateral, collateral)?;
            let trove = engine.state.ledger.open(owner, collateral, debt)?;

            engine.state.custody.mint(owner, Asset::Stable, borrow)?;
            engine.state.custody.mint_held(Asset::Stable, fee)?;
            engine.state.custody.mint_held(Asset::Stable, gas)?;
            engine.state.fees.stable = engine.state.fees.stable.checked_add(fee)?;
            engine.state.gas_pool = engine.state.gas_pool.checked_add(gas)?;

            engine.emit_trove_updated(&trove, TroveOperation::Open);
            if !fee.is_zero() {
                engine.emit_event(EventPayload::BorrowingFeePaid(BorrowingFeePaidEvent { owner, fee }));
            }

            Ok(TroveResult {
                owner,
                collateral: trove.collateral,
                debt: trove.debt,
                stake: trove.stake,
                borrowing_fee: fee,
            })
        })
    }

    pub fn adjust_trove(&mut self, owner: AccountId, adjustment: TroveAdjustment) -> Result<TroveResult, EngineError> {
        self.atomically(|engine| {
            adjustment.validate()?;
            let price = engine.fetch_price()?;
            let position = engine.state.ledger.apply_pending_rewards(owner)?;

            if adjustment.withdraw_collateral > position.collateral {
                return Err(EngineError::InvalidAdjustment("withdrawal exceeds trove collateral"));
            }
            let gas = engine.config.params.stable_gas_compensation();
            if adjustment.repay > position.debt.saturating_sub(gas) {
                return Err(EngineError::InvalidAdjustment("repayment exceeds net debt"));
            }

            let fee = engine.borrowing_fee(adjustment.borrow, price)?;
            let debt_in = adjustment.borrow.checked_add(fee)?;
            let collateral = position
                .collateral
                .checked_add(adjustment.deposit_collateral)?
                .checked_sub(adjustment.withdraw_collateral)?;
            let debt = position.debt.checked_add(debt_in)?.checked_sub(adjustment.repay)?;

            if !debt_in.is_zero() || !adjustment.repay.is_zero() {
                engine.require_min_net_debt(debt)?;
            }
            engine.require_icr(collateral, debt, price)?;
            engine.require_tcr_after(
                adjustment.deposit_collateral,
                adjustment.withdraw_collateral,
                debt_in,
                adjustment.repay,
                price,
            )?;

            let custody = &mut engine.state.custody;
            if !adjustment.deposit_collateral.is_zero() {
                custody.debit(owner, Asset::Collateral, adjustment.deposit_collateral)?;
            }
            if !adjustment.repay.is_zero() {
                custody.burn(owner, Asset::Stable, adjustment.repay)?;
            }
            if !adjustment.borrow.is_zero() {
                custody.mint(owner, Asset::Stable, adjustment.borrow)?;
                custody.mint_held(Asset::Stable, fee)?;
                engine.state.fees.stable = engine.state.fees.stable.checked_add(fee)?;
            }

            let trove = engine.state.ledger.set_position(owner, collateral, debt)?;
            engine
                .state
                .custody
                .credit(owner, Asset::Collateral, adjustment.withdraw_collateral)?;

            engine.emit_trove_updated(&trove, TroveOperation::Adjust);
            if !fee.is_zero() {
                engine.emit_event(EventPayload::BorrowingFeePaid(BorrowingFeePaidEvent { owner, fee }));
            }

            Ok(TroveResult {
                owner,
                collateral: trove.collateral,
                debt: trove.debt,
                stake: trove.stake,
                borrowing_fee: fee,
            })
        })
    }

    /// Repay everything and take the collateral back. Not allowed for the last trove.
    pub fn close_trove(&mut self, owner: AccountId) -> Result<CloseResult, EngineError> {
        self.atomically(|engine| {
            let price = engine.fetch_price()?;
            // surface a missing trove before the last-trove rule
            engine.state.ledger.entire_position(owner)?;
            if engine.state.ledger.active_count() <= 1 {
                return Err(EngineError::OnlyOneTrove);
            }

            let position = engine.state.ledger.apply_pending_rewards(owner)?;
            engine.require_tcr_after(Fixed::ZERO, position.collateral, Fixed::ZERO, position.debt, price)?;

            let gas = engine.config.params.stable_gas_compensation();
            let repay = position.debt.saturating_sub(gas);
            engine.state.custody.burn(owner, Asset::Stable, repay)?;
            engine.state.custody.burn_held(Asset::Stable, gas)?;
            engine.state.gas_pool = engine.state.gas_pool.checked_sub(gas)?;

            let closed = engine.state.ledger.close(owner, TroveStatus::ClosedByOwner)?;
            engine.state.custody.credit(owner, Asset::Collateral, closed.collateral)?;

            engine.emit_event(EventPayload::TroveUpdated(TroveUpdatedEvent {
                owner,
                collateral: Fixed::ZERO,
                debt: Fixed::ZERO,
                stake: Fixed::ZERO,
                operation: TroveOperation::Close,
            }));

            Ok(CloseResult {
                owner,
                collateral_returned: closed.collateral,
                debt_repaid: closed.debt,
            })
        })
    }
}
