// 4.6 stability_deposit.rs: a depositor's position as seen from outside the pool.
// what_changed turns a target value into the provide or withdraw that reaches it.

use crate::math::{Fixed, MathError};
use crate::types::FrontEndTag;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepositChange {
    Deposit(Fixed),
    Withdraw(Fixed),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StabilityDeposit {
    pub initial: Fixed,
    pub current: Fixed,
    pub collateral_gain: Fixed,
    pub reward_gain: Fixed,
    pub front_end: FrontEndTag,
}

impl StabilityDeposit {
    pub fn is_empty(&self) -> bool {
        self.initial.is_zero()
            && self.current.is_zero()
            && self.collateral_gain.is_zero()
            && self.reward_gain.is_zero()
    }

    pub fn what_changed(&self, target: Fixed) -> Option<DepositChange> {
        if target > self.current {
            Some(DepositChange::Deposit(target.saturating_sub(self.current)))
        } else if target < self.current {
            Some(DepositChange::Withdraw(self.current.saturating_sub(target)))
        } else {
            None
        }
    }

    /// Value after `change`. Withdrawals floor at zero.
    pub fn apply(&self, change: Option<DepositChange>) -> Result<Fixed, MathError> {
        match change {
            None => Ok(self.current),
            Some(DepositChange::Withdraw(amount)) => Ok(self.current.saturating_sub(amount)),
            Some(DepositChange::Deposit(amount)) => self.current.checked_add(amount),
        }
    }
}
