// 9.2 custody.rs: MOCKED. in-memory token balances, no real transfers.
// balances are per (account, asset). what the protocol holds sits in `held`.
// supply counts everything minted and not yet burned, held or not.

use std::collections::{HashMap, HashSet};

use crate::journal::{JournaledMap, Transactional};
use crate::math::{Fixed, MathError};
use crate::types::{AccountId, Asset};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    #[error("{account} holds {available} {asset:?}, needs {requested}")]
    InsufficientBalance {
        account: AccountId,
        asset: Asset,
        available: Fixed,
        requested: Fixed,
    },

    #[error("Protocol holds {available} {asset:?}, needs {requested}")]
    InsufficientHeld {
        asset: Asset,
        available: Fixed,
        requested: Fixed,
    },

    #[error("{account} rejected a payout of {asset:?}")]
    Rejected { account: AccountId, asset: Asset },

    #[error("Math error: {0}")]
    Math(#[from] MathError),
}

#[derive(Debug, Clone, Default)]
pub struct Custody {
    balances: JournaledMap<(AccountId, Asset), Fixed>,
    held: HashMap<Asset, Fixed>,
    supply: HashMap<Asset, Fixed>,
    rejecting: HashSet<(AccountId, Asset)>,
}

// held and supply have one entry per asset, so they are copied whole
#[derive(Debug, Clone)]
pub struct CustodyCheckpoint {
    balances: usize,
    held: HashMap<Asset, Fixed>,
    supply: HashMap<Asset, Fixed>,
}

impl Custody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self, account: AccountId, asset: Asset) -> Fixed {
        self.balances
            .get(&(account, asset))
            .copied()
            .unwrap_or(Fixed::ZERO)
    }

    pub fn held(&self, asset: Asset) -> Fixed {
        self.held.get(&asset).copied().unwrap_or(Fixed::ZERO)
    }

    pub fn total_supply(&self, asset: Asset) -> Fixed {
        self.supply.get(&asset).copied().unwrap_or(Fixed::ZERO)
    }

    /// Make `account` refuse every payout of `asset`.
    pub fn set_rejecting(&mut self, account: AccountId, asset: Asset, rejecting: bool) {
        if rejecting {
            self.rejecting.insert((account, asset));
        } else {
            self.rejecting.remove(&(account, asset));
        }
    }

    fn check_accepts(&self, account: AccountId, asset: Asset) -> Result<(), TransferError> {
        if self.rejecting.contains(&(account, asset)) {
            return Err(TransferError::Rejected { account, asset });
        }
        Ok(())
    }

    fn add_balance(&mut self, account: AccountId, asset: Asset, amount: Fixed) -> Result<Fixed, TransferError> {
        let balance = self.balance(account, asset).checked_add(amount)?;
        self.balances.insert((account, asset), balance);
        Ok(balance)
    }

    fn sub_balance(&mut self, account: AccountId, asset: Asset, amount: Fixed) -> Result<Fixed, TransferError> {
        let available = self.balance(account, asset);
        if amount > available {
            return Err(TransferError::InsufficientBalance {
                account,
                asset,
                available,
                requested: amount,
            });
        }
        let remaining = available.checked_sub(amount)?;
        self.balances.insert((account, asset), remaining);
        Ok(remaining)
    }

    fn adjust_held(&mut self, asset: Asset, add: Fixed, sub: Fixed) -> Result<(), TransferError> {
        let available = self.held(asset).checked_add(add)?;
        if sub > available {
            return Err(TransferError::InsufficientHeld {
                asset,
                available,
                requested: sub,
            });
        }
        self.held.insert(asset, available.checked_sub(sub)?);
        Ok(())
    }

    fn adjust_supply(&mut self, asset: Asset, add: Fixed, sub: Fixed) -> Result<(), TransferError> {
        let supply = self.total_supply(asset).checked_add(add)?.checked_sub(sub)?;
        self.supply.insert(asset, supply);
        Ok(())
    }

    /// External inflow into an account, e.g. collateral bridged in. Never rejected.
    pub fn fund(&mut self, account: AccountId, asset: Asset, amount: Fixed) -> Result<Fixed, TransferError> {
        self.adjust_supply(asset, amount, Fixed::ZERO)?;
        self.add_balance(account, asset, amount)
    }

    /// Move `amount` from `account` into protocol custody.
    pub fn debit(&mut self, account: AccountId, asset: Asset, amount: Fixed) -> Result<Fixed, TransferError> {
        let remaining = self.sub_balance(account, asset, amount)?;
        self.adjust_held(asset, amount, Fixed::ZERO)?;
        Ok(remaining)
    }

    /// Pay `amount` out of protocol custody to `account`.
    pub fn credit(&mut self, account: AccountId, asset: Asset, amount: Fixed) -> Result<Fixed, TransferError> {
        if amount.is_zero() {
            return Ok(self.balance(account, asset));
        }
        self.check_accepts(account, asset)?;
        self.adjust_held(asset, Fixed::ZERO, amount)?;
        self.add_balance(account, asset, amount)
    }

    /// Create `amount` directly in `account`.
    pub fn mint(&mut self, account: AccountId, asset: Asset, amount: Fixed) -> Result<Fixed, TransferError> {
        if amount.is_zero() {
            return Ok(self.balance(account, asset));
        }
        self.check_accepts(account, asset)?;
        self.adjust_supply(asset, amount, Fixed::ZERO)?;
        self.add_balance(account, asset, amount)
    }

    /// Create `amount` into protocol custody.
    pub fn mint_held(&mut self, asset: Asset, amount: Fixed) -> Result<(), TransferError> {
        self.adjust_supply(asset, amount, Fixed::ZERO)?;
        self.adjust_held(asset, amount, Fixed::ZERO)
    }

    /// Destroy `amount` from `account`.
    pub fn burn(&mut self, account: AccountId, asset: Asset, amount: Fixed) -> Result<Fixed, TransferError> {
        let remaining = self.sub_balance(account, asset, amount)?;
        self.adjust_supply(asset, Fixed::ZERO, amount)?;
        Ok(remaining)
    }

    /// Destroy `amount` out of protocol custody.
    pub fn burn_held(&mut self, asset: Asset, amount: Fixed) -> Result<(), TransferError> {
        self.adjust_held(asset, Fixed::ZERO, amount)?;
        self.adjust_supply(asset, Fixed::ZERO, amount)
    }
}

impl Transactional for Custody {
    type Checkpoint = CustodyCheckpoint;

    fn begin(&mut self) -> CustodyCheckpoint {
        CustodyCheckpoint {
            balances: self.balances.begin(),
            held: self.held.clone(),
            supply: self.supply.clone(),
        }
    }

    fn rollback(&mut self, checkpoint: CustodyCheckpoint) {
        self.balances.rollback(checkpoint.balances);
        self.held = checkpoint.held;
        self.supply = checkpoint.supply;
    }

    fn commit(&mut self) -> usize {
        self.balances.commit()
    }
}
