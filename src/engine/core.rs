// 8.0 engine/core.rs: main engine. owns the protocol state, the clock and the event log.
// 8.0.1 atomically() journals every write an operation makes and undoes them on error.

use super::config::EngineConfig;
use super::results::EngineError;
use crate::custody::{Custody, CustodyCheckpoint};
use crate::events::{AccountFundedEvent, BaseRateUpdatedEvent, Event, EventId, EventPayload, PriceUpdatedEvent};
use crate::fees::{BaseRate, Fees};
use crate::issuance::CommunityIssuance;
use crate::journal::{JournaledMap, Transactional};
use crate::math::{compute_cr, Fixed};
use crate::price_feed::{FeedCheckpoint, PriceFeed, PriceUpdate};
use crate::stability_pool::{PoolCheckpoint, StabilityPool};
use crate::trove::{LedgerCheckpoint, TroveLedger};
use crate::types::{AccountId, Asset, Price, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Source id used by [`Engine::set_price`].
pub const MANUAL_PRICE_SOURCE: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProtocolFees {
    pub stable: Fixed,
    pub collateral: Fixed,
}

/** 8.1: everything an operation may touch. journaled for rollback */
#[derive(Debug)]
pub(super) struct ProtocolState {
    pub(super) ledger: TroveLedger,
    pub(super) pool: StabilityPool,
    pub(super) custody: Custody,
    pub(super) price_feed: PriceFeed,
    /// Stable reserved for liquidator gas compensation.
    pub(super) gas_pool: Fixed,
    pub(super) fees: ProtocolFees,
    pub(super) base_rate: BaseRate,
    pub(super) surplus: JournaledMap<AccountId, Fixed>,
}

#[derive(Debug)]
pub(super) struct StateCheckpoint {
    ledger: LedgerCheckpoint,
    pool: PoolCheckpoint,
    custody: CustodyCheckpoint,
    price_feed: FeedCheckpoint,
    surplus: usize,
    gas_pool: Fixed,
    fees: ProtocolFees,
    base_rate: BaseRate,
}

impl Transactional for ProtocolState {
    type Checkpoint = StateCheckpoint;

    fn begin(&mut self) -> StateCheckpoint {
        StateCheckpoint {
            ledger: self.ledger.begin(),
            pool: self.pool.begin(),
            custody: self.custody.begin(),
            price_feed: self.price_feed.begin(),
            surplus: self.surplus.begin(),
            gas_pool: self.gas_pool,
            fees: self.fees,
            base_rate: self.base_rate,
        }
    }

    fn rollback(&mut self, checkpoint: StateCheckpoint) {
        self.ledger.rollback(checkpoint.ledger);
        self.pool.rollback(checkpoint.pool);
        self.custody.rollback(checkpoint.custody);
        self.price_feed.rollback(checkpoint.price_feed);
        self.surplus.rollback(checkpoint.surplus);
        self.gas_pool = checkpoint.gas_pool;
        self.fees = checkpoint.fees;
        self.base_rate = checkpoint.base_rate;
    }

    fn commit(&mut self) -> usize {
        self.ledger.commit()
            + self.pool.commit()
            + self.custody.commit()
            + self.price_feed.commit()
            + self.surplus.commit()
    }
}

#[derive(Debug)]
pub struct Engine {
    pub(super) config: EngineConfig,
    pub(super) state: ProtocolState,
    pub(super) events: Vec<Event>,
    pub(super) staged: Vec<Event>,
    pub(super) in_operation: bool,
    pub(super) next_event_id: u64,
    pub(super) next_account_id: u64,
    pub(super) current_time: Timestamp,
    pub(super) last_operation_writes: usize,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let start = Timestamp::from_millis(0);
        let params = &config.params;
        let issuance = CommunityIssuance::new(params.reward_supply_cap(), params.issuance_factor(), start);
        let state = ProtocolState {
            ledger: TroveLedger::new(),
            pool: StabilityPool::new(issuance),
            custody: Custody::new(),
            price_feed: PriceFeed::new(params.price_feed.clone()),
            gas_pool: Fixed::ZERO,
            fees: ProtocolFees::default(),
            base_rate: BaseRate::new(start),
            surplus: JournaledMap::new(),
        };

        Self {
            config,
            state,
            events: Vec::new(),
            staged: Vec::new(),
            in_operation: false,
            next_event_id: 1,
            next_account_id: 1,
            current_time: start,
            last_operation_writes: 0,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn set_time(&mut self, timestamp: Timestamp) {
        self.current_time = timestamp;
    }

    pub fn time(&self) -> Timestamp {
        self.current_time
    }

    pub fn advance_time(&mut self, millis: i64) {
        self.current_time = Timestamp::from_millis(self.current_time.as_millis() + millis);
    }

    pub fn create_account(&mut self) -> AccountId {
        let id = AccountId(self.next_account_id);
        self.next_account_id += 1;
        id
    }

    // 8.2: read access

    pub fn ledger(&self) -> &TroveLedger {
        &self.state.ledger
    }

    pub fn pool(&self) -> &StabilityPool {
        &self.state.pool
    }

    pub fn custody(&self) -> &Custody {
        &self.state.custody
    }

    pub fn balance(&self, account: AccountId, asset: Asset) -> Fixed {
        self.state.custody.balance(account, asset)
    }

    pub fn gas_pool(&self) -> Fixed {
        self.state.gas_pool
    }

    pub fn fees(&self) -> ProtocolFees {
        self.state.fees
    }

    pub fn base_rate(&self) -> BaseRate {
        self.state.base_rate
    }

    /// Fee schedule an operation would see right now.
    pub fn current_fees(&self) -> Result<Fees, EngineError> {
        let recovery_mode = self.is_recovery_mode()?;
        let params = self.config.params.fee_params();
        Ok(Fees::new(&self.state.base_rate, params, self.current_time, recovery_mode)?)
    }

    /// TCR under CCR. Borrowing fees are waived in this state.
    pub fn is_recovery_mode(&self) -> Result<bool, EngineError> {
        Ok(self.tcr()? < self.config.params.ccr())
    }

    pub fn collateral_surplus(&self, owner: AccountId) -> Fixed {
        self.state.surplus.get(&owner).copied().unwrap_or(Fixed::ZERO)
    }

    pub fn total_collateral_surplus(&self) -> Fixed {
        self.state.surplus.values().sum()
    }

    /// Price the next operation would use, without recording it as last good.
    pub fn price(&self) -> Result<Price, EngineError> {
        match self.state.price_feed.aggregate(self.current_time) {
            Ok(price) => Ok(price),
            Err(err) => self.state.price_feed.last_good_price().ok_or(EngineError::PriceFeed(err)),
        }
    }

    pub fn tcr(&self) -> Result<Fixed, EngineError> {
        Ok(self.state.ledger.tcr(self.price()?)?)
    }

    /// Keyed entries written by the last committed operation.
    pub fn last_operation_writes(&self) -> usize {
        self.last_operation_writes
    }

    pub fn recent_events(&self, count: usize) -> &[Event] {
        let start = self.events.len().saturating_sub(count);
        &self.events[start..]
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    // 8.3: external inputs

    /// Credit an account from outside the protocol.
    pub fn fund_account(&mut self, account: AccountId, asset: Asset, amount: Fixed) -> Result<Fixed, EngineError> {
        self.atomically(|engine| {
            if amount.is_zero() {
                return Err(EngineError::ZeroAmount);
            }
            let new_balance = engine.state.custody.fund(account, asset, amount)?;
            engine.emit_event(EventPayload::AccountFunded(AccountFundedEvent {
                account,
                asset,
                amount,
                new_balance,
            }));
            Ok(new_balance)
        })
    }

    /// Make `account` refuse payouts of `asset`.
    pub fn set_rejecting(&mut self, account: AccountId, asset: Asset, rejecting: bool) {
        self.state.custody.set_rejecting(account, asset, rejecting);
    }

    pub fn submit_price(&mut self, update: PriceUpdate) -> Result<Price, EngineError> {
        self.atomically(|engine| {
            engine.state.price_feed.submit_price(update)?;
            let price = engine.fetch_price()?;
            engine.emit_event(EventPayload::PriceUpdated(PriceUpdatedEvent { price }));
            Ok(price)
        })
    }

    pub fn set_price(&mut self, price: Decimal) -> Result<Price, EngineError> {
        self.submit_price(PriceUpdate::new(price, self.current_time, MANUAL_PRICE_SOURCE))
    }

    // 8.4: helpers shared by the operation files

    pub(super) fn fetch_price(&mut self) -> Result<Price, EngineError> {
        Ok(self.state.price_feed.fetch_price(self.current_time)?.price)
    }

    /// Fail unless the system stays at or above CCR after the given change in totals.
    pub(super) fn require_tcr_after(
        &self,
        collateral_in: Fixed,
        collateral_out: Fixed,
        debt_in: Fixed,
        debt_out: Fixed,
        price: Price,
    ) -> Result<(), EngineError> {
        let ledger = &self.state.ledger;
        let collateral = ledger
            .total_collateral()?
            .checked_add(collateral_in)?
            .saturating_sub(collateral_out);
        let debt = ledger.total_debt()?.checked_add(debt_in)?.saturating_sub(debt_out);
        let tcr = compute_cr(collateral, debt, price.value())?;
        let minimum = self.config.params.ccr();
        if tcr < minimum {
            return Err(EngineError::TcrBelowCritical { tcr, minimum });
        }
        Ok(())
    }

    pub(super) fn emit_base_rate_if_changed(&mut self, before: BaseRate) {
        let after = self.state.base_rate;
        if after != before {
            self.emit_event(EventPayload::BaseRateUpdated(BaseRateUpdatedEvent {
                base_rate: after.stored(),
                last_fee_operation: after.last_fee_operation(),
            }));
        }
    }

    pub(super) fn require_icr(&self, collateral: Fixed, debt: Fixed, price: Price) -> Result<Fixed, EngineError> {
        let icr = compute_cr(collateral, debt, price.value())?;
        let minimum = self.config.params.mcr();
        if icr < minimum {
            return Err(EngineError::IcrBelowMinimum { icr, minimum });
        }
        Ok(icr)
    }

    /// Run `op` as one all-or-nothing step.
    ///
    /// On error every piece of protocol state and every event staged by `op` is
    /// rolled back. Nested calls join the outermost operation.
    pub(super) fn atomically<T>(
        &mut self,
        op: impl FnOnce(&mut Self) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let checkpoint = self.state.begin();
        let next_event_id = self.next_event_id;
        let staged_mark = self.staged.len();
        let outermost = !self.in_operation;
        self.in_operation = true;

        let result = op(self);

        if outermost {
            self.in_operation = false;
        }

        match result {
            Ok(value) => {
                if outermost {
                    self.last_operation_writes = self.state.commit();
                    self.commit_events();
                }
                Ok(value)
            }
            Err(err) => {
                self.state.rollback(checkpoint);
                self.next_event_id = next_event_id;
                self.staged.truncate(staged_mark);
                if outermost {
                    self.last_operation_writes = self.state.commit();
                    if self.config.verbose {
                        println!("[Rejected] {} ({:?})", err, err.kind());
                    }
                }
                Err(err)
            }
        }
    }

    pub(super) fn emit_event(&mut self, payload: EventPayload) {
        let event = Event::new(EventId(self.next_event_id), self.current_time, payload);
        self.next_event_id += 1;
        self.staged.push(event);
    }

    fn commit_events(&mut self) {
        for event in self.staged.drain(..) {
            if self.config.verbose {
                println!("[Event {}] {:?}", event.id.0, event.payload);
            }
            self.events.push(event);
        }

        if self.events.len() > self.config.max_events {
            let drain_count = self.events.len() - self.config.max_events;
            self.events.drain(0..drain_count);
        }
    }
}
