// 8.7 engine/liquidations.rs: liquidation coordinator.
// walks a trove through Evaluate -> OffsetAgainstPool -> RedistributeRemainder -> ClosePosition.
// the coordinator is the only caller the pool and ledger accept for offset and redistribution.

use super::core::Engine;
use super::results::{BatchLiquidationResult, EngineError, LiquidationResult};
use crate::events::{
    EpochUpdatedEvent, EventPayload, PoolOffsetEvent, RedistributionEvent, RewardIssuedEvent, ScaleUpdatedEvent,
    SystemSnapshotsUpdatedEvent, TroveLiquidatedEvent, TroveOperation, TroveUpdatedEvent,
};
use crate::liquidation::{evaluate_liquidation, gas_compensation, split_liquidation, LiquidationSplit, LiquidationStage};
use crate::math::Fixed;
use crate::trove::TroveStatus;
use crate::types::{AccountId, Asset, Caller, Price};

impl BatchLiquidationResult {
    fn record(&mut self, result: LiquidationResult) -> Result<(), EngineError> {
        let split = &result.split;
        self.total_debt_offset = self.total_debt_offset.checked_add(split.debt_to_offset)?;
        self.total_debt_redistributed = self.total_debt_redistributed.checked_add(split.debt_to_redistribute)?;
        self.total_collateral_gas_compensation = self
            .total_collateral_gas_compensation
            .checked_add(split.gas_compensation.collateral)?;
        self.total_stable_gas_compensation = self
            .total_stable_gas_compensation
            .checked_add(split.gas_compensation.stable)?;
        self.liquidated.push(result);
        Ok(())
    }
}

impl Engine {
    /// Liquidate one trove below MCR. The liquidator receives the gas compensation.
    pub fn liquidate(&mut self, liquidator: AccountId, owner: AccountId) -> Result<LiquidationResult, EngineError> {
        self.atomically(|engine| {
            let price = engine.fetch_price()?;
            engine.liquidate_one(liquidator, owner, price)
        })
    }

    /// Liquidate every listed trove that is open and below MCR. Others are skipped.
    pub fn batch_liquidate(
        &mut self,
        liquidator: AccountId,
        owners: &[AccountId],
    ) -> Result<BatchLiquidationResult, EngineError> {
        self.atomically(|engine| {
            let price = engine.fetch_price()?;
            let mcr = engine.config.params.mcr();
            let mut batch = BatchLiquidationResult::default();

            for &owner in owners {
                if engine.state.ledger.active_count() <= 1 {
                    break;
                }
                let Ok(position) = engine.state.ledger.entire_position(owner) else {
                    continue;
                };
                if !evaluate_liquidation(&position, price, mcr)?.is_liquidatable() {
                    continue;
                }
                let result = engine.liquidate_one(liquidator, owner, price)?;
                batch.record(result)?;
            }

            if batch.liquidated.is_empty() {
                return Err(EngineError::NothingToLiquidate);
            }
            Ok(batch)
        })
    }

    /// Liquidate up to `max` troves, lowest ICR first, stopping at the first safe one.
    pub fn liquidate_troves(&mut self, liquidator: AccountId, max: usize) -> Result<BatchLiquidationResult, EngineError> {
        self.atomically(|engine| {
            let price = engine.fetch_price()?;
            let mcr = engine.config.params.mcr();
            let mut batch = BatchLiquidationResult::default();

            while batch.liquidated.len() < max && engine.state.ledger.active_count() > 1 {
                match engine.state.ledger.lowest_icr(price)? {
                    Some((owner, icr)) if icr < mcr => {
                        let result = engine.liquidate_one(liquidator, owner, price)?;
                        batch.record(result)?;
                    }
                    _ => break,
                }
            }

            if batch.liquidated.is_empty() {
                return Err(EngineError::NothingToLiquidate);
            }
            Ok(batch)
        })
    }

    fn liquidate_one(
        &mut self,
        liquidator: AccountId,
        owner: AccountId,
        price: Price,
    ) -> Result<LiquidationResult, EngineError> {
        let params = &self.config.params;
        let (mcr, divisor, stable_gas) = (
            params.mcr(),
            params.collateral_gas_divisor(),
            params.stable_gas_compensation(),
        );

        let position = self.state.ledger.entire_position(owner)?;
        let status = evaluate_liquidation(&position, price, mcr)?;
        if !status.is_liquidatable() {
            return Err(EngineError::NotLiquidatable(owner));
        }
        if self.state.ledger.active_count() <= 1 {
            return Err(EngineError::OnlyOneTrove);
        }

        let position = self.state.ledger.apply_pending_rewards(owner)?;
        self.state.ledger.remove_stake(owner)?;
        let gas = gas_compensation(position.collateral, divisor, stable_gas)?;
        let split = split_liquidation(&position, self.state.pool.total_deposits(), gas)?;

        let mut stage = LiquidationStage::Evaluate.next(&split);
        while stage != LiquidationStage::Done {
            match stage {
                LiquidationStage::OffsetAgainstPool => self.offset_against_pool(&split)?,
                LiquidationStage::RedistributeRemainder => self.redistribute_remainder(&split)?,
                LiquidationStage::ClosePosition => self.close_liquidated(owner)?,
                LiquidationStage::Evaluate | LiquidationStage::Done => {}
            }
            stage = stage.next(&split);
        }

        // 8.7.1: pay the liquidator out of the gas pool and the trove's collateral
        self.state.gas_pool = self.state.gas_pool.checked_sub(gas.stable)?;
        self.state.custody.credit(liquidator, Asset::Stable, gas.stable)?;
        self.state.custody.credit(liquidator, Asset::Collateral, gas.collateral)?;

        self.emit_event(EventPayload::TroveLiquidated(TroveLiquidatedEvent {
            owner,
            liquidator,
            debt: split.entire_debt,
            collateral: split.entire_collateral,
            debt_offset: split.debt_to_offset,
            collateral_to_pool: split.collateral_to_pool,
            debt_redistributed: split.debt_to_redistribute,
            collateral_redistributed: split.collateral_to_redistribute,
            collateral_gas_compensation: gas.collateral,
            stable_gas_compensation: gas.stable,
        }));

        Ok(LiquidationResult {
            owner,
            icr: status.icr(),
            split,
        })
    }

    fn offset_against_pool(&mut self, split: &LiquidationSplit) -> Result<(), EngineError> {
        let now = self.current_time;
        let outcome = self.state.pool.offset(
            Caller::LiquidationCoordinator,
            split.debt_to_offset,
            split.collateral_to_pool,
            now,
        )?;
        self.state.custody.burn_held(Asset::Stable, outcome.debt_absorbed)?;

        if !outcome.issued.is_zero() {
            let total_issued = self.state.pool.issuance().total_issued();
            self.emit_event(EventPayload::RewardIssued(RewardIssuedEvent {
                amount: outcome.issued,
                total_issued,
            }));
        }

        if let Some(update) = outcome.update {
            self.emit_event(EventPayload::PoolOffset(PoolOffsetEvent {
                debt: outcome.debt_absorbed,
                collateral: outcome.collateral_added,
                p: update.p,
                sum: update.sum,
                total_deposits: self.state.pool.total_deposits(),
            }));
            if update.epoch_changed {
                self.emit_event(EventPayload::EpochUpdated(EpochUpdatedEvent { epoch: update.epoch }));
            }
            if update.scale_changed || update.epoch_changed {
                self.emit_event(EventPayload::ScaleUpdated(ScaleUpdatedEvent { scale: update.scale }));
            }
        }
        Ok(())
    }

    fn redistribute_remainder(&mut self, split: &LiquidationSplit) -> Result<(), EngineError> {
        let totals = self.state.ledger.redistribute(
            Caller::LiquidationCoordinator,
            split.debt_to_redistribute,
            split.collateral_to_redistribute,
        )?;
        if let Some(totals) = totals {
            self.emit_event(EventPayload::Redistribution(RedistributionEvent {
                debt: split.debt_to_redistribute,
                collateral: split.collateral_to_redistribute,
                l_collateral: totals.collateral,
                l_debt: totals.debt,
            }));
        }
        Ok(())
    }

    fn close_liquidated(&mut self, owner: AccountId) -> Result<(), EngineError> {
        self.state.ledger.close(owner, TroveStatus::ClosedByLiquidation)?;
        let (total_stakes, total_collateral) = self.state.ledger.update_system_snapshots()?;

        self.emit_event(EventPayload::TroveUpdated(TroveUpdatedEvent {
            owner,
            collateral: Fixed::ZERO,
            debt: Fixed::ZERO,
            stake: Fixed::ZERO,
            operation: TroveOperation::Liquidate,
        }));
        self.emit_event(EventPayload::SystemSnapshotsUpdated(SystemSnapshotsUpdatedEvent {
            total_stakes,
            total_collateral,
        }));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::{Engine, EngineConfig, ErrorKind};
    use crate::events::EventPayload;
    use crate::math::Fixed;
    use crate::trove::TroveStatus;
    use crate::types::{AccountId, Asset, FrontEndTag};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    struct World {
        engine: Engine,
        alice: AccountId,
        bob: AccountId,
        carol: AccountId,
        dave: AccountId,
    }

    // alice is the risky trove: 20 collateral against 2210 debt
    fn world() -> World {
        let mut engine = Engine::new(EngineConfig::default());
        engine.set_price(dec!(200)).unwrap();
        let alice = engine.create_account();
        let bob = engine.create_account();
        let carol = engine.create_account();
        let dave = engine.create_account();
        for who in [alice, bob, carol] {
            engine.fund_account(who, Asset::Collateral, Fixed::from(200)).unwrap();
        }
        engine.open_trove(alice, Fixed::from(20), Fixed::from(2_000)).unwrap();
        engine.open_trove(bob, Fixed::from(40), Fixed::from(3_000)).unwrap();
        engine.open_trove(carol, Fixed::from(100), Fixed::from(2_000)).unwrap();
        World {
            engine,
            alice,
            bob,
            carol,
            dave,
        }
    }

    fn close_to(actual: Fixed, expected: Decimal) -> bool {
        (actual.value() - expected).abs() < dec!(0.000000001)
    }

    fn assert_supply_matches_debt(engine: &Engine) {
        assert_eq!(
            engine.custody().total_supply(Asset::Stable),
            engine.ledger().total_debt().unwrap()
        );
    }

    #[test]
    fn pool_absorbs_whole_debt() {
        let World { mut engine, alice, bob, dave, .. } = world();
        engine.provide_to_pool(bob, Fixed::from(3_000), FrontEndTag::Direct).unwrap();
        engine.set_price(dec!(120)).unwrap();

        let result = engine.liquidate(dave, alice).unwrap();
        assert_eq!(result.split.debt_to_offset, Fixed::from(2_210));
        assert_eq!(result.split.collateral_to_pool, Fixed::new(dec!(19.9)).unwrap());
        assert!(result.split.debt_to_redistribute.is_zero());

        assert_eq!(engine.ledger().status(alice), TroveStatus::ClosedByLiquidation);
        assert_eq!(engine.balance(dave, Asset::Stable), Fixed::from(200));
        assert_eq!(engine.balance(dave, Asset::Collateral), Fixed::new(dec!(0.1)).unwrap());
        assert_eq!(engine.pool().total_deposits(), Fixed::from(790));
        assert!(close_to(engine.compounded_deposit(bob).unwrap(), dec!(790)));
        assert!(close_to(engine.depositor_collateral_gain(bob).unwrap(), dec!(19.9)));
        assert_supply_matches_debt(&engine);
    }

    #[test]
    fn empty_pool_redistributes_everything() {
        let World { mut engine, alice, bob, carol, dave } = world();
        engine.set_price(dec!(120)).unwrap();

        let result = engine.liquidate(dave, alice).unwrap();
        assert!(result.split.debt_to_offset.is_zero());
        assert_eq!(result.split.debt_to_redistribute, Fixed::from(2_210));

        // alice's stake is gone, so bob (40) and carol (100) share it
        let (coll, debt) = engine.pending_trove_rewards(bob).unwrap();
        assert!(close_to(coll, dec!(19.9) * dec!(40) / dec!(140)));
        assert!(close_to(debt, dec!(2210) * dec!(40) / dec!(140)));
        let (coll, _) = engine.pending_trove_rewards(carol).unwrap();
        assert!(close_to(coll, dec!(19.9) * dec!(100) / dec!(140)));

        assert!(engine
            .events()
            .iter()
            .any(|e| matches!(e.payload, EventPayload::Redistribution(_))));
        assert_supply_matches_debt(&engine);
    }

    #[test]
    fn partial_offset_then_redistribution() {
        let World { mut engine, alice, bob, dave, .. } = world();
        engine.provide_to_pool(bob, Fixed::from(1_000), FrontEndTag::Direct).unwrap();
        engine.set_price(dec!(120)).unwrap();

        let result = engine.liquidate(dave, alice).unwrap();
        let split = result.split;
        assert_eq!(split.debt_to_offset, Fixed::from(1_000));
        assert_eq!(split.debt_to_redistribute, Fixed::from(1_210));
        assert_eq!(
            split.collateral_to_pool.checked_add(split.collateral_to_redistribute).unwrap(),
            Fixed::new(dec!(19.9)).unwrap()
        );
        assert!(engine.pool().total_deposits().is_zero());
        assert_eq!(engine.pool().accumulator().current_epoch(), 1);
        assert_supply_matches_debt(&engine);
    }

    #[test]
    fn refuses_safe_missing_and_last_troves() {
        let World { mut engine, alice, bob, carol, dave } = world();
        assert_eq!(engine.liquidate(dave, bob).unwrap_err().kind(), ErrorKind::NotLiquidatable);
        assert_eq!(engine.liquidate(dave, dave).unwrap_err().kind(), ErrorKind::NoPosition);

        // at 20 everyone is under water
        engine.set_price(dec!(20)).unwrap();
        engine.liquidate(dave, alice).unwrap();
        engine.liquidate(dave, bob).unwrap();
        let err = engine.liquidate(dave, carol).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LastTrove);
        assert!(engine.ledger().is_active(carol));
    }

    #[test]
    fn batch_skips_safe_troves() {
        let World { mut engine, alice, bob, carol, dave } = world();
        engine.set_price(dec!(120)).unwrap();

        let batch = engine.batch_liquidate(dave, &[alice, bob, carol, dave]).unwrap();
        assert_eq!(batch.liquidated.len(), 1);
        assert_eq!(batch.liquidated[0].owner, alice);
        assert_eq!(batch.total_stable_gas_compensation, Fixed::from(200));

        let err = engine.batch_liquidate(dave, &[bob, carol]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotLiquidatable);
    }

    #[test]
    fn liquidate_troves_stops_at_first_safe() {
        let World { mut engine, alice, bob, carol, dave } = world();
        // alice 0.90, bob 1.24, carol 4.52
        engine.set_price(dec!(100)).unwrap();

        let batch = engine.liquidate_troves(dave, 10).unwrap();
        assert_eq!(batch.liquidated.len(), 1);
        assert_eq!(batch.liquidated[0].owner, alice);
        assert!(engine.ledger().is_active(bob));
        assert!(engine.ledger().is_active(carol));

        let err = engine.liquidate_troves(dave, 10).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotLiquidatable);

        // at 20 both remaining troves are under water, but the last one survives
        engine.set_price(dec!(20)).unwrap();
        let batch = engine.liquidate_troves(dave, 10).unwrap();
        assert_eq!(batch.liquidated.len(), 1);
        assert_eq!(engine.ledger().active_count(), 1);
    }

    #[test]
    fn rejected_gas_payout_undoes_liquidation() {
        let World { mut engine, alice, bob, dave, .. } = world();
        engine.provide_to_pool(bob, Fixed::from(3_000), FrontEndTag::Direct).unwrap();
        engine.set_price(dec!(120)).unwrap();
        engine.set_rejecting(dave, Asset::Collateral, true);

        let err = engine.liquidate(dave, alice).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExternalTransferFailed);
        assert!(engine.ledger().is_active(alice));
        assert_eq!(engine.pool().total_deposits(), Fixed::from(3_000));
        assert_eq!(engine.pool().accumulator().p(), Fixed::ONE);
        assert_eq!(engine.ledger().total_stakes(), Fixed::from(160));
        assert_eq!(engine.gas_pool(), Fixed::from(600));
    }
}
