//! Solvency invariant tests.
//!
//! These tests drive the engine through random operation sequences and verify the
//! token balances held by the protocol always match what its books say it owes.

use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use stability_core::*;

const ACCOUNTS: usize = 6;

fn fx(value: Decimal) -> Fixed {
    Fixed::new(value).unwrap()
}

#[derive(Debug, Clone)]
enum Op {
    Open { who: usize, collateral: u64, borrow: u64 },
    Provide { who: usize, amount: u64 },
    Withdraw { who: usize, amount: u64 },
    SetPrice(i64),
    Liquidate { who: usize },
    Redeem { who: usize, amount: u64 },
    Deposit { who: usize, amount: u64 },
    Borrow { who: usize, amount: u64 },
    Repay { who: usize, amount: u64 },
    Close { who: usize },
    GainToTrove { who: usize },
    ClaimSurplus { who: usize },
    Advance { minutes: i64 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let who = 0..ACCOUNTS;
    prop_oneof![
        3 => (who.clone(), 12u64..60, 1_800u64..6_000).prop_map(|(who, collateral, borrow)| Op::Open { who, collateral, borrow }),
        3 => (who.clone(), 100u64..4_000).prop_map(|(who, amount)| Op::Provide { who, amount }),
        2 => (who.clone(), 0u64..3_000).prop_map(|(who, amount)| Op::Withdraw { who, amount }),
        3 => (80i64..300).prop_map(Op::SetPrice),
        2 => who.clone().prop_map(|who| Op::Liquidate { who }),
        1 => (who.clone(), 50u64..3_000).prop_map(|(who, amount)| Op::Redeem { who, amount }),
        1 => (who.clone(), 1u64..20).prop_map(|(who, amount)| Op::Deposit { who, amount }),
        1 => (who.clone(), 10u64..1_000).prop_map(|(who, amount)| Op::Borrow { who, amount }),
        1 => (who.clone(), 10u64..1_000).prop_map(|(who, amount)| Op::Repay { who, amount }),
        1 => who.clone().prop_map(|who| Op::Close { who }),
        1 => who.clone().prop_map(|who| Op::GainToTrove { who }),
        1 => who.clone().prop_map(|who| Op::ClaimSurplus { who }),
        1 => (1i64..600).prop_map(|minutes| Op::Advance { minutes }),
    ]
}

fn setup() -> (Engine, Vec<AccountId>) {
    let mut engine = Engine::new(EngineConfig::default());
    engine.set_price(dec!(200)).unwrap();
    let accounts: Vec<AccountId> = (0..ACCOUNTS).map(|_| engine.create_account()).collect();
    for &who in &accounts {
        engine.fund_account(who, Asset::Collateral, Fixed::from(1_000)).unwrap();
    }
    (engine, accounts)
}

fn apply(engine: &mut Engine, accounts: &[AccountId], op: &Op) -> Result<(), EngineError> {
    match *op {
        Op::Open { who, collateral, borrow } => engine
            .open_trove(accounts[who], Fixed::from(collateral), Fixed::from(borrow))
            .map(|_| ()),
        Op::Provide { who, amount } => engine
            .provide_to_pool(accounts[who], Fixed::from(amount), FrontEndTag::Direct)
            .map(|_| ()),
        Op::Withdraw { who, amount } => engine.withdraw_from_pool(accounts[who], Fixed::from(amount)).map(|_| ()),
        Op::SetPrice(price) => engine.set_price(Decimal::from(price)).map(|_| ()),
        Op::Liquidate { who } => engine.liquidate_troves(accounts[who], 10).map(|_| ()),
        Op::Redeem { who, amount } => engine.redeem_collateral(accounts[who], Fixed::from(amount), 0).map(|_| ()),
        Op::Deposit { who, amount } => engine
            .adjust_trove(accounts[who], TroveAdjustment::deposit(Fixed::from(amount)))
            .map(|_| ()),
        Op::Borrow { who, amount } => engine
            .adjust_trove(accounts[who], TroveAdjustment::borrow(Fixed::from(amount)))
            .map(|_| ()),
        Op::Repay { who, amount } => engine
            .adjust_trove(accounts[who], TroveAdjustment::repay(Fixed::from(amount)))
            .map(|_| ()),
        Op::Close { who } => engine.close_trove(accounts[who]).map(|_| ()),
        Op::GainToTrove { who } => engine.withdraw_gain_to_trove(accounts[who]).map(|_| ()),
        Op::ClaimSurplus { who } => engine.claim_collateral_surplus(accounts[who]).map(|_| ()),
        Op::Advance { minutes } => {
            engine.advance_time(minutes * 60_000);
            Ok(())
        }
    }
}

/// Everything an operation could move, for checking that a failed one moved nothing.
#[derive(Debug, PartialEq)]
struct Books {
    events: usize,
    stable_supply: Fixed,
    collateral_held: Fixed,
    stable_held: Fixed,
    total_debt: Fixed,
    total_collateral: Fixed,
    pool_deposits: Fixed,
    pool_collateral: Fixed,
    gas_pool: Fixed,
    balances: Vec<(Fixed, Fixed)>,
}

fn books(engine: &Engine, accounts: &[AccountId]) -> Books {
    Books {
        events: engine.events().len(),
        stable_supply: engine.custody().total_supply(Asset::Stable),
        collateral_held: engine.custody().held(Asset::Collateral),
        stable_held: engine.custody().held(Asset::Stable),
        total_debt: engine.ledger().total_debt().unwrap(),
        total_collateral: engine.ledger().total_collateral().unwrap(),
        pool_deposits: engine.pool().total_deposits(),
        pool_collateral: engine.pool().collateral_balance(),
        gas_pool: engine.gas_pool(),
        balances: accounts
            .iter()
            .map(|&who| (engine.balance(who, Asset::Stable), engine.balance(who, Asset::Collateral)))
            .collect(),
    }
}

fn assert_solvent(engine: &Engine) -> Result<(), TestCaseError> {
    let tolerance = dec!(0.000000001);
    let fees = engine.fees();

    let supply = engine.custody().total_supply(Asset::Stable);
    let debt = engine.ledger().total_debt().unwrap();
    prop_assert_eq!(supply, debt, "stable supply {} vs debt {}", supply, debt);

    let stable_held = engine.custody().held(Asset::Stable).value();
    let stable_owed = engine.pool().total_deposits().value() + engine.gas_pool().value() + fees.stable.value();
    prop_assert!(
        (stable_held - stable_owed).abs() <= tolerance,
        "stable held {} vs owed {}",
        stable_held,
        stable_owed
    );

    let collateral_held = engine.custody().held(Asset::Collateral).value();
    let collateral_owed = engine.ledger().total_collateral().unwrap().value()
        + engine.pool().collateral_balance().value()
        + engine.total_collateral_surplus().value()
        + fees.collateral.value();
    prop_assert!(
        (collateral_held - collateral_owed).abs() <= tolerance,
        "collateral held {} vs owed {}",
        collateral_held,
        collateral_owed
    );
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every operation leaves the protocol's balances covering its books
    #[test]
    fn random_operations_stay_solvent(ops in proptest::collection::vec(op_strategy(), 1..60)) {
        let (mut engine, accounts) = setup();

        for op in &ops {
            let before = books(&engine, &accounts);
            if apply(&mut engine, &accounts, op).is_err() {
                prop_assert_eq!(&books(&engine, &accounts), &before, "failed {:?} moved state", op);
            }
            assert_solvent(&engine)?;
        }
    }

    /// Offsets and redistribution never create or destroy collateral
    #[test]
    fn liquidations_conserve_collateral(
        deposit in 0u64..12_000,
        crash in 100i64..150,
    ) {
        let (mut engine, accounts) = setup();
        let collateral_minted = Fixed::from(1_000 * ACCOUNTS as u64);

        engine.open_trove(accounts[0], Fixed::from(300), Fixed::from(10_000)).unwrap();
        engine.open_trove(accounts[1], Fixed::from(20), Fixed::from(2_000)).unwrap();
        engine.open_trove(accounts[2], Fixed::from(24), Fixed::from(3_000)).unwrap();
        if deposit > 0 {
            engine.provide_to_pool(accounts[0], Fixed::from(deposit.min(10_000)), FrontEndTag::Direct).unwrap();
        }

        engine.set_price(Decimal::from(crash)).unwrap();
        let _ = engine.liquidate_troves(accounts[5], 10);
        assert_solvent(&engine)?;

        // all collateral is either with an account or held by the protocol
        let with_accounts: Fixed = accounts.iter().map(|&who| engine.balance(who, Asset::Collateral)).sum();
        let total = with_accounts.checked_add(engine.custody().held(Asset::Collateral)).unwrap();
        prop_assert_eq!(total, collateral_minted);
    }
}

mod atomicity_tests {
    use super::*;

    #[test]
    fn rejected_gas_payout_leaves_no_trace() {
        let (mut engine, accounts) = setup();
        let (alice, bob, liquidator) = (accounts[0], accounts[1], accounts[2]);
        engine.open_trove(alice, Fixed::from(20), Fixed::from(2_000)).unwrap();
        engine.open_trove(bob, Fixed::from(100), Fixed::from(3_000)).unwrap();
        engine.provide_to_pool(bob, Fixed::from(3_000), FrontEndTag::Direct).unwrap();
        engine.set_price(dec!(100)).unwrap();

        engine.set_rejecting(liquidator, Asset::Stable, true);
        let before = books(&engine, &accounts);
        let epoch = engine.pool().accumulator().current_epoch();
        let err = engine.liquidate(liquidator, alice).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExternalTransferFailed);
        assert_eq!(books(&engine, &accounts), before);
        assert_eq!(engine.pool().accumulator().current_epoch(), epoch);
        assert!(engine.ledger().is_active(alice));

        engine.set_rejecting(liquidator, Asset::Stable, false);
        engine.liquidate(liquidator, alice).unwrap();
        assert!(!engine.ledger().is_active(alice));
        assert_eq!(engine.balance(liquidator, Asset::Stable), Fixed::from(200));
    }

    #[test]
    fn rejected_collateral_gain_keeps_deposit() {
        let (mut engine, accounts) = setup();
        let (alice, bob, liquidator) = (accounts[0], accounts[1], accounts[2]);
        engine.open_trove(alice, Fixed::from(20), Fixed::from(2_000)).unwrap();
        engine.open_trove(bob, Fixed::from(100), Fixed::from(3_000)).unwrap();
        engine.provide_to_pool(bob, Fixed::from(3_000), FrontEndTag::Direct).unwrap();
        engine.set_price(dec!(100)).unwrap();
        engine.liquidate(liquidator, alice).unwrap();
        engine.set_price(dec!(200)).unwrap();

        let compounded = engine.compounded_deposit(bob).unwrap();
        let gain = engine.depositor_collateral_gain(bob).unwrap();
        assert!(!gain.is_zero());

        engine.set_rejecting(bob, Asset::Collateral, true);
        let before = books(&engine, &accounts);
        let err = engine.withdraw_from_pool(bob, Fixed::from(100)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExternalTransferFailed);
        assert_eq!(books(&engine, &accounts), before);
        assert_eq!(engine.compounded_deposit(bob).unwrap(), compounded);
        assert_eq!(engine.depositor_collateral_gain(bob).unwrap(), gain);
    }

    #[test]
    fn failed_operations_emit_nothing() {
        let (mut engine, accounts) = setup();
        let alice = accounts[0];
        let events = engine.events().len();

        assert!(engine.open_trove(alice, Fixed::from(1), Fixed::from(2_000)).is_err());
        assert!(engine.provide_to_pool(alice, Fixed::from(10), FrontEndTag::Direct).is_err());
        assert!(engine.withdraw_from_pool(alice, Fixed::from(10)).is_err());
        assert!(engine.close_trove(alice).is_err());
        assert!(engine.liquidate_troves(alice, 10).is_err());
        assert_eq!(engine.events().len(), events);
    }

    #[test]
    fn stale_price_falls_back_to_last_good() {
        let (mut engine, accounts) = setup();
        engine.open_trove(accounts[0], Fixed::from(20), Fixed::from(2_000)).unwrap();
        engine.advance_time(5 * 60 * 60 * 1_000);

        assert_eq!(engine.price().unwrap().value(), Fixed::from(200));
        engine.open_trove(accounts[1], Fixed::from(20), Fixed::from(2_000)).unwrap();
        // 40 * 200 / 4420
        assert_eq!(engine.tcr().unwrap(), fx(dec!(1.809954751131221719)));
        assert_solvent(&engine).unwrap();
    }
}
