//! Stability pool simulation.
//!
//! Walks the engine through borrowing, liquidation offsets, redistribution,
//! pool resets, reward kickbacks and redemptions.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use stability_core::*;

fn main() {
    println!("Stablecoin Stability Pool Simulation");
    println!("Troves, Stability Pool, Liquidations, Redemptions\n");

    scenario_1_borrowing();
    scenario_2_pool_offset();
    scenario_3_redistribution();
    scenario_4_epoch_reset();
    scenario_5_scale_step();
    scenario_6_front_end_kickbacks();
    scenario_7_redemption();
    scenario_8_stress_test();

    println!("\nAll simulations completed successfully.");
}

fn fx(value: Decimal) -> Fixed {
    Fixed::new(value).unwrap()
}

/// Engine at price 200 with one funded account per name.
fn setup(names: usize) -> (Engine, Vec<AccountId>) {
    let mut engine = Engine::new(EngineConfig::for_environment(Environment::Testnet).unwrap());
    engine.set_price(dec!(200)).unwrap();
    let mut accounts = Vec::new();
    for _ in 0..names {
        let id = engine.create_account();
        engine.fund_account(id, Asset::Collateral, Fixed::from(1_000)).unwrap();
        accounts.push(id);
    }
    (engine, accounts)
}

/// Opening and adjusting a trove.
fn scenario_1_borrowing() {
    println!("Scenario 1: Borrowing\n");

    let (mut engine, accounts) = setup(1);
    let alice = accounts[0];

    let opened = engine.open_trove(alice, Fixed::from(20), Fixed::from(2_000)).unwrap();
    println!("  Alice locks 20 COLL and borrows 2,000 STBL at $200");
    println!("  Debt {} (fee {}, gas reserve {})", opened.debt, opened.borrowing_fee, engine.gas_pool());
    println!("  ICR {}", engine.icr(alice).unwrap());

    let adjusted = engine
        .adjust_trove(alice, TroveAdjustment::deposit(Fixed::from(10)))
        .unwrap();
    println!("  Alice adds 10 COLL: collateral {}, ICR {}", adjusted.collateral, engine.icr(alice).unwrap());

    let err = engine
        .adjust_trove(alice, TroveAdjustment::withdraw(Fixed::from(29)))
        .unwrap_err();
    println!("  Withdrawing 29 COLL is refused: {}\n", err);
}

/// The pool absorbs a liquidated trove's debt and earns its collateral.
fn scenario_2_pool_offset() {
    println!("Scenario 2: Liquidation Offset\n");

    let (mut engine, accounts) = setup(3);
    let (alice, bob, liquidator) = (accounts[0], accounts[1], accounts[2]);

    engine.open_trove(alice, Fixed::from(20), Fixed::from(2_000)).unwrap();
    engine.open_trove(bob, Fixed::from(60), Fixed::from(5_000)).unwrap();
    engine.provide_to_pool(bob, Fixed::from(5_000), FrontEndTag::Direct).unwrap();
    println!("  Bob deposits 5,000 STBL into the pool");

    engine.set_price(dec!(120)).unwrap();
    println!("  Price falls to $120, Alice's ICR is {}", engine.icr(alice).unwrap());

    let result = engine.liquidate(liquidator, alice).unwrap();
    println!(
        "  Liquidated: {} debt offset, {} COLL to the pool",
        result.split.debt_to_offset, result.split.collateral_to_pool
    );
    println!(
        "  Liquidator paid {} STBL and {} COLL",
        engine.balance(liquidator, Asset::Stable),
        engine.balance(liquidator, Asset::Collateral)
    );

    let view = engine.deposit_view(bob).unwrap();
    println!("  Bob's deposit {} -> {}, collateral gain {}\n", view.initial, view.current, view.collateral_gain);
}

/// With an empty pool the debt is spread over the other troves.
fn scenario_3_redistribution() {
    println!("Scenario 3: Redistribution\n");

    let (mut engine, accounts) = setup(4);
    let (alice, bob, carol, liquidator) = (accounts[0], accounts[1], accounts[2], accounts[3]);

    engine.open_trove(alice, Fixed::from(20), Fixed::from(2_000)).unwrap();
    engine.open_trove(bob, Fixed::from(40), Fixed::from(3_000)).unwrap();
    engine.open_trove(carol, Fixed::from(100), Fixed::from(2_000)).unwrap();

    engine.set_price(dec!(120)).unwrap();
    let result = engine.liquidate(liquidator, alice).unwrap();
    println!(
        "  Alice liquidated with an empty pool: {} debt and {} COLL redistributed",
        result.split.debt_to_redistribute, result.split.collateral_to_redistribute
    );

    for (name, owner) in [("Bob", bob), ("Carol", carol)] {
        let (coll, debt) = engine.pending_trove_rewards(owner).unwrap();
        println!("  {} pending: {} COLL, {} debt", name, coll, debt);
    }

    let rewards = engine.ledger().rewards();
    println!("  L_collateral {}, L_debt {}\n", rewards.l_collateral(), rewards.l_debt());
}

/// A liquidation that drains the pool starts a new epoch.
fn scenario_4_epoch_reset() {
    println!("Scenario 4: Epoch Reset\n");

    let (mut engine, accounts) = setup(4);
    let (alice, bob, carol, liquidator) = (accounts[0], accounts[1], accounts[2], accounts[3]);

    engine.open_trove(alice, Fixed::from(20), Fixed::from(2_000)).unwrap();
    engine.open_trove(bob, Fixed::from(40), Fixed::from(3_000)).unwrap();
    engine.open_trove(carol, Fixed::from(100), Fixed::from(2_000)).unwrap();
    engine.provide_to_pool(bob, Fixed::from(1_000), FrontEndTag::Direct).unwrap();

    engine.set_price(dec!(120)).unwrap();
    engine.liquidate(liquidator, alice).unwrap();

    let acc = engine.pool().accumulator();
    println!("  Pool of 1,000 wiped by a 2,210 debt");
    println!("  Epoch {}, scale {}, P {}", acc.current_epoch(), acc.current_scale(), acc.p());
    println!(
        "  Bob's compounded deposit {}, collateral gain {}",
        engine.compounded_deposit(bob).unwrap(),
        engine.depositor_collateral_gain(bob).unwrap()
    );

    engine.provide_to_pool(carol, Fixed::from(500), FrontEndTag::Direct).unwrap();
    println!("  Carol deposits 500 in the new epoch: {}\n", engine.compounded_deposit(carol).unwrap());
}

/// Offsets that leave P under 1e-9 shift it up a scale instead of losing precision.
fn scenario_5_scale_step() {
    println!("Scenario 5: Scale Step\n");

    let (mut engine, accounts) = setup(4);
    let (alice, bob, carol, liquidator) = (accounts[0], accounts[1], accounts[2], accounts[3]);

    engine.open_trove(alice, Fixed::from(20), Fixed::from(2_000)).unwrap();
    engine.open_trove(bob, Fixed::from(40), Fixed::from(3_000)).unwrap();
    engine.open_trove(carol, Fixed::from(100), Fixed::from(2_000)).unwrap();
    engine.provide_to_pool(bob, fx(dec!(2210.000001)), FrontEndTag::Direct).unwrap();

    engine.set_price(dec!(120)).unwrap();
    engine.liquidate(liquidator, alice).unwrap();

    let acc = engine.pool().accumulator();
    println!("  2,210 debt against 2,210.000001 of deposits");
    println!("  Epoch {}, scale {}, P {}", acc.current_epoch(), acc.current_scale(), acc.p());
    println!("  Bob keeps {}\n", engine.compounded_deposit(bob).unwrap());
}

/// Deposits tagged to a front end split their reward with it.
fn scenario_6_front_end_kickbacks() {
    println!("Scenario 6: Front End Kickbacks\n");

    let (mut engine, accounts) = setup(3);
    let (alice, bob, front_end) = (accounts[0], accounts[1], accounts[2]);

    engine.register_front_end(front_end, dec!(0.9)).unwrap();
    engine.open_trove(alice, Fixed::from(40), Fixed::from(4_000)).unwrap();
    engine.open_trove(bob, Fixed::from(40), Fixed::from(4_000)).unwrap();
    engine
        .provide_to_pool(alice, Fixed::from(4_000), FrontEndTag::ViaFrontEnd(front_end))
        .unwrap();
    engine.provide_to_pool(bob, Fixed::from(4_000), FrontEndTag::Direct).unwrap();
    println!("  Front end registered with a 90% kickback");
    println!("  Alice deposits through it, Bob deposits directly");

    engine.advance_time(7 * 24 * 60 * 60 * 1000);
    for who in [alice, bob] {
        engine.withdraw_from_pool(who, Fixed::ZERO).unwrap();
    }

    println!("  At {}, {} RWD issued", engine.time(), engine.pool().issuance().total_issued());
    println!("  Alice {} RWD", engine.balance(alice, Asset::Reward));
    println!("  Bob {} RWD", engine.balance(bob, Asset::Reward));
    println!("  Front end {} RWD\n", engine.balance(front_end, Asset::Reward));
}

/// Stable is swapped for collateral from the riskiest troves.
fn scenario_7_redemption() {
    println!("Scenario 7: Redemption\n");

    let (mut engine, accounts) = setup(3);
    let (alice, bob, carol) = (accounts[0], accounts[1], accounts[2]);

    engine.open_trove(alice, Fixed::from(30), Fixed::from(3_000)).unwrap();
    engine.open_trove(bob, Fixed::from(60), Fixed::from(5_000)).unwrap();
    engine.open_trove(carol, Fixed::from(100), Fixed::from(2_000)).unwrap();

    let result = engine.redeem_collateral(bob, Fixed::from(4_000), 0).unwrap();
    println!("  Bob redeems {} STBL", result.redeemed);
    println!(
        "  {} troves touched, {} closed, {} COLL drawn, fee {}",
        result.troves_touched.len(),
        result.troves_closed.len(),
        result.collateral_drawn,
        result.fee
    );

    let surplus = engine.collateral_surplus(alice);
    println!("  Alice's trove was closed, surplus {}", surplus);
    let claimed = engine.claim_collateral_surplus(alice).unwrap();
    println!("  Alice claims {} COLL\n", claimed);
}

/// Many troves and depositors through a volatile price path.
fn scenario_8_stress_test() {
    println!("Scenario 8: Stress Test\n");

    let num_borrowers = 30;
    let (mut engine, borrowers) = setup(num_borrowers);
    let liquidator = engine.create_account();

    let mut opened = 0;
    for (i, &borrower) in borrowers.iter().enumerate() {
        let collateral = Fixed::from(15 + (i as u64 % 10) * 3);
        let borrow = Fixed::from(2_000 + (i as u64 % 7) * 150);
        if engine.open_trove(borrower, collateral, borrow).is_ok() {
            opened += 1;
        }
        if i % 2 == 0 {
            let _ = engine.provide_to_pool(borrower, Fixed::from(1_500), FrontEndTag::Direct);
        }
    }
    println!("  {} troves opened, pool holds {}", opened, engine.pool().total_deposits());

    let prices = [
        dec!(190), dec!(175), dec!(160), dec!(170), dec!(150),
        dec!(140), dec!(145), dec!(130), dec!(135), dec!(125),
    ];

    let mut total_liquidated = 0;
    let mut total_offset = Fixed::ZERO;
    let mut total_redistributed = Fixed::ZERO;
    for price in prices {
        engine.set_price(price).unwrap();
        engine.advance_time(60 * 60 * 1000);
        if let Ok(batch) = engine.liquidate_troves(liquidator, 100) {
            total_liquidated += batch.liquidated.len();
            total_offset = total_offset.checked_add(batch.total_debt_offset).unwrap();
            total_redistributed = total_redistributed.checked_add(batch.total_debt_redistributed).unwrap();
        }
    }

    println!("  Price range: $125 to $190");
    println!("  Troves liquidated: {}", total_liquidated);
    println!("  Debt offset {}, redistributed {}", total_offset, total_redistributed);
    println!("  Active troves: {}/{}", engine.ledger().active_count(), opened);
    println!(
        "  Stable supply {} vs total debt {}",
        engine.custody().total_supply(Asset::Stable),
        engine.ledger().total_debt().unwrap()
    );
    println!("  TCR {}", engine.tcr().unwrap());
    println!("  Events generated: {}\n", engine.events().len());
}
