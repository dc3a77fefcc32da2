//! Property-based tests for the fixed-point math and the accumulators.
//!
//! These tests verify invariants hold under random inputs.

use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use stability_core::*;

fn fx(value: Decimal) -> Fixed {
    Fixed::new(value).unwrap()
}

// Strategies for generating test data
fn amount_strategy() -> impl Strategy<Value = Fixed> {
    (1i64..1_000_000_000i64).prop_map(|x| fx(Decimal::new(x, 3))) // 0.001 to 1,000,000
}

fn price_strategy() -> impl Strategy<Value = Price> {
    (1i64..1_000_000i64).prop_map(|x| Price::new_unchecked(Decimal::new(x, 2))) // $0.01 to $10,000
}

fn fraction_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..=500i64).prop_map(|x| Decimal::new(x, 3)) // 0.1% to 50%
}

proptest! {
    /// mul_div rounds down and mul_div_ceil rounds up, one unit apart at most
    #[test]
    fn mul_div_rounding_brackets_exact(
        a in amount_strategy(),
        b in amount_strategy(),
        c in amount_strategy(),
    ) {
        let down = a.mul_div(b, c).unwrap();
        let up = a.mul_div_ceil(b, c).unwrap();
        prop_assert!(down <= up);
        prop_assert!(up.value() - down.value() <= dec!(0.000000000000000001));
    }

    /// Subtraction never goes negative
    #[test]
    fn checked_sub_rejects_underflow(a in amount_strategy(), b in amount_strategy()) {
        let result = a.checked_sub(b);
        if a >= b {
            prop_assert_eq!(result.unwrap().checked_add(b).unwrap(), a);
        } else {
            prop_assert!(result.is_err());
            prop_assert_eq!(a.saturating_sub(b), Fixed::ZERO);
        }
    }

    /// Collateral ratio grows with price
    #[test]
    fn collateral_ratio_monotone_in_price(
        collateral in amount_strategy(),
        debt in amount_strategy(),
        low in price_strategy(),
        high in price_strategy(),
    ) {
        let (low, high) = if low.value() <= high.value() { (low, high) } else { (high, low) };
        let cr_low = compute_cr(collateral, debt, low.value()).unwrap();
        let cr_high = compute_cr(collateral, debt, high.value()).unwrap();
        prop_assert!(cr_low <= cr_high);
    }

    /// A deposit taken before a run of offsets compounds to what an eager pool keeps
    #[test]
    fn compounded_tracks_pool_total(
        initial in 1_000i64..10_000_000i64,
        losses in proptest::collection::vec(fraction_strategy(), 1..8),
    ) {
        let mut acc = PoolAccumulator::new();
        let snapshot = acc.stake_snapshot();
        let initial = Fixed::from(initial as u64);
        let mut total = initial;

        for fraction in losses {
            let loss = fx(total.value() * fraction);
            if loss.is_zero() {
                continue;
            }
            acc.apply_offset(loss, Fixed::ZERO, total).unwrap();
            total = total.checked_sub(loss).unwrap();
        }

        let compounded = acc.compounded(initial, &snapshot).unwrap();
        prop_assert!(compounded <= initial);
        let diff = (compounded.value() - total.value()).abs();
        prop_assert!(diff <= total.value() * dec!(0.000000000001) + dec!(0.000000000001),
            "compounded {} vs pool {}", compounded, total);
    }

    /// Depositors never earn more collateral than the offsets brought in
    #[test]
    fn collateral_gains_never_exceed_inflow(
        deposits in proptest::collection::vec(1u64..1_000_000u64, 1..10),
        offsets in proptest::collection::vec((fraction_strategy(), 1u64..10_000u64), 1..6),
    ) {
        let mut acc = PoolAccumulator::new();
        let snapshot = acc.deposit_snapshot();
        let mut total = Fixed::from(deposits.iter().sum::<u64>());
        let mut inflow = Fixed::ZERO;

        for (fraction, collateral) in offsets {
            let loss = fx(total.value() * fraction);
            if loss.is_zero() {
                continue;
            }
            let collateral = Fixed::from(collateral);
            acc.apply_offset(loss, collateral, total).unwrap();
            total = total.checked_sub(loss).unwrap();
            inflow = inflow.checked_add(collateral).unwrap();
        }

        let mut paid = Fixed::ZERO;
        for deposit in &deposits {
            paid = paid.checked_add(acc.collateral_gain(Fixed::from(*deposit), &snapshot).unwrap()).unwrap();
        }
        prop_assert!(paid <= inflow, "paid {} of {}", paid, inflow);
        prop_assert!(inflow.value() - paid.value() < dec!(0.000001));
    }

    /// Redistribution hands out no more than it was given
    #[test]
    fn redistribution_conserves_debt(
        stakes in proptest::collection::vec(1u64..100_000u64, 1..20),
        debt in amount_strategy(),
        collateral in amount_strategy(),
    ) {
        let mut rewards = RedistributionAccumulator::new();
        let snapshot = rewards.snapshot();
        let total_stakes = Fixed::from(stakes.iter().sum::<u64>());
        rewards.distribute(collateral, debt, total_stakes).unwrap();

        let mut pending_collateral = Fixed::ZERO;
        let mut pending_debt = Fixed::ZERO;
        for stake in &stakes {
            let (coll, owed) = rewards.pending(Fixed::from(*stake), &snapshot).unwrap();
            pending_collateral = pending_collateral.checked_add(coll).unwrap();
            pending_debt = pending_debt.checked_add(owed).unwrap();
        }

        prop_assert!(pending_debt <= debt);
        prop_assert!(pending_collateral <= collateral);
        prop_assert!(debt.value() - pending_debt.value() < dec!(0.000000001));
        prop_assert!(collateral.value() - pending_collateral.value() < dec!(0.000000001));
    }

    /// Issuance only grows, never passes the cap, and each trigger pays the delta
    #[test]
    fn issuance_monotone_and_capped(
        mut minutes in proptest::collection::vec(0i64..5_000_000i64, 1..10),
    ) {
        minutes.sort();
        let cap = Fixed::from(32_000_000);
        let mut issuance = CommunityIssuance::new(cap, fx(dec!(0.999998681227695)), Timestamp::from_millis(0));

        let mut paid = Fixed::ZERO;
        let mut last_total = Fixed::ZERO;
        for minute in minutes {
            let issued = issuance.issue(Timestamp::from_millis(minute * 60_000)).unwrap();
            paid = paid.checked_add(issued).unwrap();
            prop_assert!(issuance.total_issued() >= last_total);
            prop_assert!(issuance.total_issued() <= cap);
            last_total = issuance.total_issued();
        }
        prop_assert_eq!(paid, issuance.total_issued());
    }

    /// The deposit view picks the change that lands exactly on the target
    #[test]
    fn deposit_view_reaches_target(current in 0u64..1_000_000u64, target in 0u64..1_000_000u64) {
        let view = StabilityDeposit {
            initial: Fixed::from(current),
            current: Fixed::from(current),
            ..Default::default()
        };
        let change = view.what_changed(Fixed::from(target));
        prop_assert_eq!(change.is_none(), current == target);
        prop_assert_eq!(view.apply(change), Ok(Fixed::from(target)));
    }
}
