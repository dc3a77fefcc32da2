// 2.0: fixed-point arithmetic. every amount in the engine is a Fixed: a non-negative
// Decimal truncated to 18 places. all ops are checked, nothing wraps or goes negative.
// 2.1 PerUnit carries the S and G sums at full Decimal precision.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;

/// Decimal places kept by every [`Fixed`] amount.
pub const DECIMALS: u32 = 18;

/// Base used when the running product steps down a scale.
pub const SCALE_FACTOR: Decimal = dec!(1_000_000_000);

/// Precision floor for the running product. Below this P is rescaled.
pub const P_FLOOR: Decimal = dec!(0.000000001);

/// Exponent cap for [`Fixed::pow`]: 1000 years of minutes.
pub const MAX_POW_EXPONENT: u64 = 525_600_000;

fn truncate(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(DECIMALS, RoundingStrategy::ToZero)
}

fn round_up(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(DECIMALS, RoundingStrategy::AwayFromZero)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MathError {
    #[error("Arithmetic overflow")]
    Overflow,

    #[error("Arithmetic underflow: {minuend} - {subtrahend}")]
    Underflow { minuend: Fixed, subtrahend: Fixed },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Negative amount {0} is not representable")]
    Negative(Decimal),

    #[error("Running product reached zero")]
    ProductExhausted,
}

// 2.0.1: the amount type. 1 unit = Decimal::ONE, smallest step = 1e-18.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Fixed(Decimal);

impl Fixed {
    pub const ZERO: Fixed = Fixed(Decimal::ZERO);
    pub const ONE: Fixed = Fixed(Decimal::ONE);
    pub const MAX: Fixed = Fixed(Decimal::MAX);

    pub fn new(value: Decimal) -> Result<Self, MathError> {
        if value < Decimal::ZERO {
            return Err(MathError::Negative(value));
        }
        Ok(Self(truncate(value)))
    }

    pub fn new_unchecked(value: Decimal) -> Self {
        debug_assert!(value >= Decimal::ZERO);
        Self(truncate(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn checked_add(self, other: Fixed) -> Result<Fixed, MathError> {
        self.0
            .checked_add(other.0)
            .map(Fixed)
            .ok_or(MathError::Overflow)
    }

    pub fn checked_sub(self, other: Fixed) -> Result<Fixed, MathError> {
        if other.0 > self.0 {
            return Err(MathError::Underflow {
                minuend: self,
                subtrahend: other,
            });
        }
        Ok(Fixed(self.0 - other.0))
    }

    pub fn saturating_sub(self, other: Fixed) -> Fixed {
        if other.0 >= self.0 {
            Fixed::ZERO
        } else {
            Fixed(self.0 - other.0)
        }
    }

    /// Product truncated to 18 places.
    pub fn checked_mul(self, other: Fixed) -> Result<Fixed, MathError> {
        self.0
            .checked_mul(other.0)
            .map(|v| Fixed(truncate(v)))
            .ok_or(MathError::Overflow)
    }

    /// Quotient truncated to 18 places.
    pub fn checked_div(self, other: Fixed) -> Result<Fixed, MathError> {
        if other.is_zero() {
            return Err(MathError::DivisionByZero);
        }
        self.0
            .checked_div(other.0)
            .map(|v| Fixed(truncate(v)))
            .ok_or(MathError::Overflow)
    }

    /// `self * mul / div`, rounded down once at the end.
    pub fn mul_div(self, mul: Fixed, div: Fixed) -> Result<Fixed, MathError> {
        Ok(Fixed(truncate(self.raw_mul_div(mul, div)?)))
    }

    /// `self * mul / div`, rounded up once at the end.
    pub fn mul_div_ceil(self, mul: Fixed, div: Fixed) -> Result<Fixed, MathError> {
        Ok(Fixed(round_up(self.raw_mul_div(mul, div)?)))
    }

    fn raw_mul_div(self, mul: Fixed, div: Fixed) -> Result<Decimal, MathError> {
        if div.is_zero() {
            return Err(MathError::DivisionByZero);
        }
        let product = self.0.checked_mul(mul.0).ok_or(MathError::Overflow)?;
        product.checked_div(div.0).ok_or(MathError::Overflow)
    }

    /// Product rounded half up, the rounding used by the issuance curve.
    pub fn dec_mul(self, other: Fixed) -> Result<Fixed, MathError> {
        self.0
            .checked_mul(other.0)
            .map(|v| Fixed(v.round_dp_with_strategy(DECIMALS, RoundingStrategy::MidpointAwayFromZero)))
            .ok_or(MathError::Overflow)
    }

    /// `self^exponent` by repeated squaring. Exponent is capped at [`MAX_POW_EXPONENT`].
    pub fn pow(self, exponent: u64) -> Result<Fixed, MathError> {
        let mut n = exponent.min(MAX_POW_EXPONENT);
        if n == 0 {
            return Ok(Fixed::ONE);
        }

        let mut y = Fixed::ONE;
        let mut x = self;
        while n > 1 {
            if n % 2 == 0 {
                x = x.dec_mul(x)?;
                n /= 2;
            } else {
                y = x.dec_mul(y)?;
                x = x.dec_mul(x)?;
                n = (n - 1) / 2;
            }
        }
        x.dec_mul(y)
    }

    /// Multiply by [`SCALE_FACTOR`].
    pub fn scale_up(self) -> Result<Fixed, MathError> {
        self.0
            .checked_mul(SCALE_FACTOR)
            .map(|v| Fixed(truncate(v)))
            .ok_or(MathError::Overflow)
    }

    /// Divide by [`SCALE_FACTOR`].
    pub fn scale_down(self) -> Fixed {
        Fixed(truncate(self.0 / SCALE_FACTOR))
    }
}

impl From<u64> for Fixed {
    fn from(units: u64) -> Self {
        Fixed(Decimal::from(units))
    }
}

impl TryFrom<Decimal> for Fixed {
    type Error = MathError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Fixed::new(value)
    }
}

impl fmt::Display for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl Sum for Fixed {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Fixed::ZERO, |acc, x| Fixed(acc.0 + x.0))
    }
}

impl<'a> Sum<&'a Fixed> for Fixed {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.fold(Fixed::ZERO, |acc, x| Fixed(acc.0 + x.0))
    }
}

// 2.1: cumulative per-unit sum (S for collateral, G for reward). one increment is
// gain_per_unit * P, which needs more than 18 places once P has decayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct PerUnit(Decimal);

impl PerUnit {
    pub const ZERO: PerUnit = PerUnit(Decimal::ZERO);

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Marginal sum increment for a per-unit gain observed at product `p`.
    pub fn marginal(per_unit: Fixed, p: Fixed) -> Result<PerUnit, MathError> {
        per_unit
            .0
            .checked_mul(p.0)
            .map(PerUnit)
            .ok_or(MathError::Overflow)
    }

    pub fn checked_add(self, other: PerUnit) -> Result<PerUnit, MathError> {
        self.0
            .checked_add(other.0)
            .map(PerUnit)
            .ok_or(MathError::Overflow)
    }

    /// Growth since a snapshot. Sums only grow within an (epoch, scale) slot.
    pub fn since(self, snapshot: PerUnit) -> PerUnit {
        if snapshot.0 >= self.0 {
            PerUnit::ZERO
        } else {
            PerUnit(self.0 - snapshot.0)
        }
    }

    pub fn scale_down(self) -> PerUnit {
        PerUnit(self.0 / SCALE_FACTOR)
    }

    /// `stake * self / p_snapshot`, truncated to an amount.
    pub fn gain_for(self, stake: Fixed, p_snapshot: Fixed) -> Result<Fixed, MathError> {
        if p_snapshot.is_zero() {
            return Err(MathError::DivisionByZero);
        }
        let product = stake.0.checked_mul(self.0).ok_or(MathError::Overflow)?;
        let gain = product.checked_div(p_snapshot.0).ok_or(MathError::Overflow)?;
        Ok(Fixed(truncate(gain)))
    }
}

impl fmt::Display for PerUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

/// Collateral ratio `collateral * price / debt`. Unbounded when there is no debt.
pub fn compute_cr(collateral: Fixed, debt: Fixed, price: Fixed) -> Result<Fixed, MathError> {
    if debt.is_zero() {
        return Ok(Fixed::MAX);
    }
    collateral.mul_div(price, debt)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fx(value: Decimal) -> Fixed {
        Fixed::new(value).unwrap()
    }

    #[test]
    fn new_truncates_to_18_places() {
        let x = fx(dec!(1.0000000000000000019));
        assert_eq!(x.value(), dec!(1.000000000000000001));
        assert!(matches!(Fixed::new(dec!(-1)), Err(MathError::Negative(_))));
    }

    #[test]
    fn sub_rejects_underflow() {
        let result = Fixed::from(1).checked_sub(Fixed::from(2));
        assert!(matches!(result, Err(MathError::Underflow { .. })));
        assert_eq!(Fixed::from(1).saturating_sub(Fixed::from(2)), Fixed::ZERO);
    }

    #[test]
    fn div_by_zero() {
        assert_eq!(Fixed::ONE.checked_div(Fixed::ZERO), Err(MathError::DivisionByZero));
        assert_eq!(Fixed::ONE.mul_div(Fixed::ONE, Fixed::ZERO), Err(MathError::DivisionByZero));
    }

    #[test]
    fn mul_div_rounding_direction() {
        let one = Fixed::ONE;
        let three = Fixed::from(3);
        assert_eq!(one.mul_div(one, three).unwrap().value(), dec!(0.333333333333333333));
        assert_eq!(one.mul_div_ceil(one, three).unwrap().value(), dec!(0.333333333333333334));
    }

    #[test]
    fn overflow_is_reported() {
        assert_eq!(Fixed::MAX.checked_add(Fixed::ONE), Err(MathError::Overflow));
        assert_eq!(Fixed::MAX.checked_mul(Fixed::from(2)), Err(MathError::Overflow));
    }

    #[test]
    fn pow_matches_repeated_multiplication() {
        let base = fx(dec!(0.5));
        assert_eq!(base.pow(0).unwrap(), Fixed::ONE);
        assert_eq!(base.pow(1).unwrap(), base);
        assert_eq!(base.pow(10).unwrap().value(), dec!(0.0009765625));
        assert_eq!(Fixed::from(2).pow(20).unwrap(), Fixed::from(1_048_576));
    }

    #[test]
    fn pow_exponent_is_capped() {
        let base = fx(dec!(0.999999999));
        assert_eq!(
            base.pow(MAX_POW_EXPONENT).unwrap(),
            base.pow(MAX_POW_EXPONENT * 2).unwrap()
        );
    }

    #[test]
    fn scale_round_trip() {
        let p = fx(dec!(0.0000000005));
        assert_eq!(p.scale_up().unwrap().value(), dec!(0.5));
        assert_eq!(fx(dec!(0.5)).scale_down(), p);
    }

    #[test]
    fn per_unit_keeps_precision_below_18_places() {
        let per_unit = fx(dec!(0.000001));
        let p = fx(dec!(0.000000001));
        let s = PerUnit::marginal(per_unit, p).unwrap();
        assert_eq!(s.value(), dec!(0.000000000000001));

        let tiny = PerUnit::marginal(fx(dec!(0.000000000001)), p).unwrap();
        assert!(!tiny.is_zero()); // 1e-21, below Fixed resolution
        assert_eq!(tiny.gain_for(Fixed::from(1_000), p).unwrap().value(), dec!(0.000000001));
    }

    #[test]
    fn collateral_ratio() {
        let icr = compute_cr(Fixed::from(10), Fixed::from(1000), Fixed::from(200)).unwrap();
        assert_eq!(icr, Fixed::from(2));
        assert_eq!(compute_cr(Fixed::ONE, Fixed::ZERO, Fixed::ONE).unwrap(), Fixed::MAX);
    }
}
