use crate::error::SendError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// Amount expressed in the chain's smallest unit (duffs for Dash).
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Value(u64);

impl Value {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const MAX: Value = Value(u64::MAX);

    pub const fn zero() -> Self {
        Self(0)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Value) -> Option<Value> {
        self.0.checked_add(other.0).map(Value)
    }

    pub fn checked_sub(self, other: Value) -> Option<Value> {
        self.0.checked_sub(other.0).map(Value)
    }

    pub fn saturating_add(self, other: Value) -> Value {
        Value(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: Value) -> Value {
        Value(self.0.saturating_sub(other.0))
    }

    /// Converts a user-facing decimal amount into smallest units.
    ///
    /// Negative amounts and amounts with more fractional digits than the chain
    /// supports can't be spent and are reported as `AmountBelowDust`. Amounts
    /// past the `u64` range saturate at [`Value::MAX`], which no ledger funds.
    pub fn from_decimal(amount: Decimal, decimals: u32, dust: Value) -> Result<Value, SendError> {
        let below_dust = || SendError::AmountBelowDust { amount, dust };

        let normalized = amount.normalize();
        if normalized.is_sign_negative() || normalized.scale() > decimals {
            return Err(below_dust());
        }

        let units = 10i128
            .checked_pow(decimals - normalized.scale())
            .and_then(|factor| normalized.mantissa().checked_mul(factor))
            .and_then(|units| u64::try_from(units).ok())
            .unwrap_or(u64::MAX);

        Ok(Value(units))
    }

    pub fn to_decimal(self, decimals: u32) -> Decimal {
        Decimal::from_i128_with_scale(self.0 as i128, decimals).normalize()
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value(value)
    }
}

impl From<Value> for u64 {
    fn from(value: Value) -> Self {
        value.0
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// sums saturate at `Value::MAX`, use `checked_add` where the cap matters
impl Add for Value {
    type Output = Value;

    fn add(self, rhs: Value) -> Value {
        self.saturating_add(rhs)
    }
}

impl AddAssign<&Value> for Value {
    fn add_assign(&mut self, rhs: &Value) {
        *self = self.saturating_add(*rhs);
    }
}

impl Sub for Value {
    type Output = Value;

    fn sub(self, rhs: Value) -> Value {
        Value(self.0 - rhs.0)
    }
}

impl Sum for Value {
    fn sum<I: Iterator<Item = Value>>(iter: I) -> Value {
        iter.fold(Value::zero(), |acc, value| acc + value)
    }
}

impl<'a> Sum<&'a Value> for Value {
    fn sum<I: Iterator<Item = &'a Value>>(iter: I) -> Value {
        iter.fold(Value::zero(), |acc, value| acc + *value)
    }
}

/// Signed difference between what came in and what went out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Balance {
    Debt(Value),
    #[default]
    Balanced,
    Excess(Value),
}

impl Balance {
    pub fn zero() -> Self {
        Balance::Balanced
    }

    pub fn balanced(&self) -> bool {
        matches!(self, Balance::Balanced)
    }

    fn as_signed(&self) -> i128 {
        match self {
            Balance::Debt(value) => -(u64::from(*value) as i128),
            Balance::Balanced => 0,
            Balance::Excess(value) => u64::from(*value) as i128,
        }
    }

    fn from_signed(value: i128) -> Self {
        match value {
            0 => Balance::Balanced,
            v if v > 0 => Balance::Excess(Value(v as u64)),
            v => Balance::Debt(Value((-v) as u64)),
        }
    }
}

impl AddAssign<&Value> for Balance {
    fn add_assign(&mut self, rhs: &Value) {
        *self = Balance::from_signed(self.as_signed() + u64::from(*rhs) as i128);
    }
}

impl SubAssign<&Value> for Balance {
    fn sub_assign(&mut self, rhs: &Value) {
        *self = Balance::from_signed(self.as_signed() - u64::from(*rhs) as i128);
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Balance::Debt(value) => write!(f, "-{value}"),
            Balance::Balanced => write!(f, "0"),
            Balance::Excess(value) => write!(f, "+{value}"),
        }
    }
}
