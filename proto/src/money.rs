use serde::{Deserialize, Serialize};
use std::{fmt, iter::Sum, ops::Add};

/// A non-negative amount in minor currency units (cents).
///
/// Integer arithmetic keeps cart totals exact: recomputing a total from the same items always
/// yields the same value, which is what lets a rolled-back cart compare equal to its prior state.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_minor(minor: u64) -> Self { Money(minor) }

    pub const fn minor(&self) -> u64 { self.0 }

    /// Price of `quantity` units. Saturates rather than wrapping on absurd quantities.
    pub fn times(self, quantity: u32) -> Money { Money(self.0.saturating_mul(quantity as u64)) }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money { Money(self.0.saturating_add(rhs.0)) }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money { iter.fold(Money::ZERO, Add::add) }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}.{:02}", self.0 / 100, self.0 % 100) }
}
