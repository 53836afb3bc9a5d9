//! Fixed-point monetary amounts.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// Amount in the smallest currency unit (e.g. cents).
///
/// All arithmetic is checked; overflow surfaces as an invariant violation rather
/// than wrapping a balance.
#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl ValueObject for Money {}

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    pub const fn minor(self) -> i64 {
        self.0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Money) -> DomainResult<Money> {
        self.0
            .checked_add(other.0)
            .map(Money)
            .ok_or_else(|| DomainError::invariant(format!("money overflow: {self} + {other}")))
    }

    pub fn checked_sub(self, other: Money) -> DomainResult<Money> {
        self.0
            .checked_sub(other.0)
            .map(Money)
            .ok_or_else(|| DomainError::invariant(format!("money overflow: {self} - {other}")))
    }

    /// Sum a sequence of amounts, failing on overflow.
    pub fn checked_sum<I>(amounts: I) -> DomainResult<Money>
    where
        I: IntoIterator<Item = Money>,
    {
        amounts
            .into_iter()
            .try_fold(Money::ZERO, |acc, m| acc.checked_add(m))
    }

    /// Split into `parts` equal shares.
    ///
    /// Returns `(share, remainder)` with `share * parts + remainder == self` and
    /// `0 <= remainder < parts`. Only defined for non-negative amounts.
    pub fn split_even(self, parts: usize) -> DomainResult<(Money, Money)> {
        if parts == 0 {
            return Err(DomainError::validation("cannot split into zero parts"));
        }
        if self.is_negative() {
            return Err(DomainError::validation("cannot split a negative amount"));
        }
        let parts = i64::try_from(parts)
            .map_err(|_| DomainError::invariant("split part count exceeds i64"))?;
        Ok((Money(self.0 / parts), Money(self.0 % parts)))
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn checked_add_reports_overflow_as_invariant() {
        let err = Money::from_minor(i64::MAX)
            .checked_add(Money::from_minor(1))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn split_even_keeps_remainder_below_part_count() {
        let (share, rem) = Money::from_minor(100).split_even(3).unwrap();
        assert_eq!(share, Money::from_minor(33));
        assert_eq!(rem, Money::from_minor(1));
    }

    #[test]
    fn split_even_rejects_zero_parts_and_negative_amounts() {
        assert!(Money::from_minor(10).split_even(0).is_err());
        assert!(Money::from_minor(-10).split_even(2).is_err());
    }

    #[test]
    fn checked_sum_of_nothing_is_zero() {
        assert_eq!(Money::checked_sum(Vec::new()).unwrap(), Money::ZERO);
    }

    proptest! {
        #[test]
        fn split_even_conserves_value(amount in 0i64..i64::MAX, parts in 1usize..1_000) {
            let total = Money::from_minor(amount);
            let (share, rem) = total.split_even(parts).unwrap();
            let rebuilt = share.minor() as i128 * parts as i128 + rem.minor() as i128;
            prop_assert_eq!(rebuilt, amount as i128);
            prop_assert!(rem.minor() < parts as i64);
        }
    }
}
