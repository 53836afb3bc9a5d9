//! Basis-point rates.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::money::Money;
use crate::value_object::ValueObject;

/// 100% expressed in basis points.
pub const BASIS_POINTS_SCALE: u32 = 10_000;

/// A fraction in basis points, `0..=10_000` (0% to 100%).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Rate(u32);

impl ValueObject for Rate {}

impl Rate {
    pub const ZERO: Rate = Rate(0);
    pub const FULL: Rate = Rate(BASIS_POINTS_SCALE);

    pub fn from_basis_points(bps: u32) -> DomainResult<Self> {
        if bps > BASIS_POINTS_SCALE {
            return Err(DomainError::validation(format!(
                "rate must be at most {BASIS_POINTS_SCALE} basis points, got {bps}"
            )));
        }
        Ok(Self(bps))
    }

    /// Like [`Rate::from_basis_points`], but caps at 100% instead of failing.
    pub const fn clamped(bps: u32) -> Self {
        if bps > BASIS_POINTS_SCALE {
            Self(BASIS_POINTS_SCALE)
        } else {
            Self(bps)
        }
    }

    pub const fn basis_points(self) -> u32 {
        self.0
    }

    /// Apply this rate to an amount, truncating toward zero.
    ///
    /// Uses 128-bit intermediates, so the result never exceeds `amount` in
    /// magnitude and cannot overflow.
    pub fn apply_to(self, amount: Money) -> Money {
        let scaled = amount.minor() as i128 * self.0 as i128 / BASIS_POINTS_SCALE as i128;
        // |scaled| <= |amount| because self.0 <= BASIS_POINTS_SCALE.
        Money::from_minor(scaled as i64)
    }
}

impl TryFrom<u32> for Rate {
    type Error = DomainError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::from_basis_points(value)
    }
}

impl From<Rate> for u32 {
    fn from(value: Rate) -> Self {
        value.0
    }
}

impl core::fmt::Display for Rate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}bps", self.0)
    }
}
