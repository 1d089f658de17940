//! Fixed-point decimal types for prices and quantities
//!
//! Uses rust_decimal for deterministic arithmetic (no floating-point errors).
//! Prices are $/MWh and may be negative (negative LMPs are routine).
//! Quantities are MWh and never negative.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// Cents precision used for reported P&L and capital
pub const CENT_DP: u32 = 2;

/// Round a monetary amount to cents, midpoint away from zero
pub fn round_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(CENT_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// Price in $/MWh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    pub fn from_u64(value: u64) -> Self {
        Self(Decimal::from(value))
    }

    /// Convert from an f64 wire value; `None` for NaN or infinities
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        Decimal::from_f64(value).map(|d| Self(d.normalize()))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }
}

impl FromStr for Price {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str_exact(s).map(Self)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Quantity in MWh
///
/// Invariant: never negative
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(Decimal);

impl Quantity {
    /// Create a quantity
    ///
    /// # Panics
    /// Panics on a negative value
    pub fn new(value: Decimal) -> Self {
        assert!(value >= Decimal::ZERO, "Quantity must be non-negative");
        Self(value)
    }

    /// Create a quantity, returning None if negative
    pub fn try_new(value: Decimal) -> Option<Self> {
        if value >= Decimal::ZERO {
            Some(Self(value))
        } else {
            None
        }
    }

    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl FromStr for Quantity {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str_exact(s)?;
        Self::try_new(value).ok_or(rust_decimal::Error::ConversionTo("Quantity".into()))
    }
}

impl Add for Quantity {
    type Output = Quantity;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

/// Saturating at zero; quantities never go negative
impl Sub for Quantity {
    type Output = Quantity;

    fn sub(self, rhs: Self) -> Self::Output {
        Self((self.0 - rhs.0).max(Decimal::ZERO))
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
