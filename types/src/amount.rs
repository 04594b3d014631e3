//! Monetary amount type shared by accounts, transactions and rates.
//!
//! Amounts are arbitrary-precision decimals, never floating point. They
//! serialize as decimal strings ("99.00"), matching what backend services
//! and host bridges exchange on the wire.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

/// An arbitrary-precision decimal amount in some currency.
///
/// The currency itself is carried alongside (by the account, transaction or
/// rate owning the amount); `Amount` is purely the numeric value.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(Decimal);

impl Amount {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    /// Parse a decimal string such as `"100.00"` or `"-0.5"`.
    pub fn parse(s: &str) -> Result<Self, rust_decimal::Error> {
        Decimal::from_str(s).map(Self)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn checked_mul(self, other: Self) -> Option<Self> {
        self.0.checked_mul(other.0).map(Self)
    }

    pub fn checked_div(self, other: Self) -> Option<Self> {
        self.0.checked_div(other.0).map(Self)
    }

    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Negation. Amounts are signed so that balance adjustments compose.
    pub fn neg(self) -> Self {
        Self(-self.0)
    }

    pub fn from_u64(value: u64) -> Self {
        Self(Decimal::from(value))
    }
}

impl Add for Amount {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Amount {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Amount {
    type Err = rust_decimal::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Decimal> for Amount {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display_roundtrip() {
        let a = Amount::parse("100.00").unwrap();
        assert_eq!(a.to_string(), "100.00");
    }

    #[test]
    fn serializes_as_string() {
        let a = Amount::parse("99.00").unwrap();
        let json = serde_json::to_string(&a).unwrap();
        assert_eq!(json, "\"99.00\"");
        let back: Amount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, a);
    }

    #[test]
    fn checked_sub_preserves_sign() {
        let a = Amount::parse("1.00").unwrap();
        let b = Amount::parse("2.50").unwrap();
        let diff = a.checked_sub(b).unwrap();
        assert!(diff.is_negative());
        assert_eq!(diff.to_string(), "-1.50");
    }

    #[test]
    fn zero_is_not_negative() {
        assert!(!Amount::ZERO.is_negative());
        assert!(Amount::ZERO.is_zero());
    }

    #[test]
    fn send_max_arithmetic() {
        let balance = Amount::parse("100.00").unwrap();
        let fee = Amount::parse("1.00").unwrap();
        assert_eq!(balance.checked_sub(fee).unwrap().to_string(), "99.00");
    }
}
