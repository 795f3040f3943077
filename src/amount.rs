//! Fixed-point currency amounts in the smallest on-chain unit (nanoTON).
//!
//! All value arithmetic in the engine goes through [`Nano`]: a signed 128-bit
//! integer of nanoTON. Fee rates are expressed in basis points and applied
//! with integer floor division — floating point never touches money.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Smallest-unit multiplier: 1 TON = 10^9 nanoTON.
pub const NANOS_PER_TON: i128 = 1_000_000_000;

/// Basis-point denominator (1 bps = 0.01%).
pub const BPS_DENOMINATOR: i128 = 10_000;

/// A signed currency amount in nanoTON.
///
/// Balances and fee amounts are always non-negative; negative values appear
/// only as explicit deltas (profit/loss samples).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Nano(i128);

// Serialized as a decimal string: i128 exceeds what JSON/TOML integers can
// carry portably, and chain APIs exchange amounts as strings anyway.
impl Serialize for Nano {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Nano {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct NanoVisitor;

        impl de::Visitor<'_> for NanoVisitor {
            type Value = Nano;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a decimal string or integer amount in nanoTON")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Nano, E> {
                v.parse::<i128>().map(Nano).map_err(de::Error::custom)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Nano, E> {
                Ok(Nano(i128::from(v)))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Nano, E> {
                Ok(Nano(i128::from(v)))
            }
        }

        deserializer.deserialize_any(NanoVisitor)
    }
}

impl Nano {
    pub const ZERO: Nano = Nano(0);

    pub const fn new(nanos: i128) -> Self {
        Self(nanos)
    }

    /// Whole-TON constructor, used by configs and tests.
    pub const fn from_tons(tons: i64) -> Self {
        Self(tons as i128 * NANOS_PER_TON)
    }

    pub const fn raw(self) -> i128 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, other: Nano) -> Option<Nano> {
        self.0.checked_add(other.0).map(Nano)
    }

    pub fn checked_sub(self, other: Nano) -> Option<Nano> {
        self.0.checked_sub(other.0).map(Nano)
    }

    /// Apply a basis-point rate with floor rounding.
    ///
    /// `Nano(1_000_000_000).bps(1000)` is exactly `Nano(100_000_000)` (10%).
    /// Floor is taken toward negative infinity so the result is stable for
    /// signed deltas too.
    pub fn bps(self, basis_points: u32) -> Nano {
        let scaled = self.0 * i128::from(basis_points);
        Nano(scaled.div_euclid(BPS_DENOMINATOR))
    }

    pub fn max(self, other: Nano) -> Nano {
        Nano(self.0.max(other.0))
    }

    pub fn min(self, other: Nano) -> Nano {
        Nano(self.0.min(other.0))
    }
}

impl fmt::Display for Nano {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / NANOS_PER_TON;
        let frac = (self.0 % NANOS_PER_TON).unsigned_abs();
        if frac == 0 {
            write!(f, "{} TON", whole)
        } else if self.0 < 0 && whole == 0 {
            write!(f, "-0.{:09} TON", frac)
        } else {
            write!(f, "{}.{:09} TON", whole, frac)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bps_floors_exactly() {
        assert_eq!(Nano::new(1_000_000_000).bps(1000), Nano::new(100_000_000));
        // 333 * 250 / 10000 = 8.325 -> 8
        assert_eq!(Nano::new(333).bps(250), Nano::new(8));
        assert_eq!(Nano::ZERO.bps(9999), Nano::ZERO);
    }

    #[test]
    fn checked_arithmetic() {
        let a = Nano::from_tons(2);
        let b = Nano::from_tons(3);
        assert_eq!(a.checked_add(b), Some(Nano::from_tons(5)));
        assert_eq!(a.checked_sub(b), Some(Nano::from_tons(-1)));
        assert_eq!(Nano::new(i128::MAX).checked_add(Nano::new(1)), None);
    }

    #[test]
    fn serde_round_trips_as_string() {
        let json = serde_json::to_string(&Nano::new(1_000_000_000)).unwrap();
        assert_eq!(json, "\"1000000000\"");
        let back: Nano = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Nano::new(1_000_000_000));
        // Plain integers are accepted too.
        let from_int: Nano = serde_json::from_str("42").unwrap();
        assert_eq!(from_int, Nano::new(42));
    }

    #[test]
    fn display_formats_nano_precision() {
        assert_eq!(Nano::from_tons(5).to_string(), "5 TON");
        assert_eq!(Nano::new(1_500_000_000).to_string(), "1.500000000 TON");
        assert_eq!(Nano::new(-250_000_000).to_string(), "-0.250000000 TON");
    }
}
