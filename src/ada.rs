//! Fixed-point ADA amounts.
//!
//! Blockfrost reports every quantity in lovelace. Records carry [`Ada`], which
//! keeps the integer lovelace value for exact arithmetic and serializes as a
//! whole-unit ADA number (lovelace / 1,000,000).

use serde::{Serialize, Serializer};
use std::fmt;
use std::ops::Add;

use crate::blockfrost::AmountEntry;

/// Unit name Blockfrost uses for the native currency.
pub const LOVELACE_UNIT: &str = "lovelace";

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Default, Hash)]
pub struct Ada(u64);

impl Ada {
    pub const ZERO: Ada = Ada(0);
    pub const SCALE: u64 = 1_000_000;

    pub const fn from_lovelace(lovelace: u64) -> Self {
        Self(lovelace)
    }

    pub const fn from_ada(ada: u64) -> Self {
        Self(ada * Self::SCALE)
    }

    #[inline]
    pub fn is_whole(&self) -> bool {
        self.0 % Self::SCALE == 0
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / Self::SCALE as f64
    }

    /// Parse a lovelace quantity as returned by the API (decimal string).
    pub fn parse_lovelace(quantity: &str) -> Option<Self> {
        quantity.trim().parse::<u64>().ok().map(Self)
    }

    /// Lovelace carried by a UTXO amount list; zero when the list has no
    /// lovelace entry.
    pub fn from_amounts(amounts: &[AmountEntry]) -> Self {
        amounts
            .iter()
            .find(|a| a.unit == LOVELACE_UNIT)
            .and_then(|a| {
                let parsed = Self::parse_lovelace(&a.quantity);
                if parsed.is_none() {
                    tracing::debug!("ignoring malformed lovelace quantity {:?}", a.quantity);
                }
                parsed
            })
            .unwrap_or(Self::ZERO)
    }
}

impl Add for Ada {
    type Output = Ada;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl std::iter::Sum for Ada {
    fn sum<I: Iterator<Item = Ada>>(iter: I) -> Self {
        iter.fold(Ada::ZERO, |acc, a| acc + a)
    }
}

impl fmt::Display for Ada {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / Self::SCALE;
        let frac = self.0 % Self::SCALE;
        if frac == 0 {
            write!(f, "{}", whole)
        } else {
            let digits = format!("{:06}", frac);
            write!(f, "{}.{}", whole, digits.trim_end_matches('0'))
        }
    }
}

impl Serialize for Ada {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.is_whole() {
            serializer.serialize_u64(self.0 / Self::SCALE)
        } else {
            serializer.serialize_f64(self.to_f64())
        }
    }
}
