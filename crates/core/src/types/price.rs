//! Brazilian Real prices using decimal arithmetic.
//!
//! The catalog stores prices as display strings (`"R$ 1.234,56"`), so every
//! computation goes through [`Price::parse`] and back out through
//! [`Price::display`]. Parsing is forgiving about the notation it accepts:
//!
//! ```rust
//! use vitrine_core::Price;
//!
//! assert_eq!(Price::parse("R$ 1.234,56").unwrap().display(), "R$ 1.234,56");
//! assert_eq!(Price::parse("1234.5").unwrap().display(), "R$ 1.234,50");
//! assert_eq!(Price::parse("R$ 12.000").unwrap().display(), "R$ 12.000,00");
//! ```

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Mul};
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced when a price string cannot be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PriceParseError {
    /// The input contains no digits at all.
    #[error("price contains no digits: {0:?}")]
    NoDigits(String),
    /// The digits could not be assembled into a decimal number.
    #[error("invalid price {input:?}: {reason}")]
    Invalid {
        /// Original input.
        input: String,
        /// Decimal parser message.
        reason: String,
    },
}

/// A monetary amount in Brazilian Reais.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    /// Zero reais.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Wrap a decimal amount.
    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// The underlying decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Parse a price written in pt-BR (`R$ 1.234,56`) or plain (`1234.56`)
    /// notation.
    ///
    /// # Errors
    ///
    /// Returns [`PriceParseError`] if the input has no digits or the digits
    /// do not form a number.
    pub fn parse(input: &str) -> Result<Self, PriceParseError> {
        let kept: String = input
            .chars()
            .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-'))
            .collect();

        if !kept.chars().any(|c| c.is_ascii_digit()) {
            return Err(PriceParseError::NoDigits(input.to_string()));
        }

        let negative = kept.starts_with('-');
        let unsigned: String = kept.chars().filter(|c| *c != '-').collect();
        let normalized = normalize_separators(&unsigned);

        let amount = Decimal::from_str(&normalized).map_err(|e| PriceParseError::Invalid {
            input: input.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self(if negative { -amount } else { amount }))
    }

    /// Parse a price, treating anything unparseable as zero.
    ///
    /// Cart totals use this so a single malformed price never poisons the sum.
    #[must_use]
    pub fn parse_or_zero(input: &str) -> Self {
        Self::parse(input).unwrap_or(Self::ZERO)
    }

    /// Build a price from a JSON number, preserving its decimal digits.
    #[must_use]
    pub fn from_json_number(number: &serde_json::Number) -> Option<Self> {
        let text = number.to_string();
        Decimal::from_str(&text)
            .or_else(|_| Decimal::from_scientific(&text))
            .ok()
            .map(Self)
    }

    /// Format for display, e.g. `R$ 1.234,56`.
    #[must_use]
    pub fn display(&self) -> String {
        let mut rounded = self
            .0
            .abs()
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        rounded.rescale(2);

        let text = rounded.to_string();
        let (integer, cents) = text.split_once('.').unwrap_or((text.as_str(), "00"));

        let sign = if self.0.is_sign_negative() && !rounded.is_zero() {
            "-"
        } else {
            ""
        };
        format!("{sign}R$ {},{cents}", group_thousands(integer))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

impl FromStr for Price {
    type Err = PriceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Saturates at `Decimal::MAX` / `Decimal::MIN` instead of overflowing.
impl Add for Price {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.checked_add(rhs.0).unwrap_or_else(|| {
            saturated(self.0.is_sign_negative() && rhs.0.is_sign_negative())
        }))
    }
}

/// Saturates at `Decimal::MAX` / `Decimal::MIN` instead of overflowing.
impl Mul<u32> for Price {
    type Output = Self;

    fn mul(self, quantity: u32) -> Self {
        Self(
            self.0
                .checked_mul(Decimal::from(quantity))
                .unwrap_or_else(|| saturated(self.0.is_sign_negative())),
        )
    }
}

const fn saturated(negative: bool) -> Decimal {
    if negative { Decimal::MIN } else { Decimal::MAX }
}

impl Sum for Price {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

/// Turn pt-BR or plain separators into a `Decimal`-parseable string.
///
/// With a comma present, the last comma is the decimal mark and every dot is
/// a thousands separator. Without one, a single dot followed by one or two
/// digits is a decimal mark; any other dots group thousands.
fn normalize_separators(digits: &str) -> String {
    if let Some(pos) = digits.rfind(',') {
        let (integer, fraction) = digits.split_at(pos);
        let integer: String = integer.chars().filter(char::is_ascii_digit).collect();
        let fraction: String = fraction.chars().filter(char::is_ascii_digit).collect();
        return join_parts(&integer, &fraction);
    }

    let dots = digits.matches('.').count();
    if dots == 1
        && let Some((integer, fraction)) = digits.split_once('.')
        && (1..=2).contains(&fraction.len())
    {
        return join_parts(integer, fraction);
    }

    digits.chars().filter(char::is_ascii_digit).collect()
}

fn join_parts(integer: &str, fraction: &str) -> String {
    let integer = if integer.is_empty() { "0" } else { integer };
    if fraction.is_empty() {
        integer.to_string()
    } else {
        format!("{integer}.{fraction}")
    }
}

fn group_thousands(integer: &str) -> String {
    let len = integer.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, c) in integer.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push('.');
        }
        out.push(c);
    }
    out
}
