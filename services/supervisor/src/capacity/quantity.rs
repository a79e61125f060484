//! Kubernetes resource quantities.
//!
//! Quantities are held as signed milli-units so CPU (`500m`) and memory
//! (`2Gi`) share one exact integer representation. Values that are not a
//! whole number of milli-units round up, matching the API server.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::str::FromStr;

use thiserror::Error;

/// Errors produced while parsing a quantity string.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QuantityError {
    #[error("quantity cannot be empty")]
    Empty,

    #[error("invalid quantity '{0}'")]
    Invalid(String),

    #[error("quantity '{0}' is out of range")]
    OutOfRange(String),
}

/// A resource amount in milli-units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Quantity(i128);

impl Quantity {
    pub const ZERO: Quantity = Quantity(0);

    pub const fn from_millis(millis: i128) -> Self {
        Self(millis)
    }

    /// Whole units (cores, bytes).
    pub const fn from_units(units: i64) -> Self {
        Self(units as i128 * 1000)
    }

    pub const fn millis(&self) -> i128 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn saturating_sub(self, other: Quantity) -> Quantity {
        Quantity(self.0.saturating_sub(other.0))
    }

    /// How many whole `per` amounts fit in `self`, rounded down.
    ///
    /// Zero when either side is not positive.
    pub fn units_of(self, per: Quantity) -> u64 {
        if self.0 <= 0 || per.0 <= 0 {
            return 0;
        }
        u64::try_from(self.0 / per.0).unwrap_or(u64::MAX)
    }

    pub fn parse(s: &str) -> Result<Self, QuantityError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(QuantityError::Empty);
        }
        let invalid = || QuantityError::Invalid(s.to_string());
        let out_of_range = || QuantityError::OutOfRange(s.to_string());

        let (negative, body) = match s.as_bytes()[0] {
            b'-' => (true, &s[1..]),
            b'+' => (false, &s[1..]),
            _ => (false, s),
        };

        let number_end = body
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(body.len());
        let (number, suffix) = body.split_at(number_end);

        let (whole, fraction) = match number.split_once('.') {
            Some((w, f)) => (w, f),
            None => (number, ""),
        };
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }
        if fraction.contains('.') {
            return Err(invalid());
        }

        let digits = format!("{whole}{fraction}");
        let mantissa: i128 = digits.parse().map_err(|_| out_of_range())?;
        let scale = fraction.len() as i32;

        let millis = match suffix {
            "Ki" | "Mi" | "Gi" | "Ti" | "Pi" | "Ei" => {
                let power = match suffix {
                    "Ki" => 10,
                    "Mi" => 20,
                    "Gi" => 30,
                    "Ti" => 40,
                    "Pi" => 50,
                    _ => 60,
                };
                let scaled = mantissa
                    .checked_mul(1i128 << power)
                    .and_then(|v| v.checked_mul(1000))
                    .ok_or_else(out_of_range)?;
                div_ceil(scaled, pow10(scale).ok_or_else(out_of_range)?)
            }
            _ => {
                let exponent = decimal_exponent(suffix).ok_or_else(invalid)?;
                let shift = exponent + 3 - scale;
                if shift >= 0 {
                    mantissa
                        .checked_mul(pow10(shift).ok_or_else(out_of_range)?)
                        .ok_or_else(out_of_range)?
                } else {
                    div_ceil(mantissa, pow10(-shift).ok_or_else(out_of_range)?)
                }
            }
        };

        Ok(Quantity(if negative { -millis } else { millis }))
    }
}

fn decimal_exponent(suffix: &str) -> Option<i32> {
    match suffix {
        "n" => Some(-9),
        "u" => Some(-6),
        "m" => Some(-3),
        "" => Some(0),
        "k" => Some(3),
        "M" => Some(6),
        "G" => Some(9),
        "T" => Some(12),
        "P" => Some(15),
        "E" => Some(18),
        _ => {
            let rest = suffix.strip_prefix('e').or_else(|| suffix.strip_prefix('E'))?;
            rest.parse::<i32>().ok()
        }
    }
}

fn pow10(exp: i32) -> Option<i128> {
    10i128.checked_pow(u32::try_from(exp).ok()?)
}

fn div_ceil(value: i128, divisor: i128) -> i128 {
    let q = value / divisor;
    if value % divisor > 0 {
        q + 1
    } else {
        q
    }
}

impl FromStr for Quantity {
    type Err = QuantityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Canonical form: whole units when exact, otherwise milli-units.
impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 % 1000 == 0 {
            write!(f, "{}", self.0 / 1000)
        } else {
            write!(f, "{}m", self.0)
        }
    }
}

impl Add for Quantity {
    type Output = Quantity;

    fn add(self, rhs: Quantity) -> Quantity {
        Quantity(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Quantity {
    fn add_assign(&mut self, rhs: Quantity) {
        *self = *self + rhs;
    }
}

impl Sum for Quantity {
    fn sum<I: Iterator<Item = Quantity>>(iter: I) -> Quantity {
        iter.fold(Quantity::ZERO, Add::add)
    }
}
