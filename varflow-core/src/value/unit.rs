//! Physical Units
//!
//! A [`Unit`] is a vector of integer exponents over the seven SI base
//! dimensions. Only dimensional bookkeeping lives here: multiplication and
//! division add and subtract exponents, powers scale them. There are no
//! scale factors, so `km` and `m` are not distinguished.
//!
//! # Text Form
//!
//! Parsing accepts factors joined by `*` and `/`, each a base symbol
//! (`m kg s A K mol cd`) or a derived symbol (`N J W Pa Hz`) with an
//! optional integer exponent written `^n` or `**n`. The literal `1` is
//! dimensionless. Display always uses base symbols, numerator factors first:
//! `m/s`, `kg*m/s^2`, `1/s`.
//!
//! Exponents are stored as `i8`. Every operation that combines units is
//! checked and yields `None` when an exponent would leave that range.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::VarError;

const BASE_SYMBOLS: [&str; 7] = ["m", "kg", "s", "A", "K", "mol", "cd"];

/// Derived units expressed in base exponents.
const DERIVED: [(&str, [i8; 7]); 5] = [
    ("N", [1, 1, -2, 0, 0, 0, 0]),
    ("J", [2, 1, -2, 0, 0, 0, 0]),
    ("W", [2, 1, -3, 0, 0, 0, 0]),
    ("Pa", [-1, 1, -2, 0, 0, 0, 0]),
    ("Hz", [0, 0, -1, 0, 0, 0, 0]),
];

/// Physical dimension of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Unit {
    exponents: [i8; 7],
}

impl Unit {
    pub const fn dimensionless() -> Self {
        Self { exponents: [0; 7] }
    }

    pub const fn from_exponents(exponents: [i8; 7]) -> Self {
        Self { exponents }
    }

    pub fn meter() -> Self {
        Self::base(0)
    }

    pub fn kilogram() -> Self {
        Self::base(1)
    }

    pub fn second() -> Self {
        Self::base(2)
    }

    fn base(index: usize) -> Self {
        let mut exponents = [0; 7];
        exponents[index] = 1;
        Self { exponents }
    }

    pub fn exponents(&self) -> [i8; 7] {
        self.exponents
    }

    pub fn is_dimensionless(&self) -> bool {
        self.exponents.iter().all(|&e| e == 0)
    }

    /// Multiply, adding exponents.
    pub fn checked_mul(self, rhs: Unit) -> Option<Unit> {
        let mut exponents = self.exponents;
        for (e, r) in exponents.iter_mut().zip(rhs.exponents) {
            *e = e.checked_add(r)?;
        }
        Some(Unit { exponents })
    }

    /// Divide, subtracting exponents.
    pub fn checked_div(self, rhs: Unit) -> Option<Unit> {
        let mut exponents = self.exponents;
        for (e, r) in exponents.iter_mut().zip(rhs.exponents) {
            *e = e.checked_sub(r)?;
        }
        Some(Unit { exponents })
    }

    /// Raise to an integer power.
    pub fn checked_powi(self, n: i32) -> Option<Self> {
        let mut exponents = self.exponents;
        for e in exponents.iter_mut() {
            let scaled = i32::from(*e).checked_mul(n)?;
            *e = i8::try_from(scaled).ok()?;
        }
        Some(Self { exponents })
    }

    /// Take the `n`th root. Returns `None` unless every exponent is divisible by `n`.
    pub fn root(self, n: i32) -> Option<Self> {
        if n == 0 {
            return None;
        }
        let mut exponents = self.exponents;
        for e in exponents.iter_mut() {
            let v = i32::from(*e);
            if v % n != 0 {
                return None;
            }
            *e = i8::try_from(v / n).ok()?;
        }
        Some(Self { exponents })
    }

    fn parse_factor(factor: &str) -> Result<Unit, VarError> {
        let factor = factor.trim();
        let (symbol, power) = match factor.split_once("**").or_else(|| factor.split_once('^')) {
            Some((symbol, power)) => {
                let power: i32 = power
                    .trim()
                    .parse()
                    .map_err(|_| VarError::InvalidUnit(factor.to_string()))?;
                (symbol.trim(), power)
            }
            None => (factor, 1),
        };

        let invalid = || VarError::InvalidUnit(factor.to_string());
        if symbol == "1" {
            return Ok(Unit::dimensionless());
        }
        let unit = match BASE_SYMBOLS.iter().position(|&s| s == symbol) {
            Some(i) => Unit::base(i),
            None => DERIVED
                .iter()
                .find(|(s, _)| *s == symbol)
                .map(|(_, exps)| Unit::from_exponents(*exps))
                .ok_or_else(invalid)?,
        };
        unit.checked_powi(power).ok_or_else(invalid)
    }
}

impl FromStr for Unit {
    type Err = VarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Unit::dimensionless());
        }

        let mut unit = Unit::dimensionless();
        let mut divide = false;
        let mut start = 0;
        let bytes = s.as_bytes();
        let mut i = 0;
        while i <= bytes.len() {
            let at_end = i == bytes.len();
            // `**` is an exponent, not a separator.
            let is_pow = !at_end && bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'*');
            if is_pow {
                i += 2;
                continue;
            }
            if at_end || bytes[i] == b'*' || bytes[i] == b'/' {
                let factor = &s[start..i];
                if factor.trim().is_empty() {
                    return Err(VarError::InvalidUnit(s.to_string()));
                }
                let parsed = Unit::parse_factor(factor)?;
                let combined = if divide {
                    unit.checked_div(parsed)
                } else {
                    unit.checked_mul(parsed)
                };
                unit = combined.ok_or_else(|| VarError::InvalidUnit(s.to_string()))?;
                if !at_end {
                    divide = bytes[i] == b'/';
                }
                start = i + 1;
            }
            i += 1;
        }
        Ok(unit)
    }
}

impl TryFrom<String> for Unit {
    type Error = VarError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Unit> for String {
    fn from(unit: Unit) -> Self {
        unit.to_string()
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let factor = |symbol: &str, power: i16| {
            if power == 1 {
                symbol.to_string()
            } else {
                format!("{}^{}", symbol, power)
            }
        };

        let numerator: Vec<String> = BASE_SYMBOLS
            .iter()
            .zip(self.exponents)
            .filter(|(_, e)| *e > 0)
            .map(|(s, e)| factor(s, i16::from(e)))
            .collect();
        let denominator: Vec<String> = BASE_SYMBOLS
            .iter()
            .zip(self.exponents)
            .filter(|(_, e)| *e < 0)
            .map(|(s, e)| factor(s, -i16::from(e)))
            .collect();

        if numerator.is_empty() {
            write!(f, "1")?;
        } else {
            write!(f, "{}", numerator.join("*"))?;
        }
        for d in denominator {
            write!(f, "/{}", d)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(s: &str) -> Unit {
        s.parse().unwrap()
    }

    #[test]
    fn parses_base_and_compound_units() {
        assert_eq!(unit("m"), Unit::meter());
        assert_eq!(unit("s^-1"), Unit::second().checked_powi(-1).unwrap());
        assert_eq!(unit("m/s"), Unit::meter().checked_div(Unit::second()).unwrap());
        assert_eq!(unit("kg*m/s^2"), unit("N"));
        assert_eq!(unit("m**2"), Unit::meter().checked_powi(2).unwrap());
        assert_eq!(unit("1/s"), unit("Hz"));
        assert!(unit("1").is_dimensionless());
        assert!(unit("").is_dimensionless());
    }

    #[test]
    fn rejects_unknown_symbols() {
        assert!(matches!("furlong".parse::<Unit>(), Err(VarError::InvalidUnit(_))));
        assert!(matches!("m//s".parse::<Unit>(), Err(VarError::InvalidUnit(_))));
        assert!(matches!("m^x".parse::<Unit>(), Err(VarError::InvalidUnit(_))));
    }

    #[test]
    fn multiplication_composes_exponents() {
        let velocity = unit("m").checked_mul(unit("s^-1")).unwrap();
        assert_eq!(velocity.to_string(), "m/s");
        assert!(velocity.checked_div(velocity).unwrap().is_dimensionless());
    }

    #[test]
    fn exponent_overflow_is_detected() {
        let m = Unit::meter();
        assert_eq!(m.checked_powi(127).unwrap().exponents()[0], 127);
        assert_eq!(m.checked_powi(-128).unwrap().exponents()[0], -128);
        assert_eq!(m.checked_powi(128), None);
        assert_eq!(m.checked_powi(200), None);
        assert_eq!(m.checked_powi(i32::MAX), None);

        let big = m.checked_powi(100).unwrap();
        assert_eq!(big.checked_mul(big), None);
        assert_eq!(big.checked_div(big.checked_powi(-1).unwrap()), None);
        assert_eq!(unit("m^-128").root(-1), None);
    }

    #[test]
    fn out_of_range_exponents_fail_to_parse() {
        assert_eq!(unit("m^127").exponents()[0], 127);
        assert!(matches!("m^300".parse::<Unit>(), Err(VarError::InvalidUnit(_))));
        assert!(matches!("m^127*m".parse::<Unit>(), Err(VarError::InvalidUnit(_))));
        assert!(matches!("1/m^100/m^100".parse::<Unit>(), Err(VarError::InvalidUnit(_))));
        assert_eq!(unit("N^64").exponents()[2], -128);
        assert!(matches!("N^65".parse::<Unit>(), Err(VarError::InvalidUnit(_))));
    }

    #[test]
    fn extreme_exponents_display() {
        assert_eq!(unit("m^-128").to_string(), "1/m^128");
    }

    #[test]
    fn display_is_canonical() {
        assert_eq!(unit("N").to_string(), "m*kg/s^2");
        assert_eq!(unit("Hz").to_string(), "1/s");
        assert_eq!(Unit::dimensionless().to_string(), "1");
        assert_eq!(unit(&unit("J/mol").to_string()), unit("J/mol"));
    }

    #[test]
    fn roots_require_divisible_exponents() {
        assert_eq!(unit("m^2").root(2), Some(Unit::meter()));
        assert_eq!(unit("m").root(2), None);
        assert_eq!(unit("m").root(0), None);
    }

    #[test]
    fn serializes_as_string() {
        let json = serde_json::to_string(&unit("m/s")).unwrap();
        assert_eq!(json, "\"m/s\"");
        let back: Unit = serde_json::from_str(&json).unwrap();
        assert_eq!(back, unit("m/s"));
    }
}
