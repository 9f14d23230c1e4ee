//! Kubernetes resource quantities.
//!
//! Quantities are decimal numbers with an optional SI (`m`, `k`, `M`, ...),
//! binary (`Ki`, `Mi`, ...) or exponent (`e3`) suffix. Parsing is exact;
//! conversion to integer units rounds up, like the API server does.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use crate::error::{KubeError, Result};

/// A parsed quantity: `mantissa * 10^exp10 * 2^exp2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedQuantity {
    mantissa: u128,
    exp10: i32,
    exp2: u32,
}

impl ParsedQuantity {
    /// Parses a quantity string.
    ///
    /// # Errors
    ///
    /// Returns [`KubeError::InvalidQuantity`] for malformed or negative values.
    pub fn parse(value: &str) -> Result<Self> {
        let invalid = || KubeError::InvalidQuantity {
            value: value.to_string(),
        };

        let s = value.trim();
        let s = s.strip_prefix('+').unwrap_or(s);
        let split = s
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(s.len());
        let (number, suffix) = s.split_at(split);

        let (int_part, frac_part) = number.split_once('.').unwrap_or((number, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }
        let mut mantissa: u128 = 0;
        for digit in int_part.chars().chain(frac_part.chars()) {
            let d = digit.to_digit(10).ok_or_else(invalid)?;
            mantissa = mantissa
                .checked_mul(10)
                .and_then(|m| m.checked_add(u128::from(d)))
                .ok_or_else(invalid)?;
        }
        let mut exp10 = -i32::try_from(frac_part.len()).map_err(|_| invalid())?;
        let mut exp2 = 0;

        match suffix {
            "" => {}
            "n" => exp10 -= 9,
            "u" => exp10 -= 6,
            "m" => exp10 -= 3,
            "k" => exp10 += 3,
            "M" => exp10 += 6,
            "G" => exp10 += 9,
            "T" => exp10 += 12,
            "P" => exp10 += 15,
            "E" => exp10 += 18,
            "Ki" => exp2 = 10,
            "Mi" => exp2 = 20,
            "Gi" => exp2 = 30,
            "Ti" => exp2 = 40,
            "Pi" => exp2 = 50,
            "Ei" => exp2 = 60,
            exp if exp.len() > 1 && exp.starts_with(['e', 'E']) => {
                let e: i32 = exp[1..].parse().map_err(|_| invalid())?;
                exp10 = exp10.checked_add(e).ok_or_else(invalid)?;
            }
            _ => return Err(invalid()),
        }

        Ok(Self {
            mantissa,
            exp10,
            exp2,
        })
    }

    /// Returns `ceil(value * 10^digits)`, saturating at `u64::MAX`.
    #[must_use]
    pub fn scaled(&self, digits: i32) -> u64 {
        let Some(value) = self.mantissa.checked_mul(1u128 << self.exp2) else {
            return u64::MAX;
        };
        let exp = self.exp10.saturating_add(digits);
        let scaled = if exp >= 0 {
            u32::try_from(exp)
                .ok()
                .and_then(|e| 10u128.checked_pow(e))
                .and_then(|p| value.checked_mul(p))
        } else {
            let divisor = u32::try_from(-exp).ok().and_then(|e| 10u128.checked_pow(e));
            match divisor {
                Some(d) => Some(value.div_ceil(d)),
                None => Some(u128::from(value > 0)),
            }
        };
        scaled.map_or(u64::MAX, |v| u64::try_from(v).unwrap_or(u64::MAX))
    }

    /// Returns the value in thousandths, rounded up.
    #[must_use]
    pub fn millis(&self) -> u64 {
        self.scaled(3)
    }

    /// Returns the value in whole units, rounded up.
    #[must_use]
    pub fn units(&self) -> u64 {
        self.scaled(0)
    }
}

/// Returns a CPU quantity in millicores.
///
/// # Errors
///
/// Returns an error for malformed quantities.
pub fn cpu_millis(quantity: &Quantity) -> Result<u64> {
    ParsedQuantity::parse(&quantity.0).map(|q| q.millis())
}

/// Returns a memory, storage or count quantity in whole units.
///
/// # Errors
///
/// Returns an error for malformed quantities.
pub fn units(quantity: &Quantity) -> Result<u64> {
    ParsedQuantity::parse(&quantity.0).map(|q| q.units())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("100m", 100 ; "millicores")]
    #[test_case("1", 1000 ; "one core")]
    #[test_case("1.5", 1500 ; "fractional")]
    #[test_case("0.1", 100 ; "tenth")]
    #[test_case("1.1", 1100 ; "no float drift")]
    #[test_case("1e3", 1_000_000 ; "exponent")]
    #[test_case("1n", 1 ; "rounds up")]
    #[test_case("2k", 2_000_000 ; "kilo")]
    #[test_case("+250m", 250 ; "explicit sign")]
    fn cpu(value: &str, expected: u64) {
        assert_eq!(cpu_millis(&Quantity(value.to_string())).ok(), Some(expected));
    }

    #[test_case("128Mi", 134_217_728 ; "mebibytes")]
    #[test_case("1Gi", 1_073_741_824 ; "gibibytes")]
    #[test_case("1G", 1_000_000_000 ; "gigabytes")]
    #[test_case("1E", 1_000_000_000_000_000_000 ; "exa suffix")]
    #[test_case("110", 110 ; "plain count")]
    #[test_case("1.5Ki", 1536 ; "fractional binary")]
    #[test_case("500m", 1 ; "fraction of a byte rounds up")]
    #[test_case("16Ei", u64::MAX ; "saturates")]
    fn memory(value: &str, expected: u64) {
        assert_eq!(units(&Quantity(value.to_string())).ok(), Some(expected));
    }

    #[test_case("" ; "empty")]
    #[test_case("abc" ; "letters")]
    #[test_case("1.2.3" ; "two points")]
    #[test_case("-1" ; "negative")]
    #[test_case("1Qi" ; "unknown suffix")]
    #[test_case("." ; "lone point")]
    #[test_case("1e" ; "dangling exponent")]
    fn invalid(value: &str) {
        assert!(matches!(
            ParsedQuantity::parse(value),
            Err(KubeError::InvalidQuantity { .. })
        ));
    }
}
