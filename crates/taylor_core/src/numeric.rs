//! The numeric lattice produced by expression evaluation and its coercion to `f64`.

use crate::error::{Result, TaylorError};
use num_bigint::BigInt;
use num_complex::Complex64;
use num_rational::BigRational;
use num_traits::{ToPrimitive, Zero};
use std::fmt;
use std::str::FromStr;

/// Largest imaginary magnitude still treated as floating-point noise when a
/// complex evaluation result is coerced to a real number.
pub const IMAGINARY_TOLERANCE: f64 = 1e-12;

/// A value returned by evaluating a compiled expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Real(f64),
    Decimal(Decimal),
    Rational(BigRational),
    Complex(Complex64),
    /// A function referenced without being called, e.g. the expression `sin`.
    Function(String),
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Real(_) => "number",
            Value::Decimal(_) => "decimal",
            Value::Rational(_) => "rational",
            Value::Complex(_) => "complex",
            Value::Function(_) => "function",
        }
    }
}

/// Arbitrary-precision decimal: `unscaled * 10^-scale`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decimal {
    unscaled: BigInt,
    scale: u32,
}

impl Decimal {
    pub fn new(unscaled: BigInt, scale: u32) -> Self {
        Self { unscaled, scale }
    }

    pub fn to_rational(&self) -> BigRational {
        BigRational::new(self.unscaled.clone(), BigInt::from(10u32).pow(self.scale))
    }

    pub fn to_f64(&self) -> f64 {
        self.to_rational().to_f64().unwrap_or(f64::NAN)
    }
}

impl FromStr for Decimal {
    type Err = TaylorError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || TaylorError::Parse(format!("Invalid decimal literal: {s}"));
        let (negative, body) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.strip_prefix('+').unwrap_or(s)),
        };
        let (int_part, frac_part) = body.split_once('.').unwrap_or((body, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }
        if !int_part
            .chars()
            .chain(frac_part.chars())
            .all(|c| c.is_ascii_digit())
        {
            return Err(invalid());
        }
        let digits = format!("{int_part}{frac_part}");
        let mut unscaled = BigInt::from_str(&digits).map_err(|_| invalid())?;
        if negative {
            unscaled = -unscaled;
        }
        Ok(Decimal::new(unscaled, frac_part.len() as u32))
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale == 0 {
            return write!(f, "{}", self.unscaled);
        }
        let negative = self.unscaled < BigInt::zero();
        let digits = self.unscaled.magnitude().to_string();
        let scale = self.scale as usize;
        let padded = format!("{digits:0>width$}", width = scale + 1);
        let (int_part, frac_part) = padded.split_at(padded.len() - scale);
        let sign = if negative { "-" } else { "" };
        write!(f, "{sign}{int_part}.{frac_part}")
    }
}

/// Coerce an evaluation result to a plain `f64`.
///
/// Complex values are accepted only when their imaginary part is within
/// [`IMAGINARY_TOLERANCE`].
pub fn to_real(value: &Value) -> Result<f64> {
    match value {
        Value::Real(v) => Ok(*v),
        Value::Decimal(d) => Ok(d.to_f64()),
        Value::Rational(r) => Ok(r.to_f64().unwrap_or(f64::NAN)),
        Value::Complex(c) => {
            if c.im.abs() > IMAGINARY_TOLERANCE {
                Err(TaylorError::NonRealResult { re: c.re, im: c.im })
            } else {
                Ok(c.re)
            }
        }
        other => Err(TaylorError::UnsupportedType {
            kind: other.kind().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn real_values_pass_through() {
        assert_eq!(to_real(&Value::Real(-2.5)).unwrap(), -2.5);
    }

    #[test]
    fn rationals_and_decimals_convert() {
        let third = BigRational::new(BigInt::from(1), BigInt::from(3));
        assert!((to_real(&Value::Rational(third)).unwrap() - 1.0 / 3.0).abs() < 1e-15);

        let decimal: Decimal = "-12.0625".parse().unwrap();
        assert_eq!(to_real(&Value::Decimal(decimal)).unwrap(), -12.0625);
    }

    #[test]
    fn complex_with_noise_imaginary_part_is_real() {
        let value = Value::Complex(Complex64::new(3.0, 1e-13));
        assert_eq!(to_real(&value).unwrap(), 3.0);
    }

    #[test]
    fn complex_with_real_imaginary_part_is_rejected() {
        let value = Value::Complex(Complex64::new(0.0, 2.0));
        let err = to_real(&value).expect_err("imaginary part should be rejected");
        assert_eq!(err, TaylorError::NonRealResult { re: 0.0, im: 2.0 });
        assert!(err.to_string().starts_with("Complex value"));
    }

    #[test]
    fn functions_are_unsupported() {
        let err = to_real(&Value::Function("sin".to_string())).expect_err("not a number");
        assert_eq!(
            err,
            TaylorError::UnsupportedType {
                kind: "function".to_string()
            }
        );
    }

    #[test]
    fn decimal_parsing_and_display() {
        let d: Decimal = "0.050".parse().unwrap();
        assert_eq!(d.to_string(), "0.050");
        assert_eq!(d.to_f64(), 0.05);
        let d: Decimal = "-7".parse().unwrap();
        assert_eq!(d.to_string(), "-7");
        let d: Decimal = "-.5".parse().unwrap();
        assert_eq!(d.to_string(), "-0.5");
        assert!("1.2.3".parse::<Decimal>().is_err());
        assert!(".".parse::<Decimal>().is_err());
    }
}
