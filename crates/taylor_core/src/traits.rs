use crate::error::Result;
use crate::numeric::Value;
use num_complex::Complex64;
use num_complex::ComplexFloat;
use std::fmt::Debug;

/// A trait for types the bytecode VM can evaluate over.
/// Real evaluation runs on `f64`; `Complex64` is used to classify results that
/// leave the real line (e.g. `sqrt(-1)`).
pub trait Scalar: ComplexFloat<Real = f64> + Debug + 'static {
    fn from_real(value: f64) -> Self;
}

impl Scalar for f64 {
    fn from_real(value: f64) -> Self {
        value
    }
}

impl Scalar for Complex64 {
    fn from_real(value: f64) -> Self {
        Complex64::new(value, 0.0)
    }
}

/// A compiled expression of one free variable.
pub trait Evaluate {
    /// Evaluates the expression at `x`.
    fn evaluate(&self, x: f64) -> Result<Value>;
}

/// The algebra capability the Taylor pipeline is built on.
///
/// Any symbolic backend can drive the pipeline as long as it can parse text,
/// simplify and differentiate its trees, and compile them into something that
/// implements [`Evaluate`].
pub trait SymbolicEngine {
    type Node: Clone + Debug;
    type Program: Evaluate;

    fn parse(&self, source: &str) -> Result<Self::Node>;

    fn simplify(&self, node: &Self::Node) -> Self::Node;

    /// Differentiates `node` with respect to `variable`.
    fn derivative(&self, node: &Self::Node, variable: &str) -> Result<Self::Node>;

    fn compile(&self, node: &Self::Node) -> Result<Self::Program>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn half<T: Scalar>(value: f64) -> T {
        T::from_real(value) / T::from_real(2.0)
    }

    #[test]
    fn reals_embed_in_both_scalars() {
        assert_eq!(half::<f64>(3.0), 1.5);
        assert_eq!(half::<Complex64>(3.0), Complex64::new(1.5, 0.0));
        assert!(half::<Complex64>(-4.0).sqrt().im > 0.0);
    }
}
