use crate::error::{Result, TaylorError};
use crate::numeric::to_real;
use crate::pipeline::DerivativeChain;
use crate::traits::Evaluate;

/// Highest supported order. `171!` overflows `f64`.
pub const MAX_ORDER: usize = 170;

/// `n!`, exact in `u64` while it fits and continued in `f64` after that.
pub fn factorial(n: usize) -> f64 {
    let mut exact: u64 = 1;
    let mut k = 2;
    while k <= n {
        match exact.checked_mul(k as u64) {
            Some(next) => exact = next,
            None => break,
        }
        k += 1;
    }
    let mut value = exact as f64;
    while k <= n {
        value *= k as f64;
        k += 1;
    }
    value
}

/// Taylor coefficients `a_k = f^(k)(x0) / k!` for `k = 0..=order`.
pub fn build_coefficients<P: Evaluate>(chain: &DerivativeChain<P>, x0: f64) -> Result<Vec<f64>> {
    if chain.order() > MAX_ORDER {
        return Err(TaylorError::InvalidRequest(format!(
            "order {} exceeds the maximum of {MAX_ORDER}",
            chain.order()
        )));
    }
    chain
        .programs()
        .enumerate()
        .map(|(k, program)| coefficient(program, k, x0))
        .collect()
}

fn coefficient<P: Evaluate>(program: &P, k: usize, x0: f64) -> Result<f64> {
    let value = program
        .evaluate(x0)
        .and_then(|v| to_real(&v))
        .map_err(|e| e.at_order(k))?;
    if !value.is_finite() {
        return Err(TaylorError::evaluation(
            Some(k),
            format!("value {value} at x = {x0} is not finite"),
        ));
    }
    Ok(value / factorial(k))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equation_engine::NativeEngine;
    use crate::pipeline::build_chain;
    use approx::assert_relative_eq;

    fn coefficients(expression: &str, x0: f64, n: usize) -> Result<Vec<f64>> {
        let chain = build_chain(&NativeEngine, expression, n, true, None)?;
        build_coefficients(&chain, x0)
    }

    #[test]
    fn factorials() {
        assert_eq!(factorial(0), 1.0);
        assert_eq!(factorial(1), 1.0);
        assert_eq!(factorial(5), 120.0);
        assert_eq!(factorial(20), 2_432_902_008_176_640_000u64 as f64);
        assert_relative_eq!(factorial(21), 5.109_094_217_170_944e19, max_relative = 1e-15);
        assert!(factorial(MAX_ORDER).is_finite());
        assert!(factorial(MAX_ORDER + 1).is_infinite());
    }

    #[test]
    fn exp_coefficients() {
        let c = coefficients("exp(x)", 0.0, 3).unwrap();
        assert_eq!(c.len(), 4);
        assert_relative_eq!(c[0], 1.0);
        assert_relative_eq!(c[1], 1.0);
        assert_relative_eq!(c[2], 0.5);
        assert_relative_eq!(c[3], 1.0 / 6.0, epsilon = 1e-7);
    }

    #[test]
    fn order_zero_is_the_function_value() {
        let c = coefficients("cos(x) + x", 0.7, 0).unwrap();
        assert_eq!(c, vec![0.7f64.cos() + 0.7]);
    }

    #[test]
    fn square_around_origin() {
        let c = coefficients("x^2", 0.0, 2).unwrap();
        assert_eq!(c, vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn poles_are_evaluation_errors() {
        let err = coefficients("1/x", 0.0, 2).unwrap_err();
        match err {
            TaylorError::Evaluation { order, .. } => assert_eq!(order, Some(0)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn complex_values_are_rejected() {
        let err = coefficients("sqrt(x)", -1.0, 1).unwrap_err();
        assert!(err.to_string().contains("Complex value"), "{err}");
        assert!(err.to_string().contains("order 0"), "{err}");
    }

    #[test]
    fn bare_functions_are_unsupported() {
        let err = coefficients("sin", 0.0, 0).unwrap_err();
        assert!(err.to_string().contains("Unsupported value type: function"), "{err}");
    }
}
