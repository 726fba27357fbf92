use crate::error::{Result, TaylorError};
use crate::numeric::to_real;
use crate::traits::Evaluate;
use serde::{Deserialize, Serialize};

/// Most points a single pass will sample.
pub const MAX_SAMPLE_COUNT: usize = 1_000_000;

/// Plot data: the domain, `f(x)` and the Taylor polynomial `T_n(x)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleSet {
    pub xs: Vec<f64>,
    pub yf: Vec<f64>,
    pub yt: Vec<f64>,
}

impl SampleSet {
    fn with_capacity(count: usize) -> Self {
        Self {
            xs: Vec::with_capacity(count),
            yf: Vec::with_capacity(count),
            yt: Vec::with_capacity(count),
        }
    }
}

/// Evaluates `sum(coefficients[k] * dx^k)` by nested multiplication.
pub fn horner(coefficients: &[f64], dx: f64) -> f64 {
    coefficients.iter().rev().fold(0.0, |acc, c| acc * dx + c)
}

/// Samples `count` evenly spaced points of `[left, right]`.
///
/// Non-finite values of the original (poles) are kept as they are; a
/// non-real value aborts the pass.
pub fn sample<P: Evaluate>(
    original: &P,
    coefficients: &[f64],
    x0: f64,
    left: f64,
    right: f64,
    count: usize,
) -> Result<SampleSet> {
    if count < 2 {
        return Err(TaylorError::InvalidRequest(format!(
            "sample count must be at least 2, got {count}"
        )));
    }
    if count > MAX_SAMPLE_COUNT {
        return Err(TaylorError::InvalidRequest(format!(
            "sample count {count} exceeds the maximum of {MAX_SAMPLE_COUNT}"
        )));
    }
    let step = (right - left) / (count - 1) as f64;
    let mut set = SampleSet::with_capacity(count);
    for i in 0..count {
        let x = left + i as f64 * step;
        let y = original
            .evaluate(x)
            .and_then(|v| to_real(&v))
            .map_err(|e| sample_error(x, e))?;
        set.xs.push(x);
        set.yf.push(y);
        set.yt.push(horner(coefficients, x - x0));
    }
    Ok(set)
}

fn sample_error(x: f64, err: TaylorError) -> TaylorError {
    let message = match err {
        TaylorError::Evaluation { message, .. } => message,
        other => other.to_string(),
    };
    TaylorError::evaluation(None, format!("sampling at x = {x}: {message}"))
}
