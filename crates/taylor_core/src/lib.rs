//! The `taylor_core` crate builds Taylor approximations of single-variable
//! expressions: coefficients, plot samples and a LaTeX rendering of the polynomial.
//!
//! Key components:
//! - **Traits**: `SymbolicEngine` (parse, simplify, differentiate, compile) and `Evaluate`.
//! - **Equation Engine**: parser, AST and a bytecode VM over `f64` with a complex fallback.
//! - **Symbolic**: differentiation rules and a sum-of-products simplifier.
//! - **Pipeline / Coefficients / Sampler / LaTeX**: the stages of one build.
//! - **Worker / Debounce**: a background build thread and the debounced hook in front of it.
pub mod cancel;
pub mod coefficients;
pub mod debounce;
pub mod equation_engine;
pub mod error;
pub mod latex;
pub mod numeric;
pub mod pipeline;
pub mod sampler;
pub mod symbolic;
pub mod traits;
pub mod worker;

pub use error::{Result, TaylorError};
