use crate::cancel::CancellationToken;
use crate::equation_engine::VARIABLE;
use crate::error::Result;
use crate::traits::SymbolicEngine;
use log::trace;

/// The compiled original expression and its first `order` derivatives.
#[derive(Debug)]
pub struct DerivativeChain<P> {
    pub original: P,
    /// `derivatives[k - 1]` is the k-th derivative.
    pub derivatives: Vec<P>,
}

impl<P> DerivativeChain<P> {
    pub fn order(&self) -> usize {
        self.derivatives.len()
    }

    /// Programs in derivative order, starting with the original.
    pub fn programs(&self) -> impl Iterator<Item = &P> {
        std::iter::once(&self.original).chain(self.derivatives.iter())
    }
}

/// Parses `expression` once and differentiates it `order` times.
pub fn build_chain<E: SymbolicEngine>(
    engine: &E,
    expression: &str,
    order: usize,
    simplify: bool,
    token: Option<&CancellationToken>,
) -> Result<DerivativeChain<E::Program>> {
    let parsed = engine.parse(expression)?;
    checkpoint(token)?;
    differentiate(engine, parsed, order, simplify, token)
}

/// Compiles `parsed` and its first `order` derivatives, each derivative taken
/// from the previous one.
///
/// With `simplify` set, every tree, the original included, is simplified
/// before it is compiled or differentiated further. The token, when given, is
/// checked after every derivative.
pub fn differentiate<E: SymbolicEngine>(
    engine: &E,
    parsed: E::Node,
    order: usize,
    simplify: bool,
    token: Option<&CancellationToken>,
) -> Result<DerivativeChain<E::Program>> {
    let mut current = if simplify {
        engine.simplify(&parsed)
    } else {
        parsed
    };
    let original = engine.compile(&current)?;

    let mut derivatives = Vec::with_capacity(order);
    for k in 1..=order {
        let next = engine.derivative(&current, VARIABLE)?;
        current = if simplify { engine.simplify(&next) } else { next };
        trace!("derivative {k}: {current:?}");
        derivatives.push(engine.compile(&current)?);
        checkpoint(token)?;
    }

    Ok(DerivativeChain {
        original,
        derivatives,
    })
}

pub(crate) fn checkpoint(token: Option<&CancellationToken>) -> Result<()> {
    token.map_or(Ok(()), CancellationToken::check)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equation_engine::{Expr, NativeEngine, Program};
    use crate::error::TaylorError;
    use crate::numeric::to_real;
    use crate::traits::Evaluate;
    use std::cell::Cell;

    fn values_at(chain: &DerivativeChain<impl Evaluate>, x: f64) -> Vec<f64> {
        chain
            .programs()
            .map(|p| to_real(&p.evaluate(x).unwrap()).unwrap())
            .collect()
    }

    #[test]
    fn cubic_chain() {
        let chain = build_chain(&NativeEngine, "x^3", 4, true, None).unwrap();
        assert_eq!(chain.order(), 4);
        assert_eq!(values_at(&chain, 2.0), vec![8.0, 12.0, 12.0, 6.0, 0.0]);
    }

    #[test]
    fn unsimplified_chain_has_same_values() {
        let simple = build_chain(&NativeEngine, "x sin(x)", 3, true, None).unwrap();
        let raw = build_chain(&NativeEngine, "x sin(x)", 3, false, None).unwrap();
        for (a, b) in values_at(&simple, 0.8).iter().zip(values_at(&raw, 0.8)) {
            assert!((a - b).abs() < 1e-12, "{a} vs {b}");
        }
    }

    #[test]
    fn order_zero_only_compiles_the_original() {
        let chain = build_chain(&NativeEngine, "floor(x)", 0, true, None).unwrap();
        assert_eq!(chain.order(), 0);
        assert_eq!(values_at(&chain, 2.5), vec![2.0]);

        let err = build_chain(&NativeEngine, "floor(x)", 1, true, None).unwrap_err();
        assert!(matches!(err, TaylorError::Differentiation(_)));
    }

    #[test]
    fn parse_errors_surface() {
        let err = build_chain(&NativeEngine, "x +* ", 2, true, None).unwrap_err();
        assert!(matches!(err, TaylorError::Parse(_)));
        let err = build_chain(&NativeEngine, "foo(x)", 1, true, None).unwrap_err();
        assert!(matches!(err, TaylorError::Parse(_)));
    }

    #[test]
    fn cancelled_token_stops_the_chain() {
        let token = CancellationToken::new();
        token.cancel();
        let err = build_chain(&NativeEngine, "exp(x)", 5, true, Some(&token)).unwrap_err();
        assert_eq!(err, TaylorError::Cancelled);
    }

    #[test]
    fn original_is_compiled_after_simplification() {
        let chain = build_chain(&NativeEngine, "x^2/x", 1, true, None).unwrap();
        assert_eq!(values_at(&chain, 0.0), vec![0.0, 1.0]);

        let raw = build_chain(&NativeEngine, "x^2/x", 1, false, None).unwrap();
        let at_zero = to_real(&raw.original.evaluate(0.0).unwrap()).unwrap();
        assert!(at_zero.is_nan());
    }

    /// Cancels its token once `after` derivatives have been taken.
    struct CancelAfter {
        token: CancellationToken,
        after: usize,
        taken: Cell<usize>,
    }

    impl SymbolicEngine for CancelAfter {
        type Node = Expr;
        type Program = Program;

        fn parse(&self, source: &str) -> Result<Expr> {
            NativeEngine.parse(source)
        }

        fn simplify(&self, node: &Expr) -> Expr {
            NativeEngine.simplify(node)
        }

        fn derivative(&self, node: &Expr, variable: &str) -> Result<Expr> {
            self.taken.set(self.taken.get() + 1);
            if self.taken.get() == self.after {
                self.token.cancel();
            }
            NativeEngine.derivative(node, variable)
        }

        fn compile(&self, node: &Expr) -> Result<Program> {
            NativeEngine.compile(node)
        }
    }

    #[test]
    fn cancellation_between_derivatives_stops_the_chain() {
        let token = CancellationToken::new();
        let engine = CancelAfter {
            token: token.clone(),
            after: 2,
            taken: Cell::new(0),
        };
        let err = build_chain(&engine, "exp(x)", 6, true, Some(&token)).unwrap_err();
        assert_eq!(err, TaylorError::Cancelled);
        assert_eq!(engine.taken.get(), 2);
    }
}
