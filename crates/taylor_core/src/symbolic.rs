//! Symbolic differentiation and simplification of [`Expr`] trees.
//!
//! Simplification rewrites a tree into a sum of terms, each a coefficient
//! times a product of `base^exponent` factors. Like terms are collected, equal
//! bases are merged and constant subtrees are folded, exactly where possible.
//! Repeated differentiation stays compact as long as every step is simplified.

use crate::equation_engine::{apply_function, is_function, Expr};
use crate::error::{Result, TaylorError};
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, ToPrimitive, Zero};

/// Products of sums are expanded only while the expansion stays this small.
const DISTRIBUTE_LIMIT: usize = 64;
/// Largest integer exponent folded exactly on rationals.
const MAX_EXACT_POWER: u64 = 64;
/// Integral float results below this magnitude fold to exact integers (2^53).
const EXACT_INTEGER_LIMIT: f64 = 9_007_199_254_740_992.0;

// --- Differentiation ---

/// Differentiates `expr` with respect to `variable`. The result is not simplified.
pub fn derivative(expr: &Expr, variable: &str) -> Result<Expr> {
    match expr {
        Expr::Variable(name) if is_function(name) => Err(TaylorError::Differentiation(format!(
            "Cannot differentiate function '{name}' without an argument"
        ))),
        _ if !expr.depends_on(variable) => Ok(Expr::integer(0)),
        Expr::Number(_) | Expr::Rational(_) => Ok(Expr::integer(0)),
        Expr::Variable(_) => Ok(Expr::integer(1)),
        Expr::Unary('-', operand) => Ok(Expr::neg(derivative(operand, variable)?)),
        Expr::Unary(op, _) => Err(TaylorError::Differentiation(format!(
            "Unknown unary operator: {op}"
        ))),
        Expr::Binary(left, op, right) => binary_derivative(left, *op, right, variable),
        Expr::Call(name, arg) => {
            let outer = function_derivative(name, arg)?;
            let inner = derivative(arg, variable)?;
            Ok(Expr::binary(outer, '*', inner))
        }
    }
}

fn binary_derivative(left: &Expr, op: char, right: &Expr, variable: &str) -> Result<Expr> {
    let dl = || derivative(left, variable);
    let dr = || derivative(right, variable);
    let expr = match op {
        '+' | '-' => Expr::binary(dl()?, op, dr()?),
        '*' => {
            if !left.depends_on(variable) {
                Expr::binary(left.clone(), '*', dr()?)
            } else if !right.depends_on(variable) {
                Expr::binary(dl()?, '*', right.clone())
            } else {
                Expr::binary(
                    Expr::binary(dl()?, '*', right.clone()),
                    '+',
                    Expr::binary(left.clone(), '*', dr()?),
                )
            }
        }
        '/' => {
            if !right.depends_on(variable) {
                Expr::binary(dl()?, '/', right.clone())
            } else {
                let numerator = Expr::binary(
                    Expr::binary(dl()?, '*', right.clone()),
                    '-',
                    Expr::binary(left.clone(), '*', dr()?),
                );
                Expr::binary(
                    numerator,
                    '/',
                    Expr::binary(right.clone(), '^', Expr::integer(2)),
                )
            }
        }
        '^' => power_derivative(left, right, variable)?,
        _ => {
            return Err(TaylorError::Differentiation(format!(
                "Unknown binary operator: {op}"
            )))
        }
    };
    Ok(expr)
}

fn power_derivative(base: &Expr, exponent: &Expr, variable: &str) -> Result<Expr> {
    if !exponent.depends_on(variable) {
        // n * u^(n - 1) * u'
        let lowered = Expr::binary(
            base.clone(),
            '^',
            Expr::binary(exponent.clone(), '-', Expr::integer(1)),
        );
        return Ok(Expr::binary(
            Expr::binary(exponent.clone(), '*', lowered),
            '*',
            derivative(base, variable)?,
        ));
    }

    let power = Expr::binary(base.clone(), '^', exponent.clone());
    let d_exponent = derivative(exponent, variable)?;
    if !base.depends_on(variable) {
        // a^v * ln(a) * v'
        return Ok(Expr::binary(
            Expr::binary(power, '*', Expr::call("ln", base.clone())),
            '*',
            d_exponent,
        ));
    }

    // u^v * (v' * ln(u) + v * u' / u)
    let inner = Expr::binary(
        Expr::binary(d_exponent, '*', Expr::call("ln", base.clone())),
        '+',
        Expr::binary(
            Expr::binary(exponent.clone(), '*', derivative(base, variable)?),
            '/',
            base.clone(),
        ),
    );
    Ok(Expr::binary(power, '*', inner))
}

/// Derivative of `name(u)` with respect to `u`.
fn function_derivative(name: &str, arg: &Expr) -> Result<Expr> {
    let u = || arg.clone();
    let one = || Expr::integer(1);
    let square = |e: Expr| Expr::binary(e, '^', Expr::integer(2));
    let inverse_root = || {
        Expr::binary(
            one(),
            '/',
            Expr::call("sqrt", Expr::binary(one(), '-', square(u()))),
        )
    };

    let expr = match name {
        "sin" => Expr::call("cos", u()),
        "cos" => Expr::neg(Expr::call("sin", u())),
        "tan" => Expr::binary(one(), '/', square(Expr::call("cos", u()))),
        "asin" => inverse_root(),
        "acos" => Expr::neg(inverse_root()),
        "atan" => Expr::binary(one(), '/', Expr::binary(one(), '+', square(u()))),
        "sinh" => Expr::call("cosh", u()),
        "cosh" => Expr::call("sinh", u()),
        "tanh" => Expr::binary(one(), '/', square(Expr::call("cosh", u()))),
        "exp" => Expr::call("exp", u()),
        "ln" | "log" => Expr::binary(one(), '/', u()),
        "sqrt" => Expr::binary(
            one(),
            '/',
            Expr::binary(Expr::integer(2), '*', Expr::call("sqrt", u())),
        ),
        "abs" => Expr::binary(u(), '/', Expr::call("abs", u())),
        "floor" | "ceil" | "round" | "sign" => {
            return Err(TaylorError::Differentiation(format!(
                "'{name}' is not differentiable"
            )))
        }
        _ => {
            return Err(TaylorError::Differentiation(format!(
                "Unknown function: {name}"
            )))
        }
    };
    Ok(expr)
}

// --- Simplification ---

/// Rewrites `expr` into collected sum-of-products form.
pub fn simplify(expr: &Expr) -> Expr {
    normalize(expr).render()
}

#[derive(Debug, Clone, PartialEq)]
enum Coefficient {
    Exact(BigRational),
    Float(f64),
}

impl Coefficient {
    fn zero() -> Self {
        Coefficient::Exact(BigRational::zero())
    }

    fn one() -> Self {
        Coefficient::Exact(BigRational::one())
    }

    fn integer(value: i64) -> Self {
        Coefficient::Exact(BigRational::from_integer(BigInt::from(value)))
    }

    fn from_expr(expr: &Expr) -> Option<Self> {
        match expr {
            Expr::Rational(r) => Some(Coefficient::Exact(r.clone())),
            Expr::Number(v) => Some(Coefficient::Float(*v)),
            Expr::Unary('-', inner) => Coefficient::from_expr(inner).map(|c| c.neg()),
            _ => None,
        }
    }

    fn to_expr(&self) -> Expr {
        match self {
            Coefficient::Exact(r) => Expr::Rational(r.clone()),
            Coefficient::Float(v) => Expr::Number(*v),
        }
    }

    fn to_f64(&self) -> f64 {
        match self {
            Coefficient::Exact(r) => r.to_f64().unwrap_or(f64::NAN),
            Coefficient::Float(v) => *v,
        }
    }

    fn is_zero(&self) -> bool {
        match self {
            Coefficient::Exact(r) => r.is_zero(),
            Coefficient::Float(v) => *v == 0.0,
        }
    }

    fn is_one(&self) -> bool {
        match self {
            Coefficient::Exact(r) => r.is_one(),
            Coefficient::Float(v) => *v == 1.0,
        }
    }

    fn is_negative(&self) -> bool {
        match self {
            Coefficient::Exact(r) => r.is_negative(),
            Coefficient::Float(v) => *v < 0.0,
        }
    }

    fn as_integer(&self) -> Option<i64> {
        match self {
            Coefficient::Exact(r) if r.is_integer() => r.to_integer().to_i64(),
            Coefficient::Float(v) if v.fract() == 0.0 && v.abs() < EXACT_INTEGER_LIMIT => {
                Some(*v as i64)
            }
            _ => None,
        }
    }

    fn add(&self, other: &Self) -> Self {
        match (self, other) {
            (Coefficient::Exact(a), Coefficient::Exact(b)) => Coefficient::Exact(a + b),
            _ => Coefficient::Float(self.to_f64() + other.to_f64()),
        }
    }

    fn mul(&self, other: &Self) -> Self {
        match (self, other) {
            (Coefficient::Exact(a), Coefficient::Exact(b)) => Coefficient::Exact(a * b),
            (Coefficient::Exact(a), _) | (_, Coefficient::Exact(a)) if a.is_zero() => {
                Coefficient::zero()
            }
            _ => Coefficient::Float(self.to_f64() * other.to_f64()),
        }
    }

    fn neg(&self) -> Self {
        match self {
            Coefficient::Exact(r) => Coefficient::Exact(-r.clone()),
            Coefficient::Float(v) => Coefficient::Float(-v),
        }
    }

    fn abs(&self) -> Self {
        match self {
            Coefficient::Exact(r) => Coefficient::Exact(r.abs()),
            Coefficient::Float(v) => Coefficient::Float(v.abs()),
        }
    }

    /// `None` when the power has no finite real value (`0^-1`, `(-8)^(1/3)`).
    fn pow(&self, exponent: &Self) -> Option<Self> {
        if let (Coefficient::Exact(base), Some(n)) = (self, exponent.as_integer()) {
            if n.unsigned_abs() <= MAX_EXACT_POWER {
                if n < 0 && base.is_zero() {
                    return None;
                }
                let power = num_traits::pow(base.clone(), n.unsigned_abs() as usize);
                return Some(Coefficient::Exact(if n < 0 { power.recip() } else { power }));
            }
        }
        let value = self.to_f64().powf(exponent.to_f64());
        value.is_finite().then_some(Coefficient::Float(value))
    }
}

fn is_constant(expr: &Expr, predicate: impl Fn(&Coefficient) -> bool) -> bool {
    Coefficient::from_expr(expr).map_or(false, |c| predicate(&c))
}

/// `base^exponent`
#[derive(Debug, Clone, PartialEq)]
struct Factor {
    base: Expr,
    exponent: Expr,
}

impl Factor {
    fn key(&self) -> String {
        self.base.to_string()
    }

    fn render(&self) -> Expr {
        if is_constant(&self.exponent, Coefficient::is_one) {
            self.base.clone()
        } else {
            Expr::binary(self.base.clone(), '^', self.exponent.clone())
        }
    }
}

/// A coefficient times factors kept sorted by base.
#[derive(Debug, Clone)]
struct Term {
    coefficient: Coefficient,
    factors: Vec<Factor>,
}

impl Term {
    fn key(&self) -> String {
        self.factors
            .iter()
            .map(|f| f.render().to_string())
            .collect::<Vec<_>>()
            .join("*")
    }

    fn mul(&self, other: &Term) -> Term {
        let mut factors = self.factors.clone();
        for factor in &other.factors {
            match factors.iter().position(|f| f.base == factor.base) {
                Some(i) => {
                    let exponent = normalize(&factors[i].exponent)
                        .add(normalize(&factor.exponent))
                        .render();
                    if is_constant(&exponent, Coefficient::is_zero) {
                        factors.remove(i);
                    } else {
                        factors[i].exponent = exponent;
                    }
                }
                None => factors.push(factor.clone()),
            }
        }
        factors.sort_by_cached_key(Factor::key);
        Term {
            coefficient: self.coefficient.mul(&other.coefficient),
            factors,
        }
    }

    /// Negative constant exponents are written as a denominator.
    fn render(&self) -> Expr {
        if self.factors.is_empty() {
            return self.coefficient.to_expr();
        }
        let mut numerator = Vec::new();
        let mut denominator = Vec::new();
        for factor in &self.factors {
            match Coefficient::from_expr(&factor.exponent) {
                Some(c) if c.is_negative() => denominator.push(
                    Factor {
                        base: factor.base.clone(),
                        exponent: c.neg().to_expr(),
                    }
                    .render(),
                ),
                _ => numerator.push(factor.render()),
            }
        }
        let product = |exprs: Vec<Expr>| exprs.into_iter().reduce(|a, b| Expr::binary(a, '*', b));

        let negate = self.coefficient.is_negative() && self.coefficient.abs().is_one();
        let lead = if negate {
            Coefficient::one()
        } else {
            self.coefficient.clone()
        };
        if !lead.is_one() {
            numerator.insert(0, lead.to_expr());
        }
        let mut expr = product(numerator).unwrap_or_else(|| lead.to_expr());
        if let Some(den) = product(denominator) {
            expr = Expr::binary(expr, '/', den);
        }
        if negate {
            Expr::neg(expr)
        } else {
            expr
        }
    }
}

/// Sum of terms with distinct factor lists and non-zero coefficients.
#[derive(Debug, Clone)]
struct Sum {
    terms: Vec<Term>,
}

impl Sum {
    fn from_terms(terms: Vec<Term>) -> Self {
        let mut collected: Vec<Term> = Vec::with_capacity(terms.len());
        for term in terms {
            match collected.iter_mut().find(|t| t.factors == term.factors) {
                Some(existing) => {
                    existing.coefficient = existing.coefficient.add(&term.coefficient)
                }
                None => collected.push(term),
            }
        }
        collected.retain(|t| !t.coefficient.is_zero());
        collected.sort_by_cached_key(Term::key);
        Sum { terms: collected }
    }

    fn constant(value: Coefficient) -> Self {
        Sum::from_terms(vec![Term {
            coefficient: value,
            factors: Vec::new(),
        }])
    }

    fn power(base: Expr, exponent: Expr) -> Self {
        Sum {
            terms: vec![Term {
                coefficient: Coefficient::one(),
                factors: vec![Factor { base, exponent }],
            }],
        }
    }

    fn atom(expr: Expr) -> Self {
        Sum::power(expr, Expr::integer(1))
    }

    fn as_constant(&self) -> Option<Coefficient> {
        match self.terms.as_slice() {
            [] => Some(Coefficient::zero()),
            [term] if term.factors.is_empty() => Some(term.coefficient.clone()),
            _ => None,
        }
    }

    fn into_term(mut self) -> Term {
        if self.terms.len() == 1 {
            if let Some(term) = self.terms.pop() {
                return term;
            }
        }
        let base = self.render();
        Term {
            coefficient: Coefficient::one(),
            factors: vec![Factor {
                base,
                exponent: Expr::integer(1),
            }],
        }
    }

    fn add(self, other: Sum) -> Sum {
        let mut terms = self.terms;
        terms.extend(other.terms);
        Sum::from_terms(terms)
    }

    fn scale(self, by: &Coefficient) -> Sum {
        let terms = self
            .terms
            .into_iter()
            .map(|t| Term {
                coefficient: t.coefficient.mul(by),
                factors: t.factors,
            })
            .collect();
        Sum::from_terms(terms)
    }

    fn mul(self, other: Sum) -> Sum {
        let (n, m) = (self.terms.len(), other.terms.len());
        if n <= 1 || m <= 1 || n * m <= DISTRIBUTE_LIMIT {
            let terms = self
                .terms
                .iter()
                .flat_map(|a| other.terms.iter().map(move |b| a.mul(b)))
                .collect();
            return Sum::from_terms(terms);
        }
        Sum::from_terms(vec![self.into_term().mul(&other.into_term())])
    }

    fn pow(self, exponent: Sum) -> Sum {
        let Some(power) = exponent.as_constant() else {
            return Sum::power(self.render(), exponent.render());
        };
        if power.is_zero() {
            return Sum::constant(Coefficient::one());
        }
        if power.is_one() {
            return self;
        }
        if let Some(base) = self.as_constant() {
            return match base.pow(&power) {
                Some(value) => Sum::constant(value),
                None => Sum::power(base.to_expr(), power.to_expr()),
            };
        }
        // (c * a^p * b^q)^n = c^n * a^(p*n) * b^(q*n) for integer n.
        if let (Some(n), [term]) = (power.as_integer(), self.terms.as_slice()) {
            let n = Coefficient::integer(n);
            if let Some(coefficient) = term.coefficient.pow(&n) {
                let factors = term
                    .factors
                    .iter()
                    .map(|f| Factor {
                        base: f.base.clone(),
                        exponent: normalize(&f.exponent).scale(&n).render(),
                    })
                    .collect();
                return Sum::from_terms(vec![Term {
                    coefficient,
                    factors,
                }]);
            }
        }
        Sum::power(self.render(), power.to_expr())
    }

    fn render(&self) -> Expr {
        let mut terms = self.terms.iter();
        let Some(first) = terms.next() else {
            return Expr::integer(0);
        };
        terms.fold(first.render(), |acc, term| {
            if term.coefficient.is_negative() {
                let positive = Term {
                    coefficient: term.coefficient.neg(),
                    factors: term.factors.clone(),
                };
                Expr::binary(acc, '-', positive.render())
            } else {
                Expr::binary(acc, '+', term.render())
            }
        })
    }
}

fn normalize(expr: &Expr) -> Sum {
    match expr {
        Expr::Number(v) => Sum::constant(Coefficient::Float(*v)),
        Expr::Rational(r) => Sum::constant(Coefficient::Exact(r.clone())),
        Expr::Variable(_) => Sum::atom(expr.clone()),
        Expr::Unary('-', operand) => normalize(operand).scale(&Coefficient::integer(-1)),
        Expr::Unary(..) => Sum::atom(expr.clone()),
        Expr::Binary(left, op, right) => {
            let (a, b) = (normalize(left), normalize(right));
            match op {
                '+' => a.add(b),
                '-' => a.add(b.scale(&Coefficient::integer(-1))),
                '*' => a.mul(b),
                '/' => a.mul(b.pow(Sum::constant(Coefficient::integer(-1)))),
                '^' => a.pow(b),
                _ => Sum::atom(expr.clone()),
            }
        }
        Expr::Call(name, arg) => fold_call(name, normalize(arg)),
    }
}

/// Folds calls with constant arguments. Integral results of exact arguments
/// stay exact, e.g. `cos(0)` is `1`.
fn fold_call(name: &str, arg: Sum) -> Sum {
    let arg_expr = arg.render();
    if matches!(name, "ln" | "log") && arg_expr == Expr::var("e") {
        return Sum::constant(Coefficient::one());
    }
    let Some(value) = arg.as_constant() else {
        return Sum::atom(Expr::call(name, arg_expr));
    };
    match apply_function(name, value.to_f64()) {
        Some(result) if result.is_finite() => {
            let exact = matches!(value, Coefficient::Exact(_))
                && result.fract() == 0.0
                && result.abs() < EXACT_INTEGER_LIMIT;
            Sum::constant(if exact {
                Coefficient::integer(result as i64)
            } else {
                Coefficient::Float(result)
            })
        }
        _ => Sum::atom(Expr::call(name, arg_expr)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equation_engine::{parse, Compiler, VARIABLE};
    use crate::numeric::to_real;
    use crate::traits::Evaluate;
    use approx::assert_relative_eq;

    fn simplified(source: &str) -> Expr {
        simplify(&parse(source).expect("expression should parse"))
    }

    fn value_at(expr: &Expr, x: f64) -> f64 {
        let program = Compiler::new(VARIABLE).compile(expr).expect("compiles");
        to_real(&program.evaluate(x).expect("evaluates")).expect("real")
    }

    fn derivative_at(source: &str, x: f64) -> f64 {
        let d = derivative(&parse(source).unwrap(), VARIABLE).expect("differentiable");
        value_at(&simplify(&d), x)
    }

    #[test]
    fn polynomial_derivatives_reduce_to_constants() {
        let f = parse("x^2").unwrap();
        let d1 = simplify(&derivative(&f, VARIABLE).unwrap());
        assert_eq!(d1.to_string(), "2 * x");
        let d2 = simplify(&derivative(&d1, VARIABLE).unwrap());
        assert_eq!(d2, Expr::integer(2));
        let d3 = simplify(&derivative(&d2, VARIABLE).unwrap());
        assert_eq!(d3, Expr::integer(0));
    }

    #[test]
    fn exp_is_its_own_derivative() {
        let f = parse("exp(x)").unwrap();
        let d = simplify(&derivative(&f, VARIABLE).unwrap());
        assert_eq!(d.to_string(), "exp(x)");
    }

    #[test]
    fn collects_like_terms_and_bases() {
        assert_eq!(simplified("x + x + 2x").to_string(), "4 * x");
        assert_eq!(simplified("x * x * x").to_string(), "x^3");
        assert_eq!(simplified("x / x"), Expr::integer(1));
        assert_eq!(simplified("x^2 / x").to_string(), "x");
        assert_eq!(simplified("x - x"), Expr::integer(0));
        assert_eq!(simplified("(x + 1)(x - 1)").to_string(), "-1 + x^2");
        assert_eq!(simplified("2 / x^2").to_string(), "2 / x^2");
        assert_eq!(simplified("-(x * 1)").to_string(), "-x");
    }

    #[test]
    fn folds_constants_exactly_when_possible() {
        assert_eq!(simplified("2^10"), Expr::integer(1024));
        assert_eq!(
            simplified("1/3 + 1/6"),
            Expr::Rational(BigRational::new(BigInt::from(1), BigInt::from(2)))
        );
        assert_eq!(simplified("cos(0)"), Expr::integer(1));
        assert_eq!(simplified("ln(e)"), Expr::integer(1));
        assert!(matches!(simplified("sqrt(2)"), Expr::Number(_)));
        // Symbolic constants and undefined powers are left alone.
        assert_eq!(simplified("pi").to_string(), "pi");
        assert_eq!(simplified("1 / 0").to_string(), "1 / 0");
    }

    #[test]
    fn simplification_preserves_values() {
        let sources = [
            "(x + 1)^2 / (x - 3)",
            "sin(x)^2 + cos(x)^2",
            "2^x * 2^x",
            "x^(1/2) * x^(1/2)",
            "-(x - 2)^3 + 4x",
            "exp(x) * (1 + x) / x",
        ];
        for source in sources {
            let expr = parse(source).unwrap();
            let simple = simplify(&expr);
            for x in [0.4, 1.7, 2.5] {
                assert_relative_eq!(value_at(&expr, x), value_at(&simple, x), epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn chain_rule_and_elementary_functions() {
        let x: f64 = 0.5;
        assert_relative_eq!(derivative_at("sin(x)", x), x.cos(), epsilon = 1e-12);
        assert_relative_eq!(derivative_at("cos(2x)", x), -2.0 * (2.0 * x).sin(), epsilon = 1e-12);
        assert_relative_eq!(derivative_at("tan(x)", x), 1.0 / x.cos().powi(2), epsilon = 1e-12);
        assert_relative_eq!(derivative_at("asin(x)", x), 1.0 / (1.0 - x * x).sqrt(), epsilon = 1e-12);
        assert_relative_eq!(derivative_at("acos(x)", x), -1.0 / (1.0 - x * x).sqrt(), epsilon = 1e-12);
        assert_relative_eq!(derivative_at("atan(x)", x), 1.0 / (1.0 + x * x), epsilon = 1e-12);
        assert_relative_eq!(derivative_at("tanh(x)", x), 1.0 / x.cosh().powi(2), epsilon = 1e-12);
        assert_relative_eq!(derivative_at("ln(x)", x), 2.0, epsilon = 1e-12);
        assert_relative_eq!(derivative_at("sqrt(x)", 4.0), 0.25, epsilon = 1e-12);
        assert_relative_eq!(derivative_at("abs(x)", -2.0), -1.0, epsilon = 1e-12);
        assert_relative_eq!(derivative_at("x / (1 + x)", 1.0), 0.25, epsilon = 1e-12);
    }

    #[test]
    fn general_powers() {
        let x: f64 = 1.5;
        assert_relative_eq!(
            derivative_at("x^x", x),
            x.powf(x) * (x.ln() + 1.0),
            epsilon = 1e-12
        );
        assert_relative_eq!(
            derivative_at("2^x", x),
            2f64.powf(x) * 2f64.ln(),
            epsilon = 1e-12
        );
        assert_relative_eq!(derivative_at("e^(3x)", x), 3.0 * (3.0 * x).exp(), epsilon = 1e-9);
    }

    #[test]
    fn repeated_derivatives_stay_compact() {
        let mut expr = parse("exp(x) * cos(x)").unwrap();
        for _ in 0..12 {
            expr = simplify(&derivative(&expr, VARIABLE).unwrap());
        }
        assert!(expr.to_string().len() < 80, "{expr}");
        // d^4/dx^4 of e^x cos x is -4 e^x cos x, so the 12th is -64 e^x cos x.
        assert_relative_eq!(
            value_at(&expr, 0.3),
            -64.0 * 0.3f64.exp() * 0.3f64.cos(),
            epsilon = 1e-9
        );
    }

    #[test]
    fn discontinuous_functions_are_not_differentiable() {
        for source in ["floor(x)", "ceil(x)", "round(x)", "sign(x)", "sin"] {
            let err = derivative(&parse(source).unwrap(), VARIABLE).expect_err(source);
            assert!(matches!(err, TaylorError::Differentiation(_)), "{source}");
        }
        // Constant arguments differentiate to zero.
        assert_eq!(
            derivative(&parse("floor(2)").unwrap(), VARIABLE).unwrap(),
            Expr::integer(0)
        );
    }
}
