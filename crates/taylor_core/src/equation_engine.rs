use crate::error::{Result, TaylorError};
use crate::numeric::{Decimal, Value};
use crate::symbolic;
use crate::traits::{Evaluate, Scalar, SymbolicEngine};
use num_bigint::BigInt;
use num_complex::Complex64;
use num_rational::BigRational;
use num_traits::ToPrimitive;
use std::cell::RefCell;
use std::fmt;

/// Name of the single free variable of every expression.
pub const VARIABLE: &str = "x";

/// Unary functions understood by the parser, compiler and differentiator.
/// `log` is the natural logarithm.
pub const KNOWN_FUNCTIONS: &[&str] = &[
    "sin", "cos", "tan", "asin", "acos", "atan", "sinh", "cosh", "tanh", "exp", "ln", "log",
    "sqrt", "abs", "floor", "ceil", "round", "sign",
];

/// Named constants. They stay symbolic in trees and are resolved by the compiler.
pub const KNOWN_CONSTANTS: &[&str] = &["pi", "e"];

/// Largest decimal exponent accepted in a numeric literal.
const MAX_LITERAL_EXPONENT: i64 = 1000;

/// Deepest expression tree, and deepest parser recursion, a source may produce.
/// The symbolic passes recurse over the tree, so this bounds their stack use.
pub const MAX_EXPRESSION_DEPTH: usize = 256;

pub fn is_function(name: &str) -> bool {
    KNOWN_FUNCTIONS.contains(&name)
}

pub fn constant_value(name: &str) -> Option<f64> {
    match name {
        "pi" => Some(std::f64::consts::PI),
        "e" => Some(std::f64::consts::E),
        _ => None,
    }
}

/// OpCodes for the Stack-based Virtual Machine.
/// The VM operates on a stack of `Scalar` values (f64 or Complex64).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpCode {
    /// Pushes a constant `f64` value onto the stack.
    LoadConst(f64),
    /// Pushes the value of the free variable onto the stack.
    LoadVar,
    /// Pops top two values (b, a), pushes (a + b).
    Add,
    /// Pops top two values (b, a), pushes (a - b).
    Sub,
    /// Pops top two values (b, a), pushes (a * b).
    Mul,
    /// Pops top two values (b, a), pushes (a / b).
    Div,
    /// Pops top two values (b, a), pushes (a ^ b).
    Pow,
    /// Pops top value (a), pushes -a.
    Neg,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Exp,
    Ln,
    Sqrt,
    Abs,
    Floor,
    Ceil,
    Round,
    Sign,
}

fn function_opcode(name: &str) -> Option<OpCode> {
    let op = match name {
        "sin" => OpCode::Sin,
        "cos" => OpCode::Cos,
        "tan" => OpCode::Tan,
        "asin" => OpCode::Asin,
        "acos" => OpCode::Acos,
        "atan" => OpCode::Atan,
        "sinh" => OpCode::Sinh,
        "cosh" => OpCode::Cosh,
        "tanh" => OpCode::Tanh,
        "exp" => OpCode::Exp,
        "ln" | "log" => OpCode::Ln,
        "sqrt" => OpCode::Sqrt,
        "abs" => OpCode::Abs,
        "floor" => OpCode::Floor,
        "ceil" => OpCode::Ceil,
        "round" => OpCode::Round,
        "sign" => OpCode::Sign,
        _ => return None,
    };
    Some(op)
}

/// Applies a named unary function to a real argument.
pub fn apply_function(name: &str, value: f64) -> Option<f64> {
    function_opcode(name).map(|op| apply_unary(op, value))
}

/// Represents a compiled sequence of operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bytecode {
    pub ops: Vec<OpCode>,
}

impl Bytecode {
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }
}

/// Stack-based Virtual Machine for evaluating equations.
///
/// The VM is stateless; `execute` takes all necessary context:
/// - `bytecode`: Instructions to run.
/// - `x`: Value of the free variable.
/// - `stack`: A mutable buffer for intermediate computations.
pub struct VM;

impl VM {
    /// Executes the bytecode and returns the value left on the stack.
    ///
    /// # Type Parameters
    /// * `T`: The scalar type (`f64` or `Complex64`).
    pub fn execute<T: Scalar>(bytecode: &Bytecode, x: T, stack: &mut Vec<T>) -> Result<T> {
        stack.clear();

        for op in &bytecode.ops {
            match op {
                OpCode::LoadConst(val) => stack.push(T::from_real(*val)),
                OpCode::LoadVar => stack.push(x),
                OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div | OpCode::Pow => {
                    let b = pop(stack)?;
                    let a = pop(stack)?;
                    stack.push(match op {
                        OpCode::Add => a + b,
                        OpCode::Sub => a - b,
                        OpCode::Mul => a * b,
                        OpCode::Div => a / b,
                        _ => pow(a, b),
                    });
                }
                unary => {
                    let a = pop(stack)?;
                    stack.push(apply_unary(*unary, a));
                }
            }
        }

        let result = pop(stack)?;
        if !stack.is_empty() {
            return Err(TaylorError::evaluation(None, "Malformed bytecode"));
        }
        Ok(result)
    }
}

fn pop<T>(stack: &mut Vec<T>) -> Result<T> {
    stack
        .pop()
        .ok_or_else(|| TaylorError::evaluation(None, "Stack underflow"))
}

fn pow<T: Scalar>(a: T, b: T) -> T {
    if b.im() == 0.0 {
        let exponent = b.re();
        if exponent.fract() == 0.0 && exponent.abs() <= i32::MAX as f64 {
            return a.powi(exponent as i32);
        }
        return a.powf(exponent);
    }
    (b * a.ln()).exp()
}

fn apply_unary<T: Scalar>(op: OpCode, a: T) -> T {
    match op {
        OpCode::Neg => -a,
        OpCode::Sin => a.sin(),
        OpCode::Cos => a.cos(),
        OpCode::Tan => a.tan(),
        OpCode::Asin => a.asin(),
        OpCode::Acos => a.acos(),
        OpCode::Atan => a.atan(),
        OpCode::Sinh => a.sinh(),
        OpCode::Cosh => a.cosh(),
        OpCode::Tanh => a.tanh(),
        OpCode::Exp => a.exp(),
        OpCode::Ln => a.ln(),
        OpCode::Sqrt => a.sqrt(),
        OpCode::Abs => T::from_real(a.abs()),
        OpCode::Floor => T::from_real(a.re().floor()),
        OpCode::Ceil => T::from_real(a.re().ceil()),
        OpCode::Round => T::from_real(a.re().round()),
        OpCode::Sign => {
            let re = a.re();
            T::from_real(if re == 0.0 || re.is_nan() { re } else { re.signum() })
        }
        // Binary and load operations never reach here.
        _ => T::from_real(f64::NAN),
    }
}

// --- AST ---

/// Abstract Syntax Tree nodes for expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Inexact constant, produced by folding irrational values.
    Number(f64),
    /// Exact constant. Every numeric literal parses to one of these.
    Rational(BigRational),
    Variable(String),
    Binary(Box<Expr>, char, Box<Expr>), // char is operator +, -, *, /, ^
    Unary(char, Box<Expr>),             // only '-'
    Call(String, Box<Expr>),            // functions like sin(x)
}

impl Expr {
    pub fn integer(value: i64) -> Self {
        Expr::Rational(BigRational::from_integer(BigInt::from(value)))
    }

    pub fn var(name: &str) -> Self {
        Expr::Variable(name.to_string())
    }

    pub fn binary(left: Expr, op: char, right: Expr) -> Self {
        Expr::Binary(Box::new(left), op, Box::new(right))
    }

    pub fn call(name: &str, arg: Expr) -> Self {
        Expr::Call(name.to_string(), Box::new(arg))
    }

    pub fn neg(expr: Expr) -> Self {
        Expr::Unary('-', Box::new(expr))
    }

    /// True if the expression mentions `variable` anywhere.
    pub fn depends_on(&self, variable: &str) -> bool {
        match self {
            Expr::Number(_) | Expr::Rational(_) => false,
            Expr::Variable(name) => name == variable,
            Expr::Binary(left, _, right) => left.depends_on(variable) || right.depends_on(variable),
            Expr::Unary(_, operand) | Expr::Call(_, operand) => operand.depends_on(variable),
        }
    }
}

fn precedence(op: char) -> u8 {
    match op {
        '+' | '-' => 1,
        '*' | '/' => 2,
        '^' => 4,
        _ => 0,
    }
}

/// Binding strength of an expression when it appears as an operand.
fn binding(expr: &Expr) -> u8 {
    match expr {
        Expr::Binary(_, op, _) => precedence(*op),
        Expr::Unary(..) => 3,
        Expr::Number(n) if *n < 0.0 => 3,
        Expr::Rational(r) if !r.is_integer() => 2,
        Expr::Rational(r) if *r < BigRational::from_integer(BigInt::from(0)) => 3,
        _ => 5,
    }
}

fn write_operand(f: &mut fmt::Formatter<'_>, expr: &Expr, min: u8) -> fmt::Result {
    if binding(expr) < min {
        write!(f, "({expr})")
    } else {
        write!(f, "{expr}")
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{n}"),
            Expr::Rational(r) => {
                if r.is_integer() {
                    write!(f, "{}", r.numer())
                } else {
                    write!(f, "{}/{}", r.numer(), r.denom())
                }
            }
            Expr::Variable(name) => write!(f, "{name}"),
            Expr::Binary(left, op, right) => {
                let prec = precedence(*op);
                // '^' is right-associative, the others are left-associative.
                let (left_min, right_min) = if *op == '^' {
                    (prec + 1, prec)
                } else {
                    (prec, prec + 1)
                };
                write_operand(f, left, left_min)?;
                if *op == '^' {
                    write!(f, "^")?;
                } else {
                    write!(f, " {op} ")?;
                }
                write_operand(f, right, right_min)
            }
            Expr::Unary(op, operand) => {
                write!(f, "{op}")?;
                write_operand(f, operand, 3)
            }
            Expr::Call(name, arg) => write!(f, "{name}({arg})"),
        }
    }
}

// --- Compiler ---

/// Compiles an AST (`Expr`) into `Bytecode`.
/// Resolves the free variable and named constants.
pub struct Compiler {
    pub variable: String,
}

impl Compiler {
    pub fn new(variable: &str) -> Self {
        Self {
            variable: variable.to_string(),
        }
    }

    /// Compiles a whole expression. Exact constants and bare function names
    /// compile to dedicated program kinds so evaluation can report them as such.
    pub fn compile(&self, expr: &Expr) -> Result<Program> {
        let kind = match expr {
            Expr::Rational(r) => ProgramKind::Constant(r.clone()),
            Expr::Variable(name) if is_function(name) => ProgramKind::Function(name.clone()),
            _ => ProgramKind::Bytecode(self.compile_bytecode(expr)?),
        };
        Ok(Program::new(kind))
    }

    pub fn compile_bytecode(&self, expr: &Expr) -> Result<Bytecode> {
        let mut ops = Vec::new();
        self.compile_recursive(expr, &mut ops)?;
        Ok(Bytecode { ops })
    }

    fn compile_recursive(&self, expr: &Expr, ops: &mut Vec<OpCode>) -> Result<()> {
        match expr {
            Expr::Number(n) => ops.push(OpCode::LoadConst(*n)),
            Expr::Rational(r) => ops.push(OpCode::LoadConst(r.to_f64().unwrap_or(f64::NAN))),
            Expr::Variable(name) => {
                if *name == self.variable {
                    ops.push(OpCode::LoadVar);
                } else if let Some(value) = constant_value(name) {
                    ops.push(OpCode::LoadConst(value));
                } else if is_function(name) {
                    return Err(TaylorError::Parse(format!(
                        "Function '{name}' used without an argument"
                    )));
                } else {
                    return Err(TaylorError::Parse(format!("Unknown variable: {name}")));
                }
            }
            Expr::Binary(left, op, right) => {
                self.compile_recursive(left, ops)?;
                self.compile_recursive(right, ops)?;
                match op {
                    '+' => ops.push(OpCode::Add),
                    '-' => ops.push(OpCode::Sub),
                    '*' => ops.push(OpCode::Mul),
                    '/' => ops.push(OpCode::Div),
                    '^' => ops.push(OpCode::Pow),
                    _ => {
                        return Err(TaylorError::Parse(format!(
                            "Unknown binary operator: {op}"
                        )))
                    }
                }
            }
            Expr::Unary(op, operand) => {
                self.compile_recursive(operand, ops)?;
                match op {
                    '-' => ops.push(OpCode::Neg),
                    _ => {
                        return Err(TaylorError::Parse(format!(
                            "Unknown unary operator: {op}"
                        )))
                    }
                }
            }
            Expr::Call(func, arg) => {
                self.compile_recursive(arg, ops)?;
                let op = function_opcode(func)
                    .ok_or_else(|| TaylorError::Parse(format!("Unknown function: {func}")))?;
                ops.push(op);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgramKind {
    Bytecode(Bytecode),
    Constant(BigRational),
    Function(String),
}

/// A compiled expression ready for repeated evaluation.
#[derive(Debug)]
pub struct Program {
    pub kind: ProgramKind,
    // Interior mutability for VM stack to avoid allocation in evaluate.
    // Note: This makes the program !Sync; each build owns its programs.
    stack: RefCell<Vec<f64>>,
}

impl Program {
    pub fn new(kind: ProgramKind) -> Self {
        Self {
            kind,
            stack: RefCell::new(Vec::with_capacity(64)),
        }
    }
}

impl Evaluate for Program {
    fn evaluate(&self, x: f64) -> Result<Value> {
        match &self.kind {
            ProgramKind::Constant(r) => Ok(Value::Rational(r.clone())),
            ProgramKind::Function(name) => Ok(Value::Function(name.clone())),
            ProgramKind::Bytecode(bytecode) => {
                let real = {
                    let mut stack = self.stack.borrow_mut();
                    VM::execute(bytecode, x, &mut stack)?
                };
                if !real.is_nan() || x.is_nan() {
                    return Ok(Value::Real(real));
                }
                // NaN on the real line: rerun over the complex plane so that
                // results like sqrt(-1) are reported as complex, not NaN.
                let mut stack = Vec::with_capacity(bytecode.ops.len());
                let complex = VM::execute(bytecode, Complex64::new(x, 0.0), &mut stack)?;
                if complex.is_nan() {
                    Ok(Value::Real(real))
                } else {
                    Ok(Value::Complex(complex))
                }
            }
        }
    }
}

// --- Simple Parser ---

/// Parses a string expression into an AST.
pub fn parse(input: &str) -> Result<Expr> {
    let tokens = insert_implicit_multiplication(tokenize(input)?);
    let mut parser = Parser {
        tokens,
        pos: 0,
        nesting: 0,
    };
    let (expr, _) = parser.parse_expression()?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(TaylorError::Parse(format!("Unexpected token {token}"))),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(String),
    Identifier(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(text) | Token::Identifier(text) => write!(f, "'{text}'"),
            Token::Plus => write!(f, "'+'"),
            Token::Minus => write!(f, "'-'"),
            Token::Star => write!(f, "'*'"),
            Token::Slash => write!(f, "'/'"),
            Token::Caret => write!(f, "'^'"),
            Token::LParen => write!(f, "'('"),
            Token::RParen => write!(f, "')'"),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() || c == '.' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            // Exponent only when digits follow; `2e` alone is 2 times e.
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                let digit_at = |k: usize| chars.get(k).map_or(false, |d| d.is_ascii_digit());
                let signed = matches!(chars.get(i + 1), Some('+') | Some('-'));
                if digit_at(i + 1) || (signed && digit_at(i + 2)) {
                    i += if signed { 2 } else { 1 };
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            tokens.push(Token::Number(chars[start..i].iter().collect()));
        } else if c.is_alphabetic() {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Identifier(chars[start..i].iter().collect()));
        } else {
            let token = match c {
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => Token::Star,
                '/' => Token::Slash,
                '^' => Token::Caret,
                '(' => Token::LParen,
                ')' => Token::RParen,
                _ => {
                    return Err(TaylorError::Parse(format!("Unexpected character '{c}'")));
                }
            };
            tokens.push(token);
            i += 1;
        }
    }
    Ok(tokens)
}

/// Check if implicit multiplication should be inserted between two tokens.
fn should_insert_mul(current: &Token, next: &Token) -> bool {
    match (current, next) {
        // A function name followed by '(' is a call, and a bare function
        // name never multiplies what follows it.
        (Token::Identifier(name), _) if is_function(name) => false,
        // 2x, 2 sin(x), x e, (x+1)x
        (Token::Number(_) | Token::Identifier(_) | Token::RParen, Token::Identifier(_)) => true,
        // 2(x), x(x+1), (x+1)(x-1)
        (Token::Number(_) | Token::Identifier(_) | Token::RParen, Token::LParen) => true,
        // (x+1)2
        (Token::RParen, Token::Number(_)) => true,
        _ => false,
    }
}

/// Inserts `*` where multiplication is implied, e.g. `2x` → `2 * x`.
fn insert_implicit_multiplication(tokens: Vec<Token>) -> Vec<Token> {
    let mut result = Vec::with_capacity(tokens.len());
    let mut it = tokens.into_iter().peekable();
    while let Some(token) = it.next() {
        let insert = it.peek().map_or(false, |next| should_insert_mul(&token, next));
        result.push(token);
        if insert {
            result.push(Token::Star);
        }
    }
    result
}

/// Converts a numeric literal (`12`, `1.5`, `.5`, `2e-3`) into an exact rational.
fn parse_number_literal(text: &str) -> Result<BigRational> {
    let (mantissa, exponent) = match text.find(|c: char| c == 'e' || c == 'E') {
        Some(idx) => {
            let exponent: i64 = text[idx + 1..]
                .parse()
                .map_err(|_| TaylorError::Parse(format!("Invalid number literal: {text}")))?;
            (&text[..idx], exponent)
        }
        None => (text, 0),
    };
    if exponent.abs() > MAX_LITERAL_EXPONENT {
        return Err(TaylorError::Parse(format!(
            "Number literal out of range: {text}"
        )));
    }
    let decimal: Decimal = mantissa
        .parse()
        .map_err(|_| TaylorError::Parse(format!("Invalid number literal: {text}")))?;
    let scale = BigRational::from_integer(BigInt::from(10u32).pow(exponent.unsigned_abs() as u32));
    let value = decimal.to_rational();
    Ok(if exponent >= 0 {
        value * scale
    } else {
        value / scale
    })
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Open `parse_unary` frames.
    nesting: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect_rparen(&mut self) -> Result<()> {
        match self.consume() {
            Some(Token::RParen) => Ok(()),
            Some(token) => Err(TaylorError::Parse(format!(
                "Expected ')' but found {token}"
            ))),
            None => Err(TaylorError::Parse("Expected ')'".to_string())),
        }
    }

    fn parse_expression(&mut self) -> Result<Parsed> {
        let (mut left, mut depth) = self.parse_term()?;

        while let Some(token) = self.peek() {
            let op = match token {
                Token::Plus => '+',
                Token::Minus => '-',
                _ => break,
            };
            self.consume();
            let (right, right_depth) = self.parse_term()?;
            (left, depth) = bounded(Expr::binary(left, op, right), 1 + depth.max(right_depth))?;
        }
        Ok((left, depth))
    }

    fn parse_term(&mut self) -> Result<Parsed> {
        let (mut left, mut depth) = self.parse_unary()?;

        while let Some(token) = self.peek() {
            let op = match token {
                Token::Star => '*',
                Token::Slash => '/',
                _ => break,
            };
            self.consume();
            let (right, right_depth) = self.parse_unary()?;
            (left, depth) = bounded(Expr::binary(left, op, right), 1 + depth.max(right_depth))?;
        }
        Ok((left, depth))
    }

    /// Every nested group, sign and exponent passes through here, so this is
    /// where recursion depth is bounded.
    fn parse_unary(&mut self) -> Result<Parsed> {
        if self.nesting >= MAX_EXPRESSION_DEPTH {
            return Err(too_deep());
        }
        self.nesting += 1;
        let parsed = self.parse_signed();
        self.nesting -= 1;
        parsed
    }

    fn parse_signed(&mut self) -> Result<Parsed> {
        match self.peek() {
            Some(Token::Minus) => {
                self.consume();
                let (operand, depth) = self.parse_unary()?;
                bounded(Expr::neg(operand), depth + 1)
            }
            Some(Token::Plus) => {
                self.consume();
                self.parse_unary()
            }
            _ => self.parse_power(),
        }
    }

    /// `^` binds tighter than unary minus and is right-associative:
    /// `-x^2` is `-(x^2)` and `2^3^2` is `2^(3^2)`.
    fn parse_power(&mut self) -> Result<Parsed> {
        let (base, depth) = self.parse_primary()?;
        if let Some(Token::Caret) = self.peek() {
            self.consume();
            let (exponent, exponent_depth) = self.parse_unary()?;
            return bounded(
                Expr::binary(base, '^', exponent),
                1 + depth.max(exponent_depth),
            );
        }
        Ok((base, depth))
    }

    fn parse_primary(&mut self) -> Result<Parsed> {
        match self.consume() {
            Some(Token::Number(text)) => Ok((Expr::Rational(parse_number_literal(&text)?), 1)),
            Some(Token::Identifier(name)) => {
                if is_function(&name) && matches!(self.peek(), Some(Token::LParen)) {
                    self.consume(); // eat '('
                    let (arg, depth) = self.parse_expression()?;
                    self.expect_rparen()?;
                    bounded(Expr::Call(name, Box::new(arg)), depth + 1)
                } else {
                    Ok((Expr::Variable(name), 1))
                }
            }
            Some(Token::LParen) => {
                let parsed = self.parse_expression()?;
                self.expect_rparen()?;
                Ok(parsed)
            }
            Some(token) => Err(TaylorError::Parse(format!("Unexpected token {token}"))),
            None => Err(TaylorError::Parse("Unexpected end of input".to_string())),
        }
    }
}

/// A parsed subtree and its depth.
type Parsed = (Expr, usize);

fn bounded(expr: Expr, depth: usize) -> Result<Parsed> {
    if depth > MAX_EXPRESSION_DEPTH {
        Err(too_deep())
    } else {
        Ok((expr, depth))
    }
}

fn too_deep() -> TaylorError {
    TaylorError::Parse(format!(
        "Expression is nested deeper than {MAX_EXPRESSION_DEPTH} levels"
    ))
}

// --- NativeEngine ---

/// The built-in algebra backend: this module's parser and compiler plus the
/// differentiator and simplifier from [`crate::symbolic`].
#[derive(Debug, Clone, Default)]
pub struct NativeEngine;

impl SymbolicEngine for NativeEngine {
    type Node = Expr;
    type Program = Program;

    fn parse(&self, source: &str) -> Result<Expr> {
        parse(source)
    }

    fn simplify(&self, node: &Expr) -> Expr {
        symbolic::simplify(node)
    }

    fn derivative(&self, node: &Expr, variable: &str) -> Result<Expr> {
        symbolic::derivative(node, variable)
    }

    fn compile(&self, node: &Expr) -> Result<Program> {
        Compiler::new(VARIABLE).compile(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(source: &str, x: f64) -> Value {
        let expr = parse(source).expect("expression should parse");
        let program = Compiler::new(VARIABLE)
            .compile(&expr)
            .expect("expression should compile");
        program.evaluate(x).expect("evaluation should succeed")
    }

    fn eval_real(source: &str, x: f64) -> f64 {
        crate::numeric::to_real(&eval(source, x)).expect("real value")
    }

    #[test]
    fn respects_precedence_and_associativity() {
        assert_eq!(eval_real("1 + 2 * 3", 0.0), 7.0);
        assert_eq!(eval_real("2^3^2", 0.0), 512.0);
        assert_eq!(eval_real("-x^2", 3.0), -9.0);
        assert_eq!(eval_real("(1 - 2) - 3", 0.0), -4.0);
        assert_eq!(eval_real("8 / 4 / 2", 0.0), 1.0);
        assert_eq!(eval_real("2^-1", 0.0), 0.5);
    }

    #[test]
    fn implicit_multiplication() {
        assert_eq!(eval_real("2x", 3.0), 6.0);
        assert_eq!(eval_real("3(x+1)", 1.0), 6.0);
        assert_eq!(eval_real("(x+1)(x-1)", 3.0), 8.0);
        assert!((eval_real("2 sin(x)", 1.0) - 2.0 * 1.0f64.sin()).abs() < 1e-15);
        assert!((eval_real("2pi", 0.0) - 2.0 * std::f64::consts::PI).abs() < 1e-15);
    }

    #[test]
    fn literals_are_exact() {
        assert_eq!(
            parse("0.25").unwrap(),
            Expr::Rational(BigRational::new(BigInt::from(1), BigInt::from(4)))
        );
        assert_eq!(
            parse("2e-3").unwrap(),
            Expr::Rational(BigRational::new(BigInt::from(1), BigInt::from(500)))
        );
        assert_eq!(parse("1.5E2").unwrap(), Expr::integer(150));
        // `2e` without exponent digits is two times Euler's number.
        assert!((eval_real("2e", 0.0) - 2.0 * std::f64::consts::E).abs() < 1e-15);
    }

    #[test]
    fn constant_programs_evaluate_to_rationals() {
        let value = eval("0.5", 10.0);
        assert_eq!(
            value,
            Value::Rational(BigRational::new(BigInt::from(1), BigInt::from(2)))
        );
    }

    #[test]
    fn bare_function_evaluates_to_function_value() {
        assert_eq!(eval("sin", 0.0), Value::Function("sin".to_string()));
        let err = Compiler::new(VARIABLE)
            .compile(&parse("sin + 1").unwrap())
            .expect_err("bare function inside arithmetic");
        assert!(err.to_string().contains("without an argument"));
    }

    #[test]
    fn complex_results_are_reported() {
        match eval("sqrt(x)", -4.0) {
            Value::Complex(c) => {
                assert!(c.re.abs() < 1e-12);
                assert!((c.im - 2.0).abs() < 1e-12);
            }
            other => panic!("expected complex value, got {other:?}"),
        }
        match eval("x^(1/2)", -1.0) {
            Value::Complex(c) => assert!((c.im - 1.0).abs() < 1e-12),
            other => panic!("expected complex value, got {other:?}"),
        }
        // Integer powers of negative numbers stay real.
        assert_eq!(eval_real("x^3", -2.0), -8.0);
    }

    #[test]
    fn rejects_malformed_input() {
        for source in ["x +* ", "", "(x + 1", "x )", "1.2.3", "x # 2", "sin(x", "2 3"] {
            let err = parse(source).expect_err(source);
            assert!(matches!(err, TaylorError::Parse(_)), "{source}: {err:?}");
        }
        let err = parse("x +* ").unwrap_err();
        assert!(err.to_string().contains("Unexpected token"), "{err}");
    }

    #[test]
    fn deep_nesting_is_a_parse_error() {
        let nested = format!("{}x{}", "(".repeat(10_000), ")".repeat(10_000));
        let signs = format!("{}x", "-".repeat(10_000));
        let chain = vec!["x"; 10_000].join("+");
        let tower = vec!["x"; 10_000].join("^");
        let calls = format!("{}x{}", "sin(".repeat(10_000), ")".repeat(10_000));
        for source in [&nested, &signs, &chain, &tower, &calls] {
            let err = parse(source).expect_err("too deep");
            assert!(err.to_string().contains("nested deeper"), "{err}");
        }
    }

    #[test]
    fn moderate_nesting_parses() {
        let nested = format!("{}x{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(eval_real(&nested, 3.0), 3.0);
        let sum = vec!["x"; 200].join("+");
        assert_eq!(eval_real(&sum, 0.5), 100.0);
    }

    #[test]
    fn unknown_symbols_fail_to_compile() {
        let err = Compiler::new(VARIABLE)
            .compile(&parse("x + y").unwrap())
            .expect_err("y is not defined");
        assert_eq!(err, TaylorError::Parse("Unknown variable: y".to_string()));
    }

    #[test]
    fn rounding_functions() {
        assert_eq!(eval_real("floor(x)", 1.7), 1.0);
        assert_eq!(eval_real("ceil(x)", 1.2), 2.0);
        assert_eq!(eval_real("round(x)", -2.5), -3.0);
        assert_eq!(eval_real("sign(x)", -0.1), -1.0);
        assert_eq!(eval_real("sign(x)", 0.0), 0.0);
        assert_eq!(eval_real("abs(x)", -3.0), 3.0);
    }

    #[test]
    fn display_reparses_to_same_value() {
        let sources = ["-(x + 1)^2", "2^(x - 1)", "(x - 1) / (x + 1)", "sin(-x) * 3"];
        for source in sources {
            let expr = parse(source).unwrap();
            let printed = expr.to_string();
            let again = parse(&printed).unwrap_or_else(|e| panic!("{printed}: {e}"));
            let a = Compiler::new(VARIABLE).compile(&expr).unwrap().evaluate(0.7).unwrap();
            let b = Compiler::new(VARIABLE).compile(&again).unwrap().evaluate(0.7).unwrap();
            assert_eq!(a, b, "{source} printed as {printed}");
        }
    }

    #[test]
    fn vm_reports_stack_underflow() {
        let bytecode = Bytecode {
            ops: vec![OpCode::LoadVar, OpCode::Add],
        };
        let mut stack = Vec::new();
        let err = VM::execute(&bytecode, 1.0, &mut stack).expect_err("underflow");
        assert!(err.to_string().contains("Stack underflow"));
        assert!(Bytecode::new().ops.is_empty());
    }
}
