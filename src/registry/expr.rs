//! Expression language for calculated variables and expression bindings.
//!
//! Expressions are parsed once into an AST. Variable references are resolved
//! to dense indices while parsing, so evaluation never looks up names.
//!
//! ## Precedence Levels (lowest to highest)
//!
//! 1. `+`, `-` - left associative
//! 2. `*`, `/` - left associative
//! 3. Unary `-`, `+` - prefix
//! 4. `^` (Power) - right associative
//! 5. Calls `f(args)`, parentheses, literals, variables

use crate::error::{SimError, SimResult};

/// Maximum nesting of calculated variables referring to each other.
pub const MAX_EVAL_DEPTH: usize = 32;

/// Values an expression can read while evaluating.
pub trait EvalContext {
    /// Value of the variable with the given resolved index.
    ///
    /// # Errors
    ///
    /// Returns an error if the variable cannot be read.
    fn var(&self, index: usize) -> SimResult<f64>;

    /// Current simulated time in seconds.
    fn time(&self) -> f64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinaryOp {
    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            Self::Add => a + b,
            Self::Sub => a - b,
            Self::Mul => a * b,
            Self::Div => a / b,
            Self::Pow => a.powf(b),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Func {
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Atan2,
    Sqrt,
    Abs,
    Exp,
    Ln,
    Log10,
    Min,
    Max,
    Pow,
}

impl Func {
    fn lookup(name: &str) -> Option<Self> {
        Some(match name {
            "sin" => Self::Sin,
            "cos" => Self::Cos,
            "tan" => Self::Tan,
            "asin" => Self::Asin,
            "acos" => Self::Acos,
            "atan" => Self::Atan,
            "atan2" => Self::Atan2,
            "sqrt" => Self::Sqrt,
            "abs" => Self::Abs,
            "exp" => Self::Exp,
            "ln" => Self::Ln,
            "log10" => Self::Log10,
            "min" => Self::Min,
            "max" => Self::Max,
            "pow" => Self::Pow,
            _ => return None,
        })
    }

    const fn arity(self) -> usize {
        match self {
            Self::Atan2 | Self::Min | Self::Max | Self::Pow => 2,
            _ => 1,
        }
    }

    fn apply(self, args: &[f64]) -> f64 {
        let a = args.first().copied().unwrap_or(f64::NAN);
        let b = args.get(1).copied().unwrap_or(f64::NAN);
        match self {
            Self::Sin => a.sin(),
            Self::Cos => a.cos(),
            Self::Tan => a.tan(),
            Self::Asin => a.asin(),
            Self::Acos => a.acos(),
            Self::Atan => a.atan(),
            Self::Atan2 => a.atan2(b),
            Self::Sqrt => a.sqrt(),
            Self::Abs => a.abs(),
            Self::Exp => a.exp(),
            Self::Ln => a.ln(),
            Self::Log10 => a.log10(),
            Self::Min => a.min(b),
            Self::Max => a.max(b),
            Self::Pow => a.powf(b),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Number(f64),
    Var(usize),
    Time,
    Neg(Box<Node>),
    Binary {
        op: BinaryOp,
        left: Box<Node>,
        right: Box<Node>,
    },
    Call {
        func: Func,
        args: Vec<Node>,
    },
}

/// A parsed expression with resolved variable references.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    source: String,
    root: Node,
}

impl Expr {
    /// Parse `source`, resolving every variable name through `resolve`.
    ///
    /// `pi` and `t` are built in and never passed to the resolver.
    ///
    /// # Errors
    ///
    /// Returns `SimError::Expression` on syntax errors and whatever
    /// `resolve` returns for unknown names.
    pub fn parse<F>(source: &str, mut resolve: F) -> SimResult<Self>
    where
        F: FnMut(&str) -> SimResult<usize>,
    {
        let tokens = lex(source)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            resolve: &mut resolve,
        };
        let root = parser.parse_pratt(0)?;
        if let Some(token) = parser.peek() {
            return Err(SimError::expression(format!(
                "unexpected {token:?} in '{source}'"
            )));
        }
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    /// Original source text.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Resolved indices of every variable the expression reads.
    #[must_use]
    pub fn variables(&self) -> Vec<usize> {
        let mut out = Vec::new();
        collect_vars(&self.root, &mut out);
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Evaluate against a context.
    ///
    /// # Errors
    ///
    /// Propagates errors from `EvalContext::var`.
    pub fn eval(&self, ctx: &dyn EvalContext) -> SimResult<f64> {
        eval_node(&self.root, ctx)
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

fn collect_vars(node: &Node, out: &mut Vec<usize>) {
    match node {
        Node::Var(i) => out.push(*i),
        Node::Neg(inner) => collect_vars(inner, out),
        Node::Binary { left, right, .. } => {
            collect_vars(left, out);
            collect_vars(right, out);
        }
        Node::Call { args, .. } => args.iter().for_each(|a| collect_vars(a, out)),
        Node::Number(_) | Node::Time => {}
    }
}

fn eval_node(node: &Node, ctx: &dyn EvalContext) -> SimResult<f64> {
    Ok(match node {
        Node::Number(v) => *v,
        Node::Var(i) => ctx.var(*i)?,
        Node::Time => ctx.time(),
        Node::Neg(inner) => -eval_node(inner, ctx)?,
        Node::Binary { op, left, right } => op.apply(eval_node(left, ctx)?, eval_node(right, ctx)?),
        Node::Call { func, args } => {
            let values = args
                .iter()
                .map(|a| eval_node(a, ctx))
                .collect::<SimResult<Vec<f64>>>()?;
            func.apply(&values)
        }
    })
}

// ===== Lexer =====

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
    Comma,
}

fn lex(source: &str) -> SimResult<Vec<Token>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '+' | '-' | '*' | '/' | '^' | '(' | ')' | ',' => {
                tokens.push(match c {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '/' => Token::Slash,
                    '^' => Token::Caret,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    _ => Token::Comma,
                });
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| SimError::expression(format!("bad number '{text}'")))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() {
                    let c = chars[i];
                    if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                        i += 1;
                    } else if c == '[' {
                        // Element index: `name[3]`
                        let close = chars[i..]
                            .iter()
                            .position(|&c| c == ']')
                            .map(|p| i + p)
                            .ok_or_else(|| SimError::expression("unclosed '['"))?;
                        if close == i + 1 || !chars[i + 1..close].iter().all(char::is_ascii_digit) {
                            return Err(SimError::expression("index must be a non-negative integer"));
                        }
                        i = close + 1;
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => {
                return Err(SimError::expression(format!(
                    "unexpected character '{other}' in '{source}'"
                )))
            }
        }
    }
    Ok(tokens)
}

// ===== Parser =====

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Assoc {
    Left,
    Right,
}

const UNARY_PREC: u8 = 30;

/// Binary operator metadata: (precedence, associativity, op).
const fn binary_op_info(token: &Token) -> Option<(u8, Assoc, BinaryOp)> {
    match token {
        Token::Plus => Some((10, Assoc::Left, BinaryOp::Add)),
        Token::Minus => Some((10, Assoc::Left, BinaryOp::Sub)),
        Token::Star => Some((20, Assoc::Left, BinaryOp::Mul)),
        Token::Slash => Some((20, Assoc::Left, BinaryOp::Div)),
        Token::Caret => Some((40, Assoc::Right, BinaryOp::Pow)),
        _ => None,
    }
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    resolve: &'a mut dyn FnMut(&str) -> SimResult<usize>,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: &Token) -> SimResult<()> {
        match self.advance() {
            Some(ref t) if t == expected => Ok(()),
            other => Err(SimError::expression(format!(
                "expected {expected:?}, found {other:?}"
            ))),
        }
    }

    fn parse_pratt(&mut self, min_prec: u8) -> SimResult<Node> {
        let mut left = self.parse_prefix()?;

        while let Some((prec, assoc, op)) = self.peek().and_then(binary_op_info) {
            if prec < min_prec {
                break;
            }
            self.advance();
            let next_prec = if assoc == Assoc::Left { prec + 1 } else { prec };
            let right = self.parse_pratt(next_prec)?;
            left = Node::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_prefix(&mut self) -> SimResult<Node> {
        match self.peek() {
            Some(Token::Minus) => {
                self.advance();
                // -x^2 is -(x^2)
                Ok(Node::Neg(Box::new(self.parse_pratt(UNARY_PREC)?)))
            }
            Some(Token::Plus) => {
                self.advance();
                self.parse_pratt(UNARY_PREC)
            }
            _ => self.parse_atom(),
        }
    }

    fn parse_atom(&mut self) -> SimResult<Node> {
        match self.advance() {
            Some(Token::Number(v)) => Ok(Node::Number(v)),
            Some(Token::LParen) => {
                let inner = self.parse_pratt(0)?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    return self.parse_call(&name);
                }
                match name.as_str() {
                    "pi" => Ok(Node::Number(std::f64::consts::PI)),
                    "t" => Ok(Node::Time),
                    _ => Ok(Node::Var((self.resolve)(&name)?)),
                }
            }
            other => Err(SimError::expression(format!(
                "expected a value, found {other:?}"
            ))),
        }
    }

    fn parse_call(&mut self, name: &str) -> SimResult<Node> {
        let func = Func::lookup(name)
            .ok_or_else(|| SimError::expression(format!("unknown function '{name}'")))?;
        self.expect(&Token::LParen)?;

        let mut args = Vec::new();
        if self.peek() != Some(&Token::RParen) {
            loop {
                args.push(self.parse_pratt(0)?);
                if self.peek() == Some(&Token::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(&Token::RParen)?;

        if args.len() != func.arity() {
            return Err(SimError::expression(format!(
                "{name} takes {} argument(s), got {}",
                func.arity(),
                args.len()
            )));
        }
        Ok(Node::Call { func, args })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    struct Vars(Vec<f64>, f64);

    impl EvalContext for Vars {
        fn var(&self, index: usize) -> SimResult<f64> {
            self.0
                .get(index)
                .copied()
                .ok_or_else(|| SimError::expression("out of range"))
        }

        fn time(&self) -> f64 {
            self.1
        }
    }

    fn names(name: &str) -> SimResult<usize> {
        match name {
            "x" => Ok(0),
            "dyn.ball.vel[1]" => Ok(1),
            other => Err(SimError::unknown_variable(other)),
        }
    }

    fn eval(src: &str) -> f64 {
        Expr::parse(src, names)
            .unwrap()
            .eval(&Vars(vec![3.0, -2.0], 1.5))
            .unwrap()
    }

    #[test]
    fn test_precedence() {
        assert_eq!(eval("1 + 2 * 3"), 7.0);
        assert_eq!(eval("(1 + 2) * 3"), 9.0);
        assert_eq!(eval("10 - 4 - 3"), 3.0);
        assert_eq!(eval("2 ^ 3 ^ 2"), 512.0);
        assert_eq!(eval("-2 ^ 2"), -4.0);
        assert_eq!(eval("2 * -x"), -6.0);
    }

    #[test]
    fn test_variables_and_builtins() {
        assert_eq!(eval("x + dyn.ball.vel[1]"), 1.0);
        assert_eq!(eval("t * 2"), 3.0);
        assert!((eval("cos(pi)") + 1.0).abs() < 1e-12);
        assert_eq!(eval("max(x, 10)"), 10.0);
        assert_eq!(eval("1.5e2"), 150.0);
    }

    #[test]
    fn test_variables_collects_indices() {
        let expr = Expr::parse("x * x + dyn.ball.vel[1]", names).unwrap();
        assert_eq!(expr.variables(), vec![0, 1]);
        assert_eq!(expr.to_string(), "x * x + dyn.ball.vel[1]");
    }

    #[test]
    fn test_unknown_variable() {
        let err = Expr::parse("y + 1", names).unwrap_err();
        assert!(matches!(err, SimError::UnknownVariable { .. }));
    }

    #[test]
    fn test_syntax_errors() {
        for bad in ["1 +", "(1", "1 2", "sin(1, 2)", "foo(1)", "x[a]", "3 $ 4", ""] {
            assert!(Expr::parse(bad, names).is_err(), "'{bad}' should not parse");
        }
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    struct NoVars;

    impl EvalContext for NoVars {
        fn var(&self, _index: usize) -> SimResult<f64> {
            Err(SimError::expression("no variables"))
        }

        fn time(&self) -> f64 {
            0.0
        }
    }

    proptest! {
        /// Falsification: printed arithmetic evaluates to the native result.
        #[test]
        fn prop_linear_arithmetic(a in -1e6f64..1e6, b in -1e6f64..1e6, c in 1e-3f64..1e3) {
            let src = format!("({a}) + ({b}) * ({c})");
            let expr = Expr::parse(&src, |n| Err(SimError::unknown_variable(n)));
            prop_assert!(expr.is_ok());
            let value = expr.map(|e| e.eval(&NoVars)).ok().and_then(Result::ok);
            let expected = a + b * c;
            prop_assert!(value.is_some_and(|v| (v - expected).abs() <= 1e-9 * expected.abs().max(1.0)));
        }
    }
}
