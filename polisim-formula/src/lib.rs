//! A sandboxed expression language for event formulas.
//!
//! This crate provides a tokenizer, recursive-descent parser, and evaluator
//! for the small Python-flavoured expression dialect used by the event
//! catalogs: arithmetic, comparisons, `in [...]` membership, boolean
//! operators, conditional expressions (`a if cond else b`), and a fixed
//! allow-list of pure functions. It is deliberately not a general-purpose
//! interpreter: any name must resolve through the caller-supplied scope, any
//! call must hit the allow-list, and nesting/size are bounded.
//!
//! Formulas are compiled once with [`Formula::parse`] and evaluated many
//! times against different scopes; evaluation is a pure function of
//! `(formula, scope)`.

pub mod error;
mod eval;

pub use error::FormulaError;
pub use eval::{round_half_even, Scope, Value};

/// Upper bound on the token stream length of a single formula.
pub const MAX_TOKENS: usize = 512;
/// Upper bound on expression nesting depth.
pub const MAX_DEPTH: usize = 64;

/// A token scanned from a formula string.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// A numeric literal.
    Number(f64),
    /// A quoted string literal (single or double quotes).
    Str(String),
    /// An identifier (parameter name or function name).
    Ident(String),
    If,
    Else,
    And,
    Or,
    Not,
    In,
    Plus,
    Minus,
    Star,
    Slash,
    /// `**`
    StarStar,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{}", n),
            Token::Str(s) => write!(f, "'{}'", s),
            Token::Ident(s) => write!(f, "{}", s),
            Token::If => write!(f, "if"),
            Token::Else => write!(f, "else"),
            Token::And => write!(f, "and"),
            Token::Or => write!(f, "or"),
            Token::Not => write!(f, "not"),
            Token::In => write!(f, "in"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::StarStar => write!(f, "**"),
            Token::EqEq => write!(f, "=="),
            Token::NotEq => write!(f, "!="),
            Token::Lt => write!(f, "<"),
            Token::Le => write!(f, "<="),
            Token::Gt => write!(f, ">"),
            Token::Ge => write!(f, ">="),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::Comma => write!(f, ","),
        }
    }
}

/// Tokenize a formula source string.
pub fn tokenize(source: &str) -> Result<Vec<Token>, FormulaError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                tokens.push(Token::LParen);
                chars.next();
            }
            ')' => {
                tokens.push(Token::RParen);
                chars.next();
            }
            '[' => {
                tokens.push(Token::LBracket);
                chars.next();
            }
            ']' => {
                tokens.push(Token::RBracket);
                chars.next();
            }
            ',' => {
                tokens.push(Token::Comma);
                chars.next();
            }
            '+' => {
                tokens.push(Token::Plus);
                chars.next();
            }
            '-' => {
                tokens.push(Token::Minus);
                chars.next();
            }
            '/' => {
                tokens.push(Token::Slash);
                chars.next();
            }
            '*' => {
                chars.next();
                if matches!(chars.peek(), Some(&(_, '*'))) {
                    chars.next();
                    tokens.push(Token::StarStar);
                } else {
                    tokens.push(Token::Star);
                }
            }
            '=' => {
                chars.next();
                match chars.peek() {
                    Some(&(_, '=')) => {
                        chars.next();
                        tokens.push(Token::EqEq);
                    }
                    _ => return Err(FormulaError::UnexpectedChar { position: pos, found: '=' }),
                }
            }
            '!' => {
                chars.next();
                match chars.peek() {
                    Some(&(_, '=')) => {
                        chars.next();
                        tokens.push(Token::NotEq);
                    }
                    _ => return Err(FormulaError::UnexpectedChar { position: pos, found: '!' }),
                }
            }
            '<' => {
                chars.next();
                if matches!(chars.peek(), Some(&(_, '='))) {
                    chars.next();
                    tokens.push(Token::Le);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            '>' => {
                chars.next();
                if matches!(chars.peek(), Some(&(_, '='))) {
                    chars.next();
                    tokens.push(Token::Ge);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut s = String::new();
                let mut closed = false;
                for (_, nc) in chars.by_ref() {
                    if nc == quote {
                        closed = true;
                        break;
                    }
                    s.push(nc);
                }
                if !closed {
                    return Err(FormulaError::UnexpectedEof);
                }
                tokens.push(Token::Str(s));
            }
            c if c.is_ascii_digit() => {
                let mut s = String::new();
                let mut seen_dot = false;
                while let Some(&(_, nc)) = chars.peek() {
                    if nc.is_ascii_digit() {
                        s.push(nc);
                        chars.next();
                    } else if nc == '.' && !seen_dot {
                        seen_dot = true;
                        s.push(nc);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let n: f64 = s
                    .parse()
                    .map_err(|_| FormulaError::UnexpectedChar { position: pos, found: c })?;
                tokens.push(Token::Number(n));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut s = String::new();
                while let Some(&(_, nc)) = chars.peek() {
                    // A dot continues the identifier so that module-qualified
                    // function spellings like `np.tanh` stay one token.
                    if nc.is_ascii_alphanumeric() || nc == '_' || nc == '.' {
                        s.push(nc);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(match s.as_str() {
                    "if" => Token::If,
                    "else" => Token::Else,
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "in" => Token::In,
                    _ => Token::Ident(s),
                });
            }
            _ => return Err(FormulaError::UnexpectedChar { position: pos, found: c }),
        }
    }

    if tokens.is_empty() {
        return Err(FormulaError::EmptyInput);
    }
    if tokens.len() > MAX_TOKENS {
        return Err(FormulaError::TooManyTokens {
            count: tokens.len(),
            limit: MAX_TOKENS,
        });
    }
    Ok(tokens)
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    And,
    Or,
}

/// Comparison operators, including list membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
}

/// The allow-listed pure functions.
///
/// Module-qualified spellings (`np.mean`, `np.tanh`, `np.sqrt`, `np.log`,
/// `np.exp`) resolve to the same entries; anything else is rejected at parse
/// time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Round,
    Min,
    Max,
    Int,
    Abs,
    Sqrt,
    Log,
    Exp,
    Mean,
    Tanh,
}

impl Function {
    /// Resolve a function name against the allow-list.
    pub fn from_name(name: &str) -> Option<Function> {
        let name = name.strip_prefix("np.").unwrap_or(name);
        Some(match name {
            "round" => Function::Round,
            "min" => Function::Min,
            "max" => Function::Max,
            "int" => Function::Int,
            "abs" => Function::Abs,
            "sqrt" => Function::Sqrt,
            "log" => Function::Log,
            "exp" => Function::Exp,
            "mean" => Function::Mean,
            "tanh" => Function::Tanh,
            _ => return None,
        })
    }

    /// The canonical spelling, used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Function::Round => "round",
            Function::Min => "min",
            Function::Max => "max",
            Function::Int => "int",
            Function::Abs => "abs",
            Function::Sqrt => "sqrt",
            Function::Log => "log",
            Function::Exp => "exp",
            Function::Mean => "mean",
            Function::Tanh => "tanh",
        }
    }
}

/// A node in the formula AST.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Str(String),
    List(Vec<Expr>),
    Name(String),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Compare {
        op: CmpOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Python-style conditional: `then if cond else orelse`.
    Conditional {
        cond: Box<Expr>,
        then: Box<Expr>,
        orelse: Box<Expr>,
    },
    Call {
        function: Function,
        args: Vec<Expr>,
    },
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<Token, FormulaError> {
        let tok = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(FormulaError::UnexpectedEof)?;
        self.pos += 1;
        Ok(tok)
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<(), FormulaError> {
        let tok = self.next()?;
        if &tok == expected {
            Ok(())
        } else {
            Err(FormulaError::UnexpectedToken {
                position: self.pos - 1,
                token: tok.to_string(),
                expected: what.to_string(),
            })
        }
    }

    fn enter(&mut self) -> Result<(), FormulaError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(FormulaError::TooDeep { limit: MAX_DEPTH });
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// conditional := or_test ["if" or_test "else" conditional]
    fn conditional(&mut self) -> Result<Expr, FormulaError> {
        self.enter()?;
        let then = self.or_test()?;
        let expr = if matches!(self.peek(), Some(Token::If)) {
            self.pos += 1;
            let cond = self.or_test()?;
            self.expect(&Token::Else, "else")?;
            let orelse = self.conditional()?;
            Expr::Conditional {
                cond: Box::new(cond),
                then: Box::new(then),
                orelse: Box::new(orelse),
            }
        } else {
            then
        };
        self.leave();
        Ok(expr)
    }

    fn or_test(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.and_test()?;
        while matches!(self.peek(), Some(Token::Or)) {
            self.pos += 1;
            let rhs = self.and_test()?;
            lhs = Expr::Binary {
                op: BinOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn and_test(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.not_test()?;
        while matches!(self.peek(), Some(Token::And)) {
            self.pos += 1;
            let rhs = self.not_test()?;
            lhs = Expr::Binary {
                op: BinOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn not_test(&mut self) -> Result<Expr, FormulaError> {
        if matches!(self.peek(), Some(Token::Not)) {
            self.enter()?;
            self.pos += 1;
            let operand = self.not_test()?;
            self.leave();
            Ok(Expr::Not(Box::new(operand)))
        } else {
            self.comparison()
        }
    }

    /// comparison := arith [cmpop arith]
    ///
    /// Chained comparisons (`a < b < c`) are not part of the grammar; the
    /// catalogs never use them.
    fn comparison(&mut self) -> Result<Expr, FormulaError> {
        let lhs = self.arith()?;
        let op = match self.peek() {
            Some(Token::EqEq) => CmpOp::Eq,
            Some(Token::NotEq) => CmpOp::Ne,
            Some(Token::Lt) => CmpOp::Lt,
            Some(Token::Le) => CmpOp::Le,
            Some(Token::Gt) => CmpOp::Gt,
            Some(Token::Ge) => CmpOp::Ge,
            Some(Token::In) => CmpOp::In,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.arith()?;
        Ok(Expr::Compare {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    fn arith(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.factor()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.factor()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    /// factor := ("-" | "+") factor | power
    fn factor(&mut self) -> Result<Expr, FormulaError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.enter()?;
                self.pos += 1;
                let operand = self.factor()?;
                self.leave();
                Ok(Expr::Neg(Box::new(operand)))
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.factor()
            }
            _ => self.power(),
        }
    }

    /// power := primary ["**" factor]
    ///
    /// Right-associative, binds tighter than unary minus on its left (so
    /// `-x**2` is `-(x**2)`), looser on its right (`x**-y` parses).
    fn power(&mut self) -> Result<Expr, FormulaError> {
        let base = self.primary()?;
        if matches!(self.peek(), Some(Token::StarStar)) {
            self.enter()?;
            self.pos += 1;
            let exponent = self.factor()?;
            self.leave();
            Ok(Expr::Binary {
                op: BinOp::Pow,
                lhs: Box::new(base),
                rhs: Box::new(exponent),
            })
        } else {
            Ok(base)
        }
    }

    fn primary(&mut self) -> Result<Expr, FormulaError> {
        self.enter()?;
        let tok = self.next()?;
        let expr = match tok {
            Token::Number(n) => Expr::Number(n),
            Token::Str(s) => Expr::Str(s),
            Token::Ident(name) => {
                if matches!(self.peek(), Some(Token::LParen)) {
                    let function = Function::from_name(&name)
                        .ok_or(FormulaError::DisallowedFunction { name })?;
                    self.pos += 1;
                    let mut args = Vec::new();
                    if !matches!(self.peek(), Some(Token::RParen)) {
                        loop {
                            args.push(self.conditional()?);
                            match self.peek() {
                                Some(Token::Comma) => {
                                    self.pos += 1;
                                }
                                _ => break,
                            }
                        }
                    }
                    self.expect(&Token::RParen, ")")?;
                    Expr::Call { function, args }
                } else {
                    Expr::Name(name)
                }
            }
            Token::LParen => {
                let inner = self.conditional()?;
                self.expect(&Token::RParen, ")")?;
                inner
            }
            Token::LBracket => {
                let mut items = Vec::new();
                if !matches!(self.peek(), Some(Token::RBracket)) {
                    loop {
                        items.push(self.conditional()?);
                        match self.peek() {
                            Some(Token::Comma) => {
                                self.pos += 1;
                            }
                            _ => break,
                        }
                    }
                }
                self.expect(&Token::RBracket, "]")?;
                Expr::List(items)
            }
            other => {
                return Err(FormulaError::UnexpectedToken {
                    position: self.pos - 1,
                    token: other.to_string(),
                    expected: "a value".to_string(),
                })
            }
        };
        self.leave();
        Ok(expr)
    }
}

/// A compiled formula: parsed once, evaluated many times.
#[derive(Debug, Clone)]
pub struct Formula {
    source: String,
    root: Expr,
}

impl Formula {
    /// Tokenize and parse `source` into a compiled formula.
    pub fn parse(source: &str) -> Result<Formula, FormulaError> {
        let tokens = tokenize(source)?;
        let token_count = tokens.len();
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let root = parser.conditional()?;
        if parser.pos != token_count {
            return Err(FormulaError::UnconsumedTokens {
                position: parser.pos,
                remaining: token_count - parser.pos,
            });
        }
        Ok(Formula {
            source: source.to_string(),
            root,
        })
    }

    /// The original source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The parsed expression tree.
    pub fn root(&self) -> &Expr {
        &self.root
    }

    /// Evaluate against a scope, producing a typed [`Value`].
    pub fn eval(&self, scope: &dyn Scope) -> Result<Value, FormulaError> {
        eval::eval_expr(&self.root, scope)
    }

    /// Evaluate and coerce to an integer delta.
    ///
    /// The result is truncated toward zero unless the formula itself already
    /// rounded; booleans coerce to 0/1. Non-numeric results are an error.
    pub fn eval_delta(&self, scope: &dyn Scope) -> Result<i64, FormulaError> {
        eval::to_delta(self.eval(scope)?)
    }
}

/// One-shot convenience: parse and evaluate a delta in a single call.
pub fn eval_delta(source: &str, scope: &dyn Scope) -> Result<i64, FormulaError> {
    Formula::parse(source)?.eval_delta(scope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn scope(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_arithmetic_precedence() {
        let s = scope(&[]);
        assert_eq!(eval_delta("2 + 3 * 4", &s).unwrap(), 14);
        assert_eq!(eval_delta("(2 + 3) * 4", &s).unwrap(), 20);
        assert_eq!(eval_delta("2 ** 3 ** 2", &s).unwrap(), 512);
        assert_eq!(eval_delta("-2 ** 2", &s).unwrap(), -4);
    }

    #[test]
    fn test_name_resolution() {
        let s = scope(&[("Talent_Index", Value::Num(7.0))]);
        assert_eq!(eval_delta("Talent_Index + 1", &s).unwrap(), 8);
        assert!(matches!(
            eval_delta("Unknown_Name + 1", &s),
            Err(FormulaError::UnknownName { .. })
        ));
    }

    #[test]
    fn test_conditional_expression() {
        let s = scope(&[("X", Value::Num(12.0))]);
        assert_eq!(eval_delta("1 if X < 20 else 0", &s).unwrap(), 1);
        // Nested conditionals are right-associative, Python-style.
        assert_eq!(
            eval_delta("-2 * (1 if X < 10 else 0.5 if X < 15 else 0)", &s).unwrap(),
            -1
        );
    }

    #[test]
    fn test_membership_and_equality() {
        let s = scope(&[("Joint_Project", Value::Str("Energy".to_string()))]);
        assert_eq!(
            eval_delta("2 if Joint_Project in ['Energy', 'Materials'] else 0", &s).unwrap(),
            2
        );
        assert_eq!(
            eval_delta("int(Joint_Project != 'No')", &s).unwrap(),
            1
        );
    }

    #[test]
    fn test_disallowed_function_rejected_at_parse() {
        assert!(matches!(
            Formula::parse("eval(1)"),
            Err(FormulaError::DisallowedFunction { .. })
        ));
        assert!(matches!(
            Formula::parse("__import__('os')"),
            Err(FormulaError::DisallowedFunction { .. })
        ));
    }

    #[test]
    fn test_np_prefixed_aliases() {
        let s = scope(&[("Labor", Value::Num(0.5))]);
        assert_eq!(
            eval_delta("np.mean([Labor * 10, 7]) - 6", &s).unwrap(),
            0
        );
        let f = Formula::parse("np.tanh(0)").unwrap();
        assert_eq!(f.eval(&s).unwrap(), Value::Num(0.0));
    }

    #[test]
    fn test_malformed_source_rejected() {
        assert!(Formula::parse("round(-3* exp(-0.115*(A+B))").is_err());
        assert!(Formula::parse("").is_err());
        assert!(Formula::parse("1 +").is_err());
        assert!(matches!(
            Formula::parse("Semiconductor^2"),
            Err(FormulaError::UnexpectedChar { .. })
        ));
    }

    #[test]
    fn test_depth_bound() {
        let mut src = String::new();
        for _ in 0..(MAX_DEPTH + 8) {
            src.push('(');
        }
        src.push('1');
        for _ in 0..(MAX_DEPTH + 8) {
            src.push(')');
        }
        assert!(matches!(
            Formula::parse(&src),
            Err(FormulaError::TooDeep { .. })
        ));
    }

    #[test]
    fn test_purity_same_input_same_output() {
        let s = scope(&[
            ("Semiconductor", Value::Num(6.0)),
            ("Electricity", Value::Num(5.0)),
        ]);
        let f = Formula::parse("round(-10 * (1 - (Semiconductor + Electricity) / 20))").unwrap();
        let a = f.eval_delta(&s).unwrap();
        let b = f.eval_delta(&s).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, -4);
    }
}
