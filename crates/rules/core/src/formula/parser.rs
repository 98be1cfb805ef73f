//! Recursive-descent parser producing the formula AST.
//!
//! Precedence, loosest to tightest: `||`, `&&`, comparisons, `+ -`, `* /`,
//! unary minus, primaries.

use super::FormulaError;
use super::dice::DiceSpec;
use super::token::{Token, tokenize};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

/// Whitelisted functions; there is deliberately no escape hatch into
/// anything else.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Func {
    Min,
    Max,
    Floor,
    Ceil,
    Abs,
}

impl Func {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "min" => Some(Func::Min),
            "max" => Some(Func::Max),
            "floor" => Some(Func::Floor),
            "ceil" => Some(Func::Ceil),
            "abs" => Some(Func::Abs),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Func::Min => "min",
            Func::Max => "max",
            Func::Floor => "floor",
            Func::Ceil => "ceil",
            Func::Abs => "abs",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Number(f64),
    Path(String),
    Dice(DiceSpec),
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Call(Func, Vec<Expr>),
}

/// A parsed, reusable formula.
#[derive(Clone, Debug, PartialEq)]
pub struct Formula {
    pub(crate) source: String,
    pub(crate) root: Expr,
}

impl Formula {
    /// Parse an expression string.
    ///
    /// # Errors
    ///
    /// Returns [`FormulaError`] describing the first syntax problem; the
    /// caller decides whether to surface it or degrade to zero.
    pub fn parse(source: &str) -> Result<Self, FormulaError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            source,
            tokens,
            pos: 0,
        };
        let root = parser.expr()?;
        if parser.pos != parser.tokens.len() {
            return Err(FormulaError::syntax(source, "trailing tokens"));
        }
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// True when the formula contains at least one dice term. Such
    /// formulas are not pre-rolled by the combat-change resolver.
    pub fn has_dice(&self) -> bool {
        fn walk(expr: &Expr) -> bool {
            match expr {
                Expr::Dice(_) => true,
                Expr::Neg(inner) => walk(inner),
                Expr::Binary(_, lhs, rhs) => walk(lhs) || walk(rhs),
                Expr::Call(_, args) => args.iter().any(walk),
                Expr::Number(_) | Expr::Path(_) => false,
            }
        }
        walk(&self.root)
    }
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: &Token) -> Result<(), FormulaError> {
        match self.bump() {
            Some(ref token) if token == expected => Ok(()),
            other => Err(FormulaError::syntax(
                self.source,
                format!("expected {expected:?}, found {other:?}"),
            )),
        }
    }

    fn expr(&mut self) -> Result<Expr, FormulaError> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.and_expr()?;
        while matches!(self.peek(), Some(Token::OrOr)) {
            self.bump();
            let rhs = self.and_expr()?;
            lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.cmp_expr()?;
        while matches!(self.peek(), Some(Token::AndAnd)) {
            self.bump();
            let rhs = self.cmp_expr()?;
            lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn cmp_expr(&mut self) -> Result<Expr, FormulaError> {
        let lhs = self.sum_expr()?;
        let op = match self.peek() {
            Some(Token::Lt) => BinOp::Lt,
            Some(Token::Le) => BinOp::Le,
            Some(Token::Gt) => BinOp::Gt,
            Some(Token::Ge) => BinOp::Ge,
            Some(Token::EqEq) => BinOp::Eq,
            Some(Token::Ne) => BinOp::Ne,
            _ => return Ok(lhs),
        };
        self.bump();
        let rhs = self.sum_expr()?;
        Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
    }

    fn sum_expr(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.term_expr()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.bump();
            let rhs = self.term_expr()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn term_expr(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.unary_expr()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => break,
            };
            self.bump();
            let rhs = self.unary_expr()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary_expr(&mut self) -> Result<Expr, FormulaError> {
        if matches!(self.peek(), Some(Token::Minus)) {
            self.bump();
            let inner = self.unary_expr()?;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, FormulaError> {
        match self.bump() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Path(path)) => Ok(Expr::Path(path)),
            Some(Token::Dice(spec)) => Ok(Expr::Dice(spec)),
            Some(Token::LParen) => {
                let inner = self.expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                let func = Func::from_name(&name).ok_or_else(|| {
                    FormulaError::syntax(self.source, format!("unknown function '{name}'"))
                })?;
                self.expect(&Token::LParen)?;
                let mut args = vec![self.expr()?];
                while matches!(self.peek(), Some(Token::Comma)) {
                    self.bump();
                    args.push(self.expr()?);
                }
                self.expect(&Token::RParen)?;
                Ok(Expr::Call(func, args))
            }
            other => Err(FormulaError::syntax(
                self.source,
                format!("unexpected token {other:?}"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_precedence() {
        let formula = Formula::parse("1 + 2 * 3").unwrap();
        match formula.root {
            Expr::Binary(BinOp::Add, _, rhs) => {
                assert!(matches!(*rhs, Expr::Binary(BinOp::Mul, _, _)));
            }
            other => panic!("unexpected tree {other:?}"),
        }
    }

    #[test]
    fn parses_functions_and_paths() {
        let formula = Formula::parse("max(@level, floor(@hd.total / 2))").unwrap();
        assert!(matches!(formula.root, Expr::Call(Func::Max, _)));
        assert!(!formula.has_dice());
    }

    #[test]
    fn detects_dice() {
        assert!(Formula::parse("1d6 + 2").unwrap().has_dice());
        assert!(Formula::parse("min(1, 2d4)").unwrap().has_dice());
    }

    #[test]
    fn rejects_malformed() {
        assert!(Formula::parse("1 +").is_err());
        assert!(Formula::parse("foo(2)").is_err());
        assert!(Formula::parse("(1 + 2").is_err());
        assert!(Formula::parse("1 2").is_err());
    }
}
