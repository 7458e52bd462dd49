//! Recursive-descent parser producing an explicit expression tree.
//!
//! Grammar:
//!
//! ```text
//! expr   = term (('+' | '-') term)*
//! term   = unary (('*' | '/') unary)*
//! unary  = ('+' | '-') unary | atom
//! atom   = number | 'band1' | 'band2' | '(' expr ')'
//! ```

use crate::lexer::{tokenize, Token, TokenKind};
use crate::{ExprError, MAX_DEPTH, MAX_FORMULA_LEN};
use std::fmt;

/// One of the two bands a formula may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BandRef {
    Band1,
    Band2,
}

impl BandRef {
    fn from_ident(name: &str) -> Option<Self> {
        match name {
            "band1" => Some(BandRef::Band1),
            "band2" => Some(BandRef::Band2),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn apply(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            BinaryOp::Add => lhs + rhs,
            BinaryOp::Sub => lhs - rhs,
            BinaryOp::Mul => lhs * rhs,
            BinaryOp::Div => lhs / rhs,
        }
    }

    fn symbol(self) -> char {
        match self {
            BinaryOp::Add => '+',
            BinaryOp::Sub => '-',
            BinaryOp::Mul => '*',
            BinaryOp::Div => '/',
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Band(BandRef),
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    /// Evaluate for one pixel. Non-finite results are left for the caller
    /// to mask.
    #[inline]
    pub fn eval(&self, band1: f64, band2: f64) -> f64 {
        match self {
            Expr::Number(n) => *n,
            Expr::Band(BandRef::Band1) => band1,
            Expr::Band(BandRef::Band2) => band2,
            Expr::Neg(inner) => -inner.eval(band1, band2),
            Expr::Binary { op, lhs, rhs } => op.apply(lhs.eval(band1, band2), rhs.eval(band1, band2)),
        }
    }

    pub fn references(&self, band: BandRef) -> bool {
        match self {
            Expr::Number(_) => false,
            Expr::Band(b) => *b == band,
            Expr::Neg(inner) => inner.references(band),
            Expr::Binary { lhs, rhs, .. } => lhs.references(band) || rhs.references(band),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{}", n),
            Expr::Band(BandRef::Band1) => write!(f, "band1"),
            Expr::Band(BandRef::Band2) => write!(f, "band2"),
            Expr::Neg(inner) => write!(f, "(-{})", inner),
            Expr::Binary { op, lhs, rhs } => write!(f, "({} {} {})", lhs, op.symbol(), rhs),
        }
    }
}

/// A parsed band formula.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    source: String,
    expr: Expr,
}

impl Formula {
    pub fn parse(source: &str) -> Result<Self, ExprError> {
        if source.len() > MAX_FORMULA_LEN {
            return Err(ExprError::TooLong {
                len: source.len(),
                max: MAX_FORMULA_LEN,
            });
        }
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(ExprError::Empty);
        }

        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let expr = parser.parse_expr()?;
        if let Some(tok) = parser.peek() {
            return Err(ExprError::UnexpectedToken {
                found: tok.kind.describe(),
                pos: tok.pos,
            });
        }

        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn uses_band2(&self) -> bool {
        self.expr.references(BandRef::Band2)
    }
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

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn enter(&mut self) -> Result<(), ExprError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExprError::TooDeep(MAX_DEPTH));
        }
        Ok(())
    }

    fn parse_expr(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_term()?;
        loop {
            let op = match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Star) => BinaryOp::Mul,
                Some(TokenKind::Slash) => BinaryOp::Div,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Minus) => {
                self.advance();
                self.enter()?;
                let inner = self.parse_unary()?;
                self.depth -= 1;
                Ok(Expr::Neg(Box::new(inner)))
            }
            Some(TokenKind::Plus) => {
                self.advance();
                self.enter()?;
                let inner = self.parse_unary()?;
                self.depth -= 1;
                Ok(inner)
            }
            _ => self.parse_atom(),
        }
    }

    fn parse_atom(&mut self) -> Result<Expr, ExprError> {
        let tok = self.advance().ok_or(ExprError::UnexpectedEnd)?;
        match tok.kind {
            TokenKind::Number(n) => Ok(Expr::Number(n)),
            TokenKind::Ident(name) => BandRef::from_ident(&name)
                .map(Expr::Band)
                .ok_or(ExprError::UnknownIdentifier(name)),
            TokenKind::LParen => {
                self.enter()?;
                let inner = self.parse_expr()?;
                self.depth -= 1;
                match self.advance() {
                    Some(Token {
                        kind: TokenKind::RParen,
                        ..
                    }) => Ok(inner),
                    Some(other) => Err(ExprError::UnexpectedToken {
                        found: other.kind.describe(),
                        pos: other.pos,
                    }),
                    None => Err(ExprError::UnexpectedEnd),
                }
            }
            other => Err(ExprError::UnexpectedToken {
                found: other.describe(),
                pos: tok.pos,
            }),
        }
    }
}
