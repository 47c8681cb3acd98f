//! Recursive-descent parser producing an [`Expr`] tree

use serde_json::Value;

use super::lexer::{tokenize, Token, TokenKind};
use super::ConditionError;

/// Maximum nesting of parentheses and prefix operators
pub const MAX_DEPTH: usize = 64;

/// Parsed condition expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Path(Path),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

/// Reference into the pipeline state
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub root: String,
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    fn from_token(kind: &TokenKind) -> Option<Self> {
        match kind {
            TokenKind::Eq => Some(Self::Eq),
            TokenKind::Ne => Some(Self::Ne),
            TokenKind::Lt => Some(Self::Lt),
            TokenKind::Le => Some(Self::Le),
            TokenKind::Gt => Some(Self::Gt),
            TokenKind::Ge => Some(Self::Ge),
            _ => None,
        }
    }
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.root)?;
        for segment in &self.segments {
            match segment {
                Segment::Key(key) => write!(f, "['{}']", key)?,
                Segment::Index(index) => write!(f, "[{}]", index)?,
            }
        }
        Ok(())
    }
}

/// Parse a condition string
pub fn parse(source: &str) -> Result<Expr, ConditionError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };

    let expr = parser.parse_or()?;
    let trailing = parser.peek();
    if trailing.kind != TokenKind::Eof {
        return Err(ConditionError::syntax(
            trailing.position,
            format!("unexpected {}", trailing.kind.describe()),
        ));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        // tokenize always ends with Eof, and advance never moves past it
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if &self.peek().kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, ConditionError> {
        let token = self.advance();
        if token.kind == kind {
            Ok(token)
        } else {
            Err(ConditionError::syntax(
                token.position,
                format!("expected {}, found {}", kind.describe(), token.kind.describe()),
            ))
        }
    }

    fn enter(&mut self, position: usize) -> Result<(), ConditionError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ConditionError::syntax(
                position,
                format!("expression nested deeper than {} levels", MAX_DEPTH),
            ));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn parse_or(&mut self) -> Result<Expr, ConditionError> {
        let mut left = self.parse_and()?;
        while self.eat(&TokenKind::Or) {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ConditionError> {
        let mut left = self.parse_not()?;
        while self.eat(&TokenKind::And) {
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ConditionError> {
        let position = self.peek().position;
        if self.eat(&TokenKind::Not) {
            self.enter(position)?;
            let inner = self.parse_not()?;
            self.leave();
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ConditionError> {
        let left = self.parse_unary()?;

        let Some(op) = CompareOp::from_token(&self.peek().kind) else {
            return Ok(left);
        };
        self.advance();
        let right = self.parse_unary()?;

        let next = self.peek();
        if CompareOp::from_token(&next.kind).is_some() {
            return Err(ConditionError::syntax(
                next.position,
                "chained comparisons are not supported, combine them with '&&'",
            ));
        }

        Ok(Expr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn parse_unary(&mut self) -> Result<Expr, ConditionError> {
        let position = self.peek().position;
        if self.eat(&TokenKind::Minus) {
            self.enter(position)?;
            let inner = self.parse_unary()?;
            self.leave();
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ConditionError> {
        let token = self.advance();
        match token.kind {
            TokenKind::Literal(value) => Ok(Expr::Literal(value)),
            TokenKind::Ident(root) => self.parse_path(root),
            TokenKind::LParen => {
                self.enter(token.position)?;
                let inner = self.parse_or()?;
                self.leave();
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            other => Err(ConditionError::syntax(
                token.position,
                format!("expected a value, found {}", other.describe()),
            )),
        }
    }

    fn parse_path(&mut self, root: String) -> Result<Expr, ConditionError> {
        let mut segments = Vec::new();

        loop {
            if self.eat(&TokenKind::Dot) {
                let token = self.advance();
                match token.kind {
                    TokenKind::Ident(name) => segments.push(Segment::Key(name)),
                    other => {
                        return Err(ConditionError::syntax(
                            token.position,
                            format!("expected a field name after '.', found {}", other.describe()),
                        ))
                    }
                }
            } else if self.eat(&TokenKind::LBracket) {
                let token = self.advance();
                let segment = match token.kind {
                    TokenKind::Literal(Value::String(key)) => Segment::Key(key),
                    TokenKind::Literal(Value::Number(n)) => match n.as_u64() {
                        Some(index) => Segment::Index(index as usize),
                        None => {
                            return Err(ConditionError::syntax(
                                token.position,
                                format!("index must be a non-negative integer, found {}", n),
                            ))
                        }
                    },
                    other => {
                        return Err(ConditionError::syntax(
                            token.position,
                            format!("expected a string key or index, found {}", other.describe()),
                        ))
                    }
                };
                self.expect(TokenKind::RBracket)?;
                segments.push(segment);
            } else {
                break;
            }
        }

        Ok(Expr::Path(Path { root, segments }))
    }
}
