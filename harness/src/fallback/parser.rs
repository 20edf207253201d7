//! Pratt parser over the token stream.

use super::lexer::{Token, TokenKind};
use super::{EvalError, EvalResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Var(String),
    Neg(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// Left fold of two or more operators: `1 - 2 - 3` is `((1 - 2) - 3)`.
    /// Kept flat so long operator chains never nest.
    Chain(Box<Expr>, Vec<(BinaryOp, Expr)>),
    Call(String, Vec<Expr>),
    Matrix(Vec<Vec<Expr>>),
    Transpose(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Assign(String, Expr),
    Expr(Expr),
}

const ADDITIVE: u8 = 10;
const MULTIPLICATIVE: u8 = 20;
const PREFIX: u8 = 30;
const POWER: u8 = 40;
const POSTFIX: u8 = 50;

/// Deepest nesting accepted; keeps `((((...` inputs off the stack limit.
const MAX_DEPTH: usize = 256;

pub fn parse_statement(tokens: &[Token]) -> EvalResult<Statement> {
    if tokens.is_empty() {
        return Err(EvalError::Syntax {
            position: 0,
            message: "empty expression".to_string(),
        });
    }

    let mut parser = Parser::new(tokens);
    let statement = match (tokens.first().map(|t| &t.kind), tokens.get(1).map(|t| &t.kind)) {
        (Some(TokenKind::Ident(name)), Some(TokenKind::Assign)) => {
            parser.pos = 2;
            Statement::Assign(name.clone(), parser.expression(0)?)
        }
        _ => Statement::Expr(parser.expression(0)?),
    };

    if let Some(extra) = parser.peek() {
        return Err(EvalError::Syntax {
            position: extra.position,
            message: format!("unexpected {}", describe(&extra.kind)),
        });
    }
    Ok(statement)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
    matrix_depth: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
            matrix_depth: 0,
        }
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn end_position(&self) -> usize {
        self.tokens
            .last()
            .map(|t| t.position + 1)
            .unwrap_or(0)
    }

    fn expect(&mut self, kind: TokenKind) -> EvalResult<()> {
        match self.next() {
            Some(token) if token.kind == kind => Ok(()),
            Some(token) => Err(EvalError::Syntax {
                position: token.position,
                message: format!("expected {}, found {}", describe(&kind), describe(&token.kind)),
            }),
            None => Err(EvalError::Syntax {
                position: self.end_position(),
                message: format!("expected {}, found end of input", describe(&kind)),
            }),
        }
    }

    fn expression(&mut self, min_bp: u8) -> EvalResult<Expr> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(EvalError::Syntax {
                position: self.peek().map(|t| t.position).unwrap_or(0),
                message: "expression nested too deeply".to_string(),
            });
        }
        let result = self.expression_inner(min_bp);
        self.depth -= 1;
        result
    }

    fn expression_inner(&mut self, min_bp: u8) -> EvalResult<Expr> {
        let mut lhs = self.prefix()?;
        let mut rest: Vec<(BinaryOp, Expr)> = Vec::new();

        while let Some(token) = self.peek() {
            if token.kind == TokenKind::Transpose {
                if POSTFIX < min_bp {
                    break;
                }
                self.pos += 1;
                lhs = match fold(lhs, std::mem::take(&mut rest)) {
                    // x'' is x
                    Expr::Transpose(inner) => *inner,
                    other => Expr::Transpose(Box::new(other)),
                };
                continue;
            }

            let (op, lbp, rbp) = match token.kind {
                TokenKind::Plus => (BinaryOp::Add, ADDITIVE, ADDITIVE + 1),
                TokenKind::Minus => (BinaryOp::Sub, ADDITIVE, ADDITIVE + 1),
                TokenKind::Star => (BinaryOp::Mul, MULTIPLICATIVE, MULTIPLICATIVE + 1),
                TokenKind::Slash => (BinaryOp::Div, MULTIPLICATIVE, MULTIPLICATIVE + 1),
                TokenKind::Percent => (BinaryOp::Mod, MULTIPLICATIVE, MULTIPLICATIVE + 1),
                // Right associative.
                TokenKind::Power => (BinaryOp::Pow, POWER, POWER - 1),
                _ => break,
            };
            if lbp < min_bp || self.separates_matrix_elements(token) {
                break;
            }

            self.pos += 1;
            let rhs = self.expression(rbp)?;
            rest.push((op, rhs));
        }

        Ok(fold(lhs, rest))
    }

    /// Inside `[...]`, `1 -2` is two elements while `1 - 2` and `1-2` are one.
    fn separates_matrix_elements(&self, token: &Token) -> bool {
        if self.matrix_depth == 0 || !token.spaced_before {
            return false;
        }
        if !matches!(token.kind, TokenKind::Plus | TokenKind::Minus) {
            return false;
        }
        self.tokens
            .get(self.pos + 1)
            .is_some_and(|next| !next.spaced_before)
    }

    fn prefix(&mut self) -> EvalResult<Expr> {
        let Some(token) = self.next() else {
            return Err(EvalError::Syntax {
                position: self.end_position(),
                message: "unexpected end of input".to_string(),
            });
        };

        match &token.kind {
            TokenKind::Number(n) => Ok(Expr::Number(*n)),
            TokenKind::Ident(name) => {
                if self.peek().map(|t| &t.kind) == Some(&TokenKind::LParen) {
                    self.pos += 1;
                    let args = self.arguments()?;
                    Ok(Expr::Call(name.clone(), args))
                } else {
                    Ok(Expr::Var(name.clone()))
                }
            }
            TokenKind::Minus => Ok(Expr::Neg(Box::new(self.expression(PREFIX)?))),
            TokenKind::Plus => self.expression(PREFIX),
            TokenKind::LParen => {
                let saved = self.matrix_depth;
                self.matrix_depth = 0;
                let inner = self.expression(0);
                self.matrix_depth = saved;
                let inner = inner?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::LBracket => self.matrix(),
            other => Err(EvalError::Syntax {
                position: token.position,
                message: format!("unexpected {}", describe(other)),
            }),
        }
    }

    fn arguments(&mut self) -> EvalResult<Vec<Expr>> {
        let saved = self.matrix_depth;
        self.matrix_depth = 0;
        let result = self.arguments_inner();
        self.matrix_depth = saved;
        result
    }

    fn arguments_inner(&mut self) -> EvalResult<Vec<Expr>> {
        let mut args = Vec::new();
        if self.peek().map(|t| &t.kind) == Some(&TokenKind::RParen) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.expression(0)?);
            match self.next() {
                Some(t) if t.kind == TokenKind::Comma => continue,
                Some(t) if t.kind == TokenKind::RParen => return Ok(args),
                Some(t) => {
                    return Err(EvalError::Syntax {
                        position: t.position,
                        message: format!("expected ',' or ')', found {}", describe(&t.kind)),
                    })
                }
                None => {
                    return Err(EvalError::Syntax {
                        position: self.end_position(),
                        message: "unclosed '('".to_string(),
                    })
                }
            }
        }
    }

    fn matrix(&mut self) -> EvalResult<Expr> {
        self.matrix_depth += 1;
        let result = self.matrix_inner();
        self.matrix_depth -= 1;
        result
    }

    fn matrix_inner(&mut self) -> EvalResult<Expr> {
        let mut rows: Vec<Vec<Expr>> = Vec::new();
        let mut row: Vec<Expr> = Vec::new();

        loop {
            match self.peek().map(|t| &t.kind) {
                Some(TokenKind::RBracket) => {
                    self.pos += 1;
                    if !row.is_empty() || !rows.is_empty() {
                        rows.push(row);
                    }
                    return Ok(Expr::Matrix(rows));
                }
                Some(TokenKind::Semicolon) => {
                    self.pos += 1;
                    rows.push(std::mem::take(&mut row));
                }
                Some(TokenKind::Comma) => {
                    self.pos += 1;
                }
                Some(_) => row.push(self.expression(0)?),
                None => {
                    return Err(EvalError::Syntax {
                        position: self.end_position(),
                        message: "unclosed '['".to_string(),
                    })
                }
            }
        }
    }
}

fn fold(first: Expr, mut rest: Vec<(BinaryOp, Expr)>) -> Expr {
    match rest.len() {
        0 => first,
        1 => {
            let (op, rhs) = rest.remove(0);
            Expr::Binary(op, Box::new(first), Box::new(rhs))
        }
        _ => Expr::Chain(Box::new(first), rest),
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Number(n) => format!("number {}", n),
        TokenKind::Ident(name) => format!("name '{}'", name),
        TokenKind::Plus => "'+'".to_string(),
        TokenKind::Minus => "'-'".to_string(),
        TokenKind::Star => "'*'".to_string(),
        TokenKind::Slash => "'/'".to_string(),
        TokenKind::Percent => "'%'".to_string(),
        TokenKind::Power => "'**'".to_string(),
        TokenKind::LParen => "'('".to_string(),
        TokenKind::RParen => "')'".to_string(),
        TokenKind::LBracket => "'['".to_string(),
        TokenKind::RBracket => "']'".to_string(),
        TokenKind::Comma => "','".to_string(),
        TokenKind::Semicolon => "';'".to_string(),
        TokenKind::Assign => "'='".to_string(),
        TokenKind::Transpose => "'''".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::super::lexer::tokenize;
    use super::*;

    fn parse(input: &str) -> EvalResult<Statement> {
        parse_statement(&tokenize(input)?)
    }

    fn expr(input: &str) -> Expr {
        match parse(input).unwrap() {
            Statement::Expr(e) => e,
            other => panic!("expected expression, got {:?}", other),
        }
    }

    fn num(n: f64) -> Box<Expr> {
        Box::new(Expr::Number(n))
    }

    #[test]
    fn test_precedence() {
        assert_eq!(
            expr("1 + 2 * 3"),
            Expr::Binary(
                BinaryOp::Add,
                num(1.0),
                Box::new(Expr::Binary(BinaryOp::Mul, num(2.0), num(3.0)))
            )
        );
    }

    #[test]
    fn test_power_binds_tighter_than_unary_minus() {
        assert_eq!(
            expr("-2**2"),
            Expr::Neg(Box::new(Expr::Binary(BinaryOp::Pow, num(2.0), num(2.0))))
        );
        assert_eq!(
            expr("2^3^2"),
            Expr::Binary(
                BinaryOp::Pow,
                num(2.0),
                Box::new(Expr::Binary(BinaryOp::Pow, num(3.0), num(2.0)))
            )
        );
    }

    #[test]
    fn test_assignment() {
        assert_eq!(
            parse("x = 4").unwrap(),
            Statement::Assign("x".to_string(), Expr::Number(4.0))
        );
    }

    #[test]
    fn test_matrix_literal_separators() {
        let Expr::Matrix(rows) = expr("[1 -2; 3, 4 - 1]") else {
            panic!("expected matrix");
        };
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].len(), 2);
        assert_eq!(rows[1].len(), 2);
        assert_eq!(rows[0][1], Expr::Neg(num(2.0)));
    }

    #[test]
    fn test_parenthesised_minus_inside_matrix() {
        let Expr::Matrix(rows) = expr("[(1 -2) 3]") else {
            panic!("expected matrix");
        };
        assert_eq!(rows[0].len(), 2);
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse("integrate(x, [[1,2]").is_err());
        assert!(parse(&")".repeat(1000)).is_err());
        assert!(parse("2 3").is_err());
        assert!(parse("").is_err());
        assert!(parse("(1").is_err());
    }

    #[test]
    fn test_operator_chains_stay_flat() {
        assert_eq!(
            expr("1 - 2 * 3 - 4"),
            Expr::Chain(
                num(1.0),
                vec![
                    (
                        BinaryOp::Sub,
                        Expr::Binary(BinaryOp::Mul, num(2.0), num(3.0))
                    ),
                    (BinaryOp::Sub, Expr::Number(4.0)),
                ]
            )
        );

        let long = format!("1+{}3", "2+".repeat(10000));
        let Expr::Chain(_, rest) = expr(&long) else {
            panic!("expected a flat chain");
        };
        assert_eq!(rest.len(), 10001);
    }

    #[test]
    fn test_double_transpose_cancels() {
        assert_eq!(expr("a''"), Expr::Var("a".to_string()));
        assert_eq!(
            expr("a + b'"),
            Expr::Binary(
                BinaryOp::Add,
                Box::new(Expr::Var("a".to_string())),
                Box::new(Expr::Transpose(Box::new(Expr::Var("b".to_string()))))
            )
        );
        assert!(matches!(expr(&format!("a{}", "'".repeat(10001))), Expr::Transpose(_)));
    }

    #[test]
    fn test_deep_nesting_rejected() {
        let input = format!("{}1{}", "(".repeat(5000), ")".repeat(5000));
        assert!(matches!(parse(&input), Err(EvalError::Syntax { .. })));
    }
}
