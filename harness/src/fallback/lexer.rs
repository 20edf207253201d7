use super::{EvalError, EvalResult};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    /// `**` or `^`
    Power,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Assign,
    /// Postfix `'`
    Transpose,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: usize,
    /// Whitespace precedes this token; separates matrix elements like `[1 -2]`.
    pub spaced_before: bool,
}

pub fn tokenize(input: &str) -> EvalResult<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    let mut spaced = false;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            spaced = true;
            i += 1;
            continue;
        }

        let start = i;
        let kind = match c {
            '0'..='9' | '.' => {
                let (value, next) = number(&chars, i)?;
                i = next;
                TokenKind::Number(value)
            }
            c if c.is_alphabetic() || c == '_' => {
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                TokenKind::Ident(chars[start..i].iter().collect())
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                TokenKind::Power
            }
            _ => {
                i += 1;
                match c {
                    '+' => TokenKind::Plus,
                    '-' => TokenKind::Minus,
                    '*' => TokenKind::Star,
                    '/' => TokenKind::Slash,
                    '%' => TokenKind::Percent,
                    '^' => TokenKind::Power,
                    '(' => TokenKind::LParen,
                    ')' => TokenKind::RParen,
                    '[' => TokenKind::LBracket,
                    ']' => TokenKind::RBracket,
                    ',' => TokenKind::Comma,
                    ';' => TokenKind::Semicolon,
                    '=' => TokenKind::Assign,
                    '\'' => TokenKind::Transpose,
                    other => {
                        return Err(EvalError::Syntax {
                            position: start,
                            message: format!("unexpected character '{}'", other.escape_default()),
                        })
                    }
                }
            }
        };

        tokens.push(Token {
            kind,
            position: start,
            spaced_before: spaced,
        });
        spaced = false;
    }

    Ok(tokens)
}

fn number(chars: &[char], start: usize) -> EvalResult<(f64, usize)> {
    let mut i = start;
    while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
        i += 1;
    }
    // Exponent only when digits follow, so `2e` stays a syntax error downstream.
    if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
        let mut j = i + 1;
        if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
            j += 1;
        }
        if j < chars.len() && chars[j].is_ascii_digit() {
            while j < chars.len() && chars[j].is_ascii_digit() {
                j += 1;
            }
            i = j;
        }
    }

    let text: String = chars[start..i].iter().collect();
    text.parse::<f64>()
        .map(|value| (value, i))
        .map_err(|_| EvalError::Syntax {
            position: start,
            message: format!("invalid number '{}'", text),
        })
}
