//! Parser for the expression subset the builders accept.
//!
//! Supported: dotted paths, integer/decimal numbers, `'text'` literals (with
//! `''` escapes), `NULL`/`TRUE`/`FALSE`, `:named` parameters, function calls
//! (optionally `DISTINCT`), `+ - * /` and parentheses.

use std::iter::Peekable;
use std::str::Chars;

use super::{ArithOp, Expr, Literal, PathExpr};
use crate::error::{QueryError, QueryResult};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Text(String),
    Named(String),
    LParen,
    RParen,
    Comma,
    Dot,
    Op(ArithOp),
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

fn tokenize(input: &str) -> QueryResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars: Peekable<Chars<'_>> = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' | ')' | ',' | '.' | '+' | '-' | '*' | '/' => {
                chars.next();
                tokens.push(match c {
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    ',' => Token::Comma,
                    '.' => Token::Dot,
                    '+' => Token::Op(ArithOp::Add),
                    '-' => Token::Op(ArithOp::Sub),
                    '*' => Token::Op(ArithOp::Mul),
                    _ => Token::Op(ArithOp::Div),
                });
            }
            '\'' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some('\'') if chars.peek() == Some(&'\'') => {
                            chars.next();
                            text.push('\'');
                        }
                        Some('\'') => break,
                        Some(ch) => text.push(ch),
                        None => return Err(QueryError::parse(input, "unterminated string literal")),
                    }
                }
                tokens.push(Token::Text(text));
            }
            ':' => {
                chars.next();
                let mut name = String::new();
                while let Some(&ch) = chars.peek() {
                    if !is_ident_char(ch) {
                        break;
                    }
                    name.push(ch);
                    chars.next();
                }
                if name.is_empty() {
                    return Err(QueryError::parse(input, "empty parameter name after ':'"));
                }
                tokens.push(Token::Named(name));
            }
            c if c.is_ascii_digit() => {
                let mut num = String::new();
                let mut is_float = false;
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_digit() {
                        num.push(ch);
                    } else if ch == '.' && !is_float {
                        is_float = true;
                        num.push(ch);
                    } else {
                        break;
                    }
                    chars.next();
                }
                tokens.push(if is_float {
                    Token::Float(
                        num.parse()
                            .map_err(|_| QueryError::parse(input, format!("bad number {num}")))?,
                    )
                } else {
                    Token::Int(
                        num.parse()
                            .map_err(|_| QueryError::parse(input, format!("bad number {num}")))?,
                    )
                });
            }
            c if is_ident_start(c) => {
                let mut ident = String::new();
                while let Some(&ch) = chars.peek() {
                    if !is_ident_char(ch) {
                        break;
                    }
                    ident.push(ch);
                    chars.next();
                }
                tokens.push(Token::Ident(ident));
            }
            other => {
                return Err(QueryError::parse(input, format!("unexpected character '{other}'")));
            }
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn error(&self, message: impl Into<String>) -> QueryError {
        QueryError::parse(self.input, message)
    }

    fn expect(&mut self, expected: Token) -> QueryResult<()> {
        match self.next() {
            Some(tok) if tok == expected => Ok(()),
            Some(tok) => Err(self.error(format!("expected {expected:?}, found {tok:?}"))),
            None => Err(self.error(format!("expected {expected:?}, found end of input"))),
        }
    }

    fn expression(&mut self) -> QueryResult<Expr> {
        let mut left = self.term()?;
        while let Some(Token::Op(op @ (ArithOp::Add | ArithOp::Sub))) = self.peek() {
            let op = *op;
            self.pos += 1;
            let right = self.term()?;
            left = Expr::Arithmetic {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn term(&mut self) -> QueryResult<Expr> {
        let mut left = self.factor()?;
        while let Some(Token::Op(op @ (ArithOp::Mul | ArithOp::Div))) = self.peek() {
            let op = *op;
            self.pos += 1;
            let right = self.factor()?;
            left = Expr::Arithmetic {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn factor(&mut self) -> QueryResult<Expr> {
        if let Some(Token::Op(ArithOp::Sub)) = self.peek() {
            self.pos += 1;
            return match self.next() {
                Some(Token::Int(v)) => Ok(Expr::Literal(Literal::Int(-v))),
                Some(Token::Float(v)) => Ok(Expr::Literal(Literal::Float(-v))),
                _ => Err(self.error("unary '-' is only supported before numbers")),
            };
        }
        self.primary()
    }

    fn primary(&mut self) -> QueryResult<Expr> {
        match self.next() {
            Some(Token::Int(v)) => Ok(Expr::Literal(Literal::Int(v))),
            Some(Token::Float(v)) => Ok(Expr::Literal(Literal::Float(v))),
            Some(Token::Text(s)) => Ok(Expr::Literal(Literal::Text(s))),
            Some(Token::Named(n)) => Ok(Expr::named(n)),
            Some(Token::LParen) => {
                let inner = self.expression()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(ident)) => self.ident(ident),
            Some(tok) => Err(self.error(format!("unexpected token {tok:?}"))),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn ident(&mut self, ident: String) -> QueryResult<Expr> {
        match self.peek() {
            Some(Token::LParen) => {
                self.pos += 1;
                self.function(ident)
            }
            Some(Token::Dot) => {
                let mut segments = vec![ident];
                while let Some(Token::Dot) = self.peek() {
                    self.pos += 1;
                    match self.next() {
                        Some(Token::Ident(seg)) => segments.push(seg),
                        _ => return Err(self.error("expected attribute name after '.'")),
                    }
                }
                Ok(Expr::Path(PathExpr {
                    root: super::PathRoot::Unresolved,
                    segments,
                }))
            }
            _ => Ok(match ident.to_ascii_uppercase().as_str() {
                "NULL" => Expr::Literal(Literal::Null),
                "TRUE" => Expr::Literal(Literal::Bool(true)),
                "FALSE" => Expr::Literal(Literal::Bool(false)),
                _ => Expr::path(&ident),
            }),
        }
    }

    fn function(&mut self, name: String) -> QueryResult<Expr> {
        let mut args = Vec::new();
        let mut distinct = false;

        if let (Some(Token::Ident(kw)), Some(next)) = (self.peek(), self.peek_at(1))
            && kw.eq_ignore_ascii_case("distinct")
            && !matches!(next, Token::RParen | Token::Comma | Token::Dot | Token::LParen)
        {
            distinct = true;
            self.pos += 1;
        }

        if let Some(Token::RParen) = self.peek() {
            self.pos += 1;
        } else {
            loop {
                args.push(self.expression()?);
                match self.next() {
                    Some(Token::Comma) => continue,
                    Some(Token::RParen) => break,
                    _ => return Err(self.error(format!("unterminated call to {name}"))),
                }
            }
        }

        Ok(Expr::Function {
            name,
            args,
            distinct,
        })
    }
}

/// Parse expression text into an unresolved [`Expr`].
pub fn parse_expr(input: &str) -> QueryResult<Expr> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(QueryError::parse(input, "empty expression"));
    }
    let mut parser = Parser {
        input,
        tokens,
        pos: 0,
    };
    let expr = parser.expression()?;
    if let Some(tok) = parser.peek() {
        return Err(parser.error(format!("trailing input at {tok:?}")));
    }
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{Param, PathRoot};

    fn path(segments: &[&str]) -> Expr {
        Expr::Path(PathExpr {
            root: PathRoot::Unresolved,
            segments: segments.iter().map(|s| s.to_string()).collect(),
        })
    }

    #[test]
    fn parses_paths_and_literals() {
        assert_eq!(parse_expr("e.parent.id").unwrap(), path(&["e", "parent", "id"]));
        assert_eq!(parse_expr("0").unwrap(), Expr::Literal(Literal::Int(0)));
        assert_eq!(parse_expr("''").unwrap(), Expr::Literal(Literal::Text(String::new())));
        assert_eq!(parse_expr("null").unwrap(), Expr::Literal(Literal::Null));
        assert_eq!(parse_expr(":ids").unwrap(), Expr::Param(Param::Named("ids".into())));
    }

    #[test]
    fn arithmetic_respects_precedence() {
        let expr = parse_expr("t.level + 1 * 2").unwrap();
        match expr {
            Expr::Arithmetic { op, right, .. } => {
                assert_eq!(op, ArithOp::Add);
                assert!(matches!(*right, Expr::Arithmetic { op: ArithOp::Mul, .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_function_calls() {
        let expr = parse_expr("CONCAT(p.name,'s document')").unwrap();
        assert_eq!(
            expr,
            Expr::Function {
                name: "CONCAT".into(),
                args: vec![
                    path(&["p", "name"]),
                    Expr::Literal(Literal::Text("s document".into()))
                ],
                distinct: false,
            }
        );

        let expr = parse_expr("COUNT(DISTINCT r.id)").unwrap();
        assert!(matches!(expr, Expr::Function { distinct: true, .. }));
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(parse_expr("").is_err());
        assert!(parse_expr("'open").is_err());
        assert!(parse_expr("a.").is_err());
        assert!(parse_expr("f(a").is_err());
        assert!(parse_expr("a b").is_err());
        assert!(parse_expr("a ; b").is_err());
    }
}
