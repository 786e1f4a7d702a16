//! Expression parser (Pratt) and free-identifier check.

use std::collections::BTreeSet;

use super::SandboxError;
use super::lexer::{Punct, Spanned, Token, tokenize};

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    NotEq,
    Lt,
    Gt,
    Le,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Ident(String),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Member {
        object: Box<Expr>,
        property: String,
        optional: bool,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
}

// Binding powers, low to high.
const TERNARY_BP: u8 = 1;
const PREFIX_BP: u8 = 17;
const POSTFIX_BP: u8 = 19;

/// Nesting bound for the tree. The evaluator, the identifier walk and
/// dropping an `Expr` all recurse once per level.
const MAX_DEPTH: usize = 256;

/// Parse one expression, optionally followed by semicolons.
pub fn parse(src: &str) -> Result<Expr, SandboxError> {
    let mut parser = Parser {
        tokens: tokenize(src)?,
        pos: 0,
        depth: 0,
    };
    let expr = parser.expr(0)?;
    while parser.eat(Punct::Semicolon) {}
    match parser.peek() {
        Token::Eof => Ok(expr),
        other => Err(parser.error(format!("unexpected {}", describe(other)))),
    }
}

/// Identifiers an expression reads, in sorted order. Property names
/// and object keys are not identifiers.
pub fn free_identifiers(expr: &Expr) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    collect(expr, &mut names);
    names
}

fn collect(expr: &Expr, names: &mut BTreeSet<String>) {
    match expr {
        Expr::Literal(_) => {}
        Expr::Ident(name) => {
            names.insert(name.clone());
        }
        Expr::Array(items) => items.iter().for_each(|e| collect(e, names)),
        Expr::Object(fields) => fields.iter().for_each(|(_, e)| collect(e, names)),
        Expr::Member { object, .. } => collect(object, names),
        Expr::Index { object, index } => {
            collect(object, names);
            collect(index, names);
        }
        Expr::Call { callee, args } => {
            collect(callee, names);
            args.iter().for_each(|e| collect(e, names));
        }
        Expr::Unary { operand, .. } => collect(operand, names),
        Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
            collect(left, names);
            collect(right, names);
        }
        Expr::Conditional {
            test,
            consequent,
            alternate,
        } => {
            collect(test, names);
            collect(consequent, names);
            collect(alternate, names);
        }
    }
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    /// Enclosing `expr` frames plus the nodes each has wrapped so far.
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .map(|(t, _)| t)
            .unwrap_or(&Token::Eof)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or(self.tokens.last())
            .map(|(_, o)| *o)
            .unwrap_or_default()
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, punct: Punct) -> bool {
        if *self.peek() == Token::Punct(punct) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, punct: Punct, what: &str) -> Result<(), SandboxError> {
        if self.eat(punct) {
            Ok(())
        } else {
            let found = describe(self.peek());
            Err(self.error(format!("expected {what}, found {found}")))
        }
    }

    fn error(&self, message: impl Into<String>) -> SandboxError {
        SandboxError::Syntax {
            offset: self.offset(),
            message: message.into(),
        }
    }

    fn deeper(&mut self) -> Result<(), SandboxError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error("expression nested too deeply"));
        }
        self.depth += 1;
        Ok(())
    }

    fn expr(&mut self, min_bp: u8) -> Result<Expr, SandboxError> {
        let entry = self.depth;
        let out = self.expr_at(min_bp);
        self.depth = entry;
        out
    }

    fn expr_at(&mut self, min_bp: u8) -> Result<Expr, SandboxError> {
        self.deeper()?;
        let mut lhs = self.prefix()?;

        loop {
            let token = self.peek().clone();
            let Token::Punct(punct) = token else {
                break;
            };

            // -- Postfix --
            if matches!(
                punct,
                Punct::Dot | Punct::QuestionDot | Punct::LBracket | Punct::LParen
            ) {
                if POSTFIX_BP < min_bp {
                    break;
                }
                self.deeper()?;
                lhs = self.postfix(lhs, punct)?;
                continue;
            }

            // -- Ternary --
            if punct == Punct::Question {
                if TERNARY_BP < min_bp {
                    break;
                }
                self.deeper()?;
                self.advance();
                let consequent = self.expr(0)?;
                self.expect(Punct::Colon, "':'")?;
                let alternate = self.expr(TERNARY_BP)?;
                lhs = Expr::Conditional {
                    test: Box::new(lhs),
                    consequent: Box::new(consequent),
                    alternate: Box::new(alternate),
                };
                continue;
            }

            // -- Infix --
            let Some((l_bp, r_bp)) = infix_bp(punct) else {
                break;
            };
            if l_bp < min_bp {
                break;
            }
            self.deeper()?;
            self.advance();
            let rhs = self.expr(r_bp)?;
            lhs = combine(punct, lhs, rhs);
        }

        Ok(lhs)
    }

    fn prefix(&mut self) -> Result<Expr, SandboxError> {
        match self.advance() {
            Token::Number(n) => Ok(Expr::Literal(Literal::Number(n))),
            Token::Str(s) => Ok(Expr::Literal(Literal::Str(s))),
            Token::Ident(name) => match name.as_str() {
                "true" => Ok(Expr::Literal(Literal::Bool(true))),
                "false" => Ok(Expr::Literal(Literal::Bool(false))),
                "null" | "undefined" => Ok(Expr::Literal(Literal::Null)),
                // Capability calls are awaited by the evaluator anyway.
                "await" => self.expr(PREFIX_BP),
                _ => Ok(Expr::Ident(name)),
            },
            Token::Punct(Punct::LParen) => {
                let inner = self.expr(0)?;
                self.expect(Punct::RParen, "')'")?;
                Ok(inner)
            }
            Token::Punct(Punct::LBracket) => {
                let items = self.list(Punct::RBracket, "']'", |p| p.expr(0))?;
                Ok(Expr::Array(items))
            }
            Token::Punct(Punct::LBrace) => {
                let fields = self.list(Punct::RBrace, "'}'", Parser::field)?;
                Ok(Expr::Object(fields))
            }
            Token::Punct(op @ (Punct::Bang | Punct::Minus | Punct::Plus)) => {
                let operand = self.expr(PREFIX_BP)?;
                let op = match op {
                    Punct::Bang => UnaryOp::Not,
                    Punct::Minus => UnaryOp::Neg,
                    _ => UnaryOp::Plus,
                };
                Ok(Expr::Unary {
                    op,
                    operand: Box::new(operand),
                })
            }
            other => {
                // Report at the token just consumed.
                self.pos = self.pos.saturating_sub(1);
                Err(self.error(format!("unexpected {}", describe(&other))))
            }
        }
    }

    fn postfix(&mut self, lhs: Expr, punct: Punct) -> Result<Expr, SandboxError> {
        self.advance();
        match punct {
            Punct::Dot | Punct::QuestionDot => {
                let optional = punct == Punct::QuestionDot;
                // `a?.(x)` and `a?.[x]` are not supported; only `a?.b`.
                match self.advance() {
                    Token::Ident(property) => Ok(Expr::Member {
                        object: Box::new(lhs),
                        property,
                        optional,
                    }),
                    other => {
                        self.pos = self.pos.saturating_sub(1);
                        let found = describe(&other);
                        Err(self.error(format!("expected property name, found {found}")))
                    }
                }
            }
            Punct::LBracket => {
                let index = self.expr(0)?;
                self.expect(Punct::RBracket, "']'")?;
                Ok(Expr::Index {
                    object: Box::new(lhs),
                    index: Box::new(index),
                })
            }
            _ => {
                let args = self.list(Punct::RParen, "')'", |p| p.expr(0))?;
                Ok(Expr::Call {
                    callee: Box::new(lhs),
                    args,
                })
            }
        }
    }

    /// Comma-separated items up to `close`; a trailing comma is allowed.
    fn list<T>(
        &mut self,
        close: Punct,
        what: &str,
        mut item: impl FnMut(&mut Parser) -> Result<T, SandboxError>,
    ) -> Result<Vec<T>, SandboxError> {
        let mut items = Vec::new();
        loop {
            if self.eat(close) {
                return Ok(items);
            }
            items.push(item(self)?);
            if !self.eat(Punct::Comma) {
                self.expect(close, what)?;
                return Ok(items);
            }
        }
    }

    fn field(&mut self) -> Result<(String, Expr), SandboxError> {
        match self.advance() {
            Token::Ident(key) => {
                if self.eat(Punct::Colon) {
                    Ok((key, self.expr(0)?))
                } else {
                    // Shorthand `{ result }`.
                    Ok((key.clone(), Expr::Ident(key)))
                }
            }
            Token::Str(key) => {
                self.expect(Punct::Colon, "':'")?;
                Ok((key, self.expr(0)?))
            }
            other => {
                self.pos = self.pos.saturating_sub(1);
                Err(self.error(format!("expected property name, found {}", describe(&other))))
            }
        }
    }
}

fn infix_bp(punct: Punct) -> Option<(u8, u8)> {
    Some(match punct {
        Punct::QuestionQuestion => (3, 4),
        Punct::OrOr => (5, 6),
        Punct::AndAnd => (7, 8),
        Punct::EqEq | Punct::NotEq => (9, 10),
        Punct::Lt | Punct::Gt | Punct::Le | Punct::Ge => (11, 12),
        Punct::Plus | Punct::Minus => (13, 14),
        Punct::Star | Punct::Slash | Punct::Percent => (15, 16),
        _ => return None,
    })
}

fn combine(punct: Punct, left: Expr, right: Expr) -> Expr {
    let (left, right) = (Box::new(left), Box::new(right));
    let logical = match punct {
        Punct::QuestionQuestion => Some(LogicalOp::Nullish),
        Punct::OrOr => Some(LogicalOp::Or),
        Punct::AndAnd => Some(LogicalOp::And),
        _ => None,
    };
    if let Some(op) = logical {
        return Expr::Logical { op, left, right };
    }
    let op = match punct {
        Punct::EqEq => BinaryOp::Eq,
        Punct::NotEq => BinaryOp::NotEq,
        Punct::Lt => BinaryOp::Lt,
        Punct::Gt => BinaryOp::Gt,
        Punct::Le => BinaryOp::Le,
        Punct::Ge => BinaryOp::Ge,
        Punct::Plus => BinaryOp::Add,
        Punct::Minus => BinaryOp::Sub,
        Punct::Star => BinaryOp::Mul,
        Punct::Slash => BinaryOp::Div,
        _ => BinaryOp::Rem,
    };
    Expr::Binary { op, left, right }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Number(n) => format!("number {n}"),
        Token::Str(_) => "string".to_string(),
        Token::Ident(name) => format!("'{name}'"),
        Token::Punct(p) => format!("{p:?}"),
        Token::Eof => "end of input".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> Box<Expr> {
        Box::new(Expr::Ident(name.into()))
    }

    fn num(n: f64) -> Box<Expr> {
        Box::new(Expr::Literal(Literal::Number(n)))
    }

    #[test]
    fn precedence() {
        assert_eq!(
            parse("1 + 2 * 3").unwrap(),
            Expr::Binary {
                op: BinaryOp::Add,
                left: num(1.0),
                right: Box::new(Expr::Binary {
                    op: BinaryOp::Mul,
                    left: num(2.0),
                    right: num(3.0),
                }),
            }
        );
    }

    #[test]
    fn left_associative_subtraction() {
        assert_eq!(
            parse("5 - 2 - 1").unwrap(),
            Expr::Binary {
                op: BinaryOp::Sub,
                left: Box::new(Expr::Binary {
                    op: BinaryOp::Sub,
                    left: num(5.0),
                    right: num(2.0),
                }),
                right: num(1.0),
            }
        );
    }

    #[test]
    fn prefix_binds_looser_than_member() {
        assert_eq!(
            parse("!result.length").unwrap(),
            Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(Expr::Member {
                    object: ident("result"),
                    property: "length".into(),
                    optional: false,
                }),
            }
        );
    }

    #[test]
    fn method_call_chain() {
        let expr = parse("pangu(result.trim())").unwrap();
        assert_eq!(
            expr,
            Expr::Call {
                callee: ident("pangu"),
                args: vec![Expr::Call {
                    callee: Box::new(Expr::Member {
                        object: ident("result"),
                        property: "trim".into(),
                        optional: false,
                    }),
                    args: vec![],
                }],
            }
        );
    }

    #[test]
    fn await_is_transparent() {
        assert_eq!(parse("await ocr(data)").unwrap(), parse("ocr(data)").unwrap());
    }

    #[test]
    fn ternary_is_right_associative() {
        let expr = parse("a ? b : c ? d : e").unwrap();
        let Expr::Conditional { alternate, .. } = expr else {
            panic!("not a conditional");
        };
        assert!(matches!(*alternate, Expr::Conditional { .. }));
    }

    #[test]
    fn object_literal_with_shorthand() {
        assert_eq!(
            parse("{ result, 'mode': 1, }").unwrap(),
            Expr::Object(vec![
                ("result".into(), Expr::Ident("result".into())),
                ("mode".into(), Expr::Literal(Literal::Number(1.0))),
            ])
        );
    }

    #[test]
    fn trailing_semicolons_allowed() {
        assert!(parse("result;;").is_ok());
    }

    #[test]
    fn statements_rejected() {
        assert!(parse("result; data").is_err());
        assert!(parse("a b").is_err());
        assert!(parse("(a").is_err());
    }

    fn too_deep(src: &str) -> bool {
        matches!(
            parse(src),
            Err(SandboxError::Syntax { message, .. }) if message == "expression nested too deeply"
        )
    }

    #[test]
    fn deep_nesting_rejected() {
        let n = 200_000;
        assert!(too_deep(&format!("{}1{}", "(".repeat(n), ")".repeat(n))));
        assert!(too_deep(&format!("{}1{}", "[".repeat(n), "]".repeat(n))));
        assert!(too_deep(&format!("{}x", "!".repeat(n))));
        assert!(too_deep(&format!("{}x", "await ".repeat(n))));
        assert!(too_deep(&format!("{{a:{}1{}", "{a:".repeat(n), "}".repeat(n + 1))));
    }

    #[test]
    fn long_chains_rejected() {
        let n = 200_000;
        assert!(too_deep(&format!("1{}", "+1".repeat(n))));
        assert!(too_deep(&format!("result{}", ".length".repeat(n))));
        assert!(too_deep(&format!("f{}", "()".repeat(n))));
        assert!(too_deep(&format!("a{}", " ? a : a".repeat(n))));
    }

    #[test]
    fn moderate_nesting_parses() {
        assert!(parse(&format!("{}1{}", "(".repeat(64), ")".repeat(64))).is_ok());
        assert!(parse(&format!("1{}", "+1".repeat(64))).is_ok());
    }

    #[test]
    fn free_identifiers_skip_properties_and_keys() {
        let expr = parse("{ out: context.result.trim(), n: window[locale] }").unwrap();
        let names: Vec<String> = free_identifiers(&expr).into_iter().collect();
        assert_eq!(names, vec!["context", "locale", "window"]);
    }
}
