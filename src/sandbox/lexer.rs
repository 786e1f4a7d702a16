//! Tokenizer for tool scripts.

use super::SandboxError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Punct(Punct),
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Punct {
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    QuestionDot,
    Colon,
    Semicolon,
    Question,
    QuestionQuestion,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    EqEq,
    NotEq,
    Lt,
    Gt,
    Le,
    Ge,
    AndAnd,
    OrOr,
}

/// A token and the byte offset it starts at.
pub type Spanned = (Token, usize);

pub fn tokenize(src: &str) -> Result<Vec<Spanned>, SandboxError> {
    Lexer {
        src,
        chars: src.char_indices().peekable(),
    }
    .run()
}

struct Lexer<'a> {
    src: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl Lexer<'_> {
    fn run(mut self) -> Result<Vec<Spanned>, SandboxError> {
        let mut tokens = Vec::new();
        while let Some(&(offset, c)) = self.chars.peek() {
            if c.is_whitespace() {
                self.chars.next();
                continue;
            }
            if c == '/' && self.skip_comment(offset)? {
                continue;
            }
            let token = match c {
                '0'..='9' => self.number(offset)?,
                '.' if self.next_is_digit(offset) => self.number(offset)?,
                '"' | '\'' => self.string(offset, c)?,
                c if is_ident_start(c) => self.ident(offset),
                _ => Token::Punct(self.punct(offset)?),
            };
            tokens.push((token, offset));
        }
        tokens.push((Token::Eof, self.src.len()));
        Ok(tokens)
    }

    fn next_is_digit(&self, offset: usize) -> bool {
        self.src[offset + 1..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_digit())
    }

    /// Skip `// ...` or `/* ... */` starting at `offset`. `false` when
    /// the slash is an operator.
    fn skip_comment(&mut self, offset: usize) -> Result<bool, SandboxError> {
        let rest = &self.src[offset..];
        if rest.starts_with("//") {
            while self.chars.next_if(|&(_, c)| c != '\n').is_some() {}
            return Ok(true);
        }
        if rest.starts_with("/*") {
            let Some(end) = rest[2..].find("*/") else {
                return Err(syntax(offset, "unterminated comment"));
            };
            let stop = offset + 2 + end + 2;
            while self.chars.next_if(|&(i, _)| i < stop).is_some() {}
            return Ok(true);
        }
        Ok(false)
    }

    fn number(&mut self, offset: usize) -> Result<Token, SandboxError> {
        let mut end = offset;
        let mut seen_dot = false;
        while let Some(&(i, c)) = self.chars.peek() {
            let accept = c.is_ascii_digit() || (c == '.' && !seen_dot && {
                // `1.toString` is not a number continuation.
                self.src[i + 1..].chars().next().is_some_and(|n| n.is_ascii_digit())
            });
            if !accept {
                break;
            }
            seen_dot |= c == '.';
            end = i + c.len_utf8();
            self.chars.next();
        }
        self.src[offset..end]
            .parse::<f64>()
            .map(Token::Number)
            .map_err(|_| syntax(offset, "invalid number"))
    }

    fn string(&mut self, offset: usize, quote: char) -> Result<Token, SandboxError> {
        self.chars.next();
        let mut out = String::new();
        loop {
            let Some((_, c)) = self.chars.next() else {
                return Err(syntax(offset, "unterminated string"));
            };
            match c {
                c if c == quote => return Ok(Token::Str(out)),
                '\n' => return Err(syntax(offset, "unterminated string")),
                '\\' => out.push(self.escape(offset)?),
                c => out.push(c),
            }
        }
    }

    fn escape(&mut self, offset: usize) -> Result<char, SandboxError> {
        let Some((_, c)) = self.chars.next() else {
            return Err(syntax(offset, "unterminated string"));
        };
        Ok(match c {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '0' => '\0',
            'u' => {
                let mut code = String::new();
                for _ in 0..4 {
                    match self.chars.next() {
                        Some((_, h)) if h.is_ascii_hexdigit() => code.push(h),
                        _ => return Err(syntax(offset, "invalid unicode escape")),
                    }
                }
                u32::from_str_radix(&code, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| syntax(offset, "invalid unicode escape"))?
            }
            other => other,
        })
    }

    fn ident(&mut self, offset: usize) -> Token {
        let mut end = offset;
        while let Some((i, c)) = self.chars.next_if(|&(_, c)| is_ident_continue(c)) {
            end = i + c.len_utf8();
        }
        Token::Ident(self.src[offset..end].to_string())
    }

    fn punct(&mut self, offset: usize) -> Result<Punct, SandboxError> {
        let rest = &self.src[offset..];
        // Longest match first.
        let (punct, len) = if rest.starts_with("===") {
            (Punct::EqEq, 3)
        } else if rest.starts_with("!==") {
            (Punct::NotEq, 3)
        } else if rest.starts_with("==") {
            (Punct::EqEq, 2)
        } else if rest.starts_with("!=") {
            (Punct::NotEq, 2)
        } else if rest.starts_with("<=") {
            (Punct::Le, 2)
        } else if rest.starts_with(">=") {
            (Punct::Ge, 2)
        } else if rest.starts_with("&&") {
            (Punct::AndAnd, 2)
        } else if rest.starts_with("||") {
            (Punct::OrOr, 2)
        } else if rest.starts_with("??") {
            (Punct::QuestionQuestion, 2)
        } else if rest.starts_with("?.") && !self.next_is_digit(offset + 1) {
            (Punct::QuestionDot, 2)
        } else {
            let single = match rest.chars().next() {
                Some('(') => Punct::LParen,
                Some(')') => Punct::RParen,
                Some('[') => Punct::LBracket,
                Some(']') => Punct::RBracket,
                Some('{') => Punct::LBrace,
                Some('}') => Punct::RBrace,
                Some(',') => Punct::Comma,
                Some('.') => Punct::Dot,
                Some(':') => Punct::Colon,
                Some(';') => Punct::Semicolon,
                Some('?') => Punct::Question,
                Some('+') => Punct::Plus,
                Some('-') => Punct::Minus,
                Some('*') => Punct::Star,
                Some('/') => Punct::Slash,
                Some('%') => Punct::Percent,
                Some('!') => Punct::Bang,
                Some('<') => Punct::Lt,
                Some('>') => Punct::Gt,
                Some(c) => return Err(syntax(offset, format!("unexpected character {c:?}"))),
                None => return Err(syntax(offset, "unexpected end of input")),
            };
            (single, 1)
        };
        for _ in 0..len {
            self.chars.next();
        }
        Ok(punct)
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    is_ident_start(c) || c.is_ascii_digit()
}

fn syntax(offset: usize, message: impl Into<String>) -> SandboxError {
    SandboxError::Syntax {
        offset,
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Token> {
        tokenize(src).unwrap().into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn member_call() {
        assert_eq!(
            kinds("result.trim()"),
            vec![
                Token::Ident("result".into()),
                Token::Punct(Punct::Dot),
                Token::Ident("trim".into()),
                Token::Punct(Punct::LParen),
                Token::Punct(Punct::RParen),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn strict_equality_maps_to_equality() {
        assert_eq!(
            kinds("a === b !== c"),
            vec![
                Token::Ident("a".into()),
                Token::Punct(Punct::EqEq),
                Token::Ident("b".into()),
                Token::Punct(Punct::NotEq),
                Token::Ident("c".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn strings_and_escapes() {
        assert_eq!(
            kinds(r#"'it\'s' "a\nb" "中""#),
            vec![
                Token::Str("it's".into()),
                Token::Str("a\nb".into()),
                Token::Str("中".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn numbers() {
        assert_eq!(
            kinds("1 2.5 .5"),
            vec![
                Token::Number(1.0),
                Token::Number(2.5),
                Token::Number(0.5),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn optional_chain_vs_ternary_decimal() {
        assert_eq!(kinds("a?.b")[1], Token::Punct(Punct::QuestionDot));
        assert_eq!(kinds("a?.5:1")[1], Token::Punct(Punct::Question));
    }

    #[test]
    fn comments_skipped() {
        assert_eq!(
            kinds("a // trailing\n/* block */ + b"),
            vec![
                Token::Ident("a".into()),
                Token::Punct(Punct::Plus),
                Token::Ident("b".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn unterminated_string_reports_offset() {
        let err = tokenize("x + 'abc").unwrap_err();
        assert_eq!(
            err,
            SandboxError::Syntax {
                offset: 4,
                message: "unterminated string".into()
            }
        );
    }

    #[test]
    fn unknown_character() {
        assert!(tokenize("a = b").is_err());
    }
}
