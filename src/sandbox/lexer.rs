//! Tokenizer for the sandboxed expression language.

use super::SandboxError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Num(f64),
    Str(String),
    Template {
        quasis: Vec<String>,
        exprs: Vec<Vec<Token>>,
    },
    Ident(String),
    Punct(&'static str),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    /// A line terminator appeared between the previous token and this one.
    pub newline_before: bool,
    pub pos: usize,
}

/// Longest first, so greedy matching picks `>>>=` over `>>`.
const PUNCTUATORS: &[&str] = &[
    ">>>=", "...", "===", "!==", "**=", "<<=", ">>=", ">>>", "&&=", "||=", "??=", "=>", "==",
    "!=", "<=", ">=", "&&", "||", "??", "?.", "++", "--", "+=", "-=", "*=", "/=", "%=", "&=",
    "|=", "^=", "**", "<<", ">>", "{", "}", "(", ")", "[", "]", ";", ",", "<", ">", "+", "-",
    "*", "/", "%", "&", "|", "^", "!", "~", "?", ":", "=", ".",
];

pub(crate) fn tokenize(source: &str) -> Result<Vec<Token>, SandboxError> {
    let mut lexer = Lexer {
        chars: source.chars().collect(),
        pos: 0,
    };
    let (tokens, closed_by_brace) = lexer.lex(false)?;
    debug_assert!(!closed_by_brace);
    Ok(tokens)
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
}

impl Lexer {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn syntax(&self, msg: impl Into<String>) -> SandboxError {
        SandboxError::Syntax {
            pos: self.pos,
            message: msg.into(),
        }
    }

    /// Lex until EOF, or (inside a template substitution) until the unmatched `}`.
    fn lex(&mut self, in_substitution: bool) -> Result<(Vec<Token>, bool), SandboxError> {
        let mut tokens = Vec::new();
        let mut depth = 0usize;
        loop {
            let newline_before = self.skip_trivia()?;
            let start = self.pos;
            let Some(c) = self.peek() else {
                if in_substitution {
                    return Err(self.syntax("unterminated template substitution"));
                }
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    newline_before,
                    pos: start,
                });
                return Ok((tokens, false));
            };

            let kind = if c.is_ascii_digit() || (c == '.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit())) {
                TokenKind::Num(self.number()?)
            } else if c == '"' || c == '\'' {
                TokenKind::Str(self.string(c)?)
            } else if c == '`' {
                self.template()?
            } else if is_ident_start(c) {
                TokenKind::Ident(self.identifier())
            } else {
                let punct = self.punctuator()?;
                if in_substitution {
                    match punct {
                        "{" => depth += 1,
                        "}" if depth == 0 => return Ok((close_with_eof(tokens, start), true)),
                        "}" => depth -= 1,
                        _ => {}
                    }
                }
                TokenKind::Punct(punct)
            };
            tokens.push(Token {
                kind,
                newline_before,
                pos: start,
            });
        }
    }

    /// Skips whitespace and comments; reports whether a line break was crossed.
    fn skip_trivia(&mut self) -> Result<bool, SandboxError> {
        let mut newline = false;
        while let Some(c) = self.peek() {
            if c == '\n' || c == '\r' || c == '\u{2028}' || c == '\u{2029}' {
                newline = true;
                self.pos += 1;
            } else if c.is_whitespace() || c == '\u{feff}' {
                self.pos += 1;
            } else if c == '/' && self.peek_at(1) == Some('/') {
                while let Some(c) = self.peek() {
                    if c == '\n' || c == '\r' {
                        break;
                    }
                    self.pos += 1;
                }
            } else if c == '/' && self.peek_at(1) == Some('*') {
                self.pos += 2;
                loop {
                    match self.peek() {
                        None => return Err(self.syntax("unterminated block comment")),
                        Some('*') if self.peek_at(1) == Some('/') => {
                            self.pos += 2;
                            break;
                        }
                        Some(c) => {
                            if c == '\n' || c == '\r' {
                                newline = true;
                            }
                            self.pos += 1;
                        }
                    }
                }
            } else {
                break;
            }
        }
        Ok(newline)
    }

    fn number(&mut self) -> Result<f64, SandboxError> {
        if self.peek() == Some('0') {
            let radix = match self.peek_at(1) {
                Some('x') | Some('X') => Some(16),
                Some('o') | Some('O') => Some(8),
                Some('b') | Some('B') => Some(2),
                _ => None,
            };
            if let Some(radix) = radix {
                self.pos += 2;
                let start = self.pos;
                while self.peek().is_some_and(|c| c.is_digit(radix) || c == '_') {
                    self.pos += 1;
                }
                let digits: String = self.chars[start..self.pos]
                    .iter()
                    .filter(|c| **c != '_')
                    .collect();
                if digits.is_empty() {
                    return Err(self.syntax("missing digits after radix prefix"));
                }
                let mut value = 0f64;
                for d in digits.chars() {
                    value = value * radix as f64 + d.to_digit(radix).unwrap_or(0) as f64;
                }
                return Ok(value);
            }
        }

        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '_') {
            self.pos += 1;
        }
        if self.peek() == Some('.') {
            self.pos += 1;
            while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '_') {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            let save = self.pos;
            self.pos += 1;
            if matches!(self.peek(), Some('+') | Some('-')) {
                self.pos += 1;
            }
            if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += 1;
                }
            } else {
                self.pos = save;
            }
        }
        // BigInt suffix is not supported
        if self.peek() == Some('n') {
            return Err(SandboxError::Unsupported("BigInt literals".into()));
        }
        let text: String = self.chars[start..self.pos]
            .iter()
            .filter(|c| **c != '_')
            .collect();
        text.parse::<f64>()
            .map_err(|_| self.syntax(format!("invalid number literal '{}'", text)))
    }

    fn string(&mut self, quote: char) -> Result<String, SandboxError> {
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.peek() {
                None | Some('\n') | Some('\r') => return Err(self.syntax("unterminated string literal")),
                Some(c) if c == quote => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some('\\') => {
                    self.pos += 1;
                    self.escape(&mut out)?;
                }
                Some(c) => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn escape(&mut self, out: &mut String) -> Result<(), SandboxError> {
        let Some(c) = self.peek() else {
            return Err(self.syntax("unterminated escape sequence"));
        };
        self.pos += 1;
        match c {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '0' if !self.peek().is_some_and(|d| d.is_ascii_digit()) => out.push('\0'),
            'x' => {
                let code = self.hex_digits(2)?;
                out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
            }
            'u' => {
                let code = if self.peek() == Some('{') {
                    self.pos += 1;
                    let start = self.pos;
                    while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                        self.pos += 1;
                    }
                    let digits: String = self.chars[start..self.pos].iter().collect();
                    if self.peek() != Some('}') {
                        return Err(self.syntax("malformed unicode escape"));
                    }
                    self.pos += 1;
                    u32::from_str_radix(&digits, 16)
                        .map_err(|_| self.syntax("malformed unicode escape"))?
                } else {
                    let high = self.hex_digits(4)?;
                    // Recombine an escaped surrogate pair such as "😀".
                    if (0xD800..0xDC00).contains(&high)
                        && self.peek() == Some('\\')
                        && self.peek_at(1) == Some('u')
                    {
                        let save = self.pos;
                        self.pos += 2;
                        match self.hex_digits(4) {
                            Ok(low) if (0xDC00..0xE000).contains(&low) => {
                                0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00)
                            }
                            _ => {
                                self.pos = save;
                                high
                            }
                        }
                    } else {
                        high
                    }
                };
                out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
            }
            '\r' => {
                if self.peek() == Some('\n') {
                    self.pos += 1;
                }
            }
            '\n' | '\u{2028}' | '\u{2029}' => {}
            other => out.push(other),
        }
        Ok(())
    }

    fn hex_digits(&mut self, count: usize) -> Result<u32, SandboxError> {
        let mut value = 0u32;
        for _ in 0..count {
            let digit = self
                .peek()
                .and_then(|c| c.to_digit(16))
                .ok_or_else(|| self.syntax("invalid hexadecimal escape"))?;
            value = value * 16 + digit;
            self.pos += 1;
        }
        Ok(value)
    }

    fn template(&mut self) -> Result<TokenKind, SandboxError> {
        self.pos += 1;
        let mut quasis = Vec::new();
        let mut exprs = Vec::new();
        let mut current = String::new();
        loop {
            match self.peek() {
                None => return Err(self.syntax("unterminated template literal")),
                Some('`') => {
                    self.pos += 1;
                    quasis.push(current);
                    return Ok(TokenKind::Template { quasis, exprs });
                }
                Some('\\') => {
                    self.pos += 1;
                    self.escape(&mut current)?;
                }
                Some('$') if self.peek_at(1) == Some('{') => {
                    self.pos += 2;
                    quasis.push(std::mem::take(&mut current));
                    let (tokens, _) = self.lex(true)?;
                    exprs.push(tokens);
                }
                Some('\r') => {
                    // Template literals normalise CRLF and CR to LF.
                    self.pos += 1;
                    if self.peek() == Some('\n') {
                        self.pos += 1;
                    }
                    current.push('\n');
                }
                Some(c) => {
                    current.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn identifier(&mut self) -> String {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_part) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn punctuator(&mut self) -> Result<&'static str, SandboxError> {
        for punct in PUNCTUATORS {
            let len = punct.chars().count();
            if self.pos + len > self.chars.len() {
                continue;
            }
            if self.chars[self.pos..self.pos + len].iter().copied().eq(punct.chars()) {
                // `a?.5:b` is a conditional, not optional chaining.
                if *punct == "?." && self.peek_at(2).is_some_and(|c| c.is_ascii_digit()) {
                    continue;
                }
                self.pos += len;
                return Ok(punct);
            }
        }
        Err(match self.peek() {
            Some(c) => self.syntax(format!("unexpected character '{}'", c)),
            None => self.syntax("unexpected end of input"),
        })
    }
}

fn close_with_eof(mut tokens: Vec<Token>, pos: usize) -> Vec<Token> {
    tokens.push(Token {
        kind: TokenKind::Eof,
        newline_before: false,
        pos,
    });
    tokens
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c == '$' || c.is_alphabetic()
}

fn is_ident_part(c: char) -> bool {
    c == '_' || c == '$' || c.is_alphanumeric() || c == '\u{200c}' || c == '\u{200d}'
}
