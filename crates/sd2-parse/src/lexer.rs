//! Lexer for the SD2 configuration format.
//!
//! Newlines are significant in SD2, so the lexer never skips them; every
//! `\n` comes out as a [`TokenKind::Newline`] token. Triple-quoted strings
//! and foreign-code blocks are tokenized as atomic units whose text is the
//! full literal content.

use std::borrow::Cow;

#[allow(unused_imports)]
use crate::trace;
use crate::{ErrorCode, Location, ParseError, Token, TokenKind};

/// A lexer that produces tokens from SD2 source text.
pub struct Lexer<'src> {
    /// The source text being lexed.
    source: &'src str,
    /// The remaining source text (suffix of `source`).
    remaining: &'src str,
    /// Current byte position in `source`.
    pos: u32,
    /// Current line (1-based).
    line: u32,
    /// Current column (1-based, in characters).
    column: u32,
    /// Set once `Eof` or an error has been produced, for the Iterator impl.
    done: bool,
}

impl<'src> Lexer<'src> {
    /// Create a new lexer for the given source text.
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            remaining: source,
            pos: 0,
            line: 1,
            column: 1,
            done: false,
        }
    }

    /// Get the current byte position.
    #[inline]
    pub fn position(&self) -> u32 {
        self.pos
    }

    /// Check if we're at the end of input.
    #[inline]
    pub fn is_eof(&self) -> bool {
        self.remaining.is_empty()
    }

    /// The location of the next character.
    #[inline]
    fn location(&self) -> Location {
        Location::new(self.line, self.column, self.pos)
    }

    /// Peek at the next character without consuming it.
    #[inline]
    fn peek(&self) -> Option<char> {
        self.remaining.chars().next()
    }

    /// Peek at the nth character (0-indexed) without consuming.
    #[inline]
    fn peek_nth(&self, n: usize) -> Option<char> {
        self.remaining.chars().nth(n)
    }

    /// Advance by one character and return it.
    #[inline]
    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8() as u32;
        self.remaining = &self.remaining[c.len_utf8()..];
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    /// Check if the remaining text starts with the given prefix.
    #[inline]
    fn starts_with(&self, prefix: &str) -> bool {
        self.remaining.starts_with(prefix)
    }

    /// Create a token ending at the current position.
    fn token(
        &self,
        kind: TokenKind,
        text: impl Into<Cow<'src, str>>,
        location: Location,
    ) -> Token<'src> {
        let token = Token::new(kind, text, location, self.pos);
        trace!("Token {:?} at {}: {:?}", token.kind, location, token.text);
        token
    }

    fn error(&self, code: ErrorCode, message: impl Into<String>, at: Location) -> ParseError {
        ParseError::new(code, message, at)
    }

    /// Get the next token.
    pub fn next_token(&mut self) -> Result<Token<'src>, ParseError> {
        self.skip_trivia()?;

        let start = self.location();
        let Some(c) = self.peek() else {
            return Ok(self.token(TokenKind::Eof, "", start));
        };

        match c {
            '\n' => {
                self.advance();
                Ok(self.token(TokenKind::Newline, "\n", start))
            }

            // Structural tokens
            '{' => self.single(TokenKind::LBrace, start),
            '}' => self.single(TokenKind::RBrace, start),
            '[' => self.single(TokenKind::LBracket, start),
            ']' => self.single(TokenKind::RBracket, start),
            '(' => self.single(TokenKind::LParen, start),
            ')' => self.single(TokenKind::RParen, start),
            ',' => self.single(TokenKind::Comma, start),
            ':' => self.single(TokenKind::Colon, start),
            '=' => self.single(TokenKind::Eq, start),
            '.' => self.single(TokenKind::Dot, start),
            '<' => self.single(TokenKind::Lt, start),
            '>' => self.single(TokenKind::Gt, start),
            '#' => self.single(TokenKind::Hash, start),
            '!' => self.single(TokenKind::Bang, start),
            '|' => self.single(TokenKind::Pipe, start),

            '@' => self.lex_foreign(start),
            '"' => self.lex_string(start),
            '`' => self.lex_backtick(start),

            '0'..='9' => self.lex_number(start),
            '+' | '-' => self.lex_number(start),

            _ if is_ident_start(c) => Ok(self.lex_ident(start)),

            _ => {
                self.advance();
                Err(self.error(
                    ErrorCode::E1000,
                    format!("unexpected character '{}'", c),
                    start,
                ))
            }
        }
    }

    /// Skip inline whitespace and comments. Newlines are never skipped.
    fn skip_trivia(&mut self) -> Result<(), ParseError> {
        loop {
            match self.peek() {
                Some(' ') | Some('\t') | Some('\r') => {
                    self.advance();
                }
                Some('/') if self.starts_with("//") => {
                    // Line comment, up to but not including the newline.
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some('/') if self.starts_with("/*") => {
                    let start = self.location();
                    self.advance();
                    self.advance();
                    loop {
                        if self.is_eof() {
                            return Err(self.error(
                                ErrorCode::E1000,
                                "unterminated block comment",
                                start,
                            ));
                        }
                        if self.starts_with("*/") {
                            self.advance();
                            self.advance();
                            break;
                        }
                        self.advance();
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    /// Consume a single character and produce a token with its spelling.
    fn single(&mut self, kind: TokenKind, start: Location) -> Result<Token<'src>, ParseError> {
        let from = self.pos as usize;
        self.advance();
        let text = &self.source[from..self.pos as usize];
        Ok(self.token(kind, text, start))
    }

    /// Lex an identifier or reserved word.
    fn lex_ident(&mut self, start: Location) -> Token<'src> {
        let from = self.pos as usize;
        while let Some(c) = self.peek() {
            if is_ident_char(c) {
                self.advance();
            } else {
                break;
            }
        }
        let text = &self.source[from..self.pos as usize];
        let kind = match text {
            "true" | "false" => TokenKind::Bool,
            "null" => TokenKind::Null,
            _ => TokenKind::Ident,
        };
        self.token(kind, text, start)
    }

    /// Lex a backtick identifier: `` `text` ``.
    ///
    /// There is no escape mechanism; the backticks are not part of the text.
    fn lex_backtick(&mut self, start: Location) -> Result<Token<'src>, ParseError> {
        self.advance(); // consume opening backtick
        let from = self.pos as usize;
        loop {
            match self.peek() {
                None | Some('\n') => {
                    return Err(self.error(
                        ErrorCode::E6002,
                        "backtick identifier not closed before end of line",
                        start,
                    ));
                }
                Some('`') => {
                    let text = &self.source[from..self.pos as usize];
                    self.advance();
                    return Ok(self.token(TokenKind::BacktickIdent, text, start));
                }
                Some(_) => {
                    self.advance();
                }
            }
        }
    }

    /// Lex a number: decimal, hex (`0x`), or binary (`0b`), with an optional
    /// leading sign and underscores between digits.
    fn lex_number(&mut self, start: Location) -> Result<Token<'src>, ParseError> {
        let from = self.pos as usize;
        let signed = matches!(self.peek(), Some('+') | Some('-'));
        if signed {
            self.advance();
        }

        if self.starts_with("0x") || self.starts_with("0X") || self.starts_with("0b") || self.starts_with("0B") {
            if signed {
                return Err(self.error(
                    ErrorCode::E7001,
                    "hex and binary literals cannot be signed",
                    start,
                ));
            }
            let binary = self.peek_nth(1) == Some('b') || self.peek_nth(1) == Some('B');
            self.advance();
            self.advance();
            let digits_from = self.pos as usize;
            while let Some(c) = self.peek() {
                let ok = if binary {
                    matches!(c, '0' | '1' | '_')
                } else {
                    c.is_ascii_hexdigit() || c == '_'
                };
                if ok {
                    self.advance();
                } else {
                    break;
                }
            }
            if self.pos as usize == digits_from {
                return Err(self.error(ErrorCode::E1000, "expected digits after radix prefix", start));
            }
            let text = &self.source[from..self.pos as usize];
            return Ok(self.token(TokenKind::Int, text, start));
        }

        let digits_from = self.pos as usize;
        self.consume_digits();
        if self.pos as usize == digits_from {
            return Err(self.error(ErrorCode::E1000, "expected digits after sign", start));
        }

        let mut is_float = false;

        // Fractional part: a single '.' only when a digit follows, so that
        // qualified names like `a.b` are left alone.
        if self.peek() == Some('.') && self.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
            self.consume_digits();
            is_float = true;
        }

        // Exponent
        if matches!(self.peek(), Some('e') | Some('E')) {
            let after_e = self.peek_nth(1);
            let exp_digit = match after_e {
                Some('+') | Some('-') => self.peek_nth(2).is_some_and(|c| c.is_ascii_digit()),
                Some(c) => c.is_ascii_digit(),
                None => false,
            };
            if exp_digit {
                self.advance(); // e
                if matches!(self.peek(), Some('+') | Some('-')) {
                    self.advance();
                }
                self.consume_digits();
                is_float = true;
            }
        }

        let text = &self.source[from..self.pos as usize];
        let kind = if is_float {
            TokenKind::Float
        } else {
            TokenKind::Int
        };
        Ok(self.token(kind, text, start))
    }

    fn consume_digits(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Lex a string literal, simple or triple-quoted.
    fn lex_string(&mut self, start: Location) -> Result<Token<'src>, ParseError> {
        self.advance(); // consume opening quote

        if self.peek() == Some('"') {
            self.advance();
            // Two quotes so far. A third quote followed immediately by a
            // newline opens a triple-quoted string; anything else means the
            // two quotes were an empty simple string.
            if self.peek() == Some('"') {
                let crlf = self.peek_nth(1) == Some('\r') && self.peek_nth(2) == Some('\n');
                if self.peek_nth(1) == Some('\n') || crlf {
                    self.advance(); // third quote
                    if crlf {
                        self.advance();
                    }
                    self.advance(); // the newline; not part of the content
                    return self.lex_triple_string(start);
                }
            }
            return Ok(self.token(TokenKind::Str, "", start));
        }

        self.lex_simple_string(start)
    }

    /// Lex the remainder of a simple string, opening quote already consumed.
    fn lex_simple_string(&mut self, start: Location) -> Result<Token<'src>, ParseError> {
        let content_from = self.pos as usize;
        // Deferred copy: borrow straight from the source until the first
        // escape forces an owned buffer.
        let mut buf: Option<String> = None;

        loop {
            match self.peek() {
                None | Some('\n') => {
                    return Err(self.error(ErrorCode::E1000, "unterminated string", start));
                }
                Some('"') => {
                    let text: Cow<'src, str> = match buf {
                        Some(b) => Cow::Owned(b),
                        None => Cow::Borrowed(&self.source[content_from..self.pos as usize]),
                    };
                    self.advance();
                    return Ok(self.token(TokenKind::Str, text, start));
                }
                Some('\\') => {
                    let buf = buf.get_or_insert_with(|| {
                        self.source[content_from..self.pos as usize].to_string()
                    });
                    self.advance();
                    match self.peek() {
                        Some('n') => {
                            buf.push('\n');
                            self.advance();
                        }
                        Some('t') => {
                            buf.push('\t');
                            self.advance();
                        }
                        Some('r') => {
                            buf.push('\r');
                            self.advance();
                        }
                        Some('"') => {
                            buf.push('"');
                            self.advance();
                        }
                        Some('\\') => {
                            buf.push('\\');
                            self.advance();
                        }
                        // `\u{...}` is passed through literally for the
                        // consumer to decode.
                        Some('u') => {
                            buf.push('\\');
                            buf.push('u');
                            self.advance();
                        }
                        // Unrecognized escapes keep the backslash.
                        Some(c) => {
                            buf.push('\\');
                            buf.push(c);
                            self.advance();
                        }
                        None => {
                            return Err(self.error(
                                ErrorCode::E1000,
                                "unterminated string",
                                start,
                            ));
                        }
                    }
                }
                Some(_) => {
                    if let Some(buf) = buf.as_mut() {
                        buf.push(self.peek().unwrap());
                    }
                    self.advance();
                }
            }
        }
    }

    /// Lex the content of a triple-quoted string, opener and its newline
    /// already consumed.
    fn lex_triple_string(&mut self, start: Location) -> Result<Token<'src>, ParseError> {
        let content_from = self.pos as usize;
        loop {
            match self.peek() {
                None => {
                    return Err(self.error(
                        ErrorCode::E1000,
                        "unterminated triple-quoted string",
                        start,
                    ));
                }
                Some('"') if self.peek_nth(1) == Some('"') && self.peek_nth(2) == Some('"') => {
                    let raw = &self.source[content_from..self.pos as usize];
                    self.advance();
                    self.advance();
                    self.advance();
                    let text = normalize_triple(raw);
                    return Ok(self.token(TokenKind::Str, text, start));
                }
                Some(_) => {
                    self.advance();
                }
            }
        }
    }

    /// Lex a foreign-code block after `@`.
    fn lex_foreign(&mut self, start: Location) -> Result<Token<'src>, ParseError> {
        self.advance(); // consume '@'

        let delim = match self.peek() {
            Some(c @ ('"' | '\'' | '[' | '{')) => c,
            other => {
                let found = match other {
                    Some(c) => format!("'{}'", c),
                    None => "end of input".to_string(),
                };
                return Err(self.error(
                    ErrorCode::E4002,
                    format!(
                        "expected one of '\"', '\\'', '[', '{{' after '@', found {}",
                        found
                    ),
                    start,
                ));
            }
        };
        let closer = match delim {
            '[' => ']',
            '{' => '}',
            c => c,
        };

        // Triple-delimited form: three delimiters followed immediately by a
        // newline.
        if self.peek_nth(1) == Some(delim) && self.peek_nth(2) == Some(delim) {
            let crlf = self.peek_nth(3) == Some('\r') && self.peek_nth(4) == Some('\n');
            if self.peek_nth(3) == Some('\n') || crlf {
                self.advance();
                self.advance();
                self.advance();
                if crlf {
                    self.advance();
                }
                self.advance(); // the newline; not part of the content
                return self.lex_triple_foreign(start, closer);
            }
        }

        // Single-delimited form: content runs to the matching closer on the
        // same physical line.
        self.advance(); // the delimiter
        let content_from = self.pos as usize;
        loop {
            match self.peek() {
                None | Some('\n') => {
                    return Err(self.error(
                        ErrorCode::E4001,
                        "foreign block not closed before end of line",
                        start,
                    ));
                }
                Some(c) if c == closer => {
                    let text = &self.source[content_from..self.pos as usize];
                    self.advance();
                    return Ok(self.token(TokenKind::At, text, start));
                }
                Some(_) => {
                    self.advance();
                }
            }
        }
    }

    /// Lex the content of a triple-delimited foreign block.
    ///
    /// The closer-run logic collects consecutive closers: three in a row end
    /// the block; one or two followed by anything else are content.
    fn lex_triple_foreign(
        &mut self,
        start: Location,
        closer: char,
    ) -> Result<Token<'src>, ParseError> {
        let content_from = self.pos as usize;
        loop {
            match self.peek() {
                None => {
                    return Err(self.error(ErrorCode::E4001, "unterminated foreign block", start));
                }
                Some(c)
                    if c == closer
                        && self.peek_nth(1) == Some(closer)
                        && self.peek_nth(2) == Some(closer) =>
                {
                    let raw = &self.source[content_from..self.pos as usize];
                    self.advance();
                    self.advance();
                    self.advance();
                    let text = normalize_newlines(raw);
                    return Ok(self.token(TokenKind::At, text, start));
                }
                Some(_) => {
                    self.advance();
                }
            }
        }
    }
}

impl<'src> Iterator for Lexer<'src> {
    type Item = Result<Token<'src>, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let result = self.next_token();
        match &result {
            Ok(token) if token.kind == TokenKind::Eof => self.done = true,
            Err(_) => self.done = true,
            _ => {}
        }
        Some(result)
    }
}

/// Check if a character can start an identifier.
fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

/// Check if a character can continue an identifier.
fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Normalize CRLF/CR to LF.
fn normalize_newlines(raw: &str) -> Cow<'_, str> {
    if !raw.contains('\r') {
        return Cow::Borrowed(raw);
    }
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\r' {
            if chars.peek() == Some(&'\n') {
                chars.next();
            }
            out.push('\n');
        } else {
            out.push(c);
        }
    }
    Cow::Owned(out)
}

/// Normalize triple-quoted string content: newline normalization, then
/// backslash-newline line joining, then common-indent stripping.
fn normalize_triple(raw: &str) -> Cow<'_, str> {
    let normalized = normalize_newlines(raw);

    // A backslash immediately before a newline joins the lines and consumes
    // the next line's leading horizontal whitespace.
    let joined: Cow<'_, str> = if normalized.contains("\\\n") {
        let mut out = String::with_capacity(normalized.len());
        let mut chars = normalized.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '\\' && chars.peek() == Some(&'\n') {
                chars.next();
                while matches!(chars.peek(), Some(' ') | Some('\t')) {
                    chars.next();
                }
            } else {
                out.push(c);
            }
        }
        Cow::Owned(out)
    } else {
        normalized
    };

    // The common indent is the exact leading whitespace prefix of the first
    // non-blank line; it is stripped from every line that starts with it.
    let indent = joined
        .split('\n')
        .find(|line| line.chars().any(|c| c != ' ' && c != '\t'))
        .map(|line| {
            let end = line
                .char_indices()
                .find(|(_, c)| *c != ' ' && *c != '\t')
                .map(|(i, _)| i)
                .unwrap_or(line.len());
            &line[..end]
        })
        .unwrap_or("");

    if indent.is_empty() {
        return joined;
    }

    let stripped: Vec<&str> = joined
        .split('\n')
        .map(|line| line.strip_prefix(indent).unwrap_or(line))
        .collect();
    Cow::Owned(stripped.join("\n"))
}
