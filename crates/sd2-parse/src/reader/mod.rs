//! Pull-based streaming reader for SD2 documents.
//!
//! The reader consumes tokens with bounded lookahead (at most two), keeps a
//! scope stack for nested elements and namespaces, and produces one
//! [`Event`] per call to [`Reader::next_event`]. Attribute values are
//! materialized eagerly; completed constructor values are handed to the
//! configured [`ConstructorRegistry`] before the `Attribute` event is
//! returned.

use std::collections::VecDeque;

use crate::registry::ConstructorRegistry;
#[allow(unused_imports)]
use crate::trace;
use crate::{
    Annotation, ErrorCode, Event, Lexer, Location, ParseError, Qualifier, QualifiedName, Token,
    TokenKind, TypeExpr, UnknownConstructorPolicy, Value, temporal,
};

/// Callback invoked with each recovered error.
pub type ErrorCallback = Box<dyn FnMut(&ParseError)>;

/// Configuration for a [`Reader`].
pub struct ReaderOptions {
    stream_values: bool,
    recovery: bool,
    on_error: Option<ErrorCallback>,
    registry: Option<ConstructorRegistry>,
    policy: UnknownConstructorPolicy,
}

impl Default for ReaderOptions {
    /// Defaults: strict mode, the built-in temporal registry, and
    /// [`UnknownConstructorPolicy::KeepRaw`].
    fn default() -> Self {
        Self {
            stream_values: false,
            recovery: false,
            on_error: None,
            registry: Some(temporal::registry()),
            policy: UnknownConstructorPolicy::default(),
        }
    }
}

impl ReaderOptions {
    /// Create the default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable error recovery. With recovery on, errors are routed
    /// to the [`on_error`](Self::on_error) callback and parsing resumes at
    /// the next newline or closing delimiter.
    pub fn recovery(mut self, enabled: bool) -> Self {
        self.recovery = enabled;
        self
    }

    /// Set the callback receiving recovered errors.
    pub fn on_error(mut self, callback: impl FnMut(&ParseError) + 'static) -> Self {
        self.on_error = Some(Box::new(callback));
        self
    }

    /// Replace the constructor registry.
    pub fn registry(mut self, registry: ConstructorRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Disable constructor resolution entirely; constructor values stay raw.
    pub fn without_registry(mut self) -> Self {
        self.registry = None;
        self
    }

    /// Set the policy for constructor names with no registered handler.
    pub fn unknown_constructors(mut self, policy: UnknownConstructorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Reserved for future use; has no effect. Defaults to false.
    pub fn stream_values(mut self, enabled: bool) -> Self {
        self.stream_values = enabled;
        self
    }
}

/// Token supply with a bounded lookahead buffer.
///
/// The buffer never holds more than two tokens; that is all the grammar
/// needs (a newline plus the token after it).
struct TokenSource<'src> {
    lexer: Lexer<'src>,
    pending: VecDeque<Token<'src>>,
}

impl<'src> TokenSource<'src> {
    fn new(source: &'src str) -> Self {
        Self {
            lexer: Lexer::new(source),
            pending: VecDeque::with_capacity(2),
        }
    }

    fn next(&mut self) -> Result<Token<'src>, ParseError> {
        match self.pending.pop_front() {
            Some(token) => Ok(token),
            None => self.lexer.next_token(),
        }
    }

    fn peek(&mut self) -> Result<&Token<'src>, ParseError> {
        if self.pending.is_empty() {
            let token = self.lexer.next_token()?;
            self.pending.push_back(token);
        }
        Ok(&self.pending[0])
    }

    fn peek2(&mut self) -> Result<&Token<'src>, ParseError> {
        while self.pending.len() < 2 {
            let token = self.lexer.next_token()?;
            self.pending.push_back(token);
        }
        Ok(&self.pending[1])
    }
}

/// Scope stack entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Document,
    Element,
    /// An element whose header was not followed by `{`; the next call emits
    /// its `EndElement`.
    ElementNoBody,
    Namespace,
    Body,
}

#[derive(Debug, Clone, Copy)]
struct ScopeFrame {
    kind: Scope,
    location: Location,
}

/// Pull-based event reader for SD2 documents.
///
/// Not shareable across threads; independent instances over distinct
/// sources are fully independent.
pub struct Reader<'src> {
    input: &'src str,
    source: TokenSource<'src>,
    options: ReaderOptions,
    scopes: Vec<ScopeFrame>,
    started: bool,
    /// Set once `EndDocument` has been returned; replayed forever after.
    ended: Option<Location>,
    /// Set on the first strict-mode error; replayed forever after.
    fatal: Option<ParseError>,
    /// True until the first non-annotation top-level construct.
    doc_annotation_phase: bool,
    /// Element annotations waiting for their header.
    pending_annotations: Vec<Annotation>,
    /// The unclosed-scopes-at-EOF error is raised only once.
    unclosed_reported: bool,
}

impl<'src> Reader<'src> {
    /// Create a reader with default options.
    pub fn new(source: &'src str) -> Self {
        Self::with_options(source, ReaderOptions::default())
    }

    /// Create a reader with the given options.
    pub fn with_options(source: &'src str, options: ReaderOptions) -> Self {
        Self {
            input: source,
            source: TokenSource::new(source),
            options,
            scopes: Vec::new(),
            started: false,
            ended: None,
            fatal: None,
            doc_annotation_phase: true,
            pending_annotations: Vec::new(),
            unclosed_reported: false,
        }
    }

    /// Return the next event.
    ///
    /// The first call returns [`Event::StartDocument`]; after
    /// [`Event::EndDocument`] has been returned, every further call returns
    /// it again. In strict mode the first error is terminal and is returned
    /// from every subsequent call; with recovery enabled, errors go to the
    /// `on_error` callback and parsing resumes.
    pub fn next_event(&mut self) -> Result<Event, ParseError> {
        if let Some(err) = &self.fatal {
            return Err(err.clone());
        }
        if let Some(location) = self.ended {
            return Ok(Event::EndDocument { location });
        }

        loop {
            match self.advance() {
                Ok(event) => {
                    trace!("event {:?}", event);
                    return Ok(event);
                }
                Err(err) => {
                    if !self.options.recovery {
                        self.fatal = Some(err.clone());
                        return Err(err);
                    }
                    if let Some(on_error) = self.options.on_error.as_mut() {
                        on_error(&err);
                    }
                    self.pending_annotations.clear();
                    self.resynchronize();
                }
            }
        }
    }

    /// Collect every event through `EndDocument`.
    pub fn read_to_vec(mut self) -> Result<Vec<Event>, ParseError> {
        let mut events = Vec::new();
        loop {
            let event = self.next_event()?;
            let end = matches!(event, Event::EndDocument { .. });
            events.push(event);
            if end {
                return Ok(events);
            }
        }
    }

    /// Consume tokens until the next newline (inclusive) or closing
    /// delimiter / end of input (exclusive), so event production can resume
    /// on a construct boundary.
    fn resynchronize(&mut self) {
        trace!("resynchronizing after parse error");
        loop {
            let kind = match self.source.peek() {
                Ok(token) => token.kind,
                // The lexer already advanced past the offending input.
                Err(_) => continue,
            };
            match kind {
                TokenKind::Newline => {
                    let _ = self.source.next();
                    return;
                }
                TokenKind::RBrace
                | TokenKind::RBracket
                | TokenKind::RParen
                | TokenKind::Eof => return,
                _ => {
                    let _ = self.source.next();
                }
            }
        }
    }

    fn current_scope(&self) -> Scope {
        self.scopes.last().map(|f| f.kind).unwrap_or(Scope::Document)
    }

    fn push_scope(&mut self, kind: Scope, location: Location) {
        self.scopes.push(ScopeFrame { kind, location });
    }

    /// Advance the state machine by one event.
    fn advance(&mut self) -> Result<Event, ParseError> {
        if !self.started {
            self.started = true;
            self.push_scope(Scope::Document, Location::start());
            return Ok(Event::StartDocument {
                location: Location::start(),
            });
        }

        loop {
            // A bodyless element ends before any further input is consumed.
            if self.current_scope() == Scope::ElementNoBody {
                let frame = self.scopes.pop().expect("scope underflow");
                return Ok(Event::EndElement {
                    location: frame.location,
                });
            }

            let token = self.source.peek()?;
            let location = token.location;
            match token.kind {
                TokenKind::Newline => {
                    self.source.next()?;
                }

                TokenKind::Eof => {
                    if self.scopes.len() > 1 {
                        if !self.unclosed_reported {
                            self.unclosed_reported = true;
                            return Err(ParseError::new(
                                ErrorCode::E1000,
                                "unexpected end of input inside a body",
                                location,
                            ));
                        }
                        // Close what is still open, one event per call.
                        let frame = self.scopes.pop().expect("scope underflow");
                        match frame.kind {
                            Scope::Body => continue,
                            Scope::Element | Scope::ElementNoBody => {
                                return Ok(Event::EndElement { location });
                            }
                            Scope::Namespace => {
                                return Ok(Event::EndNamespace { location });
                            }
                            Scope::Document => unreachable!("document frame below open scopes"),
                        }
                    }
                    self.ended = Some(location);
                    return Ok(Event::EndDocument { location });
                }

                TokenKind::Pipe => {
                    self.source.next()?;
                    return Err(ParseError::new(
                        ErrorCode::E1004,
                        "'|' is only allowed to continue a qualifier list",
                        location,
                    ));
                }

                TokenKind::Hash => {
                    self.source.next()?;
                    if self.source.peek()?.kind == TokenKind::Bang {
                        self.source.next()?;
                        if !(self.doc_annotation_phase
                            && self.current_scope() == Scope::Document)
                        {
                            return Err(ParseError::new(
                                ErrorCode::E1000,
                                "document annotations are only allowed before the first element",
                                location,
                            ));
                        }
                        let annotation = self.parse_annotation_body(location)?;
                        return Ok(Event::DocumentAnnotation {
                            name: annotation.name,
                            args: annotation.args,
                            location,
                        });
                    }
                    let annotation = self.parse_annotation_body(location)?;
                    self.pending_annotations.push(annotation);
                }

                _ => {
                    if self.current_scope() == Scope::Body {
                        return self.parse_body_item();
                    }
                    self.doc_annotation_phase = false;
                    return self.parse_element_header();
                }
            }
        }
    }

    /// Parse `[name(args)]` after `#` (or `#!`).
    fn parse_annotation_body(&mut self, location: Location) -> Result<Annotation, ParseError> {
        self.expect(TokenKind::LBracket, "expected '[' after '#'")?;
        let (name, _, _) = self.parse_qualified_name("expected annotation name")?;
        let args = if self.source.peek()?.kind == TokenKind::LParen {
            Some(self.capture_annotation_args()?)
        } else {
            None
        };
        self.expect(TokenKind::RBracket, "expected ']' to close annotation")?;
        Ok(Annotation {
            name,
            args,
            location,
        })
    }

    /// Capture the raw text of a balanced parenthesized region. The opening
    /// `(` is at the current position.
    fn capture_annotation_args(&mut self) -> Result<String, ParseError> {
        let open = self.source.next()?; // '('
        let start = open.end_offset as usize;
        let mut depth = 1u32;
        loop {
            let token = self.source.next()?;
            match token.kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        let end = token.location.offset as usize;
                        return Ok(self.input[start..end].trim().to_string());
                    }
                }
                TokenKind::Eof => {
                    return Err(ParseError::new(
                        ErrorCode::E1000,
                        "unexpected end of input in annotation arguments",
                        token.location,
                    ));
                }
                _ => {}
            }
        }
    }

    /// Parse an element header:
    /// `keyword [id] [: type] [qualifiers] [{]`.
    fn parse_element_header(&mut self) -> Result<Event, ParseError> {
        let keyword_token = self.source.next()?;
        if keyword_token.kind != TokenKind::Ident {
            let what = if keyword_token.kind.is_reserved_word() {
                "a reserved word cannot be an element keyword"
            } else {
                "expected an element keyword"
            };
            return Err(ParseError::new(
                ErrorCode::E1000,
                what,
                keyword_token.location,
            ));
        }
        let location = keyword_token.location;
        let keyword = keyword_token.text.into_owned();
        let annotations = std::mem::take(&mut self.pending_annotations);

        let id = match self.source.peek()?.kind {
            TokenKind::Ident | TokenKind::BacktickIdent => {
                Some(self.source.next()?.text.into_owned())
            }
            _ => None,
        };

        let type_expr = if self.source.peek()?.kind == TokenKind::Colon {
            self.source.next()?;
            Some(self.parse_type_expr()?)
        } else {
            None
        };

        let mut qualifiers = Vec::new();
        let mut has_body = false;
        loop {
            let token = self.source.peek()?;
            match token.kind {
                TokenKind::Ident => {
                    qualifiers.push(self.parse_qualifier()?);
                }
                TokenKind::LBrace => {
                    self.source.next()?;
                    has_body = true;
                    break;
                }
                TokenKind::Newline => {
                    let next = self.source.peek2()?;
                    match next.kind {
                        TokenKind::Pipe => {
                            let pipe_location = next.location;
                            self.source.next()?; // newline
                            if pipe_location.column != 1 {
                                return Err(ParseError::new(
                                    ErrorCode::E1002,
                                    "qualifier continuation '|' must be in column 1",
                                    pipe_location,
                                ));
                            }
                            self.source.next()?; // pipe
                        }
                        TokenKind::LBrace => {
                            return Err(ParseError::new(
                                ErrorCode::E1001,
                                "the body '{' must open on the same line as the element header",
                                next.location,
                            ));
                        }
                        _ => break,
                    }
                }
                TokenKind::Eof | TokenKind::RBrace => break,
                _ => {
                    let token = self.source.next()?;
                    return Err(ParseError::new(
                        ErrorCode::E1000,
                        "unexpected token in element header",
                        token.location,
                    ));
                }
            }
        }

        if has_body {
            self.push_scope(Scope::Element, location);
            self.push_scope(Scope::Body, location);
        } else {
            self.push_scope(Scope::ElementNoBody, location);
        }

        Ok(Event::StartElement {
            keyword,
            id,
            type_expr,
            annotations,
            qualifiers,
            location,
        })
    }

    /// Parse one qualifier: a name plus one or more qualified-name
    /// arguments separated by commas.
    fn parse_qualifier(&mut self) -> Result<Qualifier, ParseError> {
        let name_token = self.source.next()?;
        let location = name_token.location;
        let name = name_token.text.into_owned();

        let mut args = Vec::new();
        self.qualifier_continuation()?;
        match self.source.peek()?.kind {
            TokenKind::Ident | TokenKind::BacktickIdent => {
                let (arg, _, _) = self.parse_qualified_name("expected qualifier argument")?;
                args.push(arg);
            }
            _ => {
                return Err(ParseError::new(
                    ErrorCode::E2101,
                    format!("qualifier '{}' requires at least one argument", name),
                    location,
                ));
            }
        }

        while self.source.peek()?.kind == TokenKind::Comma {
            self.source.next()?;
            self.qualifier_continuation()?;
            match self.source.peek()?.kind {
                TokenKind::Ident | TokenKind::BacktickIdent => {
                    let (arg, _, _) = self.parse_qualified_name("expected qualifier argument")?;
                    args.push(arg);
                }
                _ => {
                    let token = self.source.next()?;
                    return Err(ParseError::new(
                        ErrorCode::E1000,
                        "expected a qualified name after ','",
                        token.location,
                    ));
                }
            }
        }

        Ok(Qualifier {
            name,
            args,
            location,
        })
    }

    /// Consume a `newline |` qualifier continuation if present. The `|`
    /// must sit in column 1.
    fn qualifier_continuation(&mut self) -> Result<(), ParseError> {
        if self.source.peek()?.kind != TokenKind::Newline {
            return Ok(());
        }
        let next = self.source.peek2()?;
        if next.kind != TokenKind::Pipe {
            return Ok(());
        }
        let pipe_location = next.location;
        self.source.next()?; // newline
        if pipe_location.column != 1 {
            return Err(ParseError::new(
                ErrorCode::E1002,
                "qualifier continuation '|' must be in column 1",
                pipe_location,
            ));
        }
        self.source.next()?; // pipe
        Ok(())
    }

    /// Parse a type expression: a qualified name with optional `<...>`
    /// generic arguments.
    fn parse_type_expr(&mut self) -> Result<TypeExpr, ParseError> {
        match self.source.peek()?.kind {
            TokenKind::Ident | TokenKind::BacktickIdent => {}
            _ => {
                let token = self.source.next()?;
                return Err(ParseError::new(
                    ErrorCode::E1000,
                    "expected a type name",
                    token.location,
                ));
            }
        }
        let (name, _, _) = self.parse_qualified_name("expected a type name")?;

        let mut args = Vec::new();
        if self.source.peek()?.kind == TokenKind::Lt {
            self.source.next()?;
            loop {
                args.push(self.parse_type_expr()?);
                let token = self.source.next()?;
                match token.kind {
                    TokenKind::Comma => continue,
                    TokenKind::Gt => break,
                    _ => {
                        return Err(ParseError::new(
                            ErrorCode::E5001,
                            "missing '>' to close the generic argument list",
                            token.location,
                        ));
                    }
                }
            }
        }

        Ok(TypeExpr { name, args })
    }

    /// Parse one item inside a body scope.
    fn parse_body_item(&mut self) -> Result<Event, ParseError> {
        let token = self.source.peek()?;
        match token.kind {
            TokenKind::RBrace => {
                let close = self.source.next()?;
                self.scopes.pop(); // the Body frame
                let frame = self.scopes.pop().expect("scope underflow");
                match frame.kind {
                    Scope::Element => Ok(Event::EndElement {
                        location: close.location,
                    }),
                    Scope::Namespace => Ok(Event::EndNamespace {
                        location: close.location,
                    }),
                    _ => unreachable!("body scope without enclosing element"),
                }
            }

            TokenKind::Dot => self.parse_namespace(),

            TokenKind::BacktickIdent => {
                if self.source.peek2()?.kind == TokenKind::Eq {
                    self.parse_attribute()
                } else {
                    let token = self.source.next()?;
                    Err(ParseError::new(
                        ErrorCode::E1000,
                        "a backtick identifier must introduce an attribute",
                        token.location,
                    ))
                }
            }

            TokenKind::Ident => {
                if self.source.peek2()?.kind == TokenKind::Eq {
                    self.parse_attribute()
                } else {
                    self.parse_element_header()
                }
            }

            _ => {
                let token = self.source.next()?;
                Err(ParseError::new(
                    ErrorCode::E1000,
                    "expected an attribute, element, or namespace",
                    token.location,
                ))
            }
        }
    }

    /// Parse a namespace `.name { ... }`; the `.` is at the current
    /// position.
    fn parse_namespace(&mut self) -> Result<Event, ParseError> {
        let dot = self.source.next()?;
        let location = dot.location;

        let name_token = self.source.next()?;
        if name_token.kind != TokenKind::Ident {
            return Err(ParseError::new(
                ErrorCode::E1000,
                "a namespace name must be a plain identifier",
                name_token.location,
            ));
        }
        let name = name_token.text.into_owned();

        match self.source.peek()?.kind {
            TokenKind::LBrace => {
                self.source.next()?;
            }
            TokenKind::Newline => {
                let next = self.source.peek2()?;
                if next.kind == TokenKind::LBrace {
                    return Err(ParseError::new(
                        ErrorCode::E1001,
                        "the body '{' must open on the same line as the namespace name",
                        next.location,
                    ));
                }
                return Err(ParseError::new(
                    ErrorCode::E1000,
                    "expected '{' after the namespace name",
                    location,
                ));
            }
            _ => {
                let token = self.source.next()?;
                return Err(ParseError::new(
                    ErrorCode::E1000,
                    "expected '{' after the namespace name",
                    token.location,
                ));
            }
        }

        self.push_scope(Scope::Namespace, location);
        self.push_scope(Scope::Body, location);
        Ok(Event::StartNamespace { name, location })
    }

    /// Parse `name = value`; the name is at the current position and the
    /// `=` has been verified by lookahead.
    fn parse_attribute(&mut self) -> Result<Event, ParseError> {
        let name_token = self.source.next()?;
        let location = name_token.location;
        let name = name_token.text.into_owned();
        self.source.next()?; // '='

        let value = self.parse_value()?;

        // The value must end the line (or the body).
        let after = self.source.peek()?;
        match after.kind {
            TokenKind::Newline => {
                self.source.next()?;
            }
            TokenKind::RBrace | TokenKind::Eof => {}
            _ => {
                let token = self.source.next()?;
                return Err(ParseError::new(
                    ErrorCode::E1000,
                    "expected a newline or '}' after the attribute value",
                    token.location,
                ));
            }
        }

        Ok(Event::Attribute {
            name,
            value,
            location,
        })
    }

    /// Parse a value.
    fn parse_value(&mut self) -> Result<Value, ParseError> {
        let token = self.source.peek()?;
        let location = token.location;
        match token.kind {
            TokenKind::Str => {
                let token = self.source.next()?;
                Ok(Value::String {
                    value: token.text.into_owned(),
                    location,
                })
            }
            TokenKind::Int => {
                let token = self.source.next()?;
                Ok(Value::Int {
                    value: parse_int(&token.text, location)?,
                    location,
                })
            }
            TokenKind::Float => {
                let token = self.source.next()?;
                Ok(Value::Float {
                    value: parse_float(&token.text, location)?,
                    location,
                })
            }
            TokenKind::Bool => {
                let token = self.source.next()?;
                let value = token.text == "true";
                self.reject_reserved_foreign(&token)?;
                Ok(Value::Bool { value, location })
            }
            TokenKind::Null => {
                let token = self.source.next()?;
                self.reject_reserved_foreign(&token)?;
                Ok(Value::Null { location })
            }
            TokenKind::LBracket => self.parse_list(),
            TokenKind::LBrace => self.parse_map(),
            TokenKind::LParen => self.parse_tuple(),
            TokenKind::Ident | TokenKind::BacktickIdent => self.parse_name_value(),
            TokenKind::At => {
                let token = self.source.next()?;
                Ok(Value::Foreign {
                    content: token.text.into_owned(),
                    constructor: None,
                    location,
                })
            }
            _ => {
                let token = self.source.next()?;
                Err(ParseError::new(
                    ErrorCode::E1000,
                    "expected a value",
                    token.location,
                ))
            }
        }
    }

    /// A reserved word cannot tag a foreign-code block: `true@'...'` is
    /// rejected wherever a foreign constructor would be legal.
    fn reject_reserved_foreign(&mut self, reserved: &Token<'_>) -> Result<(), ParseError> {
        let next = self.source.peek()?;
        if next.kind == TokenKind::At && next.location.offset == reserved.end_offset {
            return Err(ParseError::new(
                ErrorCode::E4004,
                format!(
                    "reserved word '{}' cannot be a foreign-code constructor",
                    reserved.text
                ),
                reserved.location,
            ));
        }
        Ok(())
    }

    /// Parse a value starting with a qualified name: a foreign constructor,
    /// a named or positional constructor, or a bare name.
    fn parse_name_value(&mut self) -> Result<Value, ParseError> {
        let (name, location, name_end) =
            self.parse_qualified_name("expected a qualified name")?;

        let token = self.source.peek()?;
        match token.kind {
            TokenKind::At => {
                if token.location.offset != name_end {
                    return Err(ParseError::new(
                        ErrorCode::E4003,
                        "whitespace is not allowed between a constructor name and '@'",
                        token.location,
                    ));
                }
                let token = self.source.next()?;
                Ok(Value::Foreign {
                    content: token.text.into_owned(),
                    constructor: Some(name),
                    location,
                })
            }
            TokenKind::LBrace => {
                self.source.next()?;
                self.parse_constructor_named(name, location)
            }
            TokenKind::LParen => {
                self.source.next()?;
                self.parse_constructor_args(name, location)
            }
            TokenKind::Newline => {
                // A brace or paren on the next line is a layout error, not a
                // new construct.
                let next = self.source.peek2()?;
                match next.kind {
                    TokenKind::LBrace => Err(ParseError::new(
                        ErrorCode::E1001,
                        "the constructor body '{' must open on the same line as the name",
                        next.location,
                    )),
                    TokenKind::LParen => Err(ParseError::new(
                        ErrorCode::E1005,
                        "the constructor '(' must open on the same line as the name",
                        next.location,
                    )),
                    _ => Ok(Value::Name { name, location }),
                }
            }
            _ => Ok(Value::Name { name, location }),
        }
    }

    /// Parse a named-constructor body `{ name = value ... }`, one attribute
    /// per line; the `{` has been consumed.
    fn parse_constructor_named(
        &mut self,
        name: QualifiedName,
        location: Location,
    ) -> Result<Value, ParseError> {
        let mut attrs: Vec<(String, Value)> = Vec::new();
        loop {
            self.skip_newlines()?;
            let token = self.source.peek()?;
            match token.kind {
                TokenKind::RBrace => {
                    self.source.next()?;
                    break;
                }
                TokenKind::Ident | TokenKind::BacktickIdent => {
                    let key_token = self.source.next()?;
                    let key_location = key_token.location;
                    let key = key_token.text.into_owned();
                    self.expect(TokenKind::Eq, "expected '=' in a constructor body")?;
                    if attrs.iter().any(|(existing, _)| *existing == key) {
                        return Err(ParseError::new(
                            ErrorCode::E2003,
                            format!("duplicate attribute '{}'", key),
                            key_location,
                        ));
                    }
                    let value = self.parse_value()?;
                    attrs.push((key, value));

                    match self.source.peek()?.kind {
                        TokenKind::Newline => {
                            self.source.next()?;
                        }
                        TokenKind::RBrace => {}
                        _ => {
                            let token = self.source.next()?;
                            return Err(ParseError::new(
                                ErrorCode::E1000,
                                "expected a newline or '}' after a constructor attribute",
                                token.location,
                            ));
                        }
                    }
                }
                TokenKind::Eof => {
                    return Err(ParseError::new(
                        ErrorCode::E1000,
                        "unclosed constructor body",
                        location,
                    ));
                }
                _ => {
                    let token = self.source.next()?;
                    return Err(ParseError::new(
                        ErrorCode::E1000,
                        "expected an attribute in the constructor body",
                        token.location,
                    ));
                }
            }
        }

        self.resolve_constructor(Value::ConstructorNamed {
            name,
            attrs,
            location,
        })
    }

    /// Parse positional constructor arguments `(a, b)`; the `(` has been
    /// consumed.
    fn parse_constructor_args(
        &mut self,
        name: QualifiedName,
        location: Location,
    ) -> Result<Value, ParseError> {
        let args = self.parse_comma_separated(TokenKind::RParen, "constructor arguments")?;
        self.resolve_constructor(Value::ConstructorTuple {
            name,
            args,
            location,
        })
    }

    /// Parse a list `[a, b, c]`.
    fn parse_list(&mut self) -> Result<Value, ParseError> {
        let open = self.source.next()?;
        let items = self.parse_comma_separated(TokenKind::RBracket, "list")?;
        Ok(Value::List {
            items,
            location: open.location,
        })
    }

    /// Parse a tuple `(a, b)`; empty and single-element tuples included.
    fn parse_tuple(&mut self) -> Result<Value, ParseError> {
        let open = self.source.next()?;
        let items = self.parse_comma_separated(TokenKind::RParen, "tuple")?;
        Ok(Value::Tuple {
            items,
            location: open.location,
        })
    }

    /// Parse comma-separated values up to `close`. Trailing commas are
    /// allowed and newlines are interior whitespace.
    fn parse_comma_separated(
        &mut self,
        close: TokenKind,
        what: &str,
    ) -> Result<Vec<Value>, ParseError> {
        let mut items = Vec::new();
        loop {
            self.skip_newlines()?;
            let token = self.source.peek()?;
            if token.kind == close {
                self.source.next()?;
                return Ok(items);
            }
            if token.kind == TokenKind::Eof {
                return Err(ParseError::new(
                    ErrorCode::E1000,
                    format!("unexpected end of input in {}", what),
                    token.location,
                ));
            }

            items.push(self.parse_value()?);

            self.skip_newlines()?;
            let token = self.source.peek()?;
            if token.kind == TokenKind::Comma {
                self.source.next()?;
            } else if token.kind != close && token.kind != TokenKind::Eof {
                let token = self.source.next()?;
                return Err(ParseError::new(
                    ErrorCode::E1000,
                    format!("expected ',' or a closing delimiter in {}", what),
                    token.location,
                ));
            }
        }
    }

    /// Parse a map `{ key = value, ... }`.
    fn parse_map(&mut self) -> Result<Value, ParseError> {
        let open = self.source.next()?;
        let location = open.location;
        let mut entries: Vec<(String, Value)> = Vec::new();

        loop {
            self.skip_newlines()?;
            let token = self.source.peek()?;
            match token.kind {
                TokenKind::RBrace => {
                    self.source.next()?;
                    break;
                }
                TokenKind::Eof => {
                    return Err(ParseError::new(
                        ErrorCode::E1000,
                        "unclosed map",
                        location,
                    ));
                }
                _ => {
                    let (key, key_location) = self.parse_map_key()?;
                    if entries.iter().any(|(existing, _)| *existing == key) {
                        return Err(ParseError::new(
                            ErrorCode::E2003,
                            format!("duplicate map key '{}'", key),
                            key_location,
                        ));
                    }
                    self.expect(TokenKind::Eq, "expected '=' after the map key")?;
                    let value = self.parse_value()?;
                    entries.push((key, value));

                    self.skip_newlines()?;
                    let token = self.source.peek()?;
                    if token.kind == TokenKind::Comma {
                        self.source.next()?;
                    } else if token.kind != TokenKind::RBrace && token.kind != TokenKind::Eof {
                        let token = self.source.next()?;
                        return Err(ParseError::new(
                            ErrorCode::E1000,
                            "expected ',' or '}' in map",
                            token.location,
                        ));
                    }
                }
            }
        }

        Ok(Value::Map { entries, location })
    }

    /// Parse a map key: an identifier, a string, or a `[primitive]` whose
    /// token text becomes the key.
    fn parse_map_key(&mut self) -> Result<(String, Location), ParseError> {
        let token = self.source.peek()?;
        match token.kind {
            TokenKind::Ident | TokenKind::BacktickIdent | TokenKind::Str => {
                let token = self.source.next()?;
                Ok((token.text.into_owned(), token.location))
            }
            TokenKind::LBracket => {
                let open = self.source.next()?;
                let primitive = self.source.next()?;
                if !primitive.kind.is_primitive() {
                    return Err(ParseError::new(
                        ErrorCode::E1000,
                        "expected a primitive literal inside a '[...]' map key",
                        primitive.location,
                    ));
                }
                self.expect(TokenKind::RBracket, "expected ']' to close the map key")?;
                Ok((primitive.text.into_owned(), open.location))
            }
            TokenKind::Dot => {
                let token = self.source.next()?;
                Err(ParseError::new(
                    ErrorCode::E1000,
                    "namespaces are not allowed inside maps",
                    token.location,
                ))
            }
            _ => {
                let token = self.source.next()?;
                Err(ParseError::new(
                    ErrorCode::E1000,
                    "expected a map key",
                    token.location,
                ))
            }
        }
    }

    /// Parse a dotted qualified name starting at the current token, which
    /// must be an identifier. Returns the name, its location, and the byte
    /// offset one past its last token.
    fn parse_qualified_name(
        &mut self,
        expectation: &str,
    ) -> Result<(QualifiedName, Location, u32), ParseError> {
        let first = self.source.next()?;
        if !matches!(first.kind, TokenKind::Ident | TokenKind::BacktickIdent) {
            return Err(ParseError::new(
                ErrorCode::E1000,
                expectation,
                first.location,
            ));
        }
        let location = first.location;
        let mut end = first.end_offset;
        let mut components = vec![first.text.into_owned()];

        while self.source.peek()?.kind == TokenKind::Dot {
            match self.source.peek2()?.kind {
                TokenKind::Ident | TokenKind::BacktickIdent => {
                    self.source.next()?; // '.'
                    let segment = self.source.next()?;
                    end = segment.end_offset;
                    components.push(segment.text.into_owned());
                }
                _ => {
                    let dot = self.source.next()?;
                    return Err(ParseError::new(
                        ErrorCode::E1000,
                        "expected an identifier after '.'",
                        dot.location,
                    ));
                }
            }
        }

        Ok((QualifiedName::new(components), location, end))
    }

    /// Hand a completed constructor value to the registry.
    fn resolve_constructor(&mut self, value: Value) -> Result<Value, ParseError> {
        match &self.options.registry {
            None => Ok(value),
            Some(registry) => registry.resolve(value, self.options.policy),
        }
    }

    fn skip_newlines(&mut self) -> Result<(), ParseError> {
        while self.source.peek()?.kind == TokenKind::Newline {
            self.source.next()?;
        }
        Ok(())
    }

    /// Consume the next token, requiring the given kind.
    fn expect(&mut self, kind: TokenKind, message: &str) -> Result<Token<'src>, ParseError> {
        let token = self.source.next()?;
        if token.kind == kind {
            Ok(token)
        } else {
            Err(ParseError::new(ErrorCode::E1000, message, token.location))
        }
    }
}

/// Parse an integer literal, honoring radix prefixes and stripping
/// underscores.
fn parse_int(text: &str, location: Location) -> Result<i64, ParseError> {
    let cleaned: String = text.chars().filter(|c| *c != '_').collect();
    let result = if let Some(hex) = cleaned.strip_prefix("0x").or_else(|| cleaned.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16)
    } else if let Some(bin) = cleaned.strip_prefix("0b").or_else(|| cleaned.strip_prefix("0B")) {
        i64::from_str_radix(bin, 2)
    } else {
        cleaned.parse()
    };
    result.map_err(|_| {
        ParseError::new(
            ErrorCode::E1000,
            format!("integer literal '{}' is out of range", text),
            location,
        )
    })
}

/// Parse a float literal, stripping underscores.
fn parse_float(text: &str, location: Location) -> Result<f64, ParseError> {
    let cleaned: String = text.chars().filter(|c| *c != '_').collect();
    cleaned.parse().map_err(|_| {
        ParseError::new(
            ErrorCode::E1000,
            format!("invalid float literal '{}'", text),
            location,
        )
    })
}

#[cfg(test)]
mod tests;
