//! Structured parse errors.
//!
//! Errors are records, not strings: every error carries one of the stable
//! `E`-codes, a human-readable message, and a source location. The codes are
//! an external contract shared with downstream tooling.

use crate::Location;

/// Stable error codes for lexical, syntactic, and constructor failures.
///
/// The numbering groups codes by area: `E1xxx` syntax, `E2xxx` parse-time
/// semantics, `E3xxx` temporal constructors, `E4xxx` foreign code, `E5xxx`
/// names and types, `E6xxx` identifiers, `E7xxx` numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Generic syntax error.
    E1000,
    /// Body `{` not on the same line as the element header.
    E1001,
    /// Qualifier continuation `|` not in column 1.
    E1002,
    /// `|` outside a qualifier continuation.
    E1004,
    /// `(` of a positional constructor not on the same line as the name.
    E1005,
    /// Duplicate map key.
    E2003,
    /// Qualifier without arguments.
    E2101,
    /// Temporal value has the wrong shape or is out of range.
    E3001,
    /// Duration or period without components.
    E3002,
    /// Fractional seconds longer than nine digits.
    E3003,
    /// Calendar designator in a duration.
    E3004,
    /// Time designator in a period.
    E3005,
    /// Unterminated single-line foreign block.
    E4001,
    /// Invalid delimiter after `@`.
    E4002,
    /// Whitespace between a constructor name and `@`.
    E4003,
    /// Reserved word used as a foreign-code constructor.
    E4004,
    /// Unknown constructor, or missing `>` in a generic type.
    E5001,
    /// Newline or end of input inside a backtick identifier.
    E6002,
    /// Sign on a hex or binary literal.
    E7001,
}

impl ErrorCode {
    /// The stable textual form of this code, e.g. `"E1001"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::E1000 => "E1000",
            ErrorCode::E1001 => "E1001",
            ErrorCode::E1002 => "E1002",
            ErrorCode::E1004 => "E1004",
            ErrorCode::E1005 => "E1005",
            ErrorCode::E2003 => "E2003",
            ErrorCode::E2101 => "E2101",
            ErrorCode::E3001 => "E3001",
            ErrorCode::E3002 => "E3002",
            ErrorCode::E3003 => "E3003",
            ErrorCode::E3004 => "E3004",
            ErrorCode::E3005 => "E3005",
            ErrorCode::E4001 => "E4001",
            ErrorCode::E4002 => "E4002",
            ErrorCode::E4003 => "E4003",
            ErrorCode::E4004 => "E4004",
            ErrorCode::E5001 => "E5001",
            ErrorCode::E6002 => "E6002",
            ErrorCode::E7001 => "E7001",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parse error with its code, message, and source location.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message} at {location}")]
pub struct ParseError {
    /// The stable error code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Where the error occurred.
    pub location: Location,
}

impl ParseError {
    /// Create a new parse error.
    pub fn new(code: ErrorCode, message: impl Into<String>, location: Location) -> Self {
        Self {
            code,
            message: message.into(),
            location,
        }
    }
}
