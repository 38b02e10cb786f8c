//! Diagnostic rendering for SD2 parse errors.
//!
//! Turns the structured [`ParseError`] records produced by `sd2-parse` into
//! human-readable reports with source context, powered by `ariadne`.

use ariadne::{Color, Label, Report, ReportKind, Source};
use sd2_parse::{ErrorCode, ParseError};

/// Render an error against its source text.
///
/// Returns a string containing the formatted report with source context.
pub fn render(error: &ParseError, filename: &str, source: &str) -> String {
    let mut output = Vec::new();
    write_report(error, filename, source, &mut output);
    String::from_utf8(output).unwrap_or_else(|_| error.to_string())
}

/// Write the report for an error to a writer.
pub fn write_report<W: std::io::Write>(
    error: &ParseError,
    filename: &str,
    source: &str,
    writer: W,
) {
    let start = error.location.offset as usize;
    let end = (start + 1).min(source.len()).max(start);
    let range = start..end;

    let mut builder = Report::build(ReportKind::Error, (filename, range.clone()))
        .with_code(error.code.as_str())
        .with_message(&error.message)
        .with_label(
            Label::new((filename, range))
                .with_message(&error.message)
                .with_color(Color::Red),
        );
    if let Some(help) = help(error.code) {
        builder = builder.with_help(help);
    }

    let _ = builder
        .finish()
        .write((filename, Source::from(source)), writer);
}

/// Per-code help notes for the reports.
fn help(code: ErrorCode) -> Option<&'static str> {
    match code {
        ErrorCode::E1001 => Some("move the '{' onto the same line as the header"),
        ErrorCode::E1002 => Some("qualifier continuations start with '|' in column 1"),
        ErrorCode::E1004 => Some("'|' only continues a qualifier list started on the previous line"),
        ErrorCode::E1005 => Some("move the '(' onto the same line as the constructor name"),
        ErrorCode::E2003 => Some("each key may appear only once in a map"),
        ErrorCode::E2101 => Some("qualifiers take one or more qualified-name arguments"),
        ErrorCode::E3003 => Some("fractional seconds support at most nine digits"),
        ErrorCode::E4001 => Some("single-delimiter foreign blocks must close on the same line"),
        ErrorCode::E4002 => Some("foreign code opens with one of '\"', '\\'', '[' or '{'"),
        ErrorCode::E4003 => Some("remove the whitespace before '@'"),
        ErrorCode::E4004 => Some("quote the name with backticks or pick a different constructor"),
        ErrorCode::E6002 => Some("backtick identifiers cannot span lines"),
        ErrorCode::E7001 => Some("remove the sign or write the value in decimal"),
        _ => None,
    }
}
