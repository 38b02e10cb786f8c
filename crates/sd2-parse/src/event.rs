//! Event types for the SD2 streaming reader.
//!
//! This is a SAX-style model: the reader emits events in document order,
//! with structure represented by start/end pairs. Attribute values arrive
//! fully materialized — there are no value-chunk events.

use crate::{Location, QualifiedName, Value};

/// Events produced by [`crate::Reader::next_event`].
///
/// The stream always begins with `StartDocument` and ends with
/// `EndDocument`; `StartElement`/`EndElement` and `StartNamespace`/
/// `EndNamespace` are balanced.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Start of the document. Always the first event.
    StartDocument {
        /// Start of the source.
        location: Location,
    },
    /// End of the document. Terminal: repeated calls keep returning it.
    EndDocument {
        /// End of the source.
        location: Location,
    },
    /// A document-level annotation `#![name(args)]`, legal only before the
    /// first element.
    DocumentAnnotation {
        /// The annotation name.
        name: QualifiedName,
        /// Raw argument text from the parenthesized region, if any.
        args: Option<String>,
        /// Location of the `#`.
        location: Location,
    },
    /// Start of an element.
    StartElement {
        /// The element keyword.
        keyword: String,
        /// Optional identifier following the keyword.
        id: Option<String>,
        /// Optional declared type following `:`.
        type_expr: Option<TypeExpr>,
        /// Annotations that preceded the element header.
        annotations: Vec<Annotation>,
        /// Header qualifiers.
        qualifiers: Vec<Qualifier>,
        /// Location of the keyword.
        location: Location,
    },
    /// End of the most recent unclosed element.
    EndElement {
        /// Location of the closing `}`, or of the header for bodyless
        /// elements.
        location: Location,
    },
    /// Start of a namespace `.name { ... }`.
    StartNamespace {
        /// The namespace name.
        name: String,
        /// Location of the `.`.
        location: Location,
    },
    /// End of the most recent unclosed namespace.
    EndNamespace {
        /// Location of the closing `}`.
        location: Location,
    },
    /// An attribute `name = value`.
    Attribute {
        /// The attribute name.
        name: String,
        /// The materialized value.
        value: Value,
        /// Location of the attribute name.
        location: Location,
    },
}

impl Event {
    /// Get the location of this event.
    pub fn location(&self) -> Location {
        match self {
            Event::StartDocument { location }
            | Event::EndDocument { location }
            | Event::DocumentAnnotation { location, .. }
            | Event::StartElement { location, .. }
            | Event::EndElement { location }
            | Event::StartNamespace { location, .. }
            | Event::EndNamespace { location }
            | Event::Attribute { location, .. } => *location,
        }
    }
}

/// An annotation `#[name(args)]` attached to an element header.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    /// The annotation name.
    pub name: QualifiedName,
    /// Raw argument text from the parenthesized region, balanced brackets
    /// preserved.
    pub args: Option<String>,
    /// Location of the `#`.
    pub location: Location,
}

/// A header qualifier: a name with one or more qualified-name arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Qualifier {
    /// The qualifier name.
    pub name: String,
    /// The arguments; never empty.
    pub args: Vec<QualifiedName>,
    /// Location of the qualifier name.
    pub location: Location,
}

/// A type expression: a qualified name with optional generic arguments,
/// e.g. `Map<String, List<Int>>`.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeExpr {
    /// The type name.
    pub name: QualifiedName,
    /// Generic arguments, empty for plain types.
    pub args: Vec<TypeExpr>,
}
