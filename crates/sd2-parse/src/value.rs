//! Value types for SD2 attributes.
//!
//! Attribute values are fully materialized trees, built eagerly while the
//! reader parses. Every node carries the location of its first token.
//! Constructor values (`Name(...)`, `Name { ... }`) may be replaced by
//! [`Value::Object`] nodes when a constructor registry resolves them.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::Location;

/// A dotted sequence of one or more identifiers, e.g. `db.postgresql`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedName(Vec<String>);

impl QualifiedName {
    /// Create a qualified name from its components.
    ///
    /// The component list must be non-empty.
    pub fn new(components: Vec<String>) -> Self {
        debug_assert!(!components.is_empty());
        Self(components)
    }

    /// A single-component name.
    pub fn simple(name: impl Into<String>) -> Self {
        Self(vec![name.into()])
    }

    /// The components of the dotted path.
    pub fn components(&self) -> &[String] {
        &self.0
    }

    /// Append a component.
    pub fn push(&mut self, component: impl Into<String>) {
        self.0.push(component.into());
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

impl FromIterator<String> for QualifiedName {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[&str; N]> for QualifiedName {
    fn from(components: [&str; N]) -> Self {
        Self::new(components.iter().map(|s| s.to_string()).collect())
    }
}

impl From<&str> for QualifiedName {
    /// Split a dotted path, e.g. `"temporal.date"`.
    fn from(path: &str) -> Self {
        Self::new(path.split('.').map(str::to_string).collect())
    }
}

/// An SD2 attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Decoded Unicode text.
    String {
        /// The decoded text.
        value: String,
        /// Location of the opening quote.
        location: Location,
    },
    /// Signed 64-bit integer.
    Int {
        /// The value.
        value: i64,
        /// Location of the literal.
        location: Location,
    },
    /// 64-bit float.
    Float {
        /// The value.
        value: f64,
        /// Location of the literal.
        location: Location,
    },
    /// Boolean.
    Bool {
        /// The value.
        value: bool,
        /// Location of the literal.
        location: Location,
    },
    /// `null`.
    Null {
        /// Location of the literal.
        location: Location,
    },
    /// A bare dotted name used as a value, e.g. `dark.primary`.
    Name {
        /// The name.
        name: QualifiedName,
        /// Location of the first component.
        location: Location,
    },
    /// Ordered list `[a, b, c]`.
    List {
        /// The items, in source order.
        items: Vec<Value>,
        /// Location of the `[`.
        location: Location,
    },
    /// Ordered map `{k = v, ...}`. Keys are unique; insertion order is
    /// preserved.
    Map {
        /// The entries, in source order.
        entries: Vec<(String, Value)>,
        /// Location of the `{`.
        location: Location,
    },
    /// Tuple `(a, b)`, any arity including zero.
    Tuple {
        /// The items, in source order.
        items: Vec<Value>,
        /// Location of the `(`.
        location: Location,
    },
    /// Named constructor `Name { k = v ... }`, unresolved.
    ConstructorNamed {
        /// The constructor name.
        name: QualifiedName,
        /// The attributes, in source order. Keys are unique.
        attrs: Vec<(String, Value)>,
        /// Location of the first name component.
        location: Location,
    },
    /// Positional constructor `Name(a, b)`, unresolved.
    ConstructorTuple {
        /// The constructor name.
        name: QualifiedName,
        /// The arguments, in source order.
        args: Vec<Value>,
        /// Location of the first name component.
        location: Location,
    },
    /// Foreign code `@'...'`, optionally tagged with a constructor name.
    Foreign {
        /// The raw content, delimiters stripped.
        content: String,
        /// The constructor tag, e.g. `sh` in `sh@'echo ok'`.
        constructor: Option<QualifiedName>,
        /// Location of the constructor name, or of the `@` when untagged.
        location: Location,
    },
    /// A resolved constructor: the type tag declared at registration time
    /// plus the handler-produced payload.
    Object {
        /// The registered type tag (may differ from the invocation name).
        tag: QualifiedName,
        /// The opaque payload.
        payload: ObjectPayload,
        /// Location of the originating constructor.
        location: Location,
    },
}

impl Value {
    /// The location of the first token of this value.
    pub fn location(&self) -> Location {
        match self {
            Value::String { location, .. }
            | Value::Int { location, .. }
            | Value::Float { location, .. }
            | Value::Bool { location, .. }
            | Value::Null { location }
            | Value::Name { location, .. }
            | Value::List { location, .. }
            | Value::Map { location, .. }
            | Value::Tuple { location, .. }
            | Value::ConstructorNamed { location, .. }
            | Value::ConstructorTuple { location, .. }
            | Value::Foreign { location, .. }
            | Value::Object { location, .. } => *location,
        }
    }

    /// Get as text, for string values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Get as an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int { value, .. } => Some(*value),
            _ => None,
        }
    }

    /// Get as a float.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float { value, .. } => Some(*value),
            _ => None,
        }
    }

    /// Get as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool { value, .. } => Some(*value),
            _ => None,
        }
    }

    /// Check if this is `null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null { .. })
    }

    /// Get the items of a list.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List { items, .. } => Some(items),
            _ => None,
        }
    }

    /// Get the entries of a map.
    pub fn as_map(&self) -> Option<&[(String, Value)]> {
        match self {
            Value::Map { entries, .. } => Some(entries),
            _ => None,
        }
    }

    /// Get the items of a tuple.
    pub fn as_tuple(&self) -> Option<&[Value]> {
        match self {
            Value::Tuple { items, .. } => Some(items),
            _ => None,
        }
    }

    /// Get the tag and payload of a resolved object.
    pub fn as_object(&self) -> Option<(&QualifiedName, &ObjectPayload)> {
        match self {
            Value::Object { tag, payload, .. } => Some((tag, payload)),
            _ => None,
        }
    }
}

/// An opaque handler-produced payload, held by [`Value::Object`].
///
/// Any `Debug + PartialEq + Send + Sync + 'static` type qualifies; consumers
/// recover the concrete type with [`ObjectPayload::downcast_ref`].
pub trait Payload: fmt::Debug + Send + Sync + 'static {
    /// Upcast for downcasting.
    fn as_any(&self) -> &dyn Any;
    /// Dynamic equality against another payload.
    fn eq_payload(&self, other: &dyn Payload) -> bool;
}

impl<T> Payload for T
where
    T: PartialEq + fmt::Debug + Send + Sync + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_payload(&self, other: &dyn Payload) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }
}

/// Shared ownership wrapper around a [`Payload`], keeping [`Value`]
/// cheap to clone and comparable.
#[derive(Clone)]
pub struct ObjectPayload(Arc<dyn Payload>);

impl ObjectPayload {
    /// Wrap a payload value.
    pub fn new<T: Payload>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Borrow the payload as its concrete type.
    pub fn downcast_ref<T: Payload>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref()
    }
}

impl fmt::Debug for ObjectPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl PartialEq for ObjectPayload {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_payload(other.0.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_name_display() {
        let name = QualifiedName::from(["db", "postgresql"]);
        assert_eq!(name.to_string(), "db.postgresql");
        assert_eq!(QualifiedName::simple("sh").to_string(), "sh");
    }

    #[test]
    fn test_payload_equality() {
        let a = ObjectPayload::new(42i64);
        let b = ObjectPayload::new(42i64);
        let c = ObjectPayload::new(43i64);
        let d = ObjectPayload::new("42".to_string());
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn test_payload_downcast() {
        let payload = ObjectPayload::new("hello".to_string());
        assert_eq!(payload.downcast_ref::<String>().unwrap(), "hello");
        assert!(payload.downcast_ref::<i64>().is_none());
    }
}
