//! Constructor registry and resolution.
//!
//! A registry maps qualified names to handlers. Whenever the reader
//! completes a `Name(...)` or `Name { ... }` value, it consults the
//! registry; a matched handler receives the structured call and a context
//! for resolving nested values, and produces an opaque payload that the
//! registry wraps as [`Value::Object`] under the type tag declared at
//! registration time.

use std::collections::HashMap;

use crate::value::ObjectPayload;
use crate::{ErrorCode, Location, ParseError, QualifiedName, Value};

/// Policy for constructor names with no registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownConstructorPolicy {
    /// Leave the raw constructor value in the stream.
    #[default]
    KeepRaw,
    /// Raise E5001.
    Error,
}

/// A structured constructor invocation, as passed to handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstructorCall {
    /// The invocation name.
    pub name: QualifiedName,
    /// Positional arguments (`Name(a, b)`), empty for named form.
    pub args: Vec<Value>,
    /// Named attributes (`Name { k = v }`), empty for positional form.
    pub attrs: Vec<(String, Value)>,
    /// Location of the invocation.
    pub location: Location,
}

/// Handler invoked for a registered constructor.
pub type ConstructorHandler = Box<
    dyn Fn(&ConstructorCall, &mut ResolveContext<'_>) -> Result<ObjectPayload, ParseError>
        + Send
        + Sync,
>;

struct Registered {
    type_tag: QualifiedName,
    handler: ConstructorHandler,
}

/// A mapping from qualified constructor names to handlers.
///
/// Lookup compares the dotted path component-by-component, case-sensitive.
#[derive(Default)]
pub struct ConstructorRegistry {
    handlers: HashMap<QualifiedName, Registered>,
}

impl ConstructorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under an invocation name.
    ///
    /// `type_tag` becomes the tag of the produced [`Value::Object`]; it may
    /// differ from the invocation name.
    pub fn register<F>(
        &mut self,
        name: impl Into<QualifiedName>,
        type_tag: impl Into<QualifiedName>,
        handler: F,
    ) where
        F: Fn(&ConstructorCall, &mut ResolveContext<'_>) -> Result<ObjectPayload, ParseError>
            + Send
            + Sync
            + 'static,
    {
        self.handlers.insert(
            name.into(),
            Registered {
                type_tag: type_tag.into(),
                handler: Box::new(handler),
            },
        );
    }

    /// Check whether a name has a registered handler.
    pub fn contains(&self, name: &QualifiedName) -> bool {
        self.handlers.contains_key(name)
    }

    /// The type tag registered for a name, if any.
    pub fn type_tag_for(&self, name: &QualifiedName) -> Option<&QualifiedName> {
        self.handlers.get(name).map(|r| &r.type_tag)
    }

    /// Resolve a single value: constructor values are dispatched to their
    /// handler, everything else passes through unchanged.
    pub fn resolve(
        &self,
        value: Value,
        policy: UnknownConstructorPolicy,
    ) -> Result<Value, ParseError> {
        let (name, location) = match &value {
            Value::ConstructorNamed { name, location, .. }
            | Value::ConstructorTuple { name, location, .. } => (name, *location),
            _ => return Ok(value),
        };

        let Some(registered) = self.handlers.get(name) else {
            return match policy {
                UnknownConstructorPolicy::KeepRaw => Ok(value),
                UnknownConstructorPolicy::Error => Err(ParseError::new(
                    ErrorCode::E5001,
                    format!("unknown constructor '{}'", name),
                    location,
                )),
            };
        };

        let call = match value {
            Value::ConstructorNamed {
                name,
                attrs,
                location,
            } => ConstructorCall {
                name,
                args: Vec::new(),
                attrs,
                location,
            },
            Value::ConstructorTuple {
                name,
                args,
                location,
            } => ConstructorCall {
                name,
                args,
                attrs: Vec::new(),
                location,
            },
            _ => unreachable!(),
        };

        let mut ctx = ResolveContext {
            registry: self,
            policy,
            call_location: location,
        };
        let payload = (registered.handler)(&call, &mut ctx)?;
        Ok(Value::Object {
            tag: registered.type_tag.clone(),
            payload,
            location,
        })
    }

    /// Resolve a value tree: constructor values anywhere in the tree are
    /// dispatched bottom-up. Objects pass through unchanged, making
    /// resolution idempotent.
    pub fn resolve_deep(
        &self,
        value: Value,
        policy: UnknownConstructorPolicy,
    ) -> Result<Value, ParseError> {
        let value = match value {
            Value::List { items, location } => Value::List {
                items: self.resolve_items(items, policy)?,
                location,
            },
            Value::Tuple { items, location } => Value::Tuple {
                items: self.resolve_items(items, policy)?,
                location,
            },
            Value::Map { entries, location } => Value::Map {
                entries: self.resolve_entries(entries, policy)?,
                location,
            },
            Value::ConstructorNamed {
                name,
                attrs,
                location,
            } => Value::ConstructorNamed {
                name,
                attrs: self.resolve_entries(attrs, policy)?,
                location,
            },
            Value::ConstructorTuple {
                name,
                args,
                location,
            } => Value::ConstructorTuple {
                name,
                args: self.resolve_items(args, policy)?,
                location,
            },
            other => other,
        };
        self.resolve(value, policy)
    }

    fn resolve_items(
        &self,
        items: Vec<Value>,
        policy: UnknownConstructorPolicy,
    ) -> Result<Vec<Value>, ParseError> {
        items
            .into_iter()
            .map(|item| self.resolve_deep(item, policy))
            .collect()
    }

    fn resolve_entries(
        &self,
        entries: Vec<(String, Value)>,
        policy: UnknownConstructorPolicy,
    ) -> Result<Vec<(String, Value)>, ParseError> {
        entries
            .into_iter()
            .map(|(key, item)| Ok((key, self.resolve_deep(item, policy)?)))
            .collect()
    }
}

/// Resolution context handed to constructor handlers.
///
/// Lives only for the duration of the handler call.
pub struct ResolveContext<'r> {
    registry: &'r ConstructorRegistry,
    policy: UnknownConstructorPolicy,
    call_location: Location,
}

impl ResolveContext<'_> {
    /// Resolve nested constructor values inside `value`. Already-resolved
    /// objects are returned as-is.
    pub fn resolve(&mut self, value: Value) -> Result<Value, ParseError> {
        self.registry.resolve_deep(value, self.policy)
    }

    /// Build a parse error at the given location, or at the constructor
    /// call when `at` is `None`.
    pub fn error(
        &self,
        code: ErrorCode,
        message: impl Into<String>,
        at: Option<Location>,
    ) -> ParseError {
        ParseError::new(code, message, at.unwrap_or(self.call_location))
    }
}
