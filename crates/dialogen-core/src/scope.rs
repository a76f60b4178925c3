//! Evaluation scope threaded through expansion and template evaluation
//!
//! A scope is the ambient key/value context a template body or schema
//! expression sees: current locale, property, type, entity, examples,
//! prefix, and any global `$parameters`. Narrower scopes are built by
//! structural copy-and-extend (`with`) rather than mutate-and-restore,
//! so there is no restore step to forget on an error path.

use serde::Serialize;
use serde_json::{Map, Value};

/// Well-known scope key: the current locale (e.g. `en-us`)
pub const LOCALE: &str = "locale";
/// Well-known scope key: the current schema property path
pub const PROPERTY: &str = "property";
/// Well-known scope key: the current property's type name
pub const TYPE: &str = "type";
/// Well-known scope key: the current entity name
pub const ENTITY: &str = "entity";
/// Well-known scope key: locale-appropriate utterance examples
pub const EXAMPLES: &str = "examples";
/// Well-known scope key: the prefix applied to generated filenames
pub const PREFIX: &str = "prefix";
/// Well-known scope key: the sub-schema of the property being expanded
pub const PROPERTY_SCHEMA: &str = "propertySchema";
/// Well-known scope key: the schema name
pub const APP_SCHEMA: &str = "appSchema";
/// Well-known scope key: the schema's trigger intent
pub const TRIGGER_INTENT: &str = "triggerIntent";

/// Immutable-by-convention evaluation context
///
/// Serializes transparently to its underlying JSON map so it can be
/// handed directly to the template evaluator as a render context.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Scope {
    values: Map<String, Value>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of this scope with one additional (or replaced) binding
    pub fn with(&self, key: &str, value: Value) -> Scope {
        let mut values = self.values.clone();
        values.insert(key.to_string(), value);
        Scope { values }
    }

    /// Convenience for string bindings
    pub fn with_str(&self, key: &str, value: &str) -> Scope {
        self.with(key, Value::String(value.to_string()))
    }

    /// A copy of this scope with one binding removed
    pub fn without(&self, key: &str) -> Scope {
        let mut values = self.values.clone();
        values.remove(key);
        Scope { values }
    }

    /// A copy of this scope extended with every entry of `other`
    pub fn merged(&self, other: &Map<String, Value>) -> Scope {
        let mut values = self.values.clone();
        for (k, v) in other {
            values.insert(k.clone(), v.clone());
        }
        Scope { values }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    /// Look up a dotted path (`a.b.c`) through nested objects
    pub fn lookup_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.values.get(segments.next()?)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// The underlying map, usable as an evaluator render context
    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }
}
