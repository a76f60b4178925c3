//! Normalized schema boundary types
//!
//! The core consumes a schema that has already been normalized by the
//! external loader (`$ref` and inheritance resolved). This module wraps
//! that JSON tree with the accessors generation needs: property
//! enumeration, reserved top-level keys, the trigger intent, and the
//! entity-to-owning-properties map.

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// Reserved per-property key: explicit template names
pub const TEMPLATES_KEY: &str = "$templates";
/// Reserved per-property key: entity names
pub const ENTITIES_KEY: &str = "$entities";
/// Reserved top-level key: additional required template directories
pub const REQUIRES_KEY: &str = "$requires";
/// Reserved top-level key: declared template source directories
pub const TEMPLATE_DIRS_KEY: &str = "$templateDirs";
/// Reserved top-level key: global utterance examples per locale
pub const EXAMPLES_KEY: &str = "$examples";
/// Reserved top-level key: global evaluation parameters
pub const PARAMETERS_KEY: &str = "$parameters";
/// Reserved top-level key: trigger intent override
pub const TRIGGER_INTENT_KEY: &str = "$triggerIntent";

/// Bookkeeping keys stripped from the final resolved schema artifact
pub const BOOKKEEPING_KEYS: &[&str] = &[
    TEMPLATES_KEY,
    REQUIRES_KEY,
    TEMPLATE_DIRS_KEY,
    EXAMPLES_KEY,
];

/// One enumerable schema property
#[derive(Debug, Clone)]
pub struct SchemaProperty {
    /// Property path within the schema (top-level properties are bare names)
    pub path: String,

    /// Type name used to select per-type entity templates
    pub type_name: String,
}

/// A normalized schema ready for generation
#[derive(Debug, Clone)]
pub struct Schema {
    name: String,
    value: Value,
}

impl Schema {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    /// Read an already-normalized schema from a JSON file
    ///
    /// The schema name is the file stem. `$ref` resolution belongs to
    /// the external loader and is not performed here.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read schema {}", path.display()))?;
        let value: Value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse schema {}", path.display()))?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("schema")
            .to_string();
        Ok(Self::new(name, value))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut Value {
        &mut self.value
    }

    pub fn set_value(&mut self, value: Value) {
        self.value = value;
    }

    /// The intent name that triggers this schema's dialog
    pub fn trigger_intent(&self) -> String {
        self.value
            .get(TRIGGER_INTENT_KEY)
            .and_then(Value::as_str)
            .unwrap_or(&self.name)
            .to_string()
    }

    /// Enumerate schema properties in declaration-independent order
    pub fn properties(&self) -> Vec<SchemaProperty> {
        let Some(props) = self.value.get("properties").and_then(Value::as_object) else {
            return Vec::new();
        };
        props
            .iter()
            .map(|(name, node)| SchemaProperty {
                path: name.clone(),
                type_name: node
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or("string")
                    .to_string(),
            })
            .collect()
    }

    /// The raw sub-schema node for one property
    pub fn property_node(&self, path: &str) -> Option<&Value> {
        self.value.get("properties")?.get(path)
    }

    pub fn property_node_mut(&mut self, path: &str) -> Option<&mut Value> {
        self.value.get_mut("properties")?.get_mut(path)
    }

    /// Explicit `$templates` declared on a property, if any
    pub fn property_templates(&self, path: &str) -> Option<Vec<String>> {
        string_list(self.property_node(path)?.get(TEMPLATES_KEY)?)
    }

    /// `$entities` declared on a property, if any
    pub fn property_entities(&self, path: &str) -> Option<Vec<String>> {
        string_list(self.property_node(path)?.get(ENTITIES_KEY)?)
    }

    /// Per-property `examples` declared in the schema, if any
    pub fn property_examples(&self, path: &str) -> Option<&Value> {
        self.property_node(path)?.get("examples")
    }

    /// Schema-level multi-step templates (`$templates` at top level)
    pub fn top_templates(&self) -> Vec<String> {
        self.value
            .get(TEMPLATES_KEY)
            .and_then(string_list)
            .unwrap_or_default()
    }

    /// Template directories declared by the schema (`$templateDirs` + `$requires`)
    pub fn template_dirs(&self) -> Vec<String> {
        let mut dirs = self
            .value
            .get(TEMPLATE_DIRS_KEY)
            .and_then(string_list)
            .unwrap_or_default();
        if let Some(required) = self.value.get(REQUIRES_KEY).and_then(string_list) {
            dirs.extend(required);
        }
        dirs
    }

    /// Global `$parameters`, merged into the initial scope
    pub fn parameters(&self) -> Map<String, Value> {
        self.value
            .get(PARAMETERS_KEY)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default()
    }

    /// Global examples for one locale
    ///
    /// `$examples` may be keyed by locale or be a single locale-free
    /// block; a missing locale key falls back to the whole block.
    pub fn global_examples(&self, locale: &str) -> Option<&Value> {
        let examples = self.value.get(EXAMPLES_KEY)?;
        examples.get(locale).or(Some(examples))
    }

    /// Map from entity name to the properties that declare it
    pub fn entity_owners(&self) -> BTreeMap<String, Vec<String>> {
        let mut owners: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for prop in self.properties() {
            if let Some(entities) = self.property_entities(&prop.path) {
                for entity in entities {
                    owners.entry(entity).or_default().push(prop.path.clone());
                }
            }
        }
        owners
    }

    /// The schema with bookkeeping keys removed, ready to persist
    pub fn resolved_value(&self) -> Value {
        let mut value = self.value.clone();
        if let Some(map) = value.as_object_mut() {
            for key in BOOKKEEPING_KEYS {
                map.remove(*key);
            }
        }
        value
    }
}

fn string_list(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::String(s) => Some(vec![s.clone()]),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
        ),
        _ => None,
    }
}
