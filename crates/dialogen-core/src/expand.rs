//! Schema expression expansion
//!
//! Walks the schema tree and replaces `${...}` scalars with their
//! evaluated values. Runs twice per generation: an early non-strict
//! pass (structural fields like template directories, before the scope
//! is fully populated — unresolved markers stay in place silently) and
//! a late strict pass (every remaining marker must resolve or an error
//! event is emitted). Expansion of an already-expanded tree is a no-op.

use crate::error::GenerationError;
use crate::feedback::Feedback;
use crate::scope::{Scope, PROPERTY, PROPERTY_SCHEMA};
use crate::schema::PARAMETERS_KEY;
use crate::templates::evaluator::{is_expression, Evaluator};
use serde_json::{Map, Value};

/// Expand every expression marker in `value` against `scope`
pub fn expand_schema(
    value: &Value,
    scope: &Scope,
    strict: bool,
    evaluator: &dyn Evaluator,
    feedback: &dyn Feedback,
) -> Value {
    expand_node(value, scope, "", false, strict, evaluator, feedback)
}

fn expand_node(
    value: &Value,
    scope: &Scope,
    path: &str,
    in_properties: bool,
    strict: bool,
    evaluator: &dyn Evaluator,
    feedback: &dyn Feedback,
) -> Value {
    match value {
        Value::String(text) if is_expression(text) => {
            match evaluator.eval_expression(text, scope) {
                Ok(result) if !result.is_null() => result,
                Ok(_) | Err(_) => {
                    if strict {
                        let error = GenerationError::UnresolvedExpression {
                            expression: text.clone(),
                            path: if path.is_empty() { "<root>" } else { path }.to_string(),
                        };
                        feedback.error(&error.to_string());
                    }
                    value.clone()
                }
            }
        }
        Value::Array(items) => {
            expand_array(items, scope, path, in_properties, strict, evaluator, feedback)
        }
        Value::Object(map) => {
            expand_object(map, scope, path, in_properties, strict, evaluator, feedback)
        }
        _ => value.clone(),
    }
}

fn expand_array(
    items: &[Value],
    scope: &Scope,
    path: &str,
    in_properties: bool,
    strict: bool,
    evaluator: &dyn Evaluator,
    feedback: &dyn Feedback,
) -> Value {
    let mut expanded: Vec<Value> = Vec::new();
    let mut changed = false;
    for item in items {
        let result = expand_node(item, scope, path, in_properties, strict, evaluator, feedback);
        if &result != item {
            changed = true;
        }
        // An element that expands to an array is spliced, not nested
        match result {
            Value::Array(nested) => expanded.extend(nested),
            other => expanded.push(other),
        }
    }

    // Top-level arrays whose elements expanded collect plug-in
    // contributions: duplicates collapse and object elements merge
    // into one capability map.
    if changed && !path.contains('.') {
        let mut unique: Vec<Value> = Vec::new();
        for item in expanded {
            if !unique.contains(&item) {
                unique.push(item);
            }
        }
        if !unique.is_empty() && unique.iter().all(Value::is_object) {
            let mut merged = Map::new();
            for item in unique {
                if let Value::Object(map) = item {
                    for (k, v) in map {
                        merged.insert(k, v);
                    }
                }
            }
            return Value::Object(merged);
        }
        return Value::Array(unique);
    }
    Value::Array(expanded)
}

fn expand_object(
    map: &Map<String, Value>,
    scope: &Scope,
    path: &str,
    in_properties: bool,
    strict: bool,
    evaluator: &dyn Evaluator,
    feedback: &dyn Feedback,
) -> Value {
    let mut result = Map::new();
    for (key, child) in map {
        // Literal passthrough: evaluation parameters are copied verbatim
        if key == PARAMETERS_KEY {
            result.insert(key.clone(), child.clone());
            continue;
        }

        // Entering the top-level properties object: each property's own
        // sub-schema is visible to its child expressions.
        if key == "properties" && path.is_empty() {
            if let Value::Object(props) = child {
                let mut expanded_props = Map::new();
                for (prop_name, prop_node) in props {
                    let prop_scope = scope
                        .with_str(PROPERTY, prop_name)
                        .with(PROPERTY_SCHEMA, prop_node.clone());
                    expanded_props.insert(
                        prop_name.clone(),
                        expand_node(
                            prop_node, &prop_scope, prop_name, true, strict, evaluator, feedback,
                        ),
                    );
                }
                result.insert(key.clone(), Value::Object(expanded_props));
                continue;
            }
        }

        let child_path = if in_properties && !path.is_empty() {
            format!("{}.{}", path, key)
        } else {
            key.clone()
        };
        let child_scope = if in_properties {
            scope.with_str(PROPERTY, &child_path)
        } else {
            scope.clone()
        };
        result.insert(
            key.clone(),
            expand_node(
                child,
                &child_scope,
                &child_path,
                in_properties,
                strict,
                evaluator,
                feedback,
            ),
        );
    }
    Value::Object(result)
}
