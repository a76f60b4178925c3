//! Template evaluation boundary
//!
//! The expression/template language itself is an external capability;
//! the core only needs two operations against a [`Scope`]: evaluate a
//! free-standing expression to a value, and render a text sub-template
//! to a string. The base directory of the template being evaluated is
//! passed explicitly — there is no working-directory switching.
//!
//! [`HandlebarsEvaluator`] is the shipped implementation so the CLI is
//! usable out of the box; callers with their own language implement
//! [`Evaluator`] instead.

use crate::scope::Scope;
use anyhow::{anyhow, Result};
use handlebars::Handlebars;
use serde_json::Value;
use std::path::Path;

/// Prefix marking an embedded expression in schema scalars
pub const EXPRESSION_PREFIX: &str = "${";

/// Whether a schema scalar is an expression marker
pub fn is_expression(text: &str) -> bool {
    text.starts_with(EXPRESSION_PREFIX)
}

/// External expression/template evaluation capability
pub trait Evaluator {
    /// Evaluate one expression string (with or without `${...}` wrapper)
    ///
    /// May legally produce any JSON value, not just strings. A result
    /// of `Null` means "unresolved"; strictness handling is the
    /// caller's concern.
    fn eval_expression(&self, expr: &str, scope: &Scope) -> Result<Value>;

    /// Render a text sub-template against the scope
    ///
    /// `base_dir` is the directory of the template being evaluated, for
    /// implementations that resolve relative lookups.
    fn eval_text(&self, text: &str, scope: &Scope, base_dir: &Path) -> Result<String>;
}

/// Handlebars-backed evaluator
///
/// Custom functions (phrase lists, substitutions) register as
/// handlebars helpers by name via [`HandlebarsEvaluator::handlebars_mut`].
pub struct HandlebarsEvaluator {
    hbs: Handlebars<'static>,
}

impl HandlebarsEvaluator {
    pub fn new() -> Self {
        let mut hbs = Handlebars::new();
        hbs.register_escape_fn(handlebars::no_escape);
        Self { hbs }
    }

    /// Access the underlying registry to add custom helpers by name
    pub fn handlebars_mut(&mut self) -> &mut Handlebars<'static> {
        &mut self.hbs
    }
}

impl Default for HandlebarsEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator for HandlebarsEvaluator {
    fn eval_expression(&self, expr: &str, scope: &Scope) -> Result<Value> {
        let inner = expr
            .strip_prefix(EXPRESSION_PREFIX)
            .and_then(|rest| rest.strip_suffix('}'))
            .unwrap_or(expr)
            .trim();

        // A bare scope path yields the bound value with its JSON type
        // intact; anything else goes through the template engine and
        // comes back as a string.
        if let Some(value) = scope.lookup_path(inner) {
            return Ok(value.clone());
        }

        let rendered = self
            .hbs
            .render_template(&format!("{{{{{}}}}}", inner), scope.values())
            .map_err(|e| anyhow!("Failed to evaluate expression '{}': {}", inner, e))?;
        if rendered.is_empty() {
            Ok(Value::Null)
        } else {
            Ok(Value::String(rendered))
        }
    }

    fn eval_text(&self, text: &str, scope: &Scope, base_dir: &Path) -> Result<String> {
        self.hbs
            .render_template(text, scope.values())
            .map_err(|e| anyhow!("Failed to render template in {}: {}", base_dir.display(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_expression_preserves_json_type() {
        let evaluator = HandlebarsEvaluator::new();
        let scope = Scope::new().with("count", json!(3)).with(
            "entities",
            json!({"nameEntity": ["ham", "rye"]}),
        );

        assert_eq!(
            evaluator.eval_expression("${count}", &scope).unwrap(),
            json!(3)
        );
        assert_eq!(
            evaluator
                .eval_expression("${entities.nameEntity}", &scope)
                .unwrap(),
            json!(["ham", "rye"])
        );
    }

    #[test]
    fn test_unbound_expression_is_null() {
        let evaluator = HandlebarsEvaluator::new();
        let scope = Scope::new();
        assert_eq!(
            evaluator.eval_expression("${missing}", &scope).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_eval_text_renders_scope() {
        let evaluator = HandlebarsEvaluator::new();
        let scope = Scope::new()
            .with_str("property", "name")
            .with_str("locale", "en-us");
        let rendered = evaluator
            .eval_text("{{locale}}/{{property}}.lg", &scope, Path::new("."))
            .unwrap();
        assert_eq!(rendered, "en-us/name.lg");
    }

    #[test]
    fn test_custom_helper_registers_by_name() {
        let mut evaluator = HandlebarsEvaluator::new();
        evaluator.handlebars_mut().register_helper(
            "shout",
            Box::new(
                |h: &handlebars::Helper,
                 _: &Handlebars,
                 _: &handlebars::Context,
                 _: &mut handlebars::RenderContext,
                 out: &mut dyn handlebars::Output|
                 -> handlebars::HelperResult {
                    let text = h.param(0).and_then(|p| p.value().as_str()).unwrap_or("");
                    out.write(&text.to_uppercase())?;
                    Ok(())
                },
            ),
        );
        let scope = Scope::new().with_str("word", "hi");
        let rendered = evaluator
            .eval_text("{{shout word}}", &scope, Path::new("."))
            .unwrap();
        assert_eq!(rendered, "HI");
    }
}
