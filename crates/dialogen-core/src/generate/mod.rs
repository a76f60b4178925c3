//! Run orchestration
//!
//! `generate` drives one full run: expand the schema (non-strict),
//! merge template sources, resolve every property's entities, iterate
//! locales x properties x entities through the materializer, harvest
//! cross-file examples for schema-level templates, re-expand strictly,
//! persist the resolved schema, and hand off to singleton flattening
//! and/or merge. When post-processing is requested, generation goes to
//! a scratch directory first so the destination is never mutated
//! mid-run.

mod materialize;
pub mod singleton;
pub mod writer;

pub use materialize::{GENERATOR_TEMPLATE, GENERIC_ENTITY};

use crate::error::GenerationError;
use crate::expand::expand_schema;
use crate::feedback::Feedback;
use crate::merge::{CopyMerger, Merger};
use crate::schema::{Schema, ENTITIES_KEY};
use crate::scope::{self, Scope};
use crate::templates::evaluator::Evaluator;
use anyhow::{Context, Result};
use materialize::Generator;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Settings for one generation run
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Output directory for generated artifacts
    pub out_dir: PathBuf,

    /// Ordered template source directories (first match wins)
    pub template_dirs: Vec<PathBuf>,

    /// Locales to generate, in order
    pub locales: Vec<String>,

    /// Prefix applied to every generated file name
    pub prefix: String,

    /// Overwrite artifacts that already exist
    pub force: bool,

    /// Reconcile with prior output through the merge collaborator
    pub merge: bool,

    /// Flatten cross-referencing artifacts into one root artifact
    pub singleton: bool,
}

impl GenerateOptions {
    pub fn new(out_dir: PathBuf, prefix: impl Into<String>) -> Self {
        Self {
            out_dir,
            template_dirs: Vec::new(),
            locales: vec!["en-us".to_string()],
            prefix: prefix.into(),
            force: false,
            merge: false,
            singleton: false,
        }
    }
}

/// Run one full generation
///
/// Returns `Ok(true)` when no error-severity event was reported. All
/// per-template failures are feedback events; only infrastructure
/// failures (scratch directory, schema artifact write) propagate.
pub async fn generate(
    mut schema: Schema,
    options: &GenerateOptions,
    evaluator: &dyn Evaluator,
    merger: Option<&dyn Merger>,
    feedback: &dyn Feedback,
) -> Result<bool> {
    feedback.message(&format!(
        "Generating {} assets into {}",
        schema.name(),
        options.out_dir.display()
    ));

    // Merge and singleton must see a clean, complete new tree; redirect
    // generation to scratch and post-process from there.
    let redirect = options.merge || options.singleton;
    let scratch = if redirect {
        Some(tempfile::tempdir().context("Failed to create scratch directory")?)
    } else {
        None
    };
    let gen_dir = scratch
        .as_ref()
        .map(|d| d.path().to_path_buf())
        .unwrap_or_else(|| options.out_dir.clone());

    let base_scope = Scope::new()
        .with_str(scope::PREFIX, &options.prefix)
        .with_str(scope::APP_SCHEMA, schema.name())
        .with_str(scope::TRIGGER_INTENT, &schema.trigger_intent())
        .with("locales", json!(options.locales))
        .merged(&schema.parameters());

    // Early pass: structural fields only, unresolved markers tolerated
    let early = expand_schema(schema.value(), &base_scope, false, evaluator, feedback);
    schema.set_value(early);

    let mut template_dirs = options.template_dirs.clone();
    for dir in schema.template_dirs() {
        let dir = PathBuf::from(dir);
        if !template_dirs.contains(&dir) {
            template_dirs.push(dir);
        }
    }

    let mut gen = Generator::new(
        gen_dir.clone(),
        template_dirs,
        options.prefix.clone(),
        options.force,
        base_scope.clone(),
        evaluator,
        feedback,
    );
    gen.load_conventions().await;

    let entities = ensure_entities(&mut gen, &mut schema, &base_scope).await;

    process_templates(&mut gen, &schema, &entities, options, &base_scope).await;

    // Late pass: every remaining marker must now resolve
    let populated = base_scope.with("entities", json!(entities));
    let late = expand_schema(schema.value(), &populated, true, evaluator, feedback);
    schema.set_value(late);

    let resolved = serde_json::to_string_pretty(&schema.resolved_value())
        .context("Failed to serialize resolved schema")?;
    let schema_artifact = gen_dir.join(format!("{}.json", options.prefix));
    writer::write_artifact(&schema_artifact, &resolved, false).await?;

    if options.singleton {
        let default_merger = CopyMerger;
        let merger = merger.unwrap_or(&default_merger);
        if options.merge {
            let flat = tempfile::tempdir().context("Failed to create scratch directory")?;
            singleton::generate_singleton(&options.prefix, &gen_dir, flat.path(), feedback)
                .await?;
            merger.merge(
                &options.prefix,
                &options.out_dir,
                flat.path(),
                &options.out_dir,
                &options.locales,
                feedback,
            )?;
        } else {
            singleton::generate_singleton(&options.prefix, &gen_dir, &options.out_dir, feedback)
                .await?;
        }
    } else if options.merge {
        let default_merger = CopyMerger;
        let merger = merger.unwrap_or(&default_merger);
        merger.merge(
            &options.prefix,
            &options.out_dir,
            &gen_dir,
            &options.out_dir,
            &options.locales,
            feedback,
        )?;
    }

    // Fixed pause so asynchronous feedback drains before the verdict
    tokio::time::sleep(Duration::from_millis(50)).await;

    let success = !feedback.had_error();
    feedback.message(if success {
        "Generation complete"
    } else {
        "Generation completed with errors"
    });
    Ok(success)
}

/// Resolve `$entities` for every property, erroring where impossible
///
/// Declared entities win; otherwise the property type's entity template
/// is consulted for an `entities` sub-template. Resolution is written
/// back into the schema so the final artifact shows it.
async fn ensure_entities(
    gen: &mut Generator<'_>,
    schema: &mut Schema,
    base_scope: &Scope,
) -> BTreeMap<String, Vec<String>> {
    let mut entities = BTreeMap::new();
    for prop in schema.properties() {
        let resolved = match schema.property_entities(&prop.path) {
            Some(declared) => Some(declared),
            None => {
                gen.scope = base_scope
                    .with_str(scope::PROPERTY, &prop.path)
                    .with_str(scope::TYPE, &prop.type_name);
                match gen.resolve_entities(&prop.type_name).await {
                    Ok(found) => found,
                    Err(e) => {
                        gen.feedback().error(&format!("{}: {:#}", prop.path, e));
                        None
                    }
                }
            }
        };
        match resolved {
            Some(list) if !list.is_empty() => {
                if let Some(node) = schema
                    .property_node_mut(&prop.path)
                    .and_then(|n| n.as_object_mut())
                {
                    node.insert(ENTITIES_KEY.to_string(), json!(list));
                }
                entities.insert(prop.path.clone(), list);
            }
            _ => gen
                .feedback()
                .error(&GenerationError::MissingEntities(prop.path.clone()).to_string()),
        }
    }
    entities
}

/// Iterate locales x properties x entities through the materializer
async fn process_templates(
    gen: &mut Generator<'_>,
    schema: &Schema,
    entities: &BTreeMap<String, Vec<String>>,
    options: &GenerateOptions,
    base_scope: &Scope,
) {
    for locale in &options.locales {
        let locale_scope = base_scope.with_str(scope::LOCALE, locale);

        for prop in schema.properties() {
            gen.begin_root();
            let mut prop_scope = locale_scope
                .with_str(scope::PROPERTY, &prop.path)
                .with_str(scope::TYPE, &prop.type_name);

            // A property's own examples are the most specific source;
            // otherwise the schema-level block for this locale applies.
            let examples = schema
                .property_examples(&prop.path)
                .or_else(|| schema.global_examples(locale));
            if let Some(examples) = examples {
                prop_scope = prop_scope.with(scope::EXAMPLES, examples.clone());
            }

            if let Some(templates) = schema.property_templates(&prop.path) {
                gen.scope = prop_scope.clone();
                for template in templates {
                    gen.process_template(&template, false).await;
                }
            } else {
                let own_entity = format!("{}Entity", prop.path);
                for entity in entities.get(&prop.path).cloned().unwrap_or_default() {
                    // The property's own entity resolves through its
                    // type's template set.
                    let template = if entity == own_entity {
                        format!("{}Entity", prop.type_name)
                    } else {
                        entity.clone()
                    };
                    gen.scope = prop_scope.with_str(scope::ENTITY, &entity);
                    gen.process_template(&template, false).await;
                }
            }
        }

        // Schema-level templates see examples harvested from the text
        // artifacts generated for this locale.
        let harvested = harvest_examples(gen).await;
        let mut top_scope = locale_scope.clone();
        if !harvested.is_empty() {
            top_scope = top_scope.with(scope::EXAMPLES, Value::Object(harvested));
        }
        gen.scope = top_scope;
        gen.begin_root();
        for template in schema.top_templates() {
            gen.process_template(&template, false).await;
        }

        gen.end_locale();
    }
}

/// Harvest example annotations from generated language-understanding files
///
/// Inside a `>>`-opened block, `>>var: <name>` selects the variable and
/// `- ` lines contribute items until `<<` closes the block.
async fn harvest_examples(gen: &Generator<'_>) -> Map<String, Value> {
    let mut examples = Map::new();
    let refs: Vec<String> = gen
        .tracker
        .bucket("lu")
        .iter()
        .map(|r| r.rel_path.clone())
        .collect();
    for rel in refs {
        let path = gen.out_dir.join(&rel);
        if let Ok(content) = tokio::fs::read_to_string(&path).await {
            harvest_lines(&content, &mut examples);
        }
    }
    examples
}

fn harvest_lines(content: &str, examples: &mut Map<String, Value>) {
    let mut current: Option<String> = None;
    for line in content.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix(">>var:") {
            current = Some(rest.trim().to_string());
        } else if trimmed.starts_with(">>") || trimmed.starts_with("<<") {
            current = None;
        } else if let Some(item) = trimmed.strip_prefix("- ") {
            if let Some(var) = &current {
                let entry = examples
                    .entry(var.clone())
                    .or_insert_with(|| Value::Array(Vec::new()));
                if let Value::Array(items) = entry {
                    items.push(json!(item));
                }
            }
        }
    }
}
