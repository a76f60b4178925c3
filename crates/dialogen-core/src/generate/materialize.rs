//! Recursive artifact materialization
//!
//! `process_template` resolves one logical template name into zero, one
//! or many output files: literal artifacts copy through with their
//! cross-references re-prefixed, generating templates evaluate a body
//! against the current scope, and expanding templates recurse into a
//! list of further names. Duplicate names are satisfied from the
//! tracker, user-supplied templates override generated content, and
//! every evaluation failure becomes an error event instead of aborting
//! sibling work.

use crate::error::GenerationError;
use crate::feedback::Feedback;
use crate::scope::{Scope, PROPERTY};
use crate::templates::evaluator::Evaluator;
use crate::templates::locator::{find_template, StructuredTemplate, Template};
use crate::tracker::FileRefTracker;
use anyhow::Result;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::writer::write_artifact;

/// Logical name of the run-scoped conventions template
pub const GENERATOR_TEMPLATE: &str = "generator";

/// Generic entity template tried once when `<X>Entity` has no template
pub const GENERIC_ENTITY: &str = "genericEntity";

/// Hard marker for data a template could not fill in
const MISSING_MARKER: &str = "**MISSING**";

/// Extensions a bracketed cross-reference may carry
const REFERENCE_EXTENSIONS: &[&str] = &["lg", "lu", "qna", "dialog", "json"];

/// Run state shared by the orchestrator and the materializer
pub(crate) struct Generator<'a> {
    pub out_dir: PathBuf,
    pub template_dirs: Vec<PathBuf>,
    pub prefix: String,
    pub force: bool,
    pub scope: Scope,
    pub tracker: FileRefTracker,
    /// Expanding templates already visited this locale, for termination
    /// when authored templates cross-reference each other
    expanded: HashSet<String>,
    conventions: Option<StructuredTemplate>,
    evaluator: &'a dyn Evaluator,
    feedback: &'a dyn Feedback,
}

impl<'a> Generator<'a> {
    pub fn new(
        out_dir: PathBuf,
        template_dirs: Vec<PathBuf>,
        prefix: String,
        force: bool,
        scope: Scope,
        evaluator: &'a dyn Evaluator,
        feedback: &'a dyn Feedback,
    ) -> Self {
        Self {
            out_dir,
            template_dirs,
            prefix,
            force,
            scope,
            tracker: FileRefTracker::new(),
            expanded: HashSet::new(),
            conventions: None,
            evaluator,
            feedback,
        }
    }

    pub fn feedback(&self) -> &'a dyn Feedback {
        self.feedback
    }

    pub fn evaluator(&self) -> &'a dyn Evaluator {
        self.evaluator
    }

    /// Resolve the per-extension asset-directory conventions once per run
    ///
    /// A missing generator template is an error but does not abort the
    /// run; inferred filenames then land flat in the output root.
    pub async fn load_conventions(&mut self) {
        match find_template(GENERATOR_TEMPLATE, &self.template_dirs).await {
            Ok(Some(Template::Structured(tmpl))) => self.conventions = Some(tmpl),
            Ok(_) => self.feedback.error(&format!(
                "Missing {} template in template directories",
                GENERATOR_TEMPLATE
            )),
            Err(e) => self
                .feedback
                .error(&format!("{}: {:#}", GENERATOR_TEMPLATE, e)),
        }
    }

    /// Reset per-locale state (text buckets and the expansion set)
    pub fn end_locale(&mut self) {
        self.tracker.clear_locale_buckets();
        self.expanded.clear();
    }

    /// Start an independent expansion root
    ///
    /// The expansion set only guards cycles within one recursive chain;
    /// each property (and the schema-level template pass) starts fresh
    /// so shared expanding templates fire once per root, not once per
    /// locale.
    pub fn begin_root(&mut self) {
        self.expanded.clear();
    }

    /// Materialize one logical template name
    ///
    /// Returns the artifact path relative to the output root when a
    /// single artifact was produced (or already existed). Failures are
    /// reported through feedback and never propagate to siblings.
    pub async fn process_template(
        &mut self,
        name: &str,
        tolerate_missing: bool,
    ) -> Option<String> {
        match self.try_process(name, tolerate_missing).await {
            Ok(rel_path) => rel_path,
            Err(e) => {
                self.feedback.error(&format!("{}: {:#}", name, e));
                None
            }
        }
    }

    async fn try_process(
        &mut self,
        name: &str,
        tolerate_missing: bool,
    ) -> Result<Option<String>> {
        // Dedup guarantee: a second request for the same logical name
        // reuses the recorded path without re-resolution.
        if let Some(existing) = self.tracker.find_logical(name) {
            return Ok(Some(existing.rel_path.clone()));
        }

        let mut template = find_template(name, &self.template_dirs).await?;
        if template.is_none() {
            if let Some(generic) = generic_entity_name(name) {
                template = find_template(&generic, &self.template_dirs).await?;
            }
        }
        let Some(template) = template else {
            if !tolerate_missing {
                self.feedback
                    .error(&GenerationError::MissingTemplate(name.to_string()).to_string());
            }
            return Ok(None);
        };

        match &template {
            Template::Literal { .. } => self.generate_artifact(name, &template).await,
            Template::Structured(tmpl) if tmpl.template.is_some() => {
                self.generate_artifact(name, &template).await
            }
            Template::Structured(tmpl) if tmpl.templates.is_some() => {
                self.expand_into_templates(tmpl.clone()).await
            }
            // Entity metadata only; nothing to materialize
            Template::Structured(_) => Ok(None),
        }
    }

    /// Materialize a generating template into one artifact
    async fn generate_artifact(
        &mut self,
        name: &str,
        template: &Template,
    ) -> Result<Option<String>> {
        let rel_path = match template {
            Template::Structured(tmpl) if tmpl.filename.is_some() => {
                let pattern = tmpl.filename.as_deref().unwrap_or_default();
                PathBuf::from(
                    self.evaluator
                        .eval_text(pattern, &self.scope, &tmpl.source_dir)?,
                )
            }
            _ => self.infer_filename(name)?,
        };
        let rel_path = prefix_filename(&rel_path, &self.prefix);
        let full_path = self.out_dir.join(&rel_path);
        let display_path = rel_path.to_string_lossy().replace('\\', "/");

        if self.tracker.is_duplicate(&full_path, &self.out_dir, &self.prefix) {
            return Ok(None);
        }

        // Skip-unless-forced policy for incremental regeneration
        let already_exists = tokio::fs::metadata(&full_path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if already_exists && !self.force {
            self.feedback
                .warning(&format!("Skipping already existing {}", display_path));
            let recorded = self
                .tracker
                .record_if_new(&full_path, &self.out_dir, &self.prefix);
            return Ok(recorded.map(|r| r.rel_path));
        }

        let mut content = match template {
            Template::Literal { content, .. } => prefix_references(content, &self.prefix),
            Template::Structured(tmpl) => {
                let mut rendered = Vec::new();
                if let Some(body) = &tmpl.template {
                    for part in body.items() {
                        rendered.push(self.evaluator.eval_text(
                            &part,
                            &self.scope,
                            &tmpl.source_dir,
                        )?);
                    }
                }
                rendered.join("\n")
            }
        };

        // Explicit user customization at the same relative path wins
        // over anything generation would produce.
        if let Some(user_content) = self.user_override(&rel_path).await? {
            self.feedback
                .info(&format!("Using user template for {}", display_path));
            content = user_content;
        }

        // No zero-byte artifacts and no tracker entry for empty results
        if content.trim().is_empty() {
            return Ok(None);
        }

        if content.contains(MISSING_MARKER) {
            self.feedback
                .error(&GenerationError::MissingData(display_path.clone()).to_string());
        } else if let Some(kind) = find_placeholder(&content) {
            self.feedback.warning(&format!(
                "Replace {} placeholder in {}",
                kind, display_path
            ));
        }

        write_artifact(&full_path, &content, false).await?;
        let recorded = self
            .tracker
            .record_if_new(&full_path, &self.out_dir, &self.prefix);
        self.feedback.info(&format!("Generating {}", display_path));
        Ok(recorded.map(|r| r.rel_path))
    }

    /// Materialize an expanding template: recurse into each listed name
    async fn expand_into_templates(
        &mut self,
        tmpl: StructuredTemplate,
    ) -> Result<Option<String>> {
        if !self.expanded.insert(tmpl.name.clone()) {
            return Ok(None);
        }
        let Some(field) = &tmpl.templates else {
            return Ok(None);
        };
        for item in field.items() {
            let name = match self
                .evaluator
                .eval_text(&item, &self.scope, &tmpl.source_dir)
            {
                Ok(rendered) => rendered.trim().to_string(),
                Err(e) => {
                    self.feedback.error(&format!("{}: {:#}", tmpl.name, e));
                    continue;
                }
            };
            if name.is_empty() {
                continue;
            }
            // Sequential, depth-first; the boxed call breaks the async
            // recursion cycle.
            Box::pin(self.process_template(&name, false)).await;
        }
        Ok(None)
    }

    /// Evaluate the `entities` sub-template for a property type
    ///
    /// Tries `<type>Entity` and then the generic entity template; a
    /// speculative miss here is tolerable, the orchestrator reports the
    /// error if the property still ends up without entities.
    pub async fn resolve_entities(&mut self, type_name: &str) -> Result<Option<Vec<String>>> {
        let name = format!("{}Entity", type_name);
        let mut template = find_template(&name, &self.template_dirs).await?;
        if template.is_none() {
            template = find_template(GENERIC_ENTITY, &self.template_dirs).await?;
        }
        let Some(Template::Structured(tmpl)) = template else {
            return Ok(None);
        };
        let Some(field) = &tmpl.entities else {
            return Ok(None);
        };
        let mut entities = Vec::new();
        for item in field.items() {
            let rendered = self
                .evaluator
                .eval_text(&item, &self.scope, &tmpl.source_dir)?;
            if !rendered.trim().is_empty() {
                entities.push(rendered.trim().to_string());
            }
        }
        Ok(Some(entities))
    }

    /// Infer the on-disk path for a logical name from the conventions
    fn infer_filename(&self, name: &str) -> Result<PathBuf> {
        let extension = name.rsplit('.').next().unwrap_or("");
        let pattern = self
            .conventions
            .as_ref()
            .and_then(|c| c.field(extension))
            .map(|f| f.joined());
        let Some(pattern) = pattern else {
            return Ok(PathBuf::from(name));
        };
        // Schema-level templates have no current property; the
        // convention still needs something to fold them under.
        let scope = if self.scope.get(PROPERTY).is_none() {
            self.scope.with_str(PROPERTY, "all")
        } else {
            self.scope.clone()
        };
        let base_dir = self
            .conventions
            .as_ref()
            .map(|c| c.source_dir.clone())
            .unwrap_or_default();
        let dir = self.evaluator.eval_text(&pattern, &scope, &base_dir)?;
        if dir.is_empty() {
            Ok(PathBuf::from(name))
        } else {
            Ok(PathBuf::from(dir).join(name))
        }
    }

    /// Content of a user-supplied template shadowing this output path
    async fn user_override(&self, rel_path: &Path) -> Result<Option<String>> {
        for dir in &self.template_dirs {
            let candidate = dir.join(rel_path);
            if tokio::fs::metadata(&candidate)
                .await
                .map(|m| m.is_file())
                .unwrap_or(false)
            {
                let content = tokio::fs::read_to_string(&candidate).await?;
                return Ok(Some(content));
            }
        }
        Ok(None)
    }
}

/// The generic-entity retry name for `<X>Entity`-style names, if any
fn generic_entity_name(name: &str) -> Option<String> {
    let (stem, rest) = match name.find('.') {
        Some(idx) => (&name[..idx], &name[idx..]),
        None => (name, ""),
    };
    if stem.ends_with("Entity") && stem != GENERIC_ENTITY {
        Some(format!("{}{}", GENERIC_ENTITY, rest))
    } else {
        None
    }
}

/// Prepend the run prefix to the file name component of a path
///
/// `{prefix}-name.ext` and `{prefix}.ext` both already carry the
/// prefix; the latter is how a root artifact names itself.
fn prefix_filename(rel_path: &Path, prefix: &str) -> PathBuf {
    let Some(file_name) = rel_path.file_name().and_then(|n| n.to_str()) else {
        return rel_path.to_path_buf();
    };
    let prefixed = format!("{}-", prefix);
    if file_name.starts_with(&prefixed) || file_name.starts_with(&format!("{}.", prefix)) {
        return rel_path.to_path_buf();
    }
    rel_path.with_file_name(format!("{}{}", prefixed, file_name))
}

/// Re-prefix bracketed cross-references in a literal artifact
///
/// Copied reference files point at other generated artifacts by name
/// (`[greeting.lg]`); those names must carry this run's prefix to keep
/// resolving.
fn prefix_references(content: &str, prefix: &str) -> String {
    let prefixed = format!("{}-", prefix);
    let mut out = String::with_capacity(content.len());
    let mut rest = content;
    while let Some(start) = rest.find('[') {
        out.push_str(&rest[..=start]);
        rest = &rest[start + 1..];
        let Some(end) = rest.find(']') else {
            break;
        };
        let inner = &rest[..end];
        if is_artifact_reference(inner) && !inner.starts_with(&prefixed) {
            out.push_str(&prefixed);
        }
        out.push_str(inner);
        out.push(']');
        rest = &rest[end + 1..];
    }
    out.push_str(rest);
    out
}

fn is_artifact_reference(inner: &str) -> bool {
    !inner.contains(char::is_whitespace)
        && REFERENCE_EXTENSIONS
            .iter()
            .any(|ext| inner.ends_with(&format!(".{}", ext)))
}

/// Find a `**<kind><number>**` placeholder left in generated content
fn find_placeholder(content: &str) -> Option<String> {
    let mut rest = content;
    while let Some(start) = rest.find("**") {
        rest = &rest[start + 2..];
        let Some(end) = rest.find("**") else {
            return None;
        };
        let inner = &rest[..end];
        let kind: String = inner.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
        let digits = &inner[kind.len()..];
        if !kind.is_empty() && !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
            return Some(kind);
        }
        rest = &rest[end + 2..];
    }
    None
}
