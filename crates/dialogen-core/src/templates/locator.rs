//! Template lookup across ordered source directories
//!
//! A logical template name resolves to either a literal file (copied
//! verbatim, cross-references re-prefixed) or a structured template: a
//! `<name>.gen.yaml` file exposing named sub-templates. Directories are
//! searched in order and the first hit wins; there is no merging across
//! directories.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Extension marking a structured template file
pub const STRUCTURED_EXT: &str = "gen.yaml";

/// A sub-template value: a single string or a list of strings
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TextOrList {
    Text(String),
    List(Vec<String>),
}

impl TextOrList {
    /// The value as a list of strings
    pub fn items(&self) -> Vec<String> {
        match self {
            TextOrList::Text(s) => vec![s.clone()],
            TextOrList::List(items) => items.clone(),
        }
    }

    /// The value as one newline-joined body
    pub fn joined(&self) -> String {
        match self {
            TextOrList::Text(s) => s.clone(),
            TextOrList::List(items) => items.join("\n"),
        }
    }
}

/// A parsed `<name>.gen.yaml` structured template
///
/// At least one of `template`, `templates`, `filename` or `entities`
/// is expected; any other top-level keys become named sub-templates
/// (the `generator` conventions template uses these for per-extension
/// asset directories).
#[derive(Debug, Clone, Deserialize)]
pub struct StructuredTemplate {
    /// Body sub-template: makes this a generating template
    #[serde(default)]
    pub template: Option<TextOrList>,

    /// Multi-expansion sub-template: further logical names to materialize
    #[serde(default)]
    pub templates: Option<TextOrList>,

    /// Explicit output filename sub-template
    #[serde(default)]
    pub filename: Option<String>,

    /// Entity names this template contributes to a property
    #[serde(default)]
    pub entities: Option<TextOrList>,

    /// Remaining named sub-templates
    #[serde(flatten)]
    pub extra: BTreeMap<String, TextOrList>,

    /// Logical name this template was found under
    #[serde(skip)]
    pub name: String,

    /// Source directory it was found in, used as the evaluation base dir
    #[serde(skip)]
    pub source_dir: PathBuf,
}

impl StructuredTemplate {
    /// Look up a named sub-template beyond the four reserved fields
    pub fn field(&self, name: &str) -> Option<&TextOrList> {
        self.extra.get(name)
    }
}

/// A resolved template
#[derive(Debug, Clone)]
pub enum Template {
    /// Verbatim file content plus its source path
    Literal { path: PathBuf, content: String },
    Structured(StructuredTemplate),
}

impl Template {
    /// The directory relative lookups inside this template resolve against
    pub fn base_dir(&self) -> &Path {
        match self {
            Template::Literal { path, .. } => path.parent().unwrap_or(Path::new(".")),
            Template::Structured(tmpl) => &tmpl.source_dir,
        }
    }
}

/// Find the first template matching `name` across `dirs`, in order
///
/// Within each directory a literal file at `name` takes precedence over
/// a structured file at `name.gen.yaml`. Returns `None` when no source
/// has a match; the `genericEntity` fallback is the materializer's job.
pub async fn find_template(name: &str, dirs: &[PathBuf]) -> Result<Option<Template>> {
    for dir in dirs {
        let literal_path = dir.join(name);
        if tokio::fs::metadata(&literal_path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
        {
            let content = tokio::fs::read_to_string(&literal_path)
                .await
                .with_context(|| format!("Failed to read {}", literal_path.display()))?;
            return Ok(Some(Template::Literal {
                path: literal_path,
                content,
            }));
        }

        let structured_path = dir.join(format!("{}.{}", name, STRUCTURED_EXT));
        if tokio::fs::metadata(&structured_path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
        {
            let content = tokio::fs::read_to_string(&structured_path)
                .await
                .with_context(|| format!("Failed to read {}", structured_path.display()))?;
            let mut parsed: StructuredTemplate = serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse {}", structured_path.display()))?;
            parsed.name = name.to_string();
            parsed.source_dir = dir.clone();
            return Ok(Some(Template::Structured(parsed)));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn write(dir: &Path, name: &str, content: &str) {
        tokio::fs::write(dir.join(name), content).await.unwrap();
    }

    #[tokio::test]
    async fn test_first_directory_wins() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        write(first.path(), "greeting.lg", "from first").await;
        write(second.path(), "greeting.lg", "from second").await;

        let dirs = vec![first.path().to_path_buf(), second.path().to_path_buf()];
        let found = find_template("greeting.lg", &dirs).await.unwrap().unwrap();
        match found {
            Template::Literal { content, .. } => assert_eq!(content, "from first"),
            _ => panic!("expected literal"),
        }
    }

    #[tokio::test]
    async fn test_literal_beats_structured_in_same_directory() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "greeting.lg", "verbatim").await;
        write(dir.path(), "greeting.lg.gen.yaml", "template: generated").await;

        let dirs = vec![dir.path().to_path_buf()];
        let found = find_template("greeting.lg", &dirs).await.unwrap().unwrap();
        assert!(matches!(found, Template::Literal { .. }));
    }

    #[tokio::test]
    async fn test_structured_parse_and_extra_fields() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "generator.gen.yaml",
            "lg: \"{{locale}}\"\ndialog: \"\"\n",
        )
        .await;

        let dirs = vec![dir.path().to_path_buf()];
        let found = find_template("generator", &dirs).await.unwrap().unwrap();
        let Template::Structured(tmpl) = found else {
            panic!("expected structured");
        };
        assert_eq!(tmpl.name, "generator");
        assert_eq!(tmpl.source_dir, dir.path());
        assert_eq!(tmpl.field("lg").unwrap().joined(), "{{locale}}");
        assert!(tmpl.template.is_none());
    }

    #[tokio::test]
    async fn test_missing_template_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let dirs = vec![dir.path().to_path_buf()];
        assert!(find_template("absent", &dirs).await.unwrap().is_none());
    }
}
