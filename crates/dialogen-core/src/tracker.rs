//! File reference tracking for the current run
//!
//! Every materialized artifact is recorded in a per-extension bucket so
//! a second request for the same logical name is satisfied from the
//! tracker instead of being regenerated, and so downstream lookups
//! (per-locale examples, singleton flattening) can find what was
//! produced. Text buckets (`lg`/`lu`/`qna`) are locale-scoped and reset
//! after each locale; `dialog`/`json` buckets persist for the run.

use std::collections::HashMap;
use std::path::Path;

/// Extensions whose buckets reset at the end of each locale
const LOCALE_SCOPED_EXTENSIONS: &[&str] = &["lg", "lu", "qna"];

/// One already-materialized artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    /// Logical name: on-disk name with the run prefix stripped
    pub name: String,

    /// Logical name with the extension also stripped
    pub short_name: String,

    /// Name to try when a more specific name has no own template:
    /// multi-dot names collapse to their last two segments
    pub fallback_name: String,

    /// Final on-disk file name
    pub filename: String,

    /// Path relative to the output root
    pub rel_path: String,
}

/// Per-extension buckets of file references
#[derive(Debug, Default)]
pub struct FileRefTracker {
    buckets: HashMap<String, Vec<FileRef>>,
}

fn extension_of(name: &str) -> String {
    name.rsplit('.').next().unwrap_or("").to_string()
}

fn strip_prefix<'a>(filename: &'a str, prefix: &str) -> &'a str {
    let prefixed = format!("{}-", prefix);
    filename.strip_prefix(&prefixed).unwrap_or(filename)
}

impl FileRefTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the reference a file at `full_path` would get
    pub fn make_ref(full_path: &Path, out_dir: &Path, prefix: &str) -> FileRef {
        let filename = full_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let name = strip_prefix(&filename, prefix).to_string();
        let short_name = match name.rfind('.') {
            Some(idx) => name[..idx].to_string(),
            None => name.clone(),
        };
        let segments: Vec<&str> = name.split('.').collect();
        let fallback_name = if segments.len() > 2 {
            segments[segments.len() - 2..].join(".")
        } else {
            name.clone()
        };
        let rel_path = full_path
            .strip_prefix(out_dir)
            .unwrap_or(full_path)
            .to_string_lossy()
            .replace('\\', "/");
        FileRef {
            name,
            short_name,
            fallback_name,
            filename,
            rel_path,
        }
    }

    /// Record a new artifact unless its logical name is already tracked
    ///
    /// Returns `None` for a duplicate; the caller must not regenerate.
    pub fn record_if_new(
        &mut self,
        full_path: &Path,
        out_dir: &Path,
        prefix: &str,
    ) -> Option<FileRef> {
        let file_ref = Self::make_ref(full_path, out_dir, prefix);
        let bucket = self
            .buckets
            .entry(extension_of(&file_ref.name))
            .or_default();
        if bucket.iter().any(|r| r.name == file_ref.name) {
            return None;
        }
        bucket.push(file_ref.clone());
        Some(file_ref)
    }

    /// Whether recording `full_path` would be a duplicate
    pub fn is_duplicate(&self, full_path: &Path, out_dir: &Path, prefix: &str) -> bool {
        let file_ref = Self::make_ref(full_path, out_dir, prefix);
        self.find_logical(&file_ref.name).is_some()
    }

    /// Look up an artifact by logical name (extension picks the bucket)
    pub fn find_logical(&self, name: &str) -> Option<&FileRef> {
        let bucket = self.buckets.get(&extension_of(name))?;
        bucket.iter().find(|r| r.name == name)
    }

    /// Look up an artifact by its final on-disk name
    ///
    /// The bucket for the name's extension is created lazily so later
    /// recordings land in a stable place.
    pub fn lookup_by_filename(&mut self, filename: &str) -> Option<FileRef> {
        let bucket = self.buckets.entry(extension_of(filename)).or_default();
        bucket.iter().find(|r| r.filename == filename).cloned()
    }

    /// All references in one extension bucket
    pub fn bucket(&self, extension: &str) -> &[FileRef] {
        self.buckets
            .get(extension)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Reset the locale-scoped buckets at the end of a locale
    pub fn clear_locale_buckets(&mut self) {
        for ext in LOCALE_SCOPED_EXTENSIONS {
            self.buckets.remove(*ext);
        }
    }
}
