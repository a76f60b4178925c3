//! Merge boundary for incremental regeneration
//!
//! The real three-way merge tool is an external collaborator; the core
//! only guarantees it receives a complete, freshly generated tree. The
//! shipped [`CopyMerger`] applies the minimal honest policy: artifacts
//! the user has edited since generation (fingerprint mismatch) are kept
//! with a warning, everything else takes the new content.

use crate::feedback::Feedback;
use crate::hash;
use anyhow::{Context, Result};
use std::path::Path;
use walkdir::WalkDir;

/// Reconciles a freshly generated tree with prior output
pub trait Merger {
    /// Merge `new_dir` (fresh generation) over `old_dir` into `out_dir`
    fn merge(
        &self,
        prefix: &str,
        old_dir: &Path,
        new_dir: &Path,
        out_dir: &Path,
        locales: &[String],
        feedback: &dyn Feedback,
    ) -> Result<()>;
}

/// Fingerprint-guarded copy merge
pub struct CopyMerger;

impl Merger for CopyMerger {
    fn merge(
        &self,
        prefix: &str,
        old_dir: &Path,
        new_dir: &Path,
        out_dir: &Path,
        _locales: &[String],
        feedback: &dyn Feedback,
    ) -> Result<()> {
        feedback.info(&format!("Merging {} assets into {}", prefix, out_dir.display()));
        for entry in WalkDir::new(new_dir).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(new_dir)
                .context("entry outside new tree")?;
            let old_path = old_dir.join(rel);
            let dest = out_dir.join(rel);

            // A previously generated file the user has since edited is
            // theirs now; never overwrite it silently.
            if old_path.is_file() {
                let old_content = std::fs::read_to_string(&old_path).unwrap_or_default();
                let was_stamped = hash::extract_fingerprint(&old_path, &old_content).is_some();
                if was_stamped && !hash::content_unchanged(&old_path, &old_content) {
                    feedback.warning(&format!(
                        "Keeping user-modified {}",
                        rel.display()
                    ));
                    continue;
                }
            }

            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory {}", parent.display()))?;
            }
            std::fs::copy(entry.path(), &dest)
                .with_context(|| format!("Failed to copy {}", rel.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::{CollectingFeedback, Severity};
    use std::path::PathBuf;

    fn write(dir: &Path, rel: &str, content: &str) -> PathBuf {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_fresh_files_copied() {
        let old = tempfile::tempdir().unwrap();
        let new = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write(new.path(), "en-us/MyBot-name.lg", "# new\n");

        let feedback = CollectingFeedback::new();
        CopyMerger
            .merge("MyBot", old.path(), new.path(), out.path(), &[], &feedback)
            .unwrap();
        assert!(out.path().join("en-us/MyBot-name.lg").exists());
    }

    #[test]
    fn test_user_modified_files_kept() {
        let old = tempfile::tempdir().unwrap();
        let new = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();

        // Old file was generated (stamped) and then edited by hand
        let stamped = hash::embed(Path::new("x.lg"), "# original\n");
        let edited = stamped.replace("original", "edited by user");
        write(old.path(), "en-us/MyBot-name.lg", &edited);
        write(new.path(), "en-us/MyBot-name.lg", "# regenerated\n");

        let feedback = CollectingFeedback::new();
        CopyMerger
            .merge("MyBot", old.path(), new.path(), out.path(), &[], &feedback)
            .unwrap();

        assert!(!out.path().join("en-us/MyBot-name.lg").exists());
        assert_eq!(feedback.with_severity(Severity::Warning).len(), 1);
    }
}
