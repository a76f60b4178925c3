//! Artifact writing
//!
//! Ensures parent directories, normalizes line endings to the host
//! convention (shell scripts stay LF-only regardless of host), embeds
//! a content fingerprint, and persists via async fs. When fingerprint
//! embedding fails on malformed JSON, the offending offset is marked in
//! the reported content to aid diagnosis.

use crate::hash;
use anyhow::{bail, Context, Result};
use std::path::Path;

/// Marker inserted at the failing offset of malformed content
const ERROR_MARKER: &str = "<<<ERROR>>>";

#[cfg(windows)]
const HOST_EOL: &str = "\r\n";
#[cfg(not(windows))]
const HOST_EOL: &str = "\n";

fn normalize_eol(content: &str) -> String {
    let unix = content.replace("\r\n", "\n");
    // Shebang content must stay LF-only or the interpreter line breaks
    if unix.starts_with("#!") || HOST_EOL == "\n" {
        unix
    } else {
        unix.replace('\n', HOST_EOL)
    }
}

/// Annotate `content` with a visible marker at a 1-based line/column
fn annotate_at(content: &str, line: usize, column: usize) -> String {
    let mut offset = 0;
    for (idx, text) in content.split_inclusive('\n').enumerate() {
        if idx + 1 == line {
            offset += column.saturating_sub(1).min(text.len());
            // Reported columns can land mid-character in multibyte text
            while offset > 0 && !content.is_char_boundary(offset) {
                offset -= 1;
            }
            let mut annotated = content.to_string();
            annotated.insert_str(offset, ERROR_MARKER);
            return annotated;
        }
        offset += text.len();
    }
    format!("{}{}", content, ERROR_MARKER)
}

/// Write one artifact, embedding a fingerprint unless `skip_embed`
pub async fn write_artifact(path: &Path, content: &str, skip_embed: bool) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let normalized = normalize_eol(content);

    // JSON artifacts must parse before a fingerprint can be embedded;
    // surface the break location instead of writing a bad file.
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    if !skip_embed && matches!(ext, "dialog" | "json") {
        if let Err(e) = serde_json::from_str::<serde_json::Value>(&normalized) {
            let annotated = annotate_at(&normalized, e.line(), e.column());
            bail!(
                "Malformed JSON for {}: {}\n{}",
                path.display(),
                e,
                annotated
            );
        }
    }

    let final_content = if skip_embed {
        normalized
    } else {
        hash::embed(path, &normalized)
    };

    tokio::fs::write(path, final_content.as_bytes())
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_creates_parents_and_embeds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("en-us/deep/greeting.lg");
        write_artifact(&path, "# greeting\n- hello\n", false)
            .await
            .unwrap();

        assert!(hash::is_unchanged(&path).await);
    }

    #[tokio::test]
    async fn test_skip_embed_writes_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("greeting.lg");
        write_artifact(&path, "# greeting\n", true).await.unwrap();

        let written = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(written, "# greeting\n");
    }

    #[tokio::test]
    async fn test_shebang_stays_lf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.sh");
        write_artifact(&path, "#!/bin/sh\r\necho hi\r\n", false)
            .await
            .unwrap();

        let written = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(!written.contains('\r'));
    }

    #[tokio::test]
    async fn test_malformed_json_reports_marked_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.dialog");
        let err = write_artifact(&path, "{\"a\": }", false).await.unwrap_err();
        assert!(err.to_string().contains(ERROR_MARKER));
        assert!(!path.exists());
    }

    #[test]
    fn test_annotate_at_offset() {
        let annotated = annotate_at("ab\ncd\n", 2, 2);
        assert_eq!(annotated, "ab\nc<<<ERROR>>>d\n");
    }

    #[test]
    fn test_annotate_at_clamps_to_char_boundary() {
        // Column 3 lands inside the two-byte 'é'
        let annotated = annotate_at("héllo\n", 1, 3);
        assert!(annotated.contains(ERROR_MARKER));
        assert_eq!(annotated, "h<<<ERROR>>>éllo\n");
    }
}
