//! Content fingerprints embedded in generated artifacts
//!
//! A fingerprint is a SHA-256 hex digest over the artifact content with
//! line endings normalized and any previous fingerprint removed. Text
//! artifacts (`lg`/`lu`/`qna`) carry it as a trailing comment line;
//! JSON artifacts (`dialog`/`json`) carry it as a `$Generator` field
//! hashed over the compact canonical serialization (serde_json's map is
//! key-ordered, so re-serialization is canonical). Other artifact kinds
//! carry no fingerprint and always count as changed.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Trailing comment marker in text artifacts
pub const TEXT_MARKER: &str = "> Generator: ";

/// Fingerprint field in JSON artifacts
pub const GENERATOR_FIELD: &str = "$Generator";

/// Extensions whose artifacts carry a trailing comment fingerprint
const TEXT_EXTENSIONS: &[&str] = &["lg", "lu", "qna"];

/// Extensions whose artifacts carry a `$Generator` field
const JSON_EXTENSIONS: &[&str] = &["dialog", "json"];

/// How an artifact at a given path embeds its fingerprint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HashKind {
    Text,
    Json,
    None,
}

fn hash_kind(path: &Path) -> HashKind {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    if TEXT_EXTENSIONS.contains(&ext) {
        HashKind::Text
    } else if JSON_EXTENSIONS.contains(&ext) {
        HashKind::Json
    } else {
        HashKind::None
    }
}

/// SHA-256 hex digest over CRLF-normalized content
pub fn fingerprint(content: &str) -> String {
    let normalized = content.replace("\r\n", "\n");
    let digest = Sha256::digest(normalized.as_bytes());
    format!("{:x}", digest)
}

/// Fingerprint of a JSON value via its compact canonical serialization
pub fn fingerprint_json(value: &Value) -> String {
    fingerprint(&value.to_string())
}

/// Text content with any fingerprint marker lines removed
fn strip_text_marker(content: &str) -> String {
    let mut lines: Vec<&str> = content
        .lines()
        .filter(|line| !line.starts_with(TEXT_MARKER))
        .collect();
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    let mut stripped = lines.join("\n");
    stripped.push('\n');
    stripped
}

/// Embed a fresh fingerprint into `content` according to the path's kind
///
/// Idempotent: embedding already-embedded content yields byte-identical
/// output. Content that cannot carry a fingerprint (unknown extension,
/// unparseable JSON) is returned unchanged.
pub fn embed(path: &Path, content: &str) -> String {
    match hash_kind(path) {
        HashKind::Text => {
            let stripped = strip_text_marker(content);
            let hash = fingerprint(&stripped);
            format!("{}{}{}\n", stripped, TEXT_MARKER, hash)
        }
        HashKind::Json => {
            let Ok(mut value) = serde_json::from_str::<Value>(content) else {
                return content.to_string();
            };
            match value.as_object_mut() {
                Some(map) => map.remove(GENERATOR_FIELD),
                None => return content.to_string(),
            };
            // Hash without the field, then re-borrow to insert it
            let hash = fingerprint_json(&value);
            if let Some(map) = value.as_object_mut() {
                map.insert(GENERATOR_FIELD.to_string(), Value::String(hash));
            }
            serde_json::to_string_pretty(&value).unwrap_or_else(|_| content.to_string())
        }
        HashKind::None => content.to_string(),
    }
}

/// The fingerprint embedded in `content`, if any
pub fn extract_fingerprint(path: &Path, content: &str) -> Option<String> {
    match hash_kind(path) {
        HashKind::Text => content
            .lines()
            .rev()
            .find(|line| line.starts_with(TEXT_MARKER))
            .map(|line| line[TEXT_MARKER.len()..].trim().to_string()),
        HashKind::Json => {
            let value: Value = serde_json::from_str(content).ok()?;
            value
                .get(GENERATOR_FIELD)
                .and_then(Value::as_str)
                .map(str::to_string)
        }
        HashKind::None => None,
    }
}

/// Whether `content` still matches its embedded fingerprint
///
/// Artifacts without a fingerprint (or with unparseable content) report
/// changed, so they are never skipped on regeneration.
pub fn content_unchanged(path: &Path, content: &str) -> bool {
    let Some(embedded) = extract_fingerprint(path, content) else {
        return false;
    };
    let recomputed = match hash_kind(path) {
        HashKind::Text => fingerprint(&strip_text_marker(content)),
        HashKind::Json => {
            let Ok(mut value) = serde_json::from_str::<Value>(content) else {
                return false;
            };
            match value.as_object_mut() {
                Some(map) => {
                    map.remove(GENERATOR_FIELD);
                    fingerprint_json(&value)
                }
                None => return false,
            }
        }
        HashKind::None => return false,
    };
    embedded == recomputed
}

/// Read an artifact and report whether it matches its fingerprint
pub async fn is_unchanged(path: &Path) -> bool {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => content_unchanged(path, &content),
        Err(_) => false,
    }
}

/// Read an artifact and extract its embedded fingerprint, if any
pub async fn read_fingerprint(path: &Path) -> Option<String> {
    let content = tokio::fs::read_to_string(path).await.ok()?;
    extract_fingerprint(path, &content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_text_embed_round_trip() {
        let path = PathBuf::from("greeting.lg");
        let embedded = embed(&path, "# greeting\n- hello\n");
        assert!(content_unchanged(&path, &embedded));
        assert!(extract_fingerprint(&path, &embedded).is_some());
    }

    #[test]
    fn test_text_embed_is_idempotent() {
        let path = PathBuf::from("greeting.lg");
        let once = embed(&path, "# greeting\n- hello\n");
        let twice = embed(&path, &once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_text_change_detected() {
        let path = PathBuf::from("greeting.lg");
        let embedded = embed(&path, "# greeting\n- hello\n");
        let edited = embedded.replace("hello", "goodbye");
        assert!(!content_unchanged(&path, &edited));
    }

    #[test]
    fn test_json_embed_round_trip() {
        let path = PathBuf::from("main.dialog");
        let embedded = embed(&path, r#"{"$kind": "Dialog", "steps": [1, 2]}"#);
        assert!(content_unchanged(&path, &embedded));
        assert_eq!(embed(&path, &embedded), embedded);
    }

    #[test]
    fn test_json_field_hashes_content_without_itself() {
        let path = PathBuf::from("main.dialog");
        let embedded = embed(&path, r#"{"$kind": "Dialog"}"#);

        let mut value: Value = serde_json::from_str(&embedded).unwrap();
        let field = value
            .as_object_mut()
            .unwrap()
            .remove(GENERATOR_FIELD)
            .unwrap();
        assert_eq!(field.as_str().unwrap(), fingerprint_json(&value));
    }

    #[test]
    fn test_json_change_detected() {
        let path = PathBuf::from("main.dialog");
        let embedded = embed(&path, r#"{"$kind": "Dialog"}"#);
        let edited = embedded.replace("Dialog", "Prompt");
        assert!(!content_unchanged(&path, &edited));
    }

    #[test]
    fn test_crlf_normalized_before_hashing() {
        assert_eq!(fingerprint("a\r\nb\n"), fingerprint("a\nb\n"));
    }

    #[test]
    fn test_unmarked_kinds_always_changed() {
        let path = PathBuf::from("notes.txt");
        assert_eq!(embed(&path, "anything"), "anything");
        assert!(!content_unchanged(&path, "anything"));
    }
}
