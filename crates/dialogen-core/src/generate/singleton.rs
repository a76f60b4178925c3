//! Singleton flattening
//!
//! Collapses a tree of cross-referencing artifacts into one
//! self-contained root artifact: every string leaf in the root's JSON
//! tree that names another generated artifact is replaced with that
//! artifact's parsed content, and consumed artifacts are not emitted
//! standalone. Recognizer references (`.lu.dialog`) stay external, and
//! only JSON-shaped artifacts can inline; everything else copies
//! through verbatim.

use crate::feedback::Feedback;
use crate::hash;
use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::writer::write_artifact;

/// Suffix that must remain an external reference
const EXTERNAL_SUFFIX: &str = ".lu.dialog";

/// Extensions whose content can inline into a JSON tree
const INLINE_EXTENSIONS: &[&str] = &["dialog", "json"];

/// Flatten the generated tree under `src_dir` into `dest_dir`
///
/// The root artifact is `<prefix>.dialog`; a missing root is an error
/// event and the tree copies through unflattened.
pub async fn generate_singleton(
    prefix: &str,
    src_dir: &Path,
    dest_dir: &Path,
    feedback: &dyn Feedback,
) -> Result<()> {
    let root_name = format!("{}.dialog", prefix);
    let files = collect_files(src_dir);
    let by_name = index_by_name(&files);

    let Some(root_rel) = by_name.get(&root_name) else {
        feedback.error(&format!("Missing root artifact {} for singleton", root_name));
        copy_tree(&files, src_dir, dest_dir, &BTreeSet::new()).await?;
        return Ok(());
    };

    let root_path = src_dir.join(root_rel);
    let root_content = tokio::fs::read_to_string(&root_path)
        .await
        .with_context(|| format!("Failed to read {}", root_path.display()))?;
    let mut root: Value = serde_json::from_str(&root_content)
        .with_context(|| format!("Failed to parse {}", root_path.display()))?;

    let loaded = load_referenced(&root, &root_name, &by_name, src_dir, feedback).await;
    let mut consumed: BTreeSet<String> = BTreeSet::new();
    let mut chain = Vec::new();
    substitute(&mut root, &root_name, &loaded, &mut chain, &mut consumed);

    feedback.info(&format!(
        "Flattened {} artifact(s) into {}",
        consumed.len(),
        root_name
    ));

    // Re-stamp the root after inlining
    let dest_root = dest_dir.join(root_rel);
    write_artifact(&dest_root, &serde_json::to_string_pretty(&root)?, false).await?;

    consumed.insert(root_name);
    copy_tree(&files, src_dir, dest_dir, &consumed).await?;
    Ok(())
}

/// Every file under `src_dir`, as paths relative to the tree root
fn collect_files(src_dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in WalkDir::new(src_dir).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(rel) = entry.path().strip_prefix(src_dir) {
            files.push(rel.to_path_buf());
        }
    }
    files.sort();
    files
}

/// Index the tree by on-disk file name for reference resolution
///
/// References name artifacts by bare file name; per-locale copies share
/// a name, so the first relative path answers lookups while copying
/// still covers every path.
fn index_by_name(files: &[PathBuf]) -> BTreeMap<String, PathBuf> {
    let mut by_name: BTreeMap<String, PathBuf> = BTreeMap::new();
    for rel in files {
        if let Some(name) = rel.file_name().and_then(|n| n.to_str()) {
            by_name.entry(name.to_string()).or_insert_with(|| rel.clone());
        }
    }
    by_name
}

fn can_inline(name: &str) -> bool {
    if name.ends_with(EXTERNAL_SUFFIX) {
        return false;
    }
    let ext = name.rsplit('.').next().unwrap_or("");
    INLINE_EXTENSIONS.contains(&ext)
}

/// Collect string leaves that refer to inlinable generated artifacts
fn collect_references(
    value: &Value,
    root_name: &str,
    files: &BTreeMap<String, PathBuf>,
    out: &mut Vec<String>,
) {
    match value {
        Value::String(name) => {
            if name != root_name && can_inline(name) && files.contains_key(name) {
                out.push(name.clone());
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_references(item, root_name, files, out);
            }
        }
        Value::Object(map) => {
            for child in map.values() {
                collect_references(child, root_name, files, out);
            }
        }
        _ => {}
    }
}

/// Read, stamp and parse every artifact reachable from the root
async fn load_referenced(
    root: &Value,
    root_name: &str,
    files: &BTreeMap<String, PathBuf>,
    src_dir: &Path,
    feedback: &dyn Feedback,
) -> BTreeMap<String, Value> {
    let mut pending = Vec::new();
    collect_references(root, root_name, files, &mut pending);

    let mut loaded: BTreeMap<String, Value> = BTreeMap::new();
    while let Some(name) = pending.pop() {
        if loaded.contains_key(&name) {
            continue;
        }
        let Some(rel) = files.get(&name) else {
            continue;
        };
        let path = src_dir.join(rel);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) => {
                feedback.error(&format!("Failed to read {}: {}", path.display(), e));
                continue;
            }
        };
        // Each inlined artifact keeps its own fingerprint stamp
        let stamped = hash::embed(&path, &content);
        match serde_json::from_str::<Value>(&stamped) {
            Ok(parsed) => {
                collect_references(&parsed, root_name, files, &mut pending);
                loaded.insert(name, parsed);
            }
            Err(e) => {
                feedback.warning(&format!("Cannot inline {} into singleton: {}", name, e));
            }
        }
    }
    loaded
}

/// Replace references in place with the loaded artifact content
///
/// `chain` guards against reference cycles between authored artifacts;
/// a name already being inlined further up stays a plain reference.
fn substitute(
    value: &mut Value,
    root_name: &str,
    loaded: &BTreeMap<String, Value>,
    chain: &mut Vec<String>,
    consumed: &mut BTreeSet<String>,
) {
    match value {
        Value::String(name) => {
            let name = name.clone();
            if name == root_name || chain.contains(&name) {
                return;
            }
            if let Some(content) = loaded.get(&name) {
                let mut inlined = content.clone();
                chain.push(name.clone());
                substitute(&mut inlined, root_name, loaded, chain, consumed);
                chain.pop();
                consumed.insert(name);
                *value = inlined;
            }
        }
        Value::Array(items) => {
            for item in items {
                substitute(item, root_name, loaded, chain, consumed);
            }
        }
        Value::Object(map) => {
            for child in map.values_mut() {
                substitute(child, root_name, loaded, chain, consumed);
            }
        }
        _ => {}
    }
}

/// Copy every non-consumed file from `src_dir` to `dest_dir` verbatim
///
/// Consumption applies to a file name; every relative path carrying a
/// surviving name is copied, so locale trees stay complete.
async fn copy_tree(
    files: &[PathBuf],
    src_dir: &Path,
    dest_dir: &Path,
    consumed: &BTreeSet<String>,
) -> Result<()> {
    for rel in files {
        let name = rel.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if consumed.contains(name) {
            continue;
        }
        let dest = dest_dir.join(rel);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        tokio::fs::copy(src_dir.join(rel), &dest)
            .await
            .with_context(|| format!("Failed to copy {}", rel.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::CollectingFeedback;
    use serde_json::json;

    async fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        tokio::fs::create_dir_all(path.parent().unwrap())
            .await
            .unwrap();
        tokio::fs::write(path, content).await.unwrap();
    }

    #[tokio::test]
    async fn test_singleton_consumes_referenced_artifacts() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();

        write(
            src.path(),
            "MyBot.dialog",
            &json!({"steps": ["MyBot-a.dialog", "MyBot-b.dialog"]}).to_string(),
        )
        .await;
        write(src.path(), "MyBot-a.dialog", r#"{"kind": "a"}"#).await;
        write(src.path(), "MyBot-b.dialog", r#"{"kind": "b"}"#).await;
        write(src.path(), "en-us/MyBot-free.dialog", r#"{"kind": "free"}"#).await;

        let feedback = CollectingFeedback::new();
        generate_singleton("MyBot", src.path(), dest.path(), &feedback)
            .await
            .unwrap();
        assert!(!feedback.had_error());

        let root: Value = serde_json::from_str(
            &tokio::fs::read_to_string(dest.path().join("MyBot.dialog"))
                .await
                .unwrap(),
        )
        .unwrap();
        assert_eq!(root["steps"][0]["kind"], json!("a"));
        assert_eq!(root["steps"][1]["kind"], json!("b"));
        // Inlined artifacts carry their own stamp
        assert!(root["steps"][0][hash::GENERATOR_FIELD].is_string());

        assert!(!dest.path().join("MyBot-a.dialog").exists());
        assert!(!dest.path().join("MyBot-b.dialog").exists());
        // Unreferenced artifacts copy through standalone
        assert!(dest.path().join("en-us/MyBot-free.dialog").exists());
    }

    #[tokio::test]
    async fn test_nested_references_flatten_too() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();

        write(
            src.path(),
            "MyBot.dialog",
            &json!({"child": "MyBot-outer.dialog"}).to_string(),
        )
        .await;
        write(
            src.path(),
            "MyBot-outer.dialog",
            &json!({"child": "MyBot-inner.dialog"}).to_string(),
        )
        .await;
        write(src.path(), "MyBot-inner.dialog", r#"{"kind": "inner"}"#).await;

        let feedback = CollectingFeedback::new();
        generate_singleton("MyBot", src.path(), dest.path(), &feedback)
            .await
            .unwrap();

        let root: Value = serde_json::from_str(
            &tokio::fs::read_to_string(dest.path().join("MyBot.dialog"))
                .await
                .unwrap(),
        )
        .unwrap();
        assert_eq!(root["child"]["child"]["kind"], json!("inner"));
        assert!(!dest.path().join("MyBot-outer.dialog").exists());
        assert!(!dest.path().join("MyBot-inner.dialog").exists());
    }

    #[tokio::test]
    async fn test_locale_copies_sharing_a_name_all_survive() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();

        write(src.path(), "MyBot.dialog", r#"{"kind": "root"}"#).await;
        write(src.path(), "en-us/MyBot-name.lg", "# english\n").await;
        write(src.path(), "fr-fr/MyBot-name.lg", "# french\n").await;

        let feedback = CollectingFeedback::new();
        generate_singleton("MyBot", src.path(), dest.path(), &feedback)
            .await
            .unwrap();
        assert!(!feedback.had_error());

        assert!(dest.path().join("en-us/MyBot-name.lg").exists());
        assert!(dest.path().join("fr-fr/MyBot-name.lg").exists());
    }

    #[tokio::test]
    async fn test_recognizer_reference_stays_external() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();

        write(
            src.path(),
            "MyBot.dialog",
            &json!({"recognizer": "MyBot.lu.dialog"}).to_string(),
        )
        .await;
        write(src.path(), "MyBot.lu.dialog", r#"{"kind": "luis"}"#).await;

        let feedback = CollectingFeedback::new();
        generate_singleton("MyBot", src.path(), dest.path(), &feedback)
            .await
            .unwrap();

        let root: Value = serde_json::from_str(
            &tokio::fs::read_to_string(dest.path().join("MyBot.dialog"))
                .await
                .unwrap(),
        )
        .unwrap();
        assert_eq!(root["recognizer"], json!("MyBot.lu.dialog"));
        assert!(dest.path().join("MyBot.lu.dialog").exists());
    }
}
