//! Reference corpus loading and passage chunking for the evidence index.

use std::path::Path;

use anyhow::Context;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// One `.txt` file from the knowledge base.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDocument {
    /// Path relative to the corpus root, `/`-separated.
    pub source: String,
    pub text: String,
}

/// A chunk of a source document, ready for embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct Passage {
    pub source: String,
    pub text: String,
}

/// Read every `.txt` file under `dir`, sorted by path.
///
/// Hidden directories and the LanceDB index directory are skipped so the
/// index can live inside the knowledge base.
pub fn load_documents(dir: &Path) -> anyhow::Result<Vec<SourceDocument>> {
    anyhow::ensure!(dir.is_dir(), "knowledge base directory not found: {dir:?}");

    let mut docs = Vec::new();
    let walker = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_skipped_dir(e));

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "skipping unreadable corpus entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("txt") {
            continue;
        }

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read corpus file {}", path.display()))?;
        let source = path
            .strip_prefix(dir)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        debug!(source, chars = text.chars().count(), "loaded corpus document");
        docs.push(SourceDocument { source, text });
    }

    Ok(docs)
}

fn is_skipped_dir(entry: &walkdir::DirEntry) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || name == "lancedb" || name.ends_with(".lance")
}

/// Split text into windows of at most `size` characters, each starting
/// `size - overlap` characters after the previous one.
///
/// Windows are trimmed and whitespace-only windows dropped.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    if size == 0 {
        return vec![];
    }
    let chars: Vec<char> = text.chars().collect();
    let step = size.saturating_sub(overlap).max(1);

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + size).min(chars.len());
        let window: String = chars[start..end].iter().collect();
        let trimmed = window.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}

/// Chunk every document, keeping corpus order.
pub fn split_corpus(docs: &[SourceDocument], size: usize, overlap: usize) -> Vec<Passage> {
    docs.iter()
        .flat_map(|doc| {
            chunk_text(&doc.text, size, overlap)
                .into_iter()
                .map(|text| Passage {
                    source: doc.source.clone(),
                    text,
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn windows_overlap_and_are_bounded() {
        let text: String = ('a'..='z').cycle().take(1200).collect();
        let chunks = chunk_text(&text, 500, 50);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 500 && !c.is_empty()));
        for pair in chunks.windows(2) {
            let tail: String = pair[0].chars().skip(450).collect();
            let head: String = pair[1].chars().take(50).collect();
            assert_eq!(tail, head);
        }
        // Last window reaches the end of the text.
        assert!(text.ends_with(chunks.last().unwrap().as_str()));
    }

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(chunk_text("  keep feet dry  ", 500, 50), vec!["keep feet dry"]);
    }

    #[test]
    fn blank_text_yields_nothing() {
        assert!(chunk_text("", 500, 50).is_empty());
        assert!(chunk_text(" \n\t ", 500, 50).is_empty());
        assert!(chunk_text("text", 0, 0).is_empty());
    }

    #[test]
    fn multibyte_text_splits_on_char_boundaries() {
        let text = "é".repeat(30);
        let chunks = chunk_text(&text, 10, 2);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        assert_eq!(chunks[0].chars().count(), 10);
    }

    #[test]
    fn loads_txt_files_sorted_and_relative() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("wagner")).unwrap();
        std::fs::create_dir_all(root.join("lancedb")).unwrap();
        std::fs::write(root.join("b_care.txt"), "Inspect feet daily.").unwrap();
        std::fs::write(root.join("a_intro.txt"), "Diabetic foot overview.").unwrap();
        std::fs::write(root.join("wagner/grade3.txt"), "Deep abscess.").unwrap();
        std::fs::write(root.join("notes.md"), "ignored").unwrap();
        std::fs::write(root.join("lancedb/stray.txt"), "ignored").unwrap();

        let docs = load_documents(root).unwrap();
        let sources: Vec<_> = docs.iter().map(|d| d.source.as_str()).collect();
        assert_eq!(sources, ["a_intro.txt", "b_care.txt", "wagner/grade3.txt"]);
        assert_eq!(docs[2].text, "Deep abscess.");
    }

    #[test]
    fn missing_dir_is_error() {
        assert!(load_documents(Path::new("/nonexistent/kb")).is_err());
    }

    #[test]
    fn split_keeps_source() {
        let docs = vec![
            SourceDocument {
                source: "a.txt".into(),
                text: "x".repeat(30),
            },
            SourceDocument {
                source: "b.txt".into(),
                text: "short".into(),
            },
        ];
        let passages = split_corpus(&docs, 20, 5);
        assert_eq!(passages.len(), 3);
        assert_eq!(passages[0].source, "a.txt");
        assert_eq!(passages[2].source, "b.txt");
        assert_eq!(passages[2].text, "short");
    }
}
