//! Indexing pipeline: reads the reference corpus, chunks it, embeds each passage, writes to LanceDB.

use std::path::Path;
use std::time::Instant;

use anyhow::Context;
use limbguard_ai::TextEmbedder;
use limbguard_ai::corpus::{load_documents, split_corpus};
use limbguard_store::{IndexedPassage, PassageStore};

const EMBED_BATCH_SIZE: usize = 64;

pub struct IndexStats {
    pub documents: usize,
    pub passages: usize,
    pub elapsed_secs: f64,
}

/// Run the full pipeline: load `.txt` corpus → chunk → embed → write `reference_passages`.
///
/// Replaces any existing passage table. An empty corpus is an error.
pub async fn run_index_pipeline(
    store: &PassageStore,
    embedder: &dyn TextEmbedder,
    corpus_dir: &Path,
    chunk_size: usize,
    chunk_overlap: usize,
) -> anyhow::Result<IndexStats> {
    let start = Instant::now();

    // 1. Load and chunk the corpus.
    let docs = load_documents(corpus_dir).context("loading reference corpus")?;
    eprintln!("  Read {} documents from {}", docs.len(), corpus_dir.display());

    let chunks = split_corpus(&docs, chunk_size, chunk_overlap);
    anyhow::ensure!(
        !chunks.is_empty(),
        "no text passages found under {}",
        corpus_dir.display()
    );
    let total = chunks.len();

    // 2. Embed in sub-batches.
    let mut passages = Vec::with_capacity(total);
    for batch in chunks.chunks(EMBED_BATCH_SIZE) {
        let texts: Vec<&str> = batch.iter().map(|p| p.text.as_str()).collect();
        let embeddings = embedder
            .embed_batch(&texts)
            .context("generating embeddings")?;
        anyhow::ensure!(
            embeddings.len() == batch.len(),
            "embedder returned {} vectors for {} passages",
            embeddings.len(),
            batch.len()
        );

        for (passage, embedding) in batch.iter().zip(embeddings) {
            passages.push(IndexedPassage {
                passage_id: u32::try_from(passages.len()).context("too many passages")?,
                source: passage.source.clone(),
                text: passage.text.clone(),
                embedding,
            });
        }

        eprint!(
            "\r  Embedded {}/{total} ({:.1}%)",
            passages.len(),
            passages.len() as f64 / total as f64 * 100.0
        );
    }
    eprintln!();

    // 3. Drop-and-recreate the passage table.
    eprintln!("  Writing to LanceDB...");
    store
        .write_passages(&passages, embedder.model_name(), embedder.dim())
        .await
        .context("writing passage table to LanceDB")?;

    Ok(IndexStats {
        documents: docs.len(),
        passages: passages.len(),
        elapsed_secs: start.elapsed().as_secs_f64(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Hashes characters into a small unit vector; enough to tell passages apart.
    struct BagOfChars;

    impl TextEmbedder for BagOfChars {
        fn model_name(&self) -> &str {
            "bag-of-chars"
        }

        fn dim(&self) -> usize {
            8
        }

        fn embed_batch(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0f32; 8];
                    for c in t.chars() {
                        v[c as usize % 8] += 1.0;
                    }
                    limbguard_ai::embedding::normalize(&mut v);
                    v
                })
                .collect())
        }
    }

    fn corpus(dir: &Path) {
        std::fs::write(
            dir.join("wagner.txt"),
            "Wagner grade 3 involves deep infection with abscess or osteomyelitis. ".repeat(4),
        )
        .unwrap();
        std::fs::write(dir.join("care.txt"), "Inspect both feet every day.").unwrap();
    }

    #[tokio::test]
    async fn indexes_corpus_into_store() {
        let kb = TempDir::new().unwrap();
        corpus(kb.path());
        let db = TempDir::new().unwrap();
        let store = PassageStore::open(db.path()).await.unwrap();

        let stats = run_index_pipeline(&store, &BagOfChars, kb.path(), 100, 20)
            .await
            .unwrap();
        assert_eq!(stats.documents, 2);
        assert!(stats.passages >= 3);
        assert_eq!(store.passage_count().await.unwrap(), stats.passages);
        assert_eq!(store.embedding_dim().await.unwrap(), 8);
        assert_eq!(
            store.embedding_model().await.unwrap().as_deref(),
            Some("bag-of-chars")
        );
    }

    #[tokio::test]
    async fn reindex_replaces_table() {
        let kb = TempDir::new().unwrap();
        corpus(kb.path());
        let db = TempDir::new().unwrap();
        let store = PassageStore::open(db.path()).await.unwrap();

        let first = run_index_pipeline(&store, &BagOfChars, kb.path(), 100, 20)
            .await
            .unwrap();
        let second = run_index_pipeline(&store, &BagOfChars, kb.path(), 100, 20)
            .await
            .unwrap();
        assert_eq!(first.passages, second.passages);
        assert_eq!(store.passage_count().await.unwrap(), second.passages);
    }

    #[tokio::test]
    async fn empty_corpus_is_error() {
        let kb = TempDir::new().unwrap();
        std::fs::write(kb.path().join("blank.txt"), "   \n").unwrap();
        let db = TempDir::new().unwrap();
        let store = PassageStore::open(db.path()).await.unwrap();

        assert!(
            run_index_pipeline(&store, &BagOfChars, kb.path(), 100, 20)
                .await
                .is_err()
        );
        assert!(!store.has_passages().await.unwrap());
    }
}
