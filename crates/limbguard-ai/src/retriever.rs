//! Retrieval-augmented guidance for abnormal grades.
//!
//! The retriever embeds a canonical query for the predicted label, searches
//! the passage index, and frames the closest passages as guidance text.
//! Whether it is enabled is decided once at startup.

use std::sync::Arc;

use async_trait::async_trait;
use limbguard_core::{ConfigError, EvidencePassage, GradeLabel};
use thiserror::Error;
use tracing::{debug, warn};

use crate::embedding::TextEmbedder;

const DISCLAIMER: &str = "Disclaimer: This information is for reference only. \
                          Always consult a qualified healthcare professional.";

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("query embedding failed: {0}")]
    Embedding(String),

    #[error("index search failed: {0}")]
    Search(String),
}

/// A searchable store of embedded reference passages.
#[async_trait]
pub trait PassageIndex: Send + Sync {
    /// Width of the stored embeddings.
    fn dim(&self) -> usize;

    /// Model recorded at index time, if any.
    fn embedding_model(&self) -> Option<&str>;

    /// The `limit` nearest passages, with larger scores meaning closer.
    async fn search(&self, query: &[f32], limit: usize) -> anyhow::Result<Vec<EvidencePassage>>;
}

/// An embedder and index known to share an embedding space.
pub struct ActiveRetriever {
    embedder: Arc<dyn TextEmbedder>,
    index: Arc<dyn PassageIndex>,
    top_k: usize,
}

pub enum EvidenceRetriever {
    Enabled(ActiveRetriever),
    Disabled,
}

impl EvidenceRetriever {
    /// Enable retrieval over `index`.
    ///
    /// The index must hold vectors of the embedder's width. A differing
    /// recorded model name is tolerated with a warning.
    pub fn enabled(
        embedder: Arc<dyn TextEmbedder>,
        index: Arc<dyn PassageIndex>,
        top_k: usize,
    ) -> Result<Self, ConfigError> {
        if index.dim() != embedder.dim() {
            return Err(ConfigError::EmbeddingDimMismatch {
                index: index.dim(),
                embedder: embedder.dim(),
            });
        }
        if top_k == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "top_k",
                reason: "must be at least 1".into(),
            });
        }

        match index.embedding_model() {
            Some(recorded) if recorded != embedder.model_name() => {
                warn!(
                    index_model = recorded,
                    embedder_model = embedder.model_name(),
                    "index was built with a different embedding model"
                );
            }
            None => warn!("index does not record its embedding model"),
            _ => {}
        }

        Ok(Self::Enabled(ActiveRetriever {
            embedder,
            index,
            top_k,
        }))
    }

    pub fn disabled() -> Self {
        Self::Disabled
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled(_))
    }

    /// Closest passages for `label`, best first. Empty for `normal` or when disabled.
    pub async fn retrieve_passages(
        &self,
        label: GradeLabel,
    ) -> Result<Vec<EvidencePassage>, RetrievalError> {
        let Self::Enabled(active) = self else {
            return Ok(vec![]);
        };
        if !label.is_abnormal() {
            return Ok(vec![]);
        }

        // The embedding forward pass blocks; keep it off the executor.
        let embedder = Arc::clone(&active.embedder);
        let query = query_for(label);
        let vector = tokio::task::spawn_blocking(move || embedder.embed(&query))
            .await
            .map_err(|e| RetrievalError::Embedding(format!("embedding worker failed: {e}")))?
            .map_err(|e| RetrievalError::Embedding(e.to_string()))?;

        let mut passages = active
            .index
            .search(&vector, active.top_k)
            .await
            .map_err(|e| RetrievalError::Search(e.to_string()))?;

        passages.sort_by(|a, b| b.score.total_cmp(&a.score));
        passages.truncate(active.top_k);
        debug!(%label, hits = passages.len(), "retrieved reference passages");
        Ok(passages)
    }

    /// Guidance text for `label`, or `None` when there is nothing to add.
    pub async fn retrieve(&self, label: GradeLabel) -> Result<Option<String>, RetrievalError> {
        let passages = self.retrieve_passages(label).await?;
        Ok(compose_guidance(label, &passages))
    }
}

/// The natural-language query embedded for an abnormal label.
pub fn query_for(label: GradeLabel) -> String {
    format!(
        "Medical advice and treatment guidelines for diabetic foot gangrene {}. \
         What should the patient do? What is the urgency?",
        label.display_name()
    )
}

/// Frame passages as guidance. `None` when there are no passages.
pub fn compose_guidance(label: GradeLabel, passages: &[EvidencePassage]) -> Option<String> {
    if passages.is_empty() {
        return None;
    }
    let body = passages
        .iter()
        .map(|p| p.text.trim())
        .collect::<Vec<_>>()
        .join("\n\n");
    Some(format!(
        "Evidence-based guidance for {}:\n\n{body}\n\n{DISCLAIMER}",
        label.display_name()
    ))
}
