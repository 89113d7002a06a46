//! Runtime settings shared by the service and the CLI.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, GradeLabel};

pub const DEFAULT_CHECKPOINT: &str = "checkpoints/vit_classifier.onnx";
pub const DEFAULT_EMBEDDING_MODEL_DIR: &str = "models/all-MiniLM-L6-v2";
pub const DEFAULT_KNOWLEDGE_BASE_DIR: &str = "knowledge_base";
pub const DEFAULT_INDEX_DIR: &str = "knowledge_base/lancedb";
pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;
pub const DEFAULT_BIND: &str = "0.0.0.0:8000";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Artifact locations and tuning knobs.
///
/// Missing artifacts are not errors here: the service checks for them at startup
/// and degrades to demo / retrieval-disabled mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// ONNX export of the fine-tuned ViT classifier.
    pub checkpoint_path: PathBuf,
    /// Directory holding the sentence-embedding `model.onnx` and `tokenizer.json`.
    pub embedding_model_dir: PathBuf,
    /// Reference documents (`*.txt`) to index.
    pub knowledge_base_dir: PathBuf,
    /// LanceDB database holding the passage index.
    pub index_dir: PathBuf,
    pub top_k: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub bind: String,
    pub max_upload_bytes: usize,
    /// Label used in demo mode when no filename keyword matches.
    pub demo_fallback: GradeLabel,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            checkpoint_path: PathBuf::from(DEFAULT_CHECKPOINT),
            embedding_model_dir: PathBuf::from(DEFAULT_EMBEDDING_MODEL_DIR),
            knowledge_base_dir: PathBuf::from(DEFAULT_KNOWLEDGE_BASE_DIR),
            index_dir: PathBuf::from(DEFAULT_INDEX_DIR),
            top_k: DEFAULT_TOP_K,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            bind: DEFAULT_BIND.to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            demo_fallback: GradeLabel::Normal,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.top_k == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "top_k",
                reason: "must be at least 1".into(),
            });
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "chunk_size",
                reason: "must be at least 1".into(),
            });
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::InvalidSetting {
                field: "chunk_overlap",
                reason: format!(
                    "{} must be smaller than chunk_size {}",
                    self.chunk_overlap, self.chunk_size
                ),
            });
        }
        if self.max_upload_bytes == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "max_upload_bytes",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }
}
