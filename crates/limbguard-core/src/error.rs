use thiserror::Error;

use crate::GradeLabel;

/// Configuration problems detected at startup. Any of these prevents serving.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("advice table has no entry for {0}")]
    MissingAdvice(GradeLabel),

    #[error("advice table has more than one entry for {0}")]
    DuplicateAdvice(GradeLabel),

    #[error("advice for {label} is inconsistent: {reason}")]
    InvalidAdvice { label: GradeLabel, reason: String },

    #[error("urgency decreases from {from} to {to}")]
    UrgencyNotMonotonic { from: GradeLabel, to: GradeLabel },

    #[error("embedding dimension mismatch: index has {index}, embedder produces {embedder}")]
    EmbeddingDimMismatch { index: usize, embedder: usize },

    #[error("invalid setting `{field}`: {reason}")]
    InvalidSetting { field: &'static str, reason: String },
}
