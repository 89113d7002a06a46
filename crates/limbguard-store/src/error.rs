use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("passage index not found at {0}")]
    IndexNotFound(std::path::PathBuf),

    #[error("passage table `{0}` does not exist")]
    TableNotFound(String),

    #[error("no passages provided")]
    Empty,

    #[error("invalid passage schema: {0}")]
    Schema(String),

    #[cfg(feature = "lancedb")]
    #[error("lancedb error: {0}")]
    LanceDb(#[from] ::lancedb::Error),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("{0}")]
    Other(String),
}
