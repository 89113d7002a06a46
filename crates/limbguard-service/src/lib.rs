//! Assessment service: startup probing, the orchestrator, and the HTTP API.

pub mod assessor;
pub mod capabilities;
mod error;
pub mod http;

#[cfg(feature = "lancedb")]
mod index;

pub use assessor::{AssessError, Assessor};
pub use capabilities::{Capabilities, ClassifierMode, RetrievalMode};
pub use error::{ApiError, ApiResult};

#[cfg(feature = "lancedb")]
pub use index::LanceIndex;
