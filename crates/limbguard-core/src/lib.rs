pub mod advice;
pub mod config;
pub mod error;
pub mod label;
pub mod record;

pub use advice::{AdviceEntry, AdviceRecord, AdviceTable, Urgency};
pub use config::Settings;
pub use error::ConfigError;
pub use label::GradeLabel;
pub use record::{AssessmentResponse, EvidencePassage, Prediction};
