//! Per-request records: predictions, retrieved evidence, and the assembled response.

use serde::{Deserialize, Serialize};

use crate::{AdviceRecord, GradeLabel};

/// Classifier output for one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: GradeLabel,
    pub display_name: String,
    /// Softmax probability of `label`. Absent when the label was simulated.
    pub confidence: Option<f32>,
    pub demo_mode: bool,
}

impl Prediction {
    pub fn live(label: GradeLabel, confidence: f32) -> Self {
        Self {
            label,
            display_name: label.display_name().to_string(),
            confidence: Some(confidence),
            demo_mode: false,
        }
    }

    pub fn demo(label: GradeLabel) -> Self {
        Self {
            label,
            display_name: label.display_name().to_string(),
            confidence: None,
            demo_mode: true,
        }
    }
}

/// A reference passage returned by the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidencePassage {
    pub text: String,
    /// Corpus-relative path of the document the passage came from.
    pub source: String,
    /// Similarity to the query; larger is closer.
    pub score: f32,
}

/// Response for one assessed image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentResponse {
    pub success: bool,
    pub demo_mode: bool,
    pub classification: GradeLabel,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    pub advice: AdviceRecord,
    pub rag_guidance: Option<String>,
}

impl AssessmentResponse {
    /// Assemble a response. `demo_mode` comes from the process-wide
    /// capabilities, not from the individual prediction.
    pub fn assemble(
        prediction: Prediction,
        demo_mode: bool,
        advice: AdviceRecord,
        rag_guidance: Option<String>,
    ) -> Self {
        Self {
            success: true,
            demo_mode,
            classification: prediction.label,
            display_name: prediction.display_name,
            confidence: prediction.confidence,
            advice,
            rag_guidance,
        }
    }
}
