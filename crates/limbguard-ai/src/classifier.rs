//! Gangrene grade classification.
//!
//! [`GradeClassifier`] is either `Live`, backed by a trained checkpoint, or
//! `Demo`, which derives a label from the uploaded filename when no usable
//! checkpoint exists. The variant is chosen once by [`GradeClassifier::load`]
//! and never changes for the lifetime of the process.

use std::path::Path;

use limbguard_core::{GradeLabel, Prediction};
use thiserror::Error;
use tracing::{info, warn};

use crate::preprocess::{self, IMAGE_SIZE, PixelTensor};

#[derive(Debug, Error)]
pub enum ClassifyError {
    /// The upload is not a decodable image.
    #[error("invalid image: {0}")]
    InvalidInput(String),

    /// The model failed while running a forward pass.
    #[error("inference failed: {0}")]
    Inference(String),
}

/// A model that maps a normalized image tensor to one logit per label.
pub trait LogitsModel: Send + Sync {
    fn logits(&self, pixels: &PixelTensor) -> anyhow::Result<Vec<f32>>;
}

/// Classifier backed by a trained model.
pub struct LiveClassifier {
    model: Box<dyn LogitsModel>,
    image_size: u32,
}

impl LiveClassifier {
    pub fn new(model: Box<dyn LogitsModel>) -> Self {
        Self {
            model,
            image_size: IMAGE_SIZE,
        }
    }

    /// One forward pass: preprocess, logits, softmax, argmax.
    pub fn classify(&self, image: &[u8]) -> Result<Prediction, ClassifyError> {
        let pixels = preprocess::preprocess(image, self.image_size)?;
        let logits = self
            .model
            .logits(&pixels)
            .map_err(|e| ClassifyError::Inference(e.to_string()))?;

        if logits.len() != GradeLabel::COUNT {
            return Err(ClassifyError::Inference(format!(
                "model produced {} logits, expected {}",
                logits.len(),
                GradeLabel::COUNT
            )));
        }

        let probs = softmax(&logits);
        let (idx, confidence) = argmax(&probs);
        let label = GradeLabel::from_index(idx)
            .ok_or_else(|| ClassifyError::Inference(format!("label index {idx} out of range")))?;
        Ok(Prediction::live(label, confidence))
    }
}

/// Filename keywords checked in order; first match wins. Matching happens
/// after lowercasing and removing `_`, `-` and spaces.
const DEMO_KEYWORDS: &[(&[&str], GradeLabel)] = &[
    (&["normal", "healthy"], GradeLabel::Normal),
    (&["grade4", "severe"], GradeLabel::Grade4),
    (&["grade3"], GradeLabel::Grade3),
    (&["grade2"], GradeLabel::Grade2),
    (&["grade1", "wound"], GradeLabel::Grade1),
];

/// Simulated classifier used when no trained checkpoint is available.
///
/// No visual analysis happens; the label comes from the filename.
#[derive(Debug, Clone)]
pub struct DemoClassifier {
    fallback: GradeLabel,
}

impl Default for DemoClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl DemoClassifier {
    pub fn new() -> Self {
        Self::with_fallback(GradeLabel::Normal)
    }

    /// Use `fallback` when no keyword matches.
    pub fn with_fallback(fallback: GradeLabel) -> Self {
        Self { fallback }
    }

    /// Label derived from the filename's base name.
    pub fn label_for(&self, filename: &str) -> GradeLabel {
        match keyword_label(filename) {
            Some(label) => label,
            None => {
                warn!(
                    filename,
                    fallback = %self.fallback,
                    "no demo keyword in filename, using fallback label"
                );
                self.fallback
            }
        }
    }

    /// The image is still decoded so malformed uploads fail as in live mode.
    pub fn classify(&self, image: &[u8], filename: &str) -> Result<Prediction, ClassifyError> {
        preprocess::decode(image)?;
        Ok(Prediction::demo(self.label_for(filename)))
    }
}

fn keyword_label(filename: &str) -> Option<GradeLabel> {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let key: String = base
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .collect();

    DEMO_KEYWORDS
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| key.contains(k)))
        .map(|(_, label)| *label)
}

/// Live or demo classification, fixed at startup.
pub enum GradeClassifier {
    Live(LiveClassifier),
    Demo(DemoClassifier),
}

impl GradeClassifier {
    /// Probe the checkpoint and pick a mode.
    ///
    /// A missing, unreadable or incompatible checkpoint never fails startup;
    /// it is logged and the classifier runs in demo mode.
    pub fn load(checkpoint: &Path, demo_fallback: GradeLabel) -> Self {
        let demo = || Self::Demo(DemoClassifier::with_fallback(demo_fallback));

        if !checkpoint.exists() {
            info!(
                path = %checkpoint.display(),
                "classifier checkpoint not found, running in demo mode"
            );
            return demo();
        }

        match load_live(checkpoint) {
            Ok(live) => {
                info!(path = %checkpoint.display(), "loaded classifier checkpoint");
                Self::Live(live)
            }
            Err(e) => {
                warn!(
                    path = %checkpoint.display(),
                    error = %e,
                    "failed to load classifier checkpoint, running in demo mode"
                );
                demo()
            }
        }
    }

    pub fn is_demo(&self) -> bool {
        matches!(self, Self::Demo(_))
    }

    pub fn classify(&self, image: &[u8], filename: &str) -> Result<Prediction, ClassifyError> {
        match self {
            Self::Live(live) => live.classify(image),
            Self::Demo(demo) => demo.classify(image, filename),
        }
    }
}

#[cfg(feature = "onnx")]
fn load_live(checkpoint: &Path) -> anyhow::Result<LiveClassifier> {
    let model = crate::vit::VitModel::load(checkpoint)?;
    Ok(LiveClassifier::new(Box::new(model)))
}

#[cfg(not(feature = "onnx"))]
fn load_live(_checkpoint: &Path) -> anyhow::Result<LiveClassifier> {
    anyhow::bail!("built without the `onnx` feature")
}

/// Numerically stable softmax.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Index and value of the largest element (first on ties).
fn argmax(values: &[f32]) -> (usize, f32) {
    values
        .iter()
        .copied()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, v)| {
            if v > best.1 { (i, v) } else { best }
        })
}
