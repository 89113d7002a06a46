//! AI inference layer: ViT grade classification, sentence embeddings, evidence retrieval.

pub mod classifier;
pub mod corpus;
pub mod embedding;
pub mod preprocess;
pub mod retriever;

#[cfg(feature = "onnx")]
mod embedder;
#[cfg(feature = "onnx")]
mod vit;

pub use classifier::{ClassifyError, DemoClassifier, GradeClassifier, LiveClassifier, LogitsModel};
pub use embedding::TextEmbedder;
pub use retriever::{EvidenceRetriever, PassageIndex, RetrievalError};

#[cfg(feature = "onnx")]
pub use embedder::Embedder;
#[cfg(feature = "onnx")]
pub use vit::VitModel;
