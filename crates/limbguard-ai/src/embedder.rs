//! Sentence embeddings from an ONNX transformer with mean pooling.
//!
//! Expects a model directory holding `model.onnx` and `tokenizer.json`,
//! e.g. all-MiniLM-L6-v2 (384 dimensions).

use std::path::Path;
use std::sync::Mutex;

use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tracing::info;

use crate::embedding::{TextEmbedder, normalize};

/// Shared by the indexer and the query-time retriever so passages and
/// queries land in the same embedding space.
pub struct Embedder {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    dim: usize,
    model_name: String,
}

impl Embedder {
    /// Load an embedding model from a directory containing `model.onnx` and `tokenizer.json`.
    ///
    /// The directory name becomes the recorded model name.
    pub fn load(model_dir: &Path) -> anyhow::Result<Self> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");

        anyhow::ensure!(model_path.exists(), "model.onnx not found in {model_dir:?}");
        anyhow::ensure!(
            tokenizer_path.exists(),
            "tokenizer.json not found in {model_dir:?}"
        );

        let session = Session::builder()?.commit_from_file(&model_path)?;

        let dim = infer_dim(session.outputs()[0].dtype()).unwrap_or(384);

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("load tokenizer: {e}"))?;

        // Longer passages are cut at the model's training length.
        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: 256,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("set truncation: {e}"))?;

        tokenizer.with_padding(Some(tokenizers::PaddingParams {
            ..Default::default()
        }));

        let model_name = model_dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        info!(dim, model = %model_path.display(), "loaded embedding model");
        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            dim,
            model_name,
        })
    }
}

impl TextEmbedder for Embedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn embed_batch(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("tokenize: {e}"))?;
        let batch = TokenBatch::from_encodings(&encodings);
        anyhow::ensure!(batch.width > 0, "tokenizer produced no tokens");
        let shape = [batch.rows as i64, batch.width as i64];

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow::anyhow!("embedding session lock poisoned"))?;
        let outputs = session.run(ort::inputs![
            "input_ids" => Tensor::from_array((shape, batch.ids.into_boxed_slice()))?,
            "attention_mask" => Tensor::from_array((shape, batch.mask.clone().into_boxed_slice()))?,
            "token_type_ids" => Tensor::from_array((shape, batch.type_ids.into_boxed_slice()))?,
        ])?;

        let (out_shape, hidden) = outputs[0].try_extract_tensor::<f32>()?;
        let out_shape: &[i64] = out_shape;
        anyhow::ensure!(
            matches!(out_shape, [b, t, d]
                if *b as usize == batch.rows && *t as usize == batch.width && *d as usize == self.dim),
            "embedding model returned shape {out_shape:?}, wanted [{}, {}, {}]",
            batch.rows,
            batch.width,
            self.dim
        );

        Ok(mean_pool(hidden, &batch.mask, batch.width, self.dim))
    }
}

/// Tokenized texts padded to a common width, laid out row-major.
struct TokenBatch {
    rows: usize,
    width: usize,
    ids: Vec<i64>,
    mask: Vec<i64>,
    type_ids: Vec<i64>,
}

impl TokenBatch {
    fn from_encodings(encodings: &[tokenizers::Encoding]) -> Self {
        let rows = encodings.len();
        let width = encodings.iter().map(|e| e.len()).max().unwrap_or(0);
        let mut batch = Self {
            rows,
            width,
            ids: vec![0; rows * width],
            mask: vec![0; rows * width],
            type_ids: vec![0; rows * width],
        };

        for (row, enc) in encodings.iter().enumerate() {
            let start = row * width;
            let fill = |dst: &mut [i64], src: &[u32]| {
                for (d, &s) in dst.iter_mut().zip(src) {
                    *d = i64::from(s);
                }
            };
            fill(&mut batch.ids[start..start + width], enc.get_ids());
            fill(&mut batch.mask[start..start + width], enc.get_attention_mask());
            fill(&mut batch.type_ids[start..start + width], enc.get_type_ids());
        }
        batch
    }
}

/// Average each row's hidden states over its unmasked tokens, then scale to unit length.
///
/// `hidden` is `[rows, width, dim]` and `mask` is `[rows, width]`, both flat.
/// A row with no unmasked tokens comes out as the zero vector.
fn mean_pool(hidden: &[f32], mask: &[i64], width: usize, dim: usize) -> Vec<Vec<f32>> {
    mask.chunks(width)
        .zip(hidden.chunks(width * dim))
        .map(|(row_mask, row_hidden)| {
            let mut pooled = vec![0.0f32; dim];
            let mut attended = 0usize;
            for (token, _) in row_hidden
                .chunks(dim)
                .zip(row_mask)
                .filter(|(_, m)| **m != 0)
            {
                for (p, h) in pooled.iter_mut().zip(token) {
                    *p += h;
                }
                attended += 1;
            }
            if attended > 0 {
                pooled.iter_mut().for_each(|p| *p /= attended as f32);
            }
            normalize(&mut pooled);
            pooled
        })
        .collect()
}

/// Last dimension of an ONNX tensor output, when statically known.
pub(crate) fn infer_dim(output_type: &ort::value::ValueType) -> Option<usize> {
    match output_type {
        ort::value::ValueType::Tensor { shape, .. } => shape
            .last()
            .and_then(|&d| if d > 0 { Some(d as usize) } else { None }),
        _ => None,
    }
}
