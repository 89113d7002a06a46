//! Arrow layout of the `reference_passages` table.
//!
//! One row per corpus passage: id, source document, text, and the embedding
//! produced at index time, tagged with the embedding model name so query-time
//! embeddings can be checked against it.

use std::sync::Arc;

use arrow::array::{
    Array, FixedSizeListBuilder, Float32Array, Float32Builder,
    LargeStringArray, StringArray, TimestampNanosecondArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use limbguard_core::EvidencePassage;

use crate::StoreError;

pub const PASSAGES_TABLE: &str = "reference_passages";

/// Column LanceDB adds to vector-search results (L2 distance by default).
pub const DISTANCE_COLUMN: &str = "_distance";

/// A passage with its embedding, ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedPassage {
    pub passage_id: u32,
    pub source: String,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// Schema for the passage table with `dim`-wide embeddings.
pub fn passage_schema(dim: usize) -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("passage_id", DataType::UInt32, false),
        Field::new("source", DataType::Utf8, false),
        Field::new("text", DataType::Utf8, false),
        Field::new(
            "embedding",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                dim as i32,
            ),
            true,
        ),
        Field::new("embedding_model", DataType::Utf8, false),
        Field::new(
            "indexed_at",
            DataType::Timestamp(TimeUnit::Nanosecond, Some("UTC".into())),
            false,
        ),
    ]))
}

/// Build a RecordBatch from embedded passages.
///
/// Every embedding must be exactly `dim` wide.
pub fn passages_to_batch(
    passages: &[IndexedPassage],
    model_name: &str,
    dim: usize,
    indexed_at: DateTime<Utc>,
) -> Result<RecordBatch, StoreError> {
    if passages.is_empty() {
        return Err(StoreError::Empty);
    }

    let n = passages.len();
    let now_nanos = indexed_at.timestamp_nanos_opt().unwrap_or_default();

    let mut emb_builder = FixedSizeListBuilder::new(Float32Builder::new(), dim as i32);
    for passage in passages {
        if passage.embedding.len() != dim {
            return Err(StoreError::Schema(format!(
                "passage {} has {} embedding values, expected {dim}",
                passage.passage_id,
                passage.embedding.len()
            )));
        }
        let values = emb_builder.values();
        for &val in &passage.embedding {
            values.append_value(val);
        }
        emb_builder.append(true);
    }

    let ids = UInt32Array::from_iter_values(passages.iter().map(|p| p.passage_id));
    let sources = StringArray::from_iter_values(passages.iter().map(|p| p.source.as_str()));
    let texts = StringArray::from_iter_values(passages.iter().map(|p| p.text.as_str()));
    let models = StringArray::from(vec![model_name; n]);
    let indexed = TimestampNanosecondArray::from(vec![now_nanos; n]).with_timezone("UTC");

    let batch = RecordBatch::try_new(
        passage_schema(dim),
        vec![
            Arc::new(ids),
            Arc::new(sources),
            Arc::new(texts),
            Arc::new(emb_builder.finish()),
            Arc::new(models),
            Arc::new(indexed),
        ],
    )?;
    Ok(batch)
}

/// Embedding width declared by a passage-table schema.
pub fn embedding_dim(schema: &Schema) -> Result<usize, StoreError> {
    let field = schema
        .field_with_name("embedding")
        .map_err(|_| StoreError::Schema("missing 'embedding' column".into()))?;
    match field.data_type() {
        DataType::FixedSizeList(_, size) if *size > 0 => Ok(*size as usize),
        other => Err(StoreError::Schema(format!(
            "embedding column is {other:?}, expected FixedSizeList<Float32>"
        ))),
    }
}

/// Convert an L2 distance between unit vectors into cosine similarity.
pub fn distance_to_similarity(distance: f32) -> f32 {
    1.0 - distance / 2.0
}

/// Read vector-search results back into evidence passages.
///
/// Rows without a `_distance` column (plain scans) get a score of 0.
pub fn batch_to_evidence(batch: &RecordBatch) -> Result<Vec<EvidencePassage>, StoreError> {
    let text_col = batch
        .column_by_name("text")
        .ok_or_else(|| StoreError::Schema("missing 'text' column".into()))?;
    let source_col = batch
        .column_by_name("source")
        .ok_or_else(|| StoreError::Schema("missing 'source' column".into()))?;
    let distances = batch
        .column_by_name(DISTANCE_COLUMN)
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

    let mut passages = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let Some(text) = get_string(text_col.as_ref(), row) else {
            continue;
        };
        let source = get_string(source_col.as_ref(), row).unwrap_or_default();
        let score = distances
            .filter(|d| !d.is_null(row))
            .map(|d| distance_to_similarity(d.value(row)))
            .unwrap_or(0.0);
        passages.push(EvidencePassage {
            text,
            source,
            score,
        });
    }
    Ok(passages)
}

/// First recorded `embedding_model` value in a batch, if any.
pub fn recorded_model(batch: &RecordBatch) -> Option<String> {
    let col = batch.column_by_name("embedding_model")?;
    (0..batch.num_rows()).find_map(|row| get_string(col.as_ref(), row))
}

fn get_string(col: &dyn Array, row: usize) -> Option<String> {
    if col.is_null(row) {
        return None;
    }
    col.as_any()
        .downcast_ref::<StringArray>()
        .map(|arr| arr.value(row).to_string())
        .or_else(|| {
            col.as_any()
                .downcast_ref::<LargeStringArray>()
                .map(|arr| arr.value(row).to_string())
        })
}
