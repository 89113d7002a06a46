//! LanceDB storage for the reference-passage index.
//!
//! The index lives in a single table, `reference_passages`, written once by the
//! offline indexing pipeline and only read while serving.

use std::path::Path;

use arrow::array::RecordBatchIterator;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use limbguard_core::EvidencePassage;
use tracing::info;

use crate::StoreError;
use crate::passages::{
    IndexedPassage, PASSAGES_TABLE, batch_to_evidence, embedding_dim, passages_to_batch,
    recorded_model,
};

/// LanceDB store holding the `reference_passages` table.
pub struct PassageStore {
    db: lancedb::Connection,
}

impl PassageStore {
    /// Connect to a LanceDB database at the given path.
    ///
    /// Creates the database directory if it doesn't exist.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let uri = path
            .to_str()
            .ok_or_else(|| StoreError::Other("non-UTF8 database path".into()))?;
        let db = lancedb::connect(uri).execute().await?;
        Ok(Self { db })
    }

    /// Connect to an existing index without creating anything.
    ///
    /// Fails with [`StoreError::IndexNotFound`] when the directory is absent and
    /// [`StoreError::TableNotFound`] when it holds no passage table.
    pub async fn open_existing(path: &Path) -> Result<Self, StoreError> {
        if !path.is_dir() {
            return Err(StoreError::IndexNotFound(path.to_path_buf()));
        }
        let store = Self::open(path).await?;
        if !store.has_passages().await? {
            return Err(StoreError::TableNotFound(PASSAGES_TABLE.to_string()));
        }
        Ok(store)
    }

    /// Whether the passage table exists.
    pub async fn has_passages(&self) -> Result<bool, StoreError> {
        Ok(self.table_names().await?.iter().any(|n| n == PASSAGES_TABLE))
    }

    /// Open the `reference_passages` table.
    pub async fn passages(&self) -> Result<lancedb::Table, StoreError> {
        let table = self.db.open_table(PASSAGES_TABLE).execute().await?;
        Ok(table)
    }

    /// Count rows in the `reference_passages` table.
    pub async fn passage_count(&self) -> Result<usize, StoreError> {
        let table = self.passages().await?;
        let count = table.count_rows(None).await?;
        Ok(count)
    }

    /// Schema of the passage table.
    pub async fn schema(&self) -> Result<SchemaRef, StoreError> {
        let table = self.passages().await?;
        Ok(table.schema().await?)
    }

    /// Embedding width the index was built with.
    pub async fn embedding_dim(&self) -> Result<usize, StoreError> {
        let schema = self.schema().await?;
        embedding_dim(&schema)
    }

    /// Embedding model name recorded at index time, if any rows exist.
    pub async fn embedding_model(&self) -> Result<Option<String>, StoreError> {
        let table = self.passages().await?;
        let batches: Vec<RecordBatch> = table
            .query()
            .limit(1)
            .execute()
            .await?
            .try_collect()
            .await?;
        Ok(batches.iter().find_map(recorded_model))
    }

    /// Nearest `limit` passages to the query vector, closest first.
    pub async fn search(
        &self,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<EvidencePassage>, StoreError> {
        let table = self.passages().await?;
        search_table(&table, query_vector, limit).await
    }

    /// Open the passage table once for repeated searches.
    pub async fn reader(&self) -> Result<PassageReader, StoreError> {
        let table = self.passages().await?;
        let dim = embedding_dim(&table.schema().await?)?;
        let model = self.embedding_model().await?;
        Ok(PassageReader { table, dim, model })
    }

    /// List table names in the database.
    pub async fn table_names(&self) -> Result<Vec<String>, StoreError> {
        let names = self.db.table_names().execute().await?;
        Ok(names)
    }

    /// Create (or replace) the passage table.
    pub async fn write_passages(
        &self,
        passages: &[IndexedPassage],
        model_name: &str,
        dim: usize,
    ) -> Result<usize, StoreError> {
        let batch = passages_to_batch(passages, model_name, dim, Utc::now())?;
        let total_rows = batch.num_rows();
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);

        if self.has_passages().await? {
            self.db.drop_table(PASSAGES_TABLE, &[]).await?;
        }

        self.db
            .create_table(PASSAGES_TABLE, Box::new(reader))
            .execute()
            .await?;

        info!(
            table = PASSAGES_TABLE,
            rows = total_rows,
            model = model_name,
            dim,
            "created passage table"
        );
        Ok(total_rows)
    }
}

/// Read-only handle on an opened passage table, shared across requests.
#[derive(Clone)]
pub struct PassageReader {
    table: lancedb::Table,
    dim: usize,
    model: Option<String>,
}

impl PassageReader {
    /// Embedding width the index was built with.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Embedding model recorded at index time.
    pub fn embedding_model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Nearest `limit` passages to the query vector, closest first.
    pub async fn search(
        &self,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<EvidencePassage>, StoreError> {
        search_table(&self.table, query_vector, limit).await
    }
}

async fn search_table(
    table: &lancedb::Table,
    query_vector: &[f32],
    limit: usize,
) -> Result<Vec<EvidencePassage>, StoreError> {
    let results: Vec<RecordBatch> = table
        .vector_search(query_vector)?
        .limit(limit)
        .execute()
        .await?
        .try_collect()
        .await?;

    let mut passages = Vec::new();
    for batch in &results {
        passages.extend(batch_to_evidence(batch)?);
    }
    Ok(passages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn unit(dim: usize, axis: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[axis] = 1.0;
        v
    }

    fn corpus() -> Vec<IndexedPassage> {
        vec![
            IndexedPassage {
                passage_id: 0,
                source: "offloading.txt".into(),
                text: "Offloading reduces plantar pressure on the ulcer.".into(),
                embedding: unit(4, 0),
            },
            IndexedPassage {
                passage_id: 1,
                source: "infection.txt".into(),
                text: "Spreading erythema suggests deep infection.".into(),
                embedding: unit(4, 1),
            },
            IndexedPassage {
                passage_id: 2,
                source: "amputation.txt".into(),
                text: "Extensive gangrene may require amputation.".into(),
                embedding: unit(4, 2),
            },
        ]
    }

    #[tokio::test]
    async fn open_existing_missing_dir_errors() {
        let tmp = TempDir::new().unwrap();
        let result = PassageStore::open_existing(&tmp.path().join("absent")).await;
        assert!(matches!(result, Err(StoreError::IndexNotFound(_))));
    }

    #[tokio::test]
    async fn open_existing_without_table_errors() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("lancedb");
        PassageStore::open(&db_path).await.unwrap();
        std::fs::create_dir_all(&db_path).unwrap();

        let result = PassageStore::open_existing(&db_path).await;
        assert!(matches!(result, Err(StoreError::TableNotFound(_))));
    }

    #[tokio::test]
    async fn write_then_search_nearest_first() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("lancedb");
        let store = PassageStore::open(&db_path).await.unwrap();
        store.write_passages(&corpus(), "test-model", 4).await.unwrap();

        assert_eq!(store.passage_count().await.unwrap(), 3);
        assert_eq!(store.embedding_dim().await.unwrap(), 4);
        assert_eq!(
            store.embedding_model().await.unwrap().as_deref(),
            Some("test-model")
        );

        let hits = store.search(&[0.1, 0.9, 0.0, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].source, "infection.txt");
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn reader_caches_table_metadata() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("lancedb");
        let store = PassageStore::open(&db_path).await.unwrap();
        store.write_passages(&corpus(), "test-model", 4).await.unwrap();

        let reader = store.reader().await.unwrap();
        assert_eq!(reader.dim(), 4);
        assert_eq!(reader.embedding_model(), Some("test-model"));

        let hits = reader.search(&[0.0, 0.0, 1.0, 0.0], 1).await.unwrap();
        assert_eq!(hits[0].source, "amputation.txt");
    }

    #[tokio::test]
    async fn rewrite_replaces_table() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("lancedb");
        let store = PassageStore::open(&db_path).await.unwrap();

        store.write_passages(&corpus(), "m", 4).await.unwrap();
        store.write_passages(&corpus()[..1], "m", 4).await.unwrap();

        assert_eq!(store.passage_count().await.unwrap(), 1);
        let reopened = PassageStore::open_existing(&db_path).await.unwrap();
        assert_eq!(reopened.passage_count().await.unwrap(), 1);
    }
}
