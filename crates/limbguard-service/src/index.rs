//! LanceDB passage table as a [`PassageIndex`].

use async_trait::async_trait;
use limbguard_ai::PassageIndex;
use limbguard_core::EvidencePassage;
use limbguard_store::PassageReader;

pub struct LanceIndex {
    reader: PassageReader,
}

impl LanceIndex {
    pub fn new(reader: PassageReader) -> Self {
        Self { reader }
    }
}

#[async_trait]
impl PassageIndex for LanceIndex {
    fn dim(&self) -> usize {
        self.reader.dim()
    }

    fn embedding_model(&self) -> Option<&str> {
        self.reader.embedding_model()
    }

    async fn search(&self, query: &[f32], limit: usize) -> anyhow::Result<Vec<EvidencePassage>> {
        Ok(self.reader.search(query, limit).await?)
    }
}
