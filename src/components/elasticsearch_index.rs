//! Search index generation with its ingest pipeline.

use super::Component;
use crate::elasticsearch::SearchIndexManager;
use crate::error::Result;
use async_trait::async_trait;

pub struct ElasticsearchIndex {
    manager: SearchIndexManager,
}

impl ElasticsearchIndex {
    pub fn new(manager: SearchIndexManager) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl Component for ElasticsearchIndex {
    fn kind(&self) -> &'static str {
        "ElasticsearchIndex"
    }

    fn name(&self, version: &str) -> String {
        self.manager.es_index_name(version)
    }

    /// The index names the pipeline as its default, so the pipeline goes first.
    async fn create(&self, version: &str) -> Result<()> {
        self.manager.create_pipeline(version).await?;
        if self.manager.index_exists(&self.name(version)).await? {
            return Ok(());
        }
        self.manager.create_index(version).await
    }

    async fn delete(&self, version: &str) -> Result<()> {
        self.manager.delete_index(version).await?;
        self.manager.delete_pipeline(version).await
    }

    /// An index without its ingest pipeline would reject writes, so both must exist.
    async fn exists(&self, version: &str) -> Result<bool> {
        Ok(self.manager.index_exists(&self.name(version)).await? && self.manager.pipeline_exists(version).await?)
    }
}
