// Semantic retrieval: embed the query, search the vector store, join each
// hit to its document title.

use std::sync::Arc;

use crate::error::Result;
use crate::knowledge::embedding::EmbeddingProvider;
use crate::knowledge::models::{DocumentChunk, RetrievalResult};
use crate::knowledge::repository::KnowledgeRepository;
use crate::knowledge::stores::VectorStore;

pub struct KnowledgeRetriever {
    repository: KnowledgeRepository,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
}

impl KnowledgeRetriever {
    pub fn new(
        repository: KnowledgeRepository,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            repository,
            embedder,
            store,
        }
    }

    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievalResult>> {
        self.retrieve_filtered(query, top_k, None).await
    }

    pub async fn retrieve_filtered(
        &self,
        query: &str,
        top_k: usize,
        tag_filter: Option<&[String]>,
    ) -> Result<Vec<RetrievalResult>> {
        let embeddings = self.embedder.embed(&[query.to_string()]).await?;
        let Some(query_embedding) = embeddings.first() else {
            return Ok(Vec::new());
        };

        let hits = self.store.search(query_embedding, top_k, tag_filter).await?;

        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            let title = self
                .repository
                .title_of(&hit.document_id)
                .await?
                .unwrap_or_else(|| "Unknown".to_string());
            results.push(RetrievalResult {
                chunk: DocumentChunk {
                    id: hit.chunk_id,
                    document_id: hit.document_id,
                    content: hit.content,
                    chunk_index: hit.chunk_index,
                    metadata: hit.metadata,
                },
                score: hit.score,
                document_title: title,
            });
        }
        Ok(results)
    }
}
