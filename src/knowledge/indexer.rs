// Document indexing: chunk, embed, store. A document moves through
// draft -> indexing -> published, or lands in error when embedding fails.

use std::sync::Arc;

use serde_json::json;

use crate::error::{DeskError, Result};
use crate::knowledge::chunker::{chunk_text, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::knowledge::embedding::EmbeddingProvider;
use crate::knowledge::models::{DocumentChunk, DocumentStatus, KnowledgeDocument};
use crate::knowledge::repository::KnowledgeRepository;
use crate::knowledge::stores::{ChunkRecord, VectorStore};

pub struct KnowledgeIndexer {
    repository: KnowledgeRepository,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl KnowledgeIndexer {
    pub fn new(
        repository: KnowledgeRepository,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            repository,
            embedder,
            store,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }

    pub fn with_chunking(mut self, chunk_size: usize, chunk_overlap: usize) -> Self {
        self.chunk_size = chunk_size;
        self.chunk_overlap = chunk_overlap;
        self
    }

    /// Index a document end to end. On embedding failure the document status
    /// becomes `error` and no chunks are written.
    pub async fn index_document(&self, document: &KnowledgeDocument) -> Result<Vec<DocumentChunk>> {
        self.repository.upsert(document).await?;
        self.repository
            .set_status(&document.id, DocumentStatus::Indexing)
            .await?;

        let chunks: Vec<DocumentChunk> =
            chunk_text(&document.content, self.chunk_size, self.chunk_overlap)
                .into_iter()
                .enumerate()
                .map(|(index, content)| DocumentChunk {
                    id: uuid::Uuid::new_v4().to_string(),
                    document_id: document.id.clone(),
                    content,
                    chunk_index: index,
                    metadata: json!({"chunk_index": index, "tags": document.tags}),
                })
                .collect();

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = match self.embedder.embed(&texts).await {
            Ok(embeddings) => embeddings,
            Err(e) => {
                self.repository
                    .set_status(&document.id, DocumentStatus::Error)
                    .await?;
                return Err(e);
            }
        };
        if embeddings.len() != chunks.len() {
            self.repository
                .set_status(&document.id, DocumentStatus::Error)
                .await?;
            return Err(DeskError::Embedding(format!(
                "embedder returned {} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        let records = chunks
            .iter()
            .zip(&embeddings)
            .map(|(chunk, embedding)| ChunkRecord {
                chunk_id: chunk.id.clone(),
                content: chunk.content.clone(),
                embedding: embedding.clone(),
                metadata: chunk.metadata.clone(),
            })
            .collect();
        self.store.store(&document.id, records).await?;

        self.repository
            .set_status(&document.id, DocumentStatus::Published)
            .await?;
        Ok(chunks)
    }

    /// Delete a document from both the relational store and the vector store.
    pub async fn delete_document(&self, document_id: &str) -> Result<()> {
        self.store.delete(document_id).await?;
        self.repository.delete(document_id).await?;
        Ok(())
    }
}
