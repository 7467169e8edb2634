// Knowledge pipeline: chunking, embedding, indexing, and retrieval over a
// pluggable vector store.

pub mod chunker;
pub mod embedding;
pub mod indexer;
pub mod models;
pub mod repository;
pub mod retriever;
pub mod stores;

pub use chunker::chunk_text;
pub use embedding::EmbeddingProvider;
pub use indexer::KnowledgeIndexer;
pub use models::{DocumentChunk, DocumentStatus, DocumentType, KnowledgeDocument, RetrievalResult};
pub use repository::KnowledgeRepository;
pub use retriever::KnowledgeRetriever;
pub use stores::{VectorSearchResult, VectorStore};
