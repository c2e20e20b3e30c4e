pub mod chunker;
pub mod indexer;
pub mod retrieve;
pub mod source;
pub mod store;

pub use chunker::{Chunker, ChunkerConfig};
pub use indexer::{IndexError, IndexRequest, Indexer};
pub use retrieve::{Retriever, format_context};
pub use source::{LocalSource, MemorySource, RepositorySource, SourceError};
pub use store::{MemoryVectorStore, ScoredChunk, StoreError, VectorStore};
