pub mod backend;
pub mod gemini;
pub mod ollama;
pub mod openai;
pub mod pooled;
pub mod provider;

pub use backend::EmbeddingBackend;
pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use pooled::{PooledEmbedder, RetryPolicy};
pub use provider::{EmbeddingError, EmbeddingMode, EmbeddingProvider, Embeddings};
