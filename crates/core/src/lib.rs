pub mod batch;
pub mod chunk;
pub mod config;
pub mod credentials;
pub mod failure;
pub mod progress;
pub mod rate_limit;

pub use batch::run_bounded;
pub use chunk::{CHARS_PER_TOKEN, Chunk, FetchedRepository, RepoRef, SourceFile, estimate_tokens};
pub use config::{ChatProviderKind, Config, ConfigError, EmbeddingProviderKind};
pub use credentials::{AcquiredCredential, CredentialEntry, CredentialPool, PoolError, PoolRegistry};
pub use failure::{FailureKind, classify};
pub use progress::{IndexMetadata, IndexProgress};
pub use rate_limit::{Allowance, BudgetGate, TokenBudgetLimiter};
