//! Service layer.
//!
//! - [`Runtime`] - shared pools, limiter, job registry and backends
//! - index jobs - [`Runtime::start_index`]
//! - generation jobs - [`Runtime::start_generation`]

mod error;
mod generate;
mod index;
mod runtime;

pub use error::ServiceError;
pub use generate::GenerationRequest;
pub use runtime::{PoolStatus, Runtime, RuntimeComponents};

#[cfg(test)]
mod __tests__;
