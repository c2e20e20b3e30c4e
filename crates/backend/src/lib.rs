pub mod diagnostics;
pub mod jobs;
pub mod service;

pub use diagnostics::{DiagnosticEntry, Diagnostics};
pub use jobs::{JobEvent, JobOutcome, JobRegistry, JobStatus, Subscription};
pub use service::{GenerationRequest, PoolStatus, Runtime, RuntimeComponents, ServiceError};
