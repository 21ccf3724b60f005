//! Retrieval-augmented answering over tenant-scoped document corpora.
//!
//! [`RagService`] ties together the embedding service, the vector index, the model
//! registry, the answer pipeline and the session store. Front ends (HTTP gateway, CLI)
//! build one with [`bootstrap::build_service`] and call its operations.

pub mod bootstrap;
pub mod config;
pub mod embedder;
pub mod error;
pub mod ingest;
pub mod jobs;
pub mod pipeline;
pub mod prompt;
pub mod registry;
pub mod retriever;
pub mod retry;
pub mod rewrite;
pub mod service;
pub mod vault;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use error::{ErrorKind, RagError};
pub use jobs::{JobState, JobStatus};
pub use pipeline::{Answer, AskRequest};
pub use service::{PurgeReport, RagService, ServiceOptions, TenantStats};
