//! Storage side of the retrieval pipeline: chunking, tenant-scoped vector index
//! backends and the SQLite session store.

pub mod document;
pub mod error;
pub mod in_memory_index;
pub mod qdrant;
pub mod sqlite;
pub mod sqlite_index;
pub mod types;
pub mod vector_index;

pub use error::MemoryError;
pub use in_memory_index::InMemoryIndex;
pub use qdrant::QdrantIndex;
pub use sqlite::{RegisteredModel, SqliteStore};
pub use sqlite_index::SqliteIndex;
pub use types::{
    ChatMessage, ChatSession, Chunk, MessageRole, ScoredChunk, SessionId, SourceType, TenantId,
};
pub use vector_index::{VectorIndex, VectorIndexError};
