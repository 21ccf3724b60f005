//! Embedding and generation provider abstraction.
//!
//! The retrieval pipeline treats embedding models and text generators as external
//! collaborators. This crate defines the [`Embedder`] and [`Generator`] seams and the
//! concrete backends selected by configuration at startup through [`any::AnyProvider`].

pub mod any;
pub mod error;
pub mod gemini;
pub mod hashing;
pub mod http;
#[cfg(feature = "mock")]
pub mod mock;
pub mod ollama;
pub mod openai;
pub mod provider;

pub use error::LlmError;
pub use provider::{Embedder, Generator, Message, Role};
