//! HTTP surface over [`nexora_core::RagService`]: chat, ingestion, jobs, sessions and
//! tenant maintenance, behind bearer auth, per-IP rate limiting and a body size limit.
//!
//! The tenant of every `/v1` request comes from the `X-Tenant-Id` header.

mod error;
mod handlers;
mod router;
mod server;

pub use error::{ApiError, GatewayError};
pub use handlers::TENANT_HEADER;
pub use server::GatewayServer;
