pub mod error;
pub mod loader;
pub mod splitter;

pub use error::DocumentError;
pub use loader::{DocumentLoader, HtmlLoader, LoadedDocument, TextLoader, html_to_text, loader_for};
pub use splitter::{SplitterConfig, SplitterError, TextSplitter, chunk};

#[cfg(feature = "docx")]
pub use loader::DocxLoader;
#[cfg(feature = "pdf")]
pub use loader::PdfLoader;

/// Default maximum file size: 50 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;
