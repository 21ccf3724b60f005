use std::path::Path;
use std::pin::Pin;

use super::super::{DEFAULT_MAX_FILE_SIZE, DocumentError};
use super::{DocumentLoader, LoadedDocument};
use crate::types::SourceType;

pub struct TextLoader {
    pub max_file_size: u64,
}

impl Default for TextLoader {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl DocumentLoader for TextLoader {
    fn load(
        &self,
        path: &Path,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<LoadedDocument, DocumentError>> + Send + '_>>
    {
        let path = path.to_path_buf();
        let max_size = self.max_file_size;
        Box::pin(async move {
            let path = tokio::fs::canonicalize(&path).await?;

            let meta = tokio::fs::metadata(&path).await?;
            if meta.len() > max_size {
                return Err(DocumentError::FileTooLarge(meta.len()));
            }

            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_ascii_lowercase)
                .unwrap_or_default();
            let content_type = match ext.as_str() {
                "md" | "markdown" => "text/markdown",
                _ => "text/plain",
            };

            let bytes = tokio::fs::read(&path).await?;
            let content = String::from_utf8(bytes).map_err(|_| DocumentError::InvalidUtf8)?;

            Ok(LoadedDocument {
                content,
                source: path.display().to_string(),
                source_type: SourceType::Text,
                content_type,
            })
        })
    }

    fn supported_extensions(&self) -> &[&str] {
        &["txt", "md", "markdown"]
    }
}
