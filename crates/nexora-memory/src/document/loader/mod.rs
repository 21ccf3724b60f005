use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use crate::types::SourceType;

use super::DocumentError;

#[cfg(feature = "docx")]
mod docx;
mod html;
#[cfg(feature = "pdf")]
mod pdf;
mod text;

#[cfg(feature = "docx")]
pub use docx::DocxLoader;
pub use html::{HtmlLoader, html_to_text};
#[cfg(feature = "pdf")]
pub use pdf::PdfLoader;
pub use text::TextLoader;

/// Plain text extracted from a file, ready for chunking.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub content: String,
    pub source: String,
    pub source_type: SourceType,
    pub content_type: &'static str,
}

pub trait DocumentLoader: Send + Sync {
    fn load(
        &self,
        path: &Path,
    ) -> Pin<Box<dyn Future<Output = Result<LoadedDocument, DocumentError>> + Send + '_>>;

    fn supported_extensions(&self) -> &[&str];
}

/// Select a loader by file extension.
///
/// # Errors
///
/// Returns [`DocumentError::UnsupportedFormat`] when no loader handles the extension.
pub fn loader_for(path: &Path) -> Result<Box<dyn DocumentLoader>, DocumentError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let text = TextLoader::default();
    if text.supported_extensions().contains(&ext.as_str()) {
        return Ok(Box::new(text));
    }

    let html = HtmlLoader::default();
    if html.supported_extensions().contains(&ext.as_str()) {
        return Ok(Box::new(html));
    }

    #[cfg(feature = "pdf")]
    {
        let pdf = PdfLoader::default();
        if pdf.supported_extensions().contains(&ext.as_str()) {
            return Ok(Box::new(pdf));
        }
    }

    #[cfg(feature = "docx")]
    {
        let docx = DocxLoader::default();
        if docx.supported_extensions().contains(&ext.as_str()) {
            return Ok(Box::new(docx));
        }
    }

    Err(DocumentError::UnsupportedFormat(if ext.is_empty() {
        path.display().to_string()
    } else {
        ext
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_loader_case_insensitively() {
        assert!(loader_for(Path::new("notes.MD")).is_ok());
        assert!(loader_for(Path::new("page.HTML")).is_ok());
    }

    #[test]
    fn html_is_not_loaded_as_plain_text() {
        assert!(!TextLoader::default().supported_extensions().contains(&"html"));
        let loader = loader_for(Path::new("page.htm")).unwrap();
        assert_eq!(loader.supported_extensions(), &["html", "htm"]);
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let Err(err) = loader_for(Path::new("archive.zip")) else {
            panic!("expected unsupported format");
        };
        assert!(matches!(err, DocumentError::UnsupportedFormat(ext) if ext == "zip"));
    }

    #[cfg(not(feature = "pdf"))]
    #[test]
    fn pdf_requires_feature() {
        assert!(loader_for(Path::new("paper.pdf")).is_err());
    }

    #[cfg(not(feature = "docx"))]
    #[test]
    fn docx_requires_feature() {
        assert!(loader_for(Path::new("report.docx")).is_err());
    }

    #[cfg(feature = "docx")]
    #[test]
    fn selects_docx_loader() {
        let loader = loader_for(Path::new("report.DOCX")).unwrap();
        assert_eq!(loader.supported_extensions(), &["docx"]);
    }
}
