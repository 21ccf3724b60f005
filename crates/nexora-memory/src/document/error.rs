#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("file too large: {0} bytes")]
    FileTooLarge(u64),

    #[error("file is not valid UTF-8 text")]
    InvalidUtf8,

    #[error("HTML error: {0}")]
    Html(String),

    #[cfg(feature = "pdf")]
    #[error("PDF error: {0}")]
    Pdf(String),

    #[cfg(feature = "docx")]
    #[error("DOCX error: {0}")]
    Docx(String),
}
