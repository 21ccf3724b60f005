use std::io::Read;
use std::path::Path;
use std::pin::Pin;

use quick_xml::events::Event;

use super::super::{DEFAULT_MAX_FILE_SIZE, DocumentError};
use super::{DocumentLoader, LoadedDocument};
use crate::types::SourceType;

const DOCUMENT_PART: &str = "word/document.xml";

pub struct DocxLoader {
    pub max_file_size: u64,
}

impl Default for DocxLoader {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl DocumentLoader for DocxLoader {
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

            let bytes = tokio::fs::read(&path).await?;
            let content = tokio::task::spawn_blocking(move || extract_text(&bytes, max_size))
                .await
                .map_err(|e| DocumentError::Io(std::io::Error::other(e)))??;

            Ok(LoadedDocument {
                content,
                source: path.display().to_string(),
                source_type: SourceType::Docx,
                content_type: "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            })
        })
    }

    fn supported_extensions(&self) -> &[&str] {
        &["docx"]
    }
}

fn docx_error(e: impl std::fmt::Display) -> DocumentError {
    DocumentError::Docx(e.to_string())
}

/// Paragraph text of a Word document, one paragraph per line.
///
/// The decompressed document part is capped at `max_part_size` bytes.
fn extract_text(bytes: &[u8], max_part_size: u64) -> Result<String, DocumentError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(docx_error)?;
    let part = archive.by_name(DOCUMENT_PART).map_err(docx_error)?;

    let mut xml = Vec::new();
    part.take(max_part_size.saturating_add(1))
        .read_to_end(&mut xml)
        .map_err(docx_error)?;
    let size = u64::try_from(xml.len()).unwrap_or(u64::MAX);
    if size > max_part_size {
        return Err(DocumentError::FileTooLarge(size));
    }

    paragraphs(&xml)
}

fn paragraphs(xml: &[u8]) -> Result<String, DocumentError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut out = String::new();
    let mut line = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf).map_err(docx_error)? {
            Event::Start(e) if e.local_name().as_ref() == b"t" => in_text = true,
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    let trimmed = line.trim();
                    if !trimmed.is_empty() {
                        if !out.is_empty() {
                            out.push('\n');
                        }
                        out.push_str(trimmed);
                    }
                    line.clear();
                }
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"tab" => line.push('\t'),
                b"br" => line.push(' '),
                _ => {}
            },
            Event::Text(t) if in_text => line.push_str(&t.unescape().map_err(docx_error)?),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const BODY: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
<w:body>
<w:p><w:r><w:t>Python is a </w:t></w:r><w:r><w:t xml:space="preserve">language &amp; runtime.</w:t></w:r></w:p>
<w:p><w:r><w:t>It was created in 1991.</w:t></w:r></w:p>
<w:p></w:p>
</w:body>
</w:document>"#;

    fn docx_bytes(document_xml: &str) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        writer
            .start_file(DOCUMENT_PART, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(document_xml.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn paragraphs_become_lines() {
        let text = extract_text(&docx_bytes(BODY), DEFAULT_MAX_FILE_SIZE).unwrap();
        assert_eq!(
            text,
            "Python is a language & runtime.\nIt was created in 1991."
        );
    }

    #[test]
    fn oversized_document_part_is_rejected() {
        let result = extract_text(&docx_bytes(BODY), 16);
        assert!(matches!(result, Err(DocumentError::FileTooLarge(17))));
    }

    #[test]
    fn missing_document_part_is_reported() {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        writer
            .start_file("word/styles.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        assert!(matches!(
            extract_text(&bytes, DEFAULT_MAX_FILE_SIZE),
            Err(DocumentError::Docx(_))
        ));
    }

    #[tokio::test]
    async fn load_docx_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("notes.docx");
        std::fs::write(&file, docx_bytes(BODY)).unwrap();

        let doc = DocxLoader::default().load(&file).await.unwrap();
        assert_eq!(doc.source_type, SourceType::Docx);
        assert!(doc.content.starts_with("Python is a language"));
    }

    #[tokio::test]
    async fn invalid_docx_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("broken.docx");
        std::fs::write(&file, b"not a zip").unwrap();

        let result = DocxLoader::default().load(&file).await;
        assert!(matches!(result, Err(DocumentError::Docx(_))));
    }
}
