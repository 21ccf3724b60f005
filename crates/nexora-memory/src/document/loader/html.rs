use std::path::Path;
use std::pin::Pin;

use super::super::{DEFAULT_MAX_FILE_SIZE, DocumentError};
use super::{DocumentLoader, LoadedDocument};
use crate::types::SourceType;

/// Elements whose text never reaches the reader.
const HIDDEN: &[&str] = &["script", "style", "noscript", "template"];

pub struct HtmlLoader {
    pub max_file_size: u64,
}

impl Default for HtmlLoader {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl DocumentLoader for HtmlLoader {
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
            let html = String::from_utf8(bytes).map_err(|_| DocumentError::InvalidUtf8)?;
            let content = tokio::task::spawn_blocking(move || html_to_text(&html))
                .await
                .map_err(|e| DocumentError::Io(std::io::Error::other(e)))??;

            Ok(LoadedDocument {
                content,
                source: path.display().to_string(),
                source_type: SourceType::Web,
                content_type: "text/html",
            })
        })
    }

    fn supported_extensions(&self) -> &[&str] {
        &["html", "htm"]
    }
}

fn select_text(soup: &scrape_core::Soup, selector: &str) -> Result<Vec<String>, DocumentError> {
    let tags = soup
        .find_all(selector)
        .map_err(|e| DocumentError::Html(format!("selector {selector}: {e}")))?;
    Ok(tags.into_iter().map(|tag| tag.text()).collect())
}

/// Visible page text: the title followed by the body, with markup and hidden elements
/// removed and whitespace collapsed per line.
///
/// # Errors
///
/// Returns [`DocumentError::Html`] if the document cannot be queried.
pub fn html_to_text(html: &str) -> Result<String, DocumentError> {
    let soup = scrape_core::Soup::parse(html);

    let mut body = select_text(&soup, "body")?.join("\n");
    let from_root = body.trim().is_empty();
    if from_root {
        body = select_text(&soup, "html")?.join("\n");
    }
    for hidden in HIDDEN {
        for text in select_text(&soup, hidden)? {
            if !text.trim().is_empty() {
                body = body.replacen(&text, "\n", 1);
            }
        }
    }

    let mut lines: Vec<String> = Vec::new();
    if let Some(title) = select_text(&soup, "title")?.into_iter().next() {
        let title = title.split_whitespace().collect::<Vec<_>>().join(" ");
        if !title.is_empty() {
            if from_root {
                body = body.replacen(&title, "", 1);
            }
            lines.push(title);
        }
    }
    lines.extend(
        body.lines()
            .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|line| !line.is_empty()),
    );
    Ok(lines.join("\n"))
}
