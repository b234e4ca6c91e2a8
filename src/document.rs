use crate::error::{RagError, Result};
use log::{debug, info, warn};
use mime_guess::from_path;
use pdf_extract::extract_text_from_mem;
use std::fs;
use std::path::Path;

/// Represents a document with its content and metadata
#[derive(Debug, Clone)]
pub struct Document {
    /// The extracted text content of the document
    pub content: String,
    /// The document's file name, or a label for pasted text
    pub document_id: String,
    /// The document's MIME type
    pub mime_type: String,
}

impl Document {
    /// Create a document from text pasted by the user
    pub fn from_text(document_id: &str, text: &str) -> Result<Self> {
        let content = text.trim().to_string();
        if content.is_empty() {
            return Err(RagError::Ingestion("pasted text is empty".into()));
        }

        Ok(Document {
            content,
            document_id: document_id.to_string(),
            mime_type: "text/plain".to_string(),
        })
    }

    /// Create a new document from a file path
    pub fn from_file<P: AsRef<Path>>(file_path: P) -> Result<Self> {
        let path = file_path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| RagError::Ingestion(format!("Invalid file name: {}", path.display())))?;

        let bytes = fs::read(path).map_err(|e| {
            RagError::Ingestion(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Self::from_bytes(file_name, &bytes)
    }

    /// Create a document from uploaded file bytes; the name decides the format
    pub fn from_bytes(file_name: &str, bytes: &[u8]) -> Result<Self> {
        let mime = from_path(file_name).first_or_octet_stream();
        let mime_type = mime.to_string();
        debug!("Detected MIME type: {}", mime_type);

        let content = read_document_content(file_name, bytes, &mime_type)?;
        if content.trim().is_empty() {
            return Err(RagError::Ingestion(format!(
                "No text could be extracted from {}",
                file_name
            )));
        }

        Ok(Document {
            content,
            document_id: file_name.to_string(),
            mime_type,
        })
    }

    /// The first `chars` characters of the content
    pub fn preview(&self, chars: usize) -> &str {
        let end = self
            .content
            .char_indices()
            .nth(chars)
            .map(|(i, _)| i)
            .unwrap_or(self.content.len());
        &self.content[..end]
    }
}

/// Extract text from a document based on its MIME type
fn read_document_content(file_name: &str, bytes: &[u8], mime_type: &str) -> Result<String> {
    match mime_type {
        mime if mime.starts_with("application/pdf") => {
            info!("Processing PDF document: {}", file_name);
            let content = extract_text_from_mem(bytes).map_err(|e| {
                RagError::Ingestion(format!("Failed to extract text from PDF {}: {}", file_name, e))
            })?;

            // PDF extraction can sometimes include excessive whitespace
            let cleaned_content = normalize_whitespace(&content);

            if cleaned_content.is_empty() {
                warn!("Extracted PDF content is empty or contains only whitespace");
            }

            Ok(cleaned_content)
        }

        mime if mime.starts_with("text/") => {
            info!("Processing text document: {}", file_name);
            String::from_utf8(bytes.to_vec()).map_err(|e| {
                RagError::Ingestion(format!("{} is not valid UTF-8: {}", file_name, e))
            })
        }

        _ => Err(RagError::Ingestion(format!(
            "Unsupported document format: {}. Only text and PDF files are supported.",
            mime_type
        ))),
    }
}

/// Normalize whitespace in text (remove multiple consecutive spaces, newlines, etc.)
fn normalize_whitespace(text: &str) -> String {
    let result = text.replace('\r', "");

    // Collapse newline runs to at most a paragraph break
    let mut prev_char = ' ';
    let mut newline_count = 0;
    let mut normalized = String::with_capacity(result.len());

    for c in result.chars() {
        if c == '\n' {
            newline_count += 1;
        } else {
            if newline_count > 0 {
                if newline_count >= 2 {
                    normalized.push_str("\n\n");
                } else {
                    normalized.push('\n');
                }
                newline_count = 0;
            }

            if !(c == ' ' && prev_char == ' ') {
                normalized.push(c);
            }

            prev_char = c;
        }
    }

    normalized.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_whitespace() {
        let text = "This  has   multiple    spaces.\n\n\nAnd multiple newlines.\r\nAnd Windows line endings.";
        let expected =
            "This has multiple spaces.\n\nAnd multiple newlines.\nAnd Windows line endings.";
        assert_eq!(normalize_whitespace(text), expected);
    }

    #[test]
    fn test_from_text_rejects_blank_input() {
        assert!(matches!(
            Document::from_text("pasted", "   \n "),
            Err(RagError::Ingestion(_))
        ));
    }

    #[test]
    fn test_from_bytes_reads_plain_text() {
        let document = Document::from_bytes("notes.txt", b"The sky is blue.").unwrap();
        assert_eq!(document.content, "The sky is blue.");
        assert_eq!(document.document_id, "notes.txt");
        assert!(document.mime_type.starts_with("text/"));
    }

    #[test]
    fn test_from_bytes_rejects_unknown_format() {
        let err = Document::from_bytes("image.png", &[0x89, 0x50, 0x4e, 0x47]).unwrap_err();
        assert!(matches!(err, RagError::Ingestion(_)));
    }

    #[test]
    fn test_from_bytes_rejects_broken_pdf() {
        let err = Document::from_bytes("report.pdf", b"not a pdf").unwrap_err();
        assert!(matches!(err, RagError::Ingestion(_)));
    }

    #[test]
    fn test_preview_respects_char_boundaries() {
        let document = Document::from_text("pasted", "héllo world").unwrap();
        assert_eq!(document.preview(2), "hé");
        assert_eq!(document.preview(100), "héllo world");
    }
}
