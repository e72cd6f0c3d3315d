//! Format-gated text extraction
//!
//! PDFs are read page by page with lopdf; plain text and markdown are decoded
//! lossily; HTML is reduced to its body text. Everything else is rejected
//! with `Error::UnsupportedFileType` before any bytes are downloaded.

use lopdf::Document;

use crate::error::{Error, Result};
use crate::types::{ExtractionResult, FileType};

/// Glyph names some PDF fonts leak into extracted text
const GLYPH_NAMES: &[(&str, char)] = &[
    ("uni2010", '-'),
    ("uni2011", '-'),
    ("uni2013", '-'),
    ("uni2018", '\''),
    ("uni2019", '\''),
    ("uni201C", '"'),
    ("uni201D", '"'),
    ("uni2022", '*'),
    ("uni00A0", ' '),
];

/// Clean up one page of PDF text
fn cleanup_pdf_text(text: &str) -> String {
    let mut result = text.replace('\0', "");

    for (glyph_name, replacement) in GLYPH_NAMES {
        if result.contains(glyph_name) {
            result = result.replace(glyph_name, &replacement.to_string());
        }
    }

    result = result
        .replace('\u{2010}', "-")
        .replace('\u{2011}', "-")
        .replace('\u{2013}', "-")
        .replace('\u{2018}', "'")
        .replace('\u{2019}', "'")
        .replace('\u{201C}', "\"")
        .replace('\u{201D}', "\"")
        .replace('\u{00A0}', " ")
        .replace('\u{FB01}', "fi")
        .replace('\u{FB02}', "fl")
        .replace('\u{FB00}', "ff");

    result
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Turns object bytes into text
#[derive(Debug, Clone, Default)]
pub struct ContentExtractor {
    /// Page cap for paginated formats
    max_pages: Option<u32>,
}

impl ContentExtractor {
    /// Create an extractor, optionally capping pages read per document
    pub fn new(max_pages: Option<u32>) -> Self {
        Self { max_pages }
    }

    /// Whether the key's format is one this extractor handles
    pub fn supports(key: &str) -> bool {
        FileType::from_key(key).is_extractable()
    }

    /// Extract text from `data`, dispatching on the key's extension
    pub fn extract(&self, key: &str, data: &[u8]) -> Result<ExtractionResult> {
        let file_type = FileType::from_key(key);

        let result = match file_type {
            FileType::Pdf => self.extract_pdf(key, data)?,
            FileType::Txt | FileType::Markdown => Self::extract_text(data),
            FileType::Html => Self::extract_html(data),
            FileType::Image | FileType::Unknown => {
                return Err(Error::UnsupportedFileType(key.to_string()))
            }
        };

        tracing::debug!(
            "Extracted {} chars from {} ({}, {}/{} pages)",
            result.full_text.len(),
            key,
            file_type.display_name(),
            result.pages_read,
            result.pages_total
        );

        let content_type = mime_guess::from_path(key).first_or_octet_stream().to_string();
        Ok(result.with_source(data.len() as u64, content_type))
    }

    /// Read PDF pages in order, up to the page cap
    ///
    /// A page whose text cannot be extracted is skipped. The document fails
    /// only when it cannot be opened or no page at all is readable.
    fn extract_pdf(&self, key: &str, data: &[u8]) -> Result<ExtractionResult> {
        let mut doc = Document::load_mem(data)
            .map_err(|e| Error::file_parse(key, format!("Failed to load PDF: {}", e)))?;

        if doc.is_encrypted() {
            // Owner-password-only PDFs open with the empty user password
            if let Err(e) = doc.decrypt("") {
                tracing::warn!("Could not decrypt {} with empty password: {}", key, e);
            }
        }

        let pages = doc.get_pages();
        let pages_total = pages.len() as u32;
        let limit = self.max_pages.map(|m| m as usize).unwrap_or(usize::MAX);

        let mut page_texts = Vec::new();
        let mut unreadable = 0usize;

        for &page_number in pages.keys().take(limit) {
            match doc.extract_text(&[page_number]) {
                Ok(text) => page_texts.push(cleanup_pdf_text(&text)),
                Err(e) => {
                    unreadable += 1;
                    tracing::warn!("Skipping unreadable page {} of {}: {}", page_number, key, e);
                }
            }
        }

        if page_texts.is_empty() && unreadable > 0 {
            return Err(Error::file_parse(key, "No readable pages"));
        }

        Ok(ExtractionResult::from_pages(page_texts, pages_total))
    }

    fn extract_text(data: &[u8]) -> ExtractionResult {
        let content = String::from_utf8_lossy(data).to_string();
        ExtractionResult::from_pages(vec![content], 1)
    }

    /// Body text of an HTML document, whitespace-joined
    fn extract_html(data: &[u8]) -> ExtractionResult {
        let html = String::from_utf8_lossy(data);
        let document = scraper::Html::parse_document(&html);

        let mut content = String::new();
        if let Ok(body_selector) = scraper::Selector::parse("body") {
            if let Some(body) = document.select(&body_selector).next() {
                for text in body.text() {
                    let trimmed = text.trim();
                    if !trimmed.is_empty() {
                        if !content.is_empty() {
                            content.push(' ');
                        }
                        content.push_str(trimmed);
                    }
                }
            }
        }

        ExtractionResult::from_pages(vec![content], 1)
    }
}
