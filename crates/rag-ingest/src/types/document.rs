//! Extraction output, chunks and the records handed to the vector store

use serde::{Deserialize, Serialize};

/// File types recognized by key suffix
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// PDF document (paginated)
    Pdf,
    /// Plain text file
    Txt,
    /// Markdown file
    Markdown,
    /// HTML document
    Html,
    /// Image (never vectorized)
    Image,
    /// Anything else
    Unknown,
}

impl FileType {
    /// Detect file type from extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "pdf" => Self::Pdf,
            "txt" | "text" => Self::Txt,
            "md" | "markdown" => Self::Markdown,
            "html" | "htm" => Self::Html,
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "bmp" | "tiff" | "tif" => Self::Image,
            _ => Self::Unknown,
        }
    }

    /// Detect file type from an object key's suffix
    ///
    /// Only the last path segment is considered, so `reports.v2/readme` has
    /// no extension.
    pub fn from_key(key: &str) -> Self {
        let name = key.rsplit('/').next().unwrap_or(key);
        match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => Self::from_extension(ext),
            _ => Self::Unknown,
        }
    }

    /// Whether text can be extracted from this type
    pub fn is_extractable(&self) -> bool {
        matches!(self, Self::Pdf | Self::Txt | Self::Markdown | Self::Html)
    }

    /// Get display name
    pub fn display_name(&self) -> &str {
        match self {
            Self::Pdf => "PDF",
            Self::Txt => "Text File",
            Self::Markdown => "Markdown",
            Self::Html => "HTML",
            Self::Image => "Image",
            Self::Unknown => "Unknown",
        }
    }
}

/// Text extracted from one object
#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    /// Page texts joined with a blank line
    pub full_text: String,
    /// Per-page text, in page order
    pub page_texts: Vec<String>,
    /// Pages in the source
    pub pages_total: u32,
    /// Pages actually read
    pub pages_read: u32,
    /// Size of the raw payload in bytes
    pub content_length: u64,
    /// MIME type of the raw payload
    pub content_type: String,
}

impl ExtractionResult {
    /// Build a result from page texts, joining them with a blank line
    pub fn from_pages(page_texts: Vec<String>, pages_total: u32) -> Self {
        let pages_read = page_texts.len() as u32;
        Self {
            full_text: page_texts.join("\n\n"),
            page_texts,
            pages_total,
            pages_read,
            content_length: 0,
            content_type: String::new(),
        }
    }

    /// Attach payload metadata
    pub fn with_source(mut self, content_length: u64, content_type: impl Into<String>) -> Self {
        self.content_length = content_length;
        self.content_type = content_type.into();
        self
    }

    /// Whether any non-whitespace text was extracted
    pub fn has_text(&self) -> bool {
        !self.full_text.trim().is_empty()
    }
}

/// A token window of one object's text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Key of the source object
    pub source_key: String,
    /// Content identity of the source object
    pub content_identity: String,
    /// Position within the object (0-based, no gaps)
    pub index: u32,
    /// Decoded window text
    pub text: String,
}

impl Chunk {
    /// Build the ordered chunks of one object from its window texts
    pub fn sequence(source_key: &str, content_identity: &str, texts: Vec<String>) -> Vec<Self> {
        texts
            .into_iter()
            .enumerate()
            .map(|(index, text)| Self {
                source_key: source_key.to_string(),
                content_identity: content_identity.to_string(),
                index: index as u32,
                text,
            })
            .collect()
    }

    /// External identity of the chunk (`key#index`)
    pub fn external_id(&self) -> String {
        format!("{}#{}", self.source_key, self.index)
    }
}

/// A chunk with its embedding, ready for insertion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedRecord {
    pub content_identity: String,
    pub source_key: String,
    pub chunk_index: u32,
    pub text: String,
    pub vector: Vec<f32>,
}

impl IndexedRecord {
    /// Pair a chunk with its embedding
    pub fn from_chunk(chunk: Chunk, vector: Vec<f32>) -> Self {
        Self {
            content_identity: chunk.content_identity,
            source_key: chunk.source_key,
            chunk_index: chunk.index,
            text: chunk.text,
            vector,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type_from_key() {
        assert_eq!(FileType::from_key("docs/report.PDF"), FileType::Pdf);
        assert_eq!(FileType::from_key("notes/todo.md"), FileType::Markdown);
        assert_eq!(FileType::from_key("site/index.htm"), FileType::Html);
        assert_eq!(FileType::from_key("scan.jpeg"), FileType::Image);
        assert_eq!(FileType::from_key("archive.tar.gz"), FileType::Unknown);
        assert_eq!(FileType::from_key("reports.v2/readme"), FileType::Unknown);
        assert_eq!(FileType::from_key(".pdf"), FileType::Unknown);
    }

    #[test]
    fn test_extractable_types() {
        assert!(FileType::Pdf.is_extractable());
        assert!(FileType::Txt.is_extractable());
        assert!(!FileType::Image.is_extractable());
        assert!(!FileType::Unknown.is_extractable());
    }

    #[test]
    fn test_extraction_result_joins_pages() {
        let result = ExtractionResult::from_pages(vec!["one".into(), "two".into()], 3);
        assert_eq!(result.full_text, "one\n\ntwo");
        assert_eq!(result.pages_read, 2);
        assert_eq!(result.pages_total, 3);
        assert!(result.has_text());
    }

    #[test]
    fn test_chunk_sequence_is_gapless() {
        let chunks = Chunk::sequence("a.pdf", "etag1", vec!["x".into(), "y".into(), "z".into()]);
        let indexes: Vec<u32> = chunks.iter().map(|c| c.index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
        assert!(chunks.iter().all(|c| c.content_identity == "etag1"));
        assert_eq!(chunks[2].external_id(), "a.pdf#2");
    }
}
