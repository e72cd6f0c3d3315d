//! Tokenizer seam used by the chunker

use std::path::Path;
use tokenizers::Tokenizer;

use crate::error::{Error, Result};

/// Trait for the embedding model's tokenizer
///
/// `decode(encode(text))` need not reproduce `text` byte for byte, but token
/// counts must match what the embedding model sees.
pub trait TokenizerProvider: Send + Sync {
    /// Encode text to token IDs (no special tokens)
    fn encode(&self, text: &str) -> Result<Vec<u32>>;

    /// Decode token IDs to text, skipping special tokens
    fn decode(&self, tokens: &[u32]) -> Result<String>;

    /// Get tokenizer name for logging
    fn name(&self) -> &str;
}

/// HuggingFace tokenizer loaded from a `tokenizer.json`
pub struct HfTokenizer {
    inner: Tokenizer,
}

impl HfTokenizer {
    /// Load from a `tokenizer.json` file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let inner = Tokenizer::from_file(path).map_err(|e| {
            Error::tokenizer(format!("Failed to load tokenizer {}: {}", path.display(), e))
        })?;
        Ok(Self { inner })
    }
}

impl TokenizerProvider for HfTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| Error::tokenizer(format!("Encoding failed: {}", e)))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, tokens: &[u32]) -> Result<String> {
        self.inner
            .decode(tokens, true)
            .map_err(|e| Error::tokenizer(format!("Decoding failed: {}", e)))
    }

    fn name(&self) -> &str {
        "huggingface"
    }
}
