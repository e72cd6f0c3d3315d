//! Token-window chunking
//!
//! Text is split into windows of `window_size` tokens, consecutive windows
//! sharing `overlap` tokens. Counting happens in the embedding model's own
//! tokenizer so every window fits the model's input.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::providers::TokenizerProvider;
use crate::types::Chunk;

/// Sliding token-window chunker
#[derive(Clone)]
pub struct TokenChunker {
    tokenizer: Arc<dyn TokenizerProvider>,
    /// Tokens per window
    window_size: usize,
    /// Tokens shared by consecutive windows
    overlap: usize,
}

impl TokenChunker {
    /// Create a chunker; `overlap` must be smaller than `window_size`
    pub fn new(
        tokenizer: Arc<dyn TokenizerProvider>,
        window_size: usize,
        overlap: usize,
    ) -> Result<Self> {
        if window_size == 0 || overlap >= window_size {
            return Err(Error::Config(format!(
                "Invalid chunk window: size {}, overlap {}",
                window_size, overlap
            )));
        }

        Ok(Self {
            tokenizer,
            window_size,
            overlap,
        })
    }

    /// Split `text` into window texts
    ///
    /// Text of at most one window is returned whole, without a
    /// tokenize/detokenize round trip.
    pub fn chunk_text(&self, text: &str) -> Result<Vec<String>> {
        let tokens = self.tokenizer.encode(text)?;
        if tokens.len() <= self.window_size {
            return Ok(vec![text.to_string()]);
        }

        window_bounds(tokens.len(), self.window_size, self.overlap)
            .into_iter()
            .map(|(start, end)| self.tokenizer.decode(&tokens[start..end]))
            .collect()
    }

    /// Chunk one object's text into an ordered, gapless chunk sequence
    pub fn chunk_object(&self, key: &str, content_identity: &str, text: &str) -> Result<Vec<Chunk>> {
        let texts = self.chunk_text(text)?;
        tracing::debug!("Chunked {} into {} windows", key, texts.len());
        Ok(Chunk::sequence(key, content_identity, texts))
    }
}

/// `[start, end)` token ranges covering `token_count` tokens
///
/// Starts advance by `window_size - overlap`; the last window is the first
/// one reaching the end, so no window lies wholly inside its predecessor.
fn window_bounds(token_count: usize, window_size: usize, overlap: usize) -> Vec<(usize, usize)> {
    let step = window_size - overlap;
    let mut bounds = Vec::new();
    let mut start = 0;

    loop {
        let end = (start + window_size).min(token_count);
        bounds.push((start, end));
        if end >= token_count {
            break;
        }
        start += step;
    }

    bounds
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// One token per char
    struct CharTokenizer;

    impl TokenizerProvider for CharTokenizer {
        fn encode(&self, text: &str) -> Result<Vec<u32>> {
            Ok(text.chars().map(|c| c as u32).collect())
        }

        fn decode(&self, tokens: &[u32]) -> Result<String> {
            tokens
                .iter()
                .map(|&t| char::from_u32(t).ok_or_else(|| Error::tokenizer("bad token")))
                .collect()
        }

        fn name(&self) -> &str {
            "char"
        }
    }

    fn chunker(window: usize, overlap: usize) -> TokenChunker {
        TokenChunker::new(Arc::new(CharTokenizer), window, overlap).unwrap()
    }

    #[test]
    fn test_window_offsets() {
        let starts: Vec<usize> = window_bounds(2500, 1000, 200).iter().map(|b| b.0).collect();
        assert_eq!(starts, vec![0, 800, 1600]);
        assert_eq!(window_bounds(2500, 1000, 200).last(), Some(&(1600, 2500)));
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        let text = "short text";
        assert_eq!(chunker(100, 10).chunk_text(text).unwrap(), vec![text.to_string()]);
        assert_eq!(chunker(10, 2).chunk_text("exactly10!").unwrap().len(), 1);
    }

    #[test]
    fn test_consecutive_windows_share_overlap() {
        let text: String = ('a'..='z').collect();
        let chunks = chunker(10, 3).chunk_text(&text).unwrap();

        assert_eq!(chunks[0], "abcdefghij");
        assert_eq!(chunks[1], "hijklmnopq");
        for pair in chunks.windows(2) {
            let tail: String = pair[0].chars().rev().take(3).collect::<Vec<_>>().into_iter().rev().collect();
            assert!(pair[1].starts_with(&tail));
        }
        assert!(chunks.last().unwrap().ends_with('z'));
    }

    #[test]
    fn test_invalid_window_rejected() {
        assert!(TokenChunker::new(Arc::new(CharTokenizer), 0, 0).is_err());
        assert!(TokenChunker::new(Arc::new(CharTokenizer), 10, 10).is_err());
    }

    #[test]
    fn test_chunk_object_indexes() {
        let chunks = chunker(4, 1)
            .chunk_object("a.txt", "id1", "0123456789")
            .unwrap();
        let indexes: Vec<u32> = chunks.iter().map(|c| c.index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
        assert!(chunks.iter().all(|c| c.source_key == "a.txt" && c.content_identity == "id1"));
    }

    proptest! {
        #[test]
        fn prop_windows_cover_every_token(
            count in 1usize..5000,
            window in 1usize..600,
            overlap_frac in 0.0f64..1.0,
        ) {
            let overlap = ((window as f64) * overlap_frac) as usize;
            prop_assume!(overlap < window);
            let bounds = window_bounds(count, window, overlap);

            prop_assert_eq!(bounds[0].0, 0);
            prop_assert_eq!(bounds.last().unwrap().1, count);
            for &(start, end) in &bounds {
                prop_assert!(end - start <= window);
            }
            for pair in bounds.windows(2) {
                // no gap, and each window moves forward
                prop_assert!(pair[1].0 <= pair[0].1);
                prop_assert!(pair[1].0 > pair[0].0);
            }
        }
    }
}
