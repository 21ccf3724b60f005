//! Boundary-aware sliding-window chunker.
//!
//! Windows are measured in characters. Each cut prefers, in order, a paragraph break,
//! a sentence end, then any whitespace in the second half of the window, and falls back
//! to a hard cut at `chunk_size`. The next window starts exactly `chunk_overlap`
//! characters before the previous cut, so dropping the first `chunk_overlap`
//! characters of every chunk after the first and concatenating reproduces the input.

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SplitterError {
    #[error("chunk_size must be positive")]
    ZeroChunkSize,

    #[error("chunk_overlap ({overlap}) must be smaller than chunk_size ({size})")]
    OverlapTooLarge { size: usize, overlap: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitterConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TextSplitter {
    config: SplitterConfig,
}

impl TextSplitter {
    /// # Errors
    ///
    /// Returns [`SplitterError`] when `chunk_size` is zero or the overlap is not smaller
    /// than the chunk size.
    pub fn new(config: SplitterConfig) -> Result<Self, SplitterError> {
        if config.chunk_size == 0 {
            return Err(SplitterError::ZeroChunkSize);
        }
        if config.chunk_overlap >= config.chunk_size {
            return Err(SplitterError::OverlapTooLarge {
                size: config.chunk_size,
                overlap: config.chunk_overlap,
            });
        }
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> SplitterConfig {
        self.config
    }

    /// Split `text` into overlapping chunks. Whitespace-only text yields no chunks.
    #[must_use]
    pub fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = text.chars().collect();
        let size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;

        let mut chunks = Vec::new();
        let mut start = 0;
        loop {
            if chars.len() - start <= size {
                chunks.push(chars[start..].iter().collect());
                break;
            }
            let end = find_cut(&chars, start, size, overlap);
            chunks.push(chars[start..end].iter().collect());
            start = end - overlap;
        }
        chunks
    }
}

/// Pick a cut in `(start + min_len ..= start + size]`.
///
/// `min_len` exceeds `overlap`, so every step makes progress.
fn find_cut(chars: &[char], start: usize, size: usize, overlap: usize) -> usize {
    let hard = start + size;
    let lo = start + (overlap + 1).max(size / 2);

    let candidates = (lo..=hard).rev();

    // Paragraph: cut after "\n\n".
    if let Some(cut) = candidates
        .clone()
        .find(|&cut| cut >= 2 && chars[cut - 2] == '\n' && chars[cut - 1] == '\n')
    {
        return cut;
    }

    // Sentence: cut after terminal punctuation and the following whitespace.
    if let Some(cut) = candidates.clone().find(|&cut| {
        cut >= 2 && matches!(chars[cut - 2], '.' | '!' | '?') && chars[cut - 1].is_whitespace()
    }) {
        return cut;
    }

    // Word: cut after whitespace.
    if let Some(cut) = candidates.clone().find(|&cut| chars[cut - 1].is_whitespace()) {
        return cut;
    }

    hard
}

/// Chunk `text` with the given window parameters.
///
/// # Errors
///
/// Returns [`SplitterError`] for invalid parameters.
pub fn chunk(text: &str, size: usize, overlap: usize) -> Result<Vec<String>, SplitterError> {
    let splitter = TextSplitter::new(SplitterConfig {
        chunk_size: size,
        chunk_overlap: overlap,
    })?;
    Ok(splitter.split(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splitter(size: usize, overlap: usize) -> TextSplitter {
        TextSplitter::new(SplitterConfig {
            chunk_size: size,
            chunk_overlap: overlap,
        })
        .unwrap()
    }

    fn reconstruct(chunks: &[String], overlap: usize) -> String {
        let mut out = String::new();
        for (i, c) in chunks.iter().enumerate() {
            if i == 0 {
                out.push_str(c);
            } else {
                out.extend(c.chars().skip(overlap));
            }
        }
        out
    }

    #[test]
    fn rejects_invalid_config() {
        assert_eq!(
            TextSplitter::new(SplitterConfig {
                chunk_size: 0,
                chunk_overlap: 0
            })
            .unwrap_err(),
            SplitterError::ZeroChunkSize
        );
        assert!(matches!(
            TextSplitter::new(SplitterConfig {
                chunk_size: 10,
                chunk_overlap: 10
            }),
            Err(SplitterError::OverlapTooLarge { .. })
        ));
    }

    #[test]
    fn empty_and_blank_text_yield_nothing() {
        let s = splitter(10, 2);
        assert!(s.split("").is_empty());
        assert!(s.split(" \n\t ").is_empty());
    }

    #[test]
    fn short_text_is_single_chunk() {
        let chunks = splitter(500, 50).split("Python is a language.");
        assert_eq!(chunks, vec!["Python is a language."]);
    }

    #[test]
    fn text_exactly_chunk_size_is_single_chunk() {
        let text = "a".repeat(500);
        assert_eq!(splitter(500, 50).split(&text).len(), 1);
    }

    #[test]
    fn prefers_paragraph_break() {
        let text = "First paragraph here.\n\nSecond one. More words follow after it.";
        let chunks = splitter(30, 0).split(text);
        assert_eq!(chunks[0], "First paragraph here.\n\n");
    }

    #[test]
    fn prefers_sentence_end_over_word() {
        let text = "One two three. Four five six seven eight nine";
        let chunks = splitter(25, 0).split(text);
        assert_eq!(chunks[0], "One two three. ");
    }

    #[test]
    fn falls_back_to_hard_cut() {
        let chunks = splitter(10, 3).split("abcdefghijklmnopqrstuvwxyz");
        assert_eq!(chunks[0], "abcdefghij");
        assert_eq!(chunks[1], "hijklmnopq");
        assert_eq!(reconstruct(&chunks, 3), "abcdefghijklmnopqrstuvwxyz");
    }

    #[test]
    fn overlap_is_exact_between_neighbours() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(20);
        let chunks = splitter(60, 10).split(&text);
        assert!(chunks.len() > 2);
        for pair in chunks.windows(2) {
            let prev: Vec<char> = pair[0].chars().collect();
            let next: Vec<char> = pair[1].chars().collect();
            assert_eq!(&prev[prev.len() - 10..], &next[..10]);
        }
    }

    #[test]
    fn multibyte_text_is_split_on_char_boundaries() {
        let text = "日本語のテキスト。".repeat(30);
        let chunks = splitter(25, 5).split(&text);
        assert_eq!(reconstruct(&chunks, 5), text);
    }

    #[test]
    fn chunk_fn_validates() {
        assert!(chunk("abc", 0, 0).is_err());
        assert_eq!(chunk("abc", 500, 50).unwrap(), vec!["abc"]);
    }

    mod proptest_splitter {
        use super::*;
        use proptest::prelude::*;

        fn params() -> impl Strategy<Value = (usize, usize)> {
            (1usize..120).prop_flat_map(|size| (Just(size), 0..size))
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(500))]

            #[test]
            fn chunks_reconstruct_input(
                content in "[a-z .!?\n]{1,800}",
                (size, overlap) in params(),
            ) {
                let chunks = splitter(size, overlap).split(&content);
                if content.trim().is_empty() {
                    prop_assert!(chunks.is_empty());
                } else {
                    prop_assert_eq!(reconstruct(&chunks, overlap), content);
                }
            }

            #[test]
            fn chunks_are_bounded_and_non_empty(
                content in "\\PC{0,600}",
                (size, overlap) in params(),
            ) {
                let chunks = splitter(size, overlap).split(&content);
                for c in &chunks {
                    let len = c.chars().count();
                    prop_assert!(len > 0);
                    prop_assert!(len <= size);
                }
            }

            #[test]
            fn consecutive_chunks_overlap_exactly(
                content in "[a-z .\n]{1,800}",
                (size, overlap) in params(),
            ) {
                let chunks = splitter(size, overlap).split(&content);
                for pair in chunks.windows(2) {
                    let prev: Vec<char> = pair[0].chars().collect();
                    let next: Vec<char> = pair[1].chars().collect();
                    prop_assert!(next.len() > overlap);
                    prop_assert_eq!(&prev[prev.len() - overlap..], &next[..overlap]);
                }
            }

            #[test]
            fn split_is_deterministic(
                content in "\\PC{0,400}",
                (size, overlap) in params(),
            ) {
                let s = splitter(size, overlap);
                prop_assert_eq!(s.split(&content), s.split(&content));
            }
        }
    }
}
