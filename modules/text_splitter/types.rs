/// Default token ceiling per chunk
pub const DEFAULT_MAX_TOKENS: usize = 8000;

/// Characters per token used by the estimator
pub const CHARS_PER_TOKEN: usize = 4;

/// Configuration for text splitting operations
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Soft ceiling on estimated tokens per chunk
    pub max_tokens: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

/// A contiguous slice of a document's text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position of this chunk within the document
    pub chunk_id: usize,
    pub text: String,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkMetadata {
    pub token_estimate: usize,
    /// Number of sentence units in this chunk
    pub unit_count: usize,
    /// A single unit larger than the ceiling
    pub oversized: bool,
}

/// Deterministic token estimate: one token per four characters, rounded up.
///
/// Counts `char`s rather than bytes so multi-byte scripts are not inflated.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        // 4 chars, 8 bytes
        assert_eq!(estimate_tokens("çğüş"), 1);
    }
}
