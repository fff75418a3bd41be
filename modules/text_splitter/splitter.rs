use super::types::*;

/// Sentence boundary: a period followed by a space
const SENTENCE_BOUNDARY: &str = ". ";

/// Splits text into token-bounded chunks at sentence boundaries
pub struct TextSplitter {
    config: ChunkConfig,
}

impl TextSplitter {
    /// Create a new splitter with default configuration
    pub fn new() -> Self {
        Self {
            config: ChunkConfig::default(),
        }
    }

    /// Create a new splitter with custom configuration
    pub fn with_config(config: ChunkConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// Split text into ordered chunks.
    ///
    /// Units accumulate into the current chunk while the chunk's estimate
    /// stays within the ceiling. A unit that alone exceeds the ceiling is
    /// emitted as its own chunk. Empty input yields no chunks.
    pub fn split(&self, text: &str) -> Vec<Chunk> {
        let max_tokens = self.config.max_tokens.max(1);
        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut current_units = 0;

        for unit in sentence_units(text) {
            if !current.is_empty() {
                let mut candidate = current.clone();
                candidate.push_str(unit);
                if estimate_tokens(&candidate) > max_tokens {
                    push_chunk(&mut chunks, std::mem::take(&mut current), current_units, max_tokens);
                    current_units = 0;
                }
            }
            current.push_str(unit);
            current_units += 1;
        }

        if !current.is_empty() {
            push_chunk(&mut chunks, current, current_units, max_tokens);
        }

        chunks
    }
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self::new()
    }
}

fn push_chunk(chunks: &mut Vec<Chunk>, text: String, unit_count: usize, max_tokens: usize) {
    let token_estimate = estimate_tokens(&text);
    chunks.push(Chunk {
        chunk_id: chunks.len(),
        text,
        metadata: ChunkMetadata {
            token_estimate,
            unit_count,
            oversized: token_estimate > max_tokens,
        },
    });
}

/// Split text into sentence-like units, each keeping its trailing boundary.
///
/// Concatenating the units reproduces the input exactly.
pub fn sentence_units(text: &str) -> Vec<&str> {
    let mut units = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(SENTENCE_BOUNDARY) {
        let end = idx + SENTENCE_BOUNDARY.len();
        units.push(&text[start..end]);
        start = end;
    }
    if start < text.len() {
        units.push(&text[start..]);
    }
    units
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentence_units_keep_boundaries() {
        let units = sentence_units("One. Two. Three");
        assert_eq!(units, vec!["One. ", "Two. ", "Three"]);
        assert_eq!(units.concat(), "One. Two. Three");
    }

    #[test]
    fn test_no_boundary_single_unit() {
        assert_eq!(sentence_units("no periods here"), vec!["no periods here"]);
        assert_eq!(sentence_units("ends with period."), vec!["ends with period."]);
        assert!(sentence_units("").is_empty());
    }

    #[test]
    fn test_small_text_single_chunk() {
        let splitter = TextSplitter::new();
        let chunks = splitter.split("First sentence. Second sentence.");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_id, 0);
        assert_eq!(chunks[0].metadata.unit_count, 2);
        assert!(!chunks[0].metadata.oversized);
    }

    #[test]
    fn test_chunk_closes_before_exceeding_ceiling() {
        // Each unit is 8 chars = 2 tokens; ceiling of 4 tokens fits two units
        let splitter = TextSplitter::with_config(ChunkConfig { max_tokens: 4 });
        let chunks = splitter.split("aaaaaa. bbbbbb. cccccc. dddddd. ");
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["aaaaaa. bbbbbb. ", "cccccc. dddddd. "]);
        assert!(chunks.iter().all(|c| c.metadata.token_estimate <= 4));
    }

    #[test]
    fn test_oversized_unit_is_own_chunk() {
        let splitter = TextSplitter::with_config(ChunkConfig { max_tokens: 2 });
        let long = "x".repeat(40);
        let text = format!("ab. {}. cd", long);
        let chunks = splitter.split(&text);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text, "ab. ");
        assert!(chunks[1].metadata.oversized);
        assert_eq!(chunks[1].text, format!("{}. ", long));
        assert_eq!(chunks[2].text, "cd");
    }
}
