use super::*;

#[cfg(test)]
mod integration_tests {
    use super::*;

    fn document(sentences: usize) -> String {
        (0..sentences)
            .map(|i| format!("Sentence number {} describes part of the decision", i))
            .collect::<Vec<_>>()
            .join(". ")
    }

    #[test]
    fn test_chunks_reassemble_to_original() {
        let text = document(2000);
        let splitter = TextSplitter::with_config(ChunkConfig { max_tokens: 500 });
        let chunks = splitter.split(&text);

        assert!(chunks.len() > 1);
        let reconstructed: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(reconstructed, text);
    }

    #[test]
    fn test_chunk_ids_are_sequential() {
        let text = document(500);
        let chunks = TextSplitter::with_config(ChunkConfig { max_tokens: 100 }).split(&text);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_id, i);
            assert!(chunk.metadata.unit_count > 0);
            assert!(chunk.metadata.token_estimate <= 100);
        }
    }

    #[test]
    fn test_splitting_is_deterministic() {
        let text = document(800);
        let splitter = TextSplitter::with_config(ChunkConfig { max_tokens: 300 });
        assert_eq!(splitter.split(&text), splitter.split(&text));
    }

    #[test]
    fn test_empty_input_yields_no_chunks() {
        assert!(TextSplitter::new().split("").is_empty());
    }

    #[test]
    fn test_default_ceiling_keeps_typical_document_whole() {
        let text = document(100);
        let chunks = TextSplitter::new().split(&text);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, text);
    }

    #[test]
    fn test_multibyte_text_split_on_char_boundaries() {
        let text = "Davacı vekili dava açmıştır. Mahkeme kararı kesinleşmiştir. ".repeat(50);
        let chunks = TextSplitter::with_config(ChunkConfig { max_tokens: 40 }).split(&text);
        assert!(chunks.len() > 1);
        let reconstructed: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(reconstructed, text);
    }
}
