#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub source_note_id: String,
    pub sequence_index: usize,
}

/// Split `text` into sentence-aligned chunks of roughly `target_word_count` words.
///
/// Sentences are accumulated greedily; a chunk is emitted when the next
/// sentence would push it past the target. A single sentence longer than
/// the target becomes its own chunk. Each chunk is the exact slice of the
/// input between its first and last sentence.
pub fn chunk(text: &str, target_word_count: usize) -> Vec<String> {
    let target = target_word_count.max(1);
    let mut chunks = Vec::new();
    let mut current: Option<(usize, usize)> = None;
    let mut current_words = 0;

    for (start, end) in sentence_spans(text) {
        let words = word_count(&text[start..end]);
        if let Some((chunk_start, chunk_end)) = current
            && current_words + words > target
        {
            chunks.push(text[chunk_start..chunk_end].to_string());
            current = None;
            current_words = 0;
        }

        current = match current {
            Some((chunk_start, _)) => Some((chunk_start, end)),
            None => Some((start, end)),
        };
        current_words += words;
    }

    if let Some((chunk_start, chunk_end)) = current {
        chunks.push(text[chunk_start..chunk_end].to_string());
    }

    chunks
}

/// Chunk a note's text and tag each chunk with its note and position.
pub fn chunk_note(note_id: &str, text: &str, target_word_count: usize) -> Vec<Chunk> {
    chunk(text, target_word_count)
        .into_iter()
        .enumerate()
        .map(|(sequence_index, text)| Chunk {
            text,
            source_note_id: note_id.to_string(),
            sequence_index,
        })
        .collect()
}

/// Sentences of `text`, trimmed, in order.
pub fn split_sentences(text: &str) -> Vec<&str> {
    sentence_spans(text)
        .into_iter()
        .map(|(start, end)| &text[start..end])
        .collect()
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Byte ranges of trimmed sentences. A sentence ends at `.`, `!` or `?`
/// followed by whitespace; trailing text without a terminator is a sentence.
fn sentence_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((_, ch)) = chars.next() {
        if matches!(ch, '.' | '!' | '?')
            && let Some(&(next_idx, next)) = chars.peek()
            && next.is_whitespace()
        {
            push_trimmed(text, start, next_idx, &mut spans);
            start = next_idx;
        }
    }
    push_trimmed(text, start, text.len(), &mut spans);

    spans
}

fn push_trimmed(text: &str, start: usize, end: usize, spans: &mut Vec<(usize, usize)>) {
    let segment = &text[start..end];
    let trimmed_start = segment.trim_start();
    if trimmed_start.is_empty() {
        return;
    }
    let offset = start + (segment.len() - trimmed_start.len());
    spans.push((offset, offset + trimmed_start.trim_end().len()));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentences_of(chunks: &[String]) -> Vec<String> {
        chunks
            .iter()
            .flat_map(|c| split_sentences(c).into_iter().map(str::to_string))
            .collect()
    }

    #[test]
    fn short_note_is_a_single_chunk() {
        let text = "Buy milk. Call Alice about the project. Alice's deadline is Friday.";
        assert_eq!(chunk(text, 300), vec![text.to_string()]);
    }

    #[test]
    fn empty_and_blank_input_yield_nothing() {
        assert!(chunk("", 300).is_empty());
        assert!(chunk("   \n\t ", 300).is_empty());
    }

    #[test]
    fn text_without_terminators_is_trimmed_input() {
        let text = "  just some words without any ending\nacross lines  ";
        assert_eq!(chunk(text, 3), vec![text.trim().to_string()]);
    }

    #[test]
    fn chunk_keeps_spacing_between_its_sentences() {
        let text = "First line.\nSecond line.  Third one. Fourth sentence here.";
        assert_eq!(
            chunk(text, 6),
            vec![
                "First line.\nSecond line.  Third one.".to_string(),
                "Fourth sentence here.".to_string(),
            ]
        );
    }

    #[test]
    fn splits_only_at_sentence_boundaries() {
        let text = "One two three. Four five six! Seven eight? Nine";
        let chunks = chunk(text, 5);
        assert_eq!(
            chunks,
            vec![
                "One two three.".to_string(),
                "Four five six! Seven eight?".to_string(),
                "Nine".to_string(),
            ]
        );
    }

    #[test]
    fn oversized_sentence_forms_its_own_chunk() {
        let text = "Short one. This sentence has far more words than the target allows. End.";
        let chunks = chunk(text, 4);
        assert_eq!(chunks.len(), 3);
        assert_eq!(
            chunks[1],
            "This sentence has far more words than the target allows."
        );
    }

    #[test]
    fn punctuation_inside_tokens_does_not_split() {
        let text = "Version 3.5 shipped.Next steps are pending";
        assert_eq!(split_sentences(text), vec![text]);
    }

    #[test]
    fn chunks_respect_target_and_keep_every_sentence() {
        let text = "Alpha beta gamma. Delta epsilon. Zeta eta theta iota. Kappa. \
                    Lambda mu nu xi omicron. Pi rho sigma. Tau upsilon phi chi psi omega.";
        let target = 6;
        let chunks = chunk(text, target);

        assert!(chunks.iter().all(|c| !c.trim().is_empty()));
        for c in &chunks[..chunks.len() - 1] {
            let words = word_count(c);
            let single_sentence = split_sentences(c).len() == 1;
            assert!(words <= target || single_sentence, "chunk too large: {c}");
        }
        assert_eq!(sentences_of(&chunks), split_sentences(text));
    }

    #[test]
    fn zero_target_behaves_like_one() {
        let chunks = chunk("A b. C d. E.", 0);
        assert_eq!(chunks, vec!["A b.", "C d.", "E."]);
    }

    #[test]
    fn chunk_note_assigns_sequence() {
        let chunks = chunk_note("n1", "First part. Second part.", 2);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].source_note_id, "n1");
        assert_eq!(chunks[0].sequence_index, 0);
        assert_eq!(chunks[1].text, "Second part.");
        assert_eq!(chunks[1].sequence_index, 1);
    }
}
