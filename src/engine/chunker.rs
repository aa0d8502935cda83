// Document splitting for corpus loading. Deliberately minimal: sentences on
// terminal punctuation, paragraphs on blank lines, pages on form feeds,
// manual passes the text through whole. Anything smarter belongs to the
// caller.

use crate::atoms::types::ChunkGranularity;

/// Split text into chunks at the requested granularity. Chunks are trimmed
/// and empties dropped; the result preserves document order.
pub fn split(text: &str, granularity: ChunkGranularity) -> Vec<String> {
    let chunks: Vec<String> = match granularity {
        ChunkGranularity::Sentence => split_sentences(text),
        ChunkGranularity::Paragraph => text
            .split("\n\n")
            .map(|p| p.trim().to_string())
            .collect(),
        ChunkGranularity::Page => text
            .split('\u{0C}')
            .map(|p| p.trim().to_string())
            .collect(),
        ChunkGranularity::Manual => vec![text.trim().to_string()],
    };
    chunks.into_iter().filter(|c| !c.is_empty()).collect()
}

/// Break on '.', '!' and '?' followed by whitespace, keeping the terminator
/// with its sentence.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            let at_boundary = chars.peek().map_or(true, |next| next.is_whitespace());
            if at_boundary {
                sentences.push(current.trim().to_string());
                current.clear();
            }
        }
    }
    if !current.trim().is_empty() {
        sentences.push(current.trim().to_string());
    }
    sentences
}
