use crate::error::{RagError, Result};

/// Represents a passage of a document with its location
#[derive(Debug, Clone, PartialEq)]
pub struct Passage {
    /// Identifier of the form `{document_id}_{index}`
    pub id: String,
    /// Identifier of the document this passage belongs to
    pub document_id: String,
    /// The actual text content of this passage
    pub text: String,
    /// Byte offset of the first character in the source document
    pub start: usize,
    /// Byte offset one past the last character in the source document
    pub end: usize,
    /// Estimated token count for this passage
    pub token_count: usize,
}

/// Cut points tried in order, from paragraph breaks down to single spaces.
/// The separator stays with the text before it.
const BOUNDARY_LEVELS: &[&[&str]] = &[
    &["\n\n"],
    &[". ", "! ", "? ", ".\n", "!\n", "?\n"],
    &["\n"],
    &[" ", "\t"],
];

/// Split text into passages of at most `max_size` characters.
///
/// Each passage ends on the most natural boundary available inside its
/// window, falling back to a hard cut. Consecutive passages share up to
/// `overlap` characters so context survives the split.
pub fn split_into_passages(
    text: &str,
    document_id: &str,
    max_size: usize,
    overlap: usize,
) -> Result<Vec<Passage>> {
    if text.is_empty() {
        return Err(RagError::InvalidInput("cannot chunk empty text".into()));
    }
    if max_size == 0 {
        return Err(RagError::InvalidInput(
            "passage size must be greater than zero".into(),
        ));
    }
    if overlap >= max_size {
        return Err(RagError::InvalidInput(format!(
            "overlap ({}) must be smaller than passage size ({})",
            overlap, max_size
        )));
    }

    let mut passages = Vec::new();
    let mut start = 0;
    let mut covered = 0;

    loop {
        let limit = advance_chars(text, start, max_size);

        // The last window takes everything that is left. Otherwise the cut
        // must land past the text the previous passage already covered.
        let end = if limit == text.len() {
            limit
        } else {
            start
                + last_boundary(&text[start..limit], covered - start)
                    .unwrap_or(limit - start)
        };

        let passage_text = &text[start..end];
        passages.push(Passage {
            id: format!("{}_{}", document_id, passages.len()),
            document_id: document_id.to_string(),
            text: passage_text.to_string(),
            start,
            end,
            token_count: estimate_token_count(passage_text),
        });

        if end == text.len() {
            break;
        }
        covered = end;

        // Step back for the overlap, but always move forward overall
        let next = retreat_chars(text, end, overlap);
        start = if next > start { next } else { end };
    }

    Ok(passages)
}

/// Byte offset reached after moving `count` characters forward from `start`
fn advance_chars(text: &str, start: usize, count: usize) -> usize {
    text[start..]
        .char_indices()
        .nth(count)
        .map(|(i, _)| start + i)
        .unwrap_or(text.len())
}

/// Byte offset reached after moving `count` characters back from `end`
fn retreat_chars(text: &str, end: usize, count: usize) -> usize {
    if count == 0 {
        return end;
    }
    text[..end]
        .char_indices()
        .rev()
        .nth(count - 1)
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Length of the longest prefix of `window` that ends on a natural boundary
/// and is longer than `min_len`
fn last_boundary(window: &str, min_len: usize) -> Option<usize> {
    BOUNDARY_LEVELS.iter().find_map(|separators| {
        separators
            .iter()
            .filter_map(|sep| window.rfind(sep).map(|pos| pos + sep.len()))
            .filter(|&len| len > min_len)
            .max()
    })
}

/// Calculate approximate token count for a text
/// This is a very simple estimation - words plus punctuation
pub fn estimate_token_count(text: &str) -> usize {
    let words = text.split_whitespace().count();
    let punctuation = text.chars().filter(|c| c.is_ascii_punctuation()).count();
    words + punctuation
}
