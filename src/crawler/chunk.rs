//! Page text chunking
//!
//! Long pages are split into overlapping chunks so that no listing is lost to
//! a single truncated extraction request. Cuts prefer the start of a sentence
//! that introduces a listing (a price, a bedroom count, a street address).

use regex::Regex;
use std::sync::OnceLock;

/// Limits for splitting one page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLimits {
    /// Largest chunk, in characters
    pub max_chars: usize,

    /// Characters carried over from the end of the previous chunk
    pub overlap_chars: usize,

    /// Chunks kept per page
    pub max_chunks: usize,
}

fn listing_marker_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)\$\s?[\d,]+|\d+\s*(?:bed|bath|rec[aá]mara|ba[ñn]o)|\d+\s*(?:sq\.?\s*ft|m2|m²)|\d+\s+[a-z\s]+\b(?:street|st|avenue|ave|road|rd|boulevard|blvd|drive|dr|lane|ln|court|ct|way|place|pl)\b",
        )
        .expect("static listing marker pattern is valid")
    })
}

/// Byte offsets where a listing sentence starts, sorted and deduplicated
fn listing_boundaries(text: &str) -> Vec<usize> {
    let mut boundaries: Vec<usize> = listing_marker_pattern()
        .find_iter(text)
        .map(|found| match text[..found.start()].rfind(['.', '\n']) {
            Some(stop) => stop + 1,
            None => 0,
        })
        .filter(|&offset| offset > 0)
        .collect();

    boundaries.sort_unstable();
    boundaries.dedup();
    boundaries
}

/// Largest char boundary at or below `index`
fn floor_char_boundary(text: &str, index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    (0..=index).rev().find(|&i| text.is_char_boundary(i)).unwrap_or(0)
}

/// Byte offset of the character `chars` characters after `start`
fn advance_chars(text: &str, start: usize, chars: usize) -> usize {
    text[start..]
        .char_indices()
        .nth(chars)
        .map_or(text.len(), |(offset, _)| start + offset)
}

/// Splits `text` into at most `limits.max_chunks` overlapping chunks
///
/// Text that fits in one chunk is returned whole. Otherwise each chunk ends
/// at the last listing boundary that fits, or at the character limit when
/// none does.
pub fn chunk_page_text(text: &str, limits: ChunkLimits) -> Vec<String> {
    let text = text.trim();
    let max_chars = limits.max_chars.max(1);
    let overlap = limits.overlap_chars.min(max_chars / 2);
    let boundaries = listing_boundaries(text);

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() && chunks.len() < limits.max_chunks {
        let limit = advance_chars(text, start, max_chars);
        if limit >= text.len() {
            chunks.push(text[start..].trim().to_string());
            start = text.len();
            break;
        }

        // A boundary must leave room for progress past the overlap
        let earliest = advance_chars(text, start, overlap + 1);
        let end = boundaries
            .iter()
            .rev()
            .copied()
            .find(|&b| b <= limit && b > earliest)
            .unwrap_or(limit);

        chunks.push(text[start..end].trim().to_string());

        let next = floor_char_boundary(text, end.saturating_sub(overlap_bytes(text, end, overlap)));
        start = if next > start { next } else { end };
    }

    if start < text.len() {
        tracing::debug!(
            "Page text split into {} chunks; {} trailing characters skipped",
            chunks.len(),
            text[start..].chars().count()
        );
    }

    chunks.retain(|chunk| !chunk.is_empty());
    chunks
}

/// Byte length of the last `chars` characters before `end`
fn overlap_bytes(text: &str, end: usize, chars: usize) -> usize {
    text[..end]
        .char_indices()
        .rev()
        .take(chars)
        .last()
        .map_or(0, |(offset, _)| end - offset)
}
