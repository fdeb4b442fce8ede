//! Grapheme-safe message segmentation
//!
//! Long messages are cut into numbered pieces that each fit a platform's
//! length limit. Lengths are counted in extended grapheme clusters so an
//! emoji sequence or a combining mark is never split across two posts.

use unicode_segmentation::UnicodeSegmentation;

use crate::error::{CrosspostError, Result};
use crate::types::Segment;

/// Grapheme clusters set aside for the page marker by default
pub const DEFAULT_PAGE_RESERVE: usize = 10;

/// Split `text` into segments of at most `max_len` grapheme clusters
///
/// Text that already fits is returned as a single, unmodified segment.
pub fn segment(text: &str, max_len: usize) -> Result<Vec<Segment>> {
    segment_with_reserve(text, max_len, DEFAULT_PAGE_RESERVE)
}

/// Like [`segment`], with an explicit page-marker reserve
pub fn segment_with_reserve(text: &str, max_len: usize, reserve: usize) -> Result<Vec<Segment>> {
    let graphemes: Vec<&str> = text.graphemes(true).collect();

    if graphemes.len() <= max_len {
        return Ok(vec![Segment {
            index: 1,
            total: 1,
            text: text.to_string(),
            body_start: 0,
            annotations: Vec::new(),
        }]);
    }

    let (total, width) = plan(graphemes.len(), max_len, reserve)?;

    let segments = graphemes
        .chunks(width)
        .enumerate()
        .map(|(i, chunk)| {
            let mut text = page_marker(i + 1, total);
            let body_start = text.len();
            text.extend(chunk.iter().copied());
            Segment {
                index: i + 1,
                total,
                text,
                body_start,
                annotations: Vec::new(),
            }
        })
        .collect();

    Ok(segments)
}

/// Number of grapheme clusters in `text`
pub fn grapheme_len(text: &str) -> usize {
    text.graphemes(true).count()
}

fn page_marker(index: usize, total: usize) -> String {
    format!("({}/{}) ", index, total)
}

/// Find the segment count and body width for a message of `len` clusters
///
/// The reserve is widened when the widest marker for the resulting total
/// does not fit in it, and the plan recomputed until it is stable.
fn plan(len: usize, max_len: usize, reserve: usize) -> Result<(usize, usize)> {
    let mut overhead = reserve;
    loop {
        let width = max_len
            .checked_sub(overhead)
            .filter(|w| *w > 0)
            .ok_or_else(|| {
                CrosspostError::InvalidInput(format!(
                    "Segment limit {} leaves no room for text after a {}-character page marker",
                    max_len, overhead
                ))
            })?;

        let total = len.div_ceil(width);
        let widest = page_marker(total, total).len();
        if widest <= overhead {
            return Ok((total, width));
        }
        overhead = widest;
    }
}
