//! Recursive character text splitter.
//!
//! Splits text into [`Chunk`]s of at most `chunk_size` characters, trying
//! paragraph breaks first, then line breaks, then spaces, and finally hard
//! character boundaries. Consecutive chunks share up to `chunk_overlap`
//! characters of trailing context so a retrieved chunk keeps some of what
//! preceded it.
//!
//! Lengths are counted in `char`s, never bytes, so multi-byte text is never
//! cut mid-codepoint.

use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use uuid::Uuid;

use crate::models::Chunk;

/// Separators tried in order. The empty separator means "split anywhere".
const SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

/// Split `text` into chunks with contiguous indices starting at 0.
/// Blank input produces no chunks.
pub fn chunk_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<Chunk> {
    split_text(text, chunk_size, chunk_overlap)
        .into_iter()
        .enumerate()
        .map(|(i, piece)| make_chunk(i as i64, &piece))
        .collect()
}

/// Split `text` into trimmed, non-empty pieces of at most `chunk_size` chars.
pub fn split_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    if text.trim().is_empty() || chunk_size == 0 {
        return Vec::new();
    }
    split_recursive(text, SEPARATORS, chunk_size, chunk_overlap.min(chunk_size - 1))
}

fn split_recursive(
    text: &str,
    separators: &[&str],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<String> {
    // Pick the first separator that occurs in the text; "" always matches.
    let pos = separators
        .iter()
        .position(|s| s.is_empty() || text.contains(s))
        .unwrap_or(separators.len() - 1);
    let separator = separators[pos];
    let remaining = &separators[pos + 1..];

    let splits: Vec<&str> = if separator.is_empty() {
        text.char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect()
    } else {
        text.split(separator).filter(|s| !s.is_empty()).collect()
    };

    let mut out = Vec::new();
    let mut fitting: Vec<&str> = Vec::new();

    for piece in splits {
        if char_len(piece) <= chunk_size {
            fitting.push(piece);
            continue;
        }

        // Flush what fits so far, then break the oversize piece down further.
        if !fitting.is_empty() {
            out.extend(merge_splits(&fitting, separator, chunk_size, chunk_overlap));
            fitting.clear();
        }
        if remaining.is_empty() {
            out.push(piece.trim().to_string());
        } else {
            out.extend(split_recursive(piece, remaining, chunk_size, chunk_overlap));
        }
    }

    if !fitting.is_empty() {
        out.extend(merge_splits(&fitting, separator, chunk_size, chunk_overlap));
    }

    out.retain(|s| !s.is_empty());
    out
}

/// Greedily join small splits into chunks, carrying overlap between them.
fn merge_splits(
    splits: &[&str],
    separator: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<String> {
    let sep_len = char_len(separator);
    let mut docs = Vec::new();
    let mut window: VecDeque<&str> = VecDeque::new();
    let mut total = 0usize;

    for &piece in splits {
        let len = char_len(piece);
        let joined_len = |window: &VecDeque<&str>, total: usize| {
            total + len + if window.is_empty() { 0 } else { sep_len }
        };

        if joined_len(&window, total) > chunk_size && !window.is_empty() {
            push_joined(&mut docs, &window, separator);

            // Shrink from the front until only the overlap remains and the
            // next piece fits.
            while total > chunk_overlap
                || (total > 0 && joined_len(&window, total) > chunk_size)
            {
                let Some(first) = window.pop_front() else {
                    break;
                };
                total -= char_len(first) + if window.is_empty() { 0 } else { sep_len };
            }
        }

        total = joined_len(&window, total);
        window.push_back(piece);
    }

    push_joined(&mut docs, &window, separator);
    docs
}

fn push_joined(docs: &mut Vec<String>, window: &VecDeque<&str>, separator: &str) {
    let joined = window
        .iter()
        .copied()
        .collect::<Vec<_>>()
        .join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        docs.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn make_chunk(index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash,
    }
}
