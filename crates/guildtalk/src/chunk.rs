//! Splitting replies to fit the transport's per-message size ceiling.
//!
//! Chunks are cut at fixed character offsets with no regard for word
//! boundaries, so a split may land in the middle of a word. Lengths are
//! counted in Unicode scalar values, never bytes, so a chunk never splits a
//! character.

use core::iter::FusedIterator;

/// Largest message the transport accepts, in characters.
pub const MESSAGE_CEILING: usize = 2000;

/// Size of each chunk when a reply exceeds [`MESSAGE_CEILING`].
pub const CHUNK_LIMIT: usize = 1990;

/// Lazy iterator over fixed-size slices of a string.
///
/// Cloning the iterator restarts from the clone's position, so the same
/// sequence can be replayed.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    rest: &'a str,
    limit: usize,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        let end = self
            .rest
            .char_indices()
            .nth(self.limit)
            .map_or(self.rest.len(), |(idx, _)| idx);
        let (head, tail) = self.rest.split_at(end);
        self.rest = tail;
        Some(head)
    }
}

impl FusedIterator for Chunks<'_> {}

/// Splits `text` into consecutive slices of at most `limit` characters.
///
/// Every slice except possibly the last holds exactly `limit` characters and
/// the slices concatenate back to `text`. An empty `text` yields nothing. A
/// `limit` of zero is treated as one.
pub fn chunk(text: &str, limit: usize) -> Chunks<'_> {
    Chunks {
        rest: text,
        limit: limit.max(1),
    }
}

/// Splits `text` the way replies are delivered: whole when it fits within
/// [`MESSAGE_CEILING`], otherwise in [`CHUNK_LIMIT`]-sized pieces.
pub fn for_transport(text: &str) -> Chunks<'_> {
    if text.chars().count() > MESSAGE_CEILING {
        chunk(text, CHUNK_LIMIT)
    } else {
        // A single chunk covering the whole text.
        chunk(text, MESSAGE_CEILING)
    }
}
