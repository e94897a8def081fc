//! Document chunking strategies.
//!
//! This module provides the [`Chunker`] trait and two implementations:
//!
//! - [`RecursiveChunker`]: breaks at the strongest whitespace boundary
//!   available (paragraph, then line, then word) and carries overlap forward
//! - [`FixedSizeChunker`]: splits by character count with configurable overlap
//!
//! All lengths are counted in `char`s, so multi-byte text never splits inside
//! a code point.

use std::ops::Range;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::document::{Chunk, Document};

/// A strategy for splitting documents into chunks.
///
/// Implementations produce [`Chunk`]s with text and metadata but no embeddings.
/// Embeddings are attached later by the provider.
pub trait Chunker: Send + Sync {
    /// Split raw text into chunk texts, in document order.
    ///
    /// Returns an empty `Vec` for text that is empty or only whitespace.
    fn split_text(&self, text: &str) -> Vec<String>;

    /// Split a document into chunks.
    ///
    /// Chunk IDs are generated as `{document_id}_{chunk_index}`. Each chunk
    /// inherits the parent document's metadata unchanged.
    fn chunk(&self, document_id: &str, document: &Document) -> Vec<Chunk> {
        self.split_text(&document.text)
            .into_iter()
            .enumerate()
            .map(|(chunk_index, text)| Chunk {
                id: format!("{document_id}_{chunk_index}"),
                text,
                embedding: Vec::new(),
                metadata: document.metadata.clone(),
                document_id: document_id.to_string(),
                chunk_index,
            })
            .collect()
    }
}

/// Selects the [`Chunker`] a provider builds from its configuration.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChunkingStrategy {
    /// [`RecursiveChunker`].
    #[default]
    Recursive,
    /// [`FixedSizeChunker`].
    FixedSize,
}

impl ChunkingStrategy {
    /// Build the chunker for this strategy.
    pub fn chunker(self, chunk_size: usize, chunk_overlap: usize) -> Arc<dyn Chunker> {
        match self {
            Self::Recursive => Arc::new(RecursiveChunker::new(chunk_size, chunk_overlap)),
            Self::FixedSize => Arc::new(FixedSizeChunker::new(chunk_size, chunk_overlap)),
        }
    }
}

/// Splits text into fixed-size character windows with configurable overlap.
///
/// # Example
///
/// ```rust
/// use orchard_rag::{Chunker, FixedSizeChunker};
///
/// let chunker = FixedSizeChunker::new(4, 1);
/// assert_eq!(chunker.split_text("abcdefg"), vec!["abcd", "defg"]);
/// ```
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedSizeChunker {
    /// Create a new `FixedSizeChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size`: maximum number of characters per chunk
    /// * `chunk_overlap`: number of overlapping characters between consecutive chunks
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self { chunk_size: chunk_size.max(1), chunk_overlap }
    }
}

impl Chunker for FixedSizeChunker {
    fn split_text(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let chars: Vec<char> = text.chars().collect();

        let step = self.chunk_size.saturating_sub(self.chunk_overlap).max(1);
        let mut chunks = Vec::new();
        let mut start = 0;

        loop {
            let end = (start + self.chunk_size).min(chars.len());
            chunks.push(chars[start..end].iter().collect());
            if end == chars.len() {
                break;
            }
            start += step;
        }

        chunks
    }
}

/// Splits text at the strongest whitespace boundary that fits.
///
/// Each chunk ends at a paragraph break (`\n\n`) when one fits in the window,
/// otherwise at a line break, otherwise between words. Every chunk after the
/// first starts `chunk_overlap` characters before the previous chunk ended
/// (moved back to a word start when that still fits), so neighbouring chunks
/// share context.
///
/// Guarantees:
///
/// - text that is empty or only whitespace yields no chunks;
/// - other text no longer than `chunk_size` comes back as a single chunk, verbatim;
/// - no chunk exceeds `chunk_size`, except a chunk holding a single word that
///   is itself longer than `chunk_size`, which is kept whole;
/// - consecutive chunks share at least `chunk_overlap` characters, except
///   around a word too long to fit beside the overlap.
///
/// # Example
///
/// ```rust
/// use orchard_rag::{Chunker, RecursiveChunker};
///
/// let chunker = RecursiveChunker::new(20, 5);
/// let chunks = chunker.split_text("alpha beta gamma delta epsilon zeta");
/// assert!(chunks.iter().all(|c| c.chars().count() <= 20));
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveChunker {
    /// Create a new `RecursiveChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size`: maximum number of characters per chunk
    /// * `chunk_overlap`: number of overlapping characters between consecutive chunks
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self { chunk_size, chunk_overlap: chunk_overlap.min(chunk_size - 1) }
    }

    /// Smallest chunk preferred over a stronger but earlier boundary.
    fn min_fill(&self) -> usize {
        (self.chunk_overlap + 1).max(self.chunk_size / 2)
    }

    /// Pick the end of a chunk starting at `start` that must extend past `prev_end`.
    fn pick_end(&self, boundaries: &[Boundary], start: usize, prev_end: usize) -> Option<usize> {
        let limit = start + self.chunk_size;
        let lo = boundaries.partition_point(|b| b.start <= prev_end);
        let hi = boundaries.partition_point(|b| b.start <= limit);
        let candidates = boundaries.get(lo..hi)?;

        let min_end = start + self.min_fill();
        candidates
            .iter()
            .filter(|b| b.start >= min_end)
            .max_by_key(|b| (b.level, b.start))
            .or_else(|| candidates.last())
            .map(|b| b.start)
    }

    /// Choose the window of the chunk following one that spanned `prev_start..prev_end`.
    fn next_window(&self, boundaries: &[Boundary], prev_start: usize, prev_end: usize) -> (usize, usize) {
        let exact = if self.chunk_overlap == 0 {
            skip_whitespace(boundaries, prev_end)
        } else {
            prev_end.saturating_sub(self.chunk_overlap).max(prev_start + 1)
        };

        let word_start = match boundaries.partition_point(|b| b.end <= exact) {
            0 => None,
            idx => Some(boundaries[idx - 1].end),
        }
        .filter(|&s| s > prev_start && exact - s <= self.chunk_overlap);

        for start in word_start.into_iter().chain(std::iter::once(exact)) {
            if let Some(end) = self.pick_end(boundaries, start, prev_end) {
                return (start, end);
            }
        }

        // The next word does not fit beside the overlap.
        let unit_start = skip_whitespace(boundaries, prev_end);
        let lo = boundaries.partition_point(|b| b.start <= prev_end);
        let unit_end = boundaries[lo].start;
        if unit_end - unit_start <= self.chunk_size {
            // Keep more than `chunk_overlap` chars so the following start still advances.
            let start = skip_whitespace(boundaries, unit_end.saturating_sub(self.chunk_size))
                .min(unit_end - self.chunk_overlap - 1);
            (start, unit_end)
        } else {
            (unit_start, unit_end)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum BoundaryLevel {
    Word,
    Line,
    Paragraph,
}

/// A run of whitespace between two words, in char positions.
#[derive(Debug, Clone, Copy)]
struct Boundary {
    start: usize,
    end: usize,
    level: BoundaryLevel,
}

fn find_boundaries(chars: &[char]) -> Vec<Boundary> {
    let mut boundaries = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        if !chars[i].is_whitespace() {
            i += 1;
            continue;
        }
        let start = i;
        let mut newlines = 0;
        while i < chars.len() && chars[i].is_whitespace() {
            if chars[i] == '\n' {
                newlines += 1;
            }
            i += 1;
        }
        let level = match newlines {
            0 => BoundaryLevel::Word,
            1 => BoundaryLevel::Line,
            _ => BoundaryLevel::Paragraph,
        };
        boundaries.push(Boundary { start, end: i, level });
    }

    boundaries
}

/// Move `pos` past the whitespace run it sits at, if any.
fn skip_whitespace(boundaries: &[Boundary], pos: usize) -> usize {
    boundaries.iter().find(|b| b.start <= pos && pos < b.end).map_or(pos, |b| b.end)
}

impl RecursiveChunker {
    /// Byte ranges of the chunks [`Chunker::split_text`] returns, in order.
    ///
    /// Every range starts and ends on a `char` boundary of `text`.
    pub fn split_ranges(&self, text: &str) -> Vec<Range<usize>> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let chars: Vec<char> = text.chars().collect();
        if chars.len() <= self.chunk_size {
            return vec![0..text.len()];
        }

        let mut offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        offsets.push(text.len());

        let mut boundaries = find_boundaries(&chars);
        let content_start = match boundaries.first() {
            Some(b) if b.start == 0 => b.end,
            _ => 0,
        };
        let content_end = match boundaries.last() {
            Some(b) if b.end == chars.len() => b.start,
            _ => chars.len(),
        };
        boundaries.retain(|b| b.start > content_start && b.end < chars.len());
        boundaries.push(Boundary {
            start: content_end,
            end: chars.len(),
            level: BoundaryLevel::Paragraph,
        });

        let mut ranges = Vec::new();
        let mut window = match self.pick_end(&boundaries, content_start, content_start) {
            Some(end) => (content_start, end),
            None => (content_start, boundaries[0].start),
        };

        loop {
            let (start, end) = window;
            ranges.push(offsets[start]..offsets[end]);
            if end >= content_end {
                break;
            }
            window = self.next_window(&boundaries, start, end);
        }

        ranges
    }
}

impl Chunker for RecursiveChunker {
    fn split_text(&self, text: &str) -> Vec<String> {
        self.split_ranges(text).into_iter().map(|range| text[range].to_string()).collect()
    }
}
