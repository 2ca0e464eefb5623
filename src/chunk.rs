//! Fixed-window text chunker.
//!
//! Splits [`SourceUnit`]s into [`DocumentChunk`]s of at most `size`
//! characters. Consecutive chunks from the same unit share exactly
//! `overlap` characters, so the window advances by `size - overlap`.
//!
//! Boundaries are counted in characters, never bytes, so multi-byte text
//! is never split inside a code point.

use tracing::warn;

use crate::config::ChunkingConfig;
use crate::models::{DocumentChunk, SourceUnit};

#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    size: usize,
    overlap: usize,
}

impl Chunker {
    /// A zero `size` is raised to 1 and `overlap` is clamped below `size`,
    /// so the window always advances.
    pub fn new(size: usize, overlap: usize) -> Self {
        let size = size.max(1);
        let clamped = overlap.min(size - 1);
        if clamped != overlap {
            warn!(size, overlap, clamped, "chunk overlap must be smaller than chunk size, clamping");
        }
        Self {
            size,
            overlap: clamped,
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    /// Split every unit, preserving unit order and carrying metadata over to
    /// each chunk. Whitespace-only windows are dropped.
    pub fn split_units(&self, units: &[SourceUnit]) -> Vec<DocumentChunk> {
        units
            .iter()
            .flat_map(|unit| {
                self.split_text(&unit.text)
                    .into_iter()
                    .map(|content| DocumentChunk::new(content, unit.metadata.clone()))
            })
            .collect()
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        // Byte offset of every char boundary, plus the end of the string.
        let mut bounds: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        let char_len = bounds.len();
        bounds.push(text.len());

        let step = self.size - self.overlap;
        let mut pieces = Vec::new();
        let mut start = 0usize;

        while start < char_len {
            let end = (start + self.size).min(char_len);
            let piece = &text[bounds[start]..bounds[end]];
            if !piece.trim().is_empty() {
                pieces.push(piece.to_string());
            }
            if end == char_len {
                break;
            }
            start += step;
        }

        pieces
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::from_config(&ChunkingConfig::default())
    }
}
