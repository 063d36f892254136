//! Recursive separator-priority text splitting with overlap.
//!
//! The splitter breaks one text segment (a page, a section, a whole file)
//! into chunks no larger than a target size, with a configurable overlap
//! between consecutive chunks. Splitting tries the most significant
//! separator first (paragraph breaks), then progressively less significant
//! ones (line breaks, spaces), and only falls back to hard character cuts
//! when a run of text contains no separators at all.
//!
//! Every produced [`ChunkSpan`] carries its byte offsets into the original
//! segment, so callers can locate a chunk in its source. Offsets are
//! monotonically non-decreasing across the returned chunks, and consecutive
//! chunks overlap by up to the configured overlap, aligned to separator
//! boundaries where possible.

use regex::Regex;
use serde::Serialize;
use std::ops::Range;

/// Default separator patterns, ordered from most to least significant:
/// paragraph breaks, then line breaks, then spaces. Text with none of these
/// is hard-cut at the chunk size.
pub const DEFAULT_SEPARATORS: &[&str] = &[r"\n\n", r"\n", r" "];

/// One chunk of a source segment, with its location inside that segment.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChunkSpan {
    /// The chunk text, a substring of the source segment
    pub text: String,
    /// Byte offset of the chunk start within the source segment
    pub start_index: usize,
    /// Byte offset one past the chunk end within the source segment
    pub end_index: usize,
}

/// Splits text segments into bounded, overlapping chunks.
pub struct TextSplitter {
    separators: Vec<Regex>,
    chunk_size: usize,
    overlap: usize,
}

impl TextSplitter {
    /// Create a splitter with the given separator patterns, target chunk
    /// size and overlap. Overlap is clamped below the chunk size.
    ///
    /// # Panics
    /// Panics if any separator pattern is not a valid regular expression.
    pub fn new(separator_patterns: &[&str], chunk_size: usize, overlap: usize) -> Self {
        let separators = separator_patterns
            .iter()
            .map(|&pattern| Regex::new(pattern).unwrap())
            .collect();

        let chunk_size = chunk_size.max(1);
        Self {
            separators,
            chunk_size,
            overlap: overlap.min(chunk_size.saturating_sub(1)),
        }
    }

    /// Create a splitter with the default separators.
    pub fn with_defaults(chunk_size: usize, overlap: usize) -> Self {
        Self::new(DEFAULT_SEPARATORS, chunk_size, overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split one segment into chunks.
    ///
    /// Empty or whitespace-only input yields no chunks. Otherwise every
    /// chunk satisfies `start_index <= end_index <= segment.len()` and
    /// `end_index - start_index <= chunk_size`.
    pub fn split(&self, segment: &str) -> Vec<ChunkSpan> {
        if segment.trim().is_empty() {
            return Vec::new();
        }

        let atoms = self.split_into_atoms(segment, 0, 0);
        self.assemble(segment, &atoms)
    }

    // Recursively split `text` (which starts at `offset` within the
    // original segment) into atomic ranges no larger than chunk_size.
    // Atoms from separator splitting tile the text; atoms from the hard-cut
    // fallback overlap each other by `overlap` so that downstream chunks of
    // separator-free text still share context.
    fn split_into_atoms(
        &self,
        text: &str,
        separator_idx: usize,
        offset: usize,
    ) -> Vec<Range<usize>> {
        let mut atoms: Vec<Range<usize>> = Vec::new();

        if text.is_empty() {
            return atoms;
        }

        if text.len() <= self.chunk_size {
            atoms.push(offset..offset + text.len());
            return atoms;
        }

        // Out of separators: hard character cuts, stepped so that
        // consecutive windows overlap.
        if separator_idx >= self.separators.len() {
            let step = self.chunk_size - self.overlap;
            let mut start = 0;
            loop {
                let end = floor_char_boundary(text, (start + self.chunk_size).min(text.len()));
                atoms.push(offset + start..offset + end);
                if end >= text.len() {
                    break;
                }
                start = floor_char_boundary(text, start + step);
            }
            return atoms;
        }

        let separator = &self.separators[separator_idx];
        let mut cursor = 0;

        for mat in separator.find_iter(text) {
            if mat.start() > cursor {
                let piece = &text[cursor..mat.start()];
                atoms.extend(self.split_into_atoms(piece, separator_idx + 1, offset + cursor));
            }
            // The separator itself stays an atom so no bytes are lost
            if mat.end() > mat.start() {
                atoms.push(offset + mat.start()..offset + mat.end());
            }
            cursor = mat.end();
        }

        if cursor < text.len() {
            let piece = &text[cursor..];
            atoms.extend(self.split_into_atoms(piece, separator_idx + 1, offset + cursor));
        }

        atoms
    }

    // Greedily pack atoms into chunks up to chunk_size. When a chunk is
    // flushed, the next one restarts from the trailing atoms that fit
    // within the overlap budget, producing the overlap window.
    fn assemble(&self, segment: &str, atoms: &[Range<usize>]) -> Vec<ChunkSpan> {
        let mut chunks: Vec<ChunkSpan> = Vec::new();
        // Indices into `atoms` forming the current window
        let mut window: Vec<usize> = Vec::new();

        let window_len = |window: &[usize]| -> usize {
            match (window.first(), window.last()) {
                (Some(&first), Some(&last)) => atoms[last].end - atoms[first].start,
                _ => 0,
            }
        };

        let flush = |window: &[usize], chunks: &mut Vec<ChunkSpan>| {
            if let (Some(&first), Some(&last)) = (window.first(), window.last()) {
                let range = atoms[first].start..atoms[last].end;
                let text = segment[range.clone()].to_string();
                if !text.trim().is_empty() {
                    chunks.push(ChunkSpan {
                        text,
                        start_index: range.start,
                        end_index: range.end,
                    });
                }
            }
        };

        for (idx, atom) in atoms.iter().enumerate() {
            let candidate_len = match window.first() {
                Some(&first) => atom.end - atoms[first].start,
                None => atom.end - atom.start,
            };

            if candidate_len > self.chunk_size && !window.is_empty() {
                flush(&window, &mut chunks);

                // Carry trailing atoms into the next window as overlap
                let window_end = atoms[*window.last().unwrap()].end;
                let carried: Vec<usize> = window
                    .iter()
                    .copied()
                    .filter(|&i| window_end - atoms[i].start <= self.overlap)
                    .collect();
                window = carried;

                // If the incoming atom does not fit even next to the carried
                // overlap, give up the overlap rather than emit it alone
                if let Some(&first) = window.first() {
                    if atom.end - atoms[first].start > self.chunk_size {
                        window.clear();
                    }
                }
            }

            window.push(idx);

            // A single atom can exceed chunk_size only via overlapping
            // hard cuts; emit it on its own.
            if window.len() == 1 && window_len(&window) >= self.chunk_size {
                flush(&window, &mut chunks);
                window.clear();
            }
        }

        flush(&window, &mut chunks);
        chunks
    }
}

// Round a byte position down to the nearest UTF-8 character boundary.
fn floor_char_boundary(text: &str, mut pos: usize) -> usize {
    if pos >= text.len() {
        return text.len();
    }
    while pos > 0 && !text.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}
