//! # lodestone-context
//!
//! Text chunking for the lodestone document retrieval system.
//!
//! This crate is a pure library with no async, no IO and no storage: it
//! turns one text segment into a sequence of bounded, overlapping
//! [`ChunkSpan`]s suitable for embedding. Splitting honors a separator
//! priority list (paragraph breaks first, then line breaks, then spaces)
//! and only hard-cuts text that contains no separators at all.
//!
//! See [`splitter::TextSplitter`] for the algorithm and its invariants.

pub mod splitter;

pub use splitter::{ChunkSpan, DEFAULT_SEPARATORS, TextSplitter};
