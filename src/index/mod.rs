//! The inverted-index collaborator surface.
//!
//! The query engine never reads index files itself. It consumes postings,
//! lengths and statistics through [`IndexReader`] and [`SegmentReader`], and
//! ships an in-memory implementation ([`memory::MemoryIndex`]) for tests and
//! small collections.

pub mod memory;
pub mod segment;
pub mod stats;

pub use self::memory::{MemoryIndex, MemoryIndexBuilder, MemorySegment};
pub use self::segment::{IndexReader, Postings, SegmentReader};
pub use self::stats::{CountStats, DataNeeded};

/// Document identifier. Segment readers use segment-relative ids; the search
/// layer reports global ids (`doc_base + local`).
pub type DocId = u32;

/// Sentinel returned by iterators once they are exhausted.
pub const NO_MORE_DOCS: DocId = u32::MAX;
