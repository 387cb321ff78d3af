//! Reader traits consumed by the query engine.

use std::fmt::Debug;
use std::sync::Arc;

use crate::error::{RankError, Result};
use crate::index::stats::{CountStats, DataNeeded};
use crate::index::DocId;

/// Iterator over one term's posting list within a segment.
///
/// A fresh iterator is positioned on its first document.
pub trait Postings: Send + Debug {
    /// The current document, or [`NO_MORE_DOCS`](crate::index::NO_MORE_DOCS).
    fn doc_id(&self) -> DocId;

    /// Move to the first document `>= target` and return it.
    ///
    /// Never moves backwards: a target at or before the current document
    /// leaves the iterator where it is.
    fn advance(&mut self, target: DocId) -> Result<DocId>;

    /// Term frequency in the current document.
    fn count(&self) -> u32;

    /// Positions in the current document. Only valid for iterators opened at
    /// [`DataNeeded::Positions`].
    fn positions(&self) -> Result<Vec<u32>>;

    /// Number of documents in this posting list.
    fn cost(&self) -> u64;
}

/// One independently searchable partition of an index.
pub trait SegmentReader: Send + Sync + Debug {
    /// Global id of this segment's first document.
    fn doc_base(&self) -> DocId;

    /// Number of documents in this segment.
    fn num_docs(&self) -> u32;

    /// Open a posting list at the requested granularity, or `None` if the
    /// term does not occur in this segment.
    fn open_postings(
        &self,
        term: &str,
        field: &str,
        needed: DataNeeded,
    ) -> Result<Option<Box<dyn Postings>>>;

    /// Length of `field` in segment-relative document `doc`.
    fn field_length(&self, doc: DocId, field: &str) -> Result<u32>;

    /// Run an index-native query string and return the documents it matches.
    fn raw_query(&self, query: &str) -> Result<Option<Box<dyn Postings>>> {
        Err(RankError::index(format!(
            "raw queries are not supported by this segment: {query}"
        )))
    }
}

/// Collection-wide view over all segments of an index.
pub trait IndexReader: Send + Sync + Debug {
    /// The segments, ordered by `doc_base`.
    fn segments(&self) -> &[Arc<dyn SegmentReader>];

    /// Total number of documents across all segments.
    fn doc_count(&self) -> u64 {
        self.segments().iter().map(|s| s.num_docs() as u64).sum()
    }

    /// Resolve external document names to global ids. Unknown names are skipped.
    fn lookup_document_ids(&self, names: &[String]) -> Result<Vec<DocId>>;

    /// External name of a global document id.
    fn document_name(&self, doc: DocId) -> Result<Option<String>>;

    /// Statistics of `term` in `field`.
    fn term_stats(&self, term: &str, field: &str) -> Result<CountStats>;

    /// Collection-wide statistics of `field`, or `None` if it was never indexed.
    fn field_stats(&self, field: &str) -> Result<Option<CountStats>>;
}
