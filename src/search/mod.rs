//! Query execution: preparation, per-segment search and result collection.

pub mod collector;
pub mod engine;

pub use self::collector::{Collector, CountCollector, TopDocsCollector};
pub use self::engine::{PreparedQuery, QueryEngine};

use serde::{Deserialize, Serialize};

use crate::index::DocId;

/// A single ranked document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Global document ID.
    pub doc_id: DocId,
    /// Score of the document.
    pub score: f64,
    /// External document name, if the index knows it.
    pub name: Option<String>,
}

/// Ranked results of one search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopDocs {
    /// Hits, best first.
    pub hits: Vec<SearchHit>,
    /// Number of documents that matched, including those outside the top k.
    pub total_hits: u64,
}

impl TopDocs {
    /// Check if no document matched.
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Global ids of the hits, best first.
    pub fn doc_ids(&self) -> Vec<DocId> {
        self.hits.iter().map(|h| h.doc_id).collect()
    }
}
