//! Collector implementations for gathering search results.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt::Debug;

use crate::error::Result;
use crate::index::DocId;
use crate::search::SearchHit;

/// Trait for collecting search results.
pub trait Collector: Send + Debug {
    /// Collect a document hit. `doc_id` is global.
    fn collect(&mut self, doc_id: DocId, score: f64) -> Result<()>;

    /// Get the final results, best first.
    fn results(&self) -> Vec<SearchHit>;

    /// Get the total number of hits collected.
    fn total_hits(&self) -> u64;

    /// Whether `collect` uses the score. When false, documents are only
    /// matched and never scored.
    fn needs_scores(&self) -> bool {
        true
    }
}

/// A collector that keeps the top N documents by score.
///
/// Ties are broken by ascending document id, so the ranking is
/// deterministic regardless of segment scheduling.
#[derive(Debug)]
pub struct TopDocsCollector {
    /// Maximum number of documents to collect.
    max_docs: usize,
    /// Collected hits; the worst one is on top.
    hits: BinaryHeap<ScoredDoc>,
    /// Total number of documents processed.
    total_hits: u64,
}

/// A scored document for use in the heap.
#[derive(Debug, Clone, Copy)]
struct ScoredDoc {
    doc_id: DocId,
    score: f64,
}

impl PartialEq for ScoredDoc {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScoredDoc {}

impl PartialOrd for ScoredDoc {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoredDoc {
    fn cmp(&self, other: &Self) -> Ordering {
        // Greater means worse: lower score, then higher doc id.
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.doc_id.cmp(&other.doc_id))
    }
}

impl TopDocsCollector {
    /// Create a new top docs collector.
    pub fn new(max_docs: usize) -> Self {
        TopDocsCollector {
            max_docs,
            hits: BinaryHeap::with_capacity(max_docs.min(1024)),
            total_hits: 0,
        }
    }

    /// Get the lowest score that is currently kept, once the collector is full.
    pub fn current_min_score(&self) -> Option<f64> {
        if self.hits.len() < self.max_docs {
            None
        } else {
            self.hits.peek().map(|doc| doc.score)
        }
    }

    /// Fold the hits of another collector (e.g. another segment) into this one.
    pub fn merge(&mut self, other: TopDocsCollector) {
        self.total_hits += other.total_hits;
        for doc in other.hits {
            self.offer(doc);
        }
    }

    fn offer(&mut self, doc: ScoredDoc) {
        if self.max_docs == 0 {
            return;
        }
        if self.hits.len() < self.max_docs {
            self.hits.push(doc);
        } else if let Some(mut worst) = self.hits.peek_mut() {
            if doc < *worst {
                *worst = doc;
            }
        }
    }
}

impl Collector for TopDocsCollector {
    fn collect(&mut self, doc_id: DocId, score: f64) -> Result<()> {
        self.total_hits += 1;
        self.offer(ScoredDoc { doc_id, score });
        Ok(())
    }

    fn results(&self) -> Vec<SearchHit> {
        self.hits
            .clone()
            .into_sorted_vec()
            .into_iter()
            .map(|doc| SearchHit {
                doc_id: doc.doc_id,
                score: doc.score,
                name: None,
            })
            .collect()
    }

    fn total_hits(&self) -> u64 {
        self.total_hits
    }
}

/// A collector that just counts the number of matching documents.
#[derive(Debug, Default)]
pub struct CountCollector {
    /// Total number of documents that matched.
    count: u64,
}

impl CountCollector {
    /// Create a new count collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold the count of another collector into this one.
    pub fn merge(&mut self, other: CountCollector) {
        self.count += other.count;
    }
}

impl Collector for CountCollector {
    fn collect(&mut self, _doc_id: DocId, _score: f64) -> Result<()> {
        self.count += 1;
        Ok(())
    }

    fn results(&self) -> Vec<SearchHit> {
        Vec::new()
    }

    fn needs_scores(&self) -> bool {
        false
    }

    fn total_hits(&self) -> u64 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(hits: &[SearchHit]) -> Vec<DocId> {
        hits.iter().map(|h| h.doc_id).collect()
    }

    #[test]
    fn test_top_docs_collector() {
        let mut collector = TopDocsCollector::new(3);

        collector.collect(1, 0.5).unwrap();
        collector.collect(2, 0.8).unwrap();
        collector.collect(3, 0.3).unwrap();
        collector.collect(4, 0.9).unwrap();
        collector.collect(5, 0.1).unwrap();

        let results = collector.results();
        assert_eq!(ids(&results), vec![4, 2, 1]);
        assert_eq!(results[0].score, 0.9);
        assert_eq!(collector.total_hits(), 5);
        assert_eq!(collector.current_min_score(), Some(0.5));
    }

    #[test]
    fn test_ties_prefer_lower_doc() {
        let mut collector = TopDocsCollector::new(2);
        collector.collect(7, -1.0).unwrap();
        collector.collect(3, -1.0).unwrap();
        collector.collect(5, -1.0).unwrap();
        assert_eq!(ids(&collector.results()), vec![3, 5]);
    }

    #[test]
    fn test_negative_scores_and_merge() {
        let mut first = TopDocsCollector::new(2);
        first.collect(0, -3.5).unwrap();
        first.collect(1, -2.0).unwrap();
        let mut second = TopDocsCollector::new(2);
        second.collect(10, -1.0).unwrap();
        second.collect(11, -9.0).unwrap();

        first.merge(second);
        assert_eq!(ids(&first.results()), vec![10, 1]);
        assert_eq!(first.total_hits(), 4);
    }

    #[test]
    fn test_zero_capacity_and_count() {
        let mut none = TopDocsCollector::new(0);
        none.collect(1, 1.0).unwrap();
        assert!(none.results().is_empty());
        assert_eq!(none.total_hits(), 1);

        let mut count = CountCollector::new();
        count.collect(1, 0.0).unwrap();
        count.collect(2, 0.0).unwrap();
        let mut other = CountCollector::new();
        other.collect(9, 0.0).unwrap();
        count.merge(other);
        assert_eq!(count.total_hits(), 3);
        assert!(count.results().is_empty());
        assert!(!count.needs_scores());
        assert!(none.needs_scores());
    }
}
