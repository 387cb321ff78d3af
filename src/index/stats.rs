//! Term and field statistics plus the data-granularity lattice.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How much postings data a query node needs from the index.
///
/// `Docs < Counts < Positions` is the order leaves are opened at. `Scores` is
/// only ever requested by one internal node of another and must never reach a
/// term leaf.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum DataNeeded {
    /// Existence only.
    #[default]
    Docs,
    /// Per-document term frequency.
    Counts,
    /// Per-document position lists.
    Positions,
    /// A numeric score (internal nodes only).
    Scores,
}

impl fmt::Display for DataNeeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataNeeded::Docs => "DOCS",
            DataNeeded::Counts => "COUNTS",
            DataNeeded::Positions => "POSITIONS",
            DataNeeded::Scores => "SCORES",
        };
        f.write_str(name)
    }
}

/// Collection statistics for a term (or any countable expression) in a field.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CountStats {
    /// What these statistics describe, e.g. `body:fox`.
    pub source: String,
    /// Collection frequency: total occurrences.
    pub cf: u64,
    /// Document frequency: documents with at least one occurrence.
    pub df: u64,
    /// Collection length: total tokens in the field.
    pub cl: u64,
    /// Document count: documents that have the field.
    pub dc: u64,
}

impl CountStats {
    /// Create statistics for `source`.
    pub fn new<S: Into<String>>(source: S, cf: u64, df: u64, cl: u64, dc: u64) -> Self {
        CountStats {
            source: source.into(),
            cf,
            df,
            cl,
            dc,
        }
    }

    /// Field-level statistics: no term frequencies, only collection sizes.
    pub fn for_field<S: Into<String>>(field: S, cl: u64, dc: u64) -> Self {
        CountStats::new(field, 0, 0, cl, dc)
    }

    /// Average document length, `cl / dc`.
    pub fn avg_doc_length(&self) -> f64 {
        self.cl as f64 / self.dc as f64
    }

    /// Background probability that never collapses to zero, so a term that
    /// never occurs still receives half an occurrence of mass.
    pub fn nonzero_count_probability(&self) -> f64 {
        (self.cf as f64).max(0.5) / self.cl as f64
    }

    /// Merge statistics from another partition of the same collection.
    pub fn add(&mut self, other: &CountStats) {
        self.cf += other.cf;
        self.df += other.df;
        self.cl += other.cl;
        self.dc += other.dc;
    }
}

impl fmt::Display for CountStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: cf={} df={} cl={} dc={}",
            self.source, self.cf, self.df, self.cl, self.dc
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_needed_order() {
        assert!(DataNeeded::Docs < DataNeeded::Counts);
        assert!(DataNeeded::Counts < DataNeeded::Positions);
        assert_eq!(
            DataNeeded::Counts.max(DataNeeded::Positions),
            DataNeeded::Positions
        );
    }

    #[test]
    fn test_derived_stats() {
        let stats = CountStats::new("body:fox", 20, 20, 200, 30);
        assert!((stats.avg_doc_length() - 200.0 / 30.0).abs() < 1e-9);
        assert!((stats.nonzero_count_probability() - 0.1).abs() < 1e-9);

        let missing = CountStats::new("body:zzz", 0, 0, 200, 30);
        assert!((missing.nonzero_count_probability() - 0.5 / 200.0).abs() < 1e-12);
    }

    #[test]
    fn test_add() {
        let mut a = CountStats::new("body:fox", 1, 1, 10, 2);
        a.add(&CountStats::new("body:fox", 2, 1, 5, 1));
        assert_eq!((a.cf, a.df, a.cl, a.dc), (3, 2, 15, 3));
    }
}
