//! Retrieval models and the nodes that apply them.
//!
//! A [`Scorer`] is a closed-form function of a document's count and field
//! length, with collection statistics fixed at construction. [`ScorerEval`]
//! feeds it from a count child and a lengths node.

use std::fmt::Debug;

use crate::error::{RankError, Result};
use crate::index::CountStats;
use crate::scoring::node::{EvalRef, Explanation, QueryEvalNode, boolean_value, no_count};

/// A retrieval model scoring one count against one field length.
pub trait Scorer: Debug {
    /// Score a document with `count` occurrences in a field of `length` tokens.
    fn score(&self, count: u32, length: u32) -> f64;

    /// Get the name of this scorer.
    fn name(&self) -> &'static str;

    /// Parameters, for explanations.
    fn describe(&self) -> String;
}

/// Okapi BM25.
#[derive(Debug, Clone)]
pub struct BM25Scorer {
    /// Length normalization.
    b: f64,
    /// Term-frequency saturation.
    k: f64,
    /// Average field length.
    avg_field_length: f64,
    /// Precomputed inverse document frequency.
    idf: f64,
    stats: CountStats,
}

impl BM25Scorer {
    /// Create a BM25 scorer for an expression with collection statistics `stats`.
    pub fn new(b: f64, k: f64, stats: CountStats) -> Self {
        let idf = (stats.dc as f64 / (stats.df as f64 + 0.5)).ln();
        BM25Scorer {
            b,
            k,
            avg_field_length: stats.avg_doc_length(),
            idf,
            stats,
        }
    }

    /// The IDF component, `ln(dc / (df + 0.5))`.
    pub fn idf(&self) -> f64 {
        self.idf
    }

    /// The saturated term-frequency component.
    fn tf(&self, count: f64, length: f64) -> f64 {
        let norm = 1.0 - self.b + self.b * (length / self.avg_field_length);
        (count * (self.k + 1.0)) / (count + self.k * norm)
    }
}

impl Scorer for BM25Scorer {
    fn score(&self, count: u32, length: u32) -> f64 {
        self.idf * self.tf(count as f64, length as f64)
    }

    fn name(&self) -> &'static str {
        "bm25"
    }

    fn describe(&self) -> String {
        format!(
            "bm25 b={} k={} idf={} avgdl={} [{}]",
            self.b, self.k, self.idf, self.avg_field_length, self.stats
        )
    }
}

/// Dirichlet-smoothed query likelihood.
#[derive(Debug, Clone)]
pub struct DirichletScorer {
    mu: f64,
    background: f64,
    stats: CountStats,
}

impl DirichletScorer {
    /// Create a Dirichlet scorer; the background mass is `mu * P(expr | collection)`.
    pub fn new(mu: f64, stats: CountStats) -> Self {
        let background = mu * stats.nonzero_count_probability();
        DirichletScorer {
            mu,
            background,
            stats,
        }
    }
}

impl Scorer for DirichletScorer {
    fn score(&self, count: u32, length: u32) -> f64 {
        ((count as f64 + self.background) / (length as f64 + self.mu)).ln()
    }

    fn name(&self) -> &'static str {
        "dirichlet"
    }

    fn describe(&self) -> String {
        format!(
            "dirichlet mu={} bg={} [{}]",
            self.mu, self.background, self.stats
        )
    }
}

/// Absolute-discounting query likelihood.
#[derive(Debug, Clone)]
pub struct AbsoluteDiscountingScorer {
    delta: f64,
    background: f64,
    stats: CountStats,
}

impl AbsoluteDiscountingScorer {
    /// Create an absolute-discounting scorer.
    pub fn new(delta: f64, stats: CountStats) -> Self {
        AbsoluteDiscountingScorer {
            delta,
            background: stats.nonzero_count_probability(),
            stats,
        }
    }
}

impl Scorer for AbsoluteDiscountingScorer {
    fn score(&self, count: u32, length: u32) -> f64 {
        if length == 0 {
            return self.background.ln();
        }
        let length = length as f64;
        let discounted = (count as f64 - self.delta).max(0.0);
        ((discounted + self.delta * length * self.background) / length).ln()
    }

    fn name(&self) -> &'static str {
        "absdisc"
    }

    fn describe(&self) -> String {
        format!(
            "absolute discounting delta={} bg={} [{}]",
            self.delta, self.background, self.stats
        )
    }
}

/// Applies a [`Scorer`] to a count child and the lengths of its field.
#[derive(Debug)]
pub struct ScorerEval<S: Scorer> {
    child: EvalRef,
    lengths: EvalRef,
    scorer: S,
}

impl<S: Scorer> ScorerEval<S> {
    /// Score `child` with `scorer`, normalizing by `lengths`.
    pub fn new(child: EvalRef, lengths: EvalRef, scorer: S) -> Self {
        ScorerEval {
            child,
            lengths,
            scorer,
        }
    }
}

impl<S: Scorer> QueryEvalNode for ScorerEval<S> {
    fn name(&self) -> &'static str {
        self.scorer.name()
    }

    fn score(&self) -> Result<f64> {
        let count = self.child.count()?;
        let length = self.lengths.count()?;
        Ok(self.scorer.score(count, length))
    }

    fn count(&self) -> Result<u32> {
        Err(no_count(self))
    }

    fn matches(&self) -> Result<bool> {
        self.child.matches()
    }

    fn explain(&self) -> Result<Explanation> {
        let count = self.child.count()?;
        let length = self.lengths.count()?;
        Ok(Explanation::new(
            self.matches()?,
            self.scorer.score(count, length),
            format!("{count}/{length} with {}", self.scorer.describe()),
            vec![self.child.explain()?],
        ))
    }

    fn estimate_df(&self) -> u64 {
        self.child.estimate_df()
    }
}

/// Uses the child's count as its score.
#[derive(Debug)]
pub struct CountToScoreEval {
    child: EvalRef,
}

impl CountToScoreEval {
    /// Score = `child.count()`.
    pub fn new(child: EvalRef) -> Self {
        CountToScoreEval { child }
    }
}

impl QueryEvalNode for CountToScoreEval {
    fn name(&self) -> &'static str {
        "count-to-score"
    }

    fn score(&self) -> Result<f64> {
        Ok(self.child.count()? as f64)
    }

    fn count(&self) -> Result<u32> {
        Err(no_count(self))
    }

    fn matches(&self) -> Result<bool> {
        self.child.matches()
    }

    fn explain(&self) -> Result<Explanation> {
        Ok(Explanation::new(
            self.matches()?,
            self.score()?,
            "count as score",
            vec![self.child.explain()?],
        ))
    }

    fn estimate_df(&self) -> u64 {
        self.child.estimate_df()
    }
}

/// Turns a match into one of two scores.
#[derive(Debug)]
pub struct BoolToScoreEval {
    child: EvalRef,
    true_score: f64,
    false_score: f64,
}

impl BoolToScoreEval {
    /// `true_score` when `child` matches, `false_score` otherwise.
    pub fn new(child: EvalRef, true_score: f64, false_score: f64) -> Self {
        BoolToScoreEval {
            child,
            true_score,
            false_score,
        }
    }
}

impl QueryEvalNode for BoolToScoreEval {
    fn name(&self) -> &'static str {
        "bool-to-score"
    }

    fn score(&self) -> Result<f64> {
        Ok(if self.child.matches()? {
            self.true_score
        } else {
            self.false_score
        })
    }

    fn count(&self) -> Result<u32> {
        Err(no_count(self))
    }

    fn matches(&self) -> Result<bool> {
        self.child.matches()
    }

    fn explain(&self) -> Result<Explanation> {
        let matched = self.matches()?;
        Ok(Explanation::new(
            matched,
            self.score()?,
            format!("bool {} as score", boolean_value(matched)),
            vec![self.child.explain()?],
        ))
    }

    fn estimate_df(&self) -> u64 {
        self.child.estimate_df()
    }
}

/// Statistics a scorer was compiled without.
pub(crate) fn missing_stats(expr: &impl std::fmt::Display) -> RankError {
    RankError::structure(format!(
        "no collection statistics for {expr}; attach statistics before compiling"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(cf: u64, df: u64, cl: u64, dc: u64) -> CountStats {
        CountStats::new("body:x", cf, df, cl, dc)
    }

    #[test]
    fn test_bm25_closed_form() {
        let s = stats(30, 20, 2000, 100);
        let scorer = BM25Scorer::new(0.75, 1.2, s);
        let (c, l) = (3.0_f64, 25.0_f64);
        let avg = 2000.0 / 100.0;
        let idf = (100.0_f64 / 20.5).ln();
        let expected = idf * (c * 2.2) / (c + 1.2 * (1.0 - 0.75 + 0.75 * l / avg));
        assert!((scorer.score(3, 25) - expected).abs() < 1e-4);
        assert!((scorer.idf() - idf).abs() < 1e-12);
        assert_eq!(scorer.score(0, 25), 0.0);
    }

    #[test]
    fn test_dirichlet_closed_form() {
        let s = stats(30, 20, 2000, 100);
        let scorer = DirichletScorer::new(1500.0, s);
        let bg = 1500.0 * 30.0 / 2000.0;
        let expected = ((3.0 + bg) / (25.0 + 1500.0_f64)).ln();
        assert!((scorer.score(3, 25) - expected).abs() < 1e-4);
    }

    #[test]
    fn test_dirichlet_missing_term_is_finite() {
        let scorer = DirichletScorer::new(1500.0, stats(0, 0, 2000, 100));
        let score = scorer.score(0, 25);
        assert!(score.is_finite());
        let expected = ((1500.0 * 0.5 / 2000.0) / 1525.0_f64).ln();
        assert!((score - expected).abs() < 1e-9);
    }

    #[test]
    fn test_absolute_discounting() {
        let scorer = AbsoluteDiscountingScorer::new(0.7, stats(30, 20, 2000, 100));
        let bg = 30.0 / 2000.0;
        let expected = ((3.0 - 0.7 + 0.7 * 25.0 * bg) / 25.0_f64).ln();
        assert!((scorer.score(3, 25) - expected).abs() < 1e-9);
        assert!((scorer.score(0, 0) - bg.ln()).abs() < 1e-12);
    }
}
