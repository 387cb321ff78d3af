//! Data-requirement inference.
//!
//! Walks the tree top-down deciding, for every term leaf, how much postings
//! data its ancestors will ask of it. Shapes that could only fail at
//! evaluation time (a bare term under a scorer combination, a window over a
//! score) are rejected here instead.

use ahash::AHashMap;
use log::trace;

use crate::error::{RankError, Result};
use crate::index::DataNeeded;
use crate::lang::expr::QExpr;

/// Annotate every term leaf with the data granularity it must be opened at.
///
/// `root` is what the caller will ask of the root: [`DataNeeded::Scores`]
/// for ranking, [`DataNeeded::Docs`] when only matches are counted.
/// Identical terms in the same field end up with the maximum of every
/// requester.
pub fn infer_data_needs(expr: &QExpr, root: DataNeeded) -> Result<QExpr> {
    let analyzed = analyze(expr, root)?;

    let mut max_needed: AHashMap<(String, Option<String>), DataNeeded> = AHashMap::new();
    for t in analyzed.text_nodes() {
        let entry = max_needed
            .entry((t.text.clone(), t.field.clone()))
            .or_default();
        *entry = (*entry).max(t.needed);
    }
    Ok(unify(&analyzed, &max_needed))
}

fn unify(expr: &QExpr, max_needed: &AHashMap<(String, Option<String>), DataNeeded>) -> QExpr {
    match expr {
        QExpr::Text(t) => {
            let mut t = t.clone();
            if let Some(&needed) = max_needed.get(&(t.text.clone(), t.field.clone())) {
                t.needed = needed;
            }
            QExpr::Text(t)
        }
        other => other.map_children(|c| unify(c, max_needed)),
    }
}

/// Nodes whose `count()` is a contract violation.
fn is_score_only(expr: &QExpr) -> bool {
    matches!(
        expr,
        QExpr::Combine { .. }
            | QExpr::Weight { .. }
            | QExpr::DirQL { .. }
            | QExpr::AbsoluteDiscountingQL { .. }
            | QExpr::BM25 { .. }
            | QExpr::Mult(_)
            | QExpr::CountToScore(_)
            | QExpr::BoolToScore { .. }
            | QExpr::ConstScore(_)
    )
}

/// Nodes whose `score()` is a contract violation.
fn is_count_only(expr: &QExpr) -> bool {
    matches!(
        expr,
        QExpr::Text(_)
            | QExpr::Lengths(_)
            | QExpr::ConstCount { .. }
            | QExpr::Synonym(_)
            | QExpr::OrderedWindow { .. }
            | QExpr::UnorderedWindow { .. }
            | QExpr::Prox { .. }
            | QExpr::SmallerCount(_)
            | QExpr::UnorderedWindowCeiling { .. }
            | QExpr::RawQuery(_)
    )
}

/// Nodes that can report positions for the current document.
fn has_positions(expr: &QExpr) -> bool {
    matches!(
        expr,
        QExpr::Text(_)
            | QExpr::Synonym(_)
            | QExpr::OrderedWindow { .. }
            | QExpr::UnorderedWindow { .. }
            | QExpr::Prox { .. }
            | QExpr::AlwaysMatch(_)
            | QExpr::Require { .. }
    )
}

fn require_arity(expr: &QExpr, what: &str) -> Result<()> {
    if expr.children().len() < 2 {
        return Err(RankError::type_check(format!(
            "need more than 1 child for a {what} expression, e.g. {expr}"
        )));
    }
    Ok(())
}

fn analyze(expr: &QExpr, needed: DataNeeded) -> Result<QExpr> {
    if matches!(needed, DataNeeded::Counts | DataNeeded::Positions) && is_score_only(expr) {
        return Err(RankError::type_check(format!(
            "{expr} only produces scores but {needed} were requested"
        )));
    }
    if needed == DataNeeded::Positions && !has_positions(expr) {
        return Err(RankError::type_check(format!(
            "{expr} cannot provide positions"
        )));
    }

    if needed == DataNeeded::Scores && is_count_only(expr) {
        return Err(RankError::type_check(format!(
            "cannot convert {expr} to a score; wrap it in a scorer such as dirichlet or bm25"
        )));
    }

    let child_needs = match expr {
        QExpr::Text(t) => {
            let mut t = t.clone();
            t.needed = t.needed.max(needed);
            trace!("{expr} needs {}", t.needed);
            return Ok(QExpr::Text(t));
        }
        QExpr::Lengths(_)
        | QExpr::ConstScore(_)
        | QExpr::ConstCount { .. }
        | QExpr::ConstBool(_)
        | QExpr::Whitelist(_)
        | QExpr::AlwaysMatchLeaf
        | QExpr::NeverMatchLeaf
        | QExpr::RawQuery(_) => return Ok(expr.clone()),

        QExpr::And(_) | QExpr::Or(_) => DataNeeded::Docs,
        QExpr::AlwaysMatch(_) | QExpr::Multi(_) | QExpr::Synonym(_) => needed,
        QExpr::Max(_) if needed == DataNeeded::Counts => DataNeeded::Counts,
        QExpr::Weight { .. } | QExpr::Combine { .. } | QExpr::Mult(_) | QExpr::Max(_) => {
            DataNeeded::Scores
        }
        QExpr::SmallerCount(_) | QExpr::UnorderedWindowCeiling { .. } => {
            require_arity(expr, "count summary")?;
            DataNeeded::Counts
        }
        QExpr::OrderedWindow { .. } | QExpr::UnorderedWindow { .. } | QExpr::Prox { .. } => {
            require_arity(expr, "window")?;
            DataNeeded::Positions
        }
        QExpr::DirQL { .. }
        | QExpr::AbsoluteDiscountingQL { .. }
        | QExpr::BM25 { .. }
        | QExpr::CountToScore(_)
        | QExpr::CountToBool { .. } => DataNeeded::Counts,
        QExpr::BoolToScore { .. } => DataNeeded::Docs,
        QExpr::Require { cond, value } => {
            return Ok(QExpr::Require {
                cond: Box::new(analyze(cond, DataNeeded::Docs)?),
                value: Box::new(analyze(value, needed)?),
            });
        }
    };

    expr.try_map_children(|c| analyze(c, child_needs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::builder::{bm25, dirichlet, mean, require};

    fn needs(expr: &QExpr) -> Vec<DataNeeded> {
        expr.text_nodes().iter().map(|t| t.needed).collect()
    }

    fn od(a: &str, b: &str) -> QExpr {
        QExpr::OrderedWindow {
            children: vec![QExpr::text(a), QExpr::text(b)],
            step: 1,
        }
    }

    #[test]
    fn test_and_needs_docs() {
        let q = QExpr::And(vec![QExpr::text("a"), QExpr::text("b"), QExpr::text("c")]);
        let analyzed = infer_data_needs(&q, DataNeeded::Docs).unwrap();
        assert_eq!(needs(&analyzed), vec![DataNeeded::Docs; 3]);
    }

    #[test]
    fn test_window_needs_positions() {
        let analyzed = infer_data_needs(&od("a", "b"), DataNeeded::Docs).unwrap();
        assert_eq!(needs(&analyzed), vec![DataNeeded::Positions; 2]);

        let scored = infer_data_needs(&dirichlet(od("a", "b")), DataNeeded::Scores).unwrap();
        assert_eq!(needs(&scored), vec![DataNeeded::Positions; 2]);
    }

    #[test]
    fn test_scorers_need_counts() {
        let q = mean(vec![dirichlet(QExpr::text("a")), bm25(QExpr::text("b"))]);
        let analyzed = infer_data_needs(&q, DataNeeded::Docs).unwrap();
        assert_eq!(needs(&analyzed), vec![DataNeeded::Counts; 2]);
    }

    #[test]
    fn test_bare_terms_cannot_be_scored() {
        let q = mean(vec![QExpr::text("a"), QExpr::text("b")]);
        let err = infer_data_needs(&q, DataNeeded::Docs).unwrap_err();
        assert!(matches!(err, RankError::TypeCheck(_)));
        assert!(err.is_preparation());
    }

    #[test]
    fn test_window_arity() {
        let q = QExpr::UnorderedWindow {
            children: vec![QExpr::text("a")],
            width: 8,
        };
        assert!(matches!(infer_data_needs(&q, DataNeeded::Docs), Err(RankError::TypeCheck(_))));
        let q = QExpr::SmallerCount(vec![QExpr::text("a")]);
        assert!(infer_data_needs(&q, DataNeeded::Docs).is_err());
    }

    #[test]
    fn test_shared_terms_take_max() {
        let q = mean(vec![dirichlet(QExpr::text("a")), dirichlet(od("a", "b"))]);
        let analyzed = infer_data_needs(&q, DataNeeded::Docs).unwrap();
        assert_eq!(needs(&analyzed), vec![DataNeeded::Positions; 3]);
    }

    #[test]
    fn test_require_splits_needs() {
        let q = require(QExpr::text("a"), dirichlet(QExpr::text("b")));
        let analyzed = infer_data_needs(&q, DataNeeded::Docs).unwrap();
        assert_eq!(needs(&analyzed), vec![DataNeeded::Docs, DataNeeded::Counts]);
    }

    #[test]
    fn test_counts_cannot_be_scored() {
        let q = mean(vec![od("a", "b"), dirichlet(QExpr::text("c"))]);
        assert!(matches!(infer_data_needs(&q, DataNeeded::Docs), Err(RankError::TypeCheck(_))));
        let q = QExpr::Combine {
            children: vec![QExpr::Lengths(crate::lang::expr::LengthsExpr::of("body"))],
            weights: vec![1.0],
        };
        assert!(infer_data_needs(&q, DataNeeded::Docs).is_err());
    }

    #[test]
    fn test_max_passes_counts() {
        let q = dirichlet(QExpr::Max(vec![QExpr::text("a"), QExpr::text("b")]));
        let analyzed = infer_data_needs(&q, DataNeeded::Docs).unwrap();
        assert_eq!(needs(&analyzed), vec![DataNeeded::Counts; 2]);

        let q = QExpr::Max(vec![dirichlet(QExpr::text("a")), bm25(QExpr::text("b"))]);
        let analyzed = infer_data_needs(&q, DataNeeded::Scores).unwrap();
        assert_eq!(needs(&analyzed), vec![DataNeeded::Counts; 2]);
    }

    #[test]
    fn test_scores_cannot_feed_windows() {
        let q = QExpr::OrderedWindow {
            children: vec![dirichlet(QExpr::text("a")), QExpr::text("b")],
            step: 1,
        };
        assert!(matches!(infer_data_needs(&q, DataNeeded::Docs), Err(RankError::TypeCheck(_))));
        let q = dirichlet(mean(vec![dirichlet(QExpr::text("a"))]));
        assert!(matches!(infer_data_needs(&q, DataNeeded::Docs), Err(RankError::TypeCheck(_))));
    }

    #[test]
    fn test_ranked_root_must_score() {
        for q in [QExpr::text("a"), od("a", "b"), QExpr::Synonym(vec![QExpr::text("a")])] {
            let err = infer_data_needs(&q, DataNeeded::Scores).unwrap_err();
            assert!(matches!(err, RankError::TypeCheck(_)), "{q}");
            assert!(infer_data_needs(&q, DataNeeded::Docs).is_ok(), "{q}");
        }

        let q = QExpr::And(vec![QExpr::text("a"), QExpr::text("b")]);
        let analyzed = infer_data_needs(&q, DataNeeded::Scores).unwrap();
        assert_eq!(needs(&analyzed), vec![DataNeeded::Docs; 2]);
    }
}
