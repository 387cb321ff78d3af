//! Derivation of candidate-generation ("movement") expressions.
//!
//! A movement expression only answers "could this document match?". It is
//! built from And/Or, term leaves at [`DataNeeded::Docs`] and the constant
//! match leaves, so it can be driven by cheap document-id iterators.

use log::debug;

use crate::error::Result;
use crate::index::DataNeeded;
use crate::lang::expr::QExpr;
use crate::lang::optimize::simplify;

/// Structural movement expression for `expr`, without simplification.
pub fn movement_expr(expr: &QExpr) -> QExpr {
    fn each(children: &[QExpr]) -> Vec<QExpr> {
        children.iter().map(movement_expr).collect()
    }

    match expr {
        QExpr::Text(t) => {
            let mut t = t.clone();
            t.needed = DataNeeded::Docs;
            QExpr::Text(t)
        }
        QExpr::Lengths(_)
        | QExpr::ConstCount { .. }
        | QExpr::ConstBool(true)
        | QExpr::AlwaysMatch(_)
        | QExpr::AlwaysMatchLeaf => QExpr::AlwaysMatchLeaf,
        QExpr::ConstScore(_) | QExpr::ConstBool(false) | QExpr::NeverMatchLeaf => {
            QExpr::NeverMatchLeaf
        }
        QExpr::Whitelist(_) | QExpr::RawQuery(_) => expr.clone(),

        QExpr::Weight { child, .. }
        | QExpr::DirQL { child, .. }
        | QExpr::AbsoluteDiscountingQL { child, .. }
        | QExpr::BM25 { child, .. }
        | QExpr::CountToScore(child)
        | QExpr::BoolToScore { child, .. }
        | QExpr::CountToBool { child, .. } => movement_expr(child),

        QExpr::And(children)
        | QExpr::OrderedWindow { children, .. }
        | QExpr::UnorderedWindow { children, .. }
        | QExpr::Prox { children, .. }
        | QExpr::SmallerCount(children)
        | QExpr::UnorderedWindowCeiling { children, .. } => QExpr::And(each(children)),

        QExpr::Or(children)
        | QExpr::Combine { children, .. }
        | QExpr::Max(children)
        | QExpr::Mult(children)
        | QExpr::Synonym(children) => QExpr::Or(each(children)),
        QExpr::Multi(named) => QExpr::Or(named.iter().map(|(_, e)| movement_expr(e)).collect()),

        QExpr::Require { cond, .. } => QExpr::Require {
            cond: Box::new(movement_expr(cond)),
            value: Box::new(QExpr::AlwaysMatchLeaf),
        },
    }
}

/// Movement expression for `expr`, boolean-simplified.
pub fn create_optimized_movement_expr(expr: &QExpr, max_iterations: usize) -> Result<QExpr> {
    let movement = simplify(&movement_expr(expr), max_iterations)?;
    debug!("movement for {expr} is {movement}");
    Ok(movement)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::builder::{bm25, dirichlet, mean, never_match, require};

    fn t(s: &str) -> QExpr {
        QExpr::text(s)
    }

    #[test]
    fn test_scorers_move_like_disjunctions() {
        let q = mean(vec![dirichlet(t("a")), bm25(t("b"))]);
        let m = create_optimized_movement_expr(&q, 100).unwrap();
        assert_eq!(m, QExpr::Or(vec![t("a"), t("b")]));
    }

    #[test]
    fn test_windows_move_like_conjunctions() {
        let q = dirichlet(QExpr::OrderedWindow {
            children: vec![t("a"), t("b")],
            step: 1,
        });
        let m = create_optimized_movement_expr(&q, 100).unwrap();
        assert_eq!(m, QExpr::And(vec![t("a"), t("b")]));
    }

    #[test]
    fn test_require_keeps_condition_only() {
        let q = require(t("a"), mean(vec![dirichlet(t("b")), dirichlet(t("c"))]));
        assert_eq!(
            movement_expr(&q),
            QExpr::Require {
                cond: Box::new(t("a")),
                value: Box::new(QExpr::AlwaysMatchLeaf),
            }
        );
    }

    #[test]
    fn test_constant_leaves() {
        let q = mean(vec![dirichlet(t("a")), QExpr::ConstScore(1.0)]);
        let m = create_optimized_movement_expr(&q, 100).unwrap();
        assert_eq!(m, QExpr::Or(vec![t("a")]));

        let q = mean(vec![dirichlet(t("a")), QExpr::AlwaysMatch(Box::new(dirichlet(t("b"))))]);
        let m = create_optimized_movement_expr(&q, 100).unwrap();
        assert_eq!(m, QExpr::AlwaysMatchLeaf);
    }

    #[test]
    fn test_never_match_feature() {
        let q = mean(vec![dirichlet(t("a")), never_match(dirichlet(t("b")))]);
        let m = movement_expr(&q);
        assert_eq!(
            m,
            QExpr::Or(vec![
                t("a"),
                QExpr::Require {
                    cond: Box::new(QExpr::NeverMatchLeaf),
                    value: Box::new(QExpr::AlwaysMatchLeaf),
                },
            ])
        );
    }

    #[test]
    fn test_movement_terms_need_docs_only() {
        let mut text = crate::lang::expr::TextExpr::new("a");
        text.needed = DataNeeded::Positions;
        let m = movement_expr(&QExpr::Text(text));
        assert_eq!(m.text_nodes()[0].needed, DataNeeded::Docs);
    }
}
