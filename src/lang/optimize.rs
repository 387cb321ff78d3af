//! Fixed-point expression rewriting.
//!
//! Two rule sets run in every pass: weight combination (collapse nested
//! weights, push weights into combines, merge duplicate combine children,
//! flatten nested combines) and boolean simplification (flatten nested
//! AND/OR, drop redundant constant children). [`simplify`] repeats passes
//! until one changes nothing.

use log::{debug, warn};

use crate::error::{RankError, Result};
use crate::lang::expr::QExpr;

/// Rewrite until nothing changes, giving up after `max_iterations` passes
/// that each changed the tree. The final pass that confirms the fixed point
/// is not counted.
///
/// Every combine must carry exactly one weight per child.
pub fn simplify(expr: &QExpr, max_iterations: usize) -> Result<QExpr> {
    check_combine_weights(expr)?;
    let mut current = expr.clone();
    for iteration in 0..=max_iterations {
        let (next, changed) = rewrite_once(&current);
        if !changed {
            debug!("optimizer converged after {iteration} rewriting passes");
            return Ok(next);
        }
        current = next;
    }
    warn!("optimizer hit its limit of {max_iterations} passes on {expr}");
    Err(RankError::structure(format!(
        "rewriting did not converge within {max_iterations} passes: {expr}"
    )))
}

fn check_combine_weights(expr: &QExpr) -> Result<()> {
    if let QExpr::Combine { children, weights } = expr {
        if children.len() != weights.len() {
            return Err(RankError::structure(format!(
                "combine has {} children but {} weights",
                children.len(),
                weights.len()
            )));
        }
    }
    expr.children().into_iter().try_for_each(check_combine_weights)
}

/// One full pass of both rule sets. Returns the rewritten tree and whether
/// any rule fired.
pub fn rewrite_once(expr: &QExpr) -> (QExpr, bool) {
    let mut rewriter = Rewriter::default();
    let weighted = rewriter.combine_weights(expr);
    let simplified = rewriter.simplify_boolean(&weighted);
    (simplified, rewriter.changed)
}

#[derive(Debug, Default)]
struct Rewriter {
    changed: bool,
}

impl Rewriter {
    fn combine_weights(&mut self, q: &QExpr) -> QExpr {
        match q {
            QExpr::Weight { child, weight } => match child.as_ref() {
                QExpr::Weight {
                    child: inner,
                    weight: inner_weight,
                } => {
                    self.changed = true;
                    QExpr::Weight {
                        child: Box::new(self.combine_weights(inner)),
                        weight: weight * inner_weight,
                    }
                }
                QExpr::Combine { children, weights } => {
                    self.changed = true;
                    QExpr::Combine {
                        children: children.iter().map(|c| self.combine_weights(c)).collect(),
                        weights: weights.iter().map(|w| w * weight).collect(),
                    }
                }
                _ => QExpr::Weight {
                    child: Box::new(self.combine_weights(child)),
                    weight: *weight,
                },
            },
            QExpr::Combine { children, weights } => {
                if has_duplicates(children) {
                    self.merge_duplicates(children, weights)
                } else if children
                    .iter()
                    .any(|c| matches!(c, QExpr::Combine { .. } | QExpr::Weight { .. }))
                {
                    self.flatten_combine(children, weights)
                } else {
                    QExpr::Combine {
                        children: children.iter().map(|c| self.combine_weights(c)).collect(),
                        weights: weights.clone(),
                    }
                }
            }
            other => other.map_children(|c| self.combine_weights(c)),
        }
    }

    /// Sum the weights of identical children, keeping first-occurrence order.
    fn merge_duplicates(&mut self, children: &[QExpr], weights: &[f64]) -> QExpr {
        let mut merged: Vec<(&QExpr, f64)> = Vec::with_capacity(children.len());
        for (child, weight) in children.iter().zip(weights) {
            match merged.iter_mut().find(|(seen, _)| *seen == child) {
                Some((_, total)) => *total += weight,
                None => merged.push((child, *weight)),
            }
        }
        self.changed = true;
        QExpr::Combine {
            children: merged.iter().map(|(c, _)| self.combine_weights(c)).collect(),
            weights: merged.iter().map(|(_, w)| *w).collect(),
        }
    }

    fn flatten_combine(&mut self, children: &[QExpr], weights: &[f64]) -> QExpr {
        let mut flat_children = Vec::with_capacity(children.len());
        let mut flat_weights = Vec::with_capacity(children.len());
        for (child, weight) in children.iter().zip(weights) {
            match child {
                QExpr::Combine {
                    children: inner,
                    weights: inner_weights,
                } => {
                    for (c, w) in inner.iter().zip(inner_weights) {
                        flat_children.push(c);
                        flat_weights.push(weight * w);
                    }
                }
                QExpr::Weight {
                    child: inner,
                    weight: inner_weight,
                } => {
                    flat_children.push(inner.as_ref());
                    flat_weights.push(weight * inner_weight);
                }
                _ => {
                    flat_children.push(child);
                    flat_weights.push(*weight);
                }
            }
        }
        self.changed = true;
        QExpr::Combine {
            children: flat_children
                .into_iter()
                .map(|c| self.combine_weights(c))
                .collect(),
            weights: flat_weights,
        }
    }

    fn simplify_boolean(&mut self, q: &QExpr) -> QExpr {
        match q {
            QExpr::And(children) => {
                let children = self.flatten_boolean(children, true);
                if children.contains(&QExpr::NeverMatchLeaf) {
                    self.changed = true;
                    return QExpr::NeverMatchLeaf;
                }
                self.drop_identity(children, QExpr::AlwaysMatchLeaf, QExpr::And)
            }
            QExpr::Or(children) => {
                let children = self.flatten_boolean(children, false);
                if children.contains(&QExpr::AlwaysMatchLeaf) {
                    self.changed = true;
                    return QExpr::AlwaysMatchLeaf;
                }
                self.drop_identity(children, QExpr::NeverMatchLeaf, QExpr::Or)
            }
            other => other.map_children(|c| self.simplify_boolean(c)),
        }
    }

    /// Simplify the children of an AND (`conjunction`) or OR, splice in
    /// children of the same operator and drop exact duplicates.
    fn flatten_boolean(&mut self, children: &[QExpr], conjunction: bool) -> Vec<QExpr> {
        let simplified: Vec<QExpr> = children.iter().map(|c| self.simplify_boolean(c)).collect();
        let mut out: Vec<QExpr> = Vec::with_capacity(simplified.len());
        for child in simplified {
            let spliced = match (conjunction, child) {
                (true, QExpr::And(inner)) | (false, QExpr::Or(inner)) => {
                    self.changed = true;
                    inner
                }
                (_, other) => vec![other],
            };
            for c in spliced {
                if out.contains(&c) {
                    self.changed = true;
                } else {
                    out.push(c);
                }
            }
        }
        out
    }

    /// Remove children that cannot change the result, unless nothing else is left.
    fn drop_identity(
        &mut self,
        children: Vec<QExpr>,
        identity: QExpr,
        rebuild: fn(Vec<QExpr>) -> QExpr,
    ) -> QExpr {
        if !children.is_empty() && children.iter().all(|c| *c == identity) {
            self.changed = true;
            return identity;
        }
        let before = children.len();
        let kept: Vec<QExpr> = children.into_iter().filter(|c| *c != identity).collect();
        if kept.len() != before {
            self.changed = true;
        }
        rebuild(kept)
    }
}

fn has_duplicates(children: &[QExpr]) -> bool {
    children
        .iter()
        .enumerate()
        .any(|(i, c)| children[..i].contains(c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::builder::{dirichlet, mean, sum};

    const LIMIT: usize = 100;

    fn t(s: &str) -> QExpr {
        QExpr::text(s)
    }

    #[test]
    fn test_nested_weights_collapse() {
        let q = t("a").weighted(0.5).weighted(2.0);
        assert_eq!(simplify(&q, LIMIT).unwrap(), t("a").weighted(1.0));
    }

    #[test]
    fn test_weight_arithmetic() {
        let q = t("a").weighted(0.5).weighted(2.0).weighted(2.0).weighted(2.0);
        assert_eq!(simplify(&q, LIMIT).unwrap(), t("a").weighted(4.0));
    }

    #[test]
    fn test_mean_matches_half_weights() {
        let expected = QExpr::Combine {
            children: vec![t("a"), t("b")],
            weights: vec![0.5, 0.5],
        };
        assert_eq!(simplify(&mean(vec![t("a"), t("b")]), LIMIT).unwrap(), expected);
        let weighted = sum(vec![t("a").weighted(0.5), t("b").weighted(0.5)]);
        assert_eq!(simplify(&weighted, LIMIT).unwrap(), expected);
    }

    #[test]
    fn test_nested_mean_distributes() {
        let q = mean(vec![
            mean(vec![t("a").weighted(2.0), t("b").weighted(3.0)]),
            t("c"),
        ]);
        assert_eq!(
            simplify(&q, LIMIT).unwrap(),
            QExpr::Combine {
                children: vec![t("a"), t("b"), t("c")],
                weights: vec![0.5, 0.75, 0.5],
            }
        );
    }

    #[test]
    fn test_duplicate_children_merge() {
        let q = sum(vec![dirichlet(t("a")), dirichlet(t("b")), dirichlet(t("a"))]);
        assert_eq!(
            simplify(&q, LIMIT).unwrap(),
            QExpr::Combine {
                children: vec![dirichlet(t("a")), dirichlet(t("b"))],
                weights: vec![2.0, 1.0],
            }
        );
    }

    #[test]
    fn test_weight_pushes_into_combine() {
        let q = mean(vec![dirichlet(t("a")), dirichlet(t("b"))]).weighted(4.0);
        assert_eq!(
            simplify(&q, LIMIT).unwrap(),
            QExpr::Combine {
                children: vec![dirichlet(t("a")), dirichlet(t("b"))],
                weights: vec![2.0, 2.0],
            }
        );
    }

    #[test]
    fn test_idempotent() {
        let queries = vec![
            mean(vec![mean(vec![t("a").weighted(2.0), t("b")]), t("c"), t("a")]),
            QExpr::And(vec![QExpr::And(vec![t("a"), t("b")]), QExpr::Or(vec![t("c")])]),
            dirichlet(t("a")).weighted(0.3).weighted(3.0),
        ];
        for q in queries {
            let once = simplify(&q, LIMIT).unwrap();
            assert_eq!(simplify(&once, LIMIT).unwrap(), once);
            assert!(!rewrite_once(&once).1);
        }
    }

    #[test]
    fn test_boolean_flatten_and_dedup() {
        let q = QExpr::And(vec![
            t("a"),
            QExpr::And(vec![t("b"), t("a")]),
            QExpr::AlwaysMatchLeaf,
        ]);
        assert_eq!(simplify(&q, LIMIT).unwrap(), QExpr::And(vec![t("a"), t("b")]));

        let q = QExpr::Or(vec![t("a"), QExpr::Or(vec![t("b"), QExpr::NeverMatchLeaf])]);
        assert_eq!(simplify(&q, LIMIT).unwrap(), QExpr::Or(vec![t("a"), t("b")]));
    }

    #[test]
    fn test_boolean_absorbing_leaves() {
        let q = QExpr::And(vec![t("a"), QExpr::NeverMatchLeaf]);
        assert_eq!(simplify(&q, LIMIT).unwrap(), QExpr::NeverMatchLeaf);
        let q = QExpr::Or(vec![t("a"), QExpr::AlwaysMatchLeaf]);
        assert_eq!(simplify(&q, LIMIT).unwrap(), QExpr::AlwaysMatchLeaf);
        let q = QExpr::And(vec![QExpr::AlwaysMatchLeaf, QExpr::AlwaysMatchLeaf]);
        assert_eq!(simplify(&q, LIMIT).unwrap(), QExpr::AlwaysMatchLeaf);
    }

    #[test]
    fn test_iteration_bound() {
        // Two rewriting passes: the outer pair collapses first.
        let q = t("a").weighted(0.5).weighted(2.0).weighted(2.0);
        let err = simplify(&q, 1).unwrap_err();
        assert!(matches!(err, RankError::Structure(_)));
        assert_eq!(simplify(&q, 2).unwrap(), t("a").weighted(2.0));
    }

    #[test]
    fn test_combine_weights_must_match_children() {
        let q = QExpr::Combine {
            children: vec![dirichlet(t("a")), dirichlet(t("b")).weighted(2.0)],
            weights: vec![1.0],
        };
        assert!(matches!(simplify(&q, LIMIT), Err(RankError::Structure(_))));

        let nested = dirichlet(t("c")).weighted(0.5);
        let q = sum(vec![QExpr::Combine {
            children: vec![nested],
            weights: vec![],
        }]);
        assert!(matches!(simplify(&q, LIMIT), Err(RankError::Structure(_))));
    }
}
