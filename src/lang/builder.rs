//! Constructors for common query shapes and retrieval models.

use crate::error::{RankError, Result};
use crate::lang::expr::{QExpr, TextExpr};

/// Weighted combination; fails unless there is one weight per child.
pub fn combine(children: Vec<QExpr>, weights: Vec<f64>) -> Result<QExpr> {
    if children.len() != weights.len() {
        return Err(RankError::structure(format!(
            "combine has {} children but {} weights",
            children.len(),
            weights.len()
        )));
    }
    Ok(QExpr::Combine { children, weights })
}

/// Unweighted sum of children.
pub fn sum(children: Vec<QExpr>) -> QExpr {
    let weights = vec![1.0; children.len()];
    QExpr::Combine { children, weights }
}

/// Mean of children.
pub fn mean(children: Vec<QExpr>) -> QExpr {
    let n = children.len() as f64;
    let weights = vec![1.0 / n; children.len()];
    QExpr::Combine { children, weights }
}

/// Dirichlet smoothing with the environment's default mu.
pub fn dirichlet(child: QExpr) -> QExpr {
    QExpr::DirQL {
        child: Box::new(child),
        mu: None,
        stats: None,
    }
}

/// BM25 with the environment's default b and k.
pub fn bm25(child: QExpr) -> QExpr {
    QExpr::BM25 {
        child: Box::new(child),
        b: None,
        k: None,
        stats: None,
    }
}

/// Absolute discounting with the environment's default delta.
pub fn absolute_discounting(child: QExpr) -> QExpr {
    QExpr::AbsoluteDiscountingQL {
        child: Box::new(child),
        delta: None,
        stats: None,
    }
}

/// Score `value` only for documents `cond` matches.
pub fn require(cond: QExpr, value: QExpr) -> QExpr {
    QExpr::Require {
        cond: Box::new(cond),
        value: Box::new(value),
    }
}

/// Never consider `child` for candidacy; useful for expensive boost features.
pub fn never_match(child: QExpr) -> QExpr {
    require(QExpr::NeverMatchLeaf, child)
}

/// Whitelist by external document names.
pub fn whitelist_names<I, S>(names: I) -> QExpr
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    QExpr::Whitelist(crate::lang::expr::WhitelistExpr {
        names: Some(names.into_iter().map(Into::into).collect()),
        ids: None,
    })
}

fn terms_in(terms: &[String], field: Option<&str>) -> Vec<QExpr> {
    terms
        .iter()
        .map(|t| {
            QExpr::Text(TextExpr {
                field: field.map(str::to_string),
                ..TextExpr::new(t.as_str())
            })
        })
        .collect()
}

/// Dirichlet query likelihood: the mean of smoothed term scores.
pub fn query_likelihood(terms: &[String], field: Option<&str>) -> QExpr {
    mean(terms_in(terms, field).into_iter().map(dirichlet).collect())
}

/// BM25 retrieval model: the sum of per-term BM25 scores.
pub fn bm25_model(terms: &[String], field: Option<&str>) -> QExpr {
    sum(terms_in(terms, field).into_iter().map(bm25).collect())
}

/// Weights of the sequential dependence model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SdmWeights {
    /// Unigram component.
    pub unigram: f64,
    /// Ordered-bigram component.
    pub ordered: f64,
    /// Unordered-window component.
    pub unordered: f64,
    /// Width of the unordered windows.
    pub width: u32,
}

impl Default for SdmWeights {
    fn default() -> Self {
        SdmWeights {
            unigram: 0.8,
            ordered: 0.15,
            unordered: 0.05,
            width: 8,
        }
    }
}

/// Sequential dependence model over adjacent term pairs.
///
/// A single-term query degenerates to query likelihood.
pub fn sequential_dependence_model(terms: &[String], field: Option<&str>, w: SdmWeights) -> QExpr {
    let leaves = terms_in(terms, field);
    if leaves.len() < 2 {
        return query_likelihood(terms, field);
    }

    let unigrams = mean(leaves.iter().cloned().map(dirichlet).collect());
    let pairs: Vec<(QExpr, QExpr)> = leaves
        .windows(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect();
    let ordered = mean(
        pairs
            .iter()
            .map(|(a, b)| {
                dirichlet(QExpr::OrderedWindow {
                    children: vec![a.clone(), b.clone()],
                    step: 1,
                })
            })
            .collect(),
    );
    let unordered = mean(
        pairs
            .into_iter()
            .map(|(a, b)| {
                dirichlet(QExpr::UnorderedWindow {
                    children: vec![a, b],
                    width: w.width,
                })
            })
            .collect(),
    );

    QExpr::Combine {
        children: vec![unigrams, ordered, unordered],
        weights: vec![w.unigram, w.ordered, w.unordered],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(ts: &[&str]) -> Vec<String> {
        ts.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_combine_arity() {
        assert!(combine(vec![QExpr::text("a")], vec![1.0, 2.0]).is_err());
        assert!(combine(vec![QExpr::text("a")], vec![1.0]).is_ok());
    }

    #[test]
    fn test_mean_weights() {
        match mean(vec![QExpr::text("a"), QExpr::text("b"), QExpr::text("c")]) {
            QExpr::Combine { weights, .. } => {
                assert_eq!(weights.len(), 3);
                assert!((weights[0] - 1.0 / 3.0).abs() < 1e-12);
            }
            other => panic!("expected combine, got {other}"),
        }
    }

    #[test]
    fn test_query_likelihood_shape() {
        let q = query_likelihood(&terms(&["fox", "dog"]), Some("body"));
        assert_eq!(
            q.to_string(),
            "#combine:w=0.5,0.5(#dirichlet(body:fox) #dirichlet(body:dog))"
        );
    }

    #[test]
    fn test_sdm_shape() {
        let q = sequential_dependence_model(
            &terms(&["brown", "fox", "jumped"]),
            None,
            SdmWeights::default(),
        );
        match &q {
            QExpr::Combine { children, weights } => {
                assert_eq!(weights, &vec![0.8, 0.15, 0.05]);
                assert_eq!(children[1].children().len(), 2);
                assert!(children[2].to_string().contains("#uw:8(brown fox)"));
            }
            other => panic!("expected combine, got {other}"),
        }

        let single = sequential_dependence_model(&terms(&["fox"]), None, SdmWeights::default());
        assert_eq!(single, query_likelihood(&terms(&["fox"]), None));
    }

    #[test]
    fn test_never_match() {
        let q = never_match(QExpr::text("a"));
        assert!(matches!(q, QExpr::Require { ref cond, .. } if **cond == QExpr::NeverMatchLeaf));
    }
}
