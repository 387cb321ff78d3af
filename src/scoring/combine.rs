//! Score combinators: weighted sum, weight, max and product.

use crate::error::Result;
use crate::scoring::boolean::AnyOf;
use crate::scoring::node::{EvalRef, Explanation, QueryEvalNode, explain_all, no_count};

/// `sum(weights[i] * children[i].score())`. Matches like a disjunction.
#[derive(Debug)]
pub struct WeightedSumEval {
    children: Vec<EvalRef>,
    weights: Vec<f64>,
    any: AnyOf,
}

impl WeightedSumEval {
    /// One weight per child.
    pub fn new(children: Vec<EvalRef>, weights: Vec<f64>) -> Self {
        let any = AnyOf::new(&children);
        WeightedSumEval {
            children,
            weights,
            any,
        }
    }
}

impl QueryEvalNode for WeightedSumEval {
    fn name(&self) -> &'static str {
        "combine"
    }

    fn score(&self) -> Result<f64> {
        let mut sum = 0.0;
        for (child, weight) in self.children.iter().zip(&self.weights) {
            sum += weight * child.score()?;
        }
        Ok(sum)
    }

    fn count(&self) -> Result<u32> {
        Err(no_count(self))
    }

    fn matches(&self) -> Result<bool> {
        self.any.matches()
    }

    fn explain(&self) -> Result<Explanation> {
        Ok(Explanation::new(
            self.matches()?,
            self.score()?,
            format!("combine {:?}", self.weights),
            explain_all(&self.children)?,
        ))
    }

    fn estimate_df(&self) -> u64 {
        self.any.cost()
    }
}

/// `weight * child.score()`.
#[derive(Debug)]
pub struct WeightEval {
    child: EvalRef,
    weight: f64,
}

impl WeightEval {
    /// Scale `child` by `weight`.
    pub fn new(child: EvalRef, weight: f64) -> Self {
        WeightEval { child, weight }
    }
}

impl QueryEvalNode for WeightEval {
    fn name(&self) -> &'static str {
        "weight"
    }

    fn score(&self) -> Result<f64> {
        Ok(self.weight * self.child.score()?)
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
            format!("weight {}", self.weight),
            vec![self.child.explain()?],
        ))
    }

    fn estimate_df(&self) -> u64 {
        self.child.estimate_df()
    }
}

/// Maximum child score, or maximum child count.
#[derive(Debug)]
pub struct MaxEval {
    children: Vec<EvalRef>,
    any: AnyOf,
}

impl MaxEval {
    /// Maximum over `children`.
    pub fn new(children: Vec<EvalRef>) -> Self {
        let any = AnyOf::new(&children);
        MaxEval { children, any }
    }
}

impl QueryEvalNode for MaxEval {
    fn name(&self) -> &'static str {
        "max"
    }

    fn score(&self) -> Result<f64> {
        let mut best = f64::NEG_INFINITY;
        for child in &self.children {
            best = best.max(child.score()?);
        }
        Ok(best)
    }

    fn count(&self) -> Result<u32> {
        let mut best = 0;
        for child in &self.children {
            best = best.max(child.count()?);
        }
        Ok(best)
    }

    fn matches(&self) -> Result<bool> {
        self.any.matches()
    }

    fn explain(&self) -> Result<Explanation> {
        Ok(Explanation::new(
            self.matches()?,
            self.score()?,
            "max",
            explain_all(&self.children)?,
        ))
    }

    fn estimate_df(&self) -> u64 {
        self.any.cost()
    }
}

/// Product of child scores. Matches like a disjunction.
#[derive(Debug)]
pub struct MultEval {
    children: Vec<EvalRef>,
    any: AnyOf,
}

impl MultEval {
    /// Product over `children`.
    pub fn new(children: Vec<EvalRef>) -> Self {
        let any = AnyOf::new(&children);
        MultEval { children, any }
    }
}

impl QueryEvalNode for MultEval {
    fn name(&self) -> &'static str {
        "mult"
    }

    fn score(&self) -> Result<f64> {
        let mut product = 1.0;
        for child in &self.children {
            product *= child.score()?;
        }
        Ok(product)
    }

    fn count(&self) -> Result<u32> {
        Err(no_count(self))
    }

    fn matches(&self) -> Result<bool> {
        self.any.matches()
    }

    fn explain(&self) -> Result<Explanation> {
        Ok(Explanation::new(
            self.matches()?,
            self.score()?,
            "mult",
            explain_all(&self.children)?,
        ))
    }

    fn estimate_df(&self) -> u64 {
        self.any.cost()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RankError;
    use crate::scoring::leaf::ConstScoreEval;
    use std::rc::Rc;

    fn c(x: f64) -> EvalRef {
        Rc::new(ConstScoreEval::new(x))
    }

    #[test]
    fn test_weighted_sum() {
        let sum = WeightedSumEval::new(vec![c(1.0), c(-2.0)], vec![0.5, 0.25]);
        assert!((sum.score().unwrap() - 0.0).abs() < 1e-12);
        assert!(matches!(sum.count(), Err(RankError::Contract(_))));
        assert!(!sum.matches().unwrap());
    }

    #[test]
    fn test_weight_max_mult() {
        assert_eq!(WeightEval::new(c(3.0), 2.0).score().unwrap(), 6.0);
        assert_eq!(MaxEval::new(vec![c(-3.0), c(-1.0)]).score().unwrap(), -1.0);
        assert_eq!(MultEval::new(vec![c(-3.0), c(2.0)]).score().unwrap(), -6.0);
        assert!(WeightEval::new(c(3.0), 2.0).count().is_err());
    }
}
