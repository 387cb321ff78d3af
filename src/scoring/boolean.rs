//! Boolean and gating nodes.
//!
//! [`AndEval`] and [`OrEval`] do not move any iterator; candidate movement is
//! handled by [`crate::movement`]. They only answer `matches()` for the
//! current document, checking children cheapest-to-fail first.

use crate::error::{RankError, Result};
use crate::scoring::node::{EvalRef, Explanation, QueryEvalNode, boolean_value, explain_all};

/// Conjunction: matches iff every child matches.
#[derive(Debug)]
pub struct AndEval {
    children: Vec<EvalRef>,
    cost: u64,
}

impl AndEval {
    /// Children are ordered by ascending estimated document frequency.
    pub fn new(mut children: Vec<EvalRef>) -> Self {
        children.sort_by_key(|c| c.estimate_df());
        let cost = children.iter().map(|c| c.estimate_df()).min().unwrap_or(0);
        AndEval { children, cost }
    }
}

impl QueryEvalNode for AndEval {
    fn name(&self) -> &'static str {
        "and"
    }

    fn score(&self) -> Result<f64> {
        Ok(boolean_value(self.matches()?))
    }

    fn count(&self) -> Result<u32> {
        Ok(u32::from(self.matches()?))
    }

    fn matches(&self) -> Result<bool> {
        for child in &self.children {
            if !child.matches()? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn explain(&self) -> Result<Explanation> {
        let matched = self.matches()?;
        Ok(Explanation::new(
            matched,
            boolean_value(matched),
            "and",
            explain_all(&self.children)?,
        ))
    }

    fn estimate_df(&self) -> u64 {
        self.cost
    }
}

/// Any-child matching shared by OR-like nodes.
#[derive(Debug)]
pub(crate) struct AnyOf {
    children: Vec<EvalRef>,
    cost: u64,
}

impl AnyOf {
    /// Children are ordered by descending estimated document frequency.
    pub(crate) fn new(children: &[EvalRef]) -> Self {
        let mut children = children.to_vec();
        children.sort_by_key(|c| std::cmp::Reverse(c.estimate_df()));
        let cost = children.iter().map(|c| c.estimate_df()).max().unwrap_or(0);
        AnyOf { children, cost }
    }

    pub(crate) fn matches(&self) -> Result<bool> {
        for child in &self.children {
            if child.matches()? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub(crate) fn cost(&self) -> u64 {
        self.cost
    }
}

/// Disjunction: matches iff any child matches.
#[derive(Debug)]
pub struct OrEval {
    children: Vec<EvalRef>,
    any: AnyOf,
}

impl OrEval {
    /// A disjunction over `children`.
    pub fn new(children: Vec<EvalRef>) -> Self {
        let any = AnyOf::new(&children);
        OrEval { children, any }
    }
}

impl QueryEvalNode for OrEval {
    fn name(&self) -> &'static str {
        "or"
    }

    fn score(&self) -> Result<f64> {
        Ok(boolean_value(self.matches()?))
    }

    fn count(&self) -> Result<u32> {
        Ok(u32::from(self.matches()?))
    }

    fn matches(&self) -> Result<bool> {
        self.any.matches()
    }

    fn explain(&self) -> Result<Explanation> {
        let matched = self.matches()?;
        Ok(Explanation::new(
            matched,
            boolean_value(matched),
            "or",
            explain_all(&self.children)?,
        ))
    }

    fn estimate_df(&self) -> u64 {
        self.any.cost()
    }
}

/// Matches every document; everything else comes from the child.
#[derive(Debug)]
pub struct AlwaysMatchEval {
    child: EvalRef,
    num_docs: u64,
}

impl AlwaysMatchEval {
    /// Wrap `child` in a segment of `num_docs` documents.
    pub fn new(child: EvalRef, num_docs: u64) -> Self {
        AlwaysMatchEval { child, num_docs }
    }
}

impl QueryEvalNode for AlwaysMatchEval {
    fn name(&self) -> &'static str {
        "always-match"
    }

    fn score(&self) -> Result<f64> {
        self.child.score()
    }

    fn count(&self) -> Result<u32> {
        self.child.count()
    }

    fn matches(&self) -> Result<bool> {
        Ok(true)
    }

    fn positions(&self) -> Result<Vec<u32>> {
        self.child.positions()
    }

    fn explain(&self) -> Result<Explanation> {
        let inner = self.child.explain()?;
        Ok(Explanation::matched(inner.value, "always-match", vec![inner]))
    }

    fn estimate_df(&self) -> u64 {
        self.num_docs
    }
}

/// Matches when the child's count exceeds a threshold.
#[derive(Debug)]
pub struct CountToBoolEval {
    child: EvalRef,
    gt: u32,
}

impl CountToBoolEval {
    /// Matches iff `child.count() > gt`.
    pub fn new(child: EvalRef, gt: u32) -> Self {
        CountToBoolEval { child, gt }
    }
}

impl QueryEvalNode for CountToBoolEval {
    fn name(&self) -> &'static str {
        "count-to-bool"
    }

    fn score(&self) -> Result<f64> {
        Ok(boolean_value(self.matches()?))
    }

    fn count(&self) -> Result<u32> {
        Ok(u32::from(self.matches()?))
    }

    fn matches(&self) -> Result<bool> {
        Ok(self.child.matches()? && self.child.count()? > self.gt)
    }

    fn explain(&self) -> Result<Explanation> {
        let matched = self.matches()?;
        Ok(Explanation::new(
            matched,
            boolean_value(matched),
            format!("count > {}", self.gt),
            vec![self.child.explain()?],
        ))
    }

    fn estimate_df(&self) -> u64 {
        self.child.estimate_df()
    }
}

/// Candidacy from `cond`, values from `value`.
#[derive(Debug)]
pub struct RequireEval {
    cond: EvalRef,
    value: EvalRef,
    miss: f64,
}

impl RequireEval {
    /// Documents failing `cond` score `-f64::MAX` and count 0.
    pub fn new(cond: EvalRef, value: EvalRef) -> Self {
        RequireEval {
            cond,
            value,
            miss: -f64::MAX,
        }
    }
}

impl QueryEvalNode for RequireEval {
    fn name(&self) -> &'static str {
        "require"
    }

    fn score(&self) -> Result<f64> {
        if self.cond.matches()? {
            self.value.score()
        } else {
            Ok(self.miss)
        }
    }

    fn count(&self) -> Result<u32> {
        if self.cond.matches()? {
            self.value.count()
        } else {
            Ok(0)
        }
    }

    fn matches(&self) -> Result<bool> {
        self.cond.matches()
    }

    fn positions(&self) -> Result<Vec<u32>> {
        if self.cond.matches()? {
            self.value.positions()
        } else {
            Ok(Vec::new())
        }
    }

    fn explain(&self) -> Result<Explanation> {
        let cond = self.cond.explain()?;
        if cond.matched {
            let value = self.value.explain()?;
            Ok(Explanation::matched(value.value, "require", vec![cond, value]))
        } else {
            Ok(Explanation::missed(self.miss, "require: condition failed", vec![cond]))
        }
    }

    fn estimate_df(&self) -> u64 {
        self.cond.estimate_df()
    }
}

/// Several named expressions evaluated together; scores and counts come
/// from the `primary` child, or the first.
#[derive(Debug)]
pub struct MultiEval {
    children: Vec<EvalRef>,
    names: Vec<String>,
    primary: usize,
    any: AnyOf,
}

impl MultiEval {
    /// `children` and `names` must have the same length.
    pub fn new(children: Vec<EvalRef>, names: Vec<String>) -> Result<Self> {
        if children.len() != names.len() || children.is_empty() {
            return Err(RankError::structure(format!(
                "multi expression needs one name per child, got {} names for {} children",
                names.len(),
                children.len()
            )));
        }
        let primary = names.iter().position(|n| n == "primary").unwrap_or(0);
        let any = AnyOf::new(&children);
        Ok(MultiEval {
            children,
            names,
            primary,
            any,
        })
    }

    /// Score of every child for the current document.
    pub fn scores(&self) -> Result<Vec<(String, f64)>> {
        self.names
            .iter()
            .zip(&self.children)
            .map(|(name, child)| Ok((name.clone(), child.score()?)))
            .collect()
    }
}

impl QueryEvalNode for MultiEval {
    fn name(&self) -> &'static str {
        "multi"
    }

    fn score(&self) -> Result<f64> {
        self.children[self.primary].score()
    }

    fn count(&self) -> Result<u32> {
        self.children[self.primary].count()
    }

    fn matches(&self) -> Result<bool> {
        self.any.matches()
    }

    fn explain(&self) -> Result<Explanation> {
        let details = self
            .names
            .iter()
            .zip(&self.children)
            .map(|(name, child)| {
                let mut e = child.explain()?;
                e.description = format!("{name}: {}", e.description);
                Ok(e)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Explanation::new(
            self.matches()?,
            self.score()?,
            format!("multi, primary={}", self.names[self.primary]),
            details,
        ))
    }

    fn estimate_df(&self) -> u64 {
        self.any.cost()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::leaf::{ConstScoreEval, FixedMatchEval};
    use std::rc::Rc;

    fn fixed(matched: bool, df: u64) -> EvalRef {
        Rc::new(FixedMatchEval::new(matched, df))
    }

    #[test]
    fn test_and_or() {
        let and = AndEval::new(vec![fixed(true, 10), fixed(false, 2)]);
        assert!(!and.matches().unwrap());
        assert_eq!(and.estimate_df(), 2);
        assert_eq!(and.score().unwrap(), 0.0);

        let or = OrEval::new(vec![fixed(false, 3), fixed(true, 7)]);
        assert!(or.matches().unwrap());
        assert_eq!(or.estimate_df(), 7);
        assert_eq!(or.count().unwrap(), 1);
    }

    #[test]
    fn test_require() {
        let value: EvalRef = Rc::new(ConstScoreEval::new(3.0));
        let hit = RequireEval::new(fixed(true, 1), Rc::clone(&value));
        assert!(hit.matches().unwrap());
        assert_eq!(hit.score().unwrap(), 3.0);

        let miss = RequireEval::new(fixed(false, 0), value);
        assert!(!miss.matches().unwrap());
        assert_eq!(miss.score().unwrap(), -f64::MAX);
        assert_eq!(miss.count().unwrap(), 0);
    }

    #[test]
    fn test_multi_primary() {
        let a: EvalRef = Rc::new(ConstScoreEval::new(1.0));
        let b: EvalRef = Rc::new(ConstScoreEval::new(2.0));
        let multi = MultiEval::new(vec![a, b], vec!["x".into(), "primary".into()]).unwrap();
        assert_eq!(multi.score().unwrap(), 2.0);
        assert_eq!(
            multi.scores().unwrap(),
            vec![("x".to_string(), 1.0), ("primary".to_string(), 2.0)]
        );
        assert!(MultiEval::new(vec![], vec![]).is_err());
    }

    #[test]
    fn test_always_match_wrapper() {
        let inner: EvalRef = Rc::new(ConstScoreEval::new(0.5));
        let always = AlwaysMatchEval::new(inner, 4);
        assert!(always.matches().unwrap());
        assert_eq!(always.score().unwrap(), 0.5);
        assert_eq!(always.estimate_df(), 4);
    }
}
