//! Leaf evaluation nodes: terms, lengths, constants and fixed document sets.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use crate::error::{RankError, Result};
use crate::index::{DataNeeded, DocId, Postings, SegmentReader};
use crate::scoring::node::{
    EvalRef, Explanation, QueryEvalNode, ScoringEnv, boolean_value, no_count, no_score,
};

/// A term backed by a postings iterator.
///
/// May be shared by several parents; every accessor first syncs the iterator
/// to the context's current document, which is idempotent.
#[derive(Debug)]
pub struct TermEval {
    env: Rc<ScoringEnv>,
    label: String,
    needed: DataNeeded,
    postings: RefCell<Box<dyn Postings>>,
}

impl TermEval {
    /// Wrap `postings`, which were opened at `needed`.
    pub fn new(
        env: Rc<ScoringEnv>,
        label: String,
        needed: DataNeeded,
        postings: Box<dyn Postings>,
    ) -> Self {
        TermEval {
            env,
            label,
            needed,
            postings: RefCell::new(postings),
        }
    }

    fn sync(&self) -> Result<bool> {
        let doc = self.env.doc();
        let mut postings = self.postings.borrow_mut();
        if postings.doc_id() < doc {
            postings.advance(doc)?;
        }
        Ok(postings.doc_id() == doc)
    }
}

impl QueryEvalNode for TermEval {
    fn name(&self) -> &'static str {
        "term"
    }

    fn score(&self) -> Result<f64> {
        Err(RankError::contract(format!(
            "cannot score bare term {}; wrap it in a scorer",
            self.label
        )))
    }

    fn count(&self) -> Result<u32> {
        if self.needed < DataNeeded::Counts {
            return Err(RankError::contract(format!(
                "count of {} requested but it was opened at {}",
                self.label, self.needed
            )));
        }
        if self.sync()? {
            Ok(self.postings.borrow().count())
        } else {
            Ok(0)
        }
    }

    fn matches(&self) -> Result<bool> {
        self.sync()
    }

    fn positions(&self) -> Result<Vec<u32>> {
        if self.needed < DataNeeded::Positions {
            return Err(RankError::contract(format!(
                "positions of {} requested but it was opened at {}",
                self.label, self.needed
            )));
        }
        if self.sync()? {
            self.postings.borrow().positions()
        } else {
            Ok(Vec::new())
        }
    }

    fn explain(&self) -> Result<Explanation> {
        let matched = self.sync()?;
        let count = if matched && self.needed >= DataNeeded::Counts {
            self.postings.borrow().count()
        } else {
            u32::from(matched)
        };
        Ok(Explanation::new(
            matched,
            count as f64,
            format!("{} at {}", self.label, self.needed),
            Vec::new(),
        ))
    }

    fn estimate_df(&self) -> u64 {
        self.postings.borrow().cost()
    }
}

/// Stand-in for a term absent from the segment: never matches, counts zero.
#[derive(Debug)]
pub struct MissingTermEval {
    label: String,
}

impl MissingTermEval {
    /// A missing term described by `label`.
    pub fn new(label: String) -> Self {
        MissingTermEval { label }
    }
}

impl QueryEvalNode for MissingTermEval {
    fn name(&self) -> &'static str {
        "missing-term"
    }

    fn score(&self) -> Result<f64> {
        Err(no_score(self))
    }

    fn count(&self) -> Result<u32> {
        Ok(0)
    }

    fn matches(&self) -> Result<bool> {
        Ok(false)
    }

    fn positions(&self) -> Result<Vec<u32>> {
        Ok(Vec::new())
    }

    fn explain(&self) -> Result<Explanation> {
        Ok(Explanation::missed(
            0.0,
            format!("{} does not occur in this segment", self.label),
            Vec::new(),
        ))
    }

    fn estimate_df(&self) -> u64 {
        0
    }
}

/// Field length of the current document, as a count.
#[derive(Debug)]
pub struct LengthsEval {
    env: Rc<ScoringEnv>,
    segment: Arc<dyn SegmentReader>,
    field: String,
}

impl LengthsEval {
    /// Lengths of `field` in `segment`.
    pub fn new(env: Rc<ScoringEnv>, segment: Arc<dyn SegmentReader>, field: String) -> Self {
        LengthsEval {
            env,
            segment,
            field,
        }
    }
}

impl QueryEvalNode for LengthsEval {
    fn name(&self) -> &'static str {
        "lengths"
    }

    fn score(&self) -> Result<f64> {
        Err(no_score(self))
    }

    fn count(&self) -> Result<u32> {
        self.segment.field_length(self.env.doc(), &self.field)
    }

    fn matches(&self) -> Result<bool> {
        Ok(true)
    }

    fn explain(&self) -> Result<Explanation> {
        Ok(Explanation::matched(
            self.count()? as f64,
            format!("length of {}", self.field),
            Vec::new(),
        ))
    }

    fn estimate_df(&self) -> u64 {
        self.segment.num_docs() as u64
    }
}

/// A constant score. Never matches on its own.
#[derive(Debug)]
pub struct ConstScoreEval {
    value: f64,
}

impl ConstScoreEval {
    /// Always scores `value`.
    pub fn new(value: f64) -> Self {
        ConstScoreEval { value }
    }
}

impl QueryEvalNode for ConstScoreEval {
    fn name(&self) -> &'static str {
        "const-score"
    }

    fn score(&self) -> Result<f64> {
        Ok(self.value)
    }

    fn count(&self) -> Result<u32> {
        Err(no_count(self))
    }

    fn matches(&self) -> Result<bool> {
        Ok(false)
    }

    fn explain(&self) -> Result<Explanation> {
        Ok(Explanation::missed(self.value, "constant score", Vec::new()))
    }

    fn estimate_df(&self) -> u64 {
        0
    }
}

/// A constant count, matching wherever its lengths match.
#[derive(Debug)]
pub struct ConstCountEval {
    count: u32,
    lengths: EvalRef,
}

impl ConstCountEval {
    /// Always counts `count`.
    pub fn new(count: u32, lengths: EvalRef) -> Self {
        ConstCountEval { count, lengths }
    }
}

impl QueryEvalNode for ConstCountEval {
    fn name(&self) -> &'static str {
        "const-count"
    }

    fn score(&self) -> Result<f64> {
        Err(no_score(self))
    }

    fn count(&self) -> Result<u32> {
        Ok(self.count)
    }

    fn matches(&self) -> Result<bool> {
        self.lengths.matches()
    }

    fn explain(&self) -> Result<Explanation> {
        Ok(Explanation::new(
            self.matches()?,
            self.count as f64,
            "constant count",
            vec![self.lengths.explain()?],
        ))
    }

    fn estimate_df(&self) -> u64 {
        self.lengths.estimate_df()
    }
}

/// Matches every document or none.
#[derive(Debug)]
pub struct FixedMatchEval {
    matched: bool,
    df: u64,
}

impl FixedMatchEval {
    /// A node whose `matches()` is always `matched`.
    pub fn new(matched: bool, df: u64) -> Self {
        FixedMatchEval { matched, df }
    }
}

impl QueryEvalNode for FixedMatchEval {
    fn name(&self) -> &'static str {
        if self.matched { "always" } else { "never" }
    }

    fn score(&self) -> Result<f64> {
        Ok(boolean_value(self.matched))
    }

    fn count(&self) -> Result<u32> {
        Ok(u32::from(self.matched))
    }

    fn matches(&self) -> Result<bool> {
        Ok(self.matched)
    }

    fn explain(&self) -> Result<Explanation> {
        Ok(Explanation::new(
            self.matched,
            boolean_value(self.matched),
            self.name(),
            Vec::new(),
        ))
    }

    fn estimate_df(&self) -> u64 {
        self.df
    }
}

/// Matches a fixed, sorted set of segment-relative documents.
#[derive(Debug)]
pub struct WhitelistEval {
    env: Rc<ScoringEnv>,
    allowed: Vec<DocId>,
}

impl WhitelistEval {
    /// `allowed` must be sorted and segment-relative.
    pub fn new(env: Rc<ScoringEnv>, allowed: Vec<DocId>) -> Self {
        WhitelistEval { env, allowed }
    }
}

impl QueryEvalNode for WhitelistEval {
    fn name(&self) -> &'static str {
        "whitelist"
    }

    fn score(&self) -> Result<f64> {
        Ok(boolean_value(self.matches()?))
    }

    fn count(&self) -> Result<u32> {
        Ok(u32::from(self.matches()?))
    }

    fn matches(&self) -> Result<bool> {
        Ok(self.allowed.binary_search(&self.env.doc()).is_ok())
    }

    fn explain(&self) -> Result<Explanation> {
        let matched = self.matches()?;
        Ok(Explanation::new(
            matched,
            boolean_value(matched),
            format!("whitelist of {} documents", self.allowed.len()),
            Vec::new(),
        ))
    }

    fn estimate_df(&self) -> u64 {
        self.allowed.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexReader, MemoryIndex};

    fn index() -> MemoryIndex {
        let mut builder = MemoryIndex::builder();
        builder
            .add_document("d0", vec![("body", "a b a")])
            .add_document("d1", vec![("body", "c")])
            .add_document("d2", vec![("body", "b a")]);
        builder.build()
    }

    fn term(index: &MemoryIndex, env: &Rc<ScoringEnv>, text: &str, needed: DataNeeded) -> TermEval {
        let postings = index.segments()[0]
            .open_postings(text, "body", needed)
            .unwrap()
            .unwrap();
        TermEval::new(Rc::clone(env), format!("body:{text}"), needed, postings)
    }

    #[test]
    fn test_term_follows_cursor() {
        let index = index();
        let env = Rc::new(ScoringEnv::new());
        let a = term(&index, &env, "a", DataNeeded::Positions);
        assert!(a.matches().unwrap());
        assert_eq!(a.count().unwrap(), 2);
        assert_eq!(a.positions().unwrap(), vec![0, 2]);

        env.set_doc(1);
        assert!(!a.matches().unwrap());
        assert_eq!(a.count().unwrap(), 0);
        assert!(a.positions().unwrap().is_empty());

        env.set_doc(2);
        assert_eq!(a.positions().unwrap(), vec![1]);
        assert_eq!(a.estimate_df(), 2);
        assert!(matches!(a.score(), Err(RankError::Contract(_))));
    }

    #[test]
    fn test_term_granularity_contract() {
        let index = index();
        let env = Rc::new(ScoringEnv::new());
        let a = term(&index, &env, "a", DataNeeded::Docs);
        assert!(a.matches().unwrap());
        assert!(matches!(a.count(), Err(RankError::Contract(_))));
        assert!(matches!(a.positions(), Err(RankError::Contract(_))));
    }

    #[test]
    fn test_missing_and_constants() {
        let missing = MissingTermEval::new("body:zzz".to_string());
        assert!(!missing.matches().unwrap());
        assert_eq!(missing.count().unwrap(), 0);

        let c = ConstScoreEval::new(0.25);
        assert_eq!(c.score().unwrap(), 0.25);
        assert!(!c.matches().unwrap());
        assert!(c.count().is_err());

        let never = FixedMatchEval::new(false, 0);
        assert_eq!(never.score().unwrap(), 0.0);
        assert_eq!(never.name(), "never");
    }

    #[test]
    fn test_lengths_and_whitelist() {
        let index = index();
        let env = Rc::new(ScoringEnv::new());
        let lengths = LengthsEval::new(
            Rc::clone(&env),
            Arc::clone(&index.segments()[0]),
            "body".to_string(),
        );
        let whitelist = WhitelistEval::new(Rc::clone(&env), vec![0, 2]);
        assert_eq!(lengths.count().unwrap(), 3);
        assert!(whitelist.matches().unwrap());

        env.set_doc(1);
        assert_eq!(lengths.count().unwrap(), 1);
        assert!(!whitelist.matches().unwrap());
        assert_eq!(whitelist.score().unwrap(), 0.0);
    }
}
