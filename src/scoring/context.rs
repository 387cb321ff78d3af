//! Per-segment execution context.
//!
//! A [`QueryContext`] owns everything a compiled tree reads from one
//! segment: the document cursor, the term-leaf cache and the lengths cache.
//! Contexts are never shared across segments or threads.

use std::rc::Rc;
use std::sync::Arc;

use ahash::AHashMap;
use log::debug;

use crate::error::{RankError, Result};
use crate::index::{DataNeeded, DocId, SegmentReader};
use crate::lang::{QExpr, WhitelistExpr};
use crate::scoring::leaf::{LengthsEval, MissingTermEval, TermEval};
use crate::scoring::node::{EvalRef, ScoringEnv};

type TermKey = (String, String);

/// Caches and cursor for evaluating queries against one segment.
#[derive(Debug)]
pub struct QueryContext {
    segment: Arc<dyn SegmentReader>,
    env: Rc<ScoringEnv>,
    default_field: String,
    share_iterators: bool,
    max_needed: AHashMap<TermKey, DataNeeded>,
    terms: AHashMap<TermKey, EvalRef>,
    lengths: AHashMap<String, EvalRef>,
}

impl QueryContext {
    /// A fresh context over `segment`.
    pub fn new<S: Into<String>>(
        segment: Arc<dyn SegmentReader>,
        default_field: S,
        share_iterators: bool,
    ) -> Self {
        QueryContext {
            segment,
            env: Rc::new(ScoringEnv::new()),
            default_field: default_field.into(),
            share_iterators,
            max_needed: AHashMap::new(),
            terms: AHashMap::new(),
            lengths: AHashMap::new(),
        }
    }

    /// The segment this context reads.
    pub fn segment(&self) -> &Arc<dyn SegmentReader> {
        &self.segment
    }

    /// The document cursor shared by every node compiled in this context.
    pub fn env(&self) -> &Rc<ScoringEnv> {
        &self.env
    }

    /// Field used for lengths when an expression names none.
    pub fn default_field(&self) -> &str {
        &self.default_field
    }

    /// Record the granularity every term of `expr` will be opened at, so a
    /// shared leaf is opened once at the maximum any requester needs.
    pub fn register_needs(&mut self, expr: &QExpr) -> Result<()> {
        for t in expr.text_nodes() {
            let key = (t.text.clone(), t.counts_field()?.to_string());
            let entry = self.max_needed.entry(key).or_default();
            *entry = (*entry).max(t.needed);
        }
        Ok(())
    }

    /// The evaluation node for `term` in `field`, opened at `needed` or at
    /// the registered maximum if that is higher.
    pub fn term(&mut self, term: &str, field: &str, needed: DataNeeded) -> Result<EvalRef> {
        let key = (term.to_string(), field.to_string());
        if self.share_iterators {
            if let Some(node) = self.terms.get(&key) {
                return Ok(Rc::clone(node));
            }
        }

        let needed = self
            .max_needed
            .get(&key)
            .map_or(needed, |&registered| registered.max(needed));
        let label = format!("{field}:{term}");
        let node: EvalRef = match self.segment.open_postings(term, field, needed)? {
            Some(postings) => Rc::new(TermEval::new(
                Rc::clone(&self.env),
                label,
                needed,
                postings,
            )),
            None => {
                debug!("{label} is missing from segment at {}", self.segment.doc_base());
                Rc::new(MissingTermEval::new(label))
            }
        };

        if self.share_iterators {
            self.terms.insert(key, Rc::clone(&node));
        }
        Ok(node)
    }

    /// Document lengths of `field`, one node per field.
    pub fn lengths(&mut self, field: &str) -> EvalRef {
        let node = self.lengths.entry(field.to_string()).or_insert_with(|| {
            Rc::new(LengthsEval::new(
                Rc::clone(&self.env),
                Arc::clone(&self.segment),
                field.to_string(),
            ))
        });
        Rc::clone(node)
    }

    /// Whitelisted ids that fall inside this segment, segment-relative,
    /// sorted and deduplicated.
    pub fn local_ids(&self, whitelist: &WhitelistExpr) -> Result<Vec<DocId>> {
        let ids = whitelist
            .ids
            .as_ref()
            .ok_or_else(|| RankError::structure("whitelist was not resolved to document ids"))?;
        let base = self.segment.doc_base();
        let end = base.saturating_add(self.segment.num_docs());
        let mut local: Vec<DocId> = ids
            .iter()
            .filter(|&&id| id >= base && id < end)
            .map(|&id| id - base)
            .collect();
        local.sort_unstable();
        local.dedup();
        Ok(local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexReader, MemoryIndex};

    fn two_segments() -> MemoryIndex {
        let mut builder = MemoryIndex::builder().max_docs_per_segment(2);
        builder
            .add_document("d0", vec![("body", "a b")])
            .add_document("d1", vec![("body", "b")])
            .add_document("d2", vec![("body", "a a")]);
        builder.build()
    }

    #[test]
    fn test_terms_are_shared() {
        let index = two_segments();
        let mut ctx = QueryContext::new(Arc::clone(&index.segments()[0]), "body", true);
        let first = ctx.term("a", "body", DataNeeded::Counts).unwrap();
        let second = ctx.term("a", "body", DataNeeded::Counts).unwrap();
        assert!(Rc::ptr_eq(&first, &second));

        let mut unshared = QueryContext::new(Arc::clone(&index.segments()[0]), "body", false);
        let first = unshared.term("a", "body", DataNeeded::Counts).unwrap();
        let second = unshared.term("a", "body", DataNeeded::Counts).unwrap();
        assert!(!Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_missing_term() {
        let index = two_segments();
        let mut ctx = QueryContext::new(Arc::clone(&index.segments()[0]), "body", true);
        let missing = ctx.term("zzz", "body", DataNeeded::Counts).unwrap();
        assert_eq!(missing.name(), "missing-term");
        assert!(!missing.matches().unwrap());
    }

    #[test]
    fn test_registered_needs_win() {
        let index = two_segments();
        let mut ctx = QueryContext::new(Arc::clone(&index.segments()[0]), "body", true);
        let mut t = crate::lang::TextExpr::in_field("a", "body");
        t.needed = DataNeeded::Positions;
        ctx.register_needs(&QExpr::Text(t)).unwrap();
        let a = ctx.term("a", "body", DataNeeded::Docs).unwrap();
        assert_eq!(a.positions().unwrap(), vec![0]);
    }

    #[test]
    fn test_whitelist_rebased_per_segment() {
        let index = two_segments();
        let whitelist = WhitelistExpr {
            names: None,
            ids: Some(vec![2, 0, 2]),
        };
        let first = QueryContext::new(Arc::clone(&index.segments()[0]), "body", true);
        let second = QueryContext::new(Arc::clone(&index.segments()[1]), "body", true);
        assert_eq!(first.local_ids(&whitelist).unwrap(), vec![0]);
        assert_eq!(second.local_ids(&whitelist).unwrap(), vec![0]);
        assert!(first.local_ids(&WhitelistExpr::default()).is_err());
    }
}
