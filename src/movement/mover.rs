//! Document-id iterators for candidate generation.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::collections::binary_heap::PeekMut;
use std::fmt::Debug;

use crate::error::{RankError, Result};
use crate::index::{DataNeeded, DocId, NO_MORE_DOCS, Postings};
use crate::lang::QExpr;
use crate::scoring::QueryContext;

/// Trait for candidate iterators.
pub trait QueryMover: Send + Debug {
    /// Get the current document ID, or [`NO_MORE_DOCS`].
    fn doc_id(&self) -> DocId;

    /// Move to the first candidate `>= target` and return it. Never moves
    /// backwards.
    fn next_matching(&mut self, target: DocId) -> Result<DocId>;

    /// Upper bound on the number of candidates.
    fn estimate_df(&self) -> u64;

    /// Check if this mover is exhausted.
    fn is_done(&self) -> bool {
        self.doc_id() == NO_MORE_DOCS
    }
}

/// A mover that matches no documents.
#[derive(Debug, Default)]
pub struct NeverMover;

impl QueryMover for NeverMover {
    fn doc_id(&self) -> DocId {
        NO_MORE_DOCS
    }

    fn next_matching(&mut self, _target: DocId) -> Result<DocId> {
        Ok(NO_MORE_DOCS)
    }

    fn estimate_df(&self) -> u64 {
        0
    }
}

/// A mover that matches every document of a segment.
#[derive(Debug)]
pub struct AlwaysMover {
    current: DocId,
    num_docs: DocId,
}

impl AlwaysMover {
    /// Create a mover over `num_docs` documents.
    pub fn new(num_docs: DocId) -> Self {
        AlwaysMover {
            current: if num_docs == 0 { NO_MORE_DOCS } else { 0 },
            num_docs,
        }
    }
}

impl QueryMover for AlwaysMover {
    fn doc_id(&self) -> DocId {
        self.current
    }

    fn next_matching(&mut self, target: DocId) -> Result<DocId> {
        if target > self.current {
            self.current = if target >= self.num_docs {
                NO_MORE_DOCS
            } else {
                target
            };
        }
        Ok(self.current)
    }

    fn estimate_df(&self) -> u64 {
        self.num_docs as u64
    }
}

/// A mover based on a postings iterator.
#[derive(Debug)]
pub struct TermMover {
    postings: Box<dyn Postings>,
    cost: u64,
}

impl TermMover {
    /// Create a new term mover.
    pub fn new(postings: Box<dyn Postings>) -> Self {
        let cost = postings.cost();
        TermMover { postings, cost }
    }
}

impl QueryMover for TermMover {
    fn doc_id(&self) -> DocId {
        self.postings.doc_id()
    }

    fn next_matching(&mut self, target: DocId) -> Result<DocId> {
        self.postings.advance(target)
    }

    fn estimate_df(&self) -> u64 {
        self.cost
    }
}

/// A mover over a sorted list of segment-relative ids.
#[derive(Debug)]
pub struct WhitelistMover {
    ids: Vec<DocId>,
    index: usize,
}

impl WhitelistMover {
    /// `ids` must be sorted and deduplicated.
    pub fn new(ids: Vec<DocId>) -> Self {
        WhitelistMover { ids, index: 0 }
    }
}

impl QueryMover for WhitelistMover {
    fn doc_id(&self) -> DocId {
        self.ids.get(self.index).copied().unwrap_or(NO_MORE_DOCS)
    }

    fn next_matching(&mut self, target: DocId) -> Result<DocId> {
        if self.doc_id() < target {
            self.index += self.ids[self.index..].partition_point(|&id| id < target);
        }
        Ok(self.doc_id())
    }

    fn estimate_df(&self) -> u64 {
        self.ids.len() as u64
    }
}

/// A mover that implements conjunction (AND) by leapfrogging its children.
#[derive(Debug)]
pub struct AndMover {
    /// Children ordered by ascending estimated frequency.
    children: Vec<Box<dyn QueryMover>>,
    current: DocId,
    cost: u64,
}

impl AndMover {
    /// Create a conjunction positioned on its first candidate.
    pub fn new(mut children: Vec<Box<dyn QueryMover>>) -> Result<Self> {
        children.sort_by_key(|c| c.estimate_df());
        let cost = children.iter().map(|c| c.estimate_df()).min().unwrap_or(0);
        let mut mover = AndMover {
            current: if children.is_empty() { NO_MORE_DOCS } else { 0 },
            children,
            cost,
        };
        if !mover.children.is_empty() {
            mover.current = mover.align(0)?;
        }
        Ok(mover)
    }

    fn align(&mut self, target: DocId) -> Result<DocId> {
        let mut candidate = target;
        'search: loop {
            for child in self.children.iter_mut() {
                let doc = child.next_matching(candidate)?;
                if doc == NO_MORE_DOCS {
                    return Ok(NO_MORE_DOCS);
                }
                if doc > candidate {
                    candidate = doc;
                    continue 'search;
                }
            }
            return Ok(candidate);
        }
    }
}

impl QueryMover for AndMover {
    fn doc_id(&self) -> DocId {
        self.current
    }

    fn next_matching(&mut self, target: DocId) -> Result<DocId> {
        if self.current != NO_MORE_DOCS && target > self.current {
            self.current = self.align(target)?;
        }
        Ok(self.current)
    }

    fn estimate_df(&self) -> u64 {
        self.cost
    }
}

/// A helper struct for tracking movers in the disjunction heap.
#[derive(Debug)]
struct MoverEntry {
    mover: Box<dyn QueryMover>,
}

impl PartialEq for MoverEntry {
    fn eq(&self, other: &Self) -> bool {
        self.mover.doc_id() == other.mover.doc_id()
    }
}

impl Eq for MoverEntry {}

impl PartialOrd for MoverEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MoverEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap: lower doc IDs come first
        other.mover.doc_id().cmp(&self.mover.doc_id())
    }
}

/// A mover that implements disjunction (OR) of multiple movers.
#[derive(Debug)]
pub struct OrMover {
    /// Min-heap of active movers, ordered by current doc_id.
    heap: BinaryHeap<MoverEntry>,
    cost: u64,
}

impl OrMover {
    /// Create a new disjunction from multiple movers.
    pub fn new(movers: Vec<Box<dyn QueryMover>>) -> Self {
        let cost = movers.iter().map(|m| m.estimate_df()).max().unwrap_or(0);
        let heap = movers
            .into_iter()
            .filter(|m| !m.is_done())
            .map(|mover| MoverEntry { mover })
            .collect();
        OrMover { heap, cost }
    }
}

impl QueryMover for OrMover {
    fn doc_id(&self) -> DocId {
        self.heap
            .peek()
            .map(|entry| entry.mover.doc_id())
            .unwrap_or(NO_MORE_DOCS)
    }

    fn next_matching(&mut self, target: DocId) -> Result<DocId> {
        while let Some(mut top) = self.heap.peek_mut() {
            if top.mover.doc_id() >= target {
                break;
            }
            if top.mover.next_matching(target)? == NO_MORE_DOCS {
                PeekMut::pop(top);
            }
        }
        Ok(self.doc_id())
    }

    fn estimate_df(&self) -> u64 {
        self.cost
    }
}

/// Build the mover for a movement expression against `ctx`'s segment.
///
/// Movement expressions only contain term, whitelist, raw and constant
/// leaves joined by And, Or and Require; anything else is rejected.
pub fn build_mover(expr: &QExpr, ctx: &QueryContext) -> Result<Box<dyn QueryMover>> {
    let segment = ctx.segment();
    let mover: Box<dyn QueryMover> = match expr {
        QExpr::Text(t) => {
            match segment.open_postings(&t.text, t.counts_field()?, DataNeeded::Docs)? {
                Some(postings) => Box::new(TermMover::new(postings)),
                None => Box::new(NeverMover),
            }
        }
        QExpr::RawQuery(q) => match segment.raw_query(q)? {
            Some(postings) => Box::new(TermMover::new(postings)),
            None => Box::new(NeverMover),
        },
        QExpr::Whitelist(w) => Box::new(WhitelistMover::new(ctx.local_ids(w)?)),
        QExpr::AlwaysMatchLeaf | QExpr::ConstBool(true) => {
            Box::new(AlwaysMover::new(segment.num_docs()))
        }
        QExpr::NeverMatchLeaf | QExpr::ConstBool(false) => Box::new(NeverMover),
        QExpr::And(children) => Box::new(AndMover::new(build_all(children, ctx)?)?),
        QExpr::Or(children) => Box::new(OrMover::new(build_all(children, ctx)?)),
        QExpr::Require { cond, value } => Box::new(AndMover::new(vec![
            build_mover(cond, ctx)?,
            build_mover(value, ctx)?,
        ])?),
        other => {
            return Err(RankError::structure(format!(
                "{} cannot drive candidate movement: {other}",
                other.kind()
            )));
        }
    };
    Ok(mover)
}

fn build_all(children: &[QExpr], ctx: &QueryContext) -> Result<Vec<Box<dyn QueryMover>>> {
    children.iter().map(|c| build_mover(c, ctx)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Mover over a fixed list, for testing combinators.
    fn list(ids: &[DocId]) -> Box<dyn QueryMover> {
        Box::new(WhitelistMover::new(ids.to_vec()))
    }

    fn drain(mover: &mut dyn QueryMover) -> Vec<DocId> {
        let mut out = Vec::new();
        let mut doc = mover.next_matching(0).unwrap();
        while doc != NO_MORE_DOCS {
            out.push(doc);
            doc = mover.next_matching(doc + 1).unwrap();
        }
        out
    }

    #[test]
    fn test_never_and_always() {
        let mut never = NeverMover;
        assert!(never.is_done());
        assert_eq!(never.next_matching(3).unwrap(), NO_MORE_DOCS);

        let mut always = AlwaysMover::new(4);
        assert_eq!(always.doc_id(), 0);
        assert_eq!(always.next_matching(2).unwrap(), 2);
        assert_eq!(always.next_matching(1).unwrap(), 2);
        assert_eq!(always.next_matching(4).unwrap(), NO_MORE_DOCS);
        assert!(always.is_done());
        assert!(AlwaysMover::new(0).is_done());
    }

    #[test]
    fn test_and_mover() {
        let mut and = AndMover::new(vec![list(&[1, 3, 5, 7, 9]), list(&[3, 4, 9])]).unwrap();
        assert_eq!(and.doc_id(), 3);
        assert_eq!(and.estimate_df(), 3);
        assert_eq!(drain(&mut and), vec![3, 9]);

        let mut empty = AndMover::new(vec![list(&[1]), list(&[2])]).unwrap();
        assert!(empty.is_done());
        assert_eq!(empty.next_matching(0).unwrap(), NO_MORE_DOCS);
    }

    #[test]
    fn test_or_mover() {
        let mut or = OrMover::new(vec![list(&[1, 5]), list(&[]), list(&[2, 5, 8])]);
        assert_eq!(or.doc_id(), 1);
        assert_eq!(or.estimate_df(), 3);
        assert_eq!(drain(&mut or), vec![1, 2, 5, 8]);
        assert!(or.is_done());
    }

    #[test]
    fn test_whitelist_mover_skips() {
        let mut w = WhitelistMover::new(vec![2, 4, 6]);
        assert_eq!(w.next_matching(3).unwrap(), 4);
        assert_eq!(w.next_matching(0).unwrap(), 4);
        assert_eq!(w.next_matching(7).unwrap(), NO_MORE_DOCS);
    }
}
