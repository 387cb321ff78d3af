//! The two-phase candidate loop.

use log::trace;

use crate::error::Result;
use crate::index::{DocId, NO_MORE_DOCS};
use crate::movement::mover::QueryMover;
use crate::scoring::EvalTree;

/// Drives a cheap movement mover and confirms each candidate against the
/// scoring tree before handing it out.
#[derive(Debug)]
pub struct OptimizedMovementIter {
    mover: Box<dyn QueryMover>,
    scoring: EvalTree,
    current: Option<DocId>,
    rejected: u64,
}

impl OptimizedMovementIter {
    /// Pair a movement mover with the scoring tree of the same segment.
    pub fn new(mover: Box<dyn QueryMover>, scoring: EvalTree) -> Self {
        OptimizedMovementIter {
            mover,
            scoring,
            current: None,
            rejected: 0,
        }
    }

    /// The scoring tree, positioned on the last accepted document.
    pub fn scoring(&self) -> &EvalTree {
        &self.scoring
    }

    /// Candidates the movement expression proposed but scoring rejected.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Move to the first document `>= target` accepted by both the mover and
    /// the scoring tree.
    pub fn advance(&mut self, target: DocId) -> Result<DocId> {
        let mut dest = target;
        loop {
            let next = self.mover.next_matching(dest)?;
            if next == NO_MORE_DOCS {
                self.current = Some(NO_MORE_DOCS);
                return Ok(NO_MORE_DOCS);
            }
            self.scoring.set_document(next)?;
            if self.scoring.matches()? {
                self.current = Some(next);
                return Ok(next);
            }
            trace!("candidate {next} rejected by scoring");
            self.rejected += 1;
            dest = dest.max(next + 1);
        }
    }

    /// The next accepted document after the current one.
    pub fn next_doc(&mut self) -> Result<DocId> {
        let target = match self.current {
            None => 0,
            Some(NO_MORE_DOCS) => return Ok(NO_MORE_DOCS),
            Some(doc) => doc + 1,
        };
        self.advance(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movement::mover::{AlwaysMover, WhitelistMover};
    use crate::scoring::{EvalRef, ScoringEnv, WhitelistEval};
    use std::rc::Rc;

    fn scoring(ids: Vec<DocId>) -> EvalTree {
        let env = Rc::new(ScoringEnv::new());
        let root: EvalRef = Rc::new(WhitelistEval::new(Rc::clone(&env), ids));
        EvalTree::new(root, env)
    }

    #[test]
    fn test_scoring_confirms_candidates() {
        let mut iter =
            OptimizedMovementIter::new(Box::new(AlwaysMover::new(6)), scoring(vec![1, 4]));
        assert_eq!(iter.next_doc().unwrap(), 1);
        assert_eq!(iter.scoring().doc(), 1);
        assert_eq!(iter.next_doc().unwrap(), 4);
        assert_eq!(iter.next_doc().unwrap(), NO_MORE_DOCS);
        assert_eq!(iter.next_doc().unwrap(), NO_MORE_DOCS);
        assert_eq!(iter.rejected(), 4);
    }

    #[test]
    fn test_advance_skips_ahead() {
        let mover = Box::new(WhitelistMover::new(vec![0, 2, 3, 7]));
        let mut iter = OptimizedMovementIter::new(mover, scoring(vec![0, 3, 7]));
        assert_eq!(iter.advance(1).unwrap(), 3);
        assert_eq!(iter.advance(5).unwrap(), 7);
        assert_eq!(iter.rejected(), 1);
    }
}
