//! Candidate generation.
//!
//! The movement expression of a query is compiled into a tree of
//! [`QueryMover`]s over its own document-id iterators; the
//! [`OptimizedMovementIter`] steps it and lets the scoring tree veto
//! candidates.

pub mod iter;
pub mod mover;

pub use self::iter::OptimizedMovementIter;
pub use self::mover::{
    AlwaysMover, AndMover, NeverMover, OrMover, QueryMover, TermMover, WhitelistMover, build_mover,
};
