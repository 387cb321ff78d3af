//! Evaluation nodes and the compiler that builds them.
//!
//! A prepared [`QExpr`](crate::lang::QExpr) is compiled once per segment
//! into a tree of [`QueryEvalNode`]s sharing one [`ScoringEnv`] cursor. The
//! driver moves the cursor forward with [`EvalTree::set_document`] and then
//! asks the root for its score, count, match or explanation.

pub mod boolean;
pub mod combine;
pub mod compiler;
pub mod context;
pub mod leaf;
pub mod node;
pub mod scorer;
pub mod window;

pub use self::boolean::{
    AlwaysMatchEval, AndEval, CountToBoolEval, MultiEval, OrEval, RequireEval,
};
pub use self::combine::{MaxEval, MultEval, WeightEval, WeightedSumEval};
pub use self::compiler::{compile, expr_to_eval};
pub use self::context::QueryContext;
pub use self::leaf::{
    ConstCountEval, ConstScoreEval, FixedMatchEval, LengthsEval, MissingTermEval, TermEval,
    WhitelistEval,
};
pub use self::node::{EvalRef, EvalTree, Explanation, QueryEvalNode, ScoringEnv};
pub use self::scorer::{
    AbsoluteDiscountingScorer, BM25Scorer, BoolToScoreEval, CountToScoreEval, DirichletScorer,
    Scorer, ScorerEval,
};
pub use self::window::{CountSummary, CountSummaryEval, SynonymEval, WindowEval, WindowKind};
