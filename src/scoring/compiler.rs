//! Compilation of prepared expressions into evaluation trees.

use std::rc::Rc;

use crate::error::{RankError, Result};
use crate::index::DataNeeded;
use crate::lang::QExpr;
use crate::scoring::boolean::{
    AlwaysMatchEval, AndEval, CountToBoolEval, MultiEval, OrEval, RequireEval,
};
use crate::scoring::combine::{MaxEval, MultEval, WeightEval, WeightedSumEval};
use crate::scoring::context::QueryContext;
use crate::scoring::leaf::{
    ConstCountEval, ConstScoreEval, FixedMatchEval, TermEval, WhitelistEval,
};
use crate::scoring::node::{EvalRef, EvalTree};
use crate::scoring::scorer::{
    AbsoluteDiscountingScorer, BM25Scorer, BoolToScoreEval, CountToScoreEval, DirichletScorer,
    ScorerEval, missing_stats,
};
use crate::scoring::window::{CountSummary, CountSummaryEval, SynonymEval, WindowEval, WindowKind};

/// Compile `expr` into a tree bound to `ctx`'s segment and cursor.
///
/// `expr` must have been through binding, statistics, and data-needs
/// inference; scorers without statistics are rejected here.
pub fn compile(expr: &QExpr, ctx: &mut QueryContext) -> Result<EvalTree> {
    ctx.register_needs(expr)?;
    let root = expr_to_eval(expr, ctx)?;
    Ok(EvalTree::new(root, Rc::clone(ctx.env())))
}

/// Build the evaluation node for one expression, depth-first.
pub fn expr_to_eval(expr: &QExpr, ctx: &mut QueryContext) -> Result<EvalRef> {
    let num_docs = ctx.segment().num_docs() as u64;
    let node: EvalRef = match expr {
        QExpr::Text(t) => ctx.term(&t.text, t.counts_field()?, t.needed)?,
        QExpr::Lengths(l) => {
            let field = l.field.as_deref().unwrap_or(ctx.default_field()).to_string();
            ctx.lengths(&field)
        }
        QExpr::ConstScore(x) => Rc::new(ConstScoreEval::new(*x)),
        QExpr::ConstCount { count, lengths } => {
            let field = lengths
                .field
                .as_deref()
                .unwrap_or(ctx.default_field())
                .to_string();
            Rc::new(ConstCountEval::new(*count, ctx.lengths(&field)))
        }
        QExpr::ConstBool(b) => Rc::new(FixedMatchEval::new(*b, if *b { num_docs } else { 0 })),
        QExpr::AlwaysMatchLeaf => Rc::new(FixedMatchEval::new(true, num_docs)),
        QExpr::NeverMatchLeaf => Rc::new(FixedMatchEval::new(false, 0)),
        QExpr::Whitelist(w) => Rc::new(WhitelistEval::new(
            Rc::clone(ctx.env()),
            ctx.local_ids(w)?,
        )),
        QExpr::RawQuery(q) => match ctx.segment().raw_query(q)? {
            Some(postings) => Rc::new(TermEval::new(
                Rc::clone(ctx.env()),
                format!("raw:{q}"),
                DataNeeded::Docs,
                postings,
            )),
            None => Rc::new(FixedMatchEval::new(false, 0)),
        },

        QExpr::AlwaysMatch(child) => {
            Rc::new(AlwaysMatchEval::new(expr_to_eval(child, ctx)?, num_docs))
        }
        QExpr::Weight { child, weight } => {
            Rc::new(WeightEval::new(expr_to_eval(child, ctx)?, *weight))
        }
        QExpr::DirQL { child, mu, stats } => {
            let stats = stats.clone().ok_or_else(|| missing_stats(expr))?;
            let mu = mu.ok_or_else(|| unbound(expr, "mu"))?;
            let lengths = scorer_lengths(child, ctx)?;
            Rc::new(ScorerEval::new(
                expr_to_eval(child, ctx)?,
                lengths,
                DirichletScorer::new(mu, stats),
            ))
        }
        QExpr::AbsoluteDiscountingQL {
            child,
            delta,
            stats,
        } => {
            let stats = stats.clone().ok_or_else(|| missing_stats(expr))?;
            let delta = delta.ok_or_else(|| unbound(expr, "delta"))?;
            let lengths = scorer_lengths(child, ctx)?;
            Rc::new(ScorerEval::new(
                expr_to_eval(child, ctx)?,
                lengths,
                AbsoluteDiscountingScorer::new(delta, stats),
            ))
        }
        QExpr::BM25 { child, b, k, stats } => {
            let stats = stats.clone().ok_or_else(|| missing_stats(expr))?;
            let b = b.ok_or_else(|| unbound(expr, "b"))?;
            let k = k.ok_or_else(|| unbound(expr, "k"))?;
            let lengths = scorer_lengths(child, ctx)?;
            Rc::new(ScorerEval::new(
                expr_to_eval(child, ctx)?,
                lengths,
                BM25Scorer::new(b, k, stats),
            ))
        }
        QExpr::CountToScore(child) => Rc::new(CountToScoreEval::new(expr_to_eval(child, ctx)?)),
        QExpr::BoolToScore {
            child,
            true_score,
            false_score,
        } => Rc::new(BoolToScoreEval::new(
            expr_to_eval(child, ctx)?,
            *true_score,
            *false_score,
        )),
        QExpr::CountToBool { child, gt } => {
            Rc::new(CountToBoolEval::new(expr_to_eval(child, ctx)?, *gt))
        }

        QExpr::Combine { children, weights } => {
            if children.len() != weights.len() {
                return Err(RankError::structure(format!(
                    "{expr} has {} children but {} weights",
                    children.len(),
                    weights.len()
                )));
            }
            Rc::new(WeightedSumEval::new(all(children, ctx)?, weights.clone()))
        }
        QExpr::And(children) => Rc::new(AndEval::new(all(children, ctx)?)),
        QExpr::Or(children) => Rc::new(OrEval::new(all(children, ctx)?)),
        QExpr::Max(children) => Rc::new(MaxEval::new(all(children, ctx)?)),
        QExpr::Mult(children) => Rc::new(MultEval::new(all(children, ctx)?)),
        QExpr::Synonym(children) => Rc::new(SynonymEval::new(all(children, ctx)?)),
        QExpr::OrderedWindow { children, step } => {
            window(children, WindowKind::Ordered { step: *step }, ctx)?
        }
        QExpr::UnorderedWindow { children, width } => {
            window(children, WindowKind::Unordered { width: *width }, ctx)?
        }
        QExpr::Prox { children, width } => {
            window(children, WindowKind::Prox { width: *width }, ctx)?
        }
        QExpr::SmallerCount(children) => Rc::new(CountSummaryEval::new(
            all(children, ctx)?,
            CountSummary::Smallest,
        )),
        QExpr::UnorderedWindowCeiling { children, .. } => Rc::new(CountSummaryEval::new(
            all(children, ctx)?,
            CountSummary::Ceiling,
        )),
        QExpr::Multi(named) => {
            let mut children = Vec::with_capacity(named.len());
            let mut names = Vec::with_capacity(named.len());
            for (name, e) in named {
                names.push(name.clone());
                children.push(expr_to_eval(e, ctx)?);
            }
            Rc::new(MultiEval::new(children, names)?)
        }
        QExpr::Require { cond, value } => Rc::new(RequireEval::new(
            expr_to_eval(cond, ctx)?,
            expr_to_eval(value, ctx)?,
        )),
    };
    Ok(node)
}

fn all(children: &[QExpr], ctx: &mut QueryContext) -> Result<Vec<EvalRef>> {
    children.iter().map(|c| expr_to_eval(c, ctx)).collect()
}

fn window(children: &[QExpr], kind: WindowKind, ctx: &mut QueryContext) -> Result<EvalRef> {
    let children = all(children, ctx)?;
    Ok(Rc::new(WindowEval::new(Rc::clone(ctx.env()), children, kind)))
}

/// Lengths of the single field the scored child counts in.
fn scorer_lengths(child: &QExpr, ctx: &mut QueryContext) -> Result<EvalRef> {
    let field = match child {
        QExpr::Lengths(l) => l.field.clone(),
        _ => None,
    };
    let field = match field {
        Some(f) => f,
        None => child.single_counts_field(ctx.default_field())?,
    };
    Ok(ctx.lengths(&field))
}

fn unbound(expr: &QExpr, parameter: &str) -> RankError {
    RankError::structure(format!(
        "{parameter} of {expr} is unset; bind the expression to an environment first"
    ))
}
