//! The evaluation-node contract shared by every compiled node.

use std::cell::Cell;
use std::fmt;
use std::fmt::Debug;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::{RankError, Result};
use crate::index::DocId;

/// Shared reference to a compiled node. Nodes are reference counted so that
/// identical term leaves can be shared inside one context; they are not
/// `Send` and never leave the thread that compiled them.
pub type EvalRef = Rc<dyn QueryEvalNode>;

/// The "current document" cursor of one execution context.
#[derive(Debug, Default)]
pub struct ScoringEnv {
    doc: Cell<DocId>,
}

impl ScoringEnv {
    /// A cursor positioned on document 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current segment-relative document.
    pub fn doc(&self) -> DocId {
        self.doc.get()
    }

    pub(crate) fn set_doc(&self, doc: DocId) {
        self.doc.set(doc);
    }
}

/// A compiled query node, evaluated against the context's current document.
pub trait QueryEvalNode: Debug {
    /// Short name used in explanations and error messages.
    fn name(&self) -> &'static str;

    /// Score of the current document.
    fn score(&self) -> Result<f64>;

    /// Count of the current document. Score-only nodes fail.
    fn count(&self) -> Result<u32>;

    /// Whether the current document matches; it must for the document to be ranked.
    fn matches(&self) -> Result<bool>;

    /// Positions in the current document. Only term, synonym and window
    /// nodes opened at positions granularity have them.
    fn positions(&self) -> Result<Vec<u32>> {
        Err(RankError::contract(format!("{} has no positions", self.name())))
    }

    /// Structured trace of how the current document was scored.
    fn explain(&self) -> Result<Explanation>;

    /// Estimated number of matching documents, used to order AND/OR children.
    fn estimate_df(&self) -> u64;
}

/// Contract error for `count()` on a node that only produces scores.
pub(crate) fn no_count(node: &dyn QueryEvalNode) -> RankError {
    RankError::contract(format!("count() called on score-only node {}", node.name()))
}

/// Contract error for `score()` on a node that only produces counts.
pub(crate) fn no_score(node: &dyn QueryEvalNode) -> RankError {
    RankError::contract(format!(
        "score() called on count-only node {}; wrap it in a scorer",
        node.name()
    ))
}

/// Boolean nodes score 1 and count 1 when they match, 0 otherwise.
pub(crate) fn boolean_value(matched: bool) -> f64 {
    if matched { 1.0 } else { 0.0 }
}

/// Explanations for every child, in order.
pub(crate) fn explain_all(children: &[EvalRef]) -> Result<Vec<Explanation>> {
    children.iter().map(|c| c.explain()).collect()
}

/// A node of a score explanation tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    /// The value this node produced.
    pub value: f64,
    /// Whether the node matched the document.
    pub matched: bool,
    /// Human-readable description.
    pub description: String,
    /// Explanations of the children.
    pub details: Vec<Explanation>,
}

impl Explanation {
    /// A matching node.
    pub fn matched<S: Into<String>>(value: f64, description: S, details: Vec<Explanation>) -> Self {
        Explanation {
            value,
            matched: true,
            description: description.into(),
            details,
        }
    }

    /// A non-matching node.
    pub fn missed<S: Into<String>>(value: f64, description: S, details: Vec<Explanation>) -> Self {
        Explanation {
            value,
            matched: false,
            description: description.into(),
            details,
        }
    }

    /// Matching or not depending on `matched`.
    pub fn new<S: Into<String>>(
        matched: bool,
        value: f64,
        description: S,
        details: Vec<Explanation>,
    ) -> Self {
        if matched {
            Self::matched(value, description, details)
        } else {
            Self::missed(value, description, details)
        }
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let mark = if self.matched { "" } else { " (miss)" };
        writeln!(
            f,
            "{:indent$}{} = {}{mark}",
            "",
            self.value,
            self.description,
            indent = depth * 2
        )?;
        for detail in &self.details {
            detail.write_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for Explanation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}

/// A compiled scoring expression together with its cursor.
#[derive(Debug, Clone)]
pub struct EvalTree {
    root: EvalRef,
    env: Rc<ScoringEnv>,
    positioned: bool,
}

impl EvalTree {
    /// Wrap a compiled root and the cursor its leaves read.
    pub fn new(root: EvalRef, env: Rc<ScoringEnv>) -> Self {
        EvalTree {
            root,
            env,
            positioned: false,
        }
    }

    /// The root node.
    pub fn root(&self) -> &EvalRef {
        &self.root
    }

    /// The current document.
    pub fn doc(&self) -> DocId {
        self.env.doc()
    }

    /// Make `doc` the current document. Postings only move forward, so
    /// documents must be visited in non-decreasing order.
    pub fn set_document(&mut self, doc: DocId) -> Result<()> {
        if self.positioned && doc < self.env.doc() {
            return Err(RankError::contract(format!(
                "documents must be visited in order: {doc} after {}",
                self.env.doc()
            )));
        }
        self.positioned = true;
        self.env.set_doc(doc);
        Ok(())
    }

    /// Score of the current document.
    pub fn score(&self) -> Result<f64> {
        self.root.score()
    }

    /// Count of the current document.
    pub fn count(&self) -> Result<u32> {
        self.root.count()
    }

    /// Whether the current document matches.
    pub fn matches(&self) -> Result<bool> {
        self.root.matches()
    }

    /// Explanation for the current document.
    pub fn explain(&self) -> Result<Explanation> {
        self.root.explain()
    }
}
