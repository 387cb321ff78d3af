//! Positional nodes: synonyms, windows and count summaries.
//!
//! Windows read position lists from their children and report the start
//! position of every window they find, so windows can be nested. Results are
//! memoized per document because scorers call `count()` and `matches()` on
//! the same document.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::Result;
use crate::index::DocId;
use crate::scoring::boolean::AnyOf;
use crate::scoring::node::{EvalRef, Explanation, QueryEvalNode, ScoringEnv, explain_all, no_score};

/// Several terms counted as one.
#[derive(Debug)]
pub struct SynonymEval {
    children: Vec<EvalRef>,
    any: AnyOf,
}

impl SynonymEval {
    /// Treat `children` as one term.
    pub fn new(children: Vec<EvalRef>) -> Self {
        let any = AnyOf::new(&children);
        SynonymEval { children, any }
    }
}

impl QueryEvalNode for SynonymEval {
    fn name(&self) -> &'static str {
        "synonym"
    }

    fn score(&self) -> Result<f64> {
        Err(no_score(self))
    }

    fn count(&self) -> Result<u32> {
        let mut total = 0;
        for child in &self.children {
            total += child.count()?;
        }
        Ok(total)
    }

    fn matches(&self) -> Result<bool> {
        self.any.matches()
    }

    fn positions(&self) -> Result<Vec<u32>> {
        let mut merged = Vec::new();
        for child in &self.children {
            merged.extend(child.positions()?);
        }
        merged.sort_unstable();
        merged.dedup();
        Ok(merged)
    }

    fn explain(&self) -> Result<Explanation> {
        Ok(Explanation::new(
            self.matches()?,
            self.count()? as f64,
            "synonym",
            explain_all(&self.children)?,
        ))
    }

    fn estimate_df(&self) -> u64 {
        self.children.iter().map(|c| c.estimate_df()).sum()
    }
}

/// How a window node decides that its children's positions form a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    /// In order, each term at most `step` positions after the previous.
    Ordered { step: u32 },
    /// Any order, all terms inside `width` consecutive positions.
    Unordered { width: u32 },
    /// Every other term within `width` positions of the first.
    Prox { width: u32 },
}

impl WindowKind {
    fn name(self) -> &'static str {
        match self {
            WindowKind::Ordered { .. } => "ordered-window",
            WindowKind::Unordered { .. } => "unordered-window",
            WindowKind::Prox { .. } => "prox",
        }
    }

    /// Start positions of every window in `lists`, one sorted list per child.
    pub fn find(self, lists: &[Vec<u32>]) -> Vec<u32> {
        if lists.is_empty() || lists.iter().any(Vec::is_empty) {
            return Vec::new();
        }
        match self {
            WindowKind::Ordered { step } => ordered_windows(lists, step),
            WindowKind::Unordered { width } => unordered_windows(lists, width),
            WindowKind::Prox { width } => prox_windows(lists, width),
        }
    }
}

fn ordered_windows(lists: &[Vec<u32>], step: u32) -> Vec<u32> {
    let mut starts = Vec::new();
    let mut cursors = vec![0usize; lists.len()];
    'starts: for &start in &lists[0] {
        let mut prev = start;
        for (list, cursor) in lists.iter().zip(cursors.iter_mut()).skip(1) {
            while *cursor < list.len() && list[*cursor] <= prev {
                *cursor += 1;
            }
            let Some(&next) = list.get(*cursor) else {
                break 'starts;
            };
            if next - prev > step {
                continue 'starts;
            }
            prev = next;
        }
        starts.push(start);
        for cursor in cursors.iter_mut().skip(1) {
            *cursor += 1;
        }
    }
    starts
}

fn unordered_windows(lists: &[Vec<u32>], width: u32) -> Vec<u32> {
    let mut starts = Vec::new();
    let mut cursors = vec![0usize; lists.len()];
    loop {
        let mut min = (u32::MAX, 0usize);
        let mut max = 0u32;
        for (i, (list, &cursor)) in lists.iter().zip(&cursors).enumerate() {
            let Some(&p) = list.get(cursor) else {
                return starts;
            };
            if p < min.0 {
                min = (p, i);
            }
            max = max.max(p);
        }
        if max - min.0 < width {
            starts.push(min.0);
        }
        cursors[min.1] += 1;
    }
}

fn prox_windows(lists: &[Vec<u32>], width: u32) -> Vec<u32> {
    lists[0]
        .iter()
        .copied()
        .filter(|&p| {
            lists[1..].iter().all(|list| {
                let lo = p.saturating_sub(width);
                let i = list.partition_point(|&q| q < lo);
                list.get(i).is_some_and(|&q| q <= p.saturating_add(width))
            })
        })
        .collect()
}

/// Counts windows of its children's positions.
#[derive(Debug)]
pub struct WindowEval {
    env: Rc<ScoringEnv>,
    children: Vec<EvalRef>,
    kind: WindowKind,
    cost: u64,
    cached: RefCell<Option<(DocId, Rc<[u32]>)>>,
}

impl WindowEval {
    /// A window of `kind` over `children`.
    pub fn new(env: Rc<ScoringEnv>, children: Vec<EvalRef>, kind: WindowKind) -> Self {
        let cost = children.iter().map(|c| c.estimate_df()).min().unwrap_or(0);
        WindowEval {
            env,
            children,
            kind,
            cost,
            cached: RefCell::new(None),
        }
    }

    fn windows(&self) -> Result<Rc<[u32]>> {
        let doc = self.env.doc();
        if let Some((cached_doc, starts)) = self.cached.borrow().as_ref() {
            if *cached_doc == doc {
                return Ok(Rc::clone(starts));
            }
        }

        let mut lists = Vec::with_capacity(self.children.len());
        for child in &self.children {
            if !child.matches()? {
                lists.clear();
                break;
            }
            lists.push(child.positions()?);
        }
        let starts: Rc<[u32]> = self.kind.find(&lists).into();
        *self.cached.borrow_mut() = Some((doc, Rc::clone(&starts)));
        Ok(starts)
    }
}

impl QueryEvalNode for WindowEval {
    fn name(&self) -> &'static str {
        self.kind.name()
    }

    fn score(&self) -> Result<f64> {
        Err(no_score(self))
    }

    fn count(&self) -> Result<u32> {
        Ok(self.windows()?.len() as u32)
    }

    fn matches(&self) -> Result<bool> {
        Ok(!self.windows()?.is_empty())
    }

    fn positions(&self) -> Result<Vec<u32>> {
        Ok(self.windows()?.to_vec())
    }

    fn explain(&self) -> Result<Explanation> {
        let count = self.count()?;
        Ok(Explanation::new(
            count > 0,
            count as f64,
            format!("{:?}", self.kind),
            explain_all(&self.children)?,
        ))
    }

    fn estimate_df(&self) -> u64 {
        self.cost
    }
}

/// How [`CountSummaryEval`] folds its children's counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountSummary {
    /// The smallest child count.
    Smallest,
    /// `sum - (n - 1)`: an upper bound on unordered windows.
    Ceiling,
}

/// Summarizes child counts when every child occurs; zero otherwise.
#[derive(Debug)]
pub struct CountSummaryEval {
    children: Vec<EvalRef>,
    summary: CountSummary,
    cost: u64,
}

impl CountSummaryEval {
    /// Fold `children` with `summary`.
    pub fn new(children: Vec<EvalRef>, summary: CountSummary) -> Self {
        let cost = children.iter().map(|c| c.estimate_df()).min().unwrap_or(0);
        CountSummaryEval {
            children,
            summary,
            cost,
        }
    }
}

impl QueryEvalNode for CountSummaryEval {
    fn name(&self) -> &'static str {
        match self.summary {
            CountSummary::Smallest => "smaller-count",
            CountSummary::Ceiling => "uw-ceiling",
        }
    }

    fn score(&self) -> Result<f64> {
        Err(no_score(self))
    }

    fn count(&self) -> Result<u32> {
        if !self.matches()? {
            return Ok(0);
        }
        let mut counts = Vec::with_capacity(self.children.len());
        for child in &self.children {
            counts.push(child.count()?);
        }
        Ok(match self.summary {
            CountSummary::Smallest => counts.into_iter().min().unwrap_or(0),
            CountSummary::Ceiling => {
                let n = counts.len() as u32;
                counts
                    .into_iter()
                    .sum::<u32>()
                    .saturating_sub(n.saturating_sub(1))
            }
        })
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
        Ok(Explanation::new(
            self.matches()?,
            self.count()? as f64,
            self.name(),
            explain_all(&self.children)?,
        ))
    }

    fn estimate_df(&self) -> u64 {
        self.cost
    }
}
