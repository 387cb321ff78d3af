//! The query expression tree.
//!
//! [`QExpr`] is a closed sum type: every pass (binding, type inference,
//! optimization, compilation) matches on it exhaustively. Trees are plain
//! values; passes take `&QExpr` and return a new tree.

use std::collections::BTreeSet;
use std::convert::Infallible;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{RankError, Result};
use crate::index::{CountStats, DataNeeded, DocId};

/// A term inside a field, smoothed with statistics drawn from `stats_field`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextExpr {
    /// The term.
    pub text: String,
    /// Field the counts come from; filled from the environment if unset.
    pub field: Option<String>,
    /// Field the statistics come from; defaults to `field`.
    pub stats_field: Option<String>,
    /// Collection statistics, attached during preparation.
    pub stats: Option<CountStats>,
    /// Granularity required by the ancestors of this leaf.
    pub needed: DataNeeded,
}

impl TextExpr {
    /// A term with every optional part left for the environment.
    pub fn new<S: Into<String>>(text: S) -> Self {
        TextExpr {
            text: text.into(),
            field: None,
            stats_field: None,
            stats: None,
            needed: DataNeeded::Docs,
        }
    }

    /// A term in an explicit field.
    pub fn in_field<S: Into<String>, F: Into<String>>(text: S, field: F) -> Self {
        TextExpr {
            field: Some(field.into()),
            ..TextExpr::new(text)
        }
    }

    /// The field counts are read from.
    pub fn counts_field(&self) -> Result<&str> {
        self.field
            .as_deref()
            .ok_or_else(|| RankError::structure(format!("no field for term '{}'", self.text)))
    }

    /// The field statistics are read from.
    pub fn stats_field(&self) -> Result<&str> {
        self.stats_field
            .as_deref()
            .or(self.field.as_deref())
            .ok_or_else(|| RankError::structure(format!("no stats field for term '{}'", self.text)))
    }
}

/// Document lengths of a field.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LengthsExpr {
    /// The field; filled from the environment if unset.
    pub field: Option<String>,
    /// Field-level statistics, attached during preparation.
    pub stats: Option<CountStats>,
}

impl LengthsExpr {
    /// Lengths of `field`.
    pub fn of<F: Into<String>>(field: F) -> Self {
        LengthsExpr {
            field: Some(field.into()),
            stats: None,
        }
    }
}

/// A fixed set of documents, by external name or by resolved id.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WhitelistExpr {
    /// External names, resolved against the index during binding.
    pub names: Option<Vec<String>>,
    /// Global document ids.
    pub ids: Option<Vec<DocId>>,
}

/// A typed ranked-retrieval query expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QExpr {
    /// Term match.
    Text(TextExpr),
    /// Document length of a field, as a count.
    Lengths(LengthsExpr),
    /// Constant score; never causes a match on its own.
    ConstScore(f64),
    /// Constant count, matching wherever its lengths match.
    ConstCount { count: u32, lengths: LengthsExpr },
    /// Constant boolean.
    ConstBool(bool),
    /// Matches a fixed set of documents.
    Whitelist(WhitelistExpr),
    /// Matches every document.
    AlwaysMatchLeaf,
    /// Matches no document.
    NeverMatchLeaf,
    /// An index-native query string, evaluated by the segment.
    RawQuery(String),

    /// Scores its child normally but matches every document during candidate generation.
    AlwaysMatch(Box<QExpr>),
    /// `weight * child`.
    Weight { child: Box<QExpr>, weight: f64 },
    /// Dirichlet-smoothed query likelihood.
    DirQL {
        child: Box<QExpr>,
        mu: Option<f64>,
        stats: Option<CountStats>,
    },
    /// Absolute-discounting query likelihood.
    AbsoluteDiscountingQL {
        child: Box<QExpr>,
        delta: Option<f64>,
        stats: Option<CountStats>,
    },
    /// Okapi BM25.
    BM25 {
        child: Box<QExpr>,
        b: Option<f64>,
        k: Option<f64>,
        stats: Option<CountStats>,
    },
    /// Uses a count directly as a score.
    CountToScore(Box<QExpr>),
    /// `true_score` when the child matches, `false_score` otherwise.
    BoolToScore {
        child: Box<QExpr>,
        true_score: f64,
        false_score: f64,
    },
    /// Matches when the child's count exceeds `gt`.
    CountToBool { child: Box<QExpr>, gt: u32 },

    /// `sum(weights[i] * children[i])`.
    Combine { children: Vec<QExpr>, weights: Vec<f64> },
    /// Boolean conjunction.
    And(Vec<QExpr>),
    /// Boolean disjunction.
    Or(Vec<QExpr>),
    /// Maximum of child scores (and counts).
    Max(Vec<QExpr>),
    /// Product of child scores.
    Mult(Vec<QExpr>),
    /// Several term leaves treated as one term.
    Synonym(Vec<QExpr>),
    /// Terms in order, each within `step` positions of the previous.
    OrderedWindow { children: Vec<QExpr>, step: u32 },
    /// Terms in any order inside a window of `width` positions.
    UnorderedWindow { children: Vec<QExpr>, width: u32 },
    /// Occurrences of the first term with every other term within `width`.
    Prox { children: Vec<QExpr>, width: u32 },
    /// Smallest child count when all children occur.
    SmallerCount(Vec<QExpr>),
    /// Upper bound on an unordered window's count.
    UnorderedWindowCeiling { children: Vec<QExpr>, width: u32 },
    /// Several named expressions evaluated together.
    Multi(Vec<(String, QExpr)>),
    /// Candidacy decided by `cond`, scores by `value`.
    Require { cond: Box<QExpr>, value: Box<QExpr> },
}

impl QExpr {
    /// Term in the default field.
    pub fn text<S: Into<String>>(text: S) -> Self {
        QExpr::Text(TextExpr::new(text))
    }

    /// Term in an explicit field.
    pub fn text_in<S: Into<String>, F: Into<String>>(text: S, field: F) -> Self {
        QExpr::Text(TextExpr::in_field(text, field))
    }

    /// Wrap this node in a weight.
    pub fn weighted(self, weight: f64) -> Self {
        QExpr::Weight {
            child: Box::new(self),
            weight,
        }
    }

    /// The child nodes, in order. `Require` yields `[cond, value]`.
    pub fn children(&self) -> Vec<&QExpr> {
        match self {
            QExpr::Text(_)
            | QExpr::Lengths(_)
            | QExpr::ConstScore(_)
            | QExpr::ConstCount { .. }
            | QExpr::ConstBool(_)
            | QExpr::Whitelist(_)
            | QExpr::AlwaysMatchLeaf
            | QExpr::NeverMatchLeaf
            | QExpr::RawQuery(_) => Vec::new(),

            QExpr::AlwaysMatch(child)
            | QExpr::Weight { child, .. }
            | QExpr::DirQL { child, .. }
            | QExpr::AbsoluteDiscountingQL { child, .. }
            | QExpr::BM25 { child, .. }
            | QExpr::CountToScore(child)
            | QExpr::BoolToScore { child, .. }
            | QExpr::CountToBool { child, .. } => vec![child.as_ref()],

            QExpr::Combine { children, .. }
            | QExpr::And(children)
            | QExpr::Or(children)
            | QExpr::Max(children)
            | QExpr::Mult(children)
            | QExpr::Synonym(children)
            | QExpr::OrderedWindow { children, .. }
            | QExpr::UnorderedWindow { children, .. }
            | QExpr::Prox { children, .. }
            | QExpr::SmallerCount(children)
            | QExpr::UnorderedWindowCeiling { children, .. } => children.iter().collect(),

            QExpr::Multi(named) => named.iter().map(|(_, e)| e).collect(),
            QExpr::Require { cond, value } => vec![cond.as_ref(), value.as_ref()],
        }
    }

    /// Rebuild this node with every direct child passed through `mapper`.
    /// Node parameters are kept as they are.
    pub fn try_map_children<E, F>(&self, mut mapper: F) -> std::result::Result<QExpr, E>
    where
        F: FnMut(&QExpr) -> std::result::Result<QExpr, E>,
    {
        fn list<E, F>(children: &[QExpr], mapper: &mut F) -> std::result::Result<Vec<QExpr>, E>
        where
            F: FnMut(&QExpr) -> std::result::Result<QExpr, E>,
        {
            children.iter().map(|c| mapper(c)).collect()
        }

        Ok(match self {
            QExpr::Text(_)
            | QExpr::Lengths(_)
            | QExpr::ConstScore(_)
            | QExpr::ConstCount { .. }
            | QExpr::ConstBool(_)
            | QExpr::Whitelist(_)
            | QExpr::AlwaysMatchLeaf
            | QExpr::NeverMatchLeaf
            | QExpr::RawQuery(_) => self.clone(),

            QExpr::AlwaysMatch(child) => QExpr::AlwaysMatch(Box::new(mapper(child)?)),
            QExpr::Weight { child, weight } => QExpr::Weight {
                child: Box::new(mapper(child)?),
                weight: *weight,
            },
            QExpr::DirQL { child, mu, stats } => QExpr::DirQL {
                child: Box::new(mapper(child)?),
                mu: *mu,
                stats: stats.clone(),
            },
            QExpr::AbsoluteDiscountingQL {
                child,
                delta,
                stats,
            } => QExpr::AbsoluteDiscountingQL {
                child: Box::new(mapper(child)?),
                delta: *delta,
                stats: stats.clone(),
            },
            QExpr::BM25 { child, b, k, stats } => QExpr::BM25 {
                child: Box::new(mapper(child)?),
                b: *b,
                k: *k,
                stats: stats.clone(),
            },
            QExpr::CountToScore(child) => QExpr::CountToScore(Box::new(mapper(child)?)),
            QExpr::BoolToScore {
                child,
                true_score,
                false_score,
            } => QExpr::BoolToScore {
                child: Box::new(mapper(child)?),
                true_score: *true_score,
                false_score: *false_score,
            },
            QExpr::CountToBool { child, gt } => QExpr::CountToBool {
                child: Box::new(mapper(child)?),
                gt: *gt,
            },

            QExpr::Combine { children, weights } => QExpr::Combine {
                children: list(children, &mut mapper)?,
                weights: weights.clone(),
            },
            QExpr::And(children) => QExpr::And(list(children, &mut mapper)?),
            QExpr::Or(children) => QExpr::Or(list(children, &mut mapper)?),
            QExpr::Max(children) => QExpr::Max(list(children, &mut mapper)?),
            QExpr::Mult(children) => QExpr::Mult(list(children, &mut mapper)?),
            QExpr::Synonym(children) => QExpr::Synonym(list(children, &mut mapper)?),
            QExpr::OrderedWindow { children, step } => QExpr::OrderedWindow {
                children: list(children, &mut mapper)?,
                step: *step,
            },
            QExpr::UnorderedWindow { children, width } => QExpr::UnorderedWindow {
                children: list(children, &mut mapper)?,
                width: *width,
            },
            QExpr::Prox { children, width } => QExpr::Prox {
                children: list(children, &mut mapper)?,
                width: *width,
            },
            QExpr::SmallerCount(children) => QExpr::SmallerCount(list(children, &mut mapper)?),
            QExpr::UnorderedWindowCeiling { children, width } => {
                QExpr::UnorderedWindowCeiling {
                    children: list(children, &mut mapper)?,
                    width: *width,
                }
            }
            QExpr::Multi(named) => QExpr::Multi(
                named
                    .iter()
                    .map(|(name, e)| Ok((name.clone(), mapper(e)?)))
                    .collect::<std::result::Result<_, E>>()?,
            ),
            QExpr::Require { cond, value } => QExpr::Require {
                cond: Box::new(mapper(cond)?),
                value: Box::new(mapper(value)?),
            },
        })
    }

    /// Infallible variant of [`try_map_children`](Self::try_map_children).
    pub fn map_children<F>(&self, mut mapper: F) -> QExpr
    where
        F: FnMut(&QExpr) -> QExpr,
    {
        match self.try_map_children::<Infallible, _>(|c| Ok(mapper(c))) {
            Ok(expr) => expr,
            Err(never) => match never {},
        }
    }

    /// Pre-order traversal.
    pub fn visit<'a, F: FnMut(&'a QExpr)>(&'a self, each: &mut F) {
        each(self);
        for child in self.children() {
            child.visit(each);
        }
    }

    /// Every term leaf in the tree, in pre-order.
    pub fn text_nodes(&self) -> Vec<&TextExpr> {
        let mut out = Vec::new();
        self.visit(&mut |q| {
            if let QExpr::Text(t) = q {
                out.push(t);
            }
        });
        out
    }

    /// Fields statistics are drawn from, across all term leaves.
    pub fn stats_fields(&self) -> Result<BTreeSet<String>> {
        self.text_nodes()
            .into_iter()
            .map(|t| t.stats_field().map(str::to_string))
            .collect()
    }

    /// Fields counts are drawn from, across all term leaves.
    pub fn counts_fields(&self) -> Result<BTreeSet<String>> {
        self.text_nodes()
            .into_iter()
            .map(|t| t.counts_field().map(str::to_string))
            .collect()
    }

    /// The single stats field of this subtree, `default` if it has no terms.
    pub fn single_stats_field(&self, default: &str) -> Result<String> {
        Self::single(self.stats_fields()?, default, self)
    }

    /// The single counts field of this subtree, `default` if it has no terms.
    pub fn single_counts_field(&self, default: &str) -> Result<String> {
        Self::single(self.counts_fields()?, default, self)
    }

    fn single(fields: BTreeSet<String>, default: &str, expr: &QExpr) -> Result<String> {
        let mut iter = fields.into_iter();
        match (iter.next(), iter.next()) {
            (None, _) => Ok(default.to_string()),
            (Some(f), None) => Ok(f),
            (Some(_), Some(_)) => Err(RankError::structure(format!(
                "cannot determine a single field for {expr}"
            ))),
        }
    }

    /// Short operator name, used in explanations and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            QExpr::Text(_) => "text",
            QExpr::Lengths(_) => "lengths",
            QExpr::ConstScore(_) => "const-score",
            QExpr::ConstCount { .. } => "const-count",
            QExpr::ConstBool(_) => "const-bool",
            QExpr::Whitelist(_) => "whitelist",
            QExpr::AlwaysMatchLeaf => "always",
            QExpr::NeverMatchLeaf => "never",
            QExpr::RawQuery(_) => "raw",
            QExpr::AlwaysMatch(_) => "always-match",
            QExpr::Weight { .. } => "weight",
            QExpr::DirQL { .. } => "dirichlet",
            QExpr::AbsoluteDiscountingQL { .. } => "absdisc",
            QExpr::BM25 { .. } => "bm25",
            QExpr::CountToScore(_) => "count-to-score",
            QExpr::BoolToScore { .. } => "bool-to-score",
            QExpr::CountToBool { .. } => "count-to-bool",
            QExpr::Combine { .. } => "combine",
            QExpr::And(_) => "band",
            QExpr::Or(_) => "bor",
            QExpr::Max(_) => "max",
            QExpr::Mult(_) => "mult",
            QExpr::Synonym(_) => "syn",
            QExpr::OrderedWindow { .. } => "od",
            QExpr::UnorderedWindow { .. } => "uw",
            QExpr::Prox { .. } => "prox",
            QExpr::SmallerCount(_) => "smaller-count",
            QExpr::UnorderedWindowCeiling { .. } => "uw-ceiling",
            QExpr::Multi(_) => "multi",
            QExpr::Require { .. } => "require",
        }
    }
}

fn write_opt(f: &mut fmt::Formatter<'_>, name: &str, value: Option<f64>) -> fmt::Result {
    match value {
        Some(v) => write!(f, ":{name}={v}"),
        None => Ok(()),
    }
}

impl fmt::Display for QExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QExpr::Text(t) => match &t.field {
                Some(field) => write!(f, "{field}:{}", t.text),
                None => write!(f, "{}", t.text),
            },
            QExpr::Lengths(l) => write!(f, "#lengths({})", l.field.as_deref().unwrap_or("?")),
            QExpr::ConstScore(x) => write!(f, "#const({x})"),
            QExpr::ConstCount { count, .. } => write!(f, "#const-count({count})"),
            QExpr::ConstBool(x) => write!(f, "#const({x})"),
            QExpr::Whitelist(w) => {
                let n = w
                    .ids
                    .as_ref()
                    .map(Vec::len)
                    .or(w.names.as_ref().map(Vec::len))
                    .unwrap_or(0);
                write!(f, "#whitelist(n={n})")
            }
            QExpr::AlwaysMatchLeaf => f.write_str("#always"),
            QExpr::NeverMatchLeaf => f.write_str("#never"),
            QExpr::RawQuery(q) => write!(f, "#raw({q:?})"),
            _ => {
                write!(f, "#{}", self.kind())?;
                match self {
                    QExpr::Weight { weight, .. } => write!(f, ":w={weight}")?,
                    QExpr::DirQL { mu, .. } => write_opt(f, "mu", *mu)?,
                    QExpr::AbsoluteDiscountingQL { delta, .. } => write_opt(f, "delta", *delta)?,
                    QExpr::BM25 { b, k, .. } => {
                        write_opt(f, "b", *b)?;
                        write_opt(f, "k", *k)?;
                    }
                    QExpr::CountToBool { gt, .. } => write!(f, ":gt={gt}")?,
                    QExpr::Combine { weights, .. } => {
                        let ws: Vec<String> = weights.iter().map(|w| w.to_string()).collect();
                        write!(f, ":w={}", ws.join(","))?;
                    }
                    QExpr::OrderedWindow { step, .. } => write!(f, ":{step}")?,
                    QExpr::UnorderedWindow { width, .. }
                    | QExpr::Prox { width, .. }
                    | QExpr::UnorderedWindowCeiling { width, .. } => write!(f, ":{width}")?,
                    _ => {}
                }
                f.write_str("(")?;
                match self {
                    QExpr::Multi(named) => {
                        for (i, (name, e)) in named.iter().enumerate() {
                            if i > 0 {
                                f.write_str(" ")?;
                            }
                            write!(f, "{name}={e}")?;
                        }
                    }
                    _ => {
                        for (i, child) in self.children().into_iter().enumerate() {
                            if i > 0 {
                                f.write_str(" ")?;
                            }
                            write!(f, "{child}")?;
                        }
                    }
                }
                f.write_str(")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_children_and_map() {
        let q = QExpr::Require {
            cond: Box::new(QExpr::text("a")),
            value: Box::new(QExpr::text("b").weighted(2.0)),
        };
        assert_eq!(q.children().len(), 2);

        let renamed = q.map_children(|c| match c {
            QExpr::Text(t) => QExpr::text(format!("{}!", t.text)),
            other => other.clone(),
        });
        assert_eq!(renamed.children()[0], &QExpr::text("a!"));
        assert!(matches!(renamed.children()[1], QExpr::Weight { weight, .. } if *weight == 2.0));
    }

    #[test]
    fn test_text_nodes_and_fields() {
        let q = QExpr::And(vec![
            QExpr::text_in("a", "body"),
            QExpr::OrderedWindow {
                children: vec![QExpr::text_in("b", "body"), QExpr::text_in("c", "title")],
                step: 1,
            },
        ]);
        let texts: Vec<&str> = q.text_nodes().iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
        assert_eq!(q.stats_fields().unwrap().len(), 2);
        assert!(q.single_stats_field("body").is_err());
        assert_eq!(
            QExpr::ConstScore(1.0).single_stats_field("body").unwrap(),
            "body"
        );
    }

    #[test]
    fn test_stats_field_defaults_to_field() {
        let t = TextExpr::in_field("fox", "title");
        assert_eq!(t.stats_field().unwrap(), "title");
        assert!(TextExpr::new("fox").counts_field().is_err());
    }

    #[test]
    fn test_display() {
        let q = QExpr::Combine {
            children: vec![
                QExpr::DirQL {
                    child: Box::new(QExpr::text_in("fox", "body")),
                    mu: Some(1500.0),
                    stats: None,
                },
                QExpr::text("dog").weighted(0.5),
            ],
            weights: vec![0.5, 0.5],
        };
        assert_eq!(
            q.to_string(),
            "#combine:w=0.5,0.5(#dirichlet:mu=1500(body:fox) #weight:w=0.5(dog))"
        );
    }
}
