//! Query environment: defaults, hyperparameters and binding.

use std::fs;
use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{RankError, Result};
use crate::index::IndexReader;
use crate::lang::expr::{LengthsExpr, QExpr, WhitelistExpr};

/// Defaults and switches applied to every query prepared against an index.
///
/// # Example
///
/// ```
/// use ranklang::lang::QueryEnv;
///
/// let env = QueryEnv::builder()
///     .default_field("text")
///     .dirichlet_mu(2500.0)
///     .build()
///     .unwrap();
/// assert_eq!(env.default_field, "text");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryEnv {
    /// Field for terms and lengths that do not name one.
    pub default_field: String,
    /// Field statistics are drawn from when a term names none. `None` means
    /// the term's own field.
    pub default_stats_field: Option<String>,
    /// Dirichlet smoothing parameter.
    pub dirichlet_mu: f64,
    /// BM25 length normalization.
    pub bm25_b: f64,
    /// BM25 term-frequency saturation.
    pub bm25_k: f64,
    /// Absolute discounting parameter.
    pub absolute_discounting_delta: f64,
    /// Derive a cheaper movement expression for candidate generation.
    pub optimize_movement: bool,
    /// Share one postings iterator between identical terms in a query.
    pub share_iterators: bool,
    /// Upper bound on optimizer passes before giving up.
    pub max_rewrite_iterations: usize,
}

impl Default for QueryEnv {
    fn default() -> Self {
        QueryEnv {
            default_field: "body".to_string(),
            default_stats_field: None,
            dirichlet_mu: 1500.0,
            bm25_b: 0.75,
            bm25_k: 1.2,
            absolute_discounting_delta: 0.7,
            optimize_movement: true,
            share_iterators: true,
            max_rewrite_iterations: 1000,
        }
    }
}

impl QueryEnv {
    /// Start from the defaults.
    pub fn builder() -> QueryEnvBuilder {
        QueryEnvBuilder::new()
    }

    /// Parse and validate a JSON configuration. Missing keys take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let env: QueryEnv = serde_json::from_str(json)?;
        env.validate()?;
        Ok(env)
    }

    /// Load and validate a JSON configuration file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check that every hyperparameter is in range.
    pub fn validate(&self) -> Result<()> {
        if self.default_field.is_empty() {
            return Err(RankError::config("default_field must not be empty"));
        }
        if !(self.dirichlet_mu.is_finite() && self.dirichlet_mu > 0.0) {
            return Err(RankError::config(format!(
                "dirichlet_mu must be positive, got {}",
                self.dirichlet_mu
            )));
        }
        if !(0.0..=1.0).contains(&self.bm25_b) {
            return Err(RankError::config(format!(
                "bm25_b must be in [0, 1], got {}",
                self.bm25_b
            )));
        }
        if !(self.bm25_k.is_finite() && self.bm25_k >= 0.0) {
            return Err(RankError::config(format!(
                "bm25_k must be non-negative, got {}",
                self.bm25_k
            )));
        }
        if !(0.0..=1.0).contains(&self.absolute_discounting_delta) {
            return Err(RankError::config(format!(
                "absolute_discounting_delta must be in [0, 1], got {}",
                self.absolute_discounting_delta
            )));
        }
        if self.max_rewrite_iterations == 0 {
            return Err(RankError::config("max_rewrite_iterations must be positive"));
        }
        Ok(())
    }

    /// Fill defaults into every node that left them unset: fields, stats
    /// fields and model hyperparameters. Whitelists given by name are
    /// resolved to document ids through `index`.
    pub fn bind(&self, expr: &QExpr, index: &dyn IndexReader) -> Result<QExpr> {
        let bound = match expr {
            QExpr::Text(t) => {
                let mut t = t.clone();
                if t.field.is_none() {
                    t.field = Some(self.default_field.clone());
                }
                if t.stats_field.is_none() {
                    t.stats_field = self.default_stats_field.clone();
                }
                QExpr::Text(t)
            }
            QExpr::Lengths(l) => QExpr::Lengths(self.bind_lengths(l)),
            QExpr::ConstCount { count, lengths } => QExpr::ConstCount {
                count: *count,
                lengths: self.bind_lengths(lengths),
            },
            QExpr::Whitelist(w) => QExpr::Whitelist(self.bind_whitelist(w, index)?),
            QExpr::RawQuery(q) if q.trim().is_empty() => {
                return Err(RankError::structure("raw query must not be empty"));
            }
            QExpr::DirQL { child, mu, stats } => QExpr::DirQL {
                child: Box::new(self.bind(child, index)?),
                mu: Some(mu.unwrap_or(self.dirichlet_mu)),
                stats: stats.clone(),
            },
            QExpr::AbsoluteDiscountingQL {
                child,
                delta,
                stats,
            } => QExpr::AbsoluteDiscountingQL {
                child: Box::new(self.bind(child, index)?),
                delta: Some(delta.unwrap_or(self.absolute_discounting_delta)),
                stats: stats.clone(),
            },
            QExpr::BM25 { child, b, k, stats } => QExpr::BM25 {
                child: Box::new(self.bind(child, index)?),
                b: Some(b.unwrap_or(self.bm25_b)),
                k: Some(k.unwrap_or(self.bm25_k)),
                stats: stats.clone(),
            },
            other => other.try_map_children(|c| self.bind(c, index))?,
        };
        Ok(bound)
    }

    fn bind_lengths(&self, lengths: &LengthsExpr) -> LengthsExpr {
        LengthsExpr {
            field: Some(
                lengths
                    .field
                    .clone()
                    .unwrap_or_else(|| self.default_field.clone()),
            ),
            stats: lengths.stats.clone(),
        }
    }

    fn bind_whitelist(&self, w: &WhitelistExpr, index: &dyn IndexReader) -> Result<WhitelistExpr> {
        if w.ids.is_some() {
            return Ok(w.clone());
        }
        let names = w.names.as_ref().ok_or_else(|| {
            RankError::structure("whitelist must have either document names or ids")
        })?;
        let ids = index.lookup_document_ids(names)?;
        debug!("whitelist resolved {} of {} names", ids.len(), names.len());
        Ok(WhitelistExpr {
            names: w.names.clone(),
            ids: Some(ids),
        })
    }
}

/// Attach collection statistics to term and lengths leaves, and to scorers
/// directly over a term. Scorers over other count expressions are left for
/// the search layer, which measures them against the index.
///
/// Fails with a structure error if a field was never indexed.
pub fn attach_stats(expr: &QExpr, index: &dyn IndexReader) -> Result<QExpr> {
    let attached = match expr {
        QExpr::Text(t) => {
            let mut t = t.clone();
            if t.stats.is_none() {
                let field = t.stats_field()?;
                require_field(index, field)?;
                t.stats = Some(index.term_stats(&t.text, field)?);
            }
            QExpr::Text(t)
        }
        QExpr::Lengths(l) => QExpr::Lengths(lengths_stats(l, index)?),
        QExpr::ConstCount { count, lengths } => QExpr::ConstCount {
            count: *count,
            lengths: lengths_stats(lengths, index)?,
        },
        QExpr::DirQL { child, mu, stats } => {
            let child = attach_stats(child, index)?;
            QExpr::DirQL {
                stats: stats.clone().or_else(|| term_stats_of(&child)),
                child: Box::new(child),
                mu: *mu,
            }
        }
        QExpr::AbsoluteDiscountingQL {
            child,
            delta,
            stats,
        } => {
            let child = attach_stats(child, index)?;
            QExpr::AbsoluteDiscountingQL {
                stats: stats.clone().or_else(|| term_stats_of(&child)),
                child: Box::new(child),
                delta: *delta,
            }
        }
        QExpr::BM25 { child, b, k, stats } => {
            let child = attach_stats(child, index)?;
            QExpr::BM25 {
                stats: stats.clone().or_else(|| term_stats_of(&child)),
                child: Box::new(child),
                b: *b,
                k: *k,
            }
        }
        other => other.try_map_children(|c| attach_stats(c, index))?,
    };
    Ok(attached)
}

fn term_stats_of(expr: &QExpr) -> Option<crate::index::CountStats> {
    match expr {
        QExpr::Text(t) => t.stats.clone(),
        _ => None,
    }
}

fn require_field(index: &dyn IndexReader, field: &str) -> Result<()> {
    match index.field_stats(field)? {
        Some(_) => Ok(()),
        None => Err(RankError::structure(format!(
            "field '{field}' does not exist in the index"
        ))),
    }
}

fn lengths_stats(lengths: &LengthsExpr, index: &dyn IndexReader) -> Result<LengthsExpr> {
    let field = lengths
        .field
        .as_deref()
        .ok_or_else(|| RankError::structure("lengths without a field"))?;
    let stats = match &lengths.stats {
        Some(s) => s.clone(),
        None => index.field_stats(field)?.ok_or_else(|| {
            RankError::structure(format!("field '{field}' does not exist in the index"))
        })?,
    };
    Ok(LengthsExpr {
        field: Some(field.to_string()),
        stats: Some(stats),
    })
}

/// Builder for [`QueryEnv`].
#[derive(Debug, Clone, Default)]
pub struct QueryEnvBuilder {
    env: QueryEnv,
}

impl QueryEnvBuilder {
    /// Start from [`QueryEnv::default`].
    pub fn new() -> Self {
        QueryEnvBuilder {
            env: QueryEnv::default(),
        }
    }

    /// Set the default field.
    pub fn default_field<S: Into<String>>(mut self, field: S) -> Self {
        self.env.default_field = field.into();
        self
    }

    /// Set the default stats field.
    pub fn default_stats_field<S: Into<String>>(mut self, field: S) -> Self {
        self.env.default_stats_field = Some(field.into());
        self
    }

    /// Set the Dirichlet mu.
    pub fn dirichlet_mu(mut self, mu: f64) -> Self {
        self.env.dirichlet_mu = mu;
        self
    }

    /// Set BM25 b and k.
    pub fn bm25(mut self, b: f64, k: f64) -> Self {
        self.env.bm25_b = b;
        self.env.bm25_k = k;
        self
    }

    /// Set the absolute discounting delta.
    pub fn absolute_discounting_delta(mut self, delta: f64) -> Self {
        self.env.absolute_discounting_delta = delta;
        self
    }

    /// Toggle movement-expression optimization.
    pub fn optimize_movement(mut self, on: bool) -> Self {
        self.env.optimize_movement = on;
        self
    }

    /// Toggle iterator sharing between identical terms.
    pub fn share_iterators(mut self, on: bool) -> Self {
        self.env.share_iterators = on;
        self
    }

    /// Bound the optimizer's passes.
    pub fn max_rewrite_iterations(mut self, n: usize) -> Self {
        self.env.max_rewrite_iterations = n;
        self
    }

    /// Validate and return the environment.
    pub fn build(self) -> Result<QueryEnv> {
        self.env.validate()?;
        Ok(self.env)
    }
}
