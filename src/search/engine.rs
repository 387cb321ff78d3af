//! The query engine: prepares expressions against an index and runs them.

use std::rc::Rc;
use std::sync::Arc;

use log::debug;
use rayon::prelude::*;

use crate::error::{RankError, Result};
use crate::index::{CountStats, DataNeeded, DocId, IndexReader, NO_MORE_DOCS, SegmentReader};
use crate::lang::{
    QExpr, QueryEnv, attach_stats, create_optimized_movement_expr, infer_data_needs,
    movement_expr, simplify,
};
use crate::movement::{OptimizedMovementIter, build_mover};
use crate::scoring::{
    EvalRef, EvalTree, Explanation, MultiEval, QueryContext, compile, expr_to_eval,
};
use crate::search::collector::{Collector, CountCollector, TopDocsCollector};
use crate::search::TopDocs;

/// A query after binding, statistics, optimization and type inference,
/// together with the movement expression derived from it.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedQuery {
    /// The expression that scores candidates.
    pub scoring: QExpr,
    /// The expression that enumerates candidates.
    pub movement: QExpr,
}

/// Runs ranked queries against an index.
#[derive(Debug, Clone)]
pub struct QueryEngine {
    index: Arc<dyn IndexReader>,
    env: QueryEnv,
}

impl QueryEngine {
    /// Create an engine; the environment is validated first.
    pub fn new(index: Arc<dyn IndexReader>, env: QueryEnv) -> Result<Self> {
        env.validate()?;
        Ok(QueryEngine { index, env })
    }

    /// The environment queries are bound to.
    pub fn env(&self) -> &QueryEnv {
        &self.env
    }

    /// The index being searched.
    pub fn index(&self) -> &Arc<dyn IndexReader> {
        &self.index
    }

    /// Run the preparation pipeline for ranking. Every structural and type
    /// error is raised here, before any document is touched; a root that
    /// cannot produce a score (a bare term or window) is a type error.
    pub fn prepare(&self, expr: &QExpr) -> Result<PreparedQuery> {
        self.prepare_at(expr, DataNeeded::Scores)
    }

    fn prepare_at(&self, expr: &QExpr, root: DataNeeded) -> Result<PreparedQuery> {
        let bound = self.env.bind(expr, self.index.as_ref())?;
        let with_stats = attach_stats(&bound, self.index.as_ref())?;
        let simplified = simplify(&with_stats, self.env.max_rewrite_iterations)?;
        let typed = infer_data_needs(&simplified, root)?;
        let scoring = self.attach_expression_stats(&typed)?;

        let movement = if self.env.optimize_movement {
            create_optimized_movement_expr(&scoring, self.env.max_rewrite_iterations)?
        } else {
            movement_expr(&scoring)
        };
        debug!("prepared {scoring} with movement {movement}");
        Ok(PreparedQuery { scoring, movement })
    }

    /// The `top_k` best documents for `expr` across all segments.
    pub fn search(&self, expr: &QExpr, top_k: usize) -> Result<TopDocs> {
        let prepared = self.prepare(expr)?;
        self.search_prepared(&prepared, top_k)
    }

    /// Search with a query that was already prepared by this engine.
    pub fn search_prepared(&self, prepared: &PreparedQuery, top_k: usize) -> Result<TopDocs> {
        let per_segment = self
            .index
            .segments()
            .par_iter()
            .map(|segment| self.collect_segment(prepared, segment, TopDocsCollector::new(top_k)))
            .collect::<Result<Vec<_>>>()?;

        let mut merged = TopDocsCollector::new(top_k);
        for collector in per_segment {
            merged.merge(collector);
        }

        let mut hits = merged.results();
        for hit in &mut hits {
            hit.name = self.index.document_name(hit.doc_id)?;
        }
        Ok(TopDocs {
            hits,
            total_hits: merged.total_hits(),
        })
    }

    /// Number of documents `expr` matches. Nothing is scored, so count
    /// expressions such as terms and windows are accepted as the root.
    pub fn count(&self, expr: &QExpr) -> Result<u64> {
        let prepared = self.prepare_at(expr, DataNeeded::Docs)?;
        let per_segment = self
            .index
            .segments()
            .par_iter()
            .map(|segment| self.collect_segment(&prepared, segment, CountCollector::new()))
            .collect::<Result<Vec<_>>>()?;

        let mut total = CountCollector::new();
        for collector in per_segment {
            total.merge(collector);
        }
        Ok(total.total_hits())
    }

    /// How `expr` scores the global document `doc`, whether or not it would
    /// be retrieved.
    pub fn explain(&self, expr: &QExpr, doc: DocId) -> Result<Explanation> {
        let prepared = self.prepare(expr)?;
        let (segment, local) = self.locate(doc)?;
        let mut ctx = self.context(segment);
        let mut tree = compile(&prepared.scoring, &mut ctx)?;
        tree.set_document(local)?;
        tree.explain()
    }

    /// Every named score of a multi expression for the global document `doc`.
    pub fn score_features(&self, expr: &QExpr, doc: DocId) -> Result<Vec<(String, f64)>> {
        let prepared = self.prepare(expr)?;
        let QExpr::Multi(named) = &prepared.scoring else {
            return Err(RankError::structure(format!(
                "feature extraction needs a multi expression, got {}",
                prepared.scoring.kind()
            )));
        };

        let (segment, local) = self.locate(doc)?;
        let mut ctx = self.context(segment);
        ctx.register_needs(&prepared.scoring)?;
        let mut children = Vec::with_capacity(named.len());
        let mut names = Vec::with_capacity(named.len());
        for (name, child) in named {
            names.push(name.clone());
            children.push(expr_to_eval(child, &mut ctx)?);
        }
        let multi = Rc::new(MultiEval::new(children, names)?);
        let root: EvalRef = Rc::clone(&multi) as EvalRef;
        let mut tree = EvalTree::new(root, Rc::clone(ctx.env()));
        tree.set_document(local)?;
        multi.scores()
    }

    fn context(&self, segment: &Arc<dyn SegmentReader>) -> QueryContext {
        QueryContext::new(
            Arc::clone(segment),
            self.env.default_field.as_str(),
            self.env.share_iterators,
        )
    }

    /// The segment holding global document `doc`, and its local id.
    fn locate(&self, doc: DocId) -> Result<(&Arc<dyn SegmentReader>, DocId)> {
        self.index
            .segments()
            .iter()
            .find(|s| doc >= s.doc_base() && doc - s.doc_base() < s.num_docs())
            .map(|s| (s, doc - s.doc_base()))
            .ok_or_else(|| RankError::index(format!("document {doc} is not in the index")))
    }

    /// Drive one segment's candidates into `collector`.
    fn collect_segment<C: Collector>(
        &self,
        prepared: &PreparedQuery,
        segment: &Arc<dyn SegmentReader>,
        mut collector: C,
    ) -> Result<C> {
        let mut ctx = self.context(segment);
        let scoring = compile(&prepared.scoring, &mut ctx)?;
        let mover = build_mover(&prepared.movement, &ctx)?;
        let mut iter = OptimizedMovementIter::new(mover, scoring);
        let base = segment.doc_base();

        let scored = collector.needs_scores();
        let mut doc = iter.next_doc()?;
        while doc != NO_MORE_DOCS {
            let score = if scored { iter.scoring().score()? } else { 0.0 };
            if !score.is_finite() {
                return Err(RankError::evaluation(
                    format!("score diverged to {score}"),
                    prepared.scoring.to_string(),
                    base + doc,
                ));
            }
            collector.collect(base + doc, score)?;
            doc = iter.next_doc()?;
        }
        debug!(
            "segment at {base}: {} hits, {} candidates rejected",
            collector.total_hits(),
            iter.rejected()
        );
        Ok(collector)
    }

    /// Fill statistics on scorers over composite count expressions (windows,
    /// synonyms, ...) by measuring the expression over the whole index.
    fn attach_expression_stats(&self, expr: &QExpr) -> Result<QExpr> {
        let expr = expr.try_map_children(|c| self.attach_expression_stats(c))?;
        Ok(match expr {
            QExpr::DirQL {
                child,
                mu,
                stats: None,
            } => QExpr::DirQL {
                stats: Some(self.expression_stats(&child)?),
                child,
                mu,
            },
            QExpr::AbsoluteDiscountingQL {
                child,
                delta,
                stats: None,
            } => QExpr::AbsoluteDiscountingQL {
                stats: Some(self.expression_stats(&child)?),
                child,
                delta,
            },
            QExpr::BM25 {
                child,
                b,
                k,
                stats: None,
            } => QExpr::BM25 {
                stats: Some(self.expression_stats(&child)?),
                child,
                b,
                k,
            },
            other => other,
        })
    }

    /// Collection statistics of a count expression.
    fn expression_stats(&self, expr: &QExpr) -> Result<CountStats> {
        let field = expr.single_counts_field(&self.env.default_field)?;
        let field_stats = self.index.field_stats(&field)?.ok_or_else(|| {
            RankError::structure(format!("field '{field}' does not exist in the index"))
        })?;
        let movement = movement_expr(expr);

        let per_segment = self
            .index
            .segments()
            .par_iter()
            .map(|segment| {
                let mut ctx = self.context(segment);
                let tree = compile(expr, &mut ctx)?;
                let mut iter = OptimizedMovementIter::new(build_mover(&movement, &ctx)?, tree);
                let (mut cf, mut df) = (0u64, 0u64);
                let mut doc = iter.next_doc()?;
                while doc != NO_MORE_DOCS {
                    let count = iter.scoring().count()?;
                    if count > 0 {
                        df += 1;
                        cf += count as u64;
                    }
                    doc = iter.next_doc()?;
                }
                Ok((cf, df))
            })
            .collect::<Result<Vec<_>>>()?;

        let (cf, df) = per_segment
            .into_iter()
            .fold((0, 0), |(cf, df), (c, d)| (cf + c, df + d));
        debug!("measured {expr}: cf={cf} df={df}");
        Ok(CountStats::new(
            expr.to_string(),
            cf,
            df,
            field_stats.cl,
            field_stats.dc,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MemoryIndex;
    use crate::lang::builder::{dirichlet, query_likelihood};

    fn engine() -> QueryEngine {
        let mut builder = MemoryIndex::builder().max_docs_per_segment(2);
        builder
            .add_document("a", vec![("body", "the quick brown fox")])
            .add_document("b", vec![("body", "the lazy dog")])
            .add_document("c", vec![("body", "brown dog and brown fox")]);
        QueryEngine::new(Arc::new(builder.build()), QueryEnv::default()).unwrap()
    }

    #[test]
    fn test_search_across_segments() {
        let engine = engine();
        let q = query_likelihood(&["brown".to_string(), "dog".to_string()], None);
        let top = engine.search(&q, 10).unwrap();
        assert_eq!(top.doc_ids(), vec![2, 1, 0]);
        assert_eq!(top.total_hits, 3);
        assert_eq!(top.hits[0].name.as_deref(), Some("c"));
        assert_eq!(engine.count(&q).unwrap(), 3);
    }

    #[test]
    fn test_prepare_errors_before_search() {
        let engine = engine();
        let bare = QExpr::Combine {
            children: vec![QExpr::text("brown")],
            weights: vec![1.0],
        };
        let err = engine.search(&bare, 10).unwrap_err();
        assert!(err.is_preparation());
    }

    #[test]
    fn test_window_stats_are_measured() {
        let engine = engine();
        let od = QExpr::OrderedWindow {
            children: vec![QExpr::text("brown"), QExpr::text("fox")],
            step: 1,
        };
        let prepared = engine.prepare(&dirichlet(od)).unwrap();
        let QExpr::DirQL {
            stats: Some(stats), ..
        } = &prepared.scoring
        else {
            panic!("expected stats on {}", prepared.scoring);
        };
        assert_eq!((stats.cf, stats.df), (2, 2));
    }

    #[test]
    fn test_count_roots_are_counted_not_ranked() {
        let engine = engine();
        let od = QExpr::OrderedWindow {
            children: vec![QExpr::text("brown"), QExpr::text("fox")],
            step: 1,
        };
        assert_eq!(engine.count(&od).unwrap(), 2);
        assert_eq!(engine.count(&QExpr::text("dog")).unwrap(), 2);

        for root in [od, QExpr::text("dog")] {
            let err = engine.search(&root, 10).unwrap_err();
            assert!(matches!(err, RankError::TypeCheck(_)), "{err}");
        }
    }

    #[test]
    fn test_unweighted_combine_child_is_rejected() {
        let engine = engine();
        let q = QExpr::Combine {
            children: vec![dirichlet(QExpr::text("fox")), dirichlet(QExpr::text("dog"))],
            weights: vec![1.0],
        };
        assert!(matches!(engine.prepare(&q), Err(RankError::Structure(_))));
        assert!(matches!(engine.search(&q, 10), Err(RankError::Structure(_))));
    }

    #[test]
    fn test_explain_out_of_range() {
        let engine = engine();
        let q = dirichlet(QExpr::text("fox"));
        assert!(engine.explain(&q, 2).unwrap().matched);
        assert!(!engine.explain(&q, 1).unwrap().matched);
        assert!(matches!(engine.explain(&q, 9), Err(RankError::Index(_))));
    }
}
