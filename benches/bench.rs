//! Criterion benchmarks for the ranklang query engine.
//!
//! Covers the preparation pipeline, term-at-a-time scoring models and
//! positional windows over a synthetic collection.

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use ranklang::prelude::*;
use std::hint::black_box;
use std::sync::Arc;

/// Generate test documents for benchmarking.
fn generate_test_documents(count: usize) -> Vec<String> {
    let words = [
        "search",
        "engine",
        "full",
        "text",
        "index",
        "query",
        "document",
        "field",
        "term",
        "phrase",
        "boolean",
        "similarity",
        "relevance",
        "score",
        "analysis",
        "smoothing",
        "dirichlet",
        "window",
        "proximity",
        "learning",
        "algorithm",
        "data",
        "structure",
        "retrieval",
        "ranking",
        "filtering",
    ];

    let mut documents = Vec::with_capacity(count);
    for i in 0..count {
        let doc_length = 50 + (i % 100); // Variable length documents
        let mut doc_words = Vec::with_capacity(doc_length);

        for j in 0..doc_length {
            let word_idx = (i * 7 + j * 13) % words.len(); // Pseudo-random distribution
            doc_words.push(words[word_idx]);
        }

        documents.push(doc_words.join(" "));
    }

    documents
}

fn build_engine(count: usize, max_docs_per_segment: usize) -> QueryEngine {
    let mut builder = MemoryIndex::builder().max_docs_per_segment(max_docs_per_segment);
    for (i, text) in generate_test_documents(count).iter().enumerate() {
        builder.add_document(format!("doc{i}"), vec![("body", text.as_str())]);
    }
    QueryEngine::new(Arc::new(builder.build()), QueryEnv::default()).unwrap()
}

fn terms(ts: &[&str]) -> Vec<String> {
    ts.iter().map(|t| t.to_string()).collect()
}

/// Benchmark preparation alone.
fn bench_prepare(c: &mut Criterion) {
    let mut group = c.benchmark_group("prepare");
    let engine = build_engine(1000, 250);
    let sdm = sequential_dependence_model(
        &terms(&["dirichlet", "smoothing", "window", "ranking"]),
        None,
        SdmWeights::default(),
    );

    group.bench_function("sdm_four_terms", |b| {
        b.iter(|| black_box(engine.prepare(black_box(&sdm)).unwrap()))
    });

    group.finish();
}

/// Benchmark ranked search with the usual models.
fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("search");
    group.sample_size(20); // Reduce sample size for full-collection scans

    let docs = 5000;
    let engine = build_engine(docs, 1000);
    let query = terms(&["retrieval", "ranking", "proximity"]);

    group.throughput(Throughput::Elements(docs as u64));
    group.bench_function("query_likelihood", |b| {
        let q = query_likelihood(&query, None);
        b.iter(|| black_box(engine.search(&q, 10).unwrap()))
    });

    group.bench_function("bm25", |b| {
        let q = bm25_model(&query, None);
        b.iter(|| black_box(engine.search(&q, 10).unwrap()))
    });

    // Preparation is excluded so only movement and scoring are measured.
    group.bench_function("sdm_prepared", |b| {
        let q = sequential_dependence_model(&query, None, SdmWeights::default());
        let prepared = engine.prepare(&q).unwrap();
        b.iter(|| black_box(engine.search_prepared(&prepared, 10).unwrap()))
    });

    group.finish();
}

/// Compare one segment against many, to see what rayon buys.
fn bench_segments(c: &mut Criterion) {
    let mut group = c.benchmark_group("segments");
    group.sample_size(20);

    let q = query_likelihood(&terms(&["data", "structure"]), None);
    for per_segment in [5000, 500] {
        let engine = build_engine(5000, per_segment);
        group.bench_function(format!("max_docs_{per_segment}"), |b| {
            b.iter(|| black_box(engine.search(&q, 100).unwrap()))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_prepare, bench_search, bench_segments);
criterion_main!(benches);
