//! # Ranklang
//!
//! A typed ranked-retrieval query language and the engine that runs it.
//!
//! ## Features
//!
//! - Query expressions as a closed sum type with builders for common models
//! - Environment binding, type inference and a fixed-point optimizer
//! - Dirichlet, BM25 and absolute-discounting scorers
//! - Ordered, unordered and proximity windows
//! - Two-phase evaluation: cheap candidate movement, then scoring
//! - Parallel search over index segments

pub mod error;
pub mod index;
pub mod lang;
pub mod movement;
pub mod scoring;
pub mod search;

pub mod prelude {
    pub use crate::error::{RankError, Result};
    pub use crate::index::{IndexReader, MemoryIndex, SegmentReader};
    pub use crate::lang::builder::*;
    pub use crate::lang::{QExpr, QueryEnv};
    pub use crate::scoring::Explanation;
    pub use crate::search::{QueryEngine, SearchHit, TopDocs};
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
