//! Error types for the ranklang library.
//!
//! All errors are represented by the [`RankError`] enum. Errors fall into
//! three groups:
//!
//! - preparation errors ([`RankError::TypeCheck`], [`RankError::Structure`],
//!   [`RankError::Config`]) abort a query before any document is touched,
//! - evaluation errors ([`RankError::Evaluation`], [`RankError::Contract`])
//!   fail the in-flight search,
//! - collaborator errors ([`RankError::Index`], [`RankError::Io`]) are passed
//!   through from the index unmodified.
//!
//! # Examples
//!
//! ```
//! use ranklang::error::{RankError, Result};
//!
//! fn prepare() -> Result<()> {
//!     Err(RankError::type_check("cannot score a bare term"))
//! }
//!
//! assert!(prepare().unwrap_err().is_preparation());
//! ```

use std::io;

use thiserror::Error;

/// The main error type for ranklang operations.
#[derive(Error, Debug)]
pub enum RankError {
    /// A node was asked for a kind of data its position in the tree cannot provide.
    #[error("Type check error: {0}")]
    TypeCheck(String),

    /// Malformed expression shape or an unresolvable reference.
    #[error("Structure error: {0}")]
    Structure(String),

    /// A score diverged (infinite or NaN) while ranking a document.
    #[error("Evaluation error at doc={doc}: {message} in {expr}")]
    Evaluation {
        /// Description of the failure.
        message: String,
        /// The expression subtree that produced it.
        expr: String,
        /// The document being scored.
        doc: u32,
    },

    /// An evaluation node was used outside of its contract.
    #[error("Contract violation: {0}")]
    Contract(String),

    /// Errors raised by the index collaborator.
    #[error("Index error: {0}")]
    Index(String),

    /// Invalid configuration.
    #[error("Config error: {0}")]
    Config(String),

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic anyhow error, used by collaborators that report through anyhow.
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with RankError.
pub type Result<T> = std::result::Result<T, RankError>;

impl RankError {
    /// Create a new type check error.
    pub fn type_check<S: Into<String>>(msg: S) -> Self {
        RankError::TypeCheck(msg.into())
    }

    /// Create a new structure error.
    pub fn structure<S: Into<String>>(msg: S) -> Self {
        RankError::Structure(msg.into())
    }

    /// Create a new evaluation error for `expr` at document `doc`.
    pub fn evaluation<S: Into<String>, E: Into<String>>(msg: S, expr: E, doc: u32) -> Self {
        RankError::Evaluation {
            message: msg.into(),
            expr: expr.into(),
            doc,
        }
    }

    /// Create a new contract violation error.
    pub fn contract<S: Into<String>>(msg: S) -> Self {
        RankError::Contract(msg.into())
    }

    /// Create a new index error.
    pub fn index<S: Into<String>>(msg: S) -> Self {
        RankError::Index(msg.into())
    }

    /// Create a new config error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        RankError::Config(msg.into())
    }

    /// True for errors raised while preparing a query, before execution.
    pub fn is_preparation(&self) -> bool {
        matches!(
            self,
            RankError::TypeCheck(_) | RankError::Structure(_) | RankError::Config(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let error = RankError::type_check("bare term");
        assert_eq!(error.to_string(), "Type check error: bare term");

        let error = RankError::structure("window needs 2 children");
        assert_eq!(error.to_string(), "Structure error: window needs 2 children");

        let error = RankError::evaluation("score=NaN", "dirichlet(fox)", 7);
        assert_eq!(
            error.to_string(),
            "Evaluation error at doc=7: score=NaN in dirichlet(fox)"
        );
    }

    #[test]
    fn test_preparation_classification() {
        assert!(RankError::type_check("x").is_preparation());
        assert!(RankError::structure("x").is_preparation());
        assert!(!RankError::contract("x").is_preparation());
        assert!(!RankError::evaluation("x", "y", 0).is_preparation());
        assert!(!RankError::index("x").is_preparation());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "segment missing");
        let error = RankError::from(io_error);

        match error {
            RankError::Io(_) => {}
            _ => panic!("Expected IO error variant"),
        }
    }
}
