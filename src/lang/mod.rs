//! The query language: expression tree, environment binding and the
//! preparation passes that run before compilation.
//!
//! A query goes through [`QueryEnv::bind`], [`attach_stats`],
//! [`simplify`] and [`infer_data_needs`] in that order; the search layer
//! then derives its movement expression with
//! [`create_optimized_movement_expr`].

pub mod builder;
pub mod env;
pub mod expr;
pub mod movement;
pub mod needs;
pub mod optimize;

pub use self::env::{QueryEnv, QueryEnvBuilder, attach_stats};
pub use self::expr::{LengthsExpr, QExpr, TextExpr, WhitelistExpr};
pub use self::movement::{create_optimized_movement_expr, movement_expr};
pub use self::needs::infer_data_needs;
pub use self::optimize::{rewrite_once, simplify};
