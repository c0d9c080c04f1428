//! # autoinf
//!
//! Mines shape- and constraint-rules for deep-learning tensor operators from
//! traced invocations, and drives a symbolic graph generator from the mined
//! rules (`spec.md` §1).
//!
//! ## Pipeline
//!
//! ```text
//! traced invocation records
//!     |
//! [augment]              (C4 InvocationDb + C5 mutator)   -> augmented DB
//!     |
//! [infer-shapes]         (C6 shape_rules, C1 expr cache)  -> shape rule file
//!     |
//! [infer-constraints]    (C7 constraint_rules, C2 smt)    -> constraint rule file
//!     |
//! [match-dialect]        (C8 dialect)                     -> dialect-match file
//!     |
//! [generate]             (C9 graph_gen)                   -> generated graphs
//! ```
//!
//! Every stage is a plain library function over an already-loaded
//! [`Config`](config::Config); CLI argument parsing is out of scope
//! (`spec.md` §1) and [`cli`] only wires the five stages together for the
//! `autoinf-*` binaries.

#![warn(missing_docs)]

pub mod cli;
pub mod combinatorics;
pub mod config;
pub mod constraint_rules;
pub mod dialect;
pub mod error;
pub mod expr;
pub mod files;
pub mod graph_gen;
pub mod invocation_db;
pub mod mutator;
pub mod operator_instance;
pub mod oracle;
pub mod shape_rules;
pub mod smt;
pub mod symbol;
pub mod worker_pool;

pub use config::Config;
pub use error::AutoinfError;
