//! Crate-wide error composition (`spec.md` §7, `SPEC_FULL.md` §7).
//!
//! Each error kind from §7 lives as its own `thiserror` enum next to the
//! module that produces it (`OracleError` in `oracle`, `RuleTransferError`
//! in `dialect`, `ShapeArityMismatch` inside `invocation_db::DbError`,
//! I/O errors in `files::FileError`). [`AutoinfError`] only composes them
//! for the one place that needs a single return type: the per-operator
//! worker boundary (`worker_pool`), matching the teacher's per-module
//! `StorageError`/`ResourceError` pattern rather than one crate-wide enum
//! used everywhere.

use crate::files::FileError;
use crate::invocation_db::DbError;
use crate::operator_instance::OperatorInstanceError;

/// The union of error kinds that can terminate one operator's pipeline
/// stage (`spec.md` §7: "All errors are caught at the per-operator
/// boundary; no error escapes the worker").
#[derive(Debug, thiserror::Error)]
pub enum AutoinfError {
    /// A fatal, per-operator structural inconsistency in the invocation DB.
    #[error(transparent)]
    Db(#[from] DbError),
    /// The operator instance failed its construction invariants.
    #[error(transparent)]
    OperatorInstance(#[from] OperatorInstanceError),
    /// A record/DB/rule file could not be read or written.
    #[error(transparent)]
    File(#[from] FileError),
    /// Wall-clock or SMT timeout; partial results were still flushed
    /// (`spec.md` §7, `BudgetExceeded` — kept as a distinct variant so
    /// callers can tell a soft timeout from a hard failure, even though
    /// both are non-fatal to the worker pool).
    #[error("budget exceeded after partial results: {0}")]
    BudgetExceeded(String),
    /// Fatal I/O or a corrupt input record file; aborts this operator only.
    #[error("corrupt or unreadable input for operator {op}: {source}")]
    CorruptInput {
        /// The operator name this failure is scoped to.
        op: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}
