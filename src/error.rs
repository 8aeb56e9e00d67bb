//! Typed error kinds for the balance engine's fatal-at-startup boundaries.
//!
//! Per the error-handling design, only validation and discovery failures are fatal to the
//! whole run; everything scoped to one transfer (missing tool, destination prep, non-zero
//! exit) is instead carried as a plain string in `TransferResult::error_message` and never
//! promoted to a `BalanceError` — it must become a `Failed` result, not an exception that
//! crosses the pool/coordinator boundary. `BalanceError` is what `main` maps to an exit code.

use std::path::PathBuf;
use thiserror::Error;

/// The two ways a run can fail before any transfer even starts.
#[derive(Debug, Error)]
pub enum BalanceError {
    /// Malformed arguments, a nonexistent mount/member path, or a bad size string.
    #[error("{0}")]
    Validation(String),

    /// The pool-member-discovery helper could not enumerate any members.
    #[error("could not discover pool members for {mount_point}: {reason}")]
    Discovery {
        mount_point: PathBuf,
        reason: String,
    },
}
