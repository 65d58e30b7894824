//! Codegen error types.
//!
//! Problems in the user's program are [`lowc_types::Diagnostic`]s. These
//! errors are for the emitter's own invariants.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodegenError {
    /// The declaration table still carries resolution errors.
    #[error("declaration '{0}' is not resolved")]
    Unresolved(String),

    /// An internal consistency check failed.
    #[error("internal codegen error: {0}")]
    Internal(String),

    /// Too many table entries, memory pages or similar.
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),
}

/// Codegen result type alias.
pub type CodegenResult<T> = Result<T, CodegenError>;
