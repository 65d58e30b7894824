//! Shared types for the lowc compiler.
//!
//! This crate defines the syntax tree, source spans, diagnostics and
//! the declaration table used across all compiler stages.

mod error;
mod span;
pub mod ast;

pub use error::{
    CompileErrors, Diagnostic, ErrorCategory, ErrorCode, Severity, UnknownErrorCode, MAX_ERRORS,
};
pub use span::{SourceFile, Span};

/// Result type for operations that fail with a single diagnostic.
pub type Result<T> = std::result::Result<T, Diagnostic>;
