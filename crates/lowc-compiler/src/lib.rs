//! lowc compiler: orchestrates the full compilation pipeline.
//!
//! ```text
//! source → Preprocessor → Lexer → Parser → Resolver → Emitter → module text
//! ```
//!
//! [`Compiler`] runs the stages in order and stops after the first stage
//! that reports an error. Diagnostics from every stage that ran are merged
//! into one [`CompileErrors`] in stage order.

mod compiler;
mod options;

pub use compiler::Compiler;
pub use options::{CompileOptions, CompileResult};

pub use lowc_codegen::{Instruction, Module};
pub use lowc_preprocessor::{IncludeResolver, IncludedSource};
pub use lowc_types::{CompileErrors, Diagnostic, ErrorCode, SourceFile, Span};

use sha2::{Digest, Sha256};

/// Compiler version, as written into header comments.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn version() -> &'static str {
    VERSION
}

/// Lowercase hex SHA-256 of the source text.
pub fn source_hash(source: &str) -> String {
    format!("{:x}", Sha256::digest(source.as_bytes()))
}

/// Compile a single source with default options and package the outcome
/// for serialization.
///
/// `file_name` only labels the log output; diagnostics carry file index 0.
pub fn compile_to_result(source: &str, file_name: &str) -> CompileResult {
    let _span = tracing::info_span!("compile_to_result", file = file_name).entered();
    let mut compiler = Compiler::new(source);
    let output = compiler.compile();
    CompileResult {
        success: output.is_some(),
        output,
        errors: compiler.errors().clone(),
        source_hash: source_hash(source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_hash_is_hex_sha256() {
        assert_eq!(
            source_hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(source_hash("func f() {}").len(), 64);
    }

    #[test]
    fn test_version_matches_package() {
        assert_eq!(version(), env!("CARGO_PKG_VERSION"));
    }
}
