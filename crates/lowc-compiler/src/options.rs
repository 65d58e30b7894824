use lowc_codegen::EmitOptions;
use lowc_types::CompileErrors;
use serde::{Deserialize, Serialize};

/// Settings for one compilation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Write a header comment and a comment before every function.
    pub emit_comments: bool,
    /// Collect trace messages into [`crate::Compiler::traces`].
    pub trace: bool,
    /// Initial memory size in 64 KiB pages.
    pub memory_pages: u32,
    /// Export name of the memory, if exported.
    pub memory_export: Option<String>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            emit_comments: false,
            trace: false,
            memory_pages: 1,
            memory_export: Some("memory".to_string()),
        }
    }
}

impl CompileOptions {
    pub(crate) fn emit_options(&self) -> EmitOptions {
        EmitOptions {
            memory_pages: self.memory_pages,
            memory_export: self.memory_export.clone(),
            emit_comments: self.emit_comments,
        }
    }
}

/// Serializable outcome of [`crate::compile_to_result`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileResult {
    pub success: bool,
    /// Module text, present only when `success` is true.
    pub output: Option<String>,
    pub errors: CompileErrors,
    /// Hex SHA-256 of the source.
    pub source_hash: String,
}
