use lowc_codegen::{emit, render, Instruction, Module};
use lowc_lexer::{Lexer, SourceChunk};
use lowc_parser::Parser;
use lowc_preprocessor::{IncludeResolver, Preprocessor};
use lowc_types::ast::DeclarationTable;
use lowc_types::{CompileErrors, Diagnostic, ErrorCode, Span};

use crate::options::CompileOptions;
use crate::{source_hash, VERSION};

/// Compiles one main source file.
///
/// ```
/// use lowc_compiler::Compiler;
///
/// let mut compiler = Compiler::new("export func one(): i32 { return 1; }");
/// let text = compiler.compile().expect("compiles");
/// assert!(text.contains("(export \"one\" (func $one))"));
/// ```
pub struct Compiler<'a> {
    source: String,
    includes: Option<Box<dyn IncludeResolver + 'a>>,
    symbols: Vec<String>,
    options: CompileOptions,
    errors: CompileErrors,
    declarations: Option<DeclarationTable>,
    module: Option<Module>,
    traces: Vec<String>,
}

impl<'a> Compiler<'a> {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            includes: None,
            symbols: Vec::new(),
            options: CompileOptions::default(),
            errors: CompileErrors::empty(),
            declarations: None,
            module: None,
            traces: Vec::new(),
        }
    }

    /// Resolve `#include` names. Without a resolver every include fails.
    pub fn with_includes(mut self, includes: impl IncludeResolver + 'a) -> Self {
        self.includes = Some(Box::new(includes));
        self
    }

    /// Predefine preprocessor symbols.
    pub fn with_symbols<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.symbols.extend(symbols.into_iter().map(Into::into));
        self
    }

    pub fn with_options(mut self, options: CompileOptions) -> Self {
        self.options = options;
        self
    }

    /// Run the pipeline. Returns the module text, or `None` when any
    /// error was reported; see [`Compiler::errors`].
    pub fn compile(&mut self) -> Option<String> {
        let _span = tracing::info_span!("compile", bytes = self.source.len()).entered();
        self.errors = CompileErrors::empty();
        self.declarations = None;
        self.module = None;
        self.traces.clear();

        let chunks = self.preprocess()?;
        let declarations = self.parse(&chunks)?;
        let declarations = self.declarations.insert(declarations);

        let resolved = lowc_resolver::resolve(declarations);
        let failed = resolved.has_errors();
        self.errors.extend(resolved);
        if failed {
            return None;
        }
        self.trace("resolved declarations".to_string());

        let declarations = self.declarations.as_ref()?;
        match emit(declarations, &self.options.emit_options()) {
            Ok(emitted) => {
                self.errors.extend(emitted.errors);
                for message in emitted.traces {
                    self.trace(message);
                }
                self.module = Some(emitted.module);
            }
            Err(e) => {
                tracing::error!(error = %e, "emission failed");
                self.errors
                    .push(Diagnostic::new(ErrorCode::INTERNAL, e.to_string(), Span::default()));
            }
        }
        if self.errors.has_errors() {
            return None;
        }

        let module = self.module.as_ref()?;
        let mut text = String::new();
        if self.options.emit_comments {
            text.push_str(&format!(
                ";; lowc {VERSION} source sha256 {}\n",
                source_hash(&self.source)
            ));
        }
        text.push_str(&render(module));
        tracing::debug!(bytes = text.len(), "rendered module");
        Some(text)
    }

    fn preprocess(&mut self) -> Option<Vec<SourceChunk>> {
        let mut preprocessor = Preprocessor::new().with_symbols(self.symbols.iter().cloned());
        if let Some(includes) = self.includes.as_deref_mut() {
            preprocessor = preprocessor.with_includes(includes);
        }
        let chunks = preprocessor.preprocess(&self.source, 0);
        self.errors.extend(preprocessor.take_errors());
        let chunks = chunks?;
        self.trace(format!("preprocessed into {} chunks", chunks.len()));
        Some(chunks)
    }

    fn parse(&mut self, chunks: &[SourceChunk]) -> Option<DeclarationTable> {
        let lexed = Lexer::new(chunks).lex();
        let lex_failed = lexed.errors.has_errors();
        self.errors.extend(lexed.errors);
        if lex_failed {
            return None;
        }
        self.trace(format!("lexed {} tokens", lexed.tokens.len()));

        let parsed = Parser::new(lexed.tokens).parse();
        let parse_failed = parsed.errors.has_errors();
        self.errors.extend(parsed.errors);
        if parse_failed {
            self.declarations = Some(parsed.declarations);
            return None;
        }
        self.trace(format!("parsed {} declarations", parsed.declarations.len()));
        Some(parsed.declarations)
    }

    fn trace(&mut self, message: String) {
        tracing::trace!("{message}");
        if self.options.trace {
            self.traces.push(message);
        }
    }

    // ── Results ───────────────────────────────────────────────────────────

    /// Diagnostics of the last [`Compiler::compile`], in stage order.
    pub fn errors(&self) -> &CompileErrors {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        self.errors.has_errors()
    }

    /// The declaration table, once parsing has produced one.
    pub fn declarations(&self) -> Option<&DeclarationTable> {
        self.declarations.as_ref()
    }

    /// The emitted module, once emission has run.
    pub fn module(&self) -> Option<&Module> {
        self.module.as_ref()
    }

    /// Trace messages, collected only with [`CompileOptions::trace`].
    pub fn traces(&self) -> &[String] {
        &self.traces
    }

    /// Body of an emitted function.
    pub fn function_instructions(&self, name: &str) -> Option<&[Instruction]> {
        self.module
            .as_ref()?
            .func(name)
            .map(|func| func.body.as_slice())
    }
}
