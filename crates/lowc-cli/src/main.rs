use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use lowc_compiler::{CompileOptions, Compiler, Diagnostic};

mod includes;

use includes::IncludeFiles;

#[derive(Parser)]
#[command(name = "lowc")]
#[command(about = "Compile lowc source to WebAssembly text", version)]
struct Cli {
    #[arg(help = "Input source file")]
    input: PathBuf,

    #[arg(help = "Output module text file")]
    output: PathBuf,

    #[arg(
        short = 'D',
        long = "define",
        value_name = "SYMBOL",
        help = "Predefine a preprocessor symbol"
    )]
    defines: Vec<String>,

    #[arg(long, help = "Write header and per-function comments")]
    comments: bool,

    #[arg(long, help = "Print diagnostics as JSON")]
    json: bool,

    #[arg(long, help = "Print compiler trace messages")]
    trace: bool,

    #[arg(long, default_value_t = 1, help = "Initial memory size in 64 KiB pages")]
    memory_pages: u32,
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    println!("lowc {}", lowc_compiler::version());

    println!("Preprocessing {}...", cli.input.display());
    let source = fs::read_to_string(&cli.input)
        .with_context(|| format!("Failed to read {}", cli.input.display()))?;

    let files = IncludeFiles::new(&cli.input, &source);
    let mut compiler = Compiler::new(source)
        .with_includes(|name: &str| files.resolve(name))
        .with_symbols(cli.defines.iter().cloned())
        .with_options(CompileOptions {
            emit_comments: cli.comments,
            trace: cli.trace,
            memory_pages: cli.memory_pages,
            ..Default::default()
        });

    println!("Compiling...");
    let output = compiler.compile();

    if cli.trace {
        for message in compiler.traces() {
            println!("  {message}");
        }
    }
    if cli.json {
        let json = serde_json::to_string_pretty(compiler.errors())
            .context("Failed to serialize diagnostics")?;
        println!("{json}");
    } else {
        let errors = compiler.errors();
        for diagnostic in errors.errors.iter().chain(&errors.warnings) {
            eprintln!("{}", format_diagnostic(&files, diagnostic));
        }
        if errors.total_errors > errors.errors.len() {
            eprintln!(
                "{} more errors not shown",
                errors.total_errors - errors.errors.len()
            );
        }
    }

    let Some(text) = output else {
        eprintln!("Compilation failed with {} errors", compiler.errors().total_errors);
        return Ok(ExitCode::FAILURE);
    };

    println!("Writing {}...", cli.output.display());
    fs::write(&cli.output, &text)
        .with_context(|| format!("Failed to write output to {}", cli.output.display()))?;
    println!(
        "Compiled {} -> {} ({} bytes)",
        cli.input.display(),
        cli.output.display(),
        text.len()
    );
    Ok(ExitCode::SUCCESS)
}

/// `file:line:column: CODE message`, followed by the underlined source
/// line when it is available.
fn format_diagnostic(files: &IncludeFiles, diagnostic: &Diagnostic) -> String {
    let mut line = format!(
        "{}:{}:{}: {} {}",
        files.name(diagnostic.span.file),
        diagnostic.span.start_line,
        diagnostic.span.start_col,
        diagnostic.code,
        diagnostic.message
    );
    if let Some(suggestion) = &diagnostic.suggestion {
        line.push_str(&format!(" (help: {suggestion})"));
    }
    if let Some(excerpt) = files.excerpt(&diagnostic.span) {
        line.push('\n');
        line.push_str(&excerpt);
    }
    line
}

#[cfg(test)]
mod tests {
    use lowc_compiler::{ErrorCode, Span};

    use super::*;

    #[test]
    fn test_format_diagnostic() {
        let files = IncludeFiles::new(
            std::path::Path::new("src/main.lc"),
            "func f(): i32 {\n    return 1.5;\n}\n",
        );
        let diagnostic = Diagnostic::new(
            ErrorCode::TYPE_MISMATCH,
            "type mismatch: expected i32, found f64",
            Span::new(0, (27, 2, 12), (30, 2, 15)),
        );
        assert_eq!(
            format_diagnostic(&files, &diagnostic),
            "src/main.lc:2:12: W130 type mismatch: expected i32, found f64\n    return 1.5;\n           ^^^"
        );

        let elsewhere = Diagnostic::new(ErrorCode::INTERNAL, "failed", Span::point(4, 0, 1, 1));
        assert_eq!(
            format_diagnostic(&files, &elsewhere),
            "<file 4>:1:1: W199 failed"
        );
    }

    #[test]
    fn test_cli_arguments() {
        let cli = Cli::parse_from([
            "lowc", "in.lc", "out.wat", "-D", "DEBUG", "--define", "FAST", "--comments",
        ]);
        assert_eq!(cli.defines, vec!["DEBUG", "FAST"]);
        assert!(cli.comments);
        assert!(!cli.json);
        assert_eq!(cli.memory_pages, 1);
    }
}
