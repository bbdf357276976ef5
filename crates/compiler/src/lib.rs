//! Chroma Compiler Library
//!
//! Lexes, parses, resolves imports, type-checks, and lowers Chroma source to
//! a textual SSA IR module. The pipeline never shells out to a linker or
//! runs a code generator backend — every phase here stops at the boundary
//! described in `DESIGN.md`; turning the emitted IR into a native binary is
//! an external driver's job.
//!
//! # Extending the Compiler
//!
//! A host embedding this crate drives the pipeline directly and decides what
//! to do with the diagnostics and the emitted IR:
//!
//! ```rust,ignore
//! use chromac::{compile_to_ir, CompilerConfig};
//!
//! let config = CompilerConfig::new().with_json_diagnostics(true);
//! let outcome = compile_to_ir("func main() -> Int { return 0; }", &config)?;
//! if outcome.diagnostics.has_errors() {
//!     eprintln!("{}", outcome.diagnostics.render_human());
//! } else if let Some(ir) = outcome.ir {
//!     println!("{}", ir);
//! }
//! ```

pub mod ast;
pub mod codegen;
pub mod config;
pub mod diagnostics;
pub mod errors;
pub mod import_resolver;
pub mod lexing;
pub mod parser;
pub mod semantic;
pub mod source;
pub mod symbols;
pub mod types;

pub use ast::Program;
pub use codegen::{codegen_program, CodeGenError};
pub use config::{CompilerConfig, OptimizationLevel};
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use errors::CompileError;
pub use import_resolver::ImportResolver;
pub use parser::Parser;
pub use semantic::{AnalysisResult, Analyzer};
pub use source::{SourceFile, Span};

use std::path::Path;
use std::rc::Rc;

/// Outcome of running the pipeline up to (and including) semantic analysis,
/// without codegen. `analysis` is `None` only when parsing failed so badly
/// that the analyzer was never run — normally `check_*` runs Pass 0-2
/// regardless of earlier diagnostics so a single invocation surfaces as many
/// problems as possible at once.
pub struct CheckOutcome {
    pub diagnostics: Diagnostics,
    pub program: Program,
    pub analysis: AnalysisResult,
}

/// Outcome of running the full pipeline including codegen. `ir` is `None`
/// when `diagnostics.has_errors()` is true — codegen assumes a type-checked
/// program and is never run over one with outstanding errors.
pub struct CompileOutcome {
    pub diagnostics: Diagnostics,
    pub program: Program,
    pub analysis: AnalysisResult,
    pub ir: Option<String>,
}

/// Runs lex → parse → semantic analysis over an in-memory source string with
/// no import resolution (imports need a real file to resolve paths
/// against — use [`check_file`] for that). Infallible: every problem with
/// the user's program surfaces through `CheckOutcome::diagnostics` rather
/// than a `Result::Err`.
pub fn compile_source(source: &str) -> CheckOutcome {
    compile_source_named(source, Rc::from("<source>"))
}

fn compile_source_named(source: &str, file_name: Rc<str>) -> CheckOutcome {
    let mut diagnostics = Diagnostics::new();
    let program = tracing::debug_span!("parse").in_scope(|| {
        Parser::parse_source(source, file_name, &mut diagnostics)
    });
    let analysis = tracing::debug_span!("analyze").in_scope(|| {
        Analyzer::new(&mut diagnostics).analyze(&program)
    });
    CheckOutcome {
        diagnostics,
        program,
        analysis,
    }
}

/// Runs the full pipeline — lex, parse, semantic analysis, codegen — over an
/// in-memory source string with no import resolution. Mirrors the teacher's
/// `compile_to_ir(source) -> Result<String, String>`, generalized to return
/// the richer [`CompileOutcome`] so a caller can distinguish "the program has
/// errors" (`diagnostics.has_errors()`, `ir: None`) from "codegen itself hit
/// an internal invariant" (`Err(CompileError)`).
pub fn compile_to_ir(source: &str, _config: &CompilerConfig) -> Result<CompileOutcome, CompileError> {
    let checked = compile_source(source);
    if checked.diagnostics.has_errors() {
        return Ok(CompileOutcome {
            diagnostics: checked.diagnostics,
            program: checked.program,
            analysis: checked.analysis,
            ir: None,
        });
    }
    let ir = tracing::debug_span!("codegen")
        .in_scope(|| codegen_program(&checked.program, &checked.analysis))?;
    Ok(CompileOutcome {
        diagnostics: checked.diagnostics,
        program: checked.program,
        analysis: checked.analysis,
        ir: Some(ir),
    })
}

/// Runs lex → parse → import-resolve → semantic analysis over a file on
/// disk, honoring `config.import_search_roots` isn't needed here since
/// imports in Chroma are always relative to the importing file — the config
/// field exists for an external driver to add extra roots to a future
/// resolution strategy.
pub fn check_file(path: &Path, config: &CompilerConfig) -> Result<CheckOutcome, CompileError> {
    let _ = &config.import_search_roots;
    let source = std::fs::read_to_string(path).map_err(|e| CompileError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let file_rc: Rc<str> = Rc::from(path.to_string_lossy().as_ref());

    let mut diagnostics = Diagnostics::new();
    let program = tracing::debug_span!("parse")
        .in_scope(|| Parser::parse_source(&source, file_rc, &mut diagnostics));
    let merged = tracing::debug_span!("resolve_imports").in_scope(|| {
        ImportResolver::new().resolve(path, program, &mut diagnostics)
    })?;
    let analysis =
        tracing::debug_span!("analyze").in_scope(|| Analyzer::new(&mut diagnostics).analyze(&merged));
    Ok(CheckOutcome {
        diagnostics,
        program: merged,
        analysis,
    })
}

/// Runs the full pipeline, including codegen, over a file on disk.
pub fn compile_file_to_ir(path: &Path, config: &CompilerConfig) -> Result<CompileOutcome, CompileError> {
    let checked = check_file(path, config)?;
    if checked.diagnostics.has_errors() {
        return Ok(CompileOutcome {
            diagnostics: checked.diagnostics,
            program: checked.program,
            analysis: checked.analysis,
            ir: None,
        });
    }
    let ir = tracing::debug_span!("codegen")
        .in_scope(|| codegen_program(&checked.program, &checked.analysis))?;
    Ok(CompileOutcome {
        diagnostics: checked.diagnostics,
        program: checked.program,
        analysis: checked.analysis,
        ir: Some(ir),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_source_reports_no_errors_for_a_well_typed_program() {
        let outcome = compile_source("func add(a: Int, b: Int) -> Int { return a + b; }");
        assert!(!outcome.diagnostics.has_errors());
    }

    #[test]
    fn compile_source_collects_diagnostics_for_a_type_error() {
        let outcome = compile_source("func main() -> Int { return \"oops\"; }");
        assert!(outcome.diagnostics.has_errors());
    }

    #[test]
    fn compile_to_ir_emits_a_module_for_a_well_typed_program() {
        let outcome = compile_to_ir(
            "func main() -> Int { return 0; }",
            &CompilerConfig::default(),
        )
        .unwrap();
        assert!(!outcome.diagnostics.has_errors());
        assert!(outcome.ir.unwrap().contains("define i64 @main"));
    }

    #[test]
    fn compile_to_ir_skips_codegen_when_the_program_has_errors() {
        let outcome = compile_to_ir("func main() -> Int { return missing; }", &CompilerConfig::default()).unwrap();
        assert!(outcome.diagnostics.has_errors());
        assert!(outcome.ir.is_none());
    }
}
