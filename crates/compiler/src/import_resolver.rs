//! Import resolution: merges `import "path"` directives into a single
//! flat [`Program`] before semantic analysis ever sees the source.
//!
//! An import is resolved relative to the directory of the file that
//! contains it (not the process's current directory, and not the entry
//! file's directory — each import is relative to *its own* file), so
//! `b.chr` importing `"sub/c.chr"` resolves `sub/` against `b.chr`'s own
//! parent directory even when `b.chr` was itself reached via an import
//! from `a.chr` somewhere else on disk.
//!
//! Cycles are broken with a visited set keyed by canonical path, mirroring
//! how a C preprocessor's include guard behaves: the second visit of an
//! already-visited file contributes nothing and recursion simply stops,
//! rather than producing a diagnostic or an error.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::ast::{Program, Stmt, StmtKind};
use crate::diagnostics::Diagnostics;
use crate::errors::CompileError;
use crate::parser::Parser;

pub struct ImportResolver {
    visited: HashSet<PathBuf>,
}

impl ImportResolver {
    pub fn new() -> Self {
        ImportResolver {
            visited: HashSet::new(),
        }
    }

    /// Resolve all imports reachable from `entry_path`, whose already-parsed
    /// `program` is passed in so the entry file is only read and tokenized
    /// once by the caller. Returns a single `Program` with every imported
    /// declaration (minus each imported file's own `import` directives)
    /// prepended ahead of `program`'s own declarations, in import order.
    pub fn resolve(
        &mut self,
        entry_path: &Path,
        program: Program,
        diagnostics: &mut Diagnostics,
    ) -> Result<Program, CompileError> {
        let canonical = canonicalize(entry_path)?;
        self.visited.insert(canonical);
        let mut merged = Vec::new();
        self.merge_imports(entry_path, &program, diagnostics, &mut merged)?;
        merged.extend(program.declarations);
        Ok(Program {
            declarations: merged,
        })
    }

    /// Walks `program`'s `import` directives (but not nested ones — those
    /// are handled by the recursive call into `resolve_file`), appending
    /// each resolved file's non-import declarations to `out` in order.
    fn merge_imports(
        &mut self,
        containing_file: &Path,
        program: &Program,
        diagnostics: &mut Diagnostics,
        out: &mut Vec<Stmt>,
    ) -> Result<(), CompileError> {
        let containing_dir = containing_file.parent().unwrap_or_else(|| Path::new("."));
        for decl in &program.declarations {
            if let StmtKind::Import(import) = &decl.kind {
                let target = containing_dir.join(&import.path);
                if let Some(resolved) = self.resolve_file(&target, diagnostics)? {
                    out.extend(resolved);
                }
            }
        }
        Ok(())
    }

    /// Reads, tokenizes, and parses `path` if it hasn't been visited yet,
    /// recursively resolving its own imports first so transitively-imported
    /// declarations precede the file that imports them. Returns `None` when
    /// `path` was already visited (cycle or diamond import).
    fn resolve_file(
        &mut self,
        path: &Path,
        diagnostics: &mut Diagnostics,
    ) -> Result<Option<Vec<Stmt>>, CompileError> {
        let canonical = canonicalize(path)?;
        if !self.visited.insert(canonical) {
            return Ok(None);
        }

        let source = std::fs::read_to_string(path).map_err(|e| CompileError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let file_rc: Rc<str> = Rc::from(path.to_string_lossy().as_ref());
        let program = Parser::parse_source(&source, file_rc, diagnostics);

        let mut out = Vec::new();
        self.merge_imports(path, &program, diagnostics, &mut out)?;
        for decl in program.declarations {
            if !matches!(decl.kind, StmtKind::Import(_)) {
                out.push(decl);
            }
        }
        Ok(Some(out))
    }
}

impl Default for ImportResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn canonicalize(path: &Path) -> Result<PathBuf, CompileError> {
    path.canonicalize().map_err(|e| CompileError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn merges_imported_declarations_ahead_of_the_importer() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "util.chr", "func helper() -> Int { return 1; }");
        let main_path = write_file(
            dir.path(),
            "main.chr",
            "import \"util.chr\";\nfunc main() -> Int { return helper(); }",
        );

        let mut diagnostics = Diagnostics::new();
        let main_src = std::fs::read_to_string(&main_path).unwrap();
        let program = Parser::parse_source(&main_src, Rc::from("main.chr"), &mut diagnostics);

        let mut resolver = ImportResolver::new();
        let merged = resolver.resolve(&main_path, program, &mut diagnostics).unwrap();

        assert!(!diagnostics.has_errors());
        assert_eq!(merged.declarations.len(), 2);
        match &merged.declarations[0].kind {
            StmtKind::FuncDecl(f) => assert_eq!(f.name, "helper"),
            other => panic!("expected helper first, got {:?}", other),
        }
    }

    #[test]
    fn diamond_import_is_only_merged_once() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "base.chr", "func base_fn() -> Int { return 1; }");
        write_file(
            dir.path(),
            "left.chr",
            "import \"base.chr\";\nfunc left_fn() -> Int { return base_fn(); }",
        );
        write_file(
            dir.path(),
            "right.chr",
            "import \"base.chr\";\nfunc right_fn() -> Int { return base_fn(); }",
        );
        let main_path = write_file(
            dir.path(),
            "main.chr",
            "import \"left.chr\";\nimport \"right.chr\";\nfunc main() -> Int { return 0; }",
        );

        let mut diagnostics = Diagnostics::new();
        let main_src = std::fs::read_to_string(&main_path).unwrap();
        let program = Parser::parse_source(&main_src, Rc::from("main.chr"), &mut diagnostics);

        let mut resolver = ImportResolver::new();
        let merged = resolver.resolve(&main_path, program, &mut diagnostics).unwrap();

        let base_count = merged
            .declarations
            .iter()
            .filter(|d| matches!(&d.kind, StmtKind::FuncDecl(f) if f.name == "base_fn"))
            .count();
        assert_eq!(base_count, 1);
    }

    #[test]
    fn self_importing_cycle_does_not_hang_or_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let a_path = write_file(
            dir.path(),
            "a.chr",
            "import \"b.chr\";\nfunc a_fn() -> Int { return 1; }",
        );
        write_file(
            dir.path(),
            "b.chr",
            "import \"a.chr\";\nfunc b_fn() -> Int { return 2; }",
        );

        let mut diagnostics = Diagnostics::new();
        let a_src = std::fs::read_to_string(&a_path).unwrap();
        let program = Parser::parse_source(&a_src, Rc::from("a.chr"), &mut diagnostics);

        let mut resolver = ImportResolver::new();
        let merged = resolver.resolve(&a_path, program, &mut diagnostics).unwrap();

        assert!(!diagnostics.has_errors());
        let names: Vec<&str> = merged
            .declarations
            .iter()
            .filter_map(|d| match &d.kind {
                StmtKind::FuncDecl(f) => Some(f.name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["b_fn", "a_fn"]);
    }
}
