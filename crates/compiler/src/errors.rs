//! Host/environment failures.
//!
//! `CompileError` is for things that go wrong *around* compilation: a file
//! that can't be read, an internal codegen invariant that didn't hold, a
//! malformed configuration file. Problems with the program being compiled
//! never surface here — those go through [`crate::diagnostics::Diagnostics`].
//! Import cycles specifically are not an error condition: the import
//! resolver breaks them with a visited-set and simply stops recursing.

use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum CompileError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Codegen(crate::codegen::error::CodeGenError),
    Config(String),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Io { path, source } => {
                write!(f, "failed to read {}: {}", path.display(), source)
            }
            CompileError::Codegen(e) => write!(f, "{}", e),
            CompileError::Config(msg) => write!(f, "invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for CompileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CompileError::Io { source, .. } => Some(source),
            CompileError::Codegen(e) => Some(e),
            _ => None,
        }
    }
}

impl From<crate::codegen::error::CodeGenError> for CompileError {
    fn from(e: crate::codegen::error::CodeGenError) -> Self {
        CompileError::Codegen(e)
    }
}
