//! Code generation error types.

/// Error type for code generation operations.
///
/// Allows proper error propagation with `?` for both logical errors (a
/// program invariant the semantic pass should have already ruled out, e.g. a
/// call to an unregistered function) and formatting errors from writing IR
/// text into a buffer.
#[derive(Debug)]
pub enum CodeGenError {
    /// An internal codegen invariant did not hold — reported as
    /// [`crate::diagnostics::codes::INTERNAL_CODEGEN_INVARIANT`] by callers.
    Logic(String),
    /// A formatting error while writing IR text.
    Format(std::fmt::Error),
}

impl std::fmt::Display for CodeGenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodeGenError::Logic(s) => write!(f, "{}", s),
            CodeGenError::Format(e) => write!(f, "IR generation error: {}", e),
        }
    }
}

impl std::error::Error for CodeGenError {}

impl From<String> for CodeGenError {
    fn from(s: String) -> Self {
        CodeGenError::Logic(s)
    }
}

impl From<std::fmt::Error> for CodeGenError {
    fn from(e: std::fmt::Error) -> Self {
        CodeGenError::Format(e)
    }
}
