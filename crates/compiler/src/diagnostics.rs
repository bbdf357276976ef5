//! Diagnostics engine: the channel every pipeline phase reports problems
//! with the *user's program* through, as opposed to [`crate::errors::CompileError`]
//! which is for host/environment failures.
//!
//! Phases never fail via `Result::Err` for a malformed program; they push
//! into a shared [`Diagnostics`] and the caller inspects [`Diagnostics::has_errors`]
//! once the phase returns.

use std::fmt;

use crate::source::Span;

/// Stable, documented diagnostic codes. Lexer codes are E1xxx, parser E2xxx,
/// semantic analysis E3xxx, codegen E4xxx, matching the ranges a user-facing
/// error reference groups them into.
pub mod codes {
    pub const UNEXPECTED_TOKEN: &str = "E1001";
    pub const UNTERMINATED_STRING: &str = "E1002";
    pub const UNTERMINATED_COMMENT: &str = "E1003";
    pub const INVALID_ESCAPE: &str = "E1004";
    pub const INVALID_NUMBER_LITERAL: &str = "E1005";
    pub const UNTERMINATED_INTERPOLATION: &str = "E1006";

    pub const UNEXPECTED_EOF: &str = "E2001";
    pub const EXPECTED_TOKEN: &str = "E2002";
    pub const INVALID_TYPE_EXPR: &str = "E2003";
    pub const RESERVED_KEYWORD: &str = "E2004";
    pub const DUPLICATE_PARAMETER: &str = "E2005";

    pub const UNDEFINED_IDENTIFIER: &str = "E3001";
    pub const TYPE_MISMATCH: &str = "E3002";
    pub const UNDEFINED_MEMBER: &str = "E3003";
    /// `var x = nil` with no type annotation: the analyzer has nothing to
    /// infer the declared type from.
    pub const NIL_REQUIRES_ANNOTATION: &str = "E3004";
    pub const DUPLICATE_DECLARATION: &str = "E3005";
    pub const UNKNOWN_TYPE: &str = "E3006";
    pub const UNKNOWN_BASE_CLASS: &str = "E3007";
    pub const MISSING_INTERFACE_METHOD: &str = "E3008";
    pub const WRONG_ARITY: &str = "E3009";
    pub const NON_BOOLEAN_CONDITION: &str = "E3010";
    pub const UNSUPPORTED_OPERATOR: &str = "E3011";
    pub const IMMUTABLE_ASSIGNMENT: &str = "E3012";
    pub const BAD_GENERIC_ARG_COUNT: &str = "E3013";
    pub const TRY_NESTING_TOO_DEEP: &str = "E3014";
    pub const SHARED_CLASS_REJECTED: &str = "E3015";
    pub const UNSUPPORTED_ASYNC_KIND: &str = "E3016";
    /// `this` referenced outside any method body.
    pub const THIS_OUTSIDE_METHOD: &str = "E3019";
    pub const ACCESS_VIOLATION: &str = "E3023";
    /// Shares E3023 with [`ACCESS_VIOLATION`] — both are "a name exists but
    /// you may not use it this way" diagnostics under the same documented
    /// code.
    pub const NON_EXHAUSTIVE_MATCH: &str = "E3023";
    pub const AWAIT_OUTSIDE_ASYNC: &str = "E3031";

    pub const INTERNAL_CODEGEN_INVARIANT: &str = "E4001";
    pub const IR_VERIFIER_FAILURE: &str = "E4002";
    pub const TARGET_LOOKUP_FAILURE: &str = "E4003";
    pub const OBJECT_EMISSION_FAILURE: &str = "E4004";
    pub const LINKER_INVOCATION_FAILURE: &str = "E4005";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    fn as_str(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: &'static str,
    pub severity: Severity,
    pub message: String,
    pub location: Span,
    pub source_line: String,
    pub suggestion: Option<String>,
}

impl Diagnostic {
    pub fn error(code: &'static str, message: impl Into<String>, location: Span) -> Self {
        Diagnostic {
            code,
            severity: Severity::Error,
            message: message.into(),
            location,
            source_line: String::new(),
            suggestion: None,
        }
    }

    pub fn warning(code: &'static str, message: impl Into<String>, location: Span) -> Self {
        Diagnostic {
            code,
            severity: Severity::Warning,
            message: message.into(),
            location,
            source_line: String::new(),
            suggestion: None,
        }
    }

    pub fn with_source_line(mut self, line: impl Into<String>) -> Self {
        self.source_line = line.into();
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    fn escape_json(s: &str) -> String {
        let mut out = String::with_capacity(s.len());
        for c in s.chars() {
            match c {
                '"' => out.push_str("\\\""),
                '\\' => out.push_str("\\\\"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                other => out.push(other),
            }
        }
        out
    }

    pub fn to_json(&self) -> String {
        let mut out = String::from("{");
        out.push_str(&format!("\"code\":\"{}\",", Self::escape_json(self.code)));
        out.push_str(&format!(
            "\"severity\":\"{}\",",
            self.severity.as_str()
        ));
        out.push_str(&format!(
            "\"message\":\"{}\",",
            Self::escape_json(&self.message)
        ));
        out.push_str(&format!(
            "\"file\":\"{}\",",
            Self::escape_json(&self.location.file)
        ));
        out.push_str(&format!("\"line\":{},", self.location.line));
        out.push_str(&format!("\"column\":{},", self.location.column));
        out.push_str(&format!(
            "\"source_line\":\"{}\"",
            Self::escape_json(&self.source_line)
        ));
        if let Some(s) = &self.suggestion {
            out.push_str(&format!(",\"suggestion\":\"{}\"", Self::escape_json(s)));
        }
        out.push('}');
        out
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}[{}]: {}",
            self.severity.as_str(),
            self.code,
            self.message
        )?;
        writeln!(f, "  --> {}", self.location)?;
        if !self.source_line.is_empty() {
            writeln!(f, "   | {}", self.source_line)?;
        }
        if let Some(suggestion) = &self.suggestion {
            writeln!(f, "   = suggestion: {}", suggestion)?;
        }
        Ok(())
    }
}

/// Accumulates diagnostics across an entire compilation run. Every phase
/// (lexer, parser, semantic analysis, codegen) shares one engine so the
/// final report interleaves nothing and drops nothing.
#[derive(Debug, Default)]
pub struct Diagnostics {
    diagnostics: Vec<Diagnostic>,
    error_count: usize,
    warning_count: usize,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics::default()
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Error => self.error_count += 1,
            Severity::Warning => self.warning_count += 1,
            Severity::Info => {}
        }
        self.diagnostics.push(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn warning_count(&self) -> usize {
        self.warning_count
    }

    pub fn all(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn clear(&mut self) {
        self.diagnostics.clear();
        self.error_count = 0;
        self.warning_count = 0;
    }

    /// Render every diagnostic as it would appear on a terminal, followed by
    /// the summary line ("N error(s), M warning(s) generated."), only
    /// emitted once at least one diagnostic has been reported.
    pub fn render_human(&self) -> String {
        let mut out = String::new();
        for diag in &self.diagnostics {
            out.push_str(&diag.to_string());
        }
        if self.error_count > 0 || self.warning_count > 0 {
            out.push('\n');
            if self.error_count > 0 {
                out.push_str(&format!("{} error(s)", self.error_count));
            }
            if self.warning_count > 0 {
                if self.error_count > 0 {
                    out.push_str(", ");
                }
                out.push_str(&format!("{} warning(s)", self.warning_count));
            }
            out.push_str(" generated.\n");
        }
        out
    }

    pub fn render_json(&self) -> String {
        let mut out = String::from("[");
        for (i, diag) in self.diagnostics.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(&diag.to_json());
        }
        out.push(']');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn span() -> Span {
        Span::new(Rc::from("t.chr"), 4, 9)
    }

    #[test]
    fn human_rendering_matches_documented_format() {
        let diag = Diagnostic::error(codes::UNDEFINED_IDENTIFIER, "undefined identifier `x`", span());
        let rendered = diag.to_string();
        assert!(rendered.starts_with("error[E3001]: undefined identifier `x`\n"));
        assert!(rendered.contains("  --> t.chr:4:9\n"));
    }

    #[test]
    fn json_escapes_special_characters() {
        let diag = Diagnostic::error(codes::TYPE_MISMATCH, "bad \"type\"\nhere", span());
        let json = diag.to_json();
        assert!(json.contains("\\\"type\\\""));
        assert!(json.contains("\\n"));
    }

    #[test]
    fn engine_tracks_counts_and_clears() {
        let mut diags = Diagnostics::new();
        diags.report(Diagnostic::error(codes::UNEXPECTED_TOKEN, "oops", span()));
        diags.report(Diagnostic::warning(codes::DUPLICATE_DECLARATION, "shadowed", span()));
        assert!(diags.has_errors());
        assert_eq!(diags.error_count(), 1);
        assert_eq!(diags.warning_count(), 1);
        diags.clear();
        assert!(!diags.has_errors());
        assert_eq!(diags.all().len(), 0);
    }

    #[test]
    fn summary_line_omitted_when_empty() {
        let diags = Diagnostics::new();
        assert_eq!(diags.render_human(), "");
    }
}
