//! A minimal textual SSA IR builder and a verifier over the text it
//! produces. Stands in for the real target-IR builder library named in
//! `SPEC_FULL.md` §1 as an external collaborator — this crate only ever
//! needs to *emit* textual IR, never to load or JIT it, so a `String` buffer
//! with a couple of counters is the whole of what's needed on this side of
//! that boundary.

use std::fmt::Write as _;

use super::error::CodeGenError;

/// Accumulates one emitted module: struct/global declarations up front,
/// then one `define` per function, each built block by block.
#[derive(Debug, Default)]
pub struct Module {
    header: String,
    body: String,
    reg_counter: u32,
    block_counter: u32,
    label_counter: u32,
}

impl Module {
    pub fn new() -> Self {
        Module::default()
    }

    pub fn fresh_reg(&mut self) -> String {
        let name = format!("%r{}", self.reg_counter);
        self.reg_counter += 1;
        name
    }

    pub fn fresh_block_label(&mut self, hint: &str) -> String {
        let name = format!("{}{}", hint, self.block_counter);
        self.block_counter += 1;
        name
    }

    /// A process-wide unique string suitable for a global name, independent
    /// of `fresh_reg`'s counter so string globals and registers never alias.
    pub fn fresh_label(&mut self, hint: &str) -> String {
        let name = format!("{}.{}", hint, self.label_counter);
        self.label_counter += 1;
        name
    }

    pub fn header_line(&mut self, line: impl std::fmt::Display) -> Result<(), CodeGenError> {
        writeln!(self.header, "{}", line)?;
        Ok(())
    }

    pub fn body_line(&mut self, line: impl std::fmt::Display) -> Result<(), CodeGenError> {
        writeln!(self.body, "{}", line)?;
        Ok(())
    }

    pub fn finish(self) -> String {
        let mut out = self.header;
        out.push('\n');
        out.push_str(&self.body);
        out
    }
}

/// Checks two invariants over the finished module text without parsing it
/// into a real CFG: every basic block ends in a terminator instruction, and
/// every `%rN` register is defined (appears as `%rN = `) before any line
/// that reads it.
pub struct IrVerifier;

impl IrVerifier {
    pub fn verify(module_text: &str) -> Result<(), CodeGenError> {
        let mut in_function = false;
        let mut defined = std::collections::HashSet::new();
        let mut block_has_content = false;
        let mut last_instr_was_terminator = true;

        for raw_line in module_text.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with(';') {
                continue;
            }
            if line.starts_with("define ") {
                in_function = true;
                defined.clear();
                defined.extend(parameter_registers(line));
                block_has_content = false;
                last_instr_was_terminator = true;
                continue;
            }
            if !in_function {
                continue;
            }
            if line == "}" {
                if block_has_content && !last_instr_was_terminator {
                    return Err(CodeGenError::Logic(
                        "basic block falls through without a terminator".to_string(),
                    ));
                }
                in_function = false;
                continue;
            }
            if line.ends_with(':') {
                if block_has_content && !last_instr_was_terminator {
                    return Err(CodeGenError::Logic(format!(
                        "block preceding label '{}' falls through without a terminator",
                        line
                    )));
                }
                block_has_content = false;
                last_instr_was_terminator = true;
                continue;
            }

            block_has_content = true;
            for used in referenced_registers(line) {
                if !defined.contains(&used) {
                    return Err(CodeGenError::Logic(format!(
                        "register {} used before it is defined",
                        used
                    )));
                }
            }
            if let Some(def) = defined_register(line) {
                defined.insert(def);
            }
            last_instr_was_terminator = line.starts_with("br ")
                || line.starts_with("ret ")
                || line == "unreachable"
                || line.starts_with("switch ");
        }
        Ok(())
    }
}

/// Every `%name` appearing in a `define ...(...)` line's parameter list is
/// bound on entry (`%this`, `%arg.N`) — never through a `%rN = ` definition
/// line, so the use-before-def scan must seed them as already defined.
fn parameter_registers(define_line: &str) -> Vec<String> {
    let start = match define_line.find('(') {
        Some(i) => i + 1,
        None => return Vec::new(),
    };
    let end = match define_line.rfind(')') {
        Some(i) => i,
        None => return Vec::new(),
    };
    if end <= start {
        return Vec::new();
    }
    define_line[start..end]
        .split(',')
        .filter_map(|param| param.split_whitespace().last())
        .filter(|tok| tok.starts_with('%'))
        .map(|tok| tok.to_string())
        .collect()
}

fn defined_register(line: &str) -> Option<String> {
    let (lhs, rest) = line.split_once('=')?;
    let lhs = lhs.trim();
    if lhs.starts_with('%') && !rest.trim_start().is_empty() {
        Some(lhs.to_string())
    } else {
        None
    }
}

fn referenced_registers(line: &str) -> Vec<String> {
    let rhs = match line.split_once('=') {
        Some((_, rhs)) => rhs,
        None => line,
    };
    let mut out = Vec::new();
    let mut chars = rhs.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c == '%' {
            let start = i;
            let mut end = i + 1;
            for (j, c2) in rhs[i + 1..].char_indices() {
                if c2.is_alphanumeric() || c2 == '_' {
                    end = i + 1 + j + 1;
                } else {
                    break;
                }
            }
            out.push(rhs[start..end].to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_a_well_formed_function() {
        let text = "\
define i64 @main() {
entry:
  %r0 = add i64 1, 2
  ret i64 %r0
}
";
        assert!(IrVerifier::verify(text).is_ok());
    }

    #[test]
    fn rejects_a_block_with_no_terminator() {
        let text = "\
define i64 @main() {
entry:
  %r0 = add i64 1, 2
}
";
        assert!(IrVerifier::verify(text).is_err());
    }

    #[test]
    fn rejects_use_before_definition() {
        let text = "\
define i64 @main() {
entry:
  %r1 = add i64 %r0, 1
  ret i64 %r1
}
";
        assert!(IrVerifier::verify(text).is_err());
    }

    #[test]
    fn parameter_registers_are_treated_as_already_defined() {
        let text = "\
define i64 @add(i64 %arg.a, i64 %arg.b) {
entry:
  %r0 = alloca i64
  store i64 %arg.a, ptr %r0
  %r1 = load i64, ptr %r0
  ret i64 %r1
}
";
        assert!(IrVerifier::verify(text).is_ok());
    }

    #[test]
    fn this_parameter_on_a_method_is_treated_as_already_defined() {
        let text = "\
define ptr @Box_get(ptr %this) {
entry:
  %r0 = alloca ptr
  store ptr %this, ptr %r0
  %r1 = load ptr, ptr %r0
  ret ptr %r1
}
";
        assert!(IrVerifier::verify(text).is_ok());
    }

    #[test]
    fn fresh_reg_and_block_labels_are_unique() {
        let mut module = Module::new();
        assert_eq!(module.fresh_reg(), "%r0");
        assert_eq!(module.fresh_reg(), "%r1");
        assert_eq!(module.fresh_block_label("if.then"), "if.then0");
        assert_eq!(module.fresh_block_label("if.then"), "if.then1");
    }
}
