//! Diagnostic-code-specific coverage: each test pins one documented code to
//! the exact program shape that should produce it, plus the JSON rendering
//! path the `--json` CLI flag exercises.

use chromac::compile_source;
use chromac::diagnostics::codes;

fn first_code(source: &str) -> &'static str {
    let outcome = compile_source(source);
    outcome
        .diagnostics
        .all()
        .first()
        .expect("at least one diagnostic")
        .code
}

#[test]
fn undefined_identifier_reports_e3001() {
    assert_eq!(first_code("func main() { print(nowhere); }"), codes::UNDEFINED_IDENTIFIER);
}

#[test]
fn type_mismatch_reports_e3002() {
    assert_eq!(
        first_code("func main() -> Int { return \"not an int\"; }"),
        codes::TYPE_MISMATCH
    );
}

#[test]
fn wrong_arity_reports_e3009() {
    assert_eq!(
        first_code("func add(a: Int, b: Int) -> Int { return a + b; } func main() { add(1); }"),
        codes::WRONG_ARITY
    );
}

#[test]
fn assigning_to_a_let_binding_reports_e3012() {
    assert_eq!(
        first_code("func main() { let x = 1; x = 2; }"),
        codes::IMMUTABLE_ASSIGNMENT
    );
}

#[test]
fn shared_class_reports_e3015() {
    assert_eq!(first_code("shared class Counter { }"), codes::SHARED_CLASS_REJECTED);
}

#[test]
fn non_exhaustive_match_reports_exactly_one_e3023_naming_the_missing_variant() {
    let outcome = compile_source(
        r#"
        enum Color { Red, Green, Blue }

        func main() {
            var c = Color.Green;
            match c {
                Red => print("r")
                Green => print("g")
            }
        }
        "#,
    );
    let matches: Vec<_> = outcome
        .diagnostics
        .all()
        .iter()
        .filter(|d| d.code == codes::NON_EXHAUSTIVE_MATCH)
        .collect();
    assert_eq!(matches.len(), 1);
    assert!(matches[0].message.contains("Blue"));
}

#[test]
fn json_rendering_is_a_well_formed_array_of_objects() {
    let outcome = compile_source("func main() { print(nowhere); }");
    let json = outcome.diagnostics.render_json();
    assert!(json.starts_with('['));
    assert!(json.ends_with(']'));
    assert!(json.contains("\"code\":\"E3001\""));
}

#[test]
fn a_clean_program_has_no_diagnostics_at_all() {
    let outcome = compile_source("func add(a: Int, b: Int) -> Int { return a + b; }");
    assert!(outcome.diagnostics.all().is_empty());
    assert_eq!(outcome.diagnostics.render_human(), "");
}
