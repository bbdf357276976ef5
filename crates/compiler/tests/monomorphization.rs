//! Generic-class instantiation: each distinct `(template, type-arg-list)`
//! pair should produce exactly one recorded instantiation, memoized across
//! repeated uses, and the mangled name should flow through to the emitted
//! struct layout in IR.

use chromac::{compile_source, compile_to_ir, CompilerConfig};

#[test]
fn repeated_use_of_the_same_type_argument_is_memoized_once() {
    let outcome = compile_source(
        r#"
        class Box<T> {
            public var value: T;
        }

        func main() {
            var a: Box<Int> = Box { value: 1 };
            var b: Box<Int> = Box { value: 2 };
            var c: Box<Int> = Box { value: 3 };
        }
        "#,
    );
    assert!(!outcome.diagnostics.has_errors());
    assert_eq!(outcome.analysis.generic_instantiations.len(), 1);
    assert_eq!(outcome.analysis.generic_instantiations[0].mangled_name, "Box_Int");
}

#[test]
fn distinct_type_arguments_each_get_their_own_instantiation() {
    let outcome = compile_source(
        r#"
        class Box<T> {
            public var value: T;
        }

        func main() {
            var a: Box<Int> = Box { value: 1 };
            var b: Box<String> = Box { value: "hi" };
            var c: Box<Bool> = Box { value: true };
        }
        "#,
    );
    assert!(!outcome.diagnostics.has_errors());
    let mut mangled: Vec<&str> = outcome
        .analysis
        .generic_instantiations
        .iter()
        .map(|inst| inst.mangled_name.as_str())
        .collect();
    mangled.sort();
    assert_eq!(mangled, vec!["Box_Bool", "Box_Int", "Box_String"]);
}

#[test]
fn two_distinct_generic_templates_instantiate_independently() {
    let outcome = compile_source(
        r#"
        class Box<T> {
            public var value: T;
        }

        class Pair<A, B> {
            public var first: A;
            public var second: B;
        }

        func main() {
            var a: Box<Int> = Box { value: 1 };
            var p: Pair<Int, String> = Pair { first: 1, second: "x" };
        }
        "#,
    );
    assert!(!outcome.diagnostics.has_errors());
    let templates: Vec<&str> = outcome
        .analysis
        .generic_instantiations
        .iter()
        .map(|inst| inst.template_name.as_str())
        .collect();
    assert!(templates.contains(&"Box"));
    assert!(templates.contains(&"Pair"));
    assert_eq!(outcome.analysis.generic_instantiations.len(), 2);
}

#[test]
fn instantiated_struct_layout_is_emitted_under_its_mangled_name() {
    let outcome = compile_to_ir(
        r#"
        class Box<T> {
            public var value: T;
        }

        func main() {
            var a: Box<Int> = Box { value: 1 };
        }
        "#,
        &CompilerConfig::default(),
    )
    .unwrap();
    assert!(!outcome.diagnostics.has_errors());
    let ir = outcome.ir.unwrap();
    assert!(ir.contains("%Class.Box_Int"));
}
