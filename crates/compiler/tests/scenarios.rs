//! End-to-end scenarios run through the public `chromac` API: source text in,
//! diagnostics and emitted IR out. The runtime itself is out of scope here
//! (no linker, no execution), so these assert on diagnostics being empty and
//! on the IR text containing the shapes that make the described behavior
//! possible — not on a running binary's stdout.

use chromac::{compile_source, compile_to_ir, CompilerConfig};

fn ir_for(source: &str) -> String {
    let outcome = compile_to_ir(source, &CompilerConfig::default()).expect("codegen invariant held");
    assert!(
        !outcome.diagnostics.has_errors(),
        "unexpected diagnostics: {}",
        outcome.diagnostics.render_human()
    );
    outcome.ir.expect("a well-typed program always emits IR")
}

#[test]
fn greeting_with_string_interpolation_compiles_clean() {
    let outcome = compile_source(
        r#"func main() { var name = "Chris"; print("Hello, ${name}!"); }"#,
    );
    assert!(!outcome.diagnostics.has_errors());
}

#[test]
fn fibonacci_recursion_and_range_loop_compile_clean() {
    let ir = ir_for(
        r#"
        func fib(n: Int) -> Int {
            if (n < 2) {
                return n;
            }
            return fib(n - 1) + fib(n - 2);
        }

        func main() {
            for i in 0..10 {
                print(fib(i));
            }
        }
        "#,
    );
    assert!(ir.contains("define"));
    assert!(ir.contains("call") && ir.contains("@fib"));
}

#[test]
fn enum_match_over_every_variant_compiles_clean() {
    let outcome = compile_source(
        r#"
        enum Color { Red, Green, Blue }

        func main() {
            var c = Color.Green;
            match c {
                Red => print("r")
                Green => print("g")
                Blue => print("b")
            }
        }
        "#,
    );
    assert!(!outcome.diagnostics.has_errors());
}

#[test]
fn dropping_a_variant_arm_reports_exactly_one_non_exhaustive_diagnostic() {
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
    assert!(outcome.diagnostics.has_errors());
    let non_exhaustive: Vec<_> = outcome
        .diagnostics
        .all()
        .iter()
        .filter(|d| d.code == chromac::diagnostics::codes::NON_EXHAUSTIVE_MATCH)
        .collect();
    assert_eq!(non_exhaustive.len(), 1);
    assert!(non_exhaustive[0].message.contains("Blue"));
}

#[test]
fn generic_box_instantiated_for_two_distinct_type_arguments() {
    let outcome = compile_source(
        r#"
        class Box<T> {
            public var value: T;
        }

        func main() {
            var a: Box<Int> = Box { value: 42 };
            var b: Box<String> = Box { value: "hi" };
            print(a.value);
            print(b.value);
        }
        "#,
    );
    assert!(!outcome.diagnostics.has_errors());
    assert_eq!(outcome.analysis.generic_instantiations.len(), 2);
    let mangled: Vec<&str> = outcome
        .analysis
        .generic_instantiations
        .iter()
        .map(|inst| inst.mangled_name.as_str())
        .collect();
    assert!(mangled.contains(&"Box_Int"));
    assert!(mangled.contains(&"Box_String"));
}

#[test]
fn generic_box_factory_method_instantiated_for_two_distinct_type_arguments() {
    // spec.md §8 scenario 4: a generic class whose own factory method
    // (`new`) refers to the enclosing template by its bare name and
    // constructs it internally, rather than the caller constructing the
    // struct literal directly.
    let outcome = compile_to_ir(
        r#"
        class Box<T> {
            public var v: T;
            public func new(v: T) -> Box {
                return Box { v: v };
            }
            public func get() -> T {
                return this.v;
            }
        }

        func main() {
            var a: Box<Int> = Box.new(42);
            var b: Box<String> = Box.new("hi");
            print(a.get());
            print(b.get());
        }
        "#,
        &CompilerConfig::default(),
    )
    .expect("codegen invariant held");
    assert!(
        !outcome.diagnostics.has_errors(),
        "unexpected diagnostics: {}",
        outcome.diagnostics.render_human()
    );
    assert_eq!(outcome.analysis.generic_instantiations.len(), 2);
    let mangled: Vec<&str> = outcome
        .analysis
        .generic_instantiations
        .iter()
        .map(|inst| inst.mangled_name.as_str())
        .collect();
    assert!(mangled.contains(&"Box_Int"));
    assert!(mangled.contains(&"Box_String"));

    let ir = outcome.ir.expect("a well-typed program always emits IR");
    assert!(ir.contains("define ptr @Box_Int_new"));
    assert!(ir.contains("define ptr @Box_String_new"));
    assert!(ir.contains("call ptr @Box_Int_new"));
    assert!(ir.contains("call ptr @Box_String_new"));
}

#[test]
fn nil_coalesce_falls_back_to_the_default_when_the_optional_is_nil() {
    let outcome = compile_source(
        r#"
        func main() {
            var x: String? = nil;
            print(x ?? "d");
        }
        "#,
    );
    assert!(!outcome.diagnostics.has_errors());
}

#[test]
fn try_catch_finally_compiles_clean_and_lowers_a_throw() {
    let ir = ir_for(
        r#"
        func main() {
            try {
                throw "oops";
            } catch (e: String) {
                print(e);
            } finally {
                print("done");
            }
        }
        "#,
    );
    assert!(ir.contains("chroma_rt_throw") || ir.contains("chroma_rt_try_begin"));
}
