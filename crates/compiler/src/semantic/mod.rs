//! Semantic analysis: three passes over the top-level declarations that
//! turn a parsed [`Program`] into a resolved [`ClassTable`] plus the set of
//! generic instantiations codegen needs to emit, reporting every problem
//! with the user's program into a shared [`Diagnostics`].
//!
//! - Pass 0 ([`Analyzer::register_names`]) registers every class,
//!   interface, and enum name with a placeholder type so forward references
//!   between declarations resolve regardless of declaration order.
//! - Pass 1 ([`Analyzer::resolve_signatures`]) resolves every annotated
//!   type (fields, parameters, return types), installs inheritance edges,
//!   and builds the full field/method tables per class.
//! - Pass 2 (`stmt.rs`/`expr.rs`) walks every function and method body,
//!   type-checking statements and expressions against the tables Pass 1
//!   built.

mod expr;
mod stmt;

use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::*;
use crate::diagnostics::{codes, Diagnostic, Diagnostics};
use crate::symbols::{ClassTable, SymbolTable};
use crate::types::{
    substitute_type_params, AccessLevel, ClassField, ClassMethod, ClassType, EnumType,
    GenericInstantiation, Type,
};

/// A nested `try` block deeper than this is a compile error instead of a
/// runtime crash — see `DESIGN.md` for why this improves on the runtime's
/// own fixed-depth jump-buffer stack.
pub const MAX_TRY_DEPTH: usize = 64;

pub struct AnalysisResult {
    pub classes: ClassTable,
    pub generic_instantiations: Vec<GenericInstantiation>,
}

pub struct Analyzer<'a> {
    diagnostics: &'a mut Diagnostics,
    symbols: SymbolTable,
    classes: ClassTable,
    /// Generic class instances created on demand, keyed by mangled name;
    /// kept separate from `classes`' own template bookkeeping so an
    /// instance is never mistaken for a template (see `types.rs`).
    instantiated: HashMap<String, Rc<ClassType>>,
    generic_instantiations: Vec<GenericInstantiation>,
    /// Top-level function signatures, keyed by name (including the wrapping
    /// `Future<T>` return type for `async` functions).
    functions: HashMap<String, Rc<Type>>,
    extern_functions: HashMap<String, Rc<Type>>,
    current_return_type: Rc<Type>,
    current_class: Option<Rc<ClassType>>,
    current_type_params: Vec<String>,
    /// Name of the generic class template whose signatures are currently
    /// being resolved (Pass 1), so a bare reference to its own name inside
    /// its own fields/methods (`func new(v: T) -> Box` inside `class
    /// Box<T>`) resolves to the self-instantiation `Box<T>` instead of
    /// being treated as a zero-argument use of the template.
    current_template_name: Option<String>,
    expected_lambda_param_types: Option<Vec<Rc<Type>>>,
    /// Hint threaded into `check_expr` so a bare `Construct` on a generic
    /// template (`Box { value: 1 }`) can pick up the concrete type args from
    /// its assignment/return/declaration context instead of needing them
    /// spelled out on the construction expression itself.
    expected_type: Option<Rc<Type>>,
    /// `Some` while checking a lambda body with no declared return type;
    /// `Return` pushes the checked value's type here instead of comparing it
    /// against `current_return_type`, and the lambda's own return type is
    /// inferred from the first entry once the body has been walked.
    inferred_return: Option<Vec<Rc<Type>>>,
    in_async_function: bool,
    in_unsafe_block: bool,
    try_depth: usize,
}

impl<'a> Analyzer<'a> {
    pub fn new(diagnostics: &'a mut Diagnostics) -> Self {
        Analyzer {
            diagnostics,
            symbols: SymbolTable::new(),
            classes: ClassTable::new(),
            instantiated: HashMap::new(),
            generic_instantiations: Vec::new(),
            functions: HashMap::new(),
            extern_functions: HashMap::new(),
            current_return_type: Rc::new(Type::Void),
            current_class: None,
            current_type_params: Vec::new(),
            current_template_name: None,
            expected_lambda_param_types: None,
            expected_type: None,
            inferred_return: None,
            in_async_function: false,
            in_unsafe_block: false,
            try_depth: 0,
        }
    }

    pub fn analyze(mut self, program: &Program) -> AnalysisResult {
        self.register_names(program);
        self.resolve_signatures(program);
        self.check_declarations(program);
        AnalysisResult {
            classes: self.classes,
            generic_instantiations: self.generic_instantiations,
        }
    }

    // -----------------------------------------------------------------
    // Pass 0 — register names
    // -----------------------------------------------------------------

    fn register_names(&mut self, program: &Program) {
        for decl in &program.declarations {
            match &decl.kind {
                StmtKind::ClassDecl(class) => {
                    if self.classes.get_class(&class.name).is_some() {
                        self.diagnostics.report(Diagnostic::error(
                            codes::DUPLICATE_DECLARATION,
                            format!("'{}' is already declared", class.name),
                            decl.span.clone(),
                        ));
                        continue;
                    }
                    let placeholder = Rc::new(ClassType {
                        name: class.name.clone(),
                        is_interface: false,
                        is_shared: class.is_shared,
                        parent: None,
                        interface_names: Vec::new(),
                        fields: Vec::new(),
                        methods: Vec::new(),
                        type_params: class.type_params.clone(),
                        type_args: Vec::new(),
                    });
                    self.classes.register_class(placeholder);
                }
                StmtKind::InterfaceDecl(iface) => {
                    if self.classes.get_class(&iface.name).is_some() {
                        self.diagnostics.report(Diagnostic::error(
                            codes::DUPLICATE_DECLARATION,
                            format!("'{}' is already declared", iface.name),
                            decl.span.clone(),
                        ));
                        continue;
                    }
                    let placeholder = Rc::new(ClassType {
                        name: iface.name.clone(),
                        is_interface: true,
                        is_shared: false,
                        parent: None,
                        interface_names: Vec::new(),
                        fields: Vec::new(),
                        methods: Vec::new(),
                        type_params: Vec::new(),
                        type_args: Vec::new(),
                    });
                    self.classes.register_class(placeholder);
                }
                StmtKind::EnumDecl(enum_decl) => {
                    if self.classes.get_enum(&enum_decl.name).is_some() {
                        self.diagnostics.report(Diagnostic::error(
                            codes::DUPLICATE_DECLARATION,
                            format!("'{}' is already declared", enum_decl.name),
                            decl.span.clone(),
                        ));
                        continue;
                    }
                    let mut cases = Vec::new();
                    let mut associated_types = HashMap::new();
                    for variant in &enum_decl.variants {
                        cases.push(variant.name.clone());
                        let resolved = variant
                            .associated_type
                            .as_ref()
                            .map(|t| self.resolve_type_expr(t));
                        associated_types.insert(variant.name.clone(), resolved);
                    }
                    self.classes.register_enum(Rc::new(EnumType {
                        name: enum_decl.name.clone(),
                        cases,
                        associated_types,
                    }));
                }
                _ => {}
            }
        }
    }

    // -----------------------------------------------------------------
    // Pass 1 — resolve signatures
    // -----------------------------------------------------------------

    fn resolve_signatures(&mut self, program: &Program) {
        for decl in &program.declarations {
            match &decl.kind {
                StmtKind::ClassDecl(class) => self.resolve_class_signature(class, &decl.span),
                StmtKind::InterfaceDecl(iface) => self.resolve_interface_signature(iface),
                StmtKind::FuncDecl(func) => {
                    let ty = self.function_type(func);
                    self.functions.insert(func.name.clone(), ty);
                }
                StmtKind::ExternFuncDecl(func) => {
                    let param_types = func
                        .parameters
                        .iter()
                        .map(|p| self.resolve_type_expr(&p.type_annotation))
                        .collect();
                    let return_type = func
                        .return_type
                        .as_ref()
                        .map(|t| self.resolve_type_expr(t))
                        .unwrap_or_else(|| Rc::new(Type::Void));
                    self.extern_functions
                        .insert(func.name.clone(), Type::function(param_types, return_type));
                }
                _ => {}
            }
        }
    }

    fn resolve_class_signature(&mut self, class: &ClassDecl, span: &crate::source::Span) {
        self.current_type_params = class.type_params.clone();
        self.current_template_name = if class.type_params.is_empty() {
            None
        } else {
            Some(class.name.clone())
        };

        let mut parent = None;
        let mut interface_names = Vec::new();
        if let Some(base_name) = &class.base_class {
            if let Some(base_class) = self.classes.get_class(base_name) {
                if base_class.is_interface {
                    interface_names.push(base_name.clone());
                } else {
                    parent = Some(base_class);
                }
            } else {
                self.diagnostics.report(Diagnostic::error(
                    codes::UNKNOWN_BASE_CLASS,
                    format!("unknown base class or interface '{}'", base_name),
                    span.clone(),
                ));
            }
        }
        for iface_name in &class.interfaces {
            if self.classes.get_class(iface_name).is_some() {
                interface_names.push(iface_name.clone());
            } else {
                self.diagnostics.report(Diagnostic::error(
                    codes::UNKNOWN_BASE_CLASS,
                    format!("unknown interface '{}'", iface_name),
                    span.clone(),
                ));
            }
        }

        let mut fields = Vec::new();
        for field in &class.fields {
            let ty = field
                .type_annotation
                .as_ref()
                .map(|t| self.resolve_type_expr(t))
                .unwrap_or_else(|| Rc::new(Type::Unknown));
            fields.push(ClassField {
                name: field.name.clone(),
                ty,
                access: to_access_level(&field.access),
            });
        }

        let mut methods = Vec::new();
        for method in &class.methods {
            let ty = self.function_type(method);
            methods.push(ClassMethod {
                name: method.name.clone(),
                ty,
                access: to_access_level(&method.access),
            });
        }

        let resolved = Rc::new(ClassType {
            name: class.name.clone(),
            is_interface: false,
            is_shared: class.is_shared,
            parent,
            interface_names: interface_names.clone(),
            fields,
            methods,
            type_params: class.type_params.clone(),
            type_args: Vec::new(),
        });
        self.classes.register_class(resolved.clone());

        for iface_name in &interface_names {
            if let Some(iface) = self.classes.get_class(iface_name) {
                for required in &iface.methods {
                    if resolved.method_type(&required.name).is_none() {
                        self.diagnostics.report(Diagnostic::error(
                            codes::MISSING_INTERFACE_METHOD,
                            format!(
                                "class '{}' does not implement '{}' required by interface '{}'",
                                class.name, required.name, iface_name
                            ),
                            span.clone(),
                        ));
                    }
                }
            }
        }

        if class.is_shared {
            self.diagnostics.report(Diagnostic::error(
                codes::SHARED_CLASS_REJECTED,
                format!(
                    "'shared' class '{}' is not supported; remove 'shared' or restructure without cross-thread sharing",
                    class.name
                ),
                span.clone(),
            ));
        }

        self.current_type_params.clear();
        self.current_template_name = None;
    }

    fn resolve_interface_signature(&mut self, iface: &InterfaceDecl) {
        let mut methods = Vec::new();
        for method in &iface.methods {
            let ty = self.function_type(method);
            methods.push(ClassMethod {
                name: method.name.clone(),
                ty,
                access: AccessLevel::Public,
            });
        }
        let resolved = Rc::new(ClassType {
            name: iface.name.clone(),
            is_interface: true,
            is_shared: false,
            parent: None,
            interface_names: Vec::new(),
            fields: Vec::new(),
            methods,
            type_params: Vec::new(),
            type_args: Vec::new(),
        });
        self.classes.register_class(resolved);
    }

    /// Resolves a function's parameter/return types into a `Type::Function`.
    /// An async function's declared return type `T` is wrapped `Future<T>`
    /// for every caller — `await`ing it at the call site unwraps back to `T`.
    fn function_type(&mut self, func: &FuncDecl) -> Rc<Type> {
        let param_types = func
            .parameters
            .iter()
            .map(|p| self.resolve_type_expr(&p.type_annotation))
            .collect();
        let mut return_type = func
            .return_type
            .as_ref()
            .map(|t| self.resolve_type_expr(t))
            .unwrap_or_else(|| Rc::new(Type::Void));
        if func.is_async {
            return_type = Rc::new(Type::Future(return_type));
        }
        Type::function(param_types, return_type)
    }

    // -----------------------------------------------------------------
    // Type expression resolution
    // -----------------------------------------------------------------

    fn resolve_type_expr(&mut self, texpr: &TypeExpr) -> Rc<Type> {
        if texpr.is_function_type() {
            if texpr.type_args.is_empty() {
                self.diagnostics.report(Diagnostic::error(
                    codes::INVALID_TYPE_EXPR,
                    "function type requires at least a return type",
                    texpr.span.clone(),
                ));
                return Rc::new(Type::Unknown);
            }
            let mut args: Vec<Rc<Type>> =
                texpr.type_args.iter().map(|t| self.resolve_type_expr(t)).collect();
            let return_type = args.pop().unwrap();
            return self.maybe_nullable(Type::function(args, return_type), texpr.nullable);
        }

        let base = match texpr.name.as_str() {
            "Int" => Rc::new(Type::Int),
            "Int8" => Rc::new(Type::Int8),
            "Int16" => Rc::new(Type::Int16),
            "Int32" => Rc::new(Type::Int32),
            "UInt" => Rc::new(Type::UInt),
            "UInt8" => Rc::new(Type::UInt8),
            "UInt16" => Rc::new(Type::UInt16),
            "UInt32" => Rc::new(Type::UInt32),
            "Float" => Rc::new(Type::Float),
            "Float32" => Rc::new(Type::Float32),
            "Bool" => Rc::new(Type::Bool),
            "String" => Rc::new(Type::String),
            "Char" => Rc::new(Type::Char),
            "Void" => Rc::new(Type::Void),
            "TypeInfo" => Rc::new(Type::TypeInfo),
            "Array" => {
                if let Some(elem) = texpr.type_args.first() {
                    Rc::new(Type::Array(self.resolve_type_expr(elem)))
                } else {
                    self.bad_generic_arg_count("Array", 1, 0, &texpr.span);
                    Rc::new(Type::Unknown)
                }
            }
            "Future" => {
                if let Some(elem) = texpr.type_args.first() {
                    Rc::new(Type::Future(self.resolve_type_expr(elem)))
                } else {
                    self.bad_generic_arg_count("Future", 1, 0, &texpr.span);
                    Rc::new(Type::Unknown)
                }
            }
            "Set" => {
                if let Some(elem) = texpr.type_args.first() {
                    Rc::new(Type::Set(self.resolve_type_expr(elem)))
                } else {
                    self.bad_generic_arg_count("Set", 1, 0, &texpr.span);
                    Rc::new(Type::Unknown)
                }
            }
            "Map" => {
                if texpr.type_args.len() == 2 {
                    Rc::new(Type::Map {
                        key_type: self.resolve_type_expr(&texpr.type_args[0]),
                        value_type: self.resolve_type_expr(&texpr.type_args[1]),
                    })
                } else {
                    self.bad_generic_arg_count("Map", 2, texpr.type_args.len(), &texpr.span);
                    Rc::new(Type::Unknown)
                }
            }
            name if self.current_type_params.iter().any(|p| p == name) => {
                Rc::new(Type::TypeParameter(name.to_string()))
            }
            name if self.classes.get_enum(name).is_some() => {
                Rc::new(Type::Enum(self.classes.get_enum(name).unwrap()))
            }
            name if self.classes.is_generic_template(name) => {
                let template = self.classes.get_class(name).unwrap();
                if texpr.type_args.is_empty()
                    && self.current_template_name.as_deref() == Some(name)
                {
                    // A bare reference to the enclosing template from inside
                    // its own signatures (e.g. `-> Box` inside `class
                    // Box<T>`) names the template parameterized by its own
                    // type parameters, not a zero-argument instantiation.
                    let self_args: Vec<Rc<Type>> = template
                        .type_params
                        .iter()
                        .map(|p| Rc::new(Type::TypeParameter(p.clone())))
                        .collect();
                    Rc::new(Type::Class(Rc::new(ClassType {
                        type_args: self_args,
                        ..(*template).clone()
                    })))
                } else if texpr.type_args.len() != template.type_params.len() {
                    self.bad_generic_arg_count(
                        name,
                        template.type_params.len(),
                        texpr.type_args.len(),
                        &texpr.span,
                    );
                    Rc::new(Type::Unknown)
                } else {
                    let args: Vec<Rc<Type>> =
                        texpr.type_args.iter().map(|t| self.resolve_type_expr(t)).collect();
                    Rc::new(Type::Class(self.instantiate_generic_class(name, args)))
                }
            }
            name if self.classes.get_class(name).is_some() => {
                Rc::new(Type::Class(self.classes.get_class(name).unwrap()))
            }
            name => {
                self.diagnostics.report(Diagnostic::error(
                    codes::UNKNOWN_TYPE,
                    format!("unknown type '{}'", name),
                    texpr.span.clone(),
                ));
                Rc::new(Type::Unknown)
            }
        };
        self.maybe_nullable(base, texpr.nullable)
    }

    fn maybe_nullable(&self, base: Rc<Type>, nullable: bool) -> Rc<Type> {
        if nullable {
            Type::nullable(base)
        } else {
            base
        }
    }

    fn bad_generic_arg_count(
        &mut self,
        name: &str,
        expected: usize,
        found: usize,
        span: &crate::source::Span,
    ) {
        self.diagnostics.report(Diagnostic::error(
            codes::BAD_GENERIC_ARG_COUNT,
            format!(
                "'{}' expects {} type argument(s), found {}",
                name, expected, found
            ),
            span.clone(),
        ));
    }

    /// Instantiates (or returns the memoized instance of) a generic class
    /// template applied to concrete `type_args`, substituting every field
    /// and method type and recording the instantiation for codegen.
    fn instantiate_generic_class(&mut self, name: &str, type_args: Vec<Rc<Type>>) -> Rc<ClassType> {
        let mangled = GenericInstantiation::mangle(name, &type_args);
        if let Some(existing) = self.instantiated.get(&mangled) {
            return existing.clone();
        }

        let template = self.classes.get_class(name).expect("checked by caller");
        let fields = template
            .fields
            .iter()
            .map(|f| ClassField {
                name: f.name.clone(),
                ty: substitute_type_params(&f.ty, &template.type_params, &type_args),
                access: f.access.clone(),
            })
            .collect();
        let methods = template
            .methods
            .iter()
            .map(|m| ClassMethod {
                name: m.name.clone(),
                ty: substitute_type_params(&m.ty, &template.type_params, &type_args),
                access: m.access.clone(),
            })
            .collect();

        let instance = Rc::new(ClassType {
            name: name.to_string(),
            is_interface: false,
            is_shared: template.is_shared,
            parent: template.parent.clone(),
            interface_names: template.interface_names.clone(),
            fields,
            methods,
            type_params: template.type_params.clone(),
            type_args: type_args.clone(),
        });

        self.instantiated.insert(mangled.clone(), instance.clone());
        self.generic_instantiations.push(GenericInstantiation {
            template_name: name.to_string(),
            mangled_name: mangled,
            type_params: template.type_params.clone(),
            type_args,
        });
        instance
    }
}

fn to_access_level(access: &AccessModifier) -> AccessLevel {
    match access {
        AccessModifier::Private => AccessLevel::Private,
        AccessModifier::Protected => AccessLevel::Protected,
        AccessModifier::Public => AccessLevel::Public,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use std::rc::Rc as StdRc;

    fn analyze(source: &str) -> (AnalysisResult, Diagnostics) {
        let mut diagnostics = Diagnostics::new();
        let program = Parser::parse_source(source, StdRc::from("t.chr"), &mut diagnostics);
        let result = Analyzer::new(&mut diagnostics).analyze(&program);
        drop(program);
        (result, diagnostics)
    }

    #[test]
    fn registers_class_fields_and_methods() {
        let (result, diagnostics) =
            analyze("class Point { public var x: Int; public var y: Int; public func sum() -> Int { return 0; } }");
        assert!(!diagnostics.has_errors());
        let point = result.classes.get_class("Point").unwrap();
        assert_eq!(point.fields.len(), 2);
        assert!(point.method_type("sum").is_some());
    }

    #[test]
    fn unknown_base_class_is_reported() {
        let (_, diagnostics) = analyze("class Dog : Animal { }");
        assert!(diagnostics.has_errors());
    }

    #[test]
    fn shared_class_is_rejected() {
        let (_, diagnostics) = analyze("shared class Counter { }");
        assert!(diagnostics.has_errors());
    }

    #[test]
    fn generic_class_instantiated_once_per_mangled_name() {
        let (result, diagnostics) = analyze(
            "class Box<T> { public var value: T; } func main() { var a: Box<Int> = Box { value: 1 }; var b: Box<Int> = Box { value: 2 }; }",
        );
        assert!(!diagnostics.has_errors());
        assert_eq!(result.generic_instantiations.len(), 1);
        assert_eq!(result.generic_instantiations[0].mangled_name, "Box_Int");
    }
}
