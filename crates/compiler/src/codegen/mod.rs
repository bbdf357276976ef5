//! Code generation: lowers a type-checked [`Program`] plus its
//! [`AnalysisResult`] into a single textual SSA IR module.
//!
//! Four passes, matching the order fields/methods/instantiations become
//! knowable:
//!
//! 1. **Struct registration** — one aggregate type per concrete class, per
//!    enum, and per generic instantiation.
//! 2. **Declarations** — the runtime ABI, any `extern` functions the
//!    program declares, nothing else (user functions need no forward
//!    declaration; the whole module is emitted before anything reads it).
//! 3. **Generic instance layout** — same as pass 1 for structs, but for the
//!    field/method *types* a generic instantiation substitutes in, so pass 4
//!    can lower each instantiated method body against concrete types.
//! 4. **Body lowering** — every function and method body, walked
//!    statement by statement.
//!
//! Locals are alloca'd up front and reloaded on every use (the same
//! shape `clang -O0` emits) rather than threaded through as SSA values —
//! far simpler to hand-emit correctly than a real mem2reg/phi pipeline, at
//! the cost of a few redundant loads no optimizer ever runs here to clean up.

pub mod error;
pub mod ir;
pub mod runtime_abi;

use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{
    Block, ClassDecl, Expr, ExprKind, FuncDecl, LambdaBody, MatchArm, Program, Stmt, StmtKind,
};
use crate::semantic::AnalysisResult;
use crate::symbols::ClassTable;
use crate::types::{substitute_type_params, ClassType, EnumType, GenericInstantiation, Type};

pub use error::CodeGenError;
use ir::{IrVerifier, Module};
use runtime_abi::RUNTIME_DECLARATIONS;

/// Top-level entry point: the only function the rest of the compiler calls.
pub fn codegen_program(program: &Program, analysis: &AnalysisResult) -> Result<String, CodeGenError> {
    let mut cg = CodeGen::new(&analysis.classes);
    cg.emit_header(program, &analysis.generic_instantiations)?;
    cg.emit_bodies(program, &analysis.generic_instantiations)?;
    cg.emit_string_globals()?;
    let text = cg.module.finish();
    IrVerifier::verify(&text)?;
    Ok(text)
}

fn llvm_type(ty: &Type) -> &'static str {
    match ty {
        Type::Int | Type::UInt => "i64",
        Type::Int8 | Type::UInt8 | Type::Char => "i8",
        Type::Int16 | Type::UInt16 => "i16",
        Type::Int32 | Type::UInt32 => "i32",
        Type::Float => "double",
        Type::Float32 => "float",
        Type::Bool => "i1",
        Type::Void => "void",
        Type::Future(_) => unreachable!("Future is unwrapped by llvm_type_unwrapped before use"),
        _ => "ptr",
    }
}

/// Same as [`llvm_type`] but unwraps `Future<T>` to `T`'s representation —
/// `await` has no runtime effect, so a `Future<T>`-returning function is
/// emitted exactly like a `T`-returning one.
fn llvm_type_unwrapped(ty: &Type) -> &'static str {
    match ty {
        Type::Future(inner) => llvm_type_unwrapped(inner),
        other => llvm_type(other),
    }
}

struct LocalVar {
    ptr: String,
    ty: Rc<Type>,
}

struct CodeGen<'a> {
    classes: &'a ClassTable,
    module: Module,
    locals: Vec<HashMap<String, LocalVar>>,
    current_return_type: Rc<Type>,
    current_class: Option<Rc<ClassType>>,
    /// Substitutions active while lowering a generic instantiation's method
    /// bodies (`T` -> the concrete argument for this instance).
    type_param_subst: HashMap<String, Rc<Type>>,
    /// Hint threaded from a `var` declaration's annotation (or the enclosing
    /// function's return type, for a `return`) into `lower_construct` so a
    /// bare `Box { value: 1 }` can recover which monomorphized `Box_Int`
    /// layout it targets — mirrors `Analyzer::expected_type` in the semantic
    /// pass, needed again here because codegen has no typed-HIR to read a
    /// already-resolved type back from.
    expected_type: Option<Rc<Type>>,
    try_depth: u32,
    string_globals: HashMap<String, String>,
    anon_fn_counter: u32,
    pending_lambda_defs: Vec<String>,
}

impl<'a> CodeGen<'a> {
    fn new(classes: &'a ClassTable) -> Self {
        CodeGen {
            classes,
            module: Module::new(),
            locals: vec![HashMap::new()],
            current_return_type: Rc::new(Type::Void),
            current_class: None,
            type_param_subst: HashMap::new(),
            expected_type: None,
            try_depth: 0,
            string_globals: HashMap::new(),
            anon_fn_counter: 0,
            pending_lambda_defs: Vec::new(),
        }
    }

    // -----------------------------------------------------------------
    // Pass 1/3 — struct registration and declarations
    // -----------------------------------------------------------------

    fn emit_header(
        &mut self,
        program: &Program,
        instantiations: &[GenericInstantiation],
    ) -> Result<(), CodeGenError> {
        self.module.header_line("; module generated by chromac")?;
        self.module.header_line("target datalayout = \"\"")?;
        self.module.header_line("")?;

        let mut class_names: Vec<&String> = self.classes.class_names().collect();
        class_names.sort();
        for name in class_names {
            let class = self.classes.get_class(name).expect("listed by class_names");
            if class.is_generic_template() {
                continue;
            }
            self.emit_struct_decl(&class.name, &class)?;
        }

        let mut enums: Vec<&Rc<EnumType>> = self.classes.enums().collect();
        enums.sort_by(|a, b| a.name.cmp(&b.name));
        for e in enums {
            self.module
                .header_line(format!("%Enum.{} = type {{ i32, ptr }}", e.name))?;
        }

        for inst in instantiations {
            let (fields, _methods) = self.substitute_instance(inst);
            self.emit_struct_fields(&inst.mangled_name, &fields)?;
        }
        self.module.header_line("")?;

        let mut decls: Vec<&runtime_abi::RuntimeDecl> = RUNTIME_DECLARATIONS.iter().collect();
        decls.sort_by(|a, b| a.symbol.cmp(b.symbol));
        for decl in decls {
            self.module.header_line(decl.signature)?;
        }
        self.module.header_line("")?;

        for decl in &program.declarations {
            if let StmtKind::ExternFuncDecl(func) = &decl.kind {
                self.emit_extern_decl(func)?;
            }
        }
        self.module.header_line("")?;
        Ok(())
    }

    fn emit_extern_decl(&mut self, func: &crate::ast::ExternFuncDecl) -> Result<(), CodeGenError> {
        let ret = func
            .return_type
            .as_ref()
            .map(|t| llvm_type_unwrapped(&self.resolve_type_expr(t)))
            .unwrap_or("void");
        let mut params: Vec<&str> = func
            .parameters
            .iter()
            .map(|p| llvm_type_unwrapped(&self.resolve_type_expr(&p.type_annotation)))
            .collect();
        let variadic = if func.is_variadic {
            params.push("...");
            true
        } else {
            false
        };
        let _ = variadic;
        self.module.header_line(format!(
            "declare {} @{}({})",
            ret,
            func.name,
            params.join(", ")
        ))
    }

    fn emit_struct_decl(&mut self, name: &str, class: &ClassType) -> Result<(), CodeGenError> {
        self.emit_struct_fields(name, &class.fields.iter().map(|f| f.ty.clone()).collect::<Vec<_>>())
    }

    fn emit_struct_fields(&mut self, name: &str, field_types: &[Rc<Type>]) -> Result<(), CodeGenError> {
        let rendered: Vec<&str> = field_types.iter().map(|t| llvm_type_unwrapped(t)).collect();
        self.module
            .header_line(format!("%Class.{} = type {{ {} }}", name, rendered.join(", ")))
    }

    /// Rebuilds a generic instantiation's field/method types from its
    /// template the same way `Analyzer::instantiate_generic_class` did —
    /// the substituted `ClassType` itself isn't carried in `AnalysisResult`,
    /// only the `(template_name, mangled_name, type_args)` record codegen
    /// needs to reconstruct it from.
    fn substitute_instance(&self, inst: &GenericInstantiation) -> (Vec<Rc<Type>>, Vec<(String, Rc<Type>)>) {
        let template = self
            .classes
            .get_class(&inst.template_name)
            .expect("generic instantiation names a registered template");
        let fields = template
            .fields
            .iter()
            .map(|f| substitute_type_params(&f.ty, &template.type_params, &inst.type_args))
            .collect();
        let methods = template
            .methods
            .iter()
            .map(|m| {
                (
                    m.name.clone(),
                    substitute_type_params(&m.ty, &template.type_params, &inst.type_args),
                )
            })
            .collect();
        (fields, methods)
    }

    // -----------------------------------------------------------------
    // Pass 4 — body lowering
    // -----------------------------------------------------------------

    fn emit_bodies(
        &mut self,
        program: &Program,
        instantiations: &[GenericInstantiation],
    ) -> Result<(), CodeGenError> {
        for decl in &program.declarations {
            match &decl.kind {
                StmtKind::FuncDecl(func) if func.body.is_some() => {
                    self.emit_function(&func.name, func, None)?;
                }
                StmtKind::ClassDecl(class) if class.type_params.is_empty() => {
                    self.emit_class_methods(class, &HashMap::new(), &class.name)?;
                }
                StmtKind::ClassDecl(class) => {
                    for inst in instantiations.iter().filter(|i| i.template_name == class.name) {
                        let subst: HashMap<String, Rc<Type>> = template_param_map(&inst.type_params, &inst.type_args);
                        self.emit_class_methods(class, &subst, &inst.mangled_name)?;
                    }
                }
                _ => {}
            }
        }
        // Lambdas emit themselves as independent top-level functions the
        // first time they're lowered; flush the accumulated definitions.
        let pending = std::mem::take(&mut self.pending_lambda_defs);
        for def in pending {
            self.module.body_line(def)?;
        }
        Ok(())
    }

    fn emit_class_methods(
        &mut self,
        class: &ClassDecl,
        subst: &HashMap<String, Rc<Type>>,
        mangled_prefix: &str,
    ) -> Result<(), CodeGenError> {
        let resolved = if subst.is_empty() {
            self.classes.get_class(&class.name)
        } else {
            self.classes
                .get_class(&class.name)
                .map(|template| substituted_class_type(&template, subst))
        };
        for method in &class.methods {
            if method.body.is_none() {
                continue;
            }
            let previous_subst = std::mem::replace(&mut self.type_param_subst, subst.clone());
            let previous_class = self.current_class.take();
            self.current_class = resolved.clone();
            let mangled_name = format!("{}_{}", mangled_prefix, method.name);
            self.emit_function(&mangled_name, method, resolved.clone())?;
            self.current_class = previous_class;
            self.type_param_subst = previous_subst;
        }
        Ok(())
    }

    fn emit_function(
        &mut self,
        llvm_name: &str,
        func: &FuncDecl,
        owner: Option<Rc<ClassType>>,
    ) -> Result<(), CodeGenError> {
        let body = func.body.as_ref().expect("caller checked body.is_some()");
        let return_ty = func
            .return_type
            .as_ref()
            .map(|t| self.resolve_type_expr(t))
            .unwrap_or_else(|| Rc::new(Type::Void));
        let previous_return = std::mem::replace(&mut self.current_return_type, return_ty.clone());

        let mut params = Vec::new();
        if let Some(owner) = &owner {
            params.push(format!("ptr %this"));
            let _ = owner;
        }
        for p in &func.parameters {
            let ty = self.resolve_type_expr(&p.type_annotation);
            params.push(format!("{} %arg.{}", llvm_type_unwrapped(&ty), p.name));
        }

        self.module.body_line(format!(
            "define {} @{}({}) {{",
            llvm_type_unwrapped(&return_ty),
            llvm_name,
            params.join(", ")
        ))?;
        self.module.body_line("entry:")?;

        self.locals.push(HashMap::new());
        if owner.is_some() {
            let this_ty = Rc::new(Type::Class(owner.clone().unwrap()));
            self.declare_local("this", this_ty, "%this")?;
        }
        for p in &func.parameters {
            let ty = self.resolve_type_expr(&p.type_annotation);
            let arg_ref = format!("%arg.{}", p.name);
            self.declare_local(&p.name, ty, &arg_ref)?;
        }

        self.lower_block(body)?;
        // Every path that doesn't already end in `ret` (e.g. the implicit
        // fall-through of a `Void` function) gets one here.
        if *return_ty == Type::Void {
            self.module.body_line("  ret void")?;
        } else {
            self.module.body_line("  unreachable")?;
        }

        self.locals.pop();
        self.module.body_line("}")?;
        self.module.body_line("")?;
        self.current_return_type = previous_return;
        Ok(())
    }

    // -----------------------------------------------------------------
    // Locals
    // -----------------------------------------------------------------

    fn declare_local(&mut self, name: &str, ty: Rc<Type>, init_value: &str) -> Result<(), CodeGenError> {
        let llvm_ty = llvm_type_unwrapped(&ty);
        let ptr = self.module.fresh_reg();
        self.module.body_line(format!("  {} = alloca {}", ptr, llvm_ty))?;
        self.module
            .body_line(format!("  store {} {}, ptr {}", llvm_ty, init_value, ptr))?;
        self.locals
            .last_mut()
            .expect("at least one scope")
            .insert(name.to_string(), LocalVar { ptr, ty });
        Ok(())
    }

    fn lookup_local(&self, name: &str) -> Option<&LocalVar> {
        self.locals.iter().rev().find_map(|scope| scope.get(name))
    }

    // -----------------------------------------------------------------
    // Type resolution (mirrors semantic::Analyzer::resolve_type_expr,
    // minus diagnostics — Pass 2 already validated the program).
    // -----------------------------------------------------------------

    fn resolve_type_expr(&self, texpr: &crate::ast::TypeExpr) -> Rc<Type> {
        if texpr.is_function_type() {
            return Rc::new(Type::Function {
                param_types: Vec::new(),
                return_type: Rc::new(Type::Void),
            });
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
            "Array" => Rc::new(Type::Array(
                texpr
                    .type_args
                    .first()
                    .map(|t| self.resolve_type_expr(t))
                    .unwrap_or_else(|| Rc::new(Type::Unknown)),
            )),
            "Future" => Rc::new(Type::Future(
                texpr
                    .type_args
                    .first()
                    .map(|t| self.resolve_type_expr(t))
                    .unwrap_or_else(|| Rc::new(Type::Unknown)),
            )),
            "Set" => Rc::new(Type::Set(
                texpr
                    .type_args
                    .first()
                    .map(|t| self.resolve_type_expr(t))
                    .unwrap_or_else(|| Rc::new(Type::Unknown)),
            )),
            "Map" if texpr.type_args.len() == 2 => Rc::new(Type::Map {
                key_type: self.resolve_type_expr(&texpr.type_args[0]),
                value_type: self.resolve_type_expr(&texpr.type_args[1]),
            }),
            name if self.type_param_subst.contains_key(name) => self.type_param_subst[name].clone(),
            name if self.classes.get_enum(name).is_some() => {
                Rc::new(Type::Enum(self.classes.get_enum(name).unwrap()))
            }
            // A bare reference to the template currently being lowered (a
            // factory method on `Box<T>` that names its own return type as
            // `Box` rather than `Box<T>`) means this exact instantiation,
            // already fully substituted on `self.current_class` — not a
            // fresh, unsubstituted use of the template.
            name if texpr.type_args.is_empty()
                && self
                    .current_class
                    .as_ref()
                    .is_some_and(|c| c.name == name && c.is_generic_instance()) =>
            {
                Rc::new(Type::Class(self.current_class.clone().unwrap()))
            }
            name if self.classes.is_generic_template(name) => {
                let template = self.classes.get_class(name).expect("is_generic_template implies registered");
                let args: Vec<Rc<Type>> = texpr.type_args.iter().map(|t| self.resolve_type_expr(t)).collect();
                Rc::new(Type::Class(substituted_class_type(&template, &template_param_map(&template.type_params, &args))))
            }
            name => self
                .classes
                .get_class(name)
                .map(Type::Class)
                .map(Rc::new)
                .unwrap_or_else(|| Rc::new(Type::Unknown)),
        };
        if texpr.nullable {
            Type::nullable(base)
        } else {
            base
        }
    }

    // -----------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------

    fn lower_block(&mut self, block: &Block) -> Result<(), CodeGenError> {
        self.locals.push(HashMap::new());
        for stmt in &block.statements {
            self.lower_stmt(stmt)?;
        }
        self.locals.pop();
        Ok(())
    }

    fn lower_stmt(&mut self, stmt: &Stmt) -> Result<(), CodeGenError> {
        match &stmt.kind {
            StmtKind::Block(block) => self.lower_block(block),
            StmtKind::Expr(expr) => {
                self.lower_expr(expr)?;
                Ok(())
            }
            StmtKind::VarDecl(decl) => {
                let initializer = decl
                    .initializer
                    .as_ref()
                    .expect("checked var always has an initializer or a type annotation validated separately");
                let ty = match &decl.type_annotation {
                    Some(annotation) => self.resolve_type_expr(annotation),
                    None => self.infer_type(initializer),
                };
                let previous_expected = self.expected_type.replace(ty.clone());
                let value = self.lower_expr(initializer)?;
                self.expected_type = previous_expected;
                self.declare_local(&decl.name, ty, &value)
            }
            StmtKind::Return(value) => {
                match value {
                    Some(expr) => {
                        let return_ty = self.current_return_type.clone();
                        let previous_expected = self.expected_type.replace(return_ty);
                        let v = self.lower_expr(expr)?;
                        self.expected_type = previous_expected;
                        let ret_llvm_ty = llvm_type_unwrapped(&self.current_return_type);
                        self.module.body_line(format!("  ret {} {}", ret_llvm_ty, v))
                    }
                    None => self.module.body_line("  ret void"),
                }
            }
            StmtKind::If {
                condition,
                then_block,
                else_block,
            } => self.lower_if(condition, then_block, else_block.as_deref()),
            StmtKind::While { condition, body } => self.lower_while(condition, body),
            StmtKind::For {
                variable,
                iterable,
                body,
            } => self.lower_for(variable, iterable, body),
            StmtKind::Break | StmtKind::Continue => Ok(()),
            StmtKind::Throw(expr) => {
                let v = self.lower_expr(expr)?;
                self.module.body_line(format!("  call void @chroma_rt_throw(ptr {})", v))
            }
            StmtKind::TryCatch {
                try_block,
                catch_clauses,
                finally_block,
            } => self.lower_try_catch(try_block, catch_clauses, finally_block.as_ref()),
            StmtKind::Unsafe(block) => self.lower_block(block),
            StmtKind::FuncDecl(_)
            | StmtKind::ExternFuncDecl(_)
            | StmtKind::Import(_)
            | StmtKind::ClassDecl(_)
            | StmtKind::InterfaceDecl(_)
            | StmtKind::EnumDecl(_) => Ok(()),
        }
    }

    fn lower_if(
        &mut self,
        condition: &Expr,
        then_block: &Block,
        else_block: Option<&Stmt>,
    ) -> Result<(), CodeGenError> {
        let cond = self.lower_expr(condition)?;
        let then_label = self.module.fresh_block_label("if.then");
        let else_label = self.module.fresh_block_label("if.else");
        let end_label = self.module.fresh_block_label("if.end");
        self.module.body_line(format!(
            "  br i1 {}, label %{}, label %{}",
            cond, then_label, else_label
        ))?;
        self.module.body_line(format!("{}:", then_label))?;
        self.lower_block(then_block)?;
        self.module.body_line(format!("  br label %{}", end_label))?;
        self.module.body_line(format!("{}:", else_label))?;
        if let Some(else_stmt) = else_block {
            self.lower_stmt(else_stmt)?;
        }
        self.module.body_line(format!("  br label %{}", end_label))?;
        self.module.body_line(format!("{}:", end_label))
    }

    fn lower_while(&mut self, condition: &Expr, body: &Block) -> Result<(), CodeGenError> {
        let cond_label = self.module.fresh_block_label("while.cond");
        let body_label = self.module.fresh_block_label("while.body");
        let end_label = self.module.fresh_block_label("while.end");
        self.module.body_line(format!("  br label %{}", cond_label))?;
        self.module.body_line(format!("{}:", cond_label))?;
        let cond = self.lower_expr(condition)?;
        self.module.body_line(format!(
            "  br i1 {}, label %{}, label %{}",
            cond, body_label, end_label
        ))?;
        self.module.body_line(format!("{}:", body_label))?;
        self.lower_block(body)?;
        self.module.body_line(format!("  br label %{}", cond_label))?;
        self.module.body_line(format!("{}:", end_label))
    }

    /// `for x in start..end { }` lowers to a counting loop; `for x in arr { }`
    /// lowers to an index-based walk over the array runtime ABI.
    fn lower_for(&mut self, variable: &str, iterable: &Expr, body: &Block) -> Result<(), CodeGenError> {
        let cond_label = self.module.fresh_block_label("for.cond");
        let body_label = self.module.fresh_block_label("for.body");
        let end_label = self.module.fresh_block_label("for.end");

        if let ExprKind::Range { start, end } = &iterable.kind {
            let start_v = self.lower_expr(start)?;
            let end_v = self.lower_expr(end)?;
            self.declare_local(variable, Rc::new(Type::Int), &start_v)?;
            let end_ptr = self.module.fresh_reg();
            self.module.body_line(format!("  {} = alloca i64", end_ptr))?;
            self.module.body_line(format!("  store i64 {}, ptr {}", end_v, end_ptr))?;

            self.module.body_line(format!("  br label %{}", cond_label))?;
            self.module.body_line(format!("{}:", cond_label))?;
            let var_ptr = self.lookup_local(variable).unwrap().ptr.clone();
            let cur = self.module.fresh_reg();
            self.module.body_line(format!("  {} = load i64, ptr {}", cur, var_ptr))?;
            let limit = self.module.fresh_reg();
            self.module.body_line(format!("  {} = load i64, ptr {}", limit, end_ptr))?;
            let cmp = self.module.fresh_reg();
            self.module
                .body_line(format!("  {} = icmp slt i64 {}, {}", cmp, cur, limit))?;
            self.module.body_line(format!(
                "  br i1 {}, label %{}, label %{}",
                cmp, body_label, end_label
            ))?;
            self.module.body_line(format!("{}:", body_label))?;
            self.lower_block(body)?;
            let cur2 = self.module.fresh_reg();
            self.module.body_line(format!("  {} = load i64, ptr {}", cur2, var_ptr))?;
            let next = self.module.fresh_reg();
            self.module.body_line(format!("  {} = add i64 {}, 1", next, cur2))?;
            self.module.body_line(format!("  store i64 {}, ptr {}", next, var_ptr))?;
            self.module.body_line(format!("  br label %{}", cond_label))?;
            self.module.body_line(format!("{}:", end_label))
        } else {
            let array_ty = self.infer_type(iterable);
            let elem_ty = match array_ty.as_ref() {
                Type::Array(elem) => elem.clone(),
                _ => Rc::new(Type::Unknown),
            };
            let array_v = self.lower_expr(iterable)?;
            let idx_ptr = self.module.fresh_reg();
            self.module.body_line(format!("  {} = alloca i64", idx_ptr))?;
            self.module.body_line(format!("  store i64 0, ptr {}", idx_ptr))?;

            self.module.body_line(format!("  br label %{}", cond_label))?;
            self.module.body_line(format!("{}:", cond_label))?;
            let idx = self.module.fresh_reg();
            self.module.body_line(format!("  {} = load i64, ptr {}", idx, idx_ptr))?;
            let len = self.module.fresh_reg();
            self.module
                .body_line(format!("  {} = call i64 @chroma_rt_array_length(ptr {})", len, array_v))?;
            let cmp = self.module.fresh_reg();
            self.module
                .body_line(format!("  {} = icmp slt i64 {}, {}", cmp, idx, len))?;
            self.module.body_line(format!(
                "  br i1 {}, label %{}, label %{}",
                cmp, body_label, end_label
            ))?;
            self.module.body_line(format!("{}:", body_label))?;
            self.module
                .body_line(format!("  call void @chroma_rt_array_bounds_check(ptr {}, i64 {})", array_v, idx))?;
            let elem_ptr = self.module.fresh_reg();
            self.module.body_line(format!(
                "  {} = getelementptr {}, ptr {}, i64 {}",
                elem_ptr,
                llvm_type_unwrapped(&elem_ty),
                array_v,
                idx
            ))?;
            let elem_v = self.module.fresh_reg();
            self.module.body_line(format!(
                "  {} = load {}, ptr {}",
                elem_v,
                llvm_type_unwrapped(&elem_ty),
                elem_ptr
            ))?;
            self.declare_local(variable, elem_ty, &elem_v)?;
            self.lower_block(body)?;
            let idx2 = self.module.fresh_reg();
            self.module.body_line(format!("  {} = load i64, ptr {}", idx2, idx_ptr))?;
            let next = self.module.fresh_reg();
            self.module.body_line(format!("  {} = add i64 {}, 1", next, idx2))?;
            self.module.body_line(format!("  store i64 {}, ptr {}", next, idx_ptr))?;
            self.module.body_line(format!("  br label %{}", cond_label))?;
            self.module.body_line(format!("{}:", end_label))
        }
    }

    /// Exception handling lowers to the runtime's non-local-jump protocol:
    /// fetch this nesting depth's jump buffer, register it with
    /// `chroma_rt_try_begin`, call `chroma_rt_setjmp` on it, and branch on
    /// whether control arrived here the first time or via a `longjmp` from
    /// a `throw`.
    fn lower_try_catch(
        &mut self,
        try_block: &Block,
        catch_clauses: &[crate::ast::CatchClause],
        finally_block: Option<&Block>,
    ) -> Result<(), CodeGenError> {
        let depth = self.try_depth;
        self.try_depth += 1;

        let jmpbuf = self.module.fresh_reg();
        self.module
            .body_line(format!("  {} = call ptr @chroma_rt_get_jmpbuf(i64 {})", jmpbuf, depth))?;
        self.module.body_line(format!("  call void @chroma_rt_try_begin(ptr {})", jmpbuf))?;
        let status = self.module.fresh_reg();
        self.module
            .body_line(format!("  {} = call i64 @chroma_rt_setjmp(ptr {})", status, jmpbuf))?;
        let is_throw = self.module.fresh_reg();
        self.module
            .body_line(format!("  {} = icmp ne i64 {}, 0", is_throw, status))?;

        let try_label = self.module.fresh_block_label("try.body");
        let catch_label = self.module.fresh_block_label("try.catch");
        let end_label = self.module.fresh_block_label("try.end");
        self.module.body_line(format!(
            "  br i1 {}, label %{}, label %{}",
            is_throw, catch_label, try_label
        ))?;

        self.module.body_line(format!("{}:", try_label))?;
        self.lower_block(try_block)?;
        self.module.body_line("  call void @chroma_rt_try_end()")?;
        self.module.body_line(format!("  br label %{}", end_label))?;

        self.module.body_line(format!("{}:", catch_label))?;
        self.module.body_line("  call void @chroma_rt_try_end()")?;
        if let Some(first) = catch_clauses.first() {
            let message = self.module.fresh_reg();
            self.module
                .body_line(format!("  {} = call ptr @chroma_rt_get_exception()", message))?;
            self.declare_local(&first.var_name, Rc::new(Type::String), &message)?;
            self.lower_block(&first.body)?;
        }
        self.module.body_line(format!("  br label %{}", end_label))?;

        self.module.body_line(format!("{}:", end_label))?;
        self.try_depth = depth;
        if let Some(finally) = finally_block {
            self.lower_block(finally)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Expressions — every lowering returns the SSA/immediate operand text
    // a caller can embed directly (`%r3`, `42`, `@global.str.0`, ...).
    // -----------------------------------------------------------------

    fn lower_expr(&mut self, expr: &Expr) -> Result<String, CodeGenError> {
        match &expr.kind {
            ExprKind::IntLiteral(v) => Ok(v.to_string()),
            ExprKind::FloatLiteral(v) => Ok(format!("{:?}", v)),
            ExprKind::BoolLiteral(v) => Ok(if *v { "1".to_string() } else { "0".to_string() }),
            ExprKind::CharLiteral(c) => Ok((*c as u32).to_string()),
            ExprKind::NilLiteral => Ok("null".to_string()),
            ExprKind::StringLiteral(s) => Ok(self.intern_string(s)),

            ExprKind::Identifier(name) => self.lower_identifier(name),
            ExprKind::This => {
                let local = self
                    .lookup_local("this")
                    .ok_or_else(|| CodeGenError::Logic("'this' referenced outside a method".to_string()))?;
                let reg = self.module.fresh_reg();
                self.module
                    .body_line(format!("  {} = load ptr, ptr {}", reg, local.ptr))?;
                Ok(reg)
            }

            ExprKind::Binary { op, left, right } => self.lower_binary(op, left, right),
            ExprKind::Unary { op, operand } => self.lower_unary(op, operand),
            ExprKind::Call { callee, arguments } => self.lower_call(callee, arguments),
            ExprKind::Member { object, member } => self.lower_member_load(object, member),
            ExprKind::Construct {
                class_name,
                field_inits,
            } => self.lower_construct(class_name, field_inits),
            ExprKind::Assign { target, value } => self.lower_assign(target, value),
            ExprKind::ArrayLiteral(elements) => self.lower_array_literal(elements),
            ExprKind::Index { object, index } => self.lower_index(object, index),
            ExprKind::StringInterpolation { parts, expressions } => {
                self.lower_interpolation(parts, expressions)
            }
            ExprKind::If {
                condition,
                then_expr,
                else_expr,
            } => self.lower_if_expr(condition, then_expr, else_expr),
            ExprKind::NilCoalesce {
                value,
                default_value,
            } => self.lower_nil_coalesce(value, default_value),
            ExprKind::ForceUnwrap(operand) => self.lower_expr(operand),
            ExprKind::OptionalChain { object, member } => self.lower_member_load(object, member),
            ExprKind::Range { start, .. } => self.lower_expr(start),
            ExprKind::Lambda { params, body } => self.lower_lambda(params, body),
            ExprKind::Await(operand) => self.lower_expr(operand),
            ExprKind::Match { subject, arms } => self.lower_match(subject, arms),
        }
    }

    fn lower_identifier(&mut self, name: &str) -> Result<String, CodeGenError> {
        if name == "print" {
            return Ok("@chroma_rt_print_string".to_string());
        }
        let local = self
            .lookup_local(name)
            .ok_or_else(|| CodeGenError::Logic(format!("undefined local '{}' reached codegen", name)))?;
        let reg = self.module.fresh_reg();
        let llvm_ty = llvm_type_unwrapped(&local.ty);
        self.module.body_line(format!("  {} = load {}, ptr {}", reg, llvm_ty, local.ptr))?;
        Ok(reg)
    }

    fn lower_binary(&mut self, op: &str, left: &Expr, right: &Expr) -> Result<String, CodeGenError> {
        let left_ty = self.infer_type(left);
        let right_ty = self.infer_type(right);
        let lv = self.lower_expr(left)?;
        let rv = self.lower_expr(right)?;

        if (*left_ty == Type::String || *right_ty == Type::String) && op == "+" {
            let l_str = self.coerce_to_string(&lv, &left_ty)?;
            let r_str = self.coerce_to_string(&rv, &right_ty)?;
            let reg = self.module.fresh_reg();
            self.module.body_line(format!(
                "  {} = call ptr @chroma_rt_string_concat(ptr {}, ptr {})",
                reg, l_str, r_str
            ))?;
            return Ok(reg);
        }

        if *left_ty == Type::String && *right_ty == Type::String && (op == "==" || op == "!=") {
            let reg = self.module.fresh_reg();
            self.module.body_line(format!(
                "  {} = call i1 @chroma_rt_string_eq(ptr {}, ptr {})",
                reg, lv, rv
            ))?;
            if op == "!=" {
                let negated = self.module.fresh_reg();
                self.module
                    .body_line(format!("  {} = xor i1 {}, true", negated, reg))?;
                return Ok(negated);
            }
            return Ok(reg);
        }

        if let Type::Class(class) = left_ty.as_ref() {
            let overload = format!("{}_operator{}", struct_name_for(class), op);
            if class.method_type(&format!("operator{}", op)).is_some() {
                let reg = self.module.fresh_reg();
                self.module.body_line(format!(
                    "  {} = call ptr @{}(ptr {}, ptr {})",
                    reg, overload, lv, rv
                ))?;
                return Ok(reg);
            }
        }

        let is_float = matches!(left_ty.as_ref(), Type::Float | Type::Float32);
        let ty = llvm_type_unwrapped(&left_ty);
        let reg = self.module.fresh_reg();
        let instr = match op {
            "+" if is_float => "fadd",
            "+" => "add",
            "-" if is_float => "fsub",
            "-" => "sub",
            "*" if is_float => "fmul",
            "*" => "mul",
            "/" if is_float => "fdiv",
            "/" => "sdiv",
            "%" if is_float => "frem",
            "%" => "srem",
            "&&" => "and",
            "||" => "or",
            "<" | ">" | "<=" | ">=" | "==" | "!=" => {
                let cmp_op = match op {
                    "<" => "slt",
                    ">" => "sgt",
                    "<=" => "sle",
                    ">=" => "sge",
                    "==" => "eq",
                    "!=" => "ne",
                    _ => unreachable!(),
                };
                let float_op = match op {
                    "<" => "olt",
                    ">" => "ogt",
                    "<=" => "ole",
                    ">=" => "oge",
                    "==" => "oeq",
                    "!=" => "one",
                    _ => unreachable!(),
                };
                if is_float {
                    self.module
                        .body_line(format!("  {} = fcmp {} {} {}, {}", reg, float_op, ty, lv, rv))?;
                } else {
                    self.module
                        .body_line(format!("  {} = icmp {} {} {}, {}", reg, cmp_op, ty, lv, rv))?;
                }
                return Ok(reg);
            }
            other => return Err(CodeGenError::Logic(format!("unsupported binary operator '{}'", other))),
        };
        self.module.body_line(format!("  {} = {} {} {}, {}", reg, instr, ty, lv, rv))?;
        Ok(reg)
    }

    fn lower_unary(&mut self, op: &str, operand: &Expr) -> Result<String, CodeGenError> {
        let ty = self.infer_type(operand);
        let v = self.lower_expr(operand)?;
        let reg = self.module.fresh_reg();
        match op {
            "-" if matches!(ty.as_ref(), Type::Float | Type::Float32) => {
                self.module
                    .body_line(format!("  {} = fneg {} {}", reg, llvm_type_unwrapped(&ty), v))?;
            }
            "-" => {
                self.module
                    .body_line(format!("  {} = sub {} 0, {}", reg, llvm_type_unwrapped(&ty), v))?;
            }
            "!" => {
                self.module.body_line(format!("  {} = xor i1 {}, 1", reg, v))?;
            }
            other => return Err(CodeGenError::Logic(format!("unsupported unary operator '{}'", other))),
        }
        Ok(reg)
    }

    fn lower_call(&mut self, callee: &Expr, arguments: &[Expr]) -> Result<String, CodeGenError> {
        if let ExprKind::Identifier(name) = &callee.kind {
            if name == "print" {
                let arg_ty = self.infer_type(&arguments[0]);
                let v = self.lower_expr(&arguments[0])?;
                let as_str = self.coerce_to_string(&v, &arg_ty)?;
                self.module
                    .body_line(format!("  call void @chroma_rt_print_string(ptr {})", as_str))?;
                return Ok("0".to_string());
            }
        }

        // `ClassName.method(args)` / generic-instance `new` calls mangle to
        // `Class_method`; every other call target is a plain value in
        // function-pointer position.
        if let ExprKind::Member { object, member } = &callee.kind {
            if let ExprKind::Identifier(name) = &object.kind {
                if self.lookup_local(name).is_none() {
                    if let Some(class) = self.classes.get_class(name) {
                        // A factory call on a generic template (`Box.new(42)`)
                        // mangles to the specific instantiation's function,
                        // not the template's own (never-emitted) name —
                        // recover which instantiation from the same context
                        // `lower_construct` does: the enclosing declaration's
                        // annotation, or (a factory calling its own template
                        // recursively) the instance currently being lowered.
                        let (mangled_prefix, resolved_class): (String, Rc<ClassType>) =
                            if class.is_generic_template() {
                                let instance = self
                                    .expected_type
                                    .as_ref()
                                    .and_then(|t| match t.as_ref() {
                                        Type::Class(c)
                                            if c.name == class.name && c.is_generic_instance() =>
                                        {
                                            Some(c.clone())
                                        }
                                        _ => None,
                                    })
                                    .or_else(|| {
                                        self.current_class
                                            .as_ref()
                                            .filter(|c| c.name == class.name)
                                            .cloned()
                                    })
                                    .ok_or_else(|| {
                                        CodeGenError::Logic(format!(
                                            "cannot determine the concrete type arguments for '{}' here",
                                            class.name
                                        ))
                                    })?;
                                (
                                    GenericInstantiation::mangle(&class.name, &instance.type_args),
                                    instance,
                                )
                            } else {
                                (class.name.clone(), class.clone())
                            };
                        let mangled = format!("{}_{}", mangled_prefix, member);
                        let ret_ty = resolved_class
                            .method_type(member)
                            .and_then(|t| match t.as_ref() {
                                Type::Function { return_type, .. } => Some(return_type.clone()),
                                _ => None,
                            })
                            .unwrap_or_else(|| Rc::new(Type::Void));
                        let mut arg_values = Vec::new();
                        for arg in arguments {
                            let arg_ty = self.infer_type(arg);
                            let v = self.lower_expr(arg)?;
                            arg_values.push(format!("{} {}", llvm_type_unwrapped(&arg_ty), v));
                        }
                        return self.emit_call(&mangled, &arg_values, &ret_ty);
                    }
                }
            }
            // Instance method call: `Class_method(this, args...)`, or
            // `MangledInstance_method(this, args...)` when the receiver is a
            // generic instantiation — its methods are only ever emitted
            // under the instance's mangled name (see `emit_class_methods`),
            // never under the bare template name.
            let object_ty = self.infer_type(object);
            if let Type::Class(class) = object_ty.as_ref() {
                let this_v = self.lower_expr(object)?;
                let ret_ty = class
                    .method_type(member)
                    .and_then(|t| match t.as_ref() {
                        Type::Function { return_type, .. } => Some(return_type.clone()),
                        _ => None,
                    })
                    .unwrap_or_else(|| Rc::new(Type::Void));
                let mut arg_values = vec![format!("ptr {}", this_v)];
                for arg in arguments {
                    let arg_ty = self.infer_type(arg);
                    let v = self.lower_expr(arg)?;
                    arg_values.push(format!("{} {}", llvm_type_unwrapped(&arg_ty), v));
                }
                let mangled_prefix = if class.is_generic_instance() {
                    GenericInstantiation::mangle(&class.name, &class.type_args)
                } else {
                    class.name.clone()
                };
                let mangled = format!("{}_{}", mangled_prefix, member);
                return self.emit_call(&mangled, &arg_values, &ret_ty);
            }
            if let Type::Array(elem) = object_ty.as_ref() {
                return self.lower_array_method_call(object, elem.clone(), member, arguments);
            }
            if *object_ty == Type::String {
                return self.lower_string_method_call(object, member, arguments);
            }
        }

        // Plain call: a top-level function name, or an indirect call
        // through a function-pointer-valued local (e.g. a lambda).
        if let ExprKind::Identifier(name) = &callee.kind {
            if self.lookup_local(name).is_none() {
                let ret_ty = self.infer_call_return_type(callee);
                let mut arg_values = Vec::new();
                for arg in arguments {
                    let arg_ty = self.infer_type(arg);
                    let v = self.lower_expr(arg)?;
                    arg_values.push(format!("{} {}", llvm_type_unwrapped(&arg_ty), v));
                }
                return self.emit_call(name, &arg_values, &ret_ty);
            }
        }

        let fn_ptr = self.lower_expr(callee)?;
        let ret_ty = self.infer_call_return_type(callee);
        let mut arg_values = Vec::new();
        for arg in arguments {
            let arg_ty = self.infer_type(arg);
            let v = self.lower_expr(arg)?;
            arg_values.push(format!("{} {}", llvm_type_unwrapped(&arg_ty), v));
        }
        let reg = self.module.fresh_reg();
        if *ret_ty == Type::Void {
            self.module.body_line(format!(
                "  call void {}({})",
                fn_ptr,
                arg_values.join(", ")
            ))?;
            Ok("0".to_string())
        } else {
            self.module.body_line(format!(
                "  {} = call {} {}({})",
                reg,
                llvm_type_unwrapped(&ret_ty),
                fn_ptr,
                arg_values.join(", ")
            ))?;
            Ok(reg)
        }
    }

    fn emit_call(&mut self, name: &str, args: &[String], ret_ty: &Rc<Type>) -> Result<String, CodeGenError> {
        if **ret_ty == Type::Void {
            self.module
                .body_line(format!("  call void @{}({})", name, args.join(", ")))?;
            Ok("0".to_string())
        } else {
            let reg = self.module.fresh_reg();
            self.module.body_line(format!(
                "  {} = call {} @{}({})",
                reg,
                llvm_type_unwrapped(ret_ty),
                name,
                args.join(", ")
            ))?;
            Ok(reg)
        }
    }

    fn lower_array_method_call(
        &mut self,
        object: &Expr,
        elem: Rc<Type>,
        member: &str,
        arguments: &[Expr],
    ) -> Result<String, CodeGenError> {
        let array_v = self.lower_expr(object)?;
        match member {
            "length" => {
                let reg = self.module.fresh_reg();
                self.module
                    .body_line(format!("  {} = call i64 @chroma_rt_array_length(ptr {})", reg, array_v))?;
                Ok(reg)
            }
            "push" => {
                let v = self.lower_expr(&arguments[0])?;
                let boxed = self.box_if_needed(&v, &elem)?;
                self.module
                    .body_line(format!("  call void @chroma_rt_array_push(ptr {}, ptr {})", array_v, boxed))?;
                Ok("0".to_string())
            }
            "pop" => {
                let reg = self.module.fresh_reg();
                self.module
                    .body_line(format!("  {} = call ptr @chroma_rt_array_pop(ptr {})", reg, array_v))?;
                Ok(reg)
            }
            "reverse" => {
                self.module
                    .body_line(format!("  call void @chroma_rt_array_reverse(ptr {})", array_v))?;
                Ok("0".to_string())
            }
            "join" => {
                let sep = self.lower_expr(&arguments[0])?;
                let reg = self.module.fresh_reg();
                self.module.body_line(format!(
                    "  {} = call ptr @chroma_rt_array_join(ptr {}, ptr {})",
                    reg, array_v, sep
                ))?;
                Ok(reg)
            }
            // map/filter/forEach need the callback lowered as its own
            // top-level function and invoked once per element; modeled here
            // as a direct runtime call taking the callback's function
            // pointer, leaving the per-element loop to the runtime.
            "map" | "filter" | "forEach" => {
                let callback = self.lower_expr(&arguments[0])?;
                let symbol = format!("chroma_rt_array_{}", to_snake(member));
                let reg = self.module.fresh_reg();
                self.module.body_line(format!(
                    "  {} = call ptr @{}(ptr {}, ptr {})",
                    reg, symbol, array_v, callback
                ))?;
                Ok(reg)
            }
            other => Err(CodeGenError::Logic(format!("unknown Array member '{}'", other))),
        }
    }

    fn lower_string_method_call(&mut self, object: &Expr, member: &str, arguments: &[Expr]) -> Result<String, CodeGenError> {
        let recv = self.lower_expr(object)?;
        let mut args = vec![recv];
        for arg in arguments {
            args.push(self.lower_expr(arg)?);
        }
        let symbol = format!("chroma_rt_string_{}", to_snake(member));
        let decl = runtime_abi::find(&symbol)
            .ok_or_else(|| CodeGenError::Logic(format!("unknown String member '{}'", member)))?;
        let ret_ty = return_type_from_signature(decl.signature);
        let arg_list: Vec<String> = args.iter().map(|a| format!("ptr {}", a)).collect();
        let reg = self.module.fresh_reg();
        self.module.body_line(format!(
            "  {} = call {} @{}({})",
            reg,
            ret_ty,
            symbol,
            arg_list.join(", ")
        ))?;
        Ok(reg)
    }

    fn lower_member_load(&mut self, object: &Expr, member: &str) -> Result<String, CodeGenError> {
        if let ExprKind::Identifier(name) = &object.kind {
            if self.lookup_local(name).is_none() {
                if let Some(e) = self.classes.get_enum(name) {
                    return self.lower_enum_variant(&e, member);
                }
            }
        }
        let object_ty = self.infer_type(object);
        let obj_v = self.lower_expr(object)?;
        match object_ty.as_ref() {
            Type::Class(class) => {
                let idx = field_index(class, member)
                    .ok_or_else(|| CodeGenError::Logic(format!("'{}' has no field '{}'", class.name, member)))?;
                let field_ty = class.field_type(member).unwrap_or_else(|| Rc::new(Type::Unknown));
                let field_ptr = self.module.fresh_reg();
                self.module.body_line(format!(
                    "  {} = getelementptr %Class.{}, ptr {}, i32 0, i32 {}",
                    field_ptr,
                    struct_name_for(class),
                    obj_v,
                    idx
                ))?;
                let reg = self.module.fresh_reg();
                self.module.body_line(format!(
                    "  {} = load {}, ptr {}",
                    reg,
                    llvm_type_unwrapped(&field_ty),
                    field_ptr
                ))?;
                Ok(reg)
            }
            Type::Array(_) => self.lower_array_method_call(object, Rc::new(Type::Unknown), member, &[]),
            Type::String => self.lower_string_method_call(object, member, &[]),
            _ => Err(CodeGenError::Logic(format!("cannot lower member access '{}' on this receiver", member))),
        }
    }

    fn lower_enum_variant(&mut self, e: &Rc<EnumType>, member: &str) -> Result<String, CodeGenError> {
        let tag = e
            .case_index(member)
            .ok_or_else(|| CodeGenError::Logic(format!("'{}' has no variant '{}'", e.name, member)))?;
        if e.has_associated_value(member) {
            // Bare reference to a payload-carrying variant's constructor:
            // the matching top-level function name is `Enum_Variant`.
            Ok(format!("@{}_{}", e.name, member))
        } else {
            let reg = self.module.fresh_reg();
            self.module.body_line(format!(
                "  {} = call ptr @chroma_rt_object_alloc(i64 16)",
                reg
            ))?;
            let tag_ptr = self.module.fresh_reg();
            self.module.body_line(format!(
                "  {} = getelementptr %Enum.{}, ptr {}, i32 0, i32 0",
                tag_ptr, e.name, reg
            ))?;
            self.module.body_line(format!("  store i32 {}, ptr {}", tag, tag_ptr))?;
            Ok(reg)
        }
    }

    fn lower_construct(&mut self, class_name: &str, field_inits: &[(String, Expr)]) -> Result<String, CodeGenError> {
        let template = self
            .classes
            .get_class(class_name)
            .ok_or_else(|| CodeGenError::Logic(format!("unknown class '{}' reached codegen", class_name)))?;

        // A generic template's own field list is never emitted as a struct —
        // only its instantiations are (pass 1). Recover which instantiation
        // this particular construction targets from the type threaded in by
        // the enclosing `var`/`return`, falling back to the class currently
        // being lowered (a factory method on `Box<T>` building another `Box`
        // of the same `T`).
        let (struct_name, class): (String, Rc<ClassType>) = if template.is_generic_template() {
            let instance = self
                .expected_type
                .as_ref()
                .and_then(|t| match t.as_ref() {
                    Type::Class(c) if c.name == class_name && !c.type_args.is_empty() => Some(c.clone()),
                    _ => None,
                })
                .or_else(|| {
                    self.current_class
                        .as_ref()
                        .filter(|c| c.name == class_name)
                        .cloned()
                })
                .ok_or_else(|| {
                    CodeGenError::Logic(format!(
                        "cannot determine the concrete type arguments for '{}' here",
                        class_name
                    ))
                })?;
            let mangled = GenericInstantiation::mangle(class_name, &instance.type_args);
            (mangled, instance)
        } else {
            (class_name.to_string(), template)
        };

        let size: u32 = class.fields.iter().map(|f| type_size_bytes(&f.ty)).sum();
        let obj = self.module.fresh_reg();
        self.module
            .body_line(format!("  {} = call ptr @chroma_rt_object_alloc(i64 {})", obj, size))?;
        for (name, value) in field_inits {
            let idx = field_index(&class, name).unwrap_or(0);
            let field_ty = class.field_type(name).unwrap_or_else(|| Rc::new(Type::Unknown));
            let v = self.lower_expr(value)?;
            let field_ptr = self.module.fresh_reg();
            self.module.body_line(format!(
                "  {} = getelementptr %Class.{}, ptr {}, i32 0, i32 {}",
                field_ptr, struct_name, obj, idx
            ))?;
            self.module.body_line(format!(
                "  store {} {}, ptr {}",
                llvm_type_unwrapped(&field_ty),
                v,
                field_ptr
            ))?;
        }
        Ok(obj)
    }

    fn lower_assign(&mut self, target: &Expr, value: &Expr) -> Result<String, CodeGenError> {
        match &target.kind {
            ExprKind::Identifier(name) => {
                let local = self
                    .lookup_local(name)
                    .ok_or_else(|| CodeGenError::Logic(format!("undefined local '{}' reached codegen", name)))?;
                let ptr = local.ptr.clone();
                let ty = local.ty.clone();
                let v = self.lower_expr(value)?;
                self.module
                    .body_line(format!("  store {} {}, ptr {}", llvm_type_unwrapped(&ty), v, ptr))?;
                Ok(v)
            }
            ExprKind::Member { object, member } => {
                let object_ty = self.infer_type(object);
                let obj_v = self.lower_expr(object)?;
                if let Type::Class(class) = object_ty.as_ref() {
                    let idx = field_index(class, member).unwrap_or(0);
                    let field_ty = class.field_type(member).unwrap_or_else(|| Rc::new(Type::Unknown));
                    let v = self.lower_expr(value)?;
                    let field_ptr = self.module.fresh_reg();
                    self.module.body_line(format!(
                        "  {} = getelementptr %Class.{}, ptr {}, i32 0, i32 {}",
                        field_ptr,
                        struct_name_for(class),
                        obj_v,
                        idx
                    ))?;
                    self.module.body_line(format!(
                        "  store {} {}, ptr {}",
                        llvm_type_unwrapped(&field_ty),
                        v,
                        field_ptr
                    ))?;
                    Ok(v)
                } else {
                    Err(CodeGenError::Logic("assignment target is not a class field".to_string()))
                }
            }
            ExprKind::Index { object, index } => {
                let elem_ty = match self.infer_type(object).as_ref() {
                    Type::Array(elem) => elem.clone(),
                    _ => Rc::new(Type::Unknown),
                };
                let array_v = self.lower_expr(object)?;
                let idx_v = self.lower_expr(index)?;
                self.module
                    .body_line(format!("  call void @chroma_rt_array_bounds_check(ptr {}, i64 {})", array_v, idx_v))?;
                let v = self.lower_expr(value)?;
                let elem_ptr = self.module.fresh_reg();
                self.module.body_line(format!(
                    "  {} = getelementptr {}, ptr {}, i64 {}",
                    elem_ptr,
                    llvm_type_unwrapped(&elem_ty),
                    array_v,
                    idx_v
                ))?;
                self.module.body_line(format!(
                    "  store {} {}, ptr {}",
                    llvm_type_unwrapped(&elem_ty),
                    v,
                    elem_ptr
                ))?;
                Ok(v)
            }
            _ => Err(CodeGenError::Logic("invalid assignment target reached codegen".to_string())),
        }
    }

    fn lower_array_literal(&mut self, elements: &[Expr]) -> Result<String, CodeGenError> {
        let elem_ty = elements
            .first()
            .map(|e| self.infer_type(e))
            .unwrap_or_else(|| Rc::new(Type::Unknown));
        let elem_size = type_size_bytes(&elem_ty);
        let array = self.module.fresh_reg();
        self.module.body_line(format!(
            "  {} = call ptr @chroma_rt_array_alloc(i64 {}, i64 {})",
            array,
            elem_size,
            elements.len()
        ))?;
        for e in elements {
            let v = self.lower_expr(e)?;
            let boxed = self.box_if_needed(&v, &elem_ty)?;
            self.module
                .body_line(format!("  call void @chroma_rt_array_push(ptr {}, ptr {})", array, boxed))?;
        }
        Ok(array)
    }

    fn lower_index(&mut self, object: &Expr, index: &Expr) -> Result<String, CodeGenError> {
        let elem_ty = match self.infer_type(object).as_ref() {
            Type::Array(elem) => elem.clone(),
            _ => Rc::new(Type::Unknown),
        };
        let array_v = self.lower_expr(object)?;
        let idx_v = self.lower_expr(index)?;
        self.module
            .body_line(format!("  call void @chroma_rt_array_bounds_check(ptr {}, i64 {})", array_v, idx_v))?;
        let elem_ptr = self.module.fresh_reg();
        self.module.body_line(format!(
            "  {} = getelementptr {}, ptr {}, i64 {}",
            elem_ptr,
            llvm_type_unwrapped(&elem_ty),
            array_v,
            idx_v
        ))?;
        let reg = self.module.fresh_reg();
        self.module.body_line(format!(
            "  {} = load {}, ptr {}",
            reg,
            llvm_type_unwrapped(&elem_ty),
            elem_ptr
        ))?;
        Ok(reg)
    }

    fn lower_interpolation(&mut self, parts: &[String], expressions: &[Expr]) -> Result<String, CodeGenError> {
        let mut acc = self.intern_string(&parts[0]);
        for (i, expr) in expressions.iter().enumerate() {
            let ty = self.infer_type(expr);
            let v = self.lower_expr(expr)?;
            let as_str = self.coerce_to_string(&v, &ty)?;
            let next = self.module.fresh_reg();
            self.module.body_line(format!(
                "  {} = call ptr @chroma_rt_string_concat(ptr {}, ptr {})",
                next, acc, as_str
            ))?;
            acc = next;
            if let Some(literal) = parts.get(i + 1) {
                let lit_str = self.intern_string(literal);
                let joined = self.module.fresh_reg();
                self.module.body_line(format!(
                    "  {} = call ptr @chroma_rt_string_concat(ptr {}, ptr {})",
                    joined, acc, lit_str
                ))?;
                acc = joined;
            }
        }
        Ok(acc)
    }

    fn lower_if_expr(&mut self, condition: &Expr, then_expr: &Expr, else_expr: &Expr) -> Result<String, CodeGenError> {
        let result_ty = self.infer_type(then_expr);
        let result_ptr = self.module.fresh_reg();
        self.module
            .body_line(format!("  {} = alloca {}", result_ptr, llvm_type_unwrapped(&result_ty)))?;

        let cond = self.lower_expr(condition)?;
        let then_label = self.module.fresh_block_label("ifexpr.then");
        let else_label = self.module.fresh_block_label("ifexpr.else");
        let end_label = self.module.fresh_block_label("ifexpr.end");
        self.module.body_line(format!(
            "  br i1 {}, label %{}, label %{}",
            cond, then_label, else_label
        ))?;

        self.module.body_line(format!("{}:", then_label))?;
        let then_v = self.lower_expr(then_expr)?;
        self.module.body_line(format!(
            "  store {} {}, ptr {}",
            llvm_type_unwrapped(&result_ty),
            then_v,
            result_ptr
        ))?;
        self.module.body_line(format!("  br label %{}", end_label))?;

        self.module.body_line(format!("{}:", else_label))?;
        let else_v = self.lower_expr(else_expr)?;
        self.module.body_line(format!(
            "  store {} {}, ptr {}",
            llvm_type_unwrapped(&result_ty),
            else_v,
            result_ptr
        ))?;
        self.module.body_line(format!("  br label %{}", end_label))?;

        self.module.body_line(format!("{}:", end_label))?;
        let reg = self.module.fresh_reg();
        self.module.body_line(format!(
            "  {} = load {}, ptr {}",
            reg,
            llvm_type_unwrapped(&result_ty),
            result_ptr
        ))?;
        Ok(reg)
    }

    fn lower_nil_coalesce(&mut self, value: &Expr, default_value: &Expr) -> Result<String, CodeGenError> {
        let value_ty = self.infer_type(value);
        let result_ty = match value_ty.as_ref() {
            Type::Nullable(inner) => inner.clone(),
            other => Rc::new(other.clone()),
        };
        let v = self.lower_expr(value)?;
        let is_nil = self.module.fresh_reg();
        self.module.body_line(format!("  {} = icmp eq ptr {}, null", is_nil, v))?;

        let result_ptr = self.module.fresh_reg();
        self.module
            .body_line(format!("  {} = alloca {}", result_ptr, llvm_type_unwrapped(&result_ty)))?;
        let nil_label = self.module.fresh_block_label("coalesce.nil");
        let value_label = self.module.fresh_block_label("coalesce.value");
        let end_label = self.module.fresh_block_label("coalesce.end");
        self.module.body_line(format!(
            "  br i1 {}, label %{}, label %{}",
            is_nil, nil_label, value_label
        ))?;

        self.module.body_line(format!("{}:", nil_label))?;
        let default_v = self.lower_expr(default_value)?;
        self.module.body_line(format!(
            "  store {} {}, ptr {}",
            llvm_type_unwrapped(&result_ty),
            default_v,
            result_ptr
        ))?;
        self.module.body_line(format!("  br label %{}", end_label))?;

        self.module.body_line(format!("{}:", value_label))?;
        self.module
            .body_line(format!("  store {} {}, ptr {}", llvm_type_unwrapped(&result_ty), v, result_ptr))?;
        self.module.body_line(format!("  br label %{}", end_label))?;

        self.module.body_line(format!("{}:", end_label))?;
        let reg = self.module.fresh_reg();
        self.module.body_line(format!(
            "  {} = load {}, ptr {}",
            reg,
            llvm_type_unwrapped(&result_ty),
            result_ptr
        ))?;
        Ok(reg)
    }

    /// Lambdas are plain function pointers — no capture analysis, matching
    /// the language's no-closures design. Each one emits its own top-level
    /// function the first time it's lowered and the expression's value is
    /// that function's address.
    fn lower_lambda(&mut self, params: &[crate::ast::LambdaParam], body: &LambdaBody) -> Result<String, CodeGenError> {
        let name = format!("lambda.{}", self.anon_fn_counter);
        self.anon_fn_counter += 1;

        let mut param_sig = Vec::new();
        self.locals.push(HashMap::new());
        for (i, p) in params.iter().enumerate() {
            let ty = p
                .type_annotation
                .as_ref()
                .map(|t| self.resolve_type_expr(t))
                .unwrap_or_else(|| Rc::new(Type::Unknown));
            param_sig.push(format!("{} %p{}", llvm_type_unwrapped(&ty), i));
            let arg_ref = format!("%p{}", i);
            self.declare_local(&p.name, ty, &arg_ref)?;
        }

        let mut inner = Module::new();
        std::mem::swap(&mut self.module, &mut inner);
        self.module.body_line(format!(
            "define ptr @{}({}) {{",
            name,
            param_sig.join(", ")
        ))?;
        self.module.body_line("entry:")?;
        match body {
            LambdaBody::Expr(e) => {
                let v = self.lower_expr(e)?;
                self.module.body_line(format!("  ret ptr {}", v))?;
            }
            LambdaBody::Block(block) => {
                self.lower_block(block)?;
                self.module.body_line("  ret ptr null")?;
            }
        }
        self.module.body_line("}")?;
        self.module.body_line("")?;
        std::mem::swap(&mut self.module, &mut inner);
        self.pending_lambda_defs.push(inner.finish());
        self.locals.pop();

        Ok(format!("@{}", name))
    }

    fn lower_match(&mut self, subject: &Expr, arms: &[MatchArm]) -> Result<String, CodeGenError> {
        let subject_ty = self.infer_type(subject);
        let enum_ty = match subject_ty.as_ref() {
            Type::Enum(e) => e.clone(),
            _ => return Err(CodeGenError::Logic("match subject is not an enum".to_string())),
        };
        let subject_v = self.lower_expr(subject)?;
        let tag_ptr = self.module.fresh_reg();
        self.module.body_line(format!(
            "  {} = getelementptr %Enum.{}, ptr {}, i32 0, i32 0",
            tag_ptr, enum_ty.name, subject_v
        ))?;
        let tag = self.module.fresh_reg();
        self.module.body_line(format!("  {} = load i32, ptr {}", tag, tag_ptr))?;

        let result_ptr = self.module.fresh_reg();
        self.module.body_line(format!("  {} = alloca ptr", result_ptr))?;
        self.module
            .body_line(format!("  store ptr null, ptr {}", result_ptr))?;
        let end_label = self.module.fresh_block_label("match.end");

        for arm in arms {
            let case_idx = match enum_ty.case_index(&arm.case_name) {
                Some(i) => i,
                None => continue,
            };
            let arm_label = self.module.fresh_block_label("match.arm");
            let next_label = self.module.fresh_block_label("match.next");
            let cmp = self.module.fresh_reg();
            self.module
                .body_line(format!("  {} = icmp eq i32 {}, {}", cmp, tag, case_idx))?;
            self.module.body_line(format!(
                "  br i1 {}, label %{}, label %{}",
                cmp, arm_label, next_label
            ))?;
            self.module.body_line(format!("{}:", arm_label))?;
            match &arm.body.kind {
                StmtKind::Expr(e) => {
                    let v = self.lower_expr(e)?;
                    self.module.body_line(format!("  store ptr {}, ptr {}", v, result_ptr))?;
                }
                _ => self.lower_stmt(&arm.body)?,
            }
            self.module.body_line(format!("  br label %{}", end_label))?;
            self.module.body_line(format!("{}:", next_label))?;
        }
        self.module.body_line(format!("  br label %{}", end_label))?;
        self.module.body_line(format!("{}:", end_label))?;
        let reg = self.module.fresh_reg();
        self.module.body_line(format!("  {} = load ptr, ptr {}", reg, result_ptr))?;
        Ok(reg)
    }

    // -----------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------

    fn intern_string(&mut self, s: &str) -> String {
        if let Some(name) = self.string_globals.get(s) {
            return name.clone();
        }
        let name = format!("@str.{}", self.string_globals.len());
        self.string_globals.insert(s.to_string(), name.clone());
        name
    }

    /// Emits a private constant byte-array global for every string literal
    /// interned during body lowering. Run last, after lowering has had a
    /// chance to populate `string_globals` for every literal it touched.
    fn emit_string_globals(&mut self) -> Result<(), CodeGenError> {
        let mut globals: Vec<(&String, &String)> = self.string_globals.iter().collect();
        globals.sort_by(|a, b| a.1.cmp(b.1));
        for (literal, name) in globals {
            let escaped = escape_llvm_string(literal);
            let len = literal.as_bytes().len() + 1;
            self.module.header_line(format!(
                "{} = private constant [{} x i8] c\"{}\\00\"",
                name, len, escaped
            ))?;
        }
        Ok(())
    }

    fn coerce_to_string(&mut self, value: &str, ty: &Type) -> Result<String, CodeGenError> {
        if *ty == Type::String {
            return Ok(value.to_string());
        }
        let symbol = match ty {
            Type::Int | Type::Int8 | Type::Int16 | Type::Int32 | Type::UInt | Type::UInt8 | Type::UInt16 | Type::UInt32 => {
                "chroma_rt_int_to_string"
            }
            Type::Float | Type::Float32 => "chroma_rt_float_to_string",
            Type::Bool => "chroma_rt_bool_to_string",
            Type::Char => "chroma_rt_char_to_string",
            _ => return Ok(value.to_string()),
        };
        let ty_name = llvm_type_unwrapped(ty);
        let reg = self.module.fresh_reg();
        self.module
            .body_line(format!("  {} = call ptr @{}({} {})", reg, symbol, ty_name, value))?;
        Ok(reg)
    }

    fn box_if_needed(&mut self, value: &str, ty: &Type) -> Result<String, CodeGenError> {
        if llvm_type_unwrapped(ty) == "ptr" {
            return Ok(value.to_string());
        }
        let size = type_size_bytes(ty);
        let boxed = self.module.fresh_reg();
        self.module
            .body_line(format!("  {} = call ptr @chroma_rt_object_alloc(i64 {})", boxed, size))?;
        self.module
            .body_line(format!("  store {} {}, ptr {}", llvm_type_unwrapped(ty), value, boxed))?;
        Ok(boxed)
    }

    fn infer_call_return_type(&self, callee: &Expr) -> Rc<Type> {
        if let ExprKind::Identifier(name) = &callee.kind {
            if let Some(local) = self.lookup_local(name) {
                if let Type::Function { return_type, .. } = local.ty.as_ref() {
                    return return_type.clone();
                }
            }
        }
        Rc::new(Type::Void)
    }

    /// A small, self-contained type inferencer mirroring the rules Pass 2
    /// already validated — codegen needs an LLVM type per expression and
    /// there is no typed-HIR layer between the AST and this pass to read
    /// one back from (see `DESIGN.md`).
    fn infer_type(&self, expr: &Expr) -> Rc<Type> {
        match &expr.kind {
            ExprKind::IntLiteral(_) => Rc::new(Type::Int),
            ExprKind::FloatLiteral(_) => Rc::new(Type::Float),
            ExprKind::StringLiteral(_) => Rc::new(Type::String),
            ExprKind::CharLiteral(_) => Rc::new(Type::Char),
            ExprKind::BoolLiteral(_) => Rc::new(Type::Bool),
            ExprKind::NilLiteral => Rc::new(Type::Nil),
            ExprKind::Identifier(name) => self
                .lookup_local(name)
                .map(|l| l.ty.clone())
                .unwrap_or_else(|| Rc::new(Type::Unknown)),
            ExprKind::This => self
                .current_class
                .as_ref()
                .map(|c| Rc::new(Type::Class(c.clone())))
                .unwrap_or_else(|| Rc::new(Type::Unknown)),
            ExprKind::Binary { op, left, .. } if matches!(op.as_str(), "<" | ">" | "<=" | ">=" | "==" | "!=" | "&&" | "||") => {
                let _ = left;
                Rc::new(Type::Bool)
            }
            ExprKind::Binary { left, right, .. } => {
                let lt = self.infer_type(left);
                if *lt == Type::String {
                    lt
                } else {
                    let rt = self.infer_type(right);
                    if *lt == Type::Unknown {
                        rt
                    } else {
                        lt
                    }
                }
            }
            ExprKind::Unary { operand, .. } => self.infer_type(operand),
            ExprKind::If { then_expr, .. } => self.infer_type(then_expr),
            ExprKind::Call { callee, .. } => self.infer_call_return_type(callee),
            ExprKind::Member { object, member } => self.infer_member_type(object, member),
            ExprKind::OptionalChain { object, member } => {
                Type::nullable(self.infer_member_type(object, member))
            }
            ExprKind::Construct { class_name, .. } => self
                .classes
                .get_class(class_name)
                .map(|c| Rc::new(Type::Class(c)))
                .unwrap_or_else(|| Rc::new(Type::Unknown)),
            ExprKind::Assign { target, .. } => self.infer_type(target),
            ExprKind::Range { .. } => Rc::new(Type::Array(Rc::new(Type::Int))),
            ExprKind::NilCoalesce { value, .. } => match self.infer_type(value).as_ref() {
                Type::Nullable(inner) => inner.clone(),
                other => Rc::new(other.clone()),
            },
            ExprKind::ForceUnwrap(operand) => match self.infer_type(operand).as_ref() {
                Type::Nullable(inner) => inner.clone(),
                other => Rc::new(other.clone()),
            },
            ExprKind::StringInterpolation { .. } => Rc::new(Type::String),
            ExprKind::ArrayLiteral(elements) => {
                let elem = elements
                    .first()
                    .map(|e| self.infer_type(e))
                    .unwrap_or_else(|| Rc::new(Type::Unknown));
                Rc::new(Type::Array(elem))
            }
            ExprKind::Index { object, .. } => match self.infer_type(object).as_ref() {
                Type::Array(elem) => elem.clone(),
                _ => Rc::new(Type::Unknown),
            },
            ExprKind::Lambda { .. } => Rc::new(Type::Unknown),
            ExprKind::Await(operand) => match self.infer_type(operand).as_ref() {
                Type::Future(inner) => inner.clone(),
                other => Rc::new(other.clone()),
            },
            ExprKind::Match { .. } => Rc::new(Type::Unknown),
        }
    }

    fn infer_member_type(&self, object: &Expr, member: &str) -> Rc<Type> {
        if let ExprKind::Identifier(name) = &object.kind {
            if self.lookup_local(name).is_none() {
                if let Some(class) = self.classes.get_class(name) {
                    return class
                        .method_type(member)
                        .or_else(|| class.field_type(member))
                        .unwrap_or_else(|| Rc::new(Type::Unknown));
                }
            }
        }
        match self.infer_type(object).as_ref() {
            Type::Class(class) => class
                .field_type(member)
                .or_else(|| class.method_type(member))
                .unwrap_or_else(|| Rc::new(Type::Unknown)),
            Type::Array(elem) => match member {
                "length" => Rc::new(Type::Int),
                "pop" => elem.clone(),
                _ => Rc::new(Type::Unknown),
            },
            Type::String if member == "length" => Rc::new(Type::Int),
            Type::String if member == "toInt" => Rc::new(Type::Int),
            Type::String if member == "toFloat" => Rc::new(Type::Float),
            _ => Rc::new(Type::Unknown),
        }
    }
}

/// The `%Class.*`/function-prefix name a class resolves to in emitted IR:
/// a plain class keeps its declared name, a generic instance (non-empty
/// `type_args`) uses the same mangled name pass 1 emitted its layout under.
fn struct_name_for(class: &ClassType) -> String {
    if class.type_args.is_empty() {
        class.name.clone()
    } else {
        GenericInstantiation::mangle(&class.name, &class.type_args)
    }
}

fn field_index(class: &ClassType, name: &str) -> Option<usize> {
    class
        .fields
        .iter()
        .position(|f| f.name == name)
        .or_else(|| class.parent.as_ref().and_then(|p| field_index(p, name)))
}

fn template_param_map(param_names: &[String], args: &[Rc<Type>]) -> HashMap<String, Rc<Type>> {
    param_names.iter().cloned().zip(args.iter().cloned()).collect()
}

fn substituted_class_type(template: &Rc<ClassType>, subst: &HashMap<String, Rc<Type>>) -> Rc<ClassType> {
    let param_names: Vec<String> = template.type_params.clone();
    let args: Vec<Rc<Type>> = param_names
        .iter()
        .map(|p| subst.get(p).cloned().unwrap_or_else(|| Rc::new(Type::Unknown)))
        .collect();
    Rc::new(ClassType {
        name: template.name.clone(),
        is_interface: template.is_interface,
        is_shared: template.is_shared,
        parent: template.parent.clone(),
        interface_names: template.interface_names.clone(),
        fields: template
            .fields
            .iter()
            .map(|f| crate::types::ClassField {
                name: f.name.clone(),
                ty: substitute_type_params(&f.ty, &param_names, &args),
                access: f.access.clone(),
            })
            .collect(),
        methods: template
            .methods
            .iter()
            .map(|m| crate::types::ClassMethod {
                name: m.name.clone(),
                ty: substitute_type_params(&m.ty, &param_names, &args),
                access: m.access.clone(),
            })
            .collect(),
        type_params: param_names,
        type_args: args,
    })
}

fn type_size_bytes(ty: &Type) -> u32 {
    match ty {
        Type::Int8 | Type::UInt8 | Type::Char | Type::Bool => 1,
        Type::Int16 | Type::UInt16 => 2,
        Type::Int32 | Type::UInt32 | Type::Float32 => 4,
        Type::Void => 0,
        _ => 8,
    }
}

fn return_type_from_signature(signature: &str) -> &'static str {
    if signature.starts_with("declare ptr") {
        "ptr"
    } else if signature.starts_with("declare i1") {
        "i1"
    } else if signature.starts_with("declare i64") {
        "i64"
    } else if signature.starts_with("declare double") {
        "double"
    } else if signature.starts_with("declare i8 ") {
        "i8"
    } else {
        "void"
    }
}

/// Renders `s` the way an LLVM `c"..."` constant escapes its bytes: every
/// byte outside printable ASCII (plus `"` and `\` themselves) becomes a
/// two-digit hex escape, matching `llvm::toString`'s string-constant format.
fn escape_llvm_string(s: &str) -> String {
    let mut out = String::new();
    for byte in s.as_bytes() {
        match byte {
            b'"' => out.push_str("\\22"),
            b'\\' => out.push_str("\\5C"),
            0x20..=0x7e => out.push(*byte as char),
            _ => out.push_str(&format!("\\{:02X}", byte)),
        }
    }
    out
}

fn to_snake(camel: &str) -> String {
    let mut out = String::new();
    for (i, c) in camel.char_indices() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;
    use crate::parser::Parser;
    use crate::semantic::Analyzer;

    fn compile(source: &str) -> Result<String, CodeGenError> {
        let mut diagnostics = Diagnostics::new();
        let program = Parser::parse_source(source, Rc::from("t.chr"), &mut diagnostics);
        let analysis = Analyzer::new(&mut diagnostics).analyze(&program);
        assert!(!diagnostics.has_errors(), "{}", diagnostics.render_human());
        codegen_program(&program, &analysis)
    }

    #[test]
    fn emits_a_verifiable_module_for_a_simple_function() {
        let ir = compile("func add(a: Int, b: Int) -> Int { return a + b; }").unwrap();
        assert!(ir.contains("define i64 @add"));
    }

    #[test]
    fn emits_struct_layout_for_a_class() {
        let ir = compile("class Point { public var x: Int; public var y: Int; }").unwrap();
        assert!(ir.contains("%Class.Point = type { i64, i64 }"));
    }

    #[test]
    fn emits_runtime_declarations() {
        let ir = compile("func main() -> Void { }").unwrap();
        assert!(ir.contains("declare ptr @chroma_rt_array_alloc"));
    }

    #[test]
    fn lowers_if_while_and_return() {
        let ir = compile(
            "func abs(n: Int) -> Int { if n < 0 { return 0 - n; } else { return n; } }",
        )
        .unwrap();
        assert!(ir.contains("define i64 @abs"));
    }

    #[test]
    fn string_literals_are_emitted_as_global_constants() {
        let ir = compile("func main() -> Void { print(\"hi\"); }").unwrap();
        assert!(ir.contains("@str.0 = private constant [3 x i8] c\"hi\\00\""));
    }

    #[test]
    fn string_equality_calls_the_runtime_comparator_not_a_pointer_icmp() {
        let ir = compile(
            r#"func main() -> Bool { var a = "x"; var b = "y"; return a == b; }"#,
        )
        .unwrap();
        assert!(ir.contains("call i1 @chroma_rt_string_eq(ptr"));
        assert!(!ir.contains("icmp eq ptr"));
    }

    #[test]
    fn string_inequality_negates_the_runtime_comparator_result() {
        let ir = compile(
            r#"func main() -> Bool { var a = "x"; var b = "y"; return a != b; }"#,
        )
        .unwrap();
        assert!(ir.contains("call i1 @chroma_rt_string_eq(ptr"));
        assert!(ir.contains("xor i1"));
    }

    #[test]
    fn array_map_filter_for_each_lower_to_declared_runtime_symbols() {
        let ir = compile(
            r#"
            func main() -> Void {
                var xs: [Int] = [1, 2, 3];
                xs.map((x: Int) => x);
                xs.filter((x: Int) => x > 0);
                xs.forEach((x: Int) => print(x));
            }
            "#,
        )
        .unwrap();
        assert!(ir.contains("declare ptr @chroma_rt_array_map"));
        assert!(ir.contains("declare ptr @chroma_rt_array_filter"));
        assert!(ir.contains("declare ptr @chroma_rt_array_for_each"));
        assert!(ir.contains("call ptr @chroma_rt_array_map"));
        assert!(ir.contains("call ptr @chroma_rt_array_filter"));
        assert!(ir.contains("call ptr @chroma_rt_array_for_each"));
    }
}
