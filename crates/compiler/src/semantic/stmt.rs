//! Pass 2, statement half: walks every function and method body, opening and
//! closing scopes as blocks are entered and left, and delegates to `expr.rs`
//! for the type of any expression it meets along the way.

use std::rc::Rc;

use crate::ast::{CatchClause, FuncDecl, Program, Stmt, StmtKind, VarDecl};
use crate::diagnostics::{codes, Diagnostic};
use crate::source::Span;
use crate::symbols::SymbolInfo;
use crate::types::{is_assignable, Type};

use super::{Analyzer, MAX_TRY_DEPTH};

impl<'a> Analyzer<'a> {
    /// Pass 2 entry point: type-checks every top-level function body and
    /// every method body of every class, using the tables Pass 0/1 built.
    pub(super) fn check_declarations(&mut self, program: &Program) {
        for decl in &program.declarations {
            match &decl.kind {
                StmtKind::FuncDecl(func) => self.check_function_body(func, None),
                StmtKind::ClassDecl(class) => {
                    let class_ty = self.classes.get_class(&class.name);
                    self.current_type_params = class.type_params.clone();
                    self.current_template_name = if class.type_params.is_empty() {
                        None
                    } else {
                        Some(class.name.clone())
                    };
                    for method in &class.methods {
                        self.check_function_body(method, class_ty.clone());
                    }
                    self.current_type_params.clear();
                    self.current_template_name = None;
                }
                _ => {}
            }
        }
    }

    fn check_function_body(&mut self, func: &FuncDecl, owning_class: Option<Rc<crate::types::ClassType>>) {
        let Some(body) = &func.body else {
            return;
        };

        let param_types: Vec<Rc<Type>> = func
            .parameters
            .iter()
            .map(|p| self.resolve_type_expr(&p.type_annotation))
            .collect();
        let declared_return = func
            .return_type
            .as_ref()
            .map(|t| self.resolve_type_expr(t))
            .unwrap_or_else(|| Rc::new(Type::Void));

        let outer_class = self.current_class.take();
        let outer_return = std::mem::replace(&mut self.current_return_type, declared_return);
        let outer_async = self.in_async_function;
        self.current_class = owning_class;
        self.in_async_function = func.is_async;

        self.symbols.push_scope();
        for (param, ty) in func.parameters.iter().zip(param_types.iter()) {
            self.symbols.define(
                param.name.clone(),
                SymbolInfo {
                    ty: ty.clone(),
                    mutable: false,
                    span: param.span.clone(),
                },
            );
        }
        self.check_block(body);
        self.symbols.pop_scope();

        self.current_class = outer_class;
        self.current_return_type = outer_return;
        self.in_async_function = outer_async;
    }

    pub(super) fn check_block(&mut self, block: &crate::ast::Block) {
        self.symbols.push_scope();
        for stmt in &block.statements {
            self.check_stmt(stmt);
        }
        self.symbols.pop_scope();
    }

    pub(super) fn check_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Block(block) => self.check_block(block),
            StmtKind::Expr(expr) => {
                self.check_expr(expr);
            }
            StmtKind::VarDecl(decl) => self.check_var_decl(decl, &stmt.span),
            StmtKind::Return(value) => self.check_return(value.as_ref(), &stmt.span),
            StmtKind::If {
                condition,
                then_block,
                else_block,
            } => {
                let cond_ty = self.check_expr(condition);
                if *cond_ty != Type::Bool && *cond_ty != Type::Unknown {
                    self.diagnostics.report(Diagnostic::error(
                        codes::NON_BOOLEAN_CONDITION,
                        format!("condition must be Bool, found {}", cond_ty),
                        condition.span.clone(),
                    ));
                }
                self.check_block(then_block);
                if let Some(else_stmt) = else_block {
                    self.check_stmt(else_stmt);
                }
            }
            StmtKind::While { condition, body } => {
                let cond_ty = self.check_expr(condition);
                if *cond_ty != Type::Bool && *cond_ty != Type::Unknown {
                    self.diagnostics.report(Diagnostic::error(
                        codes::NON_BOOLEAN_CONDITION,
                        format!("condition must be Bool, found {}", cond_ty),
                        condition.span.clone(),
                    ));
                }
                self.check_block(body);
            }
            StmtKind::For {
                variable,
                iterable,
                body,
            } => {
                let elem_ty = if matches!(iterable.kind, crate::ast::ExprKind::Range { .. }) {
                    self.check_expr(iterable);
                    Rc::new(Type::Int)
                } else {
                    let iterable_ty = self.check_expr(iterable);
                    match iterable_ty.as_ref() {
                        Type::Array(elem) => elem.clone(),
                        Type::Unknown => iterable_ty.clone(),
                        other => {
                            self.diagnostics.report(Diagnostic::error(
                                codes::TYPE_MISMATCH,
                                format!("for-in requires a Range or Array, found {}", other),
                                iterable.span.clone(),
                            ));
                            Rc::new(Type::Unknown)
                        }
                    }
                };
                self.symbols.push_scope();
                self.symbols.define(
                    variable.clone(),
                    SymbolInfo {
                        ty: elem_ty,
                        mutable: false,
                        span: stmt.span.clone(),
                    },
                );
                self.check_block(body);
                self.symbols.pop_scope();
            }
            StmtKind::Break | StmtKind::Continue => {}
            StmtKind::Throw(expr) => {
                self.check_expr(expr);
            }
            StmtKind::TryCatch {
                try_block,
                catch_clauses,
                finally_block,
            } => self.check_try_catch(try_block, catch_clauses, finally_block, &stmt.span),
            StmtKind::Unsafe(block) => {
                let outer = self.in_unsafe_block;
                self.in_unsafe_block = true;
                self.check_block(block);
                self.in_unsafe_block = outer;
            }
            // Nested declarations only ever appear at the top level of a
            // program; Pass 0/1 already registered them there.
            StmtKind::FuncDecl(_)
            | StmtKind::ExternFuncDecl(_)
            | StmtKind::Import(_)
            | StmtKind::ClassDecl(_)
            | StmtKind::InterfaceDecl(_)
            | StmtKind::EnumDecl(_) => {}
        }
    }

    fn check_var_decl(&mut self, decl: &VarDecl, span: &Span) {
        if decl.type_annotation.is_none() {
            if let Some(init) = &decl.initializer {
                if matches!(init.kind, crate::ast::ExprKind::NilLiteral) {
                    self.diagnostics.report(Diagnostic::error(
                        codes::NIL_REQUIRES_ANNOTATION,
                        format!("'{}' is initialized from nil and needs an explicit type annotation", decl.name),
                        span.clone(),
                    ));
                    self.symbols.define(
                        decl.name.clone(),
                        SymbolInfo {
                            ty: Rc::new(Type::Unknown),
                            mutable: decl.is_mutable,
                            span: span.clone(),
                        },
                    );
                    return;
                }
            } else {
                self.diagnostics.report(Diagnostic::error(
                    codes::NIL_REQUIRES_ANNOTATION,
                    format!("'{}' needs a type annotation or an initializer", decl.name),
                    span.clone(),
                ));
                self.symbols.define(
                    decl.name.clone(),
                    SymbolInfo {
                        ty: Rc::new(Type::Unknown),
                        mutable: decl.is_mutable,
                        span: span.clone(),
                    },
                );
                return;
            }
        }

        let declared_ty = decl.type_annotation.as_ref().map(|t| self.resolve_type_expr(t));
        let final_ty = if let Some(init) = &decl.initializer {
            let value_ty = if matches!(init.kind, crate::ast::ExprKind::Lambda { .. }) {
                match &declared_ty {
                    Some(ty) => {
                        let callback = ty.clone();
                        let previous = self.expected_lambda_param_types.take();
                        if let Type::Function { param_types, .. } = callback.as_ref() {
                            self.expected_lambda_param_types = Some(param_types.clone());
                        }
                        let result = self.check_expr(init);
                        self.expected_lambda_param_types = previous;
                        result
                    }
                    None => self.check_expr(init),
                }
            } else {
                self.check_expr_with_expected(init, declared_ty.clone())
            };
            match &declared_ty {
                Some(declared) => {
                    if !is_assignable(declared, &value_ty) && *value_ty != Type::Unknown {
                        self.diagnostics.report(Diagnostic::error(
                            codes::TYPE_MISMATCH,
                            format!(
                                "cannot initialize '{}' of type {} with {}",
                                decl.name, declared, value_ty
                            ),
                            init.span.clone(),
                        ));
                    }
                    declared.clone()
                }
                None => value_ty,
            }
        } else {
            declared_ty.unwrap_or_else(|| Rc::new(Type::Unknown))
        };

        self.symbols.define(
            decl.name.clone(),
            SymbolInfo {
                ty: final_ty,
                mutable: decl.is_mutable,
                span: span.clone(),
            },
        );
    }

    fn check_return(&mut self, value: Option<&crate::ast::Expr>, span: &Span) {
        if self.inferred_return.is_some() {
            let ty = match value {
                Some(expr) => self.check_expr(expr),
                None => Rc::new(Type::Void),
            };
            self.inferred_return.as_mut().unwrap().push(ty);
            return;
        }

        let expected = self.current_return_type.clone();
        match value {
            Some(expr) => {
                let value_ty = self.check_expr_with_expected(expr, Some(expected.clone()));
                if !is_assignable(&expected, &value_ty) && *value_ty != Type::Unknown {
                    self.diagnostics.report(Diagnostic::error(
                        codes::TYPE_MISMATCH,
                        format!("return type {} does not match declared return type {}", value_ty, expected),
                        expr.span.clone(),
                    ));
                }
            }
            None => {
                if *expected != Type::Void {
                    self.diagnostics.report(Diagnostic::error(
                        codes::TYPE_MISMATCH,
                        format!("missing return value of type {}", expected),
                        span.clone(),
                    ));
                }
            }
        }
    }

    fn check_try_catch(
        &mut self,
        try_block: &crate::ast::Block,
        catch_clauses: &[CatchClause],
        finally_block: &Option<crate::ast::Block>,
        span: &Span,
    ) {
        self.try_depth += 1;
        if self.try_depth > MAX_TRY_DEPTH {
            self.diagnostics.report(Diagnostic::error(
                codes::TRY_NESTING_TOO_DEEP,
                format!("try blocks nested more than {} deep", MAX_TRY_DEPTH),
                span.clone(),
            ));
        }
        self.check_block(try_block);
        self.try_depth -= 1;

        for clause in catch_clauses {
            self.symbols.push_scope();
            // The runtime surfaces a caught exception only as its message
            // string, regardless of the annotated catch type.
            self.symbols.define(
                clause.var_name.clone(),
                SymbolInfo {
                    ty: Rc::new(Type::String),
                    mutable: false,
                    span: span.clone(),
                },
            );
            self.check_block(&clause.body);
            self.symbols.pop_scope();
        }

        if let Some(finally) = finally_block {
            self.check_block(finally);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;
    use crate::parser::Parser;

    fn analyze(source: &str) -> Diagnostics {
        let mut diagnostics = Diagnostics::new();
        let program = Parser::parse_source(source, Rc::from("t.chr"), &mut diagnostics);
        let _ = Analyzer::new(&mut diagnostics).analyze(&program);
        diagnostics
    }

    #[test]
    fn well_typed_function_reports_nothing() {
        let diagnostics = analyze("func add(a: Int, b: Int) -> Int { return a + b; }");
        assert!(!diagnostics.has_errors());
    }

    #[test]
    fn wrong_return_type_is_reported() {
        let diagnostics = analyze("func greet() -> Int { return \"hi\"; }");
        assert!(diagnostics.has_errors());
    }

    #[test]
    fn non_boolean_while_condition_is_reported() {
        let diagnostics = analyze("func main() -> Void { while 1 { } }");
        assert!(diagnostics.has_errors());
    }

    #[test]
    fn for_in_binds_array_element_type() {
        let diagnostics = analyze(
            "func main() -> Int { var nums: [Int] = [1, 2, 3]; var total: Int = 0; for n in nums { total = total + n; } return total; }",
        );
        assert!(!diagnostics.has_errors());
    }

    #[test]
    fn nested_try_beyond_limit_is_reported() {
        let mut source = String::from("func main() -> Void { ");
        for _ in 0..(MAX_TRY_DEPTH + 1) {
            source.push_str("try { ");
        }
        source.push_str("throw \"x\";");
        for _ in 0..(MAX_TRY_DEPTH + 1) {
            source.push_str(" } catch (e: String) { }");
        }
        source.push('}');
        let diagnostics = analyze(&source);
        assert!(diagnostics.has_errors());
    }

    #[test]
    fn immutable_reassignment_is_reported() {
        let diagnostics = analyze("func main() -> Void { let x: Int = 1; x = 2; }");
        assert!(diagnostics.has_errors());
    }

    #[test]
    fn async_function_return_type_is_unwrapped_inside_the_body() {
        let diagnostics = analyze("async func fetch() -> Int { return 42; }");
        assert!(!diagnostics.has_errors());
    }
}
