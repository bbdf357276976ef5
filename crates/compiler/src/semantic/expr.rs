//! Pass 2, expression half: assigns a resolved [`Type`] to every expression
//! node, reporting mismatches as it goes. Statement-level orchestration
//! (bodies, scopes, control flow) lives in `stmt.rs`; this module is purely
//! about what type a given `Expr` produces.

use std::rc::Rc;

use crate::ast::{Expr, ExprKind, LambdaBody};
use crate::diagnostics::{codes, Diagnostic};
use crate::source::Span;
use crate::types::{is_assignable, AccessLevel, ClassType, Type};

use super::Analyzer;

/// Numeric promotion order, widest first. Two numeric operands promote to
/// whichever of the two appears earlier in this list.
const NUMERIC_RANK: &[fn(&Type) -> bool] = &[
    |t| matches!(t, Type::Float),
    |t| matches!(t, Type::Float32),
    |t| matches!(t, Type::Int),
    |t| matches!(t, Type::Int8 | Type::Int16 | Type::Int32),
    |t| matches!(t, Type::UInt),
    |t| matches!(t, Type::UInt8 | Type::UInt16 | Type::UInt32),
];

fn numeric_rank(t: &Type) -> Option<usize> {
    NUMERIC_RANK.iter().position(|f| f(t))
}

impl<'a> Analyzer<'a> {
    pub(super) fn check_expr(&mut self, expr: &Expr) -> Rc<Type> {
        self.check_expr_with_expected(expr, None)
    }

    pub(super) fn check_expr_with_expected(
        &mut self,
        expr: &Expr,
        expected: Option<Rc<Type>>,
    ) -> Rc<Type> {
        let previous = self.expected_type.take();
        self.expected_type = expected;
        let ty = self.check_expr_kind(expr);
        self.expected_type = previous;
        ty
    }

    fn error(&mut self, code: &'static str, message: impl Into<String>, span: &Span) -> Rc<Type> {
        self.diagnostics
            .report(Diagnostic::error(code, message, span.clone()));
        Rc::new(Type::Unknown)
    }

    fn check_expr_kind(&mut self, expr: &Expr) -> Rc<Type> {
        match &expr.kind {
            ExprKind::IntLiteral(_) => Rc::new(Type::Int),
            ExprKind::FloatLiteral(_) => Rc::new(Type::Float),
            ExprKind::StringLiteral(_) => Rc::new(Type::String),
            ExprKind::CharLiteral(_) => Rc::new(Type::Char),
            ExprKind::BoolLiteral(_) => Rc::new(Type::Bool),
            ExprKind::NilLiteral => Rc::new(Type::Nil),

            ExprKind::Identifier(name) => self.check_identifier(name, &expr.span),
            ExprKind::This => {
                if let Some(class) = &self.current_class {
                    Rc::new(Type::Class(class.clone()))
                } else {
                    self.error(
                        codes::THIS_OUTSIDE_METHOD,
                        "'this' may only be used inside a method body",
                        &expr.span,
                    )
                }
            }

            ExprKind::If {
                condition,
                then_expr,
                else_expr,
            } => {
                let cond_ty = self.check_expr(condition);
                if *cond_ty != Type::Bool && *cond_ty != Type::Unknown {
                    self.diagnostics.report(Diagnostic::error(
                        codes::NON_BOOLEAN_CONDITION,
                        format!("condition must be Bool, found {}", cond_ty),
                        condition.span.clone(),
                    ));
                }
                let then_ty = self.check_expr(then_expr);
                let else_ty = self.check_expr(else_expr);
                if *then_ty == *else_ty {
                    then_ty
                } else if is_assignable(&then_ty, &else_ty) {
                    then_ty
                } else if is_assignable(&else_ty, &then_ty) {
                    else_ty
                } else {
                    self.error(
                        codes::TYPE_MISMATCH,
                        format!(
                            "if-expression arms have incompatible types {} and {}",
                            then_ty, else_ty
                        ),
                        &expr.span,
                    )
                }
            }

            ExprKind::Binary { op, left, right } => self.check_binary(op, left, right, &expr.span),
            ExprKind::Unary { op, operand } => self.check_unary(op, operand, &expr.span),
            ExprKind::Call { callee, arguments } => self.check_call(callee, arguments, &expr.span),
            ExprKind::Member { object, member } => self.check_member(object, member, &expr.span),
            ExprKind::Construct {
                class_name,
                field_inits,
            } => self.check_construct(class_name, field_inits, &expr.span),
            ExprKind::Assign { target, value } => self.check_assign(target, value, &expr.span),
            ExprKind::Range { start, end } => {
                let start_ty = self.check_expr(start);
                let end_ty = self.check_expr(end);
                if *start_ty != Type::Int && *start_ty != Type::Unknown {
                    self.diagnostics.report(Diagnostic::error(
                        codes::TYPE_MISMATCH,
                        format!("range bound must be Int, found {}", start_ty),
                        start.span.clone(),
                    ));
                }
                if *end_ty != Type::Int && *end_ty != Type::Unknown {
                    self.diagnostics.report(Diagnostic::error(
                        codes::TYPE_MISMATCH,
                        format!("range bound must be Int, found {}", end_ty),
                        end.span.clone(),
                    ));
                }
                Rc::new(Type::Array(Rc::new(Type::Int)))
            }
            ExprKind::NilCoalesce {
                value,
                default_value,
            } => {
                let value_ty = self.check_expr(value);
                match value_ty.as_ref() {
                    Type::Nullable(inner) => {
                        let inner = inner.clone();
                        let default_ty = self.check_expr_with_expected(default_value, Some(inner.clone()));
                        if !is_assignable(&inner, &default_ty) {
                            self.diagnostics.report(Diagnostic::error(
                                codes::TYPE_MISMATCH,
                                format!(
                                    "'??' default value must be assignable to {}, found {}",
                                    inner, default_ty
                                ),
                                default_value.span.clone(),
                            ));
                        }
                        inner
                    }
                    _ => {
                        let _ = self.check_expr(default_value);
                        value_ty
                    }
                }
            }
            ExprKind::ForceUnwrap(operand) => {
                let operand_ty = self.check_expr(operand);
                match operand_ty.as_ref() {
                    Type::Nullable(inner) => inner.clone(),
                    Type::Unknown => operand_ty,
                    _ => self.error(
                        codes::TYPE_MISMATCH,
                        format!("'!' may only unwrap a nullable value, found {}", operand_ty),
                        &expr.span,
                    ),
                }
            }
            ExprKind::OptionalChain { object, member } => {
                let object_ty = self.check_expr(object);
                let inner = match object_ty.as_ref() {
                    Type::Nullable(inner) => inner.clone(),
                    _ => object_ty,
                };
                let member_ty = self.member_type_of(&inner, member, &expr.span);
                if member_ty.is_nullable() {
                    member_ty
                } else {
                    Type::nullable(member_ty)
                }
            }
            ExprKind::StringInterpolation { expressions, .. } => {
                for e in expressions {
                    self.check_expr(e);
                }
                Rc::new(Type::String)
            }
            ExprKind::ArrayLiteral(elements) => {
                if elements.is_empty() {
                    return Rc::new(Type::Array(Rc::new(Type::Unknown)));
                }
                let elem_ty = self.check_expr(&elements[0]);
                for e in &elements[1..] {
                    let ty = self.check_expr(e);
                    if !is_assignable(&elem_ty, &ty) && !is_assignable(&ty, &elem_ty) {
                        self.diagnostics.report(Diagnostic::error(
                            codes::TYPE_MISMATCH,
                            format!(
                                "array elements must share a type; found {} and {}",
                                elem_ty, ty
                            ),
                            e.span.clone(),
                        ));
                    }
                }
                Rc::new(Type::Array(elem_ty))
            }
            ExprKind::Index { object, index } => {
                let object_ty = self.check_expr(object);
                let index_ty = self.check_expr(index);
                if *index_ty != Type::Int && *index_ty != Type::Unknown {
                    self.diagnostics.report(Diagnostic::error(
                        codes::TYPE_MISMATCH,
                        format!("index must be Int, found {}", index_ty),
                        index.span.clone(),
                    ));
                }
                match object_ty.as_ref() {
                    Type::Array(elem) => elem.clone(),
                    Type::Unknown => object_ty,
                    _ => self.error(
                        codes::TYPE_MISMATCH,
                        format!("'{}' is not indexable with '[]'", object_ty),
                        &expr.span,
                    ),
                }
            }
            ExprKind::Lambda { params, body } => self.check_lambda(params, body),
            ExprKind::Await(operand) => {
                if !self.in_async_function {
                    self.diagnostics.report(Diagnostic::error(
                        codes::AWAIT_OUTSIDE_ASYNC,
                        "'await' may only be used inside an async function",
                        expr.span.clone(),
                    ));
                }
                let operand_ty = self.check_expr(operand);
                match operand_ty.as_ref() {
                    Type::Future(inner) => inner.clone(),
                    _ => operand_ty,
                }
            }
            ExprKind::Match { subject, arms } => self.check_match(subject, arms, &expr.span),
        }
    }

    fn check_identifier(&mut self, name: &str, span: &Span) -> Rc<Type> {
        if name == "print" {
            // Untyped builtin, handled specially at the call site.
            return Rc::new(Type::Unknown);
        }
        if let Some(info) = self.symbols.lookup(name) {
            return info.ty.clone();
        }
        if let Some(ty) = self.functions.get(name) {
            return ty.clone();
        }
        if let Some(ty) = self.extern_functions.get(name) {
            return ty.clone();
        }
        self.error(
            codes::UNDEFINED_IDENTIFIER,
            format!("undefined identifier '{}'", name),
            span,
        )
    }

    fn check_binary(&mut self, op: &str, left: &Expr, right: &Expr, span: &Span) -> Rc<Type> {
        let left_ty = self.check_expr(left);
        let right_ty = self.check_expr(right);

        if let Type::Class(class) = left_ty.as_ref() {
            let overload_name = format!("operator{}", op);
            if let Some(method_ty) = class.method_type(&overload_name) {
                if let Type::Function {
                    param_types,
                    return_type,
                } = method_ty.as_ref()
                {
                    if param_types.len() == 1 && is_assignable(&param_types[0], &right_ty) {
                        return return_type.clone();
                    }
                }
            }
        }

        match op {
            "+" if *left_ty == Type::String || *right_ty == Type::String => {
                Rc::new(Type::String)
            }
            "+" | "-" | "*" | "/" | "%" => self.promote_numeric(&left_ty, &right_ty, op, span),
            "<" | ">" | "<=" | ">=" => {
                if left_ty.is_numeric() && right_ty.is_numeric() {
                    Rc::new(Type::Bool)
                } else {
                    self.error(
                        codes::UNSUPPORTED_OPERATOR,
                        format!("'{}' requires numeric operands, found {} and {}", op, left_ty, right_ty),
                        span,
                    )
                }
            }
            "==" | "!=" => Rc::new(Type::Bool),
            "&&" | "||" => {
                if *left_ty == Type::Bool && *right_ty == Type::Bool {
                    Rc::new(Type::Bool)
                } else {
                    self.error(
                        codes::UNSUPPORTED_OPERATOR,
                        format!("'{}' requires Bool operands, found {} and {}", op, left_ty, right_ty),
                        span,
                    )
                }
            }
            _ => self.error(
                codes::UNSUPPORTED_OPERATOR,
                format!("unsupported binary operator '{}'", op),
                span,
            ),
        }
    }

    fn promote_numeric(&mut self, left: &Rc<Type>, right: &Rc<Type>, op: &str, span: &Span) -> Rc<Type> {
        if !left.is_numeric() || !right.is_numeric() {
            if **left == Type::Unknown || **right == Type::Unknown {
                return Rc::new(Type::Unknown);
            }
            return self.error(
                codes::UNSUPPORTED_OPERATOR,
                format!("'{}' requires numeric operands, found {} and {}", op, left, right),
                span,
            );
        }
        match (numeric_rank(left), numeric_rank(right)) {
            (Some(lr), Some(rr)) => {
                if lr <= rr {
                    left.clone()
                } else {
                    right.clone()
                }
            }
            _ => left.clone(),
        }
    }

    fn check_unary(&mut self, op: &str, operand: &Expr, span: &Span) -> Rc<Type> {
        let ty = self.check_expr(operand);
        match op {
            "-" => {
                if ty.is_numeric() || *ty == Type::Unknown {
                    ty
                } else {
                    self.error(
                        codes::UNSUPPORTED_OPERATOR,
                        format!("unary '-' requires a numeric operand, found {}", ty),
                        span,
                    )
                }
            }
            "!" => {
                if *ty == Type::Bool || *ty == Type::Unknown {
                    Rc::new(Type::Bool)
                } else {
                    self.error(
                        codes::UNSUPPORTED_OPERATOR,
                        format!("unary '!' requires a Bool operand, found {}", ty),
                        span,
                    )
                }
            }
            _ => self.error(
                codes::UNSUPPORTED_OPERATOR,
                format!("unsupported unary operator '{}'", op),
                span,
            ),
        }
    }

    /// `ClassName.method(...)` where `ClassName` is a registered class (not a
    /// local shadowing it) is a conventional "static-like" call used for
    /// factory methods such as `Box.new(42)`; member access on a class name
    /// resolves through the method table directly instead of through a value.
    fn is_bare_class_reference(&self, expr: &Expr) -> Option<Rc<ClassType>> {
        if let ExprKind::Identifier(name) = &expr.kind {
            if self.symbols.lookup(name).is_none() {
                return self.classes.get_class(name);
            }
        }
        None
    }

    fn check_call(&mut self, callee: &Expr, arguments: &[Expr], span: &Span) -> Rc<Type> {
        if let ExprKind::Identifier(name) = &callee.kind {
            if name == "print" {
                for arg in arguments {
                    self.check_expr(arg);
                }
                return Rc::new(Type::Void);
            }
        }

        // Array builtin methods whose return type depends on the callback
        // argument (map/filter/forEach) need special handling before
        // falling back to ordinary function-type call checking; everything
        // else resolves through `check_expr(callee)` below.
        if let ExprKind::Member { object, member } = &callee.kind {
            if self.is_bare_class_reference(object).is_none()
                && matches!(member.as_str(), "map" | "filter" | "forEach")
            {
                let object_ty = self.check_expr(object);
                if let Type::Array(elem) = object_ty.as_ref() {
                    return self
                        .check_array_higher_order_call(&elem.clone(), member, arguments, span)
                        .unwrap_or_else(|| Rc::new(Type::Unknown));
                }
                // Not an array after all (Unknown or an error type already
                // reported); still type-check the arguments for diagnostics,
                // then report through the normal member-access path.
                for arg in arguments {
                    self.check_expr(arg);
                }
                return self.member_type_of(&object_ty, member, &callee.span);
            }
        }

        let callee_ty = self.check_expr(callee);
        match callee_ty.as_ref() {
            Type::Function {
                param_types,
                return_type,
            } => {
                if param_types.len() != arguments.len() {
                    // `print` aside, Unknown-typed callees (errors already
                    // reported) don't pile on a second diagnostic.
                    self.diagnostics.report(Diagnostic::error(
                        codes::WRONG_ARITY,
                        format!(
                            "expected {} argument(s), found {}",
                            param_types.len(),
                            arguments.len()
                        ),
                        span.clone(),
                    ));
                } else {
                    for (param_ty, arg) in param_types.iter().zip(arguments.iter()) {
                        let arg_ty = if matches!(arg.kind, ExprKind::Lambda { .. }) {
                            self.check_lambda_with_expected(arg, param_ty)
                        } else {
                            self.check_expr_with_expected(arg, Some(param_ty.clone()))
                        };
                        if !is_assignable(param_ty, &arg_ty) && *arg_ty != Type::Unknown {
                            self.diagnostics.report(Diagnostic::error(
                                codes::TYPE_MISMATCH,
                                format!(
                                    "argument type {} is not assignable to parameter type {}",
                                    arg_ty, param_ty
                                ),
                                arg.span.clone(),
                            ));
                        }
                    }
                }
                return_type.clone()
            }
            Type::Unknown => {
                for arg in arguments {
                    self.check_expr(arg);
                }
                Rc::new(Type::Unknown)
            }
            other => self.error(
                codes::TYPE_MISMATCH,
                format!("'{}' is not callable", other),
                span,
            ),
        }
    }

    fn check_lambda_with_expected(&mut self, lambda: &Expr, expected_fn: &Type) -> Rc<Type> {
        if let Type::Function { param_types, .. } = expected_fn {
            let previous = self.expected_lambda_param_types.take();
            self.expected_lambda_param_types = Some(param_types.clone());
            let ty = self.check_expr(lambda);
            self.expected_lambda_param_types = previous;
            ty
        } else {
            self.check_expr(lambda)
        }
    }

    fn check_array_higher_order_call(
        &mut self,
        elem: &Rc<Type>,
        member: &str,
        arguments: &[Expr],
        span: &Span,
    ) -> Option<Rc<Type>> {
        if !matches!(member, "map" | "filter" | "forEach") {
            return None;
        }
        if arguments.len() != 1 {
            self.diagnostics.report(Diagnostic::error(
                codes::WRONG_ARITY,
                format!("'{}' expects exactly one callback argument", member),
                span.clone(),
            ));
            return Some(Rc::new(Type::Unknown));
        }
        let callback_ty = self.check_lambda_with_expected(
            &arguments[0],
            &Type::Function {
                param_types: vec![elem.clone()],
                return_type: Rc::new(Type::Unknown),
            },
        );
        let result_ty = match member {
            "map" => {
                let mapped = match callback_ty.as_ref() {
                    Type::Function { return_type, .. } => return_type.clone(),
                    _ => Rc::new(Type::Unknown),
                };
                Rc::new(Type::Array(mapped))
            }
            "filter" => {
                if let Type::Function { return_type, .. } = callback_ty.as_ref() {
                    if **return_type != Type::Bool && **return_type != Type::Unknown {
                        self.diagnostics.report(Diagnostic::error(
                            codes::TYPE_MISMATCH,
                            format!("'filter' callback must return Bool, found {}", return_type),
                            arguments[0].span.clone(),
                        ));
                    }
                }
                Rc::new(Type::Array(elem.clone()))
            }
            "forEach" => Rc::new(Type::Void),
            _ => unreachable!(),
        };
        Some(result_ty)
    }

    fn check_member(&mut self, object: &Expr, member: &str, span: &Span) -> Rc<Type> {
        if let ExprKind::Identifier(name) = &object.kind {
            if self.symbols.lookup(name).is_none() {
                if let Some(e) = self.classes.get_enum(name) {
                    return self.check_enum_variant_access(&e, member, span);
                }
                if let Some(class) = self.classes.get_class(name) {
                    if let Some(ty) = class.method_type(member) {
                        return ty;
                    }
                    if let Some(ty) = class.field_type(member) {
                        return ty;
                    }
                    return self.error(
                        codes::UNDEFINED_MEMBER,
                        format!("'{}' has no member '{}'", class.name, member),
                        span,
                    );
                }
            }
        }
        let object_ty = self.check_expr(object);
        self.member_type_of(&object_ty, member, span)
    }

    fn check_enum_variant_access(
        &mut self,
        e: &Rc<crate::types::EnumType>,
        member: &str,
        span: &Span,
    ) -> Rc<Type> {
        if e.case_index(member).is_none() {
            return self.error(
                codes::UNDEFINED_MEMBER,
                format!("'{}' has no variant '{}'", e.name, member),
                span,
            );
        }
        if e.has_associated_value(member) {
            let payload = e
                .associated_types
                .get(member)
                .and_then(|t| t.clone())
                .unwrap_or_else(|| Rc::new(Type::Unknown));
            Type::function(vec![payload], Rc::new(Type::Enum(e.clone())))
        } else {
            Rc::new(Type::Enum(e.clone()))
        }
    }

    /// Resolves `object_ty.member` for every non-declaration receiver kind:
    /// arrays, strings, numeric/Bool/Char primitives, and classes (walking
    /// the field/method tables up the parent chain, enforcing access level).
    pub(super) fn member_type_of(&mut self, object_ty: &Rc<Type>, member: &str, span: &Span) -> Rc<Type> {
        match object_ty.as_ref() {
            Type::Array(elem) => array_member_type(elem, member)
                .unwrap_or_else(|| self.error(codes::UNDEFINED_MEMBER, format!("Array has no member '{}'", member), span)),
            Type::String => string_member_type(member)
                .unwrap_or_else(|| self.error(codes::UNDEFINED_MEMBER, format!("String has no member '{}'", member), span)),
            Type::Int
            | Type::Int8
            | Type::Int16
            | Type::Int32
            | Type::UInt
            | Type::UInt8
            | Type::UInt16
            | Type::UInt32
            | Type::Float
            | Type::Float32
            | Type::Bool
            | Type::Char => primitive_member_type(object_ty, member)
                .unwrap_or_else(|| self.error(codes::UNDEFINED_MEMBER, format!("{} has no member '{}'", object_ty, member), span)),
            Type::Class(class) => self.class_member_type(class, member, span),
            Type::Unknown => object_ty.clone(),
            other => self.error(
                codes::UNDEFINED_MEMBER,
                format!("'{}' has no member '{}'", other, member),
                span,
            ),
        }
    }

    fn class_member_type(&mut self, class: &Rc<ClassType>, member: &str, span: &Span) -> Rc<Type> {
        let (ty, access, owner) = match find_field_or_method(class, member) {
            Some(found) => found,
            None => {
                return self.error(
                    codes::UNDEFINED_MEMBER,
                    format!("'{}' has no member '{}'", class.name, member),
                    span,
                )
            }
        };
        if !self.access_allowed(&access, &owner) {
            return self.error(
                codes::ACCESS_VIOLATION,
                format!(
                    "'{}' on '{}' is {:?} and not accessible here",
                    member, owner.name, access
                ),
                span,
            );
        }
        ty
    }

    fn access_allowed(&self, access: &AccessLevel, owner: &ClassType) -> bool {
        match access {
            AccessLevel::Public => true,
            AccessLevel::Private => self
                .current_class
                .as_ref()
                .is_some_and(|c| c.name == owner.name),
            AccessLevel::Protected => self
                .current_class
                .as_ref()
                .is_some_and(|c| c.is_subclass_of(&owner.name)),
        }
    }

    fn check_construct(
        &mut self,
        class_name: &str,
        field_inits: &[(String, Expr)],
        span: &Span,
    ) -> Rc<Type> {
        let class = if self.classes.is_generic_template(class_name) {
            match self.expected_type.clone() {
                Some(expected) => match expected.as_ref() {
                    Type::Class(target) if target.name == class_name && target.is_generic_instance() => {
                        target.clone()
                    }
                    _ => {
                        return self.error(
                            codes::BAD_GENERIC_ARG_COUNT,
                            format!(
                                "'{}' is generic; give a type-annotated target to infer its type arguments",
                                class_name
                            ),
                            span,
                        )
                    }
                },
                None => {
                    return self.error(
                        codes::BAD_GENERIC_ARG_COUNT,
                        format!(
                            "'{}' is generic; give a type-annotated target to infer its type arguments",
                            class_name
                        ),
                        span,
                    )
                }
            }
        } else {
            match self.classes.get_class(class_name) {
                Some(c) => c,
                None => {
                    return self.error(
                        codes::UNKNOWN_TYPE,
                        format!("unknown class '{}'", class_name),
                        span,
                    )
                }
            }
        };

        for (name, value) in field_inits {
            let field_ty = class.field_type(name);
            match field_ty {
                Some(ty) => {
                    let value_ty = self.check_expr_with_expected(value, Some(ty.clone()));
                    if !is_assignable(&ty, &value_ty) {
                        self.diagnostics.report(Diagnostic::error(
                            codes::TYPE_MISMATCH,
                            format!(
                                "field '{}' expects {}, found {}",
                                name, ty, value_ty
                            ),
                            value.span.clone(),
                        ));
                    }
                }
                None => {
                    self.check_expr(value);
                    self.diagnostics.report(Diagnostic::error(
                        codes::UNDEFINED_MEMBER,
                        format!("'{}' has no field '{}'", class.name, name),
                        value.span.clone(),
                    ));
                }
            }
        }

        Rc::new(Type::Class(class))
    }

    fn check_assign(&mut self, target: &Expr, value: &Expr, span: &Span) -> Rc<Type> {
        match &target.kind {
            ExprKind::Identifier(name) => {
                let info = match self.symbols.lookup(name) {
                    Some(info) => info.clone(),
                    None => {
                        self.check_expr(value);
                        return self.error(
                            codes::UNDEFINED_IDENTIFIER,
                            format!("undefined identifier '{}'", name),
                            span,
                        );
                    }
                };
                if !info.mutable {
                    self.diagnostics.report(Diagnostic::error(
                        codes::IMMUTABLE_ASSIGNMENT,
                        format!("'{}' is declared with 'let' and cannot be reassigned", name),
                        span.clone(),
                    ));
                }
                let value_ty = self.check_expr_with_expected(value, Some(info.ty.clone()));
                if !is_assignable(&info.ty, &value_ty) {
                    self.diagnostics.report(Diagnostic::error(
                        codes::TYPE_MISMATCH,
                        format!(
                            "cannot assign {} to '{}' of type {}",
                            value_ty, name, info.ty
                        ),
                        value.span.clone(),
                    ));
                }
                info.ty
            }
            ExprKind::Member { object, member } => {
                let target_ty = self.check_member(object, member, &target.span);
                let value_ty = self.check_expr_with_expected(value, Some(target_ty.clone()));
                if !is_assignable(&target_ty, &value_ty) {
                    self.diagnostics.report(Diagnostic::error(
                        codes::TYPE_MISMATCH,
                        format!(
                            "cannot assign {} to member '{}' of type {}",
                            value_ty, member, target_ty
                        ),
                        value.span.clone(),
                    ));
                }
                target_ty
            }
            ExprKind::Index { object, index } => {
                let target_ty = self.check_expr(target);
                let _ = object;
                let _ = index;
                let value_ty = self.check_expr_with_expected(value, Some(target_ty.clone()));
                if !is_assignable(&target_ty, &value_ty) {
                    self.diagnostics.report(Diagnostic::error(
                        codes::TYPE_MISMATCH,
                        format!("cannot assign {} to element of type {}", value_ty, target_ty),
                        value.span.clone(),
                    ));
                }
                target_ty
            }
            _ => {
                self.check_expr(value);
                self.error(codes::TYPE_MISMATCH, "invalid assignment target", span)
            }
        }
    }

    fn check_lambda(&mut self, params: &[crate::ast::LambdaParam], body: &LambdaBody) -> Rc<Type> {
        let expected = self.expected_lambda_param_types.take();
        self.symbols.push_scope();

        let mut param_types = Vec::with_capacity(params.len());
        for (i, param) in params.iter().enumerate() {
            let ty = match &param.type_annotation {
                Some(texpr) => self.resolve_type_expr(texpr),
                None => expected
                    .as_ref()
                    .and_then(|v| v.get(i))
                    .cloned()
                    .unwrap_or_else(|| Rc::new(Type::Unknown)),
            };
            self.symbols.define(
                param.name.clone(),
                crate::symbols::SymbolInfo {
                    ty: ty.clone(),
                    mutable: false,
                    span: Span::synthetic(),
                },
            );
            param_types.push(ty);
        }

        let return_type = match body {
            LambdaBody::Expr(e) => self.check_expr(e),
            LambdaBody::Block(block) => {
                let outer_return = std::mem::replace(&mut self.current_return_type, Rc::new(Type::Unknown));
                let outer_inferred = self.inferred_return.replace(Vec::new());
                self.check_block(block);
                let collected = self.inferred_return.take().unwrap_or_default();
                self.current_return_type = outer_return;
                self.inferred_return = outer_inferred;
                collected
                    .into_iter()
                    .find(|t| **t != Type::Void)
                    .unwrap_or_else(|| Rc::new(Type::Void))
            }
        };

        self.symbols.pop_scope();
        Type::function(param_types, return_type)
    }

    fn check_match(&mut self, subject: &Expr, arms: &[crate::ast::MatchArm], span: &Span) -> Rc<Type> {
        let subject_ty = self.check_expr(subject);
        let enum_ty = match subject_ty.as_ref() {
            Type::Enum(e) => e.clone(),
            Type::Unknown => {
                for arm in arms {
                    self.symbols.push_scope();
                    self.check_stmt(&arm.body);
                    self.symbols.pop_scope();
                }
                return Rc::new(Type::Unknown);
            }
            other => {
                return self.error(
                    codes::TYPE_MISMATCH,
                    format!("match subject must be an enum, found {}", other),
                    span,
                )
            }
        };

        let mut covered = std::collections::HashSet::new();
        let mut result_ty: Option<Rc<Type>> = None;
        for arm in arms {
            if enum_ty.case_index(&arm.case_name).is_none() {
                self.diagnostics.report(Diagnostic::error(
                    codes::UNDEFINED_MEMBER,
                    format!("'{}' has no variant '{}'", enum_ty.name, arm.case_name),
                    arm.body.span.clone(),
                ));
                continue;
            }
            covered.insert(arm.case_name.clone());

            self.symbols.push_scope();
            if !arm.binding_name.is_empty() {
                if let Some(Some(payload)) = enum_ty.associated_types.get(&arm.case_name) {
                    self.symbols.define(
                        arm.binding_name.clone(),
                        crate::symbols::SymbolInfo {
                            ty: payload.clone(),
                            mutable: false,
                            span: Span::synthetic(),
                        },
                    );
                }
            }
            let arm_ty = match &arm.body.kind {
                crate::ast::StmtKind::Expr(e) => Some(self.check_expr(e)),
                _ => {
                    self.check_stmt(&arm.body);
                    None
                }
            };
            self.symbols.pop_scope();

            if let Some(ty) = arm_ty {
                if result_ty.is_none() && *ty != Type::Void {
                    result_ty = Some(ty);
                }
            }
        }

        let missing: Vec<&str> = enum_ty
            .cases
            .iter()
            .filter(|c| !covered.contains(*c))
            .map(|s| s.as_str())
            .collect();
        if !missing.is_empty() {
            self.diagnostics.report(Diagnostic::error(
                codes::NON_EXHAUSTIVE_MATCH,
                format!(
                    "match over '{}' is not exhaustive; missing variant(s): {}",
                    enum_ty.name,
                    missing.join(", ")
                ),
                span.clone(),
            ));
        }

        result_ty.unwrap_or_else(|| Rc::new(Type::Void))
    }
}

fn find_field_or_method(class: &Rc<ClassType>, member: &str) -> Option<(Rc<Type>, AccessLevel, Rc<ClassType>)> {
    if let Some(field) = class.fields.iter().find(|f| f.name == member) {
        return Some((field.ty.clone(), field.access.clone(), class.clone()));
    }
    if let Some(method) = class.methods.iter().find(|m| m.name == member) {
        return Some((method.ty.clone(), method.access.clone(), class.clone()));
    }
    class
        .parent
        .as_ref()
        .and_then(|parent| find_field_or_method(parent, member))
}

fn array_member_type(elem: &Rc<Type>, member: &str) -> Option<Rc<Type>> {
    Some(match member {
        "length" => Rc::new(Type::Int),
        "push" => Type::function(vec![elem.clone()], Rc::new(Type::Void)),
        "pop" => Type::function(vec![], elem.clone()),
        "reverse" => Type::function(vec![], Rc::new(Type::Void)),
        "join" => Type::function(vec![Rc::new(Type::String)], Rc::new(Type::String)),
        // map/filter/forEach are resolved at the call site (check_array_higher_order_call)
        // since their types depend on the callback argument; this fallback type only
        // matters if one of them is referenced without being called.
        "map" | "filter" | "forEach" => Type::function(
            vec![Type::function(vec![elem.clone()], Rc::new(Type::Unknown))],
            Rc::new(Type::Unknown),
        ),
        _ => return None,
    })
}

fn string_member_type(member: &str) -> Option<Rc<Type>> {
    Some(match member {
        "length" => Rc::new(Type::Int),
        "contains" | "startsWith" | "endsWith" => {
            Type::function(vec![Rc::new(Type::String)], Rc::new(Type::Bool))
        }
        "indexOf" => Type::function(vec![Rc::new(Type::String)], Rc::new(Type::Int)),
        "substring" => Type::function(
            vec![Rc::new(Type::Int), Rc::new(Type::Int)],
            Rc::new(Type::String),
        ),
        "replace" => Type::function(
            vec![Rc::new(Type::String), Rc::new(Type::String)],
            Rc::new(Type::String),
        ),
        "trim" | "toUpper" | "toLower" => Type::function(vec![], Rc::new(Type::String)),
        "split" => Type::function(
            vec![Rc::new(Type::String)],
            Rc::new(Type::Array(Rc::new(Type::String))),
        ),
        "charAt" => Type::function(vec![Rc::new(Type::Int)], Rc::new(Type::Char)),
        "toInt" => Type::function(vec![], Rc::new(Type::Int)),
        "toFloat" => Type::function(vec![], Rc::new(Type::Float)),
        _ => return None,
    })
}

fn primitive_member_type(ty: &Type, member: &str) -> Option<Rc<Type>> {
    if member == "toString" {
        return Some(Type::function(vec![], Rc::new(Type::String)));
    }
    if !ty.is_numeric() {
        return None;
    }
    match member {
        "toInt" => Some(Type::function(vec![], Rc::new(Type::Int))),
        "toFloat" => Some(Type::function(vec![], Rc::new(Type::Float))),
        "toChar" => Some(Type::function(vec![], Rc::new(Type::Char))),
        _ => None,
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
        let _ = super::super::Analyzer::new(&mut diagnostics).analyze(&program);
        diagnostics
    }

    #[test]
    fn undefined_identifier_is_reported() {
        let diagnostics = analyze("func main() -> Int { return missing; }");
        assert!(diagnostics.has_errors());
    }

    #[test]
    fn arithmetic_promotes_to_wider_numeric_type() {
        let diagnostics = analyze("func main() -> Float { var x: Float = 1; var y: Int = 2; return x + y; }");
        assert!(!diagnostics.has_errors());
    }

    #[test]
    fn calling_undeclared_function_with_wrong_arity_is_reported() {
        let diagnostics = analyze("func add(a: Int, b: Int) -> Int { return a + b; } func main() -> Int { return add(1); }");
        assert!(diagnostics.has_errors());
    }

    #[test]
    fn this_outside_method_is_reported() {
        let diagnostics = analyze("func main() -> Void { var x = this; }");
        assert!(diagnostics.has_errors());
    }

    #[test]
    fn non_exhaustive_match_is_reported() {
        let diagnostics = analyze(
            "enum Color { Red, Green, Blue } func main() -> Void { var c: Color = Color.Red; match c { Red => {} Green => {} } }",
        );
        assert!(diagnostics.has_errors());
    }

    #[test]
    fn private_member_access_from_outside_class_is_reported() {
        let diagnostics = analyze(
            "class Box { private var value: Int; } func main() -> Int { var b: Box = Box { value: 1 }; return b.value; }",
        );
        assert!(diagnostics.has_errors());
    }
}
