//! Resolved type system.
//!
//! `TypeExpr` (ast.rs) is what the parser produces from source text; `Type`
//! here is what the semantic pass resolves it to. Represented as a plain
//! recursive enum rather than a class hierarchy with virtual dispatch —
//! composite variants hold `Rc<Type>` so structurally identical subtrees
//! (every function returning plain `Int`, say) can share an allocation
//! without forcing the whole type graph through a single arena.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AccessLevel {
    Private,
    Protected,
    Public,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Int,
    Int8,
    Int16,
    Int32,
    UInt,
    UInt8,
    UInt16,
    UInt32,
    Float,
    Float32,
    Bool,
    String,
    Char,
    Void,
    Nil,
    /// `TypeInfo`, the type of a `typeof`-style reflective handle. Carried
    /// as a distinct kind (matching the richer original type system) even
    /// though this compiler never implements the reflection surface itself
    /// — see the Non-goals in SPEC_FULL.md.
    TypeInfo,
    Unknown,

    Nullable(Rc<Type>),
    Function {
        param_types: Vec<Rc<Type>>,
        return_type: Rc<Type>,
    },
    Array(Rc<Type>),
    Future(Rc<Type>),
    Map {
        key_type: Rc<Type>,
        value_type: Rc<Type>,
    },
    Set(Rc<Type>),
    TypeParameter(String),
    Class(Rc<ClassType>),
    Enum(Rc<EnumType>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassField {
    pub name: String,
    pub ty: Rc<Type>,
    pub access: AccessLevel,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassMethod {
    pub name: String,
    pub ty: Rc<Type>, // always a Type::Function
    pub access: AccessLevel,
}

/// A class, or — for assignability purposes, as in the original — an
/// interface. `methods` on an interface's `ClassType` carry signatures only.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassType {
    pub name: String,
    pub is_interface: bool,
    pub is_shared: bool,
    pub parent: Option<Rc<ClassType>>,
    pub interface_names: Vec<String>,
    pub fields: Vec<ClassField>,
    pub methods: Vec<ClassMethod>,
    pub type_params: Vec<String>,
    pub type_args: Vec<Rc<Type>>,
}

impl ClassType {
    pub fn is_generic_template(&self) -> bool {
        !self.type_params.is_empty() && self.type_args.is_empty()
    }

    pub fn is_generic_instance(&self) -> bool {
        !self.type_args.is_empty()
    }

    pub fn field_type(&self, field_name: &str) -> Option<Rc<Type>> {
        self.fields
            .iter()
            .find(|f| f.name == field_name)
            .map(|f| f.ty.clone())
            .or_else(|| self.parent.as_ref().and_then(|p| p.field_type(field_name)))
    }

    pub fn method_type(&self, method_name: &str) -> Option<Rc<Type>> {
        self.methods
            .iter()
            .find(|m| m.name == method_name)
            .map(|m| m.ty.clone())
            .or_else(|| self.parent.as_ref().and_then(|p| p.method_type(method_name)))
    }

    pub fn is_subclass_of(&self, class_name: &str) -> bool {
        if self.name == class_name {
            return true;
        }
        match &self.parent {
            Some(parent) => parent.is_subclass_of(class_name),
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumType {
    pub name: String,
    pub cases: Vec<String>,
    /// `None` in the map value means a simple variant with no payload.
    pub associated_types: HashMap<String, Option<Rc<Type>>>,
}

impl EnumType {
    pub fn case_index(&self, case_name: &str) -> Option<usize> {
        self.cases.iter().position(|c| c == case_name)
    }

    pub fn has_associated_value(&self, case_name: &str) -> bool {
        matches!(self.associated_types.get(case_name), Some(Some(_)))
    }
}

impl Type {
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
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
        )
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, Type::Nullable(_))
    }

    pub fn nullable(inner: Rc<Type>) -> Rc<Type> {
        Rc::new(Type::Nullable(inner))
    }

    pub fn function(param_types: Vec<Rc<Type>>, return_type: Rc<Type>) -> Rc<Type> {
        Rc::new(Type::Function {
            param_types,
            return_type,
        })
    }

    /// Structural equality, following `Nullable`/`Array`/generic-argument
    /// wrappers down to their leaves, the same traversal the resolved
    /// `equals()` override family used to do per-kind.
    pub fn structurally_eq(&self, other: &Type) -> bool {
        self == other
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "Int"),
            Type::Int8 => write!(f, "Int8"),
            Type::Int16 => write!(f, "Int16"),
            Type::Int32 => write!(f, "Int32"),
            Type::UInt => write!(f, "UInt"),
            Type::UInt8 => write!(f, "UInt8"),
            Type::UInt16 => write!(f, "UInt16"),
            Type::UInt32 => write!(f, "UInt32"),
            Type::Float => write!(f, "Float"),
            Type::Float32 => write!(f, "Float32"),
            Type::Bool => write!(f, "Bool"),
            Type::String => write!(f, "String"),
            Type::Char => write!(f, "Char"),
            Type::Void => write!(f, "Void"),
            Type::Nil => write!(f, "Nil"),
            Type::TypeInfo => write!(f, "TypeInfo"),
            Type::Unknown => write!(f, "<unknown>"),
            Type::Nullable(inner) => write!(f, "{}?", inner),
            Type::Function {
                param_types,
                return_type,
            } => {
                write!(f, "(")?;
                for (i, p) in param_types.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, ") -> {}", return_type)
            }
            Type::Array(elem) => write!(f, "[{}]", elem),
            Type::Future(inner) => write!(f, "Future<{}>", inner),
            Type::Map {
                key_type,
                value_type,
            } => write!(f, "Map<{}, {}>", key_type, value_type),
            Type::Set(elem) => write!(f, "Set<{}>", elem),
            Type::TypeParameter(name) => write!(f, "{}", name),
            Type::Class(class) => {
                write!(f, "{}", class.name)?;
                if !class.type_args.is_empty() {
                    write!(f, "<")?;
                    for (i, arg) in class.type_args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", arg)?;
                    }
                    write!(f, ">")?;
                }
                Ok(())
            }
            Type::Enum(e) => write!(f, "{}", e.name),
        }
    }
}

/// A concrete instantiation of a generic class template, produced by the
/// semantic pass when it encounters `Box<Int>` for a `class Box<T>`.
/// `mangled_name` is what codegen emits as the struct/function-prefix name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GenericInstantiation {
    pub template_name: String,
    pub mangled_name: String,
    pub type_params: Vec<String>,
    pub type_args: Vec<Rc<Type>>,
}

impl GenericInstantiation {
    pub fn mangle(template_name: &str, type_args: &[Rc<Type>]) -> String {
        let mut name = template_name.to_string();
        for arg in type_args {
            name.push('_');
            name.push_str(&mangled_type_fragment(arg));
        }
        name
    }
}

fn mangled_type_fragment(ty: &Type) -> String {
    match ty {
        Type::Class(c) => c.name.replace(['<', '>', ',', ' '], "_"),
        Type::Array(elem) => format!("Arr{}", mangled_type_fragment(elem)),
        other => other.to_string().replace(['<', '>', ',', ' ', '?'], "_"),
    }
}

/// Substitute each occurrence of a type parameter in `ty` with its
/// corresponding concrete argument. `param_names[i]` maps to `args[i]`;
/// parameters with no matching argument (shouldn't happen once arity is
/// checked) are left untouched.
pub fn substitute_type_params(ty: &Rc<Type>, param_names: &[String], args: &[Rc<Type>]) -> Rc<Type> {
    match ty.as_ref() {
        Type::TypeParameter(name) => {
            if let Some(idx) = param_names.iter().position(|p| p == name) {
                if let Some(replacement) = args.get(idx) {
                    return replacement.clone();
                }
            }
            ty.clone()
        }
        Type::Nullable(inner) => Type::nullable(substitute_type_params(inner, param_names, args)),
        Type::Array(elem) => Rc::new(Type::Array(substitute_type_params(elem, param_names, args))),
        Type::Future(inner) => Rc::new(Type::Future(substitute_type_params(inner, param_names, args))),
        Type::Map {
            key_type,
            value_type,
        } => Rc::new(Type::Map {
            key_type: substitute_type_params(key_type, param_names, args),
            value_type: substitute_type_params(value_type, param_names, args),
        }),
        Type::Set(elem) => Rc::new(Type::Set(substitute_type_params(elem, param_names, args))),
        Type::Function {
            param_types,
            return_type,
        } => Rc::new(Type::Function {
            param_types: param_types
                .iter()
                .map(|p| substitute_type_params(p, param_names, args))
                .collect(),
            return_type: substitute_type_params(return_type, param_names, args),
        }),
        _ => ty.clone(),
    }
}

/// Is a value of type `value` assignable to a location of type `target`?
/// Handles the few coercions the language allows: identical types, a
/// concrete type into its `Nullable` wrapper, `nil` into any nullable,
/// subclass-to-superclass widening, `Unknown`/type-parameter wildcards, and
/// `Int`-literal widening into any other numeric type.
pub fn is_assignable(target: &Type, value: &Type) -> bool {
    if target == value {
        return true;
    }
    match (target, value) {
        (Type::Unknown, _) | (_, Type::Unknown) => true,
        (Type::TypeParameter(_), _) | (_, Type::TypeParameter(_)) => true,
        (Type::Nullable(inner), Type::Nil) => {
            let _ = inner;
            true
        }
        (Type::Nullable(inner), other) => is_assignable(inner, other),
        (Type::Class(target_class), Type::Class(value_class)) => {
            value_class.is_subclass_of(&target_class.name)
                || value_class
                    .interface_names
                    .iter()
                    .any(|iface| iface == &target_class.name)
        }
        (Type::Array(target_elem), Type::Array(value_elem)) => {
            is_assignable(target_elem, value_elem)
        }
        // The literal `1` is always typed `Int`; the language lets an `Int`
        // widen into any other sized-integer or floating-point slot rather
        // than forcing every sized literal to carry its own suffix.
        (target, Type::Int) if target.is_numeric() => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nullable_display_appends_question_mark() {
        let ty = Type::nullable(Rc::new(Type::Int));
        assert_eq!(ty.to_string(), "Int?");
    }

    #[test]
    fn nil_is_assignable_to_any_nullable() {
        assert!(is_assignable(&Type::Nullable(Rc::new(Type::String)), &Type::Nil));
        assert!(!is_assignable(&Type::String, &Type::Nil));
    }

    #[test]
    fn concrete_value_is_assignable_to_its_own_nullable_wrapper() {
        assert!(is_assignable(&Type::Nullable(Rc::new(Type::Int)), &Type::Int));
    }

    #[test]
    fn int_literal_widens_to_any_sized_integer_or_float() {
        assert!(is_assignable(&Type::Int8, &Type::Int));
        assert!(is_assignable(&Type::UInt32, &Type::Int));
        assert!(is_assignable(&Type::Float, &Type::Int));
        assert!(is_assignable(&Type::Float32, &Type::Int));
    }

    #[test]
    fn unknown_and_type_parameters_act_as_wildcards() {
        assert!(is_assignable(&Type::Int, &Type::Unknown));
        assert!(is_assignable(&Type::Unknown, &Type::String));
        assert!(is_assignable(&Type::TypeParameter("T".into()), &Type::Int));
        assert!(is_assignable(&Type::Int, &Type::TypeParameter("T".into())));
    }

    #[test]
    fn subclass_is_assignable_to_superclass() {
        let base = Rc::new(ClassType {
            name: "Animal".into(),
            is_interface: false,
            is_shared: false,
            parent: None,
            interface_names: vec![],
            fields: vec![],
            methods: vec![],
            type_params: vec![],
            type_args: vec![],
        });
        let derived = ClassType {
            name: "Dog".into(),
            is_interface: false,
            is_shared: false,
            parent: Some(base.clone()),
            interface_names: vec![],
            fields: vec![],
            methods: vec![],
            type_params: vec![],
            type_args: vec![],
        };
        assert!(is_assignable(
            &Type::Class(base),
            &Type::Class(Rc::new(derived))
        ));
    }

    #[test]
    fn substitution_rewrites_nested_generic_positions() {
        let t_param = Rc::new(Type::TypeParameter("T".into()));
        let array_of_t = Rc::new(Type::Array(t_param));
        let substituted = substitute_type_params(
            &array_of_t,
            &["T".to_string()],
            &[Rc::new(Type::Int)],
        );
        assert_eq!(substituted.to_string(), "[Int]");
    }

    #[test]
    fn mangled_name_is_stable_for_same_args() {
        let class = Rc::new(ClassType {
            name: "Box".into(),
            is_interface: false,
            is_shared: false,
            parent: None,
            interface_names: vec![],
            fields: vec![],
            methods: vec![],
            type_params: vec!["T".into()],
            type_args: vec![],
        });
        let _ = class;
        let mangled = GenericInstantiation::mangle("Box", &[Rc::new(Type::Int)]);
        assert_eq!(mangled, "Box_Int");
    }
}
