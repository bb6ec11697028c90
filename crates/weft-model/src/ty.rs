//! Type references for the weft structural model
//!
//! A [`TypeRef`] is a closed description of a type as it appears in method
//! signatures and instruction operands: either a primitive, a name resolved
//! through the [`crate::world::TypeEnv`], a generic parameter, or one of the
//! shape wrappers (by-reference, pointer, array, generic instance, function
//! pointer, custom modifier, pinned).

use std::fmt;

/// Namespace of the fixed core runtime module.
pub const CORE_NAMESPACE: &str = "weft.core";

/// Primitive types understood by the weaver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    /// No value (method return only)
    Void,
    /// Boolean
    Bool,
    /// 32-bit signed integer
    Int32,
    /// 64-bit signed integer
    Int64,
    /// 32-bit float
    Float32,
    /// 64-bit float
    Float64,
    /// Immutable string
    Str,
    /// The top reference type; also the key of the untyped catch group
    Object,
}

impl Primitive {
    /// Whether values of this primitive live inline rather than by reference.
    pub fn is_value(self) -> bool {
        !matches!(self, Primitive::Str | Primitive::Object | Primitive::Void)
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Primitive::Void => write!(f, "void"),
            Primitive::Bool => write!(f, "bool"),
            Primitive::Int32 => write!(f, "int32"),
            Primitive::Int64 => write!(f, "int64"),
            Primitive::Float32 => write!(f, "float32"),
            Primitive::Float64 => write!(f, "float64"),
            Primitive::Str => write!(f, "string"),
            Primitive::Object => write!(f, "object"),
        }
    }
}

/// Namespace-qualified type name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TypeName {
    /// Declaring namespace, empty for the global namespace
    pub namespace: String,
    /// Short type name
    pub name: String,
}

impl TypeName {
    /// Create a name from namespace and short name.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        TypeName {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create a name inside the core runtime namespace.
    pub fn core(name: impl Into<String>) -> Self {
        TypeName::new(CORE_NAMESPACE, name)
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}.{}", self.namespace, self.name)
        }
    }
}

/// Well-known names in the core runtime module.
pub mod well_known {
    use super::TypeName;

    /// Nullable wrapper; `Nullable<T>` renders as `T?`.
    pub fn nullable() -> TypeName {
        TypeName::core("Nullable")
    }

    /// Base exception type; AfterThrowing thrown accessors must be
    /// compatible with it.
    pub fn exception() -> TypeName {
        TypeName::core("Exception")
    }

    /// Reflective method handle type required for method accessors.
    pub fn method_token() -> TypeName {
        TypeName::core("MethodToken")
    }

    /// Read-only argument view type required for args accessors.
    pub fn arg_view() -> TypeName {
        TypeName::core("ArgView")
    }
}

/// Which declaration owns a generic parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenericOwner {
    /// Declared on a method
    Method,
    /// Declared on a type
    Type,
}

/// Reference to a generic parameter by owner kind and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GenericParamRef {
    /// Owner kind
    pub owner: GenericOwner,
    /// Parameter name, e.g. `T`
    pub name: String,
}

impl GenericParamRef {
    /// Method-owned generic parameter reference.
    pub fn method(name: impl Into<String>) -> Self {
        GenericParamRef {
            owner: GenericOwner::Method,
            name: name.into(),
        }
    }

    /// Type-owned generic parameter reference.
    pub fn ty(name: impl Into<String>) -> Self {
        GenericParamRef {
            owner: GenericOwner::Type,
            name: name.into(),
        }
    }
}

/// A structural type reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    /// Primitive type
    Primitive(Primitive),

    /// Named type, resolved through the world
    Named(TypeName),

    /// Generic parameter of the enclosing method or type
    GenericParam(GenericParamRef),

    /// By-reference wrapper
    ByRef(Box<TypeRef>),

    /// Unmanaged pointer
    Pointer(Box<TypeRef>),

    /// Array with a rank (1 = vector)
    Array {
        /// Element type
        elem: Box<TypeRef>,
        /// Number of dimensions
        rank: u32,
    },

    /// Generic instantiation, e.g. `Map<K,V>`
    GenericInst {
        /// Open definition being instantiated
        base: Box<TypeRef>,
        /// Concrete type arguments
        args: Vec<TypeRef>,
    },

    /// Function pointer
    FnPointer {
        /// Parameter types
        params: Vec<TypeRef>,
        /// Return type
        ret: Box<TypeRef>,
    },

    /// Custom-modified type
    Modified {
        /// Modifier type
        modifier: Box<TypeRef>,
        /// Modified element
        elem: Box<TypeRef>,
        /// Required (vs optional) modifier
        required: bool,
    },

    /// Pinned type specification
    Pinned(Box<TypeRef>),
}

impl TypeRef {
    /// Shorthand for a named reference.
    pub fn named(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        TypeRef::Named(TypeName::new(namespace, name))
    }

    /// Shorthand for a by-reference wrapper.
    pub fn by_ref(elem: TypeRef) -> Self {
        TypeRef::ByRef(Box::new(elem))
    }

    /// Whether this is a by-reference type.
    pub fn is_by_ref(&self) -> bool {
        matches!(self, TypeRef::ByRef(_))
    }

    /// Strip one by-reference wrapper if present.
    pub fn strip_by_ref(&self) -> &TypeRef {
        match self {
            TypeRef::ByRef(elem) => elem,
            other => other,
        }
    }

    /// The nullable element when this is `Nullable<T>`.
    pub fn nullable_elem(&self) -> Option<&TypeRef> {
        match self {
            TypeRef::GenericInst { base, args } if args.len() == 1 => match base.as_ref() {
                TypeRef::Named(name) if *name == well_known::nullable() => Some(&args[0]),
                _ => None,
            },
            _ => None,
        }
    }

    /// Whether `gp` occurs anywhere inside this type.
    ///
    /// Descends every shape wrapper: generic-instance arguments, modifier
    /// element and modifier, function-pointer return and parameters, and
    /// the element of the remaining specifications.
    pub fn contains_generic_param(&self, gp: &GenericParamRef) -> bool {
        match self {
            TypeRef::GenericParam(p) => p == gp,
            TypeRef::GenericInst { args, .. } => {
                args.iter().any(|a| a.contains_generic_param(gp))
            }
            TypeRef::Modified { modifier, elem, .. } => {
                elem.contains_generic_param(gp) || modifier.contains_generic_param(gp)
            }
            TypeRef::FnPointer { params, ret } => {
                ret.contains_generic_param(gp)
                    || params.iter().any(|p| p.contains_generic_param(gp))
            }
            TypeRef::ByRef(elem) | TypeRef::Pointer(elem) | TypeRef::Pinned(elem) => {
                elem.contains_generic_param(gp)
            }
            TypeRef::Array { elem, .. } => elem.contains_generic_param(gp),
            TypeRef::Primitive(_) | TypeRef::Named(_) => false,
        }
    }
}

impl fmt::Display for TypeRef {
    /// Short, mask-independent rendering used by diagnostics. The signature
    /// renderer produces the canonical forms.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(elem) = self.nullable_elem() {
            return write!(f, "{elem}?");
        }
        match self {
            TypeRef::Primitive(p) => write!(f, "{p}"),
            TypeRef::Named(n) => write!(f, "{}", n.name),
            TypeRef::GenericParam(p) => write!(f, "{}", p.name),
            TypeRef::ByRef(elem) => write!(f, "ref {elem}"),
            TypeRef::Pointer(elem) => write!(f, "{elem}*"),
            TypeRef::Array { elem, rank } => {
                write!(f, "{elem}[")?;
                for _ in 1..*rank {
                    write!(f, ",")?;
                }
                write!(f, "]")
            }
            TypeRef::GenericInst { base, args } => {
                write!(f, "{base}<")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ">")
            }
            TypeRef::FnPointer { params, ret } => {
                write!(f, "fn(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, ")->{ret}")
            }
            TypeRef::Modified { elem, .. } => write!(f, "{elem}"),
            TypeRef::Pinned(elem) => write!(f, "pinned({elem})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_shapes() {
        let arr = TypeRef::Array {
            elem: Box::new(TypeRef::Primitive(Primitive::Int32)),
            rank: 3,
        };
        assert_eq!(format!("{arr}"), "int32[,,]");

        let nullable = TypeRef::GenericInst {
            base: Box::new(TypeRef::Named(well_known::nullable())),
            args: vec![TypeRef::Primitive(Primitive::Int32)],
        };
        assert_eq!(format!("{nullable}"), "int32?");

        let fnptr = TypeRef::FnPointer {
            params: vec![TypeRef::Primitive(Primitive::Bool)],
            ret: Box::new(TypeRef::Primitive(Primitive::Void)),
        };
        assert_eq!(format!("{fnptr}"), "fn(bool)->void");
    }

    #[test]
    fn contains_generic_param_descends_wrappers() {
        let t = GenericParamRef::method("T");
        let u = GenericParamRef::method("U");

        let inst = TypeRef::GenericInst {
            base: Box::new(TypeRef::named("std", "List")),
            args: vec![TypeRef::by_ref(TypeRef::GenericParam(t.clone()))],
        };
        assert!(inst.contains_generic_param(&t));
        assert!(!inst.contains_generic_param(&u));

        let fnptr = TypeRef::FnPointer {
            params: vec![],
            ret: Box::new(TypeRef::GenericParam(u.clone())),
        };
        assert!(fnptr.contains_generic_param(&u));
    }

    #[test]
    fn strip_by_ref() {
        let inner = TypeRef::Primitive(Primitive::Int64);
        let r = TypeRef::by_ref(inner.clone());
        assert_eq!(r.strip_by_ref(), &inner);
        assert_eq!(inner.strip_by_ref(), &inner);
    }
}
