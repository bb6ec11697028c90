//! Module, type and method structure
//!
//! These are the structural objects a module loader hands to the weaver:
//! one [`Module`] per compiled unit, owning [`TypeDef`]s which own
//! [`MethodDef`]s. Advice metadata arrives pre-parsed as tag fields
//! ([`AdviceTag`], [`PointcutSpec`], accessor/binding markers); raw
//! [`Attribute`] lists are kept alongside for signature rendering only.

use crate::body::Body;
use crate::flags::DetailFlags;
use crate::ty::{TypeName, TypeRef};

/// A compiled module under transformation or referenced read-only.
#[derive(Debug, Clone, Default)]
pub struct Module {
    /// Module name, e.g. `game.logic`
    pub name: String,
    /// All types declared in the module
    pub types: Vec<TypeDef>,
    /// Module-level attributes
    pub attrs: Vec<Attribute>,
    /// Module-wide weaving opt-out tag
    pub opt_out: bool,
    /// Names of modules this one references
    pub references: Vec<String>,
}

impl Module {
    /// Create an empty module.
    pub fn new(name: impl Into<String>) -> Self {
        Module {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Find a type by name.
    pub fn type_def(&self, name: &TypeName) -> Option<&TypeDef> {
        self.types.iter().find(|t| t.name == *name)
    }

    /// Find a type by name, mutably.
    pub fn type_def_mut(&mut self, name: &TypeName) -> Option<&mut TypeDef> {
        self.types.iter_mut().find(|t| t.name == *name)
    }
}

/// Kind of a type declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TypeKind {
    /// Reference class
    #[default]
    Class,
    /// Interface
    Interface,
    /// Value type
    Struct,
    /// Enumeration
    Enum,
}

/// A named constant of an enum type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumVariant {
    /// Member name
    pub name: String,
    /// Constant value (bit-cast for flags rendering)
    pub value: i64,
}

/// A type declared within a module.
#[derive(Debug, Clone, Default)]
pub struct TypeDef {
    /// Namespace-qualified name
    pub name: TypeName,
    /// Declaration kind
    pub kind: TypeKind,
    /// Enclosing type for nested declarations
    pub declaring: Option<TypeName>,
    /// Base type, if any
    pub base: Option<TypeRef>,
    /// Implemented interfaces
    pub interfaces: Vec<TypeRef>,
    /// Generic parameter declarations
    pub generic_params: Vec<GenericParamDef>,
    /// Declared methods
    pub methods: Vec<MethodDef>,
    /// Type-level attributes
    pub attrs: Vec<Attribute>,
    /// Abstract type
    pub is_abstract: bool,
    /// Sealed type
    pub is_sealed: bool,
    /// Static type (no instances)
    pub is_static: bool,
    /// Carries the aspect tag (declares advice)
    pub is_aspect: bool,
    /// Weaving opt-out tag
    pub opt_out: bool,
    /// Type-level pointcut tags, inherited by every declared advice
    pub pointcuts: Vec<PointcutSpec>,
    /// Enum members, for enum kinds only
    pub enum_variants: Vec<EnumVariant>,
    /// Flags-enum marker, for enum kinds only
    pub is_flags: bool,
}

impl TypeDef {
    /// Create a class with the given name.
    pub fn new(name: TypeName) -> Self {
        TypeDef {
            name,
            ..Default::default()
        }
    }

    /// Whether instances are value-typed.
    pub fn is_value_type(&self) -> bool {
        matches!(self.kind, TypeKind::Struct | TypeKind::Enum)
    }

    /// Whether the type declares generic parameters.
    pub fn is_generic(&self) -> bool {
        !self.generic_params.is_empty()
    }

    /// Find a declared generic parameter by name.
    pub fn generic_param(&self, name: &str) -> Option<&GenericParamDef> {
        self.generic_params.iter().find(|g| g.name == name)
    }

    /// Find a declared method by name.
    pub fn method(&self, name: &str) -> Option<&MethodDef> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Reference to this type as it appears in signatures: a plain name, or
    /// a generic instance closed over its own parameters when generic.
    pub fn self_ref(&self) -> TypeRef {
        let named = TypeRef::Named(self.name.clone());
        if self.generic_params.is_empty() {
            named
        } else {
            TypeRef::GenericInst {
                base: Box::new(named),
                args: self
                    .generic_params
                    .iter()
                    .map(|g| TypeRef::GenericParam(crate::ty::GenericParamRef::ty(&g.name)))
                    .collect(),
            }
        }
    }
}

/// Access level of a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Access {
    /// Visible everywhere
    #[default]
    Public,
    /// Visible to derived types
    Protected,
    /// Visible within the module
    Internal,
    /// Visible to the declaring type
    Private,
    /// Protected or internal
    ProtectedInternal,
    /// Protected and internal
    PrivateProtected,
}

impl Access {
    /// Modifier keyword(s) as rendered in signatures.
    pub fn keyword(self) -> &'static str {
        match self {
            Access::Public => "public",
            Access::Protected => "protected",
            Access::Internal => "internal",
            Access::Private => "private",
            Access::ProtectedInternal => "protected internal",
            Access::PrivateProtected => "private protected",
        }
    }
}

/// Virtual-dispatch standing of a method, for modifier rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Virtuality {
    /// Non-virtual
    #[default]
    None,
    /// Introduces a virtual slot
    Virtual,
    /// Overrides an inherited slot
    Override,
    /// Hides an inherited slot
    New,
    /// Sealed override
    Sealed,
}

/// Direction flags of a parameter. By-reference-ness itself is carried by
/// the parameter type ([`TypeRef::ByRef`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParamDirection {
    /// Ordinary parameter
    #[default]
    Normal,
    /// Read-only reference
    In,
    /// Output reference
    Out,
}

/// Accessor kinds an advice parameter may declare instead of binding to a
/// same-named target parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accessor {
    /// Reflective handle of the target method
    MethodHandle,
    /// Read-only view of the full argument set
    Args,
    /// The target's return value
    Returned,
    /// The exception thrown by the target
    Thrown,
    /// The target's receiver
    This,
}

/// A method parameter.
#[derive(Debug, Clone)]
pub struct Param {
    /// Parameter name
    pub name: String,
    /// Parameter type
    pub ty: TypeRef,
    /// Direction flags
    pub direction: ParamDirection,
    /// Accessor tag, advice methods only
    pub accessor: Option<Accessor>,
    /// Parameter attributes
    pub attrs: Vec<Attribute>,
}

impl Param {
    /// Create an ordinary parameter.
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Param {
            name: name.into(),
            ty,
            direction: ParamDirection::Normal,
            accessor: None,
            attrs: Vec::new(),
        }
    }

    /// Whether this is an `out` parameter.
    pub fn is_out(&self) -> bool {
        self.direction == ParamDirection::Out
    }

    /// Whether the parameter type is by-reference.
    pub fn is_by_ref(&self) -> bool {
        self.ty.is_by_ref()
    }

    /// Whether this is a plain `ref` parameter (by-reference, neither `in`
    /// nor `out`).
    pub fn is_plain_ref(&self) -> bool {
        self.is_by_ref() && self.direction == ParamDirection::Normal
    }
}

/// Strategy for binding an advice generic parameter to a concrete type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GenericBinding {
    /// Look up a same-named generic parameter on the target
    #[default]
    ByName,
    /// Unify advice parameter types against target parameter types
    ByParamType,
}

/// A generic parameter declaration.
#[derive(Debug, Clone, Default)]
pub struct GenericParamDef {
    /// Parameter name
    pub name: String,
    /// Binding strategy tag, advice methods only
    pub binding: GenericBinding,
    /// Declared constraints
    pub constraints: Vec<TypeRef>,
    /// Nullable annotation on the parameter or a constraint
    pub nullable: bool,
    /// Attributes
    pub attrs: Vec<Attribute>,
}

impl GenericParamDef {
    /// Create an unconstrained generic parameter.
    pub fn new(name: impl Into<String>) -> Self {
        GenericParamDef {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// The temporal relation of advice to the target call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinPoint {
    /// Before the original body
    Before,
    /// Replacing the original call (unsupported)
    Around,
    /// After a normal return
    AfterReturning,
    /// After an exception, before it propagates
    AfterThrowing,
    /// Unconditionally after
    After,
}

impl std::fmt::Display for JoinPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JoinPoint::Before => "Before",
            JoinPoint::Around => "Around",
            JoinPoint::AfterReturning => "AfterReturning",
            JoinPoint::AfterThrowing => "AfterThrowing",
            JoinPoint::After => "After",
        };
        write!(f, "{s}")
    }
}

/// The advice tag carried by a tagged method or constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdviceTag {
    /// Join point of the advice
    pub join_point: JoinPoint,
    /// Permits by-reference advice parameters
    pub unsafe_injection: bool,
}

/// A pattern pointcut tag: a regular expression matched against the target
/// signature rendered under `mask`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointcutSpec {
    /// Pattern source text
    pub pattern: String,
    /// Signature detail mask the pattern is matched under
    pub mask: DetailFlags,
}

impl PointcutSpec {
    /// Create a pointcut spec with the default (`SIMPLE`) mask.
    pub fn new(pattern: impl Into<String>) -> Self {
        PointcutSpec {
            pattern: pattern.into(),
            mask: DetailFlags::SIMPLE,
        }
    }

    /// Create a pointcut spec with an explicit mask.
    pub fn with_mask(pattern: impl Into<String>, mask: DetailFlags) -> Self {
        PointcutSpec {
            pattern: pattern.into(),
            mask,
        }
    }
}

/// A method or constructor declaration.
#[derive(Debug, Clone)]
pub struct MethodDef {
    /// Method name
    pub name: String,
    /// Constructor flag
    pub is_ctor: bool,
    /// Access level
    pub access: Access,
    /// Static flag; instance methods take a receiver
    pub is_static: bool,
    /// Virtual-dispatch standing
    pub virtuality: Virtuality,
    /// Parameters in declaration order
    pub params: Vec<Param>,
    /// Return type; `void` for none
    pub return_type: TypeRef,
    /// Attributes on the return value
    pub return_attrs: Vec<Attribute>,
    /// Generic parameter declarations
    pub generic_params: Vec<GenericParamDef>,
    /// Method attributes
    pub attrs: Vec<Attribute>,
    /// Executable body, absent for abstract/external methods
    pub body: Option<Body>,
    /// Inlining hint carried onto shadow methods
    pub always_inline: bool,
    /// Advice tag, when this method is advice
    pub advice: Option<AdviceTag>,
    /// Method-level pointcut tags
    pub pointcuts: Vec<PointcutSpec>,
    /// Weaving opt-out tag
    pub opt_out: bool,
    /// Masks to report rendered signatures under (side log opt-in)
    pub signature_logs: Vec<DetailFlags>,
}

impl MethodDef {
    /// Create a public instance method with an empty signature.
    pub fn new(name: impl Into<String>, return_type: TypeRef) -> Self {
        MethodDef {
            name: name.into(),
            is_ctor: false,
            access: Access::Public,
            is_static: false,
            virtuality: Virtuality::None,
            params: Vec::new(),
            return_type,
            return_attrs: Vec::new(),
            generic_params: Vec::new(),
            attrs: Vec::new(),
            body: None,
            always_inline: false,
            advice: None,
            pointcuts: Vec::new(),
            opt_out: false,
            signature_logs: Vec::new(),
        }
    }

    /// Whether the method returns a value.
    pub fn has_return(&self) -> bool {
        self.return_type != TypeRef::Primitive(crate::ty::Primitive::Void)
    }

    /// Whether the method takes a receiver.
    pub fn has_this(&self) -> bool {
        !self.is_static
    }

    /// Whether the method declares generic parameters.
    pub fn is_generic(&self) -> bool {
        !self.generic_params.is_empty()
    }

    /// Find a parameter by name.
    pub fn param(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Find a parameter index by name.
    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p.name == name)
    }

    /// Find a declared generic parameter by name.
    pub fn generic_param(&self, name: &str) -> Option<&GenericParamDef> {
        self.generic_params.iter().find(|g| g.name == name)
    }
}

/// A method together with its declaring type and module.
#[derive(Debug, Clone, Copy)]
pub struct MethodSite<'a> {
    /// Module declaring the type
    pub module: &'a Module,
    /// Declaring type
    pub owner: &'a TypeDef,
    /// The method itself
    pub method: &'a MethodDef,
}

impl<'a> MethodSite<'a> {
    /// Bundle a method with its context.
    pub fn new(module: &'a Module, owner: &'a TypeDef, method: &'a MethodDef) -> Self {
        MethodSite {
            module,
            owner,
            method,
        }
    }

    /// `Type::method` path for diagnostics.
    pub fn path(&self) -> String {
        format!("{}::{}", self.owner.name, self.method.name)
    }
}

/// A custom attribute as rendered in signatures.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    /// Attribute type name
    pub ty: TypeName,
    /// Constructor arguments
    pub args: Vec<AttrValue>,
    /// Named fields and properties
    pub props: Vec<(String, AttrValue)>,
}

impl Attribute {
    /// Create an attribute with no arguments.
    pub fn new(ty: TypeName) -> Self {
        Attribute {
            ty,
            args: Vec::new(),
            props: Vec::new(),
        }
    }
}

/// A constant attribute argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// Boolean constant
    Bool(bool),
    /// Integer constant
    Int(i64),
    /// Floating constant
    Float(f64),
    /// String constant
    Str(String),
    /// Enum constant with its declaring enum type
    Enum {
        /// Enum type name
        ty: TypeName,
        /// Raw constant value
        value: i64,
    },
    /// Nested argument array
    Array(Vec<AttrValue>),
}

impl AttrValue {
    /// The value as raw bits, for flags-enum decomposition.
    pub fn as_bits(&self) -> Option<u64> {
        match self {
            AttrValue::Int(v) => Some(*v as u64),
            AttrValue::Enum { value, .. } => Some(*value as u64),
            _ => None,
        }
    }
}
