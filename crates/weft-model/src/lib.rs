//! Structural data model for the weft aspect weaver
//!
//! This crate defines the objects a module loader hands to the weaver:
//! modules, types, methods, executable bodies, attributes, advice tag
//! metadata, the signature detail mask, and the resolution/compatibility
//! environment over a module world.

pub mod body;
pub mod flags;
pub mod module;
pub mod ty;
pub mod world;

pub use body::{
    Body, BodyError, Const, ExceptionHandler, HandlerKind, Instr, InstrId, Local, LocalId,
    MethodSpec, RuntimeFn,
};
pub use flags::DetailFlags;
pub use module::{
    Access, Accessor, AdviceTag, AttrValue, Attribute, EnumVariant, GenericBinding,
    GenericParamDef, JoinPoint, MethodDef, MethodSite, Module, Param, ParamDirection,
    PointcutSpec, TypeDef, TypeKind, Virtuality,
};
pub use ty::{well_known, GenericOwner, GenericParamRef, Primitive, TypeName, TypeRef};
pub use world::{TypeEnv, World};
