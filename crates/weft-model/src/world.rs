//! The module world and type resolution
//!
//! A [`World`] holds everything the weaver may read while transforming one
//! module: the referenced modules and the fixed core runtime module. A
//! [`TypeEnv`] bundles the module under transformation with its world and
//! answers name resolution and compatibility questions.

use crate::module::{GenericParamDef, Module, TypeDef};
use crate::ty::{Primitive, TypeName, TypeRef};

/// Read-only context for one processing pass.
#[derive(Debug, Default)]
pub struct World {
    /// Modules referenced by the module under transformation
    pub refs: Vec<Module>,
    /// The fixed core runtime module
    pub core: Module,
}

impl World {
    /// Create a world around a core runtime module.
    pub fn new(core: Module) -> Self {
        World {
            refs: Vec::new(),
            core,
        }
    }
}

/// Type lookup and compatibility over a main module plus its world.
#[derive(Debug, Clone, Copy)]
pub struct TypeEnv<'a> {
    /// The module under transformation
    pub main: &'a Module,
    /// Its read-only surroundings
    pub world: &'a World,
}

impl<'a> TypeEnv<'a> {
    /// Create an environment.
    pub fn new(main: &'a Module, world: &'a World) -> Self {
        TypeEnv { main, world }
    }

    /// Resolve a type name: main module first, then references, then core.
    pub fn resolve(&self, name: &TypeName) -> Option<&'a TypeDef> {
        self.main
            .type_def(name)
            .or_else(|| self.world.refs.iter().find_map(|m| m.type_def(name)))
            .or_else(|| self.world.core.type_def(name))
    }

    /// Resolve the definition behind a type reference, when it has one.
    pub fn resolve_ref(&self, ty: &TypeRef) -> Option<&'a TypeDef> {
        match ty {
            TypeRef::Named(name) => self.resolve(name),
            TypeRef::GenericInst { base, .. } => self.resolve_ref(base),
            _ => None,
        }
    }

    /// Collect the base type and interfaces of a type reference.
    pub fn base_and_interfaces(&self, ty: &TypeRef, out: &mut Vec<TypeRef>) {
        if let Some(def) = self.resolve_ref(ty) {
            if let Some(base) = &def.base {
                out.push(base.clone());
            }
            out.extend(def.interfaces.iter().cloned());
        }
    }

    /// Whether values of the type live inline rather than by reference.
    pub fn is_value_type(&self, ty: &TypeRef) -> bool {
        match ty {
            TypeRef::Primitive(p) => p.is_value(),
            TypeRef::Named(_) | TypeRef::GenericInst { .. } => self
                .resolve_ref(ty)
                .map(|def| def.is_value_type())
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Whether a value of `sub` can be used where `sup` is expected.
    ///
    /// Reflexive structural equality, everything under `object`, and the
    /// nominal base-type/interface walk for named types. By-reference types
    /// are invariant in their element.
    pub fn is_compatible(&self, sub: &TypeRef, sup: &TypeRef) -> bool {
        let mut visited = Vec::new();
        self.is_compatible_inner(sub, sup, &mut visited)
    }

    fn is_compatible_inner(
        &self,
        sub: &TypeRef,
        sup: &TypeRef,
        visited: &mut Vec<TypeName>,
    ) -> bool {
        if sub == sup {
            return true;
        }

        if matches!(sup, TypeRef::Primitive(Primitive::Object)) {
            return true;
        }

        // An open generic parameter accepts any binding here; constraint
        // checking happens separately against the parameter declaration.
        if matches!(sup, TypeRef::GenericParam(_)) {
            return true;
        }

        if let (
            TypeRef::GenericInst {
                base: sub_base,
                args: sub_args,
            },
            TypeRef::GenericInst {
                base: sup_base,
                args: sup_args,
            },
        ) = (sub, sup)
        {
            if sub_base == sup_base
                && sub_args.len() == sup_args.len()
                && sub_args
                    .iter()
                    .zip(sup_args)
                    .all(|(a, b)| self.is_compatible_inner(a, b, visited))
            {
                return true;
            }
        }

        match (sub, sup) {
            (TypeRef::ByRef(a), TypeRef::ByRef(b)) => a == b,
            (TypeRef::Named(_) | TypeRef::GenericInst { .. }, _) => {
                // Cycle guard for malformed inheritance chains.
                if let TypeRef::Named(name) = sub {
                    if visited.contains(name) {
                        return false;
                    }
                    visited.push(name.clone());
                }

                let mut supers = Vec::new();
                self.base_and_interfaces(sub, &mut supers);
                supers
                    .iter()
                    .any(|s| self.is_compatible_inner(s, sup, visited))
            }
            _ => false,
        }
    }

    /// Whether a resolved generic argument satisfies an advice generic
    /// parameter's declared constraints.
    pub fn satisfies_constraints(&self, ty: &TypeRef, param: &GenericParamDef) -> bool {
        param.constraints.iter().all(|c| self.is_compatible(ty, c))
    }

    /// Whether supplying `src` where `dst` is expected requires boxing:
    /// value-typed (or open generic) source, reference-typed destination.
    pub fn boxing_required(&self, src: &TypeRef, dst: &TypeRef) -> bool {
        let src_boxable = self.is_value_type(src) || matches!(src, TypeRef::GenericParam(_));
        let dst_reference =
            !self.is_value_type(dst) && !matches!(dst, TypeRef::GenericParam(_));
        src_boxable && dst_reference
    }
}
