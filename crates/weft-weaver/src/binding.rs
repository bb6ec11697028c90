//! Generic binding resolution
//!
//! Resolves an advice method's generic parameters to concrete types for a
//! given target method. Two strategies, selected per parameter by its
//! declared binding mode: look up a same-named generic parameter on the
//! target (then its declaring type), or structurally unify the advice's
//! parameter types against the target's.

use weft_model::module::Accessor;
use weft_model::world::TypeEnv;
use weft_model::{GenericParamRef, MethodDef, MethodSite, TypeRef};

use crate::scratch;

/// Base-chain recursion cap for malformed inheritance graphs.
const MAX_DEPTH: usize = 64;

/// Resolve a generic parameter by name: the target method's generic
/// parameters first, then its declaring type's. The result is the target's
/// own open parameter, so woven code stays generic over it.
pub fn resolve_by_name(target: MethodSite, name: &str) -> Option<TypeRef> {
    if target.method.generic_param(name).is_some() {
        return Some(TypeRef::GenericParam(GenericParamRef::method(name)));
    }
    if target.owner.generic_param(name).is_some() {
        return Some(TypeRef::GenericParam(GenericParamRef::ty(name)));
    }
    None
}

/// Collect candidate bindings for the advice generic parameter `gp_name`
/// by walking the advice's parameters in order and unifying each one's
/// type against the corresponding target type: the same-named target
/// parameter, the return type for a return accessor, or the declaring type
/// for a this-accessor. Every successful unification is pushed; the caller
/// treats more than one distinct result as an ambiguity.
pub fn find_by_param_type(
    env: &TypeEnv,
    target: MethodSite,
    advice: &MethodDef,
    gp_name: &str,
    results: &mut Vec<TypeRef>,
) {
    let gp = GenericParamRef::method(gp_name);
    for advice_param in &advice.params {
        let advice_ty = advice_param.ty.strip_by_ref();
        let target_ty = match advice_param.accessor {
            Some(Accessor::Returned) => target.method.return_type.clone(),
            Some(Accessor::This) => target.owner.self_ref(),
            Some(_) => continue,
            None => match target.method.param(&advice_param.name) {
                Some(p) => p.ty.clone(),
                None => continue,
            },
        };

        if let Some(found) = unify(env, &target_ty, advice_ty, &gp, 0) {
            results.push(found);
        }
    }
}

/// Structurally unify a target type against an advice type, looking for
/// the concrete type standing where `gp` appears on the advice side.
fn unify(
    env: &TypeEnv,
    target_ty: &TypeRef,
    advice_ty: &TypeRef,
    gp: &GenericParamRef,
    depth: usize,
) -> Option<TypeRef> {
    if depth > MAX_DEPTH {
        return None;
    }

    match (advice_ty, target_ty) {
        (TypeRef::GenericParam(p), _) if p == gp => return Some(target_ty.clone()),
        (
            TypeRef::GenericInst { args: advice_args, .. },
            TypeRef::GenericInst { args: target_args, .. },
        ) => {
            for (t, a) in target_args.iter().zip(advice_args) {
                if let Some(found) = unify(env, t, a, gp, depth + 1) {
                    return Some(found);
                }
            }
        }
        (
            TypeRef::Modified {
                modifier: advice_mod,
                elem: advice_elem,
                ..
            },
            TypeRef::Modified {
                modifier: target_mod,
                elem: target_elem,
                ..
            },
        ) => {
            if let Some(found) = unify(env, target_elem, advice_elem, gp, depth + 1) {
                return Some(found);
            }
            if let Some(found) = unify(env, target_mod, advice_mod, gp, depth + 1) {
                return Some(found);
            }
        }
        (
            TypeRef::FnPointer {
                params: advice_params,
                ret: advice_ret,
            },
            TypeRef::FnPointer {
                params: target_params,
                ret: target_ret,
            },
        ) => {
            if let Some(found) = unify(env, target_ret, advice_ret, gp, depth + 1) {
                return Some(found);
            }
            for (t, a) in target_params.iter().zip(advice_params) {
                if let Some(found) = unify(env, t, a, gp, depth + 1) {
                    return Some(found);
                }
            }
        }
        // The remaining specification wrappers descend by element.
        (TypeRef::ByRef(a), TypeRef::ByRef(t))
        | (TypeRef::Pointer(a), TypeRef::Pointer(t))
        | (TypeRef::Pinned(a), TypeRef::Pinned(t))
        | (TypeRef::Array { elem: a, .. }, TypeRef::Array { elem: t, .. }) => {
            if let Some(found) = unify(env, t, a, gp, depth + 1) {
                return Some(found);
            }
        }
        _ => {}
    }

    // No direct match: recurse through the target's base type and
    // interfaces.
    let mut supers = scratch::scoped::<TypeRef>();
    env.base_and_interfaces(target_ty, &mut supers);
    for super_ty in supers.iter() {
        if let Some(found) = unify(env, super_ty, advice_ty, gp, depth + 1) {
            return Some(found);
        }
    }

    None
}
