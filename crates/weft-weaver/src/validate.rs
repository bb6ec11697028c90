//! Advice validation
//!
//! Three tiers, strictly front-loaded before any mutation: aspect-level
//! (once per advice-declaring type of the local module), advice-level
//! (once per advice, independent of any target), and advice-vs-target
//! (once per matched pair, before weaving). The first two tiers suppress
//! weaving for the whole module; the third excludes only the affected
//! target method.

use weft_model::module::Accessor;
use weft_model::ty::well_known;
use weft_model::world::TypeEnv;
use weft_model::{JoinPoint, MethodSite, TypeDef, TypeName, TypeRef};

use crate::binding;
use crate::diag::{codes, Diagnostics};
use crate::registry::AdviceDescriptor;
use crate::scratch;

/// Aspect-level validation of an advice-declaring type. Returns whether
/// any error was recorded.
pub fn validate_aspect(ty: &TypeDef, diags: &mut Diagnostics) -> bool {
    if ty.is_static {
        return false;
    }

    let mut has_error = false;
    let element = ty.name.to_string();

    let has_ctor_advice = ty
        .methods
        .iter()
        .any(|m| m.is_ctor && m.advice.is_some());
    if !has_ctor_advice {
        diags.error(
            codes::ASPECT_MISSING_CTOR,
            element.clone(),
            format!("instance aspect \"{}\" must have a constructor advice", ty.name),
        );
        has_error = true;
    }

    if ty.is_abstract {
        diags.error(
            codes::ASPECT_ABSTRACT,
            element.clone(),
            format!("instance aspect \"{}\" cannot be abstract", ty.name),
        );
        has_error = true;
    }

    if ty.is_generic() {
        diags.error(
            codes::ASPECT_GENERIC,
            element,
            format!("instance aspect \"{}\" cannot be a generic definition", ty.name),
        );
        has_error = true;
    }

    has_error
}

/// Advice-level validation of one descriptor, independent of any target.
pub fn validate_advice(env: &TypeEnv, adv: &AdviceDescriptor, diags: &mut Diagnostics) -> bool {
    let mut has_error = false;
    let path = adv.path();
    let method = &adv.method;

    if adv.pointcuts.is_empty() {
        diags.error(
            codes::ADVICE_NO_POINTCUT,
            path.clone(),
            format!(
                "advice method \"{path}\" must have a pointcut, either on the method itself or on its declaring type"
            ),
        );
        has_error = true;
    }

    match env.resolve(&adv.owner) {
        Some(owner) if owner.is_aspect => {}
        Some(_) => {
            diags.error(
                codes::ADVICE_OUTSIDE_ASPECT,
                path.clone(),
                format!("advice method \"{path}\" must be declared in an aspect type"),
            );
            has_error = true;
        }
        None => {
            // Structural-resolution failure: skip the check, keep going.
            log::warn!("{}: resolve failed for {}", env.main.name, adv.owner);
        }
    }

    if method.access != weft_model::Access::Public {
        diags.error(
            codes::ADVICE_NOT_PUBLIC,
            path.clone(),
            format!("advice method \"{path}\" must be public"),
        );
        has_error = true;
    }

    if method.params.iter().any(|p| p.is_out()) {
        diags.error(
            codes::ADVICE_OUT_PARAM,
            path.clone(),
            format!("advice method \"{path}\" cannot have out parameters"),
        );
        has_error = true;
    }

    if method.has_return() {
        diags.error(
            codes::ADVICE_RETURNS_VALUE,
            path.clone(),
            format!("advice method \"{path}\" must not return a value"),
        );
        has_error = true;
    }

    if !adv.unsafe_injection && method.params.iter().any(|p| p.is_plain_ref()) {
        diags.error(
            codes::ADVICE_REF_PARAM,
            path.clone(),
            format!(
                "advice method \"{path}\" cannot have ref parameters unless unsafe injection is set"
            ),
        );
        has_error = true;
    }

    for kind in [
        Accessor::MethodHandle,
        Accessor::Args,
        Accessor::Returned,
        Accessor::This,
    ] {
        if method.params.iter().filter(|p| p.accessor == Some(kind)).count() > 1 {
            diags.error(
                codes::DUPLICATE_ACCESSOR,
                path.clone(),
                format!("advice method \"{path}\" declares more than one {kind:?} accessor"),
            );
            has_error = true;
        }
    }

    if let Some(p) = method
        .params
        .iter()
        .find(|p| p.accessor == Some(Accessor::MethodHandle))
    {
        if p.ty != TypeRef::Named(well_known::method_token()) {
            diags.error(
                codes::BAD_METHOD_ACCESSOR_TYPE,
                path.clone(),
                format!("method accessor \"{}\" must be of the method handle type", p.name),
            );
            has_error = true;
        }
    }

    if let Some(p) = method
        .params
        .iter()
        .find(|p| p.accessor == Some(Accessor::Args))
    {
        if p.ty != TypeRef::Named(well_known::arg_view()) {
            diags.error(
                codes::BAD_ARGS_ACCESSOR_TYPE,
                path.clone(),
                format!("args accessor \"{}\" must be of the argument view type", p.name),
            );
            has_error = true;
        }
    }

    // Parameter types a by-parameter-type binding may appear in: this and
    // return accessors plus every ordinary parameter.
    let bindable: Vec<&TypeRef> = method
        .params
        .iter()
        .filter(|p| {
            matches!(p.accessor, None | Some(Accessor::This) | Some(Accessor::Returned))
        })
        .map(|p| &p.ty)
        .collect();

    for gp in &method.generic_params {
        if gp.nullable {
            diags.error(
                codes::NULLABLE_GENERIC_PARAM,
                path.clone(),
                format!("generic parameter \"{}\" in advice method \"{path}\" cannot be nullable", gp.name),
            );
            has_error = true;
        }

        if gp
            .constraints
            .iter()
            .any(contains_any_generic_param)
        {
            diags.error(
                codes::CONSTRAINT_HAS_GENERIC_PARAM,
                path.clone(),
                format!(
                    "generic parameter \"{}\" in advice method \"{path}\" cannot have constraints that contain generic parameters",
                    gp.name
                ),
            );
            has_error = true;
        }

        if gp.binding == weft_model::GenericBinding::ByParamType {
            let gp_ref = weft_model::GenericParamRef::method(&gp.name);
            if bindable.iter().all(|ty| !ty.contains_generic_param(&gp_ref)) {
                diags.error(
                    codes::BINDING_UNUSED,
                    path.clone(),
                    format!(
                        "generic parameter \"{}\" in advice method \"{path}\" is not bound to any parameter type",
                        gp.name
                    ),
                );
                has_error = true;
            }
        }
    }

    has_error |= validate_shape(env, adv, diags);
    has_error
}

/// Join-point-specific shape rules.
fn validate_shape(env: &TypeEnv, adv: &AdviceDescriptor, diags: &mut Diagnostics) -> bool {
    let mut has_error = false;
    let path = adv.path();

    let forbid_returned = |code, diags: &mut Diagnostics, has_error: &mut bool| {
        if adv.returned_type.is_some() {
            diags.error(
                code,
                path.clone(),
                format!("{} advice method \"{path}\" cannot have a return accessor", adv.join_point),
            );
            *has_error = true;
        }
    };

    match adv.join_point {
        JoinPoint::Before => {
            forbid_returned(codes::BEFORE_RETURNED_ACCESSOR, diags, &mut has_error);
            if adv.thrown_type.is_some() {
                diags.error(
                    codes::BEFORE_THROWN_ACCESSOR,
                    path.clone(),
                    format!("Before advice method \"{path}\" cannot have a thrown accessor"),
                );
                has_error = true;
            }
        }
        JoinPoint::AfterReturning => {
            if adv.thrown_type.is_some() {
                diags.error(
                    codes::AFTER_RETURNING_THROWN_ACCESSOR,
                    path.clone(),
                    format!("AfterReturning advice method \"{path}\" cannot have a thrown accessor"),
                );
                has_error = true;
            }
            if adv.is_ctor() {
                diags.error(
                    codes::AFTER_RETURNING_CTOR,
                    path.clone(),
                    format!("AfterReturning advice method \"{path}\" cannot be a constructor"),
                );
                has_error = true;
            }
        }
        JoinPoint::AfterThrowing => {
            forbid_returned(codes::AFTER_THROWING_RETURNED_ACCESSOR, diags, &mut has_error);
            let thrown_count = adv
                .method
                .params
                .iter()
                .filter(|p| p.accessor == Some(Accessor::Thrown))
                .count();
            if thrown_count > 1 {
                diags.error(
                    codes::AFTER_THROWING_MULTIPLE_THROWN,
                    path.clone(),
                    format!(
                        "AfterThrowing advice method \"{path}\" cannot have more than one thrown accessor"
                    ),
                );
                has_error = true;
            }
            if let Some(thrown) = &adv.thrown_type {
                if !env.is_compatible(thrown, &TypeRef::Named(well_known::exception())) {
                    diags.error(
                        codes::AFTER_THROWING_BAD_THROWN_TYPE,
                        path.clone(),
                        format!(
                            "AfterThrowing advice method \"{path}\" may only declare a thrown accessor of an exception type"
                        ),
                    );
                    has_error = true;
                }
            }
            if adv.is_ctor() {
                diags.error(
                    codes::AFTER_THROWING_CTOR,
                    path.clone(),
                    format!("AfterThrowing advice method \"{path}\" cannot be a constructor"),
                );
                has_error = true;
            }
        }
        JoinPoint::After => {
            forbid_returned(codes::AFTER_RETURNED_ACCESSOR, diags, &mut has_error);
            if adv.thrown_type.is_some() {
                diags.error(
                    codes::AFTER_THROWN_ACCESSOR,
                    path.clone(),
                    format!("After advice method \"{path}\" cannot have a thrown accessor"),
                );
                has_error = true;
            }
            if adv.is_ctor() {
                diags.error(
                    codes::AFTER_CTOR,
                    path.clone(),
                    format!("After advice method \"{path}\" cannot be a constructor"),
                );
                has_error = true;
            }
        }
        JoinPoint::Around => {
            diags.error(
                codes::AROUND_UNSUPPORTED,
                path.clone(),
                format!("Around advice is not supported yet in method \"{path}\""),
            );
            has_error = true;
        }
    }

    has_error
}

/// Whether any generic parameter occurs in the type.
fn contains_any_generic_param(ty: &TypeRef) -> bool {
    match ty {
        TypeRef::GenericParam(_) => true,
        TypeRef::GenericInst { args, .. } => args.iter().any(contains_any_generic_param),
        TypeRef::Modified { modifier, elem, .. } => {
            contains_any_generic_param(elem) || contains_any_generic_param(modifier)
        }
        TypeRef::FnPointer { params, ret } => {
            contains_any_generic_param(ret) || params.iter().any(contains_any_generic_param)
        }
        TypeRef::ByRef(elem) | TypeRef::Pointer(elem) | TypeRef::Pinned(elem) => {
            contains_any_generic_param(elem)
        }
        TypeRef::Array { elem, .. } => contains_any_generic_param(elem),
        TypeRef::Primitive(_) | TypeRef::Named(_) => false,
    }
}

/// Advice-vs-target validation of every matched advice for one target,
/// including the per-aspect constructor-advice invariants. Returns whether
/// any error was recorded; errors exclude only this target method.
pub fn validate_matched(
    env: &TypeEnv,
    target: MethodSite,
    matched: &[&AdviceDescriptor],
    diags: &mut Diagnostics,
) -> bool {
    let mut has_error = false;

    let mut instance_groups: Vec<(&TypeName, Vec<&AdviceDescriptor>)> = Vec::new();
    for &adv in matched {
        has_error |= validate_against(env, target, adv, diags);

        if adv.method.has_this() {
            match instance_groups.iter_mut().find(|(owner, _)| **owner == adv.owner) {
                Some((_, group)) => group.push(adv),
                None => instance_groups.push((&adv.owner, vec![adv])),
            }
        }
    }

    for (owner, group) in &instance_groups {
        has_error |= validate_aspect_group(target, owner, group, diags);
    }

    has_error
}

/// Constructor-advice invariants for one matched aspect type: exactly one
/// constructor advice must be in the matched set. The shape rules already
/// pin constructor advice to the Before join point, so the instance is
/// always initialized before any instance advice runs.
fn validate_aspect_group(
    target: MethodSite,
    owner: &TypeName,
    group: &[&AdviceDescriptor],
    diags: &mut Diagnostics,
) -> bool {
    let mut has_error = false;
    let target_path = target.path();

    let ctor_count = group.iter().filter(|a| a.is_ctor()).count();
    if ctor_count == 0 {
        diags.error(
            codes::ASPECT_CTOR_NOT_MATCHED,
            owner.to_string(),
            format!(
                "aspect \"{owner}\" must have a matching constructor advice to be applied to method \"{target_path}\""
            ),
        );
        has_error = true;
    }
    if ctor_count >= 2 {
        diags.error(
            codes::ASPECT_CTOR_AMBIGUOUS,
            owner.to_string(),
            format!(
                "aspect \"{owner}\" cannot have more than one matching constructor advice for method \"{target_path}\""
            ),
        );
        has_error = true;
    }

    has_error
}

/// Advice-vs-target validation of one pair.
pub fn validate_against(
    env: &TypeEnv,
    target: MethodSite,
    adv: &AdviceDescriptor,
    diags: &mut Diagnostics,
) -> bool {
    let mut has_error = false;
    let path = adv.path();
    let target_path = target.path();

    for gp in &adv.method.generic_params {
        let resolved = match gp.binding {
            weft_model::GenericBinding::ByName => {
                match binding::resolve_by_name(target, &gp.name) {
                    Some(ty) => ty,
                    None => {
                        diags.error(
                            codes::GENERIC_NAME_NOT_FOUND,
                            path.clone(),
                            format!(
                                "generic parameter \"{}\" is not defined in \"{target_path}\"",
                                gp.name
                            ),
                        );
                        has_error = true;
                        continue;
                    }
                }
            }
            weft_model::GenericBinding::ByParamType => {
                let mut candidates = scratch::scoped::<TypeRef>();
                binding::find_by_param_type(env, target, &adv.method, &gp.name, &mut candidates);

                let mut distinct: Vec<&TypeRef> = Vec::new();
                for c in candidates.iter() {
                    if !distinct.contains(&c) {
                        distinct.push(c);
                    }
                }
                if distinct.len() > 1 {
                    let listed = distinct
                        .iter()
                        .map(|t| t.to_string())
                        .collect::<Vec<_>>()
                        .join(", ");
                    diags.error(
                        codes::GENERIC_BINDING_AMBIGUOUS,
                        path.clone(),
                        format!(
                            "multiple bound types found for generic parameter \"{}\" in \"{target_path}\": {listed}",
                            gp.name
                        ),
                    );
                    has_error = true;
                }

                match candidates.first() {
                    Some(ty) => ty.clone(),
                    None => {
                        diags.error(
                            codes::GENERIC_BINDING_NOT_FOUND,
                            path.clone(),
                            format!(
                                "cannot find a bound type for generic parameter \"{}\" in \"{target_path}\"",
                                gp.name
                            ),
                        );
                        has_error = true;
                        continue;
                    }
                }
            }
        };

        // Constraints can only be evaluated against closed bindings.
        if !matches!(resolved, TypeRef::GenericParam(_))
            && !env.satisfies_constraints(&resolved, gp)
        {
            diags.error(
                codes::GENERIC_BINDING_INCOMPATIBLE,
                path.clone(),
                format!(
                    "type mismatch for generic parameter \"{}\" in \"{target_path}\"",
                    gp.name
                ),
            );
            has_error = true;
        }
    }

    for advice_param in adv.method.params.iter().filter(|p| p.accessor.is_none()) {
        let Some(param) = target.method.param(&advice_param.name) else {
            diags.error(
                codes::PARAM_NOT_FOUND,
                path.clone(),
                format!(
                    "\"{}\" is not defined in \"{target_path}\"",
                    advice_param.name
                ),
            );
            has_error = true;
            continue;
        };

        let target_elem = param.ty.strip_by_ref();
        match &advice_param.ty {
            TypeRef::ByRef(advice_elem) => {
                if target_elem != advice_elem.as_ref() {
                    diags.error(
                        codes::PARAM_REF_MISMATCH,
                        path.clone(),
                        format!(
                            "type mismatch for parameter \"{}\" in \"{target_path}\": expected {}, found {}",
                            advice_param.name, param.ty, advice_param.ty
                        ),
                    );
                    has_error = true;
                }
            }
            advice_ty => {
                if !env.is_compatible(target_elem, advice_ty) {
                    diags.error(
                        codes::PARAM_TYPE_MISMATCH,
                        path.clone(),
                        format!(
                            "type mismatch for parameter \"{}\" in \"{target_path}\": expected {}, found {}",
                            advice_param.name, param.ty, advice_param.ty
                        ),
                    );
                    has_error = true;
                }
            }
        }
    }

    if let Some(this_ty) = &adv.this_type {
        if target.method.is_static {
            diags.error(
                codes::THIS_ON_STATIC,
                path.clone(),
                format!(
                    "this accessor in advice method \"{path}\" cannot bind to static method \"{target_path}\""
                ),
            );
            has_error = true;
        } else if !env.is_compatible(&target.owner.self_ref(), this_ty) {
            diags.error(
                codes::THIS_TYPE_MISMATCH,
                path.clone(),
                format!(
                    "type mismatch for this accessor in advice method \"{path}\": expected {}, found {this_ty}",
                    target.owner.name
                ),
            );
            has_error = true;
        }
    }

    match adv.join_point {
        JoinPoint::Before => {
            has_error |= reject_out_bindings(target, adv, codes::BEFORE_OUT_BINDING, diags);
        }
        JoinPoint::AfterReturning => {
            has_error |= validate_returned(env, target, adv, diags);
        }
        JoinPoint::AfterThrowing => {
            has_error |= reject_out_bindings(target, adv, codes::AFTER_THROWING_OUT_BINDING, diags);
        }
        JoinPoint::After => {
            has_error |= reject_out_bindings(target, adv, codes::AFTER_OUT_BINDING, diags);
        }
        JoinPoint::Around => {}
    }

    has_error
}

fn reject_out_bindings(
    target: MethodSite,
    adv: &AdviceDescriptor,
    code: crate::diag::ErrorCode,
    diags: &mut Diagnostics,
) -> bool {
    let mut has_error = false;
    for advice_param in adv.method.params.iter().filter(|p| p.accessor.is_none()) {
        if let Some(param) = target.method.param(&advice_param.name) {
            if param.is_out() {
                diags.error(
                    code,
                    adv.path(),
                    format!(
                        "{} advice method \"{}\" cannot bind to out parameter \"{}\" of method \"{}\"",
                        adv.join_point,
                        adv.path(),
                        param.name,
                        target.path()
                    ),
                );
                has_error = true;
            }
        }
    }
    has_error
}

fn validate_returned(
    env: &TypeEnv,
    target: MethodSite,
    adv: &AdviceDescriptor,
    diags: &mut Diagnostics,
) -> bool {
    let mut has_error = false;
    let method_ret = target.method.return_type.strip_by_ref();

    match &adv.returned_type {
        Some(TypeRef::ByRef(elem)) => {
            if method_ret != elem.as_ref() {
                diags.error(
                    codes::RETURNED_REF_MISMATCH,
                    adv.path(),
                    format!(
                        "type mismatch for return accessor in AfterReturning advice \"{}\": expected {}, found ref {elem}",
                        adv.path(),
                        target.method.return_type
                    ),
                );
                has_error = true;
            }
        }
        Some(returned) => {
            if !env.is_compatible(method_ret, returned) {
                diags.error(
                    codes::RETURNED_TYPE_MISMATCH,
                    adv.path(),
                    format!(
                        "type mismatch for return accessor in AfterReturning advice \"{}\": expected {}, found {returned}",
                        adv.path(),
                        target.method.return_type
                    ),
                );
                has_error = true;
            }
        }
        None => {}
    }

    if adv.returned_type.is_some() && !target.method.has_return() {
        diags.error(
            codes::RETURNED_ON_VOID,
            adv.path(),
            format!(
                "AfterReturning advice \"{}\" cannot have a return accessor when applied to void method \"{}\"",
                adv.path(),
                target.path()
            ),
        );
        has_error = true;
    }

    has_error
}
