//! Method-body transformation
//!
//! Weaving is two-phase per type. The plan phase is read-only: it selects
//! matched advice per method, runs advice-vs-target validation, resolves
//! generic instantiations and lowers every advice invocation into argument
//! steps. The apply phase then mutates: the original body moves into a
//! shadow method on the same type, and the original method is rebuilt as
//! an orchestrator that calls advice and the shadow in join-point order,
//! with the exception regions the join points require.

use rustc_hash::FxHashMap;

use weft_model::module::Accessor;
use weft_model::ty::{well_known, Primitive};
use weft_model::world::TypeEnv;
use weft_model::{
    Body, Const, ExceptionHandler, GenericBinding, GenericParamRef, HandlerKind, Instr, InstrId,
    JoinPoint, Local, LocalId, MethodDef, MethodSite, MethodSpec, Module, RuntimeFn, TypeDef,
    TypeName, TypeRef, Virtuality, World,
};

use crate::binding;
use crate::diag::Diagnostics;
use crate::error::WeaveError;
use crate::registry::AdviceDescriptor;
use crate::scratch;
use crate::validate;

/// Name prefix of shadow methods holding original bodies.
pub const SHADOW_PREFIX: &str = "$weft$";

/// How one advice argument is produced at the call site.
#[derive(Debug, Clone)]
struct ArgStep {
    kind: ArgKind,
    /// Load the address instead of the value
    load_addr: bool,
    /// Dereference after loading, with the element type
    deref: Option<TypeRef>,
    /// Box the loaded value as this type
    box_as: Option<TypeRef>,
}

#[derive(Debug, Clone)]
enum ArgKind {
    Handle,
    ArgsView,
    Returned,
    Thrown,
    This,
    Target(usize),
}

/// One advice invocation, fully lowered.
struct PlannedCall<'a> {
    adv: &'a AdviceDescriptor,
    spec: MethodSpec,
    args: Vec<ArgStep>,
}

/// Boxing/dereference handling for one slot of the argument buffer.
struct ArgSlot {
    deref: Option<TypeRef>,
    box_as: Option<TypeRef>,
}

/// Everything the apply phase needs for one method, with no further
/// resolution required.
struct WeavePlan<'a> {
    method_index: usize,
    before: Vec<PlannedCall<'a>>,
    after_returning: Vec<PlannedCall<'a>>,
    /// AfterThrowing advice grouped by declared thrown type, first
    /// occurrence first; `None` is the untyped (match-any) group
    throwing: Vec<(Option<TypeRef>, Vec<PlannedCall<'a>>)>,
    after: Vec<PlannedCall<'a>>,
    needs_args: bool,
    needs_result: bool,
    handle_spec: Option<MethodSpec>,
    shadow_spec: MethodSpec,
    arg_slots: Vec<ArgSlot>,
    return_type: TypeRef,
    has_this: bool,
    param_count: usize,
}

/// Weave every eligible method of the module. Advice-vs-target validation
/// failures exclude single methods; the rest of the module still weaves.
/// Returns the number of rewritten methods.
pub fn weave_module(
    module: &mut Module,
    world: &World,
    advices: &[AdviceDescriptor],
    diags: &mut Diagnostics,
) -> Result<usize, WeaveError> {
    let mut woven = 0;
    for ti in 0..module.types.len() {
        let plans = {
            let env = TypeEnv::new(module, world);
            plan_type(&env, module, &module.types[ti], advices, diags)?
        };

        let ty = &mut module.types[ti];
        for plan in plans {
            apply(ty, plan)?;
            woven += 1;
        }
    }
    Ok(woven)
}

/// Plan phase for one type: select, validate and lower.
fn plan_type<'a>(
    env: &TypeEnv,
    module: &Module,
    ty: &TypeDef,
    advices: &'a [AdviceDescriptor],
    diags: &mut Diagnostics,
) -> Result<Vec<WeavePlan<'a>>, WeaveError> {
    let mut plans = Vec::new();
    if ty.opt_out {
        return Ok(plans);
    }

    for (mi, method) in ty.methods.iter().enumerate() {
        if method.body.is_none() || method.opt_out || method.name.starts_with(SHADOW_PREFIX) {
            continue;
        }

        let site = MethodSite::new(module, ty, method);
        let matched: Vec<&AdviceDescriptor> =
            advices.iter().filter(|a| a.matches(env, site)).collect();
        if matched.is_empty() {
            continue;
        }

        let mut local = Diagnostics::new();
        let failed = validate::validate_matched(env, site, &matched, &mut local);
        diags.extend(local);
        if failed {
            log::debug!("skipping {} after advice-vs-target validation", site.path());
            continue;
        }

        plans.push(build_plan(env, site, mi, &matched)?);
    }

    Ok(plans)
}

/// Ordering within one join-point group: constructor advice first, then
/// non-by-ref return bindings, then ascending by-ref parameter bitmask.
/// The sort is stable, so equal keys keep their discovery order.
fn sort_group(group: &mut [&AdviceDescriptor], target: &MethodDef) {
    group.sort_by_key(|adv| {
        let ctor = u8::from(!adv.is_ctor());
        let ret_ref = u8::from(adv.returned_type.as_ref().is_some_and(|t| t.is_by_ref()));
        (ctor, ret_ref, ref_param_mask(adv, target))
    });
}

/// Bitmask of the first 32 target parameters the advice binds by
/// reference. Mutating advice sorts later so earlier advice in the group
/// observes unmodified state.
fn ref_param_mask(adv: &AdviceDescriptor, target: &MethodDef) -> u32 {
    let mut mask = 0u32;
    for (i, param) in target.params.iter().take(32).enumerate() {
        if let Some(advice_param) = adv.method.param(&param.name) {
            if advice_param.accessor.is_none() && advice_param.ty.is_by_ref() {
                mask |= 1 << i;
            }
        }
    }
    mask
}

fn build_plan<'a>(
    env: &TypeEnv,
    site: MethodSite,
    method_index: usize,
    matched: &[&'a AdviceDescriptor],
) -> Result<WeavePlan<'a>, WeaveError> {
    let method = site.method;

    let mut before: Vec<&'a AdviceDescriptor> = Vec::new();
    let mut after_returning: Vec<&'a AdviceDescriptor> = Vec::new();
    let mut after_throwing: Vec<&'a AdviceDescriptor> = Vec::new();
    let mut after: Vec<&'a AdviceDescriptor> = Vec::new();
    for &adv in matched {
        match adv.join_point {
            JoinPoint::Before => before.push(adv),
            JoinPoint::AfterReturning => after_returning.push(adv),
            JoinPoint::AfterThrowing => after_throwing.push(adv),
            JoinPoint::After => after.push(adv),
            JoinPoint::Around => {}
        }
    }
    sort_group(&mut before, method);
    sort_group(&mut after_returning, method);
    sort_group(&mut after_throwing, method);
    sort_group(&mut after, method);

    let needs_handle = matched.iter().any(|a| a.has_method_accessor);
    let needs_args = matched.iter().any(|a| a.has_args_accessor);
    let has_try = !after_throwing.is_empty() || !after.is_empty();
    let returning_needs_value = after_returning.iter().any(|a| a.returned_type.is_some());
    // The return value must survive any region exit, so it is captured
    // whenever advice reads it or a protected region is synthesized.
    let needs_result = method.has_return() && (returning_needs_value || has_try || needs_args);

    let object = TypeRef::Primitive(Primitive::Object);
    let arg_slots = method
        .params
        .iter()
        .map(|p| {
            let elem = p.ty.strip_by_ref();
            ArgSlot {
                deref: p.is_by_ref().then(|| elem.clone()),
                box_as: env.boxing_required(elem, &object).then(|| elem.clone()),
            }
        })
        .collect();

    let declaring = site.owner.self_ref();
    let own_generics: Vec<TypeRef> = method
        .generic_params
        .iter()
        .map(|g| TypeRef::GenericParam(GenericParamRef::method(&g.name)))
        .collect();

    let shadow_spec = MethodSpec {
        declaring: declaring.clone(),
        name: format!("{SHADOW_PREFIX}{}", method.name),
        method_args: own_generics.clone(),
        is_ctor: false,
    };
    let handle_spec = needs_handle.then(|| MethodSpec {
        declaring,
        name: method.name.clone(),
        method_args: own_generics,
        is_ctor: method.is_ctor,
    });

    let mut throwing: Vec<(Option<TypeRef>, Vec<PlannedCall<'a>>)> = Vec::new();
    for adv in after_throwing {
        let key = adv.thrown_type.clone();
        let call = plan_call(env, site, adv)?;
        match throwing.iter_mut().find(|(k, _)| *k == key) {
            Some((_, group)) => group.push(call),
            None => throwing.push((key, vec![call])),
        }
    }

    let lower_group = |group: Vec<&'a AdviceDescriptor>| -> Result<Vec<PlannedCall<'a>>, WeaveError> {
        group.into_iter().map(|adv| plan_call(env, site, adv)).collect()
    };

    Ok(WeavePlan {
        method_index,
        before: lower_group(before)?,
        after_returning: lower_group(after_returning)?,
        throwing,
        after: lower_group(after)?,
        needs_args,
        needs_result,
        handle_spec,
        shadow_spec,
        arg_slots,
        return_type: method.return_type.clone(),
        has_this: method.has_this(),
        param_count: method.params.len(),
    })
}

/// Lower one advice invocation: resolve its generic instantiation and the
/// source of every parameter.
fn plan_call<'a>(
    env: &TypeEnv,
    site: MethodSite,
    adv: &'a AdviceDescriptor,
) -> Result<PlannedCall<'a>, WeaveError> {
    let method = site.method;

    let mut generic_args = Vec::new();
    for gp in &adv.method.generic_params {
        let resolved = match gp.binding {
            GenericBinding::ByName => binding::resolve_by_name(site, &gp.name),
            GenericBinding::ByParamType => {
                let mut candidates = scratch::scoped::<TypeRef>();
                binding::find_by_param_type(env, site, &adv.method, &gp.name, &mut candidates);
                candidates.first().cloned()
            }
        };
        generic_args.push(resolved.ok_or_else(|| WeaveError::MissingInstantiation {
            advice: adv.path(),
            target: site.path(),
        })?);
    }

    let spec = MethodSpec {
        declaring: TypeRef::Named(adv.owner.clone()),
        name: adv.method.name.clone(),
        method_args: generic_args,
        is_ctor: adv.is_ctor(),
    };

    let mut args = Vec::new();
    for p in &adv.method.params {
        let step = match p.accessor {
            Some(Accessor::MethodHandle) => ArgStep {
                kind: ArgKind::Handle,
                load_addr: false,
                deref: None,
                box_as: None,
            },
            Some(Accessor::Args) => ArgStep {
                kind: ArgKind::ArgsView,
                load_addr: false,
                deref: None,
                box_as: None,
            },
            Some(Accessor::Thrown) => ArgStep {
                kind: ArgKind::Thrown,
                load_addr: false,
                deref: None,
                box_as: None,
            },
            Some(Accessor::This) => {
                let receiver = site.owner.self_ref();
                ArgStep {
                    kind: ArgKind::This,
                    load_addr: false,
                    deref: None,
                    box_as: box_step(env, &receiver, &p.ty),
                }
            }
            Some(Accessor::Returned) => {
                let (load_addr, deref) = ref_mode(&method.return_type, &p.ty);
                ArgStep {
                    kind: ArgKind::Returned,
                    load_addr,
                    deref,
                    box_as: box_step(env, method.return_type.strip_by_ref(), &p.ty),
                }
            }
            None => {
                let index = method.param_index(&p.name).ok_or_else(|| {
                    WeaveError::MissingArgSource {
                        param: p.name.clone(),
                        advice: adv.path(),
                        target: site.path(),
                    }
                })?;
                let target_ty = &method.params[index].ty;
                let (load_addr, deref) = ref_mode(target_ty, &p.ty);
                ArgStep {
                    kind: ArgKind::Target(index),
                    load_addr,
                    deref,
                    box_as: box_step(env, target_ty.strip_by_ref(), &p.ty),
                }
            }
        };
        args.push(step);
    }

    Ok(PlannedCall { adv, spec, args })
}

/// Reconcile by-reference-ness between a source and the advice parameter:
/// matching sides load plainly, a by-ref source feeding a value parameter
/// dereferences, a value source feeding a by-ref parameter loads its
/// address.
fn ref_mode(source: &TypeRef, advice_ty: &TypeRef) -> (bool, Option<TypeRef>) {
    match (source, advice_ty.is_by_ref()) {
        (TypeRef::ByRef(elem), false) => (false, Some(elem.as_ref().clone())),
        (TypeRef::ByRef(_), true) => (false, None),
        (_, true) => (true, None),
        (_, false) => (false, None),
    }
}

fn box_step(env: &TypeEnv, source_elem: &TypeRef, advice_ty: &TypeRef) -> Option<TypeRef> {
    if advice_ty.is_by_ref() {
        return None;
    }
    env.boxing_required(source_elem, advice_ty)
        .then(|| source_elem.clone())
}

/// Per-method emission state.
struct EmitCtx {
    handle: Option<LocalId>,
    view: Option<LocalId>,
    result: Option<LocalId>,
    exc: Option<LocalId>,
    instances: FxHashMap<TypeName, LocalId>,
}

/// Apply phase: move the original body into a shadow method and rebuild
/// the original as the orchestrator.
fn apply(ty: &mut TypeDef, plan: WeavePlan) -> Result<(), WeaveError> {
    let mi = plan.method_index;
    let original_body = ty.methods[mi]
        .body
        .take()
        .ok_or_else(|| WeaveError::MissingBody(ty.methods[mi].name.clone()))?;
    let shadow = make_shadow(&ty.methods[mi], original_body);

    let mut body = Body::new();
    let mut ctx = EmitCtx {
        handle: None,
        view: None,
        result: None,
        exc: None,
        instances: FxHashMap::default(),
    };

    // One-time load of the reflective method handle.
    if let Some(spec) = &plan.handle_spec {
        body.push(Instr::LoadMethodToken(spec.clone()));
        body.push(Instr::CallRuntime(RuntimeFn::MethodFromToken));
        let local = body.add_local(Local::new(TypeRef::Named(well_known::method_token())));
        body.push(Instr::StoreLocal(local));
        ctx.handle = Some(local);
    }

    // Rent the pooled argument buffer outside the release region: if the
    // rent itself fails there is nothing to release.
    let raw_local = if plan.needs_args {
        body.push(Instr::LoadConst(Const::I32(plan.param_count as i32)));
        body.push(Instr::CallRuntime(RuntimeFn::RentArgs));
        let local = body.add_local(Local::new(TypeRef::Array {
            elem: Box::new(TypeRef::Primitive(Primitive::Object)),
            rank: 1,
        }));
        body.push(Instr::StoreLocal(local));
        Some(local)
    } else {
        None
    };

    let process_start = body.push(Instr::Nop);

    // Box every argument into the buffer and wrap it in the read-only view.
    if let Some(raw) = raw_local {
        body.push(Instr::LoadConst(Const::I32(plan.param_count as i32)));
        body.push(Instr::LoadLocal(raw));
        for (i, slot) in plan.arg_slots.iter().enumerate() {
            body.push(Instr::Dup);
            body.push(Instr::LoadConst(Const::I32(i as i32)));
            body.push(Instr::LoadArg(i));
            if let Some(elem) = &slot.deref {
                body.push(Instr::LoadIndirect(elem.clone()));
            }
            if let Some(t) = &slot.box_as {
                body.push(Instr::Box(t.clone()));
            }
            body.push(Instr::StoreElem);
        }
        body.push(Instr::CallRuntime(RuntimeFn::NewArgView));
        let view = body.add_local(Local::new(TypeRef::Named(well_known::arg_view())));
        body.push(Instr::StoreLocal(view));
        ctx.view = Some(view);
    }

    if plan.needs_result {
        ctx.result = Some(body.add_local(Local::new(plan.return_type.clone())));
    }

    for call in &plan.before {
        emit_call(&mut body, call, &mut ctx)?;
    }

    // The call to the shadow method with the original arguments.
    let call_start = body.push(Instr::Nop);
    if plan.has_this {
        body.push(Instr::LoadThis);
    }
    for i in 0..plan.param_count {
        body.push(Instr::LoadArg(i));
    }
    body.push(Instr::Call(plan.shadow_spec.clone()));
    if let Some(result) = ctx.result {
        body.push(Instr::StoreLocal(result));
    }

    for call in &plan.after_returning {
        emit_call(&mut body, call, &mut ctx)?;
    }

    let has_try = !plan.throwing.is_empty() || !plan.after.is_empty();
    let leave = if has_try || plan.needs_args {
        Some(body.push(Instr::Leave(InstrId::default())))
    } else {
        None
    };

    let call_end = body.push(Instr::Nop);
    let mut handlers: Vec<ExceptionHandler> = Vec::new();
    let mut handler_start = call_end;

    // AfterThrowing: one runtime type test per thrown-type group, then the
    // original exception is always rethrown.
    let mut catch_end = None;
    if !plan.throwing.is_empty() {
        for (key, calls) in &plan.throwing {
            if let Some(exc_ty) = key {
                let exc = body.add_local(Local::new(exc_ty.clone()));
                body.push(Instr::Dup);
                body.push(Instr::IsInst(exc_ty.clone()));
                body.push(Instr::StoreLocal(exc));
                body.push(Instr::LoadLocal(exc));
                let skip = body.push(Instr::BranchIfFalse(InstrId::default()));
                ctx.exc = Some(exc);
                for call in calls {
                    emit_call(&mut body, call, &mut ctx)?;
                }
                ctx.exc = None;
                let group_end = body.push(Instr::Nop);
                patch_jump(&mut body, skip, group_end);
            } else {
                for call in calls {
                    emit_call(&mut body, call, &mut ctx)?;
                }
            }
        }
        body.push(Instr::Pop);
        body.push(Instr::Rethrow);

        if !plan.after.is_empty() {
            let end = body.push(Instr::Nop);
            catch_end = Some(end);
            handler_start = end;
        }
    }

    // After advice runs as the unconditional finally, nested inside the
    // catch region when both exist.
    if !plan.after.is_empty() {
        for call in &plan.after {
            emit_call(&mut body, call, &mut ctx)?;
        }
        body.push(Instr::EndFinally);
    }

    let method_end = body.push(Instr::Nop);

    if !plan.throwing.is_empty() {
        handlers.push(ExceptionHandler {
            kind: HandlerKind::Catch(TypeRef::Named(well_known::exception())),
            try_start: call_start,
            try_end: call_end,
            handler_start: call_end,
            handler_end: catch_end.unwrap_or(method_end),
        });
    }

    if !plan.after.is_empty() {
        handlers.push(ExceptionHandler {
            kind: HandlerKind::Finally,
            try_start: call_start,
            try_end: handler_start,
            handler_start,
            handler_end: method_end,
        });
    }

    // Release the rented buffer on every exit path.
    let release_start = if has_try { method_end } else { call_end };
    if let Some(raw) = raw_local {
        body.push(Instr::LoadLocal(raw));
        body.push(Instr::CallRuntime(RuntimeFn::ReleaseArgs));
        body.push(Instr::EndFinally);
    }

    let process_end = body.push(Instr::Nop);
    if let Some(raw_finally) = raw_local.map(|_| ExceptionHandler {
        kind: HandlerKind::Finally,
        try_start: process_start,
        try_end: release_start,
        handler_start: release_start,
        handler_end: process_end,
    }) {
        handlers.push(raw_finally);
    }

    if let Some(leave) = leave {
        patch_jump(&mut body, leave, process_end);
    }

    if let Some(result) = ctx.result {
        body.push(Instr::LoadLocal(result));
    }
    body.push(Instr::Return);

    body.handlers = handlers;
    body.normalize();

    ty.methods[mi].body = Some(body);
    ty.methods.push(shadow);
    Ok(())
}

/// Clone the original method into its shadow. Parameter and generic
/// parameter references in the body stay valid: instruction operands
/// address parameters by index and generic parameters by owner and name.
fn make_shadow(method: &MethodDef, body: Body) -> MethodDef {
    let mut shadow = method.clone();
    shadow.name = format!("{SHADOW_PREFIX}{}", method.name);
    shadow.is_ctor = false;
    shadow.virtuality = Virtuality::None;
    shadow.always_inline = true;
    shadow.advice = None;
    shadow.pointcuts = Vec::new();
    shadow.signature_logs = Vec::new();
    shadow.body = Some(body);
    shadow
}

/// Emit one advice invocation: receiver, arguments, then the call itself.
/// A constructor advice instead constructs the per-type aspect instance
/// and stores it for later instance advice of the same type.
fn emit_call(body: &mut Body, call: &PlannedCall, ctx: &mut EmitCtx) -> Result<(), WeaveError> {
    let missing = |param: &str| WeaveError::MissingArgSource {
        param: param.to_string(),
        advice: call.adv.path(),
        target: call.spec.name.clone(),
    };

    if call.adv.has_this() {
        if let Some(instance) = ctx.instances.get(&call.adv.owner) {
            body.push(Instr::LoadLocal(*instance));
        }
    }

    for step in &call.args {
        match step.kind {
            ArgKind::Handle => {
                body.push(Instr::LoadLocal(ctx.handle.ok_or_else(|| missing("handle"))?));
            }
            ArgKind::ArgsView => {
                body.push(Instr::LoadLocal(ctx.view.ok_or_else(|| missing("args"))?));
            }
            ArgKind::Thrown => {
                body.push(Instr::LoadLocal(ctx.exc.ok_or_else(|| missing("thrown"))?));
            }
            ArgKind::This => {
                body.push(Instr::LoadThis);
            }
            ArgKind::Returned => {
                let result = ctx.result.ok_or_else(|| missing("returned"))?;
                if step.load_addr {
                    body.push(Instr::LoadLocalAddr(result));
                } else {
                    body.push(Instr::LoadLocal(result));
                }
            }
            ArgKind::Target(index) => {
                if step.load_addr {
                    body.push(Instr::LoadArgAddr(index));
                } else {
                    body.push(Instr::LoadArg(index));
                }
            }
        }
        if let Some(elem) = &step.deref {
            body.push(Instr::LoadIndirect(elem.clone()));
        }
        if let Some(t) = &step.box_as {
            body.push(Instr::Box(t.clone()));
        }
    }

    if call.spec.is_ctor {
        body.push(Instr::NewObj(call.spec.clone()));
        let instance = body.add_local(Local::new(TypeRef::Named(call.adv.owner.clone())));
        body.push(Instr::StoreLocal(instance));
        ctx.instances.insert(call.adv.owner.clone(), instance);
    } else {
        body.push(Instr::Call(call.spec.clone()));
    }
    Ok(())
}

fn patch_jump(body: &mut Body, id: InstrId, target: InstrId) {
    if let Some(instr) = body.get_mut(id) {
        match instr {
            Instr::Branch(t) | Instr::BranchIfFalse(t) | Instr::Leave(t) => *t = target,
            _ => {}
        }
    }
}
