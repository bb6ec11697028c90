//! Generic binding resolution end to end: by-parameter-type unification,
//! by-name binding, and the ambiguity/unbound diagnostics.

mod common;

use common::*;
use weft_model::module::GenericBinding;
use weft_model::{
    GenericParamDef, GenericParamRef, Instr, JoinPoint, MethodDef, Module, Param, TypeDef,
    TypeName, TypeRef,
};
use weft_weaver::{Outcome, Weaver, SHADOW_PREFIX};

fn list_of(arg: TypeRef) -> TypeRef {
    TypeRef::GenericInst {
        base: Box::new(TypeRef::named("std", "List")),
        args: vec![arg],
    }
}

fn bound_generic_param(name: &str) -> GenericParamDef {
    GenericParamDef {
        binding: GenericBinding::ByParamType,
        ..GenericParamDef::new(name)
    }
}

fn module_with_target(target: MethodDef) -> Module {
    let mut module = Module::new("game.logic");
    let mut account = TypeDef::new(TypeName::new("game", "Account"));
    account.methods.push(target);
    module.types.push(account);
    module.types.push(sink_type());
    module
}

/// The generic instantiation of the first advice call in the woven body.
fn advice_instantiation(module: &Module, advice_name: &str) -> Vec<TypeRef> {
    let account = module.type_def(&TypeName::new("game", "Account")).unwrap();
    let body = account.method("transfer").unwrap().body.as_ref().unwrap();
    body.iter()
        .find_map(|(_, instr)| match instr {
            Instr::Call(spec) if spec.name == advice_name => Some(spec.method_args.clone()),
            _ => None,
        })
        .expect("advice call present")
}

#[test]
fn by_param_type_binding_resolves_through_generic_instance() {
    let mut transfer = MethodDef::new("transfer", void());
    transfer.is_static = true;
    transfer.params.push(Param::new("items", list_of(int())));
    transfer.body = Some(body_record_then_return(0));
    let mut module = module_with_target(transfer);

    let mut aspect = static_aspect("game", "Trace");
    let mut enter = advice("enter", JoinPoint::Before, "transfer");
    enter.generic_params.push(bound_generic_param("T"));
    enter.params.push(Param::new(
        "items",
        list_of(TypeRef::GenericParam(GenericParamRef::method("T"))),
    ));
    aspect.methods.push(enter);
    module.types.push(aspect);

    let world = core_world();
    let report = Weaver::default().process(&mut module, &world);
    assert_eq!(report.outcome, Outcome::Modified { methods: 1 });
    assert_eq!(advice_instantiation(&module, "enter"), vec![int()]);
}

#[test]
fn by_name_binding_stays_open_over_the_target_parameter() {
    let mut transfer = MethodDef::new("transfer", void());
    transfer.is_static = true;
    transfer.generic_params.push(GenericParamDef::new("T"));
    transfer.params.push(Param::new(
        "item",
        TypeRef::GenericParam(GenericParamRef::method("T")),
    ));
    transfer.body = Some(body_record_then_return(0));
    let mut module = module_with_target(transfer);

    let mut aspect = static_aspect("game", "Trace");
    let mut enter = advice("enter", JoinPoint::Before, "transfer");
    enter.generic_params.push(GenericParamDef::new("T"));
    enter.params.push(Param::new(
        "item",
        TypeRef::GenericParam(GenericParamRef::method("T")),
    ));
    aspect.methods.push(enter);
    module.types.push(aspect);

    let world = core_world();
    let report = Weaver::default().process(&mut module, &world);
    assert_eq!(report.outcome, Outcome::Modified { methods: 1 });
    assert_eq!(
        advice_instantiation(&module, "enter"),
        vec![TypeRef::GenericParam(GenericParamRef::method("T"))]
    );

    // The shadow call closes over the target's own generic parameters.
    let account = module.type_def(&TypeName::new("game", "Account")).unwrap();
    let shadow = account.method(&format!("{SHADOW_PREFIX}transfer")).unwrap();
    assert_eq!(shadow.generic_params.len(), 1);
}

#[test]
fn ambiguous_binding_is_reported_and_the_method_skipped() {
    let mut transfer = MethodDef::new("transfer", void());
    transfer.is_static = true;
    transfer.params.push(Param::new("a", int()));
    transfer.params.push(Param::new("b", str_ty()));
    transfer.body = Some(body_record_then_return(0));
    let mut module = module_with_target(transfer);

    let mut aspect = static_aspect("game", "Trace");
    let mut enter = advice("enter", JoinPoint::Before, "transfer");
    enter.generic_params.push(bound_generic_param("T"));
    let open = TypeRef::GenericParam(GenericParamRef::method("T"));
    enter.params.push(Param::new("a", open.clone()));
    enter.params.push(Param::new("b", open));
    aspect.methods.push(enter);
    module.types.push(aspect);

    let world = core_world();
    let report = Weaver::default().process(&mut module, &world);
    assert_eq!(report.outcome, Outcome::Unchanged);
    assert!(report
        .diagnostics
        .iter()
        .any(|d| d.code.as_str() == "WEFT2102"));

    let account = module.type_def(&TypeName::new("game", "Account")).unwrap();
    assert!(account.method(&format!("{SHADOW_PREFIX}transfer")).is_none());
}

#[test]
fn unbound_by_param_type_binding_suppresses_the_module() {
    let mut transfer = MethodDef::new("transfer", void());
    transfer.is_static = true;
    transfer.params.push(Param::new("amount", int()));
    transfer.body = Some(body_record_then_return(0));
    let mut module = module_with_target(transfer);

    let mut aspect = static_aspect("game", "Trace");
    let mut enter = advice("enter", JoinPoint::Before, "transfer");
    enter.generic_params.push(bound_generic_param("T"));
    // T appears in no parameter type: advice-level validation rejects it
    // and the whole module stays unwoven.
    enter.params.push(Param::new("amount", int()));
    aspect.methods.push(enter);
    module.types.push(aspect);

    let world = core_world();
    let report = Weaver::default().process(&mut module, &world);
    assert_eq!(report.outcome, Outcome::Unchanged);
    assert!(report
        .diagnostics
        .iter()
        .any(|d| d.code.as_str() == "WEFT1111"));

    let account = module.type_def(&TypeName::new("game", "Account")).unwrap();
    assert!(account.method(&format!("{SHADOW_PREFIX}transfer")).is_none());
}
