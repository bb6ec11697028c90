//! AfterThrowing/After weaving: typed catch advice runs only for matching
//! exceptions, the unconditional After advice always runs, and the
//! original exception propagates unchanged.

mod common;

use common::*;
use weft_model::module::Accessor;
use weft_model::{JoinPoint, MethodDef, Module, TypeDef, TypeName, TypeRef};
use weft_weaver::{Outcome, Weaver};

fn throwing_module(exc: &str) -> Module {
    let mut module = Module::new("game.logic");
    let mut reactor = TypeDef::new(TypeName::new("game", "Reactor"));
    let mut vent = MethodDef::new("vent", void());
    vent.is_static = true;
    vent.body = Some(body_throwing(&TypeName::new("game", exc)));
    reactor.methods.push(vent);
    module.types.push(reactor);
    module.types.push(exception_class("game", "Boom"));
    module.types.push(exception_class("game", "Other"));
    module.types.push(sink_type());
    module
}

fn add_throwing_aspect(module: &mut Module) {
    let mut aspect = static_aspect("game", "Trace");
    let mut on_boom = advice("on_boom", JoinPoint::AfterThrowing, "vent");
    on_boom.params.push(accessor_param(
        "exn",
        TypeRef::named("game", "Boom"),
        Accessor::Thrown,
    ));
    aspect.methods.push(on_boom);
    aspect.methods.push(advice("cleanup", JoinPoint::After, "vent"));
    module.types.push(aspect);
}

#[test]
fn matching_exception_runs_catch_advice_then_after_then_propagates() {
    let mut module = throwing_module("Boom");
    add_throwing_aspect(&mut module);

    let world = core_world();
    let report = Weaver::default().process(&mut module, &world);
    assert_eq!(report.outcome, Outcome::Modified { methods: 1 });

    let mut machine = Machine::new(&module, &world);
    let result = machine.call(&TypeName::new("game", "Reactor"), "vent", None, vec![]);
    assert_eq!(result, Err(Value::Obj(TypeName::new("game", "Boom"))));

    let boom = machine
        .trace
        .iter()
        .position(|t| t == "Trace::on_boom(game.Boom)")
        .expect("typed advice ran");
    let cleanup = machine
        .trace
        .iter()
        .position(|t| t == "Trace::cleanup()")
        .expect("after advice ran");
    assert!(boom < cleanup, "catch advice before after advice");
}

#[test]
fn unrelated_exception_skips_typed_advice() {
    let mut module = throwing_module("Other");
    add_throwing_aspect(&mut module);

    let world = core_world();
    let report = Weaver::default().process(&mut module, &world);
    assert_eq!(report.outcome, Outcome::Modified { methods: 1 });

    let mut machine = Machine::new(&module, &world);
    let result = machine.call(&TypeName::new("game", "Reactor"), "vent", None, vec![]);
    assert_eq!(result, Err(Value::Obj(TypeName::new("game", "Other"))));

    assert!(machine.trace.iter().any(|t| t == "Trace::cleanup()"));
    assert!(!machine.trace.iter().any(|t| t.starts_with("Trace::on_boom")));
}

#[test]
fn untyped_throwing_advice_runs_for_any_exception() {
    let mut module = throwing_module("Other");
    let mut aspect = static_aspect("game", "Trace");
    aspect
        .methods
        .push(advice("on_any", JoinPoint::AfterThrowing, "vent"));
    module.types.push(aspect);

    let world = core_world();
    let report = Weaver::default().process(&mut module, &world);
    assert_eq!(report.outcome, Outcome::Modified { methods: 1 });

    let mut machine = Machine::new(&module, &world);
    let result = machine.call(&TypeName::new("game", "Reactor"), "vent", None, vec![]);
    assert_eq!(result, Err(Value::Obj(TypeName::new("game", "Other"))));
    assert!(machine.trace.iter().any(|t| t == "Trace::on_any()"));
}

#[test]
fn thrown_accessor_must_be_an_exception_type() {
    let mut module = throwing_module("Boom");
    let mut aspect = static_aspect("game", "Trace");
    let mut bad = advice("on_bad", JoinPoint::AfterThrowing, "vent");
    bad.params
        .push(accessor_param("exn", int(), Accessor::Thrown));
    aspect.methods.push(bad);
    module.types.push(aspect);

    let world = core_world();
    let report = Weaver::default().process(&mut module, &world);
    assert_eq!(report.outcome, Outcome::Unchanged);
    assert!(report
        .diagnostics
        .iter()
        .any(|d| d.code.as_str() == "WEFT1403"));
}
