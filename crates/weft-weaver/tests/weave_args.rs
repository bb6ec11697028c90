//! Pooled argument-buffer discipline: for any instrumented activation
//! that rents a buffer, exactly one release occurs on every exit path.

mod common;

use common::*;
use weft_model::module::Accessor;
use weft_model::{JoinPoint, MethodDef, Module, Param, TypeDef, TypeName, TypeRef};
use weft_weaver::{Outcome, Weaver};

fn args_aspect() -> TypeDef {
    let mut aspect = static_aspect("game", "Trace");
    let mut observe = advice("observe", JoinPoint::Before, ".*");
    observe.params.push(accessor_param(
        "args",
        TypeRef::Named(TypeName::core("ArgView")),
        Accessor::Args,
    ));
    aspect.methods.push(observe);
    aspect.methods.push(advice("cleanup", JoinPoint::After, ".*"));
    aspect
}

#[test]
fn buffer_released_once_on_normal_return() {
    let mut module = Module::new("game.logic");
    let mut account = TypeDef::new(TypeName::new("game", "Account"));
    let mut transfer = MethodDef::new("transfer", int());
    transfer.is_static = true;
    transfer.params.push(Param::new("amount", int()));
    transfer.params.push(Param::new("note", str_ty()));
    transfer.body = Some(body_record_then_return(5));
    account.methods.push(transfer);
    module.types.push(account);
    module.types.push(sink_type());
    module.types.push(args_aspect());

    let world = core_world();
    let report = Weaver::default().process(&mut module, &world);
    assert_eq!(report.outcome, Outcome::Modified { methods: 1 });

    let mut machine = Machine::new(&module, &world);
    let result = machine.call(
        &TypeName::new("game", "Account"),
        "transfer",
        None,
        vec![Value::I32(9), Value::Str("rent".into())],
    );
    assert_eq!(result, Ok(Value::I32(5)));
    assert_eq!(machine.rents, 1);
    assert_eq!(machine.releases, 1);
    assert!(machine.trace.iter().any(|t| t == "Trace::observe(args)"));
}

#[test]
fn buffer_released_once_when_the_original_throws() {
    let mut module = Module::new("game.logic");
    let mut reactor = TypeDef::new(TypeName::new("game", "Reactor"));
    let mut vent = MethodDef::new("vent", void());
    vent.is_static = true;
    vent.params.push(Param::new("pressure", int()));
    vent.body = Some(body_throwing(&TypeName::new("game", "Boom")));
    reactor.methods.push(vent);
    module.types.push(reactor);
    module.types.push(exception_class("game", "Boom"));
    module.types.push(sink_type());
    module.types.push(args_aspect());

    let world = core_world();
    let report = Weaver::default().process(&mut module, &world);
    assert_eq!(report.outcome, Outcome::Modified { methods: 1 });

    let mut machine = Machine::new(&module, &world);
    let result = machine.call(
        &TypeName::new("game", "Reactor"),
        "vent",
        None,
        vec![Value::I32(11)],
    );
    assert_eq!(result, Err(Value::Obj(TypeName::new("game", "Boom"))));
    assert_eq!(machine.rents, 1);
    assert_eq!(machine.releases, 1);
    // After advice still ran on the exceptional path.
    assert!(machine.trace.iter().any(|t| t == "Trace::cleanup()"));
}

#[test]
fn no_buffer_without_an_args_accessor() {
    let mut module = Module::new("game.logic");
    let mut account = TypeDef::new(TypeName::new("game", "Account"));
    let mut transfer = MethodDef::new("transfer", int());
    transfer.is_static = true;
    transfer.body = Some(body_record_then_return(5));
    account.methods.push(transfer);
    module.types.push(account);
    module.types.push(sink_type());

    let mut aspect = static_aspect("game", "Trace");
    aspect.methods.push(advice("enter", JoinPoint::Before, "transfer"));
    module.types.push(aspect);

    let world = core_world();
    Weaver::default().process(&mut module, &world);

    let mut machine = Machine::new(&module, &world);
    let result = machine.call(&TypeName::new("game", "Account"), "transfer", None, vec![]);
    assert_eq!(result, Ok(Value::I32(5)));
    assert_eq!(machine.rents, 0);
    assert_eq!(machine.releases, 0);
}
